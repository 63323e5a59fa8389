//! Built-in stage handlers.

pub mod analyze;
pub mod collect;
pub mod model;
pub mod visualize;
pub mod wrangle;

use std::sync::Arc;

use super::{HandlerRegistry, PipelineStage};
use crate::config::PipelineConfig;

pub const COLLECT: &str = "collect";
pub const WRANGLE: &str = "wrangle";
pub const ANALYZE: &str = "analyze";
pub const VISUALIZE: &str = "visualize";
pub const MODEL: &str = "model";

pub const DEMAND_SUMMARY_ARTIFACT: &str = "reports/demand_summary";
pub const CHART_DATA_ARTIFACT: &str = "reports/chart_data";
pub const WRANGLE_REPORT_ARTIFACT: &str = "reports/wrangle";

/// Registry with every built-in handler under its default name.
pub fn default_handlers() -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    registry
        .register(COLLECT, Arc::new(collect::CollectStage))
        .register(WRANGLE, Arc::new(wrangle::WrangleStage))
        .register(ANALYZE, Arc::new(analyze::AnalyzeStage))
        .register(VISUALIZE, Arc::new(visualize::VisualizeStage))
        .register(MODEL, Arc::new(model::ModelStage));
    registry
}

pub fn stages_from_config(cfg: &PipelineConfig) -> Vec<PipelineStage> {
    cfg.stages.iter().map(PipelineStage::from_config).collect()
}
