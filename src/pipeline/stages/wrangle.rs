use anyhow::Context;
use async_trait::async_trait;

use super::WRANGLE_REPORT_ARTIFACT;
use crate::dataset::catalog::datasets;
use crate::dataset::{wrangle, WrangleReport};
use crate::pipeline::{StageContext, StageHandler, StageOutput};
use crate::storage::{write_json_atomic, ArtifactHandle, ArtifactKind};

pub const WRANGLE_REPORT_FILE: &str = "wrangle_report.json";

/// Derives every clean dataset from its raw counterpart.
pub struct WrangleStage;

#[async_trait]
impl StageHandler for WrangleStage {
    async fn run(&self, ctx: StageContext) -> anyhow::Result<StageOutput> {
        let paths = ctx.config.paths.clone();
        let mut output = StageOutput::new();
        let mut reports: Vec<WrangleReport> = Vec::new();

        for def in datasets() {
            ctx.ensure_active()?;
            let raw = ctx.catalog.load_table(&def.raw_artifact())?;

            let worker_def = def.clone();
            let (clean, report) = tokio::task::spawn_blocking(move || wrangle(&raw, &worker_def))
                .await?
                .with_context(|| format!("wrangling '{}'", def.name))?;

            ctx.ensure_active()?;
            let path = def.clean_path(&paths.clean_dir);
            clean.write_csv(&path)?;
            tracing::info!(
                dataset = def.name,
                rows_in = report.rows_in,
                rows_out = report.rows_out,
                dropped_missing = report.dropped_missing,
                duplicates_removed = report.duplicates_removed,
                cells_imputed = report.cells_imputed,
                "dataset wrangled"
            );

            output.push(
                ArtifactHandle::new(def.clean_artifact(), ArtifactKind::CleanDataset, path)
                    .with_schema(def.clean_schema()),
            );
            reports.push(report);
        }

        let report_path = paths.reports_dir.join(WRANGLE_REPORT_FILE);
        write_json_atomic(&report_path, &reports)?;
        output.push(ArtifactHandle::new(WRANGLE_REPORT_ARTIFACT, ArtifactKind::Report, report_path));

        Ok(output)
    }
}
