use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::analyze::DemandSummary;
use super::{CHART_DATA_ARTIFACT, DEMAND_SUMMARY_ARTIFACT};
use crate::features::calendar::Season;
use crate::pipeline::{StageContext, StageHandler, StageOutput};
use crate::storage::{write_json_atomic, ArtifactHandle, ArtifactKind};
use strum::IntoEnumIterator;

pub const CHART_DATA_FILE: &str = "chart_data.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartPoint {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSeries {
    pub name: String,
    pub points: Vec<ChartPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chart {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub series: Vec<ChartSeries>,
}

/// Chart-ready series; rendering is left to the display layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartData {
    pub charts: Vec<Chart>,
}

impl ChartData {
    pub fn from_summary(summary: &DemandSummary) -> Self {
        // Seasons in calendar order, then anything unexpected the data carried.
        let mut names: Vec<String> = Season::iter()
            .map(|s| s.to_string())
            .filter(|s| summary.season_hour_mean.contains_key(s))
            .collect();
        names.extend(
            summary
                .season_hour_mean
                .keys()
                .filter(|k| !names.contains(k))
                .cloned()
                .collect::<Vec<_>>(),
        );

        let hourly = Chart {
            title: "Mean hourly demand by season".to_string(),
            x_label: "hour".to_string(),
            y_label: "rented bikes".to_string(),
            series: names
                .iter()
                .map(|name| ChartSeries {
                    name: name.clone(),
                    points: summary.season_hour_mean[name]
                        .iter()
                        .map(|(hour, mean)| ChartPoint {
                            x: f64::from(*hour),
                            y: *mean,
                        })
                        .collect(),
                })
                .collect(),
        };

        let overall = Chart {
            title: "Mean demand by hour".to_string(),
            x_label: "hour".to_string(),
            y_label: "rented bikes".to_string(),
            series: vec![ChartSeries {
                name: "all".to_string(),
                points: summary
                    .by_hour
                    .iter()
                    .map(|(hour, stats)| ChartPoint {
                        x: f64::from(*hour),
                        y: stats.mean,
                    })
                    .collect(),
            }],
        };

        Self {
            charts: vec![hourly, overall],
        }
    }
}

/// Turns the demand summary into chart series.
pub struct VisualizeStage;

#[async_trait]
impl StageHandler for VisualizeStage {
    async fn run(&self, ctx: StageContext) -> anyhow::Result<StageOutput> {
        let summary_handle = ctx.catalog.require(DEMAND_SUMMARY_ARTIFACT)?;
        let bytes = tokio::fs::read(&summary_handle.path)
            .await
            .with_context(|| format!("reading {}", summary_handle.path.display()))?;
        let summary: DemandSummary = serde_json::from_slice(&bytes).context("malformed demand summary")?;

        let charts = ChartData::from_summary(&summary);
        let path = ctx.config.paths.reports_dir.join(CHART_DATA_FILE);
        write_json_atomic(&path, &charts)?;
        tracing::info!(charts = charts.charts.len(), "chart data written");

        Ok(StageOutput::new().with(ArtifactHandle::new(CHART_DATA_ARTIFACT, ArtifactKind::Report, path)))
    }
}
