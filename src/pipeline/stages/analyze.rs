use async_trait::async_trait;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

use super::DEMAND_SUMMARY_ARTIFACT;
use crate::dataset::catalog::{seoul, SEOUL_BIKE_SHARING_DATASET};
use crate::dataset::Table;
use crate::pipeline::{StageContext, StageHandler, StageOutput};
use crate::storage::{write_json_atomic, ArtifactHandle, ArtifactKind};

pub const DEMAND_SUMMARY_FILE: &str = "demand_summary.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemandStats {
    pub observations: usize,
    pub mean: f64,
    pub max: f64,
}

impl DemandStats {
    fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        Some(Self {
            observations: values.len(),
            mean: values.iter().sum::<f64>() / values.len() as f64,
            max: values.iter().copied().fold(f64::MIN, f64::max),
        })
    }
}

fn stats_by<K: Ord + Hash + Eq>(groups: HashMap<K, Vec<f64>>) -> BTreeMap<K, DemandStats> {
    groups
        .into_iter()
        .filter_map(|(k, v)| DemandStats::from_values(&v).map(|s| (k, s)))
        .collect()
}

/// Descriptive statistics of the historical demand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemandSummary {
    pub overall: DemandStats,
    pub by_season: BTreeMap<String, DemandStats>,
    pub by_hour: BTreeMap<u32, DemandStats>,
    /// Mean demand per hour of day, per season.
    pub season_hour_mean: BTreeMap<String, BTreeMap<u32, f64>>,
    pub peak_hour: u32,
    pub holiday_mean: BTreeMap<String, f64>,
}

impl DemandSummary {
    pub fn from_table(table: &Table) -> anyhow::Result<Self> {
        table.validate(&SEOUL_BIKE_SHARING_DATASET.clean_schema())?;

        let rows: Vec<(String, u32, String, f64)> = table
            .records()
            .filter_map(|r| {
                let hour = r.get_f64(seoul::HOUR)?;
                Some((
                    r.get(seoul::SEASONS).unwrap_or("Unknown").to_string(),
                    hour as u32,
                    r.get(seoul::HOLIDAY).unwrap_or("Unknown").to_string(),
                    r.get_f64(seoul::RENTED_BIKE_COUNT)?,
                ))
            })
            .collect();

        let demand: Vec<f64> = rows.iter().map(|r| r.3).collect();
        let overall = DemandStats::from_values(&demand)
            .ok_or_else(|| anyhow::anyhow!("no usable demand observations"))?;

        let by_season = stats_by(rows.iter().map(|r| (r.0.clone(), r.3)).into_group_map());
        let by_hour = stats_by(rows.iter().map(|r| (r.1, r.3)).into_group_map());
        let holiday_mean = stats_by(rows.iter().map(|r| (r.2.clone(), r.3)).into_group_map())
            .into_iter()
            .map(|(k, s)| (k, s.mean))
            .collect();

        let mut season_hour_mean: BTreeMap<String, BTreeMap<u32, f64>> = BTreeMap::new();
        for ((season, hour), values) in rows.iter().map(|r| ((r.0.clone(), r.1), r.3)).into_group_map() {
            let mean = values.iter().sum::<f64>() / values.len() as f64;
            season_hour_mean.entry(season).or_default().insert(hour, mean);
        }

        let peak_hour = by_hour
            .iter()
            .max_by(|a, b| a.1.mean.total_cmp(&b.1.mean))
            .map(|(h, _)| *h)
            .unwrap_or_default();

        Ok(Self {
            overall,
            by_season,
            by_hour,
            season_hour_mean,
            peak_hour,
            holiday_mean,
        })
    }
}

/// Summarizes the historical demand into a JSON report.
pub struct AnalyzeStage;

#[async_trait]
impl StageHandler for AnalyzeStage {
    async fn run(&self, ctx: StageContext) -> anyhow::Result<StageOutput> {
        let table = ctx
            .catalog
            .load_table(&SEOUL_BIKE_SHARING_DATASET.clean_artifact())?;
        let summary = DemandSummary::from_table(&table)?;

        let path = ctx.config.paths.reports_dir.join(DEMAND_SUMMARY_FILE);
        write_json_atomic(&path, &summary)?;
        tracing::info!(
            observations = summary.overall.observations,
            mean_demand = summary.overall.mean,
            peak_hour = summary.peak_hour,
            "demand summary written"
        );

        Ok(StageOutput::new().with(ArtifactHandle::new(DEMAND_SUMMARY_ARTIFACT, ArtifactKind::Report, path)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clean_table(rows: &[(&str, &str, &str, &str)]) -> Table {
        let mut t = Table::new(SEOUL_BIKE_SHARING_DATASET.clean_schema().columns);
        for (date, count, hour, season) in rows {
            t.push_row(
                [
                    *date, *count, *hour, "10", "50", "1.5", "2000", "0", "0", "0", "0", *season, "No Holiday", "Yes",
                ]
                .iter()
                .map(|c| c.to_string())
                .collect(),
            );
        }
        t
    }

    #[test]
    fn test_summary_groups() {
        let table = clean_table(&[
            ("2018-01-01", "100", "8", "Winter"),
            ("2018-01-02", "300", "8", "Winter"),
            ("2018-01-01", "50", "3", "Winter"),
            ("2018-07-01", "900", "18", "Summer"),
        ]);
        let summary = DemandSummary::from_table(&table).unwrap();

        assert_eq!(summary.overall.observations, 4);
        assert_eq!(summary.overall.max, 900.0);
        assert_eq!(summary.by_hour[&8].mean, 200.0);
        assert_eq!(summary.by_season["Winter"].observations, 3);
        assert_eq!(summary.season_hour_mean["Winter"][&8], 200.0);
        assert_eq!(summary.peak_hour, 18);
        assert_eq!(summary.holiday_mean["No Holiday"], 337.5);
    }

    #[test]
    fn test_summary_needs_rows() {
        assert!(DemandSummary::from_table(&clean_table(&[])).is_err());
    }
}
