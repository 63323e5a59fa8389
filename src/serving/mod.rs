//! Prediction serving
//!
//! Turns a forecast batch into one peak-demand row per known city. Every
//! failure on this path degrades to the fallback estimator or, when nothing
//! can be joined, to a fixed sample, so callers always get rows back.

pub mod cache;
pub mod fallback;

pub use cache::{PredictionCache, QueryKey};
pub use fallback::FallbackEstimator;

use ordered_float::OrderedFloat;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use strum::Display;
use thiserror::Error;

use crate::domain::{EntityAliasTable, ForecastBatch, ForecastRecord, ReferenceTable};
use crate::features::{FeatureTransformer, TransformError};
use crate::ml::models::RegressionModel;
use crate::ml::registry::TrainedModelArtifact;
use crate::ml::ModelError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PredictionSource {
    Model,
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DataSource {
    Live,
    Sample,
}

#[derive(Debug, Error)]
pub enum ServingError {
    #[error("no model artifact loaded")]
    NoArtifact,

    #[error("forecast record has no temperature")]
    NoTemperature,

    #[error("entity '{0}' has no reference row")]
    JoinUnresolved(String),

    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error(transparent)]
    Model(#[from] ModelError),
}

/// One forecast hour, predicted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordPrediction {
    pub entity: String,
    pub timestamp: Option<String>,
    pub value: f64,
    pub source: PredictionSource,
}

/// Peak demand of one entity across the forecast horizon.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionResult {
    pub entity: String,
    pub peak_demand: u64,
    pub prediction_source: PredictionSource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoPrediction {
    pub entity: String,
    pub peak_demand: u64,
    pub latitude: f64,
    pub longitude: f64,
    pub country: String,
    pub prediction_source: PredictionSource,
    pub data_source: DataSource,
}

pub struct PredictionServer {
    fallback: FallbackEstimator,
}

impl PredictionServer {
    pub fn new(fallback: FallbackEstimator) -> Self {
        Self { fallback }
    }

    pub fn fallback(&self) -> &FallbackEstimator {
        &self.fallback
    }

    fn model_value(record: &ForecastRecord, artifact: Option<&TrainedModelArtifact>) -> Result<f64, ServingError> {
        let artifact = artifact.ok_or(ServingError::NoArtifact)?;
        let features = FeatureTransformer::apply(&artifact.transformer, &record.to_observation())?;
        let prediction = artifact.model.predict(&features)?;
        Ok(prediction.value.max(0.0))
    }

    fn predict_with<R: Rng + ?Sized>(
        &self,
        record: &ForecastRecord,
        artifact: Option<&TrainedModelArtifact>,
        rng: &mut R,
    ) -> Option<RecordPrediction> {
        let (value, source) = match Self::model_value(record, artifact) {
            Ok(value) => (value, PredictionSource::Model),
            Err(e) => {
                let Some(temperature) = record.temperature else {
                    tracing::debug!(entity = %record.entity, error = %ServingError::NoTemperature, "forecast record skipped");
                    return None;
                };
                if artifact.is_some() {
                    tracing::debug!(entity = %record.entity, error = %e, "model path failed, using fallback");
                }
                (self.fallback.estimate(temperature, rng), PredictionSource::Fallback)
            }
        };

        Some(RecordPrediction {
            entity: record.entity.clone(),
            timestamp: record.timestamp.clone(),
            value,
            source,
        })
    }

    /// Model prediction when possible, fallback estimate otherwise. Records
    /// without a temperature cannot be estimated either way and yield `None`.
    pub fn predict_record(
        &self,
        record: &ForecastRecord,
        artifact: Option<&TrainedModelArtifact>,
    ) -> Option<RecordPrediction> {
        self.predict_with(record, artifact, &mut self.fallback.rng())
    }

    pub fn predict_records(
        &self,
        batch: &ForecastBatch,
        artifact: Option<&TrainedModelArtifact>,
    ) -> Vec<RecordPrediction> {
        let mut rng = self.fallback.rng();
        batch
            .records
            .iter()
            .filter_map(|r| self.predict_with(r, artifact, &mut rng))
            .collect()
    }

    /// Peak demand per reference city; never empty.
    pub fn predict(
        &self,
        batch: &ForecastBatch,
        artifact: Option<&TrainedModelArtifact>,
        aliases: &EntityAliasTable,
        reference: Option<&ReferenceTable>,
    ) -> Vec<GeoPrediction> {
        let records = self.predict_records(batch, artifact);
        let fallback_count = records
            .iter()
            .filter(|r| r.source == PredictionSource::Fallback)
            .count();
        let joined = reference
            .map(|r| join_peaks(&records, aliases, r))
            .unwrap_or_default();

        tracing::info!(
            version = %batch.version,
            records = records.len(),
            fallback = fallback_count,
            joined = joined.len(),
            "forecast batch predicted"
        );

        if joined.is_empty() {
            tracing::warn!(version = %batch.version, "no live predictions joined, serving sample");
            return self.fallback.sample();
        }
        joined
    }

    /// [`Self::predict`] narrowed to one country (case-insensitive). A filter
    /// that matches nothing is ignored.
    pub fn query(
        &self,
        batch: &ForecastBatch,
        artifact: Option<&TrainedModelArtifact>,
        aliases: &EntityAliasTable,
        reference: Option<&ReferenceTable>,
        country: Option<&str>,
    ) -> Vec<GeoPrediction> {
        let all = self.predict(batch, artifact, aliases, reference);
        let Some(country) = country.map(str::trim).filter(|c| !c.is_empty()) else {
            return all;
        };
        let filtered: Vec<GeoPrediction> = all
            .iter()
            .filter(|p| p.country.eq_ignore_ascii_case(country))
            .cloned()
            .collect();
        if filtered.is_empty() {
            tracing::debug!(country, "country filter matched nothing, returning all");
            return all;
        }
        filtered
    }
}

type Peak = (OrderedFloat<f64>, PredictionSource);

/// Keeps the larger value; on ties the earlier record wins.
fn keep_peak<K: Ord>(peaks: &mut BTreeMap<K, Peak>, key: K, record: &RecordPrediction) {
    let value = OrderedFloat(record.value);
    peaks
        .entry(key)
        .and_modify(|peak| {
            if value > peak.0 {
                *peak = (value, record.source);
            }
        })
        .or_insert((value, record.source));
}

fn rounded(value: OrderedFloat<f64>) -> u64 {
    value.into_inner().max(0.0).round() as u64
}

/// Max prediction per alias-resolved name, rounded. The peak record's source
/// labels the result.
pub fn aggregate_peaks(records: &[RecordPrediction], aliases: &EntityAliasTable) -> Vec<PredictionResult> {
    let mut peaks = BTreeMap::new();
    for record in records {
        keep_peak(&mut peaks, aliases.resolve(&record.entity).to_string(), record);
    }
    peaks
        .into_iter()
        .map(|(entity, (value, source))| PredictionResult {
            entity,
            peak_demand: rounded(value),
            prediction_source: source,
        })
        .collect()
}

/// Resolves every record to its reference row, then takes the peak per row.
///
/// Spellings that the reference lookup treats as one city (case, or the
/// `city` versus `city_ascii` form) land in the same row and are reported
/// under the reference `city` name. Records that resolve to no row are
/// dropped.
pub fn join_peaks(
    records: &[RecordPrediction],
    aliases: &EntityAliasTable,
    reference: &ReferenceTable,
) -> Vec<GeoPrediction> {
    let mut peaks: BTreeMap<usize, Peak> = BTreeMap::new();
    let mut unresolved: BTreeSet<&str> = BTreeSet::new();
    for record in records {
        let name = aliases.resolve(&record.entity);
        match reference.position(name) {
            Some(row) => keep_peak(&mut peaks, row, record),
            None => {
                unresolved.insert(name);
            }
        }
    }
    for name in unresolved {
        tracing::warn!(error = %ServingError::JoinUnresolved(name.to_string()), "entity dropped");
    }

    peaks
        .into_iter()
        .filter_map(|(row, (value, source))| {
            let city = reference.row(row)?;
            Some(GeoPrediction {
                entity: city.city.clone(),
                peak_demand: rounded(value),
                latitude: city.latitude,
                longitude: city.longitude,
                country: city.country.clone(),
                prediction_source: source,
                data_source: DataSource::Live,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FallbackConfig;
    use crate::domain::CityReference;

    fn server() -> PredictionServer {
        PredictionServer::new(FallbackEstimator::new(&FallbackConfig {
            base: 200.0,
            slope: 15.0,
            noise_std: 0.0,
            seed: None,
        }))
    }

    fn record(entity: &str, temperature: Option<f64>) -> ForecastRecord {
        ForecastRecord {
            entity: entity.to_string(),
            timestamp: Some("2022-06-01 12:00:00".to_string()),
            temperature,
            humidity: Some(50.0),
            wind_speed: Some(1.0),
            visibility: Some(1000.0),
        }
    }

    fn reference() -> ReferenceTable {
        ReferenceTable::new(vec![CityReference {
            city: "New York".into(),
            city_ascii: "New York".into(),
            country: "United States".into(),
            latitude: 40.6943,
            longitude: -73.9249,
            population: Some(18_832_416.0),
        }])
    }

    fn prediction(entity: &str, value: f64, source: PredictionSource) -> RecordPrediction {
        RecordPrediction {
            entity: entity.into(),
            timestamp: None,
            value,
            source,
        }
    }

    #[test]
    fn test_peak_source_follows_peak_record() {
        let records = vec![
            prediction("Paris", 120.4, PredictionSource::Model),
            prediction("Paris", 310.6, PredictionSource::Fallback),
            prediction("Paris", 200.0, PredictionSource::Model),
            prediction("Lyon", 80.0, PredictionSource::Model),
        ];
        let peaks = aggregate_peaks(&records, &EntityAliasTable::default());
        assert_eq!(peaks.len(), 2);
        assert_eq!(peaks[1].entity, "Paris");
        assert_eq!(peaks[1].peak_demand, 311);
        assert_eq!(peaks[1].prediction_source, PredictionSource::Fallback);
    }

    #[test]
    fn test_aliases_merge_before_aggregation() {
        let aliases = EntityAliasTable::new(BTreeMap::from([("New York City".to_string(), "New York".to_string())]));
        let records = vec![
            prediction("New York City", 500.0, PredictionSource::Model),
            prediction("New York", 450.0, PredictionSource::Model),
        ];
        let peaks = aggregate_peaks(&records, &aliases);
        assert_eq!(peaks.len(), 1);
        assert_eq!(peaks[0].peak_demand, 500);
    }

    #[test]
    fn test_unresolved_entities_dropped() {
        let batch = ForecastBatch {
            version: "v".into(),
            records: vec![record("New York", Some(20.0)), record("Atlantis", Some(30.0))],
        };
        let out = server().predict(&batch, None, &EntityAliasTable::default(), Some(&reference()));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].entity, "New York");
        assert_eq!(out[0].peak_demand, 500);
        assert_eq!(out[0].data_source, DataSource::Live);
        assert_eq!(out[0].prediction_source, PredictionSource::Fallback);
    }

    #[test]
    fn test_spellings_of_one_city_share_a_peak() {
        let table = ReferenceTable::new(vec![CityReference {
            city: "São Paulo".into(),
            city_ascii: "Sao Paulo".into(),
            country: "Brazil".into(),
            latitude: -23.5504,
            longitude: -46.6339,
            population: None,
        }]);
        let batch = ForecastBatch {
            version: "v".into(),
            records: vec![
                record("Sao Paulo", Some(10.0)),
                record("São Paulo", Some(20.0)),
                record("SAO PAULO", Some(15.0)),
            ],
        };
        let out = server().predict(&batch, None, &EntityAliasTable::default(), Some(&table));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].entity, "São Paulo");
        assert_eq!(out[0].peak_demand, 500);
        assert_eq!(out[0].country, "Brazil");
    }

    #[test]
    fn test_output_uses_reference_spelling() {
        let batch = ForecastBatch {
            version: "v".into(),
            records: vec![record("new york", Some(10.0))],
        };
        let out = server().predict(&batch, None, &EntityAliasTable::default(), Some(&reference()));
        assert_eq!(out[0].entity, "New York");
        assert_eq!(out[0].data_source, DataSource::Live);
    }

    #[test]
    fn test_missing_temperature_skipped() {
        assert!(server().predict_record(&record("Paris", None), None).is_none());
    }

    #[test]
    fn test_country_filter() {
        let batch = ForecastBatch {
            version: "v".into(),
            records: vec![record("New York", Some(20.0))],
        };
        let s = server();
        let aliases = EntityAliasTable::default();
        let us = s.query(&batch, None, &aliases, Some(&reference()), Some("united states"));
        assert_eq!(us.len(), 1);
        let none = s.query(&batch, None, &aliases, Some(&reference()), Some("Mars"));
        assert_eq!(none, us);
    }
}
