use std::path::Path;
use std::sync::Arc;

use crate::config::Config;
use crate::dataset::{read_bytes, DatasetError, Table};
use crate::domain::{content_version, EntityAliasTable, ForecastBatch, ReferenceTable};
use crate::ml::registry::{ModelRegistry, TrainedModelArtifact};
use crate::serving::{FallbackEstimator, GeoPrediction, PredictionCache, PredictionServer, QueryKey};

/// Version reported when the forecast or reference file cannot be read.
pub const UNAVAILABLE_BATCH_VERSION: &str = "unavailable";

/// Shared, read-only serving state. The model artifact is loaded once at
/// construction; a missing or corrupt artifact leaves serving on the
/// fallback estimator.
#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub server: Arc<PredictionServer>,
    pub artifact: Option<Arc<TrainedModelArtifact>>,
    pub artifact_error: Option<String>,
    pub aliases: Arc<EntityAliasTable>,
    pub registry: ModelRegistry,
    pub cache: Arc<PredictionCache>,
}

/// Result of one prediction query.
#[derive(Debug, Clone)]
pub struct PredictionSet {
    pub batch_version: String,
    pub predictions: Arc<Vec<GeoPrediction>>,
}

impl AppState {
    pub fn new(cfg: Config) -> Self {
        let (artifact, artifact_error) = match TrainedModelArtifact::load(&cfg.serving.model_artifact) {
            Ok(artifact) => {
                tracing::info!(
                    path = %cfg.serving.model_artifact.display(),
                    model = %artifact.metrics.model_name,
                    rmse = artifact.metrics.rmse,
                    "model artifact loaded"
                );
                (Some(Arc::new(artifact)), None)
            }
            Err(e) => {
                tracing::warn!(error = %e, "model artifact unavailable, serving fallback estimates");
                (None, Some(e.to_string()))
            }
        };

        Self {
            server: Arc::new(PredictionServer::new(FallbackEstimator::new(&cfg.serving.fallback))),
            aliases: Arc::new(EntityAliasTable::from(&cfg.serving.aliases)),
            registry: ModelRegistry::new(&cfg.paths.models_dir),
            cache: Arc::new(PredictionCache::new()),
            artifact,
            artifact_error,
            cfg: Arc::new(cfg),
        }
    }

    fn load_batch(path: &Path) -> ForecastBatch {
        ForecastBatch::load(path).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "forecast batch unavailable");
            ForecastBatch {
                version: UNAVAILABLE_BATCH_VERSION.to_string(),
                records: Vec::new(),
            }
        })
    }

    fn parse_reference(bytes: &[u8], path: &Path) -> Result<ReferenceTable, DatasetError> {
        ReferenceTable::from_table(&Table::parse_csv(bytes, path)?)
    }

    fn compute(&self, country: Option<&str>) -> PredictionSet {
        let serving = &self.cfg.serving;
        let batch = Self::load_batch(&serving.forecast_dataset);
        let reference_bytes = read_bytes(&serving.reference_dataset);
        let reference_version = match &reference_bytes {
            Ok(bytes) => content_version(bytes),
            Err(_) => UNAVAILABLE_BATCH_VERSION.to_string(),
        };
        let key = QueryKey::new(batch.version.clone(), reference_version, country);

        let predictions = self.cache.get_or_compute(key, || {
            let reference = reference_bytes
                .and_then(|bytes| Self::parse_reference(&bytes, &serving.reference_dataset))
                .map_err(|e| tracing::warn!(error = %e, "reference table unavailable"))
                .ok();
            self.server.query(
                &batch,
                self.artifact.as_deref(),
                &self.aliases,
                reference.as_ref(),
                country,
            )
        });

        PredictionSet {
            batch_version: batch.version,
            predictions,
        }
    }

    /// Peak-demand rows for the current forecast batch, memoized per
    /// (batch version, reference version, country).
    pub async fn predictions(&self, country: Option<String>) -> PredictionSet {
        let state = self.clone();
        let worker_country = country.clone();
        match tokio::task::spawn_blocking(move || state.compute(worker_country.as_deref())).await {
            Ok(set) => set,
            Err(e) => {
                tracing::error!(error = %e, "prediction worker failed, serving sample");
                PredictionSet {
                    batch_version: UNAVAILABLE_BATCH_VERSION.to_string(),
                    predictions: Arc::new(self.server.fallback().sample()),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serving::DataSource;

    fn config(dir: &Path) -> Config {
        let mut cfg = Config::default();
        cfg.paths.models_dir = dir.join("models");
        cfg.serving.model_artifact = dir.join("models/best_model.bin");
        cfg.serving.forecast_dataset = dir.join("clean/weather_forecast.csv");
        cfg.serving.reference_dataset = dir.join("clean/world_cities.csv");
        cfg.serving.fallback.noise_std = 0.0;
        cfg
    }

    #[tokio::test]
    async fn test_missing_inputs_serve_sample() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::new(config(dir.path()));
        assert!(state.artifact.is_none());
        assert!(state.artifact_error.is_some());

        let set = state.predictions(None).await;
        assert_eq!(set.batch_version, UNAVAILABLE_BATCH_VERSION);
        assert!(!set.predictions.is_empty());
        assert!(set.predictions.iter().all(|p| p.data_source == DataSource::Sample));
    }

    #[tokio::test]
    async fn test_live_predictions_are_memoized() {
        let dir = tempfile::tempdir().unwrap();
        let clean = dir.path().join("clean");
        std::fs::create_dir_all(&clean).unwrap();
        std::fs::write(
            clean.join("weather_forecast.csv"),
            "city,weather,visibility,temp,temp_min,temp_max,pressure,humidity,wind_speed,wind_deg,forecast_datetime\n\
             Seoul,Clear,10000,20,19,21,1012,55,2.1,180,2022-06-01 12:00:00\n",
        )
        .unwrap();
        std::fs::write(
            clean.join("world_cities.csv"),
            "city,city_ascii,lat,lng,country,iso2,iso3,population\n\
             Seoul,Seoul,37.56,126.99,\"Korea, South\",KR,KOR,21794000\n",
        )
        .unwrap();

        let state = AppState::new(config(dir.path()));
        let first = state.predictions(Some("Korea, South".into())).await;
        assert_eq!(first.predictions.len(), 1);
        assert_eq!(first.predictions[0].peak_demand, 500);
        assert_eq!(first.predictions[0].data_source, DataSource::Live);

        let second = state.predictions(Some("korea, south".into())).await;
        assert!(Arc::ptr_eq(&first.predictions, &second.predictions));
        assert_eq!(state.cache.len(), 1);
    }

    #[tokio::test]
    async fn test_restored_reference_serves_live_rows() {
        let dir = tempfile::tempdir().unwrap();
        let clean = dir.path().join("clean");
        std::fs::create_dir_all(&clean).unwrap();
        std::fs::write(
            clean.join("weather_forecast.csv"),
            "city,weather,visibility,temp,temp_min,temp_max,pressure,humidity,wind_speed,wind_deg,forecast_datetime\n\
             Seoul,Clear,10000,20,19,21,1012,55,2.1,180,2022-06-01 12:00:00\n",
        )
        .unwrap();

        let state = AppState::new(config(dir.path()));
        let degraded = state.predictions(None).await;
        assert!(degraded.predictions.iter().all(|p| p.data_source == DataSource::Sample));

        std::fs::write(
            clean.join("world_cities.csv"),
            "city,city_ascii,lat,lng,country,iso2,iso3,population\n\
             Seoul,Seoul,37.56,126.99,\"Korea, South\",KR,KOR,21794000\n",
        )
        .unwrap();

        let restored = state.predictions(None).await;
        assert_eq!(restored.batch_version, degraded.batch_version);
        assert_eq!(restored.predictions.len(), 1);
        assert_eq!(restored.predictions[0].entity, "Seoul");
        assert_eq!(restored.predictions[0].data_source, DataSource::Live);
    }
}
