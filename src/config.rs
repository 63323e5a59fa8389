use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use validator::Validate;

use crate::ml::registry::SelectionMetric;

pub const DEFAULT_CONFIG_FILE: &str = "config/default.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub paths: PathsConfig,
    pub pipeline: PipelineConfig,
    pub serving: ServingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ServerConfig {
    #[validate(length(min = 1))]
    pub host: String,
    #[validate(range(min = 1))]
    pub port: u16,
    #[validate(range(min = 1, max = 300))]
    pub request_timeout_secs: u64,
    pub enable_cors: bool,
    pub cors_origin: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            request_timeout_secs: 30,
            enable_cors: false,
            cors_origin: "http://localhost:3000".to_string(),
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }
}

/// Filesystem layout shared by the pipeline stages and the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    pub raw_dir: PathBuf,
    pub clean_dir: PathBuf,
    pub models_dir: PathBuf,
    pub reports_dir: PathBuf,
    pub logs_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            raw_dir: PathBuf::from("data/raw"),
            clean_dir: PathBuf::from("data/clean"),
            models_dir: PathBuf::from("data/models"),
            reports_dir: PathBuf::from("data/reports"),
            logs_dir: PathBuf::from("logs"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub continue_on_error: bool,
    pub stages: Vec<StageConfig>,
    pub training: TrainingSettings,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            continue_on_error: false,
            stages: vec![
                StageConfig::new("collect", "Verify collector outputs against raw dataset contracts", 60, true),
                StageConfig::new("wrangle", "Clean raw datasets into clean dataset contracts", 120, true),
                StageConfig::new("analyze", "Summarize historical demand", 60, false),
                StageConfig::new("visualize", "Build chart-ready demand series", 60, false),
                StageConfig::new("model", "Fit transformer, train candidates, select best model", 900, true),
            ],
            training: TrainingSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct StageConfig {
    #[validate(length(min = 1))]
    pub id: String,
    /// Handler name; defaults to the stage id.
    #[serde(default)]
    pub handler: Option<String>,
    pub description: String,
    #[validate(range(min = 1))]
    pub timeout_secs: u64,
    pub critical: bool,
}

impl StageConfig {
    pub fn new(id: &str, description: &str, timeout_secs: u64, critical: bool) -> Self {
        Self {
            id: id.to_string(),
            handler: None,
            description: description.to_string(),
            timeout_secs,
            critical,
        }
    }

    pub fn handler_name(&self) -> &str {
        self.handler.as_deref().unwrap_or(&self.id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct TrainingSettings {
    #[validate(range(min = 0.05, max = 0.5))]
    pub validation_split: f64,
    #[validate(length(min = 1))]
    pub learning_rates: Vec<f64>,
    #[validate(range(min = 1))]
    pub max_iterations: usize,
    /// Upper bound on concurrent learning-rate search workers.
    #[validate(range(min = 1, max = 64))]
    pub search_workers: usize,
    /// Seeds the random forest candidate.
    pub random_seed: u64,
    pub selection_metric: SelectionMetric,
}

impl Default for TrainingSettings {
    fn default() -> Self {
        Self {
            validation_split: 0.2,
            learning_rates: vec![0.3, 0.1, 0.03, 0.01],
            max_iterations: 1500,
            search_workers: 4,
            random_seed: 42,
            selection_metric: SelectionMetric::Rmse,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServingConfig {
    pub model_artifact: PathBuf,
    pub forecast_dataset: PathBuf,
    pub reference_dataset: PathBuf,
    pub fallback: FallbackConfig,
    /// Forecast-source city name -> reference-dataset city name.
    pub aliases: BTreeMap<String, String>,
    pub default_limit: usize,
}

impl Default for ServingConfig {
    fn default() -> Self {
        let aliases = [
            ("New York City", "New York"),
            ("Suzhou Shi", "Suzhou"),
            ("Greater London", "London"),
            ("Seoul-si", "Seoul"),
        ]
        .into_iter()
        .map(|(from, to)| (from.to_string(), to.to_string()))
        .collect();

        Self {
            model_artifact: PathBuf::from("data/models/best_model.bin"),
            forecast_dataset: PathBuf::from("data/clean/weather_forecast.csv"),
            reference_dataset: PathBuf::from("data/clean/world_cities.csv"),
            fallback: FallbackConfig::default(),
            aliases,
            default_limit: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct FallbackConfig {
    pub base: f64,
    pub slope: f64,
    #[validate(range(min = 0.0))]
    pub noise_std: f64,
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            base: 200.0,
            slope: 15.0,
            noise_std: 25.0,
            seed: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new(DEFAULT_CONFIG_FILE))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let figment = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("BIKE__").split("__"));
        let cfg: Config = figment
            .extract()
            .with_context(|| format!("failed to load configuration from {}", path.display()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        self.server.validate().context("invalid [server] section")?;
        self.pipeline
            .training
            .validate()
            .context("invalid [pipeline.training] section")?;
        for stage in &self.pipeline.stages {
            stage
                .validate()
                .with_context(|| format!("invalid stage '{}'", stage.id))?;
        }
        self.serving
            .fallback
            .validate()
            .context("invalid [serving.fallback] section")?;
        Ok(())
    }
}
