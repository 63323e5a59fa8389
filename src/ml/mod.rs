//! Demand regression.
//!
//! Regression candidates for hourly bike demand, their training loop, and the
//! registry that persists a trained model together with the transformer state
//! it was fit against.
//!
//! Layout:
//! - `models`: the [`models::RegressionModel`] trait and concrete candidates
//! - `training`: dataset split, metrics, gradient descent, learning-rate search
//! - `registry`: atomic artifacts, comparison table, best-model selection
//! - `smartcore`: random forest candidate (feature `ml`)

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use thiserror::Error;

pub mod models;
pub mod registry;
pub mod training;

#[cfg(feature = "ml")]
pub mod smartcore;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("feature count mismatch: model expects {expected}, got {found}")]
    FeatureCount { expected: usize, found: usize },

    #[error("model produced a non-finite prediction")]
    NonFinite,

    #[error("training failed: {0}")]
    Training(String),

    #[error("inference failed: {0}")]
    Inference(String),
}

/// Candidate family, also the registry key.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ModelType {
    LinearRegression,
    MeanBaseline,
    RandomForest,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelMetadata {
    pub model_id: String,
    pub model_type: ModelType,
    pub trained_at: chrono::DateTime<chrono::Utc>,
    pub training_samples: usize,
    pub validation_metrics: ValidationMetrics,
    pub feature_names: Vec<String>,
    /// Hyperparameters worth reporting, e.g. the selected learning rate.
    #[serde(default)]
    pub hyperparameters: Vec<(String, f64)>,
}

/// Scored on the held-out tail of the chronological split.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct ValidationMetrics {
    pub mae: f64,
    pub rmse: f64,
    /// Percent, over non-zero targets only.
    pub mape: f64,
    pub r2: f64,
}

impl ValidationMetrics {
    pub fn new(mae: f64, rmse: f64, mape: f64, r2: f64) -> Self {
        Self { mae, rmse, mape, r2 }
    }

    pub fn is_finite(&self) -> bool {
        self.mae.is_finite() && self.rmse.is_finite() && self.mape.is_finite() && self.r2.is_finite()
    }
}

/// Named, ordered model inputs produced by the feature transformer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeatureVector {
    pub features: Vec<f64>,
    pub feature_names: Vec<String>,
}

impl FeatureVector {
    pub fn new(features: Vec<f64>, feature_names: Vec<String>) -> Result<Self, ModelError> {
        if features.len() != feature_names.len() {
            return Err(ModelError::FeatureCount {
                expected: feature_names.len(),
                found: features.len(),
            });
        }
        Ok(Self {
            features,
            feature_names,
        })
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Prediction {
    pub value: f64,
}

impl Prediction {
    pub fn new(value: f64) -> Result<Self, ModelError> {
        if !value.is_finite() {
            return Err(ModelError::NonFinite);
        }
        Ok(Self { value })
    }
}
