//! Regression candidates
//!
//! Every candidate predicts hourly rented-bike counts from a transformed
//! [`FeatureVector`]. [`TrainedModel`] is the closed set the registry knows
//! how to persist.

use super::{FeatureVector, ModelError, ModelMetadata, ModelType, Prediction};
use serde::{Deserialize, Serialize};

/// Trait for regression models
pub trait RegressionModel: Send + Sync {
    /// Predict a value from features
    fn predict(&self, features: &FeatureVector) -> Result<Prediction, ModelError>;

    /// Get model metadata
    fn metadata(&self) -> &ModelMetadata;

    /// Number of features the model consumes.
    fn input_width(&self) -> usize {
        self.metadata().feature_names.len()
    }

    /// Get model type
    fn model_type(&self) -> ModelType {
        self.metadata().model_type
    }
}

fn check_width(expected: usize, features: &FeatureVector) -> Result<(), ModelError> {
    if features.len() != expected {
        return Err(ModelError::FeatureCount {
            expected,
            found: features.len(),
        });
    }
    Ok(())
}

/// Linear regression fit by batch gradient descent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LinearRegressionModel {
    pub metadata: ModelMetadata,
    pub coefficients: Vec<f64>,
    pub intercept: f64,
}

impl LinearRegressionModel {
    pub fn new(coefficients: Vec<f64>, intercept: f64, metadata: ModelMetadata) -> Self {
        Self {
            metadata,
            coefficients,
            intercept,
        }
    }

    pub fn raw_predict(&self, features: &[f64]) -> f64 {
        features
            .iter()
            .zip(self.coefficients.iter())
            .map(|(f, c)| f * c)
            .sum::<f64>()
            + self.intercept
    }
}

impl RegressionModel for LinearRegressionModel {
    fn predict(&self, features: &FeatureVector) -> Result<Prediction, ModelError> {
        check_width(self.coefficients.len(), features)?;
        Prediction::new(self.raw_predict(&features.features))
    }

    fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    fn input_width(&self) -> usize {
        self.coefficients.len()
    }
}

/// Predicts the training mean for every row. The floor every other
/// candidate has to beat.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MeanBaselineModel {
    pub metadata: ModelMetadata,
    pub mean: f64,
}

impl RegressionModel for MeanBaselineModel {
    fn predict(&self, features: &FeatureVector) -> Result<Prediction, ModelError> {
        check_width(self.metadata.feature_names.len(), features)?;
        Prediction::new(self.mean)
    }

    fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }
}

/// Any model the registry can persist.
#[derive(Debug, Serialize, Deserialize)]
pub enum TrainedModel {
    LinearRegression(LinearRegressionModel),
    MeanBaseline(MeanBaselineModel),
    #[cfg(feature = "ml")]
    RandomForest(super::smartcore::SmartcoreRandomForest),
}

impl TrainedModel {
    fn inner(&self) -> &dyn RegressionModel {
        match self {
            TrainedModel::LinearRegression(m) => m,
            TrainedModel::MeanBaseline(m) => m,
            #[cfg(feature = "ml")]
            TrainedModel::RandomForest(m) => m,
        }
    }

    /// Candidate name used for the artifact file and comparison row.
    pub fn name(&self) -> String {
        self.model_type().to_string()
    }
}

impl RegressionModel for TrainedModel {
    fn predict(&self, features: &FeatureVector) -> Result<Prediction, ModelError> {
        self.inner().predict(features)
    }

    fn metadata(&self) -> &ModelMetadata {
        self.inner().metadata()
    }

    fn input_width(&self) -> usize {
        self.inner().input_width()
    }
}

impl From<LinearRegressionModel> for TrainedModel {
    fn from(model: LinearRegressionModel) -> Self {
        TrainedModel::LinearRegression(model)
    }
}

impl From<MeanBaselineModel> for TrainedModel {
    fn from(model: MeanBaselineModel) -> Self {
        TrainedModel::MeanBaseline(model)
    }
}
