//! Fitting demand regressors
//!
//! Offline training of the regression candidates. Validation always uses the
//! tail of the dataset so metrics describe how the model does on later hours
//! than it was fit on.

use super::models::{LinearRegressionModel, MeanBaselineModel, RegressionModel};
use super::{FeatureVector, ModelMetadata, ModelType, ValidationMetrics};
use anyhow::{Context, Result};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainingDataset {
    pub features: Vec<FeatureVector>,
    pub targets: Vec<f64>,
}

impl TrainingDataset {
    pub fn new(features: Vec<FeatureVector>, targets: Vec<f64>) -> Result<Self> {
        if features.len() != targets.len() {
            anyhow::bail!(
                "Feature and target count mismatch: {} features, {} targets",
                features.len(),
                targets.len()
            );
        }
        Ok(Self { features, targets })
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn feature_names(&self) -> Vec<String> {
        self.features
            .first()
            .map(|f| f.feature_names.clone())
            .unwrap_or_default()
    }

    /// Chronological split: the first `1 - validation_ratio` of rows train,
    /// the rest validate. Both halves are non-empty.
    pub fn split(&self, validation_ratio: f64) -> Result<(TrainingDataset, TrainingDataset)> {
        if validation_ratio <= 0.0 || validation_ratio >= 1.0 {
            anyhow::bail!("Validation ratio must be between 0 and 1");
        }
        if self.len() < 2 {
            anyhow::bail!("Need at least 2 rows to split, got {}", self.len());
        }

        let split_idx = ((self.len() as f64 * (1.0 - validation_ratio)).floor() as usize).clamp(1, self.len() - 1);

        let train = TrainingDataset {
            features: self.features[..split_idx].to_vec(),
            targets: self.targets[..split_idx].to_vec(),
        };

        let val = TrainingDataset {
            features: self.features[split_idx..].to_vec(),
            targets: self.targets[split_idx..].to_vec(),
        };

        Ok((train, val))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub learning_rate: f64,
    pub max_iterations: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.01,
            max_iterations: 1000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ModelTrainer {
    config: TrainingConfig,
}

impl ModelTrainer {
    pub fn new(config: TrainingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// MAE, RMSE, MAPE (over non-zero targets) and R².
    pub fn calculate_metrics(predictions: &[f64], targets: &[f64]) -> Result<ValidationMetrics> {
        if predictions.len() != targets.len() {
            anyhow::bail!("Prediction and target count mismatch");
        }

        if predictions.is_empty() {
            anyhow::bail!("No predictions to evaluate");
        }

        let n = predictions.len() as f64;
        let pairs = || predictions.iter().zip(targets.iter());

        let mae: f64 = pairs().map(|(p, t)| (p - t).abs()).sum::<f64>() / n;

        let mse: f64 = pairs().map(|(p, t)| (p - t).powi(2)).sum::<f64>() / n;
        let rmse = mse.sqrt();

        // Zero-rental hours have no defined percentage error.
        let (ape_sum, ape_count) = pairs()
            .filter(|(_, t)| t.abs() > 1e-10)
            .fold((0.0, 0usize), |(sum, count), (p, t)| (sum + ((p - t) / t).abs() * 100.0, count + 1));
        let mape = if ape_count == 0 { 0.0 } else { ape_sum / ape_count as f64 };

        let mean_target: f64 = targets.iter().sum::<f64>() / n;
        let ss_tot: f64 = targets.iter().map(|t| (t - mean_target).powi(2)).sum();
        let ss_res: f64 = pairs().map(|(p, t)| (t - p).powi(2)).sum();

        let r2 = if ss_tot.abs() < 1e-10 {
            0.0
        } else {
            1.0 - (ss_res / ss_tot)
        };

        Ok(ValidationMetrics::new(mae, rmse, mape, r2))
    }

    /// Metrics of any model over a dataset.
    pub fn evaluate(model: &dyn RegressionModel, dataset: &TrainingDataset) -> Result<ValidationMetrics> {
        let predictions = dataset
            .features
            .iter()
            .map(|f| model.predict(f).map(|p| p.value))
            .collect::<Result<Vec<_>, _>>()
            .context("evaluation failed")?;
        Self::calculate_metrics(&predictions, &dataset.targets)
    }

    /// Batch gradient descent on `train`, metrics on `validation`.
    pub fn train_linear_regression(
        &self,
        train: &TrainingDataset,
        validation: &TrainingDataset,
    ) -> Result<LinearRegressionModel> {
        if train.is_empty() {
            anyhow::bail!("Cannot train on empty dataset");
        }

        let n_features = train.features[0].len();
        let n = train.len() as f64;
        let lr = self.config.learning_rate;

        let mut coefficients = vec![0.0; n_features];
        let mut intercept = 0.0;

        for _iter in 0..self.config.max_iterations {
            let mut coef_gradients = vec![0.0; n_features];
            let mut intercept_gradient = 0.0;

            for (features, target) in train.features.iter().zip(train.targets.iter()) {
                let prediction: f64 = features
                    .features
                    .iter()
                    .zip(coefficients.iter())
                    .map(|(f, c)| f * c)
                    .sum::<f64>()
                    + intercept;

                let error = prediction - target;

                for (grad, feature_val) in coef_gradients.iter_mut().zip(features.features.iter()) {
                    *grad += error * feature_val / n;
                }
                intercept_gradient += error / n;
            }

            for (coef, grad) in coefficients.iter_mut().zip(coef_gradients.iter()) {
                *coef -= lr * grad;
            }
            intercept -= lr * intercept_gradient;

            if !intercept.is_finite() {
                anyhow::bail!("gradient descent diverged at learning rate {lr}");
            }
        }

        let mut model = LinearRegressionModel::new(
            coefficients,
            intercept,
            ModelMetadata {
                model_id: format!("linear_regression_{}", uuid::Uuid::new_v4()),
                model_type: ModelType::LinearRegression,
                trained_at: chrono::Utc::now(),
                training_samples: train.len(),
                validation_metrics: ValidationMetrics::default(),
                feature_names: train.feature_names(),
                hyperparameters: vec![
                    ("learning_rate".to_string(), lr),
                    ("max_iterations".to_string(), self.config.max_iterations as f64),
                ],
            },
        );
        model.metadata.validation_metrics = Self::evaluate(&model, validation)?;
        Ok(model)
    }

    pub fn train_mean_baseline(
        train: &TrainingDataset,
        validation: &TrainingDataset,
    ) -> Result<MeanBaselineModel> {
        if train.is_empty() {
            anyhow::bail!("Cannot train on empty dataset");
        }
        let mean = train.targets.iter().sum::<f64>() / train.len() as f64;
        let mut model = MeanBaselineModel {
            metadata: ModelMetadata {
                model_id: format!("mean_baseline_{}", uuid::Uuid::new_v4()),
                model_type: ModelType::MeanBaseline,
                trained_at: chrono::Utc::now(),
                training_samples: train.len(),
                validation_metrics: ValidationMetrics::default(),
                feature_names: train.feature_names(),
                hyperparameters: Vec::new(),
            },
            mean,
        };
        model.metadata.validation_metrics = Self::evaluate(&model, validation)?;
        Ok(model)
    }
}

/// Trains one linear model per learning rate on blocking workers, at most
/// `workers` at a time, and keeps the one with the lowest validation RMSE.
/// Diverged rates are logged and skipped.
pub async fn search_learning_rate(
    train: Arc<TrainingDataset>,
    validation: Arc<TrainingDataset>,
    learning_rates: &[f64],
    max_iterations: usize,
    workers: usize,
) -> Result<LinearRegressionModel> {
    let results: Vec<(f64, Result<LinearRegressionModel>)> = stream::iter(learning_rates.iter().copied())
        .map(|learning_rate| {
            let train = Arc::clone(&train);
            let validation = Arc::clone(&validation);
            async move {
                let trainer = ModelTrainer::new(TrainingConfig {
                    learning_rate,
                    max_iterations,
                });
                let result = tokio::task::spawn_blocking(move || trainer.train_linear_regression(&train, &validation))
                    .await
                    .map_err(anyhow::Error::from)
                    .and_then(|r| r);
                (learning_rate, result)
            }
        })
        .buffer_unordered(workers.max(1))
        .collect()
        .await;

    let mut best: Option<LinearRegressionModel> = None;
    for (learning_rate, result) in results {
        match result {
            Ok(model) if model.metadata.validation_metrics.is_finite() => {
                tracing::debug!(
                    learning_rate,
                    rmse = model.metadata.validation_metrics.rmse,
                    "learning rate evaluated"
                );
                let better = best
                    .as_ref()
                    .map_or(true, |b| model.metadata.validation_metrics.rmse < b.metadata.validation_metrics.rmse);
                if better {
                    best = Some(model);
                }
            }
            Ok(_) => tracing::warn!(learning_rate, "learning rate produced non-finite metrics"),
            Err(e) => tracing::warn!(learning_rate, error = %e, "learning rate discarded"),
        }
    }

    best.ok_or_else(|| anyhow::anyhow!("no learning rate in {learning_rates:?} converged"))
}
