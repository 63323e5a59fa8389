//! SmartCore random forest candidate
//!
//! The fitted forest is kept as bincode bytes inside the artifact and
//! rebuilt lazily on first prediction, so loading a registry artifact never
//! pays for trees that are not used.

use super::models::RegressionModel;
use super::training::{ModelTrainer, TrainingDataset};
use super::{FeatureVector, ModelError, ModelMetadata, ModelType, Prediction, ValidationMetrics};
use anyhow::Result;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use smartcore::ensemble::random_forest_regressor::{RandomForestRegressor, RandomForestRegressorParameters};
use smartcore::linalg::basic::matrix::DenseMatrix;

type Forest = RandomForestRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>>;

#[derive(Debug, Serialize, Deserialize)]
pub struct SmartcoreRandomForest {
    pub metadata: ModelMetadata,
    model_bytes: Vec<u8>,
    #[serde(skip)]
    model: OnceCell<Forest>,
    pub n_trees: usize,
    pub max_depth: Option<u16>,
}

impl SmartcoreRandomForest {
    /// 50 trees of depth at most 12; fits a year of hourly rows in seconds.
    pub fn default_parameters(seed: u64) -> RandomForestRegressorParameters {
        RandomForestRegressorParameters {
            max_depth: Some(12),
            min_samples_leaf: 2,
            min_samples_split: 5,
            n_trees: 50,
            m: None,
            keep_samples: false,
            seed,
        }
    }

    fn to_matrix(rows: &[FeatureVector]) -> Result<DenseMatrix<f64>> {
        let n_features = rows.first().map(FeatureVector::len).unwrap_or(0);
        let mut flat = Vec::with_capacity(rows.len() * n_features);
        for row in rows {
            if row.len() != n_features {
                anyhow::bail!("All feature vectors must have the same length");
            }
            flat.extend_from_slice(&row.features);
        }
        Ok(DenseMatrix::new(rows.len(), n_features, flat, false))
    }

    pub fn train(
        train: &TrainingDataset,
        validation: &TrainingDataset,
        params: RandomForestRegressorParameters,
    ) -> Result<Self> {
        if train.is_empty() {
            anyhow::bail!("Cannot train on empty dataset");
        }

        let n_trees = params.n_trees;
        let max_depth = params.max_depth;

        let x = Self::to_matrix(&train.features)?;
        let forest = Forest::fit(&x, &train.targets, params)
            .map_err(|e| anyhow::anyhow!("RandomForest training failed: {e:?}"))?;
        let model_bytes = bincode::serialize(&forest)
            .map_err(|e| anyhow::anyhow!("Failed to serialize model: {e}"))?;

        let mut model = Self {
            metadata: ModelMetadata {
                model_id: format!("random_forest_{}", uuid::Uuid::new_v4()),
                model_type: ModelType::RandomForest,
                trained_at: chrono::Utc::now(),
                training_samples: train.len(),
                validation_metrics: ValidationMetrics::default(),
                feature_names: train.feature_names(),
                hyperparameters: vec![
                    ("n_trees".to_string(), n_trees as f64),
                    ("max_depth".to_string(), max_depth.map_or(f64::INFINITY, f64::from)),
                ],
            },
            model_bytes,
            model: OnceCell::with_value(forest),
            n_trees,
            max_depth,
        };

        model.metadata.validation_metrics = ModelTrainer::evaluate(&model, validation)?;
        Ok(model)
    }

    fn forest(&self) -> Result<&Forest, ModelError> {
        self.model.get_or_try_init(|| {
            bincode::deserialize(&self.model_bytes)
                .map_err(|e| ModelError::Inference(format!("failed to restore forest: {e}")))
        })
    }
}

impl RegressionModel for SmartcoreRandomForest {
    fn predict(&self, features: &FeatureVector) -> Result<Prediction, ModelError> {
        let expected = self.metadata.feature_names.len();
        if features.len() != expected {
            return Err(ModelError::FeatureCount {
                expected,
                found: features.len(),
            });
        }

        let x = DenseMatrix::new(1, features.len(), features.features.clone(), false);
        let predictions = self
            .forest()?
            .predict(&x)
            .map_err(|e| ModelError::Inference(format!("{e:?}")))?;

        let value = predictions
            .first()
            .copied()
            .ok_or_else(|| ModelError::Inference("model returned empty predictions".to_string()))?;
        Prediction::new(value)
    }

    fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }
}
