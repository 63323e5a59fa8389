//! Model registry
//!
//! A trained model is only servable together with the transformer state it
//! was fit against, so both are written as one bincode artifact and checked
//! against each other on load. The registry also keeps the ranked comparison
//! table of every candidate trained in a run.

use bincode::Options;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use strum::{Display, EnumString};
use thiserror::Error;

use super::models::{RegressionModel, TrainedModel};
use super::ModelMetadata;
use crate::features::TransformerState;
use crate::storage::{write_atomic, ArtifactHandle, ArtifactKind};

pub const ARTIFACT_FORMAT_VERSION: u32 = 1;
pub const BEST_MODEL_FILE: &str = "best_model.bin";
pub const COMPARISON_FILE: &str = "model_comparison.csv";

const MAX_ARTIFACT_BYTES: u64 = 512 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("model artifact not found: {0}")]
    ArtifactNotFound(PathBuf),

    #[error("model artifact {path} is corrupt: {reason}")]
    ArtifactCorrupt { path: PathBuf, reason: String },

    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no servable candidate to select from")]
    NoCandidates,
}

fn codec() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_limit(MAX_ARTIFACT_BYTES)
}

/// One line of the model comparison table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonRow {
    pub model_name: String,
    pub rmse: f64,
    pub r2: f64,
    pub mae: f64,
    pub mape: f64,
    pub training_samples: usize,
}

impl ComparisonRow {
    pub fn from_metadata(model_name: impl Into<String>, metadata: &ModelMetadata) -> Self {
        let m = &metadata.validation_metrics;
        Self {
            model_name: model_name.into(),
            rmse: m.rmse,
            r2: m.r2,
            mae: m.mae,
            mape: m.mape,
            training_samples: metadata.training_samples,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMetric {
    #[default]
    Rmse,
    R2,
    Mae,
}

impl SelectionMetric {
    fn value(&self, row: &ComparisonRow) -> f64 {
        match self {
            SelectionMetric::Rmse => row.rmse,
            SelectionMetric::R2 => row.r2,
            SelectionMetric::Mae => row.mae,
        }
    }

    /// `Less` when `a` is the better row.
    fn compare(&self, a: &ComparisonRow, b: &ComparisonRow) -> Ordering {
        let (a, b) = (self.value(a), self.value(b));
        match self {
            SelectionMetric::R2 => b.total_cmp(&a),
            SelectionMetric::Rmse | SelectionMetric::Mae => a.total_cmp(&b),
        }
    }
}

/// Comparison rows ranked ascending by RMSE.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComparisonTable {
    pub rows: Vec<ComparisonRow>,
}

impl ComparisonTable {
    pub fn new(mut rows: Vec<ComparisonRow>) -> Self {
        rows.sort_by(|a, b| SelectionMetric::Rmse.compare(a, b));
        Self { rows }
    }

    pub fn to_csv_bytes(&self) -> Result<Vec<u8>, csv::Error> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        for row in &self.rows {
            writer.serialize(row)?;
        }
        writer
            .into_inner()
            .map_err(|e| csv::Error::from(e.into_error()))
    }

    pub fn from_csv_reader<R: std::io::Read>(reader: R) -> Result<Self, csv::Error> {
        let rows = csv::Reader::from_reader(reader)
            .deserialize()
            .collect::<Result<Vec<ComparisonRow>, _>>()?;
        Ok(Self::new(rows))
    }
}

/// A model together with its frozen transformer state.
#[derive(Debug, Serialize, Deserialize)]
pub struct TrainedModelArtifact {
    pub format_version: u32,
    pub model: TrainedModel,
    pub transformer: TransformerState,
    pub metrics: ComparisonRow,
}

#[derive(Serialize)]
struct ArtifactRef<'a> {
    format_version: u32,
    model: &'a TrainedModel,
    transformer: &'a TransformerState,
    metrics: &'a ComparisonRow,
}

impl TrainedModelArtifact {
    /// Structural compatibility of the two halves.
    pub fn validate(&self) -> Result<(), String> {
        if self.format_version != ARTIFACT_FORMAT_VERSION {
            return Err(format!(
                "format version {} (expected {ARTIFACT_FORMAT_VERSION})",
                self.format_version
            ));
        }
        self.transformer.validate().map_err(|e| e.to_string())?;
        if self.model.input_width() != self.transformer.feature_count() {
            return Err(format!(
                "model consumes {} features, transformer produces {}",
                self.model.input_width(),
                self.transformer.feature_count()
            ));
        }
        self.transformer
            .validate_feature_names(&self.model.metadata().feature_names)
            .map_err(|e| e.to_string())
    }

    pub fn load(path: &Path) -> Result<Self, RegistryError> {
        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(RegistryError::ArtifactNotFound(path.to_path_buf()))
            }
            Err(source) => {
                return Err(RegistryError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        let corrupt = |reason: String| RegistryError::ArtifactCorrupt {
            path: path.to_path_buf(),
            reason,
        };

        let artifact: TrainedModelArtifact = codec().deserialize(&bytes).map_err(|e| corrupt(e.to_string()))?;
        artifact.validate().map_err(corrupt)?;
        Ok(artifact)
    }
}

/// A saved candidate and its metrics row, as offered to [`ModelRegistry::select_best`].
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub handle: ArtifactHandle,
    pub metrics: ComparisonRow,
}

/// Registry rooted at the models directory.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    root: PathBuf,
}

impl ModelRegistry {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn artifact_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.bin"))
    }

    pub fn best_model_path(&self) -> PathBuf {
        self.root.join(BEST_MODEL_FILE)
    }

    pub fn comparison_path(&self) -> PathBuf {
        self.root.join(COMPARISON_FILE)
    }

    fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> RegistryError + '_ {
        move |source| RegistryError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Writes `<root>/<name>.bin` atomically.
    pub fn save(
        &self,
        name: &str,
        model: &TrainedModel,
        state: &TransformerState,
        metrics: &ComparisonRow,
    ) -> Result<ArtifactHandle, RegistryError> {
        let path = self.artifact_path(name);
        let bytes = codec()
            .serialize(&ArtifactRef {
                format_version: ARTIFACT_FORMAT_VERSION,
                model,
                transformer: state,
                metrics,
            })
            .map_err(|e| RegistryError::ArtifactCorrupt {
                path: path.clone(),
                reason: format!("failed to encode: {e}"),
            })?;
        write_atomic(&path, &bytes).map_err(Self::io_err(&path))?;

        tracing::info!(model = name, path = %path.display(), bytes = bytes.len(), "model artifact saved");
        Ok(ArtifactHandle::new(format!("models/{name}"), ArtifactKind::Model, path))
    }

    pub fn load(&self, handle: &ArtifactHandle) -> Result<TrainedModelArtifact, RegistryError> {
        TrainedModelArtifact::load(&handle.path)
    }

    /// Best candidate by `metric`; candidates with a non-finite metric are skipped.
    pub fn select_best(candidates: &[Candidate], metric: SelectionMetric) -> Result<ArtifactHandle, RegistryError> {
        candidates
            .iter()
            .filter(|c| metric.value(&c.metrics).is_finite())
            .min_by(|a, b| metric.compare(&a.metrics, &b.metrics))
            .map(|c| c.handle.clone())
            .ok_or(RegistryError::NoCandidates)
    }

    /// Copies the chosen artifact to `best_model.bin`.
    pub fn promote(&self, handle: &ArtifactHandle) -> Result<ArtifactHandle, RegistryError> {
        let bytes = std::fs::read(&handle.path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => RegistryError::ArtifactNotFound(handle.path.clone()),
            _ => RegistryError::Io {
                path: handle.path.clone(),
                source: e,
            },
        })?;
        let best = self.best_model_path();
        write_atomic(&best, &bytes).map_err(Self::io_err(&best))?;
        tracing::info!(from = %handle.path.display(), "best model promoted");
        Ok(ArtifactHandle::new("models/best_model", ArtifactKind::Model, best))
    }

    pub fn write_comparison(&self, table: &ComparisonTable) -> Result<ArtifactHandle, RegistryError> {
        let path = self.comparison_path();
        let bytes = table.to_csv_bytes().map_err(|e| RegistryError::Io {
            path: path.clone(),
            source: std::io::Error::new(std::io::ErrorKind::Other, e),
        })?;
        write_atomic(&path, &bytes).map_err(Self::io_err(&path))?;
        Ok(ArtifactHandle::new(
            "models/model_comparison",
            ArtifactKind::ComparisonTable,
            path,
        ))
    }

    pub fn load_comparison(&self) -> Result<ComparisonTable, RegistryError> {
        let path = self.comparison_path();
        let file = std::fs::File::open(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => RegistryError::ArtifactNotFound(path.clone()),
            _ => RegistryError::Io {
                path: path.clone(),
                source: e,
            },
        })?;
        ComparisonTable::from_csv_reader(file).map_err(|e| RegistryError::ArtifactCorrupt {
            path: path.clone(),
            reason: e.to_string(),
        })
    }
}
