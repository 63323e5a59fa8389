//! Atomic file publication.
//!
//! Every artifact writer goes through [`write_atomic`]: bytes land in a temp
//! file next to the target and are renamed over it only once fully written.
//! A writer that is cancelled or fails midway leaves the previous artifact (or
//! nothing) in place, never a truncated file.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use strum::Display;

use crate::dataset::DatasetSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    RawDataset,
    CleanDataset,
    Report,
    Model,
    ComparisonTable,
}

/// Reference to a published artifact. Only ever created after the bytes are
/// durably in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactHandle {
    pub name: String,
    pub kind: ArtifactKind,
    pub path: PathBuf,
    /// Declared column schema, for tabular artifacts.
    pub schema: Option<DatasetSchema>,
    /// Stage that produced it; stamped by the catalog on publish.
    pub produced_by: Option<String>,
    pub published_at: DateTime<Utc>,
}

impl ArtifactHandle {
    pub fn new(name: impl Into<String>, kind: ArtifactKind, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            kind,
            path: path.into(),
            schema: None,
            produced_by: None,
            published_at: Utc::now(),
        }
    }

    pub fn with_schema(mut self, schema: DatasetSchema) -> Self {
        self.schema = Some(schema);
        self
    }
}

pub fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

pub fn write_json_atomic<T: serde::Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    write_atomic(path, &bytes)?;
    Ok(())
}
