//! Artifact catalog shared by the stages of one run.

use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::dataset::{DatasetError, Table};
use crate::storage::ArtifactHandle;

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("artifact '{0}' has not been published")]
    Missing(String),

    #[error("artifact '{0}' is not tabular")]
    NotTabular(String),

    #[error(transparent)]
    Dataset(#[from] DatasetError),
}

/// Published handles plus a cache of tables already read from them.
///
/// Handles are inserted by the orchestrator only; a stage can read the
/// catalog but publishes by returning a [`StageOutput`].
#[derive(Debug, Default)]
pub struct ArtifactCatalog {
    handles: RwLock<BTreeMap<String, ArtifactHandle>>,
    cache: Mutex<HashMap<String, Arc<Table>>>,
}

impl ArtifactCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, stage_id: &str, mut handle: ArtifactHandle) -> String {
        handle.produced_by = Some(stage_id.to_string());
        let name = handle.name.clone();
        tracing::debug!(artifact = %name, path = %handle.path.display(), stage = stage_id, "artifact published");
        self.handles.write().insert(name.clone(), handle);
        name
    }

    pub fn get(&self, name: &str) -> Option<ArtifactHandle> {
        self.handles.read().get(name).cloned()
    }

    pub fn require(&self, name: &str) -> Result<ArtifactHandle, ArtifactError> {
        self.get(name).ok_or_else(|| ArtifactError::Missing(name.to_string()))
    }

    pub fn names(&self) -> Vec<String> {
        self.handles.read().keys().cloned().collect()
    }

    /// Reads the table behind a tabular handle, validating it against the
    /// handle's declared schema. Served from cache after the first read.
    pub fn load_table(&self, name: &str) -> Result<Arc<Table>, ArtifactError> {
        if let Some(table) = self.cache.lock().get(name) {
            return Ok(Arc::clone(table));
        }

        let handle = self.require(name)?;
        let schema = handle
            .schema
            .as_ref()
            .ok_or_else(|| ArtifactError::NotTabular(name.to_string()))?;
        let table = Arc::new(Table::read_with_schema(&handle.path, schema)?);
        self.cache.lock().insert(name.to_string(), Arc::clone(&table));
        Ok(table)
    }

    pub fn cached_tables(&self) -> usize {
        self.cache.lock().len()
    }

    /// Drops every cached table; returns the approximate bytes released.
    pub fn reclaim(&self) -> usize {
        let drained: Vec<Arc<Table>> = self.cache.lock().drain().map(|(_, t)| t).collect();
        drained.iter().map(|t| t.approx_bytes()).sum()
    }
}

/// What a stage handler receives.
#[derive(Debug, Clone)]
pub struct StageContext {
    pub stage_id: String,
    pub catalog: Arc<ArtifactCatalog>,
    pub config: Arc<Config>,
    /// Fired when the stage times out. Long loops should poll it.
    pub cancel: CancellationToken,
}

impl StageContext {
    pub fn ensure_active(&self) -> anyhow::Result<()> {
        if self.cancel.is_cancelled() {
            anyhow::bail!("stage '{}' was cancelled", self.stage_id);
        }
        Ok(())
    }
}

/// Handles a stage wants published once it returns successfully.
#[derive(Debug, Clone, Default)]
pub struct StageOutput {
    pub handles: Vec<ArtifactHandle>,
}

impl StageOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, handle: ArtifactHandle) -> Self {
        self.handles.push(handle);
        self
    }

    pub fn push(&mut self, handle: ArtifactHandle) {
        self.handles.push(handle);
    }
}
