use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use super::GeoPrediction;

/// What a cached prediction set depends on: the content versions of the
/// forecast and reference files, and the country filter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
    pub batch_version: String,
    pub reference_version: String,
    pub country: Option<String>,
}

impl QueryKey {
    pub fn new(
        batch_version: impl Into<String>,
        reference_version: impl Into<String>,
        country: Option<&str>,
    ) -> Self {
        let country = country
            .map(|c| c.trim().to_lowercase())
            .filter(|c| !c.is_empty());
        Self {
            batch_version: batch_version.into(),
            reference_version: reference_version.into(),
            country,
        }
    }

    fn same_inputs(&self, other: &QueryKey) -> bool {
        self.batch_version == other.batch_version && self.reference_version == other.reference_version
    }
}

/// Memoized prediction sets. Only entries for the newest input versions are
/// kept; a change to either file evicts everything older.
#[derive(Debug, Default)]
pub struct PredictionCache {
    entries: Mutex<HashMap<QueryKey, Arc<Vec<GeoPrediction>>>>,
}

impl PredictionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &QueryKey) -> Option<Arc<Vec<GeoPrediction>>> {
        self.entries.lock().get(key).cloned()
    }

    /// Cached value for `key`, or the result of `compute` stored under it.
    ///
    /// `compute` runs outside the lock; two concurrent misses may both
    /// compute, the later insert wins.
    pub fn get_or_compute<F>(&self, key: QueryKey, compute: F) -> Arc<Vec<GeoPrediction>>
    where
        F: FnOnce() -> Vec<GeoPrediction>,
    {
        if let Some(hit) = self.get(&key) {
            tracing::trace!(
                version = %key.batch_version,
                reference = %key.reference_version,
                country = ?key.country,
                "prediction cache hit"
            );
            return hit;
        }

        let value = Arc::new(compute());
        let mut entries = self.entries.lock();
        entries.retain(|k, _| k.same_inputs(&key));
        entries.insert(key, Arc::clone(&value));
        value
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
