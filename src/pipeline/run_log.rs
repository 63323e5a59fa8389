use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use super::PipelineRun;
use crate::storage::write_json_atomic;

pub const LATEST_RUN_LOG: &str = "latest.json";

/// Writes each run as `pipeline_run_<timestamp>.json` and mirrors it to
/// `latest.json`.
#[derive(Debug, Clone)]
pub struct RunLogWriter {
    dir: PathBuf,
}

impl RunLogWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn persist(&self, run: &PipelineRun) -> Result<PathBuf> {
        let stamp = run.started_at.format("%Y%m%dT%H%M%S%.3fZ");
        let path = self.dir.join(format!("pipeline_run_{stamp}.json"));
        write_json_atomic(&path, run).with_context(|| format!("writing {}", path.display()))?;
        let latest = self.dir.join(LATEST_RUN_LOG);
        write_json_atomic(&latest, run).with_context(|| format!("writing {}", latest.display()))?;
        Ok(path)
    }

    /// The most recent run, or `None` when no run has been logged yet.
    pub fn read_latest(dir: &Path) -> Result<Option<PipelineRun>> {
        let path = dir.join(LATEST_RUN_LOG);
        let bytes = match std::fs::read(&path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
        };
        let run = serde_json::from_slice(&bytes).with_context(|| format!("parsing {}", path.display()))?;
        Ok(Some(run))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{StageOutcome, StageStatus};

    #[test]
    fn test_persist_and_read_latest() {
        let dir = tempfile::tempdir().unwrap();
        let writer = RunLogWriter::new(dir.path());
        assert!(RunLogWriter::read_latest(dir.path()).unwrap().is_none());

        let mut run = PipelineRun::new(true);
        run.outcomes.push(StageOutcome {
            stage_id: "collect".into(),
            description: "validate raw inputs".into(),
            critical: true,
            status: StageStatus::TimeoutExceeded,
            elapsed_ms: 1000,
            artifacts: vec![],
        });
        run.failed_steps.push("collect".into());

        let path = writer.persist(&run).unwrap();
        assert!(path.file_name().unwrap().to_string_lossy().starts_with("pipeline_run_"));
        assert!(path.exists());

        let latest = RunLogWriter::read_latest(dir.path()).unwrap().unwrap();
        assert_eq!(latest, run);
    }
}
