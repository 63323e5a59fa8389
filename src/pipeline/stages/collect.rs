use anyhow::Context;
use async_trait::async_trait;

use crate::dataset::catalog::datasets;
use crate::dataset::Table;
use crate::pipeline::{StageContext, StageHandler, StageOutput};
use crate::storage::{ArtifactHandle, ArtifactKind};

/// Picks up collector outputs from the raw directory.
///
/// Scraping and API calls happen outside this crate; this stage only checks
/// that every raw file is present and carries its declared schema, then
/// publishes a handle for each.
pub struct CollectStage;

#[async_trait]
impl StageHandler for CollectStage {
    async fn run(&self, ctx: StageContext) -> anyhow::Result<StageOutput> {
        let raw_dir = ctx.config.paths.raw_dir.clone();
        let mut output = StageOutput::new();

        for def in datasets() {
            ctx.ensure_active()?;
            let path = def.raw_path(&raw_dir);
            let schema = def.raw_schema();
            let table = Table::read_with_schema(&path, &schema)
                .with_context(|| format!("raw dataset '{}' is unusable", def.name))?;
            if table.is_empty() {
                anyhow::bail!("raw dataset '{}' has no rows", def.name);
            }

            tracing::info!(dataset = def.name, rows = table.len(), "raw dataset collected");
            output.push(ArtifactHandle::new(def.raw_artifact(), ArtifactKind::RawDataset, path).with_schema(schema));
        }

        Ok(output)
    }
}
