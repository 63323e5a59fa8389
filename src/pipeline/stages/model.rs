use anyhow::Context;
use async_trait::async_trait;
use std::sync::Arc;

use crate::dataset::catalog::SEOUL_BIKE_SHARING_DATASET;
use crate::dataset::Table;
use crate::domain::TrainingRecord;
use crate::features::{FeatureTransformer, TransformError, TransformerState};
use crate::ml::models::{RegressionModel, TrainedModel};
use crate::ml::registry::{Candidate, ComparisonRow, ComparisonTable, ModelRegistry};
use crate::ml::training::{search_learning_rate, ModelTrainer, TrainingDataset};
use crate::pipeline::{StageContext, StageHandler, StageOutput};

/// Transformer state fit on the historical rows plus the transformed dataset.
#[derive(Debug)]
pub struct PreparedTraining {
    pub state: TransformerState,
    pub dataset: TrainingDataset,
    pub skipped: usize,
}

/// Rows that cannot be turned into observations are skipped and counted;
/// a table with no usable row is an error.
pub fn prepare_training(table: &Table) -> anyhow::Result<PreparedTraining> {
    let mut records = Vec::with_capacity(table.len());
    let mut skipped = 0usize;
    for record in table.records() {
        match TrainingRecord::from_record(&record).and_then(|r| FeatureTransformer::resolve(&r.observation).map(|_| r)) {
            Ok(r) => records.push(r),
            Err(e) => {
                skipped += 1;
                tracing::debug!(error = %e, "training row skipped");
            }
        }
    }
    if records.is_empty() {
        return Err(TransformError::EmptyTrainingSet.into());
    }

    let observations: Vec<_> = records.iter().map(|r| r.observation.clone()).collect();
    let state = FeatureTransformer::fit(&observations)?;

    let features = observations
        .iter()
        .map(|o| FeatureTransformer::apply(&state, o))
        .collect::<Result<Vec<_>, _>>()?;
    let targets = records.iter().map(|r| r.rented_bike_count).collect();
    let dataset = TrainingDataset::new(features, targets)?;

    Ok(PreparedTraining {
        state,
        dataset,
        skipped,
    })
}

/// Trains every candidate, records the comparison table and promotes the best.
pub struct ModelStage;

#[async_trait]
impl StageHandler for ModelStage {
    async fn run(&self, ctx: StageContext) -> anyhow::Result<StageOutput> {
        let settings = ctx.config.pipeline.training.clone();
        let table = ctx
            .catalog
            .load_table(&SEOUL_BIKE_SHARING_DATASET.clean_artifact())?;

        let prepared = tokio::task::spawn_blocking(move || prepare_training(&table)).await??;
        if prepared.skipped > 0 {
            tracing::warn!(skipped = prepared.skipped, "historical rows could not be used for training");
        }
        tracing::info!(
            rows = prepared.dataset.len(),
            features = prepared.state.feature_count(),
            "training set prepared"
        );

        let (train, validation) = prepared.dataset.split(settings.validation_split)?;
        let (train, validation) = (Arc::new(train), Arc::new(validation));

        let mut models: Vec<TrainedModel> = Vec::new();

        ctx.ensure_active()?;
        let linear = search_learning_rate(
            Arc::clone(&train),
            Arc::clone(&validation),
            &settings.learning_rates,
            settings.max_iterations,
            settings.search_workers,
        )
        .await
        .context("linear regression search failed")?;
        models.push(linear.into());

        ctx.ensure_active()?;
        models.push(ModelTrainer::train_mean_baseline(&train, &validation)?.into());

        #[cfg(feature = "ml")]
        {
            use crate::ml::smartcore::SmartcoreRandomForest;

            ctx.ensure_active()?;
            let seed = settings.random_seed;
            let (t, v) = (Arc::clone(&train), Arc::clone(&validation));
            let forest = tokio::task::spawn_blocking(move || {
                SmartcoreRandomForest::train(&t, &v, SmartcoreRandomForest::default_parameters(seed))
            })
            .await?;
            match forest {
                Ok(forest) => models.push(TrainedModel::RandomForest(forest)),
                Err(e) => tracing::warn!(error = %e, "random forest candidate discarded"),
            }
        }

        ctx.ensure_active()?;
        let registry = ModelRegistry::new(&ctx.config.paths.models_dir);
        let mut output = StageOutput::new();
        let mut candidates = Vec::with_capacity(models.len());
        for model in &models {
            let name = model.name();
            let metrics = ComparisonRow::from_metadata(&name, model.metadata());
            tracing::info!(
                model = %name,
                rmse = metrics.rmse,
                r2 = metrics.r2,
                mae = metrics.mae,
                "candidate trained"
            );
            let handle = registry.save(&name, model, &prepared.state, &metrics)?;
            output.push(handle.clone());
            candidates.push(Candidate { handle, metrics });
        }

        let table = ComparisonTable::new(candidates.iter().map(|c| c.metrics.clone()).collect());
        output.push(registry.write_comparison(&table)?);

        let best = ModelRegistry::select_best(&candidates, settings.selection_metric)?;
        tracing::info!(model = %best.name, metric = %settings.selection_metric, "best candidate selected");
        output.push(registry.promote(&best)?);

        Ok(output)
    }
}
