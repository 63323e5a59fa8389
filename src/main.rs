use anyhow::{Context, Result};
use bike_demand_forecaster::pipeline::{stages, Orchestrator, RunLogWriter};
use bike_demand_forecaster::{api, app_state::AppState, config::Config, telemetry};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "bike-demand-forecaster", version, about)]
struct Cli {
    /// Configuration file, merged over the compiled defaults.
    #[arg(long, global = true, default_value = bike_demand_forecaster::config::DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the data pipeline once.
    Pipeline {
        /// Keep going after a critical stage fails.
        #[arg(long)]
        continue_on_error: bool,
    },
    /// Serve predictions over HTTP.
    Serve,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let cfg = Config::load_from(&cli.config)?;

    std::fs::create_dir_all(&cfg.paths.logs_dir)
        .with_context(|| format!("creating {}", cfg.paths.logs_dir.display()))?;
    let _guard = telemetry::init_tracing(Some(&cfg.paths.logs_dir));

    match cli.command {
        Command::Pipeline { continue_on_error } => run_pipeline(cfg, continue_on_error).await,
        Command::Serve => serve(cfg).await.map(|_| ExitCode::SUCCESS),
    }
}

async fn run_pipeline(cfg: Config, continue_on_error: bool) -> Result<ExitCode> {
    for dir in [&cfg.paths.clean_dir, &cfg.paths.models_dir, &cfg.paths.reports_dir] {
        std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }

    let continue_on_error = continue_on_error || cfg.pipeline.continue_on_error;
    let stage_list = stages::stages_from_config(&cfg.pipeline);
    let run_log = RunLogWriter::new(&cfg.paths.logs_dir);
    let orchestrator = Orchestrator::new(stages::default_handlers(), Arc::new(cfg)).with_run_log(run_log);

    let run = orchestrator.run(&stage_list, continue_on_error).await;
    if run.success {
        info!(run_id = %run.run_id, elapsed_ms = run.total_elapsed_ms, "pipeline succeeded");
        Ok(ExitCode::SUCCESS)
    } else {
        warn!(run_id = %run.run_id, failed = ?run.failed_steps, "pipeline failed");
        Ok(ExitCode::FAILURE)
    }
}

async fn serve(cfg: Config) -> Result<()> {
    let addr = cfg.server.socket_addr()?;
    let state = AppState::new(cfg.clone());
    let app = api::router(state, &cfg);

    if cfg.server.host == "0.0.0.0" {
        warn!("binding to 0.0.0.0, the API is reachable from the network");
    }
    info!(%addr, "starting prediction server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(telemetry::shutdown_signal())
        .await?;

    warn!("shutdown complete");
    Ok(())
}
