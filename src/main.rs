// Main entry point - Dependency injection, CLI and server setup
mod application;
mod domain;
mod infrastructure;
mod presentation;

use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use crate::application::ingestion_service::{IngestReport, IngestState, IngestionService};
use crate::application::query_service::QueryService;
use crate::application::telemetry_store::TelemetryStore;
use crate::infrastructure::config::{AppConfig, StoreBackend, load_app_config};
use crate::infrastructure::influx_store::InfluxTelemetryStore;
use crate::infrastructure::ingest_input::{FileArtifactSink, read_artifact, read_ingest_input};
use crate::infrastructure::memory_store::MemoryTelemetryStore;
use crate::presentation::app_state::AppState;
use crate::presentation::router::build_router;

#[derive(Parser, Debug)]
#[command(name = "iot-telemetry", version, about = "IoT telemetry query API and bulk loader")]
struct Cli {
    /// Configuration file, without extension
    #[arg(long, global = true, env = "TELEMETRY_CONFIG", default_value = "config/telemetry")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the read API
    Serve {
        /// Load this input file into the store before serving
        #[arg(long)]
        seed: Option<PathBuf>,

        /// Table to take from the seed file
        #[arg(long)]
        table: Option<String>,
    },

    /// Bulk-load records, or resume a halted load
    Ingest {
        /// JSON file mapping table names to record arrays
        #[arg(long, required_unless_present = "resume", conflicts_with = "resume")]
        input: Option<PathBuf>,

        /// Table to take from the input file
        #[arg(long)]
        table: Option<String>,

        /// Records per batch; capped by the store's own limit
        #[arg(long)]
        batch_size: Option<usize>,

        /// Skip the first N records of the input
        #[arg(long, default_value_t = 0, conflicts_with = "resume")]
        start_offset: usize,

        /// Artifact written by a halted run
        #[arg(long)]
        resume: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_app_config(&cli.config)
        .with_context(|| format!("failed to load configuration from {}", cli.config))?;

    match cli.command {
        Command::Serve { seed, table } => serve(config, seed, table).await,
        Command::Ingest {
            input,
            table,
            batch_size,
            start_offset,
            resume,
        } => {
            let mut config = config;
            if let Some(batch_size) = batch_size {
                config.ingest.batch_size = batch_size;
            }
            ingest(config, input, table, start_offset, resume).await
        }
    }
}

fn build_store(config: &AppConfig) -> anyhow::Result<Arc<dyn TelemetryStore>> {
    match config.store.backend {
        StoreBackend::Memory => Ok(Arc::new(MemoryTelemetryStore::new())),
        StoreBackend::Influx => {
            let Some(influx) = &config.influx else {
                bail!("store.backend is \"influx\" but no [influx] settings were given");
            };
            tracing::info!(
                host = %influx.host,
                database = %influx.database,
                "using InfluxDB store"
            );
            Ok(Arc::new(InfluxTelemetryStore::new(influx)))
        }
    }
}

fn ingestion_service(config: &AppConfig, store: Arc<dyn TelemetryStore>) -> IngestionService {
    IngestionService::new(
        store,
        Arc::new(FileArtifactSink::new(&config.ingest.artifact_dir)),
        config.ingest.settings(),
    )
}

async fn serve(
    config: AppConfig,
    seed: Option<PathBuf>,
    table: Option<String>,
) -> anyhow::Result<()> {
    let store = build_store(&config)?;

    if let Some(path) = seed {
        let input = read_ingest_input(&path, table.as_deref()).await?;
        let report = ingestion_service(&config, store.clone())
            .run(&input.table, &input.records, 0, &CancellationToken::new())
            .await?;
        ensure_complete(&report)?;
    }

    let state = Arc::new(AppState {
        query_service: QueryService::new(store),
    });
    let router = build_router(state);

    let addr: SocketAddr = config
        .server
        .bind
        .parse()
        .with_context(|| format!("invalid bind address {}", config.server.bind))?;
    tracing::info!(%addr, "starting iot-telemetry service");

    axum::serve(tokio::net::TcpListener::bind(addr).await?, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down");
        })
        .await?;

    Ok(())
}

async fn ingest(
    config: AppConfig,
    input: Option<PathBuf>,
    table: Option<String>,
    start_offset: usize,
    resume: Option<PathBuf>,
) -> anyhow::Result<()> {
    if config.store.backend == StoreBackend::Memory {
        tracing::warn!("ingesting into the in-memory store; records are dropped on exit");
    }
    let service = ingestion_service(&config, build_store(&config)?);

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received; stopping after the current batch");
                cancel.cancel();
            }
        }
    });

    let report = match (resume, input) {
        (Some(path), _) => {
            let artifact = read_artifact(&path).await?;
            service.resume(&artifact, &cancel).await?
        }
        (None, Some(path)) => {
            let input = read_ingest_input(&path, table.as_deref()).await?;
            service
                .run(&input.table, &input.records, start_offset, &cancel)
                .await?
        }
        (None, None) => bail!("either --input or --resume is required"),
    };

    ensure_complete(&report)
}

fn ensure_complete(report: &IngestReport) -> anyhow::Result<()> {
    if let IngestState::Failed { offset, artifact } = &report.state {
        bail!(
            "ingestion of {} halted at record {} of {}; resume with --resume {}",
            report.table,
            offset,
            report.total,
            artifact.display()
        );
    }
    if !report.is_complete() {
        bail!("ingestion of {} stopped early", report.table);
    }

    tracing::info!(
        table = %report.table,
        total = report.total,
        batches = report.batches.len(),
        "ingestion finished"
    );
    Ok(())
}
