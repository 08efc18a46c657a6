use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use govlead_core::{BufferedEventSink, ContractSource, EventSink, PipelineEvent};
use govlead_storage::PgStore;
use govlead_sync::{
    build_runner, maybe_build_scheduler, Credentials, EventBus, JobRunner, SyncConfig,
    DEFAULT_BUS_CAPACITY,
};
use govlead_web::{serve, web_port_from_env, AppState};
use tokio::sync::oneshot;
use tracing::info;
use tracing_subscriber::EnvFilter;

const MAX_DB_CONNECTIONS: u32 = 10;

#[derive(Debug, Parser)]
#[command(name = "govlead")]
#[command(about = "Government contract lead finder")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Sync every enabled source, or just one, then run whatever alerts it triggers.
    Sync {
        #[arg(long)]
        source: Option<ContractSource>,
    },
    /// Archive contracts whose deadline or archive date has passed.
    Archive,
    /// Evaluate every saved-search alert and alerts-enabled profile now.
    Alerts,
    /// Run the job runner, cron scheduler and HTTP ingress until interrupted.
    Serve,
    /// Apply database migrations.
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_env("GOVLEAD_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let config = SyncConfig::from_env();

    match cli.command {
        Commands::Migrate => {
            let store = PgStore::connect(&config.database_url, MAX_DB_CONNECTIONS).await?;
            store.migrate().await?;
            println!("migrations applied");
        }
        Commands::Sync { source } => {
            run_inline(&config, |runner| {
                let sources: Vec<ContractSource> = match source {
                    Some(source) => vec![source],
                    None => runner.sources().map(|handle| handle.source()).collect(),
                };
                sources
                    .into_iter()
                    .map(|source| PipelineEvent::SyncRequested { source })
                    .collect()
            })
            .await?;
        }
        Commands::Archive => {
            run_inline(&config, |_| vec![PipelineEvent::ArchiveRequested]).await?;
        }
        Commands::Alerts => {
            run_inline(&config, |_| vec![PipelineEvent::AlertSweepRequested]).await?;
        }
        Commands::Serve => serve_all(&config).await?,
    }

    Ok(())
}

/// Runs the given events, and everything they trigger, in this process.
async fn run_inline(
    config: &SyncConfig,
    initial: impl FnOnce(&JobRunner) -> Vec<PipelineEvent>,
) -> Result<()> {
    let store = Arc::new(PgStore::connect(&config.database_url, MAX_DB_CONNECTIONS).await?);
    let buffer = Arc::new(BufferedEventSink::new());
    let runner = build_runner(config, &Credentials::from_env(), store, buffer.clone()).await?;

    for event in initial(&runner) {
        buffer.emit(event).await?;
    }
    let report = runner.drain_inline(&buffer).await;
    println!("{}", serde_json::to_string_pretty(&report)?);
    if report.failed > 0 {
        anyhow::bail!("{} of {} steps failed; see logs", report.failed, report.handled);
    }
    Ok(())
}

async fn serve_all(config: &SyncConfig) -> Result<()> {
    let store = Arc::new(PgStore::connect(&config.database_url, MAX_DB_CONNECTIONS).await?);
    let (bus, rx) = EventBus::channel(DEFAULT_BUS_CAPACITY);
    let events: Arc<dyn EventSink> = Arc::new(bus);

    let runner = build_runner(config, &Credentials::from_env(), store.clone(), events.clone()).await?;
    let runner = Arc::new(runner);
    let sources: Vec<_> = runner.sources().cloned().collect();
    let (stop_runner, runner_stopped) = oneshot::channel::<()>();
    let runner_task = tokio::spawn(runner.run(rx, async move {
        let _ = runner_stopped.await;
    }));

    let scheduler = maybe_build_scheduler(config, &sources, events.clone()).await?;
    if let Some(sched) = &scheduler {
        sched.start().await.context("starting scheduler")?;
    } else {
        info!("cron scheduler disabled; set GOVLEAD_SCHEDULER_ENABLED=1 to enable");
    }

    let state = AppState::new(events, store);
    tokio::select! {
        served = serve(web_port_from_env(), state) => served?,
        _ = tokio::signal::ctrl_c() => info!("shutting down"),
    }

    if let Some(mut sched) = scheduler {
        sched.shutdown().await.context("stopping scheduler")?;
    }
    let _ = stop_runner.send(());
    runner_task.await.context("joining job runner")?;
    Ok(())
}
