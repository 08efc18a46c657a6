//! Sync orchestration, archive sweep, job runner and cron scheduling.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use govlead_alerts::{HttpEmailTransport, NotificationDispatcher, DEFAULT_EMAIL_ENDPOINT};
use govlead_core::{AccountStore, AlertStore, ContractStore, EventSink, ProfileStore, SyncStateStore};
use govlead_match::{CertificationMatrix, Scorer};
use govlead_storage::{ArtifactStore, HttpClientConfig, HttpFetcher};
use secrecy::{ExposeSecret, SecretString};
use tracing::{info, warn};

pub mod archive;
pub mod config;
pub mod pipeline;
pub mod registry;
pub mod runner;
pub mod scheduler;

pub use archive::{archive_sweep, ArchiveSummary};
pub use config::{ConfigError, Credentials, GmailSecrets, SyncConfig};
pub use pipeline::{SyncError, SyncPipeline, SyncRunSummary};
pub use registry::{build_handles, SourceConfig, SourceHandle, SourceRegistry, DEFAULT_FETCH_LIMIT};
pub use runner::{DrainReport, EventBus, JobRunner, StepError, DEFAULT_BUS_CAPACITY};
pub use scheduler::{maybe_build_scheduler, scheduled_events};

pub const CRATE_NAME: &str = "govlead-sync";

pub fn http_fetcher(config: &SyncConfig) -> Result<Arc<HttpFetcher>> {
    let fetcher = HttpFetcher::new(HttpClientConfig {
        timeout: Duration::from_secs(config.http_timeout_secs),
        user_agent: Some(config.user_agent.clone()),
        ..Default::default()
    })?;
    Ok(Arc::new(fetcher))
}

/// Wires every startup-time handle (registry, credentials, HTTP clients,
/// scoring rules, email transport) into a job runner over `store`.
pub async fn build_runner<S>(
    config: &SyncConfig,
    credentials: &Credentials,
    store: Arc<S>,
    events: Arc<dyn EventSink>,
) -> Result<JobRunner>
where
    S: ContractStore + SyncStateStore + AlertStore + ProfileStore + AccountStore + 'static,
{
    let registry = SourceRegistry::load(&config.workspace_root).await?;
    let fetcher = http_fetcher(config)?;
    let sources = build_handles(&registry, credentials, &fetcher);
    for handle in &sources {
        match &handle.adapter {
            Ok(_) => info!(source = %handle.source(), name = %handle.config.display_name, "source ready"),
            Err(err) => warn!(source = %handle.source(), error = %err, "source disabled until configured"),
        }
    }

    let matrix = CertificationMatrix::from_workspace_root(&config.workspace_root)
        .context("loading certification rules")?;

    let dispatcher = match (&credentials.email_api_key, &credentials.email_from) {
        (Ok(key), Ok(from)) => {
            let transport = HttpEmailTransport::new(
                fetcher.clone(),
                DEFAULT_EMAIL_ENDPOINT,
                SecretString::new(key.expose_secret().into()),
            );
            Ok(NotificationDispatcher::new(store.clone(), Arc::new(transport), from.clone()))
        }
        (Err(err), _) | (_, Err(err)) => {
            warn!(error = %err, "notification email disabled");
            Err(err.clone())
        }
    };

    Ok(JobRunner::new(
        store,
        sources,
        ArtifactStore::new(config.artifacts_dir.clone()),
        events,
        Scorer::new(matrix),
        dispatcher,
    ))
}
