use std::sync::Arc;

use anyhow::{Context, Result};
use govlead_core::{EventSink, PipelineEvent};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{info, warn};

use crate::config::SyncConfig;
use crate::registry::SourceHandle;

/// Cron entries the scheduler would register, as `(cron, event)` pairs.
pub fn scheduled_events(config: &SyncConfig, sources: &[SourceHandle]) -> Vec<(String, PipelineEvent)> {
    let mut entries: Vec<(String, PipelineEvent)> = sources
        .iter()
        .filter_map(|handle| {
            let cron = handle.config.cron.clone()?;
            Some((cron, PipelineEvent::SyncRequested { source: handle.source() }))
        })
        .collect();
    entries.push((config.alert_cron.clone(), PipelineEvent::AlertSweepRequested));
    entries.push((config.archive_cron.clone(), PipelineEvent::ArchiveRequested));
    entries
}

/// Builds (but does not start) the cron scheduler. `None` when scheduling is
/// disabled in the environment.
pub async fn maybe_build_scheduler(
    config: &SyncConfig,
    sources: &[SourceHandle],
    events: Arc<dyn EventSink>,
) -> Result<Option<JobScheduler>> {
    if !config.scheduler_enabled {
        return Ok(None);
    }

    let sched = JobScheduler::new().await.context("creating scheduler")?;
    for (cron, event) in scheduled_events(config, sources) {
        let events = events.clone();
        let name = event.name();
        let job = Job::new_async(cron.as_str(), move |_uuid, _l| {
            let events = events.clone();
            let event = event.clone();
            Box::pin(async move {
                let name = event.name();
                if let Err(err) = events.emit(event).await {
                    warn!(event = name, error = %err, "scheduled event dropped");
                }
            })
        })
        .with_context(|| format!("creating scheduler job for cron {cron}"))?;
        sched.add(job).await.context("adding scheduler job")?;
        info!(%cron, event = name, "scheduled");
    }
    Ok(Some(sched))
}
