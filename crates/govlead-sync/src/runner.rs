//! In-process job runner: an mpsc event bus plus a handler per named event,
//! each run under a bounded retry policy.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use govlead_alerts::{AlertEvaluator, NotificationDispatcher};
use govlead_core::{
    AccountStore, AlertStore, BufferedEventSink, ContractSource, ContractStore, EventSink,
    PipelineEvent, ProfileStore, SyncStateStore,
};
use govlead_match::Scorer;
use govlead_storage::{ArtifactStore, BackoffPolicy};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::archive::archive_sweep;
use crate::config::ConfigError;
use crate::pipeline::SyncPipeline;
use crate::registry::SourceHandle;

pub const DEFAULT_BUS_CAPACITY: usize = 1024;

/// Event sink backed by the runner's channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: mpsc::Sender<PipelineEvent>,
}

impl EventBus {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<PipelineEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

#[async_trait]
impl EventSink for EventBus {
    async fn emit(&self, event: PipelineEvent) -> anyhow::Result<()> {
        let name = event.name();
        self.tx
            .send(event)
            .await
            .map_err(|_| anyhow!("event bus closed; dropped {name}"))
    }
}

#[derive(Debug, Error)]
pub enum StepError {
    #[error("{0:#}")]
    Retryable(anyhow::Error),
    #[error("{0:#}")]
    Fatal(anyhow::Error),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    pub handled: usize,
    pub failed: usize,
}

type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub struct JobRunner {
    sources: BTreeMap<ContractSource, SourceHandle>,
    pipeline: SyncPipeline,
    contracts: Arc<dyn ContractStore>,
    evaluator: AlertEvaluator,
    dispatcher: Result<NotificationDispatcher, ConfigError>,
    events: Arc<dyn EventSink>,
    backoff: BackoffPolicy,
    clock: Clock,
}

impl JobRunner {
    pub fn new<S>(
        store: Arc<S>,
        sources: Vec<SourceHandle>,
        artifacts: ArtifactStore,
        events: Arc<dyn EventSink>,
        scorer: Scorer,
        dispatcher: Result<NotificationDispatcher, ConfigError>,
    ) -> Self
    where
        S: ContractStore + SyncStateStore + AlertStore + ProfileStore + AccountStore + 'static,
    {
        Self {
            sources: sources.into_iter().map(|h| (h.source(), h)).collect(),
            pipeline: SyncPipeline::new(store.clone(), artifacts, events.clone()),
            contracts: store.clone(),
            evaluator: AlertEvaluator::new(store, events.clone(), scorer),
            dispatcher,
            events,
            backoff: BackoffPolicy::default(),
            clock: Arc::new(Utc::now),
        }
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn sources(&self) -> impl Iterator<Item = &SourceHandle> {
        self.sources.values()
    }

    /// Handles one event, retrying retryable failures with backoff. Exhausted
    /// retries and fatal failures are logged and returned.
    pub async fn handle(&self, event: &PipelineEvent) -> Result<(), StepError> {
        let mut attempt = 0usize;
        loop {
            match self.handle_once(event).await {
                Ok(()) => return Ok(()),
                Err(StepError::Retryable(err)) if attempt < self.backoff.max_retries => {
                    let delay = self.backoff.delay_for_attempt(attempt);
                    warn!(
                        event = event.name(),
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %format!("{err:#}"),
                        "step failed; retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    error!(event = event.name(), attempts = attempt + 1, error = %err, "step failed");
                    return Err(err);
                }
            }
        }
    }

    async fn handle_once(&self, event: &PipelineEvent) -> Result<(), StepError> {
        let now = (self.clock)();
        match event {
            PipelineEvent::SyncRequested { source } => {
                let handle = self
                    .sources
                    .get(source)
                    .ok_or_else(|| StepError::Fatal(anyhow!("source {source} is not enabled")))?;
                let adapter = handle.adapter.as_ref().map_err(|err| {
                    StepError::Fatal(anyhow!("source {source} skipped: {err}"))
                })?;
                self.pipeline
                    .run_source(adapter.as_ref(), handle.config.limit, now)
                    .await
                    .map(|_| ())
                    .map_err(|err| {
                        let retryable = err.is_retryable();
                        let err = anyhow::Error::new(err).context(format!("syncing {source}"));
                        if retryable {
                            StepError::Retryable(err)
                        } else {
                            StepError::Fatal(err)
                        }
                    })
            }
            PipelineEvent::ContractsSynced { source, created, .. } => {
                if *created == 0 {
                    return Ok(());
                }
                info!(%source, created, "new contracts; requesting alert sweep");
                self.events
                    .emit(PipelineEvent::AlertSweepRequested)
                    .await
                    .map_err(StepError::Retryable)
            }
            PipelineEvent::ArchiveRequested => archive_sweep(self.contracts.as_ref(), now)
                .await
                .map(|_| ())
                .map_err(|err| StepError::Retryable(err.into())),
            PipelineEvent::AlertSweepRequested => self
                .evaluator
                .sweep()
                .await
                .map(|_| ())
                .map_err(StepError::Retryable),
            PipelineEvent::SavedSearchAlertCheck { alert_id } => self
                .evaluator
                .check_saved_search_alert(*alert_id, now)
                .await
                .map(|outcome| info!(%alert_id, ?outcome, "saved-search alert checked"))
                .map_err(StepError::Retryable),
            PipelineEvent::ProfileAlertCheck { profile_id } => self
                .evaluator
                .check_profile_alert(*profile_id, now)
                .await
                .map(|outcome| info!(%profile_id, ?outcome, "profile alert checked"))
                .map_err(StepError::Retryable),
            PipelineEvent::NotificationRequested(job) => {
                let dispatcher = self
                    .dispatcher
                    .as_ref()
                    .map_err(|err| StepError::Fatal(anyhow!("email delivery unavailable: {err}")))?;
                match dispatcher.dispatch(job).await {
                    Ok(outcome) => {
                        info!(job_id = %job.job_id, ?outcome, "notification handled");
                        Ok(())
                    }
                    Err(err) if err.is_retryable() => Err(StepError::Retryable(err.into())),
                    Err(err) => Err(StepError::Fatal(err.into())),
                }
            }
        }
    }

    /// Consumes the bus, one task per event, until `shutdown` resolves or the
    /// channel closes. The runner emits follow-up events into the same bus,
    /// so while it is alive the channel never closes on its own and callers
    /// stop it through `shutdown`. Jobs already started run to completion.
    pub async fn run(
        self: Arc<Self>,
        mut rx: mpsc::Receiver<PipelineEvent>,
        shutdown: impl Future<Output = ()> + Send,
    ) {
        tokio::pin!(shutdown);
        let mut in_flight = JoinSet::new();
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!(in_flight = in_flight.len(), "shutdown requested; finishing started jobs");
                    break;
                }
                received = rx.recv() => {
                    let Some(event) = received else {
                        info!("event bus closed");
                        break;
                    };
                    let runner = self.clone();
                    in_flight.spawn(async move {
                        let _ = runner.handle(&event).await;
                    });
                    while in_flight.try_join_next().is_some() {}
                }
            }
        }
        while in_flight.join_next().await.is_some() {}
        info!("job runner stopped");
    }

    /// Handles buffered events, and whatever they emit in turn, until the
    /// buffer stays empty. The runner must have been built with `buffer` as
    /// its event sink for follow-up events to be picked up.
    pub async fn drain_inline(&self, buffer: &BufferedEventSink) -> DrainReport {
        let mut report = DrainReport::default();
        loop {
            let events = buffer.drain().await;
            if events.is_empty() {
                return report;
            }
            for event in events {
                report.handled += 1;
                if self.handle(&event).await.is_err() {
                    report.failed += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use govlead_match::CertificationMatrix;
    use govlead_storage::MemoryStore;
    use tokio::sync::oneshot;

    use super::*;

    fn runner_on(bus: EventBus, artifacts: &tempfile::TempDir) -> JobRunner {
        JobRunner::new(
            Arc::new(MemoryStore::new()),
            Vec::new(),
            ArtifactStore::new(artifacts.path()),
            Arc::new(bus),
            Scorer::new(CertificationMatrix::default()),
            Err(ConfigError::MissingEnvVar("EMAIL_API_KEY".into())),
        )
    }

    #[tokio::test]
    async fn shutdown_stops_a_runner_that_holds_its_own_sender() {
        let artifacts = tempfile::tempdir().unwrap();
        let (bus, rx) = EventBus::channel(8);
        let producer = bus.clone();
        let runner = Arc::new(runner_on(bus, &artifacts));
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(runner.run(rx, async move {
            let _ = stop_rx.await;
        }));

        producer.emit(PipelineEvent::ArchiveRequested).await.unwrap();
        drop(producer);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!task.is_finished());

        stop_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("runner stops once shutdown resolves")
            .unwrap();
    }

    #[tokio::test]
    async fn bus_reports_closed_channel() {
        let (bus, rx) = EventBus::channel(4);
        bus.emit(PipelineEvent::ArchiveRequested).await.unwrap();
        drop(rx);
        let err = bus.emit(PipelineEvent::AlertSweepRequested).await.unwrap_err();
        assert!(err.to_string().contains("alerts/sweep"));
    }
}
