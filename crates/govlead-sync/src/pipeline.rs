//! One sync run for one source: fetch, normalize, upsert, acknowledge, record.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use govlead_adapters::{AdapterContext, AdapterError, RawItem, SourceAdapter};
use govlead_core::{
    ContractSource, ContractStore, EventSink, PipelineEvent, StoreError, SyncState, SyncStateStore,
    UpsertOutcome,
};
use govlead_storage::ArtifactStore;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::ConfigError;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Adapter(#[from] AdapterError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SyncError {
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Config(_) => false,
            SyncError::Adapter(err) => err.is_retryable(),
            SyncError::Store(_) => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncRunSummary {
    pub run_id: Uuid,
    pub source: ContractSource,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub fetched: usize,
    pub created: usize,
    pub updated: usize,
    pub quarantined: usize,
    pub failed: usize,
    pub acknowledged: usize,
}

enum ItemOutcome {
    Upserted(UpsertOutcome),
    Quarantined,
    Failed,
}

pub struct SyncPipeline {
    contracts: Arc<dyn ContractStore>,
    sync_states: Arc<dyn SyncStateStore>,
    artifacts: ArtifactStore,
    events: Arc<dyn EventSink>,
}

impl SyncPipeline {
    pub fn new<S>(store: Arc<S>, artifacts: ArtifactStore, events: Arc<dyn EventSink>) -> Self
    where
        S: ContractStore + SyncStateStore + 'static,
    {
        Self {
            contracts: store.clone(),
            sync_states: store,
            artifacts,
            events,
        }
    }

    /// Runs one source end to end. Only whole-run failures (fetch, sync-state
    /// bookkeeping) return an error; item failures are counted in the summary.
    pub async fn run_source(
        &self,
        adapter: &dyn SourceAdapter,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<SyncRunSummary, SyncError> {
        let run_id = Uuid::new_v4();
        let source = adapter.source();
        let span = info_span!("sync_run", %run_id, source = %source);
        self.run_source_inner(adapter, limit, run_id, now)
            .instrument(span)
            .await
    }

    async fn run_source_inner(
        &self,
        adapter: &dyn SourceAdapter,
        limit: usize,
        run_id: Uuid,
        started_at: DateTime<Utc>,
    ) -> Result<SyncRunSummary, SyncError> {
        let source = adapter.source();
        let previous = self.sync_states.get_sync_state(source.as_str()).await?;
        let ctx = AdapterContext {
            run_id,
            now: started_at,
            last_synced_at: previous.as_ref().and_then(|state| state.last_synced_at),
        };

        let items = adapter.fetch(&ctx, limit).await?;
        let mut summary = SyncRunSummary {
            run_id,
            source,
            started_at,
            finished_at: started_at,
            fetched: items.len(),
            created: 0,
            updated: 0,
            quarantined: 0,
            failed: 0,
            acknowledged: 0,
        };

        for item in &items {
            let outcome = self.process_item(adapter, item, started_at).await;
            let handled = match outcome {
                ItemOutcome::Upserted(UpsertOutcome::Created(_)) => {
                    summary.created += 1;
                    true
                }
                ItemOutcome::Upserted(UpsertOutcome::Updated(_)) => {
                    summary.updated += 1;
                    true
                }
                ItemOutcome::Quarantined => {
                    summary.quarantined += 1;
                    true
                }
                ItemOutcome::Failed => {
                    summary.failed += 1;
                    false
                }
            };
            if !handled {
                continue;
            }
            match adapter.acknowledge(item).await {
                Ok(()) => summary.acknowledged += 1,
                Err(err) => warn!(item = %item.key(), error = %err, "acknowledge failed; item will be fetched again"),
            }
        }

        summary.finished_at = Utc::now().max(started_at);
        let metadata = serde_json::to_value(&summary).unwrap_or_default();
        self.sync_states
            .upsert_sync_state(&SyncState {
                sync_type: source.as_str().to_string(),
                last_synced_at: Some(started_at),
                cursor: None,
                metadata,
            })
            .await?;

        if summary.created > 0 {
            let event = PipelineEvent::ContractsSynced {
                source,
                run_id,
                created: summary.created,
                updated: summary.updated,
            };
            if let Err(err) = self.events.emit(event).await {
                warn!(error = %err, "could not signal new contracts; the next alert sweep will pick them up");
            }
        }

        info!(
            fetched = summary.fetched,
            created = summary.created,
            updated = summary.updated,
            quarantined = summary.quarantined,
            failed = summary.failed,
            "sync run finished"
        );
        Ok(summary)
    }

    async fn process_item(&self, adapter: &dyn SourceAdapter, item: &RawItem, now: DateTime<Utc>) -> ItemOutcome {
        let contract = match adapter.normalize(item) {
            Ok(contract) => contract,
            Err(err) if err.is_unparseable() => {
                let (ext, bytes) = item.payload();
                let reason = err.to_string();
                return match self
                    .artifacts
                    .quarantine(now, item.source(), &item.key(), &reason, ext, &bytes)
                    .await
                {
                    Ok(artifact) => {
                        info!(item = %item.key(), path = %artifact.relative_path.display(), %reason, "item quarantined");
                        ItemOutcome::Quarantined
                    }
                    Err(err) => {
                        warn!(item = %item.key(), error = %err, "could not quarantine unparseable item");
                        ItemOutcome::Failed
                    }
                };
            }
            Err(err) => {
                warn!(item = %item.key(), error = %err, "normalize failed");
                return ItemOutcome::Failed;
            }
        };

        match self.contracts.upsert_contract(&contract, now).await {
            Ok(outcome) => {
                debug!(source_id = %contract.source_id, created = outcome.is_created(), "contract upserted");
                ItemOutcome::Upserted(outcome)
            }
            Err(err) => {
                warn!(source_id = %contract.source_id, error = %err, "upsert failed");
                ItemOutcome::Failed
            }
        }
    }
}
