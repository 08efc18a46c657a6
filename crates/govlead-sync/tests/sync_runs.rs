use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use govlead_adapters::{
    AdapterContext, AdapterError, EmailMessage, EmailSettings, Mailbox, MunicipalScrapeAdapter,
    RawItem, ScrapeClient, ScrapeSettings, SourceAdapter, SourceHints, StateEmailAdapter,
};
use govlead_alerts::{DispatchError, EmailTransport, NotificationDispatcher, OutboundEmail};
use govlead_core::{
    BufferedEventSink, CompanyProfile, ContractLead, ContractSource, ContractStore, EventSink,
    NormalizedContract, PipelineEvent, ProfileStore, StoreError, StoreResult, SubscriptionTier,
    SyncState, SyncStateStore, UpsertOutcome,
};
use govlead_match::Scorer;
use govlead_storage::{ArtifactStore, BackoffPolicy, MemoryStore};
use govlead_sync::{
    ConfigError, JobRunner, SourceConfig, SourceHandle, StepError, SyncError, SyncPipeline,
};
use tokio::sync::Mutex;
use uuid::Uuid;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 10, 12, 0, 0).unwrap()
}

#[derive(Default)]
struct FakeMailbox {
    messages: Mutex<BTreeMap<String, (EmailMessage, bool)>>,
}

impl FakeMailbox {
    async fn deliver(&self, message: EmailMessage) {
        self.messages
            .lock()
            .await
            .insert(message.id.clone(), (message, false));
    }

    async fn is_read(&self, id: &str) -> bool {
        self.messages.lock().await.get(id).map(|(_, read)| *read).unwrap_or(false)
    }
}

#[async_trait]
impl Mailbox for FakeMailbox {
    async fn list_unread(&self, _query: &str, max: usize) -> Result<Vec<String>, AdapterError> {
        Ok(self
            .messages
            .lock()
            .await
            .iter()
            .filter(|(_, (_, read))| !read)
            .map(|(id, _)| id.clone())
            .take(max)
            .collect())
    }

    async fn get_message(&self, id: &str) -> Result<EmailMessage, AdapterError> {
        self.messages
            .lock()
            .await
            .get(id)
            .map(|(message, _)| message.clone())
            .ok_or_else(|| AdapterError::Transport(format!("no message {id}")))
    }

    async fn mark_read(&self, id: &str) -> Result<(), AdapterError> {
        if let Some((_, read)) = self.messages.lock().await.get_mut(id) {
            *read = true;
        }
        Ok(())
    }
}

fn bid_email(id: &str, bid: &str) -> EmailMessage {
    EmailMessage {
        id: id.into(),
        subject: Some(format!("New Bid: {bid} - Office Supplies")),
        from: Some("notices@commbuys.com".into()),
        received_at: Some(Utc.with_ymd_and_hms(2026, 1, 9, 15, 30, 0).unwrap()),
        html_body: Some(format!(
            "<p>Bid Number: {bid}</p><p>Organization: Executive Office of Health</p>\
             <p>Bid Due Date: 02/01/2026</p>"
        )),
        ..EmailMessage::default()
    }
}

fn newsletter(id: &str) -> EmailMessage {
    EmailMessage {
        id: id.into(),
        subject: Some("Procurement newsletter".into()),
        html_body: Some("<p>Thanks for subscribing to purchasing updates.</p>".into()),
        ..EmailMessage::default()
    }
}

fn email_adapter(mailbox: Arc<FakeMailbox>) -> StateEmailAdapter {
    StateEmailAdapter::new(
        mailbox,
        EmailSettings {
            sender: Some("notices@commbuys.com".into()),
            label: None,
            hints: SourceHints::default(),
        },
    )
}

/// Memory store whose upserts fail for chosen source ids.
#[derive(Default)]
struct FlakyStore {
    inner: MemoryStore,
    failing: Mutex<HashSet<String>>,
}

#[async_trait]
impl ContractStore for FlakyStore {
    async fn upsert_contract(&self, contract: &NormalizedContract, now: DateTime<Utc>) -> StoreResult<UpsertOutcome> {
        if self.failing.lock().await.contains(&contract.source_id) {
            return Err(StoreError::Conflict(format!("{} is locked", contract.source_id)));
        }
        self.inner.upsert_contract(contract, now).await
    }

    async fn find_by_source_id(&self, source_id: &str) -> StoreResult<Option<ContractLead>> {
        self.inner.find_by_source_id(source_id).await
    }

    async fn find_by_ids(&self, ids: &[Uuid]) -> StoreResult<Vec<ContractLead>> {
        self.inner.find_by_ids(ids).await
    }

    async fn find_candidates(&self, posted_since: DateTime<Utc>, now: DateTime<Utc>) -> StoreResult<Vec<ContractLead>> {
        self.inner.find_candidates(posted_since, now).await
    }

    async fn archive_expired(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        self.inner.archive_expired(now).await
    }

    async fn count_contracts(&self, source: Option<ContractSource>) -> StoreResult<u64> {
        self.inner.count_contracts(source).await
    }
}

#[async_trait]
impl SyncStateStore for FlakyStore {
    async fn get_sync_state(&self, sync_type: &str) -> StoreResult<Option<SyncState>> {
        self.inner.get_sync_state(sync_type).await
    }

    async fn upsert_sync_state(&self, state: &SyncState) -> StoreResult<()> {
        self.inner.upsert_sync_state(state).await
    }
}

#[tokio::test]
async fn email_items_are_marked_read_only_after_they_are_handled() {
    let dir = tempfile::tempdir().unwrap();
    let mailbox = Arc::new(FakeMailbox::default());
    mailbox.deliver(bid_email("m1", "BPM0001")).await;
    mailbox.deliver(newsletter("m2")).await;
    mailbox.deliver(bid_email("m3", "BPM0003")).await;

    let store = Arc::new(FlakyStore::default());
    store.failing.lock().await.insert("STATE_BPM0003".into());
    let sink = Arc::new(BufferedEventSink::new());
    let pipeline = SyncPipeline::new(store.clone(), ArtifactStore::new(dir.path()), sink.clone());
    let adapter = email_adapter(mailbox.clone());

    let summary = pipeline.run_source(&adapter, 50, now()).await.unwrap();
    assert_eq!(summary.fetched, 3);
    assert_eq!(summary.created, 1);
    assert_eq!(summary.quarantined, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.acknowledged, 2);

    assert!(mailbox.is_read("m1").await);
    assert!(mailbox.is_read("m2").await);
    assert!(!mailbox.is_read("m3").await);

    // The newsletter body and its sidecar are kept before the message is marked read.
    let quarantine_dir = dir.path().join("state-email").join("20260110");
    let kept: Vec<_> = std::fs::read_dir(&quarantine_dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect();
    assert_eq!(kept.len(), 2);
    assert!(kept.iter().any(|p| p.extension().is_some_and(|e| e == "html")));
    assert!(kept.iter().any(|p| p.extension().is_some_and(|e| e == "json")));

    let state = store.get_sync_state("state-email").await.unwrap().unwrap();
    assert_eq!(state.last_synced_at, Some(now()));
    assert_eq!(state.metadata["created"], 1);
    assert_eq!(state.metadata["failed"], 1);

    let events = sink.drain().await;
    assert!(matches!(
        events.as_slice(),
        [PipelineEvent::ContractsSynced {
            source: ContractSource::StateEmail,
            created: 1,
            updated: 0,
            ..
        }]
    ));

    // The failed message is still unread, so the next run picks it up.
    store.failing.lock().await.clear();
    let retry = pipeline.run_source(&adapter, 50, now()).await.unwrap();
    assert_eq!(retry.fetched, 1);
    assert_eq!(retry.created, 1);
    assert!(mailbox.is_read("m3").await);
    assert!(store.find_by_source_id("STATE_BPM0003").await.unwrap().is_some());
}

struct BoardPage;

#[async_trait]
impl ScrapeClient for BoardPage {
    async fn scrape_markdown(&self, _url: &str) -> Result<String, AdapterError> {
        Ok("\
| Bid Number | Description | Department | Due Date | Set Aside |
|---|---|---|---|---|
| RFQ-2026-031 | HVAC Maintenance | Public Works | 01/30/2026 | Small Business Set-Aside |
| RFQ-2026-032 | Fleet Tires | Fleet Services | Feb 6, 2026 | None |
"
        .to_string())
    }
}

fn board_adapter() -> Arc<dyn SourceAdapter> {
    Arc::new(MunicipalScrapeAdapter::new(
        Arc::new(BoardPage),
        ScrapeSettings {
            board_url: "https://springfield.example.test/purchasing/bids".into(),
            hints: SourceHints {
                agency: Some("City of Springfield".into()),
                place_of_performance: Some("Springfield, IL".into()),
            },
        },
    ))
}

#[tokio::test]
async fn resync_updates_in_place_and_only_signals_new_records() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::new());
    let sink = Arc::new(BufferedEventSink::new());
    let pipeline = SyncPipeline::new(store.clone(), ArtifactStore::new(dir.path()), sink.clone());
    let adapter = board_adapter();

    let first = pipeline.run_source(adapter.as_ref(), 50, now()).await.unwrap();
    assert_eq!((first.created, first.updated), (2, 0));
    let original = store.find_by_source_id("CITY_RFQ-2026-031").await.unwrap().unwrap();

    let later = now() + chrono::Duration::hours(4);
    let second = pipeline.run_source(adapter.as_ref(), 50, later).await.unwrap();
    assert_eq!((second.created, second.updated), (0, 2));

    assert_eq!(store.count_contracts(Some(ContractSource::MunicipalScrape)).await.unwrap(), 2);
    let refreshed = store.find_by_source_id("CITY_RFQ-2026-031").await.unwrap().unwrap();
    assert_eq!(refreshed.id, original.id);
    assert_eq!(refreshed.created_at, now());
    assert_eq!(refreshed.updated_at, later);

    assert_eq!(sink.len().await, 1);
    let state = store.get_sync_state("municipal-scrape").await.unwrap().unwrap();
    assert_eq!(state.last_synced_at, Some(later));
}

/// Adapter whose fetch always fails, counting attempts.
struct DownAdapter {
    attempts: AtomicUsize,
    error: fn() -> AdapterError,
}

#[async_trait]
impl SourceAdapter for DownAdapter {
    fn source(&self) -> ContractSource {
        ContractSource::FederalApi
    }

    async fn fetch(&self, _ctx: &AdapterContext, _limit: usize) -> Result<Vec<RawItem>, AdapterError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err((self.error)())
    }
}

#[tokio::test]
async fn failed_fetch_records_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::new());
    let pipeline = SyncPipeline::new(
        store.clone(),
        ArtifactStore::new(dir.path()),
        Arc::new(BufferedEventSink::new()),
    );
    let adapter = DownAdapter {
        attempts: AtomicUsize::new(0),
        error: || AdapterError::Auth("API_KEY_INVALID".into()),
    };

    let err = pipeline.run_source(&adapter, 10, now()).await.unwrap_err();
    assert!(matches!(err, SyncError::Adapter(AdapterError::Auth(_))));
    assert!(err.is_retryable());
    assert!(store.get_sync_state("federal-api").await.unwrap().is_none());
}

fn source_config(source: ContractSource) -> SourceConfig {
    SourceConfig {
        source,
        display_name: source.to_string(),
        enabled: true,
        cron: None,
        limit: 50,
        page_size: None,
        min_request_interval_ms: None,
        lookback_days: None,
        board_url: None,
        sender: None,
        label: None,
        agency_hint: None,
        place_hint: None,
    }
}

#[derive(Default)]
struct RecordingTransport {
    sent: Mutex<Vec<OutboundEmail>>,
}

#[async_trait]
impl EmailTransport for RecordingTransport {
    async fn send(&self, email: &OutboundEmail) -> Result<(), DispatchError> {
        self.sent.lock().await.push(email.clone());
        Ok(())
    }
}

fn fast_backoff() -> BackoffPolicy {
    BackoffPolicy {
        max_retries: 2,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(2),
    }
}

#[tokio::test]
async fn sync_request_flows_through_to_one_email() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::new());
    store
        .set_account("user-1", SubscriptionTier::Pro, Some("bids@prairie.example"))
        .await;
    let mut profile = CompanyProfile::new("user-1", "Prairie Mechanical", now());
    profile.certifications = [String::from("SB")].into();
    profile.preferred_states = [String::from("IL")].into();
    profile.alerts.alerts_enabled = true;
    profile.alerts.min_match_score = 70;
    store.save_profile(&profile).await.unwrap();

    let buffer = Arc::new(BufferedEventSink::new());
    let transport = Arc::new(RecordingTransport::default());
    let dispatcher = NotificationDispatcher::new(store.clone(), transport.clone(), "alerts@govlead.example");
    let runner = JobRunner::new(
        store.clone(),
        vec![SourceHandle {
            config: source_config(ContractSource::MunicipalScrape),
            adapter: Ok(board_adapter()),
        }],
        ArtifactStore::new(dir.path()),
        buffer.clone(),
        Scorer::default(),
        Ok(dispatcher),
    )
    .with_clock(now);

    buffer
        .emit(PipelineEvent::SyncRequested {
            source: ContractSource::MunicipalScrape,
        })
        .await
        .unwrap();
    let report = runner.drain_inline(&buffer).await;

    // sync -> contracts/synced -> alerts/sweep -> alerts/profile.check -> notifications/send
    assert_eq!(report.handled, 5);
    assert_eq!(report.failed, 0);

    let outbox = transport.sent.lock().await;
    assert_eq!(outbox.len(), 1);
    assert_eq!(outbox[0].to, "bids@prairie.example");
    // HVAC scores 73 (small-business set-aside, Illinois); fleet tires score 58.
    assert_eq!(outbox[0].subject, "1 new matching contract for Prairie Mechanical");
    assert!(outbox[0].html.contains("HVAC Maintenance"));

    let stored = store.get_profile(profile.id).await.unwrap().unwrap();
    assert_eq!(stored.alerts.last_alert_sent_at, Some(now()));
    assert_eq!(stored.alerts.last_alert_matches, 1);
}

#[tokio::test]
async fn retryable_failures_are_bounded_and_config_errors_are_not_retried() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::new());
    let down = Arc::new(DownAdapter {
        attempts: AtomicUsize::new(0),
        error: || AdapterError::Transport("connection reset".into()),
    });
    let runner = JobRunner::new(
        store,
        vec![
            SourceHandle {
                config: source_config(ContractSource::FederalApi),
                adapter: Ok(down.clone()),
            },
            SourceHandle {
                config: source_config(ContractSource::StateEmail),
                adapter: Err(ConfigError::MissingEnvVar("GMAIL_REFRESH_TOKEN".into())),
            },
        ],
        ArtifactStore::new(dir.path()),
        Arc::new(BufferedEventSink::new()),
        Scorer::default(),
        Err(ConfigError::MissingEnvVar("EMAIL_API_KEY".into())),
    )
    .with_backoff(fast_backoff())
    .with_clock(now);

    let federal = runner
        .handle(&PipelineEvent::SyncRequested {
            source: ContractSource::FederalApi,
        })
        .await;
    assert!(matches!(federal, Err(StepError::Retryable(_))));
    assert_eq!(down.attempts.load(Ordering::SeqCst), 3);

    let email = runner
        .handle(&PipelineEvent::SyncRequested {
            source: ContractSource::StateEmail,
        })
        .await;
    let Err(StepError::Fatal(err)) = email else {
        panic!("expected a fatal configuration failure");
    };
    assert!(err.to_string().contains("GMAIL_REFRESH_TOKEN"));

    let scrape = runner
        .handle(&PipelineEvent::SyncRequested {
            source: ContractSource::MunicipalScrape,
        })
        .await;
    assert!(matches!(scrape, Err(StepError::Fatal(_))));
}
