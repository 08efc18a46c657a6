//! Persistence seams consumed by the pipeline. Implementations live in `govlead-storage`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::{
    Alert, CompanyProfile, ContractLead, ContractSource, FilterValidationError, NormalizedContract,
    SavedSearch, SubscriptionTier, SyncState, UpsertOutcome,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("invalid record: {0}")]
    Invalid(String),
    #[error(transparent)]
    Validation(#[from] FilterValidationError),
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait ContractStore: Send + Sync {
    /// Atomic create-or-overwrite keyed on `source_id`. Lifecycle fields
    /// (`is_archived`, `archived_at`, `created_at`) are never touched by an update.
    async fn upsert_contract(
        &self,
        contract: &NormalizedContract,
        now: DateTime<Utc>,
    ) -> StoreResult<UpsertOutcome>;

    async fn find_by_source_id(&self, source_id: &str) -> StoreResult<Option<ContractLead>>;

    /// Contracts for `ids`, in the order given; unknown ids are skipped.
    async fn find_by_ids(&self, ids: &[Uuid]) -> StoreResult<Vec<ContractLead>>;

    /// Unarchived contracts first seen or posted at/after `posted_since`
    /// whose deadline has not passed at `now`.
    async fn find_candidates(
        &self,
        posted_since: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<ContractLead>>;

    /// Marks every expired, unarchived record archived. Returns how many changed.
    async fn archive_expired(&self, now: DateTime<Utc>) -> StoreResult<u64>;

    async fn count_contracts(&self, source: Option<ContractSource>) -> StoreResult<u64>;
}

#[async_trait]
pub trait SyncStateStore: Send + Sync {
    async fn get_sync_state(&self, sync_type: &str) -> StoreResult<Option<SyncState>>;
    async fn upsert_sync_state(&self, state: &SyncState) -> StoreResult<()>;
}

#[async_trait]
pub trait AlertStore: Send + Sync {
    /// Validates the filter predicate before persisting.
    async fn create_saved_search(&self, search: &SavedSearch) -> StoreResult<()>;
    async fn get_saved_search(&self, id: Uuid) -> StoreResult<Option<SavedSearch>>;
    async fn create_alert(&self, alert: &Alert) -> StoreResult<()>;
    async fn get_alert(&self, id: Uuid) -> StoreResult<Option<Alert>>;
    async fn list_active_alerts(&self) -> StoreResult<Vec<Alert>>;

    /// Compare-and-swap on `last_sent_at`: writes only when the stored value
    /// still equals `expected`. Returns whether the write happened.
    async fn record_alert_sent(
        &self,
        alert_id: Uuid,
        expected: Option<DateTime<Utc>>,
        sent_at: Option<DateTime<Utc>>,
        match_count: u32,
    ) -> StoreResult<bool>;
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn save_profile(&self, profile: &CompanyProfile) -> StoreResult<()>;
    async fn get_profile(&self, id: Uuid) -> StoreResult<Option<CompanyProfile>>;
    async fn list_alert_enabled_profiles(&self) -> StoreResult<Vec<CompanyProfile>>;

    /// Compare-and-swap on `alerts.last_alert_sent_at`, see [`AlertStore::record_alert_sent`].
    async fn record_profile_alert(
        &self,
        profile_id: Uuid,
        expected: Option<DateTime<Utc>>,
        sent_at: Option<DateTime<Utc>>,
        match_count: u32,
    ) -> StoreResult<bool>;
}

/// Read-only view over identity and billing state owned by the web application.
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn subscription_tier(&self, user_id: &str) -> StoreResult<SubscriptionTier>;
    async fn notification_email(&self, user_id: &str) -> StoreResult<Option<String>>;
}
