use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use govlead_core::{
    AccountStore, Alert, AlertStore, CompanyProfile, ContractLead, ContractSource, ContractStore,
    NormalizedContract, ProfileStore, SavedSearch, StoreError, StoreResult, SubscriptionTier,
    SyncState, SyncStateStore, UpsertOutcome,
};
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct Account {
    tier: SubscriptionTier,
    email: Option<String>,
}

#[derive(Debug, Default)]
struct MemoryState {
    contracts: BTreeMap<String, ContractLead>,
    sync_states: BTreeMap<String, SyncState>,
    saved_searches: BTreeMap<Uuid, SavedSearch>,
    alerts: BTreeMap<Uuid, Alert>,
    profiles: BTreeMap<Uuid, CompanyProfile>,
    accounts: HashMap<String, Account>,
}

/// In-process store with the same semantics as [`crate::PgStore`]. A single lock
/// makes every upsert and compare-and-swap atomic.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_account(&self, user_id: &str, tier: SubscriptionTier, email: Option<&str>) {
        self.state.lock().await.accounts.insert(
            user_id.to_string(),
            Account {
                tier,
                email: email.map(ToString::to_string),
            },
        );
    }

    pub async fn all_contracts(&self) -> Vec<ContractLead> {
        self.state.lock().await.contracts.values().cloned().collect()
    }
}

#[async_trait]
impl ContractStore for MemoryStore {
    async fn upsert_contract(
        &self,
        contract: &NormalizedContract,
        now: DateTime<Utc>,
    ) -> StoreResult<UpsertOutcome> {
        if contract.source_id.trim().is_empty() {
            return Err(StoreError::Invalid("source_id must not be empty".into()));
        }
        let mut state = self.state.lock().await;
        match state.contracts.get_mut(&contract.source_id) {
            Some(existing) => {
                existing.contract = contract.clone();
                existing.updated_at = now;
                Ok(UpsertOutcome::Updated(existing.id))
            }
            None => {
                let lead = ContractLead::new(contract.clone(), now);
                let id = lead.id;
                state.contracts.insert(contract.source_id.clone(), lead);
                Ok(UpsertOutcome::Created(id))
            }
        }
    }

    async fn find_by_source_id(&self, source_id: &str) -> StoreResult<Option<ContractLead>> {
        Ok(self.state.lock().await.contracts.get(source_id).cloned())
    }

    async fn find_by_ids(&self, ids: &[Uuid]) -> StoreResult<Vec<ContractLead>> {
        let state = self.state.lock().await;
        let by_id: HashMap<Uuid, &ContractLead> =
            state.contracts.values().map(|lead| (lead.id, lead)).collect();
        Ok(ids
            .iter()
            .filter_map(|id| by_id.get(id).map(|lead| (*lead).clone()))
            .collect())
    }

    async fn find_candidates(
        &self,
        posted_since: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<ContractLead>> {
        let state = self.state.lock().await;
        let mut out: Vec<ContractLead> = state
            .contracts
            .values()
            .filter(|lead| lead.is_open_at(now) && lead.effective_posted_at() >= posted_since)
            .cloned()
            .collect();
        out.sort_by(|a, b| {
            b.effective_posted_at()
                .cmp(&a.effective_posted_at())
                .then_with(|| a.contract.source_id.cmp(&b.contract.source_id))
        });
        Ok(out)
    }

    async fn archive_expired(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let mut state = self.state.lock().await;
        let mut archived = 0;
        for lead in state.contracts.values_mut() {
            if lead.is_expired_at(now) {
                lead.is_archived = true;
                lead.archived_at = Some(now);
                archived += 1;
            }
        }
        Ok(archived)
    }

    async fn count_contracts(&self, source: Option<ContractSource>) -> StoreResult<u64> {
        let state = self.state.lock().await;
        Ok(state
            .contracts
            .values()
            .filter(|lead| source.map_or(true, |s| lead.contract.source == s))
            .count() as u64)
    }
}

#[async_trait]
impl SyncStateStore for MemoryStore {
    async fn get_sync_state(&self, sync_type: &str) -> StoreResult<Option<SyncState>> {
        Ok(self.state.lock().await.sync_states.get(sync_type).cloned())
    }

    async fn upsert_sync_state(&self, sync_state: &SyncState) -> StoreResult<()> {
        self.state
            .lock()
            .await
            .sync_states
            .insert(sync_state.sync_type.clone(), sync_state.clone());
        Ok(())
    }
}

#[async_trait]
impl AlertStore for MemoryStore {
    async fn create_saved_search(&self, search: &SavedSearch) -> StoreResult<()> {
        search.filters.validate()?;
        self.state
            .lock()
            .await
            .saved_searches
            .insert(search.id, search.clone());
        Ok(())
    }

    async fn get_saved_search(&self, id: Uuid) -> StoreResult<Option<SavedSearch>> {
        Ok(self.state.lock().await.saved_searches.get(&id).cloned())
    }

    async fn create_alert(&self, alert: &Alert) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        if !state.saved_searches.contains_key(&alert.saved_search_id) {
            return Err(StoreError::NotFound(format!(
                "saved search {}",
                alert.saved_search_id
            )));
        }
        let duplicate = state.alerts.values().any(|existing| {
            existing.user_id == alert.user_id && existing.saved_search_id == alert.saved_search_id
        });
        if duplicate {
            return Err(StoreError::Conflict(format!(
                "alert already exists for saved search {}",
                alert.saved_search_id
            )));
        }
        state.alerts.insert(alert.id, alert.clone());
        Ok(())
    }

    async fn get_alert(&self, id: Uuid) -> StoreResult<Option<Alert>> {
        Ok(self.state.lock().await.alerts.get(&id).cloned())
    }

    async fn list_active_alerts(&self) -> StoreResult<Vec<Alert>> {
        Ok(self
            .state
            .lock()
            .await
            .alerts
            .values()
            .filter(|alert| alert.is_active)
            .cloned()
            .collect())
    }

    async fn record_alert_sent(
        &self,
        alert_id: Uuid,
        expected: Option<DateTime<Utc>>,
        sent_at: Option<DateTime<Utc>>,
        match_count: u32,
    ) -> StoreResult<bool> {
        let mut state = self.state.lock().await;
        let alert = state
            .alerts
            .get_mut(&alert_id)
            .ok_or_else(|| StoreError::NotFound(format!("alert {alert_id}")))?;
        if alert.last_sent_at != expected {
            return Ok(false);
        }
        alert.last_sent_at = sent_at;
        alert.last_match_count = match_count;
        Ok(true)
    }
}

#[async_trait]
impl ProfileStore for MemoryStore {
    async fn save_profile(&self, profile: &CompanyProfile) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        let taken = state
            .profiles
            .values()
            .any(|existing| existing.user_id == profile.user_id && existing.id != profile.id);
        if taken {
            return Err(StoreError::Conflict(format!(
                "user {} already has a profile",
                profile.user_id
            )));
        }
        state.profiles.insert(profile.id, profile.clone());
        Ok(())
    }

    async fn get_profile(&self, id: Uuid) -> StoreResult<Option<CompanyProfile>> {
        Ok(self.state.lock().await.profiles.get(&id).cloned())
    }

    async fn list_alert_enabled_profiles(&self) -> StoreResult<Vec<CompanyProfile>> {
        Ok(self
            .state
            .lock()
            .await
            .profiles
            .values()
            .filter(|profile| profile.alerts.alerts_enabled)
            .cloned()
            .collect())
    }

    async fn record_profile_alert(
        &self,
        profile_id: Uuid,
        expected: Option<DateTime<Utc>>,
        sent_at: Option<DateTime<Utc>>,
        match_count: u32,
    ) -> StoreResult<bool> {
        let mut state = self.state.lock().await;
        let profile = state
            .profiles
            .get_mut(&profile_id)
            .ok_or_else(|| StoreError::NotFound(format!("profile {profile_id}")))?;
        if profile.alerts.last_alert_sent_at != expected {
            return Ok(false);
        }
        profile.alerts.last_alert_sent_at = sent_at;
        profile.alerts.last_alert_matches = match_count;
        Ok(true)
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn subscription_tier(&self, user_id: &str) -> StoreResult<SubscriptionTier> {
        Ok(self
            .state
            .lock()
            .await
            .accounts
            .get(user_id)
            .map(|account| account.tier)
            .unwrap_or(SubscriptionTier::Free))
    }

    async fn notification_email(&self, user_id: &str) -> StoreResult<Option<String>> {
        Ok(self
            .state
            .lock()
            .await
            .accounts
            .get(user_id)
            .and_then(|account| account.email.clone()))
    }
}
