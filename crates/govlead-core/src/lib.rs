//! Core domain model for the contract lead pipeline.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

mod events;
mod filters;
mod store;

pub use events::{
    BufferedEventSink, EventSink, MatchedContractRef, NotificationJob, NotificationTarget,
    PipelineEvent,
};
pub use filters::{ContractSearchFilters, FilterValidationError};
pub use store::{
    AccountStore, AlertStore, ContractStore, ProfileStore, StoreError, StoreResult,
    SyncStateStore,
};

pub const CRATE_NAME: &str = "govlead-core";

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown {kind}: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

/// Upstream system a contract record was ingested from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContractSource {
    FederalApi,
    StateEmail,
    MunicipalScrape,
}

impl ContractSource {
    pub const ALL: [ContractSource; 3] = [
        ContractSource::FederalApi,
        ContractSource::StateEmail,
        ContractSource::MunicipalScrape,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContractSource::FederalApi => "federal-api",
            ContractSource::StateEmail => "state-email",
            ContractSource::MunicipalScrape => "municipal-scrape",
        }
    }

    /// Prefix used to namespace raw identifiers from sources without globally unique ids.
    pub fn id_prefix(&self) -> Option<&'static str> {
        match self {
            ContractSource::FederalApi => None,
            ContractSource::StateEmail => Some("STATE"),
            ContractSource::MunicipalScrape => Some("CITY"),
        }
    }

    pub fn namespaced_id(&self, raw_id: &str) -> String {
        let raw_id = raw_id.trim();
        match self.id_prefix() {
            Some(prefix) => format!("{prefix}_{raw_id}"),
            None => raw_id.to_string(),
        }
    }
}

impl fmt::Display for ContractSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContractSource {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ContractSource::ALL
            .into_iter()
            .find(|source| source.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownVariant {
                kind: "contract source",
                value: s.to_string(),
            })
    }
}

/// Canonical set-aside label space shared by every normalizer and the scoring engine.
///
/// `None` on a contract means full-and-open competition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SetAsideType {
    #[serde(rename = "SBA")]
    SmallBusiness,
    #[serde(rename = "8A")]
    EightA,
    #[serde(rename = "HUBZONE")]
    HubZone,
    #[serde(rename = "SDVOSB")]
    ServiceDisabledVeteranOwned,
    #[serde(rename = "WOSB")]
    WomenOwned,
    #[serde(rename = "EDWOSB")]
    EconomicallyDisadvantagedWomenOwned,
    #[serde(rename = "VOSB")]
    VeteranOwned,
    #[serde(rename = "ISBEE")]
    IndianSmallBusiness,
    #[serde(rename = "OTHER")]
    Other,
}

impl SetAsideType {
    pub const ALL: [SetAsideType; 9] = [
        SetAsideType::SmallBusiness,
        SetAsideType::EightA,
        SetAsideType::HubZone,
        SetAsideType::ServiceDisabledVeteranOwned,
        SetAsideType::WomenOwned,
        SetAsideType::EconomicallyDisadvantagedWomenOwned,
        SetAsideType::VeteranOwned,
        SetAsideType::IndianSmallBusiness,
        SetAsideType::Other,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            SetAsideType::SmallBusiness => "SBA",
            SetAsideType::EightA => "8A",
            SetAsideType::HubZone => "HUBZONE",
            SetAsideType::ServiceDisabledVeteranOwned => "SDVOSB",
            SetAsideType::WomenOwned => "WOSB",
            SetAsideType::EconomicallyDisadvantagedWomenOwned => "EDWOSB",
            SetAsideType::VeteranOwned => "VOSB",
            SetAsideType::IndianSmallBusiness => "ISBEE",
            SetAsideType::Other => "OTHER",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SetAsideType::SmallBusiness => "Small Business",
            SetAsideType::EightA => "8(a)",
            SetAsideType::HubZone => "HUBZone",
            SetAsideType::ServiceDisabledVeteranOwned => "Service-Disabled Veteran-Owned",
            SetAsideType::WomenOwned => "Women-Owned Small Business",
            SetAsideType::EconomicallyDisadvantagedWomenOwned => {
                "Economically Disadvantaged Women-Owned Small Business"
            }
            SetAsideType::VeteranOwned => "Veteran-Owned",
            SetAsideType::IndianSmallBusiness => "Indian Small Business Economic Enterprise",
            SetAsideType::Other => "Other Set-Aside",
        }
    }
}

impl FromStr for SetAsideType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SetAsideType::ALL
            .into_iter()
            .find(|kind| kind.code().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownVariant {
                kind: "set-aside type",
                value: s.to_string(),
            })
    }
}

/// Canonical record produced by every normalizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedContract {
    pub source_id: String,
    pub source: ContractSource,
    pub title: String,
    pub description: Option<String>,
    pub agency: Option<String>,
    pub sub_agency: Option<String>,
    pub solicitation_number: Option<String>,
    pub notice_type: Option<String>,
    pub contract_type: Option<String>,
    #[serde(default)]
    pub naics_codes: BTreeSet<String>,
    pub psc_code: Option<String>,
    pub set_aside_type: Option<SetAsideType>,
    pub estimated_value: Option<f64>,
    pub award_amount: Option<f64>,
    pub posted_date: Option<DateTime<Utc>>,
    pub response_deadline: Option<DateTime<Utc>>,
    pub archive_date: Option<DateTime<Utc>>,
    pub place_of_performance: Option<String>,
    pub source_url: Option<String>,
}

impl NormalizedContract {
    /// Empty record for `source_id`; normalizers fill in what the source reports.
    pub fn new(source: ContractSource, source_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            source,
            title: title.into(),
            description: None,
            agency: None,
            sub_agency: None,
            solicitation_number: None,
            notice_type: None,
            contract_type: None,
            naics_codes: BTreeSet::new(),
            psc_code: None,
            set_aside_type: None,
            estimated_value: None,
            award_amount: None,
            posted_date: None,
            response_deadline: None,
            archive_date: None,
            place_of_performance: None,
            source_url: None,
        }
    }

    /// Estimated value when known, otherwise the award amount.
    pub fn contract_value(&self) -> Option<f64> {
        self.estimated_value.or(self.award_amount)
    }
}

/// Persisted form of a [`NormalizedContract`] with lifecycle bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractLead {
    pub id: Uuid,
    #[serde(flatten)]
    pub contract: NormalizedContract,
    pub is_archived: bool,
    pub archived_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ContractLead {
    pub fn new(contract: NormalizedContract, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            contract,
            is_archived: false,
            archived_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// True when the archive sweep should retire this record. Both bounds are strict.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        if self.is_archived {
            return false;
        }
        let past = |at: Option<DateTime<Utc>>| at.is_some_and(|at| at < now);
        past(self.contract.response_deadline) || past(self.contract.archive_date)
    }

    /// True when a responder could still act on the record at `now`.
    pub fn is_open_at(&self, now: DateTime<Utc>) -> bool {
        !self.is_archived
            && self
                .contract
                .response_deadline
                .map_or(true, |deadline| deadline >= now)
    }

    /// Timestamp used for alert candidate windows: posted date, or first sighting.
    pub fn effective_posted_at(&self) -> DateTime<Utc> {
        self.contract.posted_date.unwrap_or(self.created_at)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpsertOutcome {
    Created(Uuid),
    Updated(Uuid),
}

impl UpsertOutcome {
    pub fn id(&self) -> Uuid {
        match self {
            UpsertOutcome::Created(id) | UpsertOutcome::Updated(id) => *id,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, UpsertOutcome::Created(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubscriptionTier {
    Free,
    Basic,
    Pro,
    Enterprise,
}

impl SubscriptionTier {
    pub fn receives_alerts(&self) -> bool {
        !matches!(self, SubscriptionTier::Free)
    }
}

impl FromStr for SubscriptionTier {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "FREE" => Ok(SubscriptionTier::Free),
            "BASIC" => Ok(SubscriptionTier::Basic),
            "PRO" => Ok(SubscriptionTier::Pro),
            "ENTERPRISE" => Ok(SubscriptionTier::Enterprise),
            _ => Err(UnknownVariant {
                kind: "subscription tier",
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AlertFrequency {
    Instant,
    #[default]
    Daily,
    Weekly,
}

impl AlertFrequency {
    pub fn min_gap_hours(&self) -> i64 {
        match self {
            AlertFrequency::Instant => 1,
            AlertFrequency::Daily => 24,
            AlertFrequency::Weekly => 168,
        }
    }

    pub fn min_gap(&self) -> Duration {
        Duration::hours(self.min_gap_hours())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertFrequency::Instant => "instant",
            AlertFrequency::Daily => "daily",
            AlertFrequency::Weekly => "weekly",
        }
    }
}

impl FromStr for AlertFrequency {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "instant" => Ok(AlertFrequency::Instant),
            "daily" => Ok(AlertFrequency::Daily),
            "weekly" => Ok(AlertFrequency::Weekly),
            _ => Err(UnknownVariant {
                kind: "alert frequency",
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileAlertSettings {
    pub alerts_enabled: bool,
    pub alert_frequency: AlertFrequency,
    pub min_match_score: u8,
    pub last_alert_sent_at: Option<DateTime<Utc>>,
    pub last_alert_matches: u32,
}

impl Default for ProfileAlertSettings {
    fn default() -> Self {
        Self {
            alerts_enabled: false,
            alert_frequency: AlertFrequency::Daily,
            min_match_score: 50,
            last_alert_sent_at: None,
            last_alert_matches: 0,
        }
    }
}

/// One per user; created and updated only through an explicit save.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyProfile {
    pub id: Uuid,
    pub user_id: String,
    pub company_name: String,
    #[serde(default)]
    pub naics_codes: BTreeSet<String>,
    #[serde(default)]
    pub certifications: BTreeSet<String>,
    #[serde(default)]
    pub preferred_states: BTreeSet<String>,
    pub min_contract_value: Option<f64>,
    pub max_contract_value: Option<f64>,
    #[serde(default)]
    pub alerts: ProfileAlertSettings,
    pub updated_at: DateTime<Utc>,
}

impl CompanyProfile {
    pub fn new(user_id: impl Into<String>, company_name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            company_name: company_name.into(),
            naics_codes: BTreeSet::new(),
            certifications: BTreeSet::new(),
            preferred_states: BTreeSet::new(),
            min_contract_value: None,
            max_contract_value: None,
            alerts: ProfileAlertSettings::default(),
            updated_at: now,
        }
    }
}

/// Named, reusable filter predicate owned by a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedSearch {
    pub id: Uuid,
    pub user_id: String,
    pub name: String,
    pub filters: ContractSearchFilters,
    pub created_at: DateTime<Utc>,
}

impl SavedSearch {
    pub fn new(
        user_id: impl Into<String>,
        name: impl Into<String>,
        filters: ContractSearchFilters,
        now: DateTime<Utc>,
    ) -> Result<Self, FilterValidationError> {
        let name = name.into().trim().to_string();
        if name.is_empty() {
            return Err(FilterValidationError::EmptyName);
        }
        filters.validate()?;
        Ok(Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            name,
            filters,
            created_at: now,
        })
    }
}

/// Alert settings paired one-to-one with a saved search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub user_id: String,
    pub saved_search_id: Uuid,
    pub frequency: AlertFrequency,
    pub is_active: bool,
    pub last_sent_at: Option<DateTime<Utc>>,
    pub last_match_count: u32,
    pub created_at: DateTime<Utc>,
}

impl Alert {
    pub fn new(saved_search: &SavedSearch, frequency: AlertFrequency, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: saved_search.user_id.clone(),
            saved_search_id: saved_search.id,
            frequency,
            is_active: true,
            last_sent_at: None,
            last_match_count: 0,
            created_at: now,
        }
    }
}

/// Per-sync-type bookkeeping row, upserted after each run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncState {
    pub sync_type: String,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub cursor: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl SyncState {
    pub fn empty(sync_type: impl Into<String>) -> Self {
        Self {
            sync_type: sync_type.into(),
            last_synced_at: None,
            cursor: None,
            metadata: serde_json::Value::Null,
        }
    }
}
