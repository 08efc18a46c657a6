//! Source adapters, notice-text parsers and normalizers.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use govlead_core::{ContractSource, NormalizedContract};
use govlead_storage::FetchError;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub mod email;
pub mod normalize;
pub mod parse;
pub mod sam_gov;
pub mod scrape;

pub use email::{
    EmailMessage, EmailNotice, EmailSettings, GmailCredentials, GmailMailbox, Mailbox,
    StateEmailAdapter,
};
pub use sam_gov::{
    HttpSamPageSource, SamGovAdapter, SamGovSettings, SamOpportunity, SamPageSource,
    SamSearchPage, SamSearchQuery,
};
pub use scrape::{
    HttpScrapeClient, MunicipalScrapeAdapter, ScrapeClient, ScrapeSettings, ScrapedListing,
};

pub const CRATE_NAME: &str = "govlead-adapters";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterContext {
    pub run_id: Uuid,
    pub now: DateTime<Utc>,
    /// `SyncState.last_synced_at` for the source, when it has synced before.
    pub last_synced_at: Option<DateTime<Utc>>,
}

/// Per-source defaults for fields a notice rarely states about itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceHints {
    pub agency: Option<String>,
    pub place_of_performance: Option<String>,
}

/// Source-specific raw shape, before normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "item", rename_all = "snake_case")]
pub enum RawItem {
    Federal(SamOpportunity),
    Municipal(ScrapedListing),
    StateEmail(EmailNotice),
}

impl RawItem {
    pub fn source(&self) -> ContractSource {
        match self {
            RawItem::Federal(_) => ContractSource::FederalApi,
            RawItem::Municipal(_) => ContractSource::MunicipalScrape,
            RawItem::StateEmail(_) => ContractSource::StateEmail,
        }
    }

    /// Stable identifier for logs and quarantine records.
    pub fn key(&self) -> String {
        match self {
            RawItem::Federal(opportunity) => opportunity
                .notice_id
                .clone()
                .unwrap_or_else(|| "<missing notice id>".to_string()),
            RawItem::Municipal(listing) => format!("{}#{}", listing.page_url, listing.position),
            RawItem::StateEmail(notice) => notice.message.id.clone(),
        }
    }

    /// Original payload bytes and a file extension, for the artifact store.
    pub fn payload(&self) -> (&'static str, Vec<u8>) {
        match self {
            RawItem::Federal(opportunity) => {
                ("json", serde_json::to_vec_pretty(opportunity).unwrap_or_default())
            }
            RawItem::Municipal(listing) => ("md", listing.block.clone().into_bytes()),
            RawItem::StateEmail(notice) => match (&notice.message.html_body, &notice.message.text_body) {
                (Some(html), _) => ("html", html.clone().into_bytes()),
                (None, Some(text)) => ("txt", text.clone().into_bytes()),
                (None, None) => ("txt", Vec::new()),
            },
        }
    }
}

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("authentication rejected: {0}")]
    Auth(String),
    #[error("source misconfigured: {0}")]
    Config(String),
    #[error("could not decode source response: {0}")]
    Decode(String),
}

impl AdapterError {
    /// Configuration problems will not fix themselves on retry.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, AdapterError::Config(_))
    }
}

impl From<FetchError> for AdapterError {
    fn from(err: FetchError) -> Self {
        if err.is_auth() {
            AdapterError::Auth(err.to_string())
        } else {
            AdapterError::Transport(err.to_string())
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("unparseable item: {reason}")]
    Unparseable { reason: String },
    #[error("required field {0} is missing")]
    MissingField(&'static str),
    #[error("{found} item handed to the {expected} adapter")]
    SourceMismatch {
        expected: ContractSource,
        found: ContractSource,
    },
}

impl NormalizeError {
    /// Items worth keeping in quarantine rather than just counting as failed.
    pub fn is_unparseable(&self) -> bool {
        matches!(self, NormalizeError::Unparseable { .. })
    }
}

#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn source(&self) -> ContractSource;

    /// Raw items available now, at most `limit`. No data is an empty vec,
    /// never an error.
    async fn fetch(&self, ctx: &AdapterContext, limit: usize) -> Result<Vec<RawItem>, AdapterError>;

    fn normalize(&self, item: &RawItem) -> Result<NormalizedContract, NormalizeError> {
        if item.source() != self.source() {
            return Err(NormalizeError::SourceMismatch {
                expected: self.source(),
                found: item.source(),
            });
        }
        normalize::normalize_item(item)
    }

    /// Called once the item has been durably handled.
    async fn acknowledge(&self, _item: &RawItem) -> Result<(), AdapterError> {
        Ok(())
    }
}
