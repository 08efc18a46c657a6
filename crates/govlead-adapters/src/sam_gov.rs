//! Federal opportunities from the SAM.gov v2 search API.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, NaiveDate};
use govlead_core::ContractSource;
use govlead_storage::{HttpFetcher, RequestSpacer};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{AdapterContext, AdapterError, RawItem, SourceAdapter};

pub const DEFAULT_SAM_BASE_URL: &str = "https://api.sam.gov";

/// One opportunity as returned in `opportunitiesData`. Only the fields the
/// normalizer reads are modelled; everything is optional on the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SamOpportunity {
    pub notice_id: Option<String>,
    pub title: Option<String>,
    pub solicitation_number: Option<String>,
    pub full_parent_path_name: Option<String>,
    pub posted_date: Option<String>,
    #[serde(rename = "type")]
    pub notice_type: Option<String>,
    pub base_type: Option<String>,
    pub archive_date: Option<String>,
    pub type_of_set_aside: Option<String>,
    pub type_of_set_aside_description: Option<String>,
    #[serde(rename = "responseDeadLine")]
    pub response_deadline: Option<String>,
    pub naics_code: Option<String>,
    pub naics_codes: Option<Vec<String>>,
    pub classification_code: Option<String>,
    pub description: Option<String>,
    pub ui_link: Option<String>,
    pub award: Option<SamAward>,
    pub place_of_performance: Option<SamPlace>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamAward {
    pub amount: Option<serde_json::Value>,
    pub date: Option<String>,
    pub number: Option<String>,
}

impl SamAward {
    /// The API reports amounts as either JSON numbers or numeric strings.
    pub fn amount(&self) -> Option<f64> {
        match self.amount.as_ref()? {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => s.trim().replace(',', "").parse().ok(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamPlace {
    pub city: Option<SamCode>,
    pub state: Option<SamCode>,
    pub zip: Option<String>,
    pub country: Option<SamCode>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamCode {
    pub code: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SamSearchPage {
    pub total_records: Option<u64>,
    pub opportunities_data: Vec<SamOpportunity>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamSearchQuery {
    pub posted_from: NaiveDate,
    pub posted_to: NaiveDate,
    pub limit: usize,
    pub offset: usize,
}

/// Transport for one page of search results.
#[async_trait]
pub trait SamPageSource: Send + Sync {
    async fn fetch_page(&self, query: &SamSearchQuery) -> Result<SamSearchPage, AdapterError>;
}

pub struct HttpSamPageSource {
    fetcher: Arc<HttpFetcher>,
    base_url: String,
    api_key: SecretString,
}

impl HttpSamPageSource {
    pub fn new(fetcher: Arc<HttpFetcher>, base_url: impl Into<String>, api_key: SecretString) -> Self {
        Self {
            fetcher,
            base_url: base_url.into(),
            api_key,
        }
    }
}

#[async_trait]
impl SamPageSource for HttpSamPageSource {
    async fn fetch_page(&self, query: &SamSearchQuery) -> Result<SamSearchPage, AdapterError> {
        let url = format!("{}/opportunities/v2/search", self.base_url.trim_end_matches('/'));
        let params = [
            ("api_key", self.api_key.expose_secret().to_string()),
            ("postedFrom", query.posted_from.format("%m/%d/%Y").to_string()),
            ("postedTo", query.posted_to.format("%m/%d/%Y").to_string()),
            ("limit", query.limit.to_string()),
            ("offset", query.offset.to_string()),
        ];
        let response = self
            .fetcher
            .execute(ContractSource::FederalApi.as_str(), |client| {
                client.get(&url).query(&params)
            })
            .await?;
        response
            .json::<SamSearchPage>()
            .map_err(|err| AdapterError::Decode(format!("{err:#}")))
    }
}

#[derive(Debug, Clone)]
pub struct SamGovSettings {
    pub page_size: usize,
    pub min_request_interval: Duration,
    pub lookback_days: i64,
}

impl Default for SamGovSettings {
    fn default() -> Self {
        Self {
            page_size: 100,
            min_request_interval: Duration::from_millis(1000),
            lookback_days: 3,
        }
    }
}

pub struct SamGovAdapter {
    pages: Arc<dyn SamPageSource>,
    spacer: RequestSpacer,
    settings: SamGovSettings,
}

impl SamGovAdapter {
    pub fn new(pages: Arc<dyn SamPageSource>, settings: SamGovSettings) -> Self {
        Self {
            spacer: RequestSpacer::new(settings.min_request_interval),
            pages,
            settings,
        }
    }

    /// Posted-date window: one day of overlap with the previous run, or the
    /// configured lookback when the source has never synced.
    pub fn posted_window(&self, ctx: &AdapterContext) -> (NaiveDate, NaiveDate) {
        let from = match ctx.last_synced_at {
            Some(last) => last - ChronoDuration::days(1),
            None => ctx.now - ChronoDuration::days(self.settings.lookback_days.max(0)),
        };
        (from.date_naive(), ctx.now.date_naive())
    }
}

#[async_trait]
impl SourceAdapter for SamGovAdapter {
    fn source(&self) -> ContractSource {
        ContractSource::FederalApi
    }

    async fn fetch(&self, ctx: &AdapterContext, limit: usize) -> Result<Vec<RawItem>, AdapterError> {
        let (posted_from, posted_to) = self.posted_window(ctx);
        let page_size = self.settings.page_size.max(1);
        let mut items = Vec::new();
        let mut offset = 0;

        while items.len() < limit {
            let requested = page_size.min(limit - items.len());
            let query = SamSearchQuery {
                posted_from,
                posted_to,
                limit: requested,
                offset,
            };
            self.spacer.wait_turn().await;
            let page = self.pages.fetch_page(&query).await?;
            let received = page.opportunities_data.len();
            debug!(run_id = %ctx.run_id, offset, received, total = ?page.total_records, "fetched SAM page");

            items.extend(
                page.opportunities_data
                    .into_iter()
                    .take(limit - items.len())
                    .map(RawItem::Federal),
            );
            if received < requested {
                break;
            }
            offset += received;
        }

        info!(run_id = %ctx.run_id, %posted_from, %posted_to, fetched = items.len(), "SAM fetch complete");
        Ok(items)
    }
}
