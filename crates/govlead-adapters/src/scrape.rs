//! Municipal bid boards scraped to markdown through a hosted scrape API.

use std::sync::Arc;

use async_trait::async_trait;
use govlead_core::ContractSource;
use govlead_storage::HttpFetcher;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::parse::extract_bid_id;
use crate::{AdapterContext, AdapterError, RawItem, SourceAdapter, SourceHints};

pub const DEFAULT_SCRAPE_ENDPOINT: &str = "https://api.firecrawl.dev";

/// One listing block cut out of a scraped board page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapedListing {
    pub page_url: String,
    pub position: usize,
    pub block: String,
    pub hints: SourceHints,
}

#[async_trait]
pub trait ScrapeClient: Send + Sync {
    /// Rendered page content as markdown.
    async fn scrape_markdown(&self, url: &str) -> Result<String, AdapterError>;
}

pub struct HttpScrapeClient {
    fetcher: Arc<HttpFetcher>,
    endpoint: String,
    api_key: SecretString,
}

#[derive(Debug, Deserialize)]
struct ScrapeResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    data: Option<ScrapeData>,
}

#[derive(Debug, Deserialize)]
struct ScrapeData {
    #[serde(default)]
    markdown: Option<String>,
}

impl HttpScrapeClient {
    pub fn new(fetcher: Arc<HttpFetcher>, endpoint: impl Into<String>, api_key: SecretString) -> Self {
        Self {
            fetcher,
            endpoint: endpoint.into(),
            api_key,
        }
    }
}

#[async_trait]
impl ScrapeClient for HttpScrapeClient {
    async fn scrape_markdown(&self, url: &str) -> Result<String, AdapterError> {
        let endpoint = format!("{}/v1/scrape", self.endpoint.trim_end_matches('/'));
        let body = serde_json::json!({
            "url": url,
            "formats": ["markdown"],
            "onlyMainContent": true,
        });
        let response = self
            .fetcher
            .execute(ContractSource::MunicipalScrape.as_str(), |client| {
                client
                    .post(&endpoint)
                    .bearer_auth(self.api_key.expose_secret())
                    .json(&body)
            })
            .await?;
        let decoded: ScrapeResponse = response
            .json()
            .map_err(|err| AdapterError::Decode(format!("{err:#}")))?;
        if !decoded.success {
            return Err(AdapterError::Transport(format!(
                "scrape of {url} failed: {}",
                decoded.error.unwrap_or_else(|| "unknown error".into())
            )));
        }
        Ok(decoded.data.and_then(|d| d.markdown).unwrap_or_default())
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScrapeSettings {
    pub board_url: String,
    pub hints: SourceHints,
}

pub struct MunicipalScrapeAdapter {
    client: Arc<dyn ScrapeClient>,
    settings: ScrapeSettings,
}

impl MunicipalScrapeAdapter {
    pub fn new(client: Arc<dyn ScrapeClient>, settings: ScrapeSettings) -> Self {
        Self { client, settings }
    }
}

#[async_trait]
impl SourceAdapter for MunicipalScrapeAdapter {
    fn source(&self) -> ContractSource {
        ContractSource::MunicipalScrape
    }

    async fn fetch(&self, ctx: &AdapterContext, limit: usize) -> Result<Vec<RawItem>, AdapterError> {
        if self.settings.board_url.trim().is_empty() {
            return Err(AdapterError::Config("municipal board url is not configured".into()));
        }
        let markdown = self.client.scrape_markdown(&self.settings.board_url).await?;
        let blocks = split_listings(&markdown);
        let total = blocks.len();

        let items: Vec<RawItem> = blocks
            .into_iter()
            .enumerate()
            .filter(|(position, block)| {
                let keep = extract_bid_id(block).is_some();
                if !keep {
                    debug!(run_id = %ctx.run_id, position, "dropping board block without an identifier");
                }
                keep
            })
            .take(limit)
            .map(|(position, block)| {
                RawItem::Municipal(ScrapedListing {
                    page_url: self.settings.board_url.clone(),
                    position,
                    block,
                    hints: self.settings.hints.clone(),
                })
            })
            .collect();

        info!(run_id = %ctx.run_id, blocks = total, listings = items.len(), "board scrape complete");
        Ok(items)
    }
}

/// Cuts a board page into one block per listing. Markdown tables win; each
/// row becomes `Header: cell` lines. Otherwise headings and horizontal rules
/// delimit sections.
pub fn split_listings(markdown: &str) -> Vec<String> {
    let rows = table_rows(markdown);
    if !rows.is_empty() {
        return rows;
    }
    sections(markdown)
}

fn table_cells(line: &str) -> Vec<String> {
    let inner = line.trim().trim_start_matches('|').trim_end_matches('|');
    inner.split('|').map(|cell| cell.trim().to_string()).collect()
}

fn is_separator_row(line: &str) -> bool {
    let cells = table_cells(line);
    !cells.is_empty()
        && cells
            .iter()
            .all(|c| !c.is_empty() && c.chars().all(|ch| matches!(ch, '-' | ':' | ' ')))
}

fn table_rows(markdown: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut header: Option<Vec<String>> = None;
    let mut saw_separator = false;

    for line in markdown.lines() {
        let trimmed = line.trim();
        if !trimmed.starts_with('|') {
            header = None;
            saw_separator = false;
            continue;
        }
        match &header {
            None => {
                header = Some(table_cells(trimmed));
                saw_separator = false;
            }
            Some(_) if !saw_separator && is_separator_row(trimmed) => saw_separator = true,
            Some(columns) if saw_separator => {
                let block = columns
                    .iter()
                    .zip(table_cells(trimmed))
                    .filter(|(_, cell)| !cell.is_empty())
                    .map(|(column, cell)| {
                        if column.is_empty() {
                            cell
                        } else {
                            format!("{column}: {cell}")
                        }
                    })
                    .collect::<Vec<_>>()
                    .join("\n");
                if !block.is_empty() {
                    blocks.push(block);
                }
            }
            Some(_) => {}
        }
    }
    blocks
}

fn sections(markdown: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    let mut flush = |current: &mut Vec<&str>| {
        let block = current.join("\n").trim().to_string();
        if !block.is_empty() {
            blocks.push(block);
        }
        current.clear();
    };

    for line in markdown.lines() {
        let trimmed = line.trim();
        let is_rule = trimmed.len() >= 3
            && (trimmed.chars().all(|c| c == '-')
                || trimmed.chars().all(|c| c == '*')
                || trimmed.chars().all(|c| c == '_'));
        if is_rule {
            flush(&mut current);
            continue;
        }
        if trimmed.starts_with('#') {
            flush(&mut current);
        }
        current.push(line);
    }
    flush(&mut current);
    blocks
}
