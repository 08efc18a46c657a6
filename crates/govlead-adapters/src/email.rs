//! State procurement notifications delivered to a Gmail inbox.
//!
//! Messages are only marked read through [`SourceAdapter::acknowledge`], which
//! the orchestrator calls once an item is stored or quarantined. A crash in
//! between leaves the message unread, and the next run re-processes it.

use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use govlead_core::ContractSource;
use govlead_storage::{FetchError, HttpFetcher};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::{AdapterContext, AdapterError, RawItem, SourceAdapter, SourceHints};

pub const DEFAULT_GMAIL_API_BASE: &str = "https://gmail.googleapis.com";
pub const DEFAULT_GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmailMessage {
    pub id: String,
    pub thread_id: Option<String>,
    pub subject: Option<String>,
    pub from: Option<String>,
    pub received_at: Option<DateTime<Utc>>,
    pub html_body: Option<String>,
    pub text_body: Option<String>,
}

/// A fetched message together with the source's configured defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailNotice {
    pub message: EmailMessage,
    pub hints: SourceHints,
}

#[async_trait]
pub trait Mailbox: Send + Sync {
    async fn list_unread(&self, query: &str, max: usize) -> Result<Vec<String>, AdapterError>;
    async fn get_message(&self, id: &str) -> Result<EmailMessage, AdapterError>;
    async fn mark_read(&self, id: &str) -> Result<(), AdapterError>;
}

pub struct GmailCredentials {
    pub client_id: String,
    pub client_secret: SecretString,
    pub refresh_token: SecretString,
}

struct CachedToken {
    access_token: SecretString,
    expires_at: DateTime<Utc>,
}

pub struct GmailMailbox {
    fetcher: Arc<HttpFetcher>,
    api_base: String,
    token_url: String,
    credentials: GmailCredentials,
    token: Mutex<Option<CachedToken>>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct MessageList {
    messages: Vec<MessageRef>,
}

#[derive(Debug, Deserialize)]
struct MessageRef {
    id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct GmailMessage {
    id: String,
    thread_id: Option<String>,
    internal_date: Option<String>,
    payload: Option<MessagePart>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct MessagePart {
    mime_type: Option<String>,
    headers: Vec<Header>,
    body: Option<PartBody>,
    parts: Vec<MessagePart>,
}

#[derive(Debug, Deserialize)]
struct Header {
    name: String,
    value: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PartBody {
    data: Option<String>,
}

impl GmailMailbox {
    pub fn new(fetcher: Arc<HttpFetcher>, credentials: GmailCredentials) -> Self {
        Self::with_endpoints(fetcher, credentials, DEFAULT_GMAIL_API_BASE, DEFAULT_GOOGLE_TOKEN_URL)
    }

    pub fn with_endpoints(
        fetcher: Arc<HttpFetcher>,
        credentials: GmailCredentials,
        api_base: impl Into<String>,
        token_url: impl Into<String>,
    ) -> Self {
        Self {
            fetcher,
            api_base: api_base.into(),
            token_url: token_url.into(),
            credentials,
            token: Mutex::new(None),
        }
    }

    /// Exchanges the refresh token for an access token, reusing a cached one
    /// until a minute before it expires.
    async fn access_token(&self) -> Result<String, AdapterError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at > Utc::now() + Duration::seconds(60) {
                return Ok(token.access_token.expose_secret().to_string());
            }
        }

        let form = [
            ("client_id", self.credentials.client_id.clone()),
            (
                "client_secret",
                self.credentials.client_secret.expose_secret().to_string(),
            ),
            (
                "refresh_token",
                self.credentials.refresh_token.expose_secret().to_string(),
            ),
            ("grant_type", "refresh_token".to_string()),
        ];
        let response = self
            .fetcher
            .execute(ContractSource::StateEmail.as_str(), |client| {
                client.post(&self.token_url).form(&form)
            })
            .await
            .map_err(|err| {
                if matches!(err, FetchError::HttpStatus { status: 400, .. }) {
                    AdapterError::Auth(err.to_string())
                } else {
                    AdapterError::from(err)
                }
            })?;
        let token: TokenResponse = response
            .json()
            .map_err(|err| AdapterError::Decode(format!("{err:#}")))?;

        let access_token = token.access_token.clone();
        *cached = Some(CachedToken {
            access_token: SecretString::new(token.access_token.into()),
            expires_at: Utc::now() + Duration::seconds(token.expires_in.unwrap_or(3600)),
        });
        debug!("refreshed mailbox access token");
        Ok(access_token)
    }

    fn messages_url(&self) -> String {
        format!("{}/gmail/v1/users/me/messages", self.api_base.trim_end_matches('/'))
    }
}

#[async_trait]
impl Mailbox for GmailMailbox {
    async fn list_unread(&self, query: &str, max: usize) -> Result<Vec<String>, AdapterError> {
        let token = self.access_token().await?;
        let url = self.messages_url();
        let max_results = max.clamp(1, 500).to_string();
        let response = self
            .fetcher
            .execute(ContractSource::StateEmail.as_str(), |client| {
                client
                    .get(&url)
                    .bearer_auth(&token)
                    .query(&[("q", query), ("maxResults", max_results.as_str())])
            })
            .await?;
        let list: MessageList = response
            .json()
            .map_err(|err| AdapterError::Decode(format!("{err:#}")))?;
        Ok(list.messages.into_iter().map(|m| m.id).take(max).collect())
    }

    async fn get_message(&self, id: &str) -> Result<EmailMessage, AdapterError> {
        let token = self.access_token().await?;
        let url = format!("{}/{id}", self.messages_url());
        let response = self
            .fetcher
            .execute(ContractSource::StateEmail.as_str(), |client| {
                client.get(&url).bearer_auth(&token).query(&[("format", "full")])
            })
            .await?;
        let message: GmailMessage = response
            .json()
            .map_err(|err| AdapterError::Decode(format!("{err:#}")))?;
        Ok(decode_gmail_message(message))
    }

    async fn mark_read(&self, id: &str) -> Result<(), AdapterError> {
        let token = self.access_token().await?;
        let url = format!("{}/{id}/modify", self.messages_url());
        let body = serde_json::json!({ "removeLabelIds": ["UNREAD"] });
        self.fetcher
            .execute(ContractSource::StateEmail.as_str(), |client| {
                client.post(&url).bearer_auth(&token).json(&body)
            })
            .await?;
        Ok(())
    }
}

fn decode_gmail_message(message: GmailMessage) -> EmailMessage {
    let mut html_body = None;
    let mut text_body = None;
    let mut subject = None;
    let mut from = None;

    if let Some(payload) = &message.payload {
        for header in &payload.headers {
            if header.name.eq_ignore_ascii_case("subject") {
                subject = Some(header.value.clone());
            } else if header.name.eq_ignore_ascii_case("from") {
                from = Some(header.value.clone());
            }
        }
        collect_bodies(payload, &mut html_body, &mut text_body);
    }

    let received_at = message
        .internal_date
        .as_deref()
        .and_then(|ms| ms.parse::<i64>().ok())
        .and_then(DateTime::<Utc>::from_timestamp_millis);

    EmailMessage {
        id: message.id,
        thread_id: message.thread_id,
        subject,
        from,
        received_at,
        html_body,
        text_body,
    }
}

fn collect_bodies(part: &MessagePart, html: &mut Option<String>, text: &mut Option<String>) {
    let data = part
        .body
        .as_ref()
        .and_then(|body| body.data.as_deref())
        .and_then(decode_body_data);
    match (part.mime_type.as_deref(), data) {
        (Some("text/html"), Some(data)) if html.is_none() => *html = Some(data),
        (Some("text/plain"), Some(data)) if text.is_none() => *text = Some(data),
        _ => {}
    }
    for child in &part.parts {
        collect_bodies(child, html, text);
    }
}

/// Gmail bodies are base64url, with or without padding.
pub fn decode_body_data(data: &str) -> Option<String> {
    let bytes = URL_SAFE_NO_PAD.decode(data.trim().trim_end_matches('=')).ok()?;
    Some(String::from_utf8_lossy(&bytes).into_owned())
}

/// Unread messages from `sender` under `label`; either filter may be omitted.
pub fn unread_query(sender: Option<&str>, label: Option<&str>) -> String {
    let mut query = String::from("is:unread");
    if let Some(sender) = sender.map(str::trim).filter(|s| !s.is_empty()) {
        query.push_str(&format!(" from:{sender}"));
    }
    if let Some(label) = label.map(str::trim).filter(|s| !s.is_empty()) {
        query.push_str(&format!(" label:{label}"));
    }
    query
}

#[derive(Debug, Clone, Default)]
pub struct EmailSettings {
    pub sender: Option<String>,
    pub label: Option<String>,
    pub hints: SourceHints,
}

pub struct StateEmailAdapter {
    mailbox: Arc<dyn Mailbox>,
    settings: EmailSettings,
}

impl StateEmailAdapter {
    pub fn new(mailbox: Arc<dyn Mailbox>, settings: EmailSettings) -> Self {
        Self { mailbox, settings }
    }
}

#[async_trait]
impl SourceAdapter for StateEmailAdapter {
    fn source(&self) -> ContractSource {
        ContractSource::StateEmail
    }

    async fn fetch(&self, ctx: &AdapterContext, limit: usize) -> Result<Vec<RawItem>, AdapterError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let query = unread_query(self.settings.sender.as_deref(), self.settings.label.as_deref());
        let ids = self.mailbox.list_unread(&query, limit).await?;

        let mut items = Vec::with_capacity(ids.len());
        for id in ids.iter().take(limit) {
            let message = self.mailbox.get_message(id).await?;
            items.push(RawItem::StateEmail(EmailNotice {
                message,
                hints: self.settings.hints.clone(),
            }));
        }
        info!(run_id = %ctx.run_id, %query, fetched = items.len(), "mailbox fetch complete");
        Ok(items)
    }

    async fn acknowledge(&self, item: &RawItem) -> Result<(), AdapterError> {
        match item {
            RawItem::StateEmail(notice) => self.mailbox.mark_read(&notice.message.id).await,
            _ => Ok(()),
        }
    }
}
