//! Notification rendering and delivery. One job produces at most one email.

use std::collections::HashMap;
use std::sync::Arc;

use askama::Template;
use async_trait::async_trait;
use govlead_core::{
    AccountStore, ContractLead, ContractStore, NotificationJob, NotificationTarget, StoreError,
};
use govlead_match::format_usd;
use govlead_storage::HttpFetcher;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

pub const DEFAULT_EMAIL_ENDPOINT: &str = "https://api.resend.com/emails";

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("no notification address on file for user {0}")]
    NoRecipient(String),
    #[error("rendering notification failed: {0}")]
    Render(String),
    #[error("email transport failed: {0}")]
    Transport(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl DispatchError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, DispatchError::Transport(_) | DispatchError::Store(_))
    }
}

/// Wire shape accepted by the outbound email API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutboundEmail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub html: String,
}

#[async_trait]
pub trait EmailTransport: Send + Sync {
    async fn send(&self, email: &OutboundEmail) -> Result<(), DispatchError>;
}

pub struct HttpEmailTransport {
    fetcher: Arc<HttpFetcher>,
    endpoint: String,
    api_key: SecretString,
}

impl HttpEmailTransport {
    pub fn new(fetcher: Arc<HttpFetcher>, endpoint: impl Into<String>, api_key: SecretString) -> Self {
        Self {
            fetcher,
            endpoint: endpoint.into(),
            api_key,
        }
    }
}

#[async_trait]
impl EmailTransport for HttpEmailTransport {
    async fn send(&self, email: &OutboundEmail) -> Result<(), DispatchError> {
        self.fetcher
            .execute("email", |client| {
                client
                    .post(&self.endpoint)
                    .bearer_auth(self.api_key.expose_secret())
                    .json(email)
            })
            .await
            .map_err(|err| DispatchError::Transport(err.to_string()))?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedNotification {
    pub subject: String,
    pub html: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ContractRow {
    title: String,
    agency: String,
    deadline: String,
    value: String,
    url: Option<String>,
    score: Option<u8>,
    reasons: Vec<String>,
}

#[derive(Template)]
#[template(path = "alert_email.html")]
struct AlertEmailTemplate<'a> {
    heading: &'a str,
    intro: String,
    rows: &'a [ContractRow],
    footer: &'a str,
}

/// Deterministic subject and body for `job`. Rows follow the job's match
/// order; ids missing from `contracts` are left out.
pub fn render_notification(
    job: &NotificationJob,
    contracts: &[ContractLead],
) -> Result<RenderedNotification, DispatchError> {
    let by_id: HashMap<Uuid, &ContractLead> = contracts.iter().map(|lead| (lead.id, lead)).collect();
    let rows: Vec<ContractRow> = job
        .matches
        .iter()
        .filter_map(|matched| {
            let lead = by_id.get(&matched.contract_id)?;
            let contract = &lead.contract;
            Some(ContractRow {
                title: contract.title.clone(),
                agency: match (&contract.agency, &contract.sub_agency) {
                    (Some(agency), Some(sub)) => format!("{agency} / {sub}"),
                    (Some(agency), None) => agency.clone(),
                    (None, _) => "Agency not listed".to_string(),
                },
                deadline: contract
                    .response_deadline
                    .map(|at| at.format("%b %-d, %Y").to_string())
                    .unwrap_or_else(|| "not stated".to_string()),
                value: contract
                    .contract_value()
                    .map(format_usd)
                    .unwrap_or_else(|| "not stated".to_string()),
                url: contract.source_url.clone(),
                score: matched.score,
                reasons: matched.reasons.clone(),
            })
        })
        .collect();

    let count = rows.len();
    let plural = if count == 1 { "" } else { "s" };
    let (subject, heading, intro) = match &job.target {
        NotificationTarget::SavedSearch { search_name, .. } => (
            format!("{count} new contract{plural} for \"{search_name}\""),
            "New contracts for your saved search",
            format!("{count} new contract{plural} matched \"{search_name}\"."),
        ),
        NotificationTarget::Profile { company_name, .. } => (
            format!("{count} new matching contract{plural} for {company_name}"),
            "New contracts matching your company profile",
            format!("{count} new contract{plural} scored at or above your minimum match score for {company_name}."),
        ),
    };

    let html = AlertEmailTemplate {
        heading,
        intro,
        rows: &rows,
        footer: "You are receiving this because alerts are enabled on your account.",
    }
    .render()
    .map_err(|err| DispatchError::Render(err.to_string()))?;

    Ok(RenderedNotification { subject, html })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Sent { recipient: String, contracts: usize },
    /// Every referenced contract is gone; nothing is sent.
    NothingToSend,
}

pub struct NotificationDispatcher {
    contracts: Arc<dyn ContractStore>,
    accounts: Arc<dyn AccountStore>,
    transport: Arc<dyn EmailTransport>,
    from: String,
}

impl NotificationDispatcher {
    pub fn new<S>(store: Arc<S>, transport: Arc<dyn EmailTransport>, from: impl Into<String>) -> Self
    where
        S: ContractStore + AccountStore + 'static,
    {
        Self {
            contracts: store.clone(),
            accounts: store,
            transport,
            from: from.into(),
        }
    }

    pub async fn dispatch(&self, job: &NotificationJob) -> Result<DispatchOutcome, DispatchError> {
        let recipient = self
            .accounts
            .notification_email(&job.user_id)
            .await?
            .ok_or_else(|| DispatchError::NoRecipient(job.user_id.clone()))?;

        let ids: Vec<Uuid> = job.matches.iter().map(|m| m.contract_id).collect();
        let contracts = self.contracts.find_by_ids(&ids).await?;
        if contracts.is_empty() {
            warn!(job_id = %job.job_id, "every contract in the notification is gone; nothing sent");
            return Ok(DispatchOutcome::NothingToSend);
        }

        let rendered = render_notification(job, &contracts)?;
        let email = OutboundEmail {
            from: self.from.clone(),
            to: recipient.clone(),
            subject: rendered.subject,
            html: rendered.html,
        };
        self.transport.send(&email).await?;

        info!(job_id = %job.job_id, user_id = %job.user_id, contracts = contracts.len(), "notification sent");
        Ok(DispatchOutcome::Sent {
            recipient,
            contracts: contracts.len(),
        })
    }
}
