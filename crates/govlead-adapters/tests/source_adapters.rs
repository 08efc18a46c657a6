use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use govlead_adapters::{
    AdapterContext, AdapterError, EmailMessage, EmailSettings, Mailbox, MunicipalScrapeAdapter,
    NormalizeError, RawItem, ScrapeClient, ScrapeSettings, SourceAdapter, SourceHints,
    StateEmailAdapter,
};
use govlead_core::{ContractSource, SetAsideType};
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct FakeMailbox {
    messages: Mutex<BTreeMap<String, (EmailMessage, bool)>>,
    queries: Mutex<Vec<String>>,
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
    async fn list_unread(&self, query: &str, max: usize) -> Result<Vec<String>, AdapterError> {
        self.queries.lock().await.push(query.to_string());
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

fn ctx() -> AdapterContext {
    AdapterContext {
        run_id: Uuid::new_v4(),
        now: Utc.with_ymd_and_hms(2026, 1, 10, 12, 0, 0).unwrap(),
        last_synced_at: None,
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
             <p>Bid Due Date: 02/01/2026</p><p>NAICS: 424120</p>"
        )),
        ..EmailMessage::default()
    }
}

#[tokio::test]
async fn email_messages_stay_unread_until_acknowledged() {
    let mailbox = Arc::new(FakeMailbox::default());
    mailbox.deliver(bid_email("m1", "BPM0001")).await;
    mailbox.deliver(bid_email("m2", "BPM0002")).await;

    let adapter = StateEmailAdapter::new(
        mailbox.clone(),
        EmailSettings {
            sender: Some("notices@commbuys.com".into()),
            label: Some("bids".into()),
            hints: SourceHints {
                agency: None,
                place_of_performance: Some("Massachusetts".into()),
            },
        },
    );

    let items = adapter.fetch(&ctx(), 10).await.unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(
        mailbox.queries.lock().await.as_slice(),
        ["is:unread from:notices@commbuys.com label:bids"]
    );

    let first = adapter.normalize(&items[0]).unwrap();
    assert_eq!(first.source_id, "STATE_BPM0001");
    assert_eq!(first.source, ContractSource::StateEmail);
    assert_eq!(first.title, "Office Supplies");
    assert_eq!(first.agency.as_deref(), Some("Executive Office of Health"));
    assert!(first.naics_codes.contains("424120"));
    assert_eq!(
        first.posted_date,
        Some(Utc.with_ymd_and_hms(2026, 1, 9, 15, 30, 0).unwrap())
    );

    // Nothing is marked read by fetching or normalizing.
    assert!(!mailbox.is_read("m1").await);
    adapter.acknowledge(&items[0]).await.unwrap();
    assert!(mailbox.is_read("m1").await);

    let remaining = adapter.fetch(&ctx(), 10).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].key(), "m2");
}

#[tokio::test]
async fn adapters_reject_items_from_other_sources() {
    let adapter = StateEmailAdapter::new(Arc::new(FakeMailbox::default()), EmailSettings::default());
    let foreign = RawItem::Federal(Default::default());
    assert_eq!(
        adapter.normalize(&foreign),
        Err(NormalizeError::SourceMismatch {
            expected: ContractSource::StateEmail,
            found: ContractSource::FederalApi,
        })
    );
}

struct BoardPage;

#[async_trait]
impl ScrapeClient for BoardPage {
    async fn scrape_markdown(&self, url: &str) -> Result<String, AdapterError> {
        assert_eq!(url, "https://springfield.example.test/purchasing/bids");
        Ok("\
# Current Solicitations

| Bid Number | Description | Department | Due Date | Set Aside |
|---|---|---|---|---|
| RFQ-2026-031 | [HVAC Maintenance](https://springfield.example.test/bids/31) | Public Works | 01/30/2026 | Small Business Set-Aside |
| RFQ-2026-032 | Amendment 1 - Fleet Tires | Fleet Services | Feb 6, 2026 | None |
"
        .to_string())
    }
}

#[tokio::test]
async fn scraped_board_rows_normalize_into_city_contracts() {
    let adapter = MunicipalScrapeAdapter::new(
        Arc::new(BoardPage),
        ScrapeSettings {
            board_url: "https://springfield.example.test/purchasing/bids".into(),
            hints: SourceHints {
                agency: Some("City of Springfield".into()),
                place_of_performance: Some("Springfield, IL".into()),
            },
        },
    );

    let items = adapter.fetch(&ctx(), 25).await.unwrap();
    let contracts = items
        .iter()
        .map(|item| adapter.normalize(item))
        .collect::<Result<Vec<_>, _>>()
        .unwrap();

    assert_eq!(contracts.len(), 2);
    let hvac = &contracts[0];
    assert_eq!(hvac.source_id, "CITY_RFQ-2026-031");
    assert_eq!(hvac.agency.as_deref(), Some("Public Works"));
    assert_eq!(hvac.set_aside_type, Some(SetAsideType::SmallBusiness));
    assert_eq!(
        hvac.source_url.as_deref(),
        Some("https://springfield.example.test/bids/31")
    );
    assert_eq!(
        hvac.response_deadline,
        Some(Utc.with_ymd_and_hms(2026, 1, 30, 0, 0, 0).unwrap())
    );

    let tires = &contracts[1];
    assert_eq!(tires.set_aside_type, None);
    assert_eq!(
        tires.response_deadline,
        Some(Utc.with_ymd_and_hms(2026, 2, 6, 0, 0, 0).unwrap())
    );
    assert_eq!(tires.place_of_performance.as_deref(), Some("Springfield, IL"));
}
