use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::ContractSource;

/// Named events understood by the job runner. The wire form is
/// `{"name": "<event name>", "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", content = "data")]
pub enum PipelineEvent {
    #[serde(rename = "sync/requested")]
    SyncRequested { source: ContractSource },
    #[serde(rename = "contracts/synced")]
    ContractsSynced {
        source: ContractSource,
        run_id: Uuid,
        created: usize,
        updated: usize,
    },
    #[serde(rename = "archive/requested")]
    ArchiveRequested,
    #[serde(rename = "alerts/sweep")]
    AlertSweepRequested,
    #[serde(rename = "alerts/saved-search.check")]
    SavedSearchAlertCheck { alert_id: Uuid },
    #[serde(rename = "alerts/profile.check")]
    ProfileAlertCheck { profile_id: Uuid },
    #[serde(rename = "notifications/send")]
    NotificationRequested(NotificationJob),
}

impl PipelineEvent {
    pub fn name(&self) -> &'static str {
        match self {
            PipelineEvent::SyncRequested { .. } => "sync/requested",
            PipelineEvent::ContractsSynced { .. } => "contracts/synced",
            PipelineEvent::ArchiveRequested => "archive/requested",
            PipelineEvent::AlertSweepRequested => "alerts/sweep",
            PipelineEvent::SavedSearchAlertCheck { .. } => "alerts/saved-search.check",
            PipelineEvent::ProfileAlertCheck { .. } => "alerts/profile.check",
            PipelineEvent::NotificationRequested(_) => "notifications/send",
        }
    }
}

/// Whose alert produced a notification job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NotificationTarget {
    SavedSearch {
        alert_id: Uuid,
        saved_search_id: Uuid,
        search_name: String,
    },
    Profile {
        profile_id: Uuid,
        company_name: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchedContractRef {
    pub contract_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<u8>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationJob {
    pub job_id: Uuid,
    pub user_id: String,
    pub target: NotificationTarget,
    pub matches: Vec<MatchedContractRef>,
}

/// Fire-and-forget hand-off into the job runner.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, event: PipelineEvent) -> anyhow::Result<()>;
}

/// Collects events in memory for callers that drain and process them inline.
#[derive(Debug, Default)]
pub struct BufferedEventSink {
    events: Mutex<Vec<PipelineEvent>>,
}

impl BufferedEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn drain(&self) -> Vec<PipelineEvent> {
        std::mem::take(&mut *self.events.lock().await)
    }

    pub async fn len(&self) -> usize {
        self.events.lock().await.len()
    }
}

#[async_trait]
impl EventSink for BufferedEventSink {
    async fn emit(&self, event: PipelineEvent) -> anyhow::Result<()> {
        self.events.lock().await.push(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_format_uses_event_names() {
        let event = PipelineEvent::SyncRequested {
            source: ContractSource::StateEmail,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["name"], "sync/requested");
        assert_eq!(json["data"]["source"], "state-email");
        assert_eq!(event.name(), "sync/requested");
    }

    #[test]
    fn unit_events_decode_without_data() {
        let event: PipelineEvent = serde_json::from_str(r#"{"name":"alerts/sweep"}"#).unwrap();
        assert_eq!(event, PipelineEvent::AlertSweepRequested);
    }

    #[tokio::test]
    async fn buffered_sink_drains_in_emit_order() {
        let sink = BufferedEventSink::new();
        sink.emit(PipelineEvent::ArchiveRequested).await.unwrap();
        sink.emit(PipelineEvent::AlertSweepRequested).await.unwrap();
        assert_eq!(sink.len().await, 2);

        let drained = sink.drain().await;
        assert_eq!(
            drained,
            vec![PipelineEvent::ArchiveRequested, PipelineEvent::AlertSweepRequested]
        );
        assert_eq!(sink.len().await, 0);
    }
}
