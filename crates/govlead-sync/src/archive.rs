use chrono::{DateTime, Utc};
use govlead_core::{ContractStore, StoreError};
use serde::Serialize;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ArchiveSummary {
    pub ran_at: DateTime<Utc>,
    pub archived: u64,
}

/// Marks every contract whose deadline or archive date is strictly before
/// `now` as archived. Independent of any sync run.
pub async fn archive_sweep(contracts: &dyn ContractStore, now: DateTime<Utc>) -> Result<ArchiveSummary, StoreError> {
    let archived = contracts.archive_expired(now).await?;
    info!(archived, "archive sweep finished");
    Ok(ArchiveSummary { ran_at: now, archived })
}
