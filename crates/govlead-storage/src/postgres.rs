use std::collections::BTreeSet;
use std::str::FromStr;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use govlead_core::{
    AccountStore, Alert, AlertFrequency, AlertStore, CompanyProfile, ContractLead, ContractSource,
    ContractStore, NormalizedContract, ProfileAlertSettings, ProfileStore, SavedSearch,
    SetAsideType, StoreError, StoreResult, SubscriptionTier, SyncState, SyncStateStore,
    UpsertOutcome,
};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use tracing::info;
use uuid::Uuid;

const CONTRACT_COLUMNS: &str = r#"
    id, source_id, source, title, description, agency, sub_agency, solicitation_number,
    notice_type, contract_type, naics_codes, psc_code, set_aside_type, estimated_value,
    award_amount, posted_date, response_deadline, archive_date, place_of_performance,
    source_url, is_archived, archived_at, created_at, updated_at
"#;

const PROFILE_COLUMNS: &str = r#"
    id, user_id, company_name, naics_codes, certifications, preferred_states,
    min_contract_value, max_contract_value, alerts_enabled, alert_frequency,
    min_match_score, last_alert_sent_at, last_alert_matches, updated_at
"#;

/// Postgres-backed store. Uniqueness on `contract_leads.source_id` makes the
/// contract upsert safe under concurrent writers without explicit locking.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect(database_url)
            .await
            .context("connecting to postgres")?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .context("applying migrations")?;
        info!("database migrations applied");
        Ok(())
    }
}

fn backend(err: sqlx::Error) -> StoreError {
    if let Some(db) = err.as_database_error() {
        if db.is_unique_violation() {
            return StoreError::Conflict(db.message().to_string());
        }
    }
    StoreError::Backend(anyhow::Error::new(err))
}

fn invalid(err: impl std::fmt::Display) -> StoreError {
    StoreError::Invalid(err.to_string())
}

fn count_to_i32(count: u32) -> i32 {
    i32::try_from(count).unwrap_or(i32::MAX)
}

fn lead_from_row(row: &PgRow) -> StoreResult<ContractLead> {
    let source: String = row.try_get("source").map_err(backend)?;
    let set_aside: Option<String> = row.try_get("set_aside_type").map_err(backend)?;
    let naics: Vec<String> = row.try_get("naics_codes").map_err(backend)?;

    let contract = NormalizedContract {
        source_id: row.try_get("source_id").map_err(backend)?,
        source: ContractSource::from_str(&source).map_err(invalid)?,
        title: row.try_get("title").map_err(backend)?,
        description: row.try_get("description").map_err(backend)?,
        agency: row.try_get("agency").map_err(backend)?,
        sub_agency: row.try_get("sub_agency").map_err(backend)?,
        solicitation_number: row.try_get("solicitation_number").map_err(backend)?,
        notice_type: row.try_get("notice_type").map_err(backend)?,
        contract_type: row.try_get("contract_type").map_err(backend)?,
        naics_codes: naics.into_iter().collect(),
        psc_code: row.try_get("psc_code").map_err(backend)?,
        set_aside_type: set_aside
            .as_deref()
            .map(SetAsideType::from_str)
            .transpose()
            .map_err(invalid)?,
        estimated_value: row.try_get("estimated_value").map_err(backend)?,
        award_amount: row.try_get("award_amount").map_err(backend)?,
        posted_date: row.try_get("posted_date").map_err(backend)?,
        response_deadline: row.try_get("response_deadline").map_err(backend)?,
        archive_date: row.try_get("archive_date").map_err(backend)?,
        place_of_performance: row.try_get("place_of_performance").map_err(backend)?,
        source_url: row.try_get("source_url").map_err(backend)?,
    };

    Ok(ContractLead {
        id: row.try_get("id").map_err(backend)?,
        contract,
        is_archived: row.try_get("is_archived").map_err(backend)?,
        archived_at: row.try_get("archived_at").map_err(backend)?,
        created_at: row.try_get("created_at").map_err(backend)?,
        updated_at: row.try_get("updated_at").map_err(backend)?,
    })
}

fn profile_from_row(row: &PgRow) -> StoreResult<CompanyProfile> {
    let naics: Vec<String> = row.try_get("naics_codes").map_err(backend)?;
    let certifications: Vec<String> = row.try_get("certifications").map_err(backend)?;
    let states: Vec<String> = row.try_get("preferred_states").map_err(backend)?;
    let frequency: String = row.try_get("alert_frequency").map_err(backend)?;
    let min_score: i16 = row.try_get("min_match_score").map_err(backend)?;
    let last_matches: i32 = row.try_get("last_alert_matches").map_err(backend)?;

    Ok(CompanyProfile {
        id: row.try_get("id").map_err(backend)?,
        user_id: row.try_get("user_id").map_err(backend)?,
        company_name: row.try_get("company_name").map_err(backend)?,
        naics_codes: naics.into_iter().collect::<BTreeSet<_>>(),
        certifications: certifications.into_iter().collect(),
        preferred_states: states.into_iter().collect(),
        min_contract_value: row.try_get("min_contract_value").map_err(backend)?,
        max_contract_value: row.try_get("max_contract_value").map_err(backend)?,
        alerts: ProfileAlertSettings {
            alerts_enabled: row.try_get("alerts_enabled").map_err(backend)?,
            alert_frequency: AlertFrequency::from_str(&frequency).map_err(invalid)?,
            min_match_score: min_score.clamp(0, 100) as u8,
            last_alert_sent_at: row.try_get("last_alert_sent_at").map_err(backend)?,
            last_alert_matches: last_matches.max(0) as u32,
        },
        updated_at: row.try_get("updated_at").map_err(backend)?,
    })
}

fn alert_from_row(row: &PgRow) -> StoreResult<Alert> {
    let frequency: String = row.try_get("frequency").map_err(backend)?;
    let last_match_count: i32 = row.try_get("last_match_count").map_err(backend)?;
    Ok(Alert {
        id: row.try_get("id").map_err(backend)?,
        user_id: row.try_get("user_id").map_err(backend)?,
        saved_search_id: row.try_get("saved_search_id").map_err(backend)?,
        frequency: AlertFrequency::from_str(&frequency).map_err(invalid)?,
        is_active: row.try_get("is_active").map_err(backend)?,
        last_sent_at: row.try_get("last_sent_at").map_err(backend)?,
        last_match_count: last_match_count.max(0) as u32,
        created_at: row.try_get("created_at").map_err(backend)?,
    })
}

#[async_trait]
impl ContractStore for PgStore {
    async fn upsert_contract(
        &self,
        contract: &NormalizedContract,
        now: DateTime<Utc>,
    ) -> StoreResult<UpsertOutcome> {
        let naics: Vec<String> = contract.naics_codes.iter().cloned().collect();
        let row = sqlx::query(
            r#"
            INSERT INTO contract_leads (
                id, source_id, source, title, description, agency, sub_agency,
                solicitation_number, notice_type, contract_type, naics_codes, psc_code,
                set_aside_type, estimated_value, award_amount, posted_date, response_deadline,
                archive_date, place_of_performance, source_url, is_archived, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17,
                    $18, $19, $20, FALSE, $21, $21)
            ON CONFLICT (source_id) DO UPDATE SET
                source = EXCLUDED.source,
                title = EXCLUDED.title,
                description = EXCLUDED.description,
                agency = EXCLUDED.agency,
                sub_agency = EXCLUDED.sub_agency,
                solicitation_number = EXCLUDED.solicitation_number,
                notice_type = EXCLUDED.notice_type,
                contract_type = EXCLUDED.contract_type,
                naics_codes = EXCLUDED.naics_codes,
                psc_code = EXCLUDED.psc_code,
                set_aside_type = EXCLUDED.set_aside_type,
                estimated_value = EXCLUDED.estimated_value,
                award_amount = EXCLUDED.award_amount,
                posted_date = EXCLUDED.posted_date,
                response_deadline = EXCLUDED.response_deadline,
                archive_date = EXCLUDED.archive_date,
                place_of_performance = EXCLUDED.place_of_performance,
                source_url = EXCLUDED.source_url,
                updated_at = EXCLUDED.updated_at
            RETURNING id, (xmax = 0) AS inserted
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&contract.source_id)
        .bind(contract.source.as_str())
        .bind(&contract.title)
        .bind(&contract.description)
        .bind(&contract.agency)
        .bind(&contract.sub_agency)
        .bind(&contract.solicitation_number)
        .bind(&contract.notice_type)
        .bind(&contract.contract_type)
        .bind(&naics)
        .bind(&contract.psc_code)
        .bind(contract.set_aside_type.map(|s| s.code()))
        .bind(contract.estimated_value)
        .bind(contract.award_amount)
        .bind(contract.posted_date)
        .bind(contract.response_deadline)
        .bind(contract.archive_date)
        .bind(&contract.place_of_performance)
        .bind(&contract.source_url)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(backend)?;

        let id: Uuid = row.try_get("id").map_err(backend)?;
        let inserted: bool = row.try_get("inserted").map_err(backend)?;
        Ok(if inserted {
            UpsertOutcome::Created(id)
        } else {
            UpsertOutcome::Updated(id)
        })
    }

    async fn find_by_source_id(&self, source_id: &str) -> StoreResult<Option<ContractLead>> {
        let row = sqlx::query(&format!(
            "SELECT {CONTRACT_COLUMNS} FROM contract_leads WHERE source_id = $1"
        ))
        .bind(source_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        row.as_ref().map(lead_from_row).transpose()
    }

    async fn find_by_ids(&self, ids: &[Uuid]) -> StoreResult<Vec<ContractLead>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(&format!(
            "SELECT {CONTRACT_COLUMNS} FROM contract_leads WHERE id = ANY($1)"
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        let mut leads = rows.iter().map(lead_from_row).collect::<StoreResult<Vec<_>>>()?;
        leads.sort_by_key(|lead| ids.iter().position(|id| *id == lead.id));
        Ok(leads)
    }

    async fn find_candidates(
        &self,
        posted_since: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<ContractLead>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {CONTRACT_COLUMNS}
              FROM contract_leads
             WHERE is_archived = FALSE
               AND COALESCE(posted_date, created_at) >= $1
               AND (response_deadline IS NULL OR response_deadline >= $2)
             ORDER BY COALESCE(posted_date, created_at) DESC, source_id ASC
            "#
        ))
        .bind(posted_since)
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.iter().map(lead_from_row).collect()
    }

    async fn archive_expired(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE contract_leads
               SET is_archived = TRUE,
                   archived_at = $1
             WHERE is_archived = FALSE
               AND (response_deadline < $1 OR archive_date < $1)
            "#,
        )
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(result.rows_affected())
    }

    async fn count_contracts(&self, source: Option<ContractSource>) -> StoreResult<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM contract_leads WHERE ($1::text IS NULL OR source = $1)",
        )
        .bind(source.map(|s| s.as_str()))
        .fetch_one(&self.pool)
        .await
        .map_err(backend)?;
        Ok(count.max(0) as u64)
    }
}

#[async_trait]
impl SyncStateStore for PgStore {
    async fn get_sync_state(&self, sync_type: &str) -> StoreResult<Option<SyncState>> {
        let row = sqlx::query(
            "SELECT sync_type, last_synced_at, cursor, metadata FROM sync_states WHERE sync_type = $1",
        )
        .bind(sync_type)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(SyncState {
            sync_type: row.try_get("sync_type").map_err(backend)?,
            last_synced_at: row.try_get("last_synced_at").map_err(backend)?,
            cursor: row.try_get("cursor").map_err(backend)?,
            metadata: row.try_get("metadata").map_err(backend)?,
        }))
    }

    async fn upsert_sync_state(&self, state: &SyncState) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO sync_states (sync_type, last_synced_at, cursor, metadata)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (sync_type) DO UPDATE SET
                last_synced_at = EXCLUDED.last_synced_at,
                cursor = EXCLUDED.cursor,
                metadata = EXCLUDED.metadata
            "#,
        )
        .bind(&state.sync_type)
        .bind(state.last_synced_at)
        .bind(&state.cursor)
        .bind(&state.metadata)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }
}

#[async_trait]
impl AlertStore for PgStore {
    async fn create_saved_search(&self, search: &SavedSearch) -> StoreResult<()> {
        search.filters.validate()?;
        let filters = serde_json::to_value(&search.filters)
            .context("serializing saved search filters")?;
        sqlx::query(
            "INSERT INTO saved_searches (id, user_id, name, filters, created_at) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(search.id)
        .bind(&search.user_id)
        .bind(&search.name)
        .bind(filters)
        .bind(search.created_at)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn get_saved_search(&self, id: Uuid) -> StoreResult<Option<SavedSearch>> {
        let row = sqlx::query(
            "SELECT id, user_id, name, filters, created_at FROM saved_searches WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        let Some(row) = row else {
            return Ok(None);
        };
        let filters: serde_json::Value = row.try_get("filters").map_err(backend)?;
        Ok(Some(SavedSearch {
            id: row.try_get("id").map_err(backend)?,
            user_id: row.try_get("user_id").map_err(backend)?,
            name: row.try_get("name").map_err(backend)?,
            filters: serde_json::from_value(filters).map_err(invalid)?,
            created_at: row.try_get("created_at").map_err(backend)?,
        }))
    }

    async fn create_alert(&self, alert: &Alert) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO alerts (id, user_id, saved_search_id, frequency, is_active,
                                last_sent_at, last_match_count, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(alert.id)
        .bind(&alert.user_id)
        .bind(alert.saved_search_id)
        .bind(alert.frequency.as_str())
        .bind(alert.is_active)
        .bind(alert.last_sent_at)
        .bind(count_to_i32(alert.last_match_count))
        .bind(alert.created_at)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn get_alert(&self, id: Uuid) -> StoreResult<Option<Alert>> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, saved_search_id, frequency, is_active, last_sent_at,
                   last_match_count, created_at
              FROM alerts
             WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        row.as_ref().map(alert_from_row).transpose()
    }

    async fn list_active_alerts(&self) -> StoreResult<Vec<Alert>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, saved_search_id, frequency, is_active, last_sent_at,
                   last_match_count, created_at
              FROM alerts
             WHERE is_active = TRUE
             ORDER BY created_at, id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.iter().map(alert_from_row).collect()
    }

    async fn record_alert_sent(
        &self,
        alert_id: Uuid,
        expected: Option<DateTime<Utc>>,
        sent_at: Option<DateTime<Utc>>,
        match_count: u32,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE alerts
               SET last_sent_at = $3,
                   last_match_count = $4
             WHERE id = $1
               AND last_sent_at IS NOT DISTINCT FROM $2
            "#,
        )
        .bind(alert_id)
        .bind(expected)
        .bind(sent_at)
        .bind(count_to_i32(match_count))
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl ProfileStore for PgStore {
    async fn save_profile(&self, profile: &CompanyProfile) -> StoreResult<()> {
        let naics: Vec<String> = profile.naics_codes.iter().cloned().collect();
        let certifications: Vec<String> = profile.certifications.iter().cloned().collect();
        let states: Vec<String> = profile.preferred_states.iter().cloned().collect();
        sqlx::query(&format!(
            r#"
            INSERT INTO company_profiles ({PROFILE_COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (id) DO UPDATE SET
                company_name = EXCLUDED.company_name,
                naics_codes = EXCLUDED.naics_codes,
                certifications = EXCLUDED.certifications,
                preferred_states = EXCLUDED.preferred_states,
                min_contract_value = EXCLUDED.min_contract_value,
                max_contract_value = EXCLUDED.max_contract_value,
                alerts_enabled = EXCLUDED.alerts_enabled,
                alert_frequency = EXCLUDED.alert_frequency,
                min_match_score = EXCLUDED.min_match_score,
                updated_at = EXCLUDED.updated_at
            "#
        ))
        .bind(profile.id)
        .bind(&profile.user_id)
        .bind(&profile.company_name)
        .bind(&naics)
        .bind(&certifications)
        .bind(&states)
        .bind(profile.min_contract_value)
        .bind(profile.max_contract_value)
        .bind(profile.alerts.alerts_enabled)
        .bind(profile.alerts.alert_frequency.as_str())
        .bind(i16::from(profile.alerts.min_match_score))
        .bind(profile.alerts.last_alert_sent_at)
        .bind(count_to_i32(profile.alerts.last_alert_matches))
        .bind(profile.updated_at)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn get_profile(&self, id: Uuid) -> StoreResult<Option<CompanyProfile>> {
        let row = sqlx::query(&format!(
            "SELECT {PROFILE_COLUMNS} FROM company_profiles WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        row.as_ref().map(profile_from_row).transpose()
    }

    async fn list_alert_enabled_profiles(&self) -> StoreResult<Vec<CompanyProfile>> {
        let rows = sqlx::query(&format!(
            "SELECT {PROFILE_COLUMNS} FROM company_profiles WHERE alerts_enabled = TRUE ORDER BY updated_at, id"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.iter().map(profile_from_row).collect()
    }

    async fn record_profile_alert(
        &self,
        profile_id: Uuid,
        expected: Option<DateTime<Utc>>,
        sent_at: Option<DateTime<Utc>>,
        match_count: u32,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE company_profiles
               SET last_alert_sent_at = $3,
                   last_alert_matches = $4
             WHERE id = $1
               AND last_alert_sent_at IS NOT DISTINCT FROM $2
            "#,
        )
        .bind(profile_id)
        .bind(expected)
        .bind(sent_at)
        .bind(count_to_i32(match_count))
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl AccountStore for PgStore {
    async fn subscription_tier(&self, user_id: &str) -> StoreResult<SubscriptionTier> {
        let tier: Option<String> =
            sqlx::query_scalar("SELECT subscription_tier FROM user_accounts WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(backend)?;
        match tier {
            Some(tier) => SubscriptionTier::from_str(&tier).map_err(invalid),
            None => Ok(SubscriptionTier::Free),
        }
    }

    async fn notification_email(&self, user_id: &str) -> StoreResult<Option<String>> {
        let email: Option<Option<String>> =
            sqlx::query_scalar("SELECT email FROM user_accounts WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(backend)?;
        Ok(email.flatten())
    }
}
