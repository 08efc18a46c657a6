//! Alert evaluation: per saved-search alert and per company profile, decide
//! whether anything new should be sent and hand a notification job to the
//! job runner.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use govlead_core::{
    AccountStore, AlertStore, ContractLead, ContractStore, EventSink, MatchedContractRef,
    NotificationJob, NotificationTarget, PipelineEvent, ProfileStore, SubscriptionTier,
};
use govlead_match::{matches_filters, Scorer};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::throttle::{gate, window_start, Gate, PROFILE_LOOKBACK_DAYS, SAVED_SEARCH_LOOKBACK_DAYS};

/// Upper bound on contracts listed in one notification.
pub const MAX_CONTRACTS_PER_NOTIFICATION: usize = 25;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EvaluationOutcome {
    Notified { job_id: Uuid, matches: usize },
    NoMatches { candidates: usize },
    SkippedTier { tier: SubscriptionTier },
    Throttled { next_eligible_at: DateTime<Utc> },
    Inactive,
    /// Another evaluation advanced the throttle first.
    LostRace,
    Missing,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepSummary {
    pub saved_search_checks: usize,
    pub profile_checks: usize,
    pub failed_emits: usize,
}

pub struct AlertEvaluator {
    contracts: Arc<dyn ContractStore>,
    alerts: Arc<dyn AlertStore>,
    profiles: Arc<dyn ProfileStore>,
    accounts: Arc<dyn AccountStore>,
    events: Arc<dyn EventSink>,
    scorer: Scorer,
}

impl AlertEvaluator {
    pub fn new<S>(store: Arc<S>, events: Arc<dyn EventSink>, scorer: Scorer) -> Self
    where
        S: ContractStore + AlertStore + ProfileStore + AccountStore + 'static,
    {
        Self {
            contracts: store.clone(),
            alerts: store.clone(),
            profiles: store.clone(),
            accounts: store,
            events,
            scorer,
        }
    }

    /// Fans out one check event per active alert and per alerts-enabled
    /// profile. A failed emit is counted and the sweep moves on.
    pub async fn sweep(&self) -> Result<SweepSummary> {
        let mut summary = SweepSummary::default();

        for alert in self.alerts.list_active_alerts().await.context("listing active alerts")? {
            let event = PipelineEvent::SavedSearchAlertCheck { alert_id: alert.id };
            match self.events.emit(event).await {
                Ok(()) => summary.saved_search_checks += 1,
                Err(err) => {
                    warn!(alert_id = %alert.id, error = %err, "could not queue saved-search check");
                    summary.failed_emits += 1;
                }
            }
        }

        for profile in self
            .profiles
            .list_alert_enabled_profiles()
            .await
            .context("listing alert-enabled profiles")?
        {
            let event = PipelineEvent::ProfileAlertCheck { profile_id: profile.id };
            match self.events.emit(event).await {
                Ok(()) => summary.profile_checks += 1,
                Err(err) => {
                    warn!(profile_id = %profile.id, error = %err, "could not queue profile check");
                    summary.failed_emits += 1;
                }
            }
        }

        info!(
            saved_search_checks = summary.saved_search_checks,
            profile_checks = summary.profile_checks,
            failed_emits = summary.failed_emits,
            "alert sweep queued"
        );
        Ok(summary)
    }

    pub async fn check_saved_search_alert(&self, alert_id: Uuid, now: DateTime<Utc>) -> Result<EvaluationOutcome> {
        let Some(alert) = self.alerts.get_alert(alert_id).await? else {
            warn!(%alert_id, "alert no longer exists");
            return Ok(EvaluationOutcome::Missing);
        };
        if !alert.is_active {
            debug!(%alert_id, "alert inactive");
            return Ok(EvaluationOutcome::Inactive);
        }

        let tier = self.accounts.subscription_tier(&alert.user_id).await?;
        if let Some(outcome) = gate_outcome(gate(tier, alert.frequency, alert.last_sent_at, now)) {
            info!(%alert_id, user_id = %alert.user_id, ?outcome, "saved-search alert skipped");
            return Ok(outcome);
        }

        let Some(search) = self.alerts.get_saved_search(alert.saved_search_id).await? else {
            warn!(%alert_id, saved_search_id = %alert.saved_search_id, "saved search missing for alert");
            return Ok(EvaluationOutcome::Missing);
        };

        let since = window_start(alert.last_sent_at, SAVED_SEARCH_LOOKBACK_DAYS, now);
        let mut candidates = self.contracts.find_candidates(since, now).await?;
        let candidate_count = candidates.len();
        candidates.retain(|lead| matches_filters(lead, &search.filters));
        newest_first(&mut candidates);

        if candidates.is_empty() {
            debug!(%alert_id, candidates = candidate_count, "no matching contracts");
            return Ok(EvaluationOutcome::NoMatches {
                candidates: candidate_count,
            });
        }

        let match_count = candidates.len();
        let matches = candidates
            .iter()
            .take(MAX_CONTRACTS_PER_NOTIFICATION)
            .map(|lead| MatchedContractRef {
                contract_id: lead.id,
                score: None,
                reasons: Vec::new(),
            })
            .collect();
        let job = NotificationJob {
            job_id: Uuid::new_v4(),
            user_id: alert.user_id.clone(),
            target: NotificationTarget::SavedSearch {
                alert_id,
                saved_search_id: search.id,
                search_name: search.name.clone(),
            },
            matches,
        };

        let claimed = self
            .alerts
            .record_alert_sent(alert_id, alert.last_sent_at, Some(now), saturating_u32(match_count))
            .await?;
        if !claimed {
            info!(%alert_id, "throttle already advanced by a concurrent evaluation");
            return Ok(EvaluationOutcome::LostRace);
        }

        let job_id = job.job_id;
        if let Err(err) = self.events.emit(PipelineEvent::NotificationRequested(job)).await {
            let reverted = self
                .alerts
                .record_alert_sent(alert_id, Some(now), alert.last_sent_at, alert.last_match_count)
                .await;
            if !matches!(reverted, Ok(true)) {
                warn!(%alert_id, "could not release throttle after failed emit");
            }
            return Err(err.context(format!("queueing notification for alert {alert_id}")));
        }

        info!(%alert_id, %job_id, matches = match_count, "saved-search alert queued");
        Ok(EvaluationOutcome::Notified {
            job_id,
            matches: match_count,
        })
    }

    pub async fn check_profile_alert(&self, profile_id: Uuid, now: DateTime<Utc>) -> Result<EvaluationOutcome> {
        let Some(profile) = self.profiles.get_profile(profile_id).await? else {
            warn!(%profile_id, "profile no longer exists");
            return Ok(EvaluationOutcome::Missing);
        };
        let settings = &profile.alerts;
        if !settings.alerts_enabled {
            debug!(%profile_id, "profile alerts disabled");
            return Ok(EvaluationOutcome::Inactive);
        }

        let tier = self.accounts.subscription_tier(&profile.user_id).await?;
        if let Some(outcome) = gate_outcome(gate(tier, settings.alert_frequency, settings.last_alert_sent_at, now)) {
            info!(%profile_id, user_id = %profile.user_id, ?outcome, "profile alert skipped");
            return Ok(outcome);
        }

        let since = window_start(settings.last_alert_sent_at, PROFILE_LOOKBACK_DAYS, now);
        let candidates = self.contracts.find_candidates(since, now).await?;
        let candidate_count = candidates.len();
        let results = self
            .scorer
            .score_and_sort(candidates, &profile, settings.min_match_score);

        if results.is_empty() {
            debug!(%profile_id, candidates = candidate_count, "no contracts above minimum score");
            return Ok(EvaluationOutcome::NoMatches {
                candidates: candidate_count,
            });
        }

        let match_count = results.len();
        let matches = results
            .into_iter()
            .take(MAX_CONTRACTS_PER_NOTIFICATION)
            .map(|result| MatchedContractRef {
                contract_id: result.contract.id,
                score: Some(result.score),
                reasons: result.reasons,
            })
            .collect();
        let job = NotificationJob {
            job_id: Uuid::new_v4(),
            user_id: profile.user_id.clone(),
            target: NotificationTarget::Profile {
                profile_id,
                company_name: profile.company_name.clone(),
            },
            matches,
        };

        let claimed = self
            .profiles
            .record_profile_alert(
                profile_id,
                settings.last_alert_sent_at,
                Some(now),
                saturating_u32(match_count),
            )
            .await?;
        if !claimed {
            info!(%profile_id, "throttle already advanced by a concurrent evaluation");
            return Ok(EvaluationOutcome::LostRace);
        }

        let job_id = job.job_id;
        if let Err(err) = self.events.emit(PipelineEvent::NotificationRequested(job)).await {
            let reverted = self
                .profiles
                .record_profile_alert(
                    profile_id,
                    Some(now),
                    settings.last_alert_sent_at,
                    settings.last_alert_matches,
                )
                .await;
            if !matches!(reverted, Ok(true)) {
                warn!(%profile_id, "could not release throttle after failed emit");
            }
            return Err(err.context(format!("queueing notification for profile {profile_id}")));
        }

        info!(%profile_id, %job_id, matches = match_count, "profile alert queued");
        Ok(EvaluationOutcome::Notified {
            job_id,
            matches: match_count,
        })
    }
}

fn gate_outcome(gate: Gate) -> Option<EvaluationOutcome> {
    match gate {
        Gate::Open => None,
        Gate::TierExcluded(tier) => Some(EvaluationOutcome::SkippedTier { tier }),
        Gate::Throttled { next_eligible_at } => Some(EvaluationOutcome::Throttled { next_eligible_at }),
    }
}

fn newest_first(leads: &mut [ContractLead]) {
    leads.sort_by(|a, b| {
        b.effective_posted_at()
            .cmp(&a.effective_posted_at())
            .then_with(|| a.contract.source_id.cmp(&b.contract.source_id))
    });
}

fn saturating_u32(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}
