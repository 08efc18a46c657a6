//! Tier and frequency gates shared by saved-search and profile alerts.

use chrono::{DateTime, Duration, Utc};
use govlead_core::{AlertFrequency, SubscriptionTier};

/// First-run candidate window for saved-search alerts.
pub const SAVED_SEARCH_LOOKBACK_DAYS: i64 = 7;
/// First-run candidate window for profile alerts.
pub const PROFILE_LOOKBACK_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    Open,
    TierExcluded(SubscriptionTier),
    Throttled { next_eligible_at: DateTime<Utc> },
}

/// Tier first, then the minimum gap since the last send.
pub fn gate(
    tier: SubscriptionTier,
    frequency: AlertFrequency,
    last_sent_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Gate {
    if !tier.receives_alerts() {
        return Gate::TierExcluded(tier);
    }
    match last_sent_at {
        Some(last) if now - last < frequency.min_gap() => Gate::Throttled {
            next_eligible_at: last + frequency.min_gap(),
        },
        _ => Gate::Open,
    }
}

/// Contracts posted since the last send are new to the recipient; on a first
/// run the window reaches back `lookback_days`.
pub fn window_start(last_sent_at: Option<DateTime<Utc>>, lookback_days: i64, now: DateTime<Utc>) -> DateTime<Utc> {
    last_sent_at.unwrap_or_else(|| now - Duration::days(lookback_days))
}
