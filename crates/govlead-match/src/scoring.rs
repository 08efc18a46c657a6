//! Explainable contract/profile relevance scoring.
//!
//! Four additive dimensions, always evaluated in the same order:
//!
//! | Dimension     | Max | Fallbacks                                              |
//! |---------------|-----|--------------------------------------------------------|
//! | NAICS         | 40  | contract has no codes: 20; profile has none: 0         |
//! | Certification | 30  | no set-aside: 15; small-business set-aside: 15         |
//! | Location      | 15  | no place or no preferred states: 8; remote wording: 10 |
//! | Value         | 15  | no value or no range: 8; within 50% of a bound: 8      |
//!
//! Only full matches add a reason, so reasons are listed in dimension order.

use govlead_core::{CompanyProfile, ContractLead, NormalizedContract, SetAsideType};
use serde::Serialize;

use crate::certifications::CertificationMatrix;
use crate::states::place_mentions_state;

pub const NAICS_POINTS: u8 = 40;
pub const CERTIFICATION_POINTS: u8 = 30;
pub const LOCATION_POINTS: u8 = 15;
pub const VALUE_POINTS: u8 = 15;

const NAICS_UNKNOWN_POINTS: u8 = 20;
const OPEN_COMPETITION_POINTS: u8 = 15;
const SMALL_BUSINESS_POINTS: u8 = 15;
const LOCATION_NEUTRAL_POINTS: u8 = 8;
const REMOTE_POINTS: u8 = 10;
const VALUE_NEUTRAL_POINTS: u8 = 8;
const VALUE_NEAR_POINTS: u8 = 8;

const REMOTE_KEYWORDS: [&str; 3] = ["remote", "anywhere", "nationwide"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchScore {
    pub score: u8,
    pub reasons: Vec<String>,
}

/// One scored contract. Never persisted; recomputed on every evaluation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    pub contract: ContractLead,
    pub score: u8,
    pub reasons: Vec<String>,
}

struct Dimension {
    points: u8,
    reason: Option<String>,
}

impl Dimension {
    fn matched(points: u8, reason: String) -> Self {
        Self {
            points,
            reason: Some(reason),
        }
    }

    fn fallback(points: u8) -> Self {
        Self { points, reason: None }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Scorer {
    matrix: CertificationMatrix,
}

impl Scorer {
    pub fn new(matrix: CertificationMatrix) -> Self {
        Self { matrix }
    }

    pub fn matrix(&self) -> &CertificationMatrix {
        &self.matrix
    }

    /// Pure and deterministic: no clock, no randomness, ordered collections only.
    pub fn score(&self, contract: &NormalizedContract, profile: &CompanyProfile) -> MatchScore {
        let dimensions = [
            naics_dimension(contract, profile),
            certification_dimension(contract, profile, &self.matrix),
            location_dimension(contract, profile),
            value_dimension(contract, profile),
        ];

        let mut score = 0u8;
        let mut reasons = Vec::new();
        for dimension in dimensions {
            score += dimension.points;
            reasons.extend(dimension.reason);
        }
        MatchScore { score, reasons }
    }

    /// Scores every contract, keeps those at or above `min_score`, and sorts
    /// by score descending. The sort is stable, but the relative order of
    /// equal scores is not part of the contract.
    pub fn score_and_sort<I>(&self, contracts: I, profile: &CompanyProfile, min_score: u8) -> Vec<MatchResult>
    where
        I: IntoIterator<Item = ContractLead>,
    {
        let mut results: Vec<MatchResult> = contracts
            .into_iter()
            .filter_map(|contract| {
                let MatchScore { score, reasons } = self.score(&contract.contract, profile);
                (score >= min_score).then_some(MatchResult {
                    contract,
                    score,
                    reasons,
                })
            })
            .collect();
        results.sort_by(|a, b| b.score.cmp(&a.score));
        results
    }
}

/// Two NAICS codes overlap when either is a prefix of the other, so a
/// sector code like `5415` covers every `5415xx` industry.
pub fn naics_overlap(a: &str, b: &str) -> bool {
    let (a, b) = (a.trim(), b.trim());
    !a.is_empty() && !b.is_empty() && (a.starts_with(b) || b.starts_with(a))
}

fn naics_dimension(contract: &NormalizedContract, profile: &CompanyProfile) -> Dimension {
    let contract_codes: Vec<&str> = non_blank(&contract.naics_codes).collect();
    if contract_codes.is_empty() {
        return Dimension::fallback(NAICS_UNKNOWN_POINTS);
    }

    for contract_code in &contract_codes {
        for profile_code in non_blank(&profile.naics_codes) {
            if naics_overlap(contract_code, profile_code) {
                return Dimension::matched(
                    NAICS_POINTS,
                    format!("NAICS {contract_code} matches your industry code {profile_code}"),
                );
            }
        }
    }
    Dimension::fallback(0)
}

fn certification_dimension(
    contract: &NormalizedContract,
    profile: &CompanyProfile,
    matrix: &CertificationMatrix,
) -> Dimension {
    let Some(set_aside) = contract.set_aside_type else {
        return Dimension::fallback(OPEN_COMPETITION_POINTS);
    };

    if let Some(certification) = matrix.qualifying_certification(&profile.certifications, set_aside) {
        return Dimension::matched(
            CERTIFICATION_POINTS,
            format!(
                "{} set-aside matches your {certification} certification",
                set_aside.label()
            ),
        );
    }
    if set_aside == SetAsideType::SmallBusiness {
        return Dimension::fallback(SMALL_BUSINESS_POINTS);
    }
    Dimension::fallback(0)
}

fn location_dimension(contract: &NormalizedContract, profile: &CompanyProfile) -> Dimension {
    let Some(place) = contract
        .place_of_performance
        .as_deref()
        .map(str::trim)
        .filter(|place| !place.is_empty())
    else {
        return Dimension::fallback(LOCATION_NEUTRAL_POINTS);
    };

    if let Some(state) = non_blank(&profile.preferred_states).find(|state| place_mentions_state(place, state)) {
        return Dimension::matched(
            LOCATION_POINTS,
            format!("Performed in {place}, within your preferred state {state}"),
        );
    }

    let lower = place.to_lowercase();
    if REMOTE_KEYWORDS.iter().any(|keyword| lower.contains(keyword)) {
        return Dimension::fallback(REMOTE_POINTS);
    }
    if non_blank(&profile.preferred_states).next().is_none() {
        return Dimension::fallback(LOCATION_NEUTRAL_POINTS);
    }
    Dimension::fallback(0)
}

fn value_dimension(contract: &NormalizedContract, profile: &CompanyProfile) -> Dimension {
    let Some(value) = contract.contract_value() else {
        return Dimension::fallback(VALUE_NEUTRAL_POINTS);
    };
    let (min, max) = (profile.min_contract_value, profile.max_contract_value);
    if min.is_none() && max.is_none() {
        return Dimension::fallback(VALUE_NEUTRAL_POINTS);
    }

    let above_min = min.map_or(true, |min| value >= min);
    let below_max = max.map_or(true, |max| value <= max);
    if above_min && below_max {
        return Dimension::matched(
            VALUE_POINTS,
            format!("Contract value {} fits your target range", format_usd(value)),
        );
    }

    let near = match (above_min, below_max) {
        (false, _) => min.is_some_and(|min| value >= min * 0.5),
        (_, false) => max.is_some_and(|max| value <= max * 1.5),
        _ => false,
    };
    Dimension::fallback(if near { VALUE_NEAR_POINTS } else { 0 })
}

fn non_blank<'a, I>(codes: I) -> impl Iterator<Item = &'a str>
where
    I: IntoIterator<Item = &'a String>,
{
    codes.into_iter().map(|code| code.trim()).filter(|code| !code.is_empty())
}

/// Whole-dollar amount with thousands separators, e.g. `$1,250,000`.
pub fn format_usd(amount: f64) -> String {
    let rounded = amount.abs().round() as u64;
    let digits = rounded.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if amount < 0.0 && rounded > 0 {
        format!("-${grouped}")
    } else {
        format!("${grouped}")
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use chrono::{TimeZone, Utc};
    use govlead_core::ContractSource;

    use super::*;

    fn set(values: &[&str]) -> BTreeSet<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn profile() -> CompanyProfile {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        CompanyProfile::new("user-1", "Acme Federal", now)
    }

    fn contract() -> NormalizedContract {
        NormalizedContract::new(ContractSource::FederalApi, "N-1", "Network support")
    }

    #[test]
    fn naics_prefix_matches_in_either_direction() {
        let mut profile = profile();
        profile.naics_codes = set(&["5415"]);
        let mut contract = contract();

        contract.naics_codes = set(&["541512"]);
        assert_eq!(naics_dimension(&contract, &profile).points, 40);

        profile.naics_codes = set(&["541512"]);
        contract.naics_codes = set(&["5415"]);
        assert_eq!(naics_dimension(&contract, &profile).points, 40);

        profile.naics_codes = set(&["5415"]);
        contract.naics_codes = set(&["611000"]);
        assert_eq!(naics_dimension(&contract, &profile).points, 0);
    }

    #[test]
    fn naics_fallbacks() {
        let mut profile = profile();
        let mut contract = contract();
        assert_eq!(naics_dimension(&contract, &profile).points, 20);

        contract.naics_codes = set(&["541512"]);
        assert_eq!(naics_dimension(&contract, &profile).points, 0);

        profile.naics_codes = set(&["  "]);
        assert_eq!(naics_dimension(&contract, &profile).points, 0);
    }

    #[test]
    fn open_competition_is_neutral_regardless_of_certifications() {
        let matrix = CertificationMatrix::default();
        let contract = contract();
        let mut profile = profile();
        assert_eq!(certification_dimension(&contract, &profile, &matrix).points, 15);
        profile.certifications = set(&["WOSB", "8A", "HUBZONE"]);
        let dimension = certification_dimension(&contract, &profile, &matrix);
        assert_eq!(dimension.points, 15);
        assert!(dimension.reason.is_none());
    }

    #[test]
    fn certification_matrix_drives_set_aside_matches() {
        let matrix = CertificationMatrix::default();
        let mut contract = contract();
        let mut profile = profile();

        contract.set_aside_type = Some(SetAsideType::WomenOwned);
        profile.certifications = set(&["EDWOSB"]);
        let dimension = certification_dimension(&contract, &profile, &matrix);
        assert_eq!(dimension.points, 30);
        assert_eq!(
            dimension.reason.as_deref(),
            Some("Women-Owned Small Business set-aside matches your EDWOSB certification")
        );

        contract.set_aside_type = Some(SetAsideType::SmallBusiness);
        profile.certifications = set(&["HUBZONE"]);
        assert_eq!(certification_dimension(&contract, &profile, &matrix).points, 15);

        contract.set_aside_type = Some(SetAsideType::ServiceDisabledVeteranOwned);
        assert_eq!(certification_dimension(&contract, &profile, &matrix).points, 0);
    }

    #[test]
    fn location_rules() {
        let mut contract = contract();
        let mut profile = profile();
        assert_eq!(location_dimension(&contract, &profile).points, 8);

        contract.place_of_performance = Some("Denver, CO".into());
        assert_eq!(location_dimension(&contract, &profile).points, 8);

        profile.preferred_states = set(&["TX"]);
        assert_eq!(location_dimension(&contract, &profile).points, 0);

        contract.place_of_performance = Some("Remote / Nationwide".into());
        assert_eq!(location_dimension(&contract, &profile).points, 10);

        contract.place_of_performance = Some("Austin, TX, 78701".into());
        assert_eq!(location_dimension(&contract, &profile).points, 15);
    }

    #[test]
    fn value_rules() {
        let mut contract = contract();
        let mut profile = profile();
        assert_eq!(value_dimension(&contract, &profile).points, 8);

        contract.award_amount = Some(250_000.0);
        assert_eq!(value_dimension(&contract, &profile).points, 8);

        profile.min_contract_value = Some(100_000.0);
        profile.max_contract_value = Some(200_000.0);
        // 250k is within 50% above the max.
        assert_eq!(value_dimension(&contract, &profile).points, 8);

        contract.estimated_value = Some(200_000.0);
        let dimension = value_dimension(&contract, &profile);
        assert_eq!(dimension.points, 15);
        assert_eq!(
            dimension.reason.as_deref(),
            Some("Contract value $200,000 fits your target range")
        );

        contract.estimated_value = Some(40_000.0);
        assert_eq!(value_dimension(&contract, &profile).points, 0);

        profile.min_contract_value = None;
        assert_eq!(value_dimension(&contract, &profile).points, 15);
    }

    #[test]
    fn usd_formatting() {
        assert_eq!(format_usd(0.0), "$0");
        assert_eq!(format_usd(999.4), "$999");
        assert_eq!(format_usd(1_250_000.0), "$1,250,000");
        assert_eq!(format_usd(100_000.0), "$100,000");
    }
}
