//! Saved-search filter predicate. A contract either passes every set
//! criterion or it does not; there is no partial credit here.

use chrono::{DateTime, Utc};
use govlead_core::{ContractLead, ContractSearchFilters};

use crate::scoring::naics_overlap;

pub fn matches_filters(lead: &ContractLead, filters: &ContractSearchFilters) -> bool {
    let contract = &lead.contract;

    if let Some(keyword) = non_blank(filters.keyword.as_deref()) {
        let in_title = contains_ci(&contract.title, keyword);
        let in_description = contract
            .description
            .as_deref()
            .is_some_and(|description| contains_ci(description, keyword));
        if !in_title && !in_description {
            return false;
        }
    }

    let wanted_naics: Vec<&str> = filters
        .naics_codes
        .iter()
        .map(|code| code.trim())
        .filter(|code| !code.is_empty())
        .collect();
    if !wanted_naics.is_empty()
        && !contract
            .naics_codes
            .iter()
            .any(|code| wanted_naics.iter().any(|wanted| naics_overlap(code, wanted)))
    {
        return false;
    }

    if let Some(agency) = non_blank(filters.agency.as_deref()) {
        let hit = [contract.agency.as_deref(), contract.sub_agency.as_deref()]
            .into_iter()
            .flatten()
            .any(|name| contains_ci(name, agency));
        if !hit {
            return false;
        }
    }

    if let Some(set_aside) = filters.set_aside_type {
        if contract.set_aside_type != Some(set_aside) {
            return false;
        }
    }

    if let Some(notice_type) = non_blank(filters.notice_type.as_deref()) {
        let same = contract
            .notice_type
            .as_deref()
            .is_some_and(|actual| actual.trim().eq_ignore_ascii_case(notice_type));
        if !same {
            return false;
        }
    }

    if !within(
        Some(lead.effective_posted_at()),
        filters.posted_date_from,
        filters.posted_date_to,
    ) {
        return false;
    }
    if !within(
        contract.response_deadline,
        filters.response_deadline_from,
        filters.response_deadline_to,
    ) {
        return false;
    }

    if filters.estimated_value_min.is_some() || filters.estimated_value_max.is_some() {
        let Some(value) = contract.contract_value() else {
            return false;
        };
        if filters.estimated_value_min.is_some_and(|min| value < min)
            || filters.estimated_value_max.is_some_and(|max| value > max)
        {
            return false;
        }
    }

    if let Some(place) = non_blank(filters.place_of_performance.as_deref()) {
        let hit = contract
            .place_of_performance
            .as_deref()
            .is_some_and(|actual| contains_ci(actual, place));
        if !hit {
            return false;
        }
    }

    true
}

/// Inclusive range check. A missing timestamp fails any range that is set.
fn within(at: Option<DateTime<Utc>>, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> bool {
    if from.is_none() && to.is_none() {
        return true;
    }
    let Some(at) = at else {
        return false;
    };
    from.map_or(true, |from| at >= from) && to.map_or(true, |to| at <= to)
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};
    use govlead_core::{ContractSource, NormalizedContract, SetAsideType};

    use super::*;

    fn lead() -> ContractLead {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        let mut contract = NormalizedContract::new(ContractSource::FederalApi, "W91-1", "Cyber Range Support");
        contract.description = Some("Operate the training network".into());
        contract.agency = Some("Department of Defense".into());
        contract.sub_agency = Some("Department of the Army / Cyber Command".into());
        contract.naics_codes = ["541512".to_string()].into();
        contract.set_aside_type = Some(SetAsideType::WomenOwned);
        contract.notice_type = Some("Solicitation".into());
        contract.posted_date = Some(now - Duration::days(2));
        contract.response_deadline = Some(now + Duration::days(20));
        contract.estimated_value = Some(750_000.0);
        contract.place_of_performance = Some("Fort Meade, MD, 20755, USA".into());
        ContractLead::new(contract, now)
    }

    #[test]
    fn empty_filters_match_everything() {
        assert!(matches_filters(&lead(), &ContractSearchFilters::default()));
    }

    #[test]
    fn keyword_searches_title_or_description() {
        let lead = lead();
        let mut filters = ContractSearchFilters {
            keyword: Some("CYBER".into()),
            ..Default::default()
        };
        assert!(matches_filters(&lead, &filters));
        filters.keyword = Some("training network".into());
        assert!(matches_filters(&lead, &filters));
        filters.keyword = Some("janitorial".into());
        assert!(!matches_filters(&lead, &filters));
    }

    #[test]
    fn criteria_are_and_combined() {
        let lead = lead();
        let mut filters = ContractSearchFilters {
            naics_codes: vec!["5415".into(), "236220".into()],
            agency: Some("army".into()),
            set_aside_type: Some(SetAsideType::WomenOwned),
            notice_type: Some("solicitation".into()),
            place_of_performance: Some("md".into()),
            estimated_value_min: Some(500_000.0),
            estimated_value_max: Some(750_000.0),
            ..Default::default()
        };
        assert!(matches_filters(&lead, &filters));

        filters.set_aside_type = Some(SetAsideType::HubZone);
        assert!(!matches_filters(&lead, &filters));
        filters.set_aside_type = None;

        filters.naics_codes = vec!["611".into()];
        assert!(!matches_filters(&lead, &filters));
    }

    #[test]
    fn naics_filter_overlaps_in_either_direction() {
        let mut lead = lead();
        let mut filters = ContractSearchFilters {
            naics_codes: vec!["5415".into()],
            ..Default::default()
        };
        assert!(matches_filters(&lead, &filters));

        lead.contract.naics_codes = ["5415".to_string()].into();
        filters.naics_codes = vec!["541512".into()];
        assert!(matches_filters(&lead, &filters));

        filters.naics_codes = vec!["611000".into()];
        assert!(!matches_filters(&lead, &filters));
    }

    #[test]
    fn value_range_requires_a_value() {
        let mut lead = lead();
        lead.contract.estimated_value = None;
        let filters = ContractSearchFilters {
            estimated_value_max: Some(1_000_000.0),
            ..Default::default()
        };
        assert!(!matches_filters(&lead, &filters));

        lead.contract.award_amount = Some(900_000.0);
        assert!(matches_filters(&lead, &filters));
    }

    #[test]
    fn date_ranges_are_inclusive() {
        let lead = lead();
        let posted = lead.contract.posted_date.unwrap();
        let mut filters = ContractSearchFilters {
            posted_date_from: Some(posted),
            posted_date_to: Some(posted),
            ..Default::default()
        };
        assert!(matches_filters(&lead, &filters));

        filters.response_deadline_to = Some(posted);
        assert!(!matches_filters(&lead, &filters));
    }
}
