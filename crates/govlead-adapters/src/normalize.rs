//! Pure conversions from each source's raw shape into [`NormalizedContract`].

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use govlead_core::{ContractSource, NormalizedContract, SetAsideType};
use regex::Regex;

use crate::email::EmailNotice;
use crate::parse::{self, ParseHints, ParsedNotice};
use crate::sam_gov::SamOpportunity;
use crate::scrape::ScrapedListing;
use crate::{NormalizeError, RawItem, SourceHints};

const MAX_DESCRIPTION_CHARS: usize = 4_000;

static SET_ASIDE_LABELLED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^[\s>*_|-]*set[\s-]?asides?(?:\s+type)?[*_]*\s*:[*_\s]*(.+?)[*_\s]*$")
        .expect("valid set-aside label pattern")
});

static SET_ASIDE_PHRASE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)([A-Za-z0-9()\-]+(?:[ \t]+[A-Za-z0-9()\-]+){0,5})[ \t]+set[\s-]?aside\b")
        .expect("valid set-aside phrase pattern")
});

pub fn normalize_item(item: &RawItem) -> Result<NormalizedContract, NormalizeError> {
    match item {
        RawItem::Federal(opportunity) => normalize_sam(opportunity),
        RawItem::Municipal(listing) => normalize_scraped(listing),
        RawItem::StateEmail(notice) => normalize_email(notice),
    }
}

pub fn normalize_sam(opportunity: &SamOpportunity) -> Result<NormalizedContract, NormalizeError> {
    let notice_id = non_blank(opportunity.notice_id.as_deref()).ok_or(NormalizeError::MissingField("noticeId"))?;
    let title = non_blank(opportunity.title.as_deref())
        .or_else(|| non_blank(opportunity.solicitation_number.as_deref()))
        .unwrap_or(notice_id);

    let mut contract = NormalizedContract::new(ContractSource::FederalApi, notice_id, title);
    let (agency, sub_agency) = split_agency_path(opportunity.full_parent_path_name.as_deref());
    contract.agency = agency;
    contract.sub_agency = sub_agency;
    contract.description = owned(opportunity.description.as_deref());
    contract.solicitation_number = owned(opportunity.solicitation_number.as_deref());
    contract.notice_type = owned(opportunity.notice_type.as_deref());
    contract.contract_type = owned(opportunity.base_type.as_deref());
    contract.psc_code = owned(opportunity.classification_code.as_deref());

    contract.naics_codes = opportunity
        .naics_codes
        .iter()
        .flatten()
        .map(String::as_str)
        .chain(opportunity.naics_code.as_deref())
        .filter_map(|code| non_blank(Some(code)))
        .map(str::to_string)
        .collect();

    contract.set_aside_type = match non_blank(opportunity.type_of_set_aside.as_deref()) {
        Some(code) => map_sam_set_aside(code),
        None => opportunity
            .type_of_set_aside_description
            .as_deref()
            .and_then(set_aside_from_phrase),
    };

    contract.award_amount = opportunity.award.as_ref().and_then(|award| award.amount());
    contract.posted_date = opportunity.posted_date.as_deref().and_then(parse_timestamp);
    contract.response_deadline = opportunity.response_deadline.as_deref().and_then(parse_timestamp);
    contract.archive_date = opportunity.archive_date.as_deref().and_then(parse_timestamp);
    contract.place_of_performance = opportunity.place_of_performance.as_ref().and_then(|place| {
        join_place(&[
            place.city.as_ref().and_then(|c| c.name.as_deref()),
            place.state.as_ref().and_then(|s| s.code.as_deref()),
            place.zip.as_deref(),
            place.country.as_ref().and_then(|c| c.code.as_deref()),
        ])
    });
    contract.source_url = owned(opportunity.ui_link.as_deref());
    Ok(contract)
}

pub fn normalize_scraped(listing: &ScrapedListing) -> Result<NormalizedContract, NormalizeError> {
    let notice = parse::parse_notice(&listing.block, ParseHints::default()).ok_or_else(|| {
        NormalizeError::Unparseable {
            reason: "listing has no bid identifier".into(),
        }
    })?;
    Ok(contract_from_notice(
        ContractSource::MunicipalScrape,
        notice,
        &listing.block,
        &listing.hints,
        Some(listing.page_url.as_str()),
        None,
    ))
}

pub fn normalize_email(notice: &EmailNotice) -> Result<NormalizedContract, NormalizeError> {
    let message = &notice.message;
    let (text, link) = match (message.html_body.as_deref(), message.text_body.as_deref()) {
        (Some(html), _) => (parse::html_to_text(html), parse::first_link(html)),
        (None, Some(text)) => (text.to_string(), None),
        (None, None) => {
            return Err(NormalizeError::Unparseable {
                reason: "message has no body".into(),
            })
        }
    };

    let hints = ParseHints {
        subject: message.subject.as_deref(),
        first_link: link.as_deref(),
    };
    let parsed = parse::parse_notice(&text, hints).ok_or_else(|| NormalizeError::Unparseable {
        reason: "message has no bid identifier".into(),
    })?;
    Ok(contract_from_notice(
        ContractSource::StateEmail,
        parsed,
        &text,
        &notice.hints,
        None,
        message.received_at,
    ))
}

fn contract_from_notice(
    source: ContractSource,
    notice: ParsedNotice,
    text: &str,
    hints: &SourceHints,
    fallback_url: Option<&str>,
    received_at: Option<DateTime<Utc>>,
) -> NormalizedContract {
    let mut contract = NormalizedContract::new(source, source.namespaced_id(&notice.bid_id), notice.title);
    contract.description = Some(truncate_chars(text.trim(), MAX_DESCRIPTION_CHARS));
    contract.agency = notice.agency.or_else(|| hints.agency.clone());
    contract.solicitation_number = Some(notice.bid_id);
    contract.notice_type = Some(notice.notice_type.to_string());
    contract.naics_codes = notice.naics_codes;
    contract.set_aside_type = set_aside_from_text(text);
    contract.estimated_value = notice.estimated_value;
    contract.posted_date = notice.posted_date.map(parse::date_to_utc).or(received_at);
    contract.response_deadline = notice.due_date.map(parse::date_to_utc);
    contract.place_of_performance = hints.place_of_performance.clone();
    contract.source_url = notice.detail_url.or_else(|| fallback_url.map(str::to_string));
    contract
}

/// Collapses SAM.gov set-aside codes into the shared label space. `None` is
/// full-and-open competition.
pub fn map_sam_set_aside(code: &str) -> Option<SetAsideType> {
    match code.trim().to_ascii_uppercase().as_str() {
        "" | "NONE" => None,
        "SBA" | "SBP" => Some(SetAsideType::SmallBusiness),
        "8A" | "8AN" => Some(SetAsideType::EightA),
        "HZC" | "HZS" => Some(SetAsideType::HubZone),
        "SDVOSBC" | "SDVOSBS" => Some(SetAsideType::ServiceDisabledVeteranOwned),
        "WOSB" | "WOSBSS" => Some(SetAsideType::WomenOwned),
        "EDWOSB" | "EDWOSBSS" => Some(SetAsideType::EconomicallyDisadvantagedWomenOwned),
        "VSA" | "VSS" => Some(SetAsideType::VeteranOwned),
        "ISBEE" | "IEE" => Some(SetAsideType::IndianSmallBusiness),
        _ => Some(SetAsideType::Other),
    }
}

/// Set-aside declared in free text, either on a `Set-Aside:` line or as a
/// "... set-aside" phrase.
pub fn set_aside_from_text(text: &str) -> Option<SetAsideType> {
    SET_ASIDE_LABELLED
        .captures(text)
        .or_else(|| SET_ASIDE_PHRASE.captures(text))
        .and_then(|caps| caps.get(1))
        .and_then(|m| set_aside_from_phrase(m.as_str()))
}

/// Keyword rules over a set-aside description. Specific programs are checked
/// before the generic small-business label they usually mention.
pub fn set_aside_from_phrase(phrase: &str) -> Option<SetAsideType> {
    let lower = phrase.to_ascii_lowercase();
    let has = |needle: &str| lower.contains(needle);
    let has_word = |word: &str| {
        lower
            .split(|c: char| !c.is_ascii_alphanumeric())
            .any(|token| token == word)
    };

    if lower.trim().is_empty()
        || is_negated(&lower)
        || has("none")
        || has("unrestricted")
        || has("full and open")
        || has_word("na")
    {
        None
    } else if has("8(a)") || has_word("8a") {
        Some(SetAsideType::EightA)
    } else if has("hubzone") {
        Some(SetAsideType::HubZone)
    } else if has("service-disabled") || has("service disabled") || has_word("sdvosb") {
        Some(SetAsideType::ServiceDisabledVeteranOwned)
    } else if has("economically disadvantaged") || has_word("edwosb") {
        Some(SetAsideType::EconomicallyDisadvantagedWomenOwned)
    } else if has("women") || has_word("wosb") {
        Some(SetAsideType::WomenOwned)
    } else if has("veteran") || has_word("vosb") {
        Some(SetAsideType::VeteranOwned)
    } else if has("indian") || has_word("isbee") {
        Some(SetAsideType::IndianSmallBusiness)
    } else if has("small business") || has_word("sbe") || has_word("sba") || has_word("small") {
        Some(SetAsideType::SmallBusiness)
    } else {
        Some(SetAsideType::Other)
    }
}

/// "no set-aside", "not a small business set aside", "Set-Aside: Not applicable".
/// A "No" followed by a number is a reference label ("Bid No 2026-14"), not a
/// negation.
fn is_negated(lower: &str) -> bool {
    let tokens: Vec<&str> = lower
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|token| !token.is_empty())
        .collect();
    tokens.iter().enumerate().any(|(i, token)| match *token {
        "not" => true,
        "no" => !tokens
            .get(i + 1)
            .is_some_and(|next| next.starts_with(|c: char| c.is_ascii_digit())),
        _ => false,
    })
}

/// `A.B.C` becomes agency `A` and sub-agency `B / C`.
pub fn split_agency_path(path: Option<&str>) -> (Option<String>, Option<String>) {
    let Some(path) = non_blank(path) else {
        return (None, None);
    };
    let mut segments = path.split('.').map(str::trim).filter(|s| !s.is_empty());
    let agency = segments.next().map(str::to_string);
    let rest = segments.collect::<Vec<_>>();
    let sub_agency = if rest.is_empty() {
        None
    } else {
        Some(rest.join(" / "))
    };
    (agency, sub_agency)
}

pub fn join_place(parts: &[Option<&str>]) -> Option<String> {
    let joined = parts
        .iter()
        .filter_map(|part| non_blank(*part))
        .collect::<Vec<_>>()
        .join(", ");
    if joined.is_empty() {
        None
    } else {
        Some(joined)
    }
}

/// RFC 3339 timestamps keep their instant; bare dates become midnight UTC.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    parse::parse_date(value).map(parse::date_to_utc)
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn owned(value: Option<&str>) -> Option<String> {
    non_blank(value).map(str::to_string)
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
