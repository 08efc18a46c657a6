//! Field extraction from loosely formatted notice text (scraped markdown or
//! email bodies). Each field has its own ordered list of patterns; the first
//! pattern that yields a usable value wins.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use scraper::{Html, Selector};

const DATE_TOKEN: &str = r"(\d{1,2}/\d{1,2}/\d{2,4}|\d{4}-\d{1,2}-\d{1,2}|(?:jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?\s+\d{1,2}(?:st|nd|rd|th)?,?\s+\d{4})";

static BID_ID_LABELLED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:bid|solicitation|rfp|rfq|ifb|rfi|event|contract)\b\s*(?:#|no\.?|number|id)?\s*[:#]?\s*([A-Za-z0-9][A-Za-z0-9\-_/.]*[A-Za-z0-9])",
    )
    .expect("valid bid id pattern")
});

static BID_ID_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b((?:BPM|EV|RFP|RFQ|IFB|ITB|BID)[-_]?\d{3,}[A-Z0-9\-]*)\b").expect("valid bid token pattern")
});

static BID_ID_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\breference\s*(?:#|no\.?|number)\s*[:#]?\s*([A-Za-z0-9][A-Za-z0-9\-_/.]*[A-Za-z0-9])",
    )
    .expect("valid reference pattern")
});

static TITLE_LABELLED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?im)^[\s>*_|-]*(?:bid\s+title|solicitation\s+title|project\s+title|project\s+name|title|subject)[*_]*\s*:[*_\s]*(.+?)[*_\s]*$",
    )
    .expect("valid title pattern")
});

static TITLE_DESCRIPTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^[\s>*_|-]*(?:description|project)[*_]*\s*:[*_\s]*(.+?)[*_\s]*$")
        .expect("valid description title pattern")
});

static MARKDOWN_LINK_TEXT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]*)\]\([^)]*\)").expect("valid link text pattern"));

static TITLE_HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*#{1,4}\s+(.+?)\s*#*\s*$").expect("valid heading pattern"));

static NOTICE_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*(?:(?:fwd?|re)\s*:\s*)*(amendment|addendum|notice\s+of\s+award|award(?:\s+notice)?|cancell?ation(?:\s+notice)?|cancell?ed|new\s+solicitation|solicitation|bid\s+notice|new\s+bid)\b(?:\s*#?\s*\d+)?\s*(?:[:\-–—]\s*|\s+to\s+)",
    )
    .expect("valid notice prefix pattern")
});

static FORWARD_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*(?:(?:fwd?|re)\s*:\s*)+").expect("valid forward pattern"));

static AGENCY_LABELLED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?im)^[\s>*_|-]*(?:issuing\s+agency|agency|department|organization|buyer|entity)[*_]*\s*:[*_\s]*(.+?)[*_\s]*$",
    )
    .expect("valid agency pattern")
});

static AGENCY_PHRASE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b((?:Department|Office|Bureau|Division)\s+of\s+[A-Z][A-Za-z&'\- ]*[A-Za-z])")
        .expect("valid agency phrase pattern")
});

static POSTED_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)\b(?:posted|issued?|issue\s+date|released?|release\s+date|published|advertised)\b[^\n\d]{{0,30}}?{DATE_TOKEN}"
    ))
    .expect("valid posted date pattern")
});

static DUE_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)\b(?:due|closing|closes|deadline|responses?\s+due|submission)\b[^\n\d]{{0,30}}?{DATE_TOKEN}"
    ))
    .expect("valid due date pattern")
});

static URL_LABELLED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)\b(?:details?|more\s+info(?:rmation)?|view|link|url|bid\s+documents?)\b[^\n]{0,40}?(https?://[^\s)\]>"'<]+)"#,
    )
    .expect("valid labelled url pattern")
});

static URL_MARKDOWN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[[^\]]*\]\((https?://[^)\s]+)\)").expect("valid markdown link pattern"));

static URL_BARE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"https?://[^\s)\]>"'<]+"#).expect("valid url pattern"));

static VALUE_LABELLED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:estimated\s+(?:contract\s+)?(?:value|cost|amount)|contract\s+value|budget|not\s+to\s+exceed|award\s+amount)\b[^\n$]{0,30}\$\s*([\d,]+(?:\.\d+)?)\s*(million|mil|thousand|billion|m|k|b)?\b",
    )
    .expect("valid labelled value pattern")
});

static VALUE_ANY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\$\s*([\d,]+(?:\.\d+)?)\s*(million|mil|thousand|billion|m|k|b)?\b")
        .expect("valid value pattern")
});

static NAICS_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bNAICS\b").expect("valid naics label pattern"));

static SIX_DIGITS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{6})\b").expect("valid naics code pattern"));

static SLASH_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{1,2})/(\d{1,2})/(\d{4}|\d{2})\b").expect("valid slash date pattern")
});

static ISO_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{4})-(\d{1,2})-(\d{1,2})\b").expect("valid iso date pattern"));

static WORDY_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^([a-z]+)\.?\s+(\d{1,2})(?:st|nd|rd|th)?,?\s+(\d{4})\b").expect("valid month date pattern")
});

static HTML_BLOCK_END: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(<br\s*/?>|</(?:p|div|tr|li|h[1-6]|table|ul|ol|blockquote)>)").expect("valid block pattern")
});

static HTML_CELL_END: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(</t[dh]>)").expect("valid cell pattern"));

static HTML_NON_CONTENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(?:script|style|head)\b[^>]*>.*?</(?:script|style|head)>").expect("valid script pattern")
});

const MONTHS: [&str; 12] = [
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

/// Everything the field extractors could recover from one notice.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedNotice {
    pub bid_id: String,
    pub title: String,
    pub notice_type: &'static str,
    pub agency: Option<String>,
    pub posted_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub detail_url: Option<String>,
    pub estimated_value: Option<f64>,
    pub naics_codes: BTreeSet<String>,
}

/// Extra context that travels with the text: an email subject line and the
/// first hyperlink found in the original markup.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParseHints<'a> {
    pub subject: Option<&'a str>,
    pub first_link: Option<&'a str>,
}

/// Runs every field extractor. `None` means no identifier could be found and
/// the notice is unparseable.
pub fn parse_notice(text: &str, hints: ParseHints<'_>) -> Option<ParsedNotice> {
    let bid_id = extract_bid_id(text).or_else(|| hints.subject.and_then(extract_bid_id))?;
    let raw_title = raw_title(text, hints.subject);
    let notice_type = raw_title.as_deref().map_or("Solicitation", classify_notice_type);

    Some(ParsedNotice {
        title: extract_title(text, hints.subject, &bid_id),
        notice_type,
        agency: extract_agency(text),
        posted_date: extract_posted_date(text),
        due_date: extract_due_date(text),
        detail_url: extract_detail_url(text).or_else(|| hints.first_link.map(str::to_string)),
        estimated_value: extract_estimated_value(text),
        naics_codes: extract_naics_codes(text),
        bid_id,
    })
}

pub fn extract_bid_id(text: &str) -> Option<String> {
    let has_digit = |candidate: &str| candidate.chars().any(|c| c.is_ascii_digit());

    for pattern in [&*BID_ID_LABELLED, &*BID_ID_TOKEN, &*BID_ID_REFERENCE] {
        let found = pattern
            .captures_iter(text)
            .filter_map(|caps| caps.get(1))
            .map(|m| m.as_str().trim_end_matches(['.', '-', '/']))
            .find(|candidate| has_digit(candidate));
        if let Some(id) = found {
            return Some(id.to_string());
        }
    }
    None
}

fn raw_title(text: &str, subject: Option<&str>) -> Option<String> {
    let labelled = TITLE_LABELLED
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string());
    let subject = subject
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    let heading = TITLE_HEADING
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string());
    let description = TITLE_DESCRIPTION
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string());

    labelled
        .or(subject)
        .or(heading)
        .or(description)
        .map(|t| clean_value(&MARKDOWN_LINK_TEXT.replace_all(&t, "$1")))
        .filter(|t| !t.is_empty())
}

/// Title with notification prefixes and a leading identifier stripped; the
/// identifier itself when nothing better exists.
pub fn extract_title(text: &str, subject: Option<&str>, bid_id: &str) -> String {
    raw_title(text, subject)
        .map(|raw| strip_notice_prefix(&raw))
        .map(|title| strip_leading_id(&title, bid_id))
        .filter(|title| !title.is_empty())
        .unwrap_or_else(|| bid_id.to_string())
}

/// Removes forwarding markers and leading notice-type markers such as
/// `Amendment 2 - ` or `Award: `.
pub fn strip_notice_prefix(title: &str) -> String {
    let mut current = FORWARD_PREFIX.replace(title, "").into_owned();
    while let Some(found) = NOTICE_PREFIX.find(&current) {
        if found.end() >= current.len() {
            break;
        }
        current = current[found.end()..].to_string();
    }
    current.trim().to_string()
}

fn strip_leading_id(title: &str, bid_id: &str) -> String {
    let trimmed = title.trim();
    match trimmed.strip_prefix(bid_id) {
        Some(rest) => rest
            .trim_start_matches(|c: char| c.is_whitespace() || matches!(c, '-' | ':' | '–' | '—'))
            .to_string(),
        None => trimmed.to_string(),
    }
}

/// Notice kind from a raw title prefix; unprefixed titles are new solicitations.
pub fn classify_notice_type(raw_title: &str) -> &'static str {
    let Some(caps) = NOTICE_PREFIX.captures(raw_title) else {
        return "Solicitation";
    };
    let marker = caps
        .get(1)
        .map(|m| m.as_str().to_ascii_lowercase())
        .unwrap_or_default();
    if marker.starts_with("amendment") || marker.starts_with("addendum") {
        "Amendment"
    } else if marker.contains("award") {
        "Award"
    } else if marker.starts_with("cancel") {
        "Cancellation"
    } else {
        "Solicitation"
    }
}

pub fn extract_agency(text: &str) -> Option<String> {
    AGENCY_LABELLED
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| clean_value(m.as_str()))
        .filter(|v| !v.is_empty())
        .or_else(|| {
            AGENCY_PHRASE
                .captures(text)
                .and_then(|caps| caps.get(1))
                .map(|m| clean_value(m.as_str()))
        })
}

pub fn extract_posted_date(text: &str) -> Option<NaiveDate> {
    first_labelled_date(&POSTED_DATE, text)
}

pub fn extract_due_date(text: &str) -> Option<NaiveDate> {
    first_labelled_date(&DUE_DATE, text)
}

fn first_labelled_date(pattern: &Regex, text: &str) -> Option<NaiveDate> {
    pattern
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .find_map(|m| parse_date(m.as_str()))
}

pub fn extract_detail_url(text: &str) -> Option<String> {
    [&*URL_LABELLED, &*URL_MARKDOWN]
        .into_iter()
        .find_map(|pattern| pattern.captures(text).and_then(|caps| caps.get(1)))
        .or_else(|| URL_BARE.find(text))
        .map(|m| m.as_str().trim_end_matches(['.', ',', ';']).to_string())
}

/// Dollar amount, preferring one next to a value label. Understands
/// `$1,234,567.00`, `$2.5M` and `$750K`.
pub fn extract_estimated_value(text: &str) -> Option<f64> {
    [&*VALUE_LABELLED, &*VALUE_ANY].into_iter().find_map(|pattern| {
        let caps = pattern.captures(text)?;
        let number: f64 = caps.get(1)?.as_str().replace(',', "").parse().ok()?;
        let multiplier = match caps.get(2).map(|m| m.as_str().to_ascii_lowercase()).as_deref() {
            Some("k" | "thousand") => 1_000.0,
            Some("m" | "mil" | "million") => 1_000_000.0,
            Some("b" | "billion") => 1_000_000_000.0,
            _ => 1.0,
        };
        Some(number * multiplier)
    })
}

/// Six-digit codes that follow a `NAICS` label on the same line.
pub fn extract_naics_codes(text: &str) -> BTreeSet<String> {
    let mut codes = BTreeSet::new();
    for label in NAICS_LABEL.find_iter(text) {
        let rest = &text[label.end()..];
        let line = rest.split('\n').next().unwrap_or_default();
        codes.extend(SIX_DIGITS.captures_iter(line).filter_map(|c| c.get(1)).map(|m| m.as_str().to_string()));
    }
    codes
}

/// Accepts `M/D/YY`, `M/D/YYYY`, `Month D, YYYY` (full or abbreviated) and
/// `YYYY-MM-DD`. Anything else, including impossible calendar dates, is `None`.
pub fn parse_date(input: &str) -> Option<NaiveDate> {
    let input = input.trim();

    if let Some(caps) = ISO_DATE.captures(input) {
        return NaiveDate::from_ymd_opt(
            caps[1].parse().ok()?,
            caps[2].parse().ok()?,
            caps[3].parse().ok()?,
        );
    }

    if let Some(caps) = SLASH_DATE.captures(input) {
        let year_text = &caps[3];
        let mut year: i32 = year_text.parse().ok()?;
        if year_text.len() == 2 {
            year += 2000;
        }
        return NaiveDate::from_ymd_opt(year, caps[1].parse().ok()?, caps[2].parse().ok()?);
    }

    if let Some(caps) = WORDY_DATE.captures(input) {
        let month = month_number(&caps[1])?;
        return NaiveDate::from_ymd_opt(caps[3].parse().ok()?, month, caps[2].parse().ok()?);
    }

    None
}

fn month_number(name: &str) -> Option<u32> {
    let name = name.to_ascii_lowercase();
    if name.len() < 3 {
        return None;
    }
    MONTHS
        .iter()
        .position(|month| month.starts_with(&name))
        .map(|idx| idx as u32 + 1)
}

pub fn date_to_utc(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(chrono::NaiveTime::MIN).and_utc()
}

/// Flattens an HTML body to text with block elements on their own lines.
pub fn html_to_text(html: &str) -> String {
    let html = HTML_NON_CONTENT.replace_all(html, "");
    let html = HTML_BLOCK_END.replace_all(&html, "$1\n");
    let html = HTML_CELL_END.replace_all(&html, "$1 ");
    let document = Html::parse_document(&html);
    let raw: String = document.root_element().text().collect();

    let mut lines = Vec::new();
    for line in raw.lines() {
        let collapsed = line
            .split(|c: char| c.is_whitespace() || c == '\u{a0}')
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        if !collapsed.is_empty() {
            lines.push(collapsed);
        }
    }
    lines.join("\n")
}

pub fn first_link(html: &str) -> Option<String> {
    let selector = Selector::parse("a[href]").ok()?;
    let document = Html::parse_document(html);
    let href = document
        .select(&selector)
        .filter_map(|a| a.value().attr("href"))
        .find(|href| href.starts_with("http://") || href.starts_with("https://"))?;
    Some(href.trim().to_string())
}

fn clean_value(value: &str) -> String {
    value
        .trim()
        .trim_matches(|c: char| matches!(c, '*' | '_' | '|' | '#') || c.is_whitespace())
        .trim_end_matches(['.', ',', ';'])
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn slash_and_wordy_dates_agree() {
        assert_eq!(parse_date("01/21/2026"), Some(ymd(2026, 1, 21)));
        assert_eq!(parse_date("January 21, 2026"), parse_date("01/21/2026"));
        assert_eq!(parse_date("Jan. 21, 2026"), Some(ymd(2026, 1, 21)));
        assert_eq!(parse_date("Sept 3 2026"), Some(ymd(2026, 9, 3)));
        assert_eq!(parse_date("2026-01-21"), Some(ymd(2026, 1, 21)));
    }

    #[test]
    fn two_digit_years_land_in_this_century() {
        assert_eq!(parse_date("1/5/26"), Some(ymd(2026, 1, 5)));
    }

    #[test]
    fn unparseable_dates_are_none() {
        assert_eq!(parse_date("TBD"), None);
        assert_eq!(parse_date("02/30/2026"), None);
        assert_eq!(parse_date("Smarch 4, 2026"), None);
        assert_eq!(parse_date(""), None);
    }

    #[test]
    fn bid_id_patterns_are_tried_in_order() {
        assert_eq!(
            extract_bid_id("Bid Number: BPM051234\nTitle: Road Salt").as_deref(),
            Some("BPM051234")
        );
        assert_eq!(
            extract_bid_id("Please see RFP #2026-017 for details").as_deref(),
            Some("2026-017")
        );
        assert_eq!(
            extract_bid_id("New posting EV00012345 on the board").as_deref(),
            Some("EV00012345")
        );
        assert_eq!(
            extract_bid_id("Reference No. 44-A19 applies").as_deref(),
            Some("44-A19")
        );
    }

    #[test]
    fn bid_labels_without_digits_are_ignored() {
        assert_eq!(extract_bid_id("Bid opportunity: see attached"), None);
        assert_eq!(extract_bid_id("Weekly newsletter, nothing to see"), None);
    }

    #[test]
    fn title_strips_notification_prefixes() {
        let text = "Bid Number: BPM051234";
        assert_eq!(
            extract_title(text, Some("Amendment 2 - Snow Removal Services"), "BPM051234"),
            "Snow Removal Services"
        );
        assert_eq!(
            extract_title(text, Some("Fwd: Award: BPM051234 - Snow Removal"), "BPM051234"),
            "Snow Removal"
        );
        assert_eq!(extract_title(text, None, "BPM051234"), "BPM051234");
    }

    #[test]
    fn labelled_title_beats_subject() {
        let text = "**Title:** Janitorial Services\nBid Number: BPM1";
        assert_eq!(
            extract_title(text, Some("New Bid Notice"), "BPM1"),
            "Janitorial Services"
        );
    }

    #[test]
    fn description_column_is_a_last_resort_title() {
        let text = "Bid Number: RFQ-7\nDescription: [HVAC Maintenance](https://city.example.test/7)";
        assert_eq!(extract_title(text, None, "RFQ-7"), "HVAC Maintenance");
    }

    #[test]
    fn notice_type_follows_prefix() {
        assert_eq!(classify_notice_type("Amendment 1: Paving"), "Amendment");
        assert_eq!(classify_notice_type("Notice of Award - Paving"), "Award");
        assert_eq!(classify_notice_type("Cancellation: Paving"), "Cancellation");
        assert_eq!(classify_notice_type("Paving Services"), "Solicitation");
    }

    #[test]
    fn agency_from_label_then_phrase() {
        assert_eq!(
            extract_agency("Agency: Department of Transportation\n").as_deref(),
            Some("Department of Transportation")
        );
        assert_eq!(
            extract_agency("Issued on behalf of the Office of Facilities Management.").as_deref(),
            Some("Office of Facilities Management")
        );
        assert_eq!(extract_agency("no issuer mentioned"), None);
    }

    #[test]
    fn posted_and_due_dates_use_their_labels() {
        let text = "Posted Date: 01/05/2026\n**Due Date & Time:** January 21, 2026 2:00 PM";
        assert_eq!(extract_posted_date(text), Some(ymd(2026, 1, 5)));
        assert_eq!(extract_due_date(text), Some(ymd(2026, 1, 21)));
        assert_eq!(extract_due_date("Due date: TBD"), None);
    }

    #[test]
    fn detail_url_prefers_labelled_links() {
        let text = "See https://example.test/home\nView details: https://bids.example.test/bid/42.";
        assert_eq!(
            extract_detail_url(text).as_deref(),
            Some("https://bids.example.test/bid/42")
        );
        assert_eq!(
            extract_detail_url("[Open bid](https://bids.example.test/9)").as_deref(),
            Some("https://bids.example.test/9")
        );
        assert_eq!(extract_detail_url("nothing here"), None);
    }

    #[test]
    fn dollar_amounts_with_suffixes() {
        assert_eq!(extract_estimated_value("Estimated Value: $1,234,567.00"), Some(1_234_567.0));
        assert_eq!(extract_estimated_value("Budget of $2.5M"), Some(2_500_000.0));
        assert_eq!(extract_estimated_value("approx $750K"), Some(750_000.0));
        assert_eq!(
            extract_estimated_value("Bond $500\nEstimated value: $90,000"),
            Some(90_000.0)
        );
        assert_eq!(extract_estimated_value("no money"), None);
    }

    #[test]
    fn naics_codes_follow_label() {
        let codes = extract_naics_codes("NAICS: 541512, 541519\nPhone 617555");
        assert_eq!(codes.into_iter().collect::<Vec<_>>(), vec!["541512", "541519"]);
        assert!(extract_naics_codes("Zip 021080 only").is_empty());
    }

    #[test]
    fn html_body_is_flattened_into_lines() {
        let html = r#"<html><head><style>p { color: red; }</style></head><body>
            <p>Bid Number: <b>BPM051234</b></p>
            <table><tr><td>Due Date:</td><td>01/21/2026</td></tr></table>
            <a href="https://bids.example.test/BPM051234">Details</a>
        </body></html>"#;
        let text = html_to_text(html);
        assert!(text.contains("Bid Number: BPM051234"));
        assert!(text.contains("Due Date: 01/21/2026"));
        assert!(!text.contains("color"));
        assert_eq!(
            first_link(html).as_deref(),
            Some("https://bids.example.test/BPM051234")
        );
    }

    #[test]
    fn full_notice_parse() {
        let text = "\
Bid Number: BPM051234
Title: Amendment 1 - Road Salt Supply
Agency: Department of Transportation
Posted: 01/05/2026
Due Date: 01/21/2026
NAICS: 424690
Estimated Value: $250K
Details: https://bids.example.test/BPM051234";
        let notice = parse_notice(text, ParseHints::default()).unwrap();
        assert_eq!(notice.bid_id, "BPM051234");
        assert_eq!(notice.title, "Road Salt Supply");
        assert_eq!(notice.notice_type, "Amendment");
        assert_eq!(notice.agency.as_deref(), Some("Department of Transportation"));
        assert_eq!(notice.posted_date, Some(ymd(2026, 1, 5)));
        assert_eq!(notice.due_date, Some(ymd(2026, 1, 21)));
        assert_eq!(notice.estimated_value, Some(250_000.0));
        assert!(notice.naics_codes.contains("424690"));
        assert_eq!(
            notice.detail_url.as_deref(),
            Some("https://bids.example.test/BPM051234")
        );
    }

    #[test]
    fn notice_without_identifier_is_unparseable() {
        assert!(parse_notice("Weekly digest of upcoming events", ParseHints::default()).is_none());
    }
}
