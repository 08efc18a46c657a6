//! US state and territory codes, used to widen location matching so that a
//! preferred `MA` also finds "Boston, Massachusetts" and vice versa.

const STATES: [(&str, &str); 56] = [
    ("AL", "Alabama"),
    ("AK", "Alaska"),
    ("AZ", "Arizona"),
    ("AR", "Arkansas"),
    ("CA", "California"),
    ("CO", "Colorado"),
    ("CT", "Connecticut"),
    ("DE", "Delaware"),
    ("DC", "District of Columbia"),
    ("FL", "Florida"),
    ("GA", "Georgia"),
    ("HI", "Hawaii"),
    ("ID", "Idaho"),
    ("IL", "Illinois"),
    ("IN", "Indiana"),
    ("IA", "Iowa"),
    ("KS", "Kansas"),
    ("KY", "Kentucky"),
    ("LA", "Louisiana"),
    ("ME", "Maine"),
    ("MD", "Maryland"),
    ("MA", "Massachusetts"),
    ("MI", "Michigan"),
    ("MN", "Minnesota"),
    ("MS", "Mississippi"),
    ("MO", "Missouri"),
    ("MT", "Montana"),
    ("NE", "Nebraska"),
    ("NV", "Nevada"),
    ("NH", "New Hampshire"),
    ("NJ", "New Jersey"),
    ("NM", "New Mexico"),
    ("NY", "New York"),
    ("NC", "North Carolina"),
    ("ND", "North Dakota"),
    ("OH", "Ohio"),
    ("OK", "Oklahoma"),
    ("OR", "Oregon"),
    ("PA", "Pennsylvania"),
    ("RI", "Rhode Island"),
    ("SC", "South Carolina"),
    ("SD", "South Dakota"),
    ("TN", "Tennessee"),
    ("TX", "Texas"),
    ("UT", "Utah"),
    ("VT", "Vermont"),
    ("VA", "Virginia"),
    ("WA", "Washington"),
    ("WV", "West Virginia"),
    ("WI", "Wisconsin"),
    ("WY", "Wyoming"),
    ("PR", "Puerto Rico"),
    ("GU", "Guam"),
    ("VI", "U.S. Virgin Islands"),
    ("AS", "American Samoa"),
    ("MP", "Northern Mariana Islands"),
];

pub fn state_name(code: &str) -> Option<&'static str> {
    let code = code.trim();
    STATES
        .iter()
        .find(|(c, _)| c.eq_ignore_ascii_case(code))
        .map(|(_, name)| *name)
}

pub fn state_code(name: &str) -> Option<&'static str> {
    let name = name.trim();
    STATES
        .iter()
        .find(|(_, n)| n.eq_ignore_ascii_case(name))
        .map(|(code, _)| *code)
}

/// True when `place` mentions `preferred`, given as either a two-letter code
/// or a full name. Names match as a case-insensitive substring. Codes match
/// as a standalone upper-case token anywhere, or in any case in postal
/// position (the first word after a comma, or the whole place), so prose
/// words like "in" or "or" never count.
pub fn place_mentions_state(place: &str, preferred: &str) -> bool {
    let preferred = preferred.trim();
    if preferred.is_empty() {
        return false;
    }
    let place_lower = place.to_lowercase();

    let (code, name) = match (state_name(preferred), state_code(preferred)) {
        (Some(name), _) => (Some(preferred.to_ascii_uppercase()), Some(name.to_string())),
        (None, Some(code)) => (Some(code.to_string()), Some(preferred.to_string())),
        (None, None) => (None, Some(preferred.to_string())),
    };

    let code_hit = code.is_some_and(|code| {
        let upper_token = place
            .split(|c: char| !c.is_ascii_alphanumeric())
            .any(|token| token == code);
        let postal = place.trim().eq_ignore_ascii_case(&code)
            || place.split(',').skip(1).any(|segment| {
                segment
                    .split(|c: char| !c.is_ascii_alphanumeric())
                    .find(|token| !token.is_empty())
                    .is_some_and(|token| token.eq_ignore_ascii_case(&code))
            });
        upper_token || postal
    });
    let name_hit = name.is_some_and(|name| place_lower.contains(&name.to_lowercase()));
    code_hit || name_hit
}
