use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::SetAsideType;

/// Search predicate shared by saved searches and the contract search boundary.
///
/// Every populated field is AND-combined, except `keyword` which matches
/// either the title or the description.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContractSearchFilters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyword: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub naics_codes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub set_aside_type: Option<SetAsideType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notice_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub posted_date_from: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub posted_date_to: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_deadline_from: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_deadline_to: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_value_min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_value_max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub place_of_performance: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FilterValidationError {
    #[error("saved search name must not be empty")]
    EmptyName,
    #[error("{field} must not be blank when present")]
    BlankText { field: &'static str },
    #[error("invalid NAICS code {0:?}: expected 2 to 6 digits")]
    InvalidNaics(String),
    #[error("{field} range is inverted")]
    InvertedRange { field: &'static str },
    #[error("{field} must be a finite, non-negative amount")]
    InvalidAmount { field: &'static str },
}

impl ContractSearchFilters {
    /// Write-time validation; stored filters are trusted on read.
    pub fn validate(&self) -> Result<(), FilterValidationError> {
        for (field, value) in [
            ("keyword", &self.keyword),
            ("agency", &self.agency),
            ("notice_type", &self.notice_type),
            ("place_of_performance", &self.place_of_performance),
        ] {
            if value.as_deref().is_some_and(|v| v.trim().is_empty()) {
                return Err(FilterValidationError::BlankText { field });
            }
        }

        for code in &self.naics_codes {
            let code = code.trim();
            if !(2..=6).contains(&code.len()) || !code.chars().all(|c| c.is_ascii_digit()) {
                return Err(FilterValidationError::InvalidNaics(code.to_string()));
            }
        }

        for (field, amount) in [
            ("estimated_value_min", self.estimated_value_min),
            ("estimated_value_max", self.estimated_value_max),
        ] {
            if amount.is_some_and(|v| !v.is_finite() || v < 0.0) {
                return Err(FilterValidationError::InvalidAmount { field });
            }
        }

        if let (Some(min), Some(max)) = (self.estimated_value_min, self.estimated_value_max) {
            if min > max {
                return Err(FilterValidationError::InvertedRange {
                    field: "estimated_value",
                });
            }
        }
        if let (Some(from), Some(to)) = (self.posted_date_from, self.posted_date_to) {
            if from > to {
                return Err(FilterValidationError::InvertedRange { field: "posted_date" });
            }
        }
        if let (Some(from), Some(to)) = (self.response_deadline_from, self.response_deadline_to) {
            if from > to {
                return Err(FilterValidationError::InvertedRange {
                    field: "response_deadline",
                });
            }
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self == &ContractSearchFilters::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unknown_fields_on_decode() {
        let err = serde_json::from_str::<ContractSearchFilters>(r#"{"keyword":"it","colour":"red"}"#);
        assert!(err.is_err());
    }

    #[test]
    fn decodes_partial_payload() {
        let filters: ContractSearchFilters =
            serde_json::from_str(r#"{"keyword":"cyber","naics_codes":["5415"],"set_aside_type":"WOSB"}"#)
                .unwrap();
        assert_eq!(filters.keyword.as_deref(), Some("cyber"));
        assert_eq!(filters.set_aside_type, Some(SetAsideType::WomenOwned));
        assert!(filters.validate().is_ok());
    }

    #[test]
    fn validation_catches_bad_values() {
        let bad_naics = ContractSearchFilters {
            naics_codes: vec!["54-15".into()],
            ..Default::default()
        };
        assert!(matches!(bad_naics.validate(), Err(FilterValidationError::InvalidNaics(_))));

        let inverted = ContractSearchFilters {
            estimated_value_min: Some(10.0),
            estimated_value_max: Some(5.0),
            ..Default::default()
        };
        assert_eq!(
            inverted.validate(),
            Err(FilterValidationError::InvertedRange {
                field: "estimated_value"
            })
        );

        let blank = ContractSearchFilters {
            agency: Some("  ".into()),
            ..Default::default()
        };
        assert_eq!(
            blank.validate(),
            Err(FilterValidationError::BlankText { field: "agency" })
        );
    }
}
