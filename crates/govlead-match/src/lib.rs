//! Contract relevance: profile scoring, the certification matrix behind it,
//! and the saved-search filter predicate.

pub mod certifications;
pub mod filter;
pub mod scoring;
pub mod states;

pub use certifications::CertificationMatrix;
pub use filter::matches_filters;
pub use scoring::{format_usd, naics_overlap, MatchResult, MatchScore, Scorer};

pub const CRATE_NAME: &str = "govlead-match";
