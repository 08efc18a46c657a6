//! HTTP fetch utilities, raw artifact quarantine and contract persistence.

mod artifacts;
mod http;
mod memory;
mod postgres;

pub use artifacts::{ArtifactStore, StoredArtifact};
pub use http::{
    classify_reqwest_error, classify_status, BackoffPolicy, FetchError, FetchedResponse,
    HttpClientConfig, HttpFetcher, RequestSpacer, RetryDisposition,
};
pub use memory::MemoryStore;
pub use postgres::PgStore;

pub const CRATE_NAME: &str = "govlead-storage";
