//! Alert evaluation (saved searches and company profiles) and notification
//! delivery.

pub mod dispatch;
pub mod evaluator;
pub mod throttle;

pub use dispatch::{
    render_notification, DispatchError, DispatchOutcome, EmailTransport, HttpEmailTransport,
    NotificationDispatcher, OutboundEmail, RenderedNotification, DEFAULT_EMAIL_ENDPOINT,
};
pub use evaluator::{AlertEvaluator, EvaluationOutcome, SweepSummary, MAX_CONTRACTS_PER_NOTIFICATION};
pub use throttle::{gate, window_start, Gate, PROFILE_LOOKBACK_DAYS, SAVED_SEARCH_LOOKBACK_DAYS};

pub const CRATE_NAME: &str = "govlead-alerts";
