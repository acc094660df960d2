//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber
//! - Build the per-request span carrying a request id
//!
//! # Design Decisions
//! - `RUST_LOG` wins over the configured level when set
//! - Initialization is idempotent so tests and embedders can call it freely

use tracing::Span;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

/// Install the global subscriber. Returns `false` if one was already set.
pub fn init_logging(level: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("cold_serve={level}")));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .is_ok()
}

/// Span wrapping one dispatch; `request_id` is a fresh v4 uuid.
pub fn request_span(method: &str, path: &str) -> Span {
    tracing::info_span!(
        "request",
        request_id = %Uuid::new_v4(),
        method = %method,
        path = %path,
    )
}
