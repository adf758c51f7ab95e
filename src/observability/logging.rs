//! Structured logging initialization.
//!
//! Uses `tracing` with an env-filter: `RUST_LOG` wins when set, otherwise
//! the configured level is applied to this crate and tower-http.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the global tracing subscriber. Call once, before anything
/// logs; later calls are ignored (relevant for tests sharing a process).
pub fn init(log_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!(
            "quantum_gateway={log_level},tower_http=info"
        ))
    });

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
