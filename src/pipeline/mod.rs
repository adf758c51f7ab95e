//! Body observability pipeline.
//!
//! # Data Flow
//! ```text
//! inbound body chunks
//!     → deferred.rs (hold chunks, timer-gated batch release)
//!     → upstream
//!
//! upstream response chunks
//!     → observer.rs (sampling decision, mirror into buffer.rs)
//!     → client (unchanged, original order)
//!
//! access log
//!     → variable.rs (lazy render of the diagnostic probe value)
//! ```
//!
//! # Design Decisions
//! - All per-request state lives in an explicit `RequestContext`, looked up
//!   in a shared store at every re-entry (the body stages are invoked once
//!   per chunk, not once per request)
//! - Stages are synchronous; the async driving (frame polling, timer wait)
//!   is done by the HTTP host in `http::server`
//! - Timer cancellation on request teardown is mandatory: a fire after
//!   teardown must be a no-op

pub mod buffer;
pub mod context;
pub mod deferred;
pub mod observer;
pub mod sampling;
pub mod timer;
pub mod variable;

pub use buffer::GrowableBuffer;
pub use context::{ContextGuard, ContextStore, RequestContext};
pub use deferred::DeferredRelease;
pub use timer::TimerHandle;
pub use variable::{VarId, VarValue, VariableRegistry};

use crate::config::TapConfig;

/// Error raised by a pipeline stage. Fatal for the affected request only.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// A per-request buffer or chunk list could not grow.
    #[error("pipeline buffer allocation failed")]
    BufferAlloc,
}

impl From<std::collections::TryReserveError> for PipelineError {
    fn from(_: std::collections::TryReserveError) -> Self {
        PipelineError::BufferAlloc
    }
}

/// Effective tap settings for one request.
///
/// Derived from [`TapConfig`] with out-of-range values clamped, so request
/// handling never needs to re-validate. Swapped atomically on config reload;
/// each request snapshots one `Arc<TapSettings>` for its whole lifetime.
#[derive(Debug, Clone)]
pub struct TapSettings {
    pub enabled: bool,
    /// Share of requests eligible for observation, 0..=100.
    pub throttle_percent: u8,
    /// Minimum elapsed time before a drawn request is actually observed.
    pub time_threshold_ms: u64,
    /// Truncation bound for each side of the rendered probe value.
    pub max_output_bytes: usize,
    pub hold_enabled: bool,
    pub hold_delay_ms: u64,
}

impl From<&TapConfig> for TapSettings {
    fn from(cfg: &TapConfig) -> Self {
        Self {
            enabled: cfg.enabled,
            throttle_percent: cfg.throttle_percent.min(100) as u8,
            time_threshold_ms: cfg.time_threshold_ms,
            max_output_bytes: cfg.max_output_bytes,
            hold_enabled: cfg.hold_enabled,
            hold_delay_ms: cfg.hold_delay_ms,
        }
    }
}
