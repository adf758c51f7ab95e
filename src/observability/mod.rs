//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events, request-scoped fields)
//!     → metrics.rs (counters, histograms, Prometheus scrape endpoint)
//!
//! The diagnostic probe value itself is rendered lazily by
//! pipeline::variable and emitted in the completion log line.
//! ```

pub mod logging;
pub mod metrics;
