//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from TOML, with
//! defaults on every section so a minimal file (or none at all) works.

use serde::{Deserialize, Serialize};

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address, connection cap).
    pub listener: ListenerConfig,

    /// Upstream the proxied traffic is forwarded to.
    pub upstream: UpstreamConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Body observability tap (sampling, mirroring, deferred hold, probe).
    pub tap: TapConfig,

    /// Header-equality reject rule.
    pub reject: RejectConfig,

    /// Locally answered synthetic JSON route.
    pub synthetic: SyntheticConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_connections: 10_000,
        }
    }
}

/// Upstream configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Upstream address (e.g., "127.0.0.1:3000").
    pub address: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:3000".to_string(),
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Body observability tap configuration.
///
/// `throttle_percent` outside 0..=100 is clamped when the config is loaded;
/// request handling never sees an out-of-range value.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TapConfig {
    /// Master switch for response body observation and the probe variable.
    pub enabled: bool,

    /// Share of requests eligible for observation, 0..=100.
    pub throttle_percent: u32,

    /// Only observe requests whose first response chunk arrives at least
    /// this many milliseconds after the request started.
    pub time_threshold_ms: u64,

    /// Truncation bound applied to each side of the probe value.
    pub max_output_bytes: usize,

    /// Withhold inbound body chunks until the hold timer fires.
    pub hold_enabled: bool,

    /// Hold delay in milliseconds.
    pub hold_delay_ms: u64,
}

impl Default for TapConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            throttle_percent: 10,
            time_threshold_ms: 0,
            max_output_bytes: 512,
            hold_enabled: false,
            hold_delay_ms: 1000,
        }
    }
}

/// Header-equality reject rule.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RejectConfig {
    /// Enable the reject check.
    pub enabled: bool,

    /// Header name to inspect.
    pub header: String,

    /// Exact value that triggers rejection.
    pub value: String,
}

impl Default for RejectConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            header: "x-quantum-reject".to_string(),
            value: "1".to_string(),
        }
    }
}

/// Synthetic JSON response route.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SyntheticConfig {
    /// Enable the synthetic route.
    pub enabled: bool,

    /// Exact path answered locally.
    pub path: String,

    /// Status code of the synthetic response.
    pub status: u16,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: "/quantum/status".to_string(),
            status: 200,
        }
    }
}
