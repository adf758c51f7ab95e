//! Configuration validation and normalization.
//!
//! Serde handles the syntactic side; this module does the semantic checks
//! and collects every problem instead of stopping at the first. Clampable
//! values (the tap throttle) are normalized here, at merge time, so request
//! handling never deals with out-of-range settings.

use std::net::SocketAddr;

use crate::config::schema::GatewayConfig;

/// A single semantic configuration problem.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("listener.bind_address {0:?} is not a valid socket address")]
    BadBindAddress(String),

    #[error("upstream.address {0:?} is not a valid socket address")]
    BadUpstreamAddress(String),

    #[error("observability.metrics_address {0:?} is not a valid socket address")]
    BadMetricsAddress(String),

    #[error("synthetic.status {0} is not a valid HTTP status code")]
    BadSyntheticStatus(u16),

    #[error("reject.header must not be empty when reject is enabled")]
    EmptyRejectHeader,
}

/// Clamp out-of-range values in place. Returns whether anything changed.
pub fn normalize(config: &mut GatewayConfig) -> bool {
    if config.tap.throttle_percent > 100 {
        tracing::warn!(
            throttle_percent = config.tap.throttle_percent,
            "tap.throttle_percent above 100, clamping"
        );
        config.tap.throttle_percent = 100;
        return true;
    }
    false
}

/// Semantic validation. Returns all errors found.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BadBindAddress(
            config.listener.bind_address.clone(),
        ));
    }
    if config.upstream.address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BadUpstreamAddress(
            config.upstream.address.clone(),
        ));
    }
    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::BadMetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }
    if config.synthetic.enabled && !(100..=599).contains(&config.synthetic.status) {
        errors.push(ValidationError::BadSyntheticStatus(config.synthetic.status));
    }
    if config.reject.enabled && config.reject.header.is_empty() {
        errors.push(ValidationError::EmptyRejectHeader);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let mut config = GatewayConfig::default();
        config.listener.bind_address = "127.0.0.1:8080".into();
        assert!(!normalize(&mut config));
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_throttle_is_clamped_not_rejected() {
        let mut config = GatewayConfig::default();
        config.tap.throttle_percent = 7000;
        assert!(normalize(&mut config));
        assert_eq!(config.tap.throttle_percent, 100);
    }

    #[test]
    fn test_all_errors_are_collected() {
        let mut config = GatewayConfig::default();
        config.listener.bind_address = "nonsense".into();
        config.upstream.address = "also nonsense".into();
        config.synthetic.enabled = true;
        config.synthetic.status = 42;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn test_reject_header_required_only_when_enabled() {
        let mut config = GatewayConfig::default();
        config.listener.bind_address = "127.0.0.1:0".into();
        config.reject.header = String::new();
        assert!(validate_config(&config).is_ok());

        config.reject.enabled = true;
        assert!(validate_config(&config).is_err());
    }
}
