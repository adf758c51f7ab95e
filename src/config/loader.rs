//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use crate::config::schema::GatewayConfig;
use crate::config::validation::{normalize, validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("validation failed: {}", format_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn format_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load, normalize, and validate a TOML configuration file.
pub fn load_config(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let mut config: GatewayConfig = toml::from_str(&content)?;

    normalize(&mut config);
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_toml_round_trip() {
        let dir = std::env::temp_dir();
        let path = dir.join("quantum-gateway-loader-test.toml");
        fs::write(
            &path,
            r#"
[upstream]
address = "127.0.0.1:9999"

[tap]
enabled = true
throttle_percent = 150
hold_delay_ms = 250
"#,
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.upstream.address, "127.0.0.1:9999");
        assert!(config.tap.enabled);
        // Out-of-range throttle is clamped at load time.
        assert_eq!(config.tap.throttle_percent, 100);
        assert_eq!(config.tap.hold_delay_ms, 250);
        // Untouched sections keep their defaults.
        assert_eq!(config.timeouts.request_secs, 30);

        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_invalid_upstream_is_reported() {
        let dir = std::env::temp_dir();
        let path = dir.join("quantum-gateway-loader-bad.toml");
        fs::write(&path, "[upstream]\naddress = \"not an address\"\n").unwrap();

        match load_config(&path) {
            Err(ConfigError::Validation(errors)) => assert_eq!(errors.len(), 1),
            other => panic!("expected validation failure, got {other:?}"),
        }

        fs::remove_file(&path).ok();
    }
}
