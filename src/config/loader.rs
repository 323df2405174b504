//! Configuration loading from disk and the environment.

use std::fs;
use std::path::Path;
use std::str::FromStr;

use thiserror::Error;

use crate::config::schema::{Environment, GatewayConfig};
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid environment variable {name}: {message}")]
    Env { name: &'static str, message: String },

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load configuration from an optional TOML file, apply environment
/// overrides, and validate the result.
pub fn load_config(path: Option<&Path>) -> Result<GatewayConfig, ConfigError> {
    let config = match path {
        Some(path) => {
            let content = fs::read_to_string(path)?;
            toml::from_str(&content)?
        }
        None => GatewayConfig::default(),
    };

    let config = apply_env_overrides(config, |name| std::env::var(name).ok())?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Overlay environment-style settings onto a config.
///
/// `lookup` resolves a variable name to its value, if set.
pub fn apply_env_overrides<F>(mut config: GatewayConfig, lookup: F) -> Result<GatewayConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(env) = lookup("GATEWAY_ENV") {
        config.environment = parse_var::<Environment>("GATEWAY_ENV", &env)?;
    }
    if let Some(port) = lookup("PORT") {
        let port = parse_var::<u16>("PORT", &port)?;
        let host = config
            .listener
            .bind_address
            .rsplit_once(':')
            .map(|(host, _)| host.to_string())
            .unwrap_or_else(|| "0.0.0.0".to_string());
        config.listener.bind_address = format!("{}:{}", host, port);
    }
    if let Some(secret) = lookup("JWT_SECRET") {
        config.auth.jwt_secret = secret;
    }
    if let Some(url) = lookup("BROKER_URL") {
        config.broker.url = Some(url);
    } else if config.environment.is_production() && config.broker.url.as_deref() == Some("memory://localhost") {
        // The development default must not silently carry over into production.
        config.broker.url = None;
    }
    if let Some(threshold) = lookup("CB_THRESHOLD") {
        config.circuit_breaker.failure_threshold = parse_var("CB_THRESHOLD", &threshold)?;
    }
    if let Some(secs) = lookup("CB_OPEN_SECS") {
        config.circuit_breaker.open_duration_secs = parse_var("CB_OPEN_SECS", &secs)?;
    }
    if let Some(secs) = lookup("HEALTH_INTERVAL_SECS") {
        config.health_check.interval_secs = parse_var("HEALTH_INTERVAL_SECS", &secs)?;
    }
    Ok(config)
}

fn parse_var<T>(name: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse::<T>().map_err(|e| ConfigError::Env {
        name,
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_env_overrides() {
        let config = apply_env_overrides(
            GatewayConfig::default(),
            lookup(&[("PORT", "4000"), ("CB_THRESHOLD", "5"), ("CB_OPEN_SECS", "15")]),
        )
        .unwrap();
        assert_eq!(config.listener.bind_address, "0.0.0.0:4000");
        assert_eq!(config.circuit_breaker.failure_threshold, 5);
        assert_eq!(config.circuit_breaker.open_duration_secs, 15);
    }

    #[test]
    fn test_bad_env_value_is_reported() {
        let err = apply_env_overrides(GatewayConfig::default(), lookup(&[("PORT", "eighty")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Env { name: "PORT", .. }));
    }

    #[test]
    fn test_production_drops_dev_broker_default() {
        let config = apply_env_overrides(
            GatewayConfig::default(),
            lookup(&[("GATEWAY_ENV", "production"), ("JWT_SECRET", "s3cret")]),
        )
        .unwrap();
        assert!(config.broker.url.is_none());

        let errors = validate_config(&config).unwrap_err();
        assert!(errors.iter().any(|e| e.field == "broker.url"));
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("gateway-{}.toml", uuid::Uuid::new_v4()));
        fs::write(
            &path,
            r#"
            [listener]
            bind_address = "127.0.0.1:3100"

            [[services]]
            name = "item-service"
            address = "http://127.0.0.1:3002"
            "#,
        )
        .unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.services.len(), 1);
        assert_eq!(config.services[0].name, "item-service");

        fs::remove_file(&path).unwrap_or_default();
    }
}
