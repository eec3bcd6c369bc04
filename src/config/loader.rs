//! Configuration loading from disk and environment.

use std::fs;
use std::path::Path;

use crate::config::schema::{ProxyConfig, StoreKind};
use crate::config::validation::{validate_config, ValidationError};

/// Listener port only; binds on all interfaces.
pub const ENV_APP_PORT: &str = "APP_PORT";
/// Full listener address; wins over `APP_PORT`.
pub const ENV_BIND_ADDRESS: &str = "PROXY_BIND_ADDRESS";
pub const ENV_STORE_KIND: &str = "PROXY_STORE_KIND";
pub const ENV_STORE_PATH: &str = "PROXY_STORE_PATH";

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid environment variable {name}: {reason}")]
    Env { name: &'static str, reason: String },

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

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ProxyConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config: ProxyConfig = toml::from_str(&content)?;

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Resolve the runtime configuration.
///
/// Starts from the TOML file when one is given (defaults otherwise), applies
/// environment overrides, then validates the result.
pub fn resolve_config(path: Option<&Path>) -> Result<ProxyConfig, ConfigError> {
    let mut config = match path {
        Some(path) => toml::from_str(&fs::read_to_string(path)?)?,
        None => ProxyConfig::default(),
    };

    apply_env_overrides(&mut config, |name| std::env::var(name).ok())?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Apply overrides read through `lookup`.
pub fn apply_env_overrides<F>(config: &mut ProxyConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(port) = lookup(ENV_APP_PORT) {
        let port: u16 = port.trim().parse().map_err(|_| ConfigError::Env {
            name: ENV_APP_PORT,
            reason: format!("'{}' is not a port number", port),
        })?;
        config.listener.bind_address = format!("0.0.0.0:{}", port);
    }

    if let Some(address) = lookup(ENV_BIND_ADDRESS) {
        config.listener.bind_address = address;
    }

    if let Some(kind) = lookup(ENV_STORE_KIND) {
        config.store.kind = kind.parse::<StoreKind>().map_err(|reason| ConfigError::Env {
            name: ENV_STORE_KIND,
            reason,
        })?;
    }

    if let Some(path) = lookup(ENV_STORE_PATH) {
        config.store.path = path;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn app_port_sets_listener() {
        let mut config = ProxyConfig::default();
        apply_env_overrides(&mut config, env(&[("APP_PORT", "3000")])).unwrap();
        assert_eq!(config.listener.bind_address, "0.0.0.0:3000");
    }

    #[test]
    fn bind_address_wins_over_app_port() {
        let mut config = ProxyConfig::default();
        apply_env_overrides(
            &mut config,
            env(&[("APP_PORT", "3000"), ("PROXY_BIND_ADDRESS", "127.0.0.1:4000")]),
        )
        .unwrap();
        assert_eq!(config.listener.bind_address, "127.0.0.1:4000");
    }

    #[test]
    fn store_overrides() {
        let mut config = ProxyConfig::default();
        apply_env_overrides(
            &mut config,
            env(&[("PROXY_STORE_KIND", "sqlite"), ("PROXY_STORE_PATH", "/tmp/u.db")]),
        )
        .unwrap();
        assert_eq!(config.store.kind, StoreKind::Sqlite);
        assert_eq!(config.store.path, "/tmp/u.db");
    }

    #[test]
    fn bad_app_port_is_rejected() {
        let mut config = ProxyConfig::default();
        let err = apply_env_overrides(&mut config, env(&[("APP_PORT", "http")])).unwrap_err();
        assert!(matches!(err, ConfigError::Env { name: "APP_PORT", .. }));
    }

    #[test]
    fn load_config_validates() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[timeouts]\nupstream_secs = 0").unwrap();

        let err = load_config(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(ref e) if e.len() == 1));
        assert!(err.to_string().contains("timeouts.upstream_secs"));
    }
}
