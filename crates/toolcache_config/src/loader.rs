//! Configuration file loading and validation.

use crate::error::ConfigError;
use crate::types::ToolCacheConfig;
use std::path::Path;

/// Loads and validates a `toolcache.toml` configuration from `path`.
pub fn load_config(path: &Path) -> Result<ToolCacheConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    load_config_from_str(&content)
}

/// Loads the configuration at `path`, or returns the defaults when no path is given.
///
/// A path that is given but unreadable is an error; silently ignoring an
/// explicitly requested file would hide typos.
pub fn load_optional_config(path: Option<&Path>) -> Result<ToolCacheConfig, ConfigError> {
    match path {
        Some(path) => load_config(path),
        None => Ok(ToolCacheConfig::default()),
    }
}

/// Parses and validates a `toolcache.toml` configuration from a string.
///
/// Useful for testing without filesystem dependencies.
pub fn load_config_from_str(content: &str) -> Result<ToolCacheConfig, ConfigError> {
    let config: ToolCacheConfig =
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    validate_config(&config)?;
    Ok(config)
}

/// Validates value ranges that the type system cannot express.
fn validate_config(config: &ToolCacheConfig) -> Result<(), ConfigError> {
    let p = config.sweep.probability;
    if !(0.0..=1.0).contains(&p) {
        return Err(ConfigError::ValidationError(format!(
            "sweep.probability must be within 0.0..=1.0, got {p}"
        )));
    }
    if config.sweep.batch_size == 0 {
        return Err(ConfigError::ValidationError(
            "sweep.batch_size must be greater than 0".to_string(),
        ));
    }
    if let Some((tool, _)) = config.policy.ttl_seconds.iter().find(|(_, secs)| **secs == 0) {
        return Err(ConfigError::ValidationError(format!(
            "policy.ttl_seconds.{tool} must be greater than 0; use policy.disabled to stop caching a tool"
        )));
    }
    if config.policy.disabled.iter().any(|t| t.trim().is_empty()) {
        return Err(ConfigError::ValidationError(
            "policy.disabled contains an empty tool name".to_string(),
        ));
    }
    Ok(())
}
