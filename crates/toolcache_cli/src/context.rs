//! Shared setup for every command: configuration, logging, and opening the cache.

use std::time::Duration;

use toolcache_cache::{
    FileStore, PolicyTable, PolicyTableBuilder, Sweeper, ToolCache, ToolCacheBuilder,
};
use toolcache_config::{
    load_optional_config, resolve_cache_dir, resolve_config_path, ConfigError, PolicySection,
    ToolCacheConfig, LOG_ENV,
};
use tracing_subscriber::EnvFilter;

use crate::GlobalArgs;

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// Loads the configuration named by `--config` or `TOOLCACHE_CONFIG`, or the
/// defaults when neither is set.
pub fn load_config(global: &GlobalArgs) -> Result<ToolCacheConfig, ConfigError> {
    let path = resolve_config_path(global.config.as_deref(), env_var);
    load_optional_config(path.as_deref())
}

/// Chooses the log filter: `-v`/`-q`, then `TOOLCACHE_LOG`, then the
/// configured level.
pub fn log_directive(
    global: &GlobalArgs,
    config: Option<&ToolCacheConfig>,
    env: Option<String>,
) -> String {
    if global.verbose {
        return "debug".to_string();
    }
    if global.quiet {
        return "error".to_string();
    }
    if let Some(directive) = env.filter(|d| !d.trim().is_empty()) {
        return directive;
    }
    config
        .map(|c| c.log.level)
        .unwrap_or_default()
        .as_str()
        .to_string()
}

/// Installs the stderr log subscriber. Stdout carries the hook protocol.
pub fn init_logging(global: &GlobalArgs, config: Option<&ToolCacheConfig>) {
    let directive = log_directive(global, config, env_var(LOG_ENV));
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new("warn"));
    // Fails only if a subscriber is already installed.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Applies the `[policy]` section to the built-in table.
pub fn policy_from_config(section: &PolicySection) -> PolicyTable {
    let mut builder = PolicyTableBuilder::standard();
    for tool in &section.disabled {
        builder = builder.disable(tool.trim());
    }
    for (tool, secs) in &section.ttl_seconds {
        builder = builder.ttl(tool, Duration::from_secs(*secs));
    }
    builder.build()
}

/// Opens the cache in the resolved directory with the configured settings.
pub fn open_cache(global: &GlobalArgs, config: &ToolCacheConfig) -> ToolCache<FileStore> {
    let dir = resolve_cache_dir(global.cache_dir.as_deref(), config, env_var);
    ToolCacheBuilder::new()
        .policy(policy_from_config(&config.policy))
        .sweeper(Sweeper::new(
            config.sweep.probability,
            config.sweep.batch_size,
            config.sweep.seed,
        ))
        .max_payload_bytes(config.cache.max_payload_bytes)
        .enabled(config.cache.enabled)
        .build(FileStore::new(dir))
}
