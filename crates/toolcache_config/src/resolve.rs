//! Resolution of the cache directory and configuration file location.
//!
//! Both lookups take the environment as a closure so they can be tested
//! without mutating process-wide state.

use crate::types::ToolCacheConfig;
use std::path::{Path, PathBuf};

/// Environment variable overriding the cache directory.
pub const CACHE_DIR_ENV: &str = "TOOLCACHE_DIR";

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "TOOLCACHE_CONFIG";

/// Environment variable holding a `tracing` filter directive.
pub const LOG_ENV: &str = "TOOLCACHE_LOG";

/// Directory name created under the temp directory by default.
const DEFAULT_DIR_NAME: &str = "tool-cache";

/// Resolves where entries are stored.
///
/// Precedence: explicit override, then `TOOLCACHE_DIR`, then `[cache] dir`,
/// then `$TMPDIR/tool-cache`, then the platform temp directory.
pub fn resolve_cache_dir(
    cli_override: Option<&Path>,
    config: &ToolCacheConfig,
    env: impl Fn(&str) -> Option<String>,
) -> PathBuf {
    if let Some(dir) = cli_override {
        return dir.to_path_buf();
    }
    if let Some(dir) = non_empty(env(CACHE_DIR_ENV)) {
        return PathBuf::from(dir);
    }
    if let Some(dir) = &config.cache.dir {
        return dir.clone();
    }
    let tmp = non_empty(env("TMPDIR"))
        .map(PathBuf::from)
        .unwrap_or_else(std::env::temp_dir);
    tmp.join(DEFAULT_DIR_NAME)
}

/// Resolves which configuration file to load, if any.
///
/// Precedence: explicit `--config`, then `TOOLCACHE_CONFIG`. No file is
/// loaded when neither is set.
pub fn resolve_config_path(
    cli_override: Option<&Path>,
    env: impl Fn(&str) -> Option<String>,
) -> Option<PathBuf> {
    cli_override
        .map(Path::to_path_buf)
        .or_else(|| non_empty(env(CONFIG_ENV)).map(PathBuf::from))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
