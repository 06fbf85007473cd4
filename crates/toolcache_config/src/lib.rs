//! Parsing and validation of `toolcache.toml` configuration files.
//!
//! This crate reads the optional configuration file into a strongly-typed
//! [`ToolCacheConfig`] and resolves where the cache lives and which file to
//! load from command-line flags and environment variables.

#![warn(missing_docs)]

pub mod error;
pub mod loader;
pub mod resolve;
pub mod types;

pub use error::ConfigError;
pub use loader::{load_config, load_config_from_str, load_optional_config};
pub use resolve::{resolve_cache_dir, resolve_config_path, CACHE_DIR_ENV, CONFIG_ENV, LOG_ENV};
pub use types::*;
