//! Configuration types deserialized from `toolcache.toml`.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

pub use toolcache_common::defaults::{
    DEFAULT_MAX_PAYLOAD_BYTES, DEFAULT_SWEEP_BATCH_SIZE, DEFAULT_SWEEP_PROBABILITY,
};

/// The top-level configuration parsed from `toolcache.toml`.
///
/// Every section is optional; an empty file yields the defaults.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct ToolCacheConfig {
    /// Backing store settings.
    #[serde(default)]
    pub cache: CacheSection,
    /// Opportunistic expiry sweep settings.
    #[serde(default)]
    pub sweep: SweepSection,
    /// Adjustments applied to the built-in policy table at startup.
    #[serde(default)]
    pub policy: PolicySection,
    /// Logging settings.
    #[serde(default)]
    pub log: LogSection,
}

/// Backing store settings.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct CacheSection {
    /// Directory holding one file per entry. Resolved against the environment
    /// when absent; see [`resolve_cache_dir`](crate::resolve_cache_dir).
    #[serde(default)]
    pub dir: Option<PathBuf>,
    /// Results larger than this many bytes are never stored.
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: u64,
    /// When `false` every call executes and nothing is stored.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            dir: None,
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            enabled: true,
        }
    }
}

/// Opportunistic expiry sweep settings.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SweepSection {
    /// Probability, in `0.0..=1.0`, that a completed call triggers a sweep.
    #[serde(default = "default_sweep_probability")]
    pub probability: f64,
    /// Number of entries sampled per sweep.
    #[serde(default = "default_sweep_batch_size")]
    pub batch_size: usize,
    /// Fixed RNG seed. Sweeps are seeded from entropy when absent.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for SweepSection {
    fn default() -> Self {
        Self {
            probability: DEFAULT_SWEEP_PROBABILITY,
            batch_size: DEFAULT_SWEEP_BATCH_SIZE,
            seed: None,
        }
    }
}

/// Startup-time adjustments to the built-in policy table.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct PolicySection {
    /// Tool names forced to be non-cacheable.
    #[serde(default)]
    pub disabled: Vec<String>,
    /// Per-tool TTL overrides in seconds, keyed by tool name.
    #[serde(default)]
    pub ttl_seconds: BTreeMap<String, u64>,
}

/// Logging settings.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct LogSection {
    /// Default log level when neither a flag nor `TOOLCACHE_LOG` overrides it.
    #[serde(default)]
    pub level: LogLevel,
}

/// Log verbosity.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Only errors.
    Error,
    /// Errors and warnings (default).
    #[default]
    Warn,
    /// Informational messages.
    Info,
    /// Per-call decisions.
    Debug,
    /// Everything.
    Trace,
}

impl LogLevel {
    /// Returns the directive string understood by `tracing` filters.
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

fn default_max_payload_bytes() -> u64 {
    DEFAULT_MAX_PAYLOAD_BYTES
}

fn default_sweep_probability() -> f64 {
    DEFAULT_SWEEP_PROBABILITY
}

fn default_sweep_batch_size() -> usize {
    DEFAULT_SWEEP_BATCH_SIZE
}

fn default_true() -> bool {
    true
}
