//! Default tuning values shared by the cache and its configuration file.

/// Default upper bound on stored result size, in bytes.
pub const DEFAULT_MAX_PAYLOAD_BYTES: u64 = 100_000;

/// Default chance that a completed call triggers an expiry sweep.
pub const DEFAULT_SWEEP_PROBABILITY: f64 = 0.05;

/// Default number of keys examined per sweep.
pub const DEFAULT_SWEEP_BATCH_SIZE: usize = 32;
