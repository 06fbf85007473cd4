//! Opportunistic removal of expired entries.
//!
//! There is no background thread. Each completed call rolls the dice once,
//! and on a hit a bounded sample of keys is checked and the expired ones
//! removed. Seeding the generator makes both the roll and the sample
//! reproducible.

use std::sync::{Mutex, PoisonError};

use rand::rngs::StdRng;
use rand::seq::IteratorRandom;
use rand::{Rng, SeedableRng};
use toolcache_common::{CacheKey, Timestamp};
use tracing::{debug, warn};

use crate::store::Store;

pub use toolcache_common::defaults::{DEFAULT_SWEEP_BATCH_SIZE, DEFAULT_SWEEP_PROBABILITY};

/// Bounded-cost expiry sweeper.
#[derive(Debug)]
pub struct Sweeper {
    probability: f64,
    batch_size: usize,
    rng: Mutex<StdRng>,
}

impl Default for Sweeper {
    fn default() -> Self {
        Self::new(DEFAULT_SWEEP_PROBABILITY, DEFAULT_SWEEP_BATCH_SIZE, None)
    }
}

impl Sweeper {
    /// Creates a sweeper. `probability` is clamped to `0.0..=1.0` (NaN counts
    /// as zero) and `batch_size` to at least one. Without a seed the
    /// generator is seeded from OS entropy.
    pub fn new(probability: f64, batch_size: usize, seed: Option<u64>) -> Self {
        let probability = if probability.is_nan() {
            0.0
        } else {
            probability.clamp(0.0, 1.0)
        };
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            probability,
            batch_size: batch_size.max(1),
            rng: Mutex::new(rng),
        }
    }

    /// A sweeper that never triggers on its own.
    pub fn never() -> Self {
        Self::new(0.0, DEFAULT_SWEEP_BATCH_SIZE, Some(0))
    }

    /// Trigger probability per call.
    pub fn probability(&self) -> f64 {
        self.probability
    }

    /// Number of keys examined per sweep.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Rolls whether this call should sweep.
    pub fn should_sweep(&self) -> bool {
        if self.probability <= 0.0 {
            return false;
        }
        if self.probability >= 1.0 {
            return true;
        }
        self.rng
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .gen_bool(self.probability)
    }

    /// Sweeps if the roll says so. Returns the number of entries removed.
    pub fn maybe_sweep(&self, store: &dyn Store, now: Timestamp) -> usize {
        if self.should_sweep() {
            self.sweep(store, now)
        } else {
            0
        }
    }

    /// Examines a random sample of up to `batch_size` keys and removes the
    /// expired ones. Returns the number removed.
    pub fn sweep(&self, store: &dyn Store, now: Timestamp) -> usize {
        let sample: Vec<CacheKey> = {
            let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
            store.keys().choose_multiple(&mut *rng, self.batch_size)
        };
        let removed = sample
            .iter()
            .filter(|key| evict_if_expired(store, key, now))
            .count();
        debug!(sampled = sample.len(), removed, "expiry sweep");
        removed
    }

    /// Removes every expired entry. Returns the number removed.
    pub fn sweep_all(&self, store: &dyn Store, now: Timestamp) -> usize {
        match store.delete_where(&|meta| meta.is_expired(now)) {
            Ok(removed) => {
                debug!(removed, "full expiry sweep");
                removed
            }
            Err(e) => {
                warn!(error = %e, "full expiry sweep failed");
                0
            }
        }
    }
}

fn evict_if_expired(store: &dyn Store, key: &CacheKey, now: Timestamp) -> bool {
    match store.meta(key) {
        Some(meta) if meta.is_expired(now) => store.remove(key).unwrap_or_else(|e| {
            warn!(%key, error = %e, "cannot remove expired entry");
            false
        }),
        _ => false,
    }
}
