//! The decision engine: serve from cache, or execute and record.
//!
//! [`ToolCache`] answers the host's two questions. Before a call it decides
//! whether a stored result can stand in for execution; after a call it
//! records the result and removes whatever the call may have made stale.
//! It keeps no per-call state, so the two halves may run in different
//! processes and any number of calls may be in flight at once.

use serde_json::Value;
use toolcache_common::{CacheKey, Clock, SystemClock, Timestamp};
use tracing::{debug, trace, warn};

use crate::entry::CacheEntry;
use crate::invalidation::{InvalidationEngine, InvalidationEvent};
use crate::key::KeyDeriver;
use crate::policy::PolicyTable;
use crate::stats::CacheStats;
use crate::store::Store;
use crate::sweeper::Sweeper;

pub use toolcache_common::defaults::DEFAULT_MAX_PAYLOAD_BYTES;

/// Outcome of [`ToolCache::before_call`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// A live cached result exists; the host should not execute the tool.
    Served {
        /// The cached result.
        payload: String,
        /// Key the result was found under.
        key: CacheKey,
        /// When the result was stored.
        created_at: Timestamp,
        /// When it stops being served.
        expires_at: Timestamp,
    },
    /// The host should execute the tool.
    Execute(ExecuteReason),
}

impl Decision {
    /// Returns `true` for [`Decision::Served`].
    pub fn is_hit(&self) -> bool {
        matches!(self, Decision::Served { .. })
    }

    /// Returns the cached payload on a hit.
    pub fn payload(&self) -> Option<&str> {
        match self {
            Decision::Served { payload, .. } => Some(payload),
            Decision::Execute(_) => None,
        }
    }
}

/// Why a call has to execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecuteReason {
    /// Caching is switched off.
    Disabled,
    /// The tool's policy forbids caching.
    Uncacheable,
    /// The input could not be turned into a key.
    Underivable,
    /// No live entry for this call.
    Miss,
}

/// How a real execution ended, as reported to [`ToolCache::after_call`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome<'a> {
    /// The tool succeeded and produced this result.
    Success(&'a str),
    /// The tool failed. Nothing is stored or invalidated.
    Failure,
}

/// What [`ToolCache::after_call`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitReport {
    /// The result was written to the store.
    pub stored: bool,
    /// Entries removed because the call was a mutation.
    pub invalidated: usize,
    /// Expired entries removed by the opportunistic sweep.
    pub swept: usize,
}

/// Result cache for tool calls over a [`Store`].
pub struct ToolCache<S> {
    policy: PolicyTable,
    store: S,
    deriver: KeyDeriver,
    sweeper: Sweeper,
    clock: Box<dyn Clock>,
    max_payload_bytes: u64,
    enabled: bool,
}

impl<S: Store> ToolCache<S> {
    /// Creates a cache over `store` with the built-in policy and defaults.
    pub fn new(store: S) -> Self {
        ToolCacheBuilder::new().build(store)
    }

    /// Decides whether a call can be served from the cache.
    pub fn before_call(&self, tool: &str, input: &Value) -> Decision {
        if !self.enabled {
            return Decision::Execute(ExecuteReason::Disabled);
        }
        if !self.policy.lookup(tool).cacheable {
            trace!(tool, "not cacheable");
            return Decision::Execute(ExecuteReason::Uncacheable);
        }
        let Some(key) = self.derive(tool, input) else {
            return Decision::Execute(ExecuteReason::Underivable);
        };

        let now = self.clock.now();
        match self.store.get(&key, now) {
            Some(entry) => {
                let age = now.saturating_duration_since(entry.created_at);
                debug!(tool, %key, bytes = entry.size_bytes, ?age, "cache hit");
                Decision::Served {
                    payload: entry.payload,
                    key,
                    created_at: entry.created_at,
                    expires_at: entry.expires_at,
                }
            }
            None => {
                debug!(tool, %key, "cache miss");
                Decision::Execute(ExecuteReason::Miss)
            }
        }
    }

    /// Records the outcome of a real execution.
    ///
    /// On success, entries the call may have made stale are removed first,
    /// then the result is stored if the tool is cacheable. All invalidation
    /// is complete when this returns. A failed call changes nothing except
    /// for the opportunistic sweep.
    pub fn after_call(&self, tool: &str, input: &Value, outcome: CallOutcome<'_>) -> CommitReport {
        let mut report = CommitReport::default();
        if !self.enabled {
            return report;
        }

        match outcome {
            CallOutcome::Success(payload) => {
                if self.policy.is_mutator(tool) {
                    let event = InvalidationEvent::from_call(&self.policy, tool, input);
                    report.invalidated =
                        InvalidationEngine::new(&self.policy, &self.store).invalidate(&event);
                }
                if self.policy.lookup(tool).cacheable {
                    report.stored = self.record(tool, input, payload);
                }
            }
            CallOutcome::Failure => debug!(tool, "call failed; nothing recorded"),
        }

        report.swept = self.sweeper.maybe_sweep(&self.store, self.clock.now());
        report
    }

    /// Aggregates the current store contents.
    pub fn stats(&self) -> CacheStats {
        CacheStats::collect(&self.store, self.clock.now())
    }

    /// Removes every entry. Returns the number removed.
    pub fn clear(&self) -> usize {
        match self.store.clear() {
            Ok(removed) => {
                debug!(removed, "cache cleared");
                removed
            }
            Err(e) => {
                warn!(error = %e, "cache clear failed");
                0
            }
        }
    }

    /// Removes every expired entry. Returns the number removed.
    pub fn evict_expired(&self) -> usize {
        self.sweeper.sweep_all(&self.store, self.clock.now())
    }

    /// Runs one bounded sweep regardless of the trigger probability.
    pub fn sweep_now(&self) -> usize {
        self.sweeper.sweep(&self.store, self.clock.now())
    }

    /// The policy table in force.
    pub fn policy(&self) -> &PolicyTable {
        &self.policy
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    fn derive(&self, tool: &str, input: &Value) -> Option<CacheKey> {
        match self.deriver.derive(tool, input) {
            Ok(key) => Some(key),
            Err(e) => {
                debug!(tool, error = %e, "input not canonicalizable; not caching");
                None
            }
        }
    }

    fn record(&self, tool: &str, input: &Value, payload: &str) -> bool {
        if payload.is_empty() {
            debug!(tool, "empty result not cached");
            return false;
        }
        let size = payload.len() as u64;
        if size > self.max_payload_bytes {
            debug!(tool, size, limit = self.max_payload_bytes, "result too large to cache");
            return false;
        }
        let Some(key) = self.derive(tool, input) else {
            return false;
        };

        let entry = CacheEntry::new(
            key,
            tool,
            self.policy.extract_path(tool, input),
            payload,
            self.clock.now(),
            self.policy.lookup(tool).ttl,
        );
        match self.store.put(&entry) {
            Ok(()) => {
                debug!(tool, %key, size, "stored result");
                true
            }
            Err(e) => {
                warn!(tool, error = %e, "cannot store result");
                false
            }
        }
    }
}

/// Configures a [`ToolCache`].
pub struct ToolCacheBuilder {
    policy: PolicyTable,
    deriver: KeyDeriver,
    sweeper: Sweeper,
    clock: Box<dyn Clock>,
    max_payload_bytes: u64,
    enabled: bool,
}

impl Default for ToolCacheBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolCacheBuilder {
    /// Built-in policy, default key derivation and sweep settings, wall clock.
    pub fn new() -> Self {
        Self {
            policy: PolicyTable::standard(),
            deriver: KeyDeriver::default(),
            sweeper: Sweeper::default(),
            clock: Box::new(SystemClock),
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            enabled: true,
        }
    }

    /// Sets the policy table.
    pub fn policy(mut self, policy: PolicyTable) -> Self {
        self.policy = policy;
        self
    }

    /// Sets the key deriver.
    pub fn key_deriver(mut self, deriver: KeyDeriver) -> Self {
        self.deriver = deriver;
        self
    }

    /// Sets the expiry sweeper.
    pub fn sweeper(mut self, sweeper: Sweeper) -> Self {
        self.sweeper = sweeper;
        self
    }

    /// Sets the time source.
    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Sets the largest result, in bytes, that will be stored.
    pub fn max_payload_bytes(mut self, limit: u64) -> Self {
        self.max_payload_bytes = limit;
        self
    }

    /// Turns the cache on or off. A disabled cache executes every call and
    /// touches nothing.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Builds the cache over `store`.
    pub fn build<S: Store>(self, store: S) -> ToolCache<S> {
        ToolCache {
            policy: self.policy,
            store,
            deriver: self.deriver,
            sweeper: self.sweeper,
            clock: self.clock,
            max_payload_bytes: self.max_payload_bytes,
            enabled: self.enabled,
        }
    }
}
