//! Result cache for agent tool calls.
//!
//! Sits between an agent and the tools it invokes. Idempotent read-like calls
//! (file reads, listings, searches, fetches) are answered from a file-backed
//! store when an equivalent call recurs, and any entry that a mutating call
//! could have made stale is removed before that call's post-hook returns.
//! Every failure inside the cache degrades to "execute the tool again";
//! nothing here ever fails the call it is optimizing.

#![warn(missing_docs)]

pub mod engine;
pub mod entry;
pub mod error;
pub mod invalidation;
pub mod key;
pub mod policy;
pub mod stats;
pub mod store;
pub mod sweeper;

pub use engine::{CallOutcome, CommitReport, Decision, ExecuteReason, ToolCache, ToolCacheBuilder};
pub use entry::{CacheEntry, EntryMeta, ENTRY_FORMAT_VERSION};
pub use error::{CacheError, KeyError};
pub use invalidation::{InvalidationEngine, InvalidationEvent};
pub use key::KeyDeriver;
pub use policy::{PathExtractor, PolicyRule, PolicyTable, PolicyTableBuilder, Scope};
pub use stats::{CacheStats, ToolStats};
pub use store::{FileStore, MemoryStore, Store};
pub use sweeper::Sweeper;
