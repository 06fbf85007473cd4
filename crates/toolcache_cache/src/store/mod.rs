//! Key-to-entry storage backends.
//!
//! [`FileStore`] keeps one JSON file per entry in a directory that several
//! processes may share; [`MemoryStore`] keeps entries in a map and exists so
//! the decision and invalidation logic can be tested without a filesystem.

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use toolcache_common::{CacheKey, Timestamp};

use crate::entry::{CacheEntry, EntryMeta};
use crate::error::CacheError;

/// Durable mapping from cache keys to entries.
///
/// Reads are fail-safe: an absent, expired, or unreadable entry is a miss.
/// Mutations report failures as [`CacheError`] so callers can log them, but
/// no caller is expected to act on them beyond that.
pub trait Store: Send + Sync {
    /// Returns the live entry for `key`.
    ///
    /// Expired entries are misses even when still physically present.
    fn get(&self, key: &CacheKey, now: Timestamp) -> Option<CacheEntry>;

    /// Writes `entry`, replacing any entry with the same key.
    ///
    /// Concurrent readers observe either the old entry or the new one,
    /// never a partial write.
    fn put(&self, entry: &CacheEntry) -> Result<(), CacheError>;

    /// Removes the entry for `key`. Returns whether anything was removed.
    fn remove(&self, key: &CacheKey) -> Result<bool, CacheError>;

    /// Removes every entry whose metadata matches `predicate` and returns the
    /// number removed.
    ///
    /// Entries that exist but cannot be inspected are removed as well. An
    /// error means the scan could not see every entry; whatever it did
    /// remove stays removed.
    fn delete_where(&self, predicate: &dyn Fn(&EntryMeta) -> bool) -> Result<usize, CacheError>;

    /// Iterates over the metadata of every readable entry, expired or not.
    ///
    /// Entries that disappear during the scan are skipped. Enumeration never
    /// modifies the store.
    fn enumerate(&self) -> Box<dyn Iterator<Item = EntryMeta> + '_>;

    /// Iterates over the keys present in the store without reading entries.
    fn keys(&self) -> Box<dyn Iterator<Item = CacheKey> + '_>;

    /// Returns the metadata for `key`, whether or not it has expired.
    fn meta(&self, key: &CacheKey) -> Option<EntryMeta>;

    /// Removes every entry and returns the number removed.
    fn clear(&self) -> Result<usize, CacheError> {
        self.delete_where(&|_| true)
    }

    /// Human-readable description of the backing location.
    fn describe(&self) -> String;
}
