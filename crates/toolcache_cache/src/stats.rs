//! Operator-facing aggregation over store contents.

use std::collections::BTreeMap;

use serde::Serialize;
use toolcache_common::Timestamp;

use crate::entry::EntryMeta;
use crate::store::Store;

/// Live entry count and size for one tool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ToolStats {
    /// Number of live entries.
    pub count: u64,
    /// Total payload bytes of those entries.
    pub bytes: u64,
}

/// Snapshot of what the cache currently holds.
///
/// Expired entries still on disk are counted in `expired_entries` only; the
/// totals and per-tool figures cover live entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Number of live entries.
    pub total_entries: u64,
    /// Total payload bytes of live entries.
    pub total_bytes: u64,
    /// Entries present but past their expiry.
    pub expired_entries: u64,
    /// Live entries broken down by tool name.
    pub per_tool: BTreeMap<String, ToolStats>,
    /// Where the entries are kept.
    pub location: String,
}

impl CacheStats {
    /// Aggregates the contents of `store` as of `now`. Never modifies the store.
    pub fn collect(store: &dyn Store, now: Timestamp) -> Self {
        Self::from_entries(store.enumerate(), now, store.describe())
    }

    /// Aggregates an arbitrary sequence of entry metadata.
    pub fn from_entries(
        entries: impl IntoIterator<Item = EntryMeta>,
        now: Timestamp,
        location: impl Into<String>,
    ) -> Self {
        let mut stats = Self {
            location: location.into(),
            ..Self::default()
        };
        for meta in entries {
            if meta.is_expired(now) {
                stats.expired_entries += 1;
                continue;
            }
            stats.total_entries += 1;
            stats.total_bytes += meta.size_bytes;
            let tool = stats.per_tool.entry(meta.tool_name).or_default();
            tool.count += 1;
            tool.bytes += meta.size_bytes;
        }
        stats
    }
}
