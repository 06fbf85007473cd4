//! Cached result records and their on-disk representation.
//!
//! Each entry is a JSON object with named fields. Unknown fields are ignored
//! on read so newer writers can add fields without breaking older readers;
//! a changed [`ENTRY_FORMAT_VERSION`] marks an incompatible layout.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use toolcache_common::{CacheKey, Timestamp};

/// Current entry format version. Entries with any other version are
/// treated as corrupt.
pub const ENTRY_FORMAT_VERSION: u32 = 1;

/// One cached tool result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Layout version of this record.
    pub format_version: u32,
    /// Identity of the call that produced this result.
    pub key: CacheKey,
    /// Tool that produced the result.
    pub tool_name: String,
    /// Normalized file path or URL the call addressed, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_path: Option<String>,
    /// The serialized result, opaque to the cache.
    pub payload: String,
    /// When the result was stored.
    pub created_at: Timestamp,
    /// First instant at which the entry is no longer served.
    pub expires_at: Timestamp,
    /// Length of `payload` in bytes.
    pub size_bytes: u64,
}

impl CacheEntry {
    /// Builds an entry that expires `ttl` after `created_at`.
    pub fn new(
        key: CacheKey,
        tool_name: impl Into<String>,
        resource_path: Option<String>,
        payload: impl Into<String>,
        created_at: Timestamp,
        ttl: Duration,
    ) -> Self {
        let payload = payload.into();
        Self {
            format_version: ENTRY_FORMAT_VERSION,
            key,
            tool_name: tool_name.into(),
            resource_path,
            size_bytes: payload.len() as u64,
            payload,
            created_at,
            expires_at: created_at.saturating_add(ttl),
        }
    }

    /// Returns `true` once `now` has reached `expires_at`.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        now >= self.expires_at
    }

    /// Returns the entry's metadata without the payload.
    pub fn meta(&self) -> EntryMeta {
        EntryMeta {
            format_version: self.format_version,
            key: self.key,
            tool_name: self.tool_name.clone(),
            resource_path: self.resource_path.clone(),
            created_at: self.created_at,
            expires_at: self.expires_at,
            size_bytes: self.size_bytes,
        }
    }
}

/// Entry metadata: everything but the payload.
///
/// Deserializes directly from an entry file because unknown fields (the
/// payload among them) are skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMeta {
    /// Layout version of the record.
    pub format_version: u32,
    /// Identity of the cached call.
    pub key: CacheKey,
    /// Tool that produced the result.
    pub tool_name: String,
    /// Normalized file path or URL the call addressed, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_path: Option<String>,
    /// When the result was stored.
    pub created_at: Timestamp,
    /// First instant at which the entry is no longer served.
    pub expires_at: Timestamp,
    /// Size of the payload in bytes.
    pub size_bytes: u64,
}

impl EntryMeta {
    /// Returns `true` once `now` has reached `expires_at`.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        now >= self.expires_at
    }
}

/// A record read back from storage that can be checked for consistency
/// with the key it was stored under.
pub(crate) trait StoredRecord: serde::de::DeserializeOwned {
    /// Returns a description of the first inconsistency found, if any.
    fn inconsistency(&self, stored_under: &CacheKey) -> Option<String>;
}

fn header_inconsistency(version: u32, key: &CacheKey, stored_under: &CacheKey) -> Option<String> {
    if version != ENTRY_FORMAT_VERSION {
        return Some(format!(
            "format version {version}, expected {ENTRY_FORMAT_VERSION}"
        ));
    }
    if key != stored_under {
        return Some(format!("entry key {key} does not match {stored_under}"));
    }
    None
}

impl StoredRecord for CacheEntry {
    fn inconsistency(&self, stored_under: &CacheKey) -> Option<String> {
        header_inconsistency(self.format_version, &self.key, stored_under).or_else(|| {
            let actual = self.payload.len() as u64;
            (actual != self.size_bytes).then(|| {
                format!("size_bytes {} but payload is {actual} bytes", self.size_bytes)
            })
        })
    }
}

impl StoredRecord for EntryMeta {
    fn inconsistency(&self, stored_under: &CacheKey) -> Option<String> {
        header_inconsistency(self.format_version, &self.key, stored_under)
    }
}
