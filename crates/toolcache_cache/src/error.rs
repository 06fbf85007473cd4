//! Error types for cache operations.

use std::path::PathBuf;

/// Errors that can occur inside the store.
///
/// These never reach the host: [`ToolCache`](crate::ToolCache) logs them and
/// degrades to a miss (for reads) or a no-op (for writes and deletes). The
/// enum exists so store implementations can propagate failures internally
/// and so operator commands can report them.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// An I/O error occurred while reading or writing an entry file.
    #[error("cache I/O error at {path}: {source}")]
    Io {
        /// The path that caused the error.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// An entry could not be serialized.
    #[error("serialization error: {reason}")]
    Serialization {
        /// Description of the serialization failure.
        reason: String,
    },

    /// A stored entry is unreadable or inconsistent with its file name.
    #[error("corrupt cache entry at {path}: {reason}")]
    Corrupt {
        /// The entry file path.
        path: PathBuf,
        /// Description of the problem.
        reason: String,
    },
}

/// Reasons a call's input cannot be turned into a cache key.
///
/// A derivation failure makes that one call uncacheable; the tool still runs.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    /// The input nests deeper than the canonicalizer is willing to follow.
    #[error("input nesting exceeds {limit} levels")]
    TooDeep {
        /// The nesting limit that was exceeded.
        limit: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_display() {
        let err = CacheError::Io {
            path: PathBuf::from("/tmp/tool-cache/ab.json"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        let msg = err.to_string();
        assert!(msg.contains("cache I/O error"));
        assert!(msg.contains("ab.json"));
    }

    #[test]
    fn serialization_error_display() {
        let err = CacheError::Serialization {
            reason: "key must be a string".to_string(),
        };
        assert!(err.to_string().contains("key must be a string"));
    }

    #[test]
    fn corrupt_display() {
        let err = CacheError::Corrupt {
            path: PathBuf::from("bad.json"),
            reason: "expected value at line 1".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("corrupt cache entry"));
        assert!(msg.contains("bad.json"));
    }

    #[test]
    fn key_error_display() {
        let err = KeyError::TooDeep { limit: 64 };
        assert_eq!(err.to_string(), "input nesting exceeds 64 levels");
    }
}
