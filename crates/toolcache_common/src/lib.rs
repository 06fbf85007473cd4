//! Shared foundational types used across the toolcache crates.
//!
//! This crate provides the cache key digest, millisecond timestamps, and the
//! clock abstraction that lets expiry logic be driven deterministically in tests.

#![warn(missing_docs)]

pub mod defaults;
pub mod hash;
pub mod time;

pub use hash::{CacheKey, ParseKeyError};
pub use time::{Clock, ManualClock, SystemClock, Timestamp};
