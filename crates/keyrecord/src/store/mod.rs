//! The store seam.
//!
//! [`Store`] is the full command surface the engine consumes: strings with
//! expiry, hashes with atomic field increment, sets, score-ordered sorted
//! sets, lists, and the atomic primitives (`incr_by`, `set_nx_ex`,
//! `delete_eq`) every cross-process guarantee is built from. The engine
//! never assumes multi-key atomicity beyond a single command.
//!
//! Implementations wrap a concrete client (or, for [`MemoryStore`], a
//! process-local map) and must make each method one atomic step.

mod memory;

pub use memory::MemoryStore;

use std::{
    collections::{BTreeMap, BTreeSet},
    time::Duration,
};
use thiserror::Error as ThisError;

///
/// StoreError
///
/// Store-communication and store-type failures. These propagate to the
/// caller unchanged; the engine has no durability story of its own.
///

#[derive(Clone, Debug, ThisError)]
pub enum StoreError {
    #[error("store unreachable: {0}")]
    Unreachable(String),

    #[error("key `{key}` holds a different structure than the command expects")]
    WrongType { key: String },

    #[error("store io failure: {0}")]
    Io(String),
}

/// Store result alias.
pub type StoreResult<T> = Result<T, StoreError>;

///
/// ScoreRange
///
/// Half-open or closed score bounds for sorted-set range reads. `None`
/// bounds are unbounded.
///

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScoreRange {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub min_exclusive: bool,
    pub max_exclusive: bool,
}

impl ScoreRange {
    #[must_use]
    pub const fn lt(max: f64) -> Self {
        Self {
            min: None,
            max: Some(max),
            min_exclusive: false,
            max_exclusive: true,
        }
    }

    #[must_use]
    pub const fn le(max: f64) -> Self {
        Self {
            min: None,
            max: Some(max),
            min_exclusive: false,
            max_exclusive: false,
        }
    }

    #[must_use]
    pub const fn gt(min: f64) -> Self {
        Self {
            min: Some(min),
            max: None,
            min_exclusive: true,
            max_exclusive: false,
        }
    }

    #[must_use]
    pub const fn ge(min: f64) -> Self {
        Self {
            min: Some(min),
            max: None,
            min_exclusive: false,
            max_exclusive: false,
        }
    }

    #[must_use]
    pub const fn between(min: f64, max: f64) -> Self {
        Self {
            min: Some(min),
            max: Some(max),
            min_exclusive: false,
            max_exclusive: false,
        }
    }

    /// Whether `score` falls inside the range.
    #[must_use]
    pub fn contains(&self, score: f64) -> bool {
        let above_min = match self.min {
            Some(min) if self.min_exclusive => score > min,
            Some(min) => score >= min,
            None => true,
        };
        let below_max = match self.max {
            Some(max) if self.max_exclusive => score < max,
            Some(max) => score <= max,
            None => true,
        };
        above_min && below_max
    }
}

///
/// Store
///
/// The key-value command surface. Every method is synchronous, blocking,
/// and atomic in isolation. Keys absent from the store behave as empty
/// structures for reads.
///

pub trait Store: Send + Sync + 'static {
    // ------------------------------------------------------------------
    // Strings / atomic primitives
    // ------------------------------------------------------------------

    fn get(&self, key: &str) -> StoreResult<Option<String>>;

    fn set(&self, key: &str, value: &str) -> StoreResult<()>;

    /// Set `key` to `value` with expiry `ttl`, only if the key does not
    /// exist (or its previous lease expired). Returns whether the write
    /// happened. This is the mutex acquisition primitive.
    fn set_nx_ex(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<bool>;

    /// Atomically add `delta` to the integer at `key` (missing keys count
    /// from zero) and return the new value. This is the id allocation
    /// primitive.
    fn incr_by(&self, key: &str, delta: i64) -> StoreResult<i64>;

    /// Remove `key`. Returns whether it existed.
    fn delete(&self, key: &str) -> StoreResult<bool>;

    /// Remove `key` only if its current string value equals `expected`.
    /// Returns whether the delete happened. This is the mutex release
    /// primitive: a holder never deletes a lease it no longer owns.
    fn delete_eq(&self, key: &str, expected: &str) -> StoreResult<bool>;

    fn exists(&self, key: &str) -> StoreResult<bool>;

    // ------------------------------------------------------------------
    // Hashes
    // ------------------------------------------------------------------

    fn hash_get(&self, key: &str, field: &str) -> StoreResult<Option<String>>;

    fn hash_get_all(&self, key: &str) -> StoreResult<BTreeMap<String, String>>;

    /// Write the given fields, leaving other fields of the hash untouched.
    fn hash_set_many(&self, key: &str, entries: &[(String, String)]) -> StoreResult<()>;

    fn hash_delete(&self, key: &str, field: &str) -> StoreResult<bool>;

    /// Atomically add `delta` to an integer hash field and return the new
    /// value. This is the counter primitive.
    fn hash_incr_by(&self, key: &str, field: &str, delta: i64) -> StoreResult<i64>;

    // ------------------------------------------------------------------
    // Sets
    // ------------------------------------------------------------------

    fn set_add(&self, key: &str, member: &str) -> StoreResult<bool>;

    fn set_remove(&self, key: &str, member: &str) -> StoreResult<bool>;

    fn set_members(&self, key: &str) -> StoreResult<BTreeSet<String>>;

    fn set_contains(&self, key: &str, member: &str) -> StoreResult<bool>;

    fn set_len(&self, key: &str) -> StoreResult<u64>;

    // ------------------------------------------------------------------
    // Sorted sets
    // ------------------------------------------------------------------

    fn zset_add(&self, key: &str, member: &str, score: f64) -> StoreResult<bool>;

    fn zset_remove(&self, key: &str, member: &str) -> StoreResult<bool>;

    fn zset_score(&self, key: &str, member: &str) -> StoreResult<Option<f64>>;

    /// Members whose score falls in `range`, ordered by (score, member)
    /// ascending. An absent key yields an empty sequence.
    fn zset_range_by_score(&self, key: &str, range: ScoreRange) -> StoreResult<Vec<String>>;

    // ------------------------------------------------------------------
    // Lists
    // ------------------------------------------------------------------

    fn list_push(&self, key: &str, value: &str) -> StoreResult<()>;

    fn list_range(&self, key: &str) -> StoreResult<Vec<String>>;
}
