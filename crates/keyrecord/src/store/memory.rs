//! In-process reference implementation of the store command surface.
//!
//! One `parking_lot::Mutex` guards the whole keyspace, so every trait
//! method is one atomic step — the same interleaving guarantees a
//! single-threaded store server gives concurrent clients. Expiry applies to
//! string entries (the only ones the engine leases) and is checked lazily
//! on access.

use crate::store::{ScoreRange, Store, StoreError, StoreResult};
use parking_lot::Mutex;
use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    time::{Duration, Instant},
};

///
/// Entry
///
/// One stored structure. Commands against a key holding a different
/// structure fail with `WrongType`, mirroring store-server behavior.
///

#[derive(Clone, Debug)]
enum Entry {
    Str {
        value: String,
        expires_at: Option<Instant>,
    },
    Hash(BTreeMap<String, String>),
    Set(BTreeSet<String>),
    ZSet(BTreeMap<String, f64>),
    List(Vec<String>),
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        match self {
            Self::Str {
                expires_at: Some(deadline),
                ..
            } => now >= *deadline,
            _ => false,
        }
    }
}

///
/// MemoryStore
///

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys (diagnostics only).
    #[must_use]
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .values()
            .filter(|e| !e.is_expired(now))
            .count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn wrong_type(key: &str) -> StoreError {
        StoreError::WrongType {
            key: key.to_string(),
        }
    }

    /// Drop the entry if its lease has lapsed, then hand the slot back.
    fn purge_expired(entries: &mut HashMap<String, Entry>, key: &str) {
        let now = Instant::now();
        if entries.get(key).is_some_and(|e| e.is_expired(now)) {
            entries.remove(key);
        }
    }
}

impl Store for MemoryStore {
    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut entries = self.entries.lock();
        Self::purge_expired(&mut entries, key);
        match entries.get(key) {
            None => Ok(None),
            Some(Entry::Str { value, .. }) => Ok(Some(value.clone())),
            Some(_) => Err(Self::wrong_type(key)),
        }
    }

    fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        self.entries.lock().insert(
            key.to_string(),
            Entry::Str {
                value: value.to_string(),
                expires_at: None,
            },
        );
        Ok(())
    }

    fn set_nx_ex(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<bool> {
        let mut entries = self.entries.lock();
        Self::purge_expired(&mut entries, key);
        if entries.contains_key(key) {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            Entry::Str {
                value: value.to_string(),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(true)
    }

    fn incr_by(&self, key: &str, delta: i64) -> StoreResult<i64> {
        let mut entries = self.entries.lock();
        Self::purge_expired(&mut entries, key);
        let current = match entries.get(key) {
            None => 0,
            Some(Entry::Str { value, .. }) => value
                .parse::<i64>()
                .map_err(|_| Self::wrong_type(key))?,
            Some(_) => return Err(Self::wrong_type(key)),
        };
        let next = current.wrapping_add(delta);
        entries.insert(
            key.to_string(),
            Entry::Str {
                value: next.to_string(),
                expires_at: None,
            },
        );
        Ok(next)
    }

    fn delete(&self, key: &str) -> StoreResult<bool> {
        let mut entries = self.entries.lock();
        Self::purge_expired(&mut entries, key);
        Ok(entries.remove(key).is_some())
    }

    fn delete_eq(&self, key: &str, expected: &str) -> StoreResult<bool> {
        let mut entries = self.entries.lock();
        Self::purge_expired(&mut entries, key);
        match entries.get(key) {
            Some(Entry::Str { value, .. }) if value == expected => {
                entries.remove(key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn exists(&self, key: &str) -> StoreResult<bool> {
        let mut entries = self.entries.lock();
        Self::purge_expired(&mut entries, key);
        Ok(entries.contains_key(key))
    }

    fn hash_get(&self, key: &str, field: &str) -> StoreResult<Option<String>> {
        match self.entries.lock().get(key) {
            None => Ok(None),
            Some(Entry::Hash(map)) => Ok(map.get(field).cloned()),
            Some(_) => Err(Self::wrong_type(key)),
        }
    }

    fn hash_get_all(&self, key: &str) -> StoreResult<BTreeMap<String, String>> {
        match self.entries.lock().get(key) {
            None => Ok(BTreeMap::new()),
            Some(Entry::Hash(map)) => Ok(map.clone()),
            Some(_) => Err(Self::wrong_type(key)),
        }
    }

    fn hash_set_many(&self, key: &str, fields: &[(String, String)]) -> StoreResult<()> {
        let mut entries = self.entries.lock();
        let entry = entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::Hash(BTreeMap::new()));
        let Entry::Hash(map) = entry else {
            return Err(Self::wrong_type(key));
        };
        for (field, value) in fields {
            map.insert(field.clone(), value.clone());
        }
        Ok(())
    }

    fn hash_delete(&self, key: &str, field: &str) -> StoreResult<bool> {
        let mut entries = self.entries.lock();
        match entries.get_mut(key) {
            None => Ok(false),
            Some(Entry::Hash(map)) => {
                let removed = map.remove(field).is_some();
                if map.is_empty() {
                    entries.remove(key);
                }
                Ok(removed)
            }
            Some(_) => Err(Self::wrong_type(key)),
        }
    }

    fn hash_incr_by(&self, key: &str, field: &str, delta: i64) -> StoreResult<i64> {
        let mut entries = self.entries.lock();
        let entry = entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::Hash(BTreeMap::new()));
        let Entry::Hash(map) = entry else {
            return Err(Self::wrong_type(key));
        };
        let current = match map.get(field) {
            None => 0,
            Some(value) => value.parse::<i64>().map_err(|_| Self::wrong_type(key))?,
        };
        let next = current.wrapping_add(delta);
        map.insert(field.to_string(), next.to_string());
        Ok(next)
    }

    fn set_add(&self, key: &str, member: &str) -> StoreResult<bool> {
        let mut entries = self.entries.lock();
        let entry = entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::Set(BTreeSet::new()));
        let Entry::Set(set) = entry else {
            return Err(Self::wrong_type(key));
        };
        Ok(set.insert(member.to_string()))
    }

    fn set_remove(&self, key: &str, member: &str) -> StoreResult<bool> {
        let mut entries = self.entries.lock();
        match entries.get_mut(key) {
            None => Ok(false),
            Some(Entry::Set(set)) => {
                let removed = set.remove(member);
                if set.is_empty() {
                    entries.remove(key);
                }
                Ok(removed)
            }
            Some(_) => Err(Self::wrong_type(key)),
        }
    }

    fn set_members(&self, key: &str) -> StoreResult<BTreeSet<String>> {
        match self.entries.lock().get(key) {
            None => Ok(BTreeSet::new()),
            Some(Entry::Set(set)) => Ok(set.clone()),
            Some(_) => Err(Self::wrong_type(key)),
        }
    }

    fn set_contains(&self, key: &str, member: &str) -> StoreResult<bool> {
        match self.entries.lock().get(key) {
            None => Ok(false),
            Some(Entry::Set(set)) => Ok(set.contains(member)),
            Some(_) => Err(Self::wrong_type(key)),
        }
    }

    fn set_len(&self, key: &str) -> StoreResult<u64> {
        match self.entries.lock().get(key) {
            None => Ok(0),
            Some(Entry::Set(set)) => Ok(set.len() as u64),
            Some(_) => Err(Self::wrong_type(key)),
        }
    }

    fn zset_add(&self, key: &str, member: &str, score: f64) -> StoreResult<bool> {
        let mut entries = self.entries.lock();
        let entry = entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::ZSet(BTreeMap::new()));
        let Entry::ZSet(zset) = entry else {
            return Err(Self::wrong_type(key));
        };
        Ok(zset.insert(member.to_string(), score).is_none())
    }

    fn zset_remove(&self, key: &str, member: &str) -> StoreResult<bool> {
        let mut entries = self.entries.lock();
        match entries.get_mut(key) {
            None => Ok(false),
            Some(Entry::ZSet(zset)) => {
                let removed = zset.remove(member).is_some();
                if zset.is_empty() {
                    entries.remove(key);
                }
                Ok(removed)
            }
            Some(_) => Err(Self::wrong_type(key)),
        }
    }

    fn zset_score(&self, key: &str, member: &str) -> StoreResult<Option<f64>> {
        match self.entries.lock().get(key) {
            None => Ok(None),
            Some(Entry::ZSet(zset)) => Ok(zset.get(member).copied()),
            Some(_) => Err(Self::wrong_type(key)),
        }
    }

    fn zset_range_by_score(&self, key: &str, range: ScoreRange) -> StoreResult<Vec<String>> {
        match self.entries.lock().get(key) {
            None => Ok(Vec::new()),
            Some(Entry::ZSet(zset)) => {
                let mut hits: Vec<(f64, &String)> = zset
                    .iter()
                    .filter(|(_, score)| range.contains(**score))
                    .map(|(member, score)| (*score, member))
                    .collect();
                hits.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(b.1)));
                Ok(hits.into_iter().map(|(_, member)| member.clone()).collect())
            }
            Some(_) => Err(Self::wrong_type(key)),
        }
    }

    fn list_push(&self, key: &str, value: &str) -> StoreResult<()> {
        let mut entries = self.entries.lock();
        let entry = entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::List(Vec::new()));
        let Entry::List(list) = entry else {
            return Err(Self::wrong_type(key));
        };
        list.push(value.to_string());
        Ok(())
    }

    fn list_range(&self, key: &str) -> StoreResult<Vec<String>> {
        match self.entries.lock().get(key) {
            None => Ok(Vec::new()),
            Some(Entry::List(list)) => Ok(list.clone()),
            Some(_) => Err(Self::wrong_type(key)),
        }
    }
}
