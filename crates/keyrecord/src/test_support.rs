//! Shared fixtures for crate tests.

use crate::{
    db::Db,
    field::FieldDescriptor,
    schema::Schema,
    store::{MemoryStore, ScoreRange, Store, StoreResult},
};
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

pub(crate) fn fresh_db() -> Db {
    Db::new(Arc::new(MemoryStore::new()))
}

/// The canonical fixture model: a mix of indexed, unindexed, range-scored,
/// unique, counter, and list fields.
pub(crate) fn person_schema() -> Arc<Schema> {
    Schema::builder("Person")
        .field(FieldDescriptor::text("first_name").required())
        .field(FieldDescriptor::text("last_name"))
        .field(FieldDescriptor::int("age"))
        .field(FieldDescriptor::boolean("active").default_value(true))
        .field(FieldDescriptor::text("email").unique())
        .field(FieldDescriptor::text("bio").unindexed().max_length(120))
        .field(FieldDescriptor::datetime("signed_up"))
        .field(FieldDescriptor::counter("visits"))
        .field(FieldDescriptor::list("tags"))
        .build()
        .unwrap()
}

/// A model holding a reference to `Person`.
pub(crate) fn note_schema() -> Arc<Schema> {
    Schema::builder("Note")
        .field(FieldDescriptor::text("body").required().unindexed())
        .field(FieldDescriptor::reference("author", "Person"))
        .build()
        .unwrap()
}

///
/// CountingStore
///
/// Store wrapper that counts every command issued, used to assert that
/// query-set chaining performs no store access until evaluation.
///

pub(crate) struct CountingStore {
    inner: MemoryStore,
    calls: AtomicUsize,
}

impl CountingStore {
    pub(crate) fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn tick(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

impl Store for CountingStore {
    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.tick();
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        self.tick();
        self.inner.set(key, value)
    }

    fn set_nx_ex(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<bool> {
        self.tick();
        self.inner.set_nx_ex(key, value, ttl)
    }

    fn incr_by(&self, key: &str, delta: i64) -> StoreResult<i64> {
        self.tick();
        self.inner.incr_by(key, delta)
    }

    fn delete(&self, key: &str) -> StoreResult<bool> {
        self.tick();
        self.inner.delete(key)
    }

    fn delete_eq(&self, key: &str, expected: &str) -> StoreResult<bool> {
        self.tick();
        self.inner.delete_eq(key, expected)
    }

    fn exists(&self, key: &str) -> StoreResult<bool> {
        self.tick();
        self.inner.exists(key)
    }

    fn hash_get(&self, key: &str, field: &str) -> StoreResult<Option<String>> {
        self.tick();
        self.inner.hash_get(key, field)
    }

    fn hash_get_all(&self, key: &str) -> StoreResult<BTreeMap<String, String>> {
        self.tick();
        self.inner.hash_get_all(key)
    }

    fn hash_set_many(&self, key: &str, entries: &[(String, String)]) -> StoreResult<()> {
        self.tick();
        self.inner.hash_set_many(key, entries)
    }

    fn hash_delete(&self, key: &str, field: &str) -> StoreResult<bool> {
        self.tick();
        self.inner.hash_delete(key, field)
    }

    fn hash_incr_by(&self, key: &str, field: &str, delta: i64) -> StoreResult<i64> {
        self.tick();
        self.inner.hash_incr_by(key, field, delta)
    }

    fn set_add(&self, key: &str, member: &str) -> StoreResult<bool> {
        self.tick();
        self.inner.set_add(key, member)
    }

    fn set_remove(&self, key: &str, member: &str) -> StoreResult<bool> {
        self.tick();
        self.inner.set_remove(key, member)
    }

    fn set_members(&self, key: &str) -> StoreResult<BTreeSet<String>> {
        self.tick();
        self.inner.set_members(key)
    }

    fn set_contains(&self, key: &str, member: &str) -> StoreResult<bool> {
        self.tick();
        self.inner.set_contains(key, member)
    }

    fn set_len(&self, key: &str) -> StoreResult<u64> {
        self.tick();
        self.inner.set_len(key)
    }

    fn zset_add(&self, key: &str, member: &str, score: f64) -> StoreResult<bool> {
        self.tick();
        self.inner.zset_add(key, member, score)
    }

    fn zset_remove(&self, key: &str, member: &str) -> StoreResult<bool> {
        self.tick();
        self.inner.zset_remove(key, member)
    }

    fn zset_score(&self, key: &str, member: &str) -> StoreResult<Option<f64>> {
        self.tick();
        self.inner.zset_score(key, member)
    }

    fn zset_range_by_score(&self, key: &str, range: ScoreRange) -> StoreResult<Vec<String>> {
        self.tick();
        self.inner.zset_range_by_score(key, range)
    }

    fn list_push(&self, key: &str, value: &str) -> StoreResult<()> {
        self.tick();
        self.inner.list_push(key, value)
    }

    fn list_range(&self, key: &str) -> StoreResult<Vec<String>> {
        self.tick();
        self.inner.list_range(key)
    }
}
