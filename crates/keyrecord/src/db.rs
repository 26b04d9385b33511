//! The connection handle.
//!
//! `Db` is an explicit, cheaply clonable handle around the store plus
//! engine configuration and a registry of known schemas. There is no
//! process-wide client: everything that talks to the store receives a `Db`.

use crate::{
    error::{Error, Result},
    key::parse_primary,
    manager::Manager,
    record::Record,
    schema::Schema,
    store::Store,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt, sync::Arc, time::Duration};

///
/// DbConfig
///

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct DbConfig {
    /// Lease duration written with every mutex acquisition. A holder that
    /// crashes frees the lock after this long.
    pub lock_lease: Duration,
    /// Sleep between mutex acquisition attempts.
    pub lock_backoff: Duration,
    /// Acquisition budget for the engine's internal write locks.
    pub lock_timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            lock_lease: Duration::from_secs(1),
            lock_backoff: Duration::from_millis(50),
            lock_timeout: Duration::from_secs(5),
        }
    }
}

///
/// Db
///
/// Shared connection handle. Clones are shallow; all state lives in the
/// store.
///

#[derive(Clone)]
pub struct Db {
    inner: Arc<DbInner>,
}

struct DbInner {
    store: Arc<dyn Store>,
    config: DbConfig,
    schemas: RwLock<BTreeMap<String, Arc<Schema>>>,
}

impl Db {
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self::with_config(store, DbConfig::default())
    }

    #[must_use]
    pub fn with_config(store: Arc<dyn Store>, config: DbConfig) -> Self {
        Self {
            inner: Arc::new(DbInner {
                store,
                config,
                schemas: RwLock::new(BTreeMap::new()),
            }),
        }
    }

    #[must_use]
    pub fn store(&self) -> &dyn Store {
        self.inner.store.as_ref()
    }

    #[must_use]
    pub fn config(&self) -> &DbConfig {
        &self.inner.config
    }

    /// Register a schema so raw-key resolution and reference dereferencing
    /// can find it. Registering the same model name again replaces the
    /// previous entry.
    pub fn register(&self, schema: &Arc<Schema>) {
        self.inner
            .schemas
            .write()
            .insert(schema.name().to_string(), Arc::clone(schema));
    }

    #[must_use]
    pub fn schema(&self, model: &str) -> Option<Arc<Schema>> {
        self.inner.schemas.read().get(model).cloned()
    }

    /// Manager facade for one schema. Registers the schema as a side
    /// effect; managers are only reachable from the handle, never from a
    /// record instance.
    #[must_use]
    pub fn manager(&self, schema: &Arc<Schema>) -> Manager {
        self.register(schema);
        Manager::new(self.clone(), Arc::clone(schema))
    }

    /// Resolve a raw primary key (`model:id`) to its record.
    ///
    /// Fails with [`Error::BadKey`] when the key is malformed or names an
    /// unregistered model, and with [`Error::MissingId`] when no record
    /// exists for the id.
    pub fn from_key(&self, key: &str) -> Result<Record> {
        let (model, id) = parse_primary(key)?;
        let schema = self
            .schema(model)
            .ok_or_else(|| Error::BadKey(format!("`{key}` names unregistered model `{model}`")))?;
        self.manager(&schema).get_by_id(id)
    }
}

impl fmt::Debug for Db {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Db")
            .field("config", &self.inner.config)
            .field("schemas", &self.inner.schemas.read().len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn config_defaults_deserialize() {
        let config: DbConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.lock_lease, Duration::from_secs(1));
        assert_eq!(config.lock_backoff, Duration::from_millis(50));
    }

    #[test]
    fn registry_round_trip() {
        let db = Db::new(Arc::new(MemoryStore::new()));
        let schema = Schema::builder("Thing").build().unwrap();
        db.register(&schema);
        assert!(db.schema("Thing").is_some());
        assert!(db.schema("Other").is_none());
    }

    #[test]
    fn from_key_rejects_unregistered_models() {
        let db = Db::new(Arc::new(MemoryStore::new()));
        assert!(matches!(db.from_key("Ghost:1"), Err(Error::BadKey(_))));
        assert!(matches!(db.from_key("Ghost"), Err(Error::BadKey(_))));
    }
}
