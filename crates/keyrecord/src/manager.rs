//! Per-model query facade.
//!
//! A [`Manager`] is obtained from [`Db::manager`](crate::db::Db::manager)
//! and is the only route into a model's query surface; records never hand
//! one out. It is a thin pairing of connection handle and schema, so it is
//! cheap to clone and create on demand.

use crate::{
    db::Db,
    error::{Error, Result},
    query::{Cond, ModelSet},
    record::Record,
    schema::Schema,
    value::Value,
};
use std::sync::Arc;

///
/// Manager
///

#[derive(Clone, Debug)]
pub struct Manager {
    db: Db,
    schema: Arc<Schema>,
}

impl Manager {
    pub(crate) fn new(db: Db, schema: Arc<Schema>) -> Self {
        Self { db, schema }
    }

    #[must_use]
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    // ------------------------------------------------------------------
    // Query entry points
    // ------------------------------------------------------------------

    /// Every record of the model.
    #[must_use]
    pub fn all(&self) -> ModelSet {
        ModelSet::over(self.db.clone(), Arc::clone(&self.schema))
    }

    #[must_use]
    pub fn filter(&self, field: impl Into<String>, value: impl Into<Value>) -> ModelSet {
        self.all().filter(field, value)
    }

    #[must_use]
    pub fn exclude(&self, field: impl Into<String>, value: impl Into<Value>) -> ModelSet {
        self.all().exclude(field, value)
    }

    #[must_use]
    pub fn zfilter(&self, field: impl Into<String>, cond: Cond) -> ModelSet {
        self.all().zfilter(field, cond)
    }

    #[must_use]
    pub fn order(&self, field: impl Into<String>) -> ModelSet {
        self.all().order(field)
    }

    #[must_use]
    pub fn order_desc(&self, field: impl Into<String>) -> ModelSet {
        self.all().order_desc(field)
    }

    pub fn count(&self) -> Result<usize> {
        self.all().count()
    }

    // ------------------------------------------------------------------
    // Record access
    // ------------------------------------------------------------------

    /// Fresh unsaved record with defaults applied.
    #[must_use]
    pub fn new_record(&self) -> Record {
        Record::new(self.db.clone(), Arc::clone(&self.schema))
    }

    /// Load one record by id. Fails with [`Error::MissingId`] when the id
    /// has no stored record.
    pub fn get_by_id(&self, id: &str) -> Result<Record> {
        let hash = self.db.store().hash_get_all(&self.schema.key().primary(id))?;
        if hash.is_empty() {
            return Err(Error::MissingId);
        }
        Record::from_stored(self.db.clone(), Arc::clone(&self.schema), id.to_string(), hash)
    }

    /// Whether a record with this id exists.
    pub fn exists(&self, id: &str) -> Result<bool> {
        if self.db.store().exists(&self.schema.key().primary(id))? {
            return Ok(true);
        }
        Ok(self
            .db
            .store()
            .set_contains(&self.schema.key().membership(), id)?)
    }

    /// Build, set, and save a record in one step.
    pub fn create(&self, values: &[(&str, Value)]) -> Result<Record> {
        let mut record = self.new_record();
        for (field, value) in values {
            record.set(field, value.clone())?;
        }
        record.save()?;
        Ok(record)
    }

    /// Return the first record matching the indexed subset of `values`, or
    /// create one from all of them. Find-then-create is not atomic; two
    /// racing callers can both create.
    pub fn get_or_create(&self, values: &[(&str, Value)]) -> Result<Record> {
        let mut set = self.all();
        for (field, value) in values {
            if self.schema.field(field).is_some_and(|f| f.is_indexed()) {
                set = set.filter(*field, value.clone());
            }
        }
        if let Some(existing) = set.first()? {
            return Ok(existing);
        }
        self.create(values)
    }
}
