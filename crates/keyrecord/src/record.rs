//! Record lifecycle: validate, save, delete, counters, references.
//!
//! A record is created in memory (unsaved, no id), validated, then
//! persisted. The first save allocates its id from the model's atomic
//! sequence; the write section is serialized through the store-backed
//! mutex because index maintenance spans multiple keys.
//!
//! Write order is deliberate: the primary hash lands before membership and
//! index entries, and stale index entries are removed before new ones are
//! written. A crash mid-save therefore leaves at worst a stale index entry,
//! never an index entry pointing at a record that was never written. All
//! index updates are plain set/sorted-set adds and removes, so retrying a
//! failed save is idempotent.

use crate::{
    db::Db,
    error::{Error, FieldErrors, Result, ValidationError},
    field::{FieldCodecError, FieldDescriptor, FieldKind},
    mutex::Mutex,
    query::ModelSet,
    schema::Schema,
    value::Value,
};
use chrono::Utc;
use std::{collections::BTreeMap, fmt, sync::Arc};
use tracing::debug;

///
/// Record
///
/// One instance of a model. Holds only the in-memory field values and the
/// connection handle; nothing is cached across instances.
///

#[derive(Clone)]
pub struct Record {
    db: Db,
    schema: Arc<Schema>,
    id: Option<String>,
    values: BTreeMap<String, Value>,
}

impl Record {
    /// Fresh unsaved record with field defaults applied.
    pub(crate) fn new(db: Db, schema: Arc<Schema>) -> Self {
        let mut values = BTreeMap::new();
        for field in schema.fields() {
            if field.is_counter() {
                continue;
            }
            if let Some(default) = field.default() {
                values.insert(field.name().to_string(), default.clone());
            }
        }
        Self {
            db,
            schema,
            id: None,
            values,
        }
    }

    /// Rebuild a record from its stored hash. Counter fields stay
    /// store-side; unknown hash fields are ignored.
    pub(crate) fn from_stored(
        db: Db,
        schema: Arc<Schema>,
        id: String,
        hash: BTreeMap<String, String>,
    ) -> Result<Self> {
        let mut values = BTreeMap::new();
        for (storage_name, raw) in &hash {
            let Some(field) = schema.field_by_storage_name(storage_name) else {
                continue;
            };
            if field.is_counter() || field.is_list() {
                continue;
            }
            let value = field
                .decode(raw)
                .map_err(|err| Error::BadKey(err.to_string()))?;
            values.insert(field.name().to_string(), value);
        }
        Ok(Self {
            db,
            schema,
            id: Some(id),
            values,
        })
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    #[must_use]
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Whether the record was never saved.
    #[must_use]
    pub const fn is_new(&self) -> bool {
        self.id.is_none()
    }

    /// Primary store key; needs a persisted identity.
    pub fn key(&self) -> Result<String> {
        Ok(self.schema.key().primary(self.require_id()?))
    }

    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values.get(field)
    }

    fn require_id(&self) -> Result<&str> {
        self.id.as_deref().ok_or(Error::MissingId)
    }

    fn descriptor(&self, field: &str) -> Result<&FieldDescriptor> {
        self.schema.field(field).ok_or_else(|| {
            ValidationError::model(format!(
                "unknown field `{field}` on model `{}`",
                self.schema.name()
            ))
            .into()
        })
    }

    // ------------------------------------------------------------------
    // Mutation (in memory; `save` propagates to the store)
    // ------------------------------------------------------------------

    /// Set a field value. Counters cannot be assigned; mutate them with
    /// [`Record::incr`].
    pub fn set(&mut self, field: &str, value: impl Into<Value>) -> Result<()> {
        let descriptor = self.descriptor(field)?;
        if descriptor.is_counter() {
            return Err(ValidationError::model(format!(
                "cannot assign counter field `{field}`; use incr/decr"
            ))
            .into());
        }
        self.values.insert(field.to_string(), value.into());
        Ok(())
    }

    /// Clear a field value.
    pub fn unset(&mut self, field: &str) -> Result<()> {
        self.descriptor(field)?;
        self.values.remove(field);
        Ok(())
    }

    /// Point a reference field at a saved record.
    pub fn set_reference(&mut self, field: &str, target: &Self) -> Result<()> {
        let descriptor = self.descriptor(field)?;
        let FieldKind::Reference { model } = descriptor.kind() else {
            return Err(ValidationError::model(format!("`{field}` is not a reference field")).into());
        };
        if target.schema.name() != model {
            return Err(ValidationError::model(format!(
                "`{field}` references `{model}`, got `{}`",
                target.schema.name()
            ))
            .into());
        }
        let target_id = target.require_id()?.to_string();
        self.values.insert(field.to_string(), Value::Reference(target_id));
        Ok(())
    }

    // ------------------------------------------------------------------
    // Validation
    // ------------------------------------------------------------------

    /// Run every descriptor plus the schema-level validators, collecting
    /// all failures. Store access is needed for uniqueness checks only.
    pub fn validate(&self) -> Result<FieldErrors> {
        let mut errors = FieldErrors::new();

        for field in self.schema.fields() {
            if field.is_counter() {
                continue;
            }
            let value = self.values.get(field.name());
            let messages = field.validate(value);
            let clean = messages.is_empty();
            if !clean {
                errors.extend_field(field.name(), messages);
            }

            if clean
                && field.is_unique()
                && let Some(value) = value
                && self.has_duplicate(field, value)?
            {
                errors.push(field.name(), "not unique");
            }
        }

        for validator in self.schema.validators() {
            validator(self, &mut errors);
        }

        Ok(errors)
    }

    pub fn is_valid(&self) -> Result<bool> {
        Ok(self.validate()?.is_empty())
    }

    fn has_duplicate(&self, field: &FieldDescriptor, value: &Value) -> Result<bool> {
        let matches = ModelSet::over(self.db.clone(), Arc::clone(&self.schema))
            .filter(field.name(), value.clone())
            .ids()?;
        Ok(matches.iter().any(|id| Some(id.as_str()) != self.id()))
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    /// Validate and write the record with its indexes. Auto timestamp
    /// fields are stamped before validation runs.
    pub fn save(&mut self) -> Result<()> {
        let created = self.id.is_none();
        self.apply_auto_stamps(created);

        let errors = self.validate()?;
        if !errors.is_empty() {
            return Err(errors.into());
        }

        if created {
            let next = self
                .db
                .store()
                .incr_by(&self.schema.key().id_sequence(), 1)?;
            self.id = Some(next.to_string());
        }
        let id = self.require_id()?.to_string();

        let guard = Mutex::acquire(
            &self.db,
            self.schema.key().lock(&id),
            self.db.config().lock_timeout,
        )?;
        let result = self.write(&id, created);
        drop(guard);
        result?;

        debug!(model = self.schema.name(), id = %id, created, "record saved");
        Ok(())
    }

    /// Stamp `auto_now` fields on every save and `auto_now_add` fields on
    /// first save. Schema build guarantees these are datetime or date.
    fn apply_auto_stamps(&mut self, created: bool) {
        let now = Utc::now().naive_utc();
        let mut stamped: Vec<(String, Value)> = Vec::new();
        for field in self.schema.fields() {
            if !(field.is_auto_now() || (created && field.is_auto_now_add())) {
                continue;
            }
            let value = match field.kind() {
                FieldKind::DateTime => Value::DateTime(now),
                FieldKind::Date => Value::Date(now.date()),
                _ => continue,
            };
            stamped.push((field.name().to_string(), value));
        }
        for (name, value) in stamped {
            self.values.insert(name, value);
        }
    }

    fn write(&self, id: &str, created: bool) -> Result<()> {
        let key = self.schema.key();
        let store = self.db.store();
        let primary = key.primary(id);

        // primary hash first
        let mut to_set: Vec<(String, String)> = Vec::new();
        let mut to_clear: Vec<String> = Vec::new();
        for field in self.schema.fields() {
            if field.is_list() {
                continue;
            }
            if field.is_counter() {
                if created && let Some(default) = field.default() {
                    to_set.push((field.storage_name(), field.encode(default).map_err(codec_input)?));
                }
                continue;
            }
            match self.values.get(field.name()) {
                Some(value) => {
                    to_set.push((field.storage_name(), field.encode(value).map_err(codec_input)?));
                }
                None => to_clear.push(field.storage_name()),
            }
        }
        store.hash_set_many(&primary, &to_set)?;
        for storage_name in &to_clear {
            store.hash_delete(&primary, storage_name)?;
        }

        store.set_add(&key.membership(), id)?;

        // stale index entries out, current ones in
        self.clear_indexes(id)?;
        let hk_indices = key.indices(id);
        let hk_zindices = key.zindices(id);
        for field in self.schema.indexed_fields() {
            if field.is_list() {
                // loaded records carry no local list value; index whatever
                // the store holds
                let items = match self.values.get(field.name()) {
                    Some(Value::List(items)) => items.clone(),
                    _ => store.list_range(&key.list(id, field.name()))?,
                };
                for item in &items {
                    let encoded = field.encode_element(item).map_err(codec_input)?;
                    let index_key = key.equality_index(&field.storage_name(), &encoded);
                    store.set_add(&index_key, id)?;
                    store.set_add(&hk_indices, &index_key)?;
                }
                continue;
            }
            let Some(value) = self.values.get(field.name()) else {
                continue;
            };
            let encoded = field.encode(value).map_err(codec_input)?;
            let index_key = key.equality_index(&field.storage_name(), &encoded);
            store.set_add(&index_key, id)?;
            store.set_add(&hk_indices, &index_key)?;
            if field.is_range_indexed() {
                let range_key = key.range_index(&field.storage_name());
                store.zset_add(&range_key, id, field.score(value).map_err(codec_input)?)?;
                store.set_add(&hk_zindices, &range_key)?;
            }
        }

        // list payloads are rewritten whole
        for field in self.schema.fields().filter(|f| f.is_list()) {
            if let Some(Value::List(items)) = self.values.get(field.name()) {
                let list_key = key.list(id, field.name());
                store.delete(&list_key)?;
                for item in items {
                    store.list_push(&list_key, item)?;
                }
            }
        }

        Ok(())
    }

    /// Remove every index entry the record occupies, driven by its
    /// housekeeping sets.
    fn clear_indexes(&self, id: &str) -> Result<()> {
        let key = self.schema.key();
        let store = self.db.store();

        let hk_indices = key.indices(id);
        for index_key in store.set_members(&hk_indices)? {
            store.set_remove(&index_key, id)?;
        }
        store.delete(&hk_indices)?;

        let hk_zindices = key.zindices(id);
        for range_key in store.set_members(&hk_zindices)? {
            store.zset_remove(&range_key, id)?;
        }
        store.delete(&hk_zindices)?;

        Ok(())
    }

    /// Remove the record and every index entry referencing its id.
    pub fn delete(&mut self) -> Result<()> {
        let id = self.require_id()?.to_string();
        let key = self.schema.key();
        let store = self.db.store();

        self.clear_indexes(&id)?;
        store.set_remove(&key.membership(), &id)?;
        for field in self.schema.fields().filter(|f| f.is_list()) {
            store.delete(&key.list(&id, field.name()))?;
        }
        store.delete(&key.primary(&id))?;

        debug!(model = self.schema.name(), id = %id, "record deleted");
        self.id = None;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Counters (store-side truth, never cached)
    // ------------------------------------------------------------------

    /// Atomically add `delta` to a counter field.
    pub fn incr(&self, field: &str, delta: i64) -> Result<i64> {
        let descriptor = self.descriptor(field)?;
        if !descriptor.is_counter() {
            return Err(ValidationError::model(format!("`{field}` is not a counter")).into());
        }
        let id = self.require_id()?;
        let next = self
            .db
            .store()
            .hash_incr_by(&self.schema.key().primary(id), field, delta)?;
        Ok(next)
    }

    /// Atomically subtract `delta` from a counter field.
    pub fn decr(&self, field: &str, delta: i64) -> Result<i64> {
        self.incr(field, -delta)
    }

    /// Current counter value; unsaved records read 0.
    pub fn counter(&self, field: &str) -> Result<i64> {
        let descriptor = self.descriptor(field)?;
        if !descriptor.is_counter() {
            return Err(ValidationError::model(format!("`{field}` is not a counter")).into());
        }
        let Some(id) = self.id() else {
            return Ok(0);
        };
        let raw = self
            .db
            .store()
            .hash_get(&self.schema.key().primary(id), field)?;
        match raw {
            None => Ok(0),
            Some(raw) => raw
                .parse::<i64>()
                .map_err(|_| Error::BadKey(format!("counter `{field}` holds `{raw}`"))),
        }
    }

    // ------------------------------------------------------------------
    // References and lists (loaded lazily)
    // ------------------------------------------------------------------

    /// Dereference a reference field. A dangling or unset reference loads
    /// as `None`.
    pub fn reference(&self, field: &str) -> Result<Option<Self>> {
        let descriptor = self.descriptor(field)?;
        let FieldKind::Reference { model } = descriptor.kind() else {
            return Err(ValidationError::model(format!("`{field}` is not a reference field")).into());
        };
        let Some(Value::Reference(target_id)) = self.values.get(field) else {
            return Ok(None);
        };
        let schema = self
            .db
            .schema(model)
            .ok_or_else(|| Error::BadKey(format!("model `{model}` is not registered")))?;

        let hash = self
            .db
            .store()
            .hash_get_all(&schema.key().primary(target_id))?;
        if hash.is_empty() {
            return Ok(None);
        }
        Self::from_stored(self.db.clone(), schema, target_id.clone(), hash).map(Some)
    }

    /// Elements of a list field: the locally set value when present,
    /// otherwise the stored list.
    pub fn list(&self, field: &str) -> Result<Vec<String>> {
        let descriptor = self.descriptor(field)?;
        if !descriptor.is_list() {
            return Err(ValidationError::model(format!("`{field}` is not a list field")).into());
        }
        if let Some(Value::List(items)) = self.values.get(field) {
            return Ok(items.clone());
        }
        let Some(id) = self.id() else {
            return Ok(Vec::new());
        };
        Ok(self.db.store().list_range(&self.schema.key().list(id, field))?)
    }
}

impl PartialEq for Record {
    /// Two records are equal when they are the same persisted identity.
    fn eq(&self, other: &Self) -> bool {
        self.id.is_some()
            && self.schema.name() == other.schema.name()
            && self.id == other.id
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("model", &self.schema.name())
            .field("id", &self.id)
            .field("values", &self.values)
            .finish()
    }
}

fn codec_input(err: FieldCodecError) -> Error {
    Error::Validation(ValidationError::Model(err.to_string()))
}
