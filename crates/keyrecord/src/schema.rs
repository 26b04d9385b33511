//! Explicit schema objects.
//!
//! A schema is a named, ordered mapping of field name to descriptor plus
//! the model-level custom validators. It is plain shared data (`Arc`):
//! records and managers consult it by lookup, never by attribute-access
//! interception.

use crate::{
    error::FieldErrors,
    field::{FieldDescriptor, FieldKind},
    key::{ModelKey, SEPARATOR},
    record::Record,
};
use std::{fmt, sync::Arc};
use thiserror::Error as ThisError;

/// Model-level validator, run after per-field validation. Pushes its
/// findings into the shared error collection.
pub type ModelValidator = fn(&Record, &mut FieldErrors);

/// Field names that would collide with reserved key segments.
const RESERVED_FIELD_NAMES: &[&str] = &["all", "id"];

///
/// SchemaError
///
/// Definition-time rejection. A schema that builds successfully can never
/// produce colliding store keys.
///

#[derive(Debug, ThisError)]
pub enum SchemaError {
    #[error("model name `{0}` is empty or contains `{SEPARATOR}`")]
    InvalidModelName(String),

    #[error("field name `{0}` is reserved or malformed")]
    InvalidFieldName(String),

    #[error("field `{0}` is defined twice")]
    DuplicateField(String),

    #[error("field `{0}` is unique but not indexed; uniqueness needs an index")]
    UniqueNotIndexed(String),

    #[error("field `{field}` references unknown-looking model name `{model}`")]
    InvalidReference { field: String, model: String },

    #[error("field `{0}` has an auto timestamp option but is not a datetime or date")]
    AutoStampNotTemporal(String),
}

///
/// Schema
///

pub struct Schema {
    name: String,
    key: ModelKey,
    fields: Vec<FieldDescriptor>,
    validators: Vec<ModelValidator>,
}

impl Schema {
    #[must_use]
    pub fn builder(name: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder {
            name: name.into(),
            fields: Vec::new(),
            validators: Vec::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Key factory for this model's namespace.
    #[must_use]
    pub const fn key(&self) -> &ModelKey {
        &self.key
    }

    /// Ordered field descriptors.
    pub fn fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter()
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name() == name)
    }

    /// Resolve a hash field back to its descriptor; reference values are
    /// stored under `{name}_id`.
    #[must_use]
    pub fn field_by_storage_name(&self, storage_name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.storage_name() == storage_name)
    }

    pub fn indexed_fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter().filter(|f| f.is_indexed())
    }

    pub(crate) fn validators(&self) -> &[ModelValidator] {
        &self.validators
    }
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("name", &self.name)
            .field("fields", &self.fields)
            .field("validators", &self.validators.len())
            .finish()
    }
}

///
/// SchemaBuilder
///

pub struct SchemaBuilder {
    name: String,
    fields: Vec<FieldDescriptor>,
    validators: Vec<ModelValidator>,
}

impl SchemaBuilder {
    #[must_use]
    pub fn field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    #[must_use]
    pub fn validator(mut self, validator: ModelValidator) -> Self {
        self.validators.push(validator);
        self
    }

    pub fn build(self) -> Result<Arc<Schema>, SchemaError> {
        if self.name.is_empty() || self.name.contains(SEPARATOR) {
            return Err(SchemaError::InvalidModelName(self.name));
        }

        for (position, field) in self.fields.iter().enumerate() {
            let name = field.name();
            if !valid_field_name(name) {
                return Err(SchemaError::InvalidFieldName(name.to_string()));
            }
            if self.fields[..position].iter().any(|f| f.name() == name) {
                return Err(SchemaError::DuplicateField(name.to_string()));
            }
            if field.is_unique() && !field.is_indexed() {
                return Err(SchemaError::UniqueNotIndexed(name.to_string()));
            }
            if let FieldKind::Reference { model } = field.kind()
                && (model.is_empty() || model.contains(SEPARATOR))
            {
                return Err(SchemaError::InvalidReference {
                    field: name.to_string(),
                    model: model.clone(),
                });
            }
            if (field.is_auto_now() || field.is_auto_now_add())
                && !matches!(field.kind(), FieldKind::DateTime | FieldKind::Date)
            {
                return Err(SchemaError::AutoStampNotTemporal(name.to_string()));
            }
        }

        let key = ModelKey::new(self.name.clone());
        Ok(Arc::new(Schema {
            name: self.name,
            key,
            fields: self.fields,
            validators: self.validators,
        }))
    }
}

/// Field names share the key namespace with record ids and reserved
/// segments; reject anything that could collide.
fn valid_field_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('_')
        && !name.contains(SEPARATOR)
        && !name.bytes().all(|b| b.is_ascii_digit())
        && !RESERVED_FIELD_NAMES.contains(&name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_ordered_schema() {
        let schema = Schema::builder("Person")
            .field(FieldDescriptor::text("first_name"))
            .field(FieldDescriptor::int("age"))
            .build()
            .unwrap();

        let names: Vec<&str> = schema.fields().map(FieldDescriptor::name).collect();
        assert_eq!(names, ["first_name", "age"]);
        assert!(schema.field("age").is_some());
        assert!(schema.field("missing").is_none());
    }

    #[test]
    fn rejects_reserved_and_malformed_field_names() {
        for bad in ["all", "id", "_indices", "has:separator", "42", ""] {
            let result = Schema::builder("M").field(FieldDescriptor::text(bad)).build();
            assert!(result.is_err(), "`{bad}` should be rejected");
        }
    }

    #[test]
    fn rejects_duplicate_fields() {
        let result = Schema::builder("M")
            .field(FieldDescriptor::text("name"))
            .field(FieldDescriptor::int("name"))
            .build();
        assert!(matches!(result, Err(SchemaError::DuplicateField(_))));
    }

    #[test]
    fn rejects_unique_without_index() {
        let result = Schema::builder("M")
            .field(FieldDescriptor::text("email").unindexed().unique())
            .build();
        assert!(matches!(result, Err(SchemaError::UniqueNotIndexed(_))));
    }

    #[test]
    fn rejects_auto_stamps_on_non_temporal_fields() {
        let result = Schema::builder("M")
            .field(FieldDescriptor::text("name").auto_now())
            .build();
        assert!(matches!(result, Err(SchemaError::AutoStampNotTemporal(_))));
    }

    #[test]
    fn resolves_reference_storage_names() {
        let schema = Schema::builder("Privilege")
            .field(FieldDescriptor::reference("session", "Session"))
            .build()
            .unwrap();
        let field = schema.field_by_storage_name("session_id").unwrap();
        assert_eq!(field.name(), "session");
    }
}
