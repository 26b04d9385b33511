//! Store key construction.
//!
//! Every key the engine touches follows the `{model}:{segment}` scheme.
//! Value segments in equality-index keys are base64-encoded so arbitrary
//! field values can never collide with the separator or with reserved
//! segments.

use crate::error::{Error, Result};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use derive_more::Display;

/// Key separator. Field names are rejected at schema build time if they
/// contain it.
pub const SEPARATOR: char = ':';

/// Reserved segment: membership set of all saved ids for a model.
pub(crate) const ALL_SEGMENT: &str = "all";
/// Reserved segment: the model's id allocation sequence.
pub(crate) const ID_SEQ_SEGMENT: &str = "_id_seq";
/// Reserved segment: per-record equality-index housekeeping set.
pub(crate) const INDICES_SEGMENT: &str = "_indices";
/// Reserved segment: per-record range-index housekeeping set.
pub(crate) const ZINDICES_SEGMENT: &str = "_zindices";
/// Reserved segment: per-record mutex lease.
pub(crate) const LOCK_SEGMENT: &str = "_lock";

///
/// ModelKey
///
/// Key factory for one model namespace. Cheap to construct; holds only the
/// model name.
///

#[derive(Clone, Debug, Display, Eq, PartialEq)]
#[display("{name}")]
pub struct ModelKey {
    name: String,
}

impl ModelKey {
    #[must_use]
    pub fn new(model: impl Into<String>) -> Self {
        Self { name: model.into() }
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.name
    }

    /// Primary record hash: `{model}:{id}`.
    #[must_use]
    pub fn primary(&self, id: &str) -> String {
        format!("{}{SEPARATOR}{id}", self.name)
    }

    /// Membership set of all saved ids: `{model}:all`.
    #[must_use]
    pub fn membership(&self) -> String {
        format!("{}{SEPARATOR}{ALL_SEGMENT}", self.name)
    }

    /// Id allocation sequence: `{model}:_id_seq`.
    #[must_use]
    pub fn id_sequence(&self) -> String {
        format!("{}{SEPARATOR}{ID_SEQ_SEGMENT}", self.name)
    }

    /// Equality index for one encoded field value:
    /// `{model}:{field}:{b64(value)}`.
    #[must_use]
    pub fn equality_index(&self, field: &str, encoded_value: &str) -> String {
        let value = URL_SAFE_NO_PAD.encode(encoded_value);
        format!("{}{SEPARATOR}{field}{SEPARATOR}{value}", self.name)
    }

    /// Range index (sorted set) for one field: `{model}:{field}`.
    #[must_use]
    pub fn range_index(&self, field: &str) -> String {
        format!("{}{SEPARATOR}{field}", self.name)
    }

    /// List storage for one record field: `{model}:{id}:{field}`.
    #[must_use]
    pub fn list(&self, id: &str, field: &str) -> String {
        format!("{}{SEPARATOR}{id}{SEPARATOR}{field}", self.name)
    }

    /// Housekeeping set of equality-index keys the record occupies.
    #[must_use]
    pub fn indices(&self, id: &str) -> String {
        format!("{}{SEPARATOR}{id}{SEPARATOR}{INDICES_SEGMENT}", self.name)
    }

    /// Housekeeping set of range-index keys the record occupies.
    #[must_use]
    pub fn zindices(&self, id: &str) -> String {
        format!("{}{SEPARATOR}{id}{SEPARATOR}{ZINDICES_SEGMENT}", self.name)
    }

    /// Mutex lease guarding the record's non-atomic write section.
    #[must_use]
    pub fn lock(&self, id: &str) -> String {
        format!("{}{SEPARATOR}{id}{SEPARATOR}{LOCK_SEGMENT}", self.name)
    }
}

/// Split a raw primary key `{model}:{id}` into its parts.
///
/// Fails with [`Error::BadKey`] when the shape is wrong or the id segment is
/// not a decimal id.
pub fn parse_primary(key: &str) -> Result<(&str, &str)> {
    let (model, id) = key
        .split_once(SEPARATOR)
        .ok_or_else(|| Error::BadKey(format!("`{key}` has no separator")))?;
    if model.is_empty() {
        return Err(Error::BadKey(format!("`{key}` has an empty model segment")));
    }
    if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::BadKey(format!("`{key}` has no record id segment")));
    }
    Ok((model, id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_shapes() {
        let key = ModelKey::new("Person");
        assert_eq!(key.primary("7"), "Person:7");
        assert_eq!(key.membership(), "Person:all");
        assert_eq!(key.id_sequence(), "Person:_id_seq");
        assert_eq!(key.range_index("age"), "Person:age");
        assert_eq!(key.lock("7"), "Person:7:_lock");
        assert_eq!(key.indices("7"), "Person:7:_indices");
        assert_eq!(key.list("7", "tags"), "Person:7:tags");
    }

    #[test]
    fn equality_index_encodes_value_segment() {
        let key = ModelKey::new("Person");
        let encoded = key.equality_index("first_name", "Granny");
        assert_eq!(
            encoded,
            format!("Person:first_name:{}", URL_SAFE_NO_PAD.encode("Granny"))
        );
        // values containing the separator cannot collide with other keys
        let tricky = key.equality_index("first_name", "a:b");
        assert!(!tricky.ends_with(":a:b"));
    }

    #[test]
    fn parse_primary_accepts_well_formed_keys() {
        assert_eq!(parse_primary("Person:42").unwrap(), ("Person", "42"));
    }

    #[test]
    fn parse_primary_rejects_malformed_keys() {
        for bad in ["Person", ":42", "Person:", "Person:abc"] {
            assert!(matches!(parse_primary(bad), Err(Error::BadKey(_))), "{bad}");
        }
    }
}
