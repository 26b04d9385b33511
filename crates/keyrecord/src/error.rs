//! Shared error taxonomy for the engine.
//!
//! Callers must be able to distinguish three situations structurally:
//! "no such record" (`Error::MissingId`, or an empty query result),
//! "store unreachable" (`Error::Store`), and "input invalid"
//! (`Error::Validation`). Store failures are never swallowed or rewrapped
//! into a catch-all.

use crate::{mutex::LockError, store::StoreError};
use std::{
    collections::BTreeMap,
    fmt::{self, Display},
};
use thiserror::Error as ThisError;

///
/// Error
///
/// Top-level error for every fallible engine operation.
///

#[derive(Debug, ThisError)]
pub enum Error {
    /// The record is not internally consistent, or an input value was
    /// rejected before any store write.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The operation needs a persisted identity and the record has none.
    #[error("record has no id: it was never saved")]
    MissingId,

    /// A query clause referenced a field without a usable index.
    /// Filtering never silently falls back to a full scan.
    #[error("attribute `{field}` is not indexed on model `{model}`")]
    AttributeNotIndexed { model: String, field: String },

    /// A store key or stored payload could not be decoded.
    #[error("bad key: {0}")]
    BadKey(String),

    /// Store-communication failure, propagated unchanged.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Mutex acquisition failure; a distinct, catchable condition.
    #[error(transparent)]
    Lock(#[from] LockError),
}

/// Engine result alias.
pub type Result<T, E = Error> = std::result::Result<T, E>;

///
/// ValidationError
///
/// `Fields` carries per-field detail whenever it exists; `Model` covers
/// failures with no single owning field (unknown field names, counter
/// assignment, bad filter inputs).
///

#[derive(Debug, ThisError)]
pub enum ValidationError {
    #[error("{0}")]
    Model(String),

    #[error("validation failed: {0}")]
    Fields(FieldErrors),
}

impl ValidationError {
    pub(crate) fn model(message: impl Into<String>) -> Self {
        Self::Model(message.into())
    }
}

///
/// FieldErrors
///
/// Ordered mapping of field name to its validation messages. Failures are
/// always aggregated here, never raised one at a time.
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one message for a field.
    pub fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_default().push(message.into());
    }

    /// Append every message in `messages` for a field.
    pub fn extend_field<I>(&mut self, field: impl Into<String>, messages: I)
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let entry = self.0.entry(field.into()).or_default();
        entry.extend(messages.into_iter().map(Into::into));
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of fields that have at least one message.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn messages(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }
}

impl Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, messages) in &self.0 {
            if !first {
                write!(f, "; ")?;
            }
            first = false;
            write!(f, "{field}: {}", messages.join(", "))?;
        }
        Ok(())
    }
}

impl From<FieldErrors> for ValidationError {
    fn from(errors: FieldErrors) -> Self {
        Self::Fields(errors)
    }
}

impl From<FieldErrors> for Error {
    fn from(errors: FieldErrors) -> Self {
        Self::Validation(ValidationError::Fields(errors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_errors_aggregate_in_field_order() {
        let mut errors = FieldErrors::new();
        errors.push("name", "required");
        errors.push("age", "bad type");
        errors.push("name", "exceeds max length");

        assert_eq!(errors.len(), 2);
        assert_eq!(
            errors.messages("name").unwrap(),
            &["required", "exceeds max length"]
        );
        assert_eq!(
            errors.to_string(),
            "age: bad type; name: required, exceeds max length"
        );
    }

    #[test]
    fn field_errors_wrap_into_validation_error() {
        let mut errors = FieldErrors::new();
        errors.push("age", "required");

        let err = Error::from(errors);
        match err {
            Error::Validation(ValidationError::Fields(inner)) => assert_eq!(inner.len(), 1),
            other => panic!("unexpected error: {other}"),
        }
    }
}
