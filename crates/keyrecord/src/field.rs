//! Field descriptors: typed, shared schema metadata.
//!
//! A descriptor is immutable configuration bound to one model field. It
//! holds no per-instance state; records consult it for encoding, decoding,
//! scoring, and validation. The store representation is always a string and
//! round-trips exactly for every legal value of the declared kind.

use crate::value::Value;
use chrono::{DateTime, NaiveDate, TimeDelta};
use std::fmt;
use thiserror::Error as ThisError;

/// Seconds per day, for date scores.
const DAY_SECS: i64 = 86_400;

///
/// FieldKind
///
/// Runtime type shape of one field. `Counter` behaves as an integer whose
/// mutations are atomic store-side increments; `Reference` stores the id of
/// a record of the named model.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum FieldKind {
    Text,
    Int,
    Float,
    Bool,
    DateTime,
    Date,
    Counter,
    List,
    Reference { model: String },
}

impl FieldKind {
    /// Kinds that may carry a sorted-set (range) index: their encoding has a
    /// total numeric order usable as a score.
    #[must_use]
    pub const fn range_scored(&self) -> bool {
        matches!(
            self,
            Self::Int | Self::Float | Self::DateTime | Self::Date | Self::Counter
        )
    }

    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Int => "int",
            Self::Float => "float",
            Self::Bool => "bool",
            Self::DateTime => "datetime",
            Self::Date => "date",
            Self::Counter => "counter",
            Self::List => "list",
            Self::Reference { .. } => "reference",
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reference { model } => write!(f, "reference<{model}>"),
            other => write!(f, "{}", other.label()),
        }
    }
}

///
/// FieldCodecError
///

#[derive(Debug, ThisError)]
pub enum FieldCodecError {
    #[error("field `{field}` expects a {expected} value, got {actual}")]
    WrongType {
        field: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("field `{field}`: {reason}")]
    Malformed { field: String, reason: String },
}

impl FieldCodecError {
    fn malformed(field: &str, reason: impl Into<String>) -> Self {
        Self::Malformed {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

/// Per-field custom validator. Returns human-readable messages, empty on
/// success.
pub type FieldValidator = fn(&Value) -> Vec<String>;

///
/// FieldDescriptor
///
/// Immutable field definition: kind, index participation, and validation
/// options. Shared across all records of a schema.
///

#[derive(Clone)]
pub struct FieldDescriptor {
    name: String,
    kind: FieldKind,
    indexed: bool,
    required: bool,
    unique: bool,
    max_length: Option<usize>,
    default: Option<Value>,
    validator: Option<FieldValidator>,
    auto_now: bool,
    auto_now_add: bool,
}

impl FieldDescriptor {
    fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            indexed: true,
            required: false,
            unique: false,
            max_length: None,
            default: None,
            validator: None,
            auto_now: false,
            auto_now_add: false,
        }
    }

    // ------------------------------------------------------------------
    // Constructors, one per kind
    // ------------------------------------------------------------------

    #[must_use]
    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Text)
    }

    #[must_use]
    pub fn int(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Int)
    }

    #[must_use]
    pub fn float(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Float)
    }

    #[must_use]
    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Bool)
    }

    #[must_use]
    pub fn datetime(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::DateTime)
    }

    #[must_use]
    pub fn date(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Date)
    }

    /// Counters are store-side truth: they cannot be assigned, only
    /// incremented, and they never participate in indexes.
    #[must_use]
    pub fn counter(name: impl Into<String>) -> Self {
        let mut field = Self::new(name, FieldKind::Counter);
        field.indexed = false;
        field.default = Some(Value::Int(0));
        field
    }

    #[must_use]
    pub fn list(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::List)
    }

    /// A reference to a record of `model`. Stored under `{name}_id`.
    #[must_use]
    pub fn reference(name: impl Into<String>, model: impl Into<String>) -> Self {
        Self::new(
            name,
            FieldKind::Reference {
                model: model.into(),
            },
        )
    }

    // ------------------------------------------------------------------
    // Options
    // ------------------------------------------------------------------

    /// Exclude the field from indexing. Unindexed fields cannot appear in
    /// query clauses.
    #[must_use]
    pub const fn unindexed(mut self) -> Self {
        self.indexed = false;
        self
    }

    #[must_use]
    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Validate value uniqueness across the model on save. Requires an
    /// index; enforced at schema build time.
    #[must_use]
    pub const fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    #[must_use]
    pub const fn max_length(mut self, limit: usize) -> Self {
        self.max_length = Some(limit);
        self
    }

    #[must_use]
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    #[must_use]
    pub const fn validator(mut self, validator: FieldValidator) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Stamp the field with the current UTC time on every save. Only legal
    /// on datetime and date fields; enforced at schema build time.
    #[must_use]
    pub const fn auto_now(mut self) -> Self {
        self.auto_now = true;
        self
    }

    /// Stamp the field with the current UTC time on first save only.
    #[must_use]
    pub const fn auto_now_add(mut self) -> Self {
        self.auto_now_add = true;
        self
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the hash field the value is stored under. References store
    /// the target id under `{name}_id`.
    #[must_use]
    pub fn storage_name(&self) -> String {
        match self.kind {
            FieldKind::Reference { .. } => format!("{}_id", self.name),
            _ => self.name.clone(),
        }
    }

    #[must_use]
    pub const fn kind(&self) -> &FieldKind {
        &self.kind
    }

    #[must_use]
    pub const fn is_indexed(&self) -> bool {
        self.indexed
    }

    #[must_use]
    pub const fn is_required(&self) -> bool {
        self.required
    }

    #[must_use]
    pub const fn is_unique(&self) -> bool {
        self.unique
    }

    #[must_use]
    pub const fn is_counter(&self) -> bool {
        matches!(self.kind, FieldKind::Counter)
    }

    #[must_use]
    pub const fn is_list(&self) -> bool {
        matches!(self.kind, FieldKind::List)
    }

    /// Whether the field maintains a sorted-set index alongside its equality
    /// index.
    #[must_use]
    pub const fn is_range_indexed(&self) -> bool {
        self.indexed && self.kind.range_scored()
    }

    #[must_use]
    pub const fn is_auto_now(&self) -> bool {
        self.auto_now
    }

    #[must_use]
    pub const fn is_auto_now_add(&self) -> bool {
        self.auto_now_add
    }

    #[must_use]
    pub const fn default(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    /// Whether the value matches the declared kind.
    #[must_use]
    pub const fn accepts(&self, value: &Value) -> bool {
        matches!(
            (&self.kind, value),
            (FieldKind::Text, Value::Text(_))
                | (FieldKind::Int | FieldKind::Counter, Value::Int(_))
                | (FieldKind::Float, Value::Float(_))
                | (FieldKind::Bool, Value::Bool(_))
                | (FieldKind::DateTime, Value::DateTime(_))
                | (FieldKind::Date, Value::Date(_))
                | (FieldKind::List, Value::List(_))
                | (FieldKind::Reference { .. }, Value::Reference(_))
        )
    }

    // ------------------------------------------------------------------
    // Codec
    // ------------------------------------------------------------------

    /// Encode a value into its store string. Fails only on a kind mismatch
    /// or a non-finite float.
    pub fn encode(&self, value: &Value) -> Result<String, FieldCodecError> {
        if !self.accepts(value) {
            return Err(FieldCodecError::WrongType {
                field: self.name.clone(),
                expected: self.kind.label(),
                actual: value.kind_name(),
            });
        }
        match value {
            Value::Text(v) | Value::Reference(v) => Ok(v.clone()),
            Value::Int(v) => Ok(v.to_string()),
            Value::Float(v) => {
                if !v.is_finite() {
                    return Err(FieldCodecError::malformed(&self.name, "not a finite number"));
                }
                // shortest round-trip formatting keeps full precision
                Ok(format!("{v}"))
            }
            Value::Bool(v) => Ok(if *v { "1" } else { "0" }.to_string()),
            Value::DateTime(v) => {
                let utc = v.and_utc();
                Ok(format!(
                    "{}.{:06}",
                    utc.timestamp(),
                    utc.timestamp_subsec_micros()
                ))
            }
            Value::Date(v) => {
                let days = v.signed_duration_since(NaiveDate::default()).num_days();
                Ok((days * DAY_SECS).to_string())
            }
            Value::List(_) => Err(FieldCodecError::malformed(
                &self.name,
                "list fields are stored element-wise, not as one payload",
            )),
        }
    }

    /// Encode one list element. Elements are stored as-is.
    pub fn encode_element(&self, element: &str) -> Result<String, FieldCodecError> {
        if self.is_list() {
            Ok(element.to_string())
        } else {
            Err(FieldCodecError::malformed(&self.name, "not a list field"))
        }
    }

    /// Decode a store string back into a value of the declared kind.
    pub fn decode(&self, raw: &str) -> Result<Value, FieldCodecError> {
        match &self.kind {
            FieldKind::Text => Ok(Value::Text(raw.to_string())),
            FieldKind::Reference { .. } => Ok(Value::Reference(raw.to_string())),
            FieldKind::Int | FieldKind::Counter => raw
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|_| FieldCodecError::malformed(&self.name, format!("`{raw}` is not an integer"))),
            FieldKind::Float => raw
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|_| FieldCodecError::malformed(&self.name, format!("`{raw}` is not a float"))),
            FieldKind::Bool => match raw {
                "1" => Ok(Value::Bool(true)),
                "0" => Ok(Value::Bool(false)),
                _ => Err(FieldCodecError::malformed(
                    &self.name,
                    format!("`{raw}` is not a boolean flag"),
                )),
            },
            FieldKind::DateTime => {
                let (secs, micros) = raw.split_once('.').ok_or_else(|| {
                    FieldCodecError::malformed(&self.name, format!("`{raw}` is not a timestamp"))
                })?;
                let secs = secs.parse::<i64>().map_err(|_| {
                    FieldCodecError::malformed(&self.name, format!("`{raw}` is not a timestamp"))
                })?;
                let micros = micros.parse::<u32>().map_err(|_| {
                    FieldCodecError::malformed(&self.name, format!("`{raw}` is not a timestamp"))
                })?;
                DateTime::from_timestamp(secs, micros.saturating_mul(1_000))
                    .map(|dt| Value::DateTime(dt.naive_utc()))
                    .ok_or_else(|| {
                        FieldCodecError::malformed(&self.name, "timestamp out of range")
                    })
            }
            FieldKind::Date => {
                let secs = raw.parse::<i64>().map_err(|_| {
                    FieldCodecError::malformed(&self.name, format!("`{raw}` is not a date"))
                })?;
                NaiveDate::default()
                    .checked_add_signed(TimeDelta::seconds(secs))
                    .map(Value::Date)
                    .ok_or_else(|| FieldCodecError::malformed(&self.name, "date out of range"))
            }
            FieldKind::List => Err(FieldCodecError::malformed(
                &self.name,
                "list fields are stored element-wise, not as one payload",
            )),
        }
    }

    /// Numeric score for the sorted-set index.
    pub fn score(&self, value: &Value) -> Result<f64, FieldCodecError> {
        if !self.kind.range_scored() {
            return Err(FieldCodecError::malformed(
                &self.name,
                "kind has no numeric order",
            ));
        }
        if !self.accepts(value) {
            return Err(FieldCodecError::WrongType {
                field: self.name.clone(),
                expected: self.kind.label(),
                actual: value.kind_name(),
            });
        }
        #[allow(clippy::cast_precision_loss)]
        let score = match value {
            Value::Int(v) => *v as f64,
            Value::Float(v) => *v,
            Value::DateTime(v) => {
                let utc = v.and_utc();
                utc.timestamp() as f64 + f64::from(utc.timestamp_subsec_micros()) / 1e6
            }
            Value::Date(v) => {
                (v.signed_duration_since(NaiveDate::default()).num_days() * DAY_SECS) as f64
            }
            _ => unreachable!("accepts() gates the variants"),
        };
        Ok(score)
    }

    // ------------------------------------------------------------------
    // Validation
    // ------------------------------------------------------------------

    /// Validate a value (or its absence). Never fails internally; returns an
    /// empty list on success. Uniqueness is checked by the record, which has
    /// store access.
    #[must_use]
    pub fn validate(&self, value: Option<&Value>) -> Vec<String> {
        let mut messages = Vec::new();

        let Some(value) = value else {
            if self.required {
                messages.push("required".to_string());
            }
            return messages;
        };

        if !self.accepts(value) {
            messages.push("bad type".to_string());
            return messages;
        }

        match value {
            Value::Text(v) => {
                if self.required && v.trim().is_empty() {
                    messages.push("required".to_string());
                }
                if let Some(limit) = self.max_length
                    && v.chars().count() > limit
                {
                    messages.push("exceeds max length".to_string());
                }
            }
            Value::Float(v) => {
                if !v.is_finite() {
                    messages.push("not a finite number".to_string());
                }
            }
            Value::List(v) => {
                if self.required && v.is_empty() {
                    messages.push("required".to_string());
                }
            }
            Value::Reference(v) => {
                if self.required && v.is_empty() {
                    messages.push("required".to_string());
                }
            }
            _ => {}
        }

        if let Some(validator) = self.validator {
            messages.extend(validator(value));
        }

        messages
    }
}

impl fmt::Debug for FieldDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDescriptor")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("indexed", &self.indexed)
            .field("required", &self.required)
            .field("unique", &self.unique)
            .finish_non_exhaustive()
    }
}
