//! Lazy query sets.
//!
//! A [`ModelSet`] collects equality, exclusion, and range clauses without
//! touching the store; chaining is infallible. Every evaluation entry point
//! (`ids`, `fetch`, `count`, `first`, `contains`) resolves the clauses
//! against the indexes at that moment, so two evaluations of the same set
//! can observe different data.
//!
//! Clause errors surface at evaluation: filtering on an unindexed field is
//! [`Error::AttributeNotIndexed`], and a value a field cannot encode is a
//! validation failure.

use crate::{
    db::Db,
    error::{Error, Result, ValidationError},
    field::{FieldCodecError, FieldDescriptor},
    record::Record,
    schema::Schema,
    store::ScoreRange,
    value::Value,
};
use std::{collections::BTreeSet, sync::Arc};
use tracing::trace;

///
/// Cond
///
/// Range condition over a score-indexed field.
///

#[derive(Clone, Debug)]
pub enum Cond {
    Lt(Value),
    Le(Value),
    Gt(Value),
    Ge(Value),
    Between(Value, Value),
}

#[derive(Clone, Copy, Debug)]
struct Window {
    offset: usize,
    count: usize,
}

#[derive(Clone, Debug)]
struct Ordering {
    field: String,
    descending: bool,
}

///
/// ModelSet
///
/// Chainable description of a subset of one model's records. Cheap to
/// clone; holds no store data.
///

#[derive(Clone)]
pub struct ModelSet {
    db: Db,
    schema: Arc<Schema>,
    filters: Vec<(String, Value)>,
    excludes: Vec<(String, Value)>,
    zfilters: Vec<(String, Cond)>,
    ordering: Option<Ordering>,
    window: Option<Window>,
}

impl ModelSet {
    pub(crate) fn over(db: Db, schema: Arc<Schema>) -> Self {
        Self {
            db,
            schema,
            filters: Vec::new(),
            excludes: Vec::new(),
            zfilters: Vec::new(),
            ordering: None,
            window: None,
        }
    }

    // ------------------------------------------------------------------
    // Clause collection (infallible, lazy)
    // ------------------------------------------------------------------

    /// Keep only records whose field equals `value`.
    #[must_use]
    pub fn filter(&self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        let mut next = self.clone();
        next.filters.push((field.into(), value.into()));
        next
    }

    /// Drop records whose field equals `value`.
    #[must_use]
    pub fn exclude(&self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        let mut next = self.clone();
        next.excludes.push((field.into(), value.into()));
        next
    }

    /// Keep only records whose score-indexed field satisfies `cond`.
    #[must_use]
    pub fn zfilter(&self, field: impl Into<String>, cond: Cond) -> Self {
        let mut next = self.clone();
        next.zfilters.push((field.into(), cond));
        next
    }

    /// Order results by `field`, ascending.
    #[must_use]
    pub fn order(&self, field: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.ordering = Some(Ordering {
            field: field.into(),
            descending: false,
        });
        next
    }

    /// Order results by `field`, descending.
    #[must_use]
    pub fn order_desc(&self, field: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.ordering = Some(Ordering {
            field: field.into(),
            descending: true,
        });
        next
    }

    /// Keep at most `count` results.
    #[must_use]
    pub fn limit(&self, count: usize) -> Self {
        self.limit_at(count, 0)
    }

    /// Keep at most `count` results, skipping the first `offset`.
    #[must_use]
    pub fn limit_at(&self, count: usize, offset: usize) -> Self {
        let mut next = self.clone();
        next.window = Some(Window { offset, count });
        next
    }

    // ------------------------------------------------------------------
    // Evaluation
    // ------------------------------------------------------------------

    /// Resolve the clauses to matching ids, ordered and windowed.
    pub fn ids(&self) -> Result<Vec<String>> {
        let key = self.schema.key();
        let store = self.db.store();

        let mut candidates: BTreeSet<String> = store.set_members(&key.membership())?;

        // clauses are resolved even once the candidate set is empty, so a
        // bad clause always errors regardless of data
        for (field, value) in &self.filters {
            let (descriptor, encoded) = self.equality_clause(field, value)?;
            if candidates.is_empty() {
                continue;
            }
            let members =
                store.set_members(&key.equality_index(&descriptor.storage_name(), &encoded))?;
            candidates.retain(|id| members.contains(id));
        }

        for (field, value) in &self.excludes {
            let (descriptor, encoded) = self.equality_clause(field, value)?;
            if candidates.is_empty() {
                continue;
            }
            let members =
                store.set_members(&key.equality_index(&descriptor.storage_name(), &encoded))?;
            candidates.retain(|id| !members.contains(id));
        }

        for (field, cond) in &self.zfilters {
            let (descriptor, range) = self.range_clause(field, cond)?;
            if candidates.is_empty() {
                continue;
            }
            let hits: BTreeSet<String> = store
                .zset_range_by_score(&key.range_index(&descriptor.storage_name()), range)?
                .into_iter()
                .collect();
            candidates.retain(|id| hits.contains(id));
        }

        let mut ids: Vec<String> = candidates.into_iter().collect();
        self.sort(&mut ids)?;

        if let Some(window) = self.window {
            ids = ids.into_iter().skip(window.offset).take(window.count).collect();
        }

        trace!(model = self.schema.name(), matched = ids.len(), "query evaluated");
        Ok(ids)
    }

    /// Resolve and load the matching records. Ids whose primary hash has
    /// vanished since the index read are skipped.
    pub fn fetch(&self) -> Result<Vec<Record>> {
        let key = self.schema.key();
        let store = self.db.store();

        let mut records = Vec::new();
        for id in self.ids()? {
            let hash = store.hash_get_all(&key.primary(&id))?;
            if hash.is_empty() {
                continue;
            }
            records.push(Record::from_stored(
                self.db.clone(),
                Arc::clone(&self.schema),
                id,
                hash,
            )?);
        }
        Ok(records)
    }

    pub fn count(&self) -> Result<usize> {
        Ok(self.ids()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.ids()?.is_empty())
    }

    /// First matching record in the set's order, if any.
    pub fn first(&self) -> Result<Option<Record>> {
        let offset = self.window.map_or(0, |w| w.offset);
        Ok(self.limit_at(1, offset).fetch()?.into_iter().next())
    }

    /// Whether a saved record matches the set's clauses.
    pub fn contains(&self, record: &Record) -> Result<bool> {
        let Some(id) = record.id() else {
            return Ok(false);
        };
        if record.schema().name() != self.schema.name() {
            return Ok(false);
        }
        Ok(self.ids()?.iter().any(|candidate| candidate == id))
    }

    // ------------------------------------------------------------------
    // Clause resolution
    // ------------------------------------------------------------------

    fn descriptor(&self, field: &str) -> Result<&FieldDescriptor> {
        self.schema.field(field).ok_or_else(|| {
            ValidationError::model(format!(
                "unknown field `{field}` on model `{}`",
                self.schema.name()
            ))
            .into()
        })
    }

    fn equality_clause(&self, field: &str, value: &Value) -> Result<(&FieldDescriptor, String)> {
        let descriptor = self.descriptor(field)?;
        if !descriptor.is_indexed() {
            return Err(self.not_indexed(field));
        }
        let encoded = if let Value::Text(element) = value
            && descriptor.is_list()
        {
            // list membership matches one element
            descriptor.encode_element(element).map_err(codec_clause)?
        } else {
            descriptor.encode(value).map_err(codec_clause)?
        };
        Ok((descriptor, encoded))
    }

    fn range_clause(&self, field: &str, cond: &Cond) -> Result<(&FieldDescriptor, ScoreRange)> {
        let descriptor = self.descriptor(field)?;
        if !descriptor.is_range_indexed() {
            return Err(self.not_indexed(field));
        }
        let score = |value: &Value| descriptor.score(value).map_err(codec_clause);
        let range = match cond {
            Cond::Lt(value) => ScoreRange::lt(score(value)?),
            Cond::Le(value) => ScoreRange::le(score(value)?),
            Cond::Gt(value) => ScoreRange::gt(score(value)?),
            Cond::Ge(value) => ScoreRange::ge(score(value)?),
            Cond::Between(min, max) => ScoreRange::between(score(min)?, score(max)?),
        };
        Ok((descriptor, range))
    }

    fn not_indexed(&self, field: &str) -> Error {
        Error::AttributeNotIndexed {
            model: self.schema.name().to_string(),
            field: field.to_string(),
        }
    }

    // ------------------------------------------------------------------
    // Ordering
    // ------------------------------------------------------------------

    /// Without an explicit ordering, results come back in ascending
    /// numeric id order (creation order).
    fn sort(&self, ids: &mut Vec<String>) -> Result<()> {
        let Some(ordering) = &self.ordering else {
            ids.sort_by(|a, b| match (a.parse::<u64>(), b.parse::<u64>()) {
                (Ok(a), Ok(b)) => a.cmp(&b),
                _ => a.cmp(b),
            });
            return Ok(());
        };

        let descriptor = self.descriptor(&ordering.field)?;
        if !descriptor.is_indexed() {
            return Err(self.not_indexed(&ordering.field));
        }

        let key = self.schema.key();
        let store = self.db.store();

        if descriptor.is_range_indexed() {
            let range_key = key.range_index(&descriptor.storage_name());
            let mut scored: Vec<(f64, String)> = Vec::with_capacity(ids.len());
            for id in ids.drain(..) {
                let score = store
                    .zset_score(&range_key, &id)?
                    .unwrap_or(f64::NEG_INFINITY);
                scored.push((score, id));
            }
            scored.sort_by(|(sa, ia), (sb, ib)| sa.total_cmp(sb).then_with(|| ia.cmp(ib)));
            ids.extend(scored.into_iter().map(|(_, id)| id));
        } else {
            let storage_name = descriptor.storage_name();
            let mut keyed: Vec<(String, String)> = Vec::with_capacity(ids.len());
            for id in ids.drain(..) {
                let sort_key = store
                    .hash_get(&key.primary(&id), &storage_name)?
                    .unwrap_or_default();
                keyed.push((sort_key, id));
            }
            keyed.sort();
            ids.extend(keyed.into_iter().map(|(_, id)| id));
        }

        if ordering.descending {
            ids.reverse();
        }
        Ok(())
    }
}

impl std::fmt::Debug for ModelSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelSet")
            .field("model", &self.schema.name())
            .field("filters", &self.filters)
            .field("excludes", &self.excludes)
            .field("zfilters", &self.zfilters)
            .field("ordering", &self.ordering)
            .field("window", &self.window)
            .finish_non_exhaustive()
    }
}

fn codec_clause(err: FieldCodecError) -> Error {
    Error::Validation(ValidationError::Model(err.to_string()))
}
