//! Core runtime for keyrecord: typed schemas, records, secondary indexes,
//! lazy query sets, and a store-backed mutex, all projected onto the
//! primitive commands of a remote key-value store.
//!
//! The store itself is abstracted behind [`store::Store`]; an in-process
//! [`store::MemoryStore`] implements the full command surface for tests and
//! embedding. Everything above that seam issues synchronous, blocking store
//! calls and keeps no client-side cache: the store is the single source of
//! truth and the only synchronization point.
#![warn(unreachable_pub)]

pub mod db;
pub mod error;
pub mod field;
pub mod key;
pub mod manager;
pub mod mutex;
pub mod query;
pub mod record;
pub mod schema;
pub mod store;
pub mod value;

// test
#[cfg(test)]
pub(crate) mod test_support;

///
/// Prelude
///
/// Prelude contains only domain vocabulary.
/// No store internals or helpers are re-exported here.
///

pub mod prelude {
    pub use crate::{
        db::{Db, DbConfig},
        error::{Error, FieldErrors, ValidationError},
        field::{FieldDescriptor, FieldKind},
        manager::Manager,
        mutex::Mutex,
        query::{Cond, ModelSet},
        record::Record,
        schema::{Schema, SchemaBuilder},
        value::Value,
    };
}

pub use error::Error;
