//! # Tabula - Typed Tables over an Ordered Key-Value Store
//!
//! Tabula is a typed, schema-aware tabular layer on top of an embedded,
//! transactional, ordered key-value store with named sub-databases. It
//! exposes tables of rows (tuples of named, typed fields) with primary and
//! secondary indexes, MVCC read transactions, one serialized write
//! transaction, schema definition, and positioned cursors with range
//! limits and row-level filters.
//!
//! The hard engineering lives in the index, cursor, and row-maintenance
//! engine:
//!
//! - correct ordering across signed/unsigned/float/binary key types
//! - safe handling of over-long keys via partial hashing ("folding")
//! - descending-cursor semantics over a natively ascending store
//! - crash-consistent multi-index mutation
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │  Tables (insert/upsert/update/delete)        │
//! ├───────────────────────┬──────────────────────┤
//! │  Cursors (seek, clip, │  Filters (predicate  │
//! │  filter, mutate)      │  trees over rows)    │
//! ├───────────────────────┴──────────────────────┤
//! │  Schema (descriptors, bindings, sub-DB flags)│
//! ├──────────────────────────────────────────────┤
//! │  Key codec + comparator registry             │
//! ├───────────────────┬──────────────────────────┤
//! │  Row tuples       │  KV engine (in-memory    │
//! │  (zero-copy)      │  MVCC, named sub-DBs)    │
//! └───────────────────┴──────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```
//! use tabula::{ColType, ColumnName, Db, IndexKind, RowBuilder, TableName, TableSchema, Value};
//!
//! # fn main() -> eyre::Result<()> {
//! let schema = TableSchema::builder("users")
//!     .column("id", ColType::Uint32, IndexKind::PRIMARY_UNIQUE)?
//!     .column("mail", ColType::Str, IndexKind::SECONDARY_UNIQUE)?
//!     .build()?;
//!
//! let db = Db::new();
//! let txn = db.begin_write();
//! txn.create_table(&schema)?;
//!
//! let table = TableName::new(schema);
//! let mut row = RowBuilder::new();
//! row.set_uint32(0, 1)?.set_str(1, "alice@example.com")?;
//! txn.insert_row(&table, &row.build().view())?;
//! txn.commit()?;
//!
//! let txn = db.begin_read();
//! let mail = ColumnName::new(&table, "mail")?;
//! let row = txn.get_row(&mail, &Value::str("alice@example.com"))?;
//! assert_eq!(row.view().field(0, ColType::Uint32).unwrap().as_u32(), 1);
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Overview
//!
//! - [`types`]: column types, index kinds, shoves, runtime values
//! - [`rows`]: zero-copy row tuples (builder, view, tuple comparator)
//! - [`encoding`]: key codec and comparator registry
//! - [`schema`]: table schemas, sub-DB derivation, name bindings
//! - [`filter`]: predicate trees evaluated during cursor traversal
//! - [`cursor`]: positioned cursors with range clipping and descending
//!   emulation
//! - [`table`]: row maintenance with secondary-index upkeep
//! - [`kv`]: the KV-engine contract and the in-memory implementation
//! - [`errors`]: error kinds and classification helpers

pub mod config;
pub mod cursor;
pub mod encoding;
pub mod errors;
pub mod filter;
pub mod kv;
pub mod rows;
pub mod schema;
pub mod table;
pub mod types;

pub use config::CoreConfig;
pub use cursor::{Cursor, CursorBuilder, CursorOrder, Seek};
pub use errors::{is_kind, kind_of, ErrorKind};
pub use filter::{CmpOp, Filter};
pub use kv::mem::{Db, DbBuilder, Txn, TxnMode};
pub use rows::{FieldView, Row, RowBuilder, RowView};
pub use schema::{ColumnName, ColumnSchema, SchemaBuilder, TableName, TableSchema};
pub use types::{ColType, DateTime, IndexKind, Shove, Value};
