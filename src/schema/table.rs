//! # Table Schemas and Sub-DB Derivation
//!
//! A table schema is an ordered list of column descriptors: one primary
//! column (declaration order 0 by convention) and any number of secondary
//! or unindexed columns. Each indexed column is backed by one KV sub-DB;
//! this module derives the sub-DB's creation flags and comparators from
//! the column shoves.
//!
//! ## Validation
//!
//! `SchemaBuilder::column` rejects invalid descriptors as they are added:
//! empty or duplicate names, a second primary, a reverse index without
//! ordering, and a reverse index on a type whose byte order is meaningless
//! (single-word numerics). `build` additionally requires exactly one
//! primary and forbids secondary indexes on a table whose primary admits
//! duplicates, since every secondary entry stores one primary key.

use std::sync::Arc;

use eyre::Result;

use crate::errors::{fault, ErrorKind};
use crate::kv::SubDbFlags;
use crate::types::{ColType, IndexKind, Shove};

/// One column of a table schema.
#[derive(Debug, Clone)]
pub struct ColumnSchema {
    name: String,
    shove: Shove,
}

impl ColumnSchema {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn shove(&self) -> Shove {
        self.shove
    }

    pub fn order(&self) -> u32 {
        self.shove.order()
    }
}

/// An immutable table schema, shared behind `Arc` by names, cursors and
/// the maintenance paths.
#[derive(Debug)]
pub struct TableSchema {
    name: String,
    columns: Vec<ColumnSchema>,
}

impl TableSchema {
    pub fn builder(name: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder {
            name: name.into(),
            columns: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[ColumnSchema] {
        &self.columns
    }

    /// The primary column (always order 0).
    pub fn pk(&self) -> &ColumnSchema {
        &self.columns[0]
    }

    pub fn pk_shove(&self) -> Shove {
        self.pk().shove
    }

    pub fn column(&self, name: &str) -> Option<&ColumnSchema> {
        self.columns.iter().find(|col| col.name == name)
    }

    /// Secondary-indexed columns, in declaration order.
    pub fn secondaries(&self) -> impl Iterator<Item = &ColumnSchema> {
        self.columns
            .iter()
            .filter(|col| col.shove.index().is_secondary())
    }

    pub fn has_secondaries(&self) -> bool {
        self.secondaries().next().is_some()
    }

    /// Name of the sub-DB backing an indexed column.
    pub(crate) fn sub_db_name(&self, column: &ColumnSchema) -> String {
        if column.shove.index().is_primary() {
            self.name.clone()
        } else {
            format!("{}.{}", self.name, column.name)
        }
    }
}

/// Accumulates validated column descriptors into a [`TableSchema`].
#[derive(Debug)]
pub struct SchemaBuilder {
    name: String,
    columns: Vec<(String, ColType, IndexKind)>,
}

impl SchemaBuilder {
    /// Adds a column, validating the descriptor against the rules above.
    pub fn column(mut self, name: &str, ctype: ColType, index: IndexKind) -> Result<Self> {
        if name.is_empty() {
            return fault(ErrorKind::InvalidArgument);
        }
        if index.is_indexed() {
            if index.is_reverse() && !index.is_ordered() {
                return fault(ErrorKind::InvalidArgument);
            }
            if index.is_reverse() && !ctype.has_byte_order() {
                return fault(ErrorKind::InvalidArgument);
            }
        }
        if self.columns.iter().any(|(n, _, _)| n == name) {
            return fault(ErrorKind::KeyExist);
        }
        if index.is_primary() && self.columns.iter().any(|(_, _, i)| i.is_primary()) {
            return fault(ErrorKind::KeyExist);
        }
        self.columns.push((name.to_string(), ctype, index));
        Ok(self)
    }

    /// Finalizes the schema: the primary moves to order 0, remaining
    /// columns keep their declaration sequence.
    pub fn build(self) -> Result<Arc<TableSchema>> {
        if self.name.is_empty() || self.columns.is_empty() {
            return fault(ErrorKind::InvalidArgument);
        }
        let primary_at = self
            .columns
            .iter()
            .position(|(_, _, index)| index.is_primary());
        let Some(primary_at) = primary_at else {
            return fault(ErrorKind::NoIndex);
        };

        let mut ordered: Vec<(String, ColType, IndexKind)> = Vec::with_capacity(self.columns.len());
        ordered.push(self.columns[primary_at].clone());
        ordered.extend(
            self.columns
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != primary_at)
                .map(|(_, col)| col.clone()),
        );

        let has_secondaries = ordered.iter().any(|(_, _, index)| index.is_secondary());
        if has_secondaries && !ordered[0].2.is_unique() {
            // Secondary entries reference rows by primary key; a duplicate
            // primary key would make those references ambiguous.
            return fault(ErrorKind::InvalidArgument);
        }

        let columns = ordered
            .into_iter()
            .enumerate()
            .map(|(order, (name, ctype, index))| ColumnSchema {
                name,
                shove: Shove::new(ctype, index, order as u32),
            })
            .collect();

        Ok(Arc::new(TableSchema {
            name: self.name,
            columns,
        }))
    }
}

fn base_dbi_flags(shove: Shove) -> SubDbFlags {
    let ctype = shove.col_type();
    let index = shove.index();
    debug_assert!(index.is_indexed());

    let mut flags = if index.is_unique() {
        SubDbFlags::NONE
    } else {
        SubDbFlags::DUP_SORT
    };
    if ctype.is_word() || !index.is_ordered() {
        flags = flags | SubDbFlags::INTEGER_KEY;
    } else if index.is_reverse() {
        flags = flags | SubDbFlags::REVERSE_KEY;
    }
    flags | SubDbFlags::CREATE
}

/// Sub-DB flags for a primary index.
pub(crate) fn primary_dbi_flags(pk_shove: Shove) -> SubDbFlags {
    debug_assert!(pk_shove.index().is_primary());
    base_dbi_flags(pk_shove)
}

/// Sub-DB flags for a secondary index: the base flags for its own key,
/// plus duplicate-storage hints describing the primary keys it stores as
/// values.
pub(crate) fn secondary_dbi_flags(pk_shove: Shove, shove: Shove) -> SubDbFlags {
    debug_assert!(pk_shove.index().is_primary());
    debug_assert!(shove.index().is_secondary());

    let pk_type = pk_shove.col_type();
    let pk_index = pk_shove.index();
    let mut flags = base_dbi_flags(shove);
    if flags.contains(SubDbFlags::DUP_SORT) {
        if pk_type.is_fixed_size() {
            flags = flags | SubDbFlags::DUP_FIXED;
        }
        if pk_type.is_word() || !pk_index.is_ordered() {
            flags = flags | SubDbFlags::INTEGER_DUP;
        } else if pk_index.is_reverse() {
            flags = flags | SubDbFlags::REVERSE_DUP;
        }
    }
    flags
}
