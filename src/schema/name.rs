//! # Name Binding
//!
//! A name bundles a schema handle with the cached KV sub-DB handle for one
//! table or column. The cache is valid for a single transaction: `refresh`
//! resolves it on first use and is idempotent within that transaction.
//! Column names refresh their table first, then themselves (the "refresh
//! couple"), so the primary sub-DB is always bound before any secondary.
//!
//! A [`ColumnName`] embeds a handle to its table. The back-reference is
//! non-owning in spirit: both share the same `Arc<TableSchema>`, and the
//! embedded table handle is just a second cache slot, so the table
//! descriptor's lifetime dominates its columns' exactly as the data model
//! requires.
//!
//! Name caches are deliberately `Cell`-based and not `Sync`: a name handle
//! belongs to the thread driving its transaction.

use std::cell::Cell;
use std::sync::Arc;

use eyre::Result;

use crate::encoding::shove_comparator;
use crate::errors::{fault, ErrorKind};
use crate::kv::mem::{Dbi, Txn};
use crate::rows::cmp_row_bytes;
use crate::schema::table::{primary_dbi_flags, secondary_dbi_flags, ColumnSchema, TableSchema};
use crate::types::Shove;

/// Opens (without creating) the primary sub-DB of `schema`.
pub(crate) fn open_primary(txn: &Txn, schema: &TableSchema) -> Result<Dbi> {
    let pk = schema.pk_shove();
    let flags = primary_dbi_flags(pk).persistent();
    txn.open_sub_db(
        schema.name(),
        flags,
        shove_comparator(pk),
        cmp_row_bytes,
    )
}

/// Opens (without creating) the sub-DB of a secondary column. The
/// duplicate comparator is the primary's key comparator, since secondary
/// entries store primary keys as values.
pub(crate) fn open_secondary(txn: &Txn, schema: &TableSchema, column: &ColumnSchema) -> Result<Dbi> {
    let pk = schema.pk_shove();
    let flags = secondary_dbi_flags(pk, column.shove()).persistent();
    txn.open_sub_db(
        &schema.sub_db_name(column),
        flags,
        shove_comparator(column.shove()),
        shove_comparator(pk),
    )
}

/// Creates the sub-DBs backing `schema`; fails with `KeyExist` when the
/// table already exists.
pub(crate) fn create_table_sub_dbs(txn: &Txn, schema: &TableSchema) -> Result<()> {
    match open_primary(txn, schema) {
        Ok(_) => return fault(ErrorKind::KeyExist),
        Err(err) if crate::errors::is_kind(&err, ErrorKind::NotFound) => {}
        Err(err) => return Err(err),
    }

    let pk = schema.pk_shove();
    txn.open_sub_db(
        schema.name(),
        primary_dbi_flags(pk),
        shove_comparator(pk),
        cmp_row_bytes,
    )?;
    for column in schema.secondaries() {
        txn.open_sub_db(
            &schema.sub_db_name(column),
            secondary_dbi_flags(pk, column.shove()),
            shove_comparator(column.shove()),
            shove_comparator(pk),
        )?;
    }
    Ok(())
}

/// A bound table handle: schema plus the per-transaction sub-DB cache.
#[derive(Debug)]
pub struct TableName {
    schema: Arc<TableSchema>,
    dbi: Cell<Option<Dbi>>,
    stamp: Cell<u64>,
}

impl TableName {
    pub fn new(schema: Arc<TableSchema>) -> Self {
        Self {
            schema,
            dbi: Cell::new(None),
            stamp: Cell::new(0),
        }
    }

    pub fn schema(&self) -> &Arc<TableSchema> {
        &self.schema
    }

    /// Resolves the primary sub-DB handle for `txn`. Idempotent within one
    /// transaction; must be called (directly or through a column's
    /// `refresh_couple`) before the handle is used.
    pub fn refresh(&self, txn: &Txn) -> Result<()> {
        if self.stamp.get() == txn.id() && self.dbi.get().is_some() {
            return Ok(());
        }
        let dbi = open_primary(txn, &self.schema)?;
        self.dbi.set(Some(dbi));
        self.stamp.set(txn.id());
        Ok(())
    }

    pub(crate) fn dbi(&self) -> Dbi {
        self.dbi.get().expect("table name used before refresh")
    }
}

impl Clone for TableName {
    fn clone(&self) -> Self {
        // A clone starts with a cold cache; it may be bound to a different
        // transaction than the original.
        Self::new(self.schema.clone())
    }
}

/// A bound column handle, embedding its table handle.
#[derive(Debug, Clone)]
pub struct ColumnName {
    table: TableName,
    shove: Shove,
    dbi: Cell<Option<Dbi>>,
    stamp: Cell<u64>,
}

impl ColumnName {
    /// Looks the column up in the table's schema.
    pub fn new(table: &TableName, column: &str) -> Result<Self> {
        let Some(col) = table.schema().column(column) else {
            return fault(ErrorKind::NotFound);
        };
        Ok(Self {
            table: table.clone(),
            shove: col.shove(),
            dbi: Cell::new(None),
            stamp: Cell::new(0),
        })
    }

    pub fn table(&self) -> &TableName {
        &self.table
    }

    pub fn shove(&self) -> Shove {
        self.shove
    }

    pub fn order(&self) -> u32 {
        self.shove.order()
    }

    /// Refreshes the table binding first, then this column's. Unindexed
    /// columns bind no sub-DB of their own; the primary column binds the
    /// table's.
    pub fn refresh_couple(&self, txn: &Txn) -> Result<()> {
        self.table.refresh(txn)?;
        if self.stamp.get() == txn.id() && self.dbi.get().is_some() {
            return Ok(());
        }

        let index = self.shove.index();
        if !index.is_indexed() {
            self.stamp.set(txn.id());
            return Ok(());
        }
        let dbi = if index.is_primary() {
            self.table.dbi()
        } else {
            let schema = self.table.schema();
            let column = &schema.columns()[self.order() as usize];
            open_secondary(txn, schema, column)?
        };
        self.dbi.set(Some(dbi));
        self.stamp.set(txn.id());
        Ok(())
    }

    pub(crate) fn dbi(&self) -> Dbi {
        self.dbi.get().expect("column name used before refresh")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::is_kind;
    use crate::kv::mem::Db;
    use crate::types::{ColType, IndexKind};

    fn schema() -> Arc<TableSchema> {
        TableSchema::builder("t")
            .column("pk", ColType::Str, IndexKind::PRIMARY_UNIQUE)
            .unwrap()
            .column("a", ColType::Uint64, IndexKind::SECONDARY_WITH_DUPS)
            .unwrap()
            .column("plain", ColType::Fp64, IndexKind::NONE)
            .unwrap()
            .build()
            .unwrap()
    }

    #[test]
    fn refresh_couple_binds_table_then_column() {
        let db = Db::new();
        let schema = schema();
        let txn = db.begin_write();
        create_table_sub_dbs(&txn, &schema).unwrap();

        let table = TableName::new(schema.clone());
        let col = ColumnName::new(&table, "a").unwrap();
        col.refresh_couple(&txn).unwrap();
        assert_ne!(col.table().dbi(), col.dbi());

        let pk = ColumnName::new(&table, "pk").unwrap();
        pk.refresh_couple(&txn).unwrap();
        assert_eq!(pk.table().dbi(), pk.dbi());
    }

    #[test]
    fn missing_table_reports_not_found() {
        let db = Db::new();
        let txn = db.begin_read();
        let table = TableName::new(schema());
        let err = table.refresh(&txn).unwrap_err();
        assert!(is_kind(&err, ErrorKind::NotFound));
    }

    #[test]
    fn missing_column_reports_not_found() {
        let table = TableName::new(schema());
        let err = ColumnName::new(&table, "nope").unwrap_err();
        assert!(is_kind(&err, ErrorKind::NotFound));
    }

    #[test]
    fn create_twice_reports_key_exist() {
        let db = Db::new();
        let schema = schema();
        let txn = db.begin_write();
        create_table_sub_dbs(&txn, &schema).unwrap();
        let err = create_table_sub_dbs(&txn, &schema).unwrap_err();
        assert!(is_kind(&err, ErrorKind::KeyExist));
    }
}
