//! # Row Maintenance
//!
//! Table-level mutation: insert, upsert, update, and delete with
//! coordinated secondary-index upkeep. The cursor mutation paths reuse the
//! same internals (`check_constraints`, `secondary_insert`,
//! `secondary_remove`, `secondary_upsert`).
//!
//! ## Write protocol
//!
//! Validation and uniqueness checks run before the first write, so a
//! rejected operation leaves no side effects. Once the first index write
//! has landed, any later failure leaves the table and its secondaries
//! disagreeing. Those failures escalate to `Inconsistent`, which poisons
//! the transaction: `commit` refuses and only `abort` remains.
//!
//! ## Primary-key copies
//!
//! The primary key driving secondary cleanup is always copied out of the
//! engine before the first mutation (`get_ex` returns the stored key as an
//! owned buffer). This is the ownership rendition of the dirty-page rule:
//! the bytes stay valid however the mutation relocates entries.

use eyre::Result;

use crate::encoding::row_to_key;
use crate::errors::{fault, is_kind, ErrorKind};
use crate::kv::mem::Txn;
use crate::kv::PutFlags;
use crate::rows::{cmp_rows, Row, RowView};
use crate::schema::name::open_secondary;
use crate::schema::{ColumnName, TableName, TableSchema};
use crate::types::Value;

/// Marks the transaction unrecoverable and wraps the underlying error.
pub(crate) fn inconsistent_abort(txn: &Txn, err: eyre::Report) -> eyre::Report {
    txn.mark_inconsistent();
    err.wrap_err(ErrorKind::Inconsistent)
}

/// Verifies uniqueness across unique secondary indexes before a mutation.
///
/// For an update, indexes whose key does not change are exempt. The
/// `skip_order` column (a cursor's own index) is checked by the caller
/// through its key-unchanged rule instead; 0 disables skipping, since
/// order 0 is always the primary.
pub(crate) fn check_constraints(
    txn: &Txn,
    schema: &TableSchema,
    old_row: Option<&RowView<'_>>,
    new_row: &RowView<'_>,
    skip_order: u32,
) -> Result<()> {
    for column in schema.secondaries() {
        let shove = column.shove();
        if !shove.index().is_unique() || column.order() == skip_order {
            continue;
        }
        let new_key = row_to_key(shove, column.order(), new_row, false)?;
        if let Some(old_row) = old_row {
            let old_key = row_to_key(shove, column.order(), old_row, false)?;
            if old_key.bytes() == new_key.bytes() {
                continue;
            }
        }
        let dbi = open_secondary(txn, schema, column)?;
        match txn.get(dbi, new_key.bytes()) {
            Ok(_) => return fault(ErrorKind::KeyExist),
            Err(err) if is_kind(&err, ErrorKind::NotFound) => {}
            Err(err) => return Err(err),
        }
    }
    Ok(())
}

/// Inserts one `(secondary_key, primary_key)` entry per secondary index.
pub(crate) fn secondary_insert(
    txn: &Txn,
    schema: &TableSchema,
    pk_key: &[u8],
    row: &RowView<'_>,
) -> Result<()> {
    for column in schema.secondaries() {
        let shove = column.shove();
        let key = row_to_key(shove, column.order(), row, false)?;
        let dbi = open_secondary(txn, schema, column)?;
        let flags = if shove.index().is_unique() {
            PutFlags::NO_OVERWRITE
        } else {
            PutFlags::NO_DUP_DATA
        };
        txn.put(dbi, key.bytes(), pk_key, flags)?;
    }
    Ok(())
}

/// Removes the `(secondary_key, primary_key)` entry of every secondary
/// index except `skip_order` (a cursor deletes its own entry itself).
pub(crate) fn secondary_remove(
    txn: &Txn,
    schema: &TableSchema,
    pk_key: &[u8],
    old_row: &RowView<'_>,
    skip_order: u32,
) -> Result<()> {
    for column in schema.secondaries() {
        if column.order() == skip_order {
            continue;
        }
        let shove = column.shove();
        let key = row_to_key(shove, column.order(), old_row, false)?;
        let dbi = open_secondary(txn, schema, column)?;
        let dup = if shove.index().is_unique() {
            None
        } else {
            Some(pk_key)
        };
        txn.del(dbi, key.bytes(), dup)?;
    }
    Ok(())
}

/// Diffs old and new rows per secondary index and applies the minimal
/// delete+insert pairs. Indexes whose key and primary reference are both
/// unchanged are untouched.
pub(crate) fn secondary_upsert(
    txn: &Txn,
    schema: &TableSchema,
    old_pk: &[u8],
    old_row: &RowView<'_>,
    new_pk: &[u8],
    new_row: &RowView<'_>,
    skip_order: u32,
) -> Result<()> {
    let pk_unchanged = old_pk == new_pk;
    for column in schema.secondaries() {
        if column.order() == skip_order {
            continue;
        }
        let shove = column.shove();
        let old_key = row_to_key(shove, column.order(), old_row, false)?;
        let new_key = row_to_key(shove, column.order(), new_row, false)?;
        if pk_unchanged && old_key.bytes() == new_key.bytes() {
            continue;
        }
        let dbi = open_secondary(txn, schema, column)?;
        let unique = shove.index().is_unique();
        let dup = if unique { None } else { Some(old_pk) };
        txn.del(dbi, old_key.bytes(), dup)?;
        let flags = if unique {
            PutFlags::NO_OVERWRITE
        } else {
            PutFlags::NO_DUP_DATA
        };
        txn.put(dbi, new_key.bytes(), new_pk, flags)?;
    }
    Ok(())
}

fn primary_put_flags(schema: &TableSchema) -> PutFlags {
    if schema.pk_shove().index().is_unique() {
        PutFlags::NO_OVERWRITE
    } else {
        PutFlags::NO_DUP_DATA
    }
}

impl Txn {
    /// Inserts a new row; the primary key must not exist yet.
    pub fn insert_row(&self, table: &TableName, row: &RowView<'_>) -> Result<()> {
        table.refresh(self)?;
        let schema = table.schema();
        let pk_key = row_to_key(schema.pk_shove(), 0, row, false)?;

        if schema.has_secondaries() {
            check_constraints(self, schema, None, row, 0)?;
        }
        self.put(table.dbi(), pk_key.bytes(), row.bytes(), primary_put_flags(schema))?;

        if schema.has_secondaries() {
            if let Err(err) = secondary_insert(self, schema, pk_key.bytes(), row) {
                return Err(inconsistent_abort(self, err));
            }
        }
        Ok(())
    }

    /// Replaces the row stored under the new row's primary key.
    pub fn update_row(&self, table: &TableName, row: &RowView<'_>) -> Result<()> {
        table.refresh(self)?;
        let schema = table.schema();
        let pk_key = row_to_key(schema.pk_shove(), 0, row, false)?;

        // get_ex keeps the stored key alive as an owned buffer across the
        // secondary mutations below.
        let (stored_pk, old_buf) = self.get_ex(table.dbi(), pk_key.bytes())?;
        let old_row = RowView::new(&old_buf)?;

        if schema.has_secondaries() {
            check_constraints(self, schema, Some(&old_row), row, 0)?;
            if let Err(err) =
                secondary_upsert(self, schema, &stored_pk, &old_row, pk_key.bytes(), row, 0)
            {
                return Err(inconsistent_abort(self, err));
            }
            if let Err(err) = self.put(table.dbi(), pk_key.bytes(), row.bytes(), PutFlags::NONE) {
                return Err(inconsistent_abort(self, err));
            }
        } else {
            self.put(table.dbi(), pk_key.bytes(), row.bytes(), PutFlags::NONE)?;
        }
        Ok(())
    }

    /// Inserts the row, or updates in place when its primary key exists.
    pub fn upsert_row(&self, table: &TableName, row: &RowView<'_>) -> Result<()> {
        table.refresh(self)?;
        let schema = table.schema();
        let pk_key = row_to_key(schema.pk_shove(), 0, row, false)?;
        match self.get(table.dbi(), pk_key.bytes()) {
            Ok(_) => self.update_row(table, row),
            Err(err) if is_kind(&err, ErrorKind::NotFound) => self.insert_row(table, row),
            Err(err) => Err(err),
        }
    }

    /// Deletes the row. The supplied row must match the stored one.
    pub fn delete_row(&self, table: &TableName, row: &RowView<'_>) -> Result<()> {
        table.refresh(self)?;
        let schema = table.schema();
        let pk_key = row_to_key(schema.pk_shove(), 0, row, false)?;

        let (stored_pk, old_buf) = self.get_ex(table.dbi(), pk_key.bytes())?;
        let old_row = RowView::new(&old_buf)?;
        if cmp_rows(&old_row, row) != std::cmp::Ordering::Equal {
            return fault(ErrorKind::KeyMismatch);
        }

        if schema.has_secondaries() {
            if let Err(err) = secondary_remove(self, schema, &stored_pk, &old_row, 0) {
                return Err(inconsistent_abort(self, err));
            }
            if let Err(err) = self.del(table.dbi(), pk_key.bytes(), None) {
                return Err(inconsistent_abort(self, err));
            }
        } else {
            self.del(table.dbi(), pk_key.bytes(), None)?;
        }
        Ok(())
    }

    /// Point lookup through any index: resolves the full row, following
    /// the secondary-to-primary reference when needed.
    pub fn get_row(&self, column: &ColumnName, key: &Value<'_>) -> Result<Row> {
        column.refresh_couple(self)?;
        let shove = column.shove();
        if !shove.index().is_indexed() {
            return fault(ErrorKind::NoIndex);
        }
        let encoded = crate::encoding::value_to_key(shove, key, false, self.config())?;

        if shove.index().is_primary() {
            let row = self.get(column.dbi(), encoded.bytes())?;
            return Ok(Row::from_arc(row));
        }

        let pk = self.get(column.dbi(), encoded.bytes())?;
        match self.get(column.table().dbi(), &pk) {
            Ok(row) => Ok(Row::from_arc(row)),
            Err(err) if is_kind(&err, ErrorKind::NotFound) => fault(ErrorKind::IndexCorrupted),
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::mem::Db;
    use crate::rows::RowBuilder;
    use crate::schema::TableSchema;
    use crate::types::{ColType, IndexKind};
    use std::sync::Arc;

    fn schema() -> Arc<TableSchema> {
        TableSchema::builder("people")
            .column("pk", ColType::Uint32, IndexKind::PRIMARY_UNIQUE)
            .unwrap()
            .column("mail", ColType::Str, IndexKind::SECONDARY_UNIQUE)
            .unwrap()
            .column("score", ColType::Fp64, IndexKind::SECONDARY_WITH_DUPS)
            .unwrap()
            .build()
            .unwrap()
    }

    fn person(pk: u32, mail: &str, score: f64) -> Row {
        let mut b = RowBuilder::new();
        b.set_uint32(0, pk).unwrap();
        b.set_str(1, mail).unwrap();
        b.set_fp64(2, score).unwrap();
        b.build()
    }

    fn setup() -> (Db, TableName) {
        let db = Db::new();
        let schema = schema();
        let txn = db.begin_write();
        txn.create_table(&schema).unwrap();
        txn.commit().unwrap();
        (db, TableName::new(schema))
    }

    #[test]
    fn insert_and_lookup_via_both_indexes() {
        let (db, table) = setup();
        let txn = db.begin_write();
        txn.insert_row(&table, &person(1, "a@x", 0.5).view()).unwrap();
        txn.insert_row(&table, &person(2, "b@x", 0.5).view()).unwrap();
        txn.commit().unwrap();

        let txn = db.begin_read();
        let table = TableName::new(table.schema().clone());
        let mail = ColumnName::new(&table, "mail").unwrap();
        let row = txn.get_row(&mail, &Value::str("b@x")).unwrap();
        assert_eq!(row.view().field(0, ColType::Uint32).unwrap().as_u32(), 2);
    }

    #[test]
    fn duplicate_primary_or_unique_secondary_rejected_without_side_effects() {
        let (db, table) = setup();
        let txn = db.begin_write();
        txn.insert_row(&table, &person(1, "a@x", 0.5).view()).unwrap();

        let err = txn
            .insert_row(&table, &person(1, "other@x", 0.1).view())
            .unwrap_err();
        assert!(is_kind(&err, ErrorKind::KeyExist));

        let err = txn
            .insert_row(&table, &person(9, "a@x", 0.1).view())
            .unwrap_err();
        assert!(is_kind(&err, ErrorKind::KeyExist));
        assert!(!txn.is_inconsistent(), "pre-checks must not poison the txn");

        // the rejected rows left no trace
        let mail = ColumnName::new(&table, "mail").unwrap();
        let row = txn.get_row(&mail, &Value::str("a@x")).unwrap();
        assert_eq!(row.view().field(0, ColType::Uint32).unwrap().as_u32(), 1);
        assert!(txn.get_row(&mail, &Value::str("other@x")).is_err());
        txn.commit().unwrap();
    }

    #[test]
    fn update_rewrites_changed_secondaries_only() {
        let (db, table) = setup();
        let txn = db.begin_write();
        txn.insert_row(&table, &person(1, "old@x", 0.5).view()).unwrap();
        txn.update_row(&table, &person(1, "new@x", 0.5).view()).unwrap();
        txn.commit().unwrap();

        let txn = db.begin_read();
        let table = TableName::new(table.schema().clone());
        let mail = ColumnName::new(&table, "mail").unwrap();
        assert!(txn.get_row(&mail, &Value::str("old@x")).is_err());
        let row = txn.get_row(&mail, &Value::str("new@x")).unwrap();
        assert_eq!(row.view().field(0, ColType::Uint32).unwrap().as_u32(), 1);
    }

    #[test]
    fn update_of_missing_row_reports_not_found() {
        let (db, table) = setup();
        let txn = db.begin_write();
        let err = txn
            .update_row(&table, &person(7, "x@x", 0.0).view())
            .unwrap_err();
        assert!(is_kind(&err, ErrorKind::NotFound));
    }

    #[test]
    fn delete_requires_matching_row() {
        let (db, table) = setup();
        let txn = db.begin_write();
        txn.insert_row(&table, &person(1, "a@x", 0.5).view()).unwrap();

        let err = txn
            .delete_row(&table, &person(1, "a@x", 0.75).view())
            .unwrap_err();
        assert!(is_kind(&err, ErrorKind::KeyMismatch));

        txn.delete_row(&table, &person(1, "a@x", 0.5).view()).unwrap();
        let mail = ColumnName::new(&table, "mail").unwrap();
        assert!(txn.get_row(&mail, &Value::str("a@x")).is_err());
        txn.commit().unwrap();
    }

    #[test]
    fn upsert_inserts_then_updates() {
        let (db, table) = setup();
        let txn = db.begin_write();
        txn.upsert_row(&table, &person(1, "a@x", 0.5).view()).unwrap();
        txn.upsert_row(&table, &person(1, "b@x", 0.25).view()).unwrap();
        txn.commit().unwrap();

        let txn = db.begin_read();
        let table = TableName::new(table.schema().clone());
        let mail = ColumnName::new(&table, "mail").unwrap();
        assert!(txn.get_row(&mail, &Value::str("a@x")).is_err());
        assert!(txn.get_row(&mail, &Value::str("b@x")).is_ok());
    }
}
