//! # Schema: Tables, Columns, and Bindings
//!
//! - [`table`]: schema definition and validation, plus the derivation of
//!   KV sub-DB flags from column shoves.
//! - [`name`]: per-transaction table/column bindings with cached sub-DB
//!   handles.
//!
//! Schema objects are immutable and shared (`Arc`); bindings are cheap
//! per-thread handles over them.

pub mod name;
pub mod table;

pub use name::{ColumnName, TableName};
pub use table::{ColumnSchema, SchemaBuilder, TableSchema};

use eyre::Result;

use crate::kv::mem::Txn;

impl Txn {
    /// Creates the sub-DBs backing `schema`. Write transactions only;
    /// fails with `KeyExist` when the table already exists.
    pub fn create_table(&self, schema: &std::sync::Arc<TableSchema>) -> Result<()> {
        name::create_table_sub_dbs(self, schema)
    }

    /// Drops every sub-DB backing the bound table.
    pub fn drop_table(&self, table: &TableName) -> Result<()> {
        table.refresh(self)?;
        let schema = table.schema();
        for column in schema.secondaries() {
            let dbi = name::open_secondary(self, schema, column)?;
            self.drop_sub_db(dbi)?;
        }
        self.drop_sub_db(table.dbi())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{is_kind, ErrorKind};
    use crate::kv::mem::Db;
    use crate::types::{ColType, IndexKind};

    #[test]
    fn create_and_drop_table() {
        let db = Db::new();
        let schema = TableSchema::builder("t")
            .column("pk", ColType::Uint32, IndexKind::PRIMARY_UNIQUE)
            .unwrap()
            .column("s", ColType::Str, IndexKind::SECONDARY_UNIQUE)
            .unwrap()
            .build()
            .unwrap();

        let txn = db.begin_write();
        txn.create_table(&schema).unwrap();
        txn.commit().unwrap();

        let table = TableName::new(schema.clone());
        let reader = db.begin_read();
        table.refresh(&reader).unwrap();
        reader.abort();

        let txn = db.begin_write();
        let table = TableName::new(schema.clone());
        txn.drop_table(&table).unwrap();
        txn.commit().unwrap();

        let reader = db.begin_read();
        let table = TableName::new(schema);
        let err = table.refresh(&reader).unwrap_err();
        assert!(is_kind(&err, ErrorKind::NotFound));
    }
}
