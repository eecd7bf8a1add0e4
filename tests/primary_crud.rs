//! # Primary-Index CRUD Through Cursors
//!
//! Smoke coverage for a table with a string primary key and two payload
//! columns: insert, enumerate, locate, read back, and delete through a
//! cursor over the primary index.

use tabula::{
    is_kind, ColType, ColumnName, Db, ErrorKind, IndexKind, Row, RowBuilder, Seek, TableName,
    TableSchema, Value,
};

fn make_row(pk: &str, a: u64, b: f64) -> Row {
    let mut builder = RowBuilder::new();
    builder.set_str(0, pk).unwrap();
    builder.set_uint64(1, a).unwrap();
    builder.set_fp64(2, b).unwrap();
    builder.build()
}

fn setup() -> (Db, TableName) {
    let schema = TableSchema::builder("t")
        .column("pk_str", ColType::Str, IndexKind::PRIMARY_UNIQUE)
        .unwrap()
        .column("a_uint", ColType::Uint64, IndexKind::NONE)
        .unwrap()
        .column("b_fp", ColType::Fp64, IndexKind::NONE)
        .unwrap()
        .build()
        .unwrap();

    let db = Db::new();
    let txn = db.begin_write();
    txn.create_table(&schema).unwrap();
    txn.commit().unwrap();
    (db, TableName::new(schema))
}

fn pk_of(row: &Row) -> String {
    row.view()
        .field(0, ColType::Str)
        .unwrap()
        .as_str()
        .unwrap()
        .to_string()
}

#[test]
fn insert_enumerate_locate_delete() {
    let (db, table) = setup();
    let row1 = make_row("pk-string", 34, 56.78);
    let row2 = make_row("zzz", 90, 12.34);

    let txn = db.begin_write();
    txn.insert_row(&table, &row1.view()).unwrap();
    txn.insert_row(&table, &row2.view()).unwrap();

    let pk_col = ColumnName::new(&table, "pk_str").unwrap();
    let mut cursor = txn
        .cursor(&pk_col)
        .range(Value::Begin, Value::End)
        .unsorted()
        .dont_fetch()
        .open()
        .unwrap();

    assert_eq!(cursor.count(usize::MAX).unwrap(), 2);

    cursor.move_to(Seek::Last).unwrap();
    assert_eq!(pk_of(&cursor.get().unwrap()), "zzz");
    let got = cursor.get().unwrap();
    assert_eq!(got.view().field(1, ColType::Uint64).unwrap().as_u64(), 90);
    assert_eq!(got.view().field(2, ColType::Fp64).unwrap().as_f64(), 12.34);

    cursor.locate(true, &Value::str("pk-string")).unwrap();
    assert_eq!(pk_of(&cursor.get().unwrap()), "pk-string");
    assert_eq!(cursor.key().unwrap(), Value::str("pk-string").to_owned_static());
    assert_eq!(cursor.dups().unwrap(), 1, "unique primary has one dup");

    // delete row1; the cursor repositions onto the remaining row
    cursor.delete().unwrap();
    assert!(cursor.eof().is_ok());
    assert_eq!(pk_of(&cursor.get().unwrap()), "zzz");

    cursor.move_to(Seek::First).unwrap();
    cursor.delete().unwrap();
    assert!(cursor.eof().is_err(), "table is empty now");

    assert_eq!(cursor.count(usize::MAX).unwrap(), 0);
    drop(cursor);
    txn.commit().unwrap();
}

#[test]
fn reads_resolve_back_through_the_key() {
    let (db, table) = setup();
    let txn = db.begin_write();
    for (pk, a) in [("alpha", 1u64), ("beta", 2), ("gamma", 3)] {
        txn.insert_row(&table, &make_row(pk, a, 0.5).view()).unwrap();
    }
    txn.commit().unwrap();

    let txn = db.begin_read();
    let pk_col = ColumnName::new(&table, "pk_str").unwrap();
    let mut cursor = txn.cursor(&pk_col).unsorted().open().unwrap();

    // fetch-on-open positioned the cursor on the first row
    assert_eq!(pk_of(&cursor.get().unwrap()), "alpha");

    let mut seen = Vec::new();
    loop {
        seen.push(pk_of(&cursor.get().unwrap()));
        match cursor.move_to(Seek::Next) {
            Ok(()) => {}
            Err(err) => {
                assert!(is_kind(&err, ErrorKind::NoData));
                break;
            }
        }
    }
    assert_eq!(seen, vec!["alpha", "beta", "gamma"]);
}

#[test]
fn open_with_fetch_on_empty_table_reports_no_data() {
    let (db, table) = setup();
    let txn = db.begin_read();
    let pk_col = ColumnName::new(&table, "pk_str").unwrap();
    let err = txn.cursor(&pk_col).unsorted().open().unwrap_err();
    assert!(is_kind(&err, ErrorKind::NoData));

    // dont-fetch opens fine and reports an unpositioned cursor instead
    let mut cursor = txn
        .cursor(&pk_col)
        .unsorted()
        .dont_fetch()
        .open()
        .unwrap();
    let err = cursor.get().unwrap_err();
    assert!(is_kind(&err, ErrorKind::CursorInvalid));
}

#[test]
fn poor_cursor_rejects_stepping_but_allows_seeking() {
    let (db, table) = setup();
    let txn = db.begin_write();
    txn.insert_row(&table, &make_row("only", 1, 1.0).view()).unwrap();

    let pk_col = ColumnName::new(&table, "pk_str").unwrap();
    let mut cursor = txn.cursor(&pk_col).unsorted().dont_fetch().open().unwrap();

    let err = cursor.move_to(Seek::Next).unwrap_err();
    assert!(is_kind(&err, ErrorKind::CursorInvalid));

    cursor.move_to(Seek::First).unwrap();
    assert_eq!(pk_of(&cursor.get().unwrap()), "only");
}

#[test]
fn locate_missing_key_reports_no_data() {
    let (db, table) = setup();
    let txn = db.begin_write();
    txn.insert_row(&table, &make_row("present", 1, 1.0).view()).unwrap();

    let pk_col = ColumnName::new(&table, "pk_str").unwrap();
    let mut cursor = txn.cursor(&pk_col).unsorted().dont_fetch().open().unwrap();
    let err = cursor.locate(true, &Value::str("absent")).unwrap_err();
    assert!(is_kind(&err, ErrorKind::NoData));

    // after the failed locate the cursor is poor
    let err = cursor.get().unwrap_err();
    assert!(is_kind(&err, ErrorKind::CursorInvalid));
}
