//! # Long-Key Folding
//!
//! Variable keys longer than 64 bytes are folded: a 64-byte slice plus a
//! hash of the remainder. Folded keys keep their order for distinct
//! heads (or tails, on reverse indexes), decode as opaque `shoved`
//! identifiers, and round-trip through locate.

use tabula::{
    is_kind, ColType, ColumnName, Db, ErrorKind, IndexKind, Row, RowBuilder, Seek, TableName,
    TableSchema, Value,
};

fn make_row(pk: &str, n: u32) -> Row {
    let mut builder = RowBuilder::new();
    builder.set_str(0, pk).unwrap();
    builder.set_uint32(1, n).unwrap();
    builder.build()
}

fn setup(index: IndexKind) -> (Db, TableName) {
    let schema = TableSchema::builder("t")
        .column("pk", ColType::Str, index)
        .unwrap()
        .column("n", ColType::Uint32, IndexKind::NONE)
        .unwrap()
        .build()
        .unwrap();
    let db = Db::new();
    let txn = db.begin_write();
    txn.create_table(&schema).unwrap();
    txn.commit().unwrap();
    (db, TableName::new(schema))
}

fn n_of(row: &Row) -> u32 {
    row.view().field(1, ColType::Uint32).unwrap().as_u32()
}

#[test]
fn folded_keys_enumerate_in_head_order() {
    let (db, table) = setup(IndexKind::PRIMARY_UNIQUE);
    let keys: Vec<String> = (0..8)
        .map(|i| format!("{:02}-{}", i, "pad".repeat(40)))
        .collect();

    let txn = db.begin_write();
    // inserted out of order on purpose
    for (n, i) in [3usize, 0, 6, 1, 7, 2, 5, 4].iter().enumerate() {
        let row = make_row(&keys[*i], n as u32);
        txn.insert_row(&table, &row.view()).unwrap();
    }
    txn.commit().unwrap();

    let txn = db.begin_read();
    let pk = ColumnName::new(&table, "pk").unwrap();
    let mut cursor = txn.cursor(&pk).dont_fetch().open().unwrap();

    let mut order = Vec::new();
    let mut rc = cursor.move_to(Seek::First);
    while rc.is_ok() {
        // every key exceeds the fold threshold, so it decodes as shoved
        match cursor.key().unwrap() {
            Value::Shoved(bytes) => assert_eq!(bytes.len(), 72),
            other => panic!("expected shoved, got {other:?}"),
        }
        let row = cursor.get().unwrap();
        order.push(
            row.view()
                .field(0, ColType::Str)
                .unwrap()
                .as_str()
                .unwrap()
                .to_string(),
        );
        rc = cursor.move_to(Seek::Next);
    }
    assert_eq!(order, keys, "head bytes dominate the fold order");
}

#[test]
fn locate_by_value_and_by_shoved_round_trip() {
    let (db, table) = setup(IndexKind::PRIMARY_UNIQUE);
    let long = format!("target-{}", "x".repeat(90));

    let txn = db.begin_write();
    txn.insert_row(&table, &make_row(&long, 7).view()).unwrap();
    txn.insert_row(&table, &make_row("short", 1).view()).unwrap();
    txn.commit().unwrap();

    let txn = db.begin_read();
    let pk = ColumnName::new(&table, "pk").unwrap();
    let mut cursor = txn.cursor(&pk).unsorted().dont_fetch().open().unwrap();

    // locating by the original value folds it the same way
    cursor.locate(true, &Value::str(&long)).unwrap();
    assert_eq!(n_of(&cursor.get().unwrap()), 7);

    // the decoded shoved key addresses the same entry
    let shoved = cursor.key().unwrap();
    cursor.locate(true, &shoved).unwrap();
    assert_eq!(n_of(&cursor.get().unwrap()), 7);

    // short keys still decode as plain strings
    cursor.locate(true, &Value::str("short")).unwrap();
    assert_eq!(cursor.key().unwrap(), Value::str("short").to_owned_static());
}

#[test]
fn reverse_index_orders_folded_keys_by_tail() {
    let (db, table) = setup(IndexKind::PRIMARY_UNIQUE_REVERSED);
    let a = format!("{}-aa", "pad".repeat(30));
    let b = format!("{}-bb", "pad".repeat(30));
    let c = format!("{}-cc", "pad".repeat(30));

    let txn = db.begin_write();
    for (key, n) in [(&b, 1u32), (&c, 2), (&a, 0)] {
        txn.insert_row(&table, &make_row(key, n).view()).unwrap();
    }
    txn.commit().unwrap();

    let txn = db.begin_read();
    let pk = ColumnName::new(&table, "pk").unwrap();
    let mut cursor = txn.cursor(&pk).dont_fetch().open().unwrap();

    let mut ns = Vec::new();
    let mut rc = cursor.move_to(Seek::First);
    while rc.is_ok() {
        ns.push(n_of(&cursor.get().unwrap()));
        rc = cursor.move_to(Seek::Next);
    }
    assert_eq!(ns, vec![0, 1, 2], "tail bytes dominate the reverse order");
}

#[test]
fn malformed_shoved_operands_are_rejected() {
    let (db, table) = setup(IndexKind::PRIMARY_UNIQUE);
    let txn = db.begin_write();
    txn.insert_row(&table, &make_row("row", 1).view()).unwrap();

    let pk = ColumnName::new(&table, "pk").unwrap();
    let mut cursor = txn.cursor(&pk).unsorted().dont_fetch().open().unwrap();

    let bogus = Value::Shoved(std::borrow::Cow::Borrowed(&b"way-too-short"[..]));
    let err = cursor.locate(true, &bogus).unwrap_err();
    assert!(is_kind(&err, ErrorKind::DataLengthMismatch));
}
