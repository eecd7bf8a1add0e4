//! # Filters Combined with Ranges
//!
//! A cursor yields the intersection of its range and its filter; rejected
//! rows are stepped over transparently in both directions.

use tabula::{
    CmpOp, ColType, ColumnName, Db, Filter, IndexKind, Row, RowBuilder, Seek, TableName,
    TableSchema, Value,
};

fn make_row(n: i32) -> Row {
    let mut builder = RowBuilder::new();
    builder.set_int32(0, n).unwrap();
    builder.set_int32(1, (n + 3) % 5).unwrap();
    builder.build()
}

fn setup() -> (Db, TableName) {
    let schema = TableSchema::builder("t")
        .column("col_1", ColType::Int32, IndexKind::PRIMARY_UNIQUE)
        .unwrap()
        .column("col_2", ColType::Int32, IndexKind::NONE)
        .unwrap()
        .build()
        .unwrap();

    let db = Db::new();
    let txn = db.begin_write();
    txn.create_table(&schema).unwrap();
    let table = TableName::new(schema);
    for n in 0..42 {
        txn.insert_row(&table, &make_row(n).view()).unwrap();
    }
    txn.commit().unwrap();
    (db, table)
}

fn filtered_count(
    db: &Db,
    table: &TableName,
    filter: &Filter<'_>,
    from: Value<'static>,
    to: Value<'static>,
) -> usize {
    let txn = db.begin_read();
    let col = ColumnName::new(table, "col_1").unwrap();
    let mut cursor = txn
        .cursor(&col)
        .range(from, to)
        .filter(filter)
        .unsorted()
        .dont_fetch()
        .open()
        .unwrap();
    cursor.count(usize::MAX).unwrap()
}

#[test]
fn filter_over_full_range() {
    let (db, table) = setup();
    let col_2 = ColumnName::new(&table, "col_2").unwrap();

    let filter = Filter::compare(&col_2, CmpOp::Eq, Value::Sint(3));
    let expected = (0..42).filter(|n| (n + 3) % 5 == 3).count();
    assert_eq!(expected, 9);
    assert_eq!(
        filtered_count(&db, &table, &filter, Value::Begin, Value::End),
        expected
    );
}

#[test]
fn filter_intersects_with_range() {
    let (db, table) = setup();
    let col_1 = ColumnName::new(&table, "col_1").unwrap();

    let below_ten = Filter::compare(&col_1, CmpOp::Lt, Value::Sint(10));
    assert_eq!(
        filtered_count(&db, &table, &below_ten, Value::Begin, Value::Sint(5)),
        5
    );

    let ten_up = Filter::compare(&col_1, CmpOp::Ge, Value::Sint(10));
    assert_eq!(
        filtered_count(&db, &table, &ten_up, Value::Begin, Value::Sint(11)),
        1
    );
}

#[test]
fn composite_filters() {
    let (db, table) = setup();
    let col_1 = ColumnName::new(&table, "col_1").unwrap();
    let col_2 = ColumnName::new(&table, "col_2").unwrap();

    let both = Filter::And(vec![
        Filter::compare(&col_2, CmpOp::Eq, Value::Sint(3)),
        Filter::compare(&col_1, CmpOp::Lt, Value::Sint(21)),
    ]);
    let expected = (0..21).filter(|n| (n + 3) % 5 == 3).count();
    assert_eq!(
        filtered_count(&db, &table, &both, Value::Begin, Value::End),
        expected
    );

    let negated = Filter::Not(Box::new(Filter::compare(&col_2, CmpOp::Eq, Value::Sint(3))));
    assert_eq!(
        filtered_count(&db, &table, &negated, Value::Begin, Value::End),
        42 - 9
    );
}

#[test]
fn stepping_skips_rejected_rows_in_both_directions() {
    let (db, table) = setup();
    let txn = db.begin_read();
    let col_1 = ColumnName::new(&table, "col_1").unwrap();
    let col_2 = ColumnName::new(&table, "col_2").unwrap();
    let filter = Filter::compare(&col_2, CmpOp::Eq, Value::Sint(0));

    let mut cursor = txn
        .cursor(&col_1)
        .filter(&filter)
        .dont_fetch()
        .open()
        .unwrap();

    // matching keys are n with (n + 3) % 5 == 0: 2, 7, 12, ...
    let mut matches = Vec::new();
    let mut rc = cursor.move_to(Seek::First);
    while rc.is_ok() {
        match cursor.key().unwrap() {
            Value::Sint(key) => matches.push(key),
            other => panic!("unexpected key {other:?}"),
        }
        rc = cursor.move_to(Seek::Next);
    }
    let expected: Vec<i64> = (0..42).filter(|n| (n + 3) % 5 == 0).collect();
    assert_eq!(matches, expected);

    let mut cursor = txn
        .cursor(&col_1)
        .filter(&filter)
        .descending()
        .dont_fetch()
        .open()
        .unwrap();
    let mut reversed = Vec::new();
    let mut rc = cursor.move_to(Seek::First);
    while rc.is_ok() {
        match cursor.key().unwrap() {
            Value::Sint(key) => reversed.push(key),
            other => panic!("unexpected key {other:?}"),
        }
        rc = cursor.move_to(Seek::Next);
    }
    let expected: Vec<i64> = expected.into_iter().rev().collect();
    assert_eq!(reversed, expected);
}

#[test]
fn row_predicate_filter_reaches_whole_rows() {
    let (db, table) = setup();
    let txn = db.begin_read();
    let col_1 = ColumnName::new(&table, "col_1").unwrap();

    let filter = Filter::row(|row| {
        let n = row.field(0, ColType::Int32).unwrap().as_i32();
        let tag = row.field(1, ColType::Int32).unwrap().as_i32();
        n % 2 == 0 && tag == 0
    });
    let mut cursor = txn
        .cursor(&col_1)
        .filter(&filter)
        .unsorted()
        .dont_fetch()
        .open()
        .unwrap();
    let expected = (0..42).filter(|n| n % 2 == 0 && (n + 3) % 5 == 0).count();
    assert_eq!(cursor.count(usize::MAX).unwrap(), expected);
}
