//! # Secondary Consistency Under Update Churn
//!
//! A table with three indexes (uint32 primary, reversed unique string
//! secondary, non-unique fp64 secondary) is driven through deterministic
//! insert/update churn touching every combination of {pk, str, real,
//! time}. After every phase, all three per-index cursors must enumerate
//! exactly the model's contents in their respective orders.

use std::collections::BTreeSet;

use tabula::{
    ColType, ColumnName, CursorOrder, Db, DateTime, IndexKind, Row, RowBuilder, Seek, TableName,
    TableSchema,
};

const N: u32 = 48;

#[derive(Debug, Clone, PartialEq)]
struct Model {
    pk: u32,
    text: String,
    real: f64,
    time: u64,
}

fn make_row(m: &Model) -> Row {
    let mut builder = RowBuilder::new();
    builder.set_uint32(0, m.pk).unwrap();
    builder.set_str(1, &m.text).unwrap();
    builder.set_fp64(2, m.real).unwrap();
    builder.set_datetime(3, DateTime(m.time)).unwrap();
    builder.build()
}

fn setup() -> (Db, TableName) {
    let schema = TableSchema::builder("mesh")
        .column("pk", ColType::Uint32, IndexKind::PRIMARY_UNIQUE)
        .unwrap()
        .column("str", ColType::Str, IndexKind::SECONDARY_UNIQUE_REVERSED)
        .unwrap()
        .column("real", ColType::Fp64, IndexKind::SECONDARY_WITH_DUPS)
        .unwrap()
        .column("time", ColType::DateTime, IndexKind::NONE)
        .unwrap()
        .build()
        .unwrap();

    let db = Db::new();
    let txn = db.begin_write();
    txn.create_table(&schema).unwrap();
    txn.commit().unwrap();
    (db, TableName::new(schema))
}

/// Deterministic value mesh: a small LCG drives every derived value.
fn mesh(seed: u32) -> u32 {
    seed.wrapping_mul(1664525).wrapping_add(1013904223)
}

fn text_for(tag: u32) -> String {
    // varied lengths and shared suffixes exercise the reverse comparator
    let stem = match tag % 3 {
        0 => "mesh",
        1 => "lattice",
        _ => "weave",
    };
    format!("{stem}-{:04}", tag % 1000)
}

fn real_for(tag: u32) -> f64 {
    // deliberately few distinct values so the fp64 index carries dups
    ((tag % 7) as f64) * 1.5 - 3.0
}

fn initial(i: u32) -> Model {
    let tag = mesh(i);
    Model {
        pk: i * 3 + 1,
        text: text_for(tag),
        real: real_for(tag),
        time: 1_000_000 + u64::from(tag % 512),
    }
}

/// Reverse-byte-order string comparison with shorter-first tiebreak,
/// mirroring the reversed index comparator.
fn reverse_cmp(a: &str, b: &str) -> std::cmp::Ordering {
    let (ab, bb) = (a.as_bytes(), b.as_bytes());
    for (x, y) in ab.iter().rev().zip(bb.iter().rev()) {
        match x.cmp(y) {
            std::cmp::Ordering::Equal => {}
            other => return other,
        }
    }
    ab.len().cmp(&bb.len())
}

fn enumerate_pk_order(db: &Db, table: &TableName) -> Vec<Model> {
    enumerate(db, table, "pk")
}

fn enumerate(db: &Db, table: &TableName, column: &str) -> Vec<Model> {
    let txn = db.begin_read();
    let col = ColumnName::new(table, column).unwrap();
    let mut cursor = txn
        .cursor(&col)
        .order(CursorOrder::Ascending)
        .dont_fetch()
        .open()
        .unwrap();

    let mut out = Vec::new();
    let mut rc = cursor.move_to(Seek::First);
    while rc.is_ok() {
        let row = cursor.get().unwrap();
        let view = row.view();
        out.push(Model {
            pk: view.field(0, ColType::Uint32).unwrap().as_u32(),
            text: view
                .field(1, ColType::Str)
                .unwrap()
                .as_str()
                .unwrap()
                .to_string(),
            real: view.field(2, ColType::Fp64).unwrap().as_f64(),
            time: view.field(3, ColType::DateTime).unwrap().as_u64(),
        });
        rc = cursor.move_to(Seek::Next);
    }
    out
}

/// Checks all three cursors against the model's expected orders.
fn verify(db: &Db, table: &TableName, model: &[Model]) {
    let mut by_pk = model.to_vec();
    by_pk.sort_by_key(|m| m.pk);
    assert_eq!(enumerate_pk_order(db, table), by_pk, "primary order");

    let mut by_str = model.to_vec();
    by_str.sort_by(|a, b| reverse_cmp(&a.text, &b.text));
    assert_eq!(enumerate(db, table, "str"), by_str, "reversed string order");

    let mut by_real = model.to_vec();
    by_real.sort_by(|a, b| {
        a.real
            .partial_cmp(&b.real)
            .unwrap()
            .then_with(|| a.pk.cmp(&b.pk))
    });
    assert_eq!(
        enumerate(db, table, "real"),
        by_real,
        "fp64 order with pk-ordered duplicates"
    );
}

#[test]
fn churn_keeps_every_index_consistent() {
    let (db, table) = setup();

    // unique texts: regenerate collisions deterministically
    let mut used = BTreeSet::new();
    let mut model: Vec<Model> = Vec::new();
    for i in 0..N {
        let mut m = initial(i);
        let mut bump = 0;
        while !used.insert(m.text.clone()) {
            bump += 1;
            m.text = text_for(mesh(i.wrapping_add(bump * 7919)));
        }
        model.push(m);
    }

    let txn = db.begin_write();
    for m in &model {
        txn.insert_row(&table, &make_row(m).view()).unwrap();
    }
    txn.commit().unwrap();
    verify(&db, &table, &model);

    // churn: each row gets a different subset of columns rewritten
    let txn = db.begin_write();
    for (i, m) in model.iter_mut().enumerate() {
        let tag = mesh(m.pk ^ (i as u32));
        match i % 4 {
            0 => {
                // time only: no index movement at all
                m.time = m.time.wrapping_add(17);
                txn.update_row(&table, &make_row(m).view()).unwrap();
            }
            1 => {
                // real only: the non-unique index moves
                m.real = real_for(tag);
                txn.update_row(&table, &make_row(m).view()).unwrap();
            }
            2 => {
                // str only: the unique reversed index moves
                let mut bump = 0;
                let mut text = text_for(tag);
                while !used.insert(text.clone()) {
                    bump += 1;
                    text = text_for(mesh(tag.wrapping_add(bump * 104729)));
                }
                used.remove(&m.text);
                m.text = text;
                txn.update_row(&table, &make_row(m).view()).unwrap();
            }
            _ => {
                // pk change: expressed as delete + insert
                let old = make_row(m);
                m.pk = m.pk.wrapping_add(100_000);
                m.real = real_for(tag ^ 0xa5a5);
                txn.delete_row(&table, &old.view()).unwrap();
                txn.insert_row(&table, &make_row(m).view()).unwrap();
            }
        }
    }
    txn.commit().unwrap();
    verify(&db, &table, &model);

    // a deletion wave, then verify the survivors once more
    let txn = db.begin_write();
    let mut survivors = Vec::new();
    for (i, m) in model.iter().enumerate() {
        if i % 3 == 0 {
            txn.delete_row(&table, &make_row(m).view()).unwrap();
        } else {
            survivors.push(m.clone());
        }
    }
    txn.commit().unwrap();
    verify(&db, &table, &survivors);
}

#[test]
fn cursor_update_churn_via_secondary_index() {
    let (db, table) = setup();
    let mut model: Vec<Model> = (0..12).map(initial).collect();
    // force unique texts
    for (i, m) in model.iter_mut().enumerate() {
        m.text = format!("row-{i:03}");
    }

    let txn = db.begin_write();
    for m in &model {
        txn.insert_row(&table, &make_row(m).view()).unwrap();
    }

    // through a cursor on the reversed string index, rewrite the real
    // column of every row (the cursor's own key stays fixed)
    let str_col = ColumnName::new(&table, "str").unwrap();
    for m in model.iter_mut() {
        let mut cursor = txn.cursor(&str_col).unsorted().dont_fetch().open().unwrap();
        cursor
            .locate(true, &tabula::Value::str(&m.text))
            .unwrap();
        m.real = 42.0;
        let updated = make_row(m);
        cursor.validate_update(&updated.view()).unwrap();
        cursor.update(&updated.view()).unwrap();
    }
    txn.commit().unwrap();
    verify(&db, &table, &model);
}
