//! # Filter Evaluator
//!
//! A filter is a predicate tree evaluated against candidate rows during
//! cursor traversal. Leaves are a whole-row predicate, a per-column
//! predicate over the raw field payload, or a column-versus-constant
//! comparison; internal nodes are `and`, `or`, `not`.
//!
//! Evaluation is strict and total: an absent field makes its leaf false,
//! and an incomparable pairing (wrong type, NaN) makes a comparison false
//! for every operator, `!=` included. A rejected row is stepped over by
//! the cursor, never surfaced as an error.

use std::cmp::Ordering;

use eyre::Result;

use crate::errors::{fault, ErrorKind};
use crate::rows::{FieldView, RowView};
use crate::schema::ColumnName;
use crate::types::{ColType, Value};

/// Comparison operator for [`Filter::Compare`] leaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    fn admits(self, ordering: Ordering) -> bool {
        match self {
            CmpOp::Eq => ordering == Ordering::Equal,
            CmpOp::Ne => ordering != Ordering::Equal,
            CmpOp::Lt => ordering == Ordering::Less,
            CmpOp::Le => ordering != Ordering::Greater,
            CmpOp::Gt => ordering == Ordering::Greater,
            CmpOp::Ge => ordering != Ordering::Less,
        }
    }
}

/// Predicate tree over row fields.
pub enum Filter<'a> {
    And(Vec<Filter<'a>>),
    Or(Vec<Filter<'a>>),
    Not(Box<Filter<'a>>),
    /// Arbitrary predicate over the whole row.
    Row(Box<dyn Fn(&RowView<'_>) -> bool + 'a>),
    /// Predicate over one column's raw payload; receives `None` when the
    /// field is absent.
    Column {
        order: u32,
        ctype: ColType,
        pred: Box<dyn Fn(Option<FieldView<'_>>) -> bool + 'a>,
    },
    /// Column compared against a constant.
    Compare {
        order: u32,
        ctype: ColType,
        op: CmpOp,
        value: Value<'a>,
    },
}

impl<'a> Filter<'a> {
    /// Comparison leaf for a named column.
    pub fn compare(column: &ColumnName, op: CmpOp, value: Value<'a>) -> Self {
        Filter::Compare {
            order: column.order(),
            ctype: column.shove().col_type(),
            op,
            value,
        }
    }

    /// Column-predicate leaf for a named column.
    pub fn column(
        column: &ColumnName,
        pred: impl Fn(Option<FieldView<'_>>) -> bool + 'a,
    ) -> Self {
        Filter::Column {
            order: column.order(),
            ctype: column.shove().col_type(),
            pred: Box::new(pred),
        }
    }

    /// Whole-row predicate leaf.
    pub fn row(pred: impl Fn(&RowView<'_>) -> bool + 'a) -> Self {
        Filter::Row(Box::new(pred))
    }

    /// Rejects trees that can never evaluate meaningfully.
    pub(crate) fn validate(&self) -> Result<()> {
        match self {
            Filter::And(nodes) | Filter::Or(nodes) => {
                for node in nodes {
                    node.validate()?;
                }
                Ok(())
            }
            Filter::Not(node) => node.validate(),
            Filter::Row(_) | Filter::Column { .. } => Ok(()),
            Filter::Compare { value, .. } => {
                if value.is_null() || value.is_range_bound() {
                    fault(ErrorKind::InvalidArgument)
                } else {
                    Ok(())
                }
            }
        }
    }

    /// Evaluates the tree against one row.
    pub fn matches(&self, row: &RowView<'_>) -> bool {
        match self {
            Filter::And(nodes) => nodes.iter().all(|node| node.matches(row)),
            Filter::Or(nodes) => nodes.iter().any(|node| node.matches(row)),
            Filter::Not(node) => !node.matches(row),
            Filter::Row(pred) => pred(row),
            Filter::Column { order, ctype, pred } => pred(row.field(*order, *ctype)),
            Filter::Compare {
                order,
                ctype,
                op,
                value,
            } => match row.field(*order, *ctype) {
                Some(field) => match cmp_field_value(&field, value) {
                    Some(ordering) => op.admits(ordering),
                    None => false,
                },
                None => false,
            },
        }
    }
}

impl std::fmt::Debug for Filter<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Filter::And(nodes) => f.debug_tuple("And").field(&nodes.len()).finish(),
            Filter::Or(nodes) => f.debug_tuple("Or").field(&nodes.len()).finish(),
            Filter::Not(_) => f.write_str("Not(..)"),
            Filter::Row(_) => f.write_str("Row(fn)"),
            Filter::Column { order, ctype, .. } => {
                write!(f, "Column(#{order}: {ctype:?}, fn)")
            }
            Filter::Compare {
                order,
                ctype,
                op,
                value,
            } => write!(f, "Compare(#{order}: {ctype:?} {op:?} {value:?})"),
        }
    }
}

/// Compares a field payload against a constant, `None` when the pairing
/// is incomparable.
fn cmp_field_value(field: &FieldView<'_>, value: &Value<'_>) -> Option<Ordering> {
    match field.col_type() {
        ColType::Uint16 => cmp_int(field.as_u16() as i128, value),
        ColType::Uint32 => cmp_int(field.as_u32() as i128, value),
        ColType::Uint64 => cmp_int(field.as_u64() as i128, value),
        ColType::Int32 => cmp_int(field.as_i32() as i128, value),
        ColType::Int64 => cmp_int(field.as_i64() as i128, value),
        ColType::Fp32 => cmp_float(field.as_f32() as f64, value),
        ColType::Fp64 => cmp_float(field.as_f64(), value),
        ColType::DateTime => match value {
            Value::DateTime(dt) => Some(field.as_u64().cmp(&dt.0)),
            _ => None,
        },
        ColType::Str => match value {
            Value::Str(s) => Some(field.as_bytes().cmp(s.as_bytes())),
            _ => None,
        },
        ColType::Opaque
        | ColType::Bin96
        | ColType::Bin128
        | ColType::Bin160
        | ColType::Bin256
        | ColType::Nested => match value {
            Value::Bin(b) => Some(field.as_bytes().cmp(b)),
            _ => None,
        },
    }
}

fn cmp_int(field: i128, value: &Value<'_>) -> Option<Ordering> {
    match value {
        Value::Sint(s) => Some(field.cmp(&(*s as i128))),
        Value::Uint(u) => Some(field.cmp(&(*u as i128))),
        _ => None,
    }
}

fn cmp_float(field: f64, value: &Value<'_>) -> Option<Ordering> {
    match value {
        Value::Float(f) => field.partial_cmp(f),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rows::{Row, RowBuilder};

    fn row(n: i32, extra: i32) -> Row {
        let mut b = RowBuilder::new();
        b.set_int32(0, n).unwrap();
        b.set_int32(1, extra).unwrap();
        b.build()
    }

    fn compare_leaf(order: u32, op: CmpOp, value: Value<'static>) -> Filter<'static> {
        Filter::Compare {
            order,
            ctype: ColType::Int32,
            op,
            value,
        }
    }

    #[test]
    fn comparison_operators() {
        let r = row(10, 0);
        let v = r.view();
        assert!(compare_leaf(0, CmpOp::Eq, Value::Sint(10)).matches(&v));
        assert!(compare_leaf(0, CmpOp::Ne, Value::Sint(11)).matches(&v));
        assert!(compare_leaf(0, CmpOp::Lt, Value::Sint(11)).matches(&v));
        assert!(compare_leaf(0, CmpOp::Le, Value::Sint(10)).matches(&v));
        assert!(compare_leaf(0, CmpOp::Gt, Value::Sint(9)).matches(&v));
        assert!(compare_leaf(0, CmpOp::Ge, Value::Sint(10)).matches(&v));
        assert!(!compare_leaf(0, CmpOp::Lt, Value::Sint(10)).matches(&v));
    }

    #[test]
    fn signed_unsigned_constants_interchange() {
        let r = row(10, 0);
        assert!(compare_leaf(0, CmpOp::Eq, Value::Uint(10)).matches(&r.view()));
        let neg = row(-3, 0);
        assert!(compare_leaf(0, CmpOp::Lt, Value::Uint(0)).matches(&neg.view()));
    }

    #[test]
    fn absent_field_is_false_for_every_operator() {
        let r = row(10, 0);
        let v = r.view();
        for op in [CmpOp::Eq, CmpOp::Ne, CmpOp::Lt, CmpOp::Le, CmpOp::Gt, CmpOp::Ge] {
            assert!(!compare_leaf(9, op, Value::Sint(10)).matches(&v));
        }
    }

    #[test]
    fn incomparable_pairing_is_false_even_for_ne() {
        let r = row(10, 0);
        assert!(!compare_leaf(0, CmpOp::Ne, Value::str("ten")).matches(&r.view()));
    }

    #[test]
    fn boolean_nodes_compose() {
        let r = row(10, 3);
        let v = r.view();
        let both = Filter::And(vec![
            compare_leaf(0, CmpOp::Eq, Value::Sint(10)),
            compare_leaf(1, CmpOp::Eq, Value::Sint(3)),
        ]);
        assert!(both.matches(&v));

        let either = Filter::Or(vec![
            compare_leaf(0, CmpOp::Eq, Value::Sint(99)),
            compare_leaf(1, CmpOp::Eq, Value::Sint(3)),
        ]);
        assert!(either.matches(&v));

        let negated = Filter::Not(Box::new(compare_leaf(0, CmpOp::Eq, Value::Sint(99))));
        assert!(negated.matches(&v));
    }

    #[test]
    fn row_and_column_predicates() {
        let r = row(10, 3);
        let v = r.view();
        let by_row = Filter::Row(Box::new(|row: &RowView<'_>| row.field_count() == 2));
        assert!(by_row.matches(&v));

        let by_column = Filter::Column {
            order: 1,
            ctype: ColType::Int32,
            pred: Box::new(|field| matches!(field, Some(f) if f.as_i32() == 3)),
        };
        assert!(by_column.matches(&v));

        let absent = Filter::Column {
            order: 9,
            ctype: ColType::Int32,
            pred: Box::new(|field| field.is_some()),
        };
        assert!(!absent.matches(&v));
    }

    #[test]
    fn validate_rejects_sentinel_constants() {
        for bad in [Value::Null, Value::Begin, Value::End] {
            let filter = compare_leaf(0, CmpOp::Eq, bad);
            assert!(filter.validate().is_err());
        }
        let nested = Filter::And(vec![compare_leaf(0, CmpOp::Eq, Value::Null)]);
        assert!(nested.validate().is_err());
    }
}
