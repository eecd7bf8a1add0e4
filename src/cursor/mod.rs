//! # Cursor Engine
//!
//! Positioned iteration over one index: seek, step, range clipping,
//! filter integration, descending-order emulation, and row-level mutation
//! through the cursor.
//!
//! ## States
//!
//! A cursor is in exactly one of four states:
//!
//! - `Filled`: positioned on an entry; the current key is an owned copy of
//!   the entry's key bytes.
//! - `BeforeFirst` / `AfterLast`: defined end-of-range states that can be
//!   resumed with `next` / `prev` respectively.
//! - `Poor`: undefined; every read fails until the cursor is re-seeked.
//!
//! ## Descending emulation
//!
//! The store is natively ascending. A descending cursor inverts the
//! public seek operation once, up front ([`Seek::invert`]), and the inner
//! seek routine applies two correction rules after range seeks (see
//! [`seek`](module@crate::cursor) internals). Keeping both in one place is
//! deliberate: this is the most error-prone locus of the engine.
//!
//! ## Module layout
//!
//! - `mod.rs`: cursor struct, open/builder, movement, locate, accessors
//! - `seek.rs`: the single inner seek-and-step routine
//! - `mutate.rs`: delete, update, and update validation through the cursor

mod mutate;
mod seek;

use std::sync::Arc;

use eyre::Result;

use crate::encoding::{is_index_compat, key_to_value, row_to_key, value_to_key, IndexKey};
use crate::errors::{fault, is_kind, ErrorKind};
use crate::filter::Filter;
use crate::kv::mem::{Dbi, RawCursor, Txn};
use crate::kv::{Buf, SeekOp};
use crate::rows::{Row, RowView};
use crate::schema::{ColumnName, TableSchema};
use crate::types::{Shove, Value};

/// Row ordering of a cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorOrder {
    Ascending,
    Descending,
    /// No ordering promise; the only option valid on unordered indexes.
    Unsorted,
}

/// Public cursor movement operations.
///
/// For descending cursors each operation is inverted once before being
/// translated to KV primitives: `first`↔`last`, `next`↔`prev`,
/// `key-next`↔`key-prev`, `dup-first`↔`dup-last`, `dup-next`↔`dup-prev`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Seek {
    First,
    Last,
    Next,
    Prev,
    /// Next distinct key, skipping remaining duplicates.
    KeyNext,
    /// Previous distinct key.
    KeyPrev,
    DupFirst,
    DupLast,
    DupNext,
    DupPrev,
}

impl Seek {
    pub(crate) fn invert(self) -> Self {
        match self {
            Seek::First => Seek::Last,
            Seek::Last => Seek::First,
            Seek::Next => Seek::Prev,
            Seek::Prev => Seek::Next,
            Seek::KeyNext => Seek::KeyPrev,
            Seek::KeyPrev => Seek::KeyNext,
            Seek::DupFirst => Seek::DupLast,
            Seek::DupLast => Seek::DupFirst,
            Seek::DupNext => Seek::DupPrev,
            Seek::DupPrev => Seek::DupNext,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum State {
    Poor,
    BeforeFirst,
    AfterLast,
    Filled,
}

/// A positioned cursor over one index, bound to a transaction.
pub struct Cursor<'t> {
    pub(crate) txn: &'t Txn,
    pub(crate) order: CursorOrder,
    pub(crate) filter: Option<&'t Filter<'t>>,
    pub(crate) schema: Arc<TableSchema>,
    pub(crate) table_dbi: Dbi,
    pub(crate) index_shove: Shove,
    pub(crate) index_dbi: Dbi,
    pub(crate) kv: RawCursor<'t>,
    pub(crate) range_from: Option<IndexKey<'static>>,
    pub(crate) range_to: Option<IndexKey<'static>>,
    pub(crate) state: State,
    pub(crate) current: Option<Buf>,
}

impl<'t> std::fmt::Debug for Cursor<'t> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor")
            .field("order", &self.order)
            .field("table_dbi", &self.table_dbi)
            .field("index_dbi", &self.index_dbi)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

/// Configures and opens a [`Cursor`]; obtained from [`Txn::cursor`].
pub struct CursorBuilder<'t> {
    txn: &'t Txn,
    column: ColumnName,
    range_from: Value<'t>,
    range_to: Value<'t>,
    filter: Option<&'t Filter<'t>>,
    order: CursorOrder,
    dont_fetch: bool,
}

impl Txn {
    /// Starts building a cursor over the index of `column`.
    pub fn cursor<'t>(&'t self, column: &ColumnName) -> CursorBuilder<'t> {
        CursorBuilder {
            txn: self,
            column: column.clone(),
            range_from: Value::Begin,
            range_to: Value::End,
            filter: None,
            order: CursorOrder::Ascending,
            dont_fetch: false,
        }
    }
}

impl<'t> CursorBuilder<'t> {
    /// Clips the cursor to `[from, to)`; `Begin`/`End` leave a side open.
    pub fn range(mut self, from: Value<'t>, to: Value<'t>) -> Self {
        self.range_from = from;
        self.range_to = to;
        self
    }

    pub fn filter(mut self, filter: &'t Filter<'t>) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn order(mut self, order: CursorOrder) -> Self {
        self.order = order;
        self
    }

    pub fn ascending(self) -> Self {
        self.order(CursorOrder::Ascending)
    }

    pub fn descending(self) -> Self {
        self.order(CursorOrder::Descending)
    }

    pub fn unsorted(self) -> Self {
        self.order(CursorOrder::Unsorted)
    }

    /// Skips the initial `first` move; the cursor opens poor.
    pub fn dont_fetch(mut self) -> Self {
        self.dont_fetch = true;
        self
    }

    /// Validates the configuration and opens the cursor.
    pub fn open(self) -> Result<Cursor<'t>> {
        let txn = self.txn;
        self.column.refresh_couple(txn)?;

        let shove = self.column.shove();
        let index = shove.index();
        if !index.is_indexed() {
            return fault(ErrorKind::NoIndex);
        }
        if !index.is_ordered() && self.order != CursorOrder::Unsorted {
            return fault(ErrorKind::NoIndex);
        }
        if !is_index_compat(shove, &self.range_from) || !is_index_compat(shove, &self.range_to) {
            return fault(ErrorKind::TypeMismatch);
        }
        if matches!(self.range_from, Value::End) || matches!(self.range_to, Value::Begin) {
            return fault(ErrorKind::InvalidArgument);
        }
        if let Some(filter) = self.filter {
            filter.validate()?;
        }

        let range_from = match &self.range_from {
            Value::Begin => None,
            bound => Some(value_to_key(shove, bound, true, txn.config())?.to_owned_key()),
        };
        let range_to = match &self.range_to {
            Value::End => None,
            bound => Some(value_to_key(shove, bound, true, txn.config())?.to_owned_key()),
        };

        let kv = txn.raw_cursor(self.column.dbi())?;
        let mut cursor = Cursor {
            txn,
            order: self.order,
            filter: self.filter,
            schema: self.column.table().schema().clone(),
            table_dbi: self.column.table().dbi(),
            index_shove: shove,
            index_dbi: self.column.dbi(),
            kv,
            range_from,
            range_to,
            state: State::Poor,
            current: None,
        };

        if !self.dont_fetch {
            cursor.move_to(Seek::First)?;
        }
        Ok(cursor)
    }
}

impl<'t> Cursor<'t> {
    pub(crate) fn is_descending(&self) -> bool {
        self.order == CursorOrder::Descending
    }

    pub(crate) fn index_order(&self) -> u32 {
        self.index_shove.order()
    }

    pub(crate) fn index_is_primary(&self) -> bool {
        self.index_shove.index().is_primary()
    }

    pub fn is_filled(&self) -> bool {
        self.state == State::Filled
    }

    pub(crate) fn set_poor(&mut self) {
        self.state = State::Poor;
        self.current = None;
    }

    pub(crate) fn set_eof(&mut self, state: State) {
        debug_assert!(matches!(state, State::BeforeFirst | State::AfterLast));
        self.state = state;
        self.current = None;
    }

    /// The error matching the current non-filled state.
    pub(crate) fn unladed_err<T>(&self) -> Result<T> {
        if self.state == State::Poor {
            fault(ErrorKind::CursorInvalid)
        } else {
            fault(ErrorKind::NoData)
        }
    }

    fn require_write(&self) -> Result<()> {
        if self.txn.is_write() {
            Ok(())
        } else {
            fault(ErrorKind::InvalidArgument)
        }
    }

    /// Moves the cursor. Descending cursors run the inverted operation
    /// over the ascending store.
    pub fn move_to(&mut self, op: Seek) -> Result<()> {
        let op = if self.is_descending() { op.invert() } else { op };
        let index = self.index_shove.index();

        let (seek_op, step_op, seek_key): (SeekOp, SeekOp, Option<IndexKey<'static>>) = match op {
            Seek::First => {
                if self.range_from.is_none() || !index.is_ordered() {
                    (SeekOp::First, SeekOp::Next, None)
                } else {
                    (SeekOp::SetRange, SeekOp::Next, self.range_from.clone())
                }
            }
            Seek::Last => {
                if self.range_to.is_none() || !index.is_ordered() {
                    (SeekOp::Last, SeekOp::Prev, None)
                } else {
                    (SeekOp::SetRange, SeekOp::Prev, self.range_to.clone())
                }
            }
            Seek::Next => {
                if self.state == State::Poor {
                    return fault(ErrorKind::CursorInvalid);
                }
                let seek = if self.state == State::BeforeFirst {
                    SeekOp::First
                } else {
                    SeekOp::Next
                };
                (seek, SeekOp::Next, None)
            }
            Seek::Prev => {
                if self.state == State::Poor {
                    return fault(ErrorKind::CursorInvalid);
                }
                let seek = if self.state == State::AfterLast {
                    SeekOp::Last
                } else {
                    SeekOp::Prev
                };
                (seek, SeekOp::Prev, None)
            }
            Seek::KeyNext => {
                if self.state == State::Poor {
                    return fault(ErrorKind::CursorInvalid);
                }
                let seek = if self.state == State::BeforeFirst {
                    SeekOp::First
                } else {
                    SeekOp::NextNoDup
                };
                (seek, SeekOp::NextNoDup, None)
            }
            Seek::KeyPrev => {
                if self.state == State::Poor {
                    return fault(ErrorKind::CursorInvalid);
                }
                let seek = if self.state == State::AfterLast {
                    SeekOp::Last
                } else {
                    SeekOp::PrevNoDup
                };
                (seek, SeekOp::PrevNoDup, None)
            }
            Seek::DupFirst => {
                if !self.is_filled() {
                    return self.unladed_err();
                }
                if index.is_unique() {
                    return Ok(());
                }
                (SeekOp::FirstDup, SeekOp::NextDup, None)
            }
            Seek::DupLast => {
                if !self.is_filled() {
                    return self.unladed_err();
                }
                if index.is_unique() {
                    return Ok(());
                }
                (SeekOp::LastDup, SeekOp::PrevDup, None)
            }
            Seek::DupNext => {
                if !self.is_filled() {
                    return self.unladed_err();
                }
                if index.is_unique() {
                    return fault(ErrorKind::NoData);
                }
                (SeekOp::NextDup, SeekOp::NextDup, None)
            }
            Seek::DupPrev => {
                if !self.is_filled() {
                    return self.unladed_err();
                }
                if index.is_unique() {
                    return fault(ErrorKind::NoData);
                }
                (SeekOp::PrevDup, SeekOp::PrevDup, None)
            }
        };

        match seek_key {
            Some(key) => self.seek(seek_op, step_op, Some(key.bytes()), None),
            None => self.seek(seek_op, step_op, None, None),
        }
    }

    /// Positions the cursor at `key`. With `exact` unset, lands on the
    /// nearest entry in cursor order (rejected on unordered cursors when
    /// the engine is configured to prohibit it).
    pub fn locate(&mut self, exact: bool, key: &Value<'_>) -> Result<()> {
        self.locate_inner(exact, Some(key), None)
    }

    /// Positions the cursor by a row sample: the cursor's own key is
    /// derived from the sample, and on a non-unique secondary index the
    /// sample's primary-key column (when present) disambiguates between
    /// duplicates.
    ///
    /// On a non-unique *primary* index the full row bytes serve as the
    /// duplicate key, and only for inexact locate; exact locate by row on
    /// a primary uses the key alone.
    pub fn locate_row(&mut self, exact: bool, row: &RowView<'_>) -> Result<()> {
        self.locate_inner(exact, None, Some(row))
    }

    fn locate_inner(
        &mut self,
        mut exact: bool,
        key: Option<&Value<'_>>,
        row: Option<&RowView<'_>>,
    ) -> Result<()> {
        if self.order == CursorOrder::Unsorted {
            if self.txn.config().prohibit_nearby_for_unordered && !exact {
                self.set_poor();
                return fault(ErrorKind::InvalidArgument);
            }
            exact = true;
        }

        let mut seek_op = if exact { SeekOp::SetKey } else { SeekOp::SetRange };
        let mut pk_key: Option<IndexKey<'_>> = None;
        let mut row_data: Option<&[u8]> = None;

        let seek_key = match (key, row) {
            (Some(value), None) => match value_to_key(self.index_shove, value, false, self.txn.config()) {
                Ok(key) => key,
                Err(err) => {
                    self.set_poor();
                    return Err(err);
                }
            },
            (None, Some(sample)) => {
                let seek_key =
                    match row_to_key(self.index_shove, self.index_order(), sample, false) {
                        Ok(key) => key,
                        Err(err) => {
                            self.set_poor();
                            return Err(err);
                        }
                    };
                let index = self.index_shove.index();
                if index.is_secondary() {
                    if !index.is_unique() {
                        // Use the sample's primary key to disambiguate
                        // between duplicates, when the sample carries one.
                        match row_to_key(self.schema.pk_shove(), 0, sample, false) {
                            Ok(pk) => {
                                pk_key = Some(pk);
                                seek_op = if exact {
                                    SeekOp::GetBoth
                                } else {
                                    SeekOp::GetBothRange
                                };
                            }
                            Err(err) if is_kind(&err, ErrorKind::ColumnMissing) => {}
                            Err(err) => {
                                self.set_poor();
                                return Err(err);
                            }
                        }
                    }
                } else if !exact && !index.is_unique() {
                    // Non-unique primary: the whole row is the dup key.
                    row_data = Some(sample.bytes());
                    seek_op = SeekOp::GetBothRange;
                }
                seek_key
            }
            _ => {
                // Exactly one of key or row sample must be supplied.
                self.set_poor();
                return fault(ErrorKind::InvalidArgument);
            }
        };

        let step_op = if self.is_descending() {
            SeekOp::Prev
        } else {
            SeekOp::Next
        };
        let seek_data = pk_key.as_ref().map(|key| key.bytes()).or(row_data);

        if let Err(err) = self.seek(seek_op, step_op, Some(seek_key.bytes()), seek_data) {
            self.set_poor();
            return Err(err);
        }

        if !self.is_descending() {
            return Ok(());
        }

        // Descending: walk back across the lower bound the ascending
        // seek landed on.
        while !exact {
            let current = self.current.clone().expect("seek left the cursor filled");
            let cmp = self.txn.cmp(self.index_dbi, &current, seek_key.bytes());
            if cmp == std::cmp::Ordering::Less {
                return Ok(());
            }
            if cmp == std::cmp::Ordering::Equal {
                let Some(target) = seek_data else {
                    // No duplicate disambiguation: fall through to the
                    // last-duplicate reposition below.
                    break;
                };
                let (_, data) = match self.kv.get(SeekOp::GetCurrent, None, None) {
                    Ok(found) => found,
                    Err(err) => {
                        self.set_poor();
                        return Err(err);
                    }
                };
                if self.txn.dcmp(self.index_dbi, &data, target) != std::cmp::Ordering::Greater {
                    return Ok(());
                }
            }
            if let Err(err) = self.seek(SeekOp::Prev, SeekOp::Prev, None, None) {
                self.set_poor();
                return Err(err);
            }
        }

        // Among equal keys, descending order starts at the last duplicate.
        if !self.index_shove.index().is_unique() {
            let dups = match self.kv.dup_count() {
                Ok(dups) => dups,
                Err(_) => {
                    self.set_poor();
                    return fault(ErrorKind::InternalOops);
                }
            };
            if dups > 1 {
                if let Err(err) = self.seek(SeekOp::LastDup, SeekOp::Prev, None, None) {
                    self.set_poor();
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    /// `Ok` when the cursor is positioned on a row.
    pub fn eof(&self) -> Result<()> {
        if self.is_filled() {
            Ok(())
        } else {
            fault(ErrorKind::NoData)
        }
    }

    /// Counts matching rows from the start of the range, up to `limit`.
    /// The cursor ends poor and must be re-seeked.
    pub fn count(&mut self, limit: usize) -> Result<usize> {
        let mut count = 0usize;
        let mut rc = self.move_to(Seek::First);
        while rc.is_ok() && count < limit {
            count += 1;
            rc = self.move_to(Seek::Next);
        }
        self.set_poor();
        match rc {
            Ok(()) => Ok(count),
            Err(err) if is_kind(&err, ErrorKind::NoData) => Ok(count),
            Err(err) => Err(err),
        }
    }

    /// Number of duplicates at the current position (1 on a unique index).
    pub fn dups(&mut self) -> Result<usize> {
        if !self.is_filled() {
            return self.unladed_err();
        }
        match self.kv.dup_count() {
            Ok(dups) => Ok(dups),
            Err(err) if is_kind(&err, ErrorKind::NotFound) => fault(ErrorKind::NoData),
            Err(err) => Err(err),
        }
    }

    /// Decodes the current index key back into a value.
    pub fn key(&self) -> Result<Value<'static>> {
        if !self.is_filled() {
            return self.unladed_err();
        }
        let current = self.current.as_ref().expect("filled cursor has a key");
        Ok(key_to_value(self.index_shove, current)?.to_owned_static())
    }

    /// Materializes the row at the cursor position. For a secondary
    /// cursor this resolves the primary row; a broken secondary-to-primary
    /// link reports `IndexCorrupted`.
    pub fn get(&mut self) -> Result<Row> {
        if !self.is_filled() {
            return self.unladed_err();
        }
        let (_, data) = self.kv.get(SeekOp::GetCurrent, None, None)?;
        if self.index_is_primary() {
            return Ok(Row::from_arc(data));
        }
        match self.txn.get(self.table_dbi, &data) {
            Ok(row) => Ok(Row::from_arc(row)),
            Err(err) if is_kind(&err, ErrorKind::NotFound) => fault(ErrorKind::IndexCorrupted),
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seek_inversion_pairs() {
        let pairs = [
            (Seek::First, Seek::Last),
            (Seek::Next, Seek::Prev),
            (Seek::KeyNext, Seek::KeyPrev),
            (Seek::DupFirst, Seek::DupLast),
            (Seek::DupNext, Seek::DupPrev),
        ];
        for (a, b) in pairs {
            assert_eq!(a.invert(), b);
            assert_eq!(b.invert(), a);
            assert_eq!(a.invert().invert(), a);
        }
    }
}
