//! # Mutation Through the Cursor
//!
//! Delete and update at the cursor position, with coordinated secondary
//! upkeep reusing the table-level internals. The ordering rules here are
//! load-bearing:
//!
//! - The primary key driving secondary cleanup is copied to an owned
//!   buffer before the first mutation, so later writes cannot invalidate
//!   it.
//! - On update, the old row is read together with its stored key
//!   (`get_ex`) *before* any secondary is touched: updating secondaries
//!   first would lose the old primary key, updating the primary first
//!   would lose the old row.
//! - Any failure after the first secondary write escalates to
//!   `Inconsistent` and poisons the transaction.

use eyre::Result;

use crate::cursor::{Cursor, Seek, State};
use crate::errors::{fault, is_kind, ErrorKind};
use crate::kv::{Buf, PutFlags, SeekOp};
use crate::rows::RowView;
use crate::table::{check_constraints, inconsistent_abort, secondary_remove, secondary_upsert};

impl<'t> Cursor<'t> {
    fn current_matches(&self, key: &[u8]) -> bool {
        match &self.current {
            Some(current) => &current[..] == key,
            None => false,
        }
    }

    /// Reads the value at the cursor position, mapping a vanished entry
    /// to `IndexCorrupted`.
    fn current_value(&mut self) -> Result<Buf> {
        match self.kv.get(SeekOp::GetCurrent, None, None) {
            Ok((_, data)) => Ok(data),
            Err(err) => {
                self.set_poor();
                if is_kind(&err, ErrorKind::NotFound) {
                    fault(ErrorKind::IndexCorrupted)
                } else {
                    Err(err)
                }
            }
        }
    }

    /// Deletes the row at the cursor position and repositions the cursor
    /// onto the next row in cursor order (re-evaluating the filter, never
    /// skipping an already-matching row).
    pub fn delete(&mut self) -> Result<()> {
        self.require_write()?;
        if !self.is_filled() {
            return self.unladed_err();
        }

        if !self.schema.has_secondaries() {
            if let Err(err) = self.kv.del() {
                self.set_poor();
                return Err(err);
            }
        } else {
            // The cursor's current key (primary) or the secondary entry's
            // value (the primary key), cloned out before any mutation.
            let pk_key: Buf = if self.index_is_primary() {
                self.current.clone().expect("filled cursor has a key")
            } else {
                self.current_value()?
            };

            // Atomic read-old-plus-delete of the primary row; the old row
            // feeds the secondary cleanup below.
            let old_buf = match self.txn.replace_remove(self.table_dbi, &pk_key) {
                Ok(old) => old,
                Err(err) => {
                    self.set_poor();
                    return Err(err);
                }
            };
            let old_row = match RowView::new(&old_buf) {
                Ok(row) => row,
                Err(_) => {
                    self.set_poor();
                    return fault(ErrorKind::IndexCorrupted);
                }
            };

            if let Err(err) = secondary_remove(
                self.txn,
                &self.schema,
                &pk_key,
                &old_row,
                self.index_order(),
            ) {
                self.set_poor();
                return Err(inconsistent_abort(self.txn, err));
            }

            if !self.index_is_primary() {
                if let Err(err) = self.kv.del() {
                    self.set_poor();
                    return Err(inconsistent_abort(self.txn, err));
                }
            }
        }

        if self.is_descending() {
            // Descending order continues at the previous physical row.
            let _ = self.seek(SeekOp::Prev, SeekOp::Prev, None, None);
        } else if self.kv.eof()? {
            self.set_eof(State::AfterLast);
        } else {
            // The KV cursor already sits on the successor; re-evaluate it
            // against range and filter without stepping past it.
            let _ = self.seek(SeekOp::GetCurrent, SeekOp::Next, None, None);
        }

        if self.txn.config().enable_return_into_range
            && (self.range_from.is_some() || self.range_to.is_some())
            && !self.is_filled()
        {
            // The delete walked out of the range: re-enter it at the
            // nearest end instead of staying poor or at end-of-range.
            let _ = self.move_to(Seek::Last);
        }
        Ok(())
    }

    /// Pre-validates an update: the new row must produce the cursor's
    /// current key, and must not collide on any other unique secondary.
    pub fn validate_update(&mut self, new_row: &RowView<'_>) -> Result<()> {
        self.require_write()?;
        if !self.is_filled() {
            return self.unladed_err();
        }

        let column_key = row_to_key_for(self, new_row)?;
        if !self.current_matches(column_key.bytes()) {
            return fault(ErrorKind::KeyMismatch);
        }

        if !self.schema.has_secondaries() {
            return Ok(());
        }

        if self.index_is_primary() {
            let (_, present) = self.kv.get(SeekOp::GetCurrent, None, None)?;
            let present_row = RowView::new(&present)?;
            return check_constraints(self.txn, &self.schema, Some(&present_row), new_row, 0);
        }

        let (_, present_pk) = self.kv.get(SeekOp::GetCurrent, None, None)?;
        // The new row must carry a derivable primary key even before the
        // real update runs.
        crate::encoding::row_to_key(self.schema.pk_shove(), 0, new_row, false)?;

        let present_buf = match self.txn.get(self.table_dbi, &present_pk) {
            Ok(row) => row,
            Err(err) if is_kind(&err, ErrorKind::NotFound) => {
                return fault(ErrorKind::IndexCorrupted);
            }
            Err(err) => return Err(err),
        };
        let present_row = RowView::new(&present_buf)?;
        check_constraints(
            self.txn,
            &self.schema,
            Some(&present_row),
            new_row,
            self.index_order(),
        )
    }

    /// Replaces the row at the cursor position. The new row must keep the
    /// cursor's own key unchanged; the primary key may change when the
    /// cursor runs over a secondary index.
    pub fn update(&mut self, new_row: &RowView<'_>) -> Result<()> {
        self.require_write()?;
        if !self.is_filled() {
            return self.unladed_err();
        }

        let column_key = row_to_key_for(self, new_row)?;
        if !self.current_matches(column_key.bytes()) {
            return fault(ErrorKind::KeyMismatch);
        }

        if !self.schema.has_secondaries() {
            if let Err(err) = self.kv.put(
                column_key.bytes(),
                new_row.bytes(),
                PutFlags::CURRENT | PutFlags::NO_DUP_DATA,
            ) {
                self.set_poor();
                return Err(err);
            }
            return self.refresh_current();
        }

        let old_pk: Buf = if self.index_is_primary() {
            self.current.clone().expect("filled cursor has a key")
        } else {
            self.current_value()?
        };

        // Read the old row together with its stored key: the stored key
        // buffer outlives the secondary mutations, while `old_pk` may
        // point at an entry those mutations rewrite.
        let (stored_pk, old_buf) = match self.txn.get_ex(self.table_dbi, &old_pk) {
            Ok(found) => found,
            Err(err) => {
                self.set_poor();
                return if is_kind(&err, ErrorKind::NotFound) {
                    fault(ErrorKind::IndexCorrupted)
                } else {
                    Err(err)
                };
            }
        };
        let old_row = RowView::new(&old_buf)?;

        let new_pk = crate::encoding::row_to_key(self.schema.pk_shove(), 0, new_row, false)?;

        if let Err(err) = secondary_upsert(
            self.txn,
            &self.schema,
            &stored_pk,
            &old_row,
            new_pk.bytes(),
            new_row,
            self.index_order(),
        ) {
            self.set_poor();
            return Err(inconsistent_abort(self.txn, err));
        }

        let pk_changed = &stored_pk[..] != new_pk.bytes();
        if pk_changed {
            if let Err(err) = self.txn.del(self.table_dbi, &stored_pk, None) {
                self.set_poor();
                return Err(inconsistent_abort(self.txn, err));
            }
            if let Err(err) = self.txn.put(
                self.table_dbi,
                new_pk.bytes(),
                new_row.bytes(),
                PutFlags::NO_DUP_DATA | PutFlags::NO_OVERWRITE,
            ) {
                self.set_poor();
                return Err(inconsistent_abort(self.txn, err));
            }
            // Re-point the cursor's own secondary entry at the new
            // primary key.
            if let Err(err) = self.kv.put(
                column_key.bytes(),
                new_pk.bytes(),
                PutFlags::CURRENT | PutFlags::NO_DUP_DATA,
            ) {
                self.set_poor();
                return Err(inconsistent_abort(self.txn, err));
            }
        } else if let Err(err) = self.txn.put(
            self.table_dbi,
            new_pk.bytes(),
            new_row.bytes(),
            PutFlags::NONE,
        ) {
            self.set_poor();
            return Err(inconsistent_abort(self.txn, err));
        }

        if let Err(err) = self.refresh_current() {
            return Err(inconsistent_abort(self.txn, err));
        }
        Ok(())
    }

    /// Re-reads the current key after a write that may have relocated the
    /// entry.
    fn refresh_current(&mut self) -> Result<()> {
        match self.kv.get(SeekOp::GetCurrent, None, None) {
            Ok((key, _)) => {
                self.current = Some(key);
                self.state = State::Filled;
                Ok(())
            }
            Err(err) => {
                self.set_poor();
                Err(err)
            }
        }
    }
}

/// The cursor-key derivation every mutation starts from.
fn row_to_key_for<'r>(
    cursor: &Cursor<'_>,
    row: &RowView<'r>,
) -> Result<crate::encoding::IndexKey<'r>> {
    crate::encoding::row_to_key(cursor.index_shove, cursor.index_order(), row, false)
}
