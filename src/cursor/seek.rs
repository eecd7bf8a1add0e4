//! # The Inner Seek-and-Step Routine
//!
//! Every cursor movement reduces to [`Cursor::seek`]: one KV seek, the
//! descending range-seek corrections, range clipping, row resolution for
//! filtering, and the filter loop, with every end-of-data outcome mapped
//! to a defined cursor state.
//!
//! ## Descending corrections
//!
//! The native `set-range` positions like an ascending `lower_bound`. A
//! descending cursor needs the other side of that bound, so after a range
//! seek:
//!
//! 1. `not-found` while the KV cursor sits on the physically last entry
//!    means every key is below the target: re-seek to `last`, the first
//!    position in descending order.
//! 2. A landed key below the target while on the physically first entry
//!    means nothing can satisfy the bound: report end-of-data.
//!
//! The final refinement (exact-match repositioning onto the last
//! duplicate) lives in the locate path.
//!
//! ## Range clipping
//!
//! A landed key below `range_from` or at/above `range_to` is stepped over
//! or ends the scan. Stepping across a bound promotes `next`/`prev` to
//! their no-dup forms, since every duplicate shares the out-of-range key;
//! stepping *toward* recovery (rather than ending) on the far side of a
//! bound is only meaningful for unordered indexes, where key order says
//! nothing about range membership.

use eyre::Result;

use crate::cursor::{Cursor, State};
use crate::errors::{fault, is_kind, ErrorKind};
use crate::kv::{Buf, SeekOp};
use crate::rows::RowView;

enum Clip {
    /// Keep scanning with the (possibly promoted) step op.
    Step,
    /// The scan cannot re-enter the range.
    End,
}

impl<'t> Cursor<'t> {
    /// Maps an exhausted scan to the cursor state implied by the original
    /// seek operation, which encodes whether the cursor may be resumed.
    fn seek_exhausted<T>(&mut self, seek_op: SeekOp) -> Result<T> {
        match seek_op {
            SeekOp::Next | SeekOp::NextNoDup => {
                self.set_eof(State::AfterLast);
                fault(ErrorKind::NoData)
            }
            SeekOp::Prev | SeekOp::PrevNoDup => {
                self.set_eof(State::BeforeFirst);
                fault(ErrorKind::NoData)
            }
            // Walking off the duplicates of one key leaves the cursor
            // positioned and resumable.
            SeekOp::NextDup | SeekOp::PrevDup => fault(ErrorKind::NoData),
            _ => {
                self.set_poor();
                fault(ErrorKind::NoData)
            }
        }
    }

    /// One KV seek plus the step-filter-clip loop.
    ///
    /// `seek_key`/`seek_data` parameterize the positioning seeks
    /// (`set-key`, `set-range`, `get-both`, `get-both-range`); plain
    /// movement passes `None`.
    pub(crate) fn seek(
        &mut self,
        seek_op: SeekOp,
        step_op: SeekOp,
        seek_key: Option<&[u8]>,
        seek_data: Option<&[u8]>,
    ) -> Result<()> {
        let mut landed = self.kv.get(seek_op, seek_key, seek_data);

        if self.is_descending()
            && matches!(seek_op, SeekOp::SetRange | SeekOp::GetBothRange)
            && seek_key.is_some()
        {
            let target = seek_key.expect("range seeks carry a key");
            let mut reseek_last = false;
            match &landed {
                Ok((key, _)) => {
                    // Rule 2: below the target on the physically first
                    // entry means end-of-data for the descending scan.
                    if self.kv.on_first()?
                        && self.txn.cmp(self.index_dbi, key, target) == std::cmp::Ordering::Less
                    {
                        return self.seek_exhausted(seek_op);
                    }
                }
                Err(err) if is_kind(err, ErrorKind::NotFound) => {
                    // Rule 1: everything is below the target; the last
                    // entry is the first position in descending order.
                    reseek_last = self.kv.on_last()?;
                }
                Err(_) => {}
            }
            if reseek_last {
                landed = self.kv.get(SeekOp::Last, None, None);
            }
        }

        loop {
            let (key, data) = match landed {
                Ok(found) => found,
                Err(err) if is_kind(&err, ErrorKind::NotFound) => {
                    return self.seek_exhausted(seek_op);
                }
                Err(err) => {
                    self.set_poor();
                    return Err(err);
                }
            };

            // The cursor tracks the landed key through the whole loop, so
            // error exits below leave it positioned where the KV cursor is.
            self.current = Some(key.clone());
            self.state = State::Filled;

            let mut step = step_op;

            if let Some(from) = &self.range_from {
                if self.txn.cmp(self.index_dbi, &key, from.bytes()) == std::cmp::Ordering::Less {
                    let clip = match step {
                        // Duplicate-only steps never change the key.
                        SeekOp::NextDup | SeekOp::PrevDup => Clip::End,
                        SeekOp::Prev | SeekOp::PrevNoDup => {
                            // Toward smaller keys: recovery is possible
                            // only when key order is unrelated to range
                            // membership (hashed index).
                            step = SeekOp::PrevNoDup;
                            if self.index_shove.index().is_ordered() {
                                Clip::End
                            } else {
                                Clip::Step
                            }
                        }
                        SeekOp::Next | SeekOp::NextNoDup => {
                            step = SeekOp::NextNoDup;
                            Clip::Step
                        }
                        _ => {
                            self.set_poor();
                            return fault(ErrorKind::InternalOops);
                        }
                    };
                    match clip {
                        Clip::End => return self.seek_exhausted(seek_op),
                        Clip::Step => {
                            landed = self.kv.get(step, None, None);
                            continue;
                        }
                    }
                }
            }

            if let Some(to) = &self.range_to {
                if self.txn.cmp(self.index_dbi, &key, to.bytes()) != std::cmp::Ordering::Less {
                    let clip = match step {
                        SeekOp::NextDup | SeekOp::PrevDup => Clip::End,
                        SeekOp::Prev | SeekOp::PrevNoDup => {
                            step = SeekOp::PrevNoDup;
                            Clip::Step
                        }
                        SeekOp::Next | SeekOp::NextNoDup => {
                            step = SeekOp::NextNoDup;
                            if self.index_shove.index().is_ordered() {
                                Clip::End
                            } else {
                                Clip::Step
                            }
                        }
                        _ => {
                            self.set_poor();
                            return fault(ErrorKind::InternalOops);
                        }
                    };
                    match clip {
                        Clip::End => return self.seek_exhausted(seek_op),
                        Clip::Step => {
                            landed = self.kv.get(step, None, None);
                            continue;
                        }
                    }
                }
            }

            let Some(filter) = self.filter else {
                return Ok(());
            };

            let row_buf: Buf = if self.index_is_primary() {
                data
            } else {
                match self.txn.get(self.table_dbi, &data) {
                    Ok(row) => row,
                    Err(err) if is_kind(&err, ErrorKind::NotFound) => {
                        return fault(ErrorKind::IndexCorrupted);
                    }
                    Err(err) => return Err(err),
                }
            };
            let row = match RowView::new(&row_buf) {
                Ok(row) => row,
                Err(_) => return fault(ErrorKind::IndexCorrupted),
            };
            if filter.matches(&row) {
                return Ok(());
            }

            landed = self.kv.get(step, None, None);
        }
    }
}
