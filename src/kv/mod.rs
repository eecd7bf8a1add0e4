//! # KV Engine Contract
//!
//! The tabular layer sits on an embedded, transactional, ordered key-value
//! store with named sub-databases. This module defines the exact contract
//! the layer consumes (sub-DB creation flags, cursor seek opcodes, put
//! flags, and comparator installation) together with [`mem`], a
//! self-contained in-memory implementation used by the test suite and by
//! anyone who wants the tables without an on-disk engine.
//!
//! ## Contract summary
//!
//! - Named sub-DB open with flags and a custom key comparator (plus a
//!   duplicate comparator for `DUP_SORT` sub-DBs).
//! - `get` / `put` / `del` / `replace_remove` (atomic read-old-then-delete)
//!   / `get_ex` (key and value both materialized) on a transaction.
//! - Cursors with the seek opcodes of [`SeekOp`], `put` with
//!   [`PutFlags`], `del`, duplicate count, and the `on_first` / `on_last` /
//!   `eof` position predicates.
//! - Comparator application through the transaction (`cmp` / `dcmp`).
//!
//! Keys and values cross the boundary as [`Buf`]: cheap refcounted
//! buffers. A buffer stays valid for as long as the caller holds it, which
//! subsumes the dirty-page pointer rules a C binding would impose.

pub mod mem;

use std::cmp::Ordering;
use std::ops::BitOr;
use std::sync::Arc;

/// Refcounted byte buffer: the unit of key/value exchange with the engine.
pub type Buf = Arc<[u8]>;

/// Comparator installed per sub-DB for keys or duplicate values.
pub type KeyCmp = fn(&[u8], &[u8]) -> Ordering;

pub(crate) fn buf(bytes: &[u8]) -> Buf {
    Arc::from(bytes)
}

/// Sub-DB creation/open flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SubDbFlags(u16);

impl SubDbFlags {
    pub const NONE: Self = Self(0);
    /// Create the sub-DB if it does not exist (write transactions only).
    pub const CREATE: Self = Self(1 << 0);
    /// Multiple sorted values per key.
    pub const DUP_SORT: Self = Self(1 << 1);
    /// Keys are fixed-width native integer words.
    pub const INTEGER_KEY: Self = Self(1 << 2);
    /// Keys compare from the last byte backwards.
    pub const REVERSE_KEY: Self = Self(1 << 3);
    /// All duplicates of a key have the same size.
    pub const DUP_FIXED: Self = Self(1 << 4);
    /// Duplicates are fixed-width native integer words.
    pub const INTEGER_DUP: Self = Self(1 << 5);
    /// Duplicates compare from the last byte backwards.
    pub const REVERSE_DUP: Self = Self(1 << 6);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// The flags that describe the persistent shape of a sub-DB; two opens
    /// of the same sub-DB must agree on these.
    pub(crate) fn persistent(self) -> Self {
        Self(self.0 & !Self::CREATE.0)
    }
}

impl BitOr for SubDbFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Cursor seek opcodes, the full vocabulary of the cursor engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekOp {
    First,
    Last,
    /// Exact key.
    SetKey,
    /// Least key ≥ target.
    SetRange,
    /// Exact key and exact duplicate.
    GetBoth,
    /// Exact key, least duplicate ≥ target.
    GetBothRange,
    /// Re-read the current position.
    GetCurrent,
    Next,
    Prev,
    NextNoDup,
    PrevNoDup,
    NextDup,
    PrevDup,
    FirstDup,
    LastDup,
}

/// Flags for cursor `put`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PutFlags(u8);

impl PutFlags {
    pub const NONE: Self = Self(0);
    /// Overwrite the value at the cursor's current position.
    pub const CURRENT: Self = Self(1 << 0);
    /// Reject an exact duplicate of an existing (key, value) pair.
    pub const NO_DUP_DATA: Self = Self(1 << 1);
    /// Reject any write to an existing key.
    pub const NO_OVERWRITE: Self = Self(1 << 2);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for PutFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}
