//! # Error Kinds
//!
//! Every failure in this crate is reported as an [`eyre::Report`] carrying an
//! [`ErrorKind`] at its root. Callers that need to branch on the failure class
//! (the cursor engine does, and so do tests) recover the kind with
//! [`kind_of`] instead of matching on message strings.
//!
//! Two kinds come straight from the KV engine and are surfaced as-is:
//! [`ErrorKind::NotFound`] for an absent key and [`ErrorKind::KeyExist`] for
//! a uniqueness violation. Everything else is produced by this layer.

use std::fmt;

/// Classification of every error this crate can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A malformed argument: bad option combination, null-where-forbidden,
    /// mismatched range sentinels, invalid filter tree.
    InvalidArgument,
    /// A value's type cannot be coerced into the column's key type.
    TypeMismatch,
    /// A value is the right type but outside the representable range
    /// (integer overflow, NaN, precision loss when prohibited).
    ValueOutOfRange,
    /// A fixed-width value has the wrong byte length.
    DataLengthMismatch,
    /// The column is not indexed, or the index cannot serve the request
    /// (e.g. an ordered cursor over an unordered index).
    NoIndex,
    /// An indexed column is absent from the supplied row.
    ColumnMissing,
    /// A mutation through a cursor would change the cursor's own key.
    KeyMismatch,
    /// Empty result: range exhausted, filter rejected everything, or an
    /// absent row on an exact lookup.
    NoData,
    /// The cursor is in an undefined position and must be re-seeked.
    CursorInvalid,
    /// A secondary entry points at a primary row that does not exist, or a
    /// stored key has an impossible shape for its column type.
    IndexCorrupted,
    /// A multi-index mutation failed after its first write; the transaction
    /// is poisoned and must be aborted.
    Inconsistent,
    /// Reserved functionality (nested-tuple key derivation).
    NotImplemented,
    /// KV engine: the requested key (or duplicate) is not present.
    NotFound,
    /// KV engine: the key (or duplicate) is already present.
    KeyExist,
    /// Allocation failure surfaced by the KV engine.
    Oom,
    /// An opcode or state combination that must not occur.
    InternalOops,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::InvalidArgument => "invalid argument",
            ErrorKind::TypeMismatch => "type mismatch",
            ErrorKind::ValueOutOfRange => "value out of range",
            ErrorKind::DataLengthMismatch => "data length mismatch",
            ErrorKind::NoIndex => "no suitable index",
            ErrorKind::ColumnMissing => "column missing from row",
            ErrorKind::KeyMismatch => "key mismatch",
            ErrorKind::NoData => "no data",
            ErrorKind::CursorInvalid => "cursor is not positioned",
            ErrorKind::IndexCorrupted => "index corrupted",
            ErrorKind::Inconsistent => "indexes inconsistent, transaction must abort",
            ErrorKind::NotImplemented => "not implemented",
            ErrorKind::NotFound => "not found",
            ErrorKind::KeyExist => "key already exists",
            ErrorKind::Oom => "out of memory",
            ErrorKind::InternalOops => "internal invariant violated",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::error::Error for ErrorKind {}

/// Raises `kind` as an `eyre` error.
#[inline]
pub(crate) fn fault<T>(kind: ErrorKind) -> eyre::Result<T> {
    Err(eyre::Report::new(kind))
}

/// Returns the [`ErrorKind`] carried by `err`, if any.
pub fn kind_of(err: &eyre::Report) -> Option<ErrorKind> {
    err.downcast_ref::<ErrorKind>().copied()
}

/// True when `err` carries exactly `kind`.
#[inline]
pub fn is_kind(err: &eyre::Report, kind: ErrorKind) -> bool {
    kind_of(err) == Some(kind)
}
