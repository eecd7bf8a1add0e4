//! # Key Codec
//!
//! Encodes typed values and row fields into index keys, and decodes keys
//! back into values. Every key shape here is matched by exactly one
//! comparator in [`super::compare`].
//!
//! ## Key shapes
//!
//! | Index | Key bytes |
//! |---|---|
//! | unordered, any variable/binary type | 8-byte hash of the whole value |
//! | ordered word type | the value, little-endian, 4 or 8 bytes |
//! | ordered variable, length ≤ 64 | the raw bytes |
//! | ordered variable, length > 64, obverse | first 64 bytes ‖ 8-byte hash of the rest |
//! | ordered variable, length > 64, reverse | 8-byte hash of the head ‖ last 64 bytes |
//!
//! The two fold layouts stay byte-comparable under their comparators:
//! the obverse comparator reads head bytes before the hash word, the
//! reverse comparator reads tail bytes (from the end) before the hash
//! word. Folds can collide for distinct originals; uniqueness is enforced
//! at the row level by the maintenance paths, never assumed from key
//! equality.
//!
//! ## Ownership
//!
//! An [`IndexKey`] is either a borrow of caller bytes or a self-contained
//! copy inside its fixed `place` scratch. Every producible key fits the
//! scratch, so [`IndexKey::to_owned_key`] is total; callers that must keep
//! a key across mutations (cursor range bounds, copied-out primary keys)
//! use the owning form.
//!
//! ## Normalization rules
//!
//! Floats: NaN is rejected; zeros and subnormals collapse to +0 so that
//! `encode(+0) == encode(-0)`; infinities pass through. `uint16` widens to
//! a 32-bit word. Integer values range-check against the column width and
//! signedness. Row-derived keys apply the same float normalization as
//! value-derived keys, so inserts and lookups agree on encodings.

use std::borrow::Cow;

use eyre::Result;
use xxhash_rust::xxh3::xxh3_64_with_seed;

use crate::config::CoreConfig;
use crate::errors::{fault, ErrorKind};
use crate::rows::RowView;
use crate::types::{ColType, DateTime, IndexKind, Shove, Value};

/// Longest key stored verbatim; anything longer is folded.
pub const MAX_KEY_LEN: usize = 64;
/// Exact length of a folded key: a 64-byte slice plus one hash word.
pub const FOLDED_KEY_LEN: usize = MAX_KEY_LEN + 8;

/// Seed for hashing whole values on unordered indexes.
const UNORDERED_SEED: u64 = 2017;
/// Seed for hashing the folded-away half of a long key.
const FOLD_SEED: u64 = 0;

/// An encoded index key: borrowed caller bytes or a self-contained copy
/// in the fixed scratch area.
#[derive(Clone)]
pub struct IndexKey<'a> {
    place: [u8; FOLDED_KEY_LEN],
    len: usize,
    borrowed: Option<&'a [u8]>,
}

impl<'a> IndexKey<'a> {
    fn borrowed(bytes: &'a [u8]) -> Self {
        debug_assert!(bytes.len() <= FOLDED_KEY_LEN);
        Self {
            place: [0; FOLDED_KEY_LEN],
            len: bytes.len(),
            borrowed: Some(bytes),
        }
    }

    fn from_place(place: [u8; FOLDED_KEY_LEN], len: usize) -> IndexKey<'static> {
        IndexKey {
            place,
            len,
            borrowed: None,
        }
    }

    fn copied(bytes: &[u8]) -> IndexKey<'static> {
        let mut place = [0u8; FOLDED_KEY_LEN];
        place[..bytes.len()].copy_from_slice(bytes);
        IndexKey::from_place(place, bytes.len())
    }

    fn word4(v: [u8; 4]) -> IndexKey<'static> {
        let mut place = [0u8; FOLDED_KEY_LEN];
        place[..4].copy_from_slice(&v);
        IndexKey::from_place(place, 4)
    }

    fn word8(v: [u8; 8]) -> IndexKey<'static> {
        let mut place = [0u8; FOLDED_KEY_LEN];
        place[..8].copy_from_slice(&v);
        IndexKey::from_place(place, 8)
    }

    pub fn bytes(&self) -> &[u8] {
        match self.borrowed {
            Some(bytes) => bytes,
            None => &self.place[..self.len],
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Detaches the key from any borrowed memory.
    pub fn to_owned_key(&self) -> IndexKey<'static> {
        match self.borrowed {
            Some(bytes) => IndexKey::copied(bytes),
            None => IndexKey::from_place(self.place, self.len),
        }
    }
}

impl std::fmt::Debug for IndexKey<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "IndexKey({} bytes)", self.len)
    }
}

/// The ordered-index compatibility matrix: can `value` be coerced into a
/// key for a column of type `ctype`?
fn ordered_compat(ctype: ColType, value: &Value<'_>) -> bool {
    match value {
        Value::Null => false,
        Value::Sint(_) | Value::Uint(_) => matches!(
            ctype,
            ColType::Uint16 | ColType::Uint32 | ColType::Uint64 | ColType::Int32 | ColType::Int64
        ),
        Value::DateTime(_) => ctype == ColType::DateTime,
        Value::Float(_) => matches!(ctype, ColType::Fp32 | ColType::Fp64),
        Value::Str(_) => ctype == ColType::Str,
        Value::Bin(_) => !ctype.is_word() && !matches!(ctype, ColType::DateTime | ColType::Str),
        // Only long-key-capable storage can hold a pre-folded key.
        Value::Shoved(_) => ctype.is_variable(),
        Value::Begin | Value::End => true,
    }
}

/// Same matrix for unordered (hashed) indexes: `shoved` widens to every
/// type that can produce a hashed key.
fn unordered_compat(ctype: ColType, value: &Value<'_>) -> bool {
    match value {
        Value::Shoved(_) => !ctype.is_word() && ctype != ColType::DateTime,
        _ => ordered_compat(ctype, value),
    }
}

/// True when `value` can be coerced into a key for the index of `shove`.
pub(crate) fn is_index_compat(shove: Shove, value: &Value<'_>) -> bool {
    if shove.index().is_ordered() {
        ordered_compat(shove.col_type(), value)
    } else {
        unordered_compat(shove.col_type(), value)
    }
}

/// Produces the normalized key for raw variable-width bytes: hash for
/// unordered indexes, verbatim when short enough, folded otherwise.
fn normalize<'a>(index: IndexKind, bytes: &'a [u8], copy: bool) -> IndexKey<'a> {
    if !index.is_ordered() {
        return IndexKey::word8(xxh3_64_with_seed(bytes, UNORDERED_SEED).to_le_bytes());
    }

    if bytes.len() <= MAX_KEY_LEN {
        return if copy {
            IndexKey::copied(bytes)
        } else {
            IndexKey::borrowed(bytes)
        };
    }

    let mut place = [0u8; FOLDED_KEY_LEN];
    if !index.is_reverse() {
        // Compared head-to-tail: keep the head, hash the tail.
        place[..MAX_KEY_LEN].copy_from_slice(&bytes[..MAX_KEY_LEN]);
        let tailhash = xxh3_64_with_seed(&bytes[MAX_KEY_LEN..], FOLD_SEED);
        place[MAX_KEY_LEN..].copy_from_slice(&tailhash.to_le_bytes());
    } else {
        // Compared tail-to-head: keep the tail, hash the head.
        let split = bytes.len() - MAX_KEY_LEN;
        let headhash = xxh3_64_with_seed(&bytes[..split], FOLD_SEED);
        place[..8].copy_from_slice(&headhash.to_le_bytes());
        place[8..].copy_from_slice(&bytes[split..]);
    }
    IndexKey::from_place(place, FOLDED_KEY_LEN)
}

fn int_value(value: &Value<'_>) -> (i64, u64) {
    match value {
        Value::Sint(s) => (*s, *s as u64),
        Value::Uint(u) => (*u as i64, *u),
        _ => unreachable!("compatibility check admits only integers here"),
    }
}

fn normalize_f32(f: f64, config: &CoreConfig) -> Result<f32> {
    let narrow = f as f32;
    if narrow.is_nan() {
        return fault(ErrorKind::ValueOutOfRange);
    }
    if narrow.is_infinite() && !f.is_infinite() {
        return fault(ErrorKind::ValueOutOfRange);
    }
    let narrow = if narrow == 0.0 || narrow.is_subnormal() {
        0.0
    } else {
        narrow
    };
    if config.prohibit_loss_of_precision && narrow as f64 != f {
        return fault(ErrorKind::ValueOutOfRange);
    }
    Ok(narrow)
}

fn normalize_f64(f: f64) -> Result<f64> {
    if f.is_nan() {
        return fault(ErrorKind::ValueOutOfRange);
    }
    Ok(if f == 0.0 || f.is_subnormal() { 0.0 } else { f })
}

/// Encodes a typed value into an index key for the index of `shove`.
///
/// With `copy` set the result owns its bytes; otherwise short variable
/// keys borrow from `value`.
pub fn value_to_key<'v>(
    shove: Shove,
    value: &'v Value<'_>,
    copy: bool,
    config: &CoreConfig,
) -> Result<IndexKey<'v>> {
    if matches!(value, Value::Null | Value::Begin | Value::End) {
        return fault(ErrorKind::TypeMismatch);
    }

    let ctype = shove.col_type();
    let index = shove.index();
    if !index.is_indexed() {
        return fault(ErrorKind::InternalOops);
    }

    if index.is_ordered() {
        if !ordered_compat(ctype, value) {
            return fault(ErrorKind::TypeMismatch);
        }
        if let Value::Shoved(bytes) = value {
            if bytes.len() != FOLDED_KEY_LEN {
                return fault(ErrorKind::DataLengthMismatch);
            }
            return Ok(if copy {
                IndexKey::copied(bytes)
            } else {
                IndexKey::borrowed(bytes)
            });
        }
    } else {
        if !unordered_compat(ctype, value) {
            return fault(ErrorKind::TypeMismatch);
        }
        if let Value::Shoved(bytes) = value {
            if bytes.len() != 8 {
                return fault(ErrorKind::DataLengthMismatch);
            }
            return Ok(if copy {
                IndexKey::copied(bytes)
            } else {
                IndexKey::borrowed(bytes)
            });
        }
    }

    let bytes: &'v [u8] = match ctype {
        ColType::Nested => return fault(ErrorKind::NotImplemented),

        ColType::Uint16 => {
            let (s, _) = int_value(value);
            if !(0..=u16::MAX as i64).contains(&s) {
                return fault(ErrorKind::ValueOutOfRange);
            }
            return Ok(IndexKey::word4((s as u32).to_le_bytes()));
        }

        ColType::Uint32 => {
            let (s, u) = int_value(value);
            if s < 0 || u > u32::MAX as u64 {
                return fault(ErrorKind::ValueOutOfRange);
            }
            return Ok(IndexKey::word4((u as u32).to_le_bytes()));
        }

        ColType::Int32 => {
            let (s, _) = int_value(value);
            if i32::try_from(s).is_err() || matches!(value, Value::Uint(u) if *u > i32::MAX as u64)
            {
                return fault(ErrorKind::ValueOutOfRange);
            }
            return Ok(IndexKey::word4((s as i32).to_le_bytes()));
        }

        ColType::Int64 => {
            if matches!(value, Value::Uint(u) if *u > i64::MAX as u64) {
                return fault(ErrorKind::ValueOutOfRange);
            }
            let (s, _) = int_value(value);
            return Ok(IndexKey::word8(s.to_le_bytes()));
        }

        ColType::Uint64 => {
            if matches!(value, Value::Sint(s) if *s < 0) {
                return fault(ErrorKind::ValueOutOfRange);
            }
            let (_, u) = int_value(value);
            return Ok(IndexKey::word8(u.to_le_bytes()));
        }

        ColType::Fp32 => {
            let Value::Float(f) = value else {
                return fault(ErrorKind::InternalOops);
            };
            let narrow = normalize_f32(*f, config)?;
            return Ok(IndexKey::word4(narrow.to_le_bytes()));
        }

        ColType::Fp64 => {
            let Value::Float(f) = value else {
                return fault(ErrorKind::InternalOops);
            };
            let wide = normalize_f64(*f)?;
            return Ok(IndexKey::word8(wide.to_le_bytes()));
        }

        ColType::DateTime => {
            let Value::DateTime(dt) = value else {
                return fault(ErrorKind::InternalOops);
            };
            return Ok(IndexKey::word8(dt.0.to_le_bytes()));
        }

        ColType::Str => {
            let Value::Str(s) = value else {
                return fault(ErrorKind::InternalOops);
            };
            s.as_bytes()
        }

        ColType::Opaque => {
            let Value::Bin(b) = value else {
                return fault(ErrorKind::InternalOops);
            };
            b
        }

        ColType::Bin96 | ColType::Bin128 | ColType::Bin160 | ColType::Bin256 => {
            let Value::Bin(b) = value else {
                return fault(ErrorKind::InternalOops);
            };
            if b.len() != ctype.fixed_bin_width().unwrap() {
                return fault(ErrorKind::DataLengthMismatch);
            }
            b
        }
    };

    Ok(normalize(index, bytes, copy))
}

/// Derives the index key for `shove` from the indexed column of a row.
pub fn row_to_key<'r>(
    shove: Shove,
    order: u32,
    row: &RowView<'r>,
    copy: bool,
) -> Result<IndexKey<'r>> {
    let ctype = shove.col_type();
    let Some(field) = row.field(order, ctype) else {
        return fault(ErrorKind::ColumnMissing);
    };

    let bytes: &'r [u8] = match ctype {
        ColType::Nested => return fault(ErrorKind::NotImplemented),

        ColType::Uint16 => {
            return Ok(IndexKey::word4((field.as_u16() as u32).to_le_bytes()));
        }

        ColType::Int32 | ColType::Uint32 => {
            return Ok(IndexKey::word4(field.as_bytes()[..4].try_into().unwrap()));
        }

        ColType::Fp32 => {
            let narrow = field.as_f32();
            if narrow.is_nan() {
                return fault(ErrorKind::ValueOutOfRange);
            }
            let narrow = if narrow == 0.0 || narrow.is_subnormal() {
                0.0
            } else {
                narrow
            };
            return Ok(IndexKey::word4(narrow.to_le_bytes()));
        }

        ColType::Fp64 => {
            let wide = normalize_f64(field.as_f64())?;
            return Ok(IndexKey::word8(wide.to_le_bytes()));
        }

        ColType::Int64 | ColType::Uint64 | ColType::DateTime => {
            return Ok(IndexKey::word8(field.as_bytes()[..8].try_into().unwrap()));
        }

        ColType::Str | ColType::Opaque => field.as_bytes(),

        ColType::Bin96 | ColType::Bin128 | ColType::Bin160 | ColType::Bin256 => field.as_bytes(),
    };

    Ok(normalize(shove.index(), bytes, copy))
}

/// Decodes an index key back into a value.
///
/// Fixed-width numerics recover exactly. Variable keys at the fold length
/// surface as [`Value::Shoved`]; shorter ones recover the original bytes.
/// Any impossible length reports `IndexCorrupted`.
pub fn key_to_value<'k>(shove: Shove, key: &'k [u8]) -> Result<Value<'k>> {
    let ctype = shove.col_type();
    let index = shove.index();

    if !index.is_ordered() && !ctype.is_word() {
        // Hashed storage: only the 8-byte hash word survives.
        if key.len() != 8 {
            return fault(ErrorKind::IndexCorrupted);
        }
        return Ok(Value::Shoved(Cow::Borrowed(key)));
    }

    match ctype {
        ColType::Uint16 => {
            if key.len() != 4 {
                return fault(ErrorKind::IndexCorrupted);
            }
            let wide = u32::from_le_bytes(key.try_into().unwrap());
            if wide > u16::MAX as u32 {
                return fault(ErrorKind::IndexCorrupted);
            }
            Ok(Value::Uint(wide as u64))
        }

        ColType::Uint32 => {
            if key.len() != 4 {
                return fault(ErrorKind::IndexCorrupted);
            }
            Ok(Value::Uint(u32::from_le_bytes(key.try_into().unwrap()) as u64))
        }

        ColType::Int32 => {
            if key.len() != 4 {
                return fault(ErrorKind::IndexCorrupted);
            }
            Ok(Value::Sint(i32::from_le_bytes(key.try_into().unwrap()) as i64))
        }

        ColType::Fp32 => {
            if key.len() != 4 {
                return fault(ErrorKind::IndexCorrupted);
            }
            Ok(Value::Float(
                f32::from_le_bytes(key.try_into().unwrap()) as f64
            ))
        }

        ColType::Int64 => {
            if key.len() != 8 {
                return fault(ErrorKind::IndexCorrupted);
            }
            Ok(Value::Sint(i64::from_le_bytes(key.try_into().unwrap())))
        }

        ColType::Uint64 => {
            if key.len() != 8 {
                return fault(ErrorKind::IndexCorrupted);
            }
            Ok(Value::Uint(u64::from_le_bytes(key.try_into().unwrap())))
        }

        ColType::Fp64 => {
            if key.len() != 8 {
                return fault(ErrorKind::IndexCorrupted);
            }
            Ok(Value::Float(f64::from_le_bytes(key.try_into().unwrap())))
        }

        ColType::DateTime => {
            if key.len() != 8 {
                return fault(ErrorKind::IndexCorrupted);
            }
            Ok(Value::DateTime(DateTime(u64::from_le_bytes(
                key.try_into().unwrap(),
            ))))
        }

        ColType::Str => {
            if key.len() > MAX_KEY_LEN {
                return Ok(Value::Shoved(Cow::Borrowed(key)));
            }
            match std::str::from_utf8(key) {
                Ok(s) => Ok(Value::Str(Cow::Borrowed(s))),
                Err(_) => fault(ErrorKind::IndexCorrupted),
            }
        }

        ColType::Opaque | ColType::Nested => {
            if key.len() > MAX_KEY_LEN {
                Ok(Value::Shoved(Cow::Borrowed(key)))
            } else {
                Ok(Value::Bin(Cow::Borrowed(key)))
            }
        }

        ColType::Bin96 | ColType::Bin128 | ColType::Bin160 | ColType::Bin256 => {
            if key.len() != ctype.fixed_bin_width().unwrap() {
                return fault(ErrorKind::IndexCorrupted);
            }
            Ok(Value::Bin(Cow::Borrowed(key)))
        }
    }
}
