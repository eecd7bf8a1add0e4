//! # Column Descriptors
//!
//! A column is described by a *shove*: a packed identifier combining the
//! column's data type, its index kind, and its declaration order within the
//! table. Shoves are stable for the lifetime of a schema and are the unit
//! the key codec, comparator registry, and sub-DB flag derivation key off.
//!
//! ## Shove layout
//!
//! ```text
//! bits  0..8   column data type (ColType)
//! bits  8..16  index kind bitset (IndexKind)
//! bits 16..48  declaration order (0 = primary by convention)
//! ```

use std::fmt;

/// Data type of a column, which is also the storage type of its index keys.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColType {
    /// Unsigned 16-bit integer (widened to 32 bits in keys).
    Uint16 = 1,
    Int32 = 2,
    Uint32 = 3,
    Fp32 = 4,
    Int64 = 5,
    Uint64 = 6,
    Fp64 = 7,
    /// Fixed-point 64-bit timestamp.
    DateTime = 8,
    /// Fixed 96-bit binary.
    Bin96 = 9,
    Bin128 = 10,
    Bin160 = 11,
    Bin256 = 12,
    /// UTF-8 text.
    Str = 13,
    /// Variable-length binary.
    Opaque = 14,
    /// Nested row tuple.
    Nested = 15,
}

impl ColType {
    pub(crate) fn from_raw(raw: u8) -> Option<Self> {
        Some(match raw {
            1 => ColType::Uint16,
            2 => ColType::Int32,
            3 => ColType::Uint32,
            4 => ColType::Fp32,
            5 => ColType::Int64,
            6 => ColType::Uint64,
            7 => ColType::Fp64,
            8 => ColType::DateTime,
            9 => ColType::Bin96,
            10 => ColType::Bin128,
            11 => ColType::Bin160,
            12 => ColType::Bin256,
            13 => ColType::Str,
            14 => ColType::Opaque,
            15 => ColType::Nested,
            _ => return None,
        })
    }

    /// Width of the encoded key word for types stored as a single native
    /// integer-comparable word. `Uint16` keys are widened to 32 bits.
    pub fn fixed_word_width(self) -> Option<usize> {
        match self {
            ColType::Uint16 | ColType::Int32 | ColType::Uint32 | ColType::Fp32 => Some(4),
            ColType::Int64 | ColType::Uint64 | ColType::Fp64 | ColType::DateTime => Some(8),
            _ => None,
        }
    }

    /// Width of fixed-size binary types.
    pub fn fixed_bin_width(self) -> Option<usize> {
        match self {
            ColType::Bin96 => Some(96 / 8),
            ColType::Bin128 => Some(128 / 8),
            ColType::Bin160 => Some(160 / 8),
            ColType::Bin256 => Some(256 / 8),
            _ => None,
        }
    }

    /// True for types whose key is one native word (see
    /// [`fixed_word_width`](Self::fixed_word_width)).
    pub fn is_word(self) -> bool {
        self.fixed_word_width().is_some()
    }

    /// True for any fixed-size type, word or binary.
    pub fn is_fixed_size(self) -> bool {
        self.is_word() || self.fixed_bin_width().is_some()
    }

    /// True for variable-length types (text, opaque binary, nested tuples).
    pub fn is_variable(self) -> bool {
        matches!(self, ColType::Str | ColType::Opaque | ColType::Nested)
    }

    /// True when the byte order of the key is meaningful, i.e. a reverse
    /// index makes sense for the type.
    pub fn has_byte_order(self) -> bool {
        self.is_variable() || self.fixed_bin_width().is_some()
    }
}

/// Index kind of a column: a small bitset with named combinations.
///
/// `NONE` marks an unindexed column. An indexed column is primary unless
/// `SECONDARY` is set, unique when `UNIQUE` is set, range-capable when
/// `ORDERED` is set (otherwise keys are hashed), and compared from the last
/// byte backwards when `REVERSE` is set.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct IndexKind(u8);

impl IndexKind {
    const INDEXED: u8 = 1 << 0;
    const ORDERED: u8 = 1 << 1;
    const UNIQUE: u8 = 1 << 2;
    const REVERSE: u8 = 1 << 3;
    const SECONDARY: u8 = 1 << 4;

    /// Not indexed.
    pub const NONE: Self = Self(0);

    pub const PRIMARY_UNIQUE: Self = Self(Self::INDEXED | Self::ORDERED | Self::UNIQUE);
    pub const PRIMARY_UNIQUE_UNORDERED: Self = Self(Self::INDEXED | Self::UNIQUE);
    pub const PRIMARY_UNIQUE_REVERSED: Self =
        Self(Self::INDEXED | Self::ORDERED | Self::UNIQUE | Self::REVERSE);
    pub const PRIMARY_WITH_DUPS: Self = Self(Self::INDEXED | Self::ORDERED);

    pub const SECONDARY_UNIQUE: Self =
        Self(Self::INDEXED | Self::ORDERED | Self::UNIQUE | Self::SECONDARY);
    pub const SECONDARY_UNIQUE_UNORDERED: Self =
        Self(Self::INDEXED | Self::UNIQUE | Self::SECONDARY);
    pub const SECONDARY_UNIQUE_REVERSED: Self =
        Self(Self::INDEXED | Self::ORDERED | Self::UNIQUE | Self::REVERSE | Self::SECONDARY);
    pub const SECONDARY_WITH_DUPS: Self = Self(Self::INDEXED | Self::ORDERED | Self::SECONDARY);
    pub const SECONDARY_WITH_DUPS_UNORDERED: Self = Self(Self::INDEXED | Self::SECONDARY);
    pub const SECONDARY_WITH_DUPS_REVERSED: Self =
        Self(Self::INDEXED | Self::ORDERED | Self::REVERSE | Self::SECONDARY);

    pub fn is_indexed(self) -> bool {
        self.0 & Self::INDEXED != 0
    }

    pub fn is_primary(self) -> bool {
        self.is_indexed() && self.0 & Self::SECONDARY == 0
    }

    pub fn is_secondary(self) -> bool {
        self.0 & Self::SECONDARY != 0
    }

    pub fn is_unique(self) -> bool {
        self.0 & Self::UNIQUE != 0
    }

    pub fn is_ordered(self) -> bool {
        self.0 & Self::ORDERED != 0
    }

    pub fn is_reverse(self) -> bool {
        self.0 & Self::REVERSE != 0
    }

    pub(crate) fn raw(self) -> u8 {
        self.0
    }

    pub(crate) fn from_raw(raw: u8) -> Self {
        Self(raw)
    }
}

impl fmt::Debug for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_indexed() {
            return f.write_str("none");
        }
        write!(
            f,
            "{}-{}-{}{}",
            if self.is_primary() { "primary" } else { "secondary" },
            if self.is_unique() { "unique" } else { "withdups" },
            if self.is_ordered() { "ordered" } else { "unordered" },
            if self.is_reverse() { "-reversed" } else { "" },
        )
    }
}

/// Packed column identifier: data type, index kind, and declaration order.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Shove(u64);

impl Shove {
    pub fn new(ctype: ColType, index: IndexKind, order: u32) -> Self {
        Self((ctype as u64) | ((index.raw() as u64) << 8) | ((order as u64) << 16))
    }

    pub fn col_type(self) -> ColType {
        ColType::from_raw((self.0 & 0xff) as u8).expect("shove carries a valid column type")
    }

    pub fn index(self) -> IndexKind {
        IndexKind::from_raw(((self.0 >> 8) & 0xff) as u8)
    }

    pub fn order(self) -> u32 {
        (self.0 >> 16) as u32
    }
}

impl fmt::Debug for Shove {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Shove({:?}, {:?}, #{})",
            self.col_type(),
            self.index(),
            self.order()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shove_packs_and_unpacks() {
        let shove = Shove::new(ColType::Fp64, IndexKind::SECONDARY_WITH_DUPS, 3);
        assert_eq!(shove.col_type(), ColType::Fp64);
        assert_eq!(shove.index(), IndexKind::SECONDARY_WITH_DUPS);
        assert_eq!(shove.order(), 3);
    }

    #[test]
    fn index_kind_predicates() {
        assert!(IndexKind::PRIMARY_UNIQUE.is_primary());
        assert!(IndexKind::PRIMARY_UNIQUE.is_ordered());
        assert!(!IndexKind::PRIMARY_UNIQUE.is_reverse());

        assert!(IndexKind::SECONDARY_UNIQUE_REVERSED.is_secondary());
        assert!(IndexKind::SECONDARY_UNIQUE_REVERSED.is_reverse());

        assert!(!IndexKind::SECONDARY_WITH_DUPS_UNORDERED.is_ordered());
        assert!(!IndexKind::SECONDARY_WITH_DUPS_UNORDERED.is_unique());

        assert!(!IndexKind::NONE.is_indexed());
        assert!(!IndexKind::NONE.is_primary());
    }

    #[test]
    fn key_widths_per_type() {
        assert_eq!(ColType::Uint16.fixed_word_width(), Some(4));
        assert_eq!(ColType::DateTime.fixed_word_width(), Some(8));
        assert_eq!(ColType::Bin160.fixed_bin_width(), Some(20));
        assert!(ColType::Str.is_variable());
        assert!(!ColType::Str.is_fixed_size());
        assert!(ColType::Bin96.has_byte_order());
        assert!(!ColType::Uint64.has_byte_order());
    }
}
