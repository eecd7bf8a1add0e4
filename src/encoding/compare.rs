//! # Comparator Registry
//!
//! One comparison function per index storage shape, selected once per
//! sub-DB at open time. Keys are compared as raw bytes by the KV engine,
//! so every function here must agree byte-for-byte with what the codec in
//! [`super::key`] writes.
//!
//! | Index storage | Comparator |
//! |---|---|
//! | 16/32-bit word | little-endian u32/i32 numeric compare |
//! | 64-bit word, datetime, unordered hash | little-endian u64/i64 compare |
//! | fp32 / fp64 | sign-magnitude compare on the raw IEEE bits |
//! | nested tuple | delegate to the row-tuple comparator |
//! | variable, obverse | memcmp over the shorter length, then length |
//! | variable, reverse | byte-wise compare from the end, then length |
//!
//! The sign-magnitude float compare orders the encoder's output without
//! any bit tricks at encode time: negative values sort by descending
//! magnitude, positives by ascending, and the encoder has already
//! collapsed zeros/subnormals and rejected NaN.

use std::cmp::Ordering;

use crate::kv::KeyCmp;
use crate::rows::cmp_row_bytes;
use crate::types::{ColType, Shove};

fn word4(bytes: &[u8]) -> [u8; 4] {
    debug_assert_eq!(bytes.len(), 4);
    bytes[..4].try_into().unwrap()
}

fn word8(bytes: &[u8]) -> [u8; 8] {
    debug_assert_eq!(bytes.len(), 8);
    bytes[..8].try_into().unwrap()
}

fn cmp_u32(a: &[u8], b: &[u8]) -> Ordering {
    u32::from_le_bytes(word4(a)).cmp(&u32::from_le_bytes(word4(b)))
}

fn cmp_i32(a: &[u8], b: &[u8]) -> Ordering {
    i32::from_le_bytes(word4(a)).cmp(&i32::from_le_bytes(word4(b)))
}

fn cmp_u64(a: &[u8], b: &[u8]) -> Ordering {
    u64::from_le_bytes(word8(a)).cmp(&u64::from_le_bytes(word8(b)))
}

fn cmp_i64(a: &[u8], b: &[u8]) -> Ordering {
    i64::from_le_bytes(word8(a)).cmp(&i64::from_le_bytes(word8(b)))
}

fn cmp_fp32(a: &[u8], b: &[u8]) -> Ordering {
    let va = i32::from_le_bytes(word4(a));
    let vb = i32::from_le_bytes(word4(b));
    let negative = va < 0;
    if negative != (vb < 0) {
        return if negative { Ordering::Less } else { Ordering::Greater };
    }
    let magnitude = (va & 0x7fff_ffff).cmp(&(vb & 0x7fff_ffff));
    if negative {
        magnitude.reverse()
    } else {
        magnitude
    }
}

fn cmp_fp64(a: &[u8], b: &[u8]) -> Ordering {
    let va = i64::from_le_bytes(word8(a));
    let vb = i64::from_le_bytes(word8(b));
    let negative = va < 0;
    if negative != (vb < 0) {
        return if negative { Ordering::Less } else { Ordering::Greater };
    }
    let magnitude = (va & 0x7fff_ffff_ffff_ffff).cmp(&(vb & 0x7fff_ffff_ffff_ffff));
    if negative {
        magnitude.reverse()
    } else {
        magnitude
    }
}

fn cmp_binary_first_to_last(a: &[u8], b: &[u8]) -> Ordering {
    let shortest = a.len().min(b.len());
    match a[..shortest].cmp(&b[..shortest]) {
        Ordering::Equal => a.len().cmp(&b.len()),
        diff => diff,
    }
}

fn cmp_binary_last_to_first(a: &[u8], b: &[u8]) -> Ordering {
    let shortest = a.len().min(b.len());
    for i in 1..=shortest {
        let diff = a[a.len() - i].cmp(&b[b.len() - i]);
        if diff != Ordering::Equal {
            return diff;
        }
    }
    a.len().cmp(&b.len())
}

/// Selects the comparator for an index, from its shove.
pub fn shove_comparator(shove: Shove) -> KeyCmp {
    let index = shove.index();
    match shove.col_type() {
        ColType::Nested => cmp_row_bytes,
        ColType::Fp32 => cmp_fp32,
        ColType::Int32 => cmp_i32,
        ColType::Uint32 | ColType::Uint16 => cmp_u32,
        ColType::Fp64 => cmp_fp64,
        ColType::Int64 => cmp_i64,
        ColType::Uint64 | ColType::DateTime => cmp_u64,
        _ => {
            if !index.is_ordered() {
                // Unordered variable keys are stored as one hashed word.
                cmp_u64
            } else if index.is_reverse() {
                cmp_binary_last_to_first
            } else {
                cmp_binary_first_to_last
            }
        }
    }
}
