//! # Index Key Encoding
//!
//! Everything between a typed value and the bytes the KV engine orders:
//!
//! - [`key`]: the codec proper: encoding values and row fields into index
//!   keys, decoding keys back, and folding over-long keys.
//! - [`compare`]: the comparator registry, one comparison function per
//!   index storage shape, installed into the KV engine at sub-DB open.
//!
//! The two halves are designed together: every encoder output is ordered
//! correctly by exactly one registry comparator, selected from the same
//! shove.

pub mod compare;
pub mod key;

pub use compare::shove_comparator;
pub use key::{
    key_to_value, row_to_key, value_to_key, IndexKey, FOLDED_KEY_LEN, MAX_KEY_LEN,
};
pub(crate) use key::is_index_compat;
