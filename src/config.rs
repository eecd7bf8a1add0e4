//! # Engine Configuration
//!
//! Runtime options for the tabular core, owned by the [`Db`](crate::Db) and
//! fixed for its lifetime. Settable through [`DbBuilder`](crate::DbBuilder).

/// Options controlling edge-case behavior of the key codec and cursors.
#[derive(Debug, Clone, Copy)]
pub struct CoreConfig {
    /// Reject inexact (`nearby`) positioning on unordered cursors instead of
    /// silently degrading it to an exact lookup.
    pub prohibit_nearby_for_unordered: bool,
    /// Reject an `fp32` key whose source `f64` does not survive the round
    /// trip through `f32`.
    pub prohibit_loss_of_precision: bool,
    /// After a cursor delete whose reposition falls outside the configured
    /// range, re-enter the range at the nearest end instead of staying at
    /// the end-of-range state.
    pub enable_return_into_range: bool,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            prohibit_nearby_for_unordered: true,
            prohibit_loss_of_precision: false,
            enable_return_into_range: false,
        }
    }
}
