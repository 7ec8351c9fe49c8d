//! Typed errors for the handful of operations that are genuinely fallible at the API
//! boundary (see SPEC_FULL.md §7). The translate and trap-entry paths are total
//! functions over their input domain and do not use this type.

use thiserror::Error;

/// Errors surfaced by [`crate::hart::Hart`] construction and interrupt-claim
/// bookkeeping.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    /// `satp.MODE` (or the initial reset preset) does not encode one of
    /// Bare/Sv32/Sv39/Sv48/Sv57.
    #[error("unknown satp.MODE encoding: {0:#x}")]
    UnknownSatpMode(usize),

    /// [`crate::hart::Hart::claim_interrupts`] was asked to claim a set of interrupt
    /// sources that intersects the sources already claimed by another device model.
    #[error("interrupt claim {requested:#x} conflicts with already-claimed {claimed:#x}")]
    InterruptAlreadyClaimed { requested: usize, claimed: usize },
}
