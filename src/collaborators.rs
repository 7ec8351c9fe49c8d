//! External collaborator interfaces (SPEC_FULL.md §6, "Consumed").
//!
//! This core never touches guest physical memory, PMP, the TLB, or the execution
//! engine's control-flow machinery directly. It only calls through these traits. The
//! embedding emulator implements them; `tests/` provides small mock implementations
//! for the end-to-end scenarios.

use crate::mmu::Access;
use crate::priv_mode::PrivMode;

/// The width of a page-table-entry load, fixed by the active `satp.MODE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PteSize {
    Four,
    Eight,
}

impl PteSize {
    pub fn bytes(self) -> usize {
        match self {
            PteSize::Four => 4,
            PteSize::Eight => 8,
        }
    }
}

/// The outcome of a compare-and-swap attempt on a page table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CasOutcome {
    /// The slot held `current` and now holds the new value.
    Swapped,
    /// The slot no longer held `current`; the walk must restart from the root.
    Mismatch,
}

/// Guest physical memory, as seen by the page-table walker and the MMIO fault paths.
///
/// Corresponds to SPEC_FULL.md's `load32`/`load64`/`translate_to_host_ptr`. The CAS
/// step is expressed directly as [`PhysMemory::cas_pte`] rather than handing out a raw
/// host pointer, since a safe-Rust collaborator trait can express the same atomicity
/// without exposing pointer arithmetic to the core.
pub trait PhysMemory {
    fn load32(&self, pa: u64) -> u32;
    fn load64(&self, pa: u64) -> u64;

    /// Attempts to install `new` at `pa` provided the slot still holds `current`.
    ///
    /// Returns `None` if `pa` does not address RAM (MMIO or ROM): the walker must then
    /// treat the A/D update as failed rather than retry, per SPEC_FULL.md §4.3.
    fn cas_pte(&self, pa: u64, size: PteSize, current: u64, new: u64) -> Option<CasOutcome>;
}

/// The physical memory protection predicate. Only its interface is consumed here; the
/// predicate itself (PMP register decoding) is out of scope for this core.
pub trait PmpChecker {
    /// Returns whether `mode` may access `size` bytes at `pa` for the given `access`.
    fn pmp_has_privs(&self, pa: u64, size: usize, access: Access, mode: PrivMode) -> bool;
}

/// Mapping installed into the TLB on a successful [`crate::facade::tlb_fill`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Prot {
    pub read: bool,
    pub write: bool,
    pub execute: bool,
}

/// The TLB owned by the execution engine. This core only ever installs mappings or
/// flushes wholesale; it never looks entries up (that is the engine's hot path).
pub trait Tlb {
    fn set_page(&self, vpage: u64, ppage: u64, prot: Prot, mmu_idx: usize, page_size: u64);
    fn flush(&self);
}

/// A non-local transfer of control out of the currently-executing translation block.
///
/// SPEC_FULL.md's design notes explicitly allow "stack unwinding, tail-called
/// trampolines, or error propagation through the call chain" as long as the
/// architectural effect is identical; this core uses the trait-call form and lets the
/// implementation choose how to actually leave the block.
pub trait ExecutionUnwind {
    /// Never returns: execution resumes at the engine's dispatch loop, not here.
    fn unwind(&self) -> !;
}

/// The asynchronous, coalescing-tolerant cross-thread work queue used by
/// [`crate::hart::Hart::update_mip`] to notify the owning execution thread that the
/// hard-interrupt line changed.
pub trait HartNotifier {
    /// Schedules `raise` (true) or `clear` (false) of the hard-interrupt line on the
    /// hart's own thread. May coalesce with a previously-scheduled, not-yet-delivered
    /// notification of the same kind; must not block the caller.
    fn notify_interrupt_line(&self, raise: bool);
}
