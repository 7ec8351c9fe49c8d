//! MMU Facade (C5).
//!
//! The TLB-fill entry point the execution engine calls on every translation miss.
//! Composes the page-table walker (C3) with the PMP predicate and routes failures
//! through the trap dispatcher (C4). Grounded on `riscv_cpu_tlb_fill` and
//! `riscv_cpu_unassigned_access`/`riscv_cpu_do_unaligned_access` in
//! `original_source/target/riscv/cpu_helper.c`.

use crate::bits::cause;
use crate::collaborators::{ExecutionUnwind, HartNotifier, PhysMemory, PmpChecker, Prot, Tlb};
use crate::hart::Hart;
use crate::mmu::{self, Access, Translate};
use crate::priv_mode::PrivMode;
use crate::trap;

const PAGE_MASK: u64 = !0xfff;
const PAGE_SIZE: u64 = 0x1000;

fn fault_codes(access: Access) -> (usize, usize) {
    match access {
        Access::Fetch => (cause::INSTR_PAGE_FAULT, cause::INSTR_ACCESS_FAULT),
        Access::Load => (cause::LOAD_PAGE_FAULT, cause::LOAD_ACCESS_FAULT),
        Access::Store => (cause::STORE_PAGE_FAULT, cause::STORE_ACCESS_FAULT),
    }
}

/// Sets the fault CSRs, dispatches the trap, and unwinds out of the current
/// translation block. `first_stage` controls forceHS: cleared on a first-stage fault,
/// set on a second-stage (G-stage) one. Never returns.
fn raise_mmu_fault(
    h: &mut Hart,
    cause_code: usize,
    badaddr: usize,
    first_stage: bool,
    notifier: &dyn HartNotifier,
    tlb: &dyn Tlb,
    unwind: &dyn ExecutionUnwind,
) -> ! {
    h.badaddr = badaddr;
    h.set_force_hs_excep(!first_stage);
    h.exception_index = Some(cause_code);
    trap::do_interrupt(h, notifier, tlb);
    unwind.unwind();
}

/// `tlb_fill`: called by the execution engine on every TLB miss.
///
/// Returns `true` on a successful fill (a page mapping has been installed). Returns
/// `false` only when `probe` is set and translation failed, a non-faulting lookup.
/// On any other failure this never returns: it raises the architectural fault and
/// unwinds out of the current translation block.
#[allow(clippy::too_many_arguments)]
pub fn tlb_fill(
    h: &mut Hart,
    address: usize,
    size: usize,
    access: Access,
    mmu_idx: PrivMode,
    probe: bool,
    mem: &dyn PhysMemory,
    pmp: &dyn PmpChecker,
    tlb: &dyn Tlb,
    notifier: &dyn HartNotifier,
    unwind: &dyn ExecutionUnwind,
) -> bool {
    let mode = mmu::effective_mode(h, access, mmu_idx);
    let result = mmu::translate(h, address, access, mmu_idx, true, mem, pmp);

    let result = match result {
        Translate::Success { paddr, prot } if h.features.pmp => {
            if pmp.pmp_has_privs(paddr as u64, size, access, mode) {
                Translate::Success { paddr, prot }
            } else {
                Translate::PmpFail
            }
        }
        other => other,
    };

    match result {
        Translate::Success { paddr, prot } => {
            let vpage = address as u64 & PAGE_MASK;
            let ppage = paddr as u64 & PAGE_MASK;
            tlb.set_page(vpage, ppage, prot, mmu_idx.to_bits(), PAGE_SIZE);
            true
        }
        Translate::Fail | Translate::PmpFail if probe => false,
        Translate::Fail => {
            let (page_fault, _) = fault_codes(access);
            raise_mmu_fault(h, page_fault, address, true, notifier, tlb, unwind);
        }
        Translate::PmpFail => {
            let (_, access_fault) = fault_codes(access);
            raise_mmu_fault(h, access_fault, address, true, notifier, tlb, unwind);
        }
    }
}

struct NoPmp;
impl PmpChecker for NoPmp {
    fn pmp_has_privs(&self, _pa: u64, _size: usize, _access: Access, _mode: PrivMode) -> bool {
        true
    }
}

/// Non-faulting translate used by debugger-facing features (supplemented, §2a): never
/// consults PMP regardless of `Features.pmp`, and reports failure as `-1` rather than
/// through the trap path.
pub fn get_phys_page_debug(h: &mut Hart, vaddr: usize, mem: &dyn PhysMemory) -> i64 {
    match mmu::translate(h, vaddr, Access::Load, h.priv_mode, true, mem, &NoPmp) {
        Translate::Success { paddr, .. } => paddr as i64,
        Translate::Fail | Translate::PmpFail => -1,
    }
}

/// Called by the bus fabric when `addr` decodes to no device at all. Never returns.
pub fn unassigned_access(
    h: &mut Hart,
    addr: usize,
    is_write: bool,
    notifier: &dyn HartNotifier,
    tlb: &dyn Tlb,
    unwind: &dyn ExecutionUnwind,
) -> ! {
    let code = if is_write { cause::STORE_ACCESS_FAULT } else { cause::LOAD_ACCESS_FAULT };
    raise_mmu_fault(h, code, addr, true, notifier, tlb, unwind);
}

/// Called when an access is not naturally aligned and the engine cannot split it into
/// aligned sub-accesses. Never returns.
pub fn do_unaligned_access(
    h: &mut Hart,
    addr: usize,
    is_write: bool,
    notifier: &dyn HartNotifier,
    tlb: &dyn Tlb,
    unwind: &dyn ExecutionUnwind,
) -> ! {
    let code = if is_write { cause::STORE_ADDR_MISALIGNED } else { cause::LOAD_ADDR_MISALIGNED };
    raise_mmu_fault(h, code, addr, true, notifier, tlb, unwind);
}
