//! Page-Table Walker (C3).
//!
//! Translates guest virtual addresses to physical addresses, enforcing the Sv32/39/48/57
//! permission rules and setting A/D bits atomically. Grounded on `get_physical_address`
//! in `original_source/target/riscv/cpu_helper.c`; the teacher repo has no page-table
//! walker of its own (Miralis never translates guest addresses, only intercepts CSR
//! accesses), so this module is built directly from the original source rather than
//! generalised from teacher code. See DESIGN.md.

use crate::bits::{mstatus, pte, satp};
use crate::collaborators::{CasOutcome, PhysMemory, PmpChecker, PteSize, Prot};
use crate::hart::{self, Hart};
use crate::priv_mode::PrivMode;

/// The kind of memory access being translated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Fetch,
    Load,
    Store,
}

/// Result of a translation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Translate {
    Success { paddr: usize, prot: Prot },
    /// An architectural page fault: bad PTE, permission violation, misaligned
    /// superpage, or a non-canonical address.
    Fail,
    /// PMP denied a page-table-entry load. Distinguished from `Fail` because the MMU
    /// facade raises an access fault rather than a page fault for this case.
    PmpFail,
}

const PGSHIFT: usize = 12;
const PAGE_MASK: usize = (1 << PGSHIFT) - 1;
const FULL_PROT: Prot = Prot { read: true, write: true, execute: true };

#[derive(Debug, Clone, Copy)]
struct SvParams {
    levels: usize,
    ptidxbits: usize,
    ptesize: PteSize,
}

fn sv_params(mode_bits: usize) -> Option<SvParams> {
    match mode_bits {
        satp::MODE_SV32 => Some(SvParams { levels: 2, ptidxbits: 10, ptesize: PteSize::Four }),
        satp::MODE_SV39 => Some(SvParams { levels: 3, ptidxbits: 9, ptesize: PteSize::Eight }),
        satp::MODE_SV48 => Some(SvParams { levels: 4, ptidxbits: 9, ptesize: PteSize::Eight }),
        satp::MODE_SV57 => Some(SvParams { levels: 5, ptidxbits: 9, ptesize: PteSize::Eight }),
        _ => None,
    }
}

/// Computes the effective privilege mode for the walker, applying MPRV/MPP
/// substitution for data accesses only (instruction fetch always uses `mmu_idx`
/// directly: `riscv_cpu_mmu_index` never applies MPRV to fetches).
pub(crate) fn effective_mode(h: &Hart, access: Access, mmu_idx: PrivMode) -> PrivMode {
    if access == Access::Fetch {
        return mmu_idx;
    }
    if mmu_idx == PrivMode::M && hart::field(h.mstatus, mstatus::MPRV_OFFSET, mstatus::MPRV_FILTER) != 0 {
        return PrivMode::from_bits(hart::field(h.mstatus, mstatus::MPP_OFFSET, mstatus::MPP_FILTER));
    }
    mmu_idx
}

/// Translates `vaddr` for `access` under `mmu_idx`.
///
/// `first_stage` selects which root register anchors the walk: `true` uses `satp`
/// (the currently-active world's first-stage table, since thanks to
/// [`Hart::swap_background_regs`] `satp` always denotes whichever world, host-S or
/// guest-VS, is presently running); `false` uses `hgatp`, the second (guest-physical to
/// host-physical) stage. Both stages share the same walk algorithm.
pub fn translate(
    h: &mut Hart,
    vaddr: usize,
    access: Access,
    mmu_idx: PrivMode,
    first_stage: bool,
    mem: &dyn PhysMemory,
    pmp: &dyn PmpChecker,
) -> Translate {
    let mode = effective_mode(h, access, mmu_idx);

    if mode == PrivMode::M || !h.features.mmu {
        return Translate::Success { paddr: vaddr, prot: FULL_PROT };
    }

    let satp_reg = if first_stage { h.satp } else { h.hgatp };
    let mode_bits = hart::field(satp_reg, satp::MODE_OFFSET, satp::MODE_FILTER);

    if mode_bits == satp::MODE_BARE {
        return Translate::Success { paddr: vaddr, prot: FULL_PROT };
    }

    let params = match sv_params(mode_bits) {
        Some(p) => p,
        None => {
            debug_assert!(false, "unknown satp.MODE encoding {mode_bits:#x}");
            return Translate::Success { paddr: vaddr, prot: FULL_PROT };
        }
    };

    let va_bits = PGSHIFT + params.levels * params.ptidxbits;
    let shift = usize::BITS as usize - va_bits;
    let sign_extended = ((vaddr << shift) as isize >> shift) as usize;
    if sign_extended != vaddr {
        return Translate::Fail;
    }

    let mxr = hart::field(h.mstatus, mstatus::MXR_OFFSET, mstatus::MXR_FILTER) != 0;
    let sum = hart::field(h.mstatus, mstatus::SUM_OFFSET, mstatus::SUM_FILTER) != 0;
    let root = (satp_reg & satp::PPN_FILTER) << PGSHIFT;
    let vpn = vaddr >> PGSHIFT;

    'restart: loop {
        let mut base = root;
        for level in 0..params.levels {
            let ptshift = (params.levels - 1 - level) * params.ptidxbits;
            let idx = (vaddr >> (PGSHIFT + ptshift)) & ((1 << params.ptidxbits) - 1);
            let pte_addr = base + idx * params.ptesize.bytes();

            if h.features.pmp && !pmp.pmp_has_privs(pte_addr as u64, params.ptesize.bytes(), Access::Load, PrivMode::S) {
                return Translate::PmpFail;
            }

            let raw_pte: usize = match params.ptesize {
                PteSize::Four => mem.load32(pte_addr as u64) as usize,
                PteSize::Eight => mem.load64(pte_addr as u64) as usize,
            };

            let v = raw_pte & pte::V != 0;
            let r = raw_pte & pte::R != 0;
            let w = raw_pte & pte::W != 0;
            let x = raw_pte & pte::X != 0;
            let u = raw_pte & pte::U != 0;

            if !v {
                return Translate::Fail;
            }

            let ppn = raw_pte >> pte::PPN_SHIFT;

            if !r && !w && !x {
                // Interior node.
                base = ppn << PGSHIFT;
                continue;
            }

            // Leaf.
            if w && !r {
                return Translate::Fail; // reserved encoding
            }

            if u {
                if mode == PrivMode::S && (access == Access::Fetch || !sum) {
                    return Translate::Fail;
                }
            } else if mode != PrivMode::S {
                return Translate::Fail;
            }

            if ppn & ((1 << ptshift) - 1) != 0 {
                return Translate::Fail; // misaligned superpage
            }

            let perm_ok = match access {
                Access::Load => r || (x && mxr),
                Access::Store => w,
                Access::Fetch => x,
            };
            if !perm_ok {
                return Translate::Fail;
            }

            let mut updated = raw_pte | pte::A;
            if access == Access::Store {
                updated |= pte::D;
            }
            if updated != raw_pte {
                match mem.cas_pte(pte_addr as u64, params.ptesize, raw_pte as u64, updated as u64) {
                    Some(CasOutcome::Swapped) => {}
                    Some(CasOutcome::Mismatch) => continue 'restart,
                    None => return Translate::Fail,
                }
            }

            let paddr = ((ppn & !((1 << ptshift) - 1)) | (vpn & ((1 << ptshift) - 1))) << PGSHIFT
                | (vaddr & PAGE_MASK);
            let prot = Prot {
                read: r || (x && mxr),
                write: w && access == Access::Store,
                execute: x,
            };
            return Translate::Success { paddr, prot };
        }

        // Walked through every level without finding a leaf.
        return Translate::Fail;
    }
}
