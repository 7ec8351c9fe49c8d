//! Trap Dispatcher (C4).
//!
//! Performs the architectural state transition for any exception or interrupt entry,
//! including the H-extension background-register swap. Grounded on
//! `riscv_cpu_do_interrupt` in `original_source/target/riscv/cpu_helper.c`; the
//! CSR-field read/write idiom (`hart::set_field`) follows the teacher's
//! `VirtCsr::set_csr_field` (`virt/mod.rs`).

use crate::bits::{cause, hstatus, mstatus};
use crate::collaborators::{HartNotifier, Tlb};
use crate::config::PrivVersion;
use crate::hart::{self, Hart};
use crate::priv_mode::PrivMode;

fn is_address_bearing(code: usize) -> bool {
    matches!(
        code,
        cause::INSTR_ADDR_MISALIGNED
            | cause::INSTR_ACCESS_FAULT
            | cause::INSTR_PAGE_FAULT
            | cause::LOAD_ADDR_MISALIGNED
            | cause::LOAD_ACCESS_FAULT
            | cause::LOAD_PAGE_FAULT
            | cause::STORE_ADDR_MISALIGNED
            | cause::STORE_ACCESS_FAULT
            | cause::STORE_PAGE_FAULT
    )
}

fn vectored_pc(tvec: usize, is_async: bool, code: usize) -> usize {
    let base = tvec & !0b11;
    if is_async && (tvec & 0b11) == 1 {
        base + 4 * code
    } else {
        base
    }
}

/// Writes the S-mode trap-entry fields (SPIE/SPP/SIE, scause, sepc, stval) into
/// whichever status/scalar registers are passed, either the host's plain fields or
/// the `vs*` shadows, depending on whether the trap stays within VS or leaves it.
/// Returns the new `pc`.
#[allow(clippy::too_many_arguments)]
fn s_mode_entry(
    stvec: &mut usize,
    sepc: &mut usize,
    scause: &mut usize,
    stval_reg: &mut usize,
    status: &mut usize,
    priv_ver: PrivVersion,
    pre_priv: PrivMode,
    code: usize,
    is_async: bool,
    tval: usize,
    pc: usize,
) -> usize {
    let spie_source = match priv_ver {
        PrivVersion::Modern => hart::field(*status, mstatus::SIE_OFFSET, mstatus::SIE_FILTER),
        PrivVersion::Legacy => {
            // UIE << priv: extract bit `priv` of the status register. See SPEC_FULL.md §9.
            (*status >> pre_priv.to_bits()) & 0b1
        }
    };
    hart::set_field(status, mstatus::SPIE_OFFSET, mstatus::SPIE_FILTER, spie_source);
    hart::set_field(status, mstatus::SPP_OFFSET, mstatus::SPP_FILTER, pre_priv.to_bits() & 0b1);
    hart::set_field(status, mstatus::SIE_OFFSET, mstatus::SIE_FILTER, 0);

    *scause = code | if is_async { cause::INT_FLAG } else { 0 };
    *sepc = pc;
    *stval_reg = tval;
    vectored_pc(*stvec, is_async, code)
}

/// Entered with `hart.exception_index` holding either an interrupt index OR-ed with
/// `INT_FLAG` or a synchronous exception code. Mutates `pc`, `priv_mode`, and the
/// selected trap CSRs to their post-trap state and clears `exception_index`.
pub fn do_interrupt(h: &mut Hart, notifier: &dyn HartNotifier, tlb: &dyn Tlb) {
    let Some(exception_index) = h.exception_index else {
        debug_assert!(false, "do_interrupt called with no pending exception_index");
        return;
    };

    let is_async = exception_index & cause::INT_FLAG != 0;
    let mut code = exception_index & !cause::INT_FLAG;
    let pre_priv = h.priv_mode;
    let pre_virt = h.virt.enabled;

    if !is_async && code == cause::U_ECALL {
        code = match (pre_priv, pre_virt) {
            (PrivMode::M, _) => cause::M_ECALL,
            (PrivMode::S, true) => cause::VS_ECALL,
            (PrivMode::S, false) => cause::HS_ECALL,
            _ => cause::U_ECALL,
        };
    }

    let tval = if !is_async && is_address_bearing(code) { h.badaddr } else { 0 };
    let deleg = if is_async { h.mideleg } else { h.medeleg };
    let delegate_to_s =
        pre_priv <= PrivMode::S && code < usize::BITS as usize && (deleg >> code) & 1 != 0;

    log::debug!(
        "do_interrupt: cause={code:#x} async={is_async} pre_priv={pre_priv:?} virt={pre_virt} -> {}",
        if delegate_to_s { "S" } else { "M" }
    );

    if delegate_to_s {
        enter_s_mode(h, notifier, tlb, code, is_async, tval, pre_priv, pre_virt);
    } else {
        enter_m_mode(h, notifier, tlb, code, is_async, tval, pre_priv, pre_virt);
    }

    h.exception_index = None;
}

fn enter_s_mode(
    h: &mut Hart,
    notifier: &dyn HartNotifier,
    tlb: &dyn Tlb,
    code: usize,
    is_async: bool,
    tval: usize,
    pre_priv: PrivMode,
    pre_virt: bool,
) {
    let hdeleg = if is_async { h.hideleg } else { h.hedeleg };
    let hdeleg_bit = h.features.rvh && code < usize::BITS as usize && (hdeleg >> code) & 1 != 0;
    let stay_in_vs = h.features.rvh && pre_virt && hdeleg_bit && !h.force_hs_excep_enabled();

    if stay_in_vs {
        let new_pc = s_mode_entry(
            &mut h.vstvec,
            &mut h.vsepc,
            &mut h.vscause,
            &mut h.vstval,
            &mut h.vsstatus,
            h.features.priv_ver,
            pre_priv,
            code,
            is_async,
            tval,
            h.pc,
        );
        h.pc = new_pc;
        h.priv_mode = PrivMode::S;
        return;
    }

    if h.features.rvh && pre_virt {
        let pre_spp = hart::field(h.vsstatus, mstatus::SPP_OFFSET, mstatus::SPP_FILTER);
        h.swap_background_regs(notifier);
        hart::set_field(&mut h.hstatus, hstatus::SP2V_OFFSET, hstatus::SP2V_FILTER, 1);
        hart::set_field(&mut h.hstatus, hstatus::SP2P_OFFSET, hstatus::SP2P_FILTER, pre_spp);
        hart::set_field(&mut h.hstatus, hstatus::SPV_OFFSET, hstatus::SPV_FILTER, 1);
        hart::set_field(
            &mut h.hstatus,
            hstatus::STL_OFFSET,
            hstatus::STL_FILTER,
            h.force_hs_excep_enabled() as usize,
        );
        h.set_virt_enabled(false, tlb);
        h.set_force_hs_excep(false);
    } else if h.features.rvh {
        let pre_spp = hart::field(h.mstatus, mstatus::SPP_OFFSET, mstatus::SPP_FILTER);
        hart::set_field(&mut h.hstatus, hstatus::SP2V_OFFSET, hstatus::SP2V_FILTER, 0);
        hart::set_field(&mut h.hstatus, hstatus::SP2P_OFFSET, hstatus::SP2P_FILTER, pre_spp);
        hart::set_field(&mut h.hstatus, hstatus::SPV_OFFSET, hstatus::SPV_FILTER, 0);
    }

    let new_pc = s_mode_entry(
        &mut h.stvec,
        &mut h.sepc,
        &mut h.scause,
        &mut h.stval,
        &mut h.mstatus,
        h.features.priv_ver,
        pre_priv,
        code,
        is_async,
        tval,
        h.pc,
    );
    h.pc = new_pc;
    h.priv_mode = PrivMode::S;
}

fn enter_m_mode(
    h: &mut Hart,
    notifier: &dyn HartNotifier,
    tlb: &dyn Tlb,
    code: usize,
    is_async: bool,
    tval: usize,
    pre_priv: PrivMode,
    pre_virt: bool,
) {
    if h.features.rvh && pre_virt {
        h.swap_background_regs(notifier);
        hart::set_field(&mut h.mstatus, mstatus::MPV_OFFSET, mstatus::MPV_FILTER, 1);
        hart::set_field(
            &mut h.mstatus,
            mstatus::MTL_OFFSET,
            mstatus::MTL_FILTER,
            h.force_hs_excep_enabled() as usize,
        );
        h.set_virt_enabled(false, tlb);
        h.set_force_hs_excep(false);
    }

    let mie_bit = hart::field(h.mstatus, mstatus::MIE_OFFSET, mstatus::MIE_FILTER);
    hart::set_field(&mut h.mstatus, mstatus::MPIE_OFFSET, mstatus::MPIE_FILTER, mie_bit);
    hart::set_field(&mut h.mstatus, mstatus::MPP_OFFSET, mstatus::MPP_FILTER, pre_priv.to_bits());
    hart::set_field(&mut h.mstatus, mstatus::MIE_OFFSET, mstatus::MIE_FILTER, 0);

    h.mcause = code | if is_async { cause::INT_FLAG } else { 0 };
    h.mepc = h.pc;
    h.mtval = tval;
    h.pc = vectored_pc(h.mtvec, is_async, code);
    h.priv_mode = PrivMode::M;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::Prot;
    use crate::config::Features;

    struct NullNotifier;
    impl HartNotifier for NullNotifier {
        fn notify_interrupt_line(&self, _raise: bool) {}
    }
    struct NullTlb;
    impl Tlb for NullTlb {
        fn set_page(&self, _v: u64, _p: u64, _prot: Prot, _m: usize, _s: u64) {}
        fn flush(&self) {}
    }

    /// Property 7: synchronous, non-delegated trap entry consistency.
    #[test]
    fn sync_trap_to_m_mode_is_consistent() {
        let mut h = Hart::new(0, Features::baseline(), 0);
        h.priv_mode = PrivMode::S;
        hart::set_field(&mut h.mstatus, mstatus::MIE_OFFSET, mstatus::MIE_FILTER, 1);
        h.pc = 0x1000;
        h.mtvec = 0x8000_0000;
        h.exception_index = Some(cause::ILLEGAL_INSTR);

        let (n, t) = (NullNotifier, NullTlb);
        do_interrupt(&mut h, &n, &t);

        assert_eq!(h.mepc, 0x1000);
        assert_eq!(h.mcause, cause::ILLEGAL_INSTR);
        assert_eq!(h.mcause & cause::INT_FLAG, 0);
        assert_eq!(h.priv_mode, PrivMode::M);
        assert_eq!(hart::field(h.mstatus, mstatus::MPP_OFFSET, mstatus::MPP_FILTER), PrivMode::S.to_bits());
        assert_eq!(hart::field(h.mstatus, mstatus::MPIE_OFFSET, mstatus::MPIE_FILTER), 1);
        assert_eq!(hart::field(h.mstatus, mstatus::MIE_OFFSET, mstatus::MIE_FILTER), 0);
        assert_eq!(h.pc, 0x8000_0000);
        assert!(h.exception_index.is_none());
    }

    /// Property 8: vectored async interrupt dispatch.
    #[test]
    fn vectored_async_interrupt_offsets_pc() {
        let mut h = Hart::new(0, Features::baseline(), 0);
        h.priv_mode = PrivMode::M;
        h.mtvec = 0x8000_0000 | 0b01; // vectored
        h.exception_index = Some(cause::INT_FLAG | 7);

        let (n, t) = (NullNotifier, NullTlb);
        do_interrupt(&mut h, &n, &t);

        assert_eq!(h.pc, 0x8000_0000 + 4 * 7);
        assert_eq!(h.mcause, 7 | cause::INT_FLAG);
    }

    /// S4: delegated store page fault traps to S-mode with the expected CSR state.
    #[test]
    fn delegated_store_page_fault_traps_to_s_mode() {
        let mut h = Hart::new(0, Features::baseline(), 0);
        h.priv_mode = PrivMode::U;
        h.medeleg = 1 << cause::STORE_PAGE_FAULT;
        h.pc = 0x2000;
        h.badaddr = 0x1000;
        h.stvec = 0x9000_0000;
        h.exception_index = Some(cause::STORE_PAGE_FAULT);

        let (n, t) = (NullNotifier, NullTlb);
        do_interrupt(&mut h, &n, &t);

        assert_eq!(h.scause, cause::STORE_PAGE_FAULT);
        assert_eq!(h.sepc, 0x2000);
        assert_eq!(h.stval, 0x1000);
        assert_eq!(h.priv_mode, PrivMode::S);
        assert_eq!(h.pc, 0x9000_0000);
    }

    /// S6: ECALL refinement from S-mode while virt is ON retargets to VS_ECALL.
    #[test]
    fn ecall_refinement_targets_vs_ecall() {
        let mut h = Hart::new(0, Features::with_hypervisor(), 0);
        h.priv_mode = PrivMode::S;
        h.virt.enabled = true;
        h.exception_index = Some(cause::U_ECALL);
        // Nothing delegates it: falls through to M-mode, but the cause code itself
        // must already have been retargeted to VS_ECALL before the M/S split.
        let (n, t) = (NullNotifier, NullTlb);
        do_interrupt(&mut h, &n, &t);
        assert_eq!(h.mcause, cause::VS_ECALL);
    }

    /// S5: a non-delegated, non-forced trap while virt is ON swaps background regs and
    /// sets the HS entry hstatus fields.
    #[test]
    fn virt_enabled_trap_not_delegated_enters_hs() {
        let mut h = Hart::new(0, Features::with_hypervisor(), 0);
        h.priv_mode = PrivMode::S;
        h.virt.enabled = true;
        hart::set_field(&mut h.vsstatus, mstatus::SPP_OFFSET, mstatus::SPP_FILTER, 1);
        h.hideleg = 0; // not delegated to VS
        h.exception_index = Some(cause::ILLEGAL_INSTR);

        let (n, t) = (NullNotifier, NullTlb);
        do_interrupt(&mut h, &n, &t);

        assert!(!h.virt_enabled());
        assert_eq!(hart::field(h.hstatus, hstatus::SPV_OFFSET, hstatus::SPV_FILTER), 1);
        assert_eq!(hart::field(h.hstatus, hstatus::SP2P_OFFSET, hstatus::SP2P_FILTER), 1);
        assert_eq!(h.priv_mode, PrivMode::S);
        assert_eq!(h.scause, cause::ILLEGAL_INSTR);
    }

    #[test]
    fn delegated_hs_trap_stays_in_vs_without_swap() {
        let mut h = Hart::new(0, Features::with_hypervisor(), 0);
        h.priv_mode = PrivMode::S;
        h.virt.enabled = true;
        h.hedeleg = 1 << cause::ILLEGAL_INSTR;
        h.vstvec = 0xa000_0000;
        h.exception_index = Some(cause::ILLEGAL_INSTR);

        let (n, t) = (NullNotifier, NullTlb);
        do_interrupt(&mut h, &n, &t);

        assert!(h.virt_enabled(), "delegated VS trap must not leave virt mode");
        assert_eq!(h.vscause, cause::ILLEGAL_INSTR);
        assert_eq!(h.pc, 0xa000_0000);
    }
}
