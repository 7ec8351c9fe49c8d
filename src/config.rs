//! Per-hart capability and configuration description.
//!
//! Unlike the bare-metal firmware this core descends from, which resolves its
//! configuration at compile time from environment variables (`option_env!`), a hosted
//! library has no such build-time knowledge of the guest it will be asked to emulate:
//! the embedding emulator supplies a [`Features`] value at [`crate::hart::Hart::new`]
//! time instead.

/// Effective privileged-spec revision a hart behaves as.
///
/// Only affects the S-mode trap-entry CSR writeback (`sstatus.SPIE` source selection,
/// see [`crate::trap`]): on `Legacy` harts the prior-interrupt-enable bit is read back
/// from `UIE << priv` instead of `SIE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrivVersion {
    /// Privileged ISA version 1.10 or later.
    Modern,
    /// Pre-1.10 behaviour.
    Legacy,
}

impl Default for PrivVersion {
    fn default() -> Self {
        PrivVersion::Modern
    }
}

/// Feature bitset describing which optional pieces of the privileged architecture a
/// hart was built with.
///
/// Grounded on the teacher's `ExtensionsCapability`/`HardwareCapability` pattern
/// (`arch/mod.rs`, `virt/mod.rs`): a small, explicit, core-local struct rather than a
/// global feature-flag registry.
#[derive(Debug, Clone, Copy)]
pub struct Features {
    /// Whether the hart has an MMU (Sv32/39/48/57 translation). When false, `translate`
    /// always returns an identity mapping with full permissions.
    pub mmu: bool,
    /// Whether physical memory protection is present. When false, the MMU facade never
    /// consults the PMP collaborator.
    pub pmp: bool,
    /// Whether the H-extension (two-stage virtualisation) is present.
    pub rvh: bool,
    /// Effective privileged-spec revision.
    pub priv_ver: PrivVersion,
}

impl Features {
    /// A hart with the MMU and PMP present, no hypervisor extension, modern privilege
    /// version. The common case for a standalone supervisor-capable hart.
    pub const fn baseline() -> Self {
        Features {
            mmu: true,
            pmp: true,
            rvh: false,
            priv_ver: PrivVersion::Modern,
        }
    }

    /// [`Self::baseline`] plus the H-extension.
    pub const fn with_hypervisor() -> Self {
        Features {
            rvh: true,
            ..Self::baseline()
        }
    }
}

impl Default for Features {
    fn default() -> Self {
        Self::baseline()
    }
}
