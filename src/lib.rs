//! Privileged-architecture emulation core for a RISC-V hart: CSR/hart state,
//! interrupt arbitration, the Sv32/39/48/57 page-table walker, trap dispatch
//! (including the H-extension background-register swap), and the MMU
//! TLB-fill facade.
//!
//! This crate owns the architectural state transitions a dynamic-translation CPU
//! emulator needs at every trap and TLB miss; it never touches guest physical memory,
//! PMP register decoding, the TLB cache, or instruction decode/execution directly.
//! See [`collaborators`] for the traits those concerns are consumed through.

mod debug;

pub mod bits;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod facade;
pub mod hart;
pub mod interrupt;
pub mod mmu;
pub mod priv_mode;
pub mod trap;

pub use collaborators::{
    CasOutcome, ExecutionUnwind, HartNotifier, PhysMemory, PmpChecker, Prot, PteSize, Tlb,
};
pub use config::{Features, PrivVersion};
pub use error::CoreError;
pub use hart::Hart;
pub use mmu::{Access, Translate};
pub use priv_mode::PrivMode;
