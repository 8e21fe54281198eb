//! # Kernel Physical Page Allocation with Demand-Paging Swap
//!
//! This crate owns the kernel's pool of 4 KiB physical frames. When the pool
//! runs dry it does not fail immediately: it picks a resident user page with
//! the clock (second-chance) algorithm, writes it to a swap slot, rewrites the
//! page-table entry to remember the slot, and reuses the frame. A later fault
//! on that entry reads the page back.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                   Pager ([`pager`])                 │
//! │    • allocate / release frames                      │
//! │    • swap-out of victims, swap-in on fault          │
//! │    • fork and teardown of swapped mappings          │
//! └──────┬──────────────────┬───────────────────┬───────┘
//!        │                  │                   │
//! ┌──────▼───────┐  ┌───────▼────────┐  ┌───────▼───────┐
//! │ Frame table  │  │ Clock scan     │  │ Swap map      │
//! │ free list    │  │ A-bit second   │  │ (kernel-swap) │
//! │ resident ring│  │ chance         │  │ slot bitmap   │
//! └──────────────┘  └────────────────┘  └───────────────┘
//! ```
//!
//! ## Collaborators
//!
//! The pager never walks page tables, touches devices or dereferences
//! physical memory on its own. It is generic over:
//!
//! * [`PageTableWalk`](kernel_vmem::PageTableWalk): finds the leaf entry of a
//!   `(table, address)` pair, and flushes the TLB after a rewrite.
//! * [`SwapDevice`](kernel_swap::SwapDevice): synchronous one-page block I/O.
//! * [`PhysMapper`](kernel_vmem::PhysMapper): access to a frame's bytes, e.g.
//!   the higher-half direct map in [`phys_mapper`].
//!
//! ## Frame life cycle
//!
//! ```text
//!   Free ──allocate_frame──► Allocated ──track──► Resident
//!    ▲                          │  ▲                 │
//!    └──────release_frame───────┘  └────untrack──────┤
//!    ▲                                               │
//!    └────────────────── evict (swap-out) ◄──────────┘
//! ```
//!
//! At any quiescent point `free + resident + allocated == total`.
//!
//! ## Failure model
//!
//! * Exhaustion of frames or swap slots is recoverable and surfaces as
//!   [`PagerError::OutOfMemory`] / [`PagerError::SwapExhausted`].
//! * Corruption (releasing a foreign or free frame, an entry naming a slot
//!   outside the swap map) is a kernel bug and panics on detection.
//!
//! ## Usage
//! ```rust,no_run
//! use kernel_alloc::{Pager, PagerConfig, phys_mapper::HhdmPhysMapper};
//! use kernel_swap::RamSwapDevice;
//! use kernel_vmem::{EntryCell, PageTableId, PageTableWalk, VirtualAddress};
//!
//! struct NoTables;
//!
//! impl PageTableWalk for NoTables {
//!     fn resolve(&self, _: PageTableId, _: VirtualAddress) -> Option<&EntryCell> {
//!         None
//!     }
//! }
//!
//! let pager = Pager::new(
//!     PagerConfig::default(),
//!     NoTables,
//!     RamSwapDevice::new(kernel_info::memory::SWAP_SLOTS),
//!     HhdmPhysMapper,
//! )
//! .unwrap();
//!
//! let frame = pager.allocate_frame().unwrap();
//! pager.release_frame(frame);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

extern crate alloc;

mod clock;
mod config;
mod error;
mod frame_table;
mod pager;
pub mod phys_mapper;

pub use clock::{Victim, select_victim};
pub use config::{PagerConfig, PagerConfigError};
pub use error::{EvictError, PagerError};
pub use frame_table::{FrameTable, Mapping};
pub use pager::{Pager, PagerStats};
