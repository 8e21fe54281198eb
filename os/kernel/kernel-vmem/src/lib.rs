//! # Virtual Memory Support
//!
//! Types shared between the page allocator, the swap subsystem and the
//! page-table code of an x86-64 kernel.
//!
//! ## What you get
//! - Tiny [`PhysicalAddress`]/[`VirtualAddress`] newtypes (u64) to avoid mixing address kinds.
//! - A raw [`PageEntryBits`] bitfield for 4 KiB leaf entries.
//! - A typed [`PageTableEntry`] that is either **resident** or **swapped out**,
//!   decoded through [`EntryState`].
//! - The collaborator traits the paging core consumes: [`PageTableWalk`] to
//!   find a mapping's entry and [`PhysMapper`] to touch a frame's bytes.
//!
//! ## Dual encoding of a leaf entry
//!
//! Hardware ignores every bit of a not-present entry. When a page is evicted,
//! its entry keeps the permission bits, clears `P`, sets an OS-available
//! marker and reuses the 40-bit frame-number field for the swap slot index:
//!
//! ```text
//!            63      52 51                      12 11  9 8     5 4    1 0
//! resident   | perms  |   physical frame number   | os |perm| A |perm| 1 |
//! swapped    | perms  |     swap slot index       | os1|perm| 0 |perm| 0 |
//! ```
//!
//! A page-fault handler that finds `P=0` with the marker set hands the entry
//! to the swap-in path instead of treating the access as a segmentation fault.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code, clippy::inline_always)]

mod addresses;
mod entry;
mod page_entry_bits;
mod walk;

pub use crate::addresses::{PhysicalAddress, VirtualAddress};
pub use crate::entry::{EntryState, PagePermissions, PageTableEntry, SwapSlot};
pub use crate::page_entry_bits::PageEntryBits;
pub use crate::walk::{EntryCell, PageTableId, PageTableWalk};

/// Re-export constants as info module.
pub use kernel_info::memory as info;

/// Converts physical addresses to *temporarily* usable pointers in the current
/// virtual address space (e.g., via identity map or a higher-half direct map, HHDM).
///
/// The paging core uses it to fill, persist and restore frame contents.
///
/// # Safety
/// - You must ensure `pa` is mapped as writable in the current page tables
///   for `&mut T`.
/// - Lifetime `'a` is purely borrow-checked; the mapping must remain valid
///   for `'a`.
/// - Type `T` must match the bytes at `pa` (no aliasing UB).
pub trait PhysMapper {
    /// Convert a *physical* address to a usable mutable reference in the current address space.
    ///
    /// # Safety
    /// The caller must hold exclusive access to the memory at `pa` for `'a`.
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T;
}

/// The bytes of one 4 KiB frame.
pub type FrameBytes = [u8; info::PAGE_SIZE];
