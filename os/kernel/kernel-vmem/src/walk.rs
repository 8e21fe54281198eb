//! # Page-table walk collaborator
//!
//! The paging core never walks page tables itself. It identifies a mapping by
//! a `(PageTableId, VirtualAddress)` pair and asks a [`PageTableWalk`]
//! implementation for the leaf entry, which it then reads and rewrites through
//! an [`EntryCell`].

use crate::addresses::VirtualAddress;
use crate::entry::PageTableEntry;
use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};

/// Identifies an address space's root page table, e.g. the physical address
/// loaded into `CR3`.
///
/// The id is a lookup key, not an owning pointer: the frame table stores it to
/// find a mapping again later, and a stale id simply fails to resolve.
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PageTableId(u64);

impl PageTableId {
    #[inline]
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for PageTableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PageTableId(0x{:X})", self.0)
    }
}

/// A leaf entry slot inside a live page table.
///
/// The CPU sets the accessed and dirty bits behind the kernel's back, so the
/// slot is accessed atomically. `#[repr(transparent)]` over [`AtomicU64`] lets
/// a walker hand out references straight into page-table memory.
#[repr(transparent)]
pub struct EntryCell(AtomicU64);

impl EntryCell {
    #[must_use]
    pub const fn new(entry: PageTableEntry) -> Self {
        Self(AtomicU64::new(entry.into_bits()))
    }

    /// View a raw 64-bit entry in page-table memory as an [`EntryCell`].
    ///
    /// # Safety
    /// - `ptr` must be valid, 8-byte aligned and point into a mapped page table.
    /// - All concurrent accesses to the entry must be atomic for `'a`.
    #[inline]
    pub unsafe fn from_ptr<'a>(ptr: *mut u64) -> &'a Self {
        // SAFETY: EntryCell is repr(transparent) over AtomicU64, which has the
        // same layout as u64; the caller guarantees validity and atomic access.
        unsafe { &*ptr.cast::<Self>() }
    }

    #[inline]
    #[must_use]
    pub fn load(&self) -> PageTableEntry {
        PageTableEntry::from_bits(self.0.load(Ordering::Acquire))
    }

    #[inline]
    pub fn store(&self, entry: PageTableEntry) {
        self.0.store(entry.into_bits(), Ordering::Release);
    }

    /// Install `new` only if the slot still holds `current`.
    ///
    /// # Errors
    /// Returns the entry actually found when it differs from `current`.
    #[inline]
    pub fn compare_exchange(
        &self,
        current: PageTableEntry,
        new: PageTableEntry,
    ) -> Result<(), PageTableEntry> {
        self.0
            .compare_exchange(
                current.into_bits(),
                new.into_bits(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map(|_| ())
            .map_err(PageTableEntry::from_bits)
    }

    /// Clear the accessed bit and return whether it was set.
    #[inline]
    pub fn clear_accessed(&self) -> bool {
        let mask = PageTableEntry::vacant().with_accessed(true).into_bits();
        self.0.fetch_and(!mask, Ordering::AcqRel) & mask != 0
    }

    /// Set the accessed bit of a present entry, as the MMU does on a reference.
    ///
    /// Returns `false` and leaves the entry alone if it is not present.
    #[inline]
    pub fn mark_accessed(&self) -> bool {
        self.0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |bits| {
                let entry = PageTableEntry::from_bits(bits);
                entry
                    .is_present()
                    .then(|| entry.with_accessed(true).into_bits())
            })
            .is_ok()
    }
}

impl Default for EntryCell {
    fn default() -> Self {
        Self::new(PageTableEntry::vacant())
    }
}

impl fmt::Debug for EntryCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.load(), f)
    }
}

/// Resolves a mapping to its leaf entry.
pub trait PageTableWalk {
    /// Return the leaf entry for `va` in `table`, or `None` if the walk hits a
    /// missing intermediate table or `table` no longer exists.
    ///
    /// Never allocates intermediate tables.
    fn resolve(&self, table: PageTableId, va: VirtualAddress) -> Option<&EntryCell>;

    /// Invalidate any cached translation for `va` in `table` after its entry
    /// was rewritten.
    fn flush(&self, table: PageTableId, va: VirtualAddress) {
        let _ = (table, va);
    }
}
