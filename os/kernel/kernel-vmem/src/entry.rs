//! # Dual-encoded leaf entries
//!
//! A leaf [`PageTableEntry`] is in exactly one of three states, modelled by
//! [`EntryState`]:
//!
//! - **Vacant**: nothing mapped.
//! - **Resident**: `P=1`, bits `[51:12]` hold the physical frame number.
//! - **Swapped out**: `P=0`, swapped marker set, bits `[51:12]` hold the swap
//!   slot index.
//!
//! Permission and caching bits survive every transition between the last two
//! states, see [`PagePermissions`].

use crate::addresses::PhysicalAddress;
use crate::page_entry_bits::{
    ACCESSED_MASK, FRAME_OR_SLOT_BITS, FRAME_OR_SLOT_MASK, PRESENT_MASK, PageEntryBits,
    SWAPPED_MASK,
};
use core::fmt;

/// Index of a page-sized slot on the swap device.
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct SwapSlot(u32);

impl SwapSlot {
    /// Largest slot index the entry encoding can carry.
    pub const MAX_ENCODABLE: u64 = (1 << FRAME_OR_SLOT_BITS) - 1;

    #[inline]
    #[must_use]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    #[inline]
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for SwapSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SwapSlot({})", self.0)
    }
}

impl fmt::Display for SwapSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// The bits of an entry that are carried unchanged across swap-out and
/// swap-in: everything except `P`, `A`, the swapped marker and the
/// frame/slot field.
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Hash)]
pub struct PagePermissions(u64);

impl PagePermissions {
    const MASK: u64 = !(PRESENT_MASK | ACCESSED_MASK | SWAPPED_MASK | FRAME_OR_SLOT_MASK);

    /// Extract the permission bits from a raw entry.
    #[inline]
    #[must_use]
    pub const fn from_entry_bits(bits: u64) -> Self {
        Self(bits & Self::MASK)
    }

    #[inline]
    #[must_use]
    pub const fn bits(self) -> u64 {
        self.0
    }

    /// User-accessible, writable, non-executable data page.
    #[inline]
    #[must_use]
    pub const fn user_rw() -> Self {
        Self::from_entry_bits(
            PageEntryBits::new()
                .with_writable(true)
                .with_user_access(true)
                .with_no_execute(true)
                .into_bits(),
        )
    }

    /// User-accessible, read-only, executable page.
    #[inline]
    #[must_use]
    pub const fn user_rx() -> Self {
        Self::from_entry_bits(PageEntryBits::new().with_user_access(true).into_bits())
    }

    /// Supervisor-only, writable, non-executable page.
    #[inline]
    #[must_use]
    pub const fn kernel_rw() -> Self {
        Self::from_entry_bits(
            PageEntryBits::new()
                .with_writable(true)
                .with_no_execute(true)
                .into_bits(),
        )
    }

    #[inline]
    #[must_use]
    pub const fn writable(self) -> bool {
        PageEntryBits::from_bits(self.0).writable()
    }

    #[inline]
    #[must_use]
    pub const fn user_access(self) -> bool {
        PageEntryBits::from_bits(self.0).user_access()
    }

    #[inline]
    #[must_use]
    pub const fn no_execute(self) -> bool {
        PageEntryBits::from_bits(self.0).no_execute()
    }

    #[inline]
    #[must_use]
    pub const fn dirty(self) -> bool {
        PageEntryBits::from_bits(self.0).dirty()
    }
}

impl fmt::Debug for PagePermissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}R{}{}",
            if self.user_access() { 'U' } else { 'S' },
            if self.writable() { 'W' } else { '-' },
            if self.no_execute() { '-' } else { 'X' },
        )
    }
}

/// Decoded view of a leaf entry.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum EntryState {
    /// No mapping.
    Vacant,
    /// Backed by a physical frame.
    Resident {
        frame: PhysicalAddress,
        accessed: bool,
        permissions: PagePermissions,
    },
    /// Contents live in a swap slot.
    SwappedOut {
        slot: SwapSlot,
        permissions: PagePermissions,
    },
}

/// A leaf page table entry in either its resident or swapped-out encoding.
#[doc(alias = "PTE")]
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq)]
pub struct PageTableEntry(PageEntryBits);

impl PageTableEntry {
    /// The all-zero entry.
    #[inline]
    #[must_use]
    pub const fn vacant() -> Self {
        Self(PageEntryBits::new())
    }

    /// Resident encoding: `P=1`, the frame number of `frame`, `A=accessed`.
    ///
    /// ### Debug assertions
    /// - `frame` must be page aligned.
    #[inline]
    #[must_use]
    pub const fn resident(
        frame: PhysicalAddress,
        accessed: bool,
        permissions: PagePermissions,
    ) -> Self {
        debug_assert!(frame.is_page_aligned());
        Self(
            PageEntryBits::from_bits(permissions.bits())
                .with_present(true)
                .with_accessed(accessed)
                .with_frame_or_slot(frame.frame_number()),
        )
    }

    /// Swapped-out encoding: `P=0`, swapped marker set, slot in bits `[51:12]`.
    #[inline]
    #[must_use]
    pub const fn swapped_out(slot: SwapSlot, permissions: PagePermissions) -> Self {
        Self(
            PageEntryBits::from_bits(permissions.bits())
                .with_swapped(true)
                .with_frame_or_slot(slot.as_u32() as u64),
        )
    }

    #[inline]
    #[must_use]
    pub const fn from_bits(bits: u64) -> Self {
        Self(PageEntryBits::from_bits(bits))
    }

    #[inline]
    #[must_use]
    pub const fn into_bits(self) -> u64 {
        self.0.into_bits()
    }

    /// Expose the underlying bitfield for advanced inspection/masking.
    #[inline]
    #[must_use]
    pub const fn flags(self) -> PageEntryBits {
        self.0
    }

    #[inline]
    #[must_use]
    pub const fn is_present(self) -> bool {
        self.0.present()
    }

    /// `P=0` with the swapped marker set.
    #[inline]
    #[must_use]
    pub const fn is_swapped_out(self) -> bool {
        !self.0.present() && self.0.swapped()
    }

    #[inline]
    #[must_use]
    pub const fn accessed(self) -> bool {
        self.0.present() && self.0.accessed()
    }

    /// Same entry with the accessed bit changed.
    #[inline]
    #[must_use]
    pub const fn with_accessed(self, accessed: bool) -> Self {
        Self(self.0.with_accessed(accessed))
    }

    /// The mapped frame, if resident.
    #[inline]
    #[must_use]
    pub const fn frame(self) -> Option<PhysicalAddress> {
        if self.is_present() {
            Some(PhysicalAddress::from_frame_number(self.0.frame_or_slot()))
        } else {
            None
        }
    }

    /// The raw slot field, if swapped out.
    ///
    /// Returned as `u64` because a corrupted entry may carry an index that no
    /// [`SwapSlot`] can represent; the caller decides what to do with it.
    #[inline]
    #[must_use]
    pub const fn raw_swap_slot(self) -> Option<u64> {
        if self.is_swapped_out() {
            Some(self.0.frame_or_slot())
        } else {
            None
        }
    }

    #[inline]
    #[must_use]
    pub const fn permissions(self) -> PagePermissions {
        PagePermissions::from_entry_bits(self.0.into_bits())
    }

    /// Decode the entry.
    ///
    /// A swapped-out entry whose slot field exceeds `u32::MAX` decodes as
    /// [`EntryState::Vacant`]; use [`raw_swap_slot`](Self::raw_swap_slot) to
    /// detect such corruption.
    #[must_use]
    pub fn state(self) -> EntryState {
        if let Some(frame) = self.frame() {
            return EntryState::Resident {
                frame,
                accessed: self.0.accessed(),
                permissions: self.permissions(),
            };
        }
        match self.raw_swap_slot().map(u32::try_from) {
            Some(Ok(slot)) => EntryState::SwappedOut {
                slot: SwapSlot::new(slot),
                permissions: self.permissions(),
            },
            _ => EntryState::Vacant,
        }
    }
}

impl From<EntryState> for PageTableEntry {
    fn from(state: EntryState) -> Self {
        match state {
            EntryState::Vacant => Self::vacant(),
            EntryState::Resident {
                frame,
                accessed,
                permissions,
            } => Self::resident(frame, accessed, permissions),
            EntryState::SwappedOut { slot, permissions } => Self::swapped_out(slot, permissions),
        }
    }
}

impl fmt::Debug for PageTableEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PageTableEntry").field(&self.state()).finish()
    }
}
