//! # Virtual and Physical Memory Addresses

use core::fmt;
use core::ops::{Add, AddAssign, Sub};
use kernel_info::memory::{PAGE_SHIFT, PAGE_SIZE};

const PAGE_MASK: u64 = PAGE_SIZE as u64 - 1;

/// A **physical** memory address (machine bus address).
///
/// Newtype over `u64` to prevent mixing with virtual addresses.
/// No alignment guarantees by itself; frame addresses handed out by the
/// page allocator are always page aligned.
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PhysicalAddress(u64);

/// A **virtual** memory address (process/kernel address space).
///
/// Newtype over `u64` to prevent mixing with physical addresses.
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct VirtualAddress(u64);

impl PhysicalAddress {
    #[inline]
    #[must_use]
    pub const fn new(v: u64) -> Self {
        Self(v)
    }

    #[inline]
    #[must_use]
    pub const fn zero() -> Self {
        Self(0)
    }

    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Build the base address of the frame with physical frame number `pfn`.
    #[inline]
    #[must_use]
    pub const fn from_frame_number(pfn: u64) -> Self {
        Self(pfn << PAGE_SHIFT)
    }

    /// Physical frame number (address bits `[63:12]`).
    #[inline]
    #[must_use]
    pub const fn frame_number(self) -> u64 {
        self.0 >> PAGE_SHIFT
    }

    /// Offset of this address within its 4 KiB frame.
    #[inline]
    #[must_use]
    pub const fn page_offset(self) -> u64 {
        self.0 & PAGE_MASK
    }

    #[inline]
    #[must_use]
    pub const fn is_page_aligned(self) -> bool {
        self.page_offset() == 0
    }

    #[inline]
    #[must_use]
    pub const fn page_round_down(self) -> Self {
        Self(self.0 & !PAGE_MASK)
    }

    #[inline]
    #[must_use]
    pub const fn page_round_up(self) -> Self {
        Self((self.0 + PAGE_MASK) & !PAGE_MASK)
    }
}

impl VirtualAddress {
    #[inline]
    #[must_use]
    pub const fn new(v: u64) -> Self {
        Self(v)
    }

    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Offset of this address within its 4 KiB page.
    #[inline]
    #[must_use]
    pub const fn page_offset(self) -> u64 {
        self.0 & PAGE_MASK
    }

    /// Base of the 4 KiB page containing this address.
    #[inline]
    #[must_use]
    pub const fn page_round_down(self) -> Self {
        Self(self.0 & !PAGE_MASK)
    }

    #[inline]
    #[must_use]
    pub const fn is_page_aligned(self) -> bool {
        self.page_offset() == 0
    }
}

impl fmt::Debug for PhysicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PA(0x{:016X})", self.0)
    }
}

impl fmt::Display for PhysicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016X}", self.0)
    }
}

impl fmt::Debug for VirtualAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VA(0x{:016X})", self.0)
    }
}

impl fmt::Display for VirtualAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016X}", self.0)
    }
}

impl From<u64> for PhysicalAddress {
    #[inline]
    fn from(v: u64) -> Self {
        Self(v)
    }
}

impl From<u64> for VirtualAddress {
    #[inline]
    fn from(v: u64) -> Self {
        Self(v)
    }
}

impl Add<u64> for PhysicalAddress {
    type Output = Self;
    #[inline]
    fn add(self, rhs: u64) -> Self::Output {
        Self(self.0 + rhs)
    }
}

impl AddAssign<u64> for PhysicalAddress {
    #[inline]
    fn add_assign(&mut self, rhs: u64) {
        self.0 += rhs;
    }
}

impl Sub for PhysicalAddress {
    type Output = u64;
    #[inline]
    fn sub(self, rhs: Self) -> Self::Output {
        self.0 - rhs.0
    }
}

impl Add<u64> for VirtualAddress {
    type Output = Self;
    #[inline]
    fn add(self, rhs: u64) -> Self::Output {
        Self(self.0 + rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_number_round_trip() {
        let pa = PhysicalAddress::new(0x8000_3000);
        assert_eq!(pa.frame_number(), 0x8_0003);
        assert_eq!(PhysicalAddress::from_frame_number(0x8_0003), pa);
    }

    #[test]
    fn alignment_helpers() {
        let pa = PhysicalAddress::new(0x8000_3042);
        assert!(!pa.is_page_aligned());
        assert_eq!(pa.page_offset(), 0x42);
        assert_eq!(pa.page_round_down().as_u64(), 0x8000_3000);
        assert_eq!(pa.page_round_up().as_u64(), 0x8000_4000);

        let va = VirtualAddress::new(0x1fff);
        assert_eq!(va.page_round_down(), VirtualAddress::new(0x1000));
        assert!(VirtualAddress::new(0x2000).is_page_aligned());
    }

    #[test]
    fn formatting_distinguishes_address_kinds() {
        assert_eq!(
            format!("{:?}", PhysicalAddress::new(0x1000)),
            "PA(0x0000000000001000)"
        );
        assert_eq!(
            format!("{:?}", VirtualAddress::new(0x1000)),
            "VA(0x0000000000001000)"
        );
    }
}
