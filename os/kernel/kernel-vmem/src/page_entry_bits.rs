use bitfield_struct::bitfield;

/// Raw bitfield view of a 64-bit x86-64 leaf page table entry (PTE).
///
/// The hardware only interprets the address field while `present` is set. The
/// paging core relies on that: a not-present entry with the OS-available
/// `swapped` bit set stores a **swap slot index** in the same 40 bits that
/// normally hold the physical frame number.
///
/// ### Bit layout
///
/// | Bits      | Name              | Resident entry            | Swapped-out entry         |
/// |-----------|-------------------|---------------------------|---------------------------|
/// | 0         | `P` (present)     | 1                         | 0                         |
/// | 1         | `RW`              | permission                | permission (preserved)    |
/// | 2         | `US`              | permission                | permission (preserved)    |
/// | 3         | `PWT`             | caching                   | caching (preserved)       |
/// | 4         | `PCD`             | caching                   | caching (preserved)       |
/// | 5         | `A`               | accessed (set by CPU)     | 0                         |
/// | 6         | `D`               | dirty (set by CPU)        | preserved                 |
/// | 7         | `PAT`             | caching                   | preserved                 |
/// | 8         | `G`               | global                    | preserved                 |
/// | 9         | OS: swapped       | 0                         | 1                         |
/// | 10–11     | OS available      | preserved                 | preserved                 |
/// | 12–51     | frame / slot      | physical frame number     | swap slot index           |
/// | 52–58     | OS available      | preserved                 | preserved                 |
/// | 59–62     | `PKU`             | protection key            | preserved                 |
/// | 63        | `NX`              | execute disable           | preserved                 |
///
/// ### Example
/// ```rust
/// # use kernel_vmem::PageEntryBits;
/// let mut e = PageEntryBits::new();
/// e.set_present(true);
/// e.set_writable(true);
/// e.set_frame_or_slot(0x8_0001);
/// assert!(e.present());
/// assert_eq!(e.into_bits(), 0x8000_1003);
/// ```
#[bitfield(u64)]
#[derive(PartialEq, Eq)]
pub struct PageEntryBits {
    /// Present (P, bit 0). Clear means any access faults.
    pub present: bool,

    /// Writable (RW, bit 1).
    pub writable: bool,

    /// User/Supervisor (US, bit 2).
    pub user_access: bool,

    /// Page Write-Through (PWT, bit 3).
    pub write_through: bool,

    /// Page Cache Disable (PCD, bit 4).
    pub cache_disabled: bool,

    /// Accessed (A, bit 5).
    ///
    /// Set by the CPU on any access through this entry; cleared by the clock
    /// scan when it grants a second chance.
    pub accessed: bool,

    /// Dirty (D, bit 6).
    pub dirty: bool,

    /// PAT (bit 7 in a 4 KiB PTE).
    pub pat: bool,

    /// Global (G, bit 8).
    pub global_translation: bool,

    /// OS-available bit 9: the contents live in a swap slot.
    ///
    /// Only meaningful while `present` is clear.
    pub swapped: bool,

    /// OS-available (bits 10..=11).
    #[bits(2)]
    pub os_available_low: u8,

    /// Bits 12..=51: physical frame number when present, swap slot when swapped.
    #[bits(40)]
    pub frame_or_slot: u64,

    /// OS-available (bits 52..=58).
    #[bits(7)]
    pub os_available_high: u8,

    /// Protection Key (PKU, bits 59..=62) if supported; otherwise OS use.
    #[bits(4)]
    pub protection_key: u8,

    /// No-Execute (NX, bit 63).
    pub no_execute: bool,
}

/// Mask of bit 0 (`P`).
pub(crate) const PRESENT_MASK: u64 = 1 << 0;
/// Mask of bit 5 (`A`).
pub(crate) const ACCESSED_MASK: u64 = 1 << 5;
/// Mask of bit 9 (swapped marker).
pub(crate) const SWAPPED_MASK: u64 = 1 << 9;
/// Width of the shared frame/slot field.
pub(crate) const FRAME_OR_SLOT_BITS: u32 = 40;
/// Mask of bits 12..=51.
pub(crate) const FRAME_OR_SLOT_MASK: u64 = ((1 << FRAME_OR_SLOT_BITS) - 1) << 12;
