//! # Memory and Swap Layout

/// Size of a physical frame and of a virtual page, in bytes.
pub const PAGE_SIZE: usize = 4096;

/// `log2(PAGE_SIZE)`.
pub const PAGE_SHIFT: u32 = 12;

/// First byte of RAM; the page allocator never manages frames below it.
pub const PHYS_BASE: u64 = 0x8000_0000;

/// One past the last byte of RAM.
pub const PHYS_TOP: u64 = PHYS_BASE + 128 * 1024 * 1024;

/// Number of frames between [`PHYS_BASE`] and [`PHYS_TOP`].
pub const PHYS_FRAMES: usize = ((PHYS_TOP - PHYS_BASE) >> PAGE_SHIFT) as usize;

/// Higher Half Direct Map (HHDM) base.
/// Physical address `pa` is reachable by the kernel at `HHDM_BASE + pa`.
pub const HHDM_BASE: u64 = 0xffff_8880_0000_0000;

/// Size of a single block on the swap device.
pub const SWAP_BLOCK_SIZE: usize = 1024;

/// Number of device blocks reserved for swapping.
pub const SWAP_MAX_BLOCKS: usize = 28_000;

/// Device blocks occupied by one swapped-out page.
pub const BLOCKS_PER_SLOT: usize = PAGE_SIZE / SWAP_BLOCK_SIZE;

/// Number of page-sized swap slots in the reference configuration.
pub const SWAP_SLOTS: usize = SWAP_MAX_BLOCKS / BLOCKS_PER_SLOT;

/// Largest slot count a single-page swap bitmap can describe.
pub const SWAP_MAP_MAX_SLOTS: usize = PAGE_SIZE * 8;

/// Byte written over every frame handed out by the allocator.
pub const ALLOC_FILL: u8 = 0x05;

/// Byte written over every frame returned to the allocator.
pub const FREE_FILL: u8 = 0x01;

/// Number of bounded clock passes attempted per eviction.
pub const DEFAULT_CLOCK_PASSES: usize = 2;

const _: () = {
    assert!(PAGE_SIZE == 1 << PAGE_SHIFT);
    assert!(PHYS_BASE.is_multiple_of(PAGE_SIZE as u64));
    assert!(PHYS_TOP > PHYS_BASE);
    assert!(HHDM_BASE.is_multiple_of(PAGE_SIZE as u64));
    assert!(PAGE_SIZE.is_multiple_of(SWAP_BLOCK_SIZE));
    assert!(SWAP_SLOTS <= SWAP_MAP_MAX_SLOTS);
    assert!(ALLOC_FILL != FREE_FILL);
    assert!(DEFAULT_CLOCK_PASSES > 0);
};
