use alloc::vec;
use alloc::boxed::Box;
use core::sync::atomic::{AtomicU64, Ordering};
use kernel_info::memory::{BLOCKS_PER_SLOT, PAGE_SIZE, SWAP_BLOCK_SIZE};
use kernel_sync::SpinLock;
use kernel_vmem::{FrameBytes, SwapSlot};

/// First device block backing `slot`.
#[inline]
#[must_use]
pub const fn first_block(slot: SwapSlot) -> usize {
    slot.index() * BLOCKS_PER_SLOT
}

/// Block-I/O collaborator used to persist swapped-out pages.
///
/// Transfers are synchronous and always move exactly one page. A device
/// error is unrecoverable for the paging core, so implementations panic
/// instead of returning partial results.
pub trait SwapDevice {
    /// Number of page-sized slots the device can hold.
    fn slots(&self) -> usize;

    /// Persist `page` into `slot`.
    fn write_block(&self, slot: SwapSlot, page: &FrameBytes);

    /// Restore the contents of `slot` into `page`.
    fn read_block(&self, slot: SwapSlot, page: &mut FrameBytes);
}

/// A swap device backed by kernel memory.
///
/// The storage is laid out in [`SWAP_BLOCK_SIZE`] blocks exactly like a disk
/// swap area, so slot `n` occupies blocks `n * 4 .. n * 4 + 4`.
pub struct RamSwapDevice {
    storage: SpinLock<Box<[u8]>>,
    slots: usize,
    reads: AtomicU64,
    writes: AtomicU64,
}

impl RamSwapDevice {
    #[must_use]
    pub fn new(slots: usize) -> Self {
        Self {
            storage: SpinLock::new("swapdev", vec![0; slots * PAGE_SIZE].into_boxed_slice()),
            slots,
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
        }
    }

    /// Number of completed [`read_block`](SwapDevice::read_block) calls.
    #[must_use]
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    /// Number of completed [`write_block`](SwapDevice::write_block) calls.
    #[must_use]
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    fn byte_range(&self, slot: SwapSlot) -> core::ops::Range<usize> {
        assert!(
            slot.index() < self.slots,
            "swapdev: slot {slot} beyond device end ({} slots)",
            self.slots
        );
        let start = first_block(slot) * SWAP_BLOCK_SIZE;
        start..start + PAGE_SIZE
    }
}

impl SwapDevice for RamSwapDevice {
    fn slots(&self) -> usize {
        self.slots
    }

    fn write_block(&self, slot: SwapSlot, page: &FrameBytes) {
        let range = self.byte_range(slot);
        self.storage.lock()[range].copy_from_slice(page);
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    fn read_block(&self, slot: SwapSlot, page: &mut FrameBytes) {
        let range = self.byte_range(slot);
        page.copy_from_slice(&self.storage.lock()[range]);
        self.reads.fetch_add(1, Ordering::Relaxed);
    }
}
