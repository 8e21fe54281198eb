use kernel_info::memory::{PAGE_SIZE, SWAP_MAP_MAX_SLOTS};
use kernel_sync::SpinLock;
use kernel_vmem::SwapSlot;
use log::{info, trace};

use crate::SwapDevice;

/// Rejected swap map configurations.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SwapMapError {
    #[error("a swap map needs at least one slot")]
    Empty,
    #[error("{requested} slots exceed the {max}-slot bitmap")]
    TooLarge { requested: usize, max: usize },
}

/// One page of bits, one bit per slot.
struct Bitmap {
    bits: [u8; PAGE_SIZE],
    in_use: usize,
}

impl Bitmap {
    const fn is_set(&self, index: usize) -> bool {
        self.bits[index / 8] & (1 << (index % 8)) != 0
    }

    const fn set(&mut self, index: usize) {
        self.bits[index / 8] |= 1 << (index % 8);
        self.in_use += 1;
    }

    const fn clear(&mut self, index: usize) {
        self.bits[index / 8] &= !(1 << (index % 8));
        self.in_use -= 1;
    }

    /// First clear bit below `limit`.
    fn first_clear(&self, limit: usize) -> Option<usize> {
        self.bits[..limit.div_ceil(8)]
            .iter()
            .enumerate()
            .filter(|(_, byte)| **byte != u8::MAX)
            .map(|(i, byte)| i * 8 + byte.trailing_ones() as usize)
            .find(|&index| index < limit)
    }
}

/// Bitmap allocator over the slots of a swap device.
///
/// # Invariants
/// - A slot's bit is set exactly between [`allocate`](Self::allocate)
///   returning it and the matching [`free`](Self::free).
/// - No two callers ever hold the same slot.
pub struct SwapMap {
    slots: usize,
    bitmap: SpinLock<Bitmap>,
}

impl SwapMap {
    /// Create an empty map for `slots` slots.
    ///
    /// # Errors
    /// The slot count is zero or does not fit a one-page bitmap.
    pub fn new(slots: usize) -> Result<Self, SwapMapError> {
        if slots == 0 {
            return Err(SwapMapError::Empty);
        }
        if slots > SWAP_MAP_MAX_SLOTS {
            return Err(SwapMapError::TooLarge {
                requested: slots,
                max: SWAP_MAP_MAX_SLOTS,
            });
        }

        info!("swap map: {slots} slots, {} bitmap bytes", slots.div_ceil(8));
        Ok(Self {
            slots,
            bitmap: SpinLock::new(
                "swap",
                Bitmap {
                    bits: [0; PAGE_SIZE],
                    in_use: 0,
                },
            ),
        })
    }

    /// Create a map covering every slot of `device`.
    ///
    /// # Errors
    /// See [`new`](Self::new).
    pub fn for_device<D: SwapDevice + ?Sized>(device: &D) -> Result<Self, SwapMapError> {
        Self::new(device.slots())
    }

    /// Claim the lowest free slot.
    ///
    /// Returns `None` when swap space is exhausted.
    pub fn allocate(&self) -> Option<SwapSlot> {
        let mut bitmap = self.bitmap.lock();
        let index = bitmap.first_clear(self.slots)?;
        bitmap.set(index);
        trace!("swap map: allocated slot {index}");
        #[allow(clippy::cast_possible_truncation)]
        let slot = SwapSlot::new(index as u32);
        Some(slot)
    }

    /// Release `slot`.
    ///
    /// Out-of-range and already-free slots are ignored, so a retried cleanup
    /// path can free the same slot twice. Returns whether a bit was cleared.
    pub fn free(&self, slot: SwapSlot) -> bool {
        let index = slot.index();
        if index >= self.slots {
            trace!("swap map: ignoring free of out-of-range slot {index}");
            return false;
        }

        let mut bitmap = self.bitmap.lock();
        if !bitmap.is_set(index) {
            trace!("swap map: ignoring free of unallocated slot {index}");
            return false;
        }
        bitmap.clear(index);
        trace!("swap map: freed slot {index}");
        true
    }

    /// Whether `raw` names a slot of this map.
    #[inline]
    #[must_use]
    pub fn contains(&self, raw: u64) -> bool {
        usize::try_from(raw).is_ok_and(|index| index < self.slots)
    }

    /// Whether `slot` is currently allocated.
    #[must_use]
    pub fn is_allocated(&self, slot: SwapSlot) -> bool {
        slot.index() < self.slots && self.bitmap.lock().is_set(slot.index())
    }

    /// Number of allocated slots.
    #[must_use]
    pub fn in_use(&self) -> usize {
        self.bitmap.lock().in_use
    }

    /// Total number of slots.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.slots
    }
}
