//! # Demand-paging core
//!
//! [`Pager`] ties the frame table, the clock scan and the swap map together
//! behind the operations the rest of the kernel calls: allocate and release
//! frames, register user mappings, and service faults on swapped-out entries.
//!
//! ## Locking
//!
//! | Lock      | Protects                                     |
//! |-----------|----------------------------------------------|
//! | `kmem`    | free list, resident list, tracked entries    |
//! | `swap`    | swap slot bitmap                             |
//! | `swapdev` | device storage (inside the device, if any)   |
//!
//! Locks are only ever taken in that order. Every rewrite of a tracked
//! entry between its resident and swapped-out encodings happens with `kmem`
//! held, so eviction and swap-in of the same mapping are serialized.
//!
//! ## Eviction
//!
//! ```text
//!  allocate_frame ──► free list empty? ──► clock::select_victim
//!                                                │
//!        ┌───────────────────────────────────────┘
//!        ▼
//!  claim slot ─► write frame to slot ─► CAS entry to swapped-out
//!        ─► flush ─► untrack ─► fill ─► push free ─► pop free
//! ```

use core::sync::atomic::{AtomicU64, Ordering};
use kernel_swap::{SwapDevice, SwapMap};
use kernel_sync::SpinLock;
use kernel_vmem::{
    EntryCell, FrameBytes, PagePermissions, PageTableEntry, PageTableId, PageTableWalk,
    PhysMapper, PhysicalAddress, SwapSlot, VirtualAddress,
};
use log::{debug, info, warn};

use crate::clock;
use crate::config::{PagerConfig, PagerConfigError};
use crate::error::{EvictError, PagerError};
use crate::frame_table::{FrameTable, Mapping};

/// Snapshot of the pager's bookkeeping.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct PagerStats {
    pub total_frames: usize,
    pub free_frames: usize,
    pub resident_frames: usize,
    pub swap_slots_total: usize,
    pub swap_slots_in_use: usize,
    pub evictions: u64,
    pub swap_ins: u64,
    pub failed_allocations: u64,
}

#[derive(Default)]
struct Counters {
    evictions: AtomicU64,
    swap_ins: AtomicU64,
    failed_allocations: AtomicU64,
}

/// Physical frame allocator with clock eviction to a swap device.
///
/// Generic over its three collaborators:
/// - `W` finds the leaf entry of a `(table, address)` mapping,
/// - `D` persists and restores page-sized swap slots,
/// - `M` gives the kernel a view of a frame's bytes.
pub struct Pager<W, D, M> {
    config: PagerConfig,
    frames: SpinLock<FrameTable>,
    swap: SwapMap,
    walker: W,
    device: D,
    mapper: M,
    counters: Counters,
}

impl<W, D, M> Pager<W, D, M>
where
    W: PageTableWalk,
    D: SwapDevice,
    M: PhysMapper,
{
    /// Take ownership of `config.frames` frames starting at `config.base` and
    /// of every slot on `device`.
    ///
    /// Every managed frame is filled with the release pattern and put on the
    /// free list.
    ///
    /// # Errors
    /// The configuration is invalid or the device has an unusable slot count.
    pub fn new(config: PagerConfig, walker: W, device: D, mapper: M) -> Result<Self, PagerConfigError> {
        config.validate()?;
        let swap = SwapMap::for_device(&device)?;

        let pager = Self {
            config,
            frames: SpinLock::new("kmem", FrameTable::new(config.base, config.frames)),
            swap,
            walker,
            device,
            mapper,
            counters: Counters::default(),
        };
        for index in 0..config.frames {
            pager.fill(pager.frame_at(index), config.free_fill);
        }

        info!(
            "pager: {} frames at {}, {} swap slots, {} clock passes",
            config.frames,
            config.base,
            pager.swap.capacity(),
            config.clock_passes
        );
        Ok(pager)
    }

    #[inline]
    #[must_use]
    pub const fn config(&self) -> &PagerConfig {
        &self.config
    }

    #[inline]
    #[must_use]
    pub const fn walker(&self) -> &W {
        &self.walker
    }

    #[inline]
    #[must_use]
    pub const fn device(&self) -> &D {
        &self.device
    }

    #[inline]
    #[must_use]
    pub const fn mapper(&self) -> &M {
        &self.mapper
    }

    #[inline]
    #[must_use]
    pub const fn swap_map(&self) -> &SwapMap {
        &self.swap
    }

    /// Whether `frame` is a page-aligned address inside the managed range.
    #[must_use]
    pub fn manages(&self, frame: PhysicalAddress) -> bool {
        frame.is_page_aligned()
            && frame >= self.config.base
            && usize::try_from(frame.frame_number() - self.config.base.frame_number())
                .is_ok_and(|index| index < self.config.frames)
    }

    /// Hand out one frame, evicting a resident page if the free list is empty.
    ///
    /// The frame is untracked and filled with the allocation pattern.
    ///
    /// # Errors
    /// [`PagerError::OutOfMemory`] with the reason eviction failed.
    pub fn allocate_frame(&self) -> Result<PhysicalAddress, PagerError> {
        let frame = {
            let mut frames = self.frames.lock();
            match frames.pop_free() {
                Some(frame) => Ok(frame),
                None => self
                    .evict_locked(&mut frames)
                    .and_then(|()| frames.pop_free().ok_or(EvictError::NoVictim)),
            }
        };

        match frame {
            Ok(frame) => {
                self.fill(frame, self.config.alloc_fill);
                Ok(frame)
            }
            Err(cause) => {
                self.counters
                    .failed_allocations
                    .fetch_add(1, Ordering::Relaxed);
                warn!("pager: allocation failed: {cause}");
                Err(PagerError::OutOfMemory(cause))
            }
        }
    }

    /// Return `frame` to the free list, dropping it from the resident list
    /// first if it is still tracked.
    ///
    /// # Panics
    /// If `frame` is unaligned, outside the managed range or already free.
    pub fn release_frame(&self, frame: PhysicalAddress) {
        assert!(
            self.manages(frame),
            "release_frame: {frame} is not a managed frame"
        );

        let mut frames = self.frames.lock();
        assert!(
            !frames.is_free(frame),
            "release_frame: double free of {frame}"
        );
        if frames.is_tracked(frame) {
            frames.untrack(frame);
        }
        self.fill(frame, self.config.free_fill);
        frames.push_free(frame);
    }

    /// Register `frame` as backing the user mapping `address` in `table`.
    ///
    /// # Panics
    /// If `frame` is not an allocated, untracked frame.
    pub fn track(&self, frame: PhysicalAddress, table: PageTableId, address: VirtualAddress) {
        self.frames
            .lock()
            .track(frame, Mapping::new(table, address.page_round_down()));
    }

    /// Stop considering `frame` for eviction and return the mapping it backed.
    ///
    /// # Panics
    /// If `frame` is not tracked.
    pub fn untrack(&self, frame: PhysicalAddress) -> Mapping {
        self.frames.lock().untrack(frame)
    }

    #[must_use]
    pub fn is_tracked(&self, frame: PhysicalAddress) -> bool {
        self.frames.lock().is_tracked(frame)
    }

    /// Run one eviction round and put the freed frame on the free list.
    ///
    /// # Errors
    /// No victim was found, swap is full, or the victim changed under us.
    pub fn evict(&self) -> Result<(), EvictError> {
        let mut frames = self.frames.lock();
        self.evict_locked(&mut frames)
    }

    fn evict_locked(&self, frames: &mut FrameTable) -> Result<(), EvictError> {
        let victim = clock::select_victim(frames, &self.walker, self.config.clock_passes)
            .ok_or(EvictError::NoVictim);
        let result = victim.and_then(|victim| self.swap_out_locked(frames, victim));
        if let Err(cause) = result {
            warn!("pager: eviction failed: {cause}");
        }
        result
    }

    fn swap_out_locked(&self, frames: &mut FrameTable, victim: clock::Victim) -> Result<(), EvictError> {
        let clock::Victim { frame, mapping } = victim;
        let slot = self.swap.allocate().ok_or(EvictError::SwapExhausted)?;

        let snapshot = self
            .walker
            .resolve(mapping.table, mapping.address)
            .map(|cell| (cell, cell.load()))
            .filter(|(_, entry)| entry.frame() == Some(frame));
        let Some((cell, snapshot)) = snapshot else {
            self.swap.free(slot);
            return Err(EvictError::VictimInvalidated);
        };

        // SAFETY: the frame is mapped but no longer referenced (A=0) and kmem
        // serializes every other writer that goes through the pager.
        let page = unsafe { self.mapper.phys_to_mut::<FrameBytes>(frame) };
        self.device.write_block(slot, page);

        let swapped = PageTableEntry::swapped_out(slot, snapshot.permissions());
        if let Err(found) = cell.compare_exchange(snapshot, swapped) {
            debug!("pager: {mapping} changed to {found:?} during swap-out");
            self.swap.free(slot);
            return Err(EvictError::VictimInvalidated);
        }
        self.walker.flush(mapping.table, mapping.address);

        frames.untrack(frame);
        self.fill(frame, self.config.free_fill);
        frames.push_free(frame);

        self.counters.evictions.fetch_add(1, Ordering::Relaxed);
        debug!("pager: evicted {mapping} from {frame} to slot {slot}");
        Ok(())
    }

    /// Bring the page behind a swapped-out entry back into memory.
    ///
    /// A private frame is allocated first. With `kmem` held, the entry is
    /// re-checked, the slot is read into the frame, the entry is rewritten to
    /// the resident encoding with `A=1`, the frame is tracked for `address`
    /// in `table` and the slot is freed. If a concurrent fault restored the
    /// entry first, the private frame is released and the call succeeds.
    ///
    /// # Errors
    /// - [`PagerError::NotSwappedOut`] if `entry` is vacant.
    /// - [`PagerError::OutOfMemory`] if no frame could be obtained.
    ///
    /// # Panics
    /// If the entry names a slot outside the swap map or a slot that is not
    /// allocated.
    pub fn handle_swap_fault(
        &self,
        table: PageTableId,
        address: VirtualAddress,
        entry: &EntryCell,
    ) -> Result<(), PagerError> {
        let address = address.page_round_down();
        let observed = entry.load();
        if observed.is_present() {
            return Ok(());
        }
        let (slot, permissions) = self.decode_slot(observed)?;

        let frame = self.allocate_frame()?;

        // The slot is read only after the entry is confirmed under kmem: a
        // concurrent swap-in, write and re-eviction may reuse the same slot
        // and leave a bit-identical entry behind.
        let mut frames = self.frames.lock();
        if entry.load() != observed {
            debug!("pager: {address} in {table:?} was restored concurrently");
            self.fill(frame, self.config.free_fill);
            frames.push_free(frame);
            return Ok(());
        }
        assert!(
            self.swap.is_allocated(slot),
            "swap-in: {address} in {table:?} names free slot {slot}"
        );
        // SAFETY: the frame was just allocated and is not mapped anywhere.
        let page = unsafe { self.mapper.phys_to_mut::<FrameBytes>(frame) };
        self.device.read_block(slot, page);

        entry.store(PageTableEntry::resident(frame, true, permissions));
        self.walker.flush(table, address);
        frames.track(frame, Mapping::new(table, address));
        self.swap.free(slot);
        drop(frames);

        self.counters.swap_ins.fetch_add(1, Ordering::Relaxed);
        debug!("pager: restored {address} in {table:?} from slot {slot} to {frame}");
        Ok(())
    }

    /// [`handle_swap_fault`](Self::handle_swap_fault) for a mapping that is
    /// looked up through the walker.
    ///
    /// # Errors
    /// [`PagerError::Unmapped`] if the walk finds no entry.
    pub fn swap_in(&self, table: PageTableId, address: VirtualAddress) -> Result<(), PagerError> {
        let entry = self
            .walker
            .resolve(table, address.page_round_down())
            .ok_or(PagerError::Unmapped)?;
        self.handle_swap_fault(table, address, entry)
    }

    /// Copy a swapped-out page for a child address space.
    ///
    /// The contents are copied into a fresh slot through a temporary frame;
    /// the returned entry carries the new slot and the same permissions, so
    /// parent and child fault independently. The caller must keep the
    /// parent's mapping stable for the duration.
    ///
    /// # Errors
    /// [`PagerError::SwapExhausted`], [`PagerError::OutOfMemory`] or
    /// [`PagerError::NotSwappedOut`].
    pub fn duplicate_swapped(&self, entry: PageTableEntry) -> Result<PageTableEntry, PagerError> {
        let (slot, permissions) = self.decode_slot(entry)?;
        let copy = self.swap.allocate().ok_or(PagerError::SwapExhausted)?;

        let frame = match self.allocate_frame() {
            Ok(frame) => frame,
            Err(error) => {
                self.swap.free(copy);
                return Err(error);
            }
        };
        // SAFETY: the frame is private to this call until released below.
        let page = unsafe { self.mapper.phys_to_mut::<FrameBytes>(frame) };
        self.device.read_block(slot, page);
        self.device.write_block(copy, page);
        self.release_frame(frame);

        debug!("pager: duplicated slot {slot} into slot {copy}");
        Ok(PageTableEntry::swapped_out(copy, permissions))
    }

    /// Free the slot behind a swapped-out entry during address-space teardown.
    ///
    /// # Errors
    /// [`PagerError::NotSwappedOut`] if the entry holds no slot.
    pub fn release_swapped(&self, entry: PageTableEntry) -> Result<SwapSlot, PagerError> {
        let (slot, _) = self.decode_slot(entry)?;
        self.swap.free(slot);
        Ok(slot)
    }

    /// Free a swap slot directly. Out-of-range and unallocated slots are
    /// ignored; returns whether a slot was freed.
    pub fn free_slot(&self, slot: SwapSlot) -> bool {
        self.swap.free(slot)
    }

    #[must_use]
    pub fn stats(&self) -> PagerStats {
        let (total_frames, free_frames, resident_frames) = {
            let frames = self.frames.lock();
            (frames.len(), frames.free_len(), frames.resident_len())
        };
        PagerStats {
            total_frames,
            free_frames,
            resident_frames,
            swap_slots_total: self.swap.capacity(),
            swap_slots_in_use: self.swap.in_use(),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            swap_ins: self.counters.swap_ins.load(Ordering::Relaxed),
            failed_allocations: self.counters.failed_allocations.load(Ordering::Relaxed),
        }
    }

    fn decode_slot(&self, entry: PageTableEntry) -> Result<(SwapSlot, PagePermissions), PagerError> {
        let raw = entry.raw_swap_slot().ok_or(PagerError::NotSwappedOut)?;
        assert!(
            self.swap.contains(raw),
            "swap: corrupted entry {entry:?} names slot {raw} of {}",
            self.swap.capacity()
        );
        #[allow(clippy::cast_possible_truncation)]
        let slot = SwapSlot::new(raw as u32);
        Ok((slot, entry.permissions()))
    }

    fn frame_at(&self, index: usize) -> PhysicalAddress {
        PhysicalAddress::from_frame_number(self.config.base.frame_number() + index as u64)
    }

    fn fill(&self, frame: PhysicalAddress, byte: u8) {
        // SAFETY: callers own `frame` exclusively: it is free, freshly popped,
        // or an evicted frame whose mapping was already swapped out.
        let page = unsafe { self.mapper.phys_to_mut::<FrameBytes>(frame) };
        page.fill(byte);
    }
}
