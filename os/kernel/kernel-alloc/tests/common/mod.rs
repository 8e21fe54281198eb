//! Hosted stand-ins for physical memory and page tables.

#![allow(dead_code)]

use std::cell::UnsafeCell;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use kernel_alloc::{Pager, PagerConfig};
use kernel_swap::{RamSwapDevice, SwapDevice};
use kernel_vmem::{
    EntryCell, FrameBytes, PagePermissions, PageTableEntry, PageTableId, PageTableWalk,
    PhysMapper, PhysicalAddress, SwapSlot, VirtualAddress,
};

pub const BASE: PhysicalAddress = PhysicalAddress::new(0x8000_0000);

pub type ArenaPager<D> = Pager<FlatPageTables, D, FrameArena>;

pub type TestPager = ArenaPager<RamSwapDevice>;

pub type HookedPager = ArenaPager<HookedSwapDevice>;

type Hook = Box<dyn FnOnce() + Send>;

/// A [`RamSwapDevice`] that runs a one-shot callback right after the next
/// completed read or write, to interleave another context with the pager.
pub struct HookedSwapDevice {
    inner: RamSwapDevice,
    after_read: Mutex<Option<Hook>>,
    after_write: Mutex<Option<Hook>>,
}

impl HookedSwapDevice {
    pub fn new(slots: usize) -> Self {
        Self {
            inner: RamSwapDevice::new(slots),
            after_read: Mutex::default(),
            after_write: Mutex::default(),
        }
    }

    pub fn after_next_read(&self, hook: impl FnOnce() + Send + 'static) {
        *self.after_read.lock().unwrap() = Some(Box::new(hook));
    }

    pub fn after_next_write(&self, hook: impl FnOnce() + Send + 'static) {
        *self.after_write.lock().unwrap() = Some(Box::new(hook));
    }
}

impl SwapDevice for HookedSwapDevice {
    fn slots(&self) -> usize {
        self.inner.slots()
    }

    fn write_block(&self, slot: SwapSlot, page: &FrameBytes) {
        self.inner.write_block(slot, page);
        let hook = self.after_write.lock().unwrap().take();
        if let Some(hook) = hook {
            hook();
        }
    }

    fn read_block(&self, slot: SwapSlot, page: &mut FrameBytes) {
        self.inner.read_block(slot, page);
        let hook = self.after_read.lock().unwrap().take();
        if let Some(hook) = hook {
            hook();
        }
    }
}

#[repr(C, align(4096))]
struct Page(FrameBytes);

/// Page-aligned host memory standing in for `frames` physical frames at [`BASE`].
pub struct FrameArena {
    pages: Box<[UnsafeCell<Page>]>,
}

// SAFETY: the pager hands each frame to one owner at a time.
unsafe impl Sync for FrameArena {}

impl FrameArena {
    pub fn new(frames: usize) -> Self {
        Self {
            pages: (0..frames)
                .map(|_| UnsafeCell::new(Page([0; 4096])))
                .collect(),
        }
    }

    fn index(&self, pa: PhysicalAddress) -> usize {
        assert!(pa.is_page_aligned(), "unaligned frame {pa}");
        let index = usize::try_from((pa - BASE) >> 12).unwrap();
        assert!(index < self.pages.len(), "frame {pa} outside the arena");
        index
    }

    /// Copy of a frame's bytes.
    pub fn snapshot(&self, pa: PhysicalAddress) -> Vec<u8> {
        // SAFETY: tests only snapshot frames nobody is writing concurrently.
        unsafe { (*self.pages[self.index(pa)].get()).0.to_vec() }
    }
}

impl PhysMapper for FrameArena {
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
        let page = self.pages[self.index(pa)].get();
        // SAFETY: the arena outlives the pager; the caller owns the frame.
        unsafe { &mut *page.cast::<T>() }
    }
}

/// Single-level software page tables: table `n` maps `pages` pages starting
/// at virtual address zero.
pub struct FlatPageTables {
    tables: Vec<Box<[EntryCell]>>,
    flushes: AtomicU64,
}

impl FlatPageTables {
    pub fn new(tables: usize, pages: usize) -> Self {
        Self {
            tables: (0..tables)
                .map(|_| (0..pages).map(|_| EntryCell::default()).collect::<Box<[_]>>())
                .collect(),
            flushes: AtomicU64::new(0),
        }
    }

    pub fn entry(&self, table: PageTableId, va: VirtualAddress) -> &EntryCell {
        self.resolve(table, va).expect("address outside the flat table")
    }

    pub fn flushes(&self) -> u64 {
        self.flushes.load(Ordering::Relaxed)
    }
}

impl PageTableWalk for FlatPageTables {
    fn resolve(&self, table: PageTableId, va: VirtualAddress) -> Option<&EntryCell> {
        let table = self.tables.get(usize::try_from(table.as_u64()).ok()?)?;
        table.get(usize::try_from(va.as_u64() >> 12).ok()?)
    }

    fn flush(&self, _table: PageTableId, _va: VirtualAddress) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
    }
}

pub fn table(n: u64) -> PageTableId {
    PageTableId::new(n)
}

pub fn page(n: u64) -> VirtualAddress {
    VirtualAddress::new(n << 12)
}

pub fn pager(frames: usize, slots: usize) -> TestPager {
    pager_with(PagerConfig::new(BASE, frames), slots, 4, 64)
}

pub fn pager_with(config: PagerConfig, slots: usize, tables: usize, pages: usize) -> TestPager {
    Pager::new(
        config,
        FlatPageTables::new(tables, pages),
        RamSwapDevice::new(slots),
        FrameArena::new(config.frames),
    )
    .unwrap()
}

pub fn hooked_pager(frames: usize, slots: usize) -> HookedPager {
    Pager::new(
        PagerConfig::new(BASE, frames),
        FlatPageTables::new(1, 16),
        HookedSwapDevice::new(slots),
        FrameArena::new(frames),
    )
    .unwrap()
}

/// Allocate a frame, fill it with `content`, map it referenced at `va` and
/// register it with the pager, as a user page fault on fresh memory would.
pub fn map_page<D: SwapDevice>(
    pager: &ArenaPager<D>,
    table: PageTableId,
    va: VirtualAddress,
    content: u8,
) -> PhysicalAddress {
    let frame = pager.allocate_frame().unwrap();
    // SAFETY: the frame is ours until it is tracked.
    let bytes = unsafe { pager.mapper().phys_to_mut::<FrameBytes>(frame) };
    bytes.fill(content);
    pager.walker().entry(table, va).store(PageTableEntry::resident(
        frame,
        true,
        PagePermissions::user_rw(),
    ));
    pager.track(frame, table, va);
    frame
}

/// Make `va` resident, swapping it in if needed, and return its frame.
pub fn fault_in<D: SwapDevice>(
    pager: &ArenaPager<D>,
    table: PageTableId,
    va: VirtualAddress,
) -> PhysicalAddress {
    let entry = pager.walker().entry(table, va);
    loop {
        if let Some(frame) = entry.load().frame() {
            return frame;
        }
        // another context may evict the page again before we look
        pager.handle_swap_fault(table, va, entry).unwrap();
    }
}

/// Read a page as a user access would: fault it in and set the accessed bit.
pub fn read_page<D: SwapDevice>(
    pager: &ArenaPager<D>,
    table: PageTableId,
    va: VirtualAddress,
) -> Vec<u8> {
    let frame = fault_in(pager, table, va);
    pager.walker().entry(table, va).mark_accessed();
    pager.mapper().snapshot(frame)
}

pub fn write_page<D: SwapDevice>(
    pager: &ArenaPager<D>,
    table: PageTableId,
    va: VirtualAddress,
    content: u8,
) {
    let frame = fault_in(pager, table, va);
    pager.walker().entry(table, va).mark_accessed();
    // SAFETY: single-threaded test access to a resident page.
    let bytes = unsafe { pager.mapper().phys_to_mut::<FrameBytes>(frame) };
    bytes.fill(content);
}

pub fn assert_filled(bytes: &[u8], content: u8) {
    assert!(
        bytes.iter().all(|&b| b == content),
        "expected every byte to be {content:#04x}, first is {:#04x}",
        bytes[0]
    );
}

/// Frames that are neither free nor resident, i.e. allocated and untracked.
pub fn untracked(pager: &TestPager) -> usize {
    let stats = pager.stats();
    stats.total_frames - stats.free_frames - stats.resident_frames
}
