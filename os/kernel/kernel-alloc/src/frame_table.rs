//! # Frame descriptor table
//!
//! One frame descriptor per manageable 4 KiB frame, indexed by
//! `(pa - base) / 4096`. The descriptors double as the nodes of two
//! index-linked lists:
//!
//! - the **free list**, a LIFO stack of frames not backing anything, and
//! - the **resident list**, a circular doubly linked list of frames that back
//!   a swappable user mapping, in clock order.
//!
//! ```text
//!              head                                  tail
//!               │                                      │
//!         ┌─────▼────┐     ┌──────────┐          ┌─────▼────┐
//!    ┌───►│ frame 17 │────►│ frame 3  │── ... ──►│ frame 9  │────┐
//!    │    └──────────┘◄────└──────────┘◄── ... ──└──────────┘    │
//!    └───────────────────────────────────────────────────────────┘
//! ```
//!
//! New residents are appended at the tail (just before head); the clock scan
//! walks from head toward tail and gives a frame a second chance by rotating
//! it to the tail.
//!
//! # Invariants
//! - A frame is in exactly one of the states free, allocated (untracked) or
//!   resident. The state is an enum, so a frame cannot be on both lists.
//! - `free_len + allocated + resident_len == len()`.
//! - All list operations are O(1).

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::fmt;
use kernel_info::memory::PAGE_SHIFT;
use kernel_vmem::{PageTableId, PhysicalAddress, VirtualAddress};
use log::trace;

/// Non-owning back-reference from a frame to the mapping it backs.
///
/// Stored as a lookup key; the page table itself is found again through the
/// page-table walker whenever the entry is needed.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Mapping {
    pub table: PageTableId,
    pub address: VirtualAddress,
}

impl Mapping {
    #[must_use]
    pub const fn new(table: PageTableId, address: VirtualAddress) -> Self {
        Self { table, address }
    }
}

impl fmt::Display for Mapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} in {:?}", self.address, self.table)
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum FrameState {
    Free {
        next: Option<usize>,
    },
    Allocated,
    Resident {
        mapping: Mapping,
        prev: usize,
        next: usize,
    },
}

/// Metadata for one physical frame.
#[derive(Copy, Clone, Debug)]
pub(crate) struct FrameDescriptor {
    state: FrameState,
}

impl FrameDescriptor {
    #[must_use]
    pub(crate) const fn is_free(&self) -> bool {
        matches!(self.state, FrameState::Free { .. })
    }

    #[must_use]
    pub(crate) const fn is_resident(&self) -> bool {
        matches!(self.state, FrameState::Resident { .. })
    }
}

/// Descriptor array plus the heads of the free and resident lists.
pub struct FrameTable {
    base: PhysicalAddress,
    descriptors: Box<[FrameDescriptor]>,
    free_head: Option<usize>,
    free_len: usize,
    resident_head: Option<usize>,
    resident_len: usize,
}

impl FrameTable {
    /// Describe `frames` frames starting at the page-aligned `base`, all free.
    #[must_use]
    pub fn new(base: PhysicalAddress, frames: usize) -> Self {
        debug_assert!(base.is_page_aligned());
        let mut table = Self {
            base,
            descriptors: (0..frames)
                .map(|_| FrameDescriptor {
                    state: FrameState::Allocated,
                })
                .collect::<Vec<_>>()
                .into_boxed_slice(),
            free_head: None,
            free_len: 0,
            resident_head: None,
            resident_len: 0,
        };
        for index in 0..frames {
            table.push_free_index(index);
        }
        table
    }

    /// Total number of frames described.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    #[inline]
    #[must_use]
    pub const fn free_len(&self) -> usize {
        self.free_len
    }

    #[inline]
    #[must_use]
    pub const fn resident_len(&self) -> usize {
        self.resident_len
    }

    /// First managed frame.
    #[inline]
    #[must_use]
    pub const fn base(&self) -> PhysicalAddress {
        self.base
    }

    /// Descriptor index for `frame`, if it is a page-aligned managed frame.
    #[must_use]
    pub fn index_of(&self, frame: PhysicalAddress) -> Option<usize> {
        if !frame.is_page_aligned() || frame < self.base {
            return None;
        }
        let index = usize::try_from((frame - self.base) >> PAGE_SHIFT).ok()?;
        (index < self.len()).then_some(index)
    }

    /// Base address of the frame at `index`.
    #[inline]
    #[must_use]
    pub fn address_of(&self, index: usize) -> PhysicalAddress {
        debug_assert!(index < self.len());
        self.base + ((index as u64) << PAGE_SHIFT)
    }

    /// Descriptor of `frame`, if managed.
    #[must_use]
    pub(crate) fn descriptor(&self, frame: PhysicalAddress) -> Option<&FrameDescriptor> {
        self.index_of(frame).map(|i| &self.descriptors[i])
    }

    #[must_use]
    pub fn is_free(&self, frame: PhysicalAddress) -> bool {
        self.descriptor(frame).is_some_and(FrameDescriptor::is_free)
    }

    #[must_use]
    pub fn is_tracked(&self, frame: PhysicalAddress) -> bool {
        self.descriptor(frame)
            .is_some_and(FrameDescriptor::is_resident)
    }

    /// Take a frame off the free list; it becomes allocated and untracked.
    pub fn pop_free(&mut self) -> Option<PhysicalAddress> {
        let index = self.free_head?;
        let FrameState::Free { next } = self.descriptors[index].state else {
            panic!("frame table: free list head {index} is not free");
        };
        self.free_head = next;
        self.free_len -= 1;
        self.descriptors[index].state = FrameState::Allocated;
        Some(self.address_of(index))
    }

    /// Return an allocated, untracked frame to the free list.
    ///
    /// # Panics
    /// If `frame` is not managed, already free, or still resident.
    pub fn push_free(&mut self, frame: PhysicalAddress) {
        let index = self.checked_index(frame, "push_free");
        match self.descriptors[index].state {
            FrameState::Allocated => self.push_free_index(index),
            FrameState::Free { .. } => panic!("frame table: double free of frame {frame}"),
            FrameState::Resident { mapping, .. } => {
                panic!("frame table: freeing frame {frame} still resident for {mapping}")
            }
        }
    }

    fn push_free_index(&mut self, index: usize) {
        self.descriptors[index].state = FrameState::Free {
            next: self.free_head,
        };
        self.free_head = Some(index);
        self.free_len += 1;
    }

    /// Record that `frame` backs `mapping` and append it to the resident tail.
    ///
    /// # Panics
    /// If `frame` is not managed or not in the allocated state.
    pub fn track(&mut self, frame: PhysicalAddress, mapping: Mapping) {
        let index = self.checked_index(frame, "track");
        match self.descriptors[index].state {
            FrameState::Allocated => self.insert_tail(index, mapping),
            FrameState::Free { .. } => panic!("frame table: tracking free frame {frame}"),
            FrameState::Resident { mapping: old, .. } => {
                panic!("frame table: frame {frame} already tracked for {old}")
            }
        }
        trace!("frame table: track {frame} for {mapping}");
    }

    /// Remove `frame` from the resident list and return the mapping it backed.
    ///
    /// # Panics
    /// If `frame` is not on the resident list.
    pub fn untrack(&mut self, frame: PhysicalAddress) -> Mapping {
        let index = self.checked_index(frame, "untrack");
        assert!(
            self.descriptors[index].is_resident(),
            "frame table: untracking frame {frame} that is not resident"
        );
        let mapping = self.detach(index);
        trace!("frame table: untrack {frame} from {mapping}");
        mapping
    }

    /// Move `frame` to the tail of the resident list, keeping the relative
    /// order of every other frame.
    ///
    /// # Panics
    /// If `frame` is not on the resident list.
    pub fn rotate_to_tail(&mut self, frame: PhysicalAddress) {
        let index = self.checked_index(frame, "rotate_to_tail");
        self.rotate_index_to_tail(index);
    }

    pub(crate) fn rotate_index_to_tail(&mut self, index: usize) {
        assert!(
            self.descriptors[index].is_resident(),
            "frame table: rotating frame {index} that is not resident"
        );
        if self.resident_len <= 1 {
            return;
        }
        let mapping = self.detach(index);
        self.insert_tail(index, mapping);
    }

    /// Index of the frame the clock hand points at.
    #[inline]
    pub(crate) const fn resident_head(&self) -> Option<usize> {
        self.resident_head
    }

    /// Successor of a resident frame in clock order (wraps around).
    pub(crate) fn next_resident(&self, index: usize) -> usize {
        self.links(index).2
    }

    pub(crate) fn mapping_at(&self, index: usize) -> Mapping {
        self.links(index).0
    }

    /// Resident frames from head to tail.
    pub fn residents(&self) -> impl Iterator<Item = (PhysicalAddress, Mapping)> + '_ {
        let mut cursor = self.resident_head;
        (0..self.resident_len).filter_map(move |_| {
            let index = cursor?;
            let (mapping, _, next) = self.links(index);
            cursor = Some(next);
            Some((self.address_of(index), mapping))
        })
    }

    fn checked_index(&self, frame: PhysicalAddress, op: &str) -> usize {
        self.index_of(frame)
            .unwrap_or_else(|| panic!("frame table: {op} of unmanaged frame {frame}"))
    }

    fn links(&self, index: usize) -> (Mapping, usize, usize) {
        match self.descriptors[index].state {
            FrameState::Resident {
                mapping,
                prev,
                next,
            } => (mapping, prev, next),
            state => panic!("frame table: frame {index} is not resident ({state:?})"),
        }
    }

    fn set_prev(&mut self, index: usize, value: usize) {
        if let FrameState::Resident { prev, .. } = &mut self.descriptors[index].state {
            *prev = value;
        }
    }

    fn set_next(&mut self, index: usize, value: usize) {
        if let FrameState::Resident { next, .. } = &mut self.descriptors[index].state {
            *next = value;
        }
    }

    fn insert_tail(&mut self, index: usize, mapping: Mapping) {
        let (prev, next) = match self.resident_head {
            None => {
                self.resident_head = Some(index);
                (index, index)
            }
            Some(head) => {
                let tail = self.links(head).1;
                self.set_next(tail, index);
                self.set_prev(head, index);
                (tail, head)
            }
        };
        self.descriptors[index].state = FrameState::Resident {
            mapping,
            prev,
            next,
        };
        self.resident_len += 1;
    }

    fn detach(&mut self, index: usize) -> Mapping {
        let (mapping, prev, next) = self.links(index);
        if next == index {
            self.resident_head = None;
        } else {
            self.set_next(prev, next);
            self.set_prev(next, prev);
            if self.resident_head == Some(index) {
                self.resident_head = Some(next);
            }
        }
        self.descriptors[index].state = FrameState::Allocated;
        self.resident_len -= 1;
        mapping
    }
}

impl fmt::Debug for FrameTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameTable")
            .field("base", &self.base)
            .field("frames", &self.len())
            .field("free", &self.free_len)
            .field("resident", &self.resident_len)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::VecDeque;

    const BASE: PhysicalAddress = PhysicalAddress::new(0x8000_0000);

    fn mapping(va: u64) -> Mapping {
        Mapping::new(PageTableId::new(1), VirtualAddress::new(va))
    }

    fn order(table: &FrameTable) -> Vec<u64> {
        table.residents().map(|(_, m)| m.address.as_u64()).collect()
    }

    /// Allocate `n` frames and track them at VAs 0x1000, 0x2000, ...
    fn table_with_residents(n: usize) -> (FrameTable, Vec<PhysicalAddress>) {
        let mut table = FrameTable::new(BASE, n + 2);
        let frames: Vec<_> = (1..=n as u64)
            .map(|i| {
                let frame = table.pop_free().unwrap();
                table.track(frame, mapping(i << 12));
                frame
            })
            .collect();
        (table, frames)
    }

    #[test]
    fn starts_with_every_frame_free() {
        let table = FrameTable::new(BASE, 4);
        assert_eq!(table.len(), 4);
        assert_eq!(table.free_len(), 4);
        assert_eq!(table.resident_len(), 0);
        assert!(table.is_free(BASE));
    }

    #[test]
    fn pop_and_push_recycle_frames() {
        let mut table = FrameTable::new(BASE, 2);
        let a = table.pop_free().unwrap();
        let b = table.pop_free().unwrap();
        assert_ne!(a, b);
        assert_eq!(table.pop_free(), None);

        table.push_free(a);
        assert_eq!(table.pop_free(), Some(a));
    }

    #[test]
    fn index_of_rejects_foreign_addresses() {
        let table = FrameTable::new(BASE, 2);
        assert_eq!(table.index_of(BASE), Some(0));
        assert_eq!(table.index_of(BASE + 0x1000), Some(1));
        assert_eq!(table.index_of(BASE + 0x2000), None);
        assert_eq!(table.index_of(BASE + 0x10), None);
        assert_eq!(table.index_of(PhysicalAddress::new(0x1000)), None);
    }

    #[test]
    fn track_appends_at_tail() {
        let (table, _) = table_with_residents(3);
        assert_eq!(order(&table), vec![0x1000, 0x2000, 0x3000]);
        assert_eq!(table.resident_len(), 3);
    }

    #[test]
    fn untrack_head_middle_and_tail() {
        let (mut table, frames) = table_with_residents(4);

        assert_eq!(table.untrack(frames[1]), mapping(0x2000));
        assert_eq!(order(&table), vec![0x1000, 0x3000, 0x4000]);

        table.untrack(frames[0]);
        assert_eq!(order(&table), vec![0x3000, 0x4000]);

        table.untrack(frames[3]);
        assert_eq!(order(&table), vec![0x3000]);

        table.untrack(frames[2]);
        assert!(order(&table).is_empty());
        assert_eq!(table.resident_head(), None);
    }

    #[test]
    fn rotate_to_tail_preserves_relative_order() {
        let (mut table, frames) = table_with_residents(4);

        table.rotate_to_tail(frames[0]);
        assert_eq!(order(&table), vec![0x2000, 0x3000, 0x4000, 0x1000]);

        table.rotate_to_tail(frames[2]);
        assert_eq!(order(&table), vec![0x2000, 0x4000, 0x1000, 0x3000]);

        // already at the tail
        table.rotate_to_tail(frames[2]);
        assert_eq!(order(&table), vec![0x2000, 0x4000, 0x1000, 0x3000]);
        assert_eq!(table.resident_len(), 4);
    }

    #[test]
    fn counts_are_conserved() {
        let (mut table, frames) = table_with_residents(3);
        let allocated = 0;
        assert_eq!(
            table.free_len() + table.resident_len() + allocated,
            table.len()
        );

        table.untrack(frames[0]);
        table.push_free(frames[0]);
        assert_eq!(table.free_len() + table.resident_len(), table.len());
    }

    #[derive(Debug, Clone)]
    enum Op {
        Allocate,
        Track(usize),
        Untrack(usize),
        Rotate(usize),
        Release(usize),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            Just(Op::Allocate),
            (0..16usize).prop_map(Op::Track),
            (0..16usize).prop_map(Op::Untrack),
            (0..16usize).prop_map(Op::Rotate),
            (0..16usize).prop_map(Op::Release),
        ]
    }

    proptest! {
        /// The resident list behaves like a queue with move-to-back, and no
        /// frame is ever lost or counted twice.
        #[test]
        fn matches_a_queue_model(ops in proptest::collection::vec(op(), 1..64)) {
            let mut table = FrameTable::new(BASE, 8);
            let mut allocated: Vec<PhysicalAddress> = Vec::new();
            let mut resident: VecDeque<PhysicalAddress> = VecDeque::new();

            for op in ops {
                match op {
                    Op::Allocate => {
                        if let Some(frame) = table.pop_free() {
                            allocated.push(frame);
                        }
                    }
                    Op::Track(i) if !allocated.is_empty() => {
                        let frame = allocated.swap_remove(i % allocated.len());
                        table.track(frame, mapping(frame.as_u64()));
                        resident.push_back(frame);
                    }
                    Op::Untrack(i) if !resident.is_empty() => {
                        let frame = resident.remove(i % resident.len()).unwrap();
                        prop_assert_eq!(table.untrack(frame), mapping(frame.as_u64()));
                        allocated.push(frame);
                    }
                    Op::Rotate(i) if !resident.is_empty() => {
                        let frame = resident.remove(i % resident.len()).unwrap();
                        table.rotate_to_tail(frame);
                        resident.push_back(frame);
                    }
                    Op::Release(i) if !allocated.is_empty() => {
                        let frame = allocated.swap_remove(i % allocated.len());
                        table.push_free(frame);
                    }
                    _ => {}
                }

                let order: Vec<_> = table.residents().map(|(frame, _)| frame).collect();
                prop_assert_eq!(&order, &resident.iter().copied().collect::<Vec<_>>());
                prop_assert_eq!(
                    table.free_len() + table.resident_len() + allocated.len(),
                    table.len()
                );
            }
        }
    }

    #[test]
    fn descriptors_follow_the_frame_state() {
        let (mut table, frames) = table_with_residents(1);
        assert!(table.descriptor(frames[0]).unwrap().is_resident());
        assert!(table.is_tracked(frames[0]));

        table.untrack(frames[0]);
        let allocated = table.descriptor(frames[0]).unwrap();
        assert!(!allocated.is_resident() && !allocated.is_free());

        table.push_free(frames[0]);
        assert!(table.descriptor(frames[0]).unwrap().is_free());
        assert!(table.descriptor(PhysicalAddress::new(0x1000)).is_none());
    }

    #[test]
    #[should_panic(expected = "not resident")]
    fn rotating_a_lone_allocated_frame_is_fatal() {
        let mut table = FrameTable::new(BASE, 1);
        let frame = table.pop_free().unwrap();
        table.rotate_to_tail(frame);
    }

    #[test]
    #[should_panic(expected = "already tracked")]
    fn tracking_twice_is_fatal() {
        let (mut table, frames) = table_with_residents(1);
        table.track(frames[0], mapping(0x9000));
    }

    #[test]
    #[should_panic(expected = "double free")]
    fn double_free_is_fatal() {
        let mut table = FrameTable::new(BASE, 1);
        let frame = table.pop_free().unwrap();
        table.push_free(frame);
        table.push_free(frame);
    }

    #[test]
    #[should_panic(expected = "still resident")]
    fn freeing_a_resident_frame_is_fatal() {
        let (mut table, frames) = table_with_residents(1);
        table.push_free(frames[0]);
    }

    #[test]
    #[should_panic(expected = "not resident")]
    fn untracking_an_allocated_frame_is_fatal() {
        let mut table = FrameTable::new(BASE, 1);
        let frame = table.pop_free().unwrap();
        table.untrack(frame);
    }
}
