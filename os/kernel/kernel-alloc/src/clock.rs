//! # Second-chance victim selection
//!
//! Scans the resident list from its head. A frame whose leaf entry has the
//! accessed bit set loses the bit and moves to the tail; the first frame found
//! with the bit clear is the victim. Frames whose mapping no longer resolves
//! to them are skipped and left in place.
//!
//! One pass examines every resident frame once. After a pass in which every
//! frame was referenced the accessed bits are all clear, so a second pass is
//! guaranteed to find a victim unless the MMU races the scan.

use kernel_vmem::{PageTableWalk, PhysicalAddress};
use log::trace;

use crate::frame_table::{FrameTable, Mapping};

/// A frame chosen for eviction, still on the resident list.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Victim {
    pub frame: PhysicalAddress,
    pub mapping: Mapping,
}

/// Run up to `passes` clock passes over the resident list.
///
/// Must be called with the frame table locked. Returns `None` when the list
/// is empty, holds only stale mappings, or every frame kept being referenced.
pub fn select_victim<W>(frames: &mut FrameTable, walker: &W, passes: usize) -> Option<Victim>
where
    W: PageTableWalk + ?Sized,
{
    for pass in 0..passes {
        let mut cursor = frames.resident_head()?;
        for _ in 0..frames.resident_len() {
            let next = frames.next_resident(cursor);
            let frame = frames.address_of(cursor);
            let mapping = frames.mapping_at(cursor);

            match walker.resolve(mapping.table, mapping.address) {
                Some(cell) if cell.load().frame() == Some(frame) => {
                    if !cell.clear_accessed() {
                        trace!("clock: victim {frame} ({mapping}) in pass {pass}");
                        return Some(Victim { frame, mapping });
                    }
                    walker.flush(mapping.table, mapping.address);
                    frames.rotate_index_to_tail(cursor);
                }
                _ => trace!("clock: skipping stale mapping {mapping} of {frame}"),
            }
            cursor = next;
        }
    }
    None
}
