//! # Swap space management
//!
//! Evicted pages are written to page-sized **slots** on a backing block
//! device. This crate provides the two pieces the pager needs for that:
//!
//! - [`SwapMap`]: a one-page bitmap recording which slots hold live data,
//!   protected by its own lock independent of the frame table.
//! - [`SwapDevice`]: the block-I/O collaborator that persists and restores a
//!   slot, plus [`RamSwapDevice`], an in-memory implementation.
//!
//! ```rust
//! use kernel_swap::{RamSwapDevice, SwapDevice, SwapMap};
//!
//! let device = RamSwapDevice::new(8);
//! let map = SwapMap::for_device(&device).unwrap();
//!
//! let slot = map.allocate().unwrap();
//! let page = [0xAB; 4096];
//! device.write_block(slot, &page);
//!
//! let mut back = [0; 4096];
//! device.read_block(slot, &mut back);
//! assert_eq!(page, back);
//! map.free(slot);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]

extern crate alloc;

mod device;
mod swap_map;

pub use device::{RamSwapDevice, SwapDevice, first_block};
pub use swap_map::{SwapMap, SwapMapError};
