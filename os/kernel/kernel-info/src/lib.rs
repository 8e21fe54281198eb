//! # Kernel Memory Configuration
//!
//! This crate is the single source of truth for the constants shared by the
//! physical allocator, the swap subsystem and the page-table encoding. Every
//! value is a `const` so that relationships between them can be checked at
//! compile time instead of at boot.
//!
//! ## Physical Memory Layout
//!
//! ```text
//! PHYS_BASE  ├─────────────────────────────────┤ 0x8000_0000
//!            │   Kernel image, then frames     │
//!            │   managed by the page allocator │
//! PHYS_TOP   ├─────────────────────────────────┤ PHYS_BASE + 128 MiB
//! ```
//!
//! ## Swap Layout
//!
//! The swap area is a run of [`SWAP_MAX_BLOCKS`](memory::SWAP_MAX_BLOCKS)
//! device blocks of [`SWAP_BLOCK_SIZE`](memory::SWAP_BLOCK_SIZE) bytes. One
//! swap slot holds exactly one page, so the area provides
//! [`SWAP_SLOTS`](memory::SWAP_SLOTS) slots, each tracked by a single bit in a
//! bitmap that must fit into one page.
//!
//! ```text
//! slot 0            slot 1            slot 2
//! ├──┬──┬──┬──┤├──┬──┬──┬──┤├──┬──┬──┬──┤ ...
//!  4 blocks per page-sized slot
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

pub mod memory;
