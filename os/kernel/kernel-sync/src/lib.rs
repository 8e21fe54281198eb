//! # Kernel synchronization primitives
//!
//! The paging core keeps two independent pieces of shared state, the frame
//! table and the swap bitmap, each behind its own [`SpinLock`]. Locks carry a
//! static name so that log output and panics can say which one was involved.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod spin_lock;

pub use spin_lock::{SpinLock, SpinLockGuard};
