//! # HHDM-based physical mapper
//!
//! With a higher-half direct map every physical address `pa` is visible at
//! `HHDM_BASE + pa`, so turning a frame into something the pager can fill,
//! persist or restore is a single addition.
//!
//! ## Example
//! ```rust
//! use kernel_alloc::phys_mapper::HhdmPhysMapper;
//! use kernel_vmem::PhysicalAddress;
//!
//! let va = HhdmPhysMapper::translate(PhysicalAddress::new(0x8000_1000));
//! assert_eq!(va, 0xffff_8880_8000_1000);
//! ```

use kernel_info::memory::HHDM_BASE;
use kernel_vmem::{PhysMapper, PhysicalAddress};

/// [`PhysMapper`] for kernels with a higher-half direct map.
///
/// # Safety
/// - The HHDM mapping must be present and cover every frame the pager manages.
/// - The returned reference must only be used for mapped, writable memory.
#[derive(Copy, Clone, Debug, Default)]
pub struct HhdmPhysMapper;

impl HhdmPhysMapper {
    /// Kernel virtual address at which `pa` is visible.
    #[inline]
    #[must_use]
    pub const fn translate(pa: PhysicalAddress) -> u64 {
        HHDM_BASE + pa.as_u64()
    }
}

impl PhysMapper for HhdmPhysMapper {
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
        let va = Self::translate(pa) as *mut T;
        // SAFETY: Caller must ensure the physical address is valid and mapped via HHDM.
        unsafe { &mut *va }
    }
}
