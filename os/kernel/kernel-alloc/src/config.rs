use kernel_info::memory::{ALLOC_FILL, DEFAULT_CLOCK_PASSES, FREE_FILL, PHYS_BASE, PHYS_FRAMES};
use kernel_swap::SwapMapError;
use kernel_vmem::PhysicalAddress;

/// Construction parameters of a [`Pager`](crate::Pager).
///
/// The default manages the reference layout `PHYS_BASE..PHYS_TOP` with two
/// clock passes per eviction.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PagerConfig {
    /// First managed frame.
    pub base: PhysicalAddress,
    /// Number of managed 4 KiB frames.
    pub frames: usize,
    /// Clock passes per eviction attempt.
    pub clock_passes: usize,
    /// Junk written over a frame when it is handed out.
    pub alloc_fill: u8,
    /// Junk written over a frame when it is released.
    pub free_fill: u8,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PagerConfigError {
    #[error("managed range base {0} is not page aligned")]
    UnalignedBase(PhysicalAddress),
    #[error("managed range holds no frames")]
    NoFrames,
    #[error("eviction needs at least one clock pass")]
    NoClockPasses,
    #[error("allocation and release fill bytes are both {0:#04x}")]
    IdenticalFill(u8),
    #[error("swap map: {0}")]
    Swap(#[from] SwapMapError),
}

impl Default for PagerConfig {
    fn default() -> Self {
        Self::new(PhysicalAddress::new(PHYS_BASE), PHYS_FRAMES)
    }
}

impl PagerConfig {
    #[must_use]
    pub const fn new(base: PhysicalAddress, frames: usize) -> Self {
        Self {
            base,
            frames,
            clock_passes: DEFAULT_CLOCK_PASSES,
            alloc_fill: ALLOC_FILL,
            free_fill: FREE_FILL,
        }
    }

    #[must_use]
    pub const fn with_clock_passes(mut self, passes: usize) -> Self {
        self.clock_passes = passes;
        self
    }

    #[must_use]
    pub const fn with_fill(mut self, alloc_fill: u8, free_fill: u8) -> Self {
        self.alloc_fill = alloc_fill;
        self.free_fill = free_fill;
        self
    }

    /// # Errors
    /// The first rule the configuration breaks.
    pub const fn validate(&self) -> Result<(), PagerConfigError> {
        if !self.base.is_page_aligned() {
            return Err(PagerConfigError::UnalignedBase(self.base));
        }
        if self.frames == 0 {
            return Err(PagerConfigError::NoFrames);
        }
        if self.clock_passes == 0 {
            return Err(PagerConfigError::NoClockPasses);
        }
        if self.alloc_fill == self.free_fill {
            return Err(PagerConfigError::IdenticalFill(self.alloc_fill));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        let config = PagerConfig::default();
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.clock_passes, 2);
        assert_eq!((config.alloc_fill, config.free_fill), (0x05, 0x01));
    }

    #[test]
    fn rejects_broken_configurations() {
        let base = PhysicalAddress::new(0x8000_0000);
        assert_eq!(
            PagerConfig::new(base + 8, 4).validate(),
            Err(PagerConfigError::UnalignedBase(base + 8))
        );
        assert_eq!(
            PagerConfig::new(base, 0).validate(),
            Err(PagerConfigError::NoFrames)
        );
        assert_eq!(
            PagerConfig::new(base, 4).with_clock_passes(0).validate(),
            Err(PagerConfigError::NoClockPasses)
        );
        assert_eq!(
            PagerConfig::new(base, 4).with_fill(7, 7).validate(),
            Err(PagerConfigError::IdenticalFill(7))
        );
    }
}
