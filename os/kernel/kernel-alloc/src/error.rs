/// Why an eviction round did not free a frame.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EvictError {
    #[error("no evictable resident page")]
    NoVictim,
    #[error("swap space exhausted")]
    SwapExhausted,
    #[error("victim mapping changed during swap-out")]
    VictimInvalidated,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PagerError {
    /// No free frame and eviction could not produce one.
    #[error("out of memory: {0}")]
    OutOfMemory(EvictError),
    #[error("swap space exhausted")]
    SwapExhausted,
    #[error("entry is not swapped out")]
    NotSwappedOut,
    #[error("address is not mapped")]
    Unmapped,
}
