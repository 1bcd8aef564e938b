//! Pure index arithmetic, factored out of [`crate::ring`] so it can be
//! property-tested without any mmap/futex machinery.

/// Bytes produced but not yet consumed, modulo 2^32.
pub(crate) fn used(produced: u32, consumed: u32) -> u32 {
    produced.wrapping_sub(consumed)
}

/// Bytes available for the producer to write into.
pub(crate) fn free(capacity: u32, produced: u32, consumed: u32) -> u32 {
    capacity - used(produced, consumed)
}
