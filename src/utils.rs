//! Helper functions that don't particularly belong to any concrete module of the allocator.


/// It aligns `to_be_aligned` up to the next multiple of `aligment`.
///
/// Used to round request sizes up to [`crate::ALIGNMENT`] and to derive
/// page sized regions. `aligment` must be a power of two.
#[inline]
pub const fn align(to_be_aligned: usize, aligment: usize) -> usize {
    (to_be_aligned + aligment - 1) & !(aligment - 1)
}

/// Rounds `value` down to a multiple of `aligment` (a power of two).
#[inline]
pub const fn align_down(value: usize, aligment: usize) -> usize {
    value & !(aligment - 1)
}

/// Whether `addr` is a multiple of `aligment`.
#[inline]
pub const fn is_aligned(addr: usize, aligment: usize) -> bool {
    addr & (aligment - 1) == 0
}
