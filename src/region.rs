use std::ptr::NonNull;

use crate::block::{HEADER_SIZE, Header};


/// Default size in bytes of every region requested from the provider.
pub const DEFAULT_REGION_SIZE: usize = 4096;

/// A span of memory obtained in bulk from a [`crate::RegionProvider`].
///
/// A fresh region is turned into a single free block that covers all of it:
///
/// ```text
/// +--------+--------------------------------------------+
/// | Header |            free payload                    |
/// +--------+--------------------------------------------+
/// ^ start  <------ size - HEADER_SIZE ------------------>
/// <------------------------- size ---------------------->
/// ```
///
/// Regions are never split back out of their blocks, so the heap doesn't
/// keep them around once formatted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Region {
    /// Start address returned by the provider.
    pub start: NonNull<u8>,
    /// Size of the region.
    pub size: usize,
}

impl Region {
    pub fn new(start: NonNull<u8>, size: usize) -> Self {
        Self { start, size }
    }

    /// Payload bytes left for the first block once its header is in place.
    #[inline]
    pub fn usable_size(&self) -> usize {
        self.size - HEADER_SIZE
    }

    /// Writes the header of the block spanning the whole region and returns it.
    /// The block is not linked anywhere yet.
    ///
    /// **SAFETY**: the region must be freshly acquired, aligned and at least
    /// `HEADER_SIZE` bytes long.
    pub unsafe fn format(&self) -> NonNull<Header> {
        debug_assert!(self.size > HEADER_SIZE);

        unsafe { Header::write(self.start, self.usable_size()) }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formatted_region_is_one_block() {
        let mut storage = [0u64; DEFAULT_REGION_SIZE / 8];
        let start = NonNull::from(&mut storage).cast::<u8>();
        let region = Region::new(start, DEFAULT_REGION_SIZE);

        unsafe {
            let header = region.format();

            assert_eq!(start, header.cast());
            assert_eq!(DEFAULT_REGION_SIZE - HEADER_SIZE, header.as_ref().size);
            assert!(header.as_ref().next.is_none());
            assert_eq!(start.add(DEFAULT_REGION_SIZE), Header::end(header));
        }
    }
}
