use std::{mem, ptr::NonNull};

use crate::freelist::Link;


/// Header size of a block in bytes. The payload of every block starts exactly
/// this many bytes after its header.
pub const HEADER_SIZE: usize = mem::size_of::<Header>();

/// This is the structure of a block. The fields of the block are its metadata,
/// content is placed right after this header.
///
/// ```text
/// +---------------------+ <------+
/// |        size         |        |
/// +---------------------+        | -> Header
/// |        next         |        |
/// +---------------------+ <------+ <-- pointer handed to the caller
/// |       Content       |        |
/// |         ...         |        | -> Addressable content (`size` bytes)
/// |         ...         |        |
/// +---------------------+ <------+
/// ```
///
/// `next` is only meaningful while the block sits in the [`crate::freelist::FreeList`].
/// Allocated blocks always have an empty `next`, which is what lets
/// [`crate::Heap::release`] spot a block that is released twice.
///
/// Every header address is a multiple of [`crate::ALIGNMENT`]: regions come
/// aligned from the provider, the header is itself a multiple of the alignment
/// and payload sizes are always rounded up to it.
#[repr(C)]
#[derive(Debug)]
pub(crate) struct Header {
    /// Usable payload bytes, the header itself excluded.
    pub size: usize,
    /// Next free block in the list.
    pub next: Link<Header>,
}

impl Header {
    /// Header of the sentinel that terminates every free list.
    pub const fn sentinel() -> Self {
        Self { size: 0, next: None }
    }

    /// Writes a fresh, unlinked header of payload `size` at `addr`.
    ///
    /// **SAFETY**: `addr` must be aligned for `Header` and valid for writes of
    /// `HEADER_SIZE + size` bytes that nobody else is using.
    pub unsafe fn write(addr: NonNull<u8>, size: usize) -> NonNull<Header> {
        let header = addr.cast::<Header>();

        unsafe {
            header.as_ptr().write(Header { size, next: None });
        }

        header
    }

    /// Recovers the header of the block whose payload starts at `payload`.
    ///
    /// **SAFETY**: `payload` must have been produced by [`Header::payload`].
    #[inline]
    pub unsafe fn from_payload(payload: NonNull<u8>) -> NonNull<Header> {
        unsafe { payload.sub(HEADER_SIZE).cast() }
    }

    /// First byte after the header.
    #[inline]
    pub fn payload(header: NonNull<Header>) -> NonNull<u8> {
        // SAFETY: every header is followed by its payload inside the same region.
        unsafe { header.add(1).cast() }
    }

    /// Address right past the payload of `header`, where a split remainder goes.
    ///
    /// **SAFETY**: `header` must point to a live header.
    #[inline]
    pub unsafe fn end(header: NonNull<Header>) -> NonNull<u8> {
        unsafe { Header::payload(header).add(header.as_ref().size) }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::ALIGNMENT;

    #[test]
    fn header_keeps_payload_aligned() {
        assert_eq!(0, HEADER_SIZE % ALIGNMENT);
        assert_eq!(2 * mem::size_of::<usize>(), HEADER_SIZE);
    }

    #[test]
    fn payload_and_header_are_a_fixed_offset_apart() {
        let mut storage = [0u64; 8];
        let addr = NonNull::from(&mut storage).cast::<u8>();

        unsafe {
            let header = Header::write(addr, 32);
            let payload = Header::payload(header);

            assert_eq!(HEADER_SIZE, payload.as_ptr() as usize - addr.as_ptr() as usize);
            assert_eq!(header, Header::from_payload(payload));
            assert_eq!(32, header.as_ref().size);
            assert!(header.as_ref().next.is_none());
            assert_eq!(payload.add(32), Header::end(header));
        }
    }
}
