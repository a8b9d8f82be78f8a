use std::{
    ptr::NonNull,
    sync::atomic::{AtomicUsize, Ordering},
};

use log::{debug, warn};


/// Virtual memory page size of the computer. This is usually 4096.
/// It is computed once, on first use, since we don't know it at compile time.
static PAGE_SIZE: AtomicUsize = AtomicUsize::new(0);

/// Capability the heap uses to get coarse grained memory regions.
///
/// The allocator never looks inside a region besides writing block headers in
/// it, and never gives regions back on its own. Where the memory comes from
/// is entirely up to the implementation.
///
/// # Safety
///
/// Implementors must guarantee that every region returned by
/// [`RegionProvider::acquire_region`]:
/// - is valid for reads and writes of at least `len` bytes,
/// - is aligned to [`crate::ALIGNMENT`],
/// - does not overlap any other region handed out before,
/// - stays valid until it is released or the provider is dropped.
pub unsafe trait RegionProvider {
    /// Request a memory region of size `len`. It returns a pointer to the
    /// start of the region or `None` if no memory is available.
    fn acquire_region(&mut self, len: usize) -> Option<NonNull<u8>>;

    /// Returns the region of size `len` starting at `addr`.
    ///
    /// # Safety
    ///
    /// `addr` and `len` must describe a region previously acquired from this
    /// provider, and nothing may use that memory afterwards.
    unsafe fn release_region(&mut self, addr: NonNull<u8>, len: usize);
}

/// This trait provides an abstraction to handle low level memory operations
/// and syscalls. The provider on top of it has nothing to do with the
/// concrete APIs offered by each kernel.
trait PlatformMemory {
    /// Request a memory region of size `len`. It returns a pointer to the
    /// given location or None if the underlying syscall fails.
    unsafe fn request_memory(len: usize) -> Option<NonNull<u8>>;

    /// Returns the memory of size `len` starting from `addr` back to the kernel.
    unsafe fn return_memory(addr: *mut u8, len: usize);

    /// Returns the virtual memory page size of the computer in bytes.
    unsafe fn page_size() -> usize;
}

/// Zero sized handle to the operating system memory APIs.
struct Kernel;

/// Wrapper to calculate the computer's page size.
#[inline]
pub fn page_size() -> usize {
    match PAGE_SIZE.load(Ordering::Relaxed) {
        0 => {
            let size = unsafe { Kernel::page_size() };
            PAGE_SIZE.store(size, Ordering::Relaxed);
            size
        }
        size => size,
    }
}

/// [`RegionProvider`] backed by the operating system: `mmap` on unix and
/// `VirtualAlloc` on windows.
///
/// Every region is remembered so it can be unmapped when the provider is
/// dropped. Payload pointers of a heap built on top of it are valid as long
/// as the provider lives.
#[derive(Debug, Default)]
pub struct SystemProvider {
    regions: Vec<(NonNull<u8>, usize)>,
}

impl SystemProvider {
    pub const fn new() -> Self {
        Self { regions: Vec::new() }
    }

    /// Number of regions currently mapped by this provider.
    pub fn regions(&self) -> usize {
        self.regions.len()
    }

    /// Total bytes currently mapped by this provider.
    pub fn mapped_bytes(&self) -> usize {
        self.regions.iter().map(|(_, len)| len).sum()
    }
}

unsafe impl RegionProvider for SystemProvider {
    fn acquire_region(&mut self, len: usize) -> Option<NonNull<u8>> {
        let addr = unsafe { Kernel::request_memory(len) };

        match addr {
            Some(addr) => {
                debug!("mapped region of {len} bytes at {addr:?}");
                self.regions.push((addr, len));
            }
            None => warn!("kernel refused to map {len} bytes"),
        }

        addr
    }

    unsafe fn release_region(&mut self, addr: NonNull<u8>, len: usize) {
        if let Some(index) = self.regions.iter().position(|&(start, _)| start == addr) {
            self.regions.swap_remove(index);
        }

        debug!("unmapping region of {len} bytes at {addr:?}");
        unsafe { Kernel::return_memory(addr.as_ptr(), len) }
    }
}

impl Drop for SystemProvider {
    fn drop(&mut self) {
        for (addr, len) in self.regions.drain(..) {
            unsafe { Kernel::return_memory(addr.as_ptr(), len) }
        }
    }
}

/// Anonymous private mappings, one per region. `mmap` hands out page aligned
/// addresses so every region satisfies the header alignment.
#[cfg(unix)]
mod unix {
    use std::{ffi::c_void, ptr::{self, NonNull}};

    use log::warn;

    use super::{Kernel, PlatformMemory};

    impl PlatformMemory for Kernel {
        unsafe fn request_memory(len: usize) -> Option<NonNull<u8>> {
            let prot = libc::PROT_READ | libc::PROT_WRITE;
            let flags = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS;

            let region = unsafe { libc::mmap(ptr::null_mut(), len, prot, flags, -1, 0) };

            if region == libc::MAP_FAILED {
                return None;
            }

            NonNull::new(region.cast::<u8>())
        }

        unsafe fn return_memory(addr: *mut u8, len: usize) {
            if unsafe { libc::munmap(addr.cast::<c_void>(), len) } != 0 {
                warn!("munmap of {len} bytes at {addr:?} failed");
            }
        }

        unsafe fn page_size() -> usize {
            unsafe { libc::sysconf(libc::_SC_PAGE_SIZE) as usize }
        }
    }
}

/// Committed read/write allocations. `VirtualAlloc` rounds to the allocation
/// granularity, well above the header alignment.
#[cfg(windows)]
mod windows {
    use std::{ffi::c_void, mem::MaybeUninit, ptr::NonNull};

    use log::warn;

    use super::{Kernel, PlatformMemory};

    use ::windows::Win32::System::{Memory, SystemInformation};

    impl PlatformMemory for Kernel {
        unsafe fn request_memory(len: usize) -> Option<NonNull<u8>> {
            let region = unsafe {
                Memory::VirtualAlloc(
                    None,
                    len,
                    Memory::MEM_RESERVE | Memory::MEM_COMMIT,
                    Memory::PAGE_READWRITE,
                )
            };

            NonNull::new(region.cast::<u8>())
        }

        unsafe fn return_memory(addr: *mut u8, len: usize) {
            // MEM_RELEASE frees the whole reservation and wants a length of 0.
            let released = unsafe { Memory::VirtualFree(addr.cast::<c_void>(), 0, Memory::MEM_RELEASE) };

            if let Err(err) = released {
                warn!("VirtualFree of {len} bytes at {addr:?} failed: {err}");
            }
        }

        unsafe fn page_size() -> usize {
            let mut info = MaybeUninit::uninit();

            unsafe {
                SystemInformation::GetSystemInfo(info.as_mut_ptr());
                info.assume_init().dwPageSize as usize
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::ALIGNMENT;

    #[test]
    fn page_size_is_a_power_of_two() {
        let size = page_size();

        assert!(size.is_power_of_two());
        assert_eq!(size, page_size());
    }

    #[test]
    fn system_regions_are_writable_and_aligned() {
        let mut provider = SystemProvider::new();

        let region = provider.acquire_region(4096).unwrap();
        assert_eq!(0, region.as_ptr() as usize % ALIGNMENT);

        unsafe {
            region.as_ptr().write_bytes(0xAB, 4096);
            assert_eq!(0xAB, *region.as_ptr().add(4095));
        }

        assert_eq!(1, provider.regions());
        assert_eq!(4096, provider.mapped_bytes());
    }

    #[test]
    fn released_regions_are_forgotten() {
        let mut provider = SystemProvider::new();

        let first = provider.acquire_region(4096).unwrap();
        let second = provider.acquire_region(4096).unwrap();
        assert_ne!(first, second);

        unsafe { provider.release_region(first, 4096) };

        assert_eq!(1, provider.regions());
        assert_eq!(4096, provider.mapped_bytes());
    }

    #[test]
    #[cfg(unix)]
    fn failed_unmap_is_not_fatal() {
        let mut provider = SystemProvider::new();
        let region = provider.acquire_region(4096).unwrap();

        // munmap rejects addresses that are not page aligned.
        unsafe { Kernel::return_memory(region.as_ptr().add(ALIGNMENT), 4096) };

        unsafe { region.as_ptr().write(1) };
        assert_eq!(1, provider.regions());
    }
}
