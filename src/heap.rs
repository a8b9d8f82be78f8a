use std::{alloc::Layout, ptr::NonNull};

use log::{debug, info, trace, warn};

use crate::{
    ALIGNMENT,
    block::{HEADER_SIZE, Header},
    config::HeapConfig,
    error::AllocError,
    freelist::{FreeList, Link},
    kernel::{RegionProvider, SystemProvider},
    region::Region,
    utils::is_aligned,
};


/// Counters describing what a [`Heap`] has done so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStats {
    /// Regions acquired from the provider.
    pub regions: usize,
    /// Bytes acquired from the provider.
    pub region_bytes: usize,
    /// Blocks handed out and not released yet.
    pub live_allocations: usize,
    /// Successful `allocate` calls.
    pub total_allocations: usize,
    /// Allocations that left a remainder block behind.
    pub splits: usize,
    /// Blocks currently in the free list.
    pub free_blocks: usize,
}

/// A free block as seen from the outside: where its payload starts and how
/// many bytes it can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreeBlock {
    pub addr: NonNull<u8>,
    pub size: usize,
}

/// Best-fit allocator over regions supplied by a [`RegionProvider`].
///
/// All free blocks, whatever region they belong to, are kept in a single
/// [`FreeList`]. Allocating scans the whole list for the smallest block that
/// fits and splits off what is left when there is room for another header.
/// Releasing pushes the block back on the list as it is: adjacent free blocks
/// are never merged.
///
/// ```text
///                     free list
///       +-------------------------------------+
///       |                                     v
/// +-----|-------------------------+    +--------------------------------+
/// | +---|--+   +-------+   +------+ |  | +-------+   +------------------+ |
/// | | Free |   | Block |   | Free | |  | | Block |   |       Free       | |
/// | +------+   +-------+   +---^--+ |  | +-------+   +------------------+ |
/// +----------------------------|----+  +--------------------------------+
///                              +--- head
/// ```
///
/// A `Heap` is single threaded: it is neither `Send` nor `Sync`, and every
/// operation needs `&mut self`. Pointers returned by [`Heap::allocate`] stay
/// valid until they are released or the heap (and its provider) is dropped.
pub struct Heap<P: RegionProvider> {
    free_list: FreeList,
    provider: P,
    config: HeapConfig,
    stats: HeapStats,
}

impl Heap<SystemProvider> {
    /// Heap with the default configuration on top of memory mapped regions.
    pub fn system() -> Self {
        Self::initialize(SystemProvider::new())
    }
}

impl<P: RegionProvider> Heap<P> {
    /// Creates an empty heap with the default [`HeapConfig`]. No memory is
    /// requested until the first allocation.
    pub fn initialize(provider: P) -> Self {
        Self {
            free_list: FreeList::new(),
            provider,
            config: HeapConfig::default(),
            stats: HeapStats::default(),
        }
    }

    /// Same as [`Heap::initialize`] with a custom configuration.
    pub fn with_config(provider: P, config: HeapConfig) -> Result<Self, AllocError> {
        config.validate()?;

        Ok(Self { config, ..Self::initialize(provider) })
    }

    #[inline]
    pub fn config(&self) -> &HeapConfig {
        &self.config
    }

    #[inline]
    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn stats(&self) -> HeapStats {
        HeapStats { free_blocks: self.free_list.len(), ..self.stats }
    }

    /// Allocates a block of at least `size` bytes and returns a pointer to
    /// its first byte. The pointer is aligned to [`ALIGNMENT`].
    ///
    /// Sizes are rounded up to the alignment. The heap grows by one region
    /// when no free block is large enough.
    pub fn allocate(&mut self, size: usize) -> Result<NonNull<u8>, AllocError> {
        let size = self.config.request_size(size)?;

        let mut grown = false;

        let (block, prev) = loop {
            if let Some(found) = self.free_list.best_fit(size) {
                break found;
            }

            // The new region always fits `size` since `max_request` is bounded
            // by its usable bytes, so one growth is enough.
            if grown {
                return Err(AllocError::NoFit { size });
            }

            self.grow()?;
            grown = true;
        };

        unsafe {
            self.free_list.remove(block, prev);
            self.split(block, size);
        }

        self.stats.live_allocations += 1;
        self.stats.total_allocations += 1;

        let addr = Header::payload(block);
        trace!("allocate({size}) -> {addr:?}");

        Ok(addr)
    }

    /// Allocates memory for `layout`. Only alignments up to [`ALIGNMENT`]
    /// can be honoured.
    pub fn allocate_layout(&mut self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        if layout.align() > ALIGNMENT {
            return Err(AllocError::UnsupportedAlignment { align: layout.align() });
        }

        self.allocate(layout.size())
    }

    /// Gives the block at `ptr` back to the heap. Releasing a null pointer
    /// does nothing.
    ///
    /// Releasing a block twice is detected and reported as
    /// [`AllocError::DoubleFree`] as long as the block was not handed out
    /// again in between.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or have been returned by [`Heap::allocate`] on this
    /// same heap. The caller must not use the memory after a successful call.
    pub unsafe fn release(&mut self, ptr: *mut u8) -> Result<(), AllocError> {
        let Some(ptr) = NonNull::new(ptr) else {
            return Ok(());
        };

        let addr = ptr.as_ptr() as usize;

        if !is_aligned(addr, ALIGNMENT) {
            warn!("release of misaligned pointer {ptr:?}");
            return Err(AllocError::Misaligned { addr });
        }

        unsafe {
            let header = Header::from_payload(ptr);

            // Every free block except the sentinel points somewhere since the
            // sentinel is always last.
            if self.free_list.is_sentinel(header) || header.as_ref().next.is_some() {
                warn!("double free of {ptr:?}");
                return Err(AllocError::DoubleFree { addr });
            }

            debug_assert!(!self.free_list.contains(header));

            trace!("release({ptr:?}) of {} bytes", header.as_ref().size);
            self.free_list.insert(header);
        }

        self.stats.live_allocations = self.stats.live_allocations.saturating_sub(1);

        Ok(())
    }

    /// Bytes that can actually be used at `ptr`. This may be more than what
    /// was requested when the block was too tight to split.
    ///
    /// # Safety
    ///
    /// `ptr` must be a live allocation of this heap.
    pub unsafe fn usable_size(&self, ptr: NonNull<u8>) -> usize {
        unsafe { Header::from_payload(ptr).as_ref().size }
    }

    /// Free blocks in the order the allocator scans them.
    pub fn free_blocks(&self) -> impl Iterator<Item = FreeBlock> + '_ {
        self.free_list.iter().map(|header| FreeBlock {
            addr: Header::payload(header),
            // SAFETY: the list only links valid headers.
            size: unsafe { header.as_ref().size },
        })
    }

    /// Walks the free list checking its structure.
    pub fn verify(&self) -> Result<(), AllocError> {
        if self.free_list.is_empty() != self.free_list.is_sentinel(self.free_list.head()) {
            return Err(AllocError::Corrupted("head does not match the recorded length"));
        }

        let mut current: Link<Header> = Some(self.free_list.head());
        let mut steps = 0;

        while let Some(node) = current {
            if self.free_list.is_sentinel(node) {
                break;
            }

            steps += 1;
            if steps > self.free_list.len() {
                return Err(AllocError::Corrupted("more blocks than recorded, cycle?"));
            }

            unsafe {
                if !is_aligned(node.as_ref().size, ALIGNMENT) {
                    return Err(AllocError::Corrupted("misaligned block size"));
                }

                current = node.as_ref().next;
            }
        }

        if current.is_none() {
            return Err(AllocError::Corrupted("sentinel is not the tail"));
        }

        if steps != self.free_list.len() {
            return Err(AllocError::Corrupted("fewer blocks than recorded"));
        }

        Ok(())
    }

    /// Ends the use of the heap. Nothing needs to be undone: the regions go
    /// back to the system whenever the provider is dropped.
    pub fn finalize(self) -> HeapStats {
        let stats = self.stats();

        info!(
            "heap finalized: {} regions ({} bytes), {} allocations, {} still live, {} free blocks",
            stats.regions,
            stats.region_bytes,
            stats.total_allocations,
            stats.live_allocations,
            stats.free_blocks,
        );

        stats
    }

    /// Acquires a new region and adds it to the free list as a single block.
    fn grow(&mut self) -> Result<(), AllocError> {
        let len = self.config.region_size;

        let start = self
            .provider
            .acquire_region(len)
            .ok_or(AllocError::RegionUnavailable { len })?;

        debug_assert!(is_aligned(start.as_ptr() as usize, ALIGNMENT));

        let region = Region::new(start, len);

        unsafe {
            let block = region.format();
            self.free_list.insert(block);
        }

        self.stats.regions += 1;
        self.stats.region_bytes += len;

        debug!("heap grew by {len} bytes at {start:?} ({} regions)", self.stats.regions);

        Ok(())
    }

    /// Shrinks `block` to `size` bytes when the rest can hold another block,
    /// and puts that rest on the free list.
    ///
    /// ```text
    /// before: | header |              payload                      |
    /// after:  | header | payload (size) | new header | remainder    |
    /// ```
    ///
    /// **SAFETY**: `block` must be unlinked and at least `size` bytes long.
    unsafe fn split(&mut self, mut block: NonNull<Header>, size: usize) {
        let remainder = unsafe { block.as_ref().size } - size;

        if remainder <= HEADER_SIZE {
            return;
        }

        unsafe {
            block.as_mut().size = size;

            let rest = Header::write(Header::end(block), remainder - HEADER_SIZE);
            self.free_list.insert(rest);
        }

        self.stats.splits += 1;
        debug!("split {size} bytes off a block, {} left over", remainder - HEADER_SIZE);
    }
}
