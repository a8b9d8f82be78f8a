//! Best-fit memory allocator on top of coarse memory regions.
//!
//! Memory is requested from a [`RegionProvider`] in fixed size regions
//! (4096 bytes by default). Every region starts its life as one big free
//! block; blocks are carved out of it on demand and go back to a single free
//! list when released.
//!
//! Every block has an associated header with metadata that precedes the
//! actual memory block:
//!
//! ```text
//! +-------------------------------+
//! | Header   | Actual memory block |
//! +-------------------------------+
//!            ^
//!            pointer returned by `allocate`
//! ```
//!
//! ```
//! use bestfit::Heap;
//!
//! let mut heap = Heap::system();
//!
//! let ptr = heap.allocate(64).unwrap();
//! unsafe {
//!     ptr.as_ptr().write_bytes(0, 64);
//!     heap.release(ptr.as_ptr()).unwrap();
//! }
//!
//! assert_eq!(ptr, heap.allocate(64).unwrap());
//! ```

mod block;
mod config;
mod error;
mod freelist;
mod heap;
mod kernel;
mod region;
mod utils;

pub use block::HEADER_SIZE;
pub use config::{DEFAULT_MAX_REQUEST, HeapConfig};
pub use error::{AllocError, ConfigError};
pub use heap::{FreeBlock, Heap, HeapStats};
pub use kernel::{RegionProvider, SystemProvider, page_size};
pub use region::DEFAULT_REGION_SIZE;

/// Every payload address and every block size is a multiple of this.
pub const ALIGNMENT: usize = 8;
