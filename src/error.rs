use thiserror::Error;


/// Errors reported by [`crate::Heap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AllocError {
    #[error("zero sized allocation")]
    ZeroSize,
    #[error("requested {size} bytes, at most {max} can be served")]
    TooLarge { size: usize, max: usize },
    #[error("alignment of {align} bytes is not supported")]
    UnsupportedAlignment { align: usize },
    #[error("region provider could not supply {len} bytes")]
    RegionUnavailable { len: usize },
    #[error("no free block of {size} bytes after growing the heap")]
    NoFit { size: usize },
    #[error("pointer {addr:#x} is not aligned to a block boundary")]
    Misaligned { addr: usize },
    #[error("block at {addr:#x} is already free")]
    DoubleFree { addr: usize },
    #[error("free list is corrupted: {0}")]
    Corrupted(&'static str),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Invalid [`crate::HeapConfig`] values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("region size {0} is not a multiple of the alignment")]
    RegionSizeUnaligned(usize),
    #[error("region size {0} leaves no room for a block")]
    RegionTooSmall(usize),
    #[error("max request {max} exceeds the {usable} usable bytes of a region")]
    MaxRequestTooLarge { max: usize, usable: usize },
    #[error("max request {0} is smaller than the alignment")]
    MaxRequestTooSmall(usize),
}
