use crate::{
    ALIGNMENT,
    block::HEADER_SIZE,
    error::{AllocError, ConfigError},
    kernel::page_size,
    region::DEFAULT_REGION_SIZE,
    utils::{align, align_down, is_aligned},
};


/// Largest request served by a heap with the default configuration.
pub const DEFAULT_MAX_REQUEST: usize = 4000;

/// Tunables of a [`crate::Heap`].
///
/// `max_request` can never exceed the usable bytes of a fresh region, which
/// is what guarantees that a request always fits once the heap has grown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapConfig {
    /// Bytes requested from the provider every time the heap grows.
    pub region_size: usize,
    /// Largest size `allocate` accepts.
    pub max_request: usize,
}

impl Default for HeapConfig {
    fn default() -> Self {
        Self {
            region_size: DEFAULT_REGION_SIZE,
            max_request: DEFAULT_MAX_REQUEST,
        }
    }
}

impl HeapConfig {
    /// Regions of one OS page, serving as much of it as a block can hold.
    pub fn page_sized() -> Self {
        let region_size = page_size();

        Self {
            region_size,
            max_request: align_down(region_size - HEADER_SIZE, ALIGNMENT),
        }
    }

    pub fn with_region_size(mut self, region_size: usize) -> Self {
        self.region_size = region_size;
        self
    }

    pub fn with_max_request(mut self, max_request: usize) -> Self {
        self.max_request = max_request;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_aligned(self.region_size, ALIGNMENT) {
            return Err(ConfigError::RegionSizeUnaligned(self.region_size));
        }

        if self.region_size <= HEADER_SIZE + ALIGNMENT {
            return Err(ConfigError::RegionTooSmall(self.region_size));
        }

        if self.max_request < ALIGNMENT {
            return Err(ConfigError::MaxRequestTooSmall(self.max_request));
        }

        let usable = self.region_size - HEADER_SIZE;
        if self.max_request > usable {
            return Err(ConfigError::MaxRequestTooLarge { max: self.max_request, usable });
        }

        Ok(())
    }

    /// Turns a caller supplied size into the payload size actually searched for.
    pub(crate) fn request_size(&self, size: usize) -> Result<usize, AllocError> {
        if size == 0 {
            return Err(AllocError::ZeroSize);
        }

        if size > self.max_request {
            return Err(AllocError::TooLarge { size, max: self.max_request });
        }

        Ok(align(size, ALIGNMENT))
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = HeapConfig::default();

        assert_eq!(Ok(()), config.validate());
        assert_eq!(4096, config.region_size);
        assert_eq!(4000, config.max_request);
    }

    #[test]
    fn page_sized_config_is_valid() {
        let config = HeapConfig::page_sized();

        assert_eq!(Ok(()), config.validate());
        assert_eq!(page_size(), config.region_size);
        assert!(config.max_request + HEADER_SIZE <= config.region_size);
    }

    #[test]
    fn invalid_configs_are_rejected() {
        let config = HeapConfig::default();

        assert_eq!(
            Err(ConfigError::RegionSizeUnaligned(4095)),
            config.with_region_size(4095).validate()
        );
        assert_eq!(
            Err(ConfigError::RegionTooSmall(HEADER_SIZE)),
            config.with_region_size(HEADER_SIZE).validate()
        );
        assert_eq!(
            Err(ConfigError::MaxRequestTooSmall(0)),
            config.with_max_request(0).validate()
        );
        assert_eq!(
            Err(ConfigError::MaxRequestTooLarge { max: 4096, usable: 4096 - HEADER_SIZE }),
            config.with_max_request(4096).validate()
        );
        assert_eq!(
            Ok(()),
            config.with_region_size(8192).with_max_request(8000).validate()
        );
    }

    #[test]
    fn request_sizes_are_rounded_to_the_alignment() {
        let config = HeapConfig::default();

        assert_eq!(Ok(8), config.request_size(1));
        assert_eq!(Ok(8), config.request_size(8));
        assert_eq!(Ok(16), config.request_size(9));
        assert_eq!(Ok(4000), config.request_size(4000));
        assert_eq!(Err(AllocError::ZeroSize), config.request_size(0));
        assert_eq!(
            Err(AllocError::TooLarge { size: 4001, max: 4000 }),
            config.request_size(4001)
        );
    }
}
