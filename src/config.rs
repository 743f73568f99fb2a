//! Storage configuration.

/// Default size in bytes of every page in a heap file.
pub const DEFAULT_PAGE_SIZE: usize = 4096;

/// Default number of pages the buffer pool keeps resident.
pub const DEFAULT_BUFFER_POOL_PAGES: usize = 64;

/// Process-wide storage settings.
///
/// `page_size` applies to heap files opened with this config. Files with
/// different page sizes may share one buffer pool, but a file's page size must
/// not change once it has been written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageConfig {
    pub page_size: usize,
    pub buffer_pool_pages: usize,
}

impl StorageConfig {
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            page_size,
            ..Self::default()
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            buffer_pool_pages: DEFAULT_BUFFER_POOL_PAGES,
        }
    }
}
