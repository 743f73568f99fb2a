//! Storage layer for heapdb.
//!
//! This module provides the page-based foundation the access layer builds on.
//! Key components:
//!
//! - **HeapPage**: Slotted page with a bitmap occupancy header and fixed-size
//!   row slots
//! - **PageManager**: Positional reads and writes of whole page images
//! - **PageCache**: The lease contract heap files use to reach pages
//! - **BufferPool**: Bounded page cache with LRU eviction of clean pages and
//!   commit/abort handling through before images

pub mod buffer;
pub mod disk;
pub mod page;

pub use buffer::{BufferPool, PageCache, PageHandle, Permission};
pub use disk::PageManager;
pub use page::{HeapPage, PageId};
