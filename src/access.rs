//! Access layer for row-oriented operations.
//!
//! This module provides the logical view of stored data:
//!
//! - **Type / Field**: Fixed-length column types and their values
//! - **Schema**: Ordered, optionally named column list
//! - **Row**: Schema-bound field vector tagged with its record location
//! - **HeapFile**: A table stored as an append-only sequence of heap pages
//! - **HeapFileScan**: Forward-only row stream over a heap file
//!
//! Page access always goes through a [`crate::storage::PageCache`], so the
//! access layer never holds page bytes outside a lease.

pub mod heap;
pub mod row;
pub mod scan;
pub mod schema;
pub mod types;

pub use heap::HeapFile;
pub use row::{RecordLocation, Row};
pub use scan::HeapFileScan;
pub use schema::{Column, Schema};
pub use types::{Field, TEXT_LEN, Type};
