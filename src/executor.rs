//! Executor layer.
//!
//! Operators follow the Volcano-style iterator model: each one is a
//! [`RowStream`] that produces rows one at a time, so they compose by owning
//! their child stream.

use crate::access::{Row, Schema};
use crate::error::DbResult;
use std::sync::Arc;

pub mod aggregate;
pub mod seq_scan;

pub use aggregate::{Aggregate, AggregateOp};
pub use seq_scan::SeqScan;

/// Restartable, forward-only source of rows.
pub trait RowStream {
    /// Prepare the stream. This must be called before `next()`.
    fn open(&mut self) -> DbResult<()>;

    /// Get the next row, or `None` when the stream is exhausted.
    ///
    /// Fails with [`crate::error::DbError::StreamNotOpen`] if the stream is
    /// not open.
    fn next(&mut self) -> DbResult<Option<Row>>;

    /// Restart from the first row.
    fn rewind(&mut self) -> DbResult<()>;

    /// Release iteration state. The stream may be opened again.
    fn close(&mut self);

    /// Shape of the rows this stream produces.
    fn schema(&self) -> &Arc<Schema>;
}
