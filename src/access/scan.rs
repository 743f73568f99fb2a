//! Sequential access to the rows of a heap file.

use crate::access::heap::HeapFile;
use crate::access::row::Row;
use crate::access::schema::Schema;
use crate::error::{DbError, DbResult};
use crate::executor::RowStream;
use crate::storage::buffer::{PageCache, PageHandle, Permission};
use crate::storage::page::PageId;
use crate::transaction::TransactionId;
use std::sync::Arc;

/// Row stream over every row of a heap file in (page, slot) order.
///
/// Pages are leased read-only one at a time. Pages appended while the scan
/// is running are picked up, since the page count is re-read on each page
/// boundary.
pub struct HeapFileScan<'a> {
    file: Arc<HeapFile>,
    cache: &'a dyn PageCache,
    txn: TransactionId,
    is_open: bool,
    next_page: u32,
    current: Option<PageHandle>,
    next_slot: usize,
}

impl<'a> HeapFileScan<'a> {
    pub fn new(file: Arc<HeapFile>, cache: &'a dyn PageCache, txn: TransactionId) -> Self {
        Self {
            file,
            cache,
            txn,
            is_open: false,
            next_page: 0,
            current: None,
            next_slot: 0,
        }
    }

    fn reset(&mut self) {
        self.next_page = 0;
        self.current = None;
        self.next_slot = 0;
    }

    /// Next occupied slot on the currently leased page.
    fn next_on_current(&mut self) -> Option<Row> {
        let handle = self.current.as_ref()?;
        let page = handle.read();
        while self.next_slot < page.num_slots() {
            let slot = self.next_slot;
            self.next_slot += 1;
            if let Some(row) = page.row_at(slot) {
                return Some(row.clone());
            }
        }
        None
    }
}

impl RowStream for HeapFileScan<'_> {
    fn open(&mut self) -> DbResult<()> {
        self.reset();
        self.is_open = true;
        Ok(())
    }

    fn next(&mut self) -> DbResult<Option<Row>> {
        if !self.is_open {
            return Err(DbError::StreamNotOpen);
        }

        loop {
            if let Some(row) = self.next_on_current() {
                return Ok(Some(row));
            }
            self.current = None;

            if self.next_page >= self.file.page_count()? {
                return Ok(None);
            }
            let page_id = PageId::new(self.file.id(), self.next_page);
            self.current = Some(
                self.cache
                    .acquire_page(self.txn, page_id, Permission::ReadOnly)?,
            );
            self.next_page += 1;
            self.next_slot = 0;
        }
    }

    fn rewind(&mut self) -> DbResult<()> {
        if !self.is_open {
            return Err(DbError::StreamNotOpen);
        }
        self.reset();
        Ok(())
    }

    fn close(&mut self) {
        self.reset();
        self.is_open = false;
    }

    fn schema(&self) -> &Arc<Schema> {
        self.file.schema()
    }
}
