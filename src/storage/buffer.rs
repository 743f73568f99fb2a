pub mod lru;
pub mod replacer;

use crate::catalog::Catalog;
use crate::error::{DbError, DbResult};
use crate::storage::page::{HeapPage, PageId};
use crate::transaction::TransactionId;
use dashmap::DashMap;
use log::{debug, trace};
use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use replacer::Replacer;
use std::sync::Arc;

/// Access mode requested for a page lease.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    ReadOnly,
    ReadWrite,
}

/// Source of page leases for heap files.
///
/// Implementations may block until the lease can be granted, and fail with
/// [`DbError::TransactionAborted`] when the requesting transaction has to be
/// rolled back.
pub trait PageCache: Send + Sync {
    fn acquire_page(
        &self,
        txn: TransactionId,
        page_id: PageId,
        permission: Permission,
    ) -> DbResult<PageHandle>;
}

/// A lease on one cached page.
#[derive(Clone)]
pub struct PageHandle {
    page_id: PageId,
    page: Arc<RwLock<HeapPage>>,
    permission: Permission,
}

impl PageHandle {
    pub fn new(page_id: PageId, page: Arc<RwLock<HeapPage>>, permission: Permission) -> Self {
        Self {
            page_id,
            page,
            permission,
        }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn permission(&self) -> Permission {
        self.permission
    }

    pub fn read(&self) -> RwLockReadGuard<'_, HeapPage> {
        self.page.read()
    }

    pub fn write(&self) -> DbResult<RwLockWriteGuard<'_, HeapPage>> {
        match self.permission {
            Permission::ReadWrite => Ok(self.page.write()),
            Permission::ReadOnly => Err(DbError::PermissionDenied(self.page_id)),
        }
    }
}

impl std::fmt::Debug for PageHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageHandle")
            .field("page_id", &self.page_id)
            .field("permission", &self.permission)
            .finish()
    }
}

/// Bounded page cache over the heap files registered in a [`Catalog`].
///
/// Dirty pages are never evicted, so a page only reaches disk through
/// [`BufferPool::flush_page`], [`BufferPool::flush_all`] or a committing
/// [`BufferPool::transaction_complete`].
pub struct BufferPool {
    catalog: Arc<Catalog>,
    page_table: DashMap<PageId, Arc<RwLock<HeapPage>>>,
    replacer: Mutex<Box<dyn Replacer>>,
    // Serializes misses so capacity is checked and filled atomically.
    load_lock: Mutex<()>,
    capacity: usize,
}

impl BufferPool {
    pub fn new(catalog: Arc<Catalog>, capacity: usize) -> Self {
        Self::with_replacer(catalog, Box::new(lru::LruReplacer::new(capacity)), capacity)
    }

    pub fn with_replacer(
        catalog: Arc<Catalog>,
        replacer: Box<dyn Replacer>,
        capacity: usize,
    ) -> Self {
        Self {
            catalog,
            page_table: DashMap::with_capacity(capacity),
            replacer: Mutex::new(replacer),
            load_lock: Mutex::new(()),
            capacity,
        }
    }

    /// Number of resident pages.
    pub fn num_cached(&self) -> usize {
        self.page_table.len()
    }

    pub fn contains(&self, page_id: PageId) -> bool {
        self.page_table.contains_key(&page_id)
    }

    fn lookup(&self, page_id: PageId) -> Option<Arc<RwLock<HeapPage>>> {
        let page = self.page_table.get(&page_id).map(|e| Arc::clone(e.value()))?;
        self.replacer.lock().record_access(page_id);
        Some(page)
    }

    fn is_evictable(&self, page_id: PageId) -> bool {
        match self.page_table.get(&page_id) {
            Some(entry) => {
                Arc::strong_count(entry.value()) == 1
                    && entry
                        .value()
                        .try_read()
                        .is_some_and(|page| page.is_dirty().is_none())
            }
            None => true,
        }
    }

    fn evict_page(&self) -> DbResult<()> {
        let victim = self
            .replacer
            .lock()
            .evict(&|page_id| self.is_evictable(page_id))
            .ok_or(DbError::BufferPoolFull)?;

        // A handle may have been taken since the candidate was chosen.
        let removed = self
            .page_table
            .remove_if(&victim, |_, page| Arc::strong_count(page) == 1);
        if removed.is_none() && self.page_table.contains_key(&victim) {
            self.replacer.lock().record_access(victim);
            return Err(DbError::BufferPoolFull);
        }
        debug!("evicted page {}", victim);
        Ok(())
    }

    /// Write a resident page to its heap file and mark it clean.
    pub fn flush_page(&self, page_id: PageId) -> DbResult<()> {
        let Some(page) = self.page_table.get(&page_id).map(|e| Arc::clone(e.value())) else {
            return Ok(());
        };
        let heap_file = self.catalog.table(page_id.table_id)?;
        let mut page = page.write();
        if let Some(txn) = page.is_dirty() {
            heap_file.write_page(&page)?;
            page.mark_dirty(false, txn);
            trace!("flushed page {}", page_id);
        }
        Ok(())
    }

    pub fn flush_all(&self) -> DbResult<()> {
        for page_id in self.resident_pages() {
            self.flush_page(page_id)?;
        }
        Ok(())
    }

    /// Drop a page from the cache without writing it.
    pub fn discard_page(&self, page_id: PageId) {
        self.page_table.remove(&page_id);
        self.replacer.lock().remove(page_id);
    }

    /// Finish `txn`: on commit write every page it dirtied and take a new
    /// before image; on abort restore those pages from their before images.
    pub fn transaction_complete(&self, txn: TransactionId, commit: bool) -> DbResult<()> {
        let mut touched = 0;
        for page_id in self.resident_pages() {
            let Some(page) = self.page_table.get(&page_id).map(|e| Arc::clone(e.value())) else {
                continue;
            };
            let mut page = page.write();
            if page.is_dirty() != Some(txn) {
                continue;
            }
            if commit {
                let heap_file = self.catalog.table(page_id.table_id)?;
                heap_file.write_page(&page)?;
                page.mark_dirty(false, txn);
                page.set_before_image()?;
            } else {
                *page = page.before_image()?;
            }
            touched += 1;
        }
        debug!(
            "{} {}: {} pages",
            if commit { "committed" } else { "aborted" },
            txn,
            touched
        );
        Ok(())
    }

    fn resident_pages(&self) -> Vec<PageId> {
        let mut ids: Vec<PageId> = self.page_table.iter().map(|e| *e.key()).collect();
        ids.sort();
        ids
    }
}

impl PageCache for BufferPool {
    fn acquire_page(
        &self,
        txn: TransactionId,
        page_id: PageId,
        permission: Permission,
    ) -> DbResult<PageHandle> {
        if let Some(page) = self.lookup(page_id) {
            return Ok(PageHandle::new(page_id, page, permission));
        }

        let _load = self.load_lock.lock();
        if let Some(page) = self.lookup(page_id) {
            return Ok(PageHandle::new(page_id, page, permission));
        }

        let heap_file = self.catalog.table(page_id.table_id)?;
        if self.page_table.len() >= self.capacity {
            self.evict_page()?;
        }
        let page = Arc::new(RwLock::new(heap_file.read_page(page_id)?));
        self.page_table.insert(page_id, Arc::clone(&page));
        self.replacer.lock().record_access(page_id);
        trace!("{} loaded page {} ({:?})", txn, page_id, permission);
        Ok(PageHandle::new(page_id, page, permission))
    }
}
