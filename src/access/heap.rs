use crate::access::row::Row;
use crate::access::scan::HeapFileScan;
use crate::access::schema::Schema;
use crate::catalog::TableId;
use crate::config::StorageConfig;
use crate::error::{DbError, DbResult};
use crate::storage::buffer::{PageCache, PageHandle, Permission};
use crate::storage::disk::PageManager;
use crate::storage::page::heap_page::slot_count;
use crate::storage::page::{HeapPage, PageId};
use crate::transaction::TransactionId;
use log::{debug, info};
use parking_lot::Mutex;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A table stored as an append-only sequence of heap pages in one file.
///
/// Page `n` lives at byte offset `n * page_size`. The page count is always
/// derived from the file length, and pages are only ever appended.
pub struct HeapFile {
    path: PathBuf,
    id: TableId,
    schema: Arc<Schema>,
    page_size: usize,
    pages: Mutex<PageManager>,
    // Serializes appending new pages.
    grow_lock: Mutex<()>,
}

impl HeapFile {
    /// Open the heap file at `path`, creating it if missing.
    pub fn open(
        path: impl AsRef<Path>,
        schema: Arc<Schema>,
        config: &StorageConfig,
    ) -> DbResult<Self> {
        let row_size = schema.byte_size();
        if slot_count(config.page_size, row_size) == 0 {
            return Err(DbError::InvalidSchema(format!(
                "a {}-byte row does not fit in a {}-byte page",
                row_size, config.page_size
            )));
        }

        let pages = PageManager::open(path.as_ref(), config.page_size)?;
        let path = path.as_ref().canonicalize()?;
        let id = table_id_for(&path);
        info!(
            "opened heap file {} as table {} ({} pages)",
            path.display(),
            id,
            pages.num_pages()?
        );

        Ok(Self {
            path,
            id,
            schema,
            page_size: config.page_size,
            pages: Mutex::new(pages),
            grow_lock: Mutex::new(()),
        })
    }

    pub fn id(&self) -> TableId {
        self.id
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `ceil(file_len / page_size)`.
    pub fn page_count(&self) -> DbResult<u32> {
        self.pages.lock().num_pages()
    }

    /// Read and decode one page straight from disk.
    pub fn read_page(&self, page_id: PageId) -> DbResult<HeapPage> {
        if page_id.table_id != self.id {
            return Err(DbError::PageNotFound(page_id));
        }

        let mut buf = vec![0u8; self.page_size];
        {
            let mut pages = self.pages.lock();
            if page_id.page_number >= pages.num_pages()? {
                return Err(DbError::PageNotFound(page_id));
            }
            pages.read_page(page_id.page_number, &mut buf)?;
        }
        HeapPage::from_bytes(page_id, Arc::clone(&self.schema), &buf, self.page_size)
    }

    /// Write the full image of `page` at its position in the file.
    pub fn write_page(&self, page: &HeapPage) -> DbResult<()> {
        let page_id = page.id();
        if page_id.table_id != self.id {
            return Err(DbError::PageNotFound(page_id));
        }
        let data = page.to_bytes()?;
        self.pages.lock().write_page(page_id.page_number, &data)
    }

    /// Insert `row` into the first page with a free slot, appending a page
    /// when every existing page is full.
    ///
    /// Returns the lease on the page that now holds the row; the page is
    /// marked dirty by `txn`.
    pub fn insert_row(
        &self,
        cache: &dyn PageCache,
        txn: TransactionId,
        row: &mut Row,
    ) -> DbResult<PageHandle> {
        if row.schema().as_ref() != self.schema.as_ref() {
            return Err(DbError::InvalidSchema(format!(
                "row schema [{}] does not match table schema [{}]",
                row.schema(),
                self.schema
            )));
        }

        let mut probed = self.page_count()?;
        if let Some(handle) = self.insert_into(cache, txn, row, 0..probed)? {
            return Ok(handle);
        }

        let _grow = self.grow_lock.lock();
        loop {
            let count = self.page_count()?;
            if let Some(handle) = self.insert_into(cache, txn, row, probed..count)? {
                return Ok(handle);
            }

            let page_id = PageId::new(self.id, count);
            self.write_page(&HeapPage::empty(
                page_id,
                Arc::clone(&self.schema),
                self.page_size,
            )?)?;
            debug!("table {} grew to {} pages", self.id, count + 1);

            if let Some(handle) = self.insert_into(cache, txn, row, count..count + 1)? {
                return Ok(handle);
            }
            // The fresh page was filled by a concurrent insert.
            probed = count + 1;
        }
    }

    /// Probe `range` with read-only leases and insert into the first page
    /// that still has room once leased for writing.
    fn insert_into(
        &self,
        cache: &dyn PageCache,
        txn: TransactionId,
        row: &mut Row,
        range: Range<u32>,
    ) -> DbResult<Option<PageHandle>> {
        for page_number in range {
            let page_id = PageId::new(self.id, page_number);
            let has_room = cache
                .acquire_page(txn, page_id, Permission::ReadOnly)?
                .read()
                .num_empty_slots()
                > 0;
            if !has_room {
                continue;
            }

            let handle = cache.acquire_page(txn, page_id, Permission::ReadWrite)?;
            let inserted = {
                let mut page = handle.write()?;
                match page.insert_row(row) {
                    Ok(()) => {
                        page.mark_dirty(true, txn);
                        true
                    }
                    Err(DbError::SlotFull(_)) => false,
                    Err(e) => return Err(e),
                }
            };
            if inserted {
                return Ok(Some(handle));
            }
        }
        Ok(None)
    }

    /// Remove `row` from the page named by its record location.
    pub fn delete_row(
        &self,
        cache: &dyn PageCache,
        txn: TransactionId,
        row: &mut Row,
    ) -> DbResult<PageHandle> {
        let location = row
            .location()
            .ok_or_else(|| DbError::RecordNotFound("row has no location".to_string()))?;
        let page_id = location.page_id;
        if page_id.table_id != self.id {
            return Err(DbError::RecordNotFound(format!(
                "row belongs to table {}, not {}",
                page_id.table_id, self.id
            )));
        }
        if page_id.page_number >= self.page_count()? {
            return Err(DbError::RecordNotFound(format!(
                "page {} does not exist",
                page_id
            )));
        }

        let handle = cache.acquire_page(txn, page_id, Permission::ReadWrite)?;
        {
            let mut page = handle.write()?;
            page.delete_row(row)?;
            page.mark_dirty(true, txn);
        }
        Ok(handle)
    }

    /// Forward-only stream over every row, in page then slot order.
    pub fn iterator<'a>(
        self: &Arc<Self>,
        cache: &'a dyn PageCache,
        txn: TransactionId,
    ) -> HeapFileScan<'a> {
        HeapFileScan::new(Arc::clone(self), cache, txn)
    }
}

fn table_id_for(path: &Path) -> TableId {
    let mut hasher = DefaultHasher::new();
    path.hash(&mut hasher);
    TableId(hasher.finish() as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::row::RecordLocation;
    use crate::access::types::{Field, Type};
    use crate::catalog::Catalog;
    use crate::executor::RowStream;
    use crate::storage::buffer::BufferPool;
    use anyhow::Result;
    use tempfile::{TempDir, tempdir};

    const PAGE: usize = 64;

    /// One INT column on 64-byte pages: 15 slots per page.
    fn setup() -> Result<(TempDir, Arc<HeapFile>, BufferPool)> {
        let dir = tempdir()?;
        let schema = Arc::new(Schema::new(vec![Type::Int], vec!["v".to_string()])?);
        let file = Arc::new(HeapFile::open(
            dir.path().join("t.dat"),
            schema,
            &StorageConfig::with_page_size(PAGE),
        )?);
        let catalog = Arc::new(Catalog::new());
        catalog.add_table(Arc::clone(&file), "t");
        let pool = BufferPool::new(catalog, 16);
        Ok((dir, file, pool))
    }

    fn row(file: &HeapFile, v: i32) -> Result<Row> {
        Ok(Row::from_fields(Arc::clone(file.schema()), vec![Field::Int(v)])?)
    }

    struct AbortingCache;

    impl PageCache for AbortingCache {
        fn acquire_page(
            &self,
            txn: TransactionId,
            _page_id: PageId,
            _permission: Permission,
        ) -> DbResult<PageHandle> {
            Err(DbError::TransactionAborted(txn))
        }
    }

    #[test]
    fn test_open_creates_empty_file() -> Result<()> {
        let (dir, file, _pool) = setup()?;
        assert!(dir.path().join("t.dat").exists());
        assert_eq!(file.page_count()?, 0);
        assert_eq!(file.page_size(), PAGE);
        assert!(file.path().is_absolute());
        Ok(())
    }

    #[test]
    fn test_id_is_stable_per_path() -> Result<()> {
        let (dir, file, _pool) = setup()?;
        let again = HeapFile::open(
            dir.path().join("t.dat"),
            Arc::clone(file.schema()),
            &StorageConfig::with_page_size(PAGE),
        )?;
        let other = HeapFile::open(
            dir.path().join("u.dat"),
            Arc::clone(file.schema()),
            &StorageConfig::with_page_size(PAGE),
        )?;
        assert_eq!(again.id(), file.id());
        assert_ne!(other.id(), file.id());
        Ok(())
    }

    #[test]
    fn test_row_too_large_for_page() -> Result<()> {
        let dir = tempdir()?;
        let schema = Arc::new(Schema::unnamed(vec![Type::Text])?);
        let result = HeapFile::open(
            dir.path().join("t.dat"),
            schema,
            &StorageConfig::with_page_size(PAGE),
        );
        assert!(matches!(result, Err(DbError::InvalidSchema(_))));
        Ok(())
    }

    #[test]
    fn test_page_count_rounds_up() -> Result<()> {
        let (dir, file, _pool) = setup()?;
        std::fs::write(dir.path().join("t.dat"), vec![0u8; PAGE + 1])?;
        assert_eq!(file.page_count()?, 2);
        assert_eq!(file.read_page(PageId::new(file.id(), 1))?.iter().count(), 0);
        Ok(())
    }

    #[test]
    fn test_read_page_out_of_range() -> Result<()> {
        let (_dir, file, _pool) = setup()?;
        let result = file.read_page(PageId::new(file.id(), 0));
        assert!(matches!(result, Err(DbError::PageNotFound(_))));

        let foreign = PageId::new(TableId(file.id().0.wrapping_add(1)), 0);
        assert!(matches!(
            file.read_page(foreign),
            Err(DbError::PageNotFound(_))
        ));
        Ok(())
    }

    #[test]
    fn test_read_page_rejects_garbage() -> Result<()> {
        let (dir, file, _pool) = setup()?;
        // 15 slots: bit 7 of header byte 1 is past the last slot.
        let mut data = vec![0u8; PAGE];
        data[1] = 0x80;
        std::fs::write(dir.path().join("t.dat"), data)?;
        assert!(matches!(
            file.read_page(PageId::new(file.id(), 0)),
            Err(DbError::Format(_))
        ));
        Ok(())
    }

    #[test]
    fn test_insert_grows_by_one_page() -> Result<()> {
        let (_dir, file, pool) = setup()?;
        let txn = TransactionId::new(1);

        for v in 0..15 {
            file.insert_row(&pool, txn, &mut row(&file, v)?)?;
        }
        assert_eq!(file.page_count()?, 1);

        let mut extra = row(&file, 15)?;
        let handle = file.insert_row(&pool, txn, &mut extra)?;
        assert_eq!(file.page_count()?, 2);
        assert_eq!(handle.page_id(), PageId::new(file.id(), 1));
        assert_eq!(
            extra.location(),
            Some(RecordLocation::new(PageId::new(file.id(), 1), 0))
        );
        assert_eq!(handle.read().is_dirty(), Some(txn));
        Ok(())
    }

    #[test]
    fn test_insert_reuses_freed_slot() -> Result<()> {
        let (_dir, file, pool) = setup()?;
        let txn = TransactionId::new(1);

        let mut rows = Vec::new();
        for v in 0..20 {
            let mut r = row(&file, v)?;
            file.insert_row(&pool, txn, &mut r)?;
            rows.push(r);
        }
        file.delete_row(&pool, txn, &mut rows[3])?;
        assert_eq!(rows[3].location(), None);

        let mut again = row(&file, 99)?;
        file.insert_row(&pool, txn, &mut again)?;
        assert_eq!(
            again.location(),
            Some(RecordLocation::new(PageId::new(file.id(), 0), 3))
        );
        assert_eq!(file.page_count()?, 2);
        Ok(())
    }

    #[test]
    fn test_insert_rejects_foreign_schema() -> Result<()> {
        let (_dir, file, pool) = setup()?;
        let schema = Arc::new(Schema::unnamed(vec![Type::Int, Type::Int])?);
        let mut wrong = Row::from_fields(schema, vec![Field::Int(1), Field::Int(2)])?;
        let result = file.insert_row(&pool, TransactionId::new(1), &mut wrong);
        assert!(matches!(result, Err(DbError::InvalidSchema(_))));
        assert_eq!(file.page_count()?, 0);
        Ok(())
    }

    #[test]
    fn test_delete_requires_location() -> Result<()> {
        let (_dir, file, pool) = setup()?;
        let txn = TransactionId::new(1);

        let mut loose = row(&file, 1)?;
        assert!(matches!(
            file.delete_row(&pool, txn, &mut loose),
            Err(DbError::RecordNotFound(_))
        ));

        let mut stored = row(&file, 2)?;
        file.insert_row(&pool, txn, &mut stored)?;
        let mut copy = stored.clone();
        file.delete_row(&pool, txn, &mut stored)?;
        assert!(matches!(
            file.delete_row(&pool, txn, &mut copy),
            Err(DbError::RecordNotFound(_))
        ));
        Ok(())
    }

    #[test]
    fn test_delete_missing_page() -> Result<()> {
        let (_dir, file, pool) = setup()?;
        let mut r = row(&file, 1)?;
        r.set_location(Some(RecordLocation::new(PageId::new(file.id(), 7), 0)));
        assert!(matches!(
            file.delete_row(&pool, TransactionId::new(1), &mut r),
            Err(DbError::RecordNotFound(_))
        ));
        Ok(())
    }

    #[test]
    fn test_abort_from_cache_propagates() -> Result<()> {
        let (dir, file, pool) = setup()?;
        let txn = TransactionId::new(1);
        file.insert_row(&pool, txn, &mut row(&file, 1)?)?;
        pool.transaction_complete(txn, true)?;
        let before = std::fs::read(dir.path().join("t.dat"))?;

        let result = file.insert_row(&AbortingCache, TransactionId::new(2), &mut row(&file, 2)?);
        assert!(matches!(result, Err(DbError::TransactionAborted(t)) if t == TransactionId::new(2)));
        assert_eq!(std::fs::read(dir.path().join("t.dat"))?, before);
        Ok(())
    }

    #[test]
    fn test_iterator_reads_through_cache() -> Result<()> {
        let (_dir, file, pool) = setup()?;
        let txn = TransactionId::new(1);
        for v in 0..17 {
            file.insert_row(&pool, txn, &mut row(&file, v)?)?;
        }

        let mut scan = file.iterator(&pool, txn);
        scan.open()?;
        let mut seen = Vec::new();
        while let Some(r) = scan.next()? {
            seen.push(r.get(0)?.and_then(Field::as_int));
        }
        scan.close();
        assert_eq!(seen, (0..17).map(Some).collect::<Vec<_>>());
        Ok(())
    }
}
