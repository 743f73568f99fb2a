use anyhow::Result;
use heapdb::access::{Field, HeapFile, RecordLocation, Row, Schema, Type};
use heapdb::catalog::{Catalog, SchemaResolver, TableId};
use heapdb::config::StorageConfig;
use heapdb::error::{DbError, DbResult};
use heapdb::executor::{Aggregate, AggregateOp, RowStream, SeqScan};
use heapdb::storage::page::heap_page::slot_count;
use heapdb::storage::{BufferPool, PageCache, PageHandle, PageId, Permission};
use heapdb::transaction::{TransactionId, TransactionIdGenerator};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use tempfile::tempdir;

const PAGE: usize = 512;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// (dept TEXT, salary INT): 136-byte rows, 3 per 512-byte page.
fn employees_schema() -> Result<Arc<Schema>> {
    Ok(Arc::new(Schema::new(
        vec![Type::Text, Type::Int],
        vec!["dept".to_string(), "salary".to_string()],
    )?))
}

fn open_table(dir: &Path, name: &str) -> Result<(Arc<Catalog>, Arc<HeapFile>)> {
    let file = Arc::new(HeapFile::open(
        dir.join(format!("{}.dat", name)),
        employees_schema()?,
        &StorageConfig::with_page_size(PAGE),
    )?);
    let catalog = Arc::new(Catalog::new());
    catalog.add_table(Arc::clone(&file), name);
    Ok((catalog, file))
}

fn employee(file: &HeapFile, dept: &str, salary: i32) -> Result<Row> {
    Ok(Row::from_fields(
        Arc::clone(file.schema()),
        vec![Field::text(dept), Field::Int(salary)],
    )?)
}

fn salaries(stream: &mut dyn RowStream) -> Result<Vec<i32>> {
    let mut out = Vec::new();
    stream.open()?;
    while let Some(row) = stream.next()? {
        out.extend(row.get(1)?.and_then(Field::as_int));
    }
    stream.close();
    Ok(out)
}

/// Page cache that aborts every request.
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
fn test_layout_constants() {
    assert_eq!(slot_count(PAGE, 136), 3);
    assert_eq!(slot_count(4096, 8), 504);
    assert_eq!(slot_count(4096, 132), 31);
}

#[test]
fn test_growth_adds_exactly_one_page() -> Result<()> {
    init_logger();
    let dir = tempdir()?;
    let (catalog, file) = open_table(dir.path(), "emp")?;
    let pool = BufferPool::new(catalog, 8);
    let txn = TransactionId::new(1);

    for i in 0..3 {
        file.insert_row(&pool, txn, &mut employee(&file, "A", i)?)?;
    }
    assert_eq!(file.page_count()?, 1);

    let handle = file.insert_row(&pool, txn, &mut employee(&file, "A", 3)?)?;
    assert_eq!(file.page_count()?, 2);
    assert_eq!(handle.page_id().page_number, 1);
    assert_eq!(std::fs::metadata(file.path())?.len(), 2 * PAGE as u64);
    Ok(())
}

#[test]
fn test_scan_order_across_pages() -> Result<()> {
    init_logger();
    let dir = tempdir()?;
    let (catalog, file) = open_table(dir.path(), "emp")?;
    let pool = BufferPool::new(catalog, 8);
    let txn = TransactionId::new(1);

    let mut rows = Vec::new();
    for i in 0..8 {
        let mut row = employee(&file, "A", i)?;
        file.insert_row(&pool, txn, &mut row)?;
        rows.push(row);
    }
    let locations: Vec<Option<RecordLocation>> = rows.iter().map(Row::location).collect();
    for (i, location) in locations.iter().enumerate() {
        let location = location.ok_or_else(|| anyhow::anyhow!("row {} not placed", i))?;
        assert_eq!(location.page_id.page_number as usize, i / 3);
        assert_eq!(location.slot, i % 3);
    }

    file.delete_row(&pool, txn, &mut rows[4])?;
    let mut scan = file.iterator(&pool, txn);
    assert_eq!(salaries(&mut scan)?, vec![0, 1, 2, 3, 5, 6, 7]);
    Ok(())
}

#[test]
fn test_commit_persists_across_reopen() -> Result<()> {
    init_logger();
    let dir = tempdir()?;
    let txns = TransactionIdGenerator::new();
    {
        let (catalog, file) = open_table(dir.path(), "emp")?;
        let pool = BufferPool::new(catalog, 8);
        let txn = txns.next_id();
        for (dept, salary) in [("A", 10), ("B", 20), ("A", 30), ("C", 40)] {
            file.insert_row(&pool, txn, &mut employee(&file, dept, salary)?)?;
        }
        pool.transaction_complete(txn, true)?;
    }

    let (catalog, file) = open_table(dir.path(), "emp")?;
    assert_eq!(file.page_count()?, 2);
    let pool = BufferPool::new(catalog, 8);
    let mut scan = file.iterator(&pool, txns.next_id());
    assert_eq!(salaries(&mut scan)?, vec![10, 20, 30, 40]);
    Ok(())
}

#[test]
fn test_buffer_pool_abort_restores_before_image() -> Result<()> {
    init_logger();
    let dir = tempdir()?;
    let (catalog, file) = open_table(dir.path(), "emp")?;
    let pool = BufferPool::new(catalog, 8);

    let committed = TransactionId::new(1);
    let mut keep = employee(&file, "A", 1)?;
    file.insert_row(&pool, committed, &mut keep)?;
    pool.transaction_complete(committed, true)?;

    let aborted = TransactionId::new(2);
    file.insert_row(&pool, aborted, &mut employee(&file, "B", 2)?)?;
    file.delete_row(&pool, aborted, &mut keep)?;
    pool.transaction_complete(aborted, false)?;

    let mut scan = file.iterator(&pool, TransactionId::new(3));
    assert_eq!(salaries(&mut scan)?, vec![1]);
    Ok(())
}

#[test]
fn test_abort_signal_leaves_file_untouched() -> Result<()> {
    init_logger();
    let dir = tempdir()?;
    let (catalog, file) = open_table(dir.path(), "emp")?;
    let pool = BufferPool::new(catalog, 8);
    let txn = TransactionId::new(1);
    let mut row = employee(&file, "A", 1)?;
    file.insert_row(&pool, txn, &mut row)?;
    pool.transaction_complete(txn, true)?;
    let before = std::fs::read(file.path())?;

    let victim = TransactionId::new(2);
    let insert = file.insert_row(&AbortingCache, victim, &mut employee(&file, "B", 2)?);
    assert!(matches!(insert, Err(DbError::TransactionAborted(t)) if t == victim));
    let delete = file.delete_row(&AbortingCache, victim, &mut row);
    assert!(matches!(delete, Err(DbError::TransactionAborted(t)) if t == victim));

    assert!(row.location().is_some());
    assert_eq!(std::fs::read(file.path())?, before);
    Ok(())
}

#[test]
fn test_delete_stale_location() -> Result<()> {
    init_logger();
    let dir = tempdir()?;
    let (catalog, file) = open_table(dir.path(), "emp")?;
    let (other_catalog, other) = open_table(dir.path(), "other")?;
    let pool = BufferPool::new(catalog, 8);
    let other_pool = BufferPool::new(other_catalog, 8);
    let txn = TransactionId::new(1);

    let mut row = employee(&file, "A", 1)?;
    file.insert_row(&pool, txn, &mut row)?;
    let location = row.location().ok_or_else(|| anyhow::anyhow!("row not placed"))?;

    // A location on another table's page is not ours to delete.
    let mut foreign = employee(&other, "A", 1)?;
    other.insert_row(&other_pool, txn, &mut foreign)?;
    assert!(matches!(
        file.delete_row(&pool, txn, &mut foreign),
        Err(DbError::RecordNotFound(_))
    ));

    let mut copy = row.clone();
    file.delete_row(&pool, txn, &mut row)?;
    assert!(matches!(
        file.delete_row(&pool, txn, &mut copy),
        Err(DbError::RecordNotFound(_))
    ));
    assert_eq!(copy.location(), Some(location));
    Ok(())
}

#[test]
fn test_concurrent_inserts_share_growth() -> Result<()> {
    init_logger();
    let dir = tempdir()?;
    let (catalog, file) = open_table(dir.path(), "emp")?;
    let pool = Arc::new(BufferPool::new(catalog, 64));
    let txns = Arc::new(TransactionIdGenerator::new());

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let file = Arc::clone(&file);
            let pool = Arc::clone(&pool);
            let txns = Arc::clone(&txns);
            thread::spawn(move || -> Result<()> {
                let txn = txns.next_id();
                for i in 0..6 {
                    let mut row = employee(&file, "T", t * 100 + i)?;
                    file.insert_row(pool.as_ref(), txn, &mut row)?;
                }
                Ok(())
            })
        })
        .collect();
    for handle in handles {
        handle
            .join()
            .map_err(|_| anyhow::anyhow!("insert thread panicked"))??;
    }

    // 24 rows at 3 per page fill exactly 8 pages.
    assert_eq!(file.page_count()?, 8);
    let mut scan = file.iterator(pool.as_ref(), txns.next_id());
    assert_eq!(salaries(&mut scan)?.len(), 24);
    Ok(())
}

#[test]
fn test_seq_scan_prefixes_names() -> Result<()> {
    init_logger();
    let dir = tempdir()?;
    let (catalog, file) = open_table(dir.path(), "emp")?;
    let pool = BufferPool::new(Arc::clone(&catalog), 8);
    let txn = TransactionId::new(1);
    file.insert_row(&pool, txn, &mut employee(&file, "A", 5)?)?;

    let table_id = catalog.table_id("emp")?;
    assert_eq!(catalog.resolve_schema(table_id)?.field_name(0)?, Some("dept"));

    let mut scan = SeqScan::new(&catalog, &pool, txn, table_id, "e")?;
    assert_eq!(scan.table_name(), "emp");
    assert_eq!(scan.schema().field_name(0)?, Some("e.dept"));
    assert_eq!(scan.schema().field_name(1)?, Some("e.salary"));
    assert_eq!(salaries(&mut scan)?, vec![5]);

    assert!(matches!(
        SeqScan::new(&catalog, &pool, txn, TableId(table_id.0 ^ 1), "x"),
        Err(DbError::NotFound(_))
    ));
    Ok(())
}

#[test]
fn test_grouped_aggregate_over_heap_file() -> Result<()> {
    init_logger();
    let dir = tempdir()?;
    let (catalog, file) = open_table(dir.path(), "emp")?;
    let pool = BufferPool::new(Arc::clone(&catalog), 8);
    let txn = TransactionId::new(1);
    for (dept, salary) in [("A", 4), ("B", 7), ("A", 5), ("B", 9), ("C", -3)] {
        file.insert_row(&pool, txn, &mut employee(&file, dept, salary)?)?;
    }

    let scan = SeqScan::new(&catalog, &pool, txn, file.id(), "e")?;
    let mut agg = Aggregate::new(Box::new(scan), 1, Some(0), AggregateOp::Avg)?;
    assert_eq!(agg.aggregate_field_name(), "AVG(e.salary)");
    assert_eq!(agg.group_field_name(), Some("e.dept"));

    agg.open()?;
    let mut out = BTreeMap::new();
    while let Some(row) = agg.next()? {
        let key = row.get(0)?.cloned().ok_or_else(|| anyhow::anyhow!("no key"))?;
        out.insert(key, row.get(1)?.and_then(Field::as_int));
    }
    agg.close();

    assert_eq!(out.len(), 3);
    assert_eq!(out[&Field::text("A")], Some(4));
    assert_eq!(out[&Field::text("B")], Some(8));
    assert_eq!(out[&Field::text("C")], Some(-3));
    Ok(())
}

#[test]
fn test_ungrouped_aggregates_over_heap_file() -> Result<()> {
    init_logger();
    let dir = tempdir()?;
    let (catalog, file) = open_table(dir.path(), "emp")?;
    let pool = BufferPool::new(catalog, 8);
    let txn = TransactionId::new(1);

    let mut empty = Aggregate::new(Box::new(file.iterator(&pool, txn)), 1, None, AggregateOp::Sum)?;
    empty.open()?;
    assert!(empty.next()?.is_none());

    for salary in [3, 8, 1] {
        file.insert_row(&pool, txn, &mut employee(&file, "A", salary)?)?;
    }
    let expected = [
        (AggregateOp::Count, 3),
        (AggregateOp::Sum, 12),
        (AggregateOp::Avg, 4),
        (AggregateOp::Min, 1),
        (AggregateOp::Max, 8),
    ];
    for (op, value) in expected {
        let mut agg = Aggregate::new(Box::new(file.iterator(&pool, txn)), 1, None, op)?;
        agg.open()?;
        let row = agg.next()?.ok_or_else(|| anyhow::anyhow!("{} produced no row", op))?;
        assert_eq!(row.get(0)?, Some(&Field::Int(value)), "{}", op);
        assert!(agg.next()?.is_none());
    }

    let text_sum = Aggregate::new(Box::new(file.iterator(&pool, txn)), 0, None, AggregateOp::Sum);
    assert!(matches!(text_sum, Err(DbError::UnsupportedOperation(_))));
    Ok(())
}
