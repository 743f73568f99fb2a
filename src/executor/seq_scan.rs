//! Sequential scan executor implementation.

use crate::access::{HeapFileScan, Row, Schema};
use crate::catalog::{Catalog, SchemaResolver, TableId};
use crate::error::DbResult;
use crate::executor::RowStream;
use crate::storage::buffer::PageCache;
use crate::transaction::TransactionId;
use std::sync::Arc;

/// Reads every row of one table, exposing column names qualified by a table
/// alias (`alias.column`).
pub struct SeqScan<'a> {
    table_id: TableId,
    table_name: String,
    alias: String,
    schema: Arc<Schema>,
    scan: HeapFileScan<'a>,
}

impl<'a> SeqScan<'a> {
    pub fn new(
        catalog: &Catalog,
        cache: &'a dyn PageCache,
        txn: TransactionId,
        table_id: TableId,
        alias: impl Into<String>,
    ) -> DbResult<Self> {
        let alias = alias.into();
        let file = catalog.table(table_id)?;
        let schema = Arc::new(catalog.resolve_schema(table_id)?.with_prefix(&alias));
        Ok(Self {
            table_id,
            table_name: catalog.table_name(table_id)?,
            alias,
            schema,
            scan: file.iterator(cache, txn),
        })
    }

    pub fn table_id(&self) -> TableId {
        self.table_id
    }

    /// Name the table was registered under in the catalog.
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }
}

impl RowStream for SeqScan<'_> {
    fn open(&mut self) -> DbResult<()> {
        self.scan.open()
    }

    fn next(&mut self) -> DbResult<Option<Row>> {
        Ok(self
            .scan
            .next()?
            .map(|row| row.with_schema(Arc::clone(&self.schema))))
    }

    fn rewind(&mut self) -> DbResult<()> {
        self.scan.rewind()
    }

    fn close(&mut self) {
        self.scan.close();
    }

    fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }
}
