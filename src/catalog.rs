//! In-memory table registry.

use crate::access::{HeapFile, Schema};
use crate::error::{DbError, DbResult};
use dashmap::DashMap;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableId(pub u32);

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Maps a table to the schema of its rows.
pub trait SchemaResolver: Send + Sync {
    fn resolve_schema(&self, table_id: TableId) -> DbResult<Arc<Schema>>;
}

#[derive(Clone)]
struct TableEntry {
    name: String,
    file: Arc<HeapFile>,
}

/// Registered heap files, addressable by id or by name.
///
/// Registering a table under a name or id that is already taken replaces the
/// previous registration.
#[derive(Default)]
pub struct Catalog {
    tables: DashMap<TableId, TableEntry>,
    names: DashMap<String, TableId>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_table(&self, file: Arc<HeapFile>, name: impl Into<String>) -> TableId {
        let name = name.into();
        let table_id = file.id();

        if let Some((_, old_id)) = self.names.remove(&name) {
            if old_id != table_id {
                warn!("table {} re-registered: replacing {}", name, old_id);
                self.tables.remove(&old_id);
            }
        }
        if let Some(old) = self.tables.insert(
            table_id,
            TableEntry {
                name: name.clone(),
                file,
            },
        ) {
            if old.name != name {
                self.names.remove(&old.name);
            }
        }
        self.names.insert(name.clone(), table_id);
        debug!("registered table {} as {}", name, table_id);
        table_id
    }

    pub fn table(&self, table_id: TableId) -> DbResult<Arc<HeapFile>> {
        self.tables
            .get(&table_id)
            .map(|entry| Arc::clone(&entry.file))
            .ok_or_else(|| DbError::NotFound(format!("table {}", table_id)))
    }

    pub fn table_id(&self, name: &str) -> DbResult<TableId> {
        self.names
            .get(name)
            .map(|entry| *entry.value())
            .ok_or_else(|| DbError::NotFound(format!("table {}", name)))
    }

    pub fn table_name(&self, table_id: TableId) -> DbResult<String> {
        self.tables
            .get(&table_id)
            .map(|entry| entry.name.clone())
            .ok_or_else(|| DbError::NotFound(format!("table {}", table_id)))
    }

    /// Registered table ids in ascending order.
    pub fn table_ids(&self) -> Vec<TableId> {
        let mut ids: Vec<TableId> = self.tables.iter().map(|e| *e.key()).collect();
        ids.sort();
        ids
    }

    pub fn clear(&self) {
        self.tables.clear();
        self.names.clear();
    }
}

impl SchemaResolver for Catalog {
    fn resolve_schema(&self, table_id: TableId) -> DbResult<Arc<Schema>> {
        Ok(Arc::clone(self.table(table_id)?.schema()))
    }
}
