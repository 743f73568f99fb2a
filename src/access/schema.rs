//! Row schemas.

use crate::access::types::Type;
use crate::error::{DbError, DbResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One column of a schema. Names are optional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: Option<String>,
    pub field_type: Type,
}

impl Column {
    pub fn new(name: impl Into<String>, field_type: Type) -> Self {
        Self {
            name: Some(name.into()),
            field_type,
        }
    }

    pub fn unnamed(field_type: Type) -> Self {
        Self {
            name: None,
            field_type,
        }
    }
}

/// Ordered, typed column list describing the shape of a row.
///
/// A schema always has at least one column. Equality only looks at the type
/// sequence, so two schemas with different column names but the same types
/// describe interchangeable rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schema {
    columns: Vec<Column>,
}

impl Schema {
    /// Build a schema from parallel type and name lists.
    pub fn new(types: Vec<Type>, names: Vec<String>) -> DbResult<Self> {
        if types.len() != names.len() {
            return Err(DbError::InvalidSchema(format!(
                "{} types but {} names",
                types.len(),
                names.len()
            )));
        }
        let columns = types
            .into_iter()
            .zip(names)
            .map(|(field_type, name)| Column::new(name, field_type))
            .collect();
        Self::from_columns(columns)
    }

    /// Build a schema whose columns have no names.
    pub fn unnamed(types: Vec<Type>) -> DbResult<Self> {
        Self::from_columns(types.into_iter().map(Column::unnamed).collect())
    }

    pub fn from_columns(columns: Vec<Column>) -> DbResult<Self> {
        if columns.is_empty() {
            return Err(DbError::InvalidSchema("schema has no columns".to_string()));
        }
        Ok(Self { columns })
    }

    pub fn num_fields(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, index: usize) -> DbResult<&Column> {
        self.columns.get(index).ok_or(DbError::IndexOutOfRange {
            index,
            len: self.columns.len(),
        })
    }

    pub fn field_name(&self, index: usize) -> DbResult<Option<&str>> {
        Ok(self.column(index)?.name.as_deref())
    }

    pub fn field_type(&self, index: usize) -> DbResult<Type> {
        Ok(self.column(index)?.field_type)
    }

    pub fn field_types(&self) -> impl Iterator<Item = Type> + '_ {
        self.columns.iter().map(|c| c.field_type)
    }

    /// Index of the first column called `name`.
    pub fn index_of(&self, name: &str) -> DbResult<usize> {
        self.columns
            .iter()
            .position(|c| c.name.as_deref() == Some(name))
            .ok_or_else(|| DbError::NotFound(format!("column '{}'", name)))
    }

    /// Bytes occupied by one row of this schema.
    pub fn byte_size(&self) -> usize {
        self.field_types().map(|t| t.byte_len()).sum()
    }

    /// Columns of `a` followed by columns of `b`.
    pub fn merge(a: &Schema, b: &Schema) -> Schema {
        let mut columns = Vec::with_capacity(a.columns.len() + b.columns.len());
        columns.extend_from_slice(&a.columns);
        columns.extend_from_slice(&b.columns);
        Schema { columns }
    }

    /// Copy of this schema whose named columns are qualified as `alias.name`.
    pub fn with_prefix(&self, alias: &str) -> Schema {
        let columns = self
            .columns
            .iter()
            .map(|c| Column {
                name: c.name.as_ref().map(|n| format!("{}.{}", alias, n)),
                field_type: c.field_type,
            })
            .collect();
        Schema { columns }
    }
}

impl PartialEq for Schema {
    fn eq(&self, other: &Self) -> bool {
        self.field_types().eq(other.field_types())
    }
}

impl Eq for Schema {}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, column) in self.columns.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(
                f,
                "{}({})",
                column.name.as_deref().unwrap_or("null"),
                column.field_type
            )?;
        }
        Ok(())
    }
}
