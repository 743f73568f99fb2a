use crate::access::schema::Schema;
use crate::access::types::{Field, TEXT_LEN};
use crate::error::{DbError, DbResult};
use crate::storage::page::PageId;
use std::fmt;
use std::sync::Arc;

/// Physical position of a row: the page holding it and its slot index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordLocation {
    pub page_id: PageId,
    pub slot: usize,
}

impl RecordLocation {
    pub fn new(page_id: PageId, slot: usize) -> Self {
        Self { page_id, slot }
    }
}

/// A fixed-arity vector of fields shaped by a schema.
///
/// Rows compare equal when their field values are equal; the schema and the
/// record location do not take part.
#[derive(Debug, Clone)]
pub struct Row {
    schema: Arc<Schema>,
    fields: Vec<Option<Field>>,
    location: Option<RecordLocation>,
}

impl Row {
    /// A row with every field unset.
    pub fn new(schema: Arc<Schema>) -> Self {
        let fields = vec![None; schema.num_fields()];
        Self {
            schema,
            fields,
            location: None,
        }
    }

    /// A row with every field set from `fields`.
    pub fn from_fields(schema: Arc<Schema>, fields: Vec<Field>) -> DbResult<Self> {
        if fields.len() != schema.num_fields() {
            return Err(DbError::InvalidSchema(format!(
                "{} fields for a schema of {} columns",
                fields.len(),
                schema.num_fields()
            )));
        }
        let mut row = Row::new(schema);
        for (i, field) in fields.into_iter().enumerate() {
            row.set(i, field)?;
        }
        Ok(row)
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn num_fields(&self) -> usize {
        self.fields.len()
    }

    pub fn get(&self, index: usize) -> DbResult<Option<&Field>> {
        self.fields
            .get(index)
            .map(Option::as_ref)
            .ok_or(DbError::IndexOutOfRange {
                index,
                len: self.fields.len(),
            })
    }

    /// Set field `index`. Text longer than [`TEXT_LEN`] bytes is truncated
    /// here, so a stored row always matches what its page decodes to.
    pub fn set(&mut self, index: usize, field: Field) -> DbResult<()> {
        let expected = self.schema.field_type(index)?;
        if field.field_type() != expected {
            return Err(DbError::TypeMismatch {
                index,
                expected,
                found: field.field_type(),
            });
        }
        let field = match field {
            Field::Text(s) if s.len() > TEXT_LEN => Field::text(s),
            field => field,
        };
        self.fields[index] = Some(field);
        Ok(())
    }

    pub fn fields(&self) -> impl Iterator<Item = Option<&Field>> + '_ {
        self.fields.iter().map(Option::as_ref)
    }

    /// Index of the first unset field, if any.
    pub(crate) fn first_unset(&self) -> Option<usize> {
        self.fields.iter().position(Option::is_none)
    }

    pub fn location(&self) -> Option<RecordLocation> {
        self.location
    }

    pub(crate) fn set_location(&mut self, location: Option<RecordLocation>) {
        self.location = location;
    }

    /// The same row viewed through `schema`, which must have the same column
    /// types.
    pub(crate) fn with_schema(mut self, schema: Arc<Schema>) -> Row {
        debug_assert!(*schema == *self.schema);
        self.schema = schema;
        self
    }

    /// Fields of `a` followed by fields of `b`, over the merged schema.
    pub fn merge(a: &Row, b: &Row) -> Row {
        let schema = Arc::new(Schema::merge(&a.schema, &b.schema));
        let fields = a.fields.iter().chain(b.fields.iter()).cloned().collect();
        Row {
            schema,
            fields,
            location: None,
        }
    }
}

impl PartialEq for Row {
    fn eq(&self, other: &Self) -> bool {
        self.fields == other.fields
    }
}

impl Eq for Row {}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, "\t")?;
            }
            match field {
                Some(field) => write!(f, "{}", field)?,
                None => write!(f, "null")?,
            }
        }
        Ok(())
    }
}
