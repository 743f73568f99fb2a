//! Hash-based aggregation over a single value column.
//!
//! The operator drains its child completely on `open`, folding each row into
//! a per-group accumulator, and then serves the materialized results. It
//! supports:
//! - An optional single grouping column of any type
//! - COUNT over any column; SUM, AVG, MIN and MAX over numeric columns
//! - 64-bit accumulation with a checked narrowing to the 32-bit output

use crate::access::{Column, Field, Row, Schema, Type};
use crate::error::{DbError, DbResult};
use crate::executor::RowStream;
use log::debug;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Supported reductions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateOp {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateOp {
    pub fn name(&self) -> &'static str {
        match self {
            AggregateOp::Count => "COUNT",
            AggregateOp::Sum => "SUM",
            AggregateOp::Avg => "AVG",
            AggregateOp::Min => "MIN",
            AggregateOp::Max => "MAX",
        }
    }
}

impl fmt::Display for AggregateOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AggregateOp {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "COUNT" => Ok(AggregateOp::Count),
            "SUM" => Ok(AggregateOp::Sum),
            "AVG" => Ok(AggregateOp::Avg),
            "MIN" => Ok(AggregateOp::Min),
            "MAX" => Ok(AggregateOp::Max),
            other => Err(DbError::UnsupportedOperation(format!(
                "unknown aggregate {}",
                other
            ))),
        }
    }
}

/// Running state of one group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Accumulator {
    Count(i64),
    Scalar(i64),
    Avg { count: i64, sum: i64 },
}

impl Accumulator {
    /// State after the first row of a group.
    fn start(op: AggregateOp, value: Option<&Field>, column: usize) -> DbResult<Self> {
        Ok(match op {
            AggregateOp::Count => Accumulator::Count(1),
            AggregateOp::Sum | AggregateOp::Min | AggregateOp::Max => {
                Accumulator::Scalar(numeric(value, column)?)
            }
            AggregateOp::Avg => Accumulator::Avg {
                count: 1,
                sum: numeric(value, column)?,
            },
        })
    }

    fn update(&mut self, op: AggregateOp, value: Option<&Field>, column: usize) -> DbResult<()> {
        match (op, self) {
            (AggregateOp::Count, Accumulator::Count(n)) => *n += 1,
            (AggregateOp::Sum, Accumulator::Scalar(total)) => {
                *total = total.saturating_add(numeric(value, column)?);
            }
            (AggregateOp::Min, Accumulator::Scalar(min)) => {
                *min = (*min).min(numeric(value, column)?);
            }
            (AggregateOp::Max, Accumulator::Scalar(max)) => {
                *max = (*max).max(numeric(value, column)?);
            }
            (AggregateOp::Avg, Accumulator::Avg { count, sum }) => {
                *count += 1;
                *sum = sum.saturating_add(numeric(value, column)?);
            }
            (op, state) => {
                return Err(DbError::UnsupportedOperation(format!(
                    "{} cannot update {:?}",
                    op, state
                )));
            }
        }
        Ok(())
    }

    /// Final value; averages round toward negative infinity.
    fn finish(&self) -> DbResult<i32> {
        let value = match *self {
            Accumulator::Count(n) => n,
            Accumulator::Scalar(v) => v,
            Accumulator::Avg { count, sum } => sum.div_euclid(count),
        };
        i32::try_from(value).map_err(|_| DbError::Overflow(value))
    }
}

fn numeric(value: Option<&Field>, column: usize) -> DbResult<i64> {
    match value {
        Some(Field::Int(v)) => Ok(i64::from(*v)),
        Some(other) => Err(DbError::UnsupportedOperation(format!(
            "column {} holds non-numeric value {}",
            column, other
        ))),
        None => Err(DbError::UnsetField(column)),
    }
}

/// Groups the rows of a child stream and reduces one column per group.
///
/// Output rows are `(group value, result)` when grouping and `(result)`
/// otherwise. Group order is unspecified. An ungrouped aggregate over an
/// empty child produces no rows.
pub struct Aggregate<'a> {
    child: Box<dyn RowStream + 'a>,
    value_column: usize,
    group_column: Option<usize>,
    op: AggregateOp,
    schema: Arc<Schema>,
    results: Vec<Row>,
    cursor: usize,
    is_open: bool,
}

impl<'a> Aggregate<'a> {
    pub fn new(
        child: Box<dyn RowStream + 'a>,
        value_column: usize,
        group_column: Option<usize>,
        op: AggregateOp,
    ) -> DbResult<Self> {
        let child_schema = Arc::clone(child.schema());
        let value_type = child_schema.field_type(value_column)?;
        if op != AggregateOp::Count && !value_type.is_numeric() {
            return Err(DbError::UnsupportedOperation(format!(
                "{} over {} column {}",
                op, value_type, value_column
            )));
        }

        let value_name = match child_schema.field_name(value_column)? {
            Some(name) => format!("{}({})", op, name),
            None => format!("{}({})", op, value_column),
        };
        let mut columns = Vec::with_capacity(2);
        if let Some(group) = group_column {
            columns.push(child_schema.column(group)?.clone());
        }
        columns.push(Column::new(value_name, Type::Int));

        Ok(Self {
            child,
            value_column,
            group_column,
            op,
            schema: Arc::new(Schema::from_columns(columns)?),
            results: Vec::new(),
            cursor: 0,
            is_open: false,
        })
    }

    pub fn op(&self) -> AggregateOp {
        self.op
    }

    pub fn value_column(&self) -> usize {
        self.value_column
    }

    pub fn group_column(&self) -> Option<usize> {
        self.group_column
    }

    /// Name of the grouping column in the output, if grouping.
    pub fn group_field_name(&self) -> Option<&str> {
        self.group_column
            .and_then(|_| self.schema.columns().first())
            .and_then(|c| c.name.as_deref())
    }

    /// Name of the result column, e.g. `SUM(price)`.
    pub fn aggregate_field_name(&self) -> &str {
        self.schema
            .columns()
            .last()
            .and_then(|c| c.name.as_deref())
            .unwrap_or_default()
    }

    fn consume_child(&mut self) -> DbResult<Vec<Row>> {
        let mut groups: HashMap<Option<Field>, Accumulator> = HashMap::new();
        let mut seen = 0usize;

        while let Some(row) = self.child.next()? {
            let key = match self.group_column {
                Some(group) => Some(row.get(group)?.cloned().ok_or(DbError::UnsetField(group))?),
                None => None,
            };
            let value = row.get(self.value_column)?;
            match groups.get_mut(&key) {
                Some(acc) => acc.update(self.op, value, self.value_column)?,
                None => {
                    let acc = Accumulator::start(self.op, value, self.value_column)?;
                    groups.insert(key, acc);
                }
            }
            seen += 1;
        }
        debug!(
            "{} aggregated {} rows into {} groups",
            self.aggregate_field_name(),
            seen,
            groups.len()
        );

        groups
            .into_iter()
            .map(|(key, acc)| {
                let mut fields = Vec::with_capacity(2);
                fields.extend(key);
                fields.push(Field::Int(acc.finish()?));
                Row::from_fields(Arc::clone(&self.schema), fields)
            })
            .collect()
    }
}

impl RowStream for Aggregate<'_> {
    fn open(&mut self) -> DbResult<()> {
        self.child.open()?;
        self.results = self.consume_child()?;
        self.cursor = 0;
        self.is_open = true;
        Ok(())
    }

    fn next(&mut self) -> DbResult<Option<Row>> {
        if !self.is_open {
            return Err(DbError::StreamNotOpen);
        }
        let row = self.results.get(self.cursor).cloned();
        if row.is_some() {
            self.cursor += 1;
        }
        Ok(row)
    }

    fn rewind(&mut self) -> DbResult<()> {
        if !self.is_open {
            return Err(DbError::StreamNotOpen);
        }
        self.cursor = 0;
        Ok(())
    }

    fn close(&mut self) {
        self.results.clear();
        self.cursor = 0;
        self.is_open = false;
        self.child.close();
    }

    fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }
}
