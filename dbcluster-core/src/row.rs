//! Driver-neutral rows, cursors, and exec results.

use std::sync::Arc;

use crate::value::{FromValue, Value};

/// One decoded result row.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<Value>,
}

/// Column lookup by position or by name.
pub trait RowIndex {
    fn position(&self, row: &Row) -> sqlx::Result<usize>;
}

impl RowIndex for usize {
    fn position(&self, row: &Row) -> sqlx::Result<usize> {
        if *self < row.values.len() {
            Ok(*self)
        } else {
            Err(sqlx::Error::ColumnIndexOutOfBounds {
                index: *self,
                len: row.values.len(),
            })
        }
    }
}

impl RowIndex for &str {
    fn position(&self, row: &Row) -> sqlx::Result<usize> {
        row.columns
            .iter()
            .position(|c| c.as_str() == *self)
            .ok_or_else(|| sqlx::Error::ColumnNotFound((*self).to_string()))
    }
}

impl Row {
    pub fn new<I, S>(columns: I, values: Vec<Value>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_shared_columns(columns.into_iter().map(Into::into).collect(), values)
    }

    /// Rows of one result set share their column list.
    pub(crate) fn with_shared_columns(columns: Arc<[String]>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Decode one column into `T`.
    pub fn get<T: FromValue, I: RowIndex>(&self, index: I) -> sqlx::Result<T> {
        let position = index.position(self)?;
        T::from_value(&self.values[position]).map_err(|e| sqlx::Error::ColumnDecode {
            index: self.columns.get(position).cloned().unwrap_or_else(|| position.to_string()),
            source: Box::new(e),
        })
    }
}

/// Result set of a read query, fully fetched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Rows {
    rows: Vec<Row>,
}

impl Rows {
    pub fn new(rows: Vec<Row>) -> Self {
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Row> {
        self.rows.iter()
    }

    pub fn into_vec(self) -> Vec<Row> {
        self.rows
    }
}

impl IntoIterator for Rows {
    type Item = Row;
    type IntoIter = std::vec::IntoIter<Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

impl<'a> IntoIterator for &'a Rows {
    type Item = &'a Row;
    type IntoIter = std::slice::Iter<'a, Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

/// Outcome of a single-row read, held until the caller scans it.
///
/// Query failures and "no row" both surface from [`scan`](Self::scan) /
/// [`into_row`](Self::into_row), never from the call that produced the handle.
#[derive(Debug)]
pub struct RowHandle {
    result: sqlx::Result<Option<Row>>,
}

impl RowHandle {
    pub(crate) fn new(result: sqlx::Result<Option<Row>>) -> Self {
        Self { result }
    }

    pub fn into_row(self) -> sqlx::Result<Row> {
        match self.result {
            Ok(Some(row)) => Ok(row),
            Ok(None) => Err(sqlx::Error::RowNotFound),
            Err(e) => Err(e),
        }
    }

    /// Decode the first column.
    pub fn scan<T: FromValue>(self) -> sqlx::Result<T> {
        self.into_row()?.get(0_usize)
    }
}

/// What a write statement reported back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecResult {
    pub rows_affected: u64,
    /// Auto-increment id generated by the statement, 0 when none
    pub last_insert_id: u64,
}
