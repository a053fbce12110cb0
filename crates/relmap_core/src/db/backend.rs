//! The database contract consumed by the data-mapping core.

use super::{DbError, DbResult};
use crate::query::SelectParts;
use crate::schema::{ColumnSpec, IndexSpec};
use crate::value::{Row, Value};

/// Shape requested from a select execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    /// Every row.
    All,
    /// The first row, if any.
    Row,
    /// The first column of the first row.
    One,
    /// The first column of every row.
    Col,
    /// First-column value mapped to its row.
    Assoc,
    /// An iterator over the rows.
    Cursor,
}

impl FetchMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Row => "row",
            Self::One => "one",
            Self::Col => "col",
            Self::Assoc => "assoc",
            Self::Cursor => "cursor",
        }
    }
}

/// Forward-only iterator over result rows.
#[derive(Debug)]
pub struct RowCursor {
    columns: Vec<String>,
    rows: std::vec::IntoIter<Row>,
}

impl RowCursor {
    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self {
            columns,
            rows: rows.into_iter(),
        }
    }

    /// Result column names in select order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }
}

impl Iterator for RowCursor {
    type Item = Row;

    fn next(&mut self) -> Option<Self::Item> {
        self.rows.next()
    }
}

/// Result of one select execution, shaped by its [`FetchMode`].
#[derive(Debug)]
pub enum Fetched {
    All(Vec<Row>),
    Row(Option<Row>),
    One(Option<Value>),
    Col(Vec<Value>),
    Assoc(Vec<(String, Row)>),
    Cursor(RowCursor),
}

impl Fetched {
    /// Shapes raw rows according to `mode`.
    pub fn shape(mode: FetchMode, columns: Vec<String>, rows: Vec<Row>) -> Self {
        match mode {
            FetchMode::All => Self::All(rows),
            FetchMode::Row => Self::Row(rows.into_iter().next()),
            FetchMode::One => Self::One(
                rows.into_iter()
                    .next()
                    .and_then(|row| row.into_iter().next().map(|(_, value)| value)),
            ),
            FetchMode::Col => Self::Col(
                rows.into_iter()
                    .filter_map(|row| row.into_iter().next().map(|(_, value)| value))
                    .collect(),
            ),
            FetchMode::Assoc => {
                let mut mapped: Vec<(String, Row)> = Vec::with_capacity(rows.len());
                for row in rows {
                    let key = row
                        .iter()
                        .next()
                        .map(|(_, value)| value.to_text())
                        .unwrap_or_default();
                    match mapped.iter_mut().find(|(existing, _)| *existing == key) {
                        Some(slot) => slot.1 = row,
                        None => mapped.push((key, row)),
                    }
                }
                Self::Assoc(mapped)
            }
            FetchMode::Cursor => Self::Cursor(RowCursor::new(columns, rows)),
        }
    }

    pub fn into_rows(self) -> DbResult<Vec<Row>> {
        match self {
            Self::All(rows) => Ok(rows),
            Self::Cursor(cursor) => Ok(cursor.collect()),
            Self::Row(row) => Ok(row.into_iter().collect()),
            other => Err(shape_mismatch("rows", &other)),
        }
    }

    pub fn into_row(self) -> DbResult<Option<Row>> {
        match self {
            Self::Row(row) => Ok(row),
            Self::All(rows) => Ok(rows.into_iter().next()),
            other => Err(shape_mismatch("row", &other)),
        }
    }

    pub fn into_scalar(self) -> DbResult<Option<Value>> {
        match self {
            Self::One(value) => Ok(value),
            other => Err(shape_mismatch("scalar", &other)),
        }
    }

    pub fn into_col(self) -> DbResult<Vec<Value>> {
        match self {
            Self::Col(values) => Ok(values),
            other => Err(shape_mismatch("column", &other)),
        }
    }

    pub fn into_assoc(self) -> DbResult<Vec<(String, Row)>> {
        match self {
            Self::Assoc(pairs) => Ok(pairs),
            other => Err(shape_mismatch("assoc", &other)),
        }
    }

    pub fn into_cursor(self) -> DbResult<RowCursor> {
        match self {
            Self::Cursor(cursor) => Ok(cursor),
            Self::All(rows) => Ok(RowCursor::new(Vec::new(), rows)),
            other => Err(shape_mismatch("cursor", &other)),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::All(_) => "all",
            Self::Row(_) => "row",
            Self::One(_) => "one",
            Self::Col(_) => "col",
            Self::Assoc(_) => "assoc",
            Self::Cursor(_) => "cursor",
        }
    }
}

fn shape_mismatch(wanted: &str, got: &Fetched) -> DbError {
    DbError::InvalidData(format!(
        "expected {wanted} result, got `{}` result",
        got.kind()
    ))
}

/// Database operations required by the query builder, tables and records.
///
/// Condition lists passed to `update`/`delete` are already rendered: the
/// first entry is bare, later ones carry their `AND`/`OR` prefix.
pub trait Backend {
    /// Executes a select built from `parts` with named/positional `binds`.
    fn select(&self, mode: FetchMode, parts: &SelectParts, binds: &Row) -> DbResult<Fetched>;

    /// Inserts one row; returns the affected row count.
    fn insert(&self, table: &str, data: &Row) -> DbResult<usize>;

    /// Updates rows matching `conds`; returns the affected row count.
    fn update(&self, table: &str, data: &Row, conds: &[String]) -> DbResult<usize>;

    /// Deletes rows matching `conds`; returns the affected row count.
    fn delete(&self, table: &str, conds: &[String]) -> DbResult<usize>;

    /// Names of existing user tables.
    fn list_tables(&self) -> DbResult<Vec<String>>;

    fn create_table(&self, table: &str, cols: &[ColumnSpec]) -> DbResult<()>;

    fn create_index(&self, table: &str, index: &IndexSpec) -> DbResult<()>;

    fn drop_table(&self, table: &str) -> DbResult<()>;

    /// Advances and returns the named sequence, starting at 1.
    fn next_sequence(&self, name: &str) -> DbResult<i64>;

    /// Renders a value as an SQL literal.
    fn quote(&self, value: &Value) -> String;
}

#[cfg(test)]
mod tests {
    use super::{FetchMode, Fetched};
    use crate::value::{Row, Value};

    fn rows() -> Vec<Row> {
        vec![
            Row::new().with("handle", "zim").with("id", 1),
            Row::new().with("handle", "dib").with("id", 2),
        ]
    }

    #[test]
    fn shape_one_takes_first_column_of_first_row() {
        let fetched = Fetched::shape(FetchMode::One, Vec::new(), rows());
        assert_eq!(fetched.into_scalar().unwrap(), Some(Value::from("zim")));
    }

    #[test]
    fn shape_assoc_keys_by_first_column() {
        let fetched = Fetched::shape(FetchMode::Assoc, Vec::new(), rows());
        let pairs = fetched.into_assoc().unwrap();
        assert_eq!(pairs[0].0, "zim");
        assert_eq!(pairs[1].1.value("id"), Value::Integer(2));
    }

    #[test]
    fn mismatched_shape_is_invalid_data() {
        let fetched = Fetched::shape(FetchMode::Col, Vec::new(), rows());
        assert!(fetched.into_row().is_err());
    }
}
