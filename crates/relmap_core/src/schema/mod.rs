//! Table schema, auto-creation and row validation.
//!
//! # Responsibility
//! - Own column/index metadata for one table.
//! - Gate every write through recasting and validation.
//!
//! # Invariants
//! - Validation failures are reported as one aggregate per write; nothing
//!   is written when any field fails.

use crate::db::DbError;
use std::error::Error;
use std::fmt::{Display, Formatter};

mod column;
mod table;
mod valid;

pub use column::{ColumnSpec, ColumnType, DefaultValue, IndexKind, IndexSpec, ISO_TIMESTAMP_FORMAT};
pub use table::{now_stamp, table_name_from, Table, TableSpec, CREATED_COL, UPDATED_COL};
pub use valid::{
    auto_valid, in_scope, is_iso_date, is_iso_time, is_iso_timestamp, Rule, ValidRule,
    ValidationError, MSG_NOT_BLANK,
};

pub type TableResult<T> = Result<T, TableError>;

#[derive(Debug)]
pub enum TableError {
    Validation(ValidationError),
    Db(DbError),
    /// The declared schema cannot be normalized.
    InvalidSpec(String),
}

impl Display for TableError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidSpec(message) => write!(f, "invalid table spec: {message}"),
        }
    }
}

impl Error for TableError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::InvalidSpec(_) => None,
        }
    }
}

impl From<ValidationError> for TableError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for TableError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}
