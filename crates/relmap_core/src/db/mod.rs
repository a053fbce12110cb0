//! Database backend contract and the SQLite implementation.
//!
//! # Responsibility
//! - Define what the data-mapping core needs from a database ([`Backend`]).
//! - Open and configure SQLite connections that satisfy that contract.
//!
//! # Invariants
//! - Statement failures surface as [`DbError::QueryFailed`] carrying the
//!   backend's own diagnostic text; nothing is retried.
//! - One backend handle is shared by every table, select and record built
//!   from it.

use std::error::Error;
use std::fmt::{Display, Formatter};

mod backend;
mod open;
mod sqlite;

pub use backend::{Backend, FetchMode, Fetched, RowCursor};
pub use open::{open_db, open_db_in_memory};
pub use sqlite::{SqliteBackend, SEQUENCE_TABLE};

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug)]
pub enum DbError {
    /// Connection or bootstrap failure.
    Sqlite(rusqlite::Error),
    /// A statement failed at the backend.
    QueryFailed { sql: String, message: String },
    /// A result could not be decoded into the requested shape.
    InvalidData(String),
}

impl DbError {
    pub(crate) fn query_failed(sql: &str, err: impl Display) -> Self {
        Self::QueryFailed {
            sql: sql.to_string(),
            message: err.to_string(),
        }
    }

    /// The backend's native diagnostic text.
    pub fn diagnostic(&self) -> String {
        match self {
            Self::Sqlite(err) => err.to_string(),
            Self::QueryFailed { message, .. } => message.clone(),
            Self::InvalidData(message) => message.clone(),
        }
    }
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::QueryFailed { sql, message } => write!(f, "query failed: {message} [{sql}]"),
            Self::InvalidData(message) => write!(f, "invalid result data: {message}"),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::QueryFailed { .. } => None,
            Self::InvalidData(_) => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}
