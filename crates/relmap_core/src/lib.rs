//! Relational data-mapping core for relmap.
//! Query building, table schemas with validation, and active records with
//! lazily or eagerly loaded relations, over a pluggable database backend.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod query;
pub mod schema;
pub mod value;

pub use config::{CoreConfig, LoggingConfig};
pub use db::{open_db, open_db_in_memory, Backend, DbError, DbResult, FetchMode, SqliteBackend};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::{
    Catalog, Collection, FetchParams, Model, ModelError, ModelResult, ModelSpec, Record,
    RecordHooks, RecordStatus, RelatedValue, RelationKind, RelationSpec, SaveOutcome,
};
pub use query::{Cond, Conj, Names, PageInfo, Select};
pub use schema::{
    ColumnSpec, ColumnType, IndexSpec, Rule, Table, TableError, TableResult, TableSpec,
    ValidationError,
};
pub use value::{Row, Value};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, ping};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
