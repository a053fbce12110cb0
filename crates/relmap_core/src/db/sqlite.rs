//! SQLite implementation of [`Backend`].
//!
//! # Responsibility
//! - Render and execute statements on one `rusqlite::Connection`.
//! - Keep a statement profile for diagnostics and query counting.
//!
//! # Invariants
//! - Named binds that the statement does not reference are skipped.
//! - Sequence state lives in [`SEQUENCE_TABLE`], hidden from `list_tables`.

use super::backend::{Backend, FetchMode, Fetched};
use super::{DbError, DbResult};
use crate::query::SelectParts;
use crate::schema::{ColumnSpec, ColumnType, IndexKind, IndexSpec};
use crate::value::{Row, Value};
use log::{debug, warn};
use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::{params_from_iter, Connection, ToSql};
use std::cell::RefCell;
use std::time::Instant;

/// Internal table holding named sequence counters.
pub const SEQUENCE_TABLE: &str = "relmap_sequences";

/// SQLite-backed database handle.
pub struct SqliteBackend {
    conn: Connection,
    profile: RefCell<Vec<String>>,
}

impl SqliteBackend {
    /// Wraps an already configured connection.
    pub fn new(conn: Connection) -> Self {
        Self {
            conn,
            profile: RefCell::new(Vec::new()),
        }
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Every statement executed through this handle, oldest first.
    pub fn profile(&self) -> Vec<String> {
        self.profile.borrow().clone()
    }

    pub fn profile_len(&self) -> usize {
        self.profile.borrow().len()
    }

    pub fn clear_profile(&self) {
        self.profile.borrow_mut().clear();
    }

    fn track(&self, sql: &str) {
        self.profile.borrow_mut().push(sql.to_string());
    }

    fn query_rows(&self, sql: &str, binds: &Row) -> DbResult<(Vec<String>, Vec<Row>)> {
        self.track(sql);
        let mut stmt = self
            .conn
            .prepare(sql)
            .map_err(|err| DbError::query_failed(sql, err))?;

        for (key, value) in binds.iter() {
            let index = match key.parse::<usize>() {
                Ok(position) => Some(position),
                Err(_) => {
                    let name = if key.starts_with(':') {
                        key.to_string()
                    } else {
                        format!(":{key}")
                    };
                    stmt.parameter_index(&name)
                        .map_err(|err| DbError::query_failed(sql, err))?
                }
            };
            if let Some(index) = index {
                stmt.raw_bind_parameter(index, value)
                    .map_err(|err| DbError::query_failed(sql, err))?;
            }
        }

        let columns = stmt
            .column_names()
            .into_iter()
            .map(String::from)
            .collect::<Vec<_>>();
        let mut rows = stmt.raw_query();
        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(|err| DbError::query_failed(sql, err))? {
            let mut data = Row::new();
            for (index, name) in columns.iter().enumerate() {
                let value = row
                    .get_ref(index)
                    .map_err(|err| DbError::query_failed(sql, err))?;
                data.set(name.clone(), value_from_ref(value));
            }
            out.push(data);
        }

        Ok((columns, out))
    }

    fn execute(&self, sql: &str, params: Vec<&Value>) -> DbResult<usize> {
        self.track(sql);
        let started_at = Instant::now();
        match self.conn.execute(sql, params_from_iter(params)) {
            Ok(changed) => {
                debug!(
                    "event=statement_execute module=db status=ok changed={} duration_ms={}",
                    changed,
                    started_at.elapsed().as_millis()
                );
                Ok(changed)
            }
            Err(err) => {
                warn!(
                    "event=statement_execute module=db status=error duration_ms={} error={}",
                    started_at.elapsed().as_millis(),
                    err
                );
                Err(DbError::query_failed(sql, err))
            }
        }
    }

    fn execute_batch(&self, sql: &str) -> DbResult<()> {
        self.track(sql);
        self.conn
            .execute_batch(sql)
            .map_err(|err| DbError::query_failed(sql, err))
    }
}

impl Backend for SqliteBackend {
    fn select(&self, mode: FetchMode, parts: &SelectParts, binds: &Row) -> DbResult<Fetched> {
        let sql = parts.to_sql();
        let started_at = Instant::now();
        match self.query_rows(&sql, binds) {
            Ok((columns, rows)) => {
                debug!(
                    "event=select_fetch module=db status=ok mode={} rows={} binds={} duration_ms={}",
                    mode.as_str(),
                    rows.len(),
                    binds.len(),
                    started_at.elapsed().as_millis()
                );
                Ok(Fetched::shape(mode, columns, rows))
            }
            Err(err) => {
                warn!(
                    "event=select_fetch module=db status=error mode={} duration_ms={} error={}",
                    mode.as_str(),
                    started_at.elapsed().as_millis(),
                    err.diagnostic()
                );
                Err(err)
            }
        }
    }

    fn insert(&self, table: &str, data: &Row) -> DbResult<usize> {
        let cols = data.keys().collect::<Vec<_>>().join(", ");
        let placeholders = (1..=data.len())
            .map(|index| format!("?{index}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!("INSERT INTO {table} ({cols}) VALUES ({placeholders})");
        self.execute(&sql, data.iter().map(|(_, value)| value).collect())
    }

    fn update(&self, table: &str, data: &Row, conds: &[String]) -> DbResult<usize> {
        if data.is_empty() {
            return Ok(0);
        }
        let assignments = data
            .keys()
            .enumerate()
            .map(|(index, col)| format!("{col} = ?{}", index + 1))
            .collect::<Vec<_>>()
            .join(", ");
        let mut sql = format!("UPDATE {table} SET {assignments}");
        push_where(&mut sql, conds);
        self.execute(&sql, data.iter().map(|(_, value)| value).collect())
    }

    fn delete(&self, table: &str, conds: &[String]) -> DbResult<usize> {
        let mut sql = format!("DELETE FROM {table}");
        push_where(&mut sql, conds);
        self.execute(&sql, Vec::new())
    }

    fn list_tables(&self) -> DbResult<Vec<String>> {
        let sql = format!(
            "SELECT name FROM sqlite_master
             WHERE type = 'table'
               AND name NOT LIKE 'sqlite_%'
               AND name <> '{SEQUENCE_TABLE}'
             ORDER BY name"
        );
        let (_, rows) = self.query_rows(&sql, &Row::new())?;
        Ok(rows.into_iter().map(|row| row.value("name").to_text()).collect())
    }

    fn create_table(&self, table: &str, cols: &[ColumnSpec]) -> DbResult<()> {
        let defs = cols.iter().map(column_ddl).collect::<Vec<_>>().join(",\n    ");
        let sql = format!("CREATE TABLE {table} (\n    {defs}\n)");
        self.execute_batch(&sql)
    }

    fn create_index(&self, table: &str, index: &IndexSpec) -> DbResult<()> {
        let unique = match index.kind {
            IndexKind::Unique => "UNIQUE ",
            IndexKind::Normal => "",
        };
        let sql = format!(
            "CREATE {unique}INDEX {table}__{} ON {table} ({})",
            index.name,
            index.columns().join(", ")
        );
        self.execute_batch(&sql)
    }

    fn drop_table(&self, table: &str) -> DbResult<()> {
        self.execute_batch(&format!("DROP TABLE IF EXISTS {table}"))
    }

    fn next_sequence(&self, name: &str) -> DbResult<i64> {
        self.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {SEQUENCE_TABLE} (
                name TEXT PRIMARY KEY,
                value INTEGER NOT NULL
            )"
        ))?;
        let name_value = Value::from(name);
        self.execute(
            &format!(
                "INSERT INTO {SEQUENCE_TABLE} (name, value) VALUES (?1, 1)
                 ON CONFLICT(name) DO UPDATE SET value = value + 1"
            ),
            vec![&name_value],
        )?;
        let (_, rows) = self.query_rows(
            &format!("SELECT value FROM {SEQUENCE_TABLE} WHERE name = :name"),
            &Row::new().with("name", name),
        )?;
        rows.first()
            .and_then(|row| row.value("value").as_i64())
            .ok_or_else(|| DbError::InvalidData(format!("sequence `{name}` has no value")))
    }

    fn quote(&self, value: &Value) -> String {
        match value {
            Value::Null => "NULL".to_string(),
            Value::Bool(flag) => i64::from(*flag).to_string(),
            Value::Integer(number) => number.to_string(),
            Value::Float(number) => number.to_string(),
            Value::Text(text) => format!("'{}'", text.replace('\'', "''")),
        }
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Owned(rusqlite::types::Value::Null),
            Value::Bool(flag) => ToSqlOutput::Owned(rusqlite::types::Value::Integer(i64::from(*flag))),
            Value::Integer(number) => ToSqlOutput::Owned(rusqlite::types::Value::Integer(*number)),
            Value::Float(number) => ToSqlOutput::Owned(rusqlite::types::Value::Real(*number)),
            Value::Text(text) => ToSqlOutput::Borrowed(ValueRef::Text(text.as_bytes())),
        })
    }
}

fn value_from_ref(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(number) => Value::Integer(number),
        ValueRef::Real(number) => Value::Float(number),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            Value::Text(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}

fn push_where(sql: &mut String, conds: &[String]) {
    if conds.is_empty() {
        return;
    }
    sql.push_str(" WHERE ");
    sql.push_str(&conds.join(" "));
}

fn column_ddl(col: &ColumnSpec) -> String {
    let size = col.size.unwrap_or(0);
    let scope = col.scope.unwrap_or(0);
    let sql_type = match col.kind {
        ColumnType::Bool => "BOOLEAN".to_string(),
        ColumnType::Char => format!("CHAR({size})"),
        ColumnType::Varchar => format!("VARCHAR({size})"),
        ColumnType::Smallint => "SMALLINT".to_string(),
        ColumnType::Int => "INTEGER".to_string(),
        ColumnType::Bigint => "BIGINT".to_string(),
        ColumnType::Float => "DOUBLE".to_string(),
        ColumnType::Numeric => format!("NUMERIC({size},{scope})"),
        ColumnType::Date => "CHAR(10)".to_string(),
        ColumnType::Time => "CHAR(8)".to_string(),
        ColumnType::Timestamp => "CHAR(19)".to_string(),
    };

    let mut ddl = format!("{} {sql_type}", col.name);
    if col.required {
        ddl.push_str(" NOT NULL");
    }
    if col.primary {
        ddl.push_str(" PRIMARY KEY");
    }
    ddl
}

#[cfg(test)]
mod tests {
    use super::column_ddl;
    use crate::db::{open_db_in_memory, Backend};
    use crate::schema::{ColumnSpec, ColumnType};
    use crate::value::Value;

    #[test]
    fn column_ddl_maps_types_and_flags() {
        let col = ColumnSpec::new("name", ColumnType::Varchar).size(32).required();
        assert_eq!(column_ddl(&col), "name VARCHAR(32) NOT NULL");

        let col = ColumnSpec::new("price", ColumnType::Numeric).size(7).scope(2);
        assert_eq!(column_ddl(&col), "price NUMERIC(7,2)");
    }

    #[test]
    fn sequences_start_at_one_and_stay_hidden() {
        let backend = open_db_in_memory().unwrap();
        assert_eq!(backend.next_sequence("users__id").unwrap(), 1);
        assert_eq!(backend.next_sequence("users__id").unwrap(), 2);
        assert_eq!(backend.next_sequence("nodes__id").unwrap(), 1);
        assert!(backend.list_tables().unwrap().is_empty());
    }

    #[test]
    fn quote_escapes_single_quotes() {
        let backend = open_db_in_memory().unwrap();
        assert_eq!(backend.quote(&Value::from("it's")), "'it''s'");
        assert_eq!(backend.quote(&Value::Null), "NULL");
        assert_eq!(backend.quote(&Value::Bool(true)), "1");
    }
}
