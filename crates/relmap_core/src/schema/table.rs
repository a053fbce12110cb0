//! Table schema ownership, auto-creation and validated writes.
//!
//! # Responsibility
//! - Normalize a declared [`TableSpec`] into fully populated metadata.
//! - Create the table and its indexes when missing.
//! - Recast and validate every row before INSERT/UPDATE.
//!
//! # Invariants
//! - Every normalized table carries `id`, `created` and `updated` unless
//!   the declaration names them itself.
//! - A failed index creation drops the freshly created table.
//! - Primary-key values never change through `update`.

use super::column::{ColumnSpec, ColumnType, DefaultValue, IndexSpec, ISO_TIMESTAMP_FORMAT};
use super::valid::{auto_valid, Rule, ValidationError};
use super::{TableError, TableResult};
use crate::config::CoreConfig;
use crate::db::{Backend, DbResult, FetchMode, Fetched};
use crate::query::{render_conds, Cond, Conj, Names, Select};
use crate::value::{Row, Value};
use log::{debug, error, info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt::{Debug, Formatter};
use std::rc::Rc;

static CAMEL_BOUNDARY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([a-z0-9])([A-Z])").expect("valid camel boundary regex"));
static IDENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z_][a-z0-9_]*$").expect("valid identifier regex"));

pub const CREATED_COL: &str = "created";
pub const UPDATED_COL: &str = "updated";

/// `BlogPost` becomes `blog_post`.
pub fn table_name_from(model_name: &str) -> String {
    CAMEL_BOUNDARY_RE
        .replace_all(model_name.trim(), "${1}_${2}")
        .to_ascii_lowercase()
}

/// Current local time in the persisted timestamp format.
pub fn now_stamp() -> String {
    chrono::Local::now().format(ISO_TIMESTAMP_FORMAT).to_string()
}

/// Declared schema of one table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableSpec {
    pub name: String,
    pub cols: Vec<ColumnSpec>,
    pub indexes: Vec<IndexSpec>,
    /// Rows per page; falls back to the core configuration.
    pub paging: Option<u32>,
}

impl TableSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn from_json(text: &str) -> TableResult<Self> {
        serde_json::from_str(text)
            .map_err(|err| TableError::InvalidSpec(format!("table spec json: {err}")))
    }

    pub fn col(mut self, col: ColumnSpec) -> Self {
        self.cols.push(col);
        self
    }

    pub fn index(mut self, index: IndexSpec) -> Self {
        self.indexes.push(index);
        self
    }

    pub fn with_paging(mut self, paging: u32) -> Self {
        self.paging = Some(paging);
        self
    }

    /// Fills defaults, injects the bookkeeping columns and checks the result.
    pub fn normalize(mut self) -> TableResult<Self> {
        self.name = self.name.trim().to_ascii_lowercase();
        if !IDENT_RE.is_match(&self.name) {
            return Err(TableError::InvalidSpec(format!(
                "invalid table name `{}`",
                self.name
            )));
        }

        let mut cols = Vec::new();
        let mut indexes = Vec::new();
        if !self.has_col("id") {
            cols.push(
                ColumnSpec::new("id", ColumnType::Int)
                    .primary()
                    .required()
                    .autoinc(),
            );
            indexes.push(IndexSpec::unique("id"));
        }
        for stamp in [CREATED_COL, UPDATED_COL] {
            if !self.has_col(stamp) {
                cols.push(
                    ColumnSpec::new(stamp, ColumnType::Timestamp).default_value(DefaultValue::now()),
                );
                indexes.push(IndexSpec::normal(stamp));
            }
        }
        cols.append(&mut self.cols);
        indexes.append(&mut self.indexes);
        self.cols = cols;
        self.indexes = indexes;

        let mut seen = HashSet::new();
        for col in &mut self.cols {
            col.name = col.name.trim().to_string();
            if !IDENT_RE.is_match(&col.name) {
                return Err(invalid_col(&self.name, &col.name, "invalid column name"));
            }
            if !seen.insert(col.name.clone()) {
                return Err(invalid_col(&self.name, &col.name, "declared twice"));
            }
            col.fill_defaults();
            col.default
                .check()
                .map_err(|message| invalid_col(&self.name, &col.name, &message))?;
            for rule in &col.valid {
                if let Rule::Regex { pattern } = &rule.rule {
                    Regex::new(pattern)
                        .map_err(|err| invalid_col(&self.name, &col.name, &err.to_string()))?;
                }
            }
        }

        let mut index_names = HashSet::new();
        for index in &self.indexes {
            if !index_names.insert(index.name.clone()) {
                return Err(TableError::InvalidSpec(format!(
                    "index `{}` declared twice on `{}`",
                    index.name, self.name
                )));
            }
            if let Some(missing) = index.columns().into_iter().find(|col| !seen.contains(col)) {
                return Err(TableError::InvalidSpec(format!(
                    "index `{}` on `{}` names unknown column `{missing}`",
                    index.name, self.name
                )));
            }
        }

        self.paging = self.paging.map(|paging| paging.max(1));
        Ok(self)
    }

    fn has_col(&self, name: &str) -> bool {
        self.cols.iter().any(|col| col.name == name)
    }
}

fn invalid_col(table: &str, col: &str, message: &str) -> TableError {
    TableError::InvalidSpec(format!("column `{table}.{col}`: {message}"))
}

/// A normalized table bound to a backend.
pub struct Table {
    spec: TableSpec,
    backend: Rc<dyn Backend>,
    paging: u32,
}

impl Table {
    /// Normalizes `spec` and, when configured, creates the table.
    pub fn new(spec: TableSpec, backend: Rc<dyn Backend>, config: &CoreConfig) -> TableResult<Self> {
        let spec = spec.normalize()?;
        let paging = spec.paging.unwrap_or(config.paging).max(1);
        let table = Self {
            spec,
            backend,
            paging,
        };
        if config.auto_create {
            table.auto_create()?;
        }
        Ok(table)
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn spec(&self) -> &TableSpec {
        &self.spec
    }

    pub fn cols(&self) -> &[ColumnSpec] {
        &self.spec.cols
    }

    pub fn col(&self, name: &str) -> Option<&ColumnSpec> {
        self.spec.cols.iter().find(|col| col.name == name)
    }

    pub fn has_col(&self, name: &str) -> bool {
        self.spec.has_col(name)
    }

    pub fn col_names(&self) -> Vec<String> {
        self.spec.cols.iter().map(|col| col.name.clone()).collect()
    }

    pub fn indexes(&self) -> &[IndexSpec] {
        &self.spec.indexes
    }

    pub fn paging(&self) -> u32 {
        self.paging
    }

    pub fn backend(&self) -> &Rc<dyn Backend> {
        &self.backend
    }

    /// First primary column, if any.
    pub fn primary_col(&self) -> Option<&str> {
        self.spec
            .cols
            .iter()
            .find(|col| col.primary)
            .map(|col| col.name.as_str())
    }

    /// Creates the table and its indexes when missing; returns whether it did.
    pub fn auto_create(&self) -> TableResult<bool> {
        let name = self.name();
        let exists = self
            .backend
            .list_tables()?
            .iter()
            .any(|existing| existing.eq_ignore_ascii_case(name));
        if exists {
            return Ok(false);
        }

        info!("event=table_create module=schema status=start table={name}");
        if let Err(err) = self.backend.create_table(name, &self.spec.cols) {
            error!(
                "event=table_create module=schema status=error table={name} error={}",
                err.diagnostic()
            );
            return Err(err.into());
        }
        for index in &self.spec.indexes {
            if let Err(err) = self.backend.create_index(name, index) {
                error!(
                    "event=table_create module=schema status=error table={name} index={} error={}",
                    index.name,
                    err.diagnostic()
                );
                if let Err(drop_err) = self.backend.drop_table(name) {
                    warn!(
                        "event=table_drop module=schema status=error table={name} error={}",
                        drop_err.diagnostic()
                    );
                }
                return Err(err.into());
            }
        }
        info!(
            "event=table_create module=schema status=ok table={name} cols={} indexes={}",
            self.spec.cols.len(),
            self.spec.indexes.len()
        );
        Ok(true)
    }

    /// Every column's resolved default; columns without one map to `Null`.
    pub fn fetch_default(&self) -> Row {
        self.spec
            .cols
            .iter()
            .map(|col| (col.name.clone(), col.default.resolve()))
            .collect()
    }

    /// Advances the `<table>__<col>` sequence.
    pub fn increment(&self, col: &str) -> TableResult<i64> {
        Ok(self
            .backend
            .next_sequence(&format!("{}__{col}", self.name()))?)
    }

    /// Recasts and validates `data` in place without writing.
    pub fn validate(&self, data: &mut Row) -> Result<(), ValidationError> {
        auto_valid(&self.spec.cols, data)
    }

    /// Inserts a row and returns the data as written.
    pub fn insert(&self, data: Row) -> TableResult<Row> {
        let mut row = self.fetch_default();
        row.merge(data);

        for col in self.spec.cols.iter().filter(|col| col.autoinc) {
            if row.value(&col.name).is_empty() {
                let next = self.increment(&col.name)?;
                row.set(col.name.clone(), next);
            }
        }
        let now = now_stamp();
        for stamp in [CREATED_COL, UPDATED_COL] {
            if self.has_col(stamp) && row.value(stamp).is_empty() {
                row.set(stamp, now.as_str());
            }
        }

        self.checked("table_insert", &mut row)?;
        let result = self.backend.insert(self.name(), &row);
        self.logged("table_insert", result)?;
        Ok(row)
    }

    /// Updates matching rows; primary-key fields are not written but come
    /// back in the returned data.
    pub fn update(&self, data: Row, conds: &[Cond]) -> TableResult<Row> {
        let mut data = data;
        let mut primary = Row::new();
        for col in self.spec.cols.iter().filter(|col| col.primary) {
            if let Some(value) = data.remove(&col.name) {
                primary.set(col.name.clone(), value);
            }
        }
        if self.has_col(UPDATED_COL) && data.value(UPDATED_COL).is_empty() {
            data.set(UPDATED_COL, now_stamp());
        }

        self.checked("table_update", &mut data)?;
        let rendered = render_conds(self.backend.as_ref(), conds, Conj::And);
        let result = self.backend.update(self.name(), &data, &rendered);
        self.logged("table_update", result)?;

        primary.merge(data);
        Ok(primary)
    }

    pub fn delete(&self, conds: &[Cond]) -> TableResult<usize> {
        let rendered = render_conds(self.backend.as_ref(), conds, Conj::And);
        let result = self.backend.delete(self.name(), &rendered);
        self.logged("table_delete", result)
    }

    /// Inserts when the primary key is empty, otherwise updates by it.
    pub fn save(&self, data: Row) -> TableResult<Row> {
        let Some(primary) = self.primary_col() else {
            return self.insert(data);
        };
        let key = data.value(primary);
        if key.is_empty() {
            self.insert(data)
        } else {
            let cond = Cond::bind(format!("{primary} = ?"), key);
            self.update(data, &[cond])
        }
    }

    /// A builder selecting every declared column of this table.
    pub fn new_select(&self) -> Select {
        let mut select = Select::new(Rc::clone(&self.backend));
        select.paging(self.paging).from_table(self, "*");
        select
    }

    pub fn select(
        &self,
        mode: FetchMode,
        conds: &[Cond],
        order: impl Into<Names>,
        page: i64,
    ) -> TableResult<Fetched> {
        let mut select = self.new_select();
        select
            .multi_where(conds.iter().cloned(), Conj::And)
            .order(order)
            .limit_page(page);
        Ok(select.fetch(mode)?)
    }

    /// One row by primary key; absence is `Ok(None)`.
    pub fn fetch(&self, id: impl Into<Value>) -> TableResult<Option<Row>> {
        let primary = self.primary_col().unwrap_or("id");
        let cond = Cond::bind(format!("{primary} = ?"), id);
        Ok(self
            .select(FetchMode::Row, &[cond], Names::default(), 0)?
            .into_row()?)
    }

    pub fn fetch_all(
        &self,
        conds: &[Cond],
        order: impl Into<Names>,
        page: i64,
    ) -> TableResult<Vec<Row>> {
        Ok(self.select(FetchMode::All, conds, order, page)?.into_rows()?)
    }

    fn checked(&self, event: &str, data: &mut Row) -> TableResult<()> {
        match self.validate(data) {
            Ok(()) => Ok(()),
            Err(err) => {
                info!(
                    "event={event} module=schema status=error table={} reason=validation fields={}",
                    self.name(),
                    err.fields().len()
                );
                Err(err.into())
            }
        }
    }

    fn logged<T>(&self, event: &str, result: DbResult<T>) -> TableResult<T> {
        match result {
            Ok(value) => {
                debug!("event={event} module=schema status=ok table={}", self.name());
                Ok(value)
            }
            Err(err) => {
                warn!(
                    "event={event} module=schema status=error table={} error={}",
                    self.name(),
                    err.diagnostic()
                );
                Err(err.into())
            }
        }
    }
}

impl Debug for Table {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table")
            .field("name", &self.spec.name)
            .field("cols", &self.col_names())
            .field("paging", &self.paging)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::{table_name_from, TableSpec};
    use crate::schema::{ColumnSpec, ColumnType, IndexKind, IndexSpec, TableError};

    #[test]
    fn camel_case_names_become_snake_case() {
        assert_eq!(table_name_from("BlogPost"), "blog_post");
        assert_eq!(table_name_from("nodes"), "nodes");
        assert_eq!(table_name_from("Area51Site"), "area51_site");
    }

    #[test]
    fn normalize_injects_bookkeeping_columns_first() {
        let spec = TableSpec::new("Nodes")
            .col(ColumnSpec::new("title", ColumnType::Varchar))
            .normalize()
            .unwrap();

        assert_eq!(spec.name, "nodes");
        let names = spec.cols.iter().map(|col| col.name.as_str()).collect::<Vec<_>>();
        assert_eq!(names, vec!["id", "created", "updated", "title"]);
        assert_eq!(spec.cols[3].size, Some(255));
        assert!(spec.cols[0].primary && spec.cols[0].autoinc);
        assert_eq!(spec.indexes[0].kind, IndexKind::Unique);
        assert_eq!(spec.indexes[1].kind, IndexKind::Normal);
    }

    #[test]
    fn declared_id_is_not_replaced() {
        let spec = TableSpec::new("codes")
            .col(ColumnSpec::new("id", ColumnType::Varchar).size(8).primary())
            .normalize()
            .unwrap();
        assert_eq!(spec.cols.iter().filter(|col| col.name == "id").count(), 1);
        assert!(spec.indexes.iter().all(|index| index.name != "id"));
    }

    #[test]
    fn index_on_unknown_column_is_invalid() {
        let err = TableSpec::new("nodes")
            .index(IndexSpec::normal("missing"))
            .normalize()
            .unwrap_err();
        assert!(matches!(err, TableError::InvalidSpec(_)));
    }

    #[test]
    fn from_json_reads_a_declaration() {
        let spec = TableSpec::from_json(
            r#"{"name":"users","cols":[{"name":"handle","type":"varchar","size":32,"required":true}],
                "indexes":[{"name":"handle","kind":"unique"}],"paging":0}"#,
        )
        .unwrap()
        .normalize()
        .unwrap();
        assert_eq!(spec.paging, Some(1));
        assert_eq!(spec.cols.len(), 4);
    }
}
