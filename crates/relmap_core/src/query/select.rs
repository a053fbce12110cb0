//! SELECT statement accumulator.
//!
//! # Responsibility
//! - Collect statement parts and bound parameters through chained calls.
//! - Deconflict per-source column names before execution.
//!
//! # Invariants
//! - Cloning a builder copies query state only; the clone shares the same
//!   backend handle.
//! - `paging` is always at least 1.

use super::cond::{push_cond, Cond, Conj};
use super::parts::{JoinKind, JoinPart, Limit, Names, Part, SelectParts};
use crate::db::{Backend, DbResult, FetchMode, Fetched, RowCursor};
use crate::schema::Table;
use crate::value::{Row, Value};
use log::{debug, warn};
use serde::Serialize;
use std::rc::Rc;
use std::time::Instant;

pub const DEFAULT_PAGING: u32 = 10;

/// Row count and page count for one filter set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PageInfo {
    pub count: u64,
    pub pages: u64,
}

impl PageInfo {
    pub fn new(count: u64, paging: u32) -> Self {
        let paging = u64::from(paging.max(1));
        Self {
            count,
            pages: count.div_ceil(paging),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceKind {
    From,
    Join,
}

#[derive(Debug, Clone)]
struct Source {
    kind: SourceKind,
    name: String,
    cols: Vec<String>,
}

impl Source {
    /// The alias after `AS`, or the source name itself.
    fn prefix(&self) -> &str {
        let words = self.name.split_whitespace().collect::<Vec<_>>();
        match words.as_slice() {
            [_, keyword, alias] if keyword.eq_ignore_ascii_case("as") => *alias,
            _ => self.name.trim(),
        }
    }
}

/// Chainable SELECT builder bound to one backend.
#[derive(Clone)]
pub struct Select {
    backend: Rc<dyn Backend>,
    parts: SelectParts,
    sources: Vec<Source>,
    binds: Row,
    paging: u32,
}

impl Select {
    pub fn new(backend: Rc<dyn Backend>) -> Self {
        Self {
            backend,
            parts: SelectParts::default(),
            sources: Vec::new(),
            binds: Row::new(),
            paging: DEFAULT_PAGING,
        }
    }

    pub fn backend(&self) -> &Rc<dyn Backend> {
        &self.backend
    }

    pub fn distinct(&mut self, flag: bool) -> &mut Self {
        self.parts.distinct = flag;
        self
    }

    /// Adds columns that are emitted exactly as given.
    pub fn cols(&mut self, cols: impl Into<Names>) -> &mut Self {
        self.parts.cols.extend(cols.into().into_vec());
        self
    }

    /// Adds a FROM source and the columns it contributes.
    pub fn from(&mut self, name: &str, cols: impl Into<Names>) -> &mut Self {
        self.parts.from.push(name.to_string());
        self.add_source(SourceKind::From, name, cols.into().into_vec());
        self
    }

    /// Adds a table as FROM source; `*` expands to its declared columns.
    pub fn from_table(&mut self, table: &Table, cols: impl Into<Names>) -> &mut Self {
        let cols = expand_star(table, cols.into());
        self.parts.from.push(table.name().to_string());
        self.add_source(SourceKind::From, table.name(), cols);
        self
    }

    pub fn join(&mut self, name: &str, cond: &str, cols: impl Into<Names>) -> &mut Self {
        self.push_join(JoinKind::Inner, name, cond, cols.into().into_vec())
    }

    pub fn left_join(&mut self, name: &str, cond: &str, cols: impl Into<Names>) -> &mut Self {
        self.push_join(JoinKind::Left, name, cond, cols.into().into_vec())
    }

    /// Joins a table; `*` expands to its declared columns.
    pub fn join_table(
        &mut self,
        kind: JoinKind,
        table: &Table,
        alias: Option<&str>,
        cond: &str,
        cols: impl Into<Names>,
    ) -> &mut Self {
        let cols = expand_star(table, cols.into());
        let name = match alias {
            Some(alias) => format!("{} AS {alias}", table.name()),
            None => table.name().to_string(),
        };
        self.push_join(kind, &name, cond, cols)
    }

    pub fn and_where(&mut self, cond: impl Into<Cond>) -> &mut Self {
        let rendered = cond.into().render(self.backend.as_ref());
        push_cond(&mut self.parts.conds, Conj::And, rendered);
        self
    }

    pub fn or_where(&mut self, cond: impl Into<Cond>) -> &mut Self {
        let rendered = cond.into().render(self.backend.as_ref());
        push_cond(&mut self.parts.conds, Conj::Or, rendered);
        self
    }

    /// Adds every condition in order, joined by `conj`.
    pub fn multi_where(&mut self, conds: impl IntoIterator<Item = Cond>, conj: Conj) -> &mut Self {
        for cond in conds {
            let rendered = cond.render(self.backend.as_ref());
            push_cond(&mut self.parts.conds, conj, rendered);
        }
        self
    }

    pub fn having(&mut self, cond: impl Into<Cond>) -> &mut Self {
        let rendered = cond.into().render(self.backend.as_ref());
        push_cond(&mut self.parts.having, Conj::And, rendered);
        self
    }

    pub fn or_having(&mut self, cond: impl Into<Cond>) -> &mut Self {
        let rendered = cond.into().render(self.backend.as_ref());
        push_cond(&mut self.parts.having, Conj::Or, rendered);
        self
    }

    pub fn multi_having(
        &mut self,
        conds: impl IntoIterator<Item = Cond>,
        conj: Conj,
    ) -> &mut Self {
        for cond in conds {
            let rendered = cond.render(self.backend.as_ref());
            push_cond(&mut self.parts.having, conj, rendered);
        }
        self
    }

    pub fn group(&mut self, spec: impl Into<Names>) -> &mut Self {
        self.parts.group.extend(spec.into().into_vec());
        self
    }

    /// Adds sort entries; each ends in an explicit `ASC` or `DESC`.
    pub fn order(&mut self, spec: impl Into<Names>) -> &mut Self {
        for entry in spec.into().iter() {
            self.parts.order.push(with_direction(entry));
        }
        self
    }

    pub fn limit(&mut self, count: u32, offset: u32) -> &mut Self {
        self.parts.limit = Limit { count, offset };
        self
    }

    /// Limits to one page (1-based); `page <= 0` clears the limit.
    pub fn limit_page(&mut self, page: i64) -> &mut Self {
        self.parts.limit = page_limit(page, self.paging);
        self
    }

    /// Rows per page for `limit_page` and `count_pages`, forced to >= 1.
    pub fn paging(&mut self, rows: u32) -> &mut Self {
        self.paging = rows.max(1);
        self
    }

    pub fn get_paging(&self) -> u32 {
        self.paging
    }

    pub fn bind(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.binds.set(key, value);
        self
    }

    /// Merges every entry of `row` into the bound parameters.
    pub fn bind_row(&mut self, row: Row) -> &mut Self {
        self.binds.merge(row);
        self
    }

    pub fn unbind(&mut self, keys: &[&str]) -> &mut Self {
        for key in keys {
            self.binds.remove(key);
        }
        self
    }

    pub fn unbind_all(&mut self) -> &mut Self {
        self.binds = Row::new();
        self
    }

    pub fn binds(&self) -> &Row {
        &self.binds
    }

    /// Resets one part; the limit is reset along with any part.
    pub fn clear(&mut self, part: Part) -> &mut Self {
        match part {
            Part::Distinct => self.parts.distinct = false,
            Part::Cols => {
                self.parts.cols.clear();
                for source in &mut self.sources {
                    source.cols.clear();
                }
            }
            Part::From => {
                self.parts.from.clear();
                self.sources.retain(|source| source.kind != SourceKind::From);
            }
            Part::Join => {
                self.parts.join.clear();
                self.sources.retain(|source| source.kind != SourceKind::Join);
            }
            Part::Where => self.parts.conds.clear(),
            Part::Group => self.parts.group.clear(),
            Part::Having => self.parts.having.clear(),
            Part::Order => self.parts.order.clear(),
            Part::Limit => {}
        }
        self.parts.limit = Limit::default();
        self
    }

    pub fn clear_all(&mut self) -> &mut Self {
        self.parts = SelectParts::default();
        self.sources.clear();
        self
    }

    /// The statement as it will execute, with deconflicted columns.
    pub fn assemble(&self) -> SelectParts {
        let mut parts = self.parts.clone();
        let contributing = self
            .sources
            .iter()
            .filter(|source| !source.cols.is_empty())
            .count();

        let mut cols = Vec::new();
        for source in &self.sources {
            let prefix = source.prefix();
            for col in &source.cols {
                cols.push(deconflict(prefix, col, contributing));
            }
        }
        cols.append(&mut parts.cols);
        parts.cols = cols;
        parts
    }

    pub fn to_sql(&self) -> String {
        self.assemble().to_sql()
    }

    pub fn fetch(&self, mode: FetchMode) -> DbResult<Fetched> {
        let parts = self.assemble();
        let started_at = Instant::now();
        match self.backend.select(mode, &parts, &self.binds) {
            Ok(fetched) => {
                debug!(
                    "event=select_fetch module=query status=ok mode={} sources={} duration_ms={}",
                    mode.as_str(),
                    self.sources.len(),
                    started_at.elapsed().as_millis()
                );
                Ok(fetched)
            }
            Err(err) => {
                warn!(
                    "event=select_fetch module=query status=error mode={} error={}",
                    mode.as_str(),
                    err.diagnostic()
                );
                Err(err)
            }
        }
    }

    pub fn fetch_all(&self) -> DbResult<Vec<Row>> {
        self.fetch(FetchMode::All)?.into_rows()
    }

    pub fn fetch_row(&self) -> DbResult<Option<Row>> {
        self.fetch(FetchMode::Row)?.into_row()
    }

    pub fn fetch_one(&self) -> DbResult<Option<Value>> {
        self.fetch(FetchMode::One)?.into_scalar()
    }

    pub fn fetch_col(&self) -> DbResult<Vec<Value>> {
        self.fetch(FetchMode::Col)?.into_col()
    }

    pub fn fetch_assoc(&self) -> DbResult<Vec<(String, Row)>> {
        self.fetch(FetchMode::Assoc)?.into_assoc()
    }

    pub fn fetch_cursor(&self) -> DbResult<RowCursor> {
        self.fetch(FetchMode::Cursor)?.into_cursor()
    }

    /// Counts matching rows without touching this builder's state.
    pub fn count_pages(&self, col: &str) -> DbResult<PageInfo> {
        let mut counter = self.clone();
        counter.clear(Part::Cols);
        counter.parts.order.clear();
        counter.cols(vec![format!("COUNT({col})")]);
        let count = counter
            .fetch_one()?
            .and_then(|value| value.as_i64())
            .unwrap_or(0)
            .max(0) as u64;
        Ok(PageInfo::new(count, self.paging))
    }

    fn add_source(&mut self, kind: SourceKind, name: &str, cols: Vec<String>) {
        self.sources.push(Source {
            kind,
            name: name.to_string(),
            cols,
        });
    }

    fn push_join(&mut self, kind: JoinKind, name: &str, cond: &str, cols: Vec<String>) -> &mut Self {
        self.parts.join.push(JoinPart {
            kind,
            name: name.to_string(),
            cond: cond.to_string(),
        });
        self.add_source(SourceKind::Join, name, cols);
        self
    }
}

impl std::fmt::Debug for Select {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Select")
            .field("sql", &self.to_sql())
            .field("binds", &self.binds)
            .field("paging", &self.paging)
            .finish()
    }
}

pub(crate) fn page_limit(page: i64, paging: u32) -> Limit {
    if page <= 0 {
        return Limit::default();
    }
    let paging = paging.max(1);
    let offset = u64::from(paging) * (page as u64 - 1);
    Limit {
        count: paging,
        offset: u32::try_from(offset).unwrap_or(u32::MAX),
    }
}

fn expand_star(table: &Table, cols: Names) -> Vec<String> {
    let mut out = Vec::new();
    for col in cols.into_vec() {
        if col == "*" {
            out.extend(table.col_names());
        } else {
            out.push(col);
        }
    }
    out
}

fn deconflict(prefix: &str, col: &str, contributing: usize) -> String {
    let aliased = col.to_ascii_lowercase().contains(" as ");
    let qualified = col.contains('.') || col.contains('(');
    if aliased || qualified || prefix.is_empty() {
        col.to_string()
    } else if col == "*" {
        format!("{prefix}.*")
    } else if contributing == 1 {
        format!("{prefix}.{col} AS {col}")
    } else {
        format!("{prefix}.{col} AS {prefix}__{col}")
    }
}

fn with_direction(entry: &str) -> String {
    let upper = entry.to_ascii_uppercase();
    if upper.ends_with(" ASC") || upper.ends_with(" DESC") {
        entry.to_string()
    } else {
        format!("{entry} ASC")
    }
}

#[cfg(test)]
mod tests {
    use super::{page_limit, PageInfo, Select};
    use crate::db::open_db_in_memory;
    use crate::query::{Cond, Conj, Limit, Part};
    use std::rc::Rc;

    fn select() -> Select {
        Select::new(Rc::new(open_db_in_memory().unwrap()))
    }

    #[test]
    fn single_source_columns_keep_their_names() {
        let mut select = select();
        select.from("nodes", "id, title").cols("COUNT(*) AS total");
        assert_eq!(
            select.to_sql(),
            "SELECT nodes.id AS id, nodes.title AS title, COUNT(*) AS total FROM nodes"
        );
    }

    #[test]
    fn joined_sources_get_prefixed_aliases() {
        let mut select = select();
        select
            .from("t1", ["id", "name"])
            .join("t2 AS x", "t1.id=x.t1_id", ["label"]);
        assert_eq!(
            select.to_sql(),
            "SELECT t1.id AS t1__id, t1.name AS t1__name, x.label AS x__label \
             FROM t1 INNER JOIN t2 AS x ON t1.id=x.t1_id"
        );
    }

    #[test]
    fn order_entries_get_explicit_direction() {
        let mut select = select();
        select.from("t", Vec::<String>::new()).order("name, id desc");
        assert_eq!(select.to_sql(), "SELECT * FROM t ORDER BY name ASC, id desc");
    }

    #[test]
    fn multi_where_mixes_literal_and_quoted() {
        let mut select = select();
        select.from("t", Vec::<String>::new()).multi_where(
            [Cond::literal("id > 5"), Cond::bind("name = ?", "x")],
            Conj::And,
        );
        assert_eq!(select.to_sql(), "SELECT * FROM t WHERE id > 5 AND name = 'x'");
    }

    #[test]
    fn limit_page_follows_paging() {
        assert_eq!(page_limit(0, 10), Limit::default());
        assert_eq!(page_limit(-3, 10), Limit::default());
        assert_eq!(page_limit(3, 10), Limit { count: 10, offset: 20 });

        let mut select = select();
        select.paging(0).limit_page(2);
        assert_eq!(select.get_paging(), 1);
        assert!(select.to_sql().ends_with("LIMIT 1 OFFSET 1"));
    }

    #[test]
    fn clear_always_resets_limit() {
        let mut select = select();
        select.from("t", "id").and_where("id > 1").limit(5, 5);
        select.clear(Part::Where);
        assert_eq!(select.to_sql(), "SELECT t.id AS id FROM t");
    }

    #[test]
    fn page_info_rounds_up() {
        assert_eq!(PageInfo::new(25, 10), PageInfo { count: 25, pages: 3 });
        assert_eq!(PageInfo::new(0, 10).pages, 0);
        assert_eq!(PageInfo::new(20, 10).pages, 2);
    }
}
