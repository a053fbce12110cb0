//! Entity registry, records, relations and collections.
//!
//! # Responsibility
//! - Register entity types (`Model`) against one backend through a `Catalog`.
//! - Turn query results into `Record`/`Collection` values, eager-loading
//!   declared relations on request.
//! - Route record writes through the owning table's validation.
//!
//! # Invariants
//! - Models refer to each other by name; relations resolve lazily, once.
//! - Eager to-many loading issues one query per relation, never one per row.
//! - The catalog is the only owner of registered models; a model whose
//!   catalog was dropped can no longer resolve relations.

use crate::config::CoreConfig;
use crate::db::{Backend, DbError};
use crate::query::{Cond, Conj, Names, PageInfo, Select};
use crate::schema::{
    now_stamp, table_name_from, Rule, Table, TableError, TableSpec, ValidationError, UPDATED_COL,
};
use crate::value::{Row, Value};
use log::{debug, info};
use once_cell::unsync::OnceCell;
use std::cell::RefCell;
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::rc::{Rc, Weak};

mod accessor;
mod collection;
mod filter;
mod hooks;
mod record;
mod related;

pub use accessor::{Accessor, Accessors, Getter, IsSet, Setter, Unset};
pub use collection::{Collection, Pager};
pub use filter::FilterChain;
pub use hooks::{NoHooks, RecordHooks};
pub use record::{Record, RecordStatus, RelationSlot, SaveOutcome};
pub use related::{
    Related, RelatedValue, RelationFetch, RelationKind, RelationSpec, Through, OWNER_KEY,
};

pub type ModelResult<T> = Result<T, ModelError>;

#[derive(Debug)]
pub enum ModelError {
    /// Schema or filter validation failed; field to messages.
    Validation(ValidationError),
    Db(DbError),
    /// The record was deleted and rejects further use.
    Deleted { model: String },
    UnknownModel(String),
    UnknownRelation { model: String, name: String },
    UnknownColumn { model: String, col: String },
    InvalidSpec(String),
    /// The catalog owning the model no longer exists.
    CatalogDropped,
    /// Some members of a collection failed to save.
    Collection {
        saved: usize,
        failures: Vec<(usize, ModelError)>,
    },
}

impl Display for ModelError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::Deleted { model } => write!(f, "record of `{model}` was deleted"),
            Self::UnknownModel(name) => write!(f, "unknown model `{name}`"),
            Self::UnknownRelation { model, name } => {
                write!(f, "model `{model}` has no relation `{name}`")
            }
            Self::UnknownColumn { model, col } => {
                write!(f, "model `{model}` has no column `{col}`")
            }
            Self::InvalidSpec(message) => write!(f, "invalid model spec: {message}"),
            Self::CatalogDropped => write!(f, "model catalog was dropped"),
            Self::Collection { saved, failures } => write!(
                f,
                "collection save failed for {} member(s), {saved} saved",
                failures.len()
            ),
        }
    }
}

impl Error for ModelError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::Collection { failures, .. } => failures
                .first()
                .map(|(_, err)| err as &(dyn Error + 'static)),
            _ => None,
        }
    }
}

impl From<ValidationError> for ModelError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for ModelError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<TableError> for ModelError {
    fn from(value: TableError) -> Self {
        match value {
            TableError::Validation(err) => Self::Validation(err),
            TableError::Db(err) => Self::Db(err),
            TableError::InvalidSpec(message) => Self::InvalidSpec(message),
        }
    }
}

/// Declaration of one entity type.
pub struct ModelSpec {
    pub name: String,
    /// An empty table name defaults to the snake_case model name.
    pub table: TableSpec,
    pub relations: Vec<RelationSpec>,
    /// Virtual columns served by accessors; never written.
    pub calculate_cols: Vec<String>,
    /// Column to backend sequence name, filled on insert when empty.
    pub sequence_cols: Vec<(String, String)>,
    pub filters: Vec<(String, Rule)>,
    /// Column to message replacing every filter message for that column.
    pub invalid_messages: HashMap<String, String>,
    pub accessors: Accessors,
    pub hooks: Rc<dyn RecordHooks>,
    /// Key column other tables use to point at this model.
    pub foreign_col: Option<String>,
}

impl ModelSpec {
    pub fn new(name: impl Into<String>, table: TableSpec) -> Self {
        Self {
            name: name.into(),
            table,
            relations: Vec::new(),
            calculate_cols: Vec::new(),
            sequence_cols: Vec::new(),
            filters: Vec::new(),
            invalid_messages: HashMap::new(),
            accessors: Accessors::default(),
            hooks: Rc::new(NoHooks),
            foreign_col: None,
        }
    }

    pub fn relation(mut self, relation: RelationSpec) -> Self {
        self.relations.push(relation);
        self
    }

    pub fn calculate_col(mut self, col: impl Into<String>) -> Self {
        self.calculate_cols.push(col.into());
        self
    }

    pub fn sequence_col(mut self, col: impl Into<String>, sequence: impl Into<String>) -> Self {
        self.sequence_cols.push((col.into(), sequence.into()));
        self
    }

    pub fn filter(mut self, col: impl Into<String>, rule: Rule) -> Self {
        self.filters.push((col.into(), rule));
        self
    }

    pub fn invalid_message(mut self, col: impl Into<String>, message: impl Into<String>) -> Self {
        self.invalid_messages.insert(col.into(), message.into());
        self
    }

    pub fn accessor(mut self, col: impl Into<String>, accessor: Accessor) -> Self {
        self.accessors.insert(col, accessor);
        self
    }

    pub fn hooks(mut self, hooks: impl RecordHooks + 'static) -> Self {
        self.hooks = Rc::new(hooks);
        self
    }

    pub fn foreign_col(mut self, col: impl Into<String>) -> Self {
        self.foreign_col = Some(col.into());
        self
    }
}

impl Debug for ModelSpec {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelSpec")
            .field("name", &self.name)
            .field("table", &self.table.name)
            .field("relations", &self.relations.len())
            .field("calculate_cols", &self.calculate_cols)
            .finish()
    }
}

struct CatalogState {
    backend: Rc<dyn Backend>,
    config: CoreConfig,
    models: RefCell<HashMap<String, Rc<Model>>>,
}

/// Registry of models sharing one backend handle and configuration.
#[derive(Clone)]
pub struct Catalog {
    state: Rc<CatalogState>,
}

impl Catalog {
    pub fn new(backend: Rc<dyn Backend>, config: CoreConfig) -> Self {
        let mut config = config;
        config.normalize();
        Self {
            state: Rc::new(CatalogState {
                backend,
                config,
                models: RefCell::new(HashMap::new()),
            }),
        }
    }

    pub fn backend(&self) -> &Rc<dyn Backend> {
        &self.state.backend
    }

    pub fn config(&self) -> &CoreConfig {
        &self.state.config
    }

    /// Normalizes and (when configured) creates the table, then registers
    /// the model. Relations are checked by name here and resolved on first use.
    pub fn register(&self, spec: ModelSpec) -> ModelResult<Rc<Model>> {
        let ModelSpec {
            name,
            table,
            relations,
            calculate_cols,
            sequence_cols,
            filters,
            invalid_messages,
            accessors,
            hooks,
            foreign_col,
        } = spec;

        if name.trim().is_empty() {
            return Err(ModelError::InvalidSpec("model name is empty".to_string()));
        }
        if self.state.models.borrow().contains_key(&name) {
            return Err(ModelError::InvalidSpec(format!(
                "model `{name}` is already registered"
            )));
        }

        let mut table = table;
        if table.name.trim().is_empty() {
            table.name = table_name_from(&name);
        }
        let table = Table::new(table, Rc::clone(&self.state.backend), &self.state.config)?;
        let primary_col = table.primary_col().unwrap_or("id").to_string();
        let foreign_col = foreign_col
            .unwrap_or_else(|| format!("{}_{primary_col}", singular(table.name())));

        let model = Model {
            name,
            table,
            primary_col,
            foreign_col,
            relations: relations
                .into_iter()
                .map(|spec| (spec, OnceCell::new()))
                .collect(),
            calculate_cols,
            sequence_cols,
            filters,
            invalid_messages,
            accessors,
            hooks,
            catalog: Rc::downgrade(&self.state),
        };
        model.check_declarations()?;

        let model = Rc::new(model);
        self.state
            .models
            .borrow_mut()
            .insert(model.name.clone(), Rc::clone(&model));
        info!(
            "event=model_register module=model status=ok model={} table={} relations={}",
            model.name,
            model.table.name(),
            model.relations.len()
        );
        Ok(model)
    }

    pub fn model(&self, name: &str) -> ModelResult<Rc<Model>> {
        self.state
            .models
            .borrow()
            .get(name)
            .cloned()
            .ok_or_else(|| ModelError::UnknownModel(name.to_string()))
    }

    /// Registered model names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names = self
            .state
            .models
            .borrow()
            .keys()
            .cloned()
            .collect::<Vec<_>>();
        names.sort();
        names
    }
}

impl Debug for Catalog {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Catalog")
            .field("config", &self.state.config)
            .field("models", &self.names())
            .finish()
    }
}

/// What to fetch through a model.
///
/// Conditions and order entries are used verbatim. When eager to-one
/// relations are joined, qualify ambiguous columns with the table name or
/// the relation name.
#[derive(Debug, Clone, Default)]
pub struct FetchParams {
    /// Columns to select; `None` selects every table column.
    pub cols: Option<Names>,
    pub conds: Vec<Cond>,
    pub order: Names,
    /// 1-based page; 0 or less fetches every row.
    pub page: i64,
    /// Relations loaded together with the result.
    pub eager: Vec<String>,
    /// Column keying the resulting collection.
    pub key: Option<String>,
    /// Rows per page; defaults to the table's paging.
    pub paging: Option<u32>,
}

impl FetchParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cols(mut self, cols: impl Into<Names>) -> Self {
        self.cols = Some(cols.into());
        self
    }

    pub fn cond(mut self, cond: impl Into<Cond>) -> Self {
        self.conds.push(cond.into());
        self
    }

    pub fn order(mut self, order: impl Into<Names>) -> Self {
        self.order = order.into();
        self
    }

    pub fn page(mut self, page: i64) -> Self {
        self.page = page;
        self
    }

    pub fn eager(mut self, relation: impl Into<String>) -> Self {
        self.eager.push(relation.into());
        self
    }

    pub fn key(mut self, col: impl Into<String>) -> Self {
        self.key = Some(col.into());
        self
    }

    pub fn paging(mut self, rows: u32) -> Self {
        self.paging = Some(rows.max(1));
        self
    }
}

/// One registered entity type.
pub struct Model {
    name: String,
    table: Table,
    primary_col: String,
    foreign_col: String,
    relations: Vec<(RelationSpec, OnceCell<Related>)>,
    calculate_cols: Vec<String>,
    sequence_cols: Vec<(String, String)>,
    filters: Vec<(String, Rule)>,
    invalid_messages: HashMap<String, String>,
    accessors: Accessors,
    hooks: Rc<dyn RecordHooks>,
    catalog: Weak<CatalogState>,
}

impl Model {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn primary_col(&self) -> &str {
        &self.primary_col
    }

    pub fn foreign_col(&self) -> &str {
        &self.foreign_col
    }

    pub fn calculate_cols(&self) -> &[String] {
        &self.calculate_cols
    }

    pub fn filters(&self) -> &[(String, Rule)] {
        &self.filters
    }

    pub fn accessors(&self) -> &Accessors {
        &self.accessors
    }

    pub fn hooks(&self) -> &Rc<dyn RecordHooks> {
        &self.hooks
    }

    /// The catalog this model was registered in.
    pub fn catalog(&self) -> ModelResult<Catalog> {
        self.catalog
            .upgrade()
            .map(|state| Catalog { state })
            .ok_or(ModelError::CatalogDropped)
    }

    /// A table column or a calculated column.
    pub fn is_known_col(&self, col: &str) -> bool {
        self.table.has_col(col) || self.calculate_cols.iter().any(|name| name == col)
    }

    pub fn is_sequence_col(&self, col: &str) -> bool {
        self.sequence_cols.iter().any(|(name, _)| name == col)
    }

    pub fn invalid_message(&self, col: &str) -> Option<&str> {
        self.invalid_messages.get(col).map(String::as_str)
    }

    pub fn relation_names(&self) -> impl Iterator<Item = &str> {
        self.relations.iter().map(|(spec, _)| spec.name.as_str())
    }

    pub fn relation_kind(&self, name: &str) -> Option<RelationKind> {
        self.relation_spec(name).map(|spec| spec.kind)
    }

    /// The resolved relation, resolving it against the catalog on first use.
    pub fn related(&self, name: &str) -> ModelResult<&Related> {
        let (spec, cell) = self
            .relations
            .iter()
            .find(|(spec, _)| spec.name == name)
            .ok_or_else(|| self.unknown_relation(name))?;
        cell.get_or_try_init(|| {
            let foreign = self.lookup(&spec.foreign_model)?;
            let through = match &spec.through {
                Some(pivot) => Some(self.lookup(pivot)?),
                None => None,
            };
            let related = Related::resolve(spec, self, &foreign, through.as_deref())?;
            debug!(
                "event=relation_resolve module=model status=ok model={} relation={name} kind={}",
                self.name,
                related.kind.as_str()
            );
            Ok(related)
        })
    }

    pub fn unknown_relation(&self, name: &str) -> ModelError {
        ModelError::UnknownRelation {
            model: self.name.clone(),
            name: name.to_string(),
        }
    }

    /// A builder over this model's table, every declared column selected.
    pub fn select(&self) -> Select {
        self.table.new_select()
    }

    /// A new record with every column default applied.
    pub fn fetch_new(self: &Rc<Self>) -> ModelResult<Record> {
        let mut record = Record::blank(Rc::clone(self), RecordStatus::New);
        record.load(self.table.fetch_default())?;
        Ok(record)
    }

    /// One record by primary key; absence is `Ok(None)`.
    pub fn fetch(self: &Rc<Self>, id: impl Into<Value>) -> ModelResult<Option<Record>> {
        let cond = Cond::bind(
            format!("{}.{} = ?", self.table.name(), self.primary_col),
            id,
        );
        self.fetch_one(&FetchParams::new().cond(cond))
    }

    pub fn fetch_one(self: &Rc<Self>, params: &FetchParams) -> ModelResult<Option<Record>> {
        let mut select = self.build_select(params)?;
        select.limit(1, 0);
        let Some(row) = select.fetch_row()? else {
            return Ok(None);
        };
        let mut records = vec![self.new_record(row)?];
        self.eager_many(&mut records, params)?;
        Ok(records.pop())
    }

    pub fn fetch_all(self: &Rc<Self>, params: &FetchParams) -> ModelResult<Collection> {
        let rows = self.build_select(params)?.fetch_all()?;
        self.collect_records(rows, params, params.key.as_deref())
    }

    /// Like `fetch_all`, keyed by `params.key` or the first selected column.
    pub fn fetch_assoc(self: &Rc<Self>, params: &FetchParams) -> ModelResult<Collection> {
        let key = match (&params.key, &params.cols) {
            (Some(key), _) => key.clone(),
            (None, Some(cols)) => cols
                .iter()
                .next()
                .map(output_name)
                .unwrap_or_else(|| self.primary_col.clone()),
            (None, None) => self
                .table
                .cols()
                .first()
                .map(|col| col.name.clone())
                .unwrap_or_else(|| self.primary_col.clone()),
        };
        let rows = self.build_select(params)?.fetch_all()?;
        self.collect_records(rows, params, Some(&key))
    }

    /// One page of records with pager info attached.
    pub fn fetch_page(self: &Rc<Self>, params: &FetchParams, page: i64) -> ModelResult<Collection> {
        let mut params = params.clone();
        params.page = page;
        let info = self.count_pages(&params)?;
        let mut collection = self.fetch_all(&params)?;
        collection.set_pager(Pager {
            page,
            paging: self.paging_for(&params),
            count: info.count,
            pages: info.pages,
        });
        Ok(collection)
    }

    pub fn count_pages(&self, params: &FetchParams) -> ModelResult<PageInfo> {
        let select = self.build_select(params)?;
        Ok(select.count_pages(&format!("{}.{}", self.table.name(), self.primary_col))?)
    }

    /// Wraps a fetched row as a clean record.
    pub fn new_record(self: &Rc<Self>, row: Row) -> ModelResult<Record> {
        let mut record = Record::blank(Rc::clone(self), RecordStatus::New);
        record.load(row)?;
        record.set_status(RecordStatus::Clean);
        Ok(record)
    }

    pub fn new_collection(self: &Rc<Self>, rows: Vec<Row>) -> ModelResult<Collection> {
        let mut collection = Collection::new(Rc::clone(self));
        for row in rows {
            collection.push(self.new_record(row)?);
        }
        Ok(collection)
    }

    /// Data restricted to table columns.
    pub fn writable(&self, data: &Row) -> Row {
        data.iter()
            .filter(|(col, _)| self.table.has_col(col))
            .map(|(col, value)| (col.to_string(), value.clone()))
            .collect()
    }

    pub fn insert_row(&self, data: Row) -> ModelResult<Row> {
        let mut data = data;
        for (col, sequence) in &self.sequence_cols {
            if data.value(col).is_empty() {
                let next = self.table.backend().next_sequence(sequence)?;
                data.set(col.clone(), next);
            }
        }
        Ok(self.table.insert(data)?)
    }

    /// Updates the row with primary value `id`, stamping `updated` anew.
    pub fn update_row(&self, data: Row, id: &Value) -> ModelResult<Row> {
        let mut data = data;
        if self.table.has_col(UPDATED_COL) {
            data.set(UPDATED_COL, now_stamp());
        }
        Ok(self.table.update(data, &[self.primary_cond(id)])?)
    }

    pub fn delete_row(&self, id: &Value) -> ModelResult<usize> {
        Ok(self.table.delete(&[self.primary_cond(id)])?)
    }

    /// Wraps joined to-one data; an all-null row means no match.
    pub fn eager_to_one(&self, record: &Record, name: &str, data: Row) -> ModelResult<RelatedValue> {
        let related = self.related(name)?;
        let foreign = self.lookup(&related.foreign_model)?;
        if data.iter().all(|(_, value)| value.is_null()) {
            let mut value = related.empty_value(&foreign, &record.raw(&related.native_col))?;
            // Joined placeholders stay clean until written to.
            if let RelatedValue::One(Some(placeholder)) = &mut value {
                placeholder.set_status(RecordStatus::Clean);
            }
            return Ok(value);
        }
        Ok(RelatedValue::One(Some(foreign.new_record(data)?)))
    }

    /// Fetches one relation of `record` at `page` (0 means every row).
    pub fn load_related(&self, record: &Record, name: &str, page: i64) -> ModelResult<RelatedValue> {
        let related = self.related(name)?;
        let foreign = self.lookup(&related.foreign_model)?;
        let native_val = record.raw(&related.native_col);
        if native_val.is_empty() {
            return related.empty_value(&foreign, &native_val);
        }

        let select = related.select_for(&foreign, &native_val, page);
        debug!(
            "event=lazy_load module=model status=start model={} relation={name} page={page}",
            self.name
        );
        match related.fetch {
            RelationFetch::One => match select.fetch_row()? {
                Some(row) => Ok(RelatedValue::One(Some(foreign.new_record(row)?))),
                None => related.empty_value(&foreign, &native_val),
            },
            RelationFetch::All => {
                let mut collection = foreign.new_collection(select.fetch_all()?)?;
                if page > 0 {
                    let info = select.count_pages(&format!(
                        "{}.{}",
                        related.name,
                        foreign.primary_col()
                    ))?;
                    collection.set_pager(Pager {
                        page,
                        paging: select.get_paging(),
                        count: info.count,
                        pages: info.pages,
                    });
                }
                Ok(RelatedValue::Many(collection))
            }
        }
    }

    fn relation_spec(&self, name: &str) -> Option<&RelationSpec> {
        self.relations
            .iter()
            .map(|(spec, _)| spec)
            .find(|spec| spec.name == name)
    }

    fn lookup(&self, name: &str) -> ModelResult<Rc<Model>> {
        let state = self.catalog.upgrade().ok_or(ModelError::CatalogDropped)?;
        let models = state.models.borrow();
        models
            .get(name)
            .cloned()
            .ok_or_else(|| ModelError::UnknownModel(name.to_string()))
    }

    fn primary_cond(&self, id: &Value) -> Cond {
        Cond::bind(format!("{} = ?", self.primary_col), id.clone())
    }

    fn paging_for(&self, params: &FetchParams) -> u32 {
        params.paging.unwrap_or(self.table.paging()).max(1)
    }

    /// Main-table columns are aliased explicitly so eager joins never
    /// rename them.
    fn build_select(&self, params: &FetchParams) -> ModelResult<Select> {
        let table = self.table.name();
        let mut select = Select::new(Rc::clone(self.table.backend()));
        select.paging(self.paging_for(params)).from(table, Names::default());

        let cols = match &params.cols {
            Some(cols) => cols.iter().map(|col| qualify(table, col)).collect::<Vec<_>>(),
            None => self
                .table
                .cols()
                .iter()
                .map(|col| qualify(table, &col.name))
                .collect(),
        };
        select.cols(cols);

        for name in &params.eager {
            let related = self.related(name)?;
            if related.fetch != RelationFetch::One {
                continue;
            }
            let foreign = self.lookup(&related.foreign_model)?;
            let cols = foreign
                .table()
                .cols()
                .iter()
                .map(|col| format!("{0}.{1} AS {0}__{1}", related.name, col.name))
                .collect::<Vec<_>>();
            select
                .left_join(
                    &format!("{} AS {}", related.foreign_table, related.name),
                    &related.join_cond(table),
                    Names::default(),
                )
                .cols(cols);
        }

        select.multi_where(params.conds.iter().cloned(), Conj::And);
        if !params.order.is_empty() {
            select.order(params.order.clone());
        }
        select.limit_page(params.page);
        Ok(select)
    }

    fn collect_records(
        self: &Rc<Self>,
        rows: Vec<Row>,
        params: &FetchParams,
        key: Option<&str>,
    ) -> ModelResult<Collection> {
        let mut records = rows
            .into_iter()
            .map(|row| self.new_record(row))
            .collect::<ModelResult<Vec<_>>>()?;
        self.eager_many(&mut records, params)?;

        let mut collection = Collection::new(Rc::clone(self));
        for record in records {
            match key {
                Some(col) => {
                    let key = record.raw(col).to_text();
                    collection.set_by_key(key, record);
                }
                None => collection.push(record),
            }
        }
        Ok(collection)
    }

    /// Loads every eager to-many relation with one query per relation.
    fn eager_many(&self, records: &mut [Record], params: &FetchParams) -> ModelResult<()> {
        for name in &params.eager {
            let related = self.related(name)?;
            if related.fetch != RelationFetch::All {
                continue;
            }
            let foreign = self.lookup(&related.foreign_model)?;

            let mut values: Vec<Value> = Vec::new();
            for record in records.iter() {
                let value = record.raw(&related.native_col);
                if !value.is_empty() && !values.contains(&value) {
                    values.push(value);
                }
            }

            let mut groups: HashMap<String, Vec<Row>> = HashMap::new();
            let mut fetched = 0;
            if !values.is_empty() {
                let rows = related.batch_select(&foreign, &values).fetch_all()?;
                fetched = rows.len();
                for mut row in rows {
                    let owner = match related.through {
                        Some(_) => row.remove(OWNER_KEY).unwrap_or_default(),
                        None => row.value(related.owner_key()),
                    };
                    groups.entry(owner.to_text()).or_default().push(row);
                }
            }

            for record in records.iter_mut() {
                let key = record.raw(&related.native_col).to_text();
                let rows = groups.get(&key).cloned().unwrap_or_default();
                let collection = foreign.new_collection(rows)?;
                record.put_loaded(name, RelatedValue::Many(collection))?;
            }
            debug!(
                "event=eager_load module=model status=ok model={} relation={name} parents={} rows={fetched}",
                self.name,
                records.len()
            );
        }
        Ok(())
    }

    fn check_declarations(&self) -> ModelResult<()> {
        let invalid = |message: String| Err(ModelError::InvalidSpec(message));
        for col in &self.calculate_cols {
            if self.table.has_col(col) {
                return invalid(format!(
                    "calculated column `{col}` shadows a column of `{}`",
                    self.table.name()
                ));
            }
        }
        for col in self.accessors.cols() {
            if !self.is_known_col(col) {
                return invalid(format!("accessor for unknown column `{col}` on `{}`", self.name));
            }
        }
        for (col, _) in &self.filters {
            if !self.is_known_col(col) {
                return invalid(format!("filter on unknown column `{col}` on `{}`", self.name));
            }
        }
        for (col, _) in &self.sequence_cols {
            if !self.table.has_col(col) {
                return invalid(format!("sequence on unknown column `{col}` on `{}`", self.name));
            }
        }
        for (index, (spec, _)) in self.relations.iter().enumerate() {
            if spec.name.trim().is_empty() {
                return invalid(format!("relation without a name on `{}`", self.name));
            }
            if self.is_known_col(&spec.name) {
                return invalid(format!(
                    "relation `{}` shadows a column of `{}`",
                    spec.name, self.name
                ));
            }
            if self.relations[..index]
                .iter()
                .any(|(other, _)| other.name == spec.name)
            {
                return invalid(format!(
                    "relation `{}` declared twice on `{}`",
                    spec.name, self.name
                ));
            }
            if spec.kind == RelationKind::HasManyThrough && spec.through.is_none() {
                return invalid(format!(
                    "relation `{}` on `{}` needs a pivot model",
                    spec.name, self.name
                ));
            }
        }
        Ok(())
    }
}

impl Debug for Model {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Model")
            .field("name", &self.name)
            .field("table", &self.table.name())
            .field("primary_col", &self.primary_col)
            .field("foreign_col", &self.foreign_col)
            .field(
                "relations",
                &self.relation_names().collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// `table.col AS col` for plain column names; anything else is kept.
fn qualify(table: &str, col: &str) -> String {
    let col = col.trim();
    if col == "*" {
        format!("{table}.*")
    } else if col.contains(['.', '(', ' ']) {
        col.to_string()
    } else {
        format!("{table}.{col} AS {col}")
    }
}

/// Name a selected column comes back under.
fn output_name(col: &str) -> String {
    let col = col.trim();
    let lower = col.to_ascii_lowercase();
    match lower.rfind(" as ") {
        Some(pos) => col[pos + 4..].trim().to_string(),
        None => col.rsplit('.').next().unwrap_or(col).to_string(),
    }
}

/// Singular form of a table name for foreign-key naming.
fn singular(name: &str) -> String {
    if let Some(stem) = name.strip_suffix("ies") {
        return format!("{stem}y");
    }
    if ["sses", "xes", "ches", "shes"]
        .iter()
        .any(|suffix| name.ends_with(suffix))
    {
        return name[..name.len() - 2].to_string();
    }
    name.strip_suffix('s').unwrap_or(name).to_string()
}
