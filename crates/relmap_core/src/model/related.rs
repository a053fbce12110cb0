//! Relationship declarations and their resolved fetch criteria.
//!
//! # Responsibility
//! - Describe how one model relates to another.
//! - Fill unset key columns from primary-key and foreign-key conventions.
//! - Build the selects used for lazy and batched (eager) loading.
//!
//! # Invariants
//! - Relation conditions and order entries address the foreign table by
//!   the relation name, which is its alias in every generated select.
//! - Batched selects never run with an empty `IN` list.

use super::{Collection, Model, ModelError, ModelResult, Record};
use crate::query::{Cond, Names, Select};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::rc::Rc;

/// Alias of the pivot key column added to batched has-many-through selects.
pub const OWNER_KEY: &str = "_owner_key";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    HasOne,
    /// Like `HasOne`, but a missing row yields no placeholder record.
    HasOneOrNull,
    BelongsTo,
    HasMany,
    HasManyThrough,
}

impl RelationKind {
    pub fn is_to_one(self) -> bool {
        matches!(self, Self::HasOne | Self::HasOneOrNull | Self::BelongsTo)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::HasOne => "has_one",
            Self::HasOneOrNull => "has_one_or_null",
            Self::BelongsTo => "belongs_to",
            Self::HasMany => "has_many",
            Self::HasManyThrough => "has_many_through",
        }
    }
}

/// Whether a relation loads one record or a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationFetch {
    One,
    All,
}

/// A relation as declared on a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationSpec {
    pub name: String,
    pub kind: RelationKind,
    pub foreign_model: String,
    #[serde(default)]
    pub native_col: Option<String>,
    #[serde(default)]
    pub foreign_col: Option<String>,
    /// Pivot model for has-many-through.
    #[serde(default)]
    pub through: Option<String>,
    #[serde(default)]
    pub through_native_col: Option<String>,
    #[serde(default)]
    pub through_foreign_col: Option<String>,
    #[serde(default)]
    pub conds: Vec<String>,
    #[serde(default)]
    pub order: Vec<String>,
}

impl RelationSpec {
    pub fn new(name: impl Into<String>, kind: RelationKind, foreign_model: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            foreign_model: foreign_model.into(),
            native_col: None,
            foreign_col: None,
            through: None,
            through_native_col: None,
            through_foreign_col: None,
            conds: Vec::new(),
            order: Vec::new(),
        }
    }

    pub fn has_one(name: impl Into<String>, foreign_model: impl Into<String>) -> Self {
        Self::new(name, RelationKind::HasOne, foreign_model)
    }

    pub fn has_one_or_null(name: impl Into<String>, foreign_model: impl Into<String>) -> Self {
        Self::new(name, RelationKind::HasOneOrNull, foreign_model)
    }

    pub fn belongs_to(name: impl Into<String>, foreign_model: impl Into<String>) -> Self {
        Self::new(name, RelationKind::BelongsTo, foreign_model)
    }

    pub fn has_many(name: impl Into<String>, foreign_model: impl Into<String>) -> Self {
        Self::new(name, RelationKind::HasMany, foreign_model)
    }

    pub fn has_many_through(
        name: impl Into<String>,
        foreign_model: impl Into<String>,
        through: impl Into<String>,
    ) -> Self {
        let mut spec = Self::new(name, RelationKind::HasManyThrough, foreign_model);
        spec.through = Some(through.into());
        spec
    }

    pub fn native_col(mut self, col: impl Into<String>) -> Self {
        self.native_col = Some(col.into());
        self
    }

    pub fn foreign_col(mut self, col: impl Into<String>) -> Self {
        self.foreign_col = Some(col.into());
        self
    }

    /// Pivot columns pointing at the native and the foreign model.
    pub fn through_cols(mut self, native: impl Into<String>, foreign: impl Into<String>) -> Self {
        self.through_native_col = Some(native.into());
        self.through_foreign_col = Some(foreign.into());
        self
    }

    pub fn cond(mut self, cond: impl Into<String>) -> Self {
        self.conds.push(cond.into());
        self
    }

    pub fn order(mut self, spec: impl Into<Names>) -> Self {
        self.order.extend(spec.into().into_vec());
        self
    }
}

/// Pivot table details for has-many-through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Through {
    pub model: String,
    pub table: String,
    /// Pivot column holding the native key.
    pub native_col: String,
    /// Pivot column holding the foreign key.
    pub foreign_col: String,
}

/// A relation with every column resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct Related {
    pub name: String,
    pub kind: RelationKind,
    pub fetch: RelationFetch,
    pub foreign_model: String,
    pub foreign_table: String,
    /// Column on the native record whose value selects the related rows.
    pub native_col: String,
    /// Column on the foreign table matched against `native_col`.
    pub foreign_col: String,
    pub through: Option<Through>,
    pub conds: Vec<String>,
    pub order: Vec<String>,
}

impl Related {
    /// Resolves defaults against the native, foreign and pivot models.
    pub(crate) fn resolve(
        spec: &RelationSpec,
        native: &Model,
        foreign: &Model,
        through: Option<&Model>,
    ) -> ModelResult<Self> {
        let (native_col, foreign_col) = match spec.kind {
            RelationKind::HasOne | RelationKind::HasOneOrNull | RelationKind::HasMany => (
                spec.native_col
                    .clone()
                    .unwrap_or_else(|| native.primary_col().to_string()),
                spec.foreign_col
                    .clone()
                    .unwrap_or_else(|| native.foreign_col().to_string()),
            ),
            RelationKind::BelongsTo => (
                spec.native_col
                    .clone()
                    .unwrap_or_else(|| foreign.foreign_col().to_string()),
                spec.foreign_col
                    .clone()
                    .unwrap_or_else(|| foreign.primary_col().to_string()),
            ),
            RelationKind::HasManyThrough => (
                spec.native_col
                    .clone()
                    .unwrap_or_else(|| native.primary_col().to_string()),
                spec.foreign_col
                    .clone()
                    .unwrap_or_else(|| foreign.primary_col().to_string()),
            ),
        };
        require_col(native, &spec.name, &native_col)?;
        require_col(foreign, &spec.name, &foreign_col)?;

        let through = match (spec.kind, through) {
            (RelationKind::HasManyThrough, Some(pivot)) => {
                let native_key = spec
                    .through_native_col
                    .clone()
                    .unwrap_or_else(|| native.foreign_col().to_string());
                let foreign_key = spec
                    .through_foreign_col
                    .clone()
                    .unwrap_or_else(|| foreign.foreign_col().to_string());
                require_col(pivot, &spec.name, &native_key)?;
                require_col(pivot, &spec.name, &foreign_key)?;
                Some(Through {
                    model: pivot.name().to_string(),
                    table: pivot.table().name().to_string(),
                    native_col: native_key,
                    foreign_col: foreign_key,
                })
            }
            (RelationKind::HasManyThrough, None) => {
                return Err(ModelError::InvalidSpec(format!(
                    "relation `{}` on `{}` needs a pivot model",
                    spec.name,
                    native.name()
                )));
            }
            _ => None,
        };

        Ok(Self {
            name: spec.name.clone(),
            kind: spec.kind,
            fetch: if spec.kind.is_to_one() {
                RelationFetch::One
            } else {
                RelationFetch::All
            },
            foreign_model: foreign.name().to_string(),
            foreign_table: foreign.table().name().to_string(),
            native_col,
            foreign_col,
            through,
            conds: spec.conds.clone(),
            order: spec.order.clone(),
        })
    }

    /// Column of a fetched foreign row that carries the native value.
    pub fn owner_key(&self) -> &str {
        match self.through {
            Some(_) => OWNER_KEY,
            None => &self.foreign_col,
        }
    }

    /// Rows related to one native value; `page` 0 means all of them.
    pub fn select_for(&self, foreign: &Model, native_val: &Value, page: i64) -> Select {
        let mut select = self.base_select(foreign);
        select.and_where(Cond::bind(format!("{} = ?", self.match_col()), native_val.clone()));
        match self.fetch {
            RelationFetch::One => {
                select.limit(1, 0);
            }
            RelationFetch::All => {
                select.limit_page(page);
            }
        }
        select
    }

    /// Rows related to any of `values`, for eager loading in one query.
    pub fn batch_select(&self, foreign: &Model, values: &[Value]) -> Select {
        let mut select = self.base_select(foreign);
        if let Some(through) = &self.through {
            select.cols(vec![format!(
                "{}.{} AS {OWNER_KEY}",
                through.table, through.native_col
            )]);
        }
        select.and_where(Cond::bind_list(
            format!("{} IN (?)", self.match_col()),
            values.iter().cloned(),
        ));
        select
    }

    /// The value stored when there is nothing to load.
    pub fn empty_value(&self, foreign: &Rc<Model>, native_val: &Value) -> ModelResult<RelatedValue> {
        Ok(match self.kind {
            RelationKind::HasOne => {
                let mut record = foreign.fetch_new()?;
                if !native_val.is_empty() {
                    record.set(&self.foreign_col, native_val.clone())?;
                }
                RelatedValue::One(Some(record))
            }
            RelationKind::HasOneOrNull | RelationKind::BelongsTo => RelatedValue::One(None),
            RelationKind::HasMany | RelationKind::HasManyThrough => {
                RelatedValue::Many(Collection::new(Rc::clone(foreign)))
            }
        })
    }

    /// Extra LEFT JOIN condition for eager to-one loading.
    pub(crate) fn join_cond(&self, native_table: &str) -> String {
        let mut cond = format!(
            "{}.{} = {native_table}.{}",
            self.name, self.foreign_col, self.native_col
        );
        for extra in &self.conds {
            cond.push_str(" AND ");
            cond.push_str(extra);
        }
        cond
    }

    fn match_col(&self) -> String {
        match &self.through {
            Some(through) => format!("{}.{}", through.table, through.native_col),
            None => format!("{}.{}", self.name, self.foreign_col),
        }
    }

    fn base_select(&self, foreign: &Model) -> Select {
        let mut select = Select::new(Rc::clone(foreign.table().backend()));
        select.paging(foreign.table().paging()).from(
            &format!("{} AS {}", self.foreign_table, self.name),
            foreign.table().col_names(),
        );
        if let Some(through) = &self.through {
            select.join(
                &through.table,
                &format!(
                    "{}.{} = {}.{}",
                    through.table, through.foreign_col, self.name, self.foreign_col
                ),
                Names::default(),
            );
        }
        for cond in &self.conds {
            select.and_where(cond.as_str());
        }
        if !self.order.is_empty() {
            select.order(self.order.clone());
        }
        select
    }
}

fn require_col(model: &Model, relation: &str, col: &str) -> ModelResult<()> {
    if model.table().has_col(col) {
        Ok(())
    } else {
        Err(ModelError::InvalidSpec(format!(
            "relation `{relation}` names unknown column `{}.{col}`",
            model.table().name()
        )))
    }
}

/// Loaded data of one relation.
#[derive(Debug)]
pub enum RelatedValue {
    One(Option<Record>),
    Many(Collection),
}

impl RelatedValue {
    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Self::One(record) => record.as_ref(),
            Self::Many(_) => None,
        }
    }

    pub fn as_record_mut(&mut self) -> Option<&mut Record> {
        match self {
            Self::One(record) => record.as_mut(),
            Self::Many(_) => None,
        }
    }

    pub fn as_collection(&self) -> Option<&Collection> {
        match self {
            Self::Many(collection) => Some(collection),
            Self::One(_) => None,
        }
    }

    pub fn as_collection_mut(&mut self) -> Option<&mut Collection> {
        match self {
            Self::Many(collection) => Some(collection),
            Self::One(_) => None,
        }
    }

    pub fn to_array(&self) -> serde_json::Value {
        match self {
            Self::One(Some(record)) => record.to_array(),
            Self::One(None) => serde_json::Value::Null,
            Self::Many(collection) => collection.to_array(),
        }
    }

    /// Fills `col` on every loaded record where it is still empty.
    pub(crate) fn link(&mut self, col: &str, value: &Value) -> ModelResult<()> {
        if value.is_empty() {
            return Ok(());
        }
        match self {
            Self::One(Some(record)) => link_record(record, col, value),
            Self::One(None) => Ok(()),
            Self::Many(collection) => {
                for record in collection.iter_mut() {
                    link_record(record, col, value)?;
                }
                Ok(())
            }
        }
    }

    pub(crate) fn save(&mut self) -> ModelResult<()> {
        match self {
            Self::One(Some(record)) => record.save().map(|_| ()),
            Self::One(None) => Ok(()),
            Self::Many(collection) => collection.save().map(|_| ()),
        }
    }
}

fn link_record(record: &mut Record, col: &str, value: &Value) -> ModelResult<()> {
    if record.raw(col).is_empty() {
        record.set(col, value.clone())?;
    }
    Ok(())
}
