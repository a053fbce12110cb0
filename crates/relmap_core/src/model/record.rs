//! Active record: one row of a model plus its relation slots.
//!
//! # Responsibility
//! - Hold column data, lifecycle status and invalid-field messages.
//! - Persist through the owning model with hook points around each step.
//! - Resolve relations lazily, once per slot, at the slot's current page.
//!
//! # Invariants
//! - A `Deleted` record rejects every access and mutation.
//! - Mutating a `New` record keeps it `New`; any other status becomes `Dirty`.
//! - `to_array` never loads a relation.

use super::filter::FilterChain;
use super::related::{RelatedValue, RelationKind};
use super::{Model, ModelError, ModelResult};
use crate::schema::{Rule, ValidationError};
use crate::value::{Row, Value};
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt::{Display, Formatter};
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    New,
    Clean,
    Dirty,
    Invalid,
    Inserted,
    Updated,
    Deleted,
}

impl RecordStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Clean => "clean",
            Self::Dirty => "dirty",
            Self::Invalid => "invalid",
            Self::Inserted => "inserted",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
        }
    }
}

impl Display for RecordStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a successful `save` did to the primary row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// The record was clean; no statement was issued for it.
    Unchanged,
    Inserted,
    Updated,
}

/// Load state of one relation.
#[derive(Debug)]
pub enum RelationSlot {
    Unloaded,
    Loaded(RelatedValue),
}

/// One entity instance.
#[derive(Debug)]
pub struct Record {
    model: Rc<Model>,
    data: Row,
    slots: Vec<(String, RelationSlot)>,
    pages: HashMap<String, i64>,
    status: RecordStatus,
    invalid: BTreeMap<String, Vec<String>>,
    filters: Vec<(String, Rule)>,
}

impl Record {
    pub(crate) fn blank(model: Rc<Model>, status: RecordStatus) -> Self {
        let slots = model
            .relation_names()
            .map(|name| (name.to_string(), RelationSlot::Unloaded))
            .collect();
        Self {
            model,
            data: Row::new(),
            slots,
            pages: HashMap::new(),
            status,
            invalid: BTreeMap::new(),
            filters: Vec::new(),
        }
    }

    pub fn model(&self) -> &Rc<Model> {
        &self.model
    }

    pub fn status(&self) -> RecordStatus {
        self.status
    }

    pub fn set_status(&mut self, status: RecordStatus) {
        self.status = status;
    }

    pub fn primary_col(&self) -> &str {
        self.model.primary_col()
    }

    pub fn primary_val(&self) -> Value {
        self.data.value(self.model.primary_col())
    }

    /// Stored column data, without accessors.
    pub fn data(&self) -> &Row {
        &self.data
    }

    /// One stored value, bypassing accessors; absent columns are `Null`.
    pub fn raw(&self, col: &str) -> Value {
        self.data.value(col)
    }

    /// Stores a value directly; meant for accessor implementations.
    pub fn set_raw(&mut self, col: impl Into<String>, value: impl Into<Value>) {
        self.data.set(col, value);
    }

    /// Reads a column or calculated column through its accessor.
    pub fn get(&self, col: &str) -> ModelResult<Value> {
        self.check_deleted()?;
        if let Some(get) = self.model.accessors().getter(col) {
            return Ok(get(self));
        }
        if self.data.contains_key(col) || self.model.is_known_col(col) {
            Ok(self.data.value(col))
        } else {
            Err(self.unknown_col(col))
        }
    }

    pub fn set(&mut self, col: &str, value: impl Into<Value>) -> ModelResult<()> {
        self.check_deleted()?;
        if !self.model.is_known_col(col) {
            return Err(self.unknown_col(col));
        }
        if self.status != RecordStatus::New {
            self.status = RecordStatus::Dirty;
        }
        match self.model.accessors().setter(col) {
            Some(setter) => setter(self, value.into()),
            None => {
                self.data.set(col, value);
                Ok(())
            }
        }
    }

    pub fn unset(&mut self, col: &str) -> ModelResult<()> {
        self.check_deleted()?;
        match self.model.accessors().unset(col) {
            Some(unsetter) => unsetter(self),
            None => {
                if self.data.contains_key(col) {
                    self.data.set(col, Value::Null);
                }
                Ok(())
            }
        }
    }

    pub fn is_set(&self, col: &str) -> ModelResult<bool> {
        self.check_deleted()?;
        Ok(match self.model.accessors().isset(col) {
            Some(isset) => isset(self),
            None => self.data.get(col).is_some_and(|value| !value.is_null()),
        })
    }

    /// Loads column data; `<relation>__<col>` keys become eager to-one data.
    ///
    /// Keys that are neither columns nor to-one relation data are ignored.
    pub fn load(&mut self, row: Row) -> ModelResult<()> {
        self.check_deleted()?;
        let mut eager: Vec<(String, Row)> = Vec::new();
        let mut plain = Vec::new();
        for (key, value) in row {
            let target = key
                .split_once("__")
                .filter(|(relation, _)| self.is_to_one(relation))
                .map(|(relation, col)| (relation.to_string(), col.to_string()));
            match target {
                Some((relation, col)) => match eager.iter_mut().find(|(name, _)| *name == relation) {
                    Some((_, data)) => data.set(col, value),
                    None => eager.push((relation, Row::new().with(col, value))),
                },
                None => plain.push((key, value)),
            }
        }

        for (key, value) in plain {
            if self.model.is_known_col(&key) {
                self.set(&key, value)?;
            } else {
                debug!(
                    "event=record_load module=model status=skip model={} key={key}",
                    self.model.name()
                );
            }
        }

        for (name, data) in eager {
            let value = self.model.eager_to_one(self, &name, data)?;
            self.put_loaded(&name, value)?;
            self.pages.insert(name, 0);
        }
        Ok(())
    }

    /// Loads only the whitelisted columns of `row`.
    pub fn load_cols(&mut self, row: Row, cols: &[&str]) -> ModelResult<()> {
        let mut row = row;
        row.retain(|key, _| cols.contains(&key));
        self.load(row)
    }

    /// Related data, loading it on first touch (may query the database).
    pub fn related(&mut self, name: &str) -> ModelResult<&RelatedValue> {
        self.related_mut(name).map(|value| &*value)
    }

    pub fn related_mut(&mut self, name: &str) -> ModelResult<&mut RelatedValue> {
        self.check_deleted()?;
        let index = self.slot_index(name)?;
        if let RelationSlot::Unloaded = self.slots[index].1 {
            let page = self.pages.get(name).copied().unwrap_or(0);
            let value = self.model.load_related(self, name, page)?;
            self.slots[index].1 = RelationSlot::Loaded(value);
        }
        match &mut self.slots[index].1 {
            RelationSlot::Loaded(value) => Ok(value),
            RelationSlot::Unloaded => Err(self.model.unknown_relation(name)),
        }
    }

    /// Related data if already loaded; never queries.
    pub fn loaded(&self, name: &str) -> Option<&RelatedValue> {
        self.slots.iter().find_map(|(slot_name, slot)| match slot {
            RelationSlot::Loaded(value) if slot_name == name => Some(value),
            _ => None,
        })
    }

    /// Replaces a relation's data; it is saved along with this record.
    pub fn set_related(&mut self, name: &str, value: RelatedValue) -> ModelResult<()> {
        self.check_deleted()?;
        self.put_loaded(name, value)
    }

    pub fn related_page(&self, name: &str) -> ModelResult<i64> {
        self.check_deleted()?;
        self.slot_index(name)?;
        Ok(self.pages.get(name).copied().unwrap_or(0))
    }

    /// Sets the page lazily loaded next; the slot returns to unloaded.
    pub fn set_related_page(&mut self, name: &str, page: i64) -> ModelResult<()> {
        self.check_deleted()?;
        let index = self.slot_index(name)?;
        self.pages.insert(name.to_string(), page);
        self.slots[index].1 = RelationSlot::Unloaded;
        Ok(())
    }

    /// Saves this record unless clean, then every loaded relation.
    pub fn save(&mut self) -> ModelResult<SaveOutcome> {
        self.check_deleted()?;
        let outcome = if self.status == RecordStatus::Clean {
            SaveOutcome::Unchanged
        } else {
            self.save_primary()?
        };
        self.save_related()?;
        Ok(outcome)
    }

    /// Loads `row` at save time, marking the record dirty first.
    pub fn save_with(&mut self, row: Row) -> ModelResult<SaveOutcome> {
        self.check_deleted()?;
        self.load(row)?;
        if self.status != RecordStatus::New {
            self.status = RecordStatus::Dirty;
        }
        self.save()
    }

    pub fn delete(&mut self) -> ModelResult<()> {
        self.check_deleted()?;
        let hooks = Rc::clone(self.model.hooks());
        hooks.pre_delete(self)?;
        let removed = self.model.delete_row(&self.primary_val())?;
        self.status = RecordStatus::Deleted;
        info!(
            "event=record_delete module=model status=ok model={} rows={removed}",
            self.model.name()
        );
        hooks.post_delete(self)
    }

    /// Reloads columns by primary key; returns whether a row was found.
    /// Calculated columns and relations are left as they are.
    pub fn refresh(&mut self) -> ModelResult<bool> {
        self.check_deleted()?;
        if self.status == RecordStatus::New {
            return Ok(false);
        }
        let Some(row) = self.model.table().fetch(self.primary_val())? else {
            return Ok(false);
        };
        self.load(row)?;
        self.status = RecordStatus::Clean;
        Ok(true)
    }

    /// Runs the model and per-record filter chain over the current data.
    pub fn filter(&mut self) -> ModelResult<()> {
        self.check_deleted()?;
        let hooks = Rc::clone(self.model.hooks());
        hooks.pre_filter(self)?;

        let chain = FilterChain::for_model(&self.model, &self.filters);
        if let Err(mut err) = chain.apply(|col| self.get(col).unwrap_or_default()) {
            let fields = err.fields().keys().cloned().collect::<Vec<_>>();
            for field in fields {
                if let Some(message) = self.model.invalid_message(&field) {
                    err.replace(&field, vec![message.to_string()]);
                }
            }
            self.status = RecordStatus::Invalid;
            self.invalid = err.fields().clone();
            return Err(ModelError::Validation(err));
        }

        hooks.post_filter(self)
    }

    /// Adds a rule applied by `filter` on this record only.
    pub fn add_filter(&mut self, col: impl Into<String>, rule: Rule) {
        self.filters.push((col.into(), rule));
    }

    pub fn set_invalid(&mut self, col: impl Into<String>, message: impl Into<String>) {
        self.status = RecordStatus::Invalid;
        self.invalid.entry(col.into()).or_default().push(message.into());
    }

    pub fn set_invalids(&mut self, list: &BTreeMap<String, Vec<String>>) {
        self.status = RecordStatus::Invalid;
        for (col, messages) in list {
            self.invalid
                .entry(col.clone())
                .or_default()
                .extend(messages.iter().cloned());
        }
    }

    /// Messages for one column; empty when it is valid.
    pub fn get_invalid(&self, col: &str) -> &[String] {
        self.invalid.get(col).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn invalids(&self) -> &BTreeMap<String, Vec<String>> {
        &self.invalid
    }

    /// Plain nested structure of columns, calculated columns and loaded
    /// relations; unloaded to-many relations are `[]`, to-one are `null`.
    pub fn to_array(&self) -> serde_json::Value {
        let accessors = self.model.accessors();
        let mut map = serde_json::Map::new();
        for (key, value) in self.data.iter() {
            let value = match accessors.getter(key) {
                Some(get) => get(self),
                None => value.clone(),
            };
            map.insert(key.to_string(), value.to_json());
        }
        for col in self.model.calculate_cols() {
            if !map.contains_key(col) {
                let value = accessors
                    .getter(col)
                    .map_or(Value::Null, |get| get(self));
                map.insert(col.clone(), value.to_json());
            }
        }
        for (name, slot) in &self.slots {
            let value = match slot {
                RelationSlot::Loaded(value) => value.to_array(),
                RelationSlot::Unloaded => match self.model.relation_kind(name) {
                    Some(kind) if kind.is_to_one() => serde_json::Value::Null,
                    _ => serde_json::Value::Array(Vec::new()),
                },
            };
            map.insert(name.clone(), value);
        }
        serde_json::Value::Object(map)
    }

    pub(crate) fn put_loaded(&mut self, name: &str, value: RelatedValue) -> ModelResult<()> {
        let index = self.slot_index(name)?;
        self.slots[index].1 = RelationSlot::Loaded(value);
        Ok(())
    }

    fn save_primary(&mut self) -> ModelResult<SaveOutcome> {
        let hooks = Rc::clone(self.model.hooks());
        self.invalid.clear();
        hooks.pre_save(self)?;
        let outcome = if self.primary_val().is_empty() {
            hooks.pre_insert(self)?;
            self.write(SaveOutcome::Inserted)?;
            hooks.post_insert(self)?;
            SaveOutcome::Inserted
        } else {
            hooks.pre_update(self)?;
            self.write(SaveOutcome::Updated)?;
            hooks.post_update(self)?;
            SaveOutcome::Updated
        };
        hooks.post_save(self)?;
        Ok(outcome)
    }

    fn write(&mut self, outcome: SaveOutcome) -> ModelResult<()> {
        self.filter()?;
        let data = self.model.writable(&self.data);
        let result = match outcome {
            SaveOutcome::Updated => self.model.update_row(data, &self.primary_val()),
            SaveOutcome::Inserted | SaveOutcome::Unchanged => self.model.insert_row(data),
        };
        match result {
            Ok(row) => {
                self.data.merge(row);
                self.status = match outcome {
                    SaveOutcome::Updated => RecordStatus::Updated,
                    SaveOutcome::Inserted | SaveOutcome::Unchanged => RecordStatus::Inserted,
                };
                info!(
                    "event=record_save module=model status=ok model={} outcome={}",
                    self.model.name(),
                    self.status
                );
                Ok(())
            }
            Err(ModelError::Validation(err)) => {
                self.fail_validation(&err);
                Err(ModelError::Validation(err))
            }
            Err(ModelError::Db(err)) => {
                warn!(
                    "event=record_save module=model status=error model={} error={}",
                    self.model.name(),
                    err.diagnostic()
                );
                self.set_invalid("*", err.diagnostic());
                Err(ModelError::Db(err))
            }
            Err(other) => Err(other),
        }
    }

    fn fail_validation(&mut self, err: &ValidationError) {
        info!(
            "event=record_save module=model status=error model={} reason=validation fields={}",
            self.model.name(),
            err.fields().len()
        );
        self.set_invalids(err.fields());
    }

    fn save_related(&mut self) -> ModelResult<()> {
        let hooks = Rc::clone(self.model.hooks());
        hooks.pre_save_related(self)?;
        for index in 0..self.slots.len() {
            if let RelationSlot::Unloaded = self.slots[index].1 {
                continue;
            }
            let name = self.slots[index].0.clone();
            let related = self.model.related(&name)?;
            let link = match related.kind {
                RelationKind::HasOne | RelationKind::HasOneOrNull | RelationKind::HasMany => {
                    Some((related.foreign_col.clone(), self.raw(&related.native_col)))
                }
                RelationKind::BelongsTo | RelationKind::HasManyThrough => None,
            };
            if let RelationSlot::Loaded(value) = &mut self.slots[index].1 {
                if let Some((col, native_val)) = link {
                    value.link(&col, &native_val)?;
                }
                value.save()?;
            }
        }
        hooks.post_save_related(self)
    }

    fn slot_index(&self, name: &str) -> ModelResult<usize> {
        self.slots
            .iter()
            .position(|(slot_name, _)| slot_name == name)
            .ok_or_else(|| self.model.unknown_relation(name))
    }

    fn is_to_one(&self, name: &str) -> bool {
        self.model
            .relation_kind(name)
            .is_some_and(RelationKind::is_to_one)
    }

    fn check_deleted(&self) -> ModelResult<()> {
        if self.status == RecordStatus::Deleted {
            Err(ModelError::Deleted {
                model: self.model.name().to_string(),
            })
        } else {
            Ok(())
        }
    }

    fn unknown_col(&self, col: &str) -> ModelError {
        ModelError::UnknownColumn {
            model: self.model.name().to_string(),
            col: col.to_string(),
        }
    }
}
