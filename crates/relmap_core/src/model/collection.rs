//! Ordered, optionally keyed, set of records.
//!
//! # Invariants
//! - The positional list and the key index always describe the same
//!   records; every replacement or removal updates both.

use super::{Model, ModelError, ModelResult, Record, SaveOutcome};
use serde::Serialize;
use std::collections::HashMap;
use std::rc::Rc;

/// Paging metadata supplied by the fetch that built a collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Pager {
    pub page: i64,
    pub paging: u32,
    pub count: u64,
    pub pages: u64,
}

#[derive(Debug)]
struct Entry {
    key: Option<String>,
    record: Record,
}

#[derive(Debug)]
pub struct Collection {
    model: Rc<Model>,
    entries: Vec<Entry>,
    index: HashMap<String, usize>,
    pager: Option<Pager>,
}

impl Collection {
    pub fn new(model: Rc<Model>) -> Self {
        Self {
            model,
            entries: Vec::new(),
            index: HashMap::new(),
            pager: None,
        }
    }

    pub fn model(&self) -> &Rc<Model> {
        &self.model
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn pager(&self) -> Option<&Pager> {
        self.pager.as_ref()
    }

    pub fn set_pager(&mut self, pager: Pager) {
        self.pager = Some(pager);
    }

    pub fn push(&mut self, record: Record) {
        self.entries.push(Entry { key: None, record });
    }

    /// Adds or replaces the record stored under `key`.
    pub fn set_by_key(&mut self, key: impl Into<String>, record: Record) -> Option<Record> {
        let key = key.into();
        match self.index.get(&key) {
            Some(&position) => Some(std::mem::replace(&mut self.entries[position].record, record)),
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push(Entry {
                    key: Some(key),
                    record,
                });
                None
            }
        }
    }

    /// Replaces the record at `position`, keeping its key; out-of-range
    /// positions append instead.
    pub fn set(&mut self, position: usize, record: Record) -> Option<Record> {
        match self.entries.get_mut(position) {
            Some(entry) => Some(std::mem::replace(&mut entry.record, record)),
            None => {
                self.push(record);
                None
            }
        }
    }

    pub fn get(&self, position: usize) -> Option<&Record> {
        self.entries.get(position).map(|entry| &entry.record)
    }

    pub fn get_mut(&mut self, position: usize) -> Option<&mut Record> {
        self.entries.get_mut(position).map(|entry| &mut entry.record)
    }

    pub fn get_by_key(&self, key: &str) -> Option<&Record> {
        let position = *self.index.get(key)?;
        self.get(position)
    }

    pub fn get_by_key_mut(&mut self, key: &str) -> Option<&mut Record> {
        let position = *self.index.get(key)?;
        self.get_mut(position)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// Key of the record at `position`, when the collection is keyed.
    pub fn key_at(&self, position: usize) -> Option<&str> {
        self.entries.get(position)?.key.as_deref()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().filter_map(|entry| entry.key.as_deref())
    }

    pub fn remove(&mut self, position: usize) -> Option<Record> {
        if position >= self.entries.len() {
            return None;
        }
        let entry = self.entries.remove(position);
        self.reindex();
        Some(entry.record)
    }

    pub fn remove_by_key(&mut self, key: &str) -> Option<Record> {
        let position = *self.index.get(key)?;
        self.remove(position)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.entries.iter().map(|entry| &entry.record)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Record> {
        self.entries.iter_mut().map(|entry| &mut entry.record)
    }

    /// Saves every member, continuing past failures.
    ///
    /// Returns the number of members saved, or every failed position with
    /// its error.
    pub fn save(&mut self) -> ModelResult<usize> {
        let mut saved = 0;
        let mut failures = Vec::new();
        for (position, entry) in self.entries.iter_mut().enumerate() {
            match entry.record.save() {
                Ok(SaveOutcome::Unchanged | SaveOutcome::Inserted | SaveOutcome::Updated) => {
                    saved += 1;
                }
                Err(err) => failures.push((position, err)),
            }
        }
        if failures.is_empty() {
            Ok(saved)
        } else {
            Err(ModelError::Collection { saved, failures })
        }
    }

    /// A JSON object by key when every member is keyed, an array otherwise.
    pub fn to_array(&self) -> serde_json::Value {
        let keyed = !self.entries.is_empty() && self.entries.iter().all(|entry| entry.key.is_some());
        if keyed {
            let map = self
                .entries
                .iter()
                .filter_map(|entry| {
                    entry
                        .key
                        .clone()
                        .map(|key| (key, entry.record.to_array()))
                })
                .collect::<serde_json::Map<_, _>>();
            serde_json::Value::Object(map)
        } else {
            serde_json::Value::Array(self.iter().map(Record::to_array).collect())
        }
    }

    fn reindex(&mut self) {
        self.index = self
            .entries
            .iter()
            .enumerate()
            .filter_map(|(position, entry)| entry.key.clone().map(|key| (key, position)))
            .collect();
    }
}

impl<'a> IntoIterator for &'a Collection {
    type Item = &'a Record;
    type IntoIter = Box<dyn Iterator<Item = &'a Record> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}
