//! Per-column accessor overrides, looked up by name on every field access.

use super::{ModelResult, Record};
use crate::value::Value;
use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::rc::Rc;

pub type Getter = Rc<dyn Fn(&Record) -> Value>;
pub type Setter = Rc<dyn Fn(&mut Record, Value) -> ModelResult<()>>;
pub type IsSet = Rc<dyn Fn(&Record) -> bool>;
pub type Unset = Rc<dyn Fn(&mut Record) -> ModelResult<()>>;

/// Custom behavior for one column; unset hooks fall back to raw storage.
#[derive(Clone, Default)]
pub struct Accessor {
    pub get: Option<Getter>,
    pub set: Option<Setter>,
    pub isset: Option<IsSet>,
    pub unset: Option<Unset>,
}

impl Accessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn getter(mut self, get: impl Fn(&Record) -> Value + 'static) -> Self {
        self.get = Some(Rc::new(get));
        self
    }

    pub fn setter(mut self, set: impl Fn(&mut Record, Value) -> ModelResult<()> + 'static) -> Self {
        self.set = Some(Rc::new(set));
        self
    }

    pub fn isset(mut self, isset: impl Fn(&Record) -> bool + 'static) -> Self {
        self.isset = Some(Rc::new(isset));
        self
    }

    pub fn unset(mut self, unset: impl Fn(&mut Record) -> ModelResult<()> + 'static) -> Self {
        self.unset = Some(Rc::new(unset));
        self
    }
}

impl Debug for Accessor {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Accessor")
            .field("get", &self.get.is_some())
            .field("set", &self.set.is_some())
            .field("isset", &self.isset.is_some())
            .field("unset", &self.unset.is_some())
            .finish()
    }
}

/// Column name to accessor table, built once per model.
#[derive(Debug, Clone, Default)]
pub struct Accessors {
    table: HashMap<String, Accessor>,
}

impl Accessors {
    pub fn insert(&mut self, col: impl Into<String>, accessor: Accessor) {
        self.table.insert(col.into(), accessor);
    }

    pub fn cols(&self) -> impl Iterator<Item = &str> {
        self.table.keys().map(String::as_str)
    }

    pub fn getter(&self, col: &str) -> Option<Getter> {
        self.table.get(col).and_then(|accessor| accessor.get.clone())
    }

    pub fn setter(&self, col: &str) -> Option<Setter> {
        self.table.get(col).and_then(|accessor| accessor.set.clone())
    }

    pub fn isset(&self, col: &str) -> Option<IsSet> {
        self.table.get(col).and_then(|accessor| accessor.isset.clone())
    }

    pub fn unset(&self, col: &str) -> Option<Unset> {
        self.table.get(col).and_then(|accessor| accessor.unset.clone())
    }
}
