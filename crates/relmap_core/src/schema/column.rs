//! Column and index declarations.

use super::valid::{Rule, ValidRule};
use crate::value::Value;
use chrono::format::{Item, StrftimeItems};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// Default chrono format for timestamp columns and the `now` callback.
pub const ISO_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";
const ISO_DATE_FORMAT: &str = "%Y-%m-%d";

/// Declared storage type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Bool,
    Char,
    #[default]
    Varchar,
    Smallint,
    Int,
    Bigint,
    Float,
    Numeric,
    Date,
    Time,
    Timestamp,
}

impl ColumnType {
    /// Signed range for integer types.
    pub fn int_range(self) -> Option<(i128, i128)> {
        match self {
            Self::Smallint => Some((i128::from(i16::MIN), i128::from(i16::MAX))),
            Self::Int => Some((i128::from(i32::MIN), i128::from(i32::MAX))),
            Self::Bigint => Some((i128::from(i64::MIN), i128::from(i64::MAX))),
            _ => None,
        }
    }

    pub fn is_integer(self) -> bool {
        self.int_range().is_some()
    }
}

/// How a column's value is produced when the caller supplies none.
///
/// Declared in JSON as a bare scalar or as `{"callback": name, "args": [..]}`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "RawDefault", into = "RawDefault")]
pub enum DefaultValue {
    #[default]
    None,
    Literal(Value),
    /// A built-in generator: `now` (optional chrono format), `today`, `uuid`.
    Callback { name: String, args: Vec<Value> },
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawDefault {
    Callback {
        callback: String,
        #[serde(default)]
        args: Vec<Value>,
    },
    Literal(Value),
}

impl From<RawDefault> for DefaultValue {
    fn from(value: RawDefault) -> Self {
        match value {
            RawDefault::Callback { callback, args } => Self::Callback {
                name: callback,
                args,
            },
            RawDefault::Literal(Value::Null) => Self::None,
            RawDefault::Literal(value) => Self::Literal(value),
        }
    }
}

impl From<DefaultValue> for RawDefault {
    fn from(value: DefaultValue) -> Self {
        match value {
            DefaultValue::None => Self::Literal(Value::Null),
            DefaultValue::Literal(value) => Self::Literal(value),
            DefaultValue::Callback { name, args } => Self::Callback {
                callback: name,
                args,
            },
        }
    }
}

impl DefaultValue {
    pub fn callback(name: impl Into<String>, args: Vec<Value>) -> Self {
        Self::Callback {
            name: name.into(),
            args,
        }
    }

    /// Current local time as `YYYY-MM-DDTHH:MM:SS`.
    pub fn now() -> Self {
        Self::callback("now", Vec::new())
    }

    /// Checks that the descriptor can be resolved.
    pub fn check(&self) -> Result<(), String> {
        let Self::Callback { name, args } = self else {
            return Ok(());
        };
        match name.as_str() {
            "now" => match args.first() {
                None => Ok(()),
                Some(Value::Text(format)) if is_valid_format(format) => Ok(()),
                Some(other) => Err(format!("invalid `now` format argument `{other}`")),
            },
            "today" | "uuid" => Ok(()),
            other => Err(format!("unknown default callback `{other}`")),
        }
    }

    /// Produces the default value; unresolvable descriptors yield `Null`.
    pub fn resolve(&self) -> Value {
        match self {
            Self::None => Value::Null,
            Self::Literal(value) => value.clone(),
            Self::Callback { name, args } => match name.as_str() {
                "now" => {
                    let format = match args.first() {
                        Some(Value::Text(format)) if is_valid_format(format) => format.as_str(),
                        _ => ISO_TIMESTAMP_FORMAT,
                    };
                    Value::Text(chrono::Local::now().format(format).to_string())
                }
                "today" => Value::Text(chrono::Local::now().format(ISO_DATE_FORMAT).to_string()),
                "uuid" => Value::Text(Uuid::new_v4().to_string()),
                _ => Value::Null,
            },
        }
    }
}

impl From<Value> for DefaultValue {
    fn from(value: Value) -> Self {
        Self::Literal(value)
    }
}

fn is_valid_format(format: &str) -> bool {
    !StrftimeItems::new(format).any(|item| matches!(item, Item::Error))
}

/// Full metadata for one column.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ColumnType,
    /// Max length for char/varchar, total digits for numeric.
    pub size: Option<u32>,
    /// Decimal places for numeric.
    pub scope: Option<u32>,
    pub required: bool,
    pub primary: bool,
    pub autoinc: bool,
    pub default: DefaultValue,
    /// Content rules run after type recasting; JSON accepts one rule or a list.
    #[serde(deserialize_with = "one_or_many")]
    pub valid: Vec<ValidRule>,
}

fn one_or_many<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<ValidRule>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(ValidRule),
        Many(Vec<ValidRule>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(rule) => vec![rule],
        OneOrMany::Many(rules) => rules,
    })
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, kind: ColumnType) -> Self {
        Self {
            name: name.into(),
            kind,
            ..Self::default()
        }
    }

    pub fn size(mut self, size: u32) -> Self {
        self.size = Some(size);
        self
    }

    pub fn scope(mut self, scope: u32) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn primary(mut self) -> Self {
        self.primary = true;
        self
    }

    pub fn autoinc(mut self) -> Self {
        self.autoinc = true;
        self
    }

    /// Sets a literal or callback default.
    pub fn default_value(mut self, default: impl Into<DefaultValue>) -> Self {
        self.default = default.into();
        self
    }

    /// Adds one content rule with its default message.
    pub fn valid(mut self, rule: Rule) -> Self {
        self.valid.push(ValidRule::new(rule));
        self
    }

    /// Adds one content rule with a custom failure message.
    pub fn valid_with(mut self, rule: Rule, message: impl Into<String>) -> Self {
        self.valid.push(ValidRule::with_message(rule, message));
        self
    }

    /// Fills metadata the declaration left open.
    pub(crate) fn fill_defaults(&mut self) {
        match self.kind {
            ColumnType::Char => {
                self.size.get_or_insert(1);
            }
            ColumnType::Varchar => {
                self.size.get_or_insert(255);
            }
            ColumnType::Numeric => {
                self.size.get_or_insert(10);
                self.scope.get_or_insert(0);
            }
            _ => {}
        }
    }
}

/// Index uniqueness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexKind {
    Unique,
    #[default]
    Normal,
}

/// One index; with no explicit columns it covers the column of its name.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexSpec {
    pub name: String,
    pub kind: IndexKind,
    pub cols: Vec<String>,
}

impl IndexSpec {
    pub fn unique(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: IndexKind::Unique,
            cols: Vec::new(),
        }
    }

    pub fn normal(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: IndexKind::Normal,
            cols: Vec::new(),
        }
    }

    pub fn on(mut self, cols: &[&str]) -> Self {
        self.cols = cols.iter().map(|col| col.to_string()).collect();
        self
    }

    pub fn columns(&self) -> Vec<String> {
        if self.cols.is_empty() {
            vec![self.name.clone()]
        } else {
            self.cols.clone()
        }
    }
}
