//! Row recasting and content validation.
//!
//! # Responsibility
//! - Recast each field to its column's declared type and check bounds.
//! - Run declared content rules on the recast value.
//!
//! # Invariants
//! - Every failure across every field is collected before returning; a
//!   single field never raises on its own.
//! - Fields unknown to the schema are dropped, known ones keep their order.

use super::column::{ColumnSpec, ColumnType};
use crate::value::{Row, Value};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}$").expect("valid email regex")
});

pub const MSG_NOT_BLANK: &str = "not blank";

/// One content rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum Rule {
    NotBlank,
    MinLength { min: usize },
    MaxLength { max: usize },
    Range { min: f64, max: f64 },
    InList { values: Vec<Value> },
    Regex { pattern: String },
    Email,
    Alpha,
    Alnum,
    Integer,
    IsoDate,
    IsoTime,
    IsoTimestamp,
    InScope { size: u32, scope: u32 },
}

impl Rule {
    /// Returns whether `value` passes the rule. Nulls pass everything but
    /// `NotBlank`; required-ness is checked separately.
    pub fn check(&self, value: &Value) -> bool {
        if value.is_null() {
            return !matches!(self, Self::NotBlank);
        }
        let text = value.to_text();
        match self {
            Self::NotBlank => !text.trim().is_empty(),
            Self::MinLength { min } => text.chars().count() >= *min,
            Self::MaxLength { max } => text.chars().count() <= *max,
            Self::Range { min, max } => value
                .as_f64()
                .map_or(false, |number| number >= *min && number <= *max),
            Self::InList { values } => values.iter().any(|allowed| allowed.to_text() == text),
            Self::Regex { pattern } => Regex::new(pattern).map_or(false, |re| re.is_match(&text)),
            Self::Email => EMAIL_RE.is_match(&text),
            Self::Alpha => !text.is_empty() && text.chars().all(char::is_alphabetic),
            Self::Alnum => !text.is_empty() && text.chars().all(char::is_alphanumeric),
            Self::Integer => parse_integer(value).is_some(),
            Self::IsoDate => is_iso_date(&text),
            Self::IsoTime => is_iso_time(&text),
            Self::IsoTimestamp => is_iso_timestamp(&text),
            Self::InScope { size, scope } => value
                .as_f64()
                .map_or(false, |number| in_scope(number, *size, *scope)),
        }
    }

    pub fn default_message(&self) -> String {
        match self {
            Self::NotBlank => MSG_NOT_BLANK.to_string(),
            Self::MinLength { min } => format!("min length {min}"),
            Self::MaxLength { max } => format!("max length {max}"),
            Self::Range { min, max } => format!("out of range {min}..{max}"),
            Self::InList { .. } => "not an allowed value".to_string(),
            Self::Regex { .. } => "does not match pattern".to_string(),
            Self::Email => "not an email address".to_string(),
            Self::Alpha => "letters only".to_string(),
            Self::Alnum => "letters and digits only".to_string(),
            Self::Integer => "not an integer".to_string(),
            Self::IsoDate => "not an ISO 8601 date".to_string(),
            Self::IsoTime => "not an ISO 8601 time".to_string(),
            Self::IsoTimestamp => "not an ISO 8601 timestamp".to_string(),
            Self::InScope { size, scope } => scope_message(*size, *scope),
        }
    }
}

/// A rule plus an optional message override.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidRule {
    #[serde(flatten)]
    pub rule: Rule,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ValidRule {
    pub fn new(rule: Rule) -> Self {
        Self {
            rule,
            message: None,
        }
    }

    pub fn with_message(rule: Rule, message: impl Into<String>) -> Self {
        Self {
            rule,
            message: Some(message.into()),
        }
    }

    pub fn message(&self) -> String {
        self.message
            .clone()
            .unwrap_or_else(|| self.rule.default_message())
    }
}

/// Aggregate of per-field failure messages.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ValidationError {
    fields: BTreeMap<String, Vec<String>>,
}

impl ValidationError {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.fields
            .entry(field.into())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn fields(&self) -> &BTreeMap<String, Vec<String>> {
        &self.fields
    }

    pub fn messages(&self, field: &str) -> &[String] {
        self.fields.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn into_fields(self) -> BTreeMap<String, Vec<String>> {
        self.fields
    }

    /// Replaces one field's messages.
    pub fn replace(&mut self, field: &str, messages: Vec<String>) {
        if let Some(slot) = self.fields.get_mut(field) {
            *slot = messages;
        }
    }

    /// Returns `Err(self)` when any failure was collected.
    pub fn into_result(self) -> Result<(), Self> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid data:")?;
        for (index, (field, messages)) in self.fields.iter().enumerate() {
            let sep = if index == 0 { " " } else { "; " };
            write!(f, "{sep}{field}: {}", messages.join(", "))?;
        }
        Ok(())
    }
}

impl Error for ValidationError {}

/// Recasts and validates `data` in place against `cols`.
pub fn auto_valid(cols: &[ColumnSpec], data: &mut Row) -> Result<(), ValidationError> {
    data.retain(|key, _| cols.iter().any(|col| col.name == key));

    let mut errors = ValidationError::new();
    for col in cols {
        let Some(slot) = data.get_mut(&col.name) else {
            continue;
        };
        if slot.is_null() {
            if col.required {
                errors.push(&col.name, MSG_NOT_BLANK);
            }
            continue;
        }

        let (recast, failure) = recast(col, std::mem::take(slot));
        if let Some(message) = failure {
            errors.push(&col.name, message);
        }
        for rule in &col.valid {
            if !rule.rule.check(&recast) {
                errors.push(&col.name, rule.message());
            }
        }
        *slot = recast;
    }

    errors.into_result()
}

/// Recasts one value; returns the new value and a type failure, if any.
fn recast(col: &ColumnSpec, value: Value) -> (Value, Option<String>) {
    match col.kind {
        ColumnType::Bool => (Value::Integer(i64::from(value.is_truthy())), None),
        ColumnType::Char | ColumnType::Varchar => {
            let text = value.to_text();
            let failure = col
                .size
                .filter(|size| text.chars().count() > *size as usize)
                .map(|size| format!("max length {size}"));
            (Value::Text(text), failure)
        }
        ColumnType::Smallint | ColumnType::Int | ColumnType::Bigint => {
            let Some(number) = parse_integer(&value) else {
                return (value, Some("not an integer".to_string()));
            };
            let (min, max) = col.kind.int_range().unwrap_or((i128::MIN, i128::MAX));
            if number < min || number > max {
                return (value, Some(format!("out of range {min}..{max}")));
            }
            match i64::try_from(number) {
                Ok(number) => (Value::Integer(number), None),
                Err(_) => (value, Some(format!("out of range {min}..{max}"))),
            }
        }
        ColumnType::Float => match value.as_f64() {
            Some(number) => (Value::Float(number), None),
            None => (value, Some("not a number".to_string())),
        },
        ColumnType::Numeric => {
            let size = col.size.unwrap_or(10);
            let scope = col.scope.unwrap_or(0);
            match value.as_f64() {
                Some(number) if in_scope(number, size, scope) => (Value::Float(number), None),
                Some(number) => (Value::Float(number), Some(scope_message(size, scope))),
                None => (value, Some("not a number".to_string())),
            }
        }
        ColumnType::Date => {
            let text = value.to_text();
            let failure = (!is_iso_date(&text)).then(|| Rule::IsoDate.default_message());
            (Value::Text(text), failure)
        }
        ColumnType::Time => {
            let mut text = value.to_text();
            if text.chars().count() == 5 {
                text.push_str(":00");
            }
            let failure = (!is_iso_time(&text)).then(|| Rule::IsoTime.default_message());
            (Value::Text(text), failure)
        }
        ColumnType::Timestamp => {
            let text = normalize_timestamp(&value.to_text());
            let failure = (!is_iso_timestamp(&text)).then(|| Rule::IsoTimestamp.default_message());
            (Value::Text(text), failure)
        }
    }
}

fn parse_integer(value: &Value) -> Option<i128> {
    match value {
        Value::Null => None,
        Value::Bool(flag) => Some(i128::from(*flag)),
        Value::Integer(number) => Some(i128::from(*number)),
        Value::Float(number) if number.is_finite() && number.fract() == 0.0 => {
            Some(*number as i128)
        }
        Value::Float(_) => None,
        Value::Text(text) => text.trim().parse::<i128>().ok(),
    }
}

/// `YYYY-MM-DD HH:MM:SS...` becomes `YYYY-MM-DDTHH:MM:SS`; anything
/// too short is returned unchanged for the format check to reject.
fn normalize_timestamp(text: &str) -> String {
    let chars = text.chars().collect::<Vec<_>>();
    if chars.len() < 19 {
        return text.to_string();
    }
    let mut out = chars[..10].iter().collect::<String>();
    out.push('T');
    out.extend(&chars[11..19]);
    out
}

pub fn is_iso_date(text: &str) -> bool {
    text.len() == 10 && NaiveDate::parse_from_str(text, "%Y-%m-%d").is_ok()
}

pub fn is_iso_time(text: &str) -> bool {
    text.len() == 8 && NaiveTime::parse_from_str(text, "%H:%M:%S").is_ok()
}

pub fn is_iso_timestamp(text: &str) -> bool {
    text.len() == 19 && NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S").is_ok()
}

/// Whether `number` fits `size` total digits with at most `scope` decimals.
pub fn in_scope(number: f64, size: u32, scope: u32) -> bool {
    if !number.is_finite() {
        return false;
    }
    let text = number.abs().to_string();
    let (whole, fraction) = text.split_once('.').unwrap_or((text.as_str(), ""));
    let whole_digits = whole.trim_start_matches('0').len();
    whole_digits <= size.saturating_sub(scope) as usize && fraction.len() <= scope as usize
}

fn scope_message(size: u32, scope: u32) -> String {
    format!("not within {size} digits and {scope} decimals")
}
