//! Record-level filter chain: model rules, per-record rules and required flags.

use super::Model;
use crate::schema::{Rule, ValidationError, MSG_NOT_BLANK};
use crate::value::Value;

/// Rules applied by [`super::Record::filter`].
#[derive(Debug, Clone, Default)]
pub struct FilterChain {
    rules: Vec<(String, Rule)>,
    required: Vec<String>,
}

impl FilterChain {
    /// Model rules, then `extra`; required columns follow the schema except
    /// primary, auto-increment and sequence columns.
    pub fn for_model(model: &Model, extra: &[(String, Rule)]) -> Self {
        let mut rules = model.filters().to_vec();
        rules.extend(extra.iter().cloned());

        let required = model
            .table()
            .cols()
            .iter()
            .filter(|col| {
                col.required && !col.primary && !col.autoinc && !model.is_sequence_col(&col.name)
            })
            .map(|col| col.name.clone())
            .collect();

        Self { rules, required }
    }

    pub fn is_required(&self, col: &str) -> bool {
        self.required.iter().any(|name| name == col)
    }

    /// Checks every field through `value_of`, collecting all failures.
    pub fn apply(&self, value_of: impl Fn(&str) -> Value) -> Result<(), ValidationError> {
        let mut errors = ValidationError::new();
        let mut blank = Vec::new();
        for col in &self.required {
            if !Rule::NotBlank.check(&value_of(col)) {
                errors.push(col.as_str(), MSG_NOT_BLANK);
                blank.push(col.as_str());
            }
        }
        for (col, rule) in &self.rules {
            if blank.contains(&col.as_str()) {
                continue;
            }
            if !rule.check(&value_of(col)) {
                errors.push(col.as_str(), rule.default_message());
            }
        }
        errors.into_result()
    }
}
