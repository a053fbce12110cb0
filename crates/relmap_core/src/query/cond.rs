//! Where/having conditions and single-value quoting.

use crate::db::Backend;
use crate::value::Value;

/// How a condition joins the ones before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Conj {
    #[default]
    And,
    Or,
}

impl Conj {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::And => "AND",
            Self::Or => "OR",
        }
    }
}

/// One condition, either used verbatim or with values quoted into its
/// first `?` placeholder.
#[derive(Debug, Clone, PartialEq)]
pub enum Cond {
    Literal(String),
    Quoted { cond: String, values: Vec<Value> },
}

impl Cond {
    pub fn literal(cond: impl Into<String>) -> Self {
        Self::Literal(cond.into())
    }

    /// Quotes `value` into the first `?` of `cond`.
    pub fn bind(cond: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Quoted {
            cond: cond.into(),
            values: vec![value.into()],
        }
    }

    /// Quotes each value and joins them with commas, for `IN (?)`.
    pub fn bind_list<V: Into<Value>>(
        cond: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Self::Quoted {
            cond: cond.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn render(&self, backend: &dyn Backend) -> String {
        match self {
            Self::Literal(cond) => cond.clone(),
            Self::Quoted { cond, values } => quote_into(backend, cond, values),
        }
    }
}

impl From<&str> for Cond {
    fn from(value: &str) -> Self {
        Self::Literal(value.to_string())
    }
}

impl From<String> for Cond {
    fn from(value: String) -> Self {
        Self::Literal(value)
    }
}

/// Replaces the first `?` in `cond` with the quoted values.
pub fn quote_into(backend: &dyn Backend, cond: &str, values: &[Value]) -> String {
    let quoted = values
        .iter()
        .map(|value| backend.quote(value))
        .collect::<Vec<_>>()
        .join(", ");
    match cond.find('?') {
        Some(position) => format!("{}{quoted}{}", &cond[..position], &cond[position + 1..]),
        None => cond.to_string(),
    }
}

/// Appends a rendered condition, prefixing it unless it is the first.
pub(crate) fn push_cond(list: &mut Vec<String>, conj: Conj, cond: String) {
    if list.is_empty() {
        list.push(cond);
    } else {
        list.push(format!("{} {cond}", conj.as_str()));
    }
}

/// Renders a condition list joined by `conj`.
pub(crate) fn render_conds(backend: &dyn Backend, conds: &[Cond], conj: Conj) -> Vec<String> {
    let mut out = Vec::with_capacity(conds.len());
    for cond in conds {
        push_cond(&mut out, conj, cond.render(backend));
    }
    out
}
