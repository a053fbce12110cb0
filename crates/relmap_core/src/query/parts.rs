//! Plain statement fragments and their SQL rendering.

use serde::Serialize;

/// A column, group or order list given as `"a, b"` or as a sequence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Names(Vec<String>);

impl Names {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn into_vec(self) -> Vec<String> {
        self.0
    }

    fn collect<'a>(items: impl IntoIterator<Item = &'a str>) -> Self {
        Self(
            items
                .into_iter()
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(String::from)
                .collect(),
        )
    }
}

impl From<&str> for Names {
    fn from(value: &str) -> Self {
        Self::collect(value.split(','))
    }
}

impl From<String> for Names {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl From<&[&str]> for Names {
    fn from(value: &[&str]) -> Self {
        Self::collect(value.iter().copied())
    }
}

impl<const N: usize> From<[&str; N]> for Names {
    fn from(value: [&str; N]) -> Self {
        Self::collect(value)
    }
}

impl<const N: usize> From<&[&str; N]> for Names {
    fn from(value: &[&str; N]) -> Self {
        Self::collect(value.iter().copied())
    }
}

impl From<Vec<&str>> for Names {
    fn from(value: Vec<&str>) -> Self {
        Self::collect(value)
    }
}

impl From<Vec<String>> for Names {
    fn from(value: Vec<String>) -> Self {
        Self::collect(value.iter().map(String::as_str))
    }
}

impl From<&[String]> for Names {
    fn from(value: &[String]) -> Self {
        Self::collect(value.iter().map(String::as_str))
    }
}

/// Row window; a zero count means no limit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Limit {
    pub count: u32,
    pub offset: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinPart {
    pub kind: JoinKind,
    pub name: String,
    pub cond: String,
}

/// Builder parts that [`super::Select::clear`] can reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Part {
    Distinct,
    Cols,
    From,
    Join,
    Where,
    Group,
    Having,
    Order,
    Limit,
}

/// A fully assembled SELECT statement.
///
/// Condition lists hold rendered entries: the first is bare, later ones
/// start with `AND`/`OR`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectParts {
    pub distinct: bool,
    pub cols: Vec<String>,
    pub from: Vec<String>,
    pub join: Vec<JoinPart>,
    pub conds: Vec<String>,
    pub group: Vec<String>,
    pub having: Vec<String>,
    pub order: Vec<String>,
    pub limit: Limit,
}

impl SelectParts {
    pub fn to_sql(&self) -> String {
        let mut sql = String::from("SELECT ");
        if self.distinct {
            sql.push_str("DISTINCT ");
        }
        if self.cols.is_empty() {
            sql.push('*');
        } else {
            sql.push_str(&self.cols.join(", "));
        }
        if !self.from.is_empty() {
            sql.push_str(" FROM ");
            sql.push_str(&self.from.join(", "));
        }
        for join in &self.join {
            sql.push_str(match join.kind {
                JoinKind::Inner => " INNER JOIN ",
                JoinKind::Left => " LEFT JOIN ",
            });
            sql.push_str(&join.name);
            if !join.cond.is_empty() {
                sql.push_str(" ON ");
                sql.push_str(&join.cond);
            }
        }
        if !self.conds.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.conds.join(" "));
        }
        if !self.group.is_empty() {
            sql.push_str(" GROUP BY ");
            sql.push_str(&self.group.join(", "));
        }
        if !self.having.is_empty() {
            sql.push_str(" HAVING ");
            sql.push_str(&self.having.join(" "));
        }
        if !self.order.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&self.order.join(", "));
        }
        if self.limit.count > 0 {
            sql.push_str(&format!(" LIMIT {}", self.limit.count));
            if self.limit.offset > 0 {
                sql.push_str(&format!(" OFFSET {}", self.limit.offset));
            }
        }
        sql
    }
}

#[cfg(test)]
mod tests {
    use super::{JoinKind, JoinPart, Limit, Names, SelectParts};

    #[test]
    fn names_split_and_trim() {
        let names = Names::from("a, b ,,c");
        assert_eq!(names.into_vec(), vec!["a", "b", "c"]);
        assert!(Names::from(Vec::<String>::new()).is_empty());
    }

    #[test]
    fn renders_every_clause_in_order() {
        let parts = SelectParts {
            distinct: true,
            cols: vec!["n.id AS n__id".into()],
            from: vec!["nodes AS n".into()],
            join: vec![JoinPart {
                kind: JoinKind::Left,
                name: "tags".into(),
                cond: "tags.node_id = n.id".into(),
            }],
            conds: vec!["n.id > 1".into(), "OR n.id < 0".into()],
            group: vec!["n.id".into()],
            having: vec!["COUNT(tags.id) > 0".into()],
            order: vec!["n.id DESC".into()],
            limit: Limit { count: 5, offset: 10 },
        };
        assert_eq!(
            parts.to_sql(),
            "SELECT DISTINCT n.id AS n__id FROM nodes AS n LEFT JOIN tags ON tags.node_id = n.id \
             WHERE n.id > 1 OR n.id < 0 GROUP BY n.id HAVING COUNT(tags.id) > 0 \
             ORDER BY n.id DESC LIMIT 5 OFFSET 10"
        );
    }

    #[test]
    fn empty_parts_select_everything() {
        assert_eq!(SelectParts::default().to_sql(), "SELECT *");
    }
}
