//! Composable filter predicates.
//!
//! Conditions are plain values: building one never touches a backend. Adapters translate
//! them in `Connection::build_filter`; the in-memory store evaluates them with [`eval::matches`].
//!
//! ```rust
//! use dbmux::prelude::*;
//!
//! let adults_named_a_or_b = and([
//!     or([Cond::new().eq("name", "A"), Cond::new().eq("name", "B")]),
//!     Cond::new().gte("age", 18).into(),
//! ]);
//! # let _ = adults_named_a_or_b;
//! ```

pub mod eval;

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::DbError;
use crate::types::{Value, ValueMap};

/// Comparison operator of one equality-map entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Eq,
    NotEq,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    NotLike,
    In,
    NotIn,
    Is,
    IsNot,
}

impl Op {
    /// SQL spelling of the operator.
    #[must_use]
    pub fn as_sql(self) -> &'static str {
        match self {
            Op::Eq => "=",
            Op::NotEq => "<>",
            Op::Gt => ">",
            Op::Gte => ">=",
            Op::Lt => "<",
            Op::Lte => "<=",
            Op::Like => "LIKE",
            Op::NotLike => "NOT LIKE",
            Op::In => "IN",
            Op::NotIn => "NOT IN",
            Op::Is => "IS",
            Op::IsNot => "IS NOT",
        }
    }

    /// Parse an operator token such as `>=`, `not like` or `is not`.
    #[must_use]
    pub fn parse(token: &str) -> Option<Op> {
        let token = token.split_whitespace().collect::<Vec<_>>().join(" ").to_ascii_uppercase();
        let op = match token.as_str() {
            "=" | "==" => Op::Eq,
            "!=" | "<>" => Op::NotEq,
            ">" => Op::Gt,
            ">=" => Op::Gte,
            "<" => Op::Lt,
            "<=" => Op::Lte,
            "LIKE" => Op::Like,
            "NOT LIKE" => Op::NotLike,
            "IN" => Op::In,
            "NOT IN" => Op::NotIn,
            "IS" => Op::Is,
            "IS NOT" => Op::IsNot,
            _ => return None,
        };
        Some(op)
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// One `column op value` entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    pub column: String,
    pub op: Op,
    pub value: Value,
}

impl Constraint {
    /// Build a constraint, promoting `=`/`!=` to `IN`/`NOT IN` for lists and to `IS`/`IS NOT`
    /// for NULL.
    pub fn new(column: impl Into<String>, op: Op, value: impl Into<Value>) -> Self {
        let value = value.into();
        let op = match (op, &value) {
            (Op::Eq, Value::List(_)) => Op::In,
            (Op::NotEq, Value::List(_)) => Op::NotIn,
            (Op::Eq, Value::Null) => Op::Is,
            (Op::NotEq, Value::Null) => Op::IsNot,
            (op, _) => op,
        };
        Self {
            column: column.into(),
            op,
            value,
        }
    }
}

static KEY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([^\s=!<>]+)\s*(.*?)\s*$").unwrap_or_else(|e| unreachable!("{e}"))
});

/// Split a key like `"age >="` into its column and operator. A bare column means `=`.
///
/// # Errors
/// Returns `DbError::ValidationError` when the key has no column or an unknown operator.
pub fn parse_key(key: &str) -> Result<(String, Op), DbError> {
    let caps = KEY_PATTERN
        .captures(key)
        .ok_or_else(|| DbError::ValidationError(format!("malformed condition key {key:?}")))?;
    let column = caps[1].to_string();
    let token = &caps[2];
    if token.is_empty() {
        return Ok((column, Op::Eq));
    }
    let op = Op::parse(token).ok_or_else(|| {
        DbError::ValidationError(format!("unknown operator {token:?} in condition key {key:?}"))
    })?;
    Ok((column, op))
}

/// Equality map: every entry must hold (AND).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Cond(Vec<Constraint>);

impl Cond {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry keyed by `"column"` or `"column op"`.
    ///
    /// # Errors
    /// Returns `DbError::ValidationError` if the key cannot be parsed.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Result<Self, DbError> {
        let (column, op) = parse_key(key)?;
        self.0.push(Constraint::new(column, op, value));
        Ok(self)
    }

    #[must_use]
    pub fn push(mut self, column: impl Into<String>, op: Op, value: impl Into<Value>) -> Self {
        self.0.push(Constraint::new(column, op, value));
        self
    }

    #[must_use]
    pub fn eq(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(column, Op::Eq, value)
    }

    #[must_use]
    pub fn ne(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(column, Op::NotEq, value)
    }

    #[must_use]
    pub fn gt(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(column, Op::Gt, value)
    }

    #[must_use]
    pub fn gte(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(column, Op::Gte, value)
    }

    #[must_use]
    pub fn lt(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(column, Op::Lt, value)
    }

    #[must_use]
    pub fn lte(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(column, Op::Lte, value)
    }

    #[must_use]
    pub fn like(self, column: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.push(column, Op::Like, pattern.into())
    }

    #[must_use]
    pub fn not_like(self, column: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.push(column, Op::NotLike, pattern.into())
    }

    #[must_use]
    pub fn any_of<T: Into<Value>>(self, column: impl Into<String>, values: Vec<T>) -> Self {
        self.push(column, Op::In, values)
    }

    #[must_use]
    pub fn none_of<T: Into<Value>>(self, column: impl Into<String>, values: Vec<T>) -> Self {
        self.push(column, Op::NotIn, values)
    }

    #[must_use]
    pub fn is_null(self, column: impl Into<String>) -> Self {
        self.push(column, Op::Is, Value::Null)
    }

    #[must_use]
    pub fn not_null(self, column: impl Into<String>) -> Self {
        self.push(column, Op::IsNot, Value::Null)
    }

    #[must_use]
    pub fn constraints(&self) -> &[Constraint] {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }
}

/// Each map entry becomes one `=` constraint (or `IN`/`IS` per value shape).
impl From<ValueMap> for Cond {
    fn from(map: ValueMap) -> Self {
        Self(
            map.into_iter()
                .map(|(column, value)| Constraint::new(column, Op::Eq, value))
                .collect(),
        )
    }
}

/// Backend-specific fragment with `?` placeholders, passed through unfiltered.
#[derive(Debug, Clone, PartialEq)]
pub struct Raw {
    pub fragment: String,
    pub args: Vec<Value>,
}

/// Backend function call, e.g. `DISTINCT` or a boolean user function.
#[derive(Debug, Clone, PartialEq)]
pub struct Func {
    pub name: String,
    pub args: Vec<Value>,
}

/// A node of the predicate tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Cond(Cond),
    And(Vec<Condition>),
    Or(Vec<Condition>),
    Raw(Raw),
    Func(Func),
}

impl Condition {
    /// A condition that matches every row.
    #[must_use]
    pub fn all() -> Self {
        Condition::Cond(Cond::new())
    }

    /// Whether this node imposes no restriction at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Condition::Cond(c) => c.is_empty(),
            Condition::And(children) | Condition::Or(children) => {
                children.iter().all(Condition::is_empty)
            }
            Condition::Raw(_) | Condition::Func(_) => false,
        }
    }

    /// AND this condition with another, flattening nested conjunctions.
    #[must_use]
    pub fn and(self, other: impl Into<Condition>) -> Self {
        let other = other.into();
        match self {
            Condition::And(mut children) => {
                children.push(other);
                Condition::And(children)
            }
            me if me.is_empty() => other,
            me => Condition::And(vec![me, other]),
        }
    }
}

impl Default for Condition {
    fn default() -> Self {
        Condition::all()
    }
}

impl From<Cond> for Condition {
    fn from(cond: Cond) -> Self {
        Condition::Cond(cond)
    }
}

impl From<ValueMap> for Condition {
    fn from(map: ValueMap) -> Self {
        Condition::Cond(map.into())
    }
}

impl From<Raw> for Condition {
    fn from(raw: Raw) -> Self {
        Condition::Raw(raw)
    }
}

impl From<Func> for Condition {
    fn from(func: Func) -> Self {
        Condition::Func(func)
    }
}

/// Conjunction of the given children.
pub fn and<I, C>(children: I) -> Condition
where
    I: IntoIterator<Item = C>,
    C: Into<Condition>,
{
    Condition::And(children.into_iter().map(Into::into).collect())
}

/// Disjunction of the given children.
pub fn or<I, C>(children: I) -> Condition
where
    I: IntoIterator<Item = C>,
    C: Into<Condition>,
{
    Condition::Or(children.into_iter().map(Into::into).collect())
}

/// Raw predicate fragment with bound arguments.
pub fn raw(fragment: impl Into<String>, args: Vec<Value>) -> Condition {
    Condition::Raw(Raw {
        fragment: fragment.into(),
        args,
    })
}

/// Function-call predicate.
pub fn func(name: impl Into<String>, args: Vec<Value>) -> Condition {
    Condition::Func(Func {
        name: name.into(),
        args,
    })
}

/// A selected output column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Column {
    Name(String),
    Aliased { column: String, alias: String },
    /// Expression emitted verbatim.
    Raw(String),
    /// `NAME(col, ...)`, e.g. `DISTINCT(name)`.
    Func { name: String, columns: Vec<String> },
}

impl Column {
    /// Name the column has in result rows.
    #[must_use]
    pub fn output_name(&self) -> String {
        match self {
            Column::Name(name) => name.clone(),
            Column::Aliased { alias, .. } => alias.clone(),
            Column::Raw(expr) => expr.clone(),
            Column::Func { name, columns } => format!("{name}({})", columns.join(", ")),
        }
    }

    #[must_use]
    pub fn func(name: impl Into<String>, columns: &[&str]) -> Self {
        Column::Func {
            name: name.into(),
            columns: columns.iter().map(|c| (*c).to_string()).collect(),
        }
    }
}

static ALIAS_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*([^\s]+)\s+as\s+([^\s]+)\s*$").unwrap_or_else(|e| unreachable!("{e}"))
});

/// `"name"` selects a column, `"name AS alias"` renames it.
impl From<&str> for Column {
    fn from(spec: &str) -> Self {
        match ALIAS_PATTERN.captures(spec) {
            Some(caps) => Column::Aliased {
                column: caps[1].to_string(),
                alias: caps[2].to_string(),
            },
            None => Column::Name(spec.trim().to_string()),
        }
    }
}

impl From<String> for Column {
    fn from(spec: String) -> Self {
        Column::from(spec.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_carry_operators() {
        assert_eq!(parse_key("age >=").unwrap(), ("age".to_string(), Op::Gte));
        assert_eq!(parse_key("age>=").unwrap(), ("age".to_string(), Op::Gte));
        assert_eq!(parse_key("name").unwrap(), ("name".to_string(), Op::Eq));
        assert_eq!(parse_key("name not like").unwrap().1, Op::NotLike);
        assert_eq!(parse_key("deleted_at IS NOT").unwrap().1, Op::IsNot);
        assert!(parse_key("age ~~").is_err());
        assert!(parse_key("  ").is_err());
    }

    #[test]
    fn operators_follow_value_shape() {
        let c = Cond::new()
            .eq("id", vec![1, 2, 3])
            .ne("tag", vec!["x"])
            .eq("deleted", Value::Null)
            .ne("owner", Value::Null);
        let ops: Vec<Op> = c.constraints().iter().map(|k| k.op).collect();
        assert_eq!(ops, vec![Op::In, Op::NotIn, Op::Is, Op::IsNot]);
    }

    #[test]
    fn and_flattens_and_skips_empty() {
        let c = Condition::all().and(Cond::new().eq("a", 1));
        assert!(matches!(c, Condition::Cond(_)));
        let c = c.and(Cond::new().eq("b", 2)).and(Cond::new().eq("c", 3));
        match c {
            Condition::And(children) => assert_eq!(children.len(), 3),
            other => panic!("expected And, got {other:?}"),
        }
    }

    #[test]
    fn nested_empty_trees_are_empty() {
        assert!(and([or([Cond::new()]), Cond::new().into()]).is_empty());
        assert!(!raw("1 = 1", vec![]).is_empty());
    }

    #[test]
    fn column_aliases() {
        assert_eq!(
            Column::from("full_name AS name"),
            Column::Aliased {
                column: "full_name".into(),
                alias: "name".into()
            }
        );
        assert_eq!(Column::from("age"), Column::Name("age".into()));
        assert_eq!(Column::func("DISTINCT", &["name"]).output_name(), "DISTINCT(name)");
    }
}
