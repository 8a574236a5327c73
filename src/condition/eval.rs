//! Reference evaluator for condition trees over in-memory rows.
//!
//! Comparisons against NULL are false (SQL's unknown collapsed to false) except for `IS` and
//! `IS NOT`. `LIKE` supports `%` and `_` and ignores ASCII case.

use std::cmp::Ordering;

use crate::error::DbError;
use crate::results::Row;
use crate::types::Value;

use super::{Condition, Constraint, Op};

/// Whether `row` satisfies `condition`.
///
/// # Errors
/// Returns `DbError::UnsupportedExpression` for `Raw` and `Func` nodes, which have no
/// backend-independent meaning.
pub fn matches(condition: &Condition, row: &Row) -> Result<bool, DbError> {
    match condition {
        Condition::Cond(cond) => {
            for constraint in cond.constraints() {
                if !constraint_holds(constraint, row)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        Condition::And(children) => {
            for child in children {
                if !matches(child, row)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        Condition::Or(children) => {
            // an empty disjunction restricts nothing, matching the SQL translation
            if children.is_empty() {
                return Ok(true);
            }
            for child in children {
                if matches(child, row)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        Condition::Raw(raw) => Err(DbError::UnsupportedExpression(format!(
            "raw fragment {:?} cannot be evaluated in memory",
            raw.fragment
        ))),
        Condition::Func(func) => Err(DbError::UnsupportedExpression(format!(
            "function {} cannot be evaluated in memory",
            func.name
        ))),
    }
}

fn constraint_holds(constraint: &Constraint, row: &Row) -> Result<bool, DbError> {
    let left = row.get(&constraint.column).unwrap_or(&Value::Null);
    let right = &constraint.value;
    let ordered = |want: fn(Ordering) -> bool| left.compare(right).is_some_and(want);

    let holds = match constraint.op {
        Op::Eq => ordered(|o| o == Ordering::Equal),
        Op::NotEq => ordered(|o| o != Ordering::Equal),
        Op::Gt => ordered(|o| o == Ordering::Greater),
        Op::Gte => ordered(|o| o != Ordering::Less),
        Op::Lt => ordered(|o| o == Ordering::Less),
        Op::Lte => ordered(|o| o != Ordering::Greater),
        Op::Like | Op::NotLike => {
            let (Some(text), Some(pattern)) = (left.as_text(), right.as_text()) else {
                return Ok(false);
            };
            like(text, pattern) == (constraint.op == Op::Like)
        }
        Op::In | Op::NotIn => {
            let items = list_operand(constraint)?;
            if left.is_null() {
                return Ok(false);
            }
            let found = items
                .iter()
                .any(|item| left.compare(item) == Some(Ordering::Equal));
            found == (constraint.op == Op::In)
        }
        Op::Is | Op::IsNot => null_safe_eq(left, right) == (constraint.op == Op::Is),
    };
    Ok(holds)
}

fn list_operand(constraint: &Constraint) -> Result<&[Value], DbError> {
    match &constraint.value {
        Value::List(items) => Ok(items),
        other => Err(DbError::ValidationError(format!(
            "{} on `{}` needs a list, found {}",
            constraint.op,
            constraint.column,
            other.type_name()
        ))),
    }
}

fn null_safe_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        _ => left.compare(right) == Some(Ordering::Equal),
    }
}

/// SQL `LIKE` with `%` and `_`, ASCII case-insensitive.
#[must_use]
pub fn like(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().map(|c| c.to_ascii_lowercase()).collect();
    let pattern: Vec<char> = pattern.chars().map(|c| c.to_ascii_lowercase()).collect();

    // iterative wildcard match with single-star backtracking
    let (mut t, mut p) = (0, 0);
    let mut star: Option<(usize, usize)> = None;
    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '_' || pattern[p] == text[t]) {
            t += 1;
            p += 1;
        } else if p < pattern.len() && pattern[p] == '%' {
            star = Some((p, t));
            p += 1;
        } else if let Some((sp, st)) = star {
            p = sp + 1;
            t = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }
    pattern[p..].iter().all(|c| *c == '%')
}
