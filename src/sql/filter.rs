use crate::condition::{Condition, Constraint, Op};
use crate::error::DbError;
use crate::translation::bare_placeholders;
use crate::types::Value;

use super::{Dialect, function_name, quote_ident};

/// Compile a condition tree to a WHERE clause with `?` markers.
///
/// `None` means the tree restricts nothing. Children of `AND`/`OR` are parenthesized.
///
/// # Errors
/// Returns `DbError::UnsupportedExpression` for an invalid function name and
/// `DbError::ValidationError` when `IN`/`NOT IN` is given something other than a list or a
/// raw fragment names an argument it was not given.
pub fn compile_filter(
    dialect: Dialect,
    condition: &Condition,
) -> Result<Option<(String, Vec<Value>)>, DbError> {
    let mut args = Vec::new();
    let clause = compile(dialect, condition, &mut args)?;
    Ok(clause.map(|c| (c, args)))
}

fn compile(
    dialect: Dialect,
    condition: &Condition,
    args: &mut Vec<Value>,
) -> Result<Option<String>, DbError> {
    match condition {
        Condition::Cond(cond) => {
            let parts = cond
                .constraints()
                .iter()
                .map(|c| constraint(dialect, c, args))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(join(parts, " AND "))
        }
        Condition::And(children) => {
            let mut parts = Vec::with_capacity(children.len());
            for child in children {
                if let Some(part) = compile(dialect, child, args)? {
                    parts.push(part);
                }
            }
            Ok(join_nested(parts, " AND "))
        }
        Condition::Or(children) => {
            let mark = args.len();
            let mut parts = Vec::with_capacity(children.len());
            for child in children {
                match compile(dialect, child, args)? {
                    Some(part) => parts.push(part),
                    None => {
                        // one unrestricted branch makes the whole disjunction unrestricted
                        args.truncate(mark);
                        return Ok(None);
                    }
                }
            }
            Ok(join_nested(parts, " OR "))
        }
        Condition::Raw(raw) => {
            let (fragment, bound) = bare_placeholders(&raw.fragment, &raw.args)?;
            args.extend(bound);
            Ok(Some(fragment))
        }
        Condition::Func(func) => {
            let name = function_name(&func.name)?;
            args.extend(func.args.iter().cloned());
            Ok(Some(format!("{name}({})", markers(func.args.len()))))
        }
    }
}

fn constraint(dialect: Dialect, c: &Constraint, args: &mut Vec<Value>) -> Result<String, DbError> {
    let column = quote_ident(&c.column);
    let clause = match c.op {
        Op::In | Op::NotIn => {
            let Value::List(items) = &c.value else {
                return Err(DbError::ValidationError(format!(
                    "{} on `{}` needs a list, found {}",
                    c.op,
                    c.column,
                    c.value.type_name()
                )));
            };
            if items.is_empty() {
                let constant = if c.op == Op::In { "1=0" } else { "1=1" };
                return Ok(constant.to_string());
            }
            args.extend(items.iter().cloned());
            format!("{column} {} ({})", c.op, markers(items.len()))
        }
        Op::Is | Op::IsNot => match &c.value {
            Value::Null => format!("{column} {} NULL", c.op),
            Value::Bool(b) => format!("{column} {} {}", c.op, if *b { "TRUE" } else { "FALSE" }),
            other => {
                args.push(other.clone());
                match (dialect, c.op) {
                    (Dialect::Sqlite, op) => format!("{column} {op} ?"),
                    (Dialect::Postgres, Op::Is) => format!("{column} IS NOT DISTINCT FROM ?"),
                    (Dialect::Postgres, _) => format!("{column} IS DISTINCT FROM ?"),
                }
            }
        },
        Op::Like | Op::NotLike if dialect == Dialect::Postgres => {
            args.push(c.value.clone());
            let op = if c.op == Op::Like { "ILIKE" } else { "NOT ILIKE" };
            format!("{column} {op} ?")
        }
        op => {
            args.push(c.value.clone());
            format!("{column} {op} ?")
        }
    };
    Ok(clause)
}

fn markers(n: usize) -> String {
    vec!["?"; n].join(", ")
}

fn join(parts: Vec<String>, sep: &str) -> Option<String> {
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(sep))
    }
}

fn join_nested(parts: Vec<String>, sep: &str) -> Option<String> {
    match parts.len() {
        0 => None,
        1 => parts.into_iter().next(),
        _ => Some(
            parts
                .iter()
                .map(|p| format!("({p})"))
                .collect::<Vec<_>>()
                .join(sep),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::{Cond, and, func, or, raw};

    fn sqlite(condition: &Condition) -> Option<(String, Vec<Value>)> {
        compile_filter(Dialect::Sqlite, condition).unwrap()
    }

    #[test]
    fn nested_disjunctions_are_parenthesized() {
        let tree = and([
            or([Cond::new().eq("a", 1), Cond::new().eq("b", 2)]),
            or([Cond::new().gt("c", 3), Cond::new().lte("d", 4)]),
        ]);
        let (clause, args) = sqlite(&tree).unwrap();
        assert_eq!(
            clause,
            r#"(("a" = ?) OR ("b" = ?)) AND (("c" > ?) OR ("d" <= ?))"#
        );
        assert_eq!(args, vec![Value::Int(1), Value::Int(2), Value::Int(3), Value::Int(4)]);
    }

    #[test]
    fn empty_trees_restrict_nothing() {
        assert!(sqlite(&Condition::all()).is_none());
        assert!(sqlite(&and([Cond::new()])).is_none());
        assert!(sqlite(&or([Cond::new().eq("a", 1), Cond::new()])).is_none());
    }

    #[test]
    fn lists_and_nulls() {
        let (clause, args) = sqlite(
            &Cond::new()
                .eq("id", vec![1, 2])
                .eq("gone", Value::Null)
                .any_of::<i64>("none", vec![])
                .into(),
        )
        .unwrap();
        assert_eq!(clause, r#""id" IN (?, ?) AND "gone" IS NULL AND 1=0"#);
        assert_eq!(args.len(), 2);
    }

    #[test]
    fn postgres_like_is_case_insensitive() {
        let (clause, _) = compile_filter(Dialect::Postgres, &Cond::new().like("name", "a%").into())
            .unwrap()
            .unwrap();
        assert_eq!(clause, r#""name" ILIKE ?"#);
    }

    #[test]
    fn raw_and_functions_pass_through() {
        let tree = and([
            raw("length(name) > ?", vec![Value::Int(3)]),
            func("is_active", vec![Value::Bool(true)]),
        ]);
        let (clause, args) = sqlite(&tree).unwrap();
        assert_eq!(clause, "(length(name) > ?) AND (is_active(?))");
        assert_eq!(args, vec![Value::Int(3), Value::Bool(true)]);
        assert!(compile_filter(Dialect::Sqlite, &func("bad name", vec![])).is_err());
    }

    #[test]
    fn numbered_raw_markers_bind_their_own_arguments() {
        let tree = and([
            Condition::from(Cond::new().eq("name", "A")),
            raw("age BETWEEN ?1 AND ?2 OR age = ?1", vec![Value::Int(20), Value::Int(30)]),
            Cond::new().eq("city", "Oslo").into(),
        ]);
        let (clause, args) = sqlite(&tree).unwrap();
        assert_eq!(
            clause,
            r#"("name" = ?) AND (age BETWEEN ? AND ? OR age = ?) AND ("city" = ?)"#
        );
        assert_eq!(
            args,
            vec![
                Value::from("A"),
                Value::Int(20),
                Value::Int(30),
                Value::Int(20),
                Value::from("Oslo"),
            ]
        );
        assert!(compile_filter(Dialect::Sqlite, &raw("x = ?2", vec![Value::Int(1)])).is_err());
    }
}
