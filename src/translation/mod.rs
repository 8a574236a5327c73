//! Placeholder rewriting for generated and raw SQL.
//!
//! The statement generator and raw condition fragments use positional `?` markers. Backends
//! number them in their own style before preparing: `$N` for PostgreSQL, `?N` for SQLite.

use std::borrow::Cow;

use crate::error::DbError;
use crate::types::Value;

mod scanner;

use scanner::{Scanner, State};

/// Target placeholder style.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderStyle {
    /// PostgreSQL-style placeholders like `$1`.
    Postgres,
    /// SQLite-style placeholders like `?1`.
    Sqlite,
}

impl PlaceholderStyle {
    fn marker(self) -> char {
        match self {
            PlaceholderStyle::Postgres => '$',
            PlaceholderStyle::Sqlite => '?',
        }
    }
}

/// One placeholder found outside literals and comments.
struct Span<'a> {
    start: usize,
    end: usize,
    /// `None` for a bare `?`; otherwise the sigil (`?` or `$`) and its digits.
    numbered: Option<(u8, &'a str)>,
}

fn spans(sql: &str) -> Vec<Span<'_>> {
    let scan = Scanner::new(sql);
    let mut found = Vec::new();
    let mut state = State::Normal;
    let mut idx = 0;

    while idx < scan.len() {
        let Some(b) = scan.at(idx) else { break };
        match state {
            State::Normal => match b {
                b'\'' => state = State::SingleQuoted,
                b'"' => state = State::DoubleQuoted,
                _ if scan.line_comment_starts(idx) => state = State::LineComment,
                _ if scan.block_comment_starts(idx) => {
                    state = State::BlockComment(1);
                    idx += 1;
                }
                b'?' => match scan.digits(idx + 1) {
                    Some((end, digits)) => {
                        found.push(Span {
                            start: idx,
                            end,
                            numbered: Some((b'?', digits)),
                        });
                        idx = end - 1;
                    }
                    None => found.push(Span {
                        start: idx,
                        end: idx + 1,
                        numbered: None,
                    }),
                },
                b'$' => {
                    if let Some((tag, close)) = scan.dollar_tag(idx) {
                        state = State::DollarQuoted(tag);
                        idx = close;
                    } else if let Some((end, digits)) = scan.digits(idx + 1) {
                        found.push(Span {
                            start: idx,
                            end,
                            numbered: Some((b'$', digits)),
                        });
                        idx = end - 1;
                    }
                }
                _ => {}
            },
            State::SingleQuoted => {
                if b == b'\'' {
                    if scan.at(idx + 1) == Some(b'\'') {
                        idx += 1;
                    } else {
                        state = State::Normal;
                    }
                }
            }
            State::DoubleQuoted => {
                if b == b'"' {
                    if scan.at(idx + 1) == Some(b'"') {
                        idx += 1;
                    } else {
                        state = State::Normal;
                    }
                }
            }
            State::LineComment => {
                if b == b'\n' {
                    state = State::Normal;
                }
            }
            State::BlockComment(depth) => {
                if scan.block_comment_starts(idx) {
                    state = State::BlockComment(depth + 1);
                    idx += 1;
                } else if scan.block_comment_ends(idx) {
                    state = if depth == 1 {
                        State::Normal
                    } else {
                        State::BlockComment(depth - 1)
                    };
                    idx += 1;
                }
            }
            State::DollarQuoted(ref tag) => {
                if scan.closes_tag(idx, tag) {
                    idx += tag.len() + 1;
                    state = State::Normal;
                }
            }
        }
        idx += 1;
    }
    found
}

/// Number bare `?` placeholders and convert already numbered ones (`?N` / `$N`) to `style`.
///
/// Quoted strings, quoted identifiers, comments and dollar-quoted blocks are left alone.
/// Returns a borrowed `Cow` when nothing changes.
#[must_use]
pub fn number_placeholders(sql: &str, style: PlaceholderStyle) -> Cow<'_, str> {
    let mut out: Option<String> = None;
    let mut copied = 0;
    let mut next = 0usize;

    for span in spans(sql) {
        let number = match span.numbered {
            Some((sigil, _)) if char::from(sigil) == style.marker() => continue,
            Some((_, digits)) => digits.to_string(),
            None => {
                next += 1;
                next.to_string()
            }
        };
        let buf = out.get_or_insert_with(|| String::with_capacity(sql.len() + 8));
        buf.push_str(&sql[copied..span.start]);
        buf.push(style.marker());
        buf.push_str(&number);
        copied = span.end;
    }

    match out {
        Some(mut buf) => {
            buf.push_str(&sql[copied..]);
            Cow::Owned(buf)
        }
        None => Cow::Borrowed(sql),
    }
}

/// Rewrite a raw fragment so every placeholder is a bare `?`, with `args` reordered (and
/// repeated) to match. `?N`/`$N` refer to the fragment's own arguments, counting from 1;
/// bare markers take the fragment's arguments in order.
///
/// # Errors
/// Returns `DbError::ValidationError` when a placeholder has no matching argument.
pub fn bare_placeholders(fragment: &str, args: &[Value]) -> Result<(String, Vec<Value>), DbError> {
    let mut sql = String::with_capacity(fragment.len());
    let mut bound = Vec::with_capacity(args.len());
    let mut copied = 0;
    let mut next = 0usize;

    for span in spans(fragment) {
        let index = match span.numbered {
            Some((_, digits)) => digits.parse::<usize>().unwrap_or(0),
            None => {
                next += 1;
                next
            }
        };
        let value = index
            .checked_sub(1)
            .and_then(|i| args.get(i))
            .ok_or_else(|| {
                DbError::ValidationError(format!(
                    "placeholder {} in {fragment:?} has no argument ({} given)",
                    &fragment[span.start..span.end],
                    args.len()
                ))
            })?;
        bound.push(value.clone());
        sql.push_str(&fragment[copied..span.start]);
        sql.push('?');
        copied = span.end;
    }
    sql.push_str(&fragment[copied..]);
    Ok((sql, bound))
}

/// Count the placeholders a statement binds, numbered or bare.
#[must_use]
pub fn placeholder_count(sql: &str) -> usize {
    let numbered = number_placeholders(sql, PlaceholderStyle::Postgres);
    let scan = Scanner::new(&numbered);
    let mut highest = 0usize;
    let mut idx = 0;
    while idx < scan.len() {
        if scan.at(idx) == Some(b'$')
            && let Some((end, digits)) = scan.digits(idx + 1)
        {
            highest = highest.max(digits.parse().unwrap_or(0));
            idx = end;
            continue;
        }
        idx += 1;
    }
    highest
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_bare_markers_for_postgres() {
        let sql = r#"SELECT * FROM "people" WHERE ("age" >= ?) AND ("name" IN (?, ?))"#;
        let res = number_placeholders(sql, PlaceholderStyle::Postgres);
        assert_eq!(
            res,
            r#"SELECT * FROM "people" WHERE ("age" >= $1) AND ("name" IN ($2, $3))"#
        );
    }

    #[test]
    fn numbers_bare_markers_for_sqlite() {
        let res = number_placeholders("UPDATE t SET a = ? WHERE b = ?", PlaceholderStyle::Sqlite);
        assert_eq!(res, "UPDATE t SET a = ?1 WHERE b = ?2");
    }

    #[test]
    fn converts_numbered_markers() {
        assert_eq!(
            number_placeholders("a = ?1 and b = ?2", PlaceholderStyle::Postgres),
            "a = $1 and b = $2"
        );
        assert_eq!(
            number_placeholders("values($1, $2)", PlaceholderStyle::Sqlite),
            "values(?1, ?2)"
        );
    }

    #[test]
    fn skips_literals_identifiers_and_comments() {
        let sql = "select '?', \"wh?t\" -- ?\n/* ? /* ? */ */ from t where a = ?";
        let res = number_placeholders(sql, PlaceholderStyle::Postgres);
        assert_eq!(
            res,
            "select '?', \"wh?t\" -- ?\n/* ? /* ? */ */ from t where a = $1"
        );
    }

    #[test]
    fn skips_dollar_quoted_blocks() {
        let sql = "$fn$ select ? $fn$ where a = ?";
        let res = number_placeholders(sql, PlaceholderStyle::Postgres);
        assert_eq!(res, "$fn$ select ? $fn$ where a = $1");
    }

    #[test]
    fn keeps_non_ascii_text() {
        let sql = "select 'ø?' from \"tåble\" where x = ?";
        assert_eq!(
            number_placeholders(sql, PlaceholderStyle::Postgres),
            "select 'ø?' from \"tåble\" where x = $1"
        );
    }

    #[test]
    fn unchanged_sql_is_borrowed() {
        let sql = "select 1";
        assert!(matches!(
            number_placeholders(sql, PlaceholderStyle::Postgres),
            Cow::Borrowed(_)
        ));
        assert!(matches!(
            number_placeholders("a = ?1", PlaceholderStyle::Sqlite),
            Cow::Borrowed(_)
        ));
    }

    #[test]
    fn raw_fragments_become_bare_markers() {
        let args = [Value::Int(1), Value::from("x")];
        let (sql, bound) = bare_placeholders("b = ?2 AND a = ?1 AND c = $2", &args).unwrap();
        assert_eq!(sql, "b = ? AND a = ? AND c = ?");
        assert_eq!(bound, vec![Value::from("x"), Value::Int(1), Value::from("x")]);

        let (sql, bound) = bare_placeholders("a = ? OR '?1' = ?", &args).unwrap();
        assert_eq!(sql, "a = ? OR '?1' = ?");
        assert_eq!(bound, args.to_vec());
    }

    #[test]
    fn raw_fragments_need_their_arguments() {
        let err = bare_placeholders("a = ?3", &[Value::Int(1)]).unwrap_err();
        assert!(matches!(err, DbError::ValidationError(_)));
        assert!(bare_placeholders("a = ?0", &[Value::Int(1)]).is_err());
        assert!(bare_placeholders("a = ? and b = ?", &[Value::Int(1)]).is_err());
    }

    #[test]
    fn counts_placeholders() {
        assert_eq!(placeholder_count("a = ? and b = ?"), 2);
        assert_eq!(placeholder_count("a = $2 or b = $1"), 2);
        assert_eq!(placeholder_count("'?'"), 0);
    }
}
