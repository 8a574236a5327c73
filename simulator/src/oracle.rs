use std::collections::BTreeSet;

use dbmux::condition::Condition;
use dbmux::condition::eval::matches;
use dbmux::{DbError, Row, ValueMap};

/// Ids of the fixture rows the reference evaluator accepts.
pub(crate) fn expected_ids(rows: &[ValueMap], condition: &Condition) -> Result<BTreeSet<i64>, DbError> {
    let mut ids = BTreeSet::new();
    for row in rows {
        if matches(condition, &Row::from_map(row.clone()))?
            && let Some(id) = row.get("id").and_then(|v| v.as_int())
        {
            ids.insert(id);
        }
    }
    Ok(ids)
}

/// Human-readable difference between what the backend returned and what it should have.
pub(crate) fn describe_mismatch(got: &BTreeSet<i64>, want: &BTreeSet<i64>) -> String {
    let extra: Vec<_> = got.difference(want).collect();
    let missing: Vec<_> = want.difference(got).collect();
    format!("unexpected ids {extra:?}, missing ids {missing:?}")
}
