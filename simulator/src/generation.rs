use dbmux::condition::{Cond, Condition, and, or};
use dbmux::{Value, ValueMap};
use rand::Rng;
use rand_chacha::ChaCha8Rng;

pub(crate) const COLLECTION: &str = "sim_rows";

const COLORS: [&str; 5] = ["red", "green", "blue", "Yellow", "black"];

pub(crate) const SQLITE_DDL: &str = "DROP TABLE IF EXISTS sim_rows;
CREATE TABLE sim_rows (id INTEGER PRIMARY KEY, n INTEGER, score REAL, color TEXT, flag BOOLEAN, tag TEXT);";

pub(crate) const POSTGRES_DDL: &str = "DROP TABLE IF EXISTS sim_rows;
CREATE TABLE sim_rows (id BIGINT PRIMARY KEY, n BIGINT, score DOUBLE PRECISION, color TEXT, flag BOOLEAN, tag TEXT);";

/// Deterministic fixture rows with ids `1..=count`.
pub(crate) fn fixture(rng: &mut ChaCha8Rng, count: usize) -> Vec<ValueMap> {
    (1..=count)
        .map(|id| {
            let mut row = ValueMap::new();
            row.insert("id".into(), Value::Int(i64::try_from(id).unwrap_or(i64::MAX)));
            let n = Value::Int(rng.random_range(-5..25));
            row.insert("n".into(), nullable(rng, n));
            row.insert(
                "score".into(),
                Value::Float(f64::from(rng.random_range(0..400_i32)) / 4.0),
            );
            row.insert(
                "color".into(),
                Value::from(COLORS[rng.random_range(0..COLORS.len())]),
            );
            row.insert("flag".into(), Value::Bool(rng.random_bool(0.5)));
            let tag = Value::from(format!("t{}", rng.random_range(0..4)));
            row.insert("tag".into(), nullable(rng, tag));
            row
        })
        .collect()
}

fn nullable(rng: &mut ChaCha8Rng, value: Value) -> Value {
    if rng.random_bool(0.15) {
        Value::Null
    } else {
        value
    }
}

fn leaf(rng: &mut ChaCha8Rng) -> Cond {
    let mut cond = Cond::new();
    for _ in 0..rng.random_range(1..=2) {
        cond = match rng.random_range(0..14) {
            0 => cond.eq("n", rng.random_range(-5..25_i64)),
            1 => cond.ne("n", rng.random_range(-5..25_i64)),
            2 => cond.gt("n", rng.random_range(-5..25_i64)),
            3 => cond.lte("n", rng.random_range(-5..25_i64)),
            4 => cond.gte("score", f64::from(rng.random_range(0..100_i32))),
            5 => cond.lt("score", rng.random_range(0..100_i64)),
            6 => cond.eq("color", COLORS[rng.random_range(0..COLORS.len())]),
            7 => cond.like("color", ["%e%", "b%", "%LL%", "_ed"][rng.random_range(0..4)]),
            8 => cond.not_like("color", ["%r%", "G%"][rng.random_range(0..2)]),
            9 => cond.eq("flag", rng.random_bool(0.5)),
            10 => cond.is_null(["n", "tag"][rng.random_range(0..2)]),
            11 => cond.not_null("tag"),
            12 => cond.any_of(
                "tag",
                (0..rng.random_range(0..3))
                    .map(|_| format!("t{}", rng.random_range(0..4)))
                    .collect::<Vec<_>>(),
            ),
            _ => cond.none_of(
                "n",
                (0..rng.random_range(1..4))
                    .map(|_| rng.random_range(-5..25_i64))
                    .collect::<Vec<_>>(),
            ),
        };
    }
    cond
}

/// A random and/or tree no deeper than `depth`.
pub(crate) fn condition(rng: &mut ChaCha8Rng, depth: usize) -> Condition {
    if depth == 0 || rng.random_bool(0.3) {
        return leaf(rng).into();
    }
    let children: Vec<Condition> = (0..rng.random_range(1..=3))
        .map(|_| condition(rng, depth - 1))
        .collect();
    if rng.random_bool(0.5) {
        and(children)
    } else {
        or(children)
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;

    use super::*;

    fn depth_of(condition: &Condition) -> usize {
        match condition {
            Condition::And(children) | Condition::Or(children) => {
                1 + children.iter().map(depth_of).max().unwrap_or(0)
            }
            _ => 0,
        }
    }

    #[test]
    fn same_seed_same_fixture_and_trees() {
        let mut a = ChaCha8Rng::seed_from_u64(11);
        let mut b = ChaCha8Rng::seed_from_u64(11);
        assert_eq!(fixture(&mut a, 20), fixture(&mut b, 20));
        assert_eq!(condition(&mut a, 3), condition(&mut b, 3));
    }

    #[test]
    fn trees_respect_depth() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        for _ in 0..200 {
            assert!(depth_of(&condition(&mut rng, 2)) <= 2);
        }
    }
}
