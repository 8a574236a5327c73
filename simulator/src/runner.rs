use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use dbmux::condition::Condition;
use dbmux::prelude::*;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::args::SimConfig;
use crate::generation::{self, COLLECTION};
use crate::oracle::{describe_mismatch, expected_ids};
use crate::shrinker::{ShrinkResult, shrink_condition};

const SHRINK_ATTEMPTS: usize = 500;

#[derive(Debug, Default)]
pub(crate) struct Summary {
    pub(crate) rounds: u64,
    pub(crate) matched_rows: u64,
}

#[derive(Debug)]
pub(crate) struct Failure {
    pub(crate) round: u64,
    pub(crate) message: String,
    pub(crate) shrunk: Option<ShrinkResult>,
}

fn settings(config: &SimConfig) -> Result<ConnectionSettings, DbError> {
    match config.backend {
        "postgres" => ConnectionSettings::from_env(&config.env_prefix),
        "sqlite" => Ok(ConnectionSettings::for_database(
            config.db_path.clone().unwrap_or_else(|| ":memory:".to_string()),
        )),
        _ => Ok(ConnectionSettings::new()),
    }
}

async fn create_table(session: &Session) -> Result<(), DbError> {
    #[cfg(feature = "sqlite")]
    if let Some(shared) = session.driver_as::<dbmux::sqlite::SharedSqliteConnection>() {
        let guard = shared.lock().await;
        let conn = guard
            .as_ref()
            .ok_or_else(|| DbError::ExecutionError("sqlite connection closed".into()))?;
        conn.execute_batch(generation::SQLITE_DDL)?;
    }
    #[cfg(feature = "postgres")]
    if let Some(pool) = session.driver_as::<dbmux::postgres::Pool>() {
        pool.get().await?.batch_execute(generation::POSTGRES_DDL).await?;
        pool.manager().statement_caches.clear();
    }
    Ok(())
}

async fn found_ids(collection: &Collection, condition: &Condition) -> Result<BTreeSet<i64>, DbError> {
    let mut rows: Vec<ValueMap> = Vec::new();
    collection
        .find(condition.clone())
        .select(["id"])
        .all(&mut rows)
        .await?;
    Ok(rows
        .iter()
        .filter_map(|r| r.get("id").and_then(Value::as_int))
        .collect())
}

/// Compare one tree against the evaluator; `Ok(Err(_))` describes a disagreement.
async fn check(
    collection: &Collection,
    rows: &[ValueMap],
    condition: &Condition,
) -> Result<Result<u64, String>, DbError> {
    let want = expected_ids(rows, condition)?;
    let got = found_ids(collection, condition).await?;
    if got != want {
        return Ok(Err(describe_mismatch(&got, &want)));
    }

    let total = collection.find(condition.clone()).skip(3).limit(2).count().await?;
    if total != want.len() as u64 {
        return Ok(Err(format!("count {total} != {} expected", want.len())));
    }

    let mut rs = collection.find(condition.clone()).sort(&["-id"]);
    let mut row = ValueMap::new();
    let mut walked = Vec::new();
    loop {
        match rs.next(&mut row).await {
            Ok(()) => walked.extend(row.get("id").and_then(Value::as_int)),
            Err(e) if e.is_no_more_rows() => break,
            Err(e) => return Err(e),
        }
    }
    rs.close().await?;
    let descending: Vec<i64> = want.iter().rev().copied().collect();
    if walked != descending {
        return Ok(Err(format!("next() walked {walked:?}, expected {descending:?}")));
    }
    Ok(Ok(total))
}

pub(crate) async fn run(config: &SimConfig) -> Result<Result<Summary, Failure>, DbError> {
    dbmux::register_builtin();
    let session = Session::open(config.backend, &settings(config)?).await?;
    create_table(&session).await?;
    let collection = session.collection(&[COLLECTION])?;
    collection.truncate().await?;

    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let rows = generation::fixture(&mut rng, config.rows);
    let tx = session.transaction().await?;
    let loading = tx.collection(&[COLLECTION])?;
    for row in &rows {
        loading.append_values(row.clone()).await?;
    }
    tx.commit().await?;
    tracing::info!(rows = rows.len(), backend = config.backend, "fixture loaded");

    let deadline = config
        .duration_ms
        .map(|ms| Instant::now() + Duration::from_millis(ms));
    let mut summary = Summary::default();
    loop {
        if config.rounds.is_some_and(|n| summary.rounds >= n)
            || deadline.is_some_and(|d| Instant::now() >= d)
        {
            break;
        }
        let round = summary.rounds;
        let condition = generation::condition(&mut rng, config.depth);
        tracing::debug!(round, ?condition, "checking");
        match check(&collection, &rows, &condition).await? {
            Ok(matched) => summary.matched_rows += matched,
            Err(message) => {
                tracing::error!(round, seed = config.seed, %message, "mismatch");
                let shrunk = shrink_condition(condition, SHRINK_ATTEMPTS, |candidate| {
                    let collection = collection.clone();
                    let rows = &rows;
                    async move {
                        matches!(check(&collection, rows, &candidate).await, Ok(Err(_)))
                    }
                })
                .await;
                session.close().await?;
                return Ok(Err(Failure {
                    round,
                    message,
                    shrunk: Some(shrunk),
                }));
            }
        }
        summary.rounds += 1;
        if summary.rounds % 100 == 0 {
            tracing::info!(rounds = summary.rounds, "progress");
        }
    }
    session.close().await?;
    Ok(Ok(summary))
}
