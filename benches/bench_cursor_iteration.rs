#![allow(clippy::cast_possible_wrap, clippy::cast_precision_loss)]

//! Criterion benchmark for draining a result set row by row with `next` versus
//! materializing it with `all`, on the memory store and on an on-disk `SQLite` file.
//! Rows land in a mapped record so the descriptor cost is part of the measurement.

use std::hint::black_box;
use std::sync::LazyLock;
use std::time::{Duration, Instant};

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use dbmux::prelude::*;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tempfile::TempDir;
use tokio::runtime::Runtime;

const ROWS: usize = 2_000;

static TOKIO_RUNTIME: LazyLock<Runtime> =
    LazyLock::new(|| Runtime::new().expect("create tokio runtime"));

#[derive(Debug, Default, Clone)]
struct BenchRow {
    id: i64,
    name: String,
    score: f64,
    active: bool,
}

impl_record!(BenchRow {
    id: "id,omitempty",
    name,
    score,
    active,
});

/// A session with `ROWS` seeded rows; the temp dir keeps the sqlite file alive.
struct Dataset {
    session: Session,
    _dir: Option<TempDir>,
}

async fn dataset(backend: &str) -> Dataset {
    dbmux::register_builtin();
    let (settings, dir) = if backend == "sqlite" {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("bench.db");
        (
            ConnectionSettings::for_database(path.to_string_lossy()),
            Some(dir),
        )
    } else {
        (ConnectionSettings::new(), None)
    };
    let session = Session::open(backend, &settings).await.expect("open session");
    if let Some(shared) = session.driver_as::<dbmux::sqlite::SharedSqliteConnection>() {
        let guard = shared.lock().await;
        guard
            .as_ref()
            .expect("sqlite connection")
            .execute_batch(
                "CREATE TABLE bench (id INTEGER PRIMARY KEY, name TEXT, score REAL, active INTEGER);",
            )
            .expect("create table");
    }

    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let tx = session.transaction().await.expect("begin");
    let seeding = tx.collection(&["bench"]).expect("collection");
    for i in 0..ROWS {
        let mut row = BenchRow {
            id: 0,
            name: format!("row-{i}"),
            score: rng.random_range(0.0..100.0),
            active: rng.random_bool(0.5),
        };
        seeding.append(&mut row).await.expect("seed row");
    }
    tx.commit().await.expect("commit");
    Dataset { session, _dir: dir }
}

fn cursor_iteration(c: &mut Criterion) {
    let runtime = &*TOKIO_RUNTIME;
    let mut group = c.benchmark_group("cursor_iteration");
    group.throughput(Throughput::Elements(ROWS as u64));

    for backend in ["memory", "sqlite"] {
        let data = runtime.block_on(dataset(backend));
        let bench = data.session.collection(&["bench"]).expect("collection");

        group.bench_function(BenchmarkId::new("next", backend), |b| {
            let bench = bench.clone();
            b.to_async(runtime).iter_custom(move |iters| {
                let bench = bench.clone();
                async move {
                    let mut total = Duration::default();
                    for _ in 0..iters {
                        let start = Instant::now();
                        let mut rs = bench.find_all();
                        let mut row = BenchRow::default();
                        while rs.next(&mut row).await.is_ok() {
                            black_box(&row);
                        }
                        total += start.elapsed();
                    }
                    total
                }
            });
        });

        group.bench_function(BenchmarkId::new("all", backend), |b| {
            let bench = bench.clone();
            b.to_async(runtime).iter_custom(move |iters| {
                let bench = bench.clone();
                async move {
                    let mut total = Duration::default();
                    let mut rows: Vec<BenchRow> = Vec::with_capacity(ROWS);
                    for _ in 0..iters {
                        let start = Instant::now();
                        bench
                            .find(Cond::new().gte("score", 0.0))
                            .all(&mut rows)
                            .await
                            .expect("materialize rows");
                        black_box(rows.len());
                        total += start.elapsed();
                    }
                    total
                }
            });
        });
    }
    group.finish();
}

criterion_group!(benches, cursor_iteration);
criterion_main!(benches);
