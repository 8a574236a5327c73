use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use dbmux::BuiltinBackend;
use serde::Serialize;

#[derive(Parser, Debug)]
#[command(author, version, about = "Seeded filter-conformance runner for dbmux backends")]
pub(crate) struct Args {
    #[arg(long, value_enum, default_value = "sqlite")]
    pub(crate) backend: BuiltinBackend,
    /// Stop after this long instead of a fixed number of rounds.
    #[arg(long, value_parser = humantime::parse_duration)]
    pub(crate) duration: Option<Duration>,
    #[arg(long)]
    pub(crate) rounds: Option<u64>,
    #[arg(long)]
    pub(crate) seed: Option<u64>,
    /// Fixture rows loaded before the first round.
    #[arg(long, default_value_t = 200)]
    pub(crate) rows: usize,
    /// Maximum nesting of generated and/or trees.
    #[arg(long, default_value_t = 3)]
    pub(crate) depth: usize,
    /// `SQLite` file; defaults to an in-memory database.
    #[arg(long)]
    pub(crate) db_path: Option<String>,
    /// Prefix of the `*_HOST`, `*_DATABASE`, ... variables used for postgres.
    #[arg(long, default_value = "DBMUX_SIM_PG")]
    pub(crate) env_prefix: String,
    #[arg(long)]
    pub(crate) log: Option<PathBuf>,
    #[arg(long)]
    pub(crate) verbose: bool,
    #[arg(long)]
    pub(crate) quick: bool,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct SimConfig {
    pub(crate) backend: &'static str,
    pub(crate) duration_ms: Option<u64>,
    pub(crate) rounds: Option<u64>,
    pub(crate) seed: u64,
    pub(crate) rows: usize,
    pub(crate) depth: usize,
    pub(crate) db_path: Option<String>,
    pub(crate) env_prefix: String,
    pub(crate) log: Option<PathBuf>,
    pub(crate) verbose: bool,
    pub(crate) preset: Option<String>,
}

impl SimConfig {
    pub(crate) fn from_args(args: Args) -> Self {
        let mut config = SimConfig {
            backend: args.backend.name(),
            duration_ms: args
                .duration
                .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
            rounds: args.rounds,
            seed: args.seed.unwrap_or_else(random_seed),
            rows: args.rows.max(1),
            depth: args.depth.clamp(1, 12),
            db_path: args.db_path,
            env_prefix: args.env_prefix,
            log: args.log,
            verbose: args.verbose,
            preset: None,
        };
        if config.rounds.is_none() && config.duration_ms.is_none() {
            config.rounds = Some(1_000);
        }
        if args.quick {
            config.apply_quick();
        }
        config
    }

    fn apply_quick(&mut self) {
        self.preset = Some("quick".to_string());
        self.rounds = Some(100);
        self.duration_ms = None;
        self.rows = 50;
        self.depth = 2;
    }
}

fn random_seed() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    now.as_secs() ^ u64::from(now.subsec_nanos())
}
