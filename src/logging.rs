//! Statement logging toggle.
//!
//! Set `DBMUX_LOG_STATEMENTS` to anything other than `0`, `false` or an empty string to log
//! every translated statement and its bound arguments under the `dbmux::statement` target.

use std::sync::LazyLock;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::types::Value;

pub const LOG_STATEMENTS_ENV: &str = "DBMUX_LOG_STATEMENTS";

static ENABLED: LazyLock<AtomicBool> =
    LazyLock::new(|| AtomicBool::new(flag_enabled(std::env::var(LOG_STATEMENTS_ENV).ok())));

fn flag_enabled(raw: Option<String>) -> bool {
    match raw {
        Some(v) => {
            let v = v.trim();
            !(v.is_empty() || v == "0" || v.eq_ignore_ascii_case("false"))
        }
        None => false,
    }
}

/// Whether statement logging is on.
#[must_use]
pub fn statements_enabled() -> bool {
    ENABLED.load(Ordering::Relaxed)
}

/// Override the environment toggle at runtime.
pub fn set_statement_logging(enabled: bool) {
    ENABLED.store(enabled, Ordering::Relaxed);
}

/// Log one translated statement with its arguments when the toggle is on.
pub fn log_statement(backend: &str, statement: &str, args: &[Value]) {
    if statements_enabled() {
        tracing::info!(target: "dbmux::statement", backend, statement, args = ?args);
    }
}
