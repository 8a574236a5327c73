//! Name-to-backend registry.
//!
//! Nothing registers itself: call each backend module's `register()` (or
//! [`crate::register_builtin`]) before opening sessions.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock, PoisonError, RwLock};

use crate::error::DbError;

use super::Backend;

static BACKENDS: LazyLock<RwLock<HashMap<String, Arc<dyn Backend>>>> =
    LazyLock::new(|| RwLock::new(HashMap::new()));

/// Register `backend` under its name, replacing any earlier registration of that name.
pub fn register(backend: Arc<dyn Backend>) {
    let name = backend.name().to_string();
    let replaced = BACKENDS
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(name.clone(), backend)
        .is_some();
    tracing::debug!(backend = %name, replaced, "registered backend");
}

/// Look up a registered backend.
///
/// # Errors
/// Returns `DbError::ValidationError` if no backend of that name is registered.
pub fn lookup(name: &str) -> Result<Arc<dyn Backend>, DbError> {
    let found = BACKENDS
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(name)
        .cloned();
    found.ok_or_else(|| {
        DbError::ValidationError(format!(
            "unknown backend `{name}` (registered: {})",
            registered().join(", ")
        ))
    })
}

/// Sorted names of every registered backend.
#[must_use]
pub fn registered() -> Vec<String> {
    let mut names: Vec<String> = BACKENDS
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .keys()
        .cloned()
        .collect();
    names.sort();
    names
}
