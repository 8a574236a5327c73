//! Convenient imports for common functionality.
//!
//! This module re-exports the most commonly used types and functions
//! to make it easier to get started with the library.

pub use crate::adapter::{BuiltinBackend, Capabilities, SortKey};
pub use crate::collection::Collection;
pub use crate::condition::{Column, Cond, Condition, Op, and, func, or, raw};
pub use crate::config::ConnectionSettings;
pub use crate::error::{DbError, ErrorKind};
pub use crate::impl_record;
pub use crate::mapping::{Container, Destination, Fields, Record, describe};
pub use crate::register_builtin;
pub use crate::result_set::{Changes, CursorState, ResultSet};
pub use crate::results::Row;
pub use crate::session::{Session, Tx};
pub use crate::types::{FromValue, Value, ValueMap};
