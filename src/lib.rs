//! Backend-agnostic collections over SQLite, PostgreSQL and an in-memory store.
//!
//! A [`Session`] opens [`Collection`]s; `find` builds a lazy [`ResultSet`] from a
//! [`Condition`] tree, and rows land in records described with [`impl_record!`],
//! in plain [`ValueMap`]s, or in `Vec`s of either. Backends implement the
//! [`adapter::Connection`] contract and are registered by name.
//!
//! ```rust
//! use dbmux::prelude::*;
//!
//! #[derive(Debug, Default, Clone, PartialEq)]
//! struct Book {
//!     id: i64,
//!     title: String,
//!     year: i64,
//! }
//!
//! dbmux::impl_record!(Book {
//!     id: "id,omitempty",
//!     title,
//!     year,
//! });
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! dbmux::register_builtin();
//! let session = Session::open("memory", &ConnectionSettings::new()).await?;
//! let books = session.collection(&["books"])?;
//!
//! let mut dune = Book { id: 0, title: "Dune".into(), year: 1965 };
//! books.append(&mut dune).await?;
//! assert_eq!(dune.id, 1);
//!
//! let mut found = Book::default();
//! books.find(Cond::new().lt("year", 1970)).one(&mut found).await?;
//! assert_eq!(found, dune);
//! # Ok::<(), DbError>(())
//! # }).unwrap();
//! ```

pub mod adapter;
pub mod collection;
pub mod condition;
pub mod config;
pub mod error;
pub mod logging;
pub mod mapping;
pub mod memory;
pub mod prelude;
pub mod result_set;
pub mod results;
pub mod session;
#[cfg(any(feature = "sqlite", feature = "postgres"))]
pub mod sql;
#[cfg(any(feature = "sqlite", feature = "postgres"))]
pub mod translation;
pub mod types;

#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use adapter::{BuiltinBackend, Capabilities};
pub use collection::Collection;
pub use condition::{Cond, Condition, and, func, or, raw};
pub use config::ConnectionSettings;
pub use error::{DbError, ErrorKind};
pub use result_set::{Changes, CursorState, ResultSet};
pub use results::Row;
pub use session::{Session, Tx};
pub use types::{FromValue, Value, ValueMap};

/// Register every backend compiled into this build: `memory`, plus `sqlite` and `postgres`
/// when their features are enabled. Safe to call more than once.
pub fn register_builtin() {
    memory::register();
    #[cfg(feature = "sqlite")]
    sqlite::register();
    #[cfg(feature = "postgres")]
    postgres::register();
}
