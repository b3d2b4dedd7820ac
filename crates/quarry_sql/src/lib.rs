//! # Quarry SQL
//!
//! The SQL execution layer used by the Quarry query engine.
//!
//! All reads and writes against the index database are funneled through one
//! [`SqlQueue`] per database. The queue owns a single SQLite connection on a
//! dedicated worker thread and runs submitted units of work strictly one at
//! a time, so a unit of work that reads, writes and commits is atomic with
//! respect to every other unit.
//!
//! Schema evolution is modeled as an ordered list of [`Migration`]s applied
//! against the version number stored in the database (`PRAGMA user_version`).
//!
//! ## Example
//!
//! ```rust
//! use quarry_sql::{SqlConfig, SqlError, SqlQueue};
//!
//! let queue = SqlQueue::open_in_memory(SqlConfig::default()).unwrap();
//! let answer: i64 = queue
//!     .submit(|conn| {
//!         let value = conn.query_row("SELECT 40 + 2", [], |row| row.get(0))?;
//!         Ok::<_, SqlError>(value)
//!     })
//!     .wait()
//!     .unwrap();
//! assert_eq!(answer, 42);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod migration;
mod queue;

pub use config::SqlConfig;
pub use error::{SqlError, SqlResult};
pub use migration::{
    Migration, MigrationManager, MigrationRunResult, SchemaOnlyMigration, SchemaVersion,
};
pub use queue::{SqlFuture, SqlQueue};

/// Re-exported so callers can name connections, rows and bound values
/// without a direct dependency on the SQLite bindings.
pub use rusqlite;
