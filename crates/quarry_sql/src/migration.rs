//! Schema migration support.
//!
//! Schema evolution is an ordered list of migrations, each tagged with the
//! version it produces. The current version lives in the database itself
//! (`PRAGMA user_version`), so reopening a database applies only what is
//! missing.
//!
//! Migrations are:
//! - **Forward-only**: there is no automatic rollback to an older version
//! - **Sequential**: versions start at 1 and have no gaps
//! - **Transactional**: each migration and its version bump commit together
//!
//! ## Usage
//!
//! ```rust
//! use quarry_sql::rusqlite::Connection;
//! use quarry_sql::{MigrationManager, SchemaOnlyMigration};
//!
//! let mut manager = MigrationManager::new();
//! manager
//!     .register(Box::new(SchemaOnlyMigration::new(
//!         1,
//!         "create_items",
//!         ["CREATE TABLE items (id TEXT NOT NULL)"],
//!     )))
//!     .unwrap();
//!
//! let mut conn = Connection::open_in_memory().unwrap();
//! let result = manager.run_pending(&mut conn).unwrap();
//! assert_eq!(result.final_version, 1);
//! ```

use crate::error::{SqlError, SqlResult};
use rusqlite::Connection;
use std::collections::BTreeMap;
use tracing::info;

/// Version number produced by a migration.
pub type SchemaVersion = u32;

/// A single schema migration.
pub trait Migration: Send + Sync {
    /// Returns the version this migration upgrades the schema to.
    ///
    /// Versions must be unique and sequential starting from 1.
    fn version(&self) -> SchemaVersion;

    /// Returns the name of this migration.
    fn name(&self) -> &str;

    /// Applies the migration.
    ///
    /// Called inside a transaction; returning an error rolls it back.
    fn up(&self, conn: &Connection) -> SqlResult<()>;
}

/// A migration made only of DDL statements.
#[derive(Debug, Clone)]
pub struct SchemaOnlyMigration {
    version: SchemaVersion,
    name: String,
    statements: Vec<String>,
}

impl SchemaOnlyMigration {
    /// Creates a migration that runs `statements` in order.
    pub fn new<I, S>(version: SchemaVersion, name: impl Into<String>, statements: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            version,
            name: name.into(),
            statements: statements.into_iter().map(Into::into).collect(),
        }
    }
}

impl Migration for SchemaOnlyMigration {
    fn version(&self) -> SchemaVersion {
        self.version
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn up(&self, conn: &Connection) -> SqlResult<()> {
        for statement in &self.statements {
            conn.execute_batch(statement)?;
        }
        Ok(())
    }
}

/// Result of running all pending migrations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationRunResult {
    /// Versions applied by this run, ascending.
    pub applied: Vec<SchemaVersion>,
    /// The schema version after the run.
    pub final_version: SchemaVersion,
}

/// Manages an ordered set of migrations.
pub struct MigrationManager {
    migrations: BTreeMap<SchemaVersion, Box<dyn Migration>>,
}

impl MigrationManager {
    /// Creates a new migration manager.
    #[must_use]
    pub fn new() -> Self {
        Self {
            migrations: BTreeMap::new(),
        }
    }

    /// Registers a migration.
    ///
    /// # Errors
    ///
    /// Returns an error if a migration with the same version already exists
    /// or the version is 0.
    pub fn register(&mut self, migration: Box<dyn Migration>) -> SqlResult<()> {
        let version = migration.version();
        if version == 0 {
            return Err(SqlError::migration_failed("migration version 0 is reserved"));
        }
        if self.migrations.contains_key(&version) {
            return Err(SqlError::migration_failed(format!(
                "migration version {} already registered",
                version
            )));
        }
        self.migrations.insert(version, migration);
        Ok(())
    }

    /// Returns the highest registered version (0 if none).
    #[must_use]
    pub fn latest_version(&self) -> SchemaVersion {
        self.migrations.keys().next_back().copied().unwrap_or(0)
    }

    /// Validates that migrations are sequential with no gaps.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first gap.
    pub fn validate(&self) -> SqlResult<()> {
        for (i, version) in self.migrations.keys().enumerate() {
            let expected = (i + 1) as SchemaVersion;
            if *version != expected {
                return Err(SqlError::migration_failed(format!(
                    "migration version gap: expected {}, got {}",
                    expected, version
                )));
            }
        }
        Ok(())
    }

    /// Reads the schema version stored in the database.
    ///
    /// # Errors
    ///
    /// Returns an error if the pragma cannot be read.
    pub fn current_version(conn: &Connection) -> SqlResult<SchemaVersion> {
        let version: SchemaVersion = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        Ok(version)
    }

    /// Applies every migration newer than the stored version.
    ///
    /// Each migration runs with its version bump in one transaction; the
    /// run stops at the first failure.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails or a migration fails, or if the
    /// database is newer than every registered migration.
    pub fn run_pending(&self, conn: &mut Connection) -> SqlResult<MigrationRunResult> {
        self.validate()?;

        let current = Self::current_version(conn)?;
        if current > self.latest_version() {
            return Err(SqlError::migration_failed(format!(
                "database schema version {} is newer than supported version {}",
                current,
                self.latest_version()
            )));
        }

        let mut applied = Vec::new();
        for (version, migration) in self.migrations.range(current + 1..) {
            let tx = conn.transaction()?;
            migration.up(&tx).map_err(|e| {
                SqlError::migration_failed(format!(
                    "migration {} ({}) failed: {}",
                    version,
                    migration.name(),
                    e
                ))
            })?;
            tx.pragma_update(None, "user_version", *version)?;
            tx.commit()?;

            info!(version = *version, name = migration.name(), "applied schema migration");
            applied.push(*version);
        }

        Ok(MigrationRunResult {
            applied,
            final_version: Self::current_version(conn)?,
        })
    }
}

impl Default for MigrationManager {
    fn default() -> Self {
        Self::new()
    }
}
