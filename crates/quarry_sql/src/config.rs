//! SQL queue configuration.

use std::time::Duration;

/// Configuration for opening a [`crate::SqlQueue`].
#[derive(Debug, Clone)]
pub struct SqlConfig {
    /// How long SQLite waits on a locked database file before failing.
    pub busy_timeout: Duration,

    /// Whether to create missing parent directories of the database file.
    pub create_dirs: bool,

    /// Whether to enable WAL journaling for file databases.
    pub wal_journal: bool,
}

impl Default for SqlConfig {
    fn default() -> Self {
        Self {
            busy_timeout: Duration::from_secs(5),
            create_dirs: true,
            wal_journal: true,
        }
    }
}

impl SqlConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the busy timeout.
    #[must_use]
    pub const fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Sets whether missing parent directories are created.
    #[must_use]
    pub const fn create_dirs(mut self, value: bool) -> Self {
        self.create_dirs = value;
        self
    }

    /// Sets whether WAL journaling is enabled.
    #[must_use]
    pub const fn wal_journal(mut self, value: bool) -> Self {
        self.wal_journal = value;
        self
    }
}
