//! Query engine configuration.

use quarry_sql::SqlConfig;

/// Configuration for a [`crate::QueryEngine`].
#[derive(Debug, Clone)]
pub struct Config {
    /// Number of changes read from the store per index update transaction.
    pub changes_batch_size: usize,

    /// Candidate id count at which sorting stops binding ids inline and
    /// orders the whole index table instead.
    pub sort_inline_threshold: usize,

    /// Documents fetched per store round-trip while iterating results.
    pub result_batch_size: usize,

    /// Settings for the index database connection.
    pub sql: SqlConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            changes_batch_size: 10_000,
            sort_inline_threshold: 500,
            result_batch_size: 50,
            sql: SqlConfig::default(),
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of changes processed per update transaction.
    #[must_use]
    pub const fn changes_batch_size(mut self, size: usize) -> Self {
        self.changes_batch_size = size;
        self
    }

    /// Sets the inline id threshold for sorting.
    #[must_use]
    pub const fn sort_inline_threshold(mut self, threshold: usize) -> Self {
        self.sort_inline_threshold = threshold;
        self
    }

    /// Sets the result materialization batch size.
    #[must_use]
    pub const fn result_batch_size(mut self, size: usize) -> Self {
        self.result_batch_size = size;
        self
    }

    /// Sets the index database connection settings.
    #[must_use]
    pub fn sql(mut self, sql: SqlConfig) -> Self {
        self.sql = sql;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.changes_batch_size, 10_000);
        assert_eq!(config.sort_inline_threshold, 500);
        assert_eq!(config.result_batch_size, 50);
        assert!(config.sql.create_dirs);
    }

    #[test]
    fn builder_pattern() {
        let config = Config::new()
            .changes_batch_size(2)
            .sort_inline_threshold(3)
            .result_batch_size(4);

        assert_eq!(config.changes_batch_size, 2);
        assert_eq!(config.sort_inline_threshold, 3);
        assert_eq!(config.result_batch_size, 4);
    }
}
