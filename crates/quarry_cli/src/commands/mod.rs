//! CLI command implementations.

pub mod find;
pub mod indexes;

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while preparing command input.
#[derive(Debug, Error)]
pub enum CliError {
    /// A documents file line is not a JSON object.
    #[error("{path}:{line}: {reason}")]
    BadDocument {
        /// The documents file.
        path: PathBuf,
        /// 1-based line number.
        line: usize,
        /// What is wrong with the line.
        reason: String,
    },

    /// A command-line argument could not be parsed.
    #[error("invalid {argument}: {reason}")]
    BadArgument {
        /// The argument name.
        argument: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

/// Splits a comma-separated field list, dropping empty entries.
pub fn split_fields(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_fields_trims() {
        assert_eq!(split_fields("name, age,,address.city "), vec!["name", "age", "address.city"]);
        assert!(split_fields("").is_empty());
    }
}
