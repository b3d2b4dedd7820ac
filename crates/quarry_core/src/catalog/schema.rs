//! Catalog table names and schema migrations.

use crate::error::CoreResult;
use quarry_sql::{MigrationManager, SchemaOnlyMigration};

/// Table holding one row per (index, field).
pub const METADATA_TABLE: &str = "_t_quarry_query_metadata";

/// Prefix of every physical index table.
pub const INDEX_TABLE_PREFIX: &str = "_t_quarry_query_index_";

/// Suffix of the SQL index built over a JSON index table.
pub const SQL_INDEX_SUFFIX: &str = "_index";

/// Returns the physical table name for an index.
///
/// The result is a raw name; quote it with [`crate::value::quote_identifier`]
/// before embedding it in SQL.
#[must_use]
pub fn table_name_for_index(index_name: &str) -> String {
    format!("{}{}", INDEX_TABLE_PREFIX, index_name)
}

fn version_1() -> SchemaOnlyMigration {
    SchemaOnlyMigration::new(
        1,
        "create_index_metadata",
        [format!(
            "CREATE TABLE {} ( \
                index_name TEXT NOT NULL, \
                index_type TEXT NOT NULL, \
                field_name TEXT NOT NULL, \
                last_sequence INTEGER NOT NULL)",
            METADATA_TABLE
        )],
    )
}

fn version_2() -> SchemaOnlyMigration {
    SchemaOnlyMigration::new(
        2,
        "add_index_settings",
        [format!(
            "ALTER TABLE {} ADD COLUMN index_settings TEXT NULL",
            METADATA_TABLE
        )],
    )
}

/// Returns every catalog migration, in order.
///
/// # Errors
///
/// Returns an error if the migration list is inconsistent.
pub fn migrations() -> CoreResult<MigrationManager> {
    let mut manager = MigrationManager::new();
    manager.register(Box::new(version_1()))?;
    manager.register(Box::new(version_2()))?;
    manager.validate()?;
    Ok(manager)
}

/// Returns the migrations up to `version` only.
#[cfg(test)]
pub(crate) fn migrations_up_to(version: u32) -> MigrationManager {
    let mut manager = MigrationManager::new();
    manager.register(Box::new(version_1())).unwrap();
    if version >= 2 {
        manager.register(Box::new(version_2())).unwrap();
    }
    manager
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_sql::rusqlite::Connection;

    #[test]
    fn table_names() {
        assert_eq!(table_name_for_index("by_name"), "_t_quarry_query_index_by_name");
    }

    #[test]
    fn migrations_apply_cleanly() {
        let mut conn = Connection::open_in_memory().unwrap();
        let result = migrations().unwrap().run_pending(&mut conn).unwrap();
        assert_eq!(result.final_version, 2);

        let columns: Vec<String> = conn
            .prepare(&format!("PRAGMA table_info({})", METADATA_TABLE))
            .unwrap()
            .query_map([], |row| row.get::<_, String>(1))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(
            columns,
            vec!["index_name", "index_type", "field_name", "last_sequence", "index_settings"]
        );
    }
}
