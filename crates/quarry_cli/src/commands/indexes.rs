//! Indexes command implementation.

use quarry_core::{Config, IndexDefinition, QueryEngine};
use quarry_store::InMemoryStore;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

/// One catalog entry as printed by the indexes command.
#[derive(Debug, Serialize)]
pub struct IndexSummary {
    /// Index name.
    pub name: String,
    /// `json` or `text`.
    pub index_type: String,
    /// Indexed fields in column order.
    pub fields: Vec<String>,
    /// Tokenizer setting of a text index.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokenizer: Option<String>,
    /// Highest store sequence the index reflects.
    pub last_sequence: u64,
}

impl From<&IndexDefinition> for IndexSummary {
    fn from(index: &IndexDefinition) -> Self {
        Self {
            name: index.name.clone(),
            index_type: index.index_type.to_string(),
            fields: index.fields.clone(),
            tokenizer: index.tokenizer.as_ref().map(|t| t.setting()),
            last_sequence: index.last_sequence,
        }
    }
}

/// Runs the indexes command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let summaries = list(path)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&summaries)?);
        }
        _ => print_text_output(&summaries),
    }
    Ok(())
}

/// Reads the catalog of an existing index database.
pub fn list(path: &Path) -> Result<Vec<IndexSummary>, Box<dyn std::error::Error>> {
    if !path.exists() {
        return Err(format!("No index database found at {:?}", path).into());
    }
    let engine = QueryEngine::open(Arc::new(InMemoryStore::new()), path, Config::default())?;
    let summaries = engine.list_indexes()?.iter().map(IndexSummary::from).collect();
    engine.close();
    Ok(summaries)
}

fn print_text_output(summaries: &[IndexSummary]) {
    if summaries.is_empty() {
        println!("No indexes");
        return;
    }
    for index in summaries {
        print!("{} ({}) [{}]", index.name, index.index_type, index.fields.join(", "));
        if let Some(tokenizer) = &index.tokenizer {
            print!(" tokenize={}", tokenizer);
        }
        println!(" last_sequence={}", index.last_sequence);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_core::Tokenizer;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn lists_persisted_indexes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("indexes.sqlite");

        let store = Arc::new(InMemoryStore::new());
        store.create(Some("a"), json!({"name": "mike"})).unwrap();
        let engine = QueryEngine::open(store, &path, Config::default()).unwrap();
        engine.create_json_index(&["name", "age"], Some("basic")).unwrap();
        engine
            .create_text_index(&["comment"], Some("search"), Some(Tokenizer::new("porter")))
            .unwrap();
        engine.close();

        let summaries = list(&path).unwrap();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].name, "basic");
        assert_eq!(summaries[0].fields, vec!["name", "age"]);
        assert_eq!(summaries[0].last_sequence, 1);
        assert_eq!(summaries[1].index_type, "text");
        assert_eq!(summaries[1].tokenizer.as_deref(), Some("porter"));
    }

    #[test]
    fn missing_database() {
        let dir = TempDir::new().unwrap();
        assert!(list(&dir.path().join("nope.sqlite")).is_err());
    }
}
