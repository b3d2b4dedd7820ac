//! Find command implementation.

use super::{split_fields, CliError};
use quarry_core::{
    Config, FindOptions, IndexRequest, IndexType, QueryEngine, SortField, Tokenizer,
};
use quarry_store::InMemoryStore;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Arguments of the find command.
#[derive(Debug, Default)]
pub struct FindArgs {
    /// JSON-lines documents file.
    pub docs: PathBuf,
    /// Index database path; in-memory when absent.
    pub index_db: Option<PathBuf>,
    /// Raw selector JSON.
    pub selector: String,
    /// Comma-separated field lists, one per JSON index.
    pub indexes: Vec<String>,
    /// Comma-separated fields of the text index.
    pub text_index: Option<String>,
    /// Tokenizer setting of the text index.
    pub tokenizer: Option<String>,
    /// Sort fields as `field[:asc|:desc]`.
    pub sort: Vec<String>,
    /// Results to skip.
    pub skip: usize,
    /// Maximum results.
    pub limit: Option<usize>,
    /// Comma-separated projection.
    pub fields: Option<String>,
}

/// Runs the find command.
pub fn run(args: &FindArgs, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let docs = query(args)?;
    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&docs)?);
        }
        _ => {
            for doc in &docs {
                println!("{}", serde_json::to_string(doc)?);
            }
        }
    }
    Ok(())
}

/// Loads the documents, prepares the indexes and returns the matches with
/// `_id` and `_rev` included.
pub fn query(args: &FindArgs) -> Result<Vec<Value>, Box<dyn std::error::Error>> {
    let store = Arc::new(load_documents(&args.docs)?);
    info!(documents = store.len(), path = %args.docs.display(), "loaded documents");

    let engine = match &args.index_db {
        Some(path) => {
            let engine = QueryEngine::open(store.clone(), path, Config::default())?;
            rebuild_indexes(&engine)?;
            engine
        }
        None => QueryEngine::open_in_memory(store.clone(), Config::default())?,
    };

    for list in &args.indexes {
        let name = engine.create_json_index(&split_fields(list), None)?;
        debug!(index = %name, "json index ready");
    }
    if let Some(list) = &args.text_index {
        let tokenizer = match &args.tokenizer {
            Some(setting) => Some(Tokenizer::parse(setting).ok_or(CliError::BadArgument {
                argument: "tokenizer",
                reason: "tokenizer setting is empty".into(),
            })?),
            None => None,
        };
        let fields = split_fields(list);
        let mut request = IndexRequest::text(&fields);
        request.tokenizer = tokenizer.clone();
        let recorded = engine
            .list_indexes()?
            .into_iter()
            .find(|i| i.index_type == IndexType::Text && i.same_definition(&request));
        let name = match recorded {
            Some(index) => index.name,
            None => engine.create_text_index(&fields, None, tokenizer)?,
        };
        debug!(index = %name, "text index ready");
    }

    let selector: Value = serde_json::from_str(&args.selector).map_err(|e| CliError::BadArgument {
        argument: "selector",
        reason: e.to_string(),
    })?;
    let options = find_options(args)?;

    let result = engine.find_with_options(&selector, &options)?;
    let docs = result
        .iter()
        .map(|doc| doc.map(|d| d.to_json()))
        .collect::<Result<Vec<_>, _>>()?;
    info!(matched = docs.len(), "query complete");

    engine.close();
    Ok(docs)
}

fn find_options(args: &FindArgs) -> Result<FindOptions, Box<dyn std::error::Error>> {
    let sort = args
        .sort
        .iter()
        .map(|s| s.parse::<SortField>())
        .collect::<Result<Vec<_>, _>>()?;

    let mut options = FindOptions::new().skip(args.skip).sort(sort);
    if let Some(limit) = args.limit {
        options = options.limit(limit);
    }
    if let Some(fields) = &args.fields {
        options = options.fields(split_fields(fields));
    }
    Ok(options)
}

/// Reads one document object per non-blank line.
///
/// A string `_id` member becomes the document id; other documents get a
/// generated one. `_rev` members are dropped.
pub fn load_documents(path: &Path) -> Result<InMemoryStore, Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(path)?;
    let store = InMemoryStore::new();

    for (index, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let bad = |reason: String| CliError::BadDocument {
            path: path.to_path_buf(),
            line: index + 1,
            reason,
        };

        let value: Value = serde_json::from_str(line).map_err(|e| bad(e.to_string()))?;
        let Value::Object(mut body) = value else {
            return Err(bad("expected a JSON object".into()).into());
        };
        body.remove("_rev");
        let id = match body.remove("_id") {
            Some(Value::String(id)) => Some(id),
            Some(other) => return Err(bad(format!("_id must be a string, found {}", other)).into()),
            None => None,
        };
        store
            .create(id.as_deref(), Value::Object(body))
            .map_err(|e| bad(e.to_string()))?;
    }
    Ok(store)
}

/// Recreates every recorded index so it reflects the freshly loaded
/// documents instead of whatever store populated it before.
fn rebuild_indexes(engine: &QueryEngine) -> Result<(), Box<dyn std::error::Error>> {
    for index in engine.list_indexes()? {
        engine.delete_index(&index.name)?;
        let mut request = IndexRequest::json(&index.fields).named(index.name.clone());
        request.index_type = index.index_type;
        request.tokenizer = index.tokenizer.clone();
        engine.create_index(request)?;
        debug!(index = %index.name, "rebuilt index");
    }
    Ok(())
}
