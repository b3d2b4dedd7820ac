//! # Quarry Core
//!
//! Declarative selector queries with SQL-backed secondary indexes.
//!
//! This crate provides:
//! - Selector normalization into a canonical boolean tree
//! - An index catalog with one SQLite table per index
//! - Incremental index maintenance from a store's change feed
//! - Translation of selectors into SQL over the indexes
//! - Sorting, pagination and projection of results
//! - An in-memory matcher for queries indexes cannot fully answer
//!
//! ## Example
//!
//! ```rust
//! use quarry_core::{Config, FindOptions, QueryEngine, SortField};
//! use quarry_store::InMemoryStore;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! let store = Arc::new(InMemoryStore::new());
//! let engine = QueryEngine::open_in_memory(store.clone(), Config::default()).unwrap();
//! engine.create_json_index(&["name", "age"], None).unwrap();
//!
//! store.create(Some("a"), json!({"name": "mike", "age": 32})).unwrap();
//! store.create(Some("b"), json!({"name": "mike", "age": 12})).unwrap();
//! store.create(Some("c"), json!({"name": "fred", "age": 40})).unwrap();
//!
//! let options = FindOptions::new().sort([SortField::asc("age")]);
//! let result = engine
//!     .find_with_options(&json!({"name": "mike"}), &options)
//!     .unwrap();
//! assert_eq!(result.document_ids().unwrap(), vec!["b", "a"]);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod catalog;
mod config;
mod engine;
mod error;
mod executor;
pub mod matcher;
mod result;
pub mod selector;
pub mod sort;
pub mod translator;
mod updater;
pub mod value;

pub use catalog::{IndexDefinition, IndexRequest, IndexType, SortDirection, SortField, Tokenizer};
pub use config::Config;
pub use engine::QueryEngine;
pub use error::{CoreError, CoreResult};
pub use matcher::UnindexedMatcher;
pub use result::{FindOptions, QueryResult, QueryResultIter};
pub use selector::{normalize, Selector, SelectorError};
pub use updater::rows_for_revision;
