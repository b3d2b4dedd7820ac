//! # Quarry Store
//!
//! Document store interface consumed by the Quarry query engine.
//!
//! The query engine never owns documents. It reads them through the narrow
//! [`DocumentStore`] trait:
//!
//! - `fetch_by_id` / `fetch_many` to materialize query results
//! - `changes_since` to incrementally maintain indexes
//! - `all_ids` when no index can narrow a query at all
//!
//! ## Available Stores
//!
//! - [`InMemoryStore`] - For testing, tooling and ephemeral data
//!
//! ## Example
//!
//! ```rust
//! use quarry_store::{DocumentStore, InMemoryStore};
//! use serde_json::json;
//!
//! let store = InMemoryStore::new();
//! let rev = store.create(Some("mike"), json!({"name": "mike", "age": 12})).unwrap();
//! assert_eq!(rev.sequence, 1);
//!
//! let changes = store.changes_since(0, 100).unwrap();
//! assert_eq!(changes.len(), 1);
//! assert_eq!(changes.last_sequence, 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod memory;
mod revision;
mod store;

pub use error::{StoreError, StoreResult};
pub use memory::InMemoryStore;
pub use revision::{Changes, DocumentRevision};
pub use store::DocumentStore;
