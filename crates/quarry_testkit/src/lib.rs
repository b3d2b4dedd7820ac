//! # Quarry Testkit
//!
//! Test utilities for Quarry.
//!
//! This crate provides:
//! - Engine fixtures over in-memory stores, with in-memory or temporary
//!   file index databases
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust
//! use quarry_testkit::prelude::*;
//! use serde_json::json;
//!
//! with_test_engine(|t| {
//!     t.insert("mike", json!({"name": "mike"}));
//!     t.create_json_index(&["name"], None).unwrap();
//!     assert_eq!(t.find_ids(json!({"name": "mike"})), vec!["mike"]);
//! });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use generators::*;
