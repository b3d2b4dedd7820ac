//! Index definitions.

use super::schema::table_name_for_index;
use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Field names every index table carries implicitly.
pub const META_FIELDS: [&str; 2] = ["_id", "_rev"];

/// The kind of an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexType {
    /// A plain secondary index answering field predicates and sorts.
    Json,
    /// A full-text index answering `$text` searches.
    Text,
}

impl IndexType {
    /// Returns the name stored in the catalog.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            IndexType::Json => "json",
            IndexType::Text => "text",
        }
    }
}

impl fmt::Display for IndexType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IndexType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "json" => Ok(IndexType::Json),
            "text" => Ok(IndexType::Text),
            other => Err(CoreError::illegal_state(format!("unknown index type {}", other))),
        }
    }
}

/// A full-text tokenizer: a name plus optional arguments.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Tokenizer {
    /// Tokenizer name, e.g. `simple`, `porter` or `unicode61`.
    pub name: String,
    /// Arguments passed to the tokenizer.
    pub args: Vec<String>,
}

impl Tokenizer {
    /// Creates a tokenizer without arguments.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
        }
    }

    /// The default tokenizer for text indexes.
    #[must_use]
    pub fn simple() -> Self {
        Self::new("simple")
    }

    /// Adds an argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Renders the stored setting value, e.g. `porter` or
    /// `unicode61 remove_diacritics=0`.
    #[must_use]
    pub fn setting(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(self.name.as_str());
        parts.extend(self.args.iter().map(String::as_str));
        parts.join(" ")
    }

    /// Checks that the tokenizer can be written into FTS table DDL.
    ///
    /// Names are restricted to ASCII letters, digits and `_`. Arguments must
    /// be non-empty and free of whitespace so the stored setting splits back
    /// into the same arguments.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` describing the offending part.
    pub fn validate(&self) -> CoreResult<()> {
        let valid_name = !self.name.is_empty()
            && self
                .name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid_name {
            return Err(CoreError::invalid_argument(format!(
                "tokenizer name {:?} is not valid",
                self.name
            )));
        }
        if let Some(arg) = self
            .args
            .iter()
            .find(|a| a.is_empty() || a.chars().any(char::is_whitespace))
        {
            return Err(CoreError::invalid_argument(format!(
                "tokenizer argument {:?} is not valid",
                arg
            )));
        }
        Ok(())
    }

    /// Renders the setting for `CREATE VIRTUAL TABLE`, with every argument
    /// double-quoted: `unicode61 "remove_diacritics=0"`.
    #[must_use]
    pub fn ddl_setting(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(self.name.clone());
        parts.extend(
            self.args
                .iter()
                .map(|a| format!("\"{}\"", a.replace('"', "\"\""))),
        );
        parts.join(" ")
    }

    /// Parses a stored `tokenize=` setting value.
    #[must_use]
    pub fn parse(setting: &str) -> Option<Self> {
        let mut parts = setting.split_whitespace();
        let name = parts.next()?;
        Some(Self {
            name: name.to_string(),
            args: parts.map(str::to_string).collect(),
        })
    }
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self::simple()
    }
}

/// Settings persisted as JSON alongside each catalog row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct IndexSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokenize: Option<String>,
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SortDirection {
    /// Smallest first.
    #[default]
    Ascending,
    /// Largest first.
    Descending,
}

impl SortDirection {
    /// Returns the SQL keyword for this direction.
    #[must_use]
    pub const fn sql(self) -> &'static str {
        match self {
            SortDirection::Ascending => "ASC",
            SortDirection::Descending => "DESC",
        }
    }
}

/// A field with a sort direction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SortField {
    /// Field path.
    pub field: String,
    /// Direction.
    pub direction: SortDirection,
}

impl SortField {
    /// Creates an ascending sort field.
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Ascending,
        }
    }

    /// Creates a descending sort field.
    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Descending,
        }
    }
}

impl FromStr for SortField {
    type Err = CoreError;

    /// Parses `field`, `field:asc` or `field:desc`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (field, direction) = match s.rsplit_once(':') {
            Some((field, "asc")) => (field, SortDirection::Ascending),
            Some((field, "desc")) => (field, SortDirection::Descending),
            _ => (s, SortDirection::Ascending),
        };
        if field.is_empty() {
            return Err(CoreError::invalid_argument("sort field is empty"));
        }
        Ok(Self {
            field: field.to_string(),
            direction,
        })
    }
}

/// Returns whether a field name may be indexed.
///
/// Every dot-delimited segment may contain `$` anywhere but as its first
/// character: `name.first` and `na$me` are valid, `name.$first` is not.
#[must_use]
pub fn is_valid_field_name(field: &str) -> bool {
    !field.is_empty()
        && field
            .split('.')
            .all(|segment| !segment.is_empty() && !segment.starts_with('$'))
}

/// A request to create an index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexRequest {
    /// Fields to index, in column order.
    pub fields: Vec<SortField>,
    /// Index name; generated when absent.
    pub name: Option<String>,
    /// Index type.
    pub index_type: IndexType,
    /// Tokenizer for text indexes.
    pub tokenizer: Option<Tokenizer>,
}

impl IndexRequest {
    /// Creates a JSON index request over ascending fields.
    pub fn json<S: AsRef<str>>(fields: &[S]) -> Self {
        Self {
            fields: fields.iter().map(|f| SortField::asc(f.as_ref())).collect(),
            name: None,
            index_type: IndexType::Json,
            tokenizer: None,
        }
    }

    /// Creates a text index request over ascending fields.
    pub fn text<S: AsRef<str>>(fields: &[S]) -> Self {
        Self {
            index_type: IndexType::Text,
            ..Self::json(fields)
        }
    }

    /// Sets the index name.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the tokenizer.
    #[must_use]
    pub fn tokenizer(mut self, tokenizer: Tokenizer) -> Self {
        self.tokenizer = Some(tokenizer);
        self
    }

    /// Checks the request's preconditions.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` for an empty field list, duplicate or invalid
    ///   field names, or an empty name
    /// - `InvalidArgument` for a tokenizer [`Tokenizer::validate`] rejects
    /// - `UnsupportedSort` for a descending field
    pub fn validate(&self) -> CoreResult<()> {
        if self.fields.is_empty() {
            return Err(CoreError::invalid_argument("index fields must not be empty"));
        }
        if matches!(self.name.as_deref(), Some("")) {
            return Err(CoreError::invalid_argument("index name must not be empty"));
        }
        if let Some(tokenizer) = &self.tokenizer {
            tokenizer.validate()?;
        }

        let mut seen = BTreeSet::new();
        for sort in &self.fields {
            if sort.direction == SortDirection::Descending {
                return Err(CoreError::UnsupportedSort {
                    field: sort.field.clone(),
                });
            }
            if !is_valid_field_name(&sort.field) {
                return Err(CoreError::invalid_argument(format!(
                    "field {} is not valid",
                    sort.field
                )));
            }
            if !seen.insert(sort.field.as_str()) {
                return Err(CoreError::invalid_argument(format!(
                    "cannot create index with duplicated field name {}",
                    sort.field
                )));
            }
        }
        Ok(())
    }

    /// Returns the user fields, without `_id` and `_rev`, in request order.
    #[must_use]
    pub fn user_fields(&self) -> Vec<String> {
        self.fields
            .iter()
            .map(|f| f.field.clone())
            .filter(|f| !META_FIELDS.contains(&f.as_str()))
            .collect()
    }

    /// Returns the tokenizer the index will be created with.
    #[must_use]
    pub fn effective_tokenizer(&self) -> Option<Tokenizer> {
        match self.index_type {
            IndexType::Json => None,
            IndexType::Text => Some(self.tokenizer.clone().unwrap_or_default()),
        }
    }
}

/// A registered index as recorded in the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDefinition {
    /// Unique index name.
    pub name: String,
    /// Index type.
    pub index_type: IndexType,
    /// User fields in column order; `_id` and `_rev` are implicit.
    pub fields: Vec<String>,
    /// Tokenizer of a text index; absent for JSON indexes and for text
    /// indexes recorded before settings were stored.
    pub tokenizer: Option<Tokenizer>,
    /// Highest store sequence reflected in the index table.
    pub last_sequence: u64,
}

impl IndexDefinition {
    /// Returns the physical table name of this index.
    #[must_use]
    pub fn table_name(&self) -> String {
        table_name_for_index(&self.name)
    }

    /// Returns true if the index table has a column for `field`.
    #[must_use]
    pub fn provides(&self, field: &str) -> bool {
        META_FIELDS.contains(&field) || self.fields.iter().any(|f| f == field)
    }

    /// Returns true if the index table has a column for every field.
    pub fn covers<'a, I>(&self, fields: I) -> bool
    where
        I: IntoIterator<Item = &'a str>,
    {
        fields.into_iter().all(|field| self.provides(field))
    }

    /// Returns the set of user fields.
    #[must_use]
    pub fn field_set(&self) -> BTreeSet<&str> {
        self.fields.iter().map(String::as_str).collect()
    }

    /// Returns true if `request` describes this index's field set, type
    /// and tokenizer, ignoring field order and names.
    #[must_use]
    pub fn same_definition(&self, request: &IndexRequest) -> bool {
        let requested = request.user_fields();
        let requested: BTreeSet<&str> = requested.iter().map(String::as_str).collect();
        self.index_type == request.index_type
            && self.field_set() == requested
            && self.tokenizer == request.effective_tokenizer()
    }
}
