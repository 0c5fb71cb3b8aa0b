//! Schema metadata returned by the get-schema operations.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Collection that lists every schema collection a driver supports.
pub const METADATA_COLLECTIONS: &str = "MetaDataCollections";

/// One row of schema metadata, keyed by column name.
pub type SchemaRow = BTreeMap<String, Value>;

/// A table of schema metadata produced by a driver.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaTable {
    /// Collection name this table describes.
    pub name: String,
    /// Column names, in driver order.
    pub columns: Vec<String>,
    /// Rows of metadata.
    pub rows: Vec<SchemaRow>,
}

impl SchemaTable {
    /// Create an empty table for the given collection.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Add a column.
    pub fn with_column(mut self, column: impl Into<String>) -> Self {
        self.columns.push(column.into());
        self
    }

    /// Append a row.
    pub fn push_row(&mut self, row: SchemaRow) {
        self.rows.push(row);
    }

    /// Get the number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Get all values of one column.
    pub fn column_values(&self, column: &str) -> Vec<&Value> {
        self.rows.iter().filter_map(|row| row.get(column)).collect()
    }
}
