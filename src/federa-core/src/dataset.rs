//! Records returned by datasources.

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

use common_error::{FederaError, FederaResult};

use crate::schema::Schema;

/// A single record: a lookup from column name to value plus an opaque key.
///
/// Reading a column outside the owning schema is a `ColumnNotFound` error;
/// a column that exists but is unset reads as `None`.
pub trait Dataset: Send + Sync + Debug {
    /// Get the value of a column.
    fn get(&self, column: &str) -> FederaResult<Option<String>>;

    /// The record's key, unique within its datasource.
    fn key(&self) -> &str;
}

/// Read every column of `schema` from a dataset, skipping unset values.
pub fn dataset_values(ds: &dyn Dataset, schema: &Schema) -> FederaResult<HashMap<String, String>> {
    let mut values = HashMap::with_capacity(schema.len());
    for column in schema.iter() {
        if let Some(value) = ds.get(column)? {
            values.insert(column.to_string(), value);
        }
    }
    Ok(values)
}

/// A record backed by a value map and a shared schema.
#[derive(Debug, Clone)]
pub struct MapDataset {
    key: String,
    values: HashMap<String, String>,
    schema: Arc<Schema>,
}

impl MapDataset {
    /// Create a new record.
    pub fn new(key: impl Into<String>, values: HashMap<String, String>, schema: Arc<Schema>) -> Self {
        Self {
            key: key.into(),
            values,
            schema,
        }
    }

    /// The schema this record conforms to.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// The raw value map.
    pub fn values(&self) -> &HashMap<String, String> {
        &self.values
    }
}

impl Dataset for MapDataset {
    fn get(&self, column: &str) -> FederaResult<Option<String>> {
        if !self.schema.contains(column) {
            return Err(FederaError::column_not_found(format!(
                "column \"{column}\" is not in the schema"
            )));
        }
        Ok(self.values.get(column).cloned())
    }

    fn key(&self) -> &str {
        &self.key
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> MapDataset {
        let schema = Arc::new(Schema::from_columns(["id", "name", "room"]));
        let values = HashMap::from([
            ("id".to_string(), "1".to_string()),
            ("name".to_string(), "A".to_string()),
        ]);
        MapDataset::new("k1", values, schema)
    }

    #[test]
    fn test_get_distinguishes_unset_from_unknown() {
        let ds = record();
        assert_eq!(ds.get("name").unwrap().as_deref(), Some("A"));
        assert_eq!(ds.get("room").unwrap(), None);
        assert!(matches!(ds.get("phone"), Err(FederaError::ColumnNotFound(_))));
        assert_eq!(ds.key(), "k1");
    }

    #[test]
    fn test_dataset_values_skips_unset() {
        let ds = record();
        let values = dataset_values(&ds, ds.schema()).unwrap();
        assert_eq!(values.len(), 2);
        assert!(!values.contains_key("room"));
    }
}
