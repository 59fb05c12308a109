//! In-memory table datasource.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use log::debug;

use common_error::{FederaError, FederaResult};
use federa_core::{
    Dataset, Datasource, KeySpec, MapDataset, QueryPart, QueryResults, Schema, dataset_matches,
};

/// A datasource holding all records in memory.
///
/// Records are returned in insertion order. Queries never block, so the
/// timeout budget is not consulted.
#[derive(Debug, Clone)]
pub struct MemoryDatasource {
    name: String,
    schema: Arc<Schema>,
    key_spec: KeySpec,
    records: Vec<Arc<MapDataset>>,
    by_key: HashMap<String, Vec<usize>>,
}

impl MemoryDatasource {
    /// Create an empty table.
    pub fn new<I, S>(name: impl Into<String>, schema: Schema, key_columns: I) -> FederaResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let name = name.into();
        let key_spec = KeySpec::new(key_columns);
        if key_spec.is_empty() {
            return Err(FederaError::configuration(format!(
                "datasource \"{name}\": no key columns"
            )));
        }
        for column in key_spec.columns() {
            if !schema.contains(column) {
                return Err(FederaError::configuration(format!(
                    "datasource \"{name}\": key column \"{column}\" is not in the schema"
                )));
            }
        }
        Ok(Self {
            name,
            schema: Arc::new(schema),
            key_spec,
            records: Vec::new(),
            by_key: HashMap::new(),
        })
    }

    /// Add rows, builder style.
    pub fn with_rows<I>(mut self, rows: I) -> FederaResult<Self>
    where
        I: IntoIterator<Item = HashMap<String, String>>,
    {
        for row in rows {
            self.insert(row)?;
        }
        Ok(self)
    }

    /// Add a row. Every column must be part of the schema.
    pub fn insert(&mut self, values: HashMap<String, String>) -> FederaResult<()> {
        if let Some(column) = values.keys().find(|c| !self.schema.contains(c)) {
            return Err(FederaError::column_not_found(format!(
                "datasource \"{}\": column \"{column}\" is not in the schema",
                self.name
            )));
        }
        let key = self.key_spec.key_from_map(&values);
        self.by_key.entry(key.clone()).or_default().push(self.records.len());
        self.records
            .push(Arc::new(MapDataset::new(key, values, Arc::clone(&self.schema))));
        Ok(())
    }

    /// The key columns in encoding order.
    pub fn key_spec(&self) -> &KeySpec {
        &self.key_spec
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn as_results<'a>(records: impl Iterator<Item = &'a Arc<MapDataset>>) -> QueryResults {
        records
            .map(|r| Arc::clone(r) as Arc<dyn Dataset>)
            .collect()
    }
}

impl Datasource for MemoryDatasource {
    fn name(&self) -> &str {
        &self.name
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn find(&self, query: &[QueryPart], _timeout: Duration) -> FederaResult<QueryResults> {
        if query.is_empty() {
            return Ok(QueryResults::new());
        }
        if query.iter().any(|p| !self.schema.contains(p.column())) {
            return Ok(QueryResults::new());
        }
        let mut hits = Vec::new();
        for record in &self.records {
            if dataset_matches(record.as_ref(), query)? {
                hits.push(record);
            }
        }
        debug!("{}: find({} parts) -> {} hits", self.name, query.len(), hits.len());
        Ok(Self::as_results(hits.into_iter()))
    }

    fn get_datasets_by_key(
        &self,
        keys: &[String],
        _timeout: Duration,
    ) -> FederaResult<QueryResults> {
        let mut results = QueryResults::with_capacity(keys.len());
        for key in keys {
            if let Some(indices) = self.by_key.get(key) {
                for &idx in indices {
                    results.push(Arc::clone(&self.records[idx]) as Arc<dyn Dataset>);
                }
            }
        }
        Ok(results)
    }

    fn get_contents(&self, _timeout: Duration) -> FederaResult<QueryResults> {
        Ok(Self::as_results(self.records.iter()))
    }

    fn display(&self) -> String {
        format!("Memory({}, {} rows)", self.name, self.records.len())
    }
}

/// Build a row from `(column, value)` pairs.
pub fn row<'a, I>(pairs: I) -> HashMap<String, String>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    pairs
        .into_iter()
        .map(|(c, v)| (c.to_string(), v.to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const T: Duration = Duration::from_secs(1);

    fn people() -> MemoryDatasource {
        MemoryDatasource::new("people", Schema::from_columns(["id", "name"]), ["id"])
            .unwrap()
            .with_rows([row([("id", "1"), ("name", "A")]), row([("id", "2"), ("name", "B")])])
            .unwrap()
    }

    #[test]
    fn test_find_and_get_by_key() {
        let ds = people();
        let found = ds.find(&[QueryPart::new("name", "A")], T).unwrap();
        assert_eq!(found.keys(), vec!["1"]);

        let by_key = ds.get_datasets_by_key(&["2".to_string()], T).unwrap();
        assert_eq!(by_key.len(), 1);
        assert_eq!(by_key.get(0).unwrap().get("name").unwrap().as_deref(), Some("B"));
    }

    #[test]
    fn test_empty_inputs_return_empty() {
        let ds = people();
        assert!(ds.find(&[], T).unwrap().is_empty());
        assert!(ds.get_datasets_by_key(&[], T).unwrap().is_empty());
    }

    #[test]
    fn test_unknown_column_in_query_yields_nothing() {
        let ds = people();
        assert!(ds.find(&[QueryPart::new("room", "1")], T).unwrap().is_empty());
    }

    #[test]
    fn test_rejects_bad_rows_and_keys() {
        assert!(MemoryDatasource::new("x", Schema::from_columns(["id"]), ["nope"]).is_err());
        assert!(MemoryDatasource::new("x", Schema::from_columns(["id"]), Vec::<String>::new()).is_err());
        let mut ds = people();
        assert!(ds.insert(row([("room", "1")])).is_err());
    }

    #[test]
    fn test_contents_in_insertion_order() {
        let ds = people();
        assert_eq!(ds.get_contents(T).unwrap().keys(), vec!["1", "2"]);
        assert_eq!(ds.display(), "Memory(people, 2 rows)");
    }
}
