//! Query result containers.

use std::collections::HashSet;
use std::sync::Arc;

use crate::dataset::Dataset;
use crate::schema::Schema;

/// Ordered list of records returned by a query.
#[derive(Debug, Clone, Default)]
pub struct QueryResults {
    datasets: Vec<Arc<dyn Dataset>>,
}

impl QueryResults {
    /// Create an empty result.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty result with room for `capacity` records.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            datasets: Vec::with_capacity(capacity),
        }
    }

    /// Concatenate two results. Duplicates are kept.
    pub fn union(mut first: QueryResults, second: QueryResults) -> Self {
        first.datasets.extend(second.datasets);
        first
    }

    /// Append a record.
    pub fn push(&mut self, ds: Arc<dyn Dataset>) {
        self.datasets.push(ds);
    }

    /// Append all records of another result.
    pub fn extend(&mut self, other: QueryResults) {
        self.datasets.extend(other.datasets);
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.datasets.len()
    }

    /// Whether there are no records.
    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }

    /// Iterate over the records.
    pub fn iter(&self) -> std::slice::Iter<'_, Arc<dyn Dataset>> {
        self.datasets.iter()
    }

    /// Record at `idx`.
    pub fn get(&self, idx: usize) -> Option<&Arc<dyn Dataset>> {
        self.datasets.get(idx)
    }

    /// Keys of all records, in order.
    pub fn keys(&self) -> Vec<String> {
        self.datasets.iter().map(|ds| ds.key().to_string()).collect()
    }

    /// Consume into the underlying vector.
    pub fn into_vec(self) -> Vec<Arc<dyn Dataset>> {
        self.datasets
    }
}

impl From<Vec<Arc<dyn Dataset>>> for QueryResults {
    fn from(datasets: Vec<Arc<dyn Dataset>>) -> Self {
        Self { datasets }
    }
}

impl FromIterator<Arc<dyn Dataset>> for QueryResults {
    fn from_iter<I: IntoIterator<Item = Arc<dyn Dataset>>>(iter: I) -> Self {
        Self {
            datasets: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for QueryResults {
    type Item = Arc<dyn Dataset>;
    type IntoIter = std::vec::IntoIter<Arc<dyn Dataset>>;

    fn into_iter(self) -> Self::IntoIter {
        self.datasets.into_iter()
    }
}

impl<'a> IntoIterator for &'a QueryResults {
    type Item = &'a Arc<dyn Dataset>;
    type IntoIter = std::slice::Iter<'a, Arc<dyn Dataset>>;

    fn into_iter(self) -> Self::IntoIter {
        self.datasets.iter()
    }
}

/// Insertion-ordered results that keep only the first record per key.
#[derive(Debug, Default)]
pub struct QueryResultsSet {
    seen: HashSet<String>,
    results: QueryResults,
}

impl QueryResultsSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record. Returns `false` if its key was already present.
    pub fn add(&mut self, ds: Arc<dyn Dataset>) -> bool {
        if !self.seen.insert(ds.key().to_string()) {
            return false;
        }
        self.results.push(ds);
        true
    }

    /// Add every record of a result.
    pub fn add_all(&mut self, results: QueryResults) {
        for ds in results {
            self.add(ds);
        }
    }

    /// Whether a key is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.seen.contains(key)
    }

    /// Number of distinct records.
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Consume into plain results.
    pub fn into_results(self) -> QueryResults {
        self.results
    }
}

/// Results together with the schema their records conform to.
#[derive(Debug, Clone, Default)]
pub struct QueryResultsWithSchema {
    schema: Schema,
    results: QueryResults,
}

impl QueryResultsWithSchema {
    /// Create a new schema-carrying result.
    pub fn new(results: QueryResults, schema: Schema) -> Self {
        Self { schema, results }
    }

    /// The schema.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// The records.
    pub fn results(&self) -> &QueryResults {
        &self.results
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Whether there are no records.
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Split into schema and records.
    pub fn into_parts(self) -> (Schema, QueryResults) {
        (self.schema, self.results)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::dataset::MapDataset;

    fn ds(key: &str) -> Arc<dyn Dataset> {
        let schema = Arc::new(Schema::from_columns(["id"]));
        Arc::new(MapDataset::new(key, HashMap::new(), schema))
    }

    #[test]
    fn test_union_keeps_duplicates() {
        let a: QueryResults = vec![ds("1"), ds("2")].into();
        let b: QueryResults = vec![ds("2")].into();
        let u = QueryResults::union(a, b);
        assert_eq!(u.keys(), vec!["1", "2", "2"]);
    }

    #[test]
    fn test_set_dedups_by_key() {
        let mut set = QueryResultsSet::new();
        assert!(set.add(ds("1")));
        assert!(!set.add(ds("1")));
        set.add_all(vec![ds("2"), ds("1"), ds("3")].into());
        assert_eq!(set.into_results().keys(), vec!["1", "2", "3"]);
    }

    #[test]
    fn test_with_schema() {
        let res = QueryResultsWithSchema::new(vec![ds("x")].into(), Schema::from_columns(["id"]));
        assert_eq!(res.len(), 1);
        assert!(res.schema().contains("id"));
    }
}
