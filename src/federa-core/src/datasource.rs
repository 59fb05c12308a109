//! The datasource contract.

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use common_error::FederaResult;

use crate::query::QueryPart;
use crate::results::QueryResults;
use crate::schema::Schema;

/// A queryable source of records.
///
/// Every query accepts a timeout budget and must either return within it or
/// fail with `Timeout`. An empty predicate list or key set yields an empty
/// result without touching the backend. Construction never blocks on a
/// backend except to discover a schema that is not configured.
pub trait Datasource: Send + Sync + Debug {
    /// The datasource name.
    fn name(&self) -> &str;

    /// The columns every returned record exposes.
    fn schema(&self) -> &Schema;

    /// Records matching all predicates.
    fn find(&self, query: &[QueryPart], timeout: Duration) -> FederaResult<QueryResults>;

    /// Records with the given keys. Unknown keys are skipped.
    fn get_datasets_by_key(&self, keys: &[String], timeout: Duration)
    -> FederaResult<QueryResults>;

    /// All records, where enumerating them is supported. Otherwise empty.
    fn get_contents(&self, timeout: Duration) -> FederaResult<QueryResults>;

    /// Wrapped datasources.
    fn children(&self) -> Vec<&Arc<dyn Datasource>> {
        Vec::new()
    }

    /// One-line description for [`Datasource::explain`].
    fn display(&self) -> String {
        self.name().to_string()
    }

    /// Indented tree of this datasource and everything it wraps.
    fn explain(&self, indent: usize) -> String {
        let prefix = "  ".repeat(indent);
        let mut output = format!("{}{}\n", prefix, self.display());
        for child in self.children() {
            output.push_str(&child.explain(indent + 1));
        }
        output
    }
}

/// A datasource with a fixed schema and no records.
#[derive(Debug, Clone)]
pub struct EmptyDatasource {
    name: String,
    schema: Schema,
}

impl EmptyDatasource {
    /// Create a new empty datasource.
    pub fn new(name: impl Into<String>, schema: Schema) -> Self {
        Self {
            name: name.into(),
            schema,
        }
    }
}

impl Datasource for EmptyDatasource {
    fn name(&self) -> &str {
        &self.name
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn find(&self, _query: &[QueryPart], _timeout: Duration) -> FederaResult<QueryResults> {
        Ok(QueryResults::new())
    }

    fn get_datasets_by_key(
        &self,
        _keys: &[String],
        _timeout: Duration,
    ) -> FederaResult<QueryResults> {
        Ok(QueryResults::new())
    }

    fn get_contents(&self, _timeout: Duration) -> FederaResult<QueryResults> {
        Ok(QueryResults::new())
    }

    fn display(&self) -> String {
        format!("Empty({})", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_datasource() {
        let ds = EmptyDatasource::new("Fallback", Schema::from_columns(["id"]));
        let timeout = Duration::from_secs(1);
        assert!(ds.find(&[QueryPart::new("id", "1")], timeout).unwrap().is_empty());
        assert!(ds.get_datasets_by_key(&["1".into()], timeout).unwrap().is_empty());
        assert!(ds.get_contents(timeout).unwrap().is_empty());
        assert_eq!(ds.explain(0), "Empty(Fallback)\n");
    }
}
