//! Concatenation of two sources with the same columns.

use std::sync::Arc;
use std::time::Duration;

use log::debug;

use common_error::FederaResult;
use federa_core::{ConfigNode, Datasource, QueryPart, QueryResults, Schema, TimeoutBudget};

use crate::support::{SourceMap, lookup, name_of, required};

/// Results of `source1` followed by those of `source2`. Duplicates stay.
#[derive(Debug)]
pub struct UnionDatasource {
    name: String,
    source1: Arc<dyn Datasource>,
    source2: Arc<dyn Datasource>,
}

impl UnionDatasource {
    /// Fails unless both schemas contain the same columns.
    pub fn new(
        name: impl Into<String>,
        source1: Arc<dyn Datasource>,
        source2: Arc<dyn Datasource>,
    ) -> FederaResult<Self> {
        source1
            .schema()
            .ensure_set_eq(source2.schema(), source1.name(), source2.name())?;
        Ok(Self {
            name: name.into(),
            source1,
            source2,
        })
    }

    /// Build from `NAME`, `SOURCE1` and `SOURCE2`.
    pub fn from_conf(desc: &ConfigNode, sources: &SourceMap) -> FederaResult<Self> {
        let name = name_of(desc)?;
        let source1 = lookup(sources, &name, &required(desc, "SOURCE1", &name)?)?;
        let source2 = lookup(sources, &name, &required(desc, "SOURCE2", &name)?)?;
        Self::new(name, source1, source2)
    }
}

impl Datasource for UnionDatasource {
    fn name(&self) -> &str {
        &self.name
    }

    fn schema(&self) -> &Schema {
        self.source1.schema()
    }

    fn find(&self, query: &[QueryPart], timeout: Duration) -> FederaResult<QueryResults> {
        if query.is_empty() {
            return Ok(QueryResults::new());
        }
        let budget = TimeoutBudget::start(timeout);
        let first = self.source1.find(query, budget.remaining()?)?;
        let second = self.source2.find(query, budget.remaining()?)?;
        debug!("{}: {} + {} results", self.name, first.len(), second.len());
        Ok(QueryResults::union(first, second))
    }

    fn get_datasets_by_key(&self, keys: &[String], timeout: Duration) -> FederaResult<QueryResults> {
        if keys.is_empty() {
            return Ok(QueryResults::new());
        }
        let budget = TimeoutBudget::start(timeout);
        let first = self.source1.get_datasets_by_key(keys, budget.remaining()?)?;
        let second = self.source2.get_datasets_by_key(keys, budget.remaining()?)?;
        Ok(QueryResults::union(first, second))
    }

    fn get_contents(&self, _timeout: Duration) -> FederaResult<QueryResults> {
        Ok(QueryResults::new())
    }

    fn children(&self) -> Vec<&Arc<dyn Datasource>> {
        vec![&self.source1, &self.source2]
    }

    fn display(&self) -> String {
        format!("Union({})", self.name)
    }
}
