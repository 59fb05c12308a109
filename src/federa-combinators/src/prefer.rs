//! One source masking another by key.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use log::debug;

use common_error::FederaResult;
use federa_core::{ConfigNode, Datasource, QueryPart, QueryResults, Schema, TimeoutBudget};

use crate::support::{SourceMap, lookup, name_of, required};

/// Records of `preferred` hide records of `other` with the same key.
///
/// A key is hidden even when the preferred record would not satisfy the
/// query: the keys `other` returns are looked up in `preferred` as well.
#[derive(Debug)]
pub struct PreferDatasource {
    name: String,
    preferred: Arc<dyn Datasource>,
    other: Arc<dyn Datasource>,
}

impl PreferDatasource {
    /// Fails unless both schemas contain the same columns.
    pub fn new(
        name: impl Into<String>,
        preferred: Arc<dyn Datasource>,
        other: Arc<dyn Datasource>,
    ) -> FederaResult<Self> {
        preferred
            .schema()
            .ensure_set_eq(other.schema(), preferred.name(), other.name())?;
        Ok(Self {
            name: name.into(),
            preferred,
            other,
        })
    }

    /// Build from `NAME`, `SOURCE` (preferred) and `OVER`.
    pub fn from_conf(desc: &ConfigNode, sources: &SourceMap) -> FederaResult<Self> {
        let name = name_of(desc)?;
        let preferred = lookup(sources, &name, &required(desc, "SOURCE", &name)?)?;
        let other = lookup(sources, &name, &required(desc, "OVER", &name)?)?;
        Self::new(name, preferred, other)
    }

    fn mask(
        &self,
        preferred: QueryResults,
        other: QueryResults,
        budget: &TimeoutBudget,
    ) -> FederaResult<QueryResults> {
        let mut other_keys: Vec<String> = Vec::new();
        let mut seen = HashSet::new();
        for ds in &other {
            if seen.insert(ds.key().to_string()) {
                other_keys.push(ds.key().to_string());
            }
        }
        let mut hidden: HashSet<String> = preferred
            .iter()
            .map(|ds| ds.key().to_string())
            .filter(|key| seen.contains(key))
            .collect();
        if !other_keys.is_empty() {
            let masking = self
                .preferred
                .get_datasets_by_key(&other_keys, budget.remaining()?)?;
            hidden.extend(masking.iter().map(|ds| ds.key().to_string()));
        }
        debug!(
            "{}: {} preferred, {} other, {} keys hidden",
            self.name,
            preferred.len(),
            other.len(),
            hidden.len()
        );
        let mut results = preferred;
        results.extend(
            other
                .into_iter()
                .filter(|ds| !hidden.contains(ds.key()))
                .collect(),
        );
        Ok(results)
    }
}

impl Datasource for PreferDatasource {
    fn name(&self) -> &str {
        &self.name
    }

    fn schema(&self) -> &Schema {
        self.preferred.schema()
    }

    fn find(&self, query: &[QueryPart], timeout: Duration) -> FederaResult<QueryResults> {
        if query.is_empty() {
            return Ok(QueryResults::new());
        }
        let budget = TimeoutBudget::start(timeout);
        let other = self.other.find(query, budget.remaining()?)?;
        let preferred = self.preferred.find(query, budget.remaining()?)?;
        self.mask(preferred, other, &budget)
    }

    fn get_datasets_by_key(&self, keys: &[String], timeout: Duration) -> FederaResult<QueryResults> {
        if keys.is_empty() {
            return Ok(QueryResults::new());
        }
        let budget = TimeoutBudget::start(timeout);
        let other = self.other.get_datasets_by_key(keys, budget.remaining()?)?;
        let preferred = self.preferred.get_datasets_by_key(keys, budget.remaining()?)?;
        self.mask(preferred, other, &budget)
    }

    fn get_contents(&self, _timeout: Duration) -> FederaResult<QueryResults> {
        Ok(QueryResults::new())
    }

    fn children(&self) -> Vec<&Arc<dyn Datasource>> {
        vec![&self.preferred, &self.other]
    }

    fn display(&self) -> String {
        format!("Prefer({})", self.name)
    }
}
