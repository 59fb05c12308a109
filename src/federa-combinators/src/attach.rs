//! Appending the columns of a second source to each record.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use log::debug;

use common_error::{FederaError, FederaResult};
use federa_core::{
    ConfigNode, Dataset, Datasource, QueryPart, QueryResults, Schema, TimeoutBudget,
    dataset_matches,
};

use crate::support::{SourceMap, check_matches, lookup, name_of, pairs, required, same_value};

/// Separates the attached source's name from its column names.
pub const ATTACH_SEPARATOR: &str = "__";

#[derive(Debug)]
struct AttachShape {
    schema: Schema,
    prefix: String,
    /// Prefixed names of the attached columns.
    attached: HashSet<String>,
}

/// Records of `source` with the columns of `attach` appended as
/// `<attach name>__<column>`.
///
/// Each record is joined with the first attached record that agrees on all
/// MATCH columns; without one the attached columns are unset.
#[derive(Debug)]
pub struct AttachDatasource {
    name: String,
    source: Arc<dyn Datasource>,
    attach: Arc<dyn Datasource>,
    matches: Vec<(String, String)>,
    shape: Arc<AttachShape>,
}

impl AttachDatasource {
    pub fn new(
        name: impl Into<String>,
        source: Arc<dyn Datasource>,
        attach: Arc<dyn Datasource>,
        matches: Vec<(String, String)>,
    ) -> FederaResult<Self> {
        let name = name.into();
        check_matches(&name, &matches, source.schema(), attach.schema())?;
        let prefix = format!("{}{ATTACH_SEPARATOR}", attach.name());
        let mut schema = source.schema().clone();
        let mut attached = HashSet::new();
        for column in attach.schema() {
            let prefixed = format!("{prefix}{column}");
            if !schema.add(prefixed.clone()) {
                return Err(FederaError::configuration(format!(
                    "datasource \"{name}\": column \"{prefixed}\" collides with a column of \"{}\"",
                    source.name()
                )));
            }
            attached.insert(prefixed);
        }
        Ok(Self {
            name,
            source,
            attach,
            matches,
            shape: Arc::new(AttachShape {
                schema,
                prefix,
                attached,
            }),
        })
    }

    /// Build from `NAME`, `SOURCE`, `ATTACH` and `MATCH(c1 c2)` pairs.
    pub fn from_conf(desc: &ConfigNode, sources: &SourceMap) -> FederaResult<Self> {
        let name = name_of(desc)?;
        let source = lookup(sources, &name, &required(desc, "SOURCE", &name)?)?;
        let attach = lookup(sources, &name, &required(desc, "ATTACH", &name)?)?;
        let matches = pairs(desc, "MATCH", &name)?;
        Self::new(name, source, attach, matches)
    }

    /// The prefix of attached columns.
    pub fn prefix(&self) -> &str {
        &self.shape.prefix
    }

    fn concat(&self, ds1: Arc<dyn Dataset>, ds2: Option<Arc<dyn Dataset>>) -> Arc<dyn Dataset> {
        Arc::new(AttachedDataset {
            ds1,
            ds2,
            shape: Arc::clone(&self.shape),
        })
    }

    /// Join each source record with its first attached partner that keeps
    /// the record inside `filter`.
    fn attach_columns(
        &self,
        results: QueryResults,
        filter: &[QueryPart],
        budget: &TimeoutBudget,
    ) -> FederaResult<QueryResults> {
        let mut joined = QueryResults::with_capacity(results.len());
        for ds in results {
            let candidates = self.partners(ds.as_ref(), budget)?;
            if candidates.is_empty() {
                let record = self.concat(ds, None);
                if dataset_matches(record.as_ref(), filter)? {
                    joined.push(record);
                }
                continue;
            }
            for candidate in candidates {
                let record = self.concat(Arc::clone(&ds), Some(candidate));
                if dataset_matches(record.as_ref(), filter)? {
                    joined.push(record);
                    break;
                }
            }
        }
        Ok(joined)
    }

    /// Join each attached record with every source record it belongs to.
    ///
    /// A source record shared by several attached records keeps the first
    /// of them, as the forward join does.
    fn attach_columns_reversed(
        &self,
        results: QueryResults,
        budget: &TimeoutBudget,
    ) -> FederaResult<QueryResults> {
        let mut joined = QueryResults::with_capacity(results.len());
        let mut seen = HashSet::new();
        for ds2 in results {
            let mut query = Vec::with_capacity(self.matches.len());
            let mut values = Vec::with_capacity(self.matches.len());
            for (column1, column2) in &self.matches {
                match ds2.get(column2)? {
                    Some(value) => {
                        query.push(QueryPart::new(column1, value.clone()));
                        values.push((column1, value));
                    }
                    None => break,
                }
            }
            if values.len() < self.matches.len() {
                continue;
            }
            for ds1 in self.source.find(&query, budget.remaining()?)? {
                if agrees(ds1.as_ref(), &values)? && seen.insert(ds1.key().to_string()) {
                    joined.push(self.concat(ds1, Some(Arc::clone(&ds2))));
                }
            }
        }
        Ok(joined)
    }

    /// Attached records agreeing with `ds` on all MATCH columns.
    fn partners(&self, ds: &dyn Dataset, budget: &TimeoutBudget) -> FederaResult<Vec<Arc<dyn Dataset>>> {
        let mut query = Vec::with_capacity(self.matches.len());
        let mut values = Vec::with_capacity(self.matches.len());
        for (column1, column2) in &self.matches {
            let Some(value) = ds.get(column1)? else {
                return Ok(Vec::new());
            };
            query.push(QueryPart::new(column2, value.clone()));
            values.push((column2, value));
        }
        let mut found = Vec::new();
        for candidate in self.attach.find(&query, budget.remaining()?)? {
            if agrees(candidate.as_ref(), &values)? {
                found.push(candidate);
            }
        }
        Ok(found)
    }
}

fn agrees(ds: &dyn Dataset, values: &[(&String, String)]) -> FederaResult<bool> {
    for (column, value) in values {
        if !same_value(ds.get(column)?.as_deref(), value) {
            return Ok(false);
        }
    }
    Ok(true)
}

impl Datasource for AttachDatasource {
    fn name(&self) -> &str {
        &self.name
    }

    fn schema(&self) -> &Schema {
        &self.shape.schema
    }

    fn find(&self, query: &[QueryPart], timeout: Duration) -> FederaResult<QueryResults> {
        if query.is_empty() {
            return Ok(QueryResults::new());
        }
        let mut query1 = Vec::new();
        let mut query2 = Vec::new();
        let mut query2_prefixed = Vec::new();
        for part in query {
            if self.shape.attached.contains(part.column()) {
                let column = &part.column()[self.shape.prefix.len()..];
                query2.push(part.with_column(column));
                query2_prefixed.push(part.clone());
            } else if self.source.schema().contains(part.column()) {
                query1.push(part.clone());
            } else {
                return Ok(QueryResults::new());
            }
        }

        let budget = TimeoutBudget::start(timeout);
        if !query1.is_empty() {
            let results = self.source.find(&query1, budget.remaining()?)?;
            debug!("{}: attaching to {} records", self.name, results.len());
            self.attach_columns(results, &query2_prefixed, &budget)
        } else {
            let results = self.attach.find(&query2, budget.remaining()?)?;
            debug!("{}: attaching {} records in reverse", self.name, results.len());
            self.attach_columns_reversed(results, &budget)
        }
    }

    fn get_datasets_by_key(&self, keys: &[String], timeout: Duration) -> FederaResult<QueryResults> {
        if keys.is_empty() {
            return Ok(QueryResults::new());
        }
        let budget = TimeoutBudget::start(timeout);
        let results = self.source.get_datasets_by_key(keys, budget.remaining()?)?;
        self.attach_columns(results, &[], &budget)
    }

    fn get_contents(&self, _timeout: Duration) -> FederaResult<QueryResults> {
        Ok(QueryResults::new())
    }

    fn children(&self) -> Vec<&Arc<dyn Datasource>> {
        vec![&self.source, &self.attach]
    }

    fn display(&self) -> String {
        format!("Attach({}, prefix={})", self.name, self.shape.prefix)
    }
}

#[derive(Debug)]
struct AttachedDataset {
    ds1: Arc<dyn Dataset>,
    ds2: Option<Arc<dyn Dataset>>,
    shape: Arc<AttachShape>,
}

impl Dataset for AttachedDataset {
    fn get(&self, column: &str) -> FederaResult<Option<String>> {
        if self.shape.attached.contains(column) {
            return match &self.ds2 {
                Some(ds2) => ds2.get(&column[self.shape.prefix.len()..]),
                None => Ok(None),
            };
        }
        if !self.shape.schema.contains(column) {
            return Err(FederaError::column_not_found(format!(
                "column \"{column}\" is not in the schema"
            )));
        }
        self.ds1.get(column)
    }

    fn key(&self) -> &str {
        self.ds1.key()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use federa_sources::{MemoryDatasource, row};

    const T: Duration = Duration::from_secs(1);

    fn table(name: &str, columns: &[&str], key: &str, rows: &[&[(&str, &str)]]) -> Arc<dyn Datasource> {
        let source = MemoryDatasource::new(name, Schema::from_columns(columns.iter().copied()), [key])
            .unwrap()
            .with_rows(rows.iter().map(|r| row(r.iter().copied())))
            .unwrap();
        Arc::new(source)
    }

    fn attach() -> AttachDatasource {
        let people = table(
            "people",
            &["id", "name", "room"],
            "id",
            &[
                &[("id", "1"), ("name", "Anna"), ("room", "R1")],
                &[("id", "2"), ("name", "Bernd"), ("room", "R9")],
                &[("id", "3"), ("name", "Carl")],
            ],
        );
        let rooms = table(
            "rooms",
            &["nr", "floor"],
            "nr",
            &[&[("nr", "r1"), ("floor", "1")], &[("nr", "R2"), ("floor", "2")]],
        );
        AttachDatasource::new("joined", people, rooms, vec![("room".into(), "nr".into())]).unwrap()
    }

    #[test]
    fn test_schema_is_prefixed() {
        let ds = attach();
        assert_eq!(ds.schema().columns(), ["id", "name", "room", "rooms__nr", "rooms__floor"]);
        assert_eq!(ds.prefix(), "rooms__");
    }

    #[test]
    fn test_forward_join_case_insensitive() {
        let ds = attach();
        let found = ds.find(&[QueryPart::new("name", "*n*")], T).unwrap();
        assert_eq!(found.keys(), vec!["1", "2"]);
        let anna = found.get(0).unwrap();
        assert_eq!(anna.get("rooms__floor").unwrap().as_deref(), Some("1"));
        assert_eq!(found.get(1).unwrap().get("rooms__floor").unwrap(), None);
        assert!(anna.get("floor").is_err());
    }

    #[test]
    fn test_filter_on_attached_column() {
        let ds = attach();
        let query = [QueryPart::new("id", "*"), QueryPart::new("rooms__floor", "1")];
        assert_eq!(ds.find(&query, T).unwrap().keys(), vec!["1"]);
    }

    #[test]
    fn test_reverse_join_when_only_attached_columns() {
        let ds = attach();
        let found = ds.find(&[QueryPart::new("rooms__floor", "*")], T).unwrap();
        assert_eq!(found.keys(), vec!["1"]);
        assert!(ds.find(&[QueryPart::new("nope", "x")], T).unwrap().is_empty());
    }

    #[test]
    fn test_collision_is_rejected() {
        let left = table("l", &["id", "r__id"], "id", &[]);
        let right = table("r", &["id"], "id", &[]);
        let err = AttachDatasource::new("j", left, right, vec![("id".into(), "id".into())]);
        assert!(matches!(err, Err(FederaError::ConfigurationError(_))));
    }

    #[test]
    fn test_get_by_key_attaches() {
        let ds = attach();
        let found = ds.get_datasets_by_key(&["1".to_string()], T).unwrap();
        assert_eq!(found.get(0).unwrap().get("rooms__nr").unwrap().as_deref(), Some("r1"));
    }

    #[test]
    fn test_reverse_join_keeps_first_partner() {
        let base = table("base", &["id", "m"], "id", &[&[("id", "1"), ("m", "p")]]);
        let local = table(
            "local",
            &["k", "m", "c"],
            "k",
            &[
                &[("k", "a"), ("m", "p"), ("c", "x")],
                &[("k", "b"), ("m", "p"), ("c", "x")],
            ],
        );
        let ds = AttachDatasource::new("j", base, local, vec![("m".into(), "m".into())]).unwrap();
        let found = ds.find(&[QueryPart::new("local__c", "x")], T).unwrap();
        assert_eq!(found.keys(), vec!["1"]);
        assert_eq!(found.get(0).unwrap().get("local__k").unwrap().as_deref(), Some("a"));
        let forward = ds.find(&[QueryPart::new("id", "1"), QueryPart::new("local__c", "x")], T).unwrap();
        assert_eq!(forward.get(0).unwrap().get("local__k").unwrap().as_deref(), Some("a"));
    }
}
