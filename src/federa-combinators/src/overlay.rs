//! Overlaying one source's values onto another's.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use log::debug;

use common_error::{FederaError, FederaResult};
use federa_core::{
    ConfigNode, Dataset, Datasource, QueryPart, QueryResults, Schema, TimeoutBudget,
    dataset_matches, most_restrictive,
};

use crate::support::{SourceMap, check_matches, lookup, name_of, pairs, required, same_value};

/// Which side wins when both sides carry a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlayMode {
    /// The overlay source takes priority (`so`), otherwise the base source (`os`).
    pub overlay_wins: bool,
    /// Empty strings on the winning side count as unset.
    pub empty_is_null: bool,
}

impl OverlayMode {
    /// Parse a `MODE` value: `so` or `os` in any case. A lowercase second
    /// letter makes empty values on the winning side fall through.
    pub fn parse(mode: &str) -> FederaResult<Self> {
        let overlay_wins = match mode.to_lowercase().as_str() {
            "so" => true,
            "os" => false,
            _ => {
                return Err(FederaError::configuration(format!(
                    "illegal MODE \"{mode}\", expected \"so\" or \"os\""
                )));
            }
        };
        let empty_is_null = mode.chars().nth(1).is_some_and(char::is_lowercase);
        Ok(Self {
            overlay_wins,
            empty_is_null,
        })
    }
}

impl fmt::Display for OverlayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (first, second) = if self.overlay_wins { ('S', 'O') } else { ('O', 'S') };
        if self.empty_is_null {
            write!(f, "{first}{}", second.to_ascii_lowercase())
        } else {
            write!(f, "{first}{second}")
        }
    }
}

#[derive(Debug)]
struct OverlayShape {
    schema: Schema,
    schema1: Schema,
    schema2: Schema,
    mode: OverlayMode,
}

/// Records of `source` with values taken from a matching `overlay` record.
///
/// The schema is the union of both schemas. Only records of `source` are
/// ever returned; the first overlay record agreeing on all MATCH columns
/// supplies the overlaid values.
#[derive(Debug)]
pub struct OverlayDatasource {
    name: String,
    source: Arc<dyn Datasource>,
    overlay: Arc<dyn Datasource>,
    matches: Vec<(String, String)>,
    /// MATCH columns with the same name on both sides.
    common: HashSet<String>,
    shape: Arc<OverlayShape>,
}

impl OverlayDatasource {
    pub fn new(
        name: impl Into<String>,
        source: Arc<dyn Datasource>,
        overlay: Arc<dyn Datasource>,
        matches: Vec<(String, String)>,
        mode: OverlayMode,
    ) -> FederaResult<Self> {
        let name = name.into();
        check_matches(&name, &matches, source.schema(), overlay.schema())?;
        let common = matches
            .iter()
            .filter(|(c1, c2)| c1 == c2)
            .map(|(c1, _)| c1.clone())
            .collect();
        let shape = OverlayShape {
            schema: source.schema().union(overlay.schema()),
            schema1: source.schema().clone(),
            schema2: overlay.schema().clone(),
            mode,
        };
        Ok(Self {
            name,
            source,
            overlay,
            matches,
            common,
            shape: Arc::new(shape),
        })
    }

    /// Build from `NAME`, `SOURCE`, `OVERLAY`, `MODE` and `MATCH(c1 c2)` pairs.
    pub fn from_conf(desc: &ConfigNode, sources: &SourceMap) -> FederaResult<Self> {
        let name = name_of(desc)?;
        let source = lookup(sources, &name, &required(desc, "SOURCE", &name)?)?;
        let overlay = lookup(sources, &name, &required(desc, "OVERLAY", &name)?)?;
        let mode = OverlayMode::parse(&required(desc, "MODE", &name)?)?;
        let matches = pairs(desc, "MATCH", &name)?;
        Self::new(name, source, overlay, matches, mode)
    }

    pub fn mode(&self) -> OverlayMode {
        self.shape.mode
    }

    fn concat(&self, ds1: Arc<dyn Dataset>, ds2: Option<Arc<dyn Dataset>>) -> Arc<dyn Dataset> {
        Arc::new(OverlaidDataset {
            ds1,
            ds2,
            shape: Arc::clone(&self.shape),
        })
    }

    /// Overlay each base record with its first partner that keeps it inside `filter`.
    fn overlay_columns(
        &self,
        results: QueryResults,
        filter: &[QueryPart],
        budget: &TimeoutBudget,
    ) -> FederaResult<QueryResults> {
        let mut joined = QueryResults::with_capacity(results.len());
        for ds in results {
            let partners = self.partners(ds.as_ref(), budget)?;
            if partners.is_empty() {
                let record = self.concat(ds, None);
                if dataset_matches(record.as_ref(), filter)? {
                    joined.push(record);
                }
                continue;
            }
            for partner in partners {
                let record = self.concat(Arc::clone(&ds), Some(partner));
                if dataset_matches(record.as_ref(), filter)? {
                    joined.push(record);
                    break;
                }
            }
        }
        Ok(joined)
    }

    /// Combine each overlay record with every base record it belongs to.
    ///
    /// A base record shared by several overlay records keeps the first of
    /// them that passes `filter`, as the forward join does.
    fn overlay_columns_reversed(
        &self,
        results: QueryResults,
        filter: &[QueryPart],
        budget: &TimeoutBudget,
    ) -> FederaResult<QueryResults> {
        let mut joined = QueryResults::with_capacity(results.len());
        let mut seen = HashSet::new();
        for ds2 in results {
            let Some(values) = match_values(ds2.as_ref(), self.matches.iter().map(|(c1, c2)| (c2, c1)))?
            else {
                continue;
            };
            let query: Vec<QueryPart> =
                values.iter().map(|(c, v)| QueryPart::new(*c, v.clone())).collect();
            for ds1 in self.source.find(&query, budget.remaining()?)? {
                if seen.contains(ds1.key()) || !agrees(ds1.as_ref(), &values)? {
                    continue;
                }
                let record = self.concat(ds1, Some(Arc::clone(&ds2)));
                if dataset_matches(record.as_ref(), filter)? {
                    seen.insert(record.key().to_string());
                    joined.push(record);
                }
            }
        }
        Ok(joined)
    }

    fn partners(&self, ds: &dyn Dataset, budget: &TimeoutBudget) -> FederaResult<Vec<Arc<dyn Dataset>>> {
        let Some(values) = match_values(ds, self.matches.iter().map(|(c1, c2)| (c1, c2)))? else {
            return Ok(Vec::new());
        };
        let query: Vec<QueryPart> = values.iter().map(|(c, v)| QueryPart::new(*c, v.clone())).collect();
        let mut found = Vec::new();
        for candidate in self.overlay.find(&query, budget.remaining()?)? {
            if agrees(candidate.as_ref(), &values)? {
                found.push(candidate);
            }
        }
        Ok(found)
    }
}

/// Read the join values of `ds`, paired with the partner column they must
/// equal. `None` if any of them is unset.
fn match_values<'a>(
    ds: &dyn Dataset,
    columns: impl Iterator<Item = (&'a String, &'a String)>,
) -> FederaResult<Option<Vec<(&'a str, String)>>> {
    let mut values = Vec::new();
    for (own, other) in columns {
        match ds.get(own)? {
            Some(value) => values.push((other.as_str(), value)),
            None => return Ok(None),
        }
    }
    Ok(Some(values))
}

fn agrees(ds: &dyn Dataset, values: &[(&str, String)]) -> FederaResult<bool> {
    for (column, value) in values {
        if !same_value(ds.get(column)?.as_deref(), value) {
            return Ok(false);
        }
    }
    Ok(true)
}

impl Datasource for OverlayDatasource {
    fn name(&self) -> &str {
        &self.name
    }

    fn schema(&self) -> &Schema {
        &self.shape.schema
    }

    fn find(&self, query: &[QueryPart], timeout: Duration) -> FederaResult<QueryResults> {
        if query.is_empty() || query.iter().any(|p| !self.shape.schema.contains(p.column())) {
            return Ok(QueryResults::new());
        }

        let mut only1 = Vec::new();
        let mut only2 = Vec::new();
        let mut both = Vec::new();
        for part in query {
            let column = part.column();
            let in1 = self.shape.schema1.contains(column);
            let in2 = self.shape.schema2.contains(column);
            if in1 && (!in2 || self.common.contains(column)) {
                only1.push(part.clone());
            } else if !in1 {
                only2.push(part.clone());
            } else {
                both.push(part.clone());
            }
        }

        let budget = TimeoutBudget::start(timeout);
        if !only1.is_empty() {
            let filter: Vec<QueryPart> = both.iter().chain(&only2).cloned().collect();
            let results = self.source.find(&only1, budget.remaining()?)?;
            return self.overlay_columns(results, &filter, &budget);
        }
        if !only2.is_empty() {
            let results = self.overlay.find(&only2, budget.remaining()?)?;
            return self.overlay_columns_reversed(results, query, &budget);
        }

        // Every part names a column both sides carry, so either side may
        // hold the value that matches.
        let Some(part) = most_restrictive(&both) else {
            return Ok(QueryResults::new());
        };
        let narrow = std::slice::from_ref(part);
        let results1 = self.source.find(narrow, budget.remaining()?)?;
        let results1 = self.overlay_columns(results1, query, &budget)?;
        let results2 = self.overlay.find(narrow, budget.remaining()?)?;
        let results2 = self.overlay_columns_reversed(results2, query, &budget)?;

        let keys1: HashSet<&str> = results1.iter().map(|ds| ds.key()).collect();
        let mut duplicates = Vec::new();
        let mut seen = HashSet::new();
        for ds in &results2 {
            if keys1.contains(ds.key()) && seen.insert(ds.key().to_string()) {
                duplicates.push(ds.key().to_string());
            }
        }
        debug!(
            "{}: {} + {} records, {} on both sides",
            self.name,
            results1.len(),
            results2.len(),
            duplicates.len()
        );

        let mut merged = QueryResults::with_capacity(results1.len() + results2.len());
        for ds in &results2 {
            if !seen.contains(ds.key()) {
                merged.push(Arc::clone(ds));
            }
        }
        if !duplicates.is_empty() {
            let refetched = self.source.get_datasets_by_key(&duplicates, budget.remaining()?)?;
            for ds in self.overlay_columns(refetched, query, &budget)? {
                merged.push(ds);
            }
        }
        for ds in &results1 {
            if !seen.contains(ds.key()) {
                merged.push(Arc::clone(ds));
            }
        }
        Ok(merged)
    }

    fn get_datasets_by_key(&self, keys: &[String], timeout: Duration) -> FederaResult<QueryResults> {
        if keys.is_empty() {
            return Ok(QueryResults::new());
        }
        let budget = TimeoutBudget::start(timeout);
        let results = self.source.get_datasets_by_key(keys, budget.remaining()?)?;
        self.overlay_columns(results, &[], &budget)
    }

    fn get_contents(&self, _timeout: Duration) -> FederaResult<QueryResults> {
        Ok(QueryResults::new())
    }

    fn children(&self) -> Vec<&Arc<dyn Datasource>> {
        vec![&self.source, &self.overlay]
    }

    fn display(&self) -> String {
        format!("Overlay({}, mode={})", self.name, self.shape.mode)
    }
}

#[derive(Debug)]
struct OverlaidDataset {
    ds1: Arc<dyn Dataset>,
    ds2: Option<Arc<dyn Dataset>>,
    shape: Arc<OverlayShape>,
}

impl OverlaidDataset {
    fn read(ds: Option<&Arc<dyn Dataset>>, schema: &Schema, column: &str) -> FederaResult<Option<String>> {
        match ds {
            Some(ds) if schema.contains(column) => match ds.get(column) {
                Err(FederaError::ColumnNotFound(_)) => Ok(None),
                other => other,
            },
            _ => Ok(None),
        }
    }
}

impl Dataset for OverlaidDataset {
    fn get(&self, column: &str) -> FederaResult<Option<String>> {
        if !self.shape.schema.contains(column) {
            return Err(FederaError::column_not_found(format!(
                "column \"{column}\" is not in the schema"
            )));
        }
        let shape = &self.shape;
        let first = Some(&self.ds1);
        let second = self.ds2.as_ref();
        let ((winner, winner_schema), (fallback, fallback_schema)) = if shape.mode.overlay_wins {
            ((second, &shape.schema2), (first, &shape.schema1))
        } else {
            ((first, &shape.schema1), (second, &shape.schema2))
        };

        let value = Self::read(winner, winner_schema, column)?;
        match value {
            Some(v) if !(shape.mode.empty_is_null && v.is_empty()) => Ok(Some(v)),
            _ => Self::read(fallback, fallback_schema, column),
        }
    }

    fn key(&self) -> &str {
        self.ds1.key()
    }
}
