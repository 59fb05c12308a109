//! Adding, dropping and renaming columns of a source.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use common_error::{FederaError, FederaResult};
use federa_core::{
    ConfigNode, Dataset, Datasource, QueryPart, QueryResults, Schema, is_valid_identifier,
};

use crate::support::{SourceMap, lookup, name_of, pairs, required};

/// Where a transformed column gets its value from.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Mapping {
    /// Added column without backing; always unset.
    Added,
    /// Renamed column reading the named source column.
    Renamed(String),
}

#[derive(Debug)]
struct TransformShape {
    schema: Schema,
    /// Columns absent here are read from the source under the same name.
    mapping: HashMap<String, Mapping>,
}

/// A source seen through a static column transformation.
#[derive(Debug)]
pub struct SchemaTransformDatasource {
    name: String,
    source: Arc<dyn Datasource>,
    shape: Arc<TransformShape>,
}

impl SchemaTransformDatasource {
    /// Apply `drop`, then `add`, then each `(old, new)` of `rename`.
    pub fn new(
        name: impl Into<String>,
        source: Arc<dyn Datasource>,
        drop: Vec<String>,
        add: Vec<String>,
        rename: Vec<(String, String)>,
    ) -> FederaResult<Self> {
        let name = name.into();
        let source_schema = source.schema();

        let mut drops = HashSet::new();
        for column in drop {
            if !source_schema.contains(&column) {
                return Err(FederaError::configuration(format!(
                    "datasource \"{name}\": DROP column \"{column}\" is not in the schema of \"{}\"",
                    source.name()
                )));
            }
            drops.insert(column);
        }

        let mut adds = Vec::new();
        for column in add {
            ensure_identifier(&name, "ADD", &column)?;
            drops.remove(&column);
            adds.push(column);
        }

        let mut mapping = HashMap::new();
        for (old, new) in rename {
            if !source_schema.contains(&old) {
                return Err(FederaError::configuration(format!(
                    "datasource \"{name}\": RENAME column \"{old}\" is not in the schema of \"{}\"",
                    source.name()
                )));
            }
            ensure_identifier(&name, "RENAME", &new)?;
            drops.insert(old.clone());
            drops.remove(&new);
            mapping.insert(new.clone(), Mapping::Renamed(old));
            adds.push(new);
        }

        for column in &adds {
            if !source_schema.contains(column) && !mapping.contains_key(column) {
                mapping.insert(column.clone(), Mapping::Added);
            }
        }

        let mut schema = Schema::new();
        for column in source_schema.iter().filter(|c| !drops.contains(*c)) {
            schema.add(column);
        }
        for column in adds {
            schema.add(column);
        }

        Ok(Self {
            name,
            source,
            shape: Arc::new(TransformShape { schema, mapping }),
        })
    }

    /// Build from `NAME`, `SOURCE` and any number of `DROP(...)`,
    /// `ADD(...)` and `RENAME(old new)` sections.
    pub fn from_conf(desc: &ConfigNode, sources: &SourceMap) -> FederaResult<Self> {
        let name = name_of(desc)?;
        let source = lookup(sources, &name, &required(desc, "SOURCE", &name)?)?;
        let columns = |key: &str| -> Vec<String> {
            desc.query(key)
                .into_iter()
                .flat_map(|node| node.children().iter().map(ToString::to_string))
                .collect()
        };
        let drop = columns("DROP");
        let add = columns("ADD");
        let rename = pairs(desc, "RENAME", &name)?;
        Self::new(name, source, drop, add, rename)
    }

    fn wrap(&self, results: QueryResults) -> QueryResults {
        results
            .into_iter()
            .map(|inner| {
                Arc::new(TransformedDataset {
                    inner,
                    shape: Arc::clone(&self.shape),
                }) as Arc<dyn Dataset>
            })
            .collect()
    }
}

fn ensure_identifier(name: &str, section: &str, column: &str) -> FederaResult<()> {
    if is_valid_identifier(column) {
        Ok(())
    } else {
        Err(FederaError::configuration(format!(
            "datasource \"{name}\": {section} column \"{column}\" is not a valid identifier"
        )))
    }
}

impl Datasource for SchemaTransformDatasource {
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
        let mut translated = Vec::with_capacity(query.len());
        for part in query {
            if !self.shape.schema.contains(part.column()) {
                return Ok(QueryResults::new());
            }
            match self.shape.mapping.get(part.column()) {
                // No record has a value there.
                Some(Mapping::Added) => return Ok(QueryResults::new()),
                Some(Mapping::Renamed(old)) => translated.push(part.with_column(old)),
                None => translated.push(part.clone()),
            }
        }
        Ok(self.wrap(self.source.find(&translated, timeout)?))
    }

    fn get_datasets_by_key(&self, keys: &[String], timeout: Duration) -> FederaResult<QueryResults> {
        if keys.is_empty() {
            return Ok(QueryResults::new());
        }
        Ok(self.wrap(self.source.get_datasets_by_key(keys, timeout)?))
    }

    fn get_contents(&self, _timeout: Duration) -> FederaResult<QueryResults> {
        Ok(QueryResults::new())
    }

    fn children(&self) -> Vec<&Arc<dyn Datasource>> {
        vec![&self.source]
    }

    fn display(&self) -> String {
        format!("SchemaTransform({}, {})", self.name, self.shape.schema)
    }
}

#[derive(Debug)]
struct TransformedDataset {
    inner: Arc<dyn Dataset>,
    shape: Arc<TransformShape>,
}

impl Dataset for TransformedDataset {
    fn get(&self, column: &str) -> FederaResult<Option<String>> {
        if !self.shape.schema.contains(column) {
            return Err(FederaError::column_not_found(format!(
                "column \"{column}\" is not in the schema"
            )));
        }
        match self.shape.mapping.get(column) {
            Some(Mapping::Added) => Ok(None),
            Some(Mapping::Renamed(old)) => self.inner.get(old),
            None => self.inner.get(column),
        }
    }

    fn key(&self) -> &str {
        self.inner.key()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use federa_sources::{MemoryDatasource, row};

    const T: Duration = Duration::from_secs(1);

    fn people() -> Arc<dyn Datasource> {
        let source = MemoryDatasource::new("people", Schema::from_columns(["id", "name", "mail"]), ["id"])
            .unwrap()
            .with_rows([
                row([("id", "1"), ("name", "A"), ("mail", "a@x")]),
                row([("id", "2"), ("name", "B")]),
            ])
            .unwrap();
        Arc::new(source)
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_drop_add_rename() {
        let ds = SchemaTransformDatasource::new(
            "t",
            people(),
            strings(&["mail"]),
            strings(&["phone"]),
            vec![("name".into(), "label".into())],
        )
        .unwrap();
        assert_eq!(ds.schema().columns(), ["id", "phone", "label"]);

        let found = ds.find(&[QueryPart::new("label", "a")], T).unwrap();
        assert_eq!(found.keys(), vec!["1"]);
        let record = found.get(0).unwrap();
        assert_eq!(record.get("label").unwrap().as_deref(), Some("A"));
        assert_eq!(record.get("phone").unwrap(), None);
        assert!(record.get("mail").is_err());
        assert!(record.get("name").is_err());
    }

    #[test]
    fn test_queries_on_added_or_unknown_columns_are_empty() {
        let ds = SchemaTransformDatasource::new("t", people(), vec![], strings(&["phone"]), vec![]).unwrap();
        assert!(ds.find(&[QueryPart::new("phone", "*")], T).unwrap().is_empty());
        assert!(ds.find(&[QueryPart::new("other", "*")], T).unwrap().is_empty());
        assert_eq!(ds.find(&[QueryPart::new("id", "2")], T).unwrap().keys(), vec!["2"]);
    }

    #[test]
    fn test_add_restores_a_dropped_column() {
        let ds = SchemaTransformDatasource::new("t", people(), strings(&["mail"]), strings(&["mail"]), vec![])
            .unwrap();
        let found = ds.get_datasets_by_key(&["1".to_string()], T).unwrap();
        assert_eq!(found.get(0).unwrap().get("mail").unwrap().as_deref(), Some("a@x"));
    }

    #[test]
    fn test_invalid_configuration() {
        assert!(SchemaTransformDatasource::new("t", people(), strings(&["nope"]), vec![], vec![]).is_err());
        assert!(SchemaTransformDatasource::new("t", people(), vec![], strings(&["1bad"]), vec![]).is_err());
        let rename = vec![("nope".to_string(), "x".to_string())];
        assert!(SchemaTransformDatasource::new("t", people(), vec![], vec![], rename).is_err());
    }
}
