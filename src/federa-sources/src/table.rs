//! Datasource backed by a table in the nested configuration format.
//!
//! ```text
//! Schema("id" "name" "room")
//! Schluessel("id")
//! Daten(
//!   ("1" "Anna" "101")        # ordered, by schema position
//!   (id "2" name "Bernd")     # named columns
//! )
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use log::debug;

use common_error::{FederaError, FederaResult};
use federa_core::{ConfigNode, Datasource, QueryPart, QueryResults, Schema};

use crate::config::{required_string, section};
use crate::memory::MemoryDatasource;

/// A read-only table loaded from a configuration file.
#[derive(Debug, Clone)]
pub struct TableDatasource {
    inner: MemoryDatasource,
    url: String,
}

impl TableDatasource {
    /// Build from a `Datenquelle` description with `NAME` and `URL`.
    ///
    /// `URL` is resolved against `base_dir`.
    pub fn from_conf(desc: &ConfigNode, base_dir: Option<&Path>) -> FederaResult<Self> {
        let name = required_string(desc, "NAME", "datasource without NAME")?;
        let url = required_string(desc, "URL", &format!("datasource \"{name}\": URL is missing"))?;
        let path = match base_dir {
            Some(dir) => dir.join(&url),
            None => Path::new(&url).to_path_buf(),
        };
        let table = ConfigNode::from_file(&path).map_err(|e| {
            FederaError::configuration(format!(
                "datasource \"{name}\": cannot read {}: {e}",
                path.display()
            ))
        })?;
        let mut ds = Self::from_table(&name, &table)?;
        ds.url = url;
        Ok(ds)
    }

    /// Build from an already parsed table.
    pub fn from_table(name: &str, table: &ConfigNode) -> FederaResult<Self> {
        let schema_node = section(table, "Schema", name)?;
        let schema = Schema::try_from_columns(schema_node.iter().map(ToString::to_string))
            .map_err(|e| FederaError::configuration(format!("datasource \"{name}\": {e}")))?;
        if schema.is_empty() {
            return Err(FederaError::configuration(format!(
                "datasource \"{name}\": Schema section is empty"
            )));
        }

        let key_node = section(table, "Schluessel", name)?;
        let key_columns: Vec<String> = key_node.iter().map(ToString::to_string).collect();

        let mut inner = MemoryDatasource::new(name, schema.clone(), key_columns)?;
        let daten = section(table, "Daten", name)?;
        for record in daten {
            inner.insert(parse_record(name, &schema, record)?)?;
        }
        debug!("{name}: loaded {} rows", inner.len());
        Ok(Self {
            inner,
            url: String::new(),
        })
    }

    /// Where the table was loaded from, if it came from a file.
    pub fn url(&self) -> &str {
        &self.url
    }
}

fn parse_record(
    name: &str,
    schema: &Schema,
    record: &ConfigNode,
) -> FederaResult<HashMap<String, String>> {
    let mut values = HashMap::new();
    if record.iter().all(ConfigNode::is_leaf) {
        if record.count() > schema.len() {
            return Err(FederaError::configuration(format!(
                "datasource \"{name}\": record has {} values but the schema has {} columns",
                record.count(),
                schema.len()
            )));
        }
        for (column, value) in schema.iter().zip(record.iter()) {
            values.insert(column.to_string(), value.name().to_string());
        }
    } else {
        for cell in record {
            if !schema.contains(cell.name()) {
                return Err(FederaError::configuration(format!(
                    "datasource \"{name}\": column \"{}\" is not in the schema",
                    cell.name()
                )));
            }
            values.insert(cell.name().to_string(), cell.to_string());
        }
    }
    Ok(values)
}

impl Datasource for TableDatasource {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn schema(&self) -> &Schema {
        self.inner.schema()
    }

    fn find(&self, query: &[QueryPart], timeout: Duration) -> FederaResult<QueryResults> {
        self.inner.find(query, timeout)
    }

    fn get_datasets_by_key(&self, keys: &[String], timeout: Duration) -> FederaResult<QueryResults> {
        self.inner.get_datasets_by_key(keys, timeout)
    }

    fn get_contents(&self, timeout: Duration) -> FederaResult<QueryResults> {
        self.inner.get_contents(timeout)
    }

    fn display(&self) -> String {
        format!("Table({}, {} rows)", self.inner.name(), self.inner.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T: Duration = Duration::from_secs(1);

    fn parse(text: &str) -> FederaResult<TableDatasource> {
        let table = ConfigNode::parse("table", text)?;
        TableDatasource::from_table("rooms", &table)
    }

    #[test]
    fn test_ordered_and_named_records() {
        let ds = parse(
            r#"Schema("id" "name" "room") Schluessel("id")
               Daten(("1" "Anna" "101") (id "2" name "Bernd"))"#,
        )
        .unwrap();
        let all = ds.get_contents(T).unwrap();
        assert_eq!(all.keys(), vec!["1", "2"]);
        assert_eq!(all.get(1).unwrap().get("room").unwrap(), None);
        assert_eq!(all.get(0).unwrap().get("room").unwrap().as_deref(), Some("101"));
    }

    #[test]
    fn test_too_many_values_is_rejected() {
        let err = parse(r#"Schema("id") Schluessel("id") Daten(("1" "2"))"#).unwrap_err();
        assert!(matches!(err, FederaError::ConfigurationError(_)));
    }

    #[test]
    fn test_unknown_named_column_is_rejected() {
        assert!(parse(r#"Schema("id") Schluessel("id") Daten((id "1" x "2"))"#).is_err());
    }

    #[test]
    fn test_schema_validation() {
        assert!(parse(r#"Schema("id" "id") Schluessel("id") Daten()"#).is_err());
        assert!(parse(r#"Schema("1x") Schluessel("1x") Daten()"#).is_err());
        assert!(parse(r#"Schema("id") Schluessel("nope") Daten()"#).is_err());
        assert!(parse(r#"Schluessel("id") Daten()"#).is_err());
    }

    #[test]
    fn test_from_conf_reads_relative_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("rooms.conf"),
            r#"Schema("id" "name") Schluessel("id") Daten(("7" "Kueche"))"#,
        )
        .unwrap();
        let desc = ConfigNode::parse("d", r#"NAME "rooms" URL "rooms.conf""#).unwrap();
        let ds = TableDatasource::from_conf(&desc, Some(dir.path())).unwrap();
        assert_eq!(ds.name(), "rooms");
        assert_eq!(ds.url(), "rooms.conf");
        assert_eq!(ds.find(&[QueryPart::new("name", "k*")], T).unwrap().len(), 1);
    }

    #[test]
    fn test_from_conf_missing_file() {
        let desc = ConfigNode::parse("d", r#"NAME "rooms" URL "/nonexistent/rooms.conf""#).unwrap();
        let err = TableDatasource::from_conf(&desc, None).unwrap_err();
        assert!(matches!(err, FederaError::ConfigurationError(_)));
    }
}
