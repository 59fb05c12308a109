//! Datasource over a table or view of a row-set backend.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use log::debug;

use common_error::{FederaError, FederaResult};
use federa_core::{
    ConfigNode, Dataset, Datasource, KeySpec, MapDataset, QueryPart, QueryResults, Schema,
    TimeoutBudget,
};

use super::connector::{Row, RowSetConnector, RowSetGuard};
use super::statement::{SelectStatement, SqlSyntax};
use crate::config::required_string;

/// A table reached through a [`RowSetConnector`].
#[derive(Debug)]
pub struct RowSetDatasource {
    name: String,
    source: String,
    table: String,
    user: String,
    password: String,
    syntax: SqlSyntax,
    schema: Arc<Schema>,
    key_spec: KeySpec,
    connector: Arc<dyn RowSetConnector>,
}

impl RowSetDatasource {
    /// Build from a `Datenquelle` description of type `ooo` or `sql`.
    ///
    /// Without a `Schema` section the columns (and, without `Schluessel`,
    /// the key) are read from the backend within `discovery_timeout`.
    pub fn from_conf(
        desc: &ConfigNode,
        connector: Arc<dyn RowSetConnector>,
        discovery_timeout: Duration,
    ) -> FederaResult<Self> {
        let name = required_string(desc, "NAME", "datasource without NAME")?;
        let err = |msg: String| FederaError::configuration(format!("datasource \"{name}\": {msg}"));
        let source = required_string(
            desc,
            "SOURCE",
            &format!("datasource \"{name}\": SOURCE is missing"),
        )?;
        let table = required_string(
            desc,
            "TABLE",
            &format!("datasource \"{name}\": TABLE is missing"),
        )?;
        let user = desc.get_string("USER").unwrap_or_default();
        let password = desc.get_string("PASSWORD").unwrap_or_default();
        let syntax = SqlSyntax::parse(&desc.get_string("SQL_SYNTAX").unwrap_or_default())?;
        let key_node = desc.query("Schluessel").first().copied();

        let (schema, key_columns) = match desc.query("Schema").first() {
            Some(schema_node) => {
                let schema = Schema::from_columns(schema_node.iter().map(ToString::to_string));
                if schema.is_empty() {
                    return Err(err("Schema section is empty".to_string()));
                }
                let key_node = key_node.ok_or_else(|| err("Schluessel section is missing".to_string()))?;
                let keys = parse_key(key_node, &schema).map_err(err)?;
                (schema, keys)
            }
            None => {
                debug!("{name}: no Schema section, asking {source} for the columns of {table}");
                let budget = TimeoutBudget::start(discovery_timeout);
                let mut conn = RowSetGuard::new(connector.connect(&user, &password, budget.remaining()?)?);
                let description = conn
                    .describe(&table, budget.remaining()?)
                    .map_err(|e| err(format!("cannot read the columns of \"{table}\": {e}")))?;
                let schema = Schema::from_columns(description.columns);
                if schema.is_empty() {
                    return Err(err(format!("table \"{table}\" has no columns")));
                }
                let keys = match key_node {
                    Some(node) => parse_key(node, &schema).map_err(err)?,
                    None => description.key_columns,
                };
                (schema, keys)
            }
        };
        if key_columns.is_empty() {
            return Err(err("no key column".to_string()));
        }

        Ok(Self {
            name,
            source,
            table,
            user,
            password,
            syntax,
            schema: Arc::new(schema),
            key_spec: KeySpec::new(key_columns),
            connector,
        })
    }

    /// The SQL dialect statements are rendered in.
    pub fn syntax(&self) -> SqlSyntax {
        self.syntax
    }

    /// The backend data source name.
    pub fn source(&self) -> &str {
        &self.source
    }

    fn execute(&self, statement: SelectStatement, timeout: Duration) -> FederaResult<QueryResults> {
        let budget = TimeoutBudget::start(timeout);
        debug!("{}: {}", self.name, statement.to_sql(self.syntax));
        let mut conn = RowSetGuard::new(self.connector.connect(
            &self.user,
            &self.password,
            budget.remaining()?,
        )?);
        let rows = conn.execute(&statement, budget.remaining()?)?;
        Ok(rows.into_iter().map(|row| self.to_dataset(row)).collect())
    }

    fn to_dataset(&self, row: Row) -> Arc<dyn Dataset> {
        let values: HashMap<String, String> = row
            .into_iter()
            .filter(|(column, _)| self.schema.contains(column))
            .collect();
        let key = self.key_spec.key_from_map(&values);
        Arc::new(MapDataset::new(key, values, Arc::clone(&self.schema)))
    }
}

fn parse_key(node: &ConfigNode, schema: &Schema) -> Result<Vec<String>, String> {
    let mut columns: Vec<String> = Vec::new();
    for column in node.iter().map(ToString::to_string) {
        if !schema.contains(&column) {
            return Err(format!("key column \"{column}\" is not in the schema"));
        }
        if columns.contains(&column) {
            return Err(format!("key column \"{column}\" is listed twice"));
        }
        columns.push(column);
    }
    Ok(columns)
}

impl Datasource for RowSetDatasource {
    fn name(&self) -> &str {
        &self.name
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn find(&self, query: &[QueryPart], timeout: Duration) -> FederaResult<QueryResults> {
        if query.is_empty() || query.iter().any(|p| !self.schema.contains(p.column())) {
            return Ok(QueryResults::new());
        }
        self.execute(SelectStatement::like(&self.table, query.to_vec()), timeout)
    }

    fn get_datasets_by_key(&self, keys: &[String], timeout: Duration) -> FederaResult<QueryResults> {
        let decoded: Vec<_> = keys
            .iter()
            .filter_map(|key| match self.key_spec.decode(key) {
                Ok(pairs) => Some(pairs),
                Err(e) => {
                    debug!("{}: ignoring key {key:?}: {e}", self.name);
                    None
                }
            })
            .collect();
        if decoded.is_empty() {
            return Ok(QueryResults::new());
        }
        self.execute(SelectStatement::by_keys(&self.table, decoded), timeout)
    }

    fn get_contents(&self, timeout: Duration) -> FederaResult<QueryResults> {
        self.execute(SelectStatement::all(&self.table), timeout)
    }

    fn display(&self) -> String {
        format!("RowSet({}, {}.{})", self.name, self.source, self.table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::row;
    use crate::rowset::{Condition, InMemoryRowSet};

    const T: Duration = Duration::from_secs(1);

    fn backend() -> InMemoryRowSet {
        let backend = InMemoryRowSet::new().with_table("staff", ["id", "name", "extra"], &["id"]);
        backend
            .insert("staff", row([("id", "1"), ("name", "Anna"), ("extra", "x")]))
            .unwrap();
        backend.insert("staff", row([("id", "2"), ("name", "Bernd")])).unwrap();
        backend
    }

    fn source(extra: &str, backend: &InMemoryRowSet) -> FederaResult<RowSetDatasource> {
        let desc = ConfigNode::parse(
            "d",
            &format!(r#"NAME "staff" SOURCE "hr" TABLE "staff" {extra}"#),
        )?;
        RowSetDatasource::from_conf(&desc, Arc::new(backend.clone()), T)
    }

    #[test]
    fn test_configured_schema_drops_other_columns() {
        let backend = backend();
        let ds = source(r#"Schema("id" "name") Schluessel("id")"#, &backend).unwrap();
        let anna = ds.find(&[QueryPart::new("name", "a*")], T).unwrap();
        assert_eq!(anna.keys(), vec!["1"]);
        assert!(anna.get(0).unwrap().get("extra").is_err());
        assert_eq!(backend.open_connections(), 0);
    }

    #[test]
    fn test_discovers_schema_and_key() {
        let backend = backend();
        let ds = source("", &backend).unwrap();
        assert_eq!(ds.schema().columns(), ["id", "name", "extra"]);
        assert_eq!(ds.syntax(), SqlSyntax::Mysql);
        let found = ds.get_datasets_by_key(&["2".to_string(), "9".to_string()], T).unwrap();
        assert_eq!(found.keys(), vec!["2"]);
        let last = backend.executed().pop().unwrap();
        assert!(matches!(last.condition, Condition::Keys(ref k) if k.len() == 2));
    }

    #[test]
    fn test_contents_and_empty_inputs() {
        let backend = backend();
        let ds = source(r#"Schema("id" "name") Schluessel("id") SQL_SYNTAX "ansi""#, &backend).unwrap();
        assert_eq!(ds.get_contents(T).unwrap().len(), 2);
        assert!(ds.find(&[], T).unwrap().is_empty());
        assert!(ds.get_datasets_by_key(&[], T).unwrap().is_empty());
        assert!(ds.find(&[QueryPart::new("room", "1")], T).unwrap().is_empty());
    }

    #[test]
    fn test_config_errors() {
        let backend = backend();
        assert!(source(r#"Schema("id") Schluessel("nope")"#, &backend).is_err());
        assert!(source(r#"Schema("id")"#, &backend).is_err());
        assert!(source(r#"Schema("id") Schluessel("id" "id")"#, &backend).is_err());
        assert!(source(r#"Schema("id") Schluessel("id") SQL_SYNTAX "db2""#, &backend).is_err());
        let desc = ConfigNode::parse("d", r#"NAME "x" SOURCE "hr" TABLE "missing""#).unwrap();
        assert!(RowSetDatasource::from_conf(&desc, Arc::new(backend), T).is_err());
    }
}
