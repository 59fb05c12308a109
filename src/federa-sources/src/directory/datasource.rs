//! Datasource over a hierarchical directory.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use log::{debug, trace};
use regex::Regex;

use common_error::{FederaError, FederaResult};
use common_runtime::{BackgroundRuntime, TaskHandle};
use federa_core::{
    ConfigNode, Dataset, Datasource, KeySpec, MapDataset, QueryPart, QueryResults, Schema,
    TimeoutBudget, is_valid_identifier,
};

use super::client::{
    ConnectionGuard, Credentials, DirEntry, DirectoryClient, SearchScope, first_value,
};
use super::filter::Filter;
use super::name::DirName;
use super::paths::{RelativePath, intersect_mixed, intersect_negative, intersect_positive};
use crate::config::required_string;

static BASE_DN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[a-zA-Z]+=[a-zA-ZäÄöÖüÜß \\()-]+(,[a-zA-Z]+=[a-zA-ZäÄöÖüÜß \\()-]+)*$",
    )
    .expect("valid base dn regex")
});

static ATTRIBUTE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z]+$").expect("valid attribute regex"));

static URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z][a-zA-Z0-9+.-]*://\S*$").expect("valid url regex")
});

/// Where a column's value lives relative to a matching entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    /// 0: the entry itself; negative: that many levels above the entry;
    /// positive: the ancestor at that absolute depth.
    pub level: i64,
    pub attr: String,
    /// Extra object class an entry must have to satisfy a predicate.
    pub object_class: Option<String>,
    /// Replaced by `\n` in values.
    pub line_separator: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyKind {
    AbsoluteOnly,
    Mixed,
    RelativeOnly,
}

/// A read-only view of a directory subtree as a table.
///
/// `get_contents` is always empty.
#[derive(Debug)]
pub struct DirectoryDatasource {
    name: String,
    url: String,
    base: DirName,
    object_class: String,
    credentials: Option<Credentials>,
    columns: BTreeMap<String, ColumnDef>,
    schema: Arc<Schema>,
    key_spec: KeySpec,
    key_kind: KeyKind,
    client: Arc<dyn DirectoryClient>,
}

impl DirectoryDatasource {
    /// Build from a `Datenquelle` description of type `ldap`.
    pub fn from_conf(desc: &ConfigNode, client: Arc<dyn DirectoryClient>) -> FederaResult<Self> {
        let name = required_string(desc, "NAME", "datasource without NAME")?;
        let err = |msg: String| FederaError::configuration(format!("datasource \"{name}\": {msg}"));

        let url = required_string(desc, "URL", &format!("datasource \"{name}\": URL is missing"))?;
        if !URL_RE.is_match(&url) {
            return Err(err(format!("invalid URL \"{url}\"")));
        }
        let base_dn = required_string(
            desc,
            "BASE_DN",
            &format!("datasource \"{name}\": BASE_DN is missing"),
        )?;
        if !BASE_DN_RE.is_match(&base_dn) {
            return Err(err(format!("invalid BASE_DN \"{base_dn}\"")));
        }
        let object_class = required_string(
            desc,
            "OBJECT_CLASS",
            &format!("datasource \"{name}\": OBJECT_CLASS is missing"),
        )?;
        if !ATTRIBUTE_RE.is_match(&object_class) {
            return Err(err(format!("invalid OBJECT_CLASS \"{object_class}\"")));
        }
        let credentials = match (desc.get_string("USER"), desc.get_string("PASSWORD")) {
            (Some(user), Some(password)) if !user.is_empty() && !password.is_empty() => {
                Some(Credentials { user, password })
            }
            _ => None,
        };

        let sections = desc.query("Columns");
        if sections.is_empty() {
            return Err(err("section Columns is missing".to_string()));
        }
        let mut schema = Schema::new();
        let mut columns = BTreeMap::new();
        for section in sections {
            for column_desc in section {
                let (column, def) = parse_column(column_desc).map_err(err)?;
                if !schema.add(column.clone()) {
                    return Err(err(format!("column \"{column}\" is defined twice")));
                }
                columns.insert(column, def);
            }
        }

        let key_node = desc
            .query("Schluessel")
            .last()
            .copied()
            .ok_or_else(|| err("section Schluessel is missing".to_string()))?;
        let key_columns: Vec<String> = key_node.iter().map(ToString::to_string).collect();
        if key_columns.is_empty() {
            return Err(err("no key column".to_string()));
        }
        let mut any_absolute = false;
        let mut any_relative = false;
        for column in &key_columns {
            match columns.get(column) {
                None => {
                    return Err(err(format!(
                        "key column \"{column}\" is not defined in Columns"
                    )));
                }
                Some(def) if def.level == 0 => any_absolute = true,
                Some(_) => any_relative = true,
            }
        }
        let key_kind = match (any_absolute, any_relative) {
            (true, false) => KeyKind::AbsoluteOnly,
            (true, true) => KeyKind::Mixed,
            _ => KeyKind::RelativeOnly,
        };

        Ok(Self {
            name,
            url,
            base: DirName::parse(&base_dn),
            object_class,
            credentials,
            columns,
            schema: Arc::new(schema),
            key_spec: KeySpec::new(key_columns),
            key_kind,
            client,
        })
    }

    /// The server URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// The definition of `column`, if it is part of the schema.
    pub fn column(&self, column: &str) -> Option<&ColumnDef> {
        self.columns.get(column)
    }

    /// Run [`Datasource::find`] on a background worker.
    ///
    /// The search cannot be cancelled; it ends on completion or timeout.
    pub fn find_in_background(
        self: &Arc<Self>,
        query: Vec<QueryPart>,
        timeout: Duration,
        runtime: &BackgroundRuntime,
    ) -> TaskHandle<FederaResult<QueryResults>> {
        let source = Arc::clone(self);
        runtime.spawn_blocking(move || source.find(&query, timeout))
    }

    fn connect(&self, budget: &TimeoutBudget) -> FederaResult<ConnectionGuard> {
        let conn = self
            .client
            .connect(self.credentials.as_ref(), budget.remaining()?)?;
        Ok(ConnectionGuard::new(conn))
    }

    /// `(&(objectClass=<class>) filter)`.
    fn with_object_class(&self, filter: Option<&Filter>) -> Filter {
        let mut parts = vec![Filter::object_class(&self.object_class)];
        parts.extend(filter.cloned());
        Filter::And(parts)
    }

    /// Candidate nodes (relative to the base) for one non-zero level.
    fn get_paths(
        &self,
        conn: &mut ConnectionGuard,
        filter: &Filter,
        level: i64,
        budget: &TimeoutBudget,
    ) -> FederaResult<Vec<DirName>> {
        let root_len = self.base.len() as i64;
        let hits = conn.search(&self.base, filter, SearchScope::Subtree, budget.remaining()?)?;
        // Negative levels cannot be checked here: the depth of the records
        // below a node is unknown until the final search.
        Ok(hits
            .into_iter()
            .filter_map(|hit| hit.name.relative_to(&self.base))
            .filter(|rel| level < 0 || rel.len() as i64 + root_len == level)
            .collect())
    }

    /// Entries `depth` levels below `start` (relative) that match `filter`.
    fn search_level(
        &self,
        conn: &mut ConnectionGuard,
        start: &DirName,
        filter: &Filter,
        depth: i64,
        budget: &TimeoutBudget,
    ) -> FederaResult<Vec<DirEntry>> {
        let all = Filter::present("objectClass");
        let mut seeds = vec![self.base.join(start)];
        for _ in 1..depth {
            let mut next = Vec::new();
            for seed in &seeds {
                let children = conn.search(seed, &all, SearchScope::OneLevel, budget.remaining()?)?;
                next.extend(children.into_iter().map(|c| c.name));
            }
            seeds = next;
        }
        let scope = if depth == 0 {
            SearchScope::Object
        } else {
            SearchScope::OneLevel
        };
        let mut found = Vec::new();
        for seed in &seeds {
            found.extend(conn.search(seed, filter, scope, budget.remaining()?)?);
        }
        Ok(found)
    }

    fn find_entries(
        &self,
        conn: &mut ConnectionGuard,
        query: &[QueryPart],
        budget: &TimeoutBudget,
    ) -> FederaResult<Option<Vec<DirEntry>>> {
        let mut level0 = Vec::new();
        let mut by_level: BTreeMap<i64, Vec<Filter>> = BTreeMap::new();
        for part in query {
            let Some(def) = self.columns.get(part.column()) else {
                return Ok(None);
            };
            if part.pattern().is_empty() {
                continue;
            }
            let mut filter = Filter::matches(&def.attr, part.pattern());
            if let Some(class) = &def.object_class {
                filter = Filter::And(vec![filter, Filter::object_class(class)]);
            }
            if def.level == 0 {
                level0.push(filter);
            } else {
                by_level.entry(def.level).or_default().push(filter);
            }
        }
        let level0 = (!level0.is_empty()).then(|| Filter::and(level0));

        let mut positive = Vec::new();
        let mut negative = Vec::new();
        for (level, filters) in by_level {
            let paths = self.get_paths(conn, &Filter::and(filters), level, budget)?;
            if level > 0 {
                positive.push((level, paths));
            } else {
                negative.push(
                    paths
                        .into_iter()
                        .map(|p| RelativePath::new(level, p))
                        .collect::<Vec<_>>(),
                );
            }
        }
        let has_negative = !negative.is_empty();
        let positive = intersect_positive(positive);
        let negative = intersect_negative(negative);
        let negative = match (negative, &positive) {
            (Some(neg), Some(pos)) => Some(intersect_mixed(&neg, pos)),
            (neg, _) => neg,
        };

        if level0.is_none() && positive.is_none() && negative.is_none() {
            return Ok(None);
        }
        let filter = self.with_object_class(level0.as_ref());

        let mut entries = Vec::new();
        if !has_negative {
            let bases: Vec<DirName> = match positive {
                Some(paths) => paths.iter().map(|p| self.base.join(p)).collect(),
                None => vec![self.base.clone()],
            };
            for base in &bases {
                entries.extend(conn.search(base, &filter, SearchScope::Subtree, budget.remaining()?)?);
            }
        } else {
            for path in negative.unwrap_or_default() {
                entries.extend(self.search_level(conn, &path.name, &filter, -path.relative, budget)?);
            }
        }
        Ok(Some(entries))
    }

    fn to_datasets(
        &self,
        conn: &mut ConnectionGuard,
        entries: Vec<DirEntry>,
        budget: &TimeoutBudget,
    ) -> FederaResult<Vec<MapDataset>> {
        let mut builder = DatasetBuilder {
            source: self,
            cache: HashMap::new(),
        };
        entries
            .iter()
            .map(|entry| builder.build(conn, entry, budget))
            .collect()
    }

    fn absolute_key_filter(&self, key: &str) -> Option<Filter> {
        let fields = match self.key_spec.decode(key) {
            Ok(fields) => fields,
            Err(e) => {
                debug!("{}: ignoring key {key:?}: {e}", self.name);
                return None;
            }
        };
        let terms: Vec<Filter> = fields
            .into_iter()
            .filter_map(|(column, value)| {
                let def = self.columns.get(&column)?;
                (def.level == 0).then_some(())?;
                Some(Filter::equals(&def.attr, value?))
            })
            .collect();
        (!terms.is_empty()).then(|| Filter::and(terms))
    }

    fn key_to_query(&self, key: &str) -> FederaResult<Vec<QueryPart>> {
        Ok(self
            .key_spec
            .decode(key)?
            .into_iter()
            .filter_map(|(column, value)| Some(QueryPart::new(column, value?.replace('*', ""))))
            .collect())
    }
}

/// Fills datasets from search hits, caching attribute reads of shared
/// ancestor nodes for the duration of one call.
struct DatasetBuilder<'a> {
    source: &'a DirectoryDatasource,
    cache: HashMap<(DirName, String), Option<String>>,
}

impl DatasetBuilder<'_> {
    fn build(
        &mut self,
        conn: &mut ConnectionGuard,
        entry: &DirEntry,
        budget: &TimeoutBudget,
    ) -> FederaResult<MapDataset> {
        let source = self.source;
        let rel = entry.name.relative_to(&source.base).unwrap_or_default();
        let root_len = source.base.len() as i64;
        let mut values = HashMap::new();
        for (column, def) in &source.columns {
            let value = if def.level == 0 {
                entry.first_value(&def.attr).map(str::to_string)
            } else {
                let target = if def.level < 0 {
                    usize::try_from(rel.len() as i64 + def.level)
                        .ok()
                        .and_then(|n| rel.prefix(n))
                } else {
                    usize::try_from(def.level - root_len)
                        .ok()
                        .and_then(|n| rel.prefix(n))
                };
                match target {
                    Some(target) => self.read(conn, source.base.join(&target), &def.attr, budget)?,
                    None => None,
                }
            };
            if let Some(mut value) = value {
                if let Some(sep) = &def.line_separator {
                    value = value.replace(sep.as_str(), "\n");
                }
                values.insert(column.clone(), value);
            }
        }
        let key = source.key_spec.key_from_map(&values);
        Ok(MapDataset::new(key, values, Arc::clone(&source.schema)))
    }

    fn read(
        &mut self,
        conn: &mut ConnectionGuard,
        name: DirName,
        attr: &str,
        budget: &TimeoutBudget,
    ) -> FederaResult<Option<String>> {
        let cache_key = (name, attr.to_string());
        if let Some(cached) = self.cache.get(&cache_key) {
            return Ok(cached.clone());
        }
        let attrs = conn.read_attributes(&cache_key.0, &[attr.to_string()], budget.remaining()?)?;
        let value = attrs.and_then(|a| first_value(&a, attr).map(str::to_string));
        trace!("read {}:{attr} = {value:?}", cache_key.0);
        self.cache.insert(cache_key, value.clone());
        Ok(value)
    }
}

fn parse_column(desc: &ConfigNode) -> Result<(String, ColumnDef), String> {
    let column = desc
        .get_string("DB_COLUMN")
        .ok_or_else(|| "DB_COLUMN is missing".to_string())?;
    if !is_valid_identifier(&column) {
        return Err(format!("column \"{column}\" is not a valid identifier"));
    }
    let path = desc
        .get_string("PATH")
        .ok_or_else(|| format!("PATH is missing for column \"{column}\""))?;
    let Some((level, attr)) = path.split_once(':') else {
        return Err(format!("malformed PATH \"{path}\" for column \"{column}\""));
    };
    let level: i64 = level
        .trim()
        .parse()
        .map_err(|_| format!("malformed level in PATH \"{path}\" for column \"{column}\""))?;
    if !ATTRIBUTE_RE.is_match(attr) {
        return Err(format!("invalid attribute \"{attr}\" for column \"{column}\""));
    }
    let def = ColumnDef {
        level,
        attr: attr.to_string(),
        object_class: desc.get_string("OBJECT_CLASS"),
        line_separator: desc.get_string("LINE_SEPARATOR"),
    };
    Ok((column, def))
}

impl Datasource for DirectoryDatasource {
    fn name(&self) -> &str {
        &self.name
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn find(&self, query: &[QueryPart], timeout: Duration) -> FederaResult<QueryResults> {
        if query.is_empty() {
            return Ok(QueryResults::new());
        }
        let budget = TimeoutBudget::start(timeout);
        debug!("{}: find {query:?}", self.name);
        let mut conn = self.connect(&budget)?;
        let Some(entries) = self.find_entries(&mut conn, query, &budget)? else {
            return Ok(QueryResults::new());
        };
        Ok(self
            .to_datasets(&mut conn, entries, &budget)?
            .into_iter()
            .map(|ds| Arc::new(ds) as Arc<dyn Dataset>)
            .collect())
    }

    fn get_datasets_by_key(&self, keys: &[String], timeout: Duration) -> FederaResult<QueryResults> {
        if keys.is_empty() {
            return Ok(QueryResults::new());
        }
        let budget = TimeoutBudget::start(timeout);
        if self.key_kind == KeyKind::RelativeOnly {
            let mut results = QueryResults::new();
            for key in keys {
                let query = match self.key_to_query(key) {
                    Ok(query) => query,
                    Err(e) => {
                        debug!("{}: ignoring key {key:?}: {e}", self.name);
                        continue;
                    }
                };
                results.extend(self.find(&query, budget.remaining()?)?);
            }
            return Ok(results);
        }

        let terms: Vec<Filter> = keys.iter().filter_map(|k| self.absolute_key_filter(k)).collect();
        if terms.is_empty() {
            return Ok(QueryResults::new());
        }
        let filter = self.with_object_class(Some(&Filter::Or(terms)));
        let mut conn = self.connect(&budget)?;
        let entries = conn.search(&self.base, &filter, SearchScope::Subtree, budget.remaining()?)?;
        let wanted: HashSet<&str> = keys.iter().map(String::as_str).collect();
        Ok(self
            .to_datasets(&mut conn, entries, &budget)?
            .into_iter()
            .filter(|ds| self.key_kind == KeyKind::AbsoluteOnly || wanted.contains(ds.key()))
            .map(|ds| Arc::new(ds) as Arc<dyn Dataset>)
            .collect())
    }

    fn get_contents(&self, _timeout: Duration) -> FederaResult<QueryResults> {
        Ok(QueryResults::new())
    }

    fn display(&self) -> String {
        format!("Directory({}, {} base={})", self.name, self.url, self.base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::InMemoryDirectory;

    const T: Duration = Duration::from_secs(5);

    fn conf(columns: &str, key: &str) -> ConfigNode {
        ConfigNode::parse(
            "desc",
            &format!(
                r#"NAME "people" URL "ldap://localhost" BASE_DN "o=Acme"
                   OBJECT_CLASS "person" Columns({columns}) Schluessel({key})"#
            ),
        )
        .unwrap()
    }

    fn tree() -> InMemoryDirectory {
        InMemoryDirectory::new()
            .with_entry("o=Acme", &[("objectClass", "organization")])
            .with_entry("ou=Sales,o=Acme", &[("objectClass", "unit"), ("ou", "Sales")])
            .with_entry("ou=IT,o=Acme", &[("objectClass", "unit"), ("ou", "IT")])
            .with_entry(
                "cn=Anna,ou=Sales,o=Acme",
                &[("objectClass", "person"), ("cn", "Anna"), ("uid", "a1")],
            )
            .with_entry(
                "cn=Bernd,ou=IT,o=Acme",
                &[("objectClass", "person"), ("cn", "Bernd"), ("uid", "b2")],
            )
    }

    const COLUMNS: &str = r#"(DB_COLUMN "Name" PATH "0:cn")
        (DB_COLUMN "Uid" PATH "0:uid")
        (DB_COLUMN "Dept" PATH "-1:ou")"#;

    fn source(key: &str) -> (InMemoryDirectory, DirectoryDatasource) {
        let dir = tree();
        let ds = DirectoryDatasource::from_conf(&conf(COLUMNS, key), Arc::new(dir.clone())).unwrap();
        (dir, ds)
    }

    #[test]
    fn test_find_level0_reads_ancestor_column() {
        let (dir, ds) = source(r#""Uid""#);
        let results = ds.find(&[QueryPart::new("Name", "an*")], T).unwrap();
        assert_eq!(results.len(), 1);
        let anna = results.get(0).unwrap();
        assert_eq!(anna.get("Dept").unwrap().as_deref(), Some("Sales"));
        assert_eq!(anna.key(), "a1");
        assert_eq!(dir.open_connections(), 0);
    }

    #[test]
    fn test_find_by_ancestor_attribute() {
        let (_, ds) = source(r#""Uid""#);
        let results = ds.find(&[QueryPart::new("Dept", "IT")], T).unwrap();
        assert_eq!(results.keys(), vec!["b2"]);
    }

    #[test]
    fn test_unknown_column_and_empty_query() {
        let (_, ds) = source(r#""Uid""#);
        assert!(ds.find(&[QueryPart::new("Nope", "x")], T).unwrap().is_empty());
        assert!(ds.find(&[], T).unwrap().is_empty());
        assert!(ds.find(&[QueryPart::new("Name", "")], T).unwrap().is_empty());
        assert!(ds.get_contents(T).unwrap().is_empty());
    }

    #[test]
    fn test_get_by_key_absolute_and_relative() {
        let (_, ds) = source(r#""Uid""#);
        assert_eq!(ds.get_datasets_by_key(&["b2".to_string()], T).unwrap().len(), 1);

        let (_, mixed) = source(r#""Uid" "Dept""#);
        let anna = mixed.find(&[QueryPart::new("Uid", "a1")], T).unwrap();
        let key = anna.get(0).unwrap().key().to_string();
        let found = mixed.get_datasets_by_key(&[key.clone()], T).unwrap();
        assert_eq!(found.keys(), vec![key]);

        let (_, relative) = source(r#""Dept""#);
        let found = relative.get_datasets_by_key(&["IT".to_string()], T).unwrap();
        assert_eq!(found.keys(), vec!["IT"]);
    }

    #[test]
    fn test_config_validation() {
        let client: Arc<dyn DirectoryClient> = Arc::new(tree());
        let bad_level = conf(r#"(DB_COLUMN "Name" PATH "x:cn")"#, r#""Name""#);
        assert!(DirectoryDatasource::from_conf(&bad_level, Arc::clone(&client)).is_err());
        let bad_key = conf(r#"(DB_COLUMN "Name" PATH "0:cn")"#, r#""Uid""#);
        assert!(DirectoryDatasource::from_conf(&bad_key, Arc::clone(&client)).is_err());
        let bad_base = ConfigNode::parse(
            "d",
            r#"NAME "p" URL "ldap://h" BASE_DN "o=Acme;x" OBJECT_CLASS "person"
               Columns((DB_COLUMN "Name" PATH "0:cn")) Schluessel("Name")"#,
        )
        .unwrap();
        assert!(DirectoryDatasource::from_conf(&bad_base, client).is_err());
    }

    #[test]
    fn test_last_schluessel_wins() {
        let desc = ConfigNode::parse(
            "d",
            &format!(
                r#"NAME "p" URL "ldap://h" BASE_DN "o=Acme" OBJECT_CLASS "person"
                   Columns({COLUMNS}) Schluessel("Name") Schluessel("Uid")"#
            ),
        )
        .unwrap();
        let ds = DirectoryDatasource::from_conf(&desc, Arc::new(tree())).unwrap();
        let found = ds.find(&[QueryPart::new("Name", "Anna")], T).unwrap();
        assert_eq!(found.keys(), vec!["a1"]);
    }
}
