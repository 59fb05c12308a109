//! Building the datasource graph from configuration.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, warn};

use common_config::DatasourceConfig;
use common_error::{FederaError, FederaResult};
use federa_combinators::{
    AttachDatasource, OverlayDatasource, PreferDatasource, SchemaTransformDatasource, SourceMap,
    UnionDatasource,
};
use federa_core::{ConfigNode, Datasource};
use federa_sources::{
    DirectoryClient, DirectoryDatasource, RowSetConnector, RowSetDatasource, TableDatasource,
};

/// Datasource types a `Datenquelle` section may name in `TYPE`.
pub const DATASOURCE_TYPES: &[&str] = &[
    "conf", "union", "attach", "overlay", "prefer", "schema", "ldap", "ooo", "sql",
];

/// Collects the backends and prebuilt sources a configuration refers to,
/// then builds the graph.
#[derive(Debug, Default)]
pub struct CatalogBuilder {
    directory_clients: HashMap<String, Arc<dyn DirectoryClient>>,
    rowset_connectors: HashMap<String, Arc<dyn RowSetConnector>>,
    base_dir: Option<PathBuf>,
    config: DatasourceConfig,
    sources: SourceMap,
    order: Vec<String>,
}

impl CatalogBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `ldap` sources whose `URL` is `url`.
    pub fn with_directory_client(mut self, url: impl Into<String>, client: Arc<dyn DirectoryClient>) -> Self {
        self.directory_clients.insert(url.into(), client);
        self
    }

    /// Serve `ooo`/`sql` sources whose `SOURCE` is `source`.
    pub fn with_rowset_connector(
        mut self,
        source: impl Into<String>,
        connector: Arc<dyn RowSetConnector>,
    ) -> Self {
        self.rowset_connectors.insert(source.into(), connector);
        self
    }

    /// Directory `conf` table URLs are relative to.
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    /// Settings applied before the configuration's own.
    pub fn with_config(mut self, config: DatasourceConfig) -> Self {
        self.config = config;
        self
    }

    /// Register a source built in code, such as an in-memory table.
    pub fn with_source(mut self, source: Arc<dyn Datasource>) -> FederaResult<Self> {
        self.insert(source)?;
        Ok(self)
    }

    fn insert(&mut self, source: Arc<dyn Datasource>) -> FederaResult<()> {
        let name = source.name().to_string();
        if self.sources.contains_key(&name) {
            return Err(FederaError::configuration(format!(
                "datasource \"{name}\" is defined twice"
            )));
        }
        self.order.push(name.clone());
        self.sources.insert(name, source);
        Ok(())
    }

    /// Build every `Datenquellen/Datenquelle` section in declaration order.
    ///
    /// A source may only refer to sources declared before it. The first
    /// failing section aborts the whole build.
    pub fn build(mut self, conf: &ConfigNode) -> FederaResult<DatasourceCatalog> {
        self.config = apply_settings(conf, self.config);
        for section in conf.query("Datenquellen") {
            for desc in section.query("Datenquelle") {
                let source = self.build_source(desc)?;
                debug!("built datasource {}", source.display());
                self.insert(source)?;
            }
        }
        Ok(DatasourceCatalog {
            sources: self.sources,
            order: self.order,
            config: self.config,
        })
    }

    fn build_source(&self, desc: &ConfigNode) -> FederaResult<Arc<dyn Datasource>> {
        let name = desc
            .get_string("NAME")
            .ok_or_else(|| FederaError::configuration("datasource without NAME"))?;
        let kind = desc.get_string("TYPE").ok_or_else(|| {
            FederaError::configuration(format!("datasource \"{name}\": TYPE is missing"))
        })?;
        let sources = &self.sources;
        let source: Arc<dyn Datasource> = match kind.as_str() {
            "conf" => Arc::new(TableDatasource::from_conf(desc, self.base_dir.as_deref())?),
            "union" => Arc::new(UnionDatasource::from_conf(desc, sources)?),
            "attach" => Arc::new(AttachDatasource::from_conf(desc, sources)?),
            "overlay" => Arc::new(OverlayDatasource::from_conf(desc, sources)?),
            "prefer" => Arc::new(PreferDatasource::from_conf(desc, sources)?),
            "schema" => Arc::new(SchemaTransformDatasource::from_conf(desc, sources)?),
            "ldap" => {
                let url = desc.get_string("URL").unwrap_or_default();
                let client = self.directory_clients.get(&url).ok_or_else(|| {
                    FederaError::configuration(format!(
                        "datasource \"{name}\": no directory client for \"{url}\""
                    ))
                })?;
                Arc::new(DirectoryDatasource::from_conf(desc, Arc::clone(client))?)
            }
            "ooo" | "sql" => {
                let source = desc.get_string("SOURCE").unwrap_or_default();
                let connector = self.rowset_connectors.get(&source).ok_or_else(|| {
                    FederaError::configuration(format!(
                        "datasource \"{name}\": no row-set connector for \"{source}\""
                    ))
                })?;
                Arc::new(RowSetDatasource::from_conf(
                    desc,
                    Arc::clone(connector),
                    self.config.timeout(),
                )?)
            }
            other => {
                return Err(FederaError::configuration(format!(
                    "datasource \"{name}\": unsupported TYPE \"{other}\", expected one of {}",
                    DATASOURCE_TYPES.join(", ")
                )));
            }
        };
        Ok(source)
    }
}

/// Overlay `SENDER_SOURCE` and `DATASOURCE_TIMEOUT` onto `config`.
///
/// The last top-level occurrence wins. A timeout that is not a positive
/// integer is ignored with a warning.
pub fn apply_settings(conf: &ConfigNode, mut config: DatasourceConfig) -> DatasourceConfig {
    let top_level = |key: &str| {
        conf.iter()
            .rev()
            .find(|node| node.name() == key)
            .map(ToString::to_string)
    };
    if let Some(main) = top_level("SENDER_SOURCE") {
        config.main_datasource = Some(main);
    }
    if let Some(timeout) = top_level("DATASOURCE_TIMEOUT") {
        match timeout.trim().parse::<u64>() {
            Ok(ms) if ms > 0 => config.timeout_ms = ms,
            Ok(_) => warn!("DATASOURCE_TIMEOUT must be greater than 0"),
            Err(_) => warn!("DATASOURCE_TIMEOUT must be an integer, got \"{timeout}\""),
        }
    }
    config
}

/// All datasources of a configuration, by name.
#[derive(Debug)]
pub struct DatasourceCatalog {
    sources: SourceMap,
    order: Vec<String>,
    config: DatasourceConfig,
}

impl DatasourceCatalog {
    pub fn builder() -> CatalogBuilder {
        CatalogBuilder::new()
    }

    /// Read the configuration file at `path` and build it, resolving
    /// `conf` tables against the file's directory unless a base directory
    /// is set.
    pub fn from_file(path: &Path, mut builder: CatalogBuilder) -> FederaResult<Self> {
        let conf = ConfigNode::from_file(path)?;
        if builder.base_dir.is_none() {
            builder.base_dir = path.parent().map(Path::to_path_buf);
        }
        builder.build(&conf)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Datasource>> {
        self.sources.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.sources.contains_key(name)
    }

    /// Names in declaration order.
    pub fn names(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// The datasource settings after applying the configuration.
    pub fn config(&self) -> &DatasourceConfig {
        &self.config
    }

    /// Add a source after the build. Names stay unique.
    pub fn insert(&mut self, source: Arc<dyn Datasource>) -> FederaResult<()> {
        let name = source.name().to_string();
        if self.sources.contains_key(&name) {
            return Err(FederaError::configuration(format!(
                "datasource \"{name}\" is defined twice"
            )));
        }
        self.order.push(name.clone());
        self.sources.insert(name, source);
        Ok(())
    }

    /// Indented plans of all sources in declaration order.
    pub fn explain(&self) -> String {
        self.order
            .iter()
            .filter_map(|name| self.sources.get(name))
            .map(|source| source.explain(0))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use federa_core::Schema;
    use federa_sources::{InMemoryDirectory, MemoryDatasource, row};

    fn people() -> Arc<dyn Datasource> {
        let ds = MemoryDatasource::new("people", Schema::from_columns(["id", "name"]), ["id"])
            .unwrap()
            .with_rows([row([("id", "1"), ("name", "A")])])
            .unwrap();
        Arc::new(ds)
    }

    #[test]
    fn test_settings_overlay() {
        let conf = ConfigNode::parse(
            "conf",
            r#"SENDER_SOURCE "old" SENDER_SOURCE "main" DATASOURCE_TIMEOUT "2500""#,
        )
        .unwrap();
        let config = apply_settings(&conf, DatasourceConfig::default());
        assert_eq!(config.main_datasource.as_deref(), Some("main"));
        assert_eq!(config.timeout_ms, 2500);

        let conf = ConfigNode::parse("conf", r#"DATASOURCE_TIMEOUT "-5""#).unwrap();
        assert_eq!(apply_settings(&conf, DatasourceConfig::default()).timeout_ms, 10_000);
    }

    #[test]
    fn test_builds_in_declaration_order() {
        let conf = ConfigNode::parse(
            "conf",
            r#"
            Datenquellen(
              Datenquelle(NAME "renamed" TYPE "schema" SOURCE "people" RENAME("name" "label"))
              Datenquelle(NAME "both" TYPE "union" SOURCE1 "people" SOURCE2 "people")
            )
            "#,
        )
        .unwrap();
        let catalog = DatasourceCatalog::builder()
            .with_source(people())
            .unwrap()
            .build(&conf)
            .unwrap();
        assert_eq!(catalog.names(), ["people", "renamed", "both"]);
        assert!(catalog.get("renamed").unwrap().schema().contains("label"));
        assert!(catalog.explain().contains("Union(both)"));
    }

    #[test]
    fn test_build_fails_fast() {
        let cases = [
            r#"Datenquellen(Datenquelle(NAME "x" TYPE "funky"))"#,
            r#"Datenquellen(Datenquelle(NAME "x" TYPE "union" SOURCE1 "people" SOURCE2 "later"))"#,
            r#"Datenquellen(Datenquelle(NAME "people" TYPE "schema" SOURCE "people"))"#,
            r#"Datenquellen(Datenquelle(TYPE "schema" SOURCE "people"))"#,
            r#"Datenquellen(Datenquelle(NAME "d" TYPE "ldap" URL "ldap://nowhere"))"#,
        ];
        for text in cases {
            let conf = ConfigNode::parse("conf", text).unwrap();
            let result = DatasourceCatalog::builder().with_source(people()).unwrap().build(&conf);
            assert!(matches!(result, Err(FederaError::ConfigurationError(_))), "{text}");
        }
    }

    #[test]
    fn test_directory_client_by_url() {
        let dir = InMemoryDirectory::new()
            .with_entry("o=Acme", &[("objectClass", "organization")])
            .with_entry("uid=a,o=Acme", &[("objectClass", "person"), ("uid", "a"), ("cn", "Anna")]);
        let conf = ConfigNode::parse(
            "conf",
            r#"Datenquellen(Datenquelle(
                NAME "ldap" TYPE "ldap" URL "ldap://dir.example" BASE_DN "o=Acme"
                OBJECT_CLASS "person"
                Columns((DB_COLUMN "Uid" PATH "0:uid") (DB_COLUMN "Name" PATH "0:cn"))
                Schluessel("Uid")
            ))"#,
        )
        .unwrap();
        let catalog = DatasourceCatalog::builder()
            .with_directory_client("ldap://dir.example", Arc::new(dir))
            .build(&conf)
            .unwrap();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.get("ldap").unwrap().schema().columns(), ["Uid", "Name"]);
    }
}
