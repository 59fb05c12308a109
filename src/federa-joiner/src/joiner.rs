//! The single entry point for querying the configured datasources and
//! editing the local override storage.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};

use common_config::FederaConfig;
use common_error::{FederaError, FederaResult};
use federa_core::{
    ConfigNode, Dataset, Datasource, EmptyDatasource, Query, QueryPart, QueryResults, Schema,
    is_valid_search_string,
};

use crate::catalog::{CatalogBuilder, DatasourceCatalog};
use crate::los::{LocalOverrideStorage, LosRecord};
use crate::transformer::ColumnTransformer;

/// Outcome of the last refresh.
#[derive(Debug, Clone, Default)]
pub struct Status {
    /// Linked records whose key the main datasource no longer returned.
    pub lost_datasets: Vec<Arc<dyn Dataset>>,
}

/// Joins a catalog of datasources with the local override storage.
#[derive(Debug)]
pub struct DatasourceJoiner {
    catalog: DatasourceCatalog,
    main: Arc<dyn Datasource>,
    los: LocalOverrideStorage,
    timeout: Duration,
    transformer: Option<ColumnTransformer>,
    status: Status,
    cache_path: Option<PathBuf>,
}

impl DatasourceJoiner {
    /// Create a joiner around the source named `main`.
    ///
    /// If `main` is configured the storage is refreshed from it; a refresh
    /// timeout only costs freshness. If `main` is not configured, an empty
    /// stand-in with the storage's schema takes its place so cached data
    /// stays usable. Without a cached schema this is a configuration error.
    pub fn new(
        mut catalog: DatasourceCatalog,
        main: &str,
        mut los: LocalOverrideStorage,
        timeout: Duration,
    ) -> FederaResult<Self> {
        let mut status = Status::default();
        let source = match catalog.get(main) {
            Some(source) => {
                let source = Arc::clone(source);
                match los.refresh(source.as_ref(), timeout) {
                    Ok(lost) => status.lost_datasets = lost,
                    Err(e) if e.is_timeout() => {
                        warn!("refresh from \"{main}\" timed out, working with cached data: {e}")
                    }
                    Err(e) => return Err(e),
                }
                source
            }
            None => {
                let schema = los.schema().cloned().ok_or_else(|| {
                    FederaError::configuration(format!(
                        "main datasource \"{main}\" is not defined and no cached schema exists"
                    ))
                })?;
                warn!("main datasource \"{main}\" is not defined, using cached data only");
                let source: Arc<dyn Datasource> = Arc::new(EmptyDatasource::new(main, schema));
                catalog.insert(Arc::clone(&source))?;
                source
            }
        };
        Ok(Self {
            catalog,
            main: source,
            los,
            timeout,
            transformer: None,
            status,
            cache_path: None,
        })
    }

    /// Build the catalog from `conf`, load the snapshot named by
    /// `config.cache.path` and join them.
    ///
    /// Settings in `conf` override `config.datasource`.
    pub fn from_config(config: &FederaConfig, builder: CatalogBuilder, conf: &ConfigNode) -> FederaResult<Self> {
        let catalog = builder.with_config(config.datasource.clone()).build(conf)?;
        let timeout = catalog.config().timeout();
        let main = catalog
            .config()
            .main_datasource
            .clone()
            .ok_or_else(|| FederaError::configuration("no main datasource configured"))?;
        let los = match &config.cache.path {
            Some(path) => LocalOverrideStorage::load(path),
            None => LocalOverrideStorage::new(),
        };
        let mut joiner = Self::new(catalog, &main, los, timeout)?;
        joiner.cache_path = config.cache.path.clone();
        Ok(joiner)
    }

    pub fn catalog(&self) -> &DatasourceCatalog {
        &self.catalog
    }

    pub fn main_datasource(&self) -> &Arc<dyn Datasource> {
        &self.main
    }

    pub fn main_datasource_schema(&self) -> &Schema {
        self.main.schema()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn los(&self) -> &LocalOverrideStorage {
        &self.los
    }

    pub fn los_mut(&mut self) -> &mut LocalOverrideStorage {
        &mut self.los
    }

    pub fn set_transformer(&mut self, transformer: ColumnTransformer) {
        self.transformer = Some(transformer);
    }

    pub fn transformer(&self) -> Option<&ColumnTransformer> {
        self.transformer.as_ref()
    }

    /// Lost records reported by the last refresh.
    pub fn status(&self) -> &Status {
        &self.status
    }

    /// Refresh the storage from the main datasource.
    pub fn refresh(&mut self) -> FederaResult<&Status> {
        let lost = self.los.refresh(self.main.as_ref(), self.timeout)?;
        self.status = Status { lost_datasets: lost };
        Ok(&self.status)
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    fn check_parts(parts: &[QueryPart]) -> FederaResult<()> {
        for part in parts {
            if !is_valid_search_string(part.pattern()) {
                return Err(FederaError::value_error(format!(
                    "invalid search string \"{}\" for column \"{}\"",
                    part.pattern(),
                    part.column()
                )));
            }
        }
        Ok(())
    }

    /// Records of the main datasource whose `column` matches `pattern`.
    ///
    /// Results are not stored; pass one to [`Self::copy_to_los`] to keep and
    /// edit it.
    pub fn find(&self, column: &str, pattern: &str) -> FederaResult<QueryResults> {
        self.find_parts(&[QueryPart::new(column, pattern)])
    }

    /// Records of the main datasource matching all `parts`. See [`Self::find`].
    pub fn find_parts(&self, parts: &[QueryPart]) -> FederaResult<QueryResults> {
        Self::check_parts(parts)?;
        debug!("find in main datasource \"{}\": {} parts", self.main.name(), parts.len());
        self.main.find(parts, self.timeout)
    }

    /// Run `query` against the datasource it names.
    pub fn find_query(&self, query: &Query) -> FederaResult<QueryResults> {
        Self::check_parts(query.parts())?;
        let source = self.source(query.datasource())?;
        debug!("find {query}");
        source.find(query.parts(), self.timeout)
    }

    /// Every record of the datasource `name`, if it supports listing.
    ///
    /// Like [`Self::find`], this leaves the storage untouched; records reach
    /// it through [`Self::copy_to_los`].
    pub fn contents_of(&self, name: &str) -> FederaResult<QueryResults> {
        self.source(name)?.get_contents(self.timeout)
    }

    /// See [`Self::contents_of`].
    pub fn contents_of_main_datasource(&self) -> FederaResult<QueryResults> {
        self.main.get_contents(self.timeout)
    }

    fn source(&self, name: &str) -> FederaResult<&Arc<dyn Datasource>> {
        self.catalog
            .get(name)
            .ok_or_else(|| FederaError::unknown_datasource(format!("datasource \"{name}\" is not defined")))
    }

    // ------------------------------------------------------------------------
    // Local override storage
    // ------------------------------------------------------------------------

    pub fn selected_dataset(&self) -> FederaResult<&LosRecord> {
        self.los.selected()
    }

    /// A snapshot of the selected record, read through the transformer if
    /// one is set.
    pub fn selected_dataset_transformed(&self) -> FederaResult<Arc<dyn Dataset>> {
        let record: Arc<dyn Dataset> = Arc::new(self.los.selected()?.clone());
        Ok(match &self.transformer {
            Some(transformer) => transformer.transform(record),
            None => record,
        })
    }

    /// Add a local-only record; returns its position.
    pub fn new_dataset(&mut self) -> FederaResult<usize> {
        self.los.new_dataset()
    }

    /// Copy a query result into the storage as a linked record and select it.
    ///
    /// This is the only way results of [`Self::find`] or [`Self::contents_of`]
    /// enter the storage.
    pub fn copy_to_los(&mut self, ds: &dyn Dataset) -> FederaResult<usize> {
        self.los.copy_non_los_dataset(ds)
    }

    /// Write the storage snapshot to `path`.
    ///
    /// A storage without schema has nothing worth saving; that is logged and
    /// nothing is written.
    pub fn save_cache_and_los(&self, path: &Path) -> FederaResult<()> {
        let Some(conf) = self.los.to_conf() else {
            error!("no schema known, not writing {}", path.display());
            return Ok(());
        };
        if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(path, conf.to_conf_string())?;
        info!("saved {} records to {}", self.los.len(), path.display());
        Ok(())
    }

    /// Save to the snapshot path the joiner was configured with, if any.
    pub fn save(&self) -> FederaResult<()> {
        match &self.cache_path {
            Some(path) => self.save_cache_and_los(path),
            None => Ok(()),
        }
    }
}
