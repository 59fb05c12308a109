//! Local override storage.
//!
//! The storage keeps a working set of records. A record either carries a
//! cache of the values last read from the main datasource (it is *linked*)
//! or exists only locally. Local edits live in a separate override map and
//! survive [`LocalOverrideStorage::refresh`], which replaces the caches.
//!
//! The storage is single-session state and is not synchronized.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use log::{debug, error, info, warn};

use common_error::{FederaError, FederaResult};
use federa_core::{ConfigNode, Dataset, Datasource, Schema};

/// Key prefix of records created with [`LocalOverrideStorage::new_dataset`].
pub const LOS_ONLY_PREFIX: &str = "LOS_ONLY_";

// ============================================================================
// LosRecord
// ============================================================================

/// A record of the local override storage.
///
/// Overrides take precedence over the cache. Copies of a record share its
/// cache but not its overrides.
#[derive(Debug, Clone)]
pub struct LosRecord {
    key: String,
    cache: Option<Arc<HashMap<String, String>>>,
    overrides: HashMap<String, String>,
    schema: Arc<Schema>,
}

impl LosRecord {
    fn new(
        key: impl Into<String>,
        cache: Option<Arc<HashMap<String, String>>>,
        overrides: HashMap<String, String>,
        schema: Arc<Schema>,
    ) -> Self {
        Self {
            key: key.into(),
            cache,
            overrides,
            schema,
        }
    }

    /// Whether the record is linked to the main datasource.
    pub fn has_backing_store(&self) -> bool {
        self.cache.is_some()
    }

    /// Values last read from the main datasource.
    pub fn cache(&self) -> Option<&HashMap<String, String>> {
        self.cache.as_deref()
    }

    pub fn overrides(&self) -> &HashMap<String, String> {
        &self.overrides
    }

    fn check_column(&self, column: &str) -> FederaResult<()> {
        if self.schema.contains(column) {
            Ok(())
        } else {
            Err(FederaError::column_not_found(format!(
                "column \"{column}\" does not exist"
            )))
        }
    }

    /// Whether `column` is edited locally. Every column of an unlinked
    /// record counts as edited.
    pub fn has_local_override(&self, column: &str) -> FederaResult<bool> {
        self.check_column(column)?;
        Ok(!self.has_backing_store() || self.overrides.contains_key(column))
    }

    /// Override `column` with `value`.
    pub fn set(&mut self, column: &str, value: impl Into<String>) -> FederaResult<()> {
        self.check_column(column)?;
        self.overrides.insert(column.to_string(), value.into());
        Ok(())
    }

    /// Drop the override of `column` so the cached value shows again.
    pub fn discard_local_override(&mut self, column: &str) -> FederaResult<()> {
        self.check_column(column)?;
        if !self.has_backing_store() {
            return Err(FederaError::no_backing_store(format!(
                "record \"{}\" is not linked to a backing store",
                self.key
            )));
        }
        self.overrides.remove(column);
        Ok(())
    }

    /// Whether the override of `column` hides a different cached value.
    ///
    /// An empty override only counts when the cache holds a non-empty value.
    pub fn differs_from_backing_store(&self, column: &str) -> bool {
        let Some(cache) = &self.cache else {
            return false;
        };
        let cached = cache.get(column).map(String::as_str);
        match self.overrides.get(column).map(String::as_str) {
            None => false,
            Some("") => cached.is_some_and(|v| !v.is_empty()),
            Some(value) => cached != Some(value),
        }
    }

    fn drop_column(&mut self, column: &str) {
        self.overrides.remove(column);
        if let Some(cache) = &mut self.cache {
            Arc::make_mut(cache).remove(column);
        }
    }

    fn snapshot(&self) -> Arc<dyn Dataset> {
        Arc::new(self.clone())
    }
}

impl Dataset for LosRecord {
    fn get(&self, column: &str) -> FederaResult<Option<String>> {
        self.check_column(column)?;
        if let Some(value) = self.overrides.get(column) {
            return Ok(Some(value.clone()));
        }
        Ok(self.cache.as_ref().and_then(|cache| cache.get(column).cloned()))
    }

    fn key(&self) -> &str {
        &self.key
    }
}

// ============================================================================
// LocalOverrideStorage
// ============================================================================

/// The selectable working set of records.
///
/// Records are addressed by their position. Whenever the storage is not
/// empty exactly one record is selected.
#[derive(Debug)]
pub struct LocalOverrideStorage {
    schema: Option<Arc<Schema>>,
    records: Vec<LosRecord>,
    selected: Option<usize>,
    next_generated_key: u128,
}

impl Default for LocalOverrideStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalOverrideStorage {
    /// An empty storage without schema. The schema is taken from the main
    /// datasource on the first refresh.
    pub fn new() -> Self {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        Self {
            schema: None,
            records: Vec::new(),
            selected: None,
            next_generated_key: seed,
        }
    }

    /// An empty storage with a schema.
    pub fn with_schema(schema: Schema) -> Self {
        let mut los = Self::new();
        los.schema = Some(Arc::new(schema));
        los
    }

    /// Restore a storage from a snapshot written by [`Self::to_conf`].
    ///
    /// Any record naming a column outside the `Schema` section makes the
    /// whole snapshot invalid.
    pub fn from_conf(conf: &ConfigNode) -> FederaResult<Self> {
        let schema_node = child(conf, "Schema")
            .ok_or_else(|| FederaError::node_not_found("snapshot has no Schema section"))?;
        let schema = Arc::new(Schema::from_columns(schema_node.iter().map(ToString::to_string)));

        let mut records = Vec::new();
        if let Some(data) = child(conf, "Daten") {
            for desc in data {
                records.push(parse_record(desc, &schema)?);
            }
        }

        let mut los = Self::new();
        los.schema = Some(schema);
        los.records = records;
        match child(conf, "Ausgewaehlt") {
            Some(selection) if !selection.is_leaf() => {
                let key = selection.first_child()?.to_string();
                let index = selection.last_child()?.to_string().parse().unwrap_or(0);
                los.select_dataset(&key, index);
            }
            _ => los.select_dataset("", 0),
        }
        Ok(los)
    }

    /// Load the snapshot at `path`.
    ///
    /// A missing file yields an empty storage. So does an unreadable or
    /// corrupt one, which is logged and otherwise ignored.
    pub fn load(path: &Path) -> Self {
        if !path.is_file() {
            info!("cache file {} cannot be read, starting empty", path.display());
            return Self::new();
        }
        match ConfigNode::from_file(path).and_then(|conf| Self::from_conf(&conf)) {
            Ok(los) => {
                debug!("loaded {} records from {}", los.len(), path.display());
                los
            }
            Err(e) => {
                error!("{} is corrupt, ignoring the cache: {e}", path.display());
                Self::new()
            }
        }
    }

    /// The snapshot of this storage, or `None` while it has no schema.
    pub fn to_conf(&self) -> Option<ConfigNode> {
        let schema = self.schema.as_ref()?;
        let mut conf = ConfigNode::new("LOS");
        let schema_node = conf.add("Schema");
        for column in schema.iter() {
            schema_node.add(column);
        }
        if !self.records.is_empty() {
            self.dump_data(conf.add("Daten"));
        }
        if let (Ok(record), Ok(index)) = (self.selected(), self.selected_same_key_index()) {
            let selection = conf.add("Ausgewaehlt");
            selection.add(record.key());
            selection.add(index.to_string());
        }
        Some(conf)
    }

    /// Append one unnamed block per record to `data`.
    pub fn dump_data(&self, data: &mut ConfigNode) {
        for record in &self.records {
            let node = data.add("");
            node.add("Key").add(record.key());
            if let Some(cache) = &record.cache {
                let cache_node = node.add("Cache");
                for column in record.schema.iter() {
                    if let Some(value) = cache.get(column) {
                        cache_node.add(column).add(value);
                    }
                }
            }
            let override_node = node.add("Override");
            for column in record.schema.iter() {
                if let Some(value) = record.overrides.get(column) {
                    override_node.add(column).add(value);
                }
            }
        }
    }

    pub fn schema(&self) -> Option<&Schema> {
        self.schema.as_deref()
    }

    /// Adapt to a new schema: keep the known column order, append new
    /// columns and drop vanished ones from every record.
    pub fn set_schema(&mut self, schema: &Schema) {
        let Some(current) = &self.schema else {
            self.schema = Some(Arc::new(schema.clone()));
            return;
        };
        let added: Vec<&str> = schema.iter().filter(|c| !current.contains(c)).collect();
        let dropped: Vec<String> = current.missing_from(schema);
        if added.is_empty() && dropped.is_empty() {
            return;
        }
        info!(
            "schema changed ({} columns added, {} dropped), adapting the cache",
            added.len(),
            dropped.len()
        );
        let mut merged = Schema::new();
        for column in current.iter().filter(|c| schema.contains(c)) {
            merged.add(column);
        }
        for column in added {
            merged.add(column);
        }
        let merged = Arc::new(merged);
        for record in &mut self.records {
            for column in &dropped {
                record.drop_column(column);
            }
            record.schema = Arc::clone(&merged);
        }
        self.schema = Some(merged);
    }

    fn require_schema(&self) -> FederaResult<Arc<Schema>> {
        self.schema
            .clone()
            .ok_or_else(|| FederaError::configuration("local override storage has no schema"))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[LosRecord] {
        &self.records
    }

    pub fn iter(&self) -> std::slice::Iter<'_, LosRecord> {
        self.records.iter()
    }

    pub fn record(&self, index: usize) -> Option<&LosRecord> {
        self.records.get(index)
    }

    pub fn record_mut(&mut self, index: usize) -> Option<&mut LosRecord> {
        self.records.get_mut(index)
    }

    fn check_index(&self, index: usize) -> FederaResult<()> {
        if index < self.records.len() {
            Ok(())
        } else {
            Err(FederaError::dataset_not_found(format!(
                "no record at position {index}, the storage holds {}",
                self.records.len()
            )))
        }
    }

    // ------------------------------------------------------------------------
    // Selection
    // ------------------------------------------------------------------------

    /// Select the `same_key_index`-th record with `key`, or the last one with
    /// that key if there are fewer. Without any record of that key the first
    /// record is selected.
    pub fn select_dataset(&mut self, key: &str, same_key_index: usize) {
        self.selected = if self.records.is_empty() { None } else { Some(0) };
        let mut remaining = same_key_index;
        for (index, record) in self.records.iter().enumerate() {
            if record.key == key {
                self.selected = Some(index);
                if remaining == 0 {
                    return;
                }
                remaining -= 1;
            }
        }
    }

    pub fn select(&mut self, index: usize) -> FederaResult<()> {
        self.check_index(index)?;
        self.selected = Some(index);
        Ok(())
    }

    pub fn is_selected(&self, index: usize) -> bool {
        self.selected == Some(index)
    }

    pub fn selected_index(&self) -> Option<usize> {
        self.selected
    }

    /// The selected record; `DatasetNotFound` while the storage is empty.
    pub fn selected(&self) -> FederaResult<&LosRecord> {
        self.selected
            .and_then(|index| self.records.get(index))
            .ok_or_else(|| FederaError::dataset_not_found("the local override storage is empty"))
    }

    pub fn selected_mut(&mut self) -> FederaResult<&mut LosRecord> {
        self.selected
            .and_then(|index| self.records.get_mut(index))
            .ok_or_else(|| FederaError::dataset_not_found("the local override storage is empty"))
    }

    /// How many records before the selected one share its key.
    pub fn selected_same_key_index(&self) -> FederaResult<usize> {
        let record = self.selected()?;
        let selected = self.selected.unwrap_or_default();
        Ok(self.records[..selected]
            .iter()
            .filter(|r| r.key == record.key)
            .count())
    }

    fn selection(&self) -> Option<(String, usize)> {
        let record = self.selected().ok()?;
        let index = self.selected_same_key_index().ok()?;
        Some((record.key.clone(), index))
    }

    fn push(&mut self, record: LosRecord) -> usize {
        self.records.push(record);
        let index = self.records.len() - 1;
        if self.selected.is_none() {
            self.selected = Some(index);
        }
        index
    }

    // ------------------------------------------------------------------------
    // Creating and removing records
    // ------------------------------------------------------------------------

    /// Add an unlinked record whose values are the column names.
    pub fn new_dataset(&mut self) -> FederaResult<usize> {
        let schema = self.require_schema()?;
        let overrides = schema.iter().map(|c| (c.to_string(), c.to_string())).collect();
        let key = format!("{LOS_ONLY_PREFIX}{}", self.next_generated_key);
        self.next_generated_key += 1;
        Ok(self.push(LosRecord::new(key, None, overrides, schema)))
    }

    /// Add a linked copy of a record from a datasource.
    pub fn copy_non_los_dataset(&mut self, ds: &dyn Dataset) -> FederaResult<usize> {
        let schema = self.require_schema()?;
        let mut cache = HashMap::new();
        for column in schema.iter() {
            match ds.get(column) {
                Ok(Some(value)) => {
                    cache.insert(column.to_string(), value);
                }
                Ok(None) => {}
                Err(e) => warn!("copying record \"{}\": {e}", ds.key()),
            }
        }
        let record = LosRecord::new(ds.key(), Some(Arc::new(cache)), HashMap::new(), schema);
        Ok(self.push(record))
    }

    /// Duplicate a record. The copy shares the cache and starts with the
    /// same overrides.
    pub fn copy(&mut self, index: usize) -> FederaResult<usize> {
        self.check_index(index)?;
        let record = self.records[index].clone();
        Ok(self.push(record))
    }

    /// Remove a record. Removing the selected one selects the first.
    pub fn remove(&mut self, index: usize) -> FederaResult<LosRecord> {
        self.check_index(index)?;
        let record = self.records.remove(index);
        self.selected = match self.selected {
            _ if self.records.is_empty() => None,
            Some(selected) if selected == index => Some(0),
            Some(selected) if selected > index => Some(selected - 1),
            other => other,
        };
        Ok(record)
    }

    // ------------------------------------------------------------------------
    // Refresh
    // ------------------------------------------------------------------------

    /// Re-read every linked key from `source` and rebuild the caches.
    ///
    /// Overrides survive. Records whose key is no longer found keep their
    /// last cache; the linked ones among them are returned as lost. If the
    /// lookup fails the storage is left as it was.
    pub fn refresh(&mut self, source: &dyn Datasource, timeout: Duration) -> FederaResult<Vec<Arc<dyn Dataset>>> {
        let mut keys = Vec::new();
        let mut seen = HashSet::new();
        for record in &self.records {
            if seen.insert(record.key.as_str()) {
                keys.push(record.key.clone());
            }
        }
        let fetched = source.get_datasets_by_key(&keys, timeout)?;
        debug!("refresh: {} keys, {} records from {}", keys.len(), fetched.len(), source.name());

        let selection = self.selection();
        self.set_schema(source.schema());
        let schema = self.require_schema()?;

        let mut by_key: HashMap<String, Vec<LosRecord>> = HashMap::new();
        for record in std::mem::take(&mut self.records) {
            by_key.entry(record.key.clone()).or_default().push(record);
        }

        let mut records = Vec::with_capacity(fetched.len());
        for ds in &fetched {
            let mut cache = HashMap::new();
            for column in schema.iter() {
                match ds.get(column) {
                    Ok(Some(value)) => {
                        cache.insert(column.to_string(), value);
                    }
                    Ok(None) => {}
                    Err(e) => warn!("refresh of \"{}\": {e}", ds.key()),
                }
            }
            let cache = Some(Arc::new(cache));
            match by_key.remove(ds.key()) {
                Some(previous) => {
                    for old in previous {
                        records.push(LosRecord::new(ds.key(), cache.clone(), old.overrides, Arc::clone(&schema)));
                    }
                }
                None => records.push(LosRecord::new(ds.key(), cache, HashMap::new(), Arc::clone(&schema))),
            }
        }

        let mut lost = Vec::new();
        for key in &keys {
            for record in by_key.remove(key).unwrap_or_default() {
                if record.has_backing_store() {
                    lost.push(record.snapshot());
                }
                records.push(record);
            }
        }
        if !lost.is_empty() {
            let keys: Vec<&str> = lost.iter().map(|ds| ds.key()).collect();
            warn!("records could not be refreshed from {}: {}", source.name(), keys.join(", "));
        }
        info!("refreshed {} records from {}, {} lost", records.len(), source.name(), lost.len());

        self.records = records;
        match selection {
            Some((key, index)) => self.select_dataset(&key, index),
            None => self.select_dataset("", 0),
        }
        Ok(lost)
    }
}

impl<'a> IntoIterator for &'a LocalOverrideStorage {
    type Item = &'a LosRecord;
    type IntoIter = std::slice::Iter<'a, LosRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

fn child<'a>(node: &'a ConfigNode, name: &str) -> Option<&'a ConfigNode> {
    node.iter().find(|c| c.name() == name)
}

fn parse_values(node: &ConfigNode, schema: &Schema, key: &str) -> FederaResult<HashMap<String, String>> {
    let mut values = HashMap::new();
    for column in node {
        if !schema.contains(column.name()) {
            return Err(FederaError::value_error(format!(
                "corrupt record \"{key}\": column \"{}\" is not in the schema",
                column.name()
            )));
        }
        values.insert(column.name().to_string(), column.to_string());
    }
    Ok(values)
}

fn parse_record(desc: &ConfigNode, schema: &Arc<Schema>) -> FederaResult<LosRecord> {
    let key = child(desc, "Key")
        .ok_or_else(|| FederaError::node_not_found("record without Key"))?
        .to_string();
    let cache = match child(desc, "Cache") {
        Some(node) => Some(Arc::new(parse_values(node, schema, &key)?)),
        None => None,
    };
    let overrides = match child(desc, "Override") {
        Some(node) => parse_values(node, schema, &key)?,
        None => HashMap::new(),
    };
    Ok(LosRecord::new(key, cache, overrides, Arc::clone(schema)))
}
