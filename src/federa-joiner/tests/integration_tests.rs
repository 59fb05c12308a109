//! Integration tests for federa-joiner
//!
//! Build catalogs from configuration files, run the joiner against them and
//! check the local override storage across refreshes and restarts.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use common_config::{CacheConfig, FederaConfig};
use common_error::{FederaError, FederaResult};
use federa_core::{ConfigNode, Dataset, Datasource, MapDataset, QueryPart, QueryResults, Schema};
use federa_joiner::{
    DatasourceCatalog, DatasourceJoiner, LocalOverrideStorage, SearchStrategy, has_data_changed,
    search, search_map,
};
use federa_sources::{MemoryDatasource, row};
use proptest::prelude::*;

const T: Duration = Duration::from_secs(5);

// ============================================================================
// Test Helpers
// ============================================================================

const PEOPLE: &str = r#"
Schema("id" "name" "room")
Schluessel("id")
Daten(
  ("1" "Anna" "101")
  ("2" "Bernd" "102")
)
"#;

const MAIN: &str = r#"
SENDER_SOURCE "people"
DATASOURCE_TIMEOUT "2000"
Datenquellen(
  Datenquelle(NAME "people" TYPE "conf" URL "people.conf")
  Datenquelle(NAME "labels" TYPE "schema" SOURCE "people" RENAME("name" "label"))
)
"#;

fn write_setup(dir: &Path, people: &str) {
    std::fs::write(dir.join("people.conf"), people).unwrap();
    std::fs::write(dir.join("main.conf"), MAIN).unwrap();
}

fn open(dir: &Path) -> DatasourceJoiner {
    let config = FederaConfig::default()
        .with_cache(CacheConfig::default().with_path(dir.join("cache").join("los.conf")));
    let conf = ConfigNode::from_file(&dir.join("main.conf")).unwrap();
    DatasourceJoiner::from_config(&config, DatasourceCatalog::builder().with_base_dir(dir), &conf).unwrap()
}

/// A main datasource whose backend never answers in time.
#[derive(Debug)]
struct SlowDatasource(Schema);

impl Datasource for SlowDatasource {
    fn name(&self) -> &str {
        "slow"
    }

    fn schema(&self) -> &Schema {
        &self.0
    }

    fn find(&self, _query: &[QueryPart], _timeout: Duration) -> FederaResult<QueryResults> {
        Err(FederaError::timeout("slow: no answer"))
    }

    fn get_datasets_by_key(&self, _keys: &[String], _timeout: Duration) -> FederaResult<QueryResults> {
        Err(FederaError::timeout("slow: no answer"))
    }

    fn get_contents(&self, _timeout: Duration) -> FederaResult<QueryResults> {
        Err(FederaError::timeout("slow: no answer"))
    }
}

fn backend(rows: &BTreeMap<String, String>) -> MemoryDatasource {
    MemoryDatasource::new("people", Schema::from_columns(["id", "name"]), ["id"])
        .unwrap()
        .with_rows(rows.iter().map(|(id, name)| row([("id", id.as_str()), ("name", name.as_str())])))
        .unwrap()
}

fn strategy() -> SearchStrategy {
    let conf = ConfigNode::parse(
        "Suchstrategie",
        r#"
        people(name "${word1}")
        labels(label "${word1}")
        ghost(name "${word1}")
        people(name "${word1}" room "${word2}")
        people()
        "#,
    )
    .unwrap();
    SearchStrategy::from_conf(&conf)
}

fn sorted_keys(results: &QueryResults) -> Vec<String> {
    let mut keys = results.keys();
    keys.sort();
    keys
}

// ============================================================================
// Lifecycle
// ============================================================================

#[test]
fn test_settings_come_from_configuration() {
    let dir = tempfile::tempdir().unwrap();
    write_setup(dir.path(), PEOPLE);
    let joiner = open(dir.path());

    assert_eq!(joiner.timeout(), Duration::from_millis(2000));
    assert_eq!(joiner.main_datasource().name(), "people");
    assert_eq!(joiner.main_datasource_schema().columns(), ["id", "name", "room"]);
    assert_eq!(joiner.catalog().names(), ["people", "labels"]);
    assert!(joiner.los().is_empty());
}

#[test]
fn test_edits_survive_restart_and_lost_records_are_reported() {
    let dir = tempfile::tempdir().unwrap();
    write_setup(dir.path(), PEOPLE);

    let mut joiner = open(dir.path());
    let anna = joiner.find("name", "Anna").unwrap();
    joiner.copy_to_los(anna.get(0).unwrap().as_ref()).unwrap();
    joiner.los_mut().selected_mut().unwrap().set("room", "999").unwrap();
    joiner.new_dataset().unwrap();
    joiner.save().unwrap();
    assert!(dir.path().join("cache").join("los.conf").is_file());

    // Anna left the backend.
    write_setup(dir.path(), "Schema(\"id\" \"name\" \"room\")\nSchluessel(\"id\")\nDaten((\"2\" \"Bernd\" \"102\"))");
    let joiner = open(dir.path());

    let lost: Vec<&str> = joiner.status().lost_datasets.iter().map(|ds| ds.key()).collect();
    assert_eq!(lost, ["1"]);
    assert_eq!(joiner.los().len(), 2);
    let selected = joiner.selected_dataset().unwrap();
    assert_eq!(selected.key(), "1");
    assert_eq!(selected.get("room").unwrap().as_deref(), Some("999"));
    assert_eq!(selected.get("name").unwrap().as_deref(), Some("Anna"));
    assert!(!joiner.los().record(1).unwrap().has_backing_store());
}

#[test]
fn test_refresh_replaces_cache_and_keeps_override() {
    let dir = tempfile::tempdir().unwrap();
    write_setup(dir.path(), PEOPLE);

    let mut joiner = open(dir.path());
    let bernd = joiner.find("id", "2").unwrap();
    joiner.copy_to_los(bernd.get(0).unwrap().as_ref()).unwrap();
    joiner.los_mut().selected_mut().unwrap().set("name", "Bernhard").unwrap();
    joiner.save().unwrap();

    write_setup(dir.path(), &PEOPLE.replace("\"102\"", "\"202\""));
    let joiner = open(dir.path());
    let record = joiner.selected_dataset().unwrap();
    assert_eq!(record.get("room").unwrap().as_deref(), Some("202"));
    assert_eq!(record.get("name").unwrap().as_deref(), Some("Bernhard"));
    assert!(record.differs_from_backing_store("name"));
    assert!(joiner.status().lost_datasets.is_empty());
}

#[test]
fn test_corrupt_cache_starts_empty() {
    let dir = tempfile::tempdir().unwrap();
    write_setup(dir.path(), PEOPLE);
    std::fs::create_dir_all(dir.path().join("cache")).unwrap();
    std::fs::write(
        dir.path().join("cache").join("los.conf"),
        r#"Schema("id") Daten((Key "1" Cache(id "1" shoe "42")))"#,
    )
    .unwrap();

    let joiner = open(dir.path());
    assert!(joiner.los().is_empty());
    assert_eq!(joiner.los().schema().unwrap().columns(), ["id", "name", "room"]);
}

#[test]
fn test_refresh_timeout_keeps_cached_data() {
    let schema = Schema::from_columns(["id", "name"]);
    let catalog = DatasourceCatalog::builder()
        .with_source(Arc::new(SlowDatasource(schema.clone())))
        .unwrap()
        .build(&ConfigNode::new("empty"))
        .unwrap();
    let mut los = LocalOverrideStorage::with_schema(schema);
    los.new_dataset().unwrap();

    let mut joiner = DatasourceJoiner::new(catalog, "slow", los, T).unwrap();
    assert_eq!(joiner.los().len(), 1);
    assert!(joiner.refresh().unwrap_err().is_timeout());
    assert_eq!(joiner.los().len(), 1);
}

#[test]
fn test_schema_comes_from_main_or_cache() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("los.conf");
    let source = backend(&BTreeMap::new());
    let catalog = DatasourceCatalog::builder()
        .with_source(Arc::new(source))
        .unwrap()
        .build(&ConfigNode::new("empty"))
        .unwrap();
    let joiner = DatasourceJoiner::new(catalog, "people", LocalOverrideStorage::new(), T).unwrap();
    // The refresh took the main schema, so there is something to save.
    joiner.save_cache_and_los(&path).unwrap();
    assert!(path.is_file());

    let catalog = DatasourceCatalog::builder().build(&ConfigNode::new("empty")).unwrap();
    let err = DatasourceJoiner::new(catalog, "people", LocalOverrideStorage::new(), T).unwrap_err();
    assert!(matches!(err, FederaError::ConfigurationError(_)));
}

// ============================================================================
// Search
// ============================================================================

#[test]
fn test_search_merges_templates_by_key() {
    let dir = tempfile::tempdir().unwrap();
    write_setup(dir.path(), PEOPLE);
    let joiner = open(dir.path());
    let strategy = strategy();

    // people and labels both find record 1; the ghost template fails alone.
    let results = search("Ann.", &strategy, &joiner).unwrap();
    assert_eq!(sorted_keys(&results), ["1"]);

    let results = search("bernd, 102", &strategy, &joiner).unwrap();
    assert_eq!(sorted_keys(&results), ["2"]);

    let results = search("  ", &strategy, &joiner).unwrap();
    assert_eq!(sorted_keys(&results), ["1", "2"]);

    // No template takes three words; two are used.
    let results = search("anna 101 extra", &strategy, &joiner).unwrap();
    assert_eq!(sorted_keys(&results), ["1"]);
}

#[test]
fn test_search_propagates_timeouts() {
    let schema = Schema::from_columns(["id", "name"]);
    let catalog = DatasourceCatalog::builder()
        .with_source(Arc::new(SlowDatasource(schema.clone())))
        .unwrap()
        .build(&ConfigNode::new("empty"))
        .unwrap();
    let joiner = DatasourceJoiner::new(catalog, "slow", LocalOverrideStorage::with_schema(schema), T).unwrap();
    let strategy = SearchStrategy::from_conf(&ConfigNode::parse("s", r#"slow(name "${word1}")"#).unwrap());

    let err = search("anna", &strategy, &joiner).unwrap_err();
    assert!(err.is_timeout());
}

#[test]
fn test_search_map_and_data_changes() {
    let dir = tempfile::tempdir().unwrap();
    write_setup(dir.path(), PEOPLE);
    let joiner = open(dir.path());

    let results = search_map([("name", "b*"), ("room", "10*")], &joiner).unwrap();
    assert_eq!(sorted_keys(&results), ["2"]);
    let original = results.get(0).unwrap();

    let schema = Arc::new(joiner.main_datasource_schema().clone());
    let edited = MapDataset::new(
        "2",
        HashMap::from([
            ("id".to_string(), "2".to_string()),
            ("name".to_string(), "Bernd".to_string()),
            ("room".to_string(), "303".to_string()),
        ]),
        Arc::clone(&schema),
    );
    assert!(has_data_changed(&edited, Some(original.as_ref()), &joiner).unwrap());
    assert!(!has_data_changed(original.as_ref(), Some(original.as_ref()), &joiner).unwrap());

    let blank = MapDataset::new("x", HashMap::new(), schema);
    assert!(!has_data_changed(&blank, None, &joiner).unwrap());
    assert!(has_data_changed(&edited, None, &joiner).unwrap());
}

// ============================================================================
// Property tests
// ============================================================================

/// Per key, the overrides of its records in storage order.
fn overrides_by_key(los: &LocalOverrideStorage) -> BTreeMap<String, Vec<Vec<(String, String)>>> {
    let mut map: BTreeMap<String, Vec<Vec<(String, String)>>> = BTreeMap::new();
    for record in los {
        let mut overrides: Vec<(String, String)> =
            record.overrides().iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        overrides.sort();
        map.entry(record.key().to_string()).or_default().push(overrides);
    }
    map
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Refresh keeps every override, reports vanished linked records once
    /// and restores the selection.
    #[test]
    fn prop_refresh_keeps_overrides_and_selection(
        before in prop::collection::btree_map("[a-f]", "[a-z]{1,4}", 1..6),
        copies in prop::collection::vec((0usize..6, prop::option::of("[A-Z]{1,3}")), 0..8),
        local in 0usize..3,
        keep in prop::collection::vec(any::<bool>(), 6),
        select in 0usize..16,
    ) {
        let old = backend(&before);
        let keys: Vec<&String> = before.keys().collect();
        let mut los = LocalOverrideStorage::with_schema(old.schema().clone());
        for (i, name) in &copies {
            let key = keys[i % keys.len()].clone();
            let found = old.get_datasets_by_key(&[key], T).unwrap();
            let index = los.copy_non_los_dataset(found.get(0).unwrap().as_ref()).unwrap();
            if let Some(name) = name {
                los.record_mut(index).unwrap().set("name", name.as_str()).unwrap();
            }
        }
        for _ in 0..local {
            los.new_dataset().unwrap();
        }
        if !los.is_empty() {
            los.select(select % los.len()).unwrap();
        }
        let selection = los.selected().ok().map(|r| (r.key().to_string(), los.selected_same_key_index().unwrap()));
        let overrides = overrides_by_key(&los);
        let len = los.len();

        let after: BTreeMap<String, String> = before
            .iter()
            .enumerate()
            .filter(|(i, _)| keep[*i])
            .map(|(_, (id, name))| (id.clone(), format!("{name}2")))
            .collect();
        let mut expected_lost: Vec<String> = los
            .iter()
            .filter(|r| r.has_backing_store() && !after.contains_key(r.key()))
            .map(|r| r.key().to_string())
            .collect();
        expected_lost.sort();

        let lost = los.refresh(&backend(&after), T).unwrap();
        let mut lost: Vec<String> = lost.iter().map(|ds| ds.key().to_string()).collect();
        lost.sort();

        prop_assert_eq!(lost, expected_lost);
        prop_assert_eq!(los.len(), len);
        prop_assert_eq!(overrides_by_key(&los), overrides);
        for record in &los {
            if let Some(name) = after.get(record.key()) {
                prop_assert_eq!(record.cache().unwrap().get("name"), Some(name));
            }
        }
        let restored = los.selected().ok().map(|r| (r.key().to_string(), los.selected_same_key_index().unwrap()));
        prop_assert_eq!(restored, selection);
    }
}
