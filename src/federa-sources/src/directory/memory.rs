//! A directory tree held in memory.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use log::trace;

use common_error::{FederaError, FederaResult};

use super::client::{Credentials, DirEntry, DirectoryClient, DirectoryConnection, SearchScope};
use super::filter::Filter;
use super::name::DirName;

type Attributes = BTreeMap<String, Vec<String>>;

#[derive(Debug, Default)]
struct Tree {
    entries: RwLock<BTreeMap<DirName, Attributes>>,
    open: AtomicUsize,
    searches: AtomicUsize,
    latency: RwLock<Duration>,
}

/// A [`DirectoryClient`] over an in-memory tree.
///
/// Clones share the same tree. Each search and read sleeps for the configured
/// latency and fails with `Timeout` when the latency exceeds its time limit.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDirectory {
    tree: Arc<Tree>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an entry. `name` uses the leaf-first textual form.
    pub fn add_entry(&self, name: &str, attributes: &[(&str, &str)]) -> &Self {
        let mut attrs: Attributes = BTreeMap::new();
        for (attr, value) in attributes {
            attrs.entry(attr.to_string()).or_default().push(value.to_string());
        }
        if let Ok(mut entries) = self.tree.entries.write() {
            entries.insert(DirName::parse(name), attrs);
        }
        self
    }

    /// Builder-style [`InMemoryDirectory::add_entry`].
    pub fn with_entry(self, name: &str, attributes: &[(&str, &str)]) -> Self {
        self.add_entry(name, attributes);
        self
    }

    /// Simulated round-trip time.
    pub fn set_latency(&self, latency: Duration) {
        if let Ok(mut current) = self.tree.latency.write() {
            *current = latency;
        }
    }

    /// Connections opened and not yet closed.
    pub fn open_connections(&self) -> usize {
        self.tree.open.load(Ordering::SeqCst)
    }

    /// Searches performed so far.
    pub fn search_count(&self) -> usize {
        self.tree.searches.load(Ordering::SeqCst)
    }
}

impl DirectoryClient for InMemoryDirectory {
    fn connect(
        &self,
        _credentials: Option<&Credentials>,
        _timeout: Duration,
    ) -> FederaResult<Box<dyn DirectoryConnection>> {
        self.tree.open.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryConnection {
            tree: Arc::clone(&self.tree),
            closed: false,
        }))
    }
}

struct MemoryConnection {
    tree: Arc<Tree>,
    closed: bool,
}

impl MemoryConnection {
    fn round_trip(&self, time_limit: Duration) -> FederaResult<()> {
        let latency = self
            .tree
            .latency
            .read()
            .map(|l| *l)
            .map_err(|_| FederaError::internal("directory latency lock poisoned"))?;
        if latency.is_zero() {
            return Ok(());
        }
        if latency > time_limit {
            std::thread::sleep(time_limit);
            return Err(FederaError::timeout(format!(
                "directory did not answer within {time_limit:?}"
            )));
        }
        std::thread::sleep(latency);
        Ok(())
    }
}

impl DirectoryConnection for MemoryConnection {
    fn search(
        &mut self,
        base: &DirName,
        filter: &Filter,
        scope: SearchScope,
        time_limit: Duration,
    ) -> FederaResult<Vec<DirEntry>> {
        trace!("search base={base} filter={filter} scope={scope:?}");
        self.tree.searches.fetch_add(1, Ordering::SeqCst);
        self.round_trip(time_limit)?;
        let entries = self
            .tree
            .entries
            .read()
            .map_err(|_| FederaError::internal("directory lock poisoned"))?;
        Ok(entries
            .iter()
            .filter(|(name, _)| match scope {
                SearchScope::Object => *name == base,
                SearchScope::OneLevel => name.len() == base.len() + 1 && name.starts_with(base),
                SearchScope::Subtree => name.starts_with(base),
            })
            .filter(|(_, attrs)| filter.evaluate(attrs))
            .map(|(name, attrs)| DirEntry {
                name: name.clone(),
                attributes: attrs.clone(),
            })
            .collect())
    }

    fn read_attributes(
        &mut self,
        name: &DirName,
        attrs: &[String],
        time_limit: Duration,
    ) -> FederaResult<Option<Attributes>> {
        trace!("read {name} {attrs:?}");
        self.round_trip(time_limit)?;
        let entries = self
            .tree
            .entries
            .read()
            .map_err(|_| FederaError::internal("directory lock poisoned"))?;
        Ok(entries.get(name).map(|all| {
            all.iter()
                .filter(|(attr, _)| attrs.iter().any(|a| a.eq_ignore_ascii_case(attr)))
                .map(|(attr, values)| (attr.clone(), values.clone()))
                .collect()
        }))
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.tree.open.fetch_sub(1, Ordering::SeqCst);
        }
    }
}
