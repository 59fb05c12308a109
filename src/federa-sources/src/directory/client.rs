//! The narrow client contract the directory source is written against.

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::ops::{Deref, DerefMut};
use std::time::Duration;

use log::trace;

use common_error::FederaResult;

use super::filter::Filter;
use super::name::DirName;

/// How far below the base a search reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchScope {
    /// Only the base entry itself.
    Object,
    /// Direct children of the base.
    OneLevel,
    /// The base and all its descendants.
    Subtree,
}

/// A search hit: the absolute name and the entry's attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: DirName,
    pub attributes: BTreeMap<String, Vec<String>>,
}

impl DirEntry {
    /// First value of `attr`, compared case-insensitively.
    pub fn first_value(&self, attr: &str) -> Option<&str> {
        first_value(&self.attributes, attr)
    }
}

pub(crate) fn first_value<'a>(
    attributes: &'a BTreeMap<String, Vec<String>>,
    attr: &str,
) -> Option<&'a str> {
    attributes
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(attr))
        .and_then(|(_, values)| values.first())
        .map(String::as_str)
}

/// Login data passed to [`DirectoryClient::connect`].
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

impl Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}

/// An open connection. Only search and read are modeled.
pub trait DirectoryConnection: Send {
    /// Entries below `base` within `scope` that satisfy `filter`.
    fn search(
        &mut self,
        base: &DirName,
        filter: &Filter,
        scope: SearchScope,
        time_limit: Duration,
    ) -> FederaResult<Vec<DirEntry>>;

    /// The requested attributes of one entry, or `None` if it does not exist.
    fn read_attributes(
        &mut self,
        name: &DirName,
        attrs: &[String],
        time_limit: Duration,
    ) -> FederaResult<Option<BTreeMap<String, Vec<String>>>>;

    /// Release the connection. Called exactly once by [`ConnectionGuard`].
    fn close(&mut self) {}
}

/// Opens connections to one directory server.
pub trait DirectoryClient: Send + Sync + Debug {
    fn connect(
        &self,
        credentials: Option<&Credentials>,
        timeout: Duration,
    ) -> FederaResult<Box<dyn DirectoryConnection>>;
}

/// Closes the wrapped connection when dropped.
pub struct ConnectionGuard {
    conn: Box<dyn DirectoryConnection>,
}

impl ConnectionGuard {
    pub fn new(conn: Box<dyn DirectoryConnection>) -> Self {
        Self { conn }
    }
}

impl Deref for ConnectionGuard {
    type Target = dyn DirectoryConnection;

    fn deref(&self) -> &Self::Target {
        self.conn.as_ref()
    }
}

impl DerefMut for ConnectionGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn.as_mut()
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        trace!("closing directory connection");
        self.conn.close();
    }
}
