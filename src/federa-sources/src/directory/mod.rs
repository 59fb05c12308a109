//! Directory-service source.
//!
//! Columns map to attributes at a path level relative to the matching
//! entry. The backend is reached through [`DirectoryClient`];
//! [`InMemoryDirectory`] implements it over an in-memory tree.

mod client;
mod datasource;
mod filter;
mod memory;
mod name;
mod paths;

pub use client::{
    ConnectionGuard, Credentials, DirEntry, DirectoryClient, DirectoryConnection, SearchScope,
};
pub use datasource::{ColumnDef, DirectoryDatasource};
pub use filter::{Filter, escape_value};
pub use memory::InMemoryDirectory;
pub use name::DirName;
pub use paths::{RelativePath, intersect_mixed, intersect_negative, intersect_positive};
