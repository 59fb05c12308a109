//! Leaf datasources for Federa.
//!
//! - [`MemoryDatasource`]: rows held in memory
//! - [`TableDatasource`]: a table file in the nested configuration format
//! - [`directory::DirectoryDatasource`]: a hierarchical directory service
//! - [`rowset::RowSetDatasource`]: a table of an SQL-style backend

pub mod config;
pub mod directory;
pub mod memory;
pub mod rowset;
pub mod table;

pub use directory::{DirectoryClient, DirectoryDatasource, InMemoryDirectory};
pub use memory::{MemoryDatasource, row};
pub use rowset::{InMemoryRowSet, RowSetConnector, RowSetDatasource};
pub use table::TableDatasource;
