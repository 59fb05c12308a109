//! SQL-style row-set source.
//!
//! Queries become [`SelectStatement`]s that a [`RowSetConnector`] executes.
//! [`InMemoryRowSet`] evaluates them over in-memory tables.

mod connector;
mod datasource;
mod memory;
mod statement;

pub use connector::{Row, RowSetConnection, RowSetConnector, RowSetGuard, TableDescription};
pub use datasource::RowSetDatasource;
pub use memory::InMemoryRowSet;
pub use statement::{Condition, SelectStatement, SqlSyntax, like_pattern, sql_literal};
