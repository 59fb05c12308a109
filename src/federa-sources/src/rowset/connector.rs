//! The contract row-set backends implement.

use std::collections::HashMap;
use std::fmt::Debug;
use std::ops::{Deref, DerefMut};
use std::time::Duration;

use log::trace;

use common_error::FederaResult;

use super::statement::SelectStatement;

/// A result row: column name to value. Absent columns are `NULL`.
pub type Row = HashMap<String, String>;

/// Columns and primary key of a table, as reported by the backend.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableDescription {
    pub columns: Vec<String>,
    pub key_columns: Vec<String>,
}

/// An open session with a row-set backend.
pub trait RowSetConnection: Send {
    fn execute(&mut self, statement: &SelectStatement, timeout: Duration) -> FederaResult<Vec<Row>>;

    /// Describe a table or view. Used only when no schema is configured.
    fn describe(&mut self, table: &str, timeout: Duration) -> FederaResult<TableDescription>;

    /// Release the session. Called exactly once by [`RowSetGuard`].
    fn close(&mut self) {}
}

/// Opens sessions to the registered data source named by `SOURCE`.
pub trait RowSetConnector: Send + Sync + Debug {
    fn connect(
        &self,
        user: &str,
        password: &str,
        timeout: Duration,
    ) -> FederaResult<Box<dyn RowSetConnection>>;
}

/// Closes the wrapped session when dropped.
pub struct RowSetGuard {
    conn: Box<dyn RowSetConnection>,
}

impl RowSetGuard {
    pub fn new(conn: Box<dyn RowSetConnection>) -> Self {
        Self { conn }
    }
}

impl Deref for RowSetGuard {
    type Target = dyn RowSetConnection;

    fn deref(&self) -> &Self::Target {
        self.conn.as_ref()
    }
}

impl DerefMut for RowSetGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn.as_mut()
    }
}

impl Drop for RowSetGuard {
    fn drop(&mut self) {
        trace!("closing row-set session");
        self.conn.close();
    }
}
