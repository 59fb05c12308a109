//! Row-set backend that evaluates statements over in-memory tables.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use common_error::{FederaError, FederaResult};
use federa_core::Pattern;

use super::connector::{Row, RowSetConnection, RowSetConnector, TableDescription};
use super::statement::{Condition, SelectStatement};

#[derive(Debug, Default)]
struct Table {
    description: TableDescription,
    rows: Vec<Row>,
}

#[derive(Debug, Default)]
struct Store {
    tables: RwLock<HashMap<String, Table>>,
    executed: Mutex<Vec<SelectStatement>>,
    open: AtomicUsize,
}

/// A [`RowSetConnector`] over tables held in memory. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRowSet {
    store: Arc<Store>,
}

impl InMemoryRowSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or replace a table.
    pub fn with_table<I, S>(self, name: &str, columns: I, key_columns: &[&str]) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let description = TableDescription {
            columns: columns.into_iter().map(Into::into).collect(),
            key_columns: key_columns.iter().map(|c| c.to_string()).collect(),
        };
        if let Ok(mut tables) = self.store.tables.write() {
            tables.insert(
                name.to_string(),
                Table {
                    description,
                    rows: Vec::new(),
                },
            );
        }
        self
    }

    /// Append a row to an existing table.
    pub fn insert(&self, table: &str, row: Row) -> FederaResult<()> {
        let mut tables = self
            .store
            .tables
            .write()
            .map_err(|_| FederaError::internal("row-set lock poisoned"))?;
        let table = tables
            .get_mut(table)
            .ok_or_else(|| FederaError::value_error(format!("no table \"{table}\"")))?;
        table.rows.push(row);
        Ok(())
    }

    /// Statements executed so far, oldest first.
    pub fn executed(&self) -> Vec<SelectStatement> {
        self.store
            .executed
            .lock()
            .map(|log| log.clone())
            .unwrap_or_default()
    }

    /// Sessions opened and not yet closed.
    pub fn open_connections(&self) -> usize {
        self.store.open.load(Ordering::SeqCst)
    }
}

impl RowSetConnector for InMemoryRowSet {
    fn connect(
        &self,
        _user: &str,
        _password: &str,
        _timeout: Duration,
    ) -> FederaResult<Box<dyn RowSetConnection>> {
        self.store.open.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemorySession {
            store: Arc::clone(&self.store),
            closed: false,
        }))
    }
}

struct MemorySession {
    store: Arc<Store>,
    closed: bool,
}

fn row_matches(row: &Row, condition: &Condition) -> bool {
    match condition {
        Condition::All => true,
        Condition::Keys(keys) => keys.iter().any(|pairs| {
            pairs
                .iter()
                .all(|(column, value)| row.get(column).map(String::as_str) == value.as_deref())
        }),
        Condition::Like(parts) => parts.iter().all(|part| {
            Pattern::parse(part.pattern()).matches(row.get(part.column()).map(String::as_str))
        }),
    }
}

impl RowSetConnection for MemorySession {
    fn execute(&mut self, statement: &SelectStatement, _timeout: Duration) -> FederaResult<Vec<Row>> {
        if let Ok(mut log) = self.store.executed.lock() {
            log.push(statement.clone());
        }
        let tables = self
            .store
            .tables
            .read()
            .map_err(|_| FederaError::internal("row-set lock poisoned"))?;
        let table = tables.get(&statement.table).ok_or_else(|| {
            FederaError::value_error(format!("no table \"{}\"", statement.table))
        })?;
        Ok(table
            .rows
            .iter()
            .filter(|row| row_matches(row, &statement.condition))
            .cloned()
            .collect())
    }

    fn describe(&mut self, table: &str, _timeout: Duration) -> FederaResult<TableDescription> {
        let tables = self
            .store
            .tables
            .read()
            .map_err(|_| FederaError::internal("row-set lock poisoned"))?;
        tables
            .get(table)
            .map(|t| t.description.clone())
            .ok_or_else(|| FederaError::value_error(format!("no table \"{table}\"")))
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.store.open.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::row;
    use crate::rowset::connector::RowSetGuard;
    use federa_core::QueryPart;

    const T: Duration = Duration::from_secs(1);

    #[test]
    fn test_conditions() {
        let backend = InMemoryRowSet::new().with_table("t", ["id", "name"], &["id"]);
        backend.insert("t", row([("id", "1"), ("name", "Anna")])).unwrap();
        backend.insert("t", row([("id", "2")])).unwrap();
        let mut session = RowSetGuard::new(backend.connect("", "", T).unwrap());

        let all = session.execute(&SelectStatement::all("t"), T).unwrap();
        assert_eq!(all.len(), 2);
        let like = SelectStatement::like("t", vec![QueryPart::new("name", "AN*")]);
        assert_eq!(session.execute(&like, T).unwrap().len(), 1);
        let null_key = SelectStatement::by_keys("t", vec![vec![("name".into(), None)]]);
        assert_eq!(session.execute(&null_key, T).unwrap()[0]["id"], "2");
        assert!(session.execute(&SelectStatement::all("x"), T).is_err());
        assert_eq!(backend.executed().len(), 4);
    }

    #[test]
    fn test_session_is_closed_by_guard() {
        let backend = InMemoryRowSet::new();
        drop(RowSetGuard::new(backend.connect("", "", T).unwrap()));
        assert_eq!(backend.open_connections(), 0);
    }
}
