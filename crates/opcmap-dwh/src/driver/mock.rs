//! Mock driver for testing

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use opcmap_core::Table;
use parking_lot::{Mutex, RwLock};
use serde_json::json;

use super::{DriverConnection, DriverEnvironment, SqlParam};
use crate::error::{DbErrorKind, DriverError};

/// A statement seen by a mock connection
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutedStatement {
    pub sql: String,
    pub params: Vec<SqlParam>,
}

#[derive(Default)]
struct MockState {
    connect_failures: Mutex<VecDeque<DriverError>>,
    connects: AtomicUsize,
    commits: AtomicUsize,
    closes: AtomicUsize,
    connection_strings: Mutex<Vec<String>>,
    statements: Mutex<Vec<ExecutedStatement>>,
    /// Statement prefix -> result sets (or error)
    responses: RwLock<Vec<(String, Result<Vec<Table>, DriverError>)>>,
}

/// Scripted in-memory driver environment.
///
/// Cloning shares the recorded state, so a test can keep one handle for
/// assertions while the manager owns another.
#[derive(Clone)]
pub struct MockEnvironment {
    drivers: Vec<String>,
    state: Arc<MockState>,
}

impl Default for MockEnvironment {
    fn default() -> Self {
        Self::new()
    }
}

impl MockEnvironment {
    pub fn new() -> Self {
        let env = Self {
            drivers: vec![
                "ODBC Driver 18 for SQL Server".to_string(),
                "SQLite3".to_string(),
                "ODBC Driver 17 for SQL Server".to_string(),
            ],
            state: Arc::new(MockState::default()),
        };
        *env.state.responses.write() = Self::default_responses();
        env
    }

    /// Replace the installed driver list
    pub fn with_drivers<I, S>(mut self, drivers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.drivers = drivers.into_iter().map(Into::into).collect();
        self
    }

    /// Fail the next `count` connects with `kind`
    pub fn fail_connects(&self, count: usize, kind: DbErrorKind) {
        let mut failures = self.state.connect_failures.lock();
        for n in 0..count {
            failures.push_back(DriverError::new(kind, format!("mock connect failure {}", n + 1)));
        }
    }

    /// Answer statements starting with `prefix` with `result_sets`
    pub fn add_response(&self, prefix: impl Into<String>, result_sets: Vec<Table>) {
        self.state
            .responses
            .write()
            .insert(0, (prefix.into(), Ok(result_sets)));
    }

    /// Fail statements starting with `prefix`
    pub fn add_error(&self, prefix: impl Into<String>, error: DriverError) {
        self.state
            .responses
            .write()
            .insert(0, (prefix.into(), Err(error)));
    }

    pub fn connect_count(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }

    pub fn commit_count(&self) -> usize {
        self.state.commits.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.state.closes.load(Ordering::SeqCst)
    }

    pub fn connection_strings(&self) -> Vec<String> {
        self.state.connection_strings.lock().clone()
    }

    pub fn statements(&self) -> Vec<ExecutedStatement> {
        self.state.statements.lock().clone()
    }

    pub fn last_statement(&self) -> Option<ExecutedStatement> {
        self.state.statements.lock().last().cloned()
    }

    fn default_responses() -> Vec<(String, Result<Vec<Table>, DriverError>)> {
        vec![
            // Connectivity check: one unnamed column
            (
                "SELECT 1".to_string(),
                Ok(vec![Table {
                    columns: vec![String::new()],
                    rows: vec![vec![json!(1)]],
                }]),
            ),
            (
                "EXEC [dbo].[GetVersion]".to_string(),
                Ok(vec![Table {
                    columns: vec!["Version".to_string(), "DeployedAt".to_string()],
                    rows: vec![vec![json!("1.4.2"), json!("2022-09-01T00:00:00")]],
                }]),
            ),
        ]
    }

    fn find_response(&self, sql: &str) -> Result<Vec<Table>, DriverError> {
        let responses = self.state.responses.read();

        // First try exact match
        if let Some((_, result)) = responses.iter().find(|(s, _)| s == sql) {
            return result.clone();
        }

        // Then prefix match
        if let Some((_, result)) = responses.iter().find(|(s, _)| sql.starts_with(s.as_str())) {
            return result.clone();
        }

        Ok(Vec::new())
    }
}

impl DriverEnvironment for MockEnvironment {
    fn drivers(&self) -> Result<Vec<String>, DriverError> {
        Ok(self.drivers.clone())
    }

    fn connect(&self, connection_string: &str) -> Result<Box<dyn DriverConnection>, DriverError> {
        self.state.connects.fetch_add(1, Ordering::SeqCst);
        self.state
            .connection_strings
            .lock()
            .push(connection_string.to_string());

        if let Some(failure) = self.state.connect_failures.lock().pop_front() {
            return Err(failure);
        }

        Ok(Box::new(MockConnection {
            env: self.clone(),
            open: true,
        }))
    }
}

/// Connection handed out by [`MockEnvironment`]
pub struct MockConnection {
    env: MockEnvironment,
    open: bool,
}

impl DriverConnection for MockConnection {
    fn execute(&mut self, sql: &str, params: &[SqlParam]) -> Result<Vec<Table>, DriverError> {
        if !self.open {
            return Err(DriverError::from_sqlstate("08003", "Connection is closed"));
        }
        self.env.state.statements.lock().push(ExecutedStatement {
            sql: sql.to_string(),
            params: params.to_vec(),
        });
        tracing::debug!(sql, "Mock driver: executed statement");
        self.env.find_response(sql)
    }

    fn commit(&mut self) -> Result<(), DriverError> {
        self.env.state.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn close(&mut self) -> Result<(), DriverError> {
        if self.open {
            self.open = false;
            self.env.state.closes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_connect_failures() {
        let env = MockEnvironment::new();
        env.fail_connects(2, DbErrorKind::Operational);

        assert!(env.connect("DSN=x").is_err());
        assert!(env.connect("DSN=x").is_err());
        assert!(env.connect("DSN=x").is_ok());
        assert_eq!(env.connect_count(), 3);
    }

    #[test]
    fn test_default_connectivity_response() {
        let env = MockEnvironment::new();
        let mut conn = env.connect("DSN=x").unwrap();
        let sets = conn.execute("SELECT 1", &[]).unwrap();
        assert_eq!(sets.len(), 1);
        assert_eq!(sets[0].rows, vec![vec![json!(1)]]);

        assert!(conn.execute("UPDATE t SET x = 1", &[]).unwrap().is_empty());
        assert_eq!(env.statements().len(), 2);
    }

    #[test]
    fn test_closed_connection_rejects_statements() {
        let env = MockEnvironment::new();
        let mut conn = env.connect("DSN=x").unwrap();
        conn.close().unwrap();
        conn.close().unwrap();
        assert_eq!(env.close_count(), 1);

        let err = conn.execute("SELECT 1", &[]).unwrap_err();
        assert_eq!(err.kind, DbErrorKind::Operational);
    }
}
