//! Data warehouse connection manager
//!
//! Owns driver selection and the single live connection. Connects with a
//! bounded retry on transient error classes, and reconnects lazily after
//! the connection was closed or lost.

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

use opcmap_core::{OutputForm, Table};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use tracing::{debug, error, info, instrument, warn};

use crate::config::DwhConfig;
use crate::driver::{DriverConnection, DriverEnvironment, SqlParam};
use crate::error::{DbErrorKind, DwhError, DwhResult};

/// Drivers whose name contains this are considered supported
pub const SUPPORTED_DRIVER_MARKER: &str = "SQL Server";

/// Version procedure of the warehouse schema
pub const VERSION_PROCEDURE: &str = "EXEC [dbo].[GetVersion]";

/// A row as `{column: value}`
pub type Record = Map<String, Value>;

/// One result set in the caller's chosen form
#[derive(Debug, Clone, PartialEq)]
pub enum ResultSetOutput {
    Records(Vec<Record>),
    Table(Table),
}

impl ResultSetOutput {
    pub fn project(table: Table, form: OutputForm) -> Self {
        match form {
            OutputForm::Rows => ResultSetOutput::Records(table.records()),
            OutputForm::Table => ResultSetOutput::Table(table),
        }
    }

    pub fn into_records(self) -> Vec<Record> {
        match self {
            ResultSetOutput::Records(records) => records,
            ResultSetOutput::Table(table) => table.records(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ResultSetOutput::Records(records) => records.len(),
            ResultSetOutput::Table(table) => table.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Result of [`Db::fetch`]: one result set, or all of them in order
#[derive(Debug, Clone, PartialEq)]
pub enum FetchResult {
    Single(ResultSetOutput),
    Multiple(Vec<ResultSetOutput>),
}

impl FetchResult {
    fn from_sets(mut sets: Vec<Table>, form: OutputForm) -> Self {
        if sets.len() > 1 {
            FetchResult::Multiple(
                sets.into_iter()
                    .map(|t| ResultSetOutput::project(t, form))
                    .collect(),
            )
        } else {
            FetchResult::Single(ResultSetOutput::project(
                sets.pop().unwrap_or_default(),
                form,
            ))
        }
    }

    /// Records of the first result set
    pub fn into_records(self) -> Vec<Record> {
        match self {
            FetchResult::Single(set) => set.into_records(),
            FetchResult::Multiple(sets) => sets
                .into_iter()
                .next()
                .map(ResultSetOutput::into_records)
                .unwrap_or_default(),
        }
    }

    /// Number of result sets
    pub fn result_sets(&self) -> usize {
        match self {
            FetchResult::Single(_) => 1,
            FetchResult::Multiple(sets) => sets.len(),
        }
    }
}

/// Connection manager for the data warehouse
pub struct Db {
    config: DwhConfig,
    env: Arc<dyn DriverEnvironment>,
    driver: String,
    connection: Mutex<Option<Box<dyn DriverConnection>>>,
}

impl Db {
    /// Select the driver without connecting
    pub fn new(config: DwhConfig, env: Arc<dyn DriverEnvironment>) -> DwhResult<Self> {
        let driver = select_driver(env.as_ref(), config.driver_index)?;
        debug!(%driver, "Selected driver");
        Ok(Self {
            config,
            env,
            driver,
            connection: Mutex::new(None),
        })
    }

    /// Select the driver and connect
    pub fn connect(config: DwhConfig, env: Arc<dyn DriverEnvironment>) -> DwhResult<Self> {
        let db = Self::new(config, env)?;
        db.open()?;
        Ok(db)
    }

    /// Installed drivers this manager can use, in driver-manager order
    pub fn supported_drivers(env: &dyn DriverEnvironment) -> DwhResult<Vec<String>> {
        Ok(env
            .drivers()?
            .into_iter()
            .filter(|d| d.contains(SUPPORTED_DRIVER_MARKER))
            .collect())
    }

    pub fn driver(&self) -> &str {
        &self.driver
    }

    pub fn config(&self) -> &DwhConfig {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        self.connection.lock().is_some()
    }

    /// Connect unless already connected
    pub fn open(&self) -> DwhResult<()> {
        let mut guard = self.connection.lock();
        if guard.is_none() {
            *guard = Some(self.connect_with_retry()?);
        }
        Ok(())
    }

    /// Scope guard: derefs to the manager and disconnects when dropped
    pub fn session(&self) -> DbSession<'_> {
        DbSession { db: self }
    }

    /// Close the connection if open
    pub fn disconnect(&self) {
        if let Some(mut conn) = self.connection.lock().take() {
            match conn.close() {
                Ok(()) => info!("Disconnected from the DataWarehouse"),
                Err(e) => warn!(%e, "Error while closing the DataWarehouse connection"),
            }
        }
    }

    /// Run a query and return its result sets.
    ///
    /// One result set comes back as [`FetchResult::Single`], several as
    /// [`FetchResult::Multiple`]; a statement without rows gives an empty set.
    #[instrument(skip(self))]
    pub fn fetch(&self, sql: &str, form: OutputForm) -> DwhResult<FetchResult> {
        let sets = self.run(sql, &[], false)?;
        debug!(result_sets = sets.len(), "Fetched");
        Ok(FetchResult::from_sets(sets, form))
    }

    /// Records of the first result set of `sql`
    pub fn fetch_records(&self, sql: &str) -> DwhResult<Vec<Record>> {
        Ok(self.fetch(sql, OutputForm::Rows)?.into_records())
    }

    /// Run a procedure or DML statement with positional parameters.
    ///
    /// Returns the rows of the first result set, or nothing when the
    /// statement produced none. Commits before returning when `commit` is set.
    #[instrument(skip(self, params), fields(params = params.len()))]
    pub fn execute(&self, sql: &str, params: &[SqlParam], commit: bool) -> DwhResult<Vec<Record>> {
        let mut sets = self.run(sql, params, commit)?;
        if sets.is_empty() {
            return Ok(Vec::new());
        }
        Ok(sets.swap_remove(0).records())
    }

    /// First row of the version procedure, or an empty record
    pub fn version(&self) -> DwhResult<Record> {
        Ok(self
            .fetch_records(VERSION_PROCEDURE)?
            .into_iter()
            .next()
            .unwrap_or_default())
    }

    fn run(&self, sql: &str, params: &[SqlParam], commit: bool) -> DwhResult<Vec<Table>> {
        let mut guard = self.connection.lock();
        if guard.is_none() {
            *guard = Some(self.connect_with_retry()?);
        }
        let Some(conn) = guard.as_mut() else {
            return Err(DwhError::NotConnected);
        };

        let result = conn.execute(sql, params).and_then(|sets| {
            if commit {
                conn.commit()?;
            }
            Ok(sets)
        });

        match result {
            Ok(sets) => Ok(sets),
            Err(e) => {
                error!(kind = %e.kind, %e, "Statement failed");
                if e.kind == DbErrorKind::Operational {
                    // Connection is likely gone; reconnect on next use
                    if let Some(mut conn) = guard.take() {
                        let _ = conn.close();
                    }
                }
                Err(e.into())
            }
        }
    }

    fn connect_with_retry(&self) -> DwhResult<Box<dyn DriverConnection>> {
        let max_attempts = self.config.connect_attempts.max(1);
        let connection_string = self.config.connection_string(&self.driver);
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            match self.env.connect(&connection_string) {
                Ok(conn) => {
                    info!(
                        driver = %self.driver,
                        host = %self.config.host,
                        database = %self.config.database,
                        attempt,
                        "Connected to the DataWarehouse"
                    );
                    return Ok(conn);
                }
                Err(e) => {
                    match e.kind {
                        DbErrorKind::Data => {
                            error!(%e, "Data error while connecting to the DataWarehouse");
                            return Err(e.into());
                        }
                        DbErrorKind::Programming => {
                            error!(%e, "Programming error while connecting to the DataWarehouse, check your code");
                            return Err(e.into());
                        }
                        DbErrorKind::Integrity => {
                            error!(%e, "Integrity error while connecting to the DataWarehouse");
                            return Err(e.into());
                        }
                        DbErrorKind::NotSupported => {
                            error!(%e, "Driver does not support the connection request");
                            return Err(e.into());
                        }
                        DbErrorKind::Operational => {
                            warn!(attempt, max_attempts, %e, "Operational error while connecting, driver may be wrong");
                        }
                        DbErrorKind::Database => {
                            warn!(attempt, max_attempts, %e, "Database error while connecting");
                        }
                        DbErrorKind::Generic => {
                            warn!(attempt, max_attempts, %e, "Driver error while connecting");
                        }
                    }
                    last_error = Some(e);
                    if attempt < max_attempts && self.config.retry_delay_ms > 0 {
                        std::thread::sleep(Duration::from_millis(self.config.retry_delay_ms));
                    }
                }
            }
        }

        error!(
            "Failed to connect to the DataWarehouse after {} attempts",
            max_attempts
        );
        Err(DwhError::ConnectFailed {
            attempts: max_attempts,
            last: last_error,
        })
    }
}

fn select_driver(env: &dyn DriverEnvironment, index: usize) -> DwhResult<String> {
    let drivers = Db::supported_drivers(env)?;
    if drivers.is_empty() {
        return Err(DwhError::Validation("No supported drivers".to_string()));
    }
    drivers
        .get(index)
        .cloned()
        .ok_or_else(|| DwhError::Validation(format!("Driver index {} is out of range", index)))
}

impl Drop for Db {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl fmt::Debug for Db {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Db")
            .field("driver", &self.driver)
            .field("host", &self.config.host)
            .field("database", &self.config.database)
            .field("connected", &self.is_connected())
            .finish()
    }
}

/// Scoped use of a [`Db`]; the connection is closed when this is dropped
pub struct DbSession<'a> {
    db: &'a Db,
}

impl Deref for DbSession<'_> {
    type Target = Db;

    fn deref(&self) -> &Db {
        self.db
    }
}

impl Drop for DbSession<'_> {
    fn drop(&mut self) {
        self.db.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::mock::MockEnvironment;
    use crate::error::DriverError;
    use serde_json::json;

    fn config() -> DwhConfig {
        let mut cfg = DwhConfig::new("dwh.local", "Analytics", "svc", "pw");
        cfg.retry_delay_ms = 0;
        cfg
    }

    #[test]
    fn test_supported_drivers_filter() {
        let env = MockEnvironment::new();
        assert_eq!(
            Db::supported_drivers(&env).unwrap(),
            vec!["ODBC Driver 18 for SQL Server", "ODBC Driver 17 for SQL Server"]
        );
    }

    #[test]
    fn test_driver_index_selects() {
        let mut cfg = config();
        cfg.driver_index = 1;
        let db = Db::new(cfg, Arc::new(MockEnvironment::new())).unwrap();
        assert_eq!(db.driver(), "ODBC Driver 17 for SQL Server");
        assert!(!db.is_connected());
    }

    #[test]
    fn test_driver_index_out_of_range() {
        let mut cfg = config();
        cfg.driver_index = 2;
        let err = Db::new(cfg, Arc::new(MockEnvironment::new())).unwrap_err();
        assert_eq!(err.to_string(), "Driver index 2 is out of range");
    }

    #[test]
    fn test_no_supported_drivers() {
        let env = MockEnvironment::new().with_drivers(["SQLite3", "PostgreSQL Unicode"]);
        let err = Db::new(config(), Arc::new(env)).unwrap_err();
        assert_eq!(err.to_string(), "No supported drivers");
    }

    #[test]
    fn test_fetch_single_and_multiple() {
        let env = MockEnvironment::new();
        env.add_response(
            "EXEC multi",
            vec![
                Table {
                    columns: vec!["a".into()],
                    rows: vec![vec![json!(1)]],
                },
                Table {
                    columns: vec!["b".into()],
                    rows: vec![],
                },
            ],
        );
        let db = Db::connect(config(), Arc::new(env)).unwrap();

        match db.fetch("EXEC multi", OutputForm::Table).unwrap() {
            FetchResult::Multiple(sets) => {
                assert_eq!(sets.len(), 2);
                assert!(matches!(&sets[1], ResultSetOutput::Table(t) if t.is_empty()));
            }
            other => panic!("Expected multiple result sets, got {:?}", other),
        }

        let empty = db.fetch("UPDATE x SET y = 1", OutputForm::Rows).unwrap();
        assert_eq!(empty, FetchResult::Single(ResultSetOutput::Records(vec![])));
    }

    #[test]
    fn test_execute_commits() {
        let env = MockEnvironment::new();
        let db = Db::connect(config(), Arc::new(env.clone())).unwrap();

        let rows = db
            .execute("EXEC dwetl.Something ?", &[SqlParam::from("x")], true)
            .unwrap();
        assert!(rows.is_empty());
        assert_eq!(env.commit_count(), 1);

        db.execute("EXEC dwetl.Something ?", &[SqlParam::Null], false)
            .unwrap();
        assert_eq!(env.commit_count(), 1);
    }

    #[test]
    fn test_session_guard_disconnects() {
        let env = MockEnvironment::new();
        let db = Db::connect(config(), Arc::new(env.clone())).unwrap();
        {
            let session = db.session();
            assert!(session.is_connected());
            session.fetch_records("SELECT 1").unwrap();
        }
        assert!(!db.is_connected());
        assert_eq!(env.close_count(), 1);

        // reconnects lazily
        db.fetch_records("SELECT 1").unwrap();
        assert_eq!(env.connect_count(), 2);
    }

    #[test]
    fn test_operational_statement_error_drops_connection() {
        let env = MockEnvironment::new();
        env.add_error("EXEC flaky", DriverError::from_sqlstate("08S01", "Communication link failure"));
        let db = Db::connect(config(), Arc::new(env.clone())).unwrap();

        let err = db.fetch("EXEC flaky", OutputForm::Rows).unwrap_err();
        assert_eq!(err.kind(), Some(DbErrorKind::Operational));
        assert!(!db.is_connected());
    }

    #[test]
    fn test_debug_hides_password() {
        let db = Db::new(config(), Arc::new(MockEnvironment::new())).unwrap();
        let debug = format!("{:?}", db);
        assert!(debug.contains("dwh.local"));
        assert!(!debug.contains("PWD"));
    }
}
