//! Warehouse errors and driver error classification

use thiserror::Error;

/// Result type alias for warehouse operations
pub type DwhResult<T> = Result<T, DwhError>;

/// Class of a driver failure, which decides whether a connect is retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbErrorKind {
    /// Bad data (conversion, truncation, out of range)
    Data,
    /// Bad SQL or wrong object names
    Programming,
    /// Constraint violation
    Integrity,
    /// Feature not supported by the driver
    NotSupported,
    /// Connection-level failure (network, wrong driver, timeout)
    Operational,
    /// Failure reported by the database itself
    Database,
    /// Anything the driver did not classify
    Generic,
}

impl DbErrorKind {
    /// Operational, database and generic failures may succeed on a new attempt
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            DbErrorKind::Operational | DbErrorKind::Database | DbErrorKind::Generic
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DbErrorKind::Data => "data",
            DbErrorKind::Programming => "programming",
            DbErrorKind::Integrity => "integrity",
            DbErrorKind::NotSupported => "not-supported",
            DbErrorKind::Operational => "operational",
            DbErrorKind::Database => "database",
            DbErrorKind::Generic => "generic",
        }
    }
}

impl std::fmt::Display for DbErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure reported by a driver
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind} error{}: {message}", sqlstate_suffix(.sqlstate))]
pub struct DriverError {
    pub kind: DbErrorKind,
    /// Five-character SQLSTATE, when the driver supplied one
    pub sqlstate: Option<String>,
    pub message: String,
}

impl DriverError {
    pub fn new(kind: DbErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            sqlstate: None,
            message: message.into(),
        }
    }

    /// Classify by SQLSTATE
    pub fn from_sqlstate(sqlstate: &str, message: impl Into<String>) -> Self {
        Self {
            kind: classify_sqlstate(sqlstate),
            sqlstate: Some(sqlstate.to_string()),
            message: message.into(),
        }
    }
}

fn sqlstate_suffix(sqlstate: &Option<String>) -> String {
    sqlstate
        .as_deref()
        .map(|s| format!(" [{}]", s))
        .unwrap_or_default()
}

/// Errors returned by the warehouse manager and its context services
#[derive(Debug, Error)]
pub enum DwhError {
    /// Bad configuration (driver index, empty driver list)
    #[error("{0}")]
    Validation(String),

    /// The driver failed a statement or a connect
    #[error(transparent)]
    Driver(#[from] DriverError),

    /// Every connect attempt failed with a retryable error
    #[error("Failed to connect to the database")]
    ConnectFailed {
        attempts: u32,
        #[source]
        last: Option<DriverError>,
    },

    /// No live connection to run a statement on
    #[error("Not connected to the database")]
    NotConnected,

    /// Payload could not be serialized for a procedure call
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The selected backend is not compiled in
    #[error("Driver backend not supported: {0}")]
    Unsupported(String),
}

impl DwhError {
    /// Driver error class, when this is a driver failure
    pub fn kind(&self) -> Option<DbErrorKind> {
        match self {
            DwhError::Driver(e) => Some(e.kind),
            _ => None,
        }
    }
}

/// Map a SQLSTATE to its error class.
///
/// Subclass codes are matched before their two-character class.
pub fn classify_sqlstate(sqlstate: &str) -> DbErrorKind {
    let state = sqlstate.to_ascii_uppercase();
    match state.as_str() {
        "IM001" | "HYC00" => return DbErrorKind::NotSupported,
        "HYT00" | "HYT01" => return DbErrorKind::Operational,
        _ => {}
    }

    match state.get(..2).unwrap_or_default() {
        "22" => DbErrorKind::Data,
        "23" => DbErrorKind::Integrity,
        "24" | "25" | "42" | "3D" | "3F" | "2A" => DbErrorKind::Programming,
        "0A" => DbErrorKind::NotSupported,
        "08" => DbErrorKind::Operational,
        "HY" | "40" | "28" => DbErrorKind::Database,
        _ => DbErrorKind::Generic,
    }
}
