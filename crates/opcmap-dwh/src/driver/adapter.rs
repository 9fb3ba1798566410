//! Driver abstraction used by the warehouse manager

use std::fmt;

use opcmap_core::Table;
use serde::{Deserialize, Serialize};

use crate::error::DriverError;

/// A positional statement parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SqlParam {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl SqlParam {
    /// Text form bound by drivers that only take character parameters
    pub fn as_text(&self) -> Option<String> {
        match self {
            SqlParam::Null => None,
            SqlParam::Bool(v) => Some(if *v { "1" } else { "0" }.to_string()),
            SqlParam::Int(v) => Some(v.to_string()),
            SqlParam::Float(v) => Some(v.to_string()),
            SqlParam::Text(v) => Some(v.clone()),
        }
    }
}

impl From<&str> for SqlParam {
    fn from(v: &str) -> Self {
        SqlParam::Text(v.to_string())
    }
}

impl From<String> for SqlParam {
    fn from(v: String) -> Self {
        SqlParam::Text(v)
    }
}

impl From<i64> for SqlParam {
    fn from(v: i64) -> Self {
        SqlParam::Int(v)
    }
}

impl From<f64> for SqlParam {
    fn from(v: f64) -> Self {
        SqlParam::Float(v)
    }
}

impl From<bool> for SqlParam {
    fn from(v: bool) -> Self {
        SqlParam::Bool(v)
    }
}

impl<T: Into<SqlParam>> From<Option<T>> for SqlParam {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(SqlParam::Null)
    }
}

impl fmt::Display for SqlParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_text() {
            Some(text) => f.write_str(&text),
            None => f.write_str("NULL"),
        }
    }
}

/// Host driver subsystem: lists installed drivers and opens connections
pub trait DriverEnvironment: Send + Sync {
    /// Names of every installed driver
    fn drivers(&self) -> Result<Vec<String>, DriverError>;

    /// Open a connection from a full connection string
    fn connect(&self, connection_string: &str) -> Result<Box<dyn DriverConnection>, DriverError>;
}

/// One live driver connection
pub trait DriverConnection: Send {
    /// Run a statement and collect every result set it produces.
    ///
    /// Statements without a result set (DML, most procedures) return an
    /// empty list.
    fn execute(&mut self, sql: &str, params: &[SqlParam]) -> Result<Vec<Table>, DriverError>;

    fn commit(&mut self) -> Result<(), DriverError>;

    fn close(&mut self) -> Result<(), DriverError>;
}
