//! Driver layer for the data warehouse
//!
//! - ODBC backend over the host driver manager (`odbc` feature)
//! - Mock backend for testing
//!
//! # Example
//!
//! ```ignore
//! use opcmap_dwh::driver::{create_environment, DriverBackend};
//!
//! let env = create_environment(DriverBackend::Odbc)?;
//! let drivers = env.drivers()?;
//! ```

mod adapter;
pub mod mock;

#[cfg(feature = "odbc")]
pub mod odbc;

pub use adapter::{DriverConnection, DriverEnvironment, SqlParam};

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::DwhResult;

/// Which driver backend to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverBackend {
    /// Host ODBC driver manager
    #[default]
    Odbc,
    /// In-memory mock
    Mock,
}

/// Create a driver environment for `backend`
pub fn create_environment(backend: DriverBackend) -> DwhResult<Arc<dyn DriverEnvironment>> {
    match backend {
        #[cfg(feature = "odbc")]
        DriverBackend::Odbc => Ok(Arc::new(odbc::OdbcEnvironment)),
        #[cfg(not(feature = "odbc"))]
        DriverBackend::Odbc => Err(crate::error::DwhError::Unsupported(
            "ODBC requires the 'odbc' feature".to_string(),
        )),
        DriverBackend::Mock => Ok(Arc::new(mock::MockEnvironment::new())),
    }
}
