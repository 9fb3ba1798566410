//! opcmap-dwh - Data warehouse connection manager and context services
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                            Dwh                              │
//! │                                                             │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────┐  │
//! │  │ plant       │  │ enercast    │  │ solcast             │  │
//! │  └──────┬──────┘  └──────┬──────┘  └──────────┬──────────┘  │
//! │         └────────────────┼────────────────────┘             │
//! │                    ┌─────┴─────┐                            │
//! │                    │    Db     │  driver selection, retry   │
//! │                    └─────┬─────┘                            │
//! │                 ┌────────┴────────┐                         │
//! │                 │DriverEnvironment│                         │
//! │                 │ (ODBC / mock)   │                         │
//! │                 └─────────────────┘                         │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The manager is synchronous. Async callers should run it on a blocking
//! thread.

pub mod config;
pub mod db;
pub mod driver;
pub mod error;
pub mod services;

pub use config::DwhConfig;
pub use db::{Db, DbSession, FetchResult, Record, ResultSetOutput};
pub use driver::{create_environment, DriverBackend, DriverConnection, DriverEnvironment, SqlParam};
pub use error::{classify_sqlstate, DbErrorKind, DriverError, DwhError, DwhResult};
pub use services::{
    ContextService, Dwh, EnercastService, ExtDataResult, PlantService, SolcastService,
};

pub use opcmap_core::{OutputForm, Table};
