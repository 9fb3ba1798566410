//! Context services over the shared warehouse connection
//!
//! Each service groups the stored procedures of one business context and
//! holds a handle to the same [`Db`] as the registry that created it.

mod enercast;
mod plant;
mod solcast;

pub use enercast::EnercastService;
pub use plant::{ExtDataResult, PlantService};
pub use solcast::SolcastService;

use std::sync::Arc;

use tracing::info;

use crate::config::DwhConfig;
use crate::db::{Db, Record};
use crate::driver::DriverEnvironment;
use crate::error::DwhResult;

/// A group of procedures bound to one warehouse connection
pub trait ContextService: Sized {
    /// Name the service is registered under
    const NAME: &'static str;

    fn new(db: Arc<Db>) -> Self;

    /// The connection manager this service runs on
    fn db(&self) -> &Arc<Db>;
}

/// Connection manager plus every context service
#[derive(Debug)]
pub struct Dwh {
    db: Arc<Db>,
    pub plant: PlantService,
    pub enercast: EnercastService,
    pub solcast: SolcastService,
}

impl Dwh {
    /// Registered service names
    pub const SERVICE_NAMES: [&'static str; 3] = [
        PlantService::NAME,
        EnercastService::NAME,
        SolcastService::NAME,
    ];

    /// Connect and register the services
    pub fn connect(config: DwhConfig, env: Arc<dyn DriverEnvironment>) -> DwhResult<Self> {
        let db = Db::connect(config, env)?;
        Ok(Self::with_db(Arc::new(db)))
    }

    /// Register the services on an existing manager
    pub fn with_db(db: Arc<Db>) -> Self {
        let dwh = Self {
            plant: PlantService::new(Arc::clone(&db)),
            enercast: EnercastService::new(Arc::clone(&db)),
            solcast: SolcastService::new(Arc::clone(&db)),
            db,
        };
        info!(services = ?Self::SERVICE_NAMES, "Registered context services");
        dwh
    }

    pub fn db(&self) -> &Arc<Db> {
        &self.db
    }

    /// Warehouse schema version
    pub fn version(&self) -> DwhResult<Record> {
        self.db.version()
    }
}

/// Escape a value for use inside a single-quoted SQL literal
pub(crate) fn sql_literal(value: &str) -> String {
    value.replace('\'', "''")
}
