//! Enercast forecast procedures

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::debug;

use super::{sql_literal, ContextService};
use crate::db::{Db, Record};
use crate::driver::SqlParam;
use crate::error::DwhResult;

#[derive(Debug, Clone)]
pub struct EnercastService {
    db: Arc<Db>,
}

impl ContextService for EnercastService {
    const NAME: &'static str = "enercast";

    fn new(db: Arc<Db>) -> Self {
        Self { db }
    }

    fn db(&self) -> &Arc<Db> {
        &self.db
    }
}

impl EnercastService {
    pub fn get_plants_to_update(&self) -> DwhResult<Vec<Record>> {
        self.db.fetch_records("EXEC dwetl.GetEnercastPlantsToUpdate")
    }

    /// Live meter readings of one asset
    pub fn get_live_meter_data(&self, asset_name: &str) -> DwhResult<Vec<Record>> {
        let sql = format!(
            "EXEC dwetl.GetEnercastLiveMeterData '{}'",
            sql_literal(asset_name)
        );
        self.db.fetch_records(&sql)
    }

    /// Store forecast results as returned by the Enercast API
    pub fn upsert_forecast_data(
        &self,
        data: &Value,
        forecast_type_key: Option<i64>,
    ) -> DwhResult<Vec<Record>> {
        let payload = serde_json::to_string(&json!({ "results": data }))?;
        debug!(bytes = payload.len(), ?forecast_type_key, "Upserting Enercast forecast");
        self.db.execute(
            "EXEC dwetl.UpsertEnercastForecastData ?, ?",
            &[SqlParam::Text(payload), SqlParam::from(forecast_type_key)],
            true,
        )
    }
}
