//! Solcast forecast procedures

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::debug;

use super::ContextService;
use crate::db::{Db, Record};
use crate::driver::SqlParam;
use crate::error::DwhResult;

#[derive(Debug, Clone)]
pub struct SolcastService {
    db: Arc<Db>,
}

impl ContextService for SolcastService {
    const NAME: &'static str = "solcast";

    fn new(db: Arc<Db>) -> Self {
        Self { db }
    }

    fn db(&self) -> &Arc<Db> {
        &self.db
    }
}

impl SolcastService {
    pub fn get_plants_to_update(&self) -> DwhResult<Vec<Record>> {
        self.db.fetch_records("EXEC dwetl.GetSolcastPlantsToUpdate")
    }

    /// Store the `forecasts` of a Solcast API response for one plant
    pub fn upsert_forecast_data(
        &self,
        plantname: &str,
        data: &Value,
        forecast_type_key: Option<i64>,
    ) -> DwhResult<Vec<Record>> {
        let forecasts = data.get("forecasts").cloned().unwrap_or(Value::Null);
        let payload = serde_json::to_string(&json!({
            "results": {
                "plantname": plantname,
                "values": forecasts,
            }
        }))?;
        debug!(plantname, bytes = payload.len(), "Upserting Solcast forecast");
        self.db.execute(
            "EXEC dwetl.UpsertSolcastForecastData ?, ?",
            &[SqlParam::Text(payload), SqlParam::from(forecast_type_key)],
            true,
        )
    }
}
