//! Plant and tracker procedures

use std::sync::Arc;

use serde::Serialize;

use super::{sql_literal, ContextService};
use crate::db::{Db, Record};
use crate::driver::SqlParam;
use crate::error::DwhResult;

/// Outcome written to the external data update log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtDataResult {
    Ok,
    Error,
}

impl ExtDataResult {
    pub fn from_error_flag(has_thrown_error: bool) -> Self {
        if has_thrown_error {
            ExtDataResult::Error
        } else {
            ExtDataResult::Ok
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ExtDataResult::Ok => "OK",
            ExtDataResult::Error => "ERROR",
        }
    }
}

#[derive(Debug, Clone)]
pub struct PlantService {
    db: Arc<Db>,
}

impl ContextService for PlantService {
    const NAME: &'static str = "plant";

    fn new(db: Arc<Db>) -> Self {
        Self { db }
    }

    fn db(&self) -> &Arc<Db> {
        &self.db
    }
}

impl PlantService {
    /// Tracker angle parameters of one facility
    pub fn get_optimal_tracker_angles(&self, facility_name: &str) -> DwhResult<Vec<Record>> {
        let sql = format!(
            "EXEC dwetl.GetOptimalTrackerAngleParameters @FacilityName = N'{}'",
            sql_literal(facility_name)
        );
        self.db.fetch_records(&sql)
    }

    /// Store computed tracker angles; `facility_data` is passed as one JSON document
    pub fn upsert_optimal_tracker_angles<T>(&self, facility_data: &T) -> DwhResult<Vec<Record>>
    where
        T: Serialize + ?Sized,
    {
        let json = serde_json::to_string(facility_data)?;
        self.db.execute(
            "EXEC dwetl.UpsertOptimalTrackerAngles @json = ?",
            &[SqlParam::Text(json)],
            true,
        )
    }

    /// Record the outcome of an external data update
    pub fn insert_log(
        &self,
        plantname: &str,
        ext_forecast_type_key: i64,
        data_type: &str,
        has_thrown_error: bool,
        message: &str,
    ) -> DwhResult<Vec<Record>> {
        let result = ExtDataResult::from_error_flag(has_thrown_error);
        self.db.execute(
            "EXEC dwetl.InsertExtDataUpdateLog @plantname=?, @extkey=?, @DataType=?, @Message=?, @Result=?",
            &[
                SqlParam::from(plantname),
                SqlParam::from(ext_forecast_type_key),
                SqlParam::from(data_type),
                SqlParam::from(message),
                SqlParam::from(result.as_str()),
            ],
            true,
        )
    }
}
