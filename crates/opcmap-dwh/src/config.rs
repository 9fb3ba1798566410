//! Warehouse connection configuration

use serde::{Deserialize, Serialize};

/// Connection settings for the data warehouse
#[derive(Clone, Serialize, Deserialize)]
pub struct DwhConfig {
    /// Server host (optionally `host,port` or `host\instance`)
    pub host: String,
    pub database: String,
    pub username: String,
    pub password: String,
    /// Zero-based index into the supported driver list
    #[serde(default)]
    pub driver_index: usize,
    /// Connect attempts before giving up
    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: u32,
    /// Pause between connect attempts
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Extra `KEY=value` pairs appended to the connection string
    #[serde(default)]
    pub extra_attributes: Vec<(String, String)>,
}

fn default_connect_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

impl DwhConfig {
    pub fn new(
        host: impl Into<String>,
        database: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            database: database.into(),
            username: username.into(),
            password: password.into(),
            driver_index: 0,
            connect_attempts: default_connect_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            extra_attributes: Vec::new(),
        }
    }

    /// ODBC connection string for `driver`
    pub fn connection_string(&self, driver: &str) -> String {
        let mut conn = format!(
            "UID={};PWD={};DRIVER={{{}}};SERVER={};DATABASE={};",
            self.username, self.password, driver, self.host, self.database
        );
        for (key, value) in &self.extra_attributes {
            conn.push_str(&format!("{}={};", key, value));
        }
        conn
    }
}

impl std::fmt::Debug for DwhConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DwhConfig")
            .field("host", &self.host)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("driver_index", &self.driver_index)
            .field("connect_attempts", &self.connect_attempts)
            .field("retry_delay_ms", &self.retry_delay_ms)
            .field("extra_attributes", &self.extra_attributes)
            .finish()
    }
}
