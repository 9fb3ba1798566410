//! Configuration file handling for opcmap

use anyhow::{Context, Result};
use opcmap_client::{AuthConfig, CatalogConfig, OpcUaConfig, RawHistoryConfig};
use opcmap_dwh::{DriverBackend, DwhConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration for the CLI tool
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub gateway: Option<GatewaySection>,
    pub auth: Option<AuthConfig>,
    pub catalog: Option<CatalogConfig>,
    pub dwh: Option<DwhSection>,
    /// Default output format
    pub output: Option<String>,
    /// Disable colored output
    pub no_color: Option<bool>,
}

/// `[gateway]` table
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GatewaySection {
    pub rest_url: Option<String>,
    pub opcua_url: Option<String>,
    pub namespaces: Option<Vec<String>>,
    #[serde(default)]
    pub raw_history: RawHistoryConfig,
}

/// `[dwh]` table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DwhSection {
    #[serde(default)]
    pub backend: DriverBackend,
    #[serde(flatten)]
    pub connection: DwhConfig,
}

/// Values given on the command line or through the environment
#[derive(Debug, Default)]
pub struct Overrides<'a> {
    pub rest_url: Option<&'a str>,
    pub opcua_url: Option<&'a str>,
    pub catalog_url: Option<&'a str>,
    pub output: Option<&'a str>,
    pub no_color: bool,
}

impl Config {
    /// Load configuration from the default config file
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Get the default config file path
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?
            .join("opcmap");

        Ok(config_dir.join("config.toml"))
    }

    /// Merge CLI arguments over config file values
    pub fn merge_with_args(&self, args: &Overrides<'_>) -> MergedConfig {
        let gateway = self.gateway.clone().unwrap_or_default();
        MergedConfig {
            rest_url: args.rest_url.map(String::from).or(gateway.rest_url),
            opcua_url: args.opcua_url.map(String::from).or(gateway.opcua_url),
            namespaces: gateway.namespaces,
            raw_history: gateway.raw_history,
            catalog_url: args
                .catalog_url
                .map(String::from)
                .or_else(|| self.catalog.as_ref().map(|c| c.url.clone())),
            auth: self.auth.clone(),
            dwh: self.dwh.clone(),
            output: args
                .output
                .map(String::from)
                .or_else(|| self.output.clone())
                .unwrap_or_else(|| "table".to_string()),
            no_color: args.no_color || self.no_color.unwrap_or(false),
        }
    }
}

/// Fully resolved configuration after merging CLI args
#[derive(Debug, Clone)]
pub struct MergedConfig {
    pub rest_url: Option<String>,
    pub opcua_url: Option<String>,
    pub namespaces: Option<Vec<String>>,
    pub raw_history: RawHistoryConfig,
    pub catalog_url: Option<String>,
    pub auth: Option<AuthConfig>,
    pub dwh: Option<DwhSection>,
    pub output: String,
    pub no_color: bool,
}

impl MergedConfig {
    /// Gateway client settings; both URLs must be known
    pub fn opcua(&self) -> Result<OpcUaConfig> {
        let rest_url = self
            .rest_url
            .clone()
            .context("No gateway REST URL (use --rest-url or [gateway] rest_url)")?;
        let opcua_url = self
            .opcua_url
            .clone()
            .context("No OPC UA server URL (use --opcua-url or [gateway] opcua_url)")?;
        let mut config = OpcUaConfig::new(rest_url, opcua_url);
        config.namespaces = self.namespaces.clone();
        config.raw_history = self.raw_history.clone();
        Ok(config)
    }

    pub fn catalog(&self) -> Result<CatalogConfig> {
        let url = self
            .catalog_url
            .clone()
            .context("No model index URL (use --catalog-url or [catalog] url)")?;
        Ok(CatalogConfig { url })
    }

    pub fn dwh(&self) -> Result<DwhSection> {
        self.dwh
            .clone()
            .context("No data warehouse configured (add a [dwh] table to the config file)")
    }
}
