//! Configuration file handling for qbank

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use qbank_client::batch::{DEFAULT_PAGE_SIZE, DEFAULT_POLL_INTERVAL};
use qbank_client::Endpoints;
use serde::{Deserialize, Serialize};

const DEFAULT_SERVER: &str = "http://localhost:8000";

/// Configuration for the CLI tool
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Default server URL
    pub server: Option<String>,
    /// Default output format
    pub output: Option<String>,
    /// Disable colored output
    pub no_color: Option<bool>,
    /// Rows per page for list and progress commands
    pub page_size: Option<u32>,
    /// Batch progress polling interval
    pub poll_interval_ms: Option<u64>,
    /// Endpoint path overrides; unset paths keep their defaults
    pub endpoints: Option<Endpoints>,
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
            .join("qbank");

        Ok(config_dir.join("config.toml"))
    }

    /// Merge CLI arguments over config file values
    pub fn merge_with_args(
        &self,
        server: Option<&str>,
        output: Option<&str>,
        no_color: bool,
    ) -> MergedConfig {
        MergedConfig {
            server: server
                .map(String::from)
                .or_else(|| self.server.clone())
                .unwrap_or_else(|| DEFAULT_SERVER.to_string()),
            output: output
                .map(String::from)
                .or_else(|| self.output.clone())
                .unwrap_or_else(|| "table".to_string()),
            no_color: no_color || self.no_color.unwrap_or(false),
            page_size: self.page_size.filter(|&n| n > 0).unwrap_or(DEFAULT_PAGE_SIZE),
            poll_interval: self
                .poll_interval_ms
                .filter(|&ms| ms > 0)
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_POLL_INTERVAL),
            endpoints: self.endpoints.clone().unwrap_or_default(),
        }
    }
}

/// Fully resolved configuration after merging CLI args
#[derive(Debug, Clone)]
pub struct MergedConfig {
    pub server: String,
    pub output: String,
    pub no_color: bool,
    pub page_size: u32,
    pub poll_interval: Duration,
    pub endpoints: Endpoints,
}
