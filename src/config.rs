// src/config.rs
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::channel::discord::DEFAULT_API_BASE;

/// Largest page the list endpoint accepts.
pub const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepConfig {
    /// Base URL of the chat service REST API
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Messages requested per list call (1..=100)
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Delay after every delete attempt, in milliseconds
    #[serde(default = "default_pace_ms")]
    pub pace_ms: u64,

    /// Timeout for a single remote call, in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Retries for rate-limited or failed remote calls (0 = no retry)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Web UI host (default: 127.0.0.1)
    #[serde(default = "default_web_host")]
    pub web_host: String,

    /// Web UI port (default: 5000)
    #[serde(default = "default_web_port")]
    pub web_port: u16,

    /// Finished jobs kept for inspection
    #[serde(default = "default_job_history")]
    pub job_history: usize,

    /// tracing filter directive, overridden by RUST_LOG
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

fn default_page_size() -> u32 {
    50
}

fn default_pace_ms() -> u64 {
    1500
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_max_retries() -> u32 {
    3
}

fn default_web_host() -> String {
    "127.0.0.1".to_string()
}

fn default_web_port() -> u16 {
    5000
}

fn default_job_history() -> usize {
    16
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            page_size: default_page_size(),
            pace_ms: default_pace_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            max_retries: default_max_retries(),
            web_host: default_web_host(),
            web_port: default_web_port(),
            job_history: default_job_history(),
            log_filter: default_log_filter(),
        }
    }
}

/// Values passed on the command line. Only fields that were explicitly
/// set (Some) override the file.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub api_base: Option<String>,
    pub web_host: Option<String>,
    pub web_port: Option<u16>,
    pub page_size: Option<u32>,
    pub pace_ms: Option<u64>,
}

impl SweepConfig {
    pub fn apply_overrides(&mut self, overrides: &Overrides) {
        if let Some(ref api_base) = overrides.api_base {
            self.api_base = api_base.clone();
        }
        if let Some(ref host) = overrides.web_host {
            self.web_host = host.clone();
        }
        if let Some(port) = overrides.web_port {
            self.web_port = port;
        }
        if let Some(page_size) = overrides.page_size {
            self.page_size = page_size;
        }
        if let Some(pace_ms) = overrides.pace_ms {
            self.pace_ms = pace_ms;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            anyhow::bail!(
                "page_size must be between 1 and {MAX_PAGE_SIZE}, got {}",
                self.page_size
            );
        }
        if self.request_timeout_secs == 0 {
            anyhow::bail!("request_timeout_secs must be greater than 0");
        }
        if !self.api_base.starts_with("http://") && !self.api_base.starts_with("https://") {
            anyhow::bail!("api_base must be an http(s) URL, got '{}'", self.api_base);
        }
        Ok(())
    }

    pub fn pace(&self) -> Duration {
        Duration::from_millis(self.pace_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn web_addr(&self) -> String {
        format!("{}:{}", self.web_host, self.web_port)
    }
}

pub fn config_path(dir: &Path) -> PathBuf {
    dir.join("chatsweep.toml")
}

pub fn load_config(path: &Path) -> Result<Option<SweepConfig>> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config at {}", path.display()))?;
    let config: SweepConfig = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(Some(config))
}

pub fn save_config(path: &Path, config: &SweepConfig) -> Result<()> {
    let toml = toml::to_string_pretty(config)?;
    std::fs::write(path, toml)?;
    Ok(())
}
