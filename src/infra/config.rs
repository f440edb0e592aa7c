//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml
//!
//! Secrets and endpoints can be overridden from the environment
//! (BOOKING_API_KEY, BOOKING_API_URL, NEWSLETTER_URL). Configuration is
//! validated once at startup and is immutable afterwards.

use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

/// Deployment instant of the automation; nothing created at or before it is forwarded
pub const DEFAULT_AUTOMATION_CUTOFF: &str = "2025-07-26T21:00:00Z";

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_http_timeout_ms")]
    pub timeout_ms: u64,
    /// Runaway guard on pages drained per fetch; reaching it fails the fetch
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
    /// Query parameter used to filter bookings by start time (empty disables)
    #[serde(default = "default_start_time_param")]
    pub start_time_param: String,
}

fn default_http_timeout_ms() -> u64 {
    10_000
}

fn default_max_pages() -> u32 {
    1000
}

fn default_start_time_param() -> String {
    "afterStart".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewsletterConfig {
    pub subscribe_url: String,
    /// Alternate endpoint tried once when the primary submission fails
    #[serde(default)]
    pub fallback_url: Option<String>,
    #[serde(default = "default_http_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Delay between consecutive submissions
    #[serde(default = "default_pacing_ms")]
    pub pacing_ms: u64,
    #[serde(default = "default_cutoff")]
    pub automation_cutoff: String,
}

fn default_interval_secs() -> u64 {
    300
}

fn default_pacing_ms() -> u64 {
    1000
}

fn default_cutoff() -> String {
    DEFAULT_AUTOMATION_CUTOFF.to_string()
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            pacing_ms: default_pacing_ms(),
            automation_cutoff: default_cutoff(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_processed_file")]
    pub processed_file: String,
    #[serde(default = "default_activity_log_file")]
    pub activity_log_file: String,
}

fn default_processed_file() -> String {
    "data/processed_bookings.json".to_string()
}

fn default_activity_log_file() -> String {
    "data/activity.log".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            processed_file: default_processed_file(),
            activity_log_file: default_activity_log_file(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Operational HTTP port (0 to disable)
    #[serde(default = "default_server_port")]
    pub port: u16,
}

fn default_server_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: default_server_port() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    pub source: SourceConfig,
    pub newsletter: NewsletterConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    source_base_url: String,
    source_api_key: Option<String>,
    source_timeout_ms: u64,
    source_max_pages: u32,
    source_start_time_param: String,
    subscribe_url: String,
    fallback_url: Option<String>,
    newsletter_timeout_ms: u64,
    interval_secs: u64,
    pacing_ms: u64,
    automation_cutoff: DateTime<Utc>,
    processed_file: String,
    activity_log_file: String,
    server_port: u16,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source_base_url: "http://localhost:9100".to_string(),
            source_api_key: None,
            source_timeout_ms: default_http_timeout_ms(),
            source_max_pages: default_max_pages(),
            source_start_time_param: default_start_time_param(),
            subscribe_url: "http://localhost:9100/subscribe".to_string(),
            fallback_url: None,
            newsletter_timeout_ms: default_http_timeout_ms(),
            interval_secs: default_interval_secs(),
            pacing_ms: default_pacing_ms(),
            automation_cutoff: parse_cutoff(DEFAULT_AUTOMATION_CUTOFF)
                .unwrap_or(DateTime::<Utc>::MIN_UTC),
            processed_file: default_processed_file(),
            activity_log_file: default_activity_log_file(),
            server_port: default_server_port(),
            config_file: "default".to_string(),
        }
    }
}

fn parse_cutoff(value: &str) -> anyhow::Result<DateTime<Utc>> {
    let parsed = DateTime::parse_from_rfc3339(value.trim())
        .with_context(|| format!("automation_cutoff '{}' is not RFC 3339", value))?;
    Ok(parsed.with_timezone(&Utc))
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

impl Config {
    /// Determine config file path from the CLI flag or environment
    pub fn resolve_config_path(cli_path: Option<&str>) -> String {
        if let Some(path) = cli_path {
            return path.to_string();
        }

        if let Ok(path) = env::var("CONFIG_FILE") {
            return path;
        }

        "config/dev.toml".to_string()
    }

    /// Parse configuration from TOML text without touching the environment
    pub fn from_toml_str(content: &str, origin: &str) -> anyhow::Result<Self> {
        let toml_config: TomlConfig = toml::from_str(content)
            .with_context(|| format!("Failed to parse config file {}", origin))?;

        Ok(Self {
            source_base_url: toml_config.source.base_url.trim_end_matches('/').to_string(),
            source_api_key: toml_config.source.api_key.and_then(non_empty),
            source_timeout_ms: toml_config.source.timeout_ms,
            source_max_pages: toml_config.source.max_pages,
            source_start_time_param: toml_config.source.start_time_param,
            subscribe_url: toml_config.newsletter.subscribe_url,
            fallback_url: toml_config.newsletter.fallback_url.and_then(non_empty),
            newsletter_timeout_ms: toml_config.newsletter.timeout_ms,
            interval_secs: toml_config.sync.interval_secs,
            pacing_ms: toml_config.sync.pacing_ms,
            automation_cutoff: parse_cutoff(&toml_config.sync.automation_cutoff)?,
            processed_file: toml_config.storage.processed_file,
            activity_log_file: toml_config.storage.activity_log_file,
            server_port: toml_config.server.port,
            config_file: origin.to_string(),
        })
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&content, &path.display().to_string())
    }

    /// Load, apply environment overrides and validate
    ///
    /// Any error here is a startup-time hard stop.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let mut config = Self::from_file(path)?;
        config.apply_overrides(|key| env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Override secrets and endpoints from a key lookup (the process env in production)
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("BOOKING_API_KEY").and_then(non_empty) {
            self.source_api_key = Some(key);
        }
        if let Some(url) = lookup("BOOKING_API_URL").and_then(non_empty) {
            self.source_base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(url) = lookup("NEWSLETTER_URL").and_then(non_empty) {
            self.subscribe_url = url;
        }
    }

    /// Reject configurations that would only fail mid-cycle
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.source_api_key.is_none() {
            bail!("booking API key missing: set source.api_key or BOOKING_API_KEY");
        }
        if self.source_base_url.trim().is_empty() {
            bail!("source.base_url must not be empty");
        }
        if self.subscribe_url.trim().is_empty() {
            bail!("newsletter.subscribe_url must not be empty");
        }
        if self.interval_secs == 0 {
            bail!("sync.interval_secs must be greater than zero");
        }
        if self.source_max_pages == 0 {
            bail!("source.max_pages must be greater than zero");
        }
        Ok(())
    }

    // Getters for all config fields
    pub fn source_base_url(&self) -> &str {
        &self.source_base_url
    }

    pub fn source_api_key(&self) -> Option<&str> {
        self.source_api_key.as_deref()
    }

    pub fn source_timeout_ms(&self) -> u64 {
        self.source_timeout_ms
    }

    pub fn source_max_pages(&self) -> u32 {
        self.source_max_pages
    }

    pub fn source_start_time_param(&self) -> &str {
        &self.source_start_time_param
    }

    pub fn subscribe_url(&self) -> &str {
        &self.subscribe_url
    }

    pub fn fallback_url(&self) -> Option<&str> {
        self.fallback_url.as_deref()
    }

    pub fn newsletter_timeout_ms(&self) -> u64 {
        self.newsletter_timeout_ms
    }

    pub fn interval_secs(&self) -> u64 {
        self.interval_secs
    }

    pub fn pacing_ms(&self) -> u64 {
        self.pacing_ms
    }

    pub fn automation_cutoff(&self) -> DateTime<Utc> {
        self.automation_cutoff
    }

    pub fn processed_file(&self) -> &str {
        &self.processed_file
    }

    pub fn activity_log_file(&self) -> &str {
        &self.activity_log_file
    }

    pub fn server_port(&self) -> u16 {
        self.server_port
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method for tests to set the API key
    #[cfg(test)]
    pub fn with_api_key(mut self, key: &str) -> Self {
        self.source_api_key = Some(key.to_string());
        self
    }
}
