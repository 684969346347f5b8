//! Configuration management for MeteoBCN
//!
//! Handles loading configuration from an optional TOML file and environment
//! variables, and validates every setting before the engine starts.

use crate::error::MeteoError;
use crate::models::ProviderId;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MeteoConfig {
    /// HTTP fetch policy
    #[serde(default)]
    pub http: HttpConfig,
    /// Upstream provider settings and credentials
    #[serde(default)]
    pub providers: ProvidersConfig,
    /// Live upstream data or simulated data
    #[serde(default)]
    pub data_mode: DataMode,
    /// Station list cache
    #[serde(default)]
    pub cache: CacheConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Timeout and retry policy applied to every upstream request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Per-attempt timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Retries after the first attempt
    #[serde(default = "default_retries")]
    pub retries: u32,
    /// Base delay for exponential backoff in milliseconds
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    /// Providers tried in order when no provider is explicitly selected
    #[serde(default = "default_priority")]
    pub priority: Vec<ProviderId>,
    /// Meteocat API key (required for the Meteocat provider)
    pub meteocat_api_key: Option<String>,
    /// Optional Socrata application token, raises the anonymous rate limit
    pub socrata_app_token: Option<String>,
    #[serde(default = "default_socrata_base_url")]
    pub socrata_base_url: String,
    #[serde(default = "default_meteocat_base_url")]
    pub meteocat_base_url: String,
    #[serde(default = "default_open_meteo_archive_url")]
    pub open_meteo_archive_url: String,
    /// Rows requested per Socrata page
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DataMode {
    #[default]
    Live,
    Mock,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// How long a fetched station list stays fresh
    #[serde(default = "default_stations_ttl")]
    pub stations_ttl_minutes: u64,
}

/// Logging configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (pretty or compact)
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_timeout_ms() -> u64 {
    10_000
}

fn default_retries() -> u32 {
    2
}

fn default_retry_delay_ms() -> u64 {
    1_000
}

fn default_priority() -> Vec<ProviderId> {
    vec![
        ProviderId::XemaTransparencia,
        ProviderId::Meteocat,
        ProviderId::OpenMeteo,
    ]
}

fn default_socrata_base_url() -> String {
    "https://analisi.transparenciacatalunya.cat".to_string()
}

fn default_meteocat_base_url() -> String {
    "https://api.meteo.cat/xema/v1".to_string()
}

fn default_open_meteo_archive_url() -> String {
    "https://archive-api.open-meteo.com/v1/archive".to_string()
}

fn default_page_size() -> usize {
    50_000
}

fn default_stations_ttl() -> u64 {
    60
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

const MAX_PAGE_SIZE: usize = 50_000;
const MAX_STATIONS_TTL_MINUTES: u64 = 7 * 24 * 60;

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            retries: default_retries(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl HttpConfig {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    #[must_use]
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            priority: default_priority(),
            meteocat_api_key: None,
            socrata_app_token: None,
            socrata_base_url: default_socrata_base_url(),
            meteocat_base_url: default_meteocat_base_url(),
            open_meteo_archive_url: default_open_meteo_archive_url(),
            page_size: default_page_size(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            stations_ttl_minutes: default_stations_ttl(),
        }
    }
}

impl CacheConfig {
    #[must_use]
    pub fn stations_ttl(&self) -> chrono::Duration {
        let minutes = self.stations_ttl_minutes.min(MAX_STATIONS_TTL_MINUTES);
        chrono::Duration::minutes(i64::try_from(minutes).unwrap_or(0))
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl MeteoConfig {
    /// Load configuration from the default file and environment variables
    pub fn load() -> crate::Result<Self> {
        Self::load_from_path(None)
    }

    /// Load configuration from specified path
    pub fn load_from_path(config_path: Option<PathBuf>) -> crate::Result<Self> {
        let mut builder = Config::builder();

        let config_file = config_path.unwrap_or_else(Self::get_config_path);

        if config_file.exists() {
            builder = builder.add_source(
                File::from(config_file.clone())
                    .required(false)
                    .format(config::FileFormat::Toml),
            );
        }

        // METEOBCN_PROVIDERS__METEOCAT_API_KEY=... overrides providers.meteocat_api_key
        builder = builder.add_source(
            Environment::with_prefix("METEOBCN")
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("providers.priority")
                .try_parsing(true),
        );

        let settings = builder
            .build()
            .map_err(|e| MeteoError::config(format!("Failed to build configuration: {e}")))?;

        let mut config: MeteoConfig = settings
            .try_deserialize()
            .map_err(|e| MeteoError::config(format!("Failed to deserialize configuration: {e}")))?;

        config.apply_defaults();
        config.validate()?;

        Ok(config)
    }

    /// Get the default configuration file path
    #[must_use]
    pub fn get_config_path() -> PathBuf {
        PathBuf::from("meteo-bcn.toml")
    }

    /// Apply default values to empty configuration fields
    pub fn apply_defaults(&mut self) {
        if self.http.timeout_ms == 0 {
            self.http.timeout_ms = default_timeout_ms();
        }
        if self.providers.priority.is_empty() {
            self.providers.priority = default_priority();
        }
        if self.providers.socrata_base_url.is_empty() {
            self.providers.socrata_base_url = default_socrata_base_url();
        }
        if self.providers.meteocat_base_url.is_empty() {
            self.providers.meteocat_base_url = default_meteocat_base_url();
        }
        if self.providers.open_meteo_archive_url.is_empty() {
            self.providers.open_meteo_archive_url = default_open_meteo_archive_url();
        }
        if self.providers.page_size == 0 {
            self.providers.page_size = default_page_size();
        }
        // Blank credentials behave like absent ones
        if self
            .providers
            .meteocat_api_key
            .as_deref()
            .is_some_and(|k| k.trim().is_empty())
        {
            self.providers.meteocat_api_key = None;
        }
        if self
            .providers
            .socrata_app_token
            .as_deref()
            .is_some_and(|k| k.trim().is_empty())
        {
            self.providers.socrata_app_token = None;
        }
        if self.logging.level.is_empty() {
            self.logging.level = default_log_level();
        }
        if self.logging.format.is_empty() {
            self.logging.format = default_log_format();
        }
    }

    /// Validate all configuration settings
    pub fn validate(&self) -> crate::Result<()> {
        self.validate_numeric_ranges()?;
        self.validate_string_values()?;
        Ok(())
    }

    fn validate_numeric_ranges(&self) -> crate::Result<()> {
        if self.http.timeout_ms > 120_000 {
            return Err(MeteoError::config(
                "HTTP timeout cannot exceed 120000 ms",
            ));
        }

        if self.http.retries > 10 {
            return Err(MeteoError::config("HTTP retries cannot exceed 10"));
        }

        if self.http.retry_delay_ms > 60_000 {
            return Err(MeteoError::config(
                "HTTP retry delay cannot exceed 60000 ms",
            ));
        }

        if self.cache.stations_ttl_minutes > MAX_STATIONS_TTL_MINUTES {
            return Err(MeteoError::config(
                "Station cache TTL cannot exceed 10080 minutes (1 week)",
            ));
        }

        if self.providers.page_size > MAX_PAGE_SIZE {
            return Err(MeteoError::config(format!(
                "Socrata page size cannot exceed {MAX_PAGE_SIZE}"
            )));
        }

        Ok(())
    }

    fn validate_string_values(&self) -> crate::Result<()> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.logging.level.as_str()) {
            return Err(MeteoError::config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.logging.level,
                valid_log_levels.join(", ")
            )));
        }

        let valid_log_formats = ["pretty", "compact"];
        if !valid_log_formats.contains(&self.logging.format.as_str()) {
            return Err(MeteoError::config(format!(
                "Invalid log format '{}'. Must be one of: {}",
                self.logging.format,
                valid_log_formats.join(", ")
            )));
        }

        for (name, url) in [
            ("socrata_base_url", &self.providers.socrata_base_url),
            ("meteocat_base_url", &self.providers.meteocat_base_url),
            ("open_meteo_archive_url", &self.providers.open_meteo_archive_url),
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(MeteoError::config(format!(
                    "{name} must be a valid HTTP or HTTPS URL"
                )));
            }
        }

        Ok(())
    }
}
