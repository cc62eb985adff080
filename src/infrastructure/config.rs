//! Configuration infrastructure
//!
//! Settings are layered: built-in defaults, then an optional JSON file, then
//! environment variables prefixed with `BIZSCOUT` (`__` separates sections,
//! e.g. `BIZSCOUT_CRAWLER__MAX_PAGES=3`).

#![allow(clippy::uninlined_format_args)]

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::fs;
use tracing::info;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load config: {source}")]
    Load {
        #[from]
        source: config::ConfigError,
    },

    #[error("Configuration validation failed: {message}")]
    Validation { message: String },
}

impl ConfigError {
    fn validation(message: impl Into<String>) -> Self {
        Self::Validation { message: message.into() }
    }
}

/// Complete application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub crawler: CrawlerConfig,
    pub browser: BrowserConfig,
    pub resolver: ResolverConfig,
    pub database: DatabaseConfig,
    pub worker: WorkerConfig,
    pub logging: LoggingConfig,
}

/// Pagination caps, waits and pacing of one crawl session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Maximum result pages consulted per source
    pub max_pages: u32,

    /// Maximum aggregated listings kept per source
    pub max_listings: usize,

    /// Wait for the results container after navigation
    pub results_timeout_ms: u64,

    /// Wait for listing elements on each page
    pub listing_timeout_ms: u64,

    /// Wait for the main element of a detail page
    pub detail_timeout_ms: u64,

    /// Lower bound of the random pause between navigations
    pub pacing_min_ms: u64,

    /// Upper bound of the random pause between navigations
    pub pacing_max_ms: u64,
}

/// Browser session and anti-detection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// WebDriver endpoint (chromedriver)
    pub webdriver_url: String,
    pub headless: bool,
    /// Rotation pool; one agent is drawn per session
    pub user_agents: Vec<String>,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub locale: String,
    pub timezone: String,
    pub latitude: f64,
    pub longitude: f64,
    pub proxy: ProxyConfig,
}

/// Optional upstream proxy
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    pub enabled: bool,
    /// `scheme://host:port`
    pub server: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Duplicate detection thresholds and confidence weights
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    pub name_threshold: f64,
    pub address_threshold: f64,
    /// Name similarity that alone declares a duplicate
    pub strong_name_threshold: f64,
    pub name_weight: f64,
    pub address_weight: f64,
    pub phone_weight: f64,
    /// Name tokens used by the candidate prefilter
    pub max_name_terms: usize,
    /// Tokens must be longer than this many characters
    pub min_term_chars: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

/// Local task queue and worker pool
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub workers: usize,
    pub queue_capacity: usize,
    pub queue_name: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Enable JSON formatted logs for the file output
    pub json_format: bool,

    /// Enable console output
    pub console_output: bool,

    /// Enable file output
    pub file_output: bool,

    /// Directory for log files; next to the executable when unset
    pub log_dir: Option<PathBuf>,

    /// Log file name
    pub file_name: String,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_pages: defaults::MAX_PAGES,
            max_listings: defaults::MAX_LISTINGS,
            results_timeout_ms: defaults::RESULTS_TIMEOUT_MS,
            listing_timeout_ms: defaults::LISTING_TIMEOUT_MS,
            detail_timeout_ms: defaults::DETAIL_TIMEOUT_MS,
            pacing_min_ms: defaults::PACING_MIN_MS,
            pacing_max_ms: defaults::PACING_MAX_MS,
        }
    }
}

impl CrawlerConfig {
    pub const fn results_timeout(&self) -> Duration {
        Duration::from_millis(self.results_timeout_ms)
    }

    pub const fn listing_timeout(&self) -> Duration {
        Duration::from_millis(self.listing_timeout_ms)
    }

    pub const fn detail_timeout(&self) -> Duration {
        Duration::from_millis(self.detail_timeout_ms)
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            webdriver_url: defaults::WEBDRIVER_URL.to_string(),
            headless: true,
            user_agents: defaults::USER_AGENTS.iter().map(ToString::to_string).collect(),
            viewport_width: defaults::VIEWPORT_WIDTH,
            viewport_height: defaults::VIEWPORT_HEIGHT,
            locale: defaults::LOCALE.to_string(),
            timezone: defaults::TIMEZONE.to_string(),
            latitude: defaults::LATITUDE,
            longitude: defaults::LONGITUDE,
            proxy: ProxyConfig::default(),
        }
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            name_threshold: defaults::NAME_THRESHOLD,
            address_threshold: defaults::ADDRESS_THRESHOLD,
            strong_name_threshold: defaults::STRONG_NAME_THRESHOLD,
            name_weight: defaults::NAME_WEIGHT,
            address_weight: defaults::ADDRESS_WEIGHT,
            phone_weight: defaults::PHONE_WEIGHT,
            max_name_terms: defaults::MAX_NAME_TERMS,
            min_term_chars: defaults::MIN_TERM_CHARS,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: defaults::DATABASE_URL.to_string(),
            max_connections: defaults::DB_MAX_CONNECTIONS,
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            workers: defaults::WORKERS,
            queue_capacity: defaults::QUEUE_CAPACITY,
            queue_name: defaults::QUEUE_NAME.to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::LOG_LEVEL.to_string(),
            json_format: defaults::LOG_JSON_FORMAT,
            console_output: defaults::LOG_CONSOLE_OUTPUT,
            file_output: defaults::LOG_FILE_OUTPUT,
            log_dir: None,
            file_name: defaults::LOG_FILE_NAME.to_string(),
        }
    }
}

impl AppConfig {
    /// Load defaults, then `path` (if given), then `BIZSCOUT_*` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&Self::default())?);

        if let Some(path) = path {
            builder = builder.add_source(
                config::File::from(path)
                    .format(config::FileFormat::Json)
                    .required(true),
            );
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix(defaults::ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let crawler = &self.crawler;
        if crawler.max_pages == 0 || crawler.max_listings == 0 {
            return Err(ConfigError::validation("crawler caps must be at least 1"));
        }
        if crawler.max_pages > defaults::MAX_PAGES || crawler.max_listings > defaults::MAX_LISTINGS {
            return Err(ConfigError::validation(format!(
                "crawler caps must not exceed {} pages and {} listings",
                defaults::MAX_PAGES,
                defaults::MAX_LISTINGS
            )));
        }
        if crawler.pacing_min_ms > crawler.pacing_max_ms {
            return Err(ConfigError::validation(format!(
                "pacing_min_ms ({}) must not exceed pacing_max_ms ({})",
                crawler.pacing_min_ms, crawler.pacing_max_ms
            )));
        }

        if self.browser.user_agents.is_empty() {
            return Err(ConfigError::validation("browser.user_agents must not be empty"));
        }
        if self.browser.proxy.enabled && self.browser.proxy.server.as_deref().is_none_or(str::is_empty) {
            return Err(ConfigError::validation("browser.proxy.server is required when the proxy is enabled"));
        }

        let resolver = &self.resolver;
        for (name, value) in [
            ("name_threshold", resolver.name_threshold),
            ("address_threshold", resolver.address_threshold),
            ("strong_name_threshold", resolver.strong_name_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::validation(format!("resolver.{name} must be within [0, 1]")));
            }
        }
        if [resolver.name_weight, resolver.address_weight, resolver.phone_weight]
            .iter()
            .any(|w| *w < 0.0)
        {
            return Err(ConfigError::validation("resolver weights must be non-negative"));
        }

        if self.worker.workers == 0 || self.worker.queue_capacity == 0 {
            return Err(ConfigError::validation("worker pool needs at least one worker and queue slot"));
        }

        Ok(())
    }
}

/// Configuration file manager
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Get the application configuration directory
    pub fn get_config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get user config directory")?
            .join(defaults::APP_DIR_NAME);

        Ok(config_dir)
    }

    /// Manager for the default per-user configuration file
    pub fn new() -> Result<Self> {
        let config_dir = Self::get_config_dir()?;
        Ok(Self::with_path(config_dir.join(defaults::CONFIG_FILE_NAME)))
    }

    pub const fn with_path(config_path: PathBuf) -> Self {
        Self { config_path }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Write the default configuration on first run, then load with env overrides
    pub async fn initialize_on_first_run(&self) -> Result<AppConfig> {
        if !self.config_path.exists() {
            info!("🎉 First run detected - writing default configuration to {:?}", self.config_path);
            self.save_config(&AppConfig::default()).await?;
        }

        self.load_config()
    }

    /// Load the managed file layered with environment overrides
    pub fn load_config(&self) -> Result<AppConfig> {
        AppConfig::load(Some(&self.config_path))
            .with_context(|| format!("Failed to load configuration from {:?}", self.config_path))
    }

    pub async fn save_config(&self, config: &AppConfig) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = serde_json::to_string_pretty(config).context("Failed to serialize configuration")?;
        fs::write(&self.config_path, content)
            .await
            .context("Failed to write configuration file")?;

        info!("✅ Configuration saved to {:?}", self.config_path);
        Ok(())
    }
}

/// Default configuration values
pub mod defaults {
    pub const APP_DIR_NAME: &str = "bizscout";
    pub const CONFIG_FILE_NAME: &str = "bizscout_config.json";
    pub const ENV_PREFIX: &str = "BIZSCOUT";

    // Crawl session
    pub const MAX_PAGES: u32 = 5;
    pub const MAX_LISTINGS: usize = 100;
    pub const RESULTS_TIMEOUT_MS: u64 = 10_000;
    pub const LISTING_TIMEOUT_MS: u64 = 5_000;
    pub const DETAIL_TIMEOUT_MS: u64 = 10_000;
    pub const PACING_MIN_MS: u64 = 2_000;
    pub const PACING_MAX_MS: u64 = 4_000;

    // Browser
    pub const WEBDRIVER_URL: &str = "http://localhost:9515";
    pub const VIEWPORT_WIDTH: u32 = 1920;
    pub const VIEWPORT_HEIGHT: u32 = 1080;
    pub const LOCALE: &str = "en-US";
    pub const TIMEZONE: &str = "America/New_York";
    pub const LATITUDE: f64 = 40.7128;
    pub const LONGITUDE: f64 = -74.0060;
    pub const USER_AGENTS: &[&str] = &[
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36",
    ];

    // Entity resolution
    pub const NAME_THRESHOLD: f64 = 0.8;
    pub const ADDRESS_THRESHOLD: f64 = 0.7;
    pub const STRONG_NAME_THRESHOLD: f64 = 0.95;
    pub const NAME_WEIGHT: f64 = 0.4;
    pub const ADDRESS_WEIGHT: f64 = 0.3;
    pub const PHONE_WEIGHT: f64 = 0.3;
    pub const MAX_NAME_TERMS: usize = 3;
    pub const MIN_TERM_CHARS: usize = 3;

    // Storage
    pub const DATABASE_URL: &str = "sqlite:data/bizscout.db";
    pub const DB_MAX_CONNECTIONS: u32 = 10;

    // Worker pool
    pub const WORKERS: usize = 2;
    pub const QUEUE_CAPACITY: usize = 64;
    pub const QUEUE_NAME: &str = "scraping";

    // Logging
    pub const LOG_LEVEL: &str = "info";
    pub const LOG_JSON_FORMAT: bool = false;
    pub const LOG_CONSOLE_OUTPUT: bool = true;
    pub const LOG_FILE_OUTPUT: bool = true;
    pub const LOG_FILE_NAME: &str = "bizscout.log";
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        config.validate().unwrap();
        assert_eq!(config.crawler.max_pages, 5);
        assert_eq!(config.crawler.max_listings, 100);
        assert_eq!(config.browser.user_agents.len(), 4);
    }

    #[test]
    fn test_load_file_overrides_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"crawler": {"max_pages": 3}, "worker": {"workers": 4}}"#).unwrap();

        let config = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(config.crawler.max_pages, 3);
        assert_eq!(config.crawler.max_listings, 100);
        assert_eq!(config.worker.workers, 4);
    }

    #[test]
    fn test_validation_rejects_caps_above_hard_limits() {
        let mut config = AppConfig::default();
        config.crawler.max_pages = 20;
        assert!(matches!(config.validate(), Err(ConfigError::Validation { .. })));

        let mut config = AppConfig::default();
        config.crawler.max_listings = 1000;
        assert!(matches!(config.validate(), Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn test_load_rejects_file_raising_caps() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"crawler": {"max_pages": 20, "max_listings": 1000}}"#).unwrap();

        assert!(matches!(AppConfig::load(Some(&path)), Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn test_validation_rejects_inverted_pacing() {
        let mut config = AppConfig::default();
        config.crawler.pacing_min_ms = 5_000;
        config.crawler.pacing_max_ms = 1_000;
        assert!(matches!(config.validate(), Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn test_validation_requires_proxy_server() {
        let mut config = AppConfig::default();
        config.browser.proxy.enabled = true;
        assert!(config.validate().is_err());
        config.browser.proxy.server = Some("http://10.0.0.1:3128".into());
        assert!(config.validate().is_ok());
    }

    #[tokio::test]
    async fn test_first_run_writes_defaults() {
        let dir = tempdir().unwrap();
        let manager = ConfigManager::with_path(dir.path().join("nested").join("bizscout.json"));

        let config = manager.initialize_on_first_run().await.unwrap();
        assert!(manager.config_path().exists());
        assert_eq!(config.worker.queue_name, "scraping");
    }
}
