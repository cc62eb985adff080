//! Infrastructure layer - configuration, logging, storage and browser crawling
//!
//! Everything that talks to the outside world: the SQLite store, chromedriver
//! sessions and the per-directory adapters.

pub mod adapters;
pub mod browser;
pub mod config;
pub mod crawl_session;
pub mod database_connection;
pub mod logging;
pub mod sqlite_store;
pub mod stealth;

// Re-export commonly used items
pub use adapters::{AdapterRegistry, SourceAdapter};
pub use browser::{BrowserLauncher, BrowserPage, WebDriverLauncher};
pub use config::{AppConfig, ConfigManager};
pub use crawl_session::{CrawlLimits, CrawlOutcome, CrawlSession, StopReason};
pub use database_connection::DatabaseConnection;
pub use logging::{get_log_directory, init_logging, init_logging_with_config};
pub use sqlite_store::SqliteDiscoveryStore;
pub use stealth::StealthPolicy;
