//! Process-level configuration.
//!
//! Everything here is read once at startup from the environment (optionally
//! seeded from a `.env` file). Import tunables that an operator edits at
//! runtime live in the settings table instead, see `store::settings`.

use log::warn;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    /// SQLite file holding settings, runs, the work queue and the catalog.
    pub database: PathBuf,
    /// Uploaded CSV files are stored here before import.
    pub upload_dir: PathBuf,
    /// How often the scheduler drains the queue when nothing wakes it earlier.
    pub drain_interval: Duration,
    pub drain_max_items: usize,
    pub drain_max_duration: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            database: PathBuf::from("importer.sqlite"),
            upload_dir: PathBuf::from("uploads"),
            drain_interval: Duration::from_secs(5),
            drain_max_items: 200,
            drain_max_duration: Duration::from_secs(20),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        if dotenv::dotenv().is_err() {
            log::debug!("no .env file found, using process environment only");
        }
        let defaults = Self::default();
        Self {
            host: env::var("IMPORTER_HOST").unwrap_or(defaults.host),
            port: parse_var("IMPORTER_PORT", defaults.port),
            database: env::var("IMPORTER_DB")
                .map(PathBuf::from)
                .unwrap_or(defaults.database),
            upload_dir: env::var("IMPORTER_UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.upload_dir),
            drain_interval: Duration::from_secs(parse_var(
                "IMPORTER_DRAIN_INTERVAL_SECS",
                defaults.drain_interval.as_secs(),
            )),
            drain_max_items: parse_var("IMPORTER_DRAIN_MAX_ITEMS", defaults.drain_max_items),
            drain_max_duration: Duration::from_secs(parse_var(
                "IMPORTER_DRAIN_MAX_SECS",
                defaults.drain_max_duration.as_secs(),
            )),
        }
    }
}

fn parse_var<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("ignoring {}={:?}: not a valid value", key, raw);
            default
        }),
        Err(_) => default,
    }
}
