//! Server configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the server can start with zero
//! configuration for local development. A `.env` file is read first by
//! `main`; variables already set in the environment take precedence.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use groupsnap_shared::constants::{
    DEFAULT_COUNTDOWN_SECS, DEFAULT_HTTP_PORT, DEFAULT_JPEG_QUALITY, DEFAULT_KEEPALIVE_SECS,
    DEFAULT_MAX_UPLOAD_SIZE, DEFAULT_STATUS_PUSH_SECS, DEFAULT_WORKER_POLL_SECS,
};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP (axum) API server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:8080`
    pub http_addr: SocketAddr,

    /// SQLite database file.
    /// Env: `DATABASE_PATH`
    /// Default: `./groupsnap.db`
    pub database_path: PathBuf,

    /// Directory holding uploaded photos and composed results.
    /// Env: `UPLOAD_STORAGE_PATH`
    /// Default: `./uploads`
    pub upload_storage_path: PathBuf,

    /// JSON template catalog.
    /// Env: `TEMPLATES_PATH`
    /// Default: `./resources/templates.json`
    pub templates_path: PathBuf,

    /// Maximum accepted photo size in bytes.
    /// Env: `MAX_UPLOAD_SIZE`
    /// Default: 20 MiB
    pub max_upload_size: usize,

    /// Env: `WORKER_POLL_INTERVAL_SECS`
    pub worker_poll_interval: Duration,

    /// Delay between the last ready signal and the capture moment.
    /// Env: `COUNTDOWN_SECS`
    pub countdown: Duration,

    /// Env: `STATUS_PUSH_INTERVAL_SECS`
    pub status_push_interval: Duration,

    /// Env: `KEEPALIVE_INTERVAL_SECS`
    pub keepalive_interval: Duration,

    /// Quality of the composed JPEG, 1-100.
    /// Env: `JPEG_QUALITY`
    pub jpeg_quality: u8,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], DEFAULT_HTTP_PORT).into(),
            database_path: PathBuf::from("./groupsnap.db"),
            upload_storage_path: PathBuf::from("./uploads"),
            templates_path: PathBuf::from("./resources/templates.json"),
            max_upload_size: DEFAULT_MAX_UPLOAD_SIZE,
            worker_poll_interval: Duration::from_secs(DEFAULT_WORKER_POLL_SECS),
            countdown: Duration::from_secs(DEFAULT_COUNTDOWN_SECS),
            status_push_interval: Duration::from_secs(DEFAULT_STATUS_PUSH_SECS),
            keepalive_interval: Duration::from_secs(DEFAULT_KEEPALIVE_SECS),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(addr) = var("HTTP_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.http_addr = parsed;
            } else {
                tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default");
            }
        }

        if let Some(path) = var("DATABASE_PATH") {
            config.database_path = PathBuf::from(path);
        }

        if let Some(path) = var("UPLOAD_STORAGE_PATH") {
            config.upload_storage_path = PathBuf::from(path);
        }

        if let Some(path) = var("TEMPLATES_PATH") {
            config.templates_path = PathBuf::from(path);
        }

        if let Some(n) = parse_positive::<usize>(&var, "MAX_UPLOAD_SIZE") {
            config.max_upload_size = n;
        }

        // -- Timing --

        if let Some(secs) = parse_positive::<u64>(&var, "WORKER_POLL_INTERVAL_SECS") {
            config.worker_poll_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_positive::<u64>(&var, "COUNTDOWN_SECS") {
            config.countdown = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_positive::<u64>(&var, "STATUS_PUSH_INTERVAL_SECS") {
            config.status_push_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_positive::<u64>(&var, "KEEPALIVE_INTERVAL_SECS") {
            config.keepalive_interval = Duration::from_secs(secs);
        }

        if let Some(q) = parse_positive::<u8>(&var, "JPEG_QUALITY") {
            if q <= 100 {
                config.jpeg_quality = q;
            } else {
                tracing::warn!(value = q, "JPEG_QUALITY above 100, using default");
            }
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }
}

/// Read a strictly positive number, warning and returning `None` on junk.
fn parse_positive<T>(var: &impl Fn(&str) -> Option<String>, name: &str) -> Option<T>
where
    T: FromStr + PartialOrd + Default,
{
    let raw = var(name)?;
    match raw.trim().parse::<T>() {
        Ok(n) if n > T::default() => Some(n),
        _ => {
            tracing::warn!(value = %raw, "Invalid {}, using default", name);
            None
        }
    }
}
