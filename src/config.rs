use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::thread;

use dotenv::dotenv;
use tracing::warn;

use crate::detection::{DEFAULT_FLOOD_RATE_THRESHOLD, DEFAULT_PORT_SCAN_THRESHOLD};

const DEFAULT_MAX_UPLOAD_BYTES: usize = 100 * 1024 * 1024;
const DEFAULT_CORS_ORIGIN: &str = "http://localhost:5173";

#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzerConfig {
    pub port_scan_threshold: usize,
    pub flood_rate_threshold: f64,
    pub workers: usize,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        AnalyzerConfig {
            port_scan_threshold: DEFAULT_PORT_SCAN_THRESHOLD,
            flood_rate_threshold: DEFAULT_FLOOD_RATE_THRESHOLD,
            workers: thread::available_parallelism().map_or(1, |n| n.get()),
        }
    }
}

impl AnalyzerConfig {
    /// Defaults overridden by `NETLENS_*` variables (a `.env` file is honoured).
    pub fn from_env() -> Self {
        dotenv().ok();
        let defaults = AnalyzerConfig::default();
        AnalyzerConfig {
            port_scan_threshold: env_or(
                "NETLENS_PORT_SCAN_THRESHOLD",
                defaults.port_scan_threshold,
            ),
            flood_rate_threshold: env_or(
                "NETLENS_FLOOD_RATE_THRESHOLD",
                defaults.flood_rate_threshold,
            ),
            workers: env_or("NETLENS_WORKERS", defaults.workers).max(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
    /// Frontend origin allowed to call the API from a browser.
    pub cors_origin: String,
    pub protocol_map: Option<PathBuf>,
    pub analyzer: AnalyzerConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind: "0.0.0.0".to_string(),
            port: 5000,
            upload_dir: PathBuf::from("uploads"),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            cors_origin: DEFAULT_CORS_ORIGIN.to_string(),
            protocol_map: None,
            analyzer: AnalyzerConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        dotenv().ok();
        let defaults = ServerConfig::default();
        ServerConfig {
            bind: env::var("NETLENS_BIND").unwrap_or(defaults.bind),
            port: env_or("NETLENS_PORT", defaults.port),
            upload_dir: env::var("NETLENS_UPLOAD_DIR")
                .map_or(defaults.upload_dir, PathBuf::from),
            max_upload_bytes: env_or("NETLENS_MAX_UPLOAD_BYTES", defaults.max_upload_bytes),
            cors_origin: env::var("NETLENS_CORS_ORIGIN").unwrap_or(defaults.cors_origin),
            protocol_map: env::var("NETLENS_PROTOCOL_MAP").ok().map(PathBuf::from),
            analyzer: AnalyzerConfig::from_env(),
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => parse_or(key, &raw, default),
        Err(_) => default,
    }
}

fn parse_or<T: FromStr>(key: &str, raw: &str, default: T) -> T {
    raw.trim().parse().unwrap_or_else(|_| {
        warn!("Ignoring unparsable {}={:?}, using default", key, raw);
        default
    })
}
