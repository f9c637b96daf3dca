// ⚙️ Configuration - environment with sane defaults

use std::env;
use std::path::PathBuf;

pub const ENV_DB_PATH: &str = "OKR_DB_PATH";
pub const ENV_BIND_ADDR: &str = "OKR_BIND_ADDR";
pub const ENV_LOG: &str = "OKR_LOG";

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub bind_addr: String,
    /// tracing EnvFilter directive, used when RUST_LOG is unset
    pub log_filter: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            db_path: PathBuf::from("okr.db"),
            bind_addr: "0.0.0.0:3000".to_string(),
            log_filter: "info".to_string(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; blank values fall back to defaults
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = AppConfig::default();
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        AppConfig {
            db_path: get(ENV_DB_PATH).map(PathBuf::from).unwrap_or(defaults.db_path),
            bind_addr: get(ENV_BIND_ADDR).unwrap_or(defaults.bind_addr),
            log_filter: get(ENV_LOG).unwrap_or(defaults.log_filter),
        }
    }
}
