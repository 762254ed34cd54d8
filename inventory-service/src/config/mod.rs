use serde::Deserialize;
use service_core::config::DatabaseConfig;
use service_core::error::AppError;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// OTLP collector endpoint; empty disables span export.
    #[serde(default)]
    pub otlp_endpoint: String,
    pub database: DatabaseConfig,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8086
}

fn default_log_level() -> String {
    "info".to_string()
}

pub fn get_configuration() -> Result<Config, AppError> {
    service_core::config::load()
}
