//! Runtime configuration loaded from the environment (and `.env`)

use std::env;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use crate::error::AgentError;
use crate::gemini;
use crate::tools::nse;
use crate::Result;

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Empty when unset; model calls then fail with a configuration error.
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub gemini_base_url: String,
    pub nse_base_url: String,
    pub http_timeout: Duration,
    pub port: u16,
    pub log_level: String,
}

impl AppConfig {
    /// Read configuration from the process environment.
    ///
    /// Call `dotenv::dotenv()` first if a `.env` file should be honoured.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let timeout_secs = match non_empty("HTTP_TIMEOUT_SECS") {
            Some(raw) => raw.trim().parse::<u64>().map_err(|e| {
                AgentError::ConfigError(format!("HTTP_TIMEOUT_SECS must be an integer: {}", e))
            })?,
            None => 30,
        };

        let port = match non_empty("PORT").or_else(|| non_empty("API_PORT")) {
            Some(raw) => raw.trim().parse::<u16>().map_err(|e| {
                AgentError::ConfigError(format!("PORT must be a valid port number: {}", e))
            })?,
            None => 8080,
        };

        Ok(Self {
            gemini_api_key: non_empty("GEMINI_API_KEY")
                .or_else(|| non_empty("GOOGLE_API_KEY"))
                .unwrap_or_default(),
            gemini_model: non_empty("GEMINI_MODEL").unwrap_or_else(|| gemini::DEFAULT_MODEL.to_string()),
            gemini_base_url: non_empty("GEMINI_BASE_URL")
                .unwrap_or_else(|| gemini::DEFAULT_BASE_URL.to_string()),
            nse_base_url: non_empty("NSE_BASE_URL").unwrap_or_else(|| nse::DEFAULT_BASE_URL.to_string()),
            http_timeout: Duration::from_secs(timeout_secs),
            port,
            log_level: non_empty("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }

    /// Log filter: `rust_log` (usually `RUST_LOG`) when it parses, else `log_level`.
    pub fn log_filter(&self, rust_log: Option<&str>) -> EnvFilter {
        rust_log
            .filter(|v| !v.trim().is_empty())
            .and_then(|v| EnvFilter::try_new(v).ok())
            .unwrap_or_else(|| EnvFilter::new(&self.log_level))
    }
}
