//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub log_level: Level,
    /// Base URL of the external PDF-extraction batch endpoint.
    pub extractor_url: String,
    /// Client-side timeout for one extraction call. Batch endpoints are
    /// slow, so this defaults to two minutes.
    pub extractor_timeout_secs: u64,
    pub outlook_client_id: Option<String>,
    pub outlook_tenant_id: String,
    pub outlook_redirect_uri: Option<String>,
    /// Email senders scanned for receipt attachments during a sync.
    pub receipt_senders: Vec<String>,
    pub frontend_url: String,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        // --- Load Server and Database Settings ---
        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| ConfigError::MissingVar("DATABASE_URL".to_string()))?;

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Load Extraction Service Settings ---
        let extractor_url = std::env::var("EXTRACTOR_URL")
            .map_err(|_| ConfigError::MissingVar("EXTRACTOR_URL".to_string()))?;
        let extractor_timeout_secs = match std::env::var("EXTRACTOR_TIMEOUT_SECS") {
            Ok(raw) => raw.parse::<u64>().map_err(|e| {
                ConfigError::InvalidValue("EXTRACTOR_TIMEOUT_SECS".to_string(), e.to_string())
            })?,
            Err(_) => 120,
        };

        // --- Load Outlook Settings (optional: sync endpoints 400 without them) ---
        let outlook_client_id = std::env::var("OUTLOOK_CLIENT_ID").ok();
        let outlook_tenant_id =
            std::env::var("OUTLOOK_TENANT_ID").unwrap_or_else(|_| "consumers".to_string());
        let outlook_redirect_uri = std::env::var("OUTLOOK_REDIRECT_URI").ok();

        let receipt_senders = std::env::var("RECEIPT_SENDERS")
            .map(|raw| {
                raw.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect::<Vec<_>>()
            })
            .unwrap_or_else(|_| {
                vec![
                    "facturaelectronica@pingodoce.pt".to_string(),
                    "noreply@cartaocontinente.pt".to_string(),
                ]
            });

        let frontend_url =
            std::env::var("FRONTEND_URL").unwrap_or_else(|_| "http://localhost:3000".to_string());

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            extractor_url,
            extractor_timeout_secs,
            outlook_client_id,
            outlook_tenant_id,
            outlook_redirect_uri,
            receipt_senders,
            frontend_url,
        })
    }
}
