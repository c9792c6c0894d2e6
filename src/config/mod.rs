use std::env;
use std::path::PathBuf;

use crate::error::AppError;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub recognition: RecognitionConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub request: RequestConfig,
}

/// Recognition service configuration
#[derive(Debug, Clone)]
pub struct RecognitionConfig {
    /// Base URL of the recognition backend.
    pub base_url: String,
    /// Toolkit to recognize against; the backend's default kit is 1.
    pub toolkit_id: i64,
    /// Operator account used for return transactions.
    pub user_id: i64,
    /// Ask the backend to compute the comparison instead of the local engine.
    pub remote_compare: bool,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub max_connections: u32,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// HTTP request configuration
#[derive(Debug, Clone)]
pub struct RequestConfig {
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, AppError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let recognition = RecognitionConfig {
            base_url: env::var("RECOGNITION_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8000".to_string()),
            toolkit_id: env::var("TOOLKIT_ID")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1),
            user_id: env::var("KIOSK_USER_ID")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1),
            remote_compare: env::var("REMOTE_COMPARE")
                .map(|s| matches!(s.to_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
        };

        let database = DatabaseConfig {
            path: PathBuf::from(
                env::var("DATABASE_PATH").unwrap_or_else(|_| "./data/kiosk.db".to_string()),
            ),
            max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5),
        };

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        };

        let request = RequestConfig {
            timeout_ms: env::var("REQUEST_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30000),
            max_retries: env::var("MAX_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(3),
            retry_delay_ms: env::var("RETRY_DELAY_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1000),
        };

        Ok(Config {
            recognition,
            database,
            logging,
            request,
        })
    }
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            toolkit_id: 1,
            user_id: 1,
            remote_compare: false,
        }
    }
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30000,
            max_retries: 3,
            retry_delay_ms: 1000,
        }
    }
}
