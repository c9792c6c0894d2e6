use thiserror::Error;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Recognition error: {0}")]
    Recognition(#[from] RecognitionError),

    #[error("Comparison error: {0}")]
    Comparison(#[from] ComparisonError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Input validation errors surfaced directly to the operator
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Confidence must be strictly between 0 and 1, got {value}")]
    ConfidenceOutOfRange { value: f64 },

    #[error("Validation failed: {field} - {reason}")]
    Field { field: String, reason: String },
}

/// Recognition endpoint errors
#[derive(Debug, Error)]
pub enum RecognitionError {
    #[error("Recognition service unavailable: {message} (retries: {retries})")]
    Unavailable { message: String, retries: u32 },

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    #[error("Request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Remote comparison endpoint errors
#[derive(Debug, Error)]
pub enum ComparisonError {
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Storage layer errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database connection failed: {message}")]
    Connection { message: String },

    #[error("Query failed: {message}")]
    Query { message: String },

    #[error("Migration failed: {message}")]
    Migration { message: String },

    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

/// Session state machine violations
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Recognition still in progress for {file_name}")]
    RecognitionPending { file_name: String },

    #[error("Nothing scanned yet")]
    NothingScanned,
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for validation
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Result type alias for recognition calls
pub type RecognitionResult<T> = Result<T, RecognitionError>;

/// Result type alias for remote comparison calls
pub type ComparisonApiResult<T> = Result<T, ComparisonError>;

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type alias for session operations
pub type SessionResult<T> = Result<T, SessionError>;
