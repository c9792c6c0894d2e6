//! The recognition confidence threshold.
//!
//! A single scalar in the open interval (0,1) controls the detection
//! threshold the gateway sends with every recognition request. The value is
//! validated at construction and persisted durably with last-writer-wins
//! semantics; when nothing has been stored yet, reads fall back to 0.5.

mod sqlite;

pub use sqlite::SqliteSettings;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{StorageResult, ValidationError, ValidationResult};

/// Threshold used when no value has been persisted yet.
pub const DEFAULT_CONFIDENCE: f64 = 0.5;

/// Settings row key, carried over from the original kiosk front end.
pub(crate) const CONFIDENCE_KEY: &str = "model_confidence";

/// Validated detection threshold, strictly between 0 and 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Confidence(f64);

impl Confidence {
    /// Validate a raw threshold value.
    pub fn new(value: f64) -> ValidationResult<Self> {
        if !value.is_finite() || value <= 0.0 || value >= 1.0 {
            return Err(ValidationError::ConfidenceOutOfRange { value });
        }
        Ok(Self(value))
    }

    /// The raw threshold value.
    pub fn value(self) -> f64 {
        self.0
    }
}

impl Default for Confidence {
    fn default() -> Self {
        Self(DEFAULT_CONFIDENCE)
    }
}

impl TryFrom<f64> for Confidence {
    type Error = ValidationError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Confidence> for f64 {
    fn from(confidence: Confidence) -> Self {
        confidence.0
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Durable store for kiosk settings.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// The persisted threshold, or the default when none exists.
    async fn confidence(&self) -> StorageResult<Confidence>;

    /// Persist a new threshold (last-writer-wins).
    async fn set_confidence(&self, value: Confidence) -> StorageResult<()>;
}
