//! Gateway to the external recognition service.
//!
//! This module provides:
//! - A typed HTTP client for the ML detection endpoint
//! - Boundary validation of detection payloads
//! - The optional remote comparison call
//!
//! The service itself is a black box: it receives a photo plus a toolkit id
//! and a confidence threshold, and answers with the tools it found. Nothing
//! about its model behavior is assumed here beyond the wire contract.

mod client;
mod types;

pub use client::*;
pub use types::*;

use async_trait::async_trait;

use crate::error::{ComparisonApiResult, RecognitionResult};
use crate::reconcile::{ComparisonResult, ReturnedTool};
use crate::session::ScanResult;
use crate::settings::Confidence;
use crate::toolkit::ToolId;

/// One photo ready for recognition.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub content_type: String,
}

impl ImageUpload {
    /// A JPEG upload, the kiosk camera's native format.
    pub fn jpeg(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
            content_type: "image/jpeg".to_string(),
        }
    }
}

/// Interface to the recognition service, injectable for tests.
#[async_trait]
pub trait RecognitionGateway: Send + Sync {
    /// Detect tools on one photo.
    async fn recognize(
        &self,
        image: ImageUpload,
        toolkit_id: ToolId,
        confidence: Confidence,
    ) -> RecognitionResult<ScanResult>;

    /// Ask the backend to compare returned tools with the issued kit.
    async fn compare_with_issued(
        &self,
        user_id: i64,
        toolkit_id: ToolId,
        returned: Vec<ReturnedTool>,
    ) -> ComparisonApiResult<ComparisonResult>;
}
