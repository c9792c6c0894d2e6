use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::types::{CompareRequest, PredictResponse, RemoteComparison};
use super::{ImageUpload, RecognitionGateway};
use crate::config::{RecognitionConfig, RequestConfig};
use crate::error::{ComparisonApiResult, ComparisonError, RecognitionError, RecognitionResult};
use crate::reconcile::{ComparisonResult, ReturnedTool};
use crate::session::ScanResult;
use crate::settings::Confidence;
use crate::toolkit::ToolId;

/// HTTP client for the recognition backend
#[derive(Clone)]
pub struct RecognitionClient {
    client: Client,
    base_url: String,
    request_config: RequestConfig,
}

impl RecognitionClient {
    /// Create a new recognition client
    pub fn new(config: &RecognitionConfig, request_config: RequestConfig) -> RecognitionResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(request_config.timeout_ms))
            .build()
            .map_err(RecognitionError::Http)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            request_config,
        })
    }

    /// Get the base URL (for testing)
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Execute a single prediction request (internal)
    async fn execute_predict(
        &self,
        url: &str,
        image: &ImageUpload,
        toolkit_id: ToolId,
        confidence: Confidence,
    ) -> RecognitionResult<PredictResponse> {
        debug!(
            file = %image.file_name,
            toolkit_id,
            confidence = confidence.value(),
            "Calling recognition endpoint"
        );

        // Multipart bodies are consumed per request, so the form is rebuilt
        // on every attempt
        let part = Part::bytes(image.bytes.clone())
            .file_name(image.file_name.clone())
            .mime_str(&image.content_type)
            .map_err(RecognitionError::Http)?;
        let form = Form::new()
            .part("image", part)
            .text("toolkit_id", toolkit_id.to_string())
            .text("confidence", confidence.value().to_string());

        let response = self
            .client
            .post(url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RecognitionError::Timeout {
                        timeout_ms: self.request_config.timeout_ms,
                    }
                } else {
                    RecognitionError::Http(e)
                }
            })?;

        let status = response.status();

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(RecognitionError::Api {
                status: status.as_u16(),
                message: error_body,
            });
        }

        let predict_response: PredictResponse =
            response
                .json()
                .await
                .map_err(|e| RecognitionError::InvalidResponse {
                    message: format!("Failed to parse response: {}", e),
                })?;

        Ok(predict_response)
    }
}

#[async_trait]
impl RecognitionGateway for RecognitionClient {
    /// Detect tools on one photo, retrying with exponential backoff.
    async fn recognize(
        &self,
        image: ImageUpload,
        toolkit_id: ToolId,
        confidence: Confidence,
    ) -> RecognitionResult<ScanResult> {
        let url = format!("{}/predict/", self.base_url);
        let file_name = image.file_name.clone();

        let mut last_error = None;
        let mut retries = 0;

        while retries <= self.request_config.max_retries {
            if retries > 0 {
                let delay = Duration::from_millis(
                    self.request_config.retry_delay_ms * (2_u64.pow(retries - 1)),
                );
                warn!(
                    file = %file_name,
                    retry = retries,
                    delay_ms = delay.as_millis(),
                    "Retrying recognition request"
                );
                tokio::time::sleep(delay).await;
            }

            let start = Instant::now();

            match self.execute_predict(&url, &image, toolkit_id, confidence).await {
                Ok(response) => {
                    let latency = start.elapsed();
                    let scan = response.into_scan(confidence.value());
                    info!(
                        file = %file_name,
                        found = scan.detections.len(),
                        hand_check = scan.hand_check,
                        latency_ms = latency.as_millis(),
                        "Recognition succeeded"
                    );
                    return Ok(scan);
                }
                Err(e) => {
                    let latency = start.elapsed();
                    error!(
                        file = %file_name,
                        error = %e,
                        latency_ms = latency.as_millis(),
                        retry = retries,
                        "Recognition call failed"
                    );
                    last_error = Some(e);
                    retries += 1;
                }
            }
        }

        Err(RecognitionError::Unavailable {
            message: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "Unknown error".to_string()),
            retries,
        })
    }

    /// Ask the backend for a comparison. Best-effort enrichment: a single
    /// attempt, no retries.
    async fn compare_with_issued(
        &self,
        user_id: i64,
        toolkit_id: ToolId,
        returned: Vec<ReturnedTool>,
    ) -> ComparisonApiResult<ComparisonResult> {
        let url = format!("{}/return-tools/compare-with-issued", self.base_url);
        let request = CompareRequest::new(user_id, toolkit_id, returned);

        debug!(
            user_id,
            toolkit_id,
            tools = request.returned_tools.len(),
            "Calling comparison endpoint"
        );

        let start = Instant::now();
        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(ComparisonError::Http)?;

        let status = response.status();

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(ComparisonError::Api {
                status: status.as_u16(),
                message: error_body,
            });
        }

        let remote: RemoteComparison =
            response
                .json()
                .await
                .map_err(|e| ComparisonError::InvalidResponse {
                    message: format!("Failed to parse response: {}", e),
                })?;

        info!(
            latency_ms = start.elapsed().as_millis(),
            "Comparison endpoint call succeeded"
        );

        Ok(remote.into())
    }
}
