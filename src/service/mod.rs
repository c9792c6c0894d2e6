//! Kiosk orchestration.
//!
//! [`KioskService`] wires the recognition gateway, the settings store, the
//! session state, and the reconciliation engine together. The gateway and the
//! store are injected as trait objects' generic parameters so tests can run
//! the full flows against fakes.
//!
//! Failures of the async collaborators are converted here into
//! session-visible error strings: a failed recognition leaves the aggregate
//! untouched, and a failed remote comparison leaves the session usable
//! without a discrepancy report. Neither is retried beyond what the gateway
//! does internally.

use std::time::Instant;

use tracing::{info, warn};

use crate::config::RecognitionConfig;
use crate::error::{AppResult, SessionError};
use crate::reconcile::ComparisonResult;
use crate::recognition::{ImageUpload, RecognitionGateway};
use crate::session::ReturnSession;
use crate::settings::{Confidence, SettingsStore};
use crate::toolkit::{standard_issued_kit, IssuedTool};

/// Orchestrates one kiosk station's workflows.
pub struct KioskService<G, S> {
    gateway: G,
    settings: S,
    config: RecognitionConfig,
    issued: Vec<IssuedTool>,
}

impl<G, S> KioskService<G, S>
where
    G: RecognitionGateway,
    S: SettingsStore,
{
    /// Create a service reconciling against the standard issued kit.
    pub fn new(gateway: G, settings: S, config: RecognitionConfig) -> Self {
        Self {
            gateway,
            settings,
            config,
            issued: standard_issued_kit(),
        }
    }

    /// Override the issued kit, e.g. for a partially issued set.
    pub fn with_issued_kit(mut self, issued: Vec<IssuedTool>) -> Self {
        self.issued = issued;
        self
    }

    /// The kit this service reconciles against.
    pub fn issued_kit(&self) -> &[IssuedTool] {
        &self.issued
    }

    /// The current detection threshold.
    pub async fn confidence(&self) -> AppResult<Confidence> {
        Ok(self.settings.confidence().await?)
    }

    /// Validate and persist a new detection threshold.
    pub async fn set_confidence(&self, value: f64) -> AppResult<Confidence> {
        let confidence = Confidence::new(value)?;
        self.settings.set_confidence(confidence).await?;
        Ok(confidence)
    }

    /// Photograph-to-detections flow for one image.
    ///
    /// Registers the upload, runs recognition with the stored threshold, and
    /// attaches the result. Returns false without touching the aggregate when
    /// the file name is a duplicate, when recognition fails (the error is
    /// recorded on the session), or when the image was removed while the
    /// request was in flight.
    pub async fn scan_image(
        &self,
        session: &mut ReturnSession,
        image: ImageUpload,
    ) -> AppResult<bool> {
        let file_name = image.file_name.clone();
        if !session.begin_upload(&file_name) {
            warn!(file = %file_name, "Duplicate file name, upload ignored");
            return Ok(false);
        }

        let confidence = self.settings.confidence().await?;
        let start = Instant::now();

        match self
            .gateway
            .recognize(image, self.config.toolkit_id, confidence)
            .await
        {
            Ok(scan) => {
                let attached = session.attach_result(&file_name, scan);
                info!(
                    file = %file_name,
                    attached,
                    latency_ms = start.elapsed().as_millis(),
                    total_detected = session.total_detected(),
                    "Image scan completed"
                );
                Ok(attached)
            }
            Err(e) => {
                warn!(
                    file = %file_name,
                    error = %e,
                    latency_ms = start.elapsed().as_millis(),
                    "Image scan failed"
                );
                session.fail_upload(&file_name, e.to_string());
                Ok(false)
            }
        }
    }

    /// Scan a batch of photos, one recognition request each.
    ///
    /// Per-image failures are recorded on the session and do not stop the
    /// remaining images from being processed.
    pub async fn process_images(
        &self,
        session: &mut ReturnSession,
        images: Vec<ImageUpload>,
    ) -> AppResult<usize> {
        let mut attached = 0;
        for image in images {
            if self.scan_image(session, image).await? {
                attached += 1;
            }
        }
        Ok(attached)
    }

    /// Compare the session aggregate against the issued kit locally.
    pub fn reconcile<'a>(
        &self,
        session: &'a mut ReturnSession,
    ) -> AppResult<&'a ComparisonResult> {
        let result = session.request_comparison(&self.issued)?;
        info!(
            all_returned = result.all_returned,
            missing = result.comparison_summary.missing_count,
            extra = result.comparison_summary.extra_count,
            "Reconciliation completed"
        );
        Ok(result)
    }

    /// Ask the backend for the comparison instead of computing it locally.
    ///
    /// Best-effort enrichment: on failure the session keeps its raw returned
    /// tools and proceeds without a discrepancy report; the error becomes a
    /// session-visible message and is not propagated.
    pub async fn reconcile_remote<'a>(
        &self,
        session: &'a mut ReturnSession,
    ) -> AppResult<Option<&'a ComparisonResult>> {
        if let Some(file_name) = session.pending_uploads().first() {
            return Err(SessionError::RecognitionPending {
                file_name: file_name.clone(),
            }
            .into());
        }
        if session.images().is_empty() && session.detected_tools().is_empty() {
            return Err(SessionError::NothingScanned.into());
        }

        let returned = session.returned_tools();
        match self
            .gateway
            .compare_with_issued(self.config.user_id, self.config.toolkit_id, returned)
            .await
        {
            Ok(result) => Ok(Some(session.attach_comparison(result))),
            Err(e) => {
                warn!(error = %e, "Remote comparison failed, proceeding without report");
                session.record_error(e.to_string());
                Ok(None)
            }
        }
    }

    /// Run the comparison the way this station is configured: remotely when
    /// `remote_compare` is set, otherwise with the local engine.
    pub async fn request_comparison<'a>(
        &self,
        session: &'a mut ReturnSession,
    ) -> AppResult<Option<&'a ComparisonResult>> {
        if self.config.remote_compare {
            self.reconcile_remote(session).await
        } else {
            self.reconcile(session).map(Some)
        }
    }
}
