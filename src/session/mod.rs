//! Per-session return state.
//!
//! A [`ReturnSession`] owns everything one check-in workflow accumulates:
//! uploaded photos, their recognition results, manual additions, removals,
//! and quantity edits. The aggregated detected-tool list is always derived
//! from that state - concatenation of retained images' detections in upload
//! order, minus explicitly removed detections, plus manual entries - so the
//! "tools found" total can never drift from the per-image results.
//!
//! Sessions are plain owned data with no interior mutability; every
//! transition is a synchronous method, which keeps out-of-order recognition
//! completions and late-arrival discards testable without an executor.

use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{SessionError, SessionResult, ValidationError, ValidationResult};
use crate::reconcile::{self, ComparisonResult, ReturnedTool, ToolKey};
use crate::toolkit::{self, IssuedTool};

/// Session-local identifier of one detection.
///
/// Distinct from [`crate::toolkit::ToolId`]: two observations of the same
/// physical tool type are separate records, and manual entries can never
/// collide with catalog ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DetectionId(Uuid);

impl DetectionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for DetectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "det-{}", self.0)
    }
}

/// Physical condition grade recorded at check-in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCondition {
    Excellent,
    #[default]
    Good,
    Fair,
    Poor,
}

impl fmt::Display for ToolCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolCondition::Excellent => write!(f, "excellent"),
            ToolCondition::Good => write!(f, "good"),
            ToolCondition::Fair => write!(f, "fair"),
            ToolCondition::Poor => write!(f, "poor"),
        }
    }
}

/// One observed tool, from recognition or manual entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedTool {
    pub id: DetectionId,
    pub key: ToolKey,
    pub name: String,
    #[serde(default)]
    pub serial_number: Option<String>,
    pub category: String,
    /// Recognition confidence in [0,1]; manual entries carry 1.0.
    pub confidence: f64,
    pub quantity: u32,
    #[serde(default)]
    pub condition: ToolCondition,
}

impl DetectedTool {
    /// A detection produced by the recognition gateway.
    pub fn recognized(
        key: ToolKey,
        name: impl Into<String>,
        serial_number: Option<String>,
        category: impl Into<String>,
        confidence: f64,
        quantity: u32,
    ) -> Self {
        Self {
            id: DetectionId::new(),
            key,
            name: name.into(),
            serial_number,
            category: category.into(),
            confidence: confidence.clamp(0.0, 1.0),
            quantity,
            condition: ToolCondition::default(),
        }
    }

    /// A manually entered tool, resolved against the catalog by name.
    pub fn manual(name: &str, quantity: u32) -> Self {
        match toolkit::find_by_name(name) {
            Some(record) => Self {
                id: DetectionId::new(),
                key: ToolKey::Canonical(record.id),
                name: record.name,
                serial_number: Some(record.serial_number),
                category: record.category,
                confidence: 1.0,
                quantity,
                condition: ToolCondition::default(),
            },
            None => Self {
                id: DetectionId::new(),
                key: ToolKey::Unlisted(name.to_string()),
                name: name.to_string(),
                serial_number: None,
                category: "unknown".to_string(),
                confidence: 1.0,
                quantity,
                condition: ToolCondition::default(),
            },
        }
    }

    /// Normalize for the reconciliation engine.
    pub fn to_returned(&self) -> ReturnedTool {
        ReturnedTool {
            key: self.key.clone(),
            name: self.name.clone(),
            serial_number: self.serial_number.clone(),
            quantity: i64::from(self.quantity),
        }
    }
}

/// Normalized recognition outcome for one photo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanResult {
    pub detections: Vec<DetectedTool>,
    /// Backend flag: the automated count did not match expectations.
    pub hand_check: bool,
    #[serde(default)]
    pub processed_image_url: Option<String>,
    #[serde(default)]
    pub ml_predictions: Vec<f64>,
}

/// One uploaded photo and the detections attributed to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageResult {
    pub file_name: String,
    pub scan: ScanResult,
    pub uploaded_at: DateTime<Utc>,
}

/// Lifecycle phase of a return session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// No images, no detections.
    Empty,
    /// At least one recognition request is still in flight.
    Uploading,
    /// At least one image fully processed (or a manual entry exists).
    Scanned,
    /// A comparison was requested and its result is attached.
    Reconciled,
}

/// Edits applied to one detection from the review dialog.
#[derive(Debug, Clone, Copy, Default)]
pub struct ToolUpdate {
    pub quantity: Option<u32>,
    pub condition: Option<ToolCondition>,
}

/// State of one check-in workflow, from first upload to confirmation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReturnSession {
    images: Vec<ImageResult>,
    /// File names whose recognition is still in flight.
    pending: Vec<String>,
    manual: Vec<DetectedTool>,
    /// Detections removed by the operator; stays effective across recomputes.
    removed: HashSet<DetectionId>,
    comparison: Option<ComparisonResult>,
    last_error: Option<String>,
}

impl ReturnSession {
    /// Fresh, empty session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current lifecycle phase, derived from the session contents.
    pub fn phase(&self) -> SessionPhase {
        if !self.pending.is_empty() {
            SessionPhase::Uploading
        } else if self.comparison.is_some() {
            SessionPhase::Reconciled
        } else if !self.images.is_empty() || !self.manual.is_empty() {
            SessionPhase::Scanned
        } else {
            SessionPhase::Empty
        }
    }

    /// Register an upload whose recognition is about to start.
    ///
    /// File names are unique per session; a duplicate is a no-op and returns
    /// false. Entering the uploading phase invalidates any prior comparison
    /// result - it must be recomputed before being trusted again.
    pub fn begin_upload(&mut self, file_name: &str) -> bool {
        if self.has_file(file_name) {
            return false;
        }
        self.pending.push(file_name.to_string());
        self.comparison = None;
        true
    }

    /// Attach a finished recognition result.
    ///
    /// Returns false and discards the result when the upload is no longer
    /// pending - the image was removed while recognition was in flight, and
    /// its detections must not be resurrected.
    pub fn attach_result(&mut self, file_name: &str, scan: ScanResult) -> bool {
        let Some(pos) = self.pending.iter().position(|f| f == file_name) else {
            return false;
        };
        self.pending.remove(pos);
        self.images.push(ImageResult {
            file_name: file_name.to_string(),
            scan,
            uploaded_at: Utc::now(),
        });
        true
    }

    /// Register and attach in one step, for results that arrive ready-made.
    ///
    /// A no-op if the file name already exists in the session.
    pub fn add_image_result(&mut self, file_name: &str, scan: ScanResult) -> bool {
        if !self.begin_upload(file_name) {
            return false;
        }
        self.attach_result(file_name, scan)
    }

    /// Record a failed recognition; the aggregate is left unchanged.
    pub fn fail_upload(&mut self, file_name: &str, message: impl Into<String>) {
        self.pending.retain(|f| f != file_name);
        self.last_error = Some(message.into());
    }

    /// Remove an image (or cancel its in-flight upload).
    ///
    /// Manual entries are never removed by this operation. Removing the last
    /// image returns the session to empty unconditionally, discarding all
    /// detections and any comparison result.
    pub fn remove_image(&mut self, file_name: &str) {
        let had_image = self.has_file(file_name);
        self.pending.retain(|f| f != file_name);
        self.images.retain(|img| img.file_name != file_name);
        if !had_image {
            return;
        }
        if self.images.is_empty() && self.pending.is_empty() {
            self.reset();
            return;
        }
        self.comparison = None;
    }

    /// Add a manually entered tool to the session.
    pub fn add_manual_tool(&mut self, name: &str, quantity: u32) -> ValidationResult<DetectionId> {
        if name.trim().is_empty() {
            return Err(ValidationError::Field {
                field: "name".to_string(),
                reason: "cannot be empty".to_string(),
            });
        }
        if quantity == 0 {
            return Err(ValidationError::Field {
                field: "quantity".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        let tool = DetectedTool::manual(name, quantity);
        let id = tool.id;
        self.manual.push(tool);
        self.comparison = None;
        Ok(id)
    }

    /// Remove one detection from the aggregate, whichever image it came from.
    ///
    /// Stored image results are not mutated; the detection stays excluded
    /// when the aggregate is recomputed later.
    pub fn remove_tool(&mut self, id: DetectionId) -> bool {
        if let Some(pos) = self.manual.iter().position(|t| t.id == id) {
            self.manual.remove(pos);
            self.comparison = None;
            return true;
        }
        let exists = self
            .images
            .iter()
            .flat_map(|img| &img.scan.detections)
            .any(|t| t.id == id);
        if exists && self.removed.insert(id) {
            self.comparison = None;
            return true;
        }
        false
    }

    /// Apply review-dialog edits to one detection.
    pub fn update_tool(&mut self, id: DetectionId, update: ToolUpdate) -> ValidationResult<bool> {
        if update.quantity == Some(0) {
            return Err(ValidationError::Field {
                field: "quantity".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        let target = self
            .manual
            .iter_mut()
            .chain(
                self.images
                    .iter_mut()
                    .flat_map(|img| img.scan.detections.iter_mut()),
            )
            .find(|t| t.id == id);
        let Some(tool) = target else {
            return Ok(false);
        };
        if let Some(quantity) = update.quantity {
            tool.quantity = quantity;
        }
        if let Some(condition) = update.condition {
            tool.condition = condition;
        }
        self.comparison = None;
        Ok(true)
    }

    /// Discard everything; used on session entry and last-image removal.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// The aggregated detected-tool list: retained images' detections in
    /// upload order, minus removals, plus manual entries.
    pub fn detected_tools(&self) -> Vec<DetectedTool> {
        self.images
            .iter()
            .flat_map(|img| &img.scan.detections)
            .chain(&self.manual)
            .filter(|t| !self.removed.contains(&t.id))
            .cloned()
            .collect()
    }

    /// Total quantity across the aggregate - the "tools found" figure.
    pub fn total_detected(&self) -> u64 {
        self.detected_tools()
            .iter()
            .map(|t| u64::from(t.quantity))
            .sum()
    }

    /// True when the detected total differs from a complete kit.
    pub fn hand_check_recommended(&self) -> bool {
        self.total_detected() != toolkit::standard_kit_size() as u64
    }

    /// The aggregate normalized for the reconciliation engine.
    pub fn returned_tools(&self) -> Vec<ReturnedTool> {
        self.detected_tools()
            .iter()
            .map(DetectedTool::to_returned)
            .collect()
    }

    /// Run the comparison engine over the current aggregate and attach the
    /// result. Rejected while a recognition is pending or nothing has been
    /// scanned.
    pub fn request_comparison(
        &mut self,
        issued: &[IssuedTool],
    ) -> SessionResult<&ComparisonResult> {
        if let Some(file_name) = self.pending.first() {
            return Err(SessionError::RecognitionPending {
                file_name: file_name.clone(),
            });
        }
        if self.images.is_empty() && self.manual.is_empty() {
            return Err(SessionError::NothingScanned);
        }
        let result = reconcile::compare(issued, &self.returned_tools());
        Ok(self.comparison.insert(result))
    }

    /// Attach an externally computed comparison result.
    pub fn attach_comparison(&mut self, result: ComparisonResult) -> &ComparisonResult {
        self.comparison.insert(result)
    }

    /// The attached comparison result, if one is current.
    pub fn comparison(&self) -> Option<&ComparisonResult> {
        self.comparison.as_ref()
    }

    /// Stored per-image results, in upload order.
    pub fn images(&self) -> &[ImageResult] {
        &self.images
    }

    /// File names still awaiting recognition.
    pub fn pending_uploads(&self) -> &[String] {
        &self.pending
    }

    /// The most recent session-visible error message.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Record a session-visible error without touching the aggregate.
    pub fn record_error(&mut self, message: impl Into<String>) {
        self.last_error = Some(message.into());
    }

    fn has_file(&self, file_name: &str) -> bool {
        self.pending.iter().any(|f| f == file_name)
            || self.images.iter().any(|img| img.file_name == file_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan_with(tools: &[(i64, &str)]) -> ScanResult {
        ScanResult {
            detections: tools
                .iter()
                .map(|(id, name)| {
                    DetectedTool::recognized(
                        ToolKey::Canonical(*id),
                        *name,
                        None,
                        "hand_tools",
                        0.9,
                        1,
                    )
                })
                .collect(),
            hand_check: false,
            processed_image_url: None,
            ml_predictions: vec![],
        }
    }

    #[test]
    fn new_session_is_empty() {
        let session = ReturnSession::new();
        assert_eq!(session.phase(), SessionPhase::Empty);
        assert_eq!(session.total_detected(), 0);
        assert!(session.comparison().is_none());
    }

    #[test]
    fn phase_follows_upload_lifecycle() {
        let mut session = ReturnSession::new();
        assert!(session.begin_upload("tray1.jpg"));
        assert_eq!(session.phase(), SessionPhase::Uploading);

        assert!(session.attach_result("tray1.jpg", scan_with(&[(1, "Отвертка «-»")])));
        assert_eq!(session.phase(), SessionPhase::Scanned);

        session
            .request_comparison(&crate::toolkit::standard_issued_kit())
            .expect("comparison");
        assert_eq!(session.phase(), SessionPhase::Reconciled);

        // Another photo invalidates the report
        assert!(session.begin_upload("tray2.jpg"));
        assert_eq!(session.phase(), SessionPhase::Uploading);
        assert!(session.comparison().is_none());
    }

    #[test]
    fn duplicate_file_name_is_a_noop() {
        let mut session = ReturnSession::new();
        assert!(session.add_image_result("tray.jpg", scan_with(&[(1, "Отвертка «-»")])));
        assert!(!session.add_image_result("tray.jpg", scan_with(&[(2, "Отвертка «+»")])));
        assert_eq!(session.images().len(), 1);
        assert_eq!(session.total_detected(), 1);
    }

    #[test]
    fn late_result_for_removed_image_is_discarded() {
        let mut session = ReturnSession::new();
        assert!(session.begin_upload("tray.jpg"));
        session.remove_image("tray.jpg");

        // Recognition completes after the operator removed the photo
        assert!(!session.attach_result("tray.jpg", scan_with(&[(1, "Отвертка «-»")])));
        assert_eq!(session.phase(), SessionPhase::Empty);
        assert_eq!(session.total_detected(), 0);
    }

    #[test]
    fn out_of_order_completion_keeps_upload_order() {
        let mut session = ReturnSession::new();
        assert!(session.begin_upload("first.jpg"));
        assert!(session.begin_upload("second.jpg"));

        // Second request finishes first
        assert!(session.attach_result("second.jpg", scan_with(&[(2, "Отвертка «+»")])));
        assert_eq!(session.phase(), SessionPhase::Uploading);
        assert!(session.attach_result("first.jpg", scan_with(&[(1, "Отвертка «-»")])));
        assert_eq!(session.phase(), SessionPhase::Scanned);
        assert_eq!(session.total_detected(), 2);
    }

    #[test]
    fn failed_upload_leaves_aggregate_unchanged() {
        let mut session = ReturnSession::new();
        assert!(session.add_image_result("ok.jpg", scan_with(&[(1, "Отвертка «-»")])));
        assert!(session.begin_upload("bad.jpg"));
        session.fail_upload("bad.jpg", "recognition failed");

        assert_eq!(session.phase(), SessionPhase::Scanned);
        assert_eq!(session.total_detected(), 1);
        assert_eq!(session.last_error(), Some("recognition failed"));
    }

    #[test]
    fn remove_image_preserves_manual_entries() {
        let mut session = ReturnSession::new();
        assert!(session.add_image_result("a.jpg", scan_with(&[(1, "Отвертка «-»")])));
        assert!(session.add_image_result("b.jpg", scan_with(&[(2, "Отвертка «+»")])));
        session.add_manual_tool("Бокорезы", 1).expect("manual add");

        session.remove_image("a.jpg");
        let names: Vec<_> = session
            .detected_tools()
            .iter()
            .map(|t| t.name.clone())
            .collect();
        assert_eq!(names, vec!["Отвертка «+»", "Бокорезы"]);
    }

    #[test]
    fn removing_last_image_resets_unconditionally() {
        let mut session = ReturnSession::new();
        assert!(session.add_image_result("a.jpg", scan_with(&[(1, "Отвертка «-»")])));
        session.add_manual_tool("Бокорезы", 1).expect("manual add");

        session.remove_image("a.jpg");
        assert_eq!(session.phase(), SessionPhase::Empty);
        assert_eq!(session.total_detected(), 0);
        assert!(session.detected_tools().is_empty());
    }

    #[test]
    fn removed_tool_is_not_resurrected_by_image_removal() {
        let mut session = ReturnSession::new();
        assert!(session.add_image_result("a.jpg", scan_with(&[(1, "Отвертка «-»"), (2, "Отвертка «+»")])));
        assert!(session.add_image_result("b.jpg", scan_with(&[(3, "Отвертка на смещенный крест")])));

        let victim = session.detected_tools()[1].id;
        assert!(session.remove_tool(victim));
        assert_eq!(session.total_detected(), 2);

        // Removing an unrelated image recomputes the aggregate; the removed
        // detection must stay gone
        session.remove_image("b.jpg");
        assert_eq!(session.total_detected(), 1);
        assert_eq!(session.detected_tools()[0].name, "Отвертка «-»");
    }

    #[test]
    fn manual_tool_resolves_against_catalog() {
        let mut session = ReturnSession::new();
        let id = session.add_manual_tool("Бокорезы", 2).expect("manual add");
        let tools = session.detected_tools();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].id, id);
        assert_eq!(tools[0].key, ToolKey::Canonical(11));
        assert_eq!(tools[0].serial_number, Some("SN011".to_string()));
        assert_eq!(tools[0].confidence, 1.0);

        let id = session.add_manual_tool("Молоток", 1).expect("manual add");
        let tools = session.detected_tools();
        assert_eq!(tools[1].id, id);
        assert_eq!(tools[1].key, ToolKey::Unlisted("Молоток".to_string()));
    }

    #[test]
    fn manual_tool_validation() {
        let mut session = ReturnSession::new();
        assert!(session.add_manual_tool("  ", 1).is_err());
        assert!(session.add_manual_tool("Бокорезы", 0).is_err());
        assert_eq!(session.phase(), SessionPhase::Empty);
    }

    #[test]
    fn update_tool_edits_quantity_and_condition() {
        let mut session = ReturnSession::new();
        assert!(session.add_image_result("a.jpg", scan_with(&[(1, "Отвертка «-»")])));
        let id = session.detected_tools()[0].id;

        let update = ToolUpdate {
            quantity: Some(3),
            condition: Some(ToolCondition::Fair),
        };
        assert!(session.update_tool(id, update).expect("update"));
        let tool = &session.detected_tools()[0];
        assert_eq!(tool.quantity, 3);
        assert_eq!(tool.condition, ToolCondition::Fair);
        assert_eq!(session.total_detected(), 3);

        // Zero quantity is rejected
        let update = ToolUpdate {
            quantity: Some(0),
            condition: None,
        };
        assert!(session.update_tool(id, update).is_err());
    }

    #[test]
    fn comparison_rejected_while_pending_or_empty() {
        let issued = crate::toolkit::standard_issued_kit();
        let mut session = ReturnSession::new();
        assert!(matches!(
            session.request_comparison(&issued),
            Err(SessionError::NothingScanned)
        ));

        assert!(session.begin_upload("tray.jpg"));
        assert!(matches!(
            session.request_comparison(&issued),
            Err(SessionError::RecognitionPending { .. })
        ));
    }

    #[test]
    fn hand_check_follows_kit_size() {
        let mut session = ReturnSession::new();
        assert!(session.hand_check_recommended());

        let tools: Vec<(i64, &str)> = (1..=11).map(|id| (id, "tool")).collect();
        assert!(session.add_image_result("tray.jpg", scan_with(&tools)));
        assert!(!session.hand_check_recommended());

        let id = session.detected_tools()[0].id;
        assert!(session.remove_tool(id));
        assert!(session.hand_check_recommended());
    }
}
