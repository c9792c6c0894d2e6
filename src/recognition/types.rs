use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::reconcile::{
    ComparisonResult, ComparisonSummary, Discrepancy, DiscrepancyKind, ExtraTool, MissingTool,
    ReturnedTool, ToolKey,
};
use crate::session::{DetectedTool, ScanResult};
use crate::toolkit::{IssuedTool, ToolId};

/// Wire response of `POST /predict/`.
#[derive(Debug, Clone, Deserialize)]
pub struct PredictResponse {
    #[serde(default)]
    pub found_tools: Vec<RawDetection>,
    #[serde(default)]
    pub hand_check: bool,
    #[serde(default)]
    pub processed_image_url: Option<String>,
    #[serde(default)]
    pub ml_predictions: Vec<f64>,
}

/// One `found_tools` entry as the backend sends it.
///
/// Every field is optional on the wire; [`PredictResponse::into_scan`] decides
/// what is coerced and what is dropped.
#[derive(Debug, Clone, Deserialize)]
pub struct RawDetection {
    #[serde(default)]
    pub id: Option<RawToolId>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub serial_number: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub quantity: Option<i64>,
}

/// Backend tool ids arrive as integers or strings depending on the route.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawToolId {
    Int(i64),
    Str(String),
}

impl PredictResponse {
    /// Validate and normalize the wire payload.
    ///
    /// Entries without a usable name are dropped; ids that are not clean
    /// integers fall back to name-keyed entries rather than getting a
    /// synthetic numeric id. Detections carry the request threshold as their
    /// confidence when the backend reports none.
    pub fn into_scan(self, default_confidence: f64) -> ScanResult {
        let mut detections = Vec::with_capacity(self.found_tools.len());
        for raw in self.found_tools {
            let Some(name) = raw.name.as_deref().map(str::trim).filter(|n| !n.is_empty())
            else {
                warn!("Dropping detection without a name");
                continue;
            };
            let quantity = raw.quantity.unwrap_or(1).max(0);
            if quantity == 0 {
                debug!(name = %name, "Dropping zero-quantity detection");
                continue;
            }
            let key = match raw.id {
                Some(RawToolId::Int(id)) => ToolKey::Canonical(id),
                Some(RawToolId::Str(s)) => match s.trim().parse::<ToolId>() {
                    Ok(id) => ToolKey::Canonical(id),
                    Err(_) => ToolKey::Unlisted(name.to_string()),
                },
                None => ToolKey::Unlisted(name.to_string()),
            };
            let confidence = raw.confidence.unwrap_or(default_confidence);
            detections.push(DetectedTool::recognized(
                key,
                name,
                raw.serial_number.filter(|s| !s.is_empty()),
                raw.category.unwrap_or_else(|| "unknown".to_string()),
                confidence,
                quantity as u32,
            ));
        }

        ScanResult {
            detections,
            hand_check: self.hand_check,
            processed_image_url: self.processed_image_url,
            ml_predictions: self.ml_predictions,
        }
    }
}

/// Wire request of `POST /return-tools/compare-with-issued`.
#[derive(Debug, Clone, Serialize)]
pub struct CompareRequest {
    pub user_id: i64,
    pub toolkit_id: ToolId,
    pub returned_tools: Vec<WireReturnedTool>,
}

/// Returned-tool line in the comparison request.
#[derive(Debug, Clone, Serialize)]
pub struct WireReturnedTool {
    pub tool_id: ToolId,
    pub name: String,
    #[serde(rename = "serialNumber")]
    pub serial_number: String,
    pub quantity: i64,
}

impl CompareRequest {
    /// Build the wire request from normalized returned tools.
    ///
    /// The wire contract only speaks numeric catalog ids, so unlisted entries
    /// can not be expressed; they are skipped with a warning instead of being
    /// sent under a fabricated id.
    pub fn new(user_id: i64, toolkit_id: ToolId, returned: Vec<ReturnedTool>) -> Self {
        let returned_tools = returned
            .into_iter()
            .filter_map(|tool| match tool.key.canonical_id() {
                Some(tool_id) => Some(WireReturnedTool {
                    tool_id,
                    name: tool.name,
                    serial_number: tool.serial_number.unwrap_or_default(),
                    quantity: tool.quantity,
                }),
                None => {
                    warn!(name = %tool.name, "Skipping unlisted tool in remote comparison");
                    None
                }
            })
            .collect();

        Self {
            user_id,
            toolkit_id,
            returned_tools,
        }
    }
}

/// Wire response of the remote comparison endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteComparison {
    #[serde(default)]
    pub issued_tools: Vec<RemoteToolLine>,
    #[serde(default)]
    pub returned_tools: Vec<RemoteToolLine>,
    #[serde(default)]
    pub missing_tools: Vec<RemoteToolLine>,
    #[serde(default)]
    pub extra_tools: Vec<RemoteToolLine>,
    #[serde(default)]
    pub all_returned: bool,
    #[serde(default)]
    pub comparison_summary: RemoteSummary,
    #[serde(default)]
    pub discrepancies: Vec<RemoteDiscrepancy>,
}

/// One tool line as the comparison endpoint reports it.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteToolLine {
    pub tool_id: ToolId,
    #[serde(default)]
    pub name: String,
    #[serde(default, alias = "serialNumber")]
    pub serial_number: Option<String>,
    #[serde(default)]
    pub quantity: i64,
    #[serde(default)]
    pub missing_quantity: Option<i64>,
}

/// Summary block of the remote comparison response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RemoteSummary {
    #[serde(default)]
    pub total_issued: i64,
    #[serde(default)]
    pub total_returned: i64,
    #[serde(default)]
    pub missing_count: usize,
    #[serde(default)]
    pub extra_count: usize,
}

/// Discrepancy line of the remote comparison response.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteDiscrepancy {
    pub tool_id: ToolId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub issued_qty: i64,
    #[serde(default)]
    pub returned_qty: i64,
    #[serde(default)]
    pub difference: i64,
    #[serde(rename = "type")]
    pub kind: DiscrepancyKind,
}

impl From<RemoteComparison> for ComparisonResult {
    fn from(remote: RemoteComparison) -> Self {
        ComparisonResult {
            issued_tools: remote
                .issued_tools
                .into_iter()
                .map(|line| IssuedTool {
                    tool_id: line.tool_id,
                    name: line.name,
                    serial_number: line.serial_number.unwrap_or_default(),
                    quantity: line.quantity,
                })
                .collect(),
            returned_tools: remote
                .returned_tools
                .into_iter()
                .map(|line| ReturnedTool {
                    key: ToolKey::Canonical(line.tool_id),
                    name: line.name,
                    serial_number: line.serial_number,
                    quantity: line.quantity,
                })
                .collect(),
            missing_tools: remote
                .missing_tools
                .into_iter()
                .map(|line| MissingTool {
                    tool_id: line.tool_id,
                    name: line.name,
                    serial_number: line.serial_number.unwrap_or_default(),
                    quantity: line.quantity,
                    missing_quantity: line.missing_quantity.unwrap_or(line.quantity),
                })
                .collect(),
            extra_tools: remote
                .extra_tools
                .into_iter()
                .map(|line| ExtraTool {
                    key: ToolKey::Canonical(line.tool_id),
                    name: line.name,
                    serial_number: line.serial_number,
                    quantity: line.quantity,
                })
                .collect(),
            all_returned: remote.all_returned,
            comparison_summary: ComparisonSummary {
                total_issued: remote.comparison_summary.total_issued,
                total_returned: remote.comparison_summary.total_returned,
                missing_count: remote.comparison_summary.missing_count,
                extra_count: remote.comparison_summary.extra_count,
            },
            discrepancies: remote
                .discrepancies
                .into_iter()
                .map(|line| Discrepancy {
                    key: ToolKey::Canonical(line.tool_id),
                    name: line.name,
                    issued_qty: line.issued_qty,
                    returned_qty: line.returned_qty,
                    difference: line.difference,
                    kind: line.kind,
                })
                .collect(),
        }
    }
}
