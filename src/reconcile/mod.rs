//! The reconciliation engine.
//!
//! Compares the aggregated returned-tool multiset against the issued kit and
//! produces a structured discrepancy report: which tools are missing, which
//! came back in excess or were never issued, and whether the return is
//! complete. The comparison is computed strictly from final aggregated
//! quantities, so it is independent of the order detections arrived in and
//! of any add/remove history.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::toolkit::{IssuedTool, ToolId};

/// Reconciliation key for a returned tool.
///
/// Canonical ids come from the reference toolkit (or the backend catalog);
/// manual entries whose name matches no kit tool reconcile by name. The two
/// namespaces never mix, so a manual entry can not collide with a kit id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKey {
    /// A tool known to the catalog.
    Canonical(ToolId),
    /// A tool outside the catalog, keyed by its entered name.
    Unlisted(String),
}

impl ToolKey {
    /// The canonical id, if this key is in the catalog namespace.
    pub fn canonical_id(&self) -> Option<ToolId> {
        match self {
            ToolKey::Canonical(id) => Some(*id),
            ToolKey::Unlisted(_) => None,
        }
    }
}

impl fmt::Display for ToolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolKey::Canonical(id) => write!(f, "#{}", id),
            ToolKey::Unlisted(name) => write!(f, "{}", name),
        }
    }
}

/// One returned-tool line, normalized for comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnedTool {
    pub key: ToolKey,
    pub name: String,
    #[serde(default)]
    pub serial_number: Option<String>,
    pub quantity: i64,
}

/// An issued tool that did not come back in full.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissingTool {
    pub tool_id: ToolId,
    pub name: String,
    pub serial_number: String,
    /// Quantity originally issued.
    pub quantity: i64,
    /// How many are still out.
    pub missing_quantity: i64,
}

/// A returned tool (or surplus) with no issued counterpart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtraTool {
    pub key: ToolKey,
    pub name: String,
    #[serde(default)]
    pub serial_number: Option<String>,
    /// The excess quantity only, not the full returned quantity.
    pub quantity: i64,
}

/// Classification of a non-matching returned tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscrepancyKind {
    /// Returned more than issued.
    Excess,
    /// Returned a tool that was never issued.
    Unexpected,
}

/// Detail line for one mismatched key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Discrepancy {
    pub key: ToolKey,
    pub name: String,
    pub issued_qty: i64,
    pub returned_qty: i64,
    /// Signed `returned_qty - issued_qty`.
    pub difference: i64,
    #[serde(rename = "type")]
    pub kind: DiscrepancyKind,
}

/// Aggregate counts over a comparison.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparisonSummary {
    pub total_issued: i64,
    pub total_returned: i64,
    pub missing_count: usize,
    pub extra_count: usize,
}

/// Full discrepancy report for one return.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub issued_tools: Vec<IssuedTool>,
    /// Returned tools aggregated per key, zero-net entries dropped.
    pub returned_tools: Vec<ReturnedTool>,
    pub missing_tools: Vec<MissingTool>,
    pub extra_tools: Vec<ExtraTool>,
    /// True iff nothing is missing; extras do not block a complete return.
    pub all_returned: bool,
    pub comparison_summary: ComparisonSummary,
    pub discrepancies: Vec<Discrepancy>,
}

/// Malformed quantities are treated as zero rather than rejected.
fn clamp(quantity: i64) -> i64 {
    quantity.max(0)
}

#[derive(Debug, Default)]
struct ReturnedLine {
    name: String,
    serial_number: Option<String>,
    quantity: i64,
}

/// Compare the issued kit against the aggregated returned tools.
///
/// Always terminates with a well-formed report: empty inputs produce an
/// all-zero summary with `all_returned = true`.
pub fn compare(issued: &[IssuedTool], returned: &[ReturnedTool]) -> ComparisonResult {
    // tool_id -> issued quantity, duplicates summed
    let mut issued_qty: BTreeMap<ToolId, i64> = BTreeMap::new();
    for tool in issued {
        *issued_qty.entry(tool.tool_id).or_default() += clamp(tool.quantity);
    }

    // key -> returned quantity, duplicate detections summed
    let mut returned_agg: BTreeMap<ToolKey, ReturnedLine> = BTreeMap::new();
    for tool in returned {
        let line = returned_agg.entry(tool.key.clone()).or_default();
        line.quantity += clamp(tool.quantity);
        if line.name.is_empty() {
            line.name = tool.name.clone();
        }
        if line.serial_number.is_none() {
            line.serial_number = tool.serial_number.clone();
        }
    }

    // Missing: issued order, one entry per tool_id
    let mut missing_tools = Vec::new();
    let mut seen: HashSet<ToolId> = HashSet::new();
    for tool in issued {
        if !seen.insert(tool.tool_id) {
            continue;
        }
        let issued_quantity = issued_qty[&tool.tool_id];
        if issued_quantity == 0 {
            continue;
        }
        let returned_quantity = returned_agg
            .get(&ToolKey::Canonical(tool.tool_id))
            .map(|line| line.quantity)
            .unwrap_or(0);
        if returned_quantity < issued_quantity {
            missing_tools.push(MissingTool {
                tool_id: tool.tool_id,
                name: tool.name.clone(),
                serial_number: tool.serial_number.clone(),
                quantity: issued_quantity,
                missing_quantity: issued_quantity - returned_quantity,
            });
        }
    }

    // Extras: canonical excesses and everything outside the issued mapping
    let mut extra_tools = Vec::new();
    let mut discrepancies = Vec::new();
    for (key, line) in &returned_agg {
        if line.quantity == 0 {
            continue;
        }
        let issued_quantity = key
            .canonical_id()
            .and_then(|id| issued_qty.get(&id).copied())
            .unwrap_or(0);
        if line.quantity <= issued_quantity {
            continue;
        }
        let kind = if issued_quantity > 0 {
            DiscrepancyKind::Excess
        } else {
            DiscrepancyKind::Unexpected
        };
        extra_tools.push(ExtraTool {
            key: key.clone(),
            name: line.name.clone(),
            serial_number: line.serial_number.clone(),
            quantity: line.quantity - issued_quantity,
        });
        discrepancies.push(Discrepancy {
            key: key.clone(),
            name: line.name.clone(),
            issued_qty: issued_quantity,
            returned_qty: line.quantity,
            difference: line.quantity - issued_quantity,
            kind,
        });
    }

    let all_returned = missing_tools.is_empty();
    let comparison_summary = ComparisonSummary {
        total_issued: issued_qty.values().sum(),
        total_returned: returned_agg.values().map(|line| line.quantity).sum(),
        missing_count: missing_tools.len(),
        extra_count: extra_tools.len(),
    };

    let issued_tools = issued
        .iter()
        .map(|tool| IssuedTool {
            quantity: clamp(tool.quantity),
            ..tool.clone()
        })
        .collect();
    let returned_tools = returned_agg
        .into_iter()
        .filter(|(_, line)| line.quantity > 0)
        .map(|(key, line)| ReturnedTool {
            key,
            name: line.name,
            serial_number: line.serial_number,
            quantity: line.quantity,
        })
        .collect();

    ComparisonResult {
        issued_tools,
        returned_tools,
        missing_tools,
        extra_tools,
        all_returned,
        comparison_summary,
        discrepancies,
    }
}
