//! The canonical reference toolkit.
//!
//! Every kiosk station hands out the same fixed kit of hand tools; the
//! reconciliation engine compares returns against it. The kit size is always
//! derived from [`standard_toolkit`], so a future kit change cannot drift
//! apart from the completeness checks built on top of it.

use serde::{Deserialize, Serialize};

/// Canonical tool identifier, stable within the reference toolkit.
pub type ToolId = i64;

/// A single physical tool type from the canonical toolkit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolRecord {
    /// Stable identifier, unique within the kit.
    pub id: ToolId,
    /// Human-readable tool name.
    pub name: String,
    /// Engraved serial number.
    pub serial_number: String,
    /// Classification tag.
    pub category: String,
}

/// One line of the issued kit: what was handed out and how many.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssuedTool {
    pub tool_id: ToolId,
    pub name: String,
    pub serial_number: String,
    pub quantity: i64,
}

fn tool(id: ToolId, name: &str, serial_number: &str) -> ToolRecord {
    ToolRecord {
        id,
        name: name.to_string(),
        serial_number: serial_number.to_string(),
        category: "hand_tools".to_string(),
    }
}

/// The standard kit issued at every station, in issue order.
pub fn standard_toolkit() -> Vec<ToolRecord> {
    vec![
        tool(1, "Отвертка «-»", "SN001"),
        tool(2, "Отвертка «+»", "SN002"),
        tool(3, "Отвертка на смещенный крест", "SN003"),
        tool(4, "Коловорот", "SN004"),
        tool(5, "Пассатижи контровочные", "SN005"),
        tool(6, "Пассатижи", "SN006"),
        tool(7, "Шэрница", "SN007"),
        tool(8, "Разводной ключ", "SN008"),
        tool(9, "Открывашка для банок с маслом", "SN009"),
        tool(10, "Ключ рожковый/накидной 3⁄4", "SN010"),
        tool(11, "Бокорезы", "SN011"),
    ]
}

/// Number of tools in a complete kit, derived from the kit itself.
pub fn standard_kit_size() -> usize {
    standard_toolkit().len()
}

/// The standard kit as issued-tool lines, one of each.
pub fn standard_issued_kit() -> Vec<IssuedTool> {
    standard_toolkit()
        .into_iter()
        .map(|t| IssuedTool {
            tool_id: t.id,
            name: t.name,
            serial_number: t.serial_number,
            quantity: 1,
        })
        .collect()
}

/// Look up a kit tool by exact name.
pub fn find_by_name(name: &str) -> Option<ToolRecord> {
    standard_toolkit().into_iter().find(|t| t.name == name)
}

/// Look up a kit tool by canonical id.
pub fn find_by_id(id: ToolId) -> Option<ToolRecord> {
    standard_toolkit().into_iter().find(|t| t.id == id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_kit_has_eleven_tools() {
        assert_eq!(standard_kit_size(), 11);
        assert_eq!(standard_issued_kit().len(), standard_kit_size());
    }

    #[test]
    fn test_ids_and_serials_are_unique() {
        let kit = standard_toolkit();
        let ids: HashSet<_> = kit.iter().map(|t| t.id).collect();
        let serials: HashSet<_> = kit.iter().map(|t| t.serial_number.clone()).collect();
        assert_eq!(ids.len(), kit.len());
        assert_eq!(serials.len(), kit.len());
    }

    #[test]
    fn test_issued_kit_quantities() {
        let issued = standard_issued_kit();
        assert!(issued.iter().all(|t| t.quantity == 1));
        assert_eq!(issued.iter().map(|t| t.quantity).sum::<i64>(), 11);
    }

    #[test]
    fn test_find_by_name() {
        let found = find_by_name("Бокорезы").expect("kit tool");
        assert_eq!(found.id, 11);
        assert_eq!(found.serial_number, "SN011");
        assert!(find_by_name("Молоток").is_none());
    }

    #[test]
    fn test_find_by_id() {
        assert_eq!(find_by_id(4).map(|t| t.name), Some("Коловорот".to_string()));
        assert!(find_by_id(12).is_none());
    }
}
