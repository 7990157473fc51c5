//! The daily brief payload.
//!
//! This structure is the persisted contract a downstream renderer depends
//! on; field names and shapes are stable.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Risk severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// Why a communication was surfaced as notable.
///
/// Priority when multiple conditions match: Blocker > Risk > Important.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotableReason {
    Blocker,
    Risk,
    Important,
}

/// Section 1: progress snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    /// Overall percent reviewed, 0-100
    pub overall: i64,
    /// Per-workstream percent reviewed
    pub workstreams: BTreeMap<String, i64>,
    /// Delta against the previous brief's overall (0 when none exists)
    pub change_vs_previous: i64,
}

/// Section 2: document changes since yesterday.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Changes {
    /// Names of documents created in the trailing 24 hours with status `new`
    pub new_documents: Vec<String>,
    /// Names of documents updated in the trailing 24 hours with status `updated`
    pub updated_documents: Vec<String>,
    /// Total reviewed documents deal-wide (not time-windowed)
    pub reviewed_count: u64,
}

/// One blocker entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockerItem {
    pub title: String,
    pub workstream: String,
    pub age_days: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
}

/// Section 3: blockers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Blockers {
    pub items: Vec<BlockerItem>,
}

/// One risk entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskItem {
    pub title: String,
    pub severity: Severity,
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub citation: Option<String>,
}

/// Section 4: risks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Risks {
    pub items: Vec<RiskItem>,
}

/// One notable communication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotableCommunication {
    pub subject: String,
    pub sender: String,
    pub snippet: String,
    pub reason: NotableReason,
}

/// Section 5: notable communications.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Communications {
    pub notable: Vec<NotableCommunication>,
}

/// The complete five-section daily brief.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BriefData {
    pub progress_snapshot: ProgressSnapshot,
    pub changes: Changes,
    pub blockers: Blockers,
    pub risks: Risks,
    pub communications: Communications,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notable_reason_serializes_capitalized() {
        // Downstream renderers match on these exact strings
        assert_eq!(
            serde_json::to_value(NotableReason::Blocker).unwrap(),
            serde_json::json!("Blocker")
        );
        assert_eq!(
            serde_json::to_value(NotableReason::Important).unwrap(),
            serde_json::json!("Important")
        );
    }

    #[test]
    fn test_severity_serializes_lowercase() {
        assert_eq!(
            serde_json::to_value(Severity::Medium).unwrap(),
            serde_json::json!("medium")
        );
    }

    #[test]
    fn test_owner_omitted_when_absent() {
        let item = BlockerItem {
            title: "Document pending review: NDA.pdf".to_string(),
            workstream: "Legal".to_string(),
            age_days: 9,
            owner: None,
        };
        let json = serde_json::to_value(&item).unwrap();
        assert!(json.get("owner").is_none());
    }
}
