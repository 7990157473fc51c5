//! Contract tests for the persisted brief payload.
//!
//! A downstream renderer depends on these exact field names and shapes;
//! if one of these tests breaks, the wire format changed.

use std::collections::BTreeMap;

use dealpulse_core::brief::{
    BlockerItem, Blockers, BriefData, Changes, Communications, NotableCommunication,
    NotableReason, ProgressSnapshot, RiskItem, Risks, Severity,
};

fn sample_brief() -> BriefData {
    let mut workstreams = BTreeMap::new();
    workstreams.insert("Legal".to_string(), 50);
    workstreams.insert("Finance".to_string(), 100);

    BriefData {
        progress_snapshot: ProgressSnapshot {
            overall: 60,
            workstreams,
            change_vs_previous: 10,
        },
        changes: Changes {
            new_documents: vec!["Legal Compliance Memo.pdf".to_string()],
            updated_documents: vec![],
            reviewed_count: 6,
        },
        blockers: Blockers {
            items: vec![BlockerItem {
                title: "Waiting on signature".to_string(),
                workstream: "General".to_string(),
                age_days: 2,
                owner: Some("counsel@example.com".to_string()),
            }],
        },
        risks: Risks {
            items: vec![RiskItem {
                title: "New Legal requires review".to_string(),
                severity: Severity::Medium,
                source: "Legal Compliance Memo.pdf".to_string(),
                citation: None,
            }],
        },
        communications: Communications {
            notable: vec![NotableCommunication {
                subject: "Approval needed".to_string(),
                sender: "ceo@example.com".to_string(),
                snippet: "Please approve by Friday".to_string(),
                reason: NotableReason::Blocker,
            }],
        },
    }
}

#[test]
fn brief_payload_field_names_are_stable() {
    let json = serde_json::to_value(sample_brief()).unwrap();

    let progress = &json["progress_snapshot"];
    assert_eq!(progress["overall"], 60);
    assert_eq!(progress["workstreams"]["Legal"], 50);
    assert_eq!(progress["change_vs_previous"], 10);

    let changes = &json["changes"];
    assert_eq!(changes["new_documents"][0], "Legal Compliance Memo.pdf");
    assert!(changes["updated_documents"].as_array().unwrap().is_empty());
    assert_eq!(changes["reviewed_count"], 6);

    let blocker = &json["blockers"]["items"][0];
    assert_eq!(blocker["title"], "Waiting on signature");
    assert_eq!(blocker["workstream"], "General");
    assert_eq!(blocker["age_days"], 2);
    assert_eq!(blocker["owner"], "counsel@example.com");

    let risk = &json["risks"]["items"][0];
    assert_eq!(risk["severity"], "medium");
    assert_eq!(risk["source"], "Legal Compliance Memo.pdf");
    // citation is omitted entirely when absent
    assert!(risk.get("citation").is_none());

    let notable = &json["communications"]["notable"][0];
    assert_eq!(notable["subject"], "Approval needed");
    assert_eq!(notable["reason"], "Blocker");
}

#[test]
fn brief_payload_round_trips() {
    let brief = sample_brief();
    let json = serde_json::to_value(&brief).unwrap();
    let parsed: BriefData = serde_json::from_value(json).unwrap();
    assert_eq!(parsed, brief);
}

#[test]
fn top_level_sections_are_exactly_five() {
    let json = serde_json::to_value(sample_brief()).unwrap();
    let mut keys: Vec<String> = json.as_object().unwrap().keys().cloned().collect();
    keys.sort();
    assert_eq!(
        keys,
        vec![
            "blockers",
            "changes",
            "communications",
            "progress_snapshot",
            "risks"
        ]
    );
}
