//! The daily brief aggregation algorithm.
//!
//! A pure function from tenant data to the five-section brief. The clock is
//! injected so the 24-hour windows are deterministic under test.
//!
//! Input contract: `communications` arrives newest-first (the store's
//! ordering); documents carry their joined workstream names.

use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;

use super::types::{
    BlockerItem, Blockers, BriefData, Changes, Communications, NotableCommunication,
    NotableReason, ProgressSnapshot, RiskItem, Risks, Severity,
};
use crate::db::{CommunicationRow, DocumentRow, DocumentStatus, Sentiment, WorkstreamRow};

/// The "since yesterday" window. Wall-clock, not calendar-aligned.
const RECENT_WINDOW_HOURS: i64 = 24;

/// Caps keeping the brief executive-readable.
const BLOCKER_COMM_CAP: usize = 5;
const BLOCKER_DOC_CAP: usize = 3;
const RISK_CAP: usize = 3;
const NOTABLE_CAP: usize = 5;

/// Days without an update before a non-reviewed document counts as stalled.
const STALLED_AFTER_DAYS: i64 = 7;

/// Keyword heuristic for the risks section. Deliberately simple and
/// deliberately kept: downstream consumers depend on its exact behavior
/// until AI risk extraction is wired in.
const RISK_KEYWORDS: [&str; 3] = ["legal", "compliance", "liability"];

/// Subject keywords that make a recent communication notable.
const NOTABLE_KEYWORDS: [&str; 4] = ["approval", "deadline", "urgent", "review"];

/// Compose the five-section brief from tenant data as of `now`.
pub fn aggregate(
    documents: &[DocumentRow],
    communications: &[CommunicationRow],
    workstreams: &[WorkstreamRow],
    previous: Option<&ProgressSnapshot>,
    now: DateTime<Utc>,
) -> BriefData {
    BriefData {
        progress_snapshot: progress_snapshot(documents, workstreams, previous),
        changes: detect_changes(documents, now),
        blockers: identify_blockers(communications, documents, now),
        risks: extract_risks(documents),
        communications: notable_communications(communications, now),
    }
}

fn percent(reviewed: usize, total: usize) -> i64 {
    if total == 0 {
        0
    } else {
        ((reviewed as f64 / total as f64) * 100.0).round() as i64
    }
}

fn is_reviewed(doc: &DocumentRow) -> bool {
    doc.status == DocumentStatus::Reviewed.as_str()
}

/// Section 1: reviewed-over-total ratios, overall and per workstream.
///
/// Progress is a plain ratio so the number is deterministic and explainable,
/// not an opaque score.
fn progress_snapshot(
    documents: &[DocumentRow],
    workstreams: &[WorkstreamRow],
    previous: Option<&ProgressSnapshot>,
) -> ProgressSnapshot {
    let total = documents.len();
    let reviewed = documents.iter().filter(|d| is_reviewed(d)).count();
    let overall = percent(reviewed, total);

    let mut per_workstream = BTreeMap::new();
    for ws in workstreams {
        let ws_docs: Vec<&DocumentRow> = documents
            .iter()
            .filter(|d| d.workstream_id == Some(ws.id))
            .collect();
        let ws_reviewed = ws_docs.iter().filter(|d| is_reviewed(d)).count();
        per_workstream.insert(ws.name.clone(), percent(ws_reviewed, ws_docs.len()));
    }

    let change_vs_previous = previous.map(|p| overall - p.overall).unwrap_or(0);

    ProgressSnapshot {
        overall,
        workstreams: per_workstream,
        change_vs_previous,
    }
}

/// Section 2: documents created or updated in the trailing 24 hours.
fn detect_changes(documents: &[DocumentRow], now: DateTime<Utc>) -> Changes {
    let cutoff = now - Duration::hours(RECENT_WINDOW_HOURS);

    let new_documents = documents
        .iter()
        .filter(|d| d.status == DocumentStatus::New.as_str() && d.created_at >= cutoff)
        .map(|d| d.name.clone())
        .collect();

    let updated_documents = documents
        .iter()
        .filter(|d| d.status == DocumentStatus::Updated.as_str() && d.updated_at >= cutoff)
        .map(|d| d.name.clone())
        .collect();

    let reviewed_count = documents.iter().filter(|d| is_reviewed(d)).count() as u64;

    Changes {
        new_documents,
        updated_documents,
        reviewed_count,
    }
}

/// Section 3: flagged communications plus stalled documents.
fn identify_blockers(
    communications: &[CommunicationRow],
    documents: &[DocumentRow],
    now: DateTime<Utc>,
) -> Blockers {
    let mut items = Vec::new();

    let flagged = communications
        .iter()
        .filter(|c| c.is_blocker || c.sentiment.as_deref() == Some(Sentiment::Risk.as_str()))
        .take(BLOCKER_COMM_CAP);

    for comm in flagged {
        items.push(BlockerItem {
            title: comm.subject.clone(),
            workstream: "General".to_string(),
            age_days: (now - comm.received_at).num_days(),
            owner: Some(comm.sender.clone()),
        });
    }

    let stalled = documents
        .iter()
        .filter(|d| !is_reviewed(d) && (now - d.updated_at).num_days() >= STALLED_AFTER_DAYS)
        .take(BLOCKER_DOC_CAP);

    for doc in stalled {
        items.push(BlockerItem {
            title: format!("Document pending review: {}", doc.name),
            workstream: doc
                .workstream_name
                .clone()
                .unwrap_or_else(|| "General".to_string()),
            age_days: (now - doc.updated_at).num_days(),
            owner: None,
        });
    }

    Blockers { items }
}

/// Section 4: new documents whose names match the risk keyword set.
fn extract_risks(documents: &[DocumentRow]) -> Risks {
    let items = documents
        .iter()
        .filter(|d| d.status == DocumentStatus::New.as_str())
        .filter(|d| {
            let name = d.name.to_lowercase();
            RISK_KEYWORDS.iter().any(|kw| name.contains(kw))
        })
        .take(RISK_CAP)
        .map(|d| RiskItem {
            title: format!(
                "New {} requires review",
                d.workstream_name.as_deref().unwrap_or("document")
            ),
            severity: Severity::Medium,
            source: d.name.clone(),
            citation: None,
        })
        .collect();

    Risks { items }
}

fn notable_reason(comm: &CommunicationRow) -> NotableReason {
    if comm.is_blocker || comm.sentiment.as_deref() == Some(Sentiment::Blocker.as_str()) {
        NotableReason::Blocker
    } else if comm.sentiment.as_deref() == Some(Sentiment::Risk.as_str()) {
        NotableReason::Risk
    } else {
        NotableReason::Important
    }
}

/// Section 5: recent communications that carry weight.
fn notable_communications(communications: &[CommunicationRow], now: DateTime<Utc>) -> Communications {
    let cutoff = now - Duration::hours(RECENT_WINDOW_HOURS);

    let notable = communications
        .iter()
        .filter(|c| c.received_at >= cutoff)
        .filter(|c| {
            let subject = c.subject.to_lowercase();
            NOTABLE_KEYWORDS.iter().any(|kw| subject.contains(kw))
                || c.sentiment.as_deref() == Some(Sentiment::Risk.as_str())
                || c.sentiment.as_deref() == Some(Sentiment::Blocker.as_str())
        })
        .take(NOTABLE_CAP)
        .map(|c| NotableCommunication {
            subject: c.subject.clone(),
            sender: c.sender.clone(),
            snippet: c.snippet.clone().unwrap_or_default(),
            reason: notable_reason(c),
        })
        .collect();

    Communications { notable }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn doc(
        name: &str,
        status: &str,
        created_hours_ago: i64,
        updated_hours_ago: i64,
        now: DateTime<Utc>,
    ) -> DocumentRow {
        DocumentRow {
            id: Uuid::new_v4(),
            deal_id: Uuid::new_v4(),
            workstream_id: None,
            workstream_name: None,
            name: name.to_string(),
            status: status.to_string(),
            source_type: "gdrive".to_string(),
            source_id: Uuid::new_v4().to_string(),
            source_url: None,
            summary: None,
            created_at: now - Duration::hours(created_hours_ago),
            updated_at: now - Duration::hours(updated_hours_ago),
            last_ingested_at: None,
        }
    }

    fn comm(
        subject: &str,
        sentiment: Option<&str>,
        is_blocker: bool,
        received_hours_ago: i64,
        now: DateTime<Utc>,
    ) -> CommunicationRow {
        CommunicationRow {
            id: Uuid::new_v4(),
            deal_id: Uuid::new_v4(),
            subject: subject.to_string(),
            sender: "alex@example.com".to_string(),
            snippet: Some("snippet".to_string()),
            body: None,
            thread_id: None,
            source_type: "gmail".to_string(),
            source_id: Uuid::new_v4().to_string(),
            sentiment: sentiment.map(str::to_string),
            is_blocker,
            status: "new".to_string(),
            received_at: now - Duration::hours(received_hours_ago),
        }
    }

    #[test]
    fn test_zero_documents_has_zero_progress() {
        let now = Utc::now();
        let brief = aggregate(&[], &[], &[], None, now);
        assert_eq!(brief.progress_snapshot.overall, 0);
        assert_eq!(brief.changes.reviewed_count, 0);
    }

    #[test]
    fn test_overall_is_rounded_ratio() {
        let now = Utc::now();
        let docs = vec![
            doc("a", "reviewed", 100, 100, now),
            doc("b", "reviewed", 100, 100, now),
            doc("c", "new", 100, 100, now),
        ];
        let brief = aggregate(&docs, &[], &[], None, now);
        // 2/3 rounds to 67
        assert_eq!(brief.progress_snapshot.overall, 67);
        assert!(brief.progress_snapshot.overall >= 0 && brief.progress_snapshot.overall <= 100);
    }

    #[test]
    fn test_change_vs_previous() {
        let now = Utc::now();
        let docs = vec![
            doc("a", "reviewed", 100, 100, now),
            doc("b", "new", 100, 100, now),
        ];
        let previous = ProgressSnapshot {
            overall: 30,
            workstreams: BTreeMap::new(),
            change_vs_previous: 0,
        };
        let brief = aggregate(&docs, &[], &[], Some(&previous), now);
        assert_eq!(brief.progress_snapshot.overall, 50);
        assert_eq!(brief.progress_snapshot.change_vs_previous, 20);

        let without = aggregate(&docs, &[], &[], None, now);
        assert_eq!(without.progress_snapshot.change_vs_previous, 0);
    }

    #[test]
    fn test_per_workstream_progress() {
        let now = Utc::now();
        let ws = WorkstreamRow {
            id: Uuid::new_v4(),
            deal_id: Uuid::new_v4(),
            name: "Legal".to_string(),
            status: "active".to_string(),
        };
        let mut in_ws = doc("a", "reviewed", 100, 100, now);
        in_ws.workstream_id = Some(ws.id);
        let mut in_ws2 = doc("b", "new", 100, 100, now);
        in_ws2.workstream_id = Some(ws.id);
        let outside = doc("c", "new", 100, 100, now);

        let brief = aggregate(&[in_ws, in_ws2, outside], &[], std::slice::from_ref(&ws), None, now);
        assert_eq!(brief.progress_snapshot.workstreams["Legal"], 50);
    }

    #[test]
    fn test_changes_respect_24h_window() {
        let now = Utc::now();
        let docs = vec![
            doc("Fresh.pdf", "new", 3, 3, now),
            doc("Old.pdf", "new", 48, 48, now),
            doc("Edited.pdf", "updated", 72, 2, now),
            doc("Stale edit.pdf", "updated", 72, 48, now),
        ];
        let brief = aggregate(&docs, &[], &[], None, now);
        assert_eq!(brief.changes.new_documents, vec!["Fresh.pdf".to_string()]);
        assert_eq!(
            brief.changes.updated_documents,
            vec!["Edited.pdf".to_string()]
        );
    }

    #[test]
    fn test_blocker_caps() {
        let now = Utc::now();
        let comms: Vec<CommunicationRow> = (0..8)
            .map(|i| comm(&format!("Blocked {}", i), None, true, 1, now))
            .collect();
        let docs: Vec<DocumentRow> = (0..6)
            .map(|i| doc(&format!("Stalled {}", i), "new", 400, 24 * 10, now))
            .collect();

        let brief = aggregate(&docs, &comms, &[], None, now);
        // 5 communication-derived + 3 document-derived, never more
        assert_eq!(brief.blockers.items.len(), 8);
        let comm_derived = brief
            .blockers
            .items
            .iter()
            .filter(|b| b.owner.is_some())
            .count();
        assert_eq!(comm_derived, 5);
    }

    #[test]
    fn test_stalled_documents_report_age() {
        let now = Utc::now();
        let docs = vec![doc("Quiet.pdf", "updated", 600, 24 * 9, now)];
        let brief = aggregate(&docs, &[], &[], None, now);
        assert_eq!(brief.blockers.items.len(), 1);
        let item = &brief.blockers.items[0];
        assert_eq!(item.title, "Document pending review: Quiet.pdf");
        assert_eq!(item.age_days, 9);
    }

    #[test]
    fn test_reviewed_documents_never_stall() {
        let now = Utc::now();
        let docs = vec![doc("Done.pdf", "reviewed", 600, 24 * 30, now)];
        let brief = aggregate(&docs, &[], &[], None, now);
        assert!(brief.blockers.items.is_empty());
    }

    #[test]
    fn test_risk_keyword_heuristic() {
        let now = Utc::now();
        let docs = vec![
            doc("Legal Compliance Memo.pdf", "new", 3, 3, now),
            doc("Readme.txt", "new", 3, 3, now),
            doc("Liability waiver.docx", "updated", 3, 3, now),
        ];
        let brief = aggregate(&docs, &[], &[], None, now);
        // Only new documents matching a keyword; the updated one is skipped
        assert_eq!(brief.risks.items.len(), 1);
        assert_eq!(brief.risks.items[0].source, "Legal Compliance Memo.pdf");
        assert_eq!(brief.risks.items[0].severity, Severity::Medium);
    }

    #[test]
    fn test_notable_reason_precedence() {
        let now = Utc::now();
        let comms = vec![
            comm("Approval needed", Some("risk"), true, 1, now),
            comm("Deadline slipping", Some("risk"), false, 1, now),
            comm("Review the draft", None, false, 1, now),
            comm("Lunch plans", None, false, 1, now),
            comm("Urgent: old thread", None, false, 48, now),
        ];
        let brief = aggregate(&[], &comms, &[], None, now);

        let subjects: Vec<&str> = brief
            .communications
            .notable
            .iter()
            .map(|n| n.subject.as_str())
            .collect();
        // "Lunch plans" has no keyword and no sentiment; the 48h-old one is
        // outside the window
        assert_eq!(
            subjects,
            vec!["Approval needed", "Deadline slipping", "Review the draft"]
        );

        assert_eq!(brief.communications.notable[0].reason, NotableReason::Blocker);
        assert_eq!(brief.communications.notable[1].reason, NotableReason::Risk);
        assert_eq!(
            brief.communications.notable[2].reason,
            NotableReason::Important
        );
    }

    #[test]
    fn test_spec_example_scenario() {
        // 10 documents, 6 reviewed, 2 new created 3 hours ago, 2 updated
        // 2 days ago
        let now = Utc::now();
        let mut docs = Vec::new();
        for i in 0..6 {
            docs.push(doc(&format!("Reviewed {}", i), "reviewed", 200, 200, now));
        }
        docs.push(doc("Legal Compliance Memo.pdf", "new", 3, 3, now));
        docs.push(doc("Readme.txt", "new", 3, 3, now));
        docs.push(doc("Budget v2.xlsx", "updated", 200, 48, now));
        docs.push(doc("Org chart.pptx", "updated", 200, 48, now));

        let brief = aggregate(&docs, &[], &[], None, now);

        assert_eq!(brief.progress_snapshot.overall, 60);
        assert_eq!(
            brief.changes.new_documents,
            vec!["Legal Compliance Memo.pdf".to_string(), "Readme.txt".to_string()]
        );
        assert!(brief.changes.updated_documents.is_empty());
        assert_eq!(brief.risks.items.len(), 1);
        assert_eq!(brief.risks.items[0].source, "Legal Compliance Memo.pdf");
    }
}
