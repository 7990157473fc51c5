//! Daily brief generation.
//!
//! The brief answers "what changed since yesterday, what's blocked, and
//! what could hurt us?" in five structured sections: progress, changes,
//! blockers, risks, and notable communications.
//!
//! [`aggregator::aggregate`] is the pure composition algorithm;
//! [`BriefGenerator`] wraps it with data access and persistence.

pub mod aggregator;
pub mod generator;
pub mod types;

pub use aggregator::aggregate;
pub use generator::BriefGenerator;
pub use types::{
    BlockerItem, Blockers, BriefData, Changes, Communications, NotableCommunication,
    NotableReason, ProgressSnapshot, RiskItem, Risks, Severity,
};
