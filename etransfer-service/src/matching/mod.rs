//! The auto-match engine: candidate narrowing, weighted scoring, duplicate
//! suppression, review policy, and settlement orchestration.

pub mod candidates;
pub mod engine;
pub mod policy;
pub mod scoring;
pub mod similarity;

pub use engine::{AuditSink, MatchEngine, MatchStore, Settlement};
pub use policy::MatchPolicy;
