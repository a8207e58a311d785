//! Services module for etransfer-service.

pub mod audit;
pub mod database;
pub mod metrics;

pub use audit::PgAuditSink;
pub use database::Database;
pub use metrics::{get_metrics, init_metrics, record_error, record_match_outcome};
