//! platform-core: shared infrastructure for platform services.

pub mod config;
pub mod error;
pub mod middleware;
pub mod observability;

pub use error::AppError;
