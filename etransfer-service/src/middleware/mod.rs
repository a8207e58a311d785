//! Middleware for etransfer-service.

pub mod tenant;

pub use tenant::OrgContext;
