//! Organization context for multi-tenancy support.
//!
//! Every request is scoped to an organization via the X-Org-ID header, set
//! by the platform gateway after authenticating the caller and validating
//! organization membership.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use platform_core::error::AppError;
use uuid::Uuid;

/// Organization scope extracted from request headers.
#[derive(Debug, Clone, Copy)]
pub struct OrgContext {
    pub organization_id: Uuid,
}

#[async_trait]
impl<S> FromRequestParts<S> for OrgContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get("X-Org-ID")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                AppError::BadRequest(anyhow::anyhow!("Missing X-Org-ID header"))
            })?;

        let organization_id = Uuid::parse_str(raw)
            .map_err(|_| AppError::BadRequest(anyhow::anyhow!("Invalid X-Org-ID header")))?;

        tracing::Span::current().record("organization_id", raw);

        Ok(OrgContext { organization_id })
    }
}
