//! Transfer-notification ingress.

use axum::{extract::State, Json};
use platform_core::error::AppError;
use validator::Validate;

use crate::dtos::{MatchOutcomeResponse, MatchTransferRequest};
use crate::middleware::OrgContext;
use crate::models::TransferNotification;
use crate::services::record_error;
use crate::startup::AppState;

/// Match an incoming transfer notification against the organization's open
/// invoices and settle the result (auto-apply or park for review).
pub async fn match_transfer(
    State(state): State<AppState>,
    org: OrgContext,
    Json(payload): Json<MatchTransferRequest>,
) -> Result<Json<MatchOutcomeResponse>, AppError> {
    payload.validate()?;

    let notification = TransferNotification::from(payload);
    tracing::info!(
        organization_id = %org.organization_id,
        provider_message_id = %notification.provider_message_id,
        amount = %notification.amount,
        "Processing transfer notification"
    );

    let outcome = state
        .engine
        .process(org.organization_id, &notification)
        .await
        .map_err(|e| {
            record_error("match_transfer");
            e
        })?;

    Ok(Json(MatchOutcomeResponse::from(outcome)))
}
