//! Payment read surface, mainly for the review queue.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use platform_core::error::AppError;
use uuid::Uuid;

use crate::dtos::{ListPaymentsQuery, ListPaymentsResponse, PaymentResponse};
use crate::middleware::OrgContext;
use crate::models::PaymentStatus;
use crate::startup::AppState;

pub async fn list_payments(
    State(state): State<AppState>,
    org: OrgContext,
    Query(query): Query<ListPaymentsQuery>,
) -> Result<Json<ListPaymentsResponse>, AppError> {
    let status = match query.status.as_deref() {
        None => None,
        Some("pending_review") => Some(PaymentStatus::PendingReview),
        Some("completed") => Some(PaymentStatus::Completed),
        Some(other) => {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Unknown payment status '{}'",
                other
            )));
        }
    };

    let (payments, next_page_token) = state
        .db
        .list_payments(
            org.organization_id,
            status,
            query.page_size.unwrap_or(50),
            query.page_token,
        )
        .await?;

    Ok(Json(ListPaymentsResponse {
        payments: payments.into_iter().map(PaymentResponse::from).collect(),
        next_page_token,
    }))
}

pub async fn get_payment(
    State(state): State<AppState>,
    org: OrgContext,
    Path(payment_id): Path<Uuid>,
) -> Result<Json<PaymentResponse>, AppError> {
    let payment = state
        .db
        .get_payment(org.organization_id, payment_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Payment not found")))?;

    Ok(Json(PaymentResponse::from(payment)))
}
