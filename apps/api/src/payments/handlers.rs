use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;

use crate::auth::Session;
use crate::errors::AppError;
use crate::models::Payment;
use crate::payments::subscription::{
    self, CreateOrderRequest, CreateOrderResponse, RecordPaymentRequest, SubscriptionStatus,
    VerifyRequest, VerifyResponse,
};
use crate::state::AppState;

/// POST /api/razorpay
pub async fn handle_create_order(
    State(state): State<AppState>,
    session: Session,
    Json(request): Json<CreateOrderRequest>,
) -> Result<Json<CreateOrderResponse>, AppError> {
    let response = subscription::create_order(
        state.store.as_ref(),
        &state.gateway,
        session,
        request,
        Utc::now(),
    )
    .await?;
    Ok(Json(response))
}

/// POST /api/razorpay/verify
pub async fn handle_verify(
    State(state): State<AppState>,
    session: Session,
    Json(request): Json<VerifyRequest>,
) -> Result<Json<VerifyResponse>, AppError> {
    subscription::verify(
        state.store.as_ref(),
        &state.gateway,
        session,
        request,
        Utc::now(),
    )
    .await?;
    Ok(Json(VerifyResponse { success: true }))
}

/// GET /api/payments/check-subscription
///
/// Answers `hasActiveSubscription: false` (with 401) rather than a bare error
/// when the caller has no session, so pages can branch on one field.
pub async fn handle_check_subscription(
    State(state): State<AppState>,
    session: Option<Session>,
) -> Result<Response, AppError> {
    let Some(session) = session else {
        let body = SubscriptionStatus {
            has_active_subscription: false,
            subscription: None,
        };
        return Ok((StatusCode::UNAUTHORIZED, Json(body)).into_response());
    };

    let status =
        subscription::check_active_subscription(state.store.as_ref(), session.user_id, Utc::now())
            .await?;
    Ok(Json(status).into_response())
}

/// POST /api/payments
pub async fn handle_record_payment(
    State(state): State<AppState>,
    session: Session,
    Json(request): Json<RecordPaymentRequest>,
) -> Result<(StatusCode, Json<Payment>), AppError> {
    let payment = subscription::record_payment(state.store.as_ref(), session, request).await?;
    Ok((StatusCode::CREATED, Json(payment)))
}

/// GET /api/payments
pub async fn handle_list_payments(
    State(state): State<AppState>,
    session: Session,
) -> Result<Json<Vec<Payment>>, AppError> {
    Ok(Json(
        subscription::list_payments(state.store.as_ref(), session).await?,
    ))
}
