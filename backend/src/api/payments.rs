use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use shared::{CancelPaymentRequest, CancelPaymentResponse, InitPaymentRequest, InitPaymentResponse};
use tracing::{error, info, warn};

use crate::api::errors::ApiError;
use crate::api::AppState;
use crate::external_services::signature::constant_time_eq;
use crate::external_services::tinkoff::Notification;
use crate::purchase_handler::NotificationOutcome;

const INVALID_TOKEN: &str = "Invalid Token";

pub async fn create_payment(
    State(state): State<AppState>,
    payload: Result<Json<InitPaymentRequest>, JsonRejection>,
) -> Result<Json<InitPaymentResponse>, ApiError> {
    let Json(request) = payload?;
    let url = state.payments.create_payment(request).await?;

    Ok(Json(InitPaymentResponse { url }))
}

/**
Webhook Т-Банка. Шлюз повторяет уведомление, пока не получит `OK`
 */
pub async fn payment_notification(
    State(state): State<AppState>,
    payload: Result<Json<Notification>, JsonRejection>,
) -> Response {
    let notification = match payload {
        Ok(Json(notification)) => notification,
        Err(rejection) => {
            warn!(reason = %rejection.body_text(), "Unreadable payment notification");
            return (StatusCode::BAD_REQUEST, INVALID_TOKEN).into_response();
        }
    };

    match state.payments.handle_notification(&notification).await {
        Ok(NotificationOutcome::Rejected) => (StatusCode::BAD_REQUEST, INVALID_TOKEN).into_response(),
        Ok(_) => (StatusCode::OK, "OK").into_response(),
        Err(err) => {
            error!(order_id = %notification.order_id, error = %err, "Failed to apply payment notification");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
}

pub async fn cancel_payment(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<CancelPaymentRequest>, JsonRejection>,
) -> Result<Json<CancelPaymentResponse>, ApiError> {
    let authorized = match (&state.admin_token, bearer_token(&headers)) {
        (Some(expected), Some(given)) => {
            constant_time_eq(expected.reveal().as_bytes(), given.as_bytes())
        }
        _ => false,
    };
    if !authorized {
        return Err(ApiError::Unauthorized);
    }

    let Json(request) = payload?;

    info!(purchase_id = request.purchase_id, amount = ?request.amount, "Cancel requested");

    let response = state
        .payments
        .cancel_payment(request.purchase_id, request.amount)
        .await?;

    Ok(Json(response))
}
