use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};
use uuid::Uuid;

use crate::database_connection::StoreError;
use crate::purchase_handler::PaymentFlowError;

pub const TRACE_ID_HEADER: &str = "x-trace-id";

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Internal server error")]
    Internal(#[source] anyhow::Error),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Internal(err.into())
    }
}

impl From<PaymentFlowError> for ApiError {
    fn from(err: PaymentFlowError) -> Self {
        match err {
            PaymentFlowError::MissingContact | PaymentFlowError::WrongRefundAmount { .. } => {
                ApiError::BadRequest(err.to_string())
            }
            PaymentFlowError::ProductNotFound | PaymentFlowError::PurchaseNotFound => {
                ApiError::NotFound(err.to_string())
            }
            PaymentFlowError::NoPaymentId(_) => ApiError::Conflict(err.to_string()),
            PaymentFlowError::Gateway(err) => ApiError::BadRequest(err.to_string()),
            PaymentFlowError::Store(err) => err.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let trace_id = Uuid::new_v4();
        let status = self.status();

        match &self {
            ApiError::Internal(source) => {
                error!(%trace_id, error = ?source, "Request failed")
            }
            other => warn!(%trace_id, %status, error = %other, "Request rejected"),
        }

        let message = self.to_string();

        (
            status,
            [(TRACE_ID_HEADER, trace_id.to_string())],
            Json(ErrorBody { error: &message }),
        )
            .into_response()
    }
}
