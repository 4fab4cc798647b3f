use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use tabill_core::payment::PaymentError;
use tabill_core::shell::ShellError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Malformed payload")]
    MalformedPayload,

    #[error("Payment gateway is not configured")]
    PaymentsDisabled,

    #[error(transparent)]
    Payment(#[from] PaymentError),

    #[error("Upstream unreachable: {0}")]
    Upstream(#[from] ShellError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            AppError::MalformedPayload => (StatusCode::BAD_REQUEST, json!({ "error": self.to_string() })),
            AppError::PaymentsDisabled => (
                StatusCode::SERVICE_UNAVAILABLE,
                json!({ "error": self.to_string() }),
            ),
            AppError::Payment(e) => (
                StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
                e.body(),
            ),
            AppError::Upstream(_) => (StatusCode::BAD_GATEWAY, json!({ "error": self.to_string() })),
        };

        (status, Json(body)).into_response()
    }
}
