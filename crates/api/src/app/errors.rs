use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use stockledger_infra::lifecycle::LifecycleError;

pub fn lifecycle_error_to_response(err: LifecycleError) -> axum::response::Response {
    let message = err.to_string();
    match err {
        LifecycleError::Validation(_) => {
            json_error(StatusCode::BAD_REQUEST, "validation_error", message)
        }
        LifecycleError::InsufficientQuantity { .. } => {
            json_error(StatusCode::CONFLICT, "insufficient_quantity", message)
        }
        LifecycleError::NotFound(_) => json_error(StatusCode::NOT_FOUND, "not_found", message),
        LifecycleError::NoAvailableLayer { .. } => json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "no_available_layer",
            message,
        ),
        LifecycleError::Integrity(_) => json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "integrity_violation",
            message,
        ),
        LifecycleError::StoreUnavailable(_) => {
            json_error(StatusCode::SERVICE_UNAVAILABLE, "store_unavailable", message)
        }
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

pub fn bad_request(message: impl Into<String>) -> axum::response::Response {
    json_error(StatusCode::BAD_REQUEST, "bad_request", message)
}
