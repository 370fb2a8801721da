use std::sync::Arc;

use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub async fn stage_incoming(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::StageIncomingRequest>,
) -> axum::response::Response {
    let input = match body.into_new_incoming() {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.stage(input).await {
        Ok(record) => (StatusCode::CREATED, Json(dto::incoming_to_json(record))).into_response(),
        Err(e) => errors::lifecycle_error_to_response(e),
    }
}

pub async fn list_incoming(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    match services.incoming().await {
        Ok(records) => Json(
            records
                .into_iter()
                .map(dto::incoming_to_json)
                .collect::<Vec<_>>(),
        )
        .into_response(),
        Err(e) => errors::lifecycle_error_to_response(e),
    }
}
