use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    Json,
};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

/// Receive a staged record at a location.
pub async fn receive_material(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::ReceiveMaterialRequest>,
) -> axum::response::Response {
    let cmd = match body.into_command() {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    match services.receive(cmd).await {
        Ok(position) => {
            (StatusCode::CREATED, Json(dto::position_to_json(position))).into_response()
        }
        Err(e) => errors::lifecycle_error_to_response(e),
    }
}

pub async fn list_materials(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    match services.positions().await {
        Ok(positions) => Json(
            positions
                .into_iter()
                .map(dto::position_to_json)
                .collect::<Vec<_>>(),
        )
        .into_response(),
        Err(e) => errors::lifecycle_error_to_response(e),
    }
}

pub async fn move_material(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::MoveMaterialRequest>,
) -> axum::response::Response {
    let cmd = match body.into_command() {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    match services.move_material(cmd).await {
        Ok(outcome) => Json(dto::move_outcome_to_json(outcome)).into_response(),
        Err(e) => errors::lifecycle_error_to_response(e),
    }
}

pub async fn remove_material(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::RemoveMaterialRequest>,
) -> axum::response::Response {
    let cmd = match body.into_command() {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    match services.remove(cmd).await {
        Ok(position) => Json(dto::position_to_json(position)).into_response(),
        Err(e) => errors::lifecycle_error_to_response(e),
    }
}

pub async fn get_ledger(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = match dto::parse_position_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.ledger(id).await {
        Ok(entries) => Json(
            entries
                .into_iter()
                .map(dto::ledger_entry_to_json)
                .collect::<Vec<_>>(),
        )
        .into_response(),
        Err(e) => errors::lifecycle_error_to_response(e),
    }
}

/// Reconcile a position against its ledger.
pub async fn audit_material(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = match dto::parse_position_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.audit(id).await {
        Ok(balance) => Json(dto::ledger_balance_to_json(balance)).into_response(),
        Err(e) => errors::lifecycle_error_to_response(e),
    }
}

pub async fn material_types(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    let types: Vec<&'static str> = services
        .material_types()
        .iter()
        .map(|t| t.as_str())
        .collect();
    Json(types).into_response()
}
