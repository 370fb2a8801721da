use axum::{
    routing::{get, patch},
    Router,
};

pub mod incoming;
pub mod materials;
pub mod reports;
pub mod system;

/// Router for all material, staging and report endpoints.
pub fn router() -> Router {
    Router::new()
        .route(
            "/incoming_materials",
            get(incoming::list_incoming).post(incoming::stage_incoming),
        )
        .route(
            "/materials",
            get(materials::list_materials).post(materials::receive_material),
        )
        .route("/materials/move-to-location", patch(materials::move_material))
        .route(
            "/materials/remove-from-location",
            patch(materials::remove_material),
        )
        .route("/materials/:id/ledger", get(materials::get_ledger))
        .route("/materials/:id/audit", get(materials::audit_material))
        .route("/material_types", get(materials::material_types))
        .route("/reports/transactions", get(reports::transactions))
        .route("/reports/balance", get(reports::balance))
}
