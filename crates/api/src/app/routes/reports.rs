use std::sync::Arc;

use axum::{
    extract::{Extension, Query},
    response::IntoResponse,
    Json,
};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub async fn transactions(
    Extension(services): Extension<Arc<AppServices>>,
    Query(params): Query<dto::TransactionReportParams>,
) -> axum::response::Response {
    let query = match params.into_query() {
        Ok(q) => q,
        Err(resp) => return resp,
    };

    match services.transaction_report(&query).await {
        Ok(rows) => Json(
            rows.into_iter()
                .map(dto::transaction_row_to_json)
                .collect::<Vec<_>>(),
        )
        .into_response(),
        Err(e) => errors::lifecycle_error_to_response(e),
    }
}

pub async fn balance(
    Extension(services): Extension<Arc<AppServices>>,
    Query(params): Query<dto::BalanceReportParams>,
) -> axum::response::Response {
    let query = match params.into_query() {
        Ok(q) => q,
        Err(resp) => return resp,
    };

    match services.balance_report(&query).await {
        Ok(rows) => Json(
            rows.into_iter()
                .map(dto::balance_row_to_json)
                .collect::<Vec<_>>(),
        )
        .into_response(),
        Err(e) => errors::lifecycle_error_to_response(e),
    }
}
