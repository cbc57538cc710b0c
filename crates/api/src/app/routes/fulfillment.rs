use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};

use stockroom_core::SalesOrderId;
use stockroom_fulfillment::{MarkUnavailableRequest, ScanRequest};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/scan", post(scan))
        .route("/mark-unavailable", post(mark_unavailable))
        .route("/orders", get(list_open_orders))
        .route("/orders/:id", get(get_order))
}

fn invalid_body(rejection: JsonRejection) -> axum::response::Response {
    errors::json_error(
        StatusCode::BAD_REQUEST,
        "invalid_request",
        rejection.body_text(),
    )
}

pub async fn scan(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<ScanRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(request) = match body {
        Ok(v) => v,
        Err(rejection) => return invalid_body(rejection),
    };
    if request.barcode.trim().is_empty() {
        return errors::json_error(
            StatusCode::BAD_REQUEST,
            "invalid_request",
            "barcode must not be empty",
        );
    }

    match services.fulfillment.scan(&request).await {
        Ok(outcome) => (StatusCode::OK, Json(dto::scan_outcome_to_json(&outcome))).into_response(),
        Err(e) => errors::fulfillment_error_to_response(e),
    }
}

pub async fn mark_unavailable(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<MarkUnavailableRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(request) = match body {
        Ok(v) => v,
        Err(rejection) => return invalid_body(rejection),
    };

    match services.fulfillment.mark_unavailable(&request).await {
        Ok(line) => (StatusCode::OK, Json(dto::unavailable_to_json(&line))).into_response(),
        Err(e) => errors::fulfillment_error_to_response(e),
    }
}

pub async fn list_open_orders(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    match services.fulfillment.open_orders().await {
        Ok(orders) => {
            let items = orders
                .iter()
                .map(dto::order_summary_to_json)
                .collect::<Vec<_>>();
            (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
        }
        Err(e) => errors::fulfillment_error_to_response(e),
    }
}

pub async fn get_order(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let order_id: SalesOrderId = match id.parse() {
        Ok(v) => v,
        Err(_) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid order id");
        }
    };

    match services.fulfillment.order_detail(order_id).await {
        Ok(detail) => (StatusCode::OK, Json(dto::order_detail_to_json(&detail))).into_response(),
        Err(e) => errors::fulfillment_error_to_response(e),
    }
}
