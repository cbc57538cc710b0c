use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::{Map, Value, json};

use stockroom_fulfillment::FulfillmentError;

/// Map a fulfillment failure to its response: 400 for business rules, 404 for
/// unknown referenced records, 409 for contention, 500 for everything else.
/// Every body carries `retryable`.
pub fn fulfillment_error_to_response(err: FulfillmentError) -> axum::response::Response {
    let status = match &err {
        FulfillmentError::OrderNotFound(_)
        | FulfillmentError::LineNotFound(_)
        | FulfillmentError::PartNotFound(_) => StatusCode::NOT_FOUND,
        e if e.is_business_rule() => StatusCode::BAD_REQUEST,
        FulfillmentError::Conflict(_) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let code = err.code();
    let message = err.to_string();
    let retryable = err.is_retryable();

    let mut context = match err {
        FulfillmentError::NotFound { barcode } => json!({ "barcode": barcode }),
        FulfillmentError::Unavailable {
            stock_item,
            quantity,
        } => json!({ "stock_item": stock_item, "quantity": quantity }),
        FulfillmentError::NoMatch {
            stock_item,
            part,
            override_part,
            suggest_override,
        } => json!({
            "stock_item": stock_item,
            "part": part,
            "override_part": override_part,
            "suggest_override": suggest_override,
        }),
        FulfillmentError::RequiresConfirmation {
            original_part,
            override_part,
        } => json!({
            "requires_confirmation": true,
            "original_part": original_part,
            "override_part": override_part,
        }),
        FulfillmentError::OwnershipMismatch {
            line_item,
            sales_order,
        } => json!({ "line_item": line_item, "sales_order": sales_order }),
        FulfillmentError::AlreadyFulfilled {
            line_item,
            fully_shipped,
        } => json!({ "line_item": line_item, "fully_shipped": fully_shipped }),
        FulfillmentError::OrderClosed {
            sales_order,
            status,
        } => json!({ "sales_order": sales_order, "status": status.as_str() }),
        FulfillmentError::OrderNotFound(id) => json!({ "sales_order": id }),
        FulfillmentError::LineNotFound(id) => json!({ "line_item": id }),
        FulfillmentError::PartNotFound(id) => json!({ "part": id }),
        FulfillmentError::Conflict(_) => json!({}),
        FulfillmentError::Unexpected(detail) => {
            tracing::error!(%detail, "unexpected fulfillment failure");
            json!({})
        }
    };

    if let Value::Object(fields) = &mut context {
        fields.insert("retryable".into(), Value::Bool(retryable));
    }
    json_error_with(status, code, message, context)
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    json_error_with(status, code, message, Value::Null)
}

/// Error body `{"error": message, "code": code, ..context}`. `context` must be an
/// object (or null for none); its keys are merged into the top level.
pub fn json_error_with(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
    context: Value,
) -> axum::response::Response {
    let mut body = Map::new();
    body.insert("error".into(), Value::String(message.into()));
    body.insert("code".into(), Value::String(code.into()));
    if let Value::Object(extra) = context {
        for (key, value) in extra {
            body.entry(key).or_insert(value);
        }
    }
    (status, axum::Json(Value::Object(body))).into_response()
}
