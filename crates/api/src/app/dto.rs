use serde_json::{Value, json};

use stockroom_core::Entity;
use stockroom_fulfillment::ScanOutcome;
use stockroom_infra::OrderDetail;
use stockroom_sales::{LineItem, SalesOrder};

pub const SCAN_ALLOCATED: &str = "Item scanned and allocated successfully";
pub const LINE_MARKED_UNAVAILABLE: &str = "Line item marked as unavailable";

pub fn scan_outcome_to_json(outcome: &ScanOutcome) -> Value {
    json!({
        "success": SCAN_ALLOCATED,
        "stock_item": outcome.stock_item,
        "line_item": outcome.line_item,
        "allocated_quantity": outcome.line_allocated,
        "allocation_quantity": outcome.allocation_quantity,
        "allocation_created": outcome.allocation_created,
        "substitution_made": outcome.substitution_made,
    })
}

pub fn unavailable_to_json(line: &LineItem) -> Value {
    json!({
        "success": LINE_MARKED_UNAVAILABLE,
        "line_item": line.id(),
        "notes": line.notes(),
    })
}

pub fn order_summary_to_json(order: &SalesOrder) -> Value {
    json!({
        "id": order.id(),
        "reference": order.reference(),
        "customer": order.customer(),
        "status": order.status().as_str(),
        "line_items": order.lines().len(),
        "completed_lines": order.completed_lines(),
        "total_quantity": order.total_quantity(),
        "shipped_quantity": order.shipped_quantity(),
    })
}

pub fn order_detail_to_json(detail: &OrderDetail) -> Value {
    let order = &detail.order;
    let lines = order
        .lines()
        .iter()
        .map(|line| {
            json!({
                "id": line.id(),
                "line_no": line.line_no(),
                "part": line.part_id(),
                "quantity": line.quantity(),
                "shipped": line.shipped(),
                "allocated": detail.allocated_on(line.id()),
                "remaining": line.remaining(),
                "notes": line.notes(),
            })
        })
        .collect::<Vec<_>>();

    json!({
        "id": order.id(),
        "reference": order.reference(),
        "customer": order.customer(),
        "status": order.status().as_str(),
        "lines": lines,
    })
}
