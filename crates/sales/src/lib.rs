//! Sales orders domain module.
//!
//! Orders, their line items and the stock allocations committed against those lines.
//! Deterministic domain logic only (no IO, no HTTP, no storage).

pub mod allocation;
pub mod order;

pub use allocation::{Allocation, accumulated_quantity};
pub use order::{LineItem, SalesOrder, SalesOrderStatus};
