//! Inventory domain module.
//!
//! Parts and the stock items that hold physical quantities of them. Both are
//! read-only from the fulfillment core's point of view.

pub mod part;
pub mod stock;

pub use part::Part;
pub use stock::StockItem;
