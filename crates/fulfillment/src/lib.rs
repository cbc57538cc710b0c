//! Order fulfillment allocation.
//!
//! Decision logic for turning one barcode scan into a stock allocation against a
//! sales order line:
//!
//! ```text
//! barcode ──resolve──▶ stock item ──match──▶ line item ──gate──▶ plan ──▶ upsert
//! ```
//!
//! Everything here is deterministic and storage-agnostic. Persistence and the
//! transaction boundary live in `stockroom-infra`.

pub mod allocate;
pub mod barcode;
pub mod error;
pub mod matcher;
pub mod scan;
pub mod substitution;
pub mod unavailable;

pub use allocate::{AllocationPlan, plan_allocation};
pub use barcode::{
    BarcodeHasher, BarcodeResolver, Resolution, Sha256BarcodeHasher, StockLookup,
    parse_stock_reference,
};
pub use error::{FulfillmentError, FulfillmentResult};
pub use matcher::{LineCoverage, MatchedLine, match_line};
pub use scan::{MarkUnavailableRequest, ScanOutcome, ScanRequest, ScanState, ScanStep};
pub use substitution::{SubstitutionRequest, confirm_substitution};
pub use unavailable::{UNAVAILABLE_PREFIX, unavailable_entry};
