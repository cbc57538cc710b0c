//! Infrastructure layer: persistence and the fulfillment transaction boundary.

pub mod service;
pub mod store;

pub use service::{FulfillmentService, OrderDetail};
pub use store::{
    FulfillmentStore, FulfillmentTx, InMemoryFulfillmentStore, PostgresFulfillmentStore,
    StoreError,
};
