//! Barcode resolution: scanned payload → stock item.
//!
//! Two explicit steps, tried in order:
//!
//! 1. hash the payload and look the hash up against stock item barcodes
//! 2. parse the payload as a structured reference (`{"stockitem": "<id>"}`) and
//!    look the referenced item up directly
//!
//! A malformed payload is simply "no reference"; only lookup failures from the store
//! surface as errors.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::sync::Arc;

use stockroom_core::StockItemId;
use stockroom_inventory::StockItem;

/// Key holding the stock item id in structured barcode payloads.
pub const STOCK_ITEM_KEY: &str = "stockitem";

/// Deterministic payload → hash function used for barcode lookups.
pub trait BarcodeHasher: Send + Sync {
    fn hash(&self, payload: &str) -> String;
}

/// SHA-256 over the payload with surrounding whitespace and control characters
/// removed, hex encoded.
#[derive(Debug, Default, Clone, Copy)]
pub struct Sha256BarcodeHasher;

impl BarcodeHasher for Sha256BarcodeHasher {
    fn hash(&self, payload: &str) -> String {
        let cleaned: String = payload.trim().chars().filter(|c| !c.is_control()).collect();
        hex::encode(Sha256::digest(cleaned.as_bytes()))
    }
}

/// Read access to stock items, as needed by the resolver.
#[async_trait]
pub trait StockLookup: Send + Sync {
    type Error: Send;

    async fn stock_by_barcode_hash(&self, hash: &str) -> Result<Option<StockItem>, Self::Error>;

    async fn stock_by_id(&self, id: StockItemId) -> Result<Option<StockItem>, Self::Error>;
}

#[async_trait]
impl<L> StockLookup for Arc<L>
where
    L: StockLookup + ?Sized,
{
    type Error = L::Error;

    async fn stock_by_barcode_hash(&self, hash: &str) -> Result<Option<StockItem>, Self::Error> {
        (**self).stock_by_barcode_hash(hash).await
    }

    async fn stock_by_id(&self, id: StockItemId) -> Result<Option<StockItem>, Self::Error> {
        (**self).stock_by_id(id).await
    }
}

/// Which resolution step produced the stock item, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    ByHash(StockItem),
    ByReference(StockItem),
    NotFound,
}

impl Resolution {
    pub fn into_stock_item(self) -> Option<StockItem> {
        match self {
            Resolution::ByHash(item) | Resolution::ByReference(item) => Some(item),
            Resolution::NotFound => None,
        }
    }

    pub fn step(&self) -> &'static str {
        match self {
            Resolution::ByHash(_) => "hash",
            Resolution::ByReference(_) => "reference",
            Resolution::NotFound => "none",
        }
    }
}

/// Extract a stock item id from a structured payload.
///
/// Returns `None` for anything that is not a JSON object with a string
/// `stockitem` field holding a valid id.
pub fn parse_stock_reference(payload: &str) -> Option<StockItemId> {
    let value: serde_json::Value = serde_json::from_str(payload.trim()).ok()?;
    value.get(STOCK_ITEM_KEY)?.as_str()?.parse().ok()
}

#[derive(Debug, Clone, Default)]
pub struct BarcodeResolver<H> {
    hasher: H,
}

impl<H: BarcodeHasher> BarcodeResolver<H> {
    pub fn new(hasher: H) -> Self {
        Self { hasher }
    }

    pub async fn resolve<L>(&self, lookup: &L, payload: &str) -> Result<Resolution, L::Error>
    where
        L: StockLookup + ?Sized,
    {
        let hash = self.hasher.hash(payload);
        if let Some(item) = lookup.stock_by_barcode_hash(&hash).await? {
            tracing::debug!(%hash, "barcode resolved by hash");
            return Ok(Resolution::ByHash(item));
        }

        let Some(id) = parse_stock_reference(payload) else {
            tracing::debug!(%hash, "barcode has no hash match and no stock reference");
            return Ok(Resolution::NotFound);
        };

        match lookup.stock_by_id(id).await? {
            Some(item) => {
                tracing::debug!(stock_item = %id, "barcode resolved by reference");
                Ok(Resolution::ByReference(item))
            }
            None => {
                tracing::debug!(stock_item = %id, "barcode references unknown stock item");
                Ok(Resolution::NotFound)
            }
        }
    }
}
