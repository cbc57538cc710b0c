use serde::{Deserialize, Serialize};

use stockroom_core::{DomainError, DomainResult, Entity, PartId};

/// Catalogue part. Referenced by line items and stock items, never mutated by
/// fulfillment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Part {
    id: PartId,
    name: String,
    /// Internal part number.
    ipn: Option<String>,
}

impl Part {
    pub fn new(id: PartId, name: impl Into<String>, ipn: Option<String>) -> DomainResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::validation("part name must not be empty"));
        }
        Ok(Self { id, name, ipn })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ipn(&self) -> Option<&str> {
        self.ipn.as_deref()
    }
}

impl Entity for Part {
    type Id = PartId;

    fn id(&self) -> PartId {
        self.id
    }
}
