use core::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockroom_core::{DomainError, DomainResult, Entity, LineItemId, PartId, SalesOrderId};

/// Sales order status lifecycle.
///
/// Statuses fall into two groups: open (`Pending`, `InProgress`, `OnHold`) where the
/// order may still be fulfilled, and closed (everything else).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SalesOrderStatus {
    Pending,
    InProgress,
    OnHold,
    Shipped,
    Complete,
    Cancelled,
    Lost,
    Returned,
}

impl SalesOrderStatus {
    pub const OPEN: [SalesOrderStatus; 3] = [
        SalesOrderStatus::Pending,
        SalesOrderStatus::InProgress,
        SalesOrderStatus::OnHold,
    ];

    pub fn is_open(self) -> bool {
        Self::OPEN.contains(&self)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SalesOrderStatus::Pending => "pending",
            SalesOrderStatus::InProgress => "in_progress",
            SalesOrderStatus::OnHold => "on_hold",
            SalesOrderStatus::Shipped => "shipped",
            SalesOrderStatus::Complete => "complete",
            SalesOrderStatus::Cancelled => "cancelled",
            SalesOrderStatus::Lost => "lost",
            SalesOrderStatus::Returned => "returned",
        }
    }
}

impl core::fmt::Display for SalesOrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SalesOrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SalesOrderStatus::Pending),
            "in_progress" => Ok(SalesOrderStatus::InProgress),
            "on_hold" => Ok(SalesOrderStatus::OnHold),
            "shipped" => Ok(SalesOrderStatus::Shipped),
            "complete" => Ok(SalesOrderStatus::Complete),
            "cancelled" => Ok(SalesOrderStatus::Cancelled),
            "lost" => Ok(SalesOrderStatus::Lost),
            "returned" => Ok(SalesOrderStatus::Returned),
            other => Err(DomainError::validation(format!(
                "unknown sales order status: {other}"
            ))),
        }
    }
}

/// One row of a sales order: a part and the quantity owed to the customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    id: LineItemId,
    order_id: SalesOrderId,
    line_no: u32,
    part_id: PartId,
    quantity: Decimal,
    shipped: Decimal,
    notes: String,
}

impl LineItem {
    /// Build a line item, validating `0 <= shipped <= quantity` and `quantity > 0`.
    pub fn new(
        id: LineItemId,
        order_id: SalesOrderId,
        line_no: u32,
        part_id: PartId,
        quantity: Decimal,
        shipped: Decimal,
    ) -> DomainResult<Self> {
        if line_no == 0 {
            return Err(DomainError::validation("line_no starts at 1"));
        }
        if quantity <= Decimal::ZERO {
            return Err(DomainError::validation("quantity must be positive"));
        }
        if shipped < Decimal::ZERO {
            return Err(DomainError::validation("shipped must not be negative"));
        }
        if shipped > quantity {
            return Err(DomainError::invariant(
                "shipped quantity cannot exceed ordered quantity",
            ));
        }

        Ok(Self {
            id,
            order_id,
            line_no,
            part_id,
            quantity,
            shipped,
            notes: String::new(),
        })
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }

    pub fn order_id(&self) -> SalesOrderId {
        self.order_id
    }

    pub fn line_no(&self) -> u32 {
        self.line_no
    }

    pub fn part_id(&self) -> PartId {
        self.part_id
    }

    pub fn quantity(&self) -> Decimal {
        self.quantity
    }

    pub fn shipped(&self) -> Decimal {
        self.shipped
    }

    pub fn notes(&self) -> &str {
        &self.notes
    }

    /// Ordered minus shipped.
    pub fn remaining(&self) -> Decimal {
        self.quantity - self.shipped
    }

    pub fn is_open(&self) -> bool {
        self.shipped < self.quantity
    }

    pub fn is_complete(&self) -> bool {
        !self.is_open()
    }

    /// Re-point the line at a substitute part. The part itself is untouched.
    pub fn repoint_part(&mut self, part_id: PartId) {
        self.part_id = part_id;
    }

    /// Append one audit entry on its own line.
    pub fn append_note(&mut self, entry: &str) {
        if self.notes.is_empty() {
            self.notes = entry.to_string();
        } else {
            self.notes.push('\n');
            self.notes.push_str(entry);
        }
    }
}

impl Entity for LineItem {
    type Id = LineItemId;

    fn id(&self) -> LineItemId {
        self.id
    }
}

/// Aggregate root: SalesOrder and its line items (kept sorted by `line_no`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesOrder {
    id: SalesOrderId,
    reference: String,
    customer: Option<String>,
    status: SalesOrderStatus,
    lines: Vec<LineItem>,
}

impl SalesOrder {
    pub fn new(
        id: SalesOrderId,
        reference: impl Into<String>,
        customer: Option<String>,
        status: SalesOrderStatus,
    ) -> Self {
        Self {
            id,
            reference: reference.into(),
            customer,
            status,
            lines: Vec::new(),
        }
    }

    /// Reassemble an order from stored rows. Lines must belong to this order and have
    /// distinct line numbers.
    pub fn from_parts(
        id: SalesOrderId,
        reference: impl Into<String>,
        customer: Option<String>,
        status: SalesOrderStatus,
        mut lines: Vec<LineItem>,
    ) -> DomainResult<Self> {
        if lines.iter().any(|l| l.order_id != id) {
            return Err(DomainError::invariant("line item belongs to another order"));
        }
        lines.sort_by_key(|l| l.line_no);
        if lines.windows(2).any(|w| w[0].line_no == w[1].line_no) {
            return Err(DomainError::invariant("duplicate line_no within order"));
        }

        Ok(Self {
            id,
            reference: reference.into(),
            customer,
            status,
            lines,
        })
    }

    /// Add a line with the next sequence number and return its id.
    pub fn add_line(
        &mut self,
        part_id: PartId,
        quantity: Decimal,
        shipped: Decimal,
    ) -> DomainResult<LineItemId> {
        let next_line_no = self.lines.last().map_or(1, |l| l.line_no + 1);
        let line = LineItem::new(
            LineItemId::new(),
            self.id,
            next_line_no,
            part_id,
            quantity,
            shipped,
        )?;
        let id = line.id;
        self.lines.push(line);
        Ok(id)
    }

    pub fn reference(&self) -> &str {
        &self.reference
    }

    pub fn customer(&self) -> Option<&str> {
        self.customer.as_deref()
    }

    pub fn status(&self) -> SalesOrderStatus {
        self.status
    }

    pub fn is_open(&self) -> bool {
        self.status.is_open()
    }

    pub fn lines(&self) -> &[LineItem] {
        &self.lines
    }

    pub fn into_lines(self) -> Vec<LineItem> {
        self.lines
    }

    pub fn line(&self, id: LineItemId) -> Option<&LineItem> {
        self.lines.iter().find(|l| l.id == id)
    }

    pub fn line_mut(&mut self, id: LineItemId) -> Option<&mut LineItem> {
        self.lines.iter_mut().find(|l| l.id == id)
    }

    /// Open lines (shipped < ordered) requiring `part_id`, in `line_no` order.
    pub fn open_lines_for_part(&self, part_id: PartId) -> impl Iterator<Item = &LineItem> + '_ {
        self.lines
            .iter()
            .filter(move |l| l.part_id == part_id && l.is_open())
    }

    pub fn total_quantity(&self) -> Decimal {
        self.lines.iter().map(|l| l.quantity).sum()
    }

    pub fn shipped_quantity(&self) -> Decimal {
        self.lines.iter().map(|l| l.shipped).sum()
    }

    pub fn completed_lines(&self) -> usize {
        self.lines.iter().filter(|l| l.is_complete()).count()
    }

    /// Open status with at least one line not fully shipped.
    pub fn needs_fulfillment(&self) -> bool {
        self.is_open() && self.completed_lines() < self.lines.len()
    }
}

impl Entity for SalesOrder {
    type Id = SalesOrderId;

    fn id(&self) -> SalesOrderId {
        self.id
    }
}
