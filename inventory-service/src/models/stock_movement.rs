//! Stock movement ledger model: one immutable row per stock change, with
//! before/after snapshots taken from the same atomic counter update.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Movement type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementType {
    Entry,
    Exit,
    Adjustment,
}

impl MovementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementType::Entry => "entry",
            MovementType::Exit => "exit",
            MovementType::Adjustment => "adjustment",
        }
    }

    pub fn from_string(s: &str) -> Option<Self> {
        match s {
            "entry" => Some(MovementType::Entry),
            "exit" => Some(MovementType::Exit),
            "adjustment" => Some(MovementType::Adjustment),
            _ => None,
        }
    }
}

/// The operation that caused a stock change, persisted as
/// `reference_type` + `reference_id` columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum MovementReference {
    PurchaseOrder(Uuid),
    SalesOrder(Uuid),
    ManualAdjustment(Uuid),
}

impl MovementReference {
    pub fn reference_type(&self) -> &'static str {
        match self {
            MovementReference::PurchaseOrder(_) => "purchase_order",
            MovementReference::SalesOrder(_) => "sales_order",
            MovementReference::ManualAdjustment(_) => "manual_adjustment",
        }
    }

    pub fn reference_id(&self) -> Uuid {
        match self {
            MovementReference::PurchaseOrder(id)
            | MovementReference::SalesOrder(id)
            | MovementReference::ManualAdjustment(id) => *id,
        }
    }

    pub fn from_parts(reference_type: &str, reference_id: Uuid) -> Option<Self> {
        match reference_type {
            "purchase_order" => Some(MovementReference::PurchaseOrder(reference_id)),
            "sales_order" => Some(MovementReference::SalesOrder(reference_id)),
            "manual_adjustment" => Some(MovementReference::ManualAdjustment(reference_id)),
            _ => None,
        }
    }
}

/// Single ledger row. `quantity` is the signed delta, so
/// `new_stock = previous_stock + quantity` holds for every row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StockMovement {
    pub movement_id: Uuid,
    pub tenant_id: Uuid,
    pub product_id: Uuid,
    pub movement_type: String,
    pub quantity: i64,
    pub previous_stock: i64,
    pub new_stock: i64,
    pub unit_cost: Decimal,
    pub total_cost: Decimal,
    pub reference_type: String,
    pub reference_id: Uuid,
    pub note: Option<String>,
    pub created_by: Uuid,
    pub created_utc: DateTime<Utc>,
}

impl StockMovement {
    /// Get the parsed causing-operation reference.
    pub fn reference(&self) -> Option<MovementReference> {
        MovementReference::from_parts(&self.reference_type, self.reference_id)
    }

    /// Get the parsed movement type.
    pub fn parsed_type(&self) -> Option<MovementType> {
        MovementType::from_string(&self.movement_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_parses_every_known_cause() {
        let id = Uuid::new_v4();
        for reference in [
            MovementReference::PurchaseOrder(id),
            MovementReference::SalesOrder(id),
            MovementReference::ManualAdjustment(id),
        ] {
            let parsed = MovementReference::from_parts(reference.reference_type(), id);
            assert_eq!(parsed, Some(reference));
        }
        assert_eq!(MovementReference::from_parts("unknown", id), None);
    }
}
