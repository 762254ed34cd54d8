//! Order aggregate model: purchase orders, work orders and invoices share
//! one structural shape and one totals discipline.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Kind of order aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderKind {
    Purchase,
    Work,
    Invoice,
}

impl OrderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderKind::Purchase => "purchase",
            OrderKind::Work => "work",
            OrderKind::Invoice => "invoice",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "work" => OrderKind::Work,
            "invoice" => OrderKind::Invoice,
            _ => OrderKind::Purchase,
        }
    }
}

/// Receiving status of a purchase order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseOrderStatus {
    Draft,
    PartiallyReceived,
    Received,
    Cancelled,
}

impl PurchaseOrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PurchaseOrderStatus::Draft => "draft",
            PurchaseOrderStatus::PartiallyReceived => "partially_received",
            PurchaseOrderStatus::Received => "received",
            PurchaseOrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "partially_received" => PurchaseOrderStatus::PartiallyReceived,
            "received" => PurchaseOrderStatus::Received,
            "cancelled" => PurchaseOrderStatus::Cancelled,
            _ => PurchaseOrderStatus::Draft,
        }
    }

    /// Terminal states admit no further receiving.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PurchaseOrderStatus::Received | PurchaseOrderStatus::Cancelled
        )
    }

    /// Cancellation is only reachable before the order is fully received.
    pub fn can_cancel(&self) -> bool {
        matches!(
            self,
            PurchaseOrderStatus::Draft | PurchaseOrderStatus::PartiallyReceived
        )
    }
}

/// Derive a purchase order's status from `(quantity_received, quantity)`
/// pairs across all of its line items.
pub fn derive_receiving_status(items: &[(i64, i64)]) -> PurchaseOrderStatus {
    if items.is_empty() {
        return PurchaseOrderStatus::Draft;
    }
    if items.iter().all(|(received, ordered)| received >= ordered) {
        return PurchaseOrderStatus::Received;
    }
    if items.iter().any(|(received, _)| *received > 0) {
        return PurchaseOrderStatus::PartiallyReceived;
    }
    PurchaseOrderStatus::Draft
}

/// Order aggregate row. The four monetary columns are derived from the
/// current line items and refreshed by the totals recalculation engine.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OrderAggregate {
    pub order_id: Uuid,
    pub tenant_id: Uuid,
    pub order_kind: String,
    pub status: String,
    pub subtotal: Decimal,
    pub discount_total: Decimal,
    pub tax_total: Decimal,
    pub total: Decimal,
    pub notes: Option<String>,
    pub created_by: Uuid,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl OrderAggregate {
    pub fn kind(&self) -> OrderKind {
        OrderKind::from_string(&self.order_kind)
    }

    pub fn receiving_status(&self) -> PurchaseOrderStatus {
        PurchaseOrderStatus::from_string(&self.status)
    }
}

/// Input for creating an order aggregate.
#[derive(Debug, Clone)]
pub struct CreateOrder {
    pub tenant_id: Uuid,
    pub order_kind: OrderKind,
    pub notes: Option<String>,
    pub created_by: Uuid,
}

/// Derived monetary totals of an aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTotals {
    pub subtotal: Decimal,
    pub discount_total: Decimal,
    pub tax_total: Decimal,
    pub total: Decimal,
}

impl OrderTotals {
    pub const ZERO: OrderTotals = OrderTotals {
        subtotal: Decimal::ZERO,
        discount_total: Decimal::ZERO,
        tax_total: Decimal::ZERO,
        total: Decimal::ZERO,
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_with_no_items_stays_draft() {
        assert_eq!(derive_receiving_status(&[]), PurchaseOrderStatus::Draft);
        assert_eq!(
            derive_receiving_status(&[(0, 10), (0, 3)]),
            PurchaseOrderStatus::Draft
        );
    }

    #[test]
    fn any_receipt_short_of_full_is_partial() {
        assert_eq!(
            derive_receiving_status(&[(4, 10)]),
            PurchaseOrderStatus::PartiallyReceived
        );
        assert_eq!(
            derive_receiving_status(&[(10, 10), (0, 3)]),
            PurchaseOrderStatus::PartiallyReceived
        );
    }

    #[test]
    fn exactly_remaining_quantities_complete_the_order() {
        assert_eq!(
            derive_receiving_status(&[(10, 10), (3, 3)]),
            PurchaseOrderStatus::Received
        );
    }

    #[test]
    fn cancellation_guards() {
        assert!(PurchaseOrderStatus::Draft.can_cancel());
        assert!(PurchaseOrderStatus::PartiallyReceived.can_cancel());
        assert!(!PurchaseOrderStatus::Received.can_cancel());
        assert!(!PurchaseOrderStatus::Cancelled.can_cancel());

        assert!(PurchaseOrderStatus::Received.is_terminal());
        assert!(PurchaseOrderStatus::Cancelled.is_terminal());
        assert!(!PurchaseOrderStatus::PartiallyReceived.is_terminal());
    }
}
