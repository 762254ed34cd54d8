//! Request payloads for the HTTP surface. Shape validation happens here;
//! state checks (tenant ownership, status guards, over-receipt) live in
//! the service layer.

use crate::models::OrderKind;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateProductRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    pub sku: Option<String>,
    #[serde(default)]
    #[validate(range(min = 0))]
    pub initial_stock: i64,
    #[serde(default)]
    pub unit_cost: Decimal,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateOrderRequest {
    pub order_kind: OrderKind,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AddLineItemRequest {
    pub product_id: Option<Uuid>,
    #[validate(length(min = 1, max = 512))]
    pub description: String,
    #[validate(range(min = 1))]
    pub quantity: i64,
    pub unit_price: Decimal,
    #[serde(default)]
    pub discount_percent: Decimal,
    #[serde(default)]
    pub discount_amount: Decimal,
    #[serde(default)]
    pub tax_percent: Decimal,
    #[serde(default)]
    pub sort_order: i32,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateLineItemRequest {
    #[validate(length(min = 1, max = 512))]
    pub description: Option<String>,
    #[validate(range(min = 1))]
    pub quantity: Option<i64>,
    pub unit_price: Option<Decimal>,
    pub discount_percent: Option<Decimal>,
    pub discount_amount: Option<Decimal>,
    pub tax_percent: Option<Decimal>,
    pub sort_order: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ReceiveItemRequest {
    pub line_item_id: Uuid,
    pub product_id: Uuid,
    #[validate(range(min = 1))]
    pub quantity: i64,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ReceiveGoodsRequest {
    #[validate(length(min = 1), nested)]
    pub items: Vec<ReceiveItemRequest>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ConsumeItemRequest {
    pub product_id: Uuid,
    #[validate(range(min = 1))]
    pub quantity: i64,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ConsumeGoodsRequest {
    #[validate(length(min = 1), nested)]
    pub items: Vec<ConsumeItemRequest>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AdjustStockRequest {
    /// Signed stock delta; must be non-zero (enforced by the service).
    pub delta: i64,
    pub note: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn receipt_batches_must_not_be_empty() {
        let req = ReceiveGoodsRequest { items: vec![] };
        assert!(req.validate().is_err());

        let req = ConsumeGoodsRequest { items: vec![] };
        assert!(req.validate().is_err());
    }

    #[test]
    fn item_quantities_are_validated_through_the_batch() {
        let req = ReceiveGoodsRequest {
            items: vec![ReceiveItemRequest {
                line_item_id: Uuid::new_v4(),
                product_id: Uuid::new_v4(),
                quantity: 0,
            }],
        };
        assert!(req.validate().is_err());

        let req = ConsumeGoodsRequest {
            items: vec![ConsumeItemRequest {
                product_id: Uuid::new_v4(),
                quantity: 3,
            }],
        };
        assert!(req.validate().is_ok());
    }
}
