//! Product model. Stock is mutated only through ledger-producing
//! operations, never written directly by callers.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Product {
    pub product_id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub sku: Option<String>,
    pub stock_quantity: i64,
    pub unit_cost: Decimal,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

/// Input for registering a product.
#[derive(Debug, Clone)]
pub struct CreateProduct {
    pub tenant_id: Uuid,
    pub name: String,
    pub sku: Option<String>,
    pub initial_stock: i64,
    pub unit_cost: Decimal,
}
