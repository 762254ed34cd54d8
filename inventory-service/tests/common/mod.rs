//! Shared helpers for inventory-service integration tests.
//!
//! Tests run against a real PostgreSQL database named by
//! `TEST_DATABASE_URL` and skip cleanly when it is not set. Each test
//! works inside a fresh tenant, so tests never see each other's rows.

use inventory_service::models::{
    CreateLineItem, CreateOrder, CreateProduct, LineItem, OrderAggregate, OrderKind, Product,
};
use inventory_service::services::Database;
use rust_decimal::Decimal;
use uuid::Uuid;

pub async fn test_db() -> Option<Database> {
    let url = std::env::var("TEST_DATABASE_URL").ok()?;
    let db = Database::new(&url, 5, 1)
        .await
        .expect("Failed to connect to test database");
    db.run_migrations().await.expect("Failed to run migrations");
    Some(db)
}

pub fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

pub struct TestTenant {
    pub org_id: Uuid,
    pub user_id: Uuid,
}

impl TestTenant {
    pub fn new() -> Self {
        Self {
            org_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
        }
    }
}

pub async fn seed_product(
    db: &Database,
    tenant: &TestTenant,
    name: &str,
    initial_stock: i64,
    unit_cost: &str,
) -> Product {
    db.create_product(&CreateProduct {
        tenant_id: tenant.org_id,
        name: name.to_string(),
        sku: None,
        initial_stock,
        unit_cost: dec(unit_cost),
    })
    .await
    .expect("Failed to seed product")
}

pub async fn seed_order(db: &Database, tenant: &TestTenant, kind: OrderKind) -> OrderAggregate {
    db.create_order(&CreateOrder {
        tenant_id: tenant.org_id,
        order_kind: kind,
        notes: None,
        created_by: tenant.user_id,
    })
    .await
    .expect("Failed to seed order")
}

pub async fn seed_line_item(
    db: &Database,
    tenant: &TestTenant,
    order: &OrderAggregate,
    product_id: Option<Uuid>,
    quantity: i64,
    unit_price: &str,
    tax_percent: &str,
) -> LineItem {
    db.add_line_item(&CreateLineItem {
        tenant_id: tenant.org_id,
        order_id: order.order_id,
        product_id,
        description: "test part".to_string(),
        quantity,
        unit_price: dec(unit_price),
        discount_percent: Decimal::ZERO,
        discount_amount: Decimal::ZERO,
        tax_percent: dec(tax_percent),
        sort_order: 0,
    })
    .await
    .expect("Failed to seed line item")
}
