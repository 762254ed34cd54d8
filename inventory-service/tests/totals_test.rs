//! Totals recalculation and ledger-maintenance integration tests.

mod common;

use common::{dec, seed_line_item, seed_order, seed_product, test_db, TestTenant};
use inventory_service::models::{MovementReference, OrderKind, UpdateLineItem};
use serial_test::serial;
use service_core::error::AppError;
use uuid::Uuid;

macro_rules! require_db {
    () => {
        match test_db().await {
            Some(db) => db,
            None => {
                eprintln!("TEST_DATABASE_URL not set; skipping");
                return;
            }
        }
    };
}

#[tokio::test]
#[serial]
async fn totals_follow_every_item_mutation() {
    let db = require_db!();
    let tenant = TestTenant::new();

    let order = seed_order(&db, &tenant, OrderKind::Invoice).await;
    let first = seed_line_item(&db, &tenant, &order, None, 2, "100", "16").await;
    let second = seed_line_item(&db, &tenant, &order, None, 1, "50", "16").await;
    assert_eq!(first.total, dec("232"));
    assert_eq!(second.total, dec("58"));

    let row = db
        .get_order(tenant.org_id, order.order_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.subtotal, dec("250"));
    assert_eq!(row.tax_total, dec("40"));
    assert_eq!(row.total, dec("290"));

    db.remove_line_item(tenant.org_id, second.line_item_id)
        .await
        .unwrap();

    let row = db
        .get_order(tenant.org_id, order.order_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.subtotal, dec("200"));
    assert_eq!(row.tax_total, dec("32"));
    assert_eq!(row.total, dec("232"));

    db.update_line_item(
        tenant.org_id,
        first.line_item_id,
        &UpdateLineItem {
            quantity: Some(3),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let row = db
        .get_order(tenant.org_id, order.order_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.subtotal, dec("300"));
    assert_eq!(row.total, dec("348"));
    assert_eq!(row.total, row.subtotal - row.discount_total + row.tax_total);
}

#[tokio::test]
#[serial]
async fn recalculation_is_idempotent_and_tolerates_missing_aggregates() {
    let db = require_db!();
    let tenant = TestTenant::new();

    let order = seed_order(&db, &tenant, OrderKind::Work).await;
    seed_line_item(&db, &tenant, &order, None, 3, "19.99", "8.25").await;

    let first = db
        .recalculate_totals(tenant.org_id, order.order_id)
        .await
        .unwrap()
        .expect("Aggregate exists");
    let second = db
        .recalculate_totals(tenant.org_id, order.order_id)
        .await
        .unwrap()
        .expect("Aggregate exists");
    assert_eq!(first, second);

    // Missing aggregate: a non-fatal no-op.
    let missing = db
        .recalculate_totals(tenant.org_id, Uuid::new_v4())
        .await
        .unwrap();
    assert!(missing.is_none());
}

#[tokio::test]
#[serial]
async fn items_of_cancelled_orders_are_frozen() {
    let db = require_db!();
    let tenant = TestTenant::new();

    let order = seed_order(&db, &tenant, OrderKind::Purchase).await;
    let item = seed_line_item(&db, &tenant, &order, None, 2, "10", "0").await;

    db.cancel_order(tenant.org_id, order.order_id).await.unwrap();

    let err = db
        .remove_line_item(tenant.org_id, item.line_item_id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    // Cancellation is terminal.
    let err = db.cancel_order(tenant.org_id, order.order_id).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
}

#[tokio::test]
#[serial]
async fn tenants_never_see_each_other() {
    let db = require_db!();
    let tenant = TestTenant::new();
    let intruder = TestTenant::new();

    let order = seed_order(&db, &tenant, OrderKind::Invoice).await;
    let item = seed_line_item(&db, &tenant, &order, None, 1, "10", "0").await;

    assert!(db
        .get_order(intruder.org_id, order.order_id)
        .await
        .unwrap()
        .is_none());

    let err = db
        .remove_line_item(intruder.org_id, item.line_item_id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
#[serial]
async fn manual_adjustments_are_reversible_within_the_window() {
    let db = require_db!();
    let tenant = TestTenant::new();

    let product = seed_product(&db, &tenant, "washer", 10, "0.10").await;

    let movement = db
        .adjust_stock(tenant.org_id, product.product_id, -3, None, tenant.user_id)
        .await
        .unwrap();
    assert_eq!(movement.previous_stock, 10);
    assert_eq!(movement.new_stock, 7);
    assert_eq!(movement.movement_type, "adjustment");
    // The reference resolves to the movement itself.
    assert_eq!(
        movement.reference(),
        Some(MovementReference::ManualAdjustment(movement.movement_id))
    );

    db.delete_movement(tenant.org_id, movement.movement_id)
        .await
        .unwrap();

    let row = db
        .get_product(tenant.org_id, product.product_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.stock_quantity, 10);
    assert!(db
        .list_stock_movements(tenant.org_id, product.product_id)
        .await
        .unwrap()
        .is_empty());

    // Stock can never go negative through an adjustment.
    let err = db
        .adjust_stock(tenant.org_id, product.product_id, -11, None, tenant.user_id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
}
