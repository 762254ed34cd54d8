//! Receiving processor: applies goods-receipt batches against purchase
//! orders, and stock consumption against work orders.
//!
//! A batch is all-or-nothing: every check and mutation runs in one
//! transaction, so a missing line item, a missing product or an
//! over-receipt rolls back the whole request and the caller gets an error
//! naming the offending item. Partial application never survives.

use crate::models::{
    derive_receiving_status, MovementReference, MovementType, OrderKind, PurchaseOrderStatus,
};
use crate::services::database::Database;
use crate::services::metrics::{error_label, ERRORS_TOTAL, GOODS_RECEIPTS_TOTAL};
use rust_decimal::Decimal;
use serde::Serialize;
use service_core::error::AppError;
use tracing::{info, instrument};
use uuid::Uuid;

/// One requested receipt line: `(line_item_id, product_id, quantity)`.
#[derive(Debug, Clone)]
pub struct ReceiveItem {
    pub line_item_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i64,
}

/// Per-item outcome of an applied receipt.
#[derive(Debug, Clone, Serialize)]
pub struct ReceiveItemResult {
    pub line_item_id: Uuid,
    pub product_id: Uuid,
    pub quantity_received: i64,
    pub new_total_received: i64,
    pub previous_stock: i64,
    pub new_stock: i64,
}

/// Result of a whole receipt batch.
#[derive(Debug, Clone, Serialize)]
pub struct ReceiveOutcome {
    pub items_processed: usize,
    pub results: Vec<ReceiveItemResult>,
    pub order_status: PurchaseOrderStatus,
}

/// One requested consumption line against a work order.
#[derive(Debug, Clone)]
pub struct ConsumeItem {
    pub product_id: Uuid,
    pub quantity: i64,
}

/// Per-item outcome of an applied consumption.
#[derive(Debug, Clone, Serialize)]
pub struct ConsumeItemResult {
    pub product_id: Uuid,
    pub quantity_consumed: i64,
    pub previous_stock: i64,
    pub new_stock: i64,
}

/// Result of a whole consumption batch.
#[derive(Debug, Clone, Serialize)]
pub struct ConsumeOutcome {
    pub items_processed: usize,
    pub results: Vec<ConsumeItemResult>,
}

/// Compute the item's new received total, rejecting over-receipt.
/// An addition that overflows `i64` necessarily exceeds the ordered
/// quantity too, so it is reported the same way.
pub fn next_received_total(
    line_item_id: Uuid,
    current_received: i64,
    quantity_ordered: i64,
    requested: i64,
) -> Result<i64, AppError> {
    match current_received.checked_add(requested) {
        Some(new_total) if new_total <= quantity_ordered => Ok(new_total),
        _ => Err(AppError::Conflict(anyhow::anyhow!(
            "Line item {}: receiving {} would exceed ordered quantity ({} of {} already received)",
            line_item_id,
            requested,
            current_received,
            quantity_ordered
        ))),
    }
}

/// Applies goods-receipt and consumption batches.
#[derive(Clone)]
pub struct ReceivingProcessor {
    db: Database,
}

impl ReceivingProcessor {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Receive goods against a purchase order.
    #[instrument(skip(self, items), fields(tenant_id = %tenant_id, order_id = %order_id, item_count = items.len()))]
    pub async fn receive(
        &self,
        tenant_id: Uuid,
        order_id: Uuid,
        items: &[ReceiveItem],
        created_by: Uuid,
    ) -> Result<ReceiveOutcome, AppError> {
        let outcome = self
            .receive_inner(tenant_id, order_id, items, created_by)
            .await;
        match &outcome {
            Ok(_) => GOODS_RECEIPTS_TOTAL.with_label_values(&["applied"]).inc(),
            Err(e) => {
                GOODS_RECEIPTS_TOTAL.with_label_values(&["rejected"]).inc();
                ERRORS_TOTAL.with_label_values(&[error_label(e)]).inc();
            }
        }
        outcome
    }

    async fn receive_inner(
        &self,
        tenant_id: Uuid,
        order_id: Uuid,
        items: &[ReceiveItem],
        created_by: Uuid,
    ) -> Result<ReceiveOutcome, AppError> {
        if items.is_empty() {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Receipt batch contains no items"
            )));
        }
        for item in items {
            if item.quantity <= 0 {
                return Err(AppError::BadRequest(anyhow::anyhow!(
                    "Line item {}: received quantity must be positive",
                    item.line_item_id
                )));
            }
        }

        let mut tx = self.db.begin().await?;

        let order = Database::lock_order(&mut tx, tenant_id, order_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Order {} not found", order_id)))?;

        if order.kind() != OrderKind::Purchase {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Order {} is not a purchase order",
                order_id
            )));
        }
        let status = order.receiving_status();
        if status.is_terminal() {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Order {} is '{}' and cannot receive goods",
                order_id,
                order.status
            )));
        }

        let mut results = Vec::with_capacity(items.len());

        for item in items {
            // Resolve the line, scoped to this order and tenant.
            let line: Option<(i64, i64, Decimal, Option<Uuid>)> = sqlx::query_as(
                r#"
                SELECT quantity_received, quantity, unit_price, product_id
                FROM line_items
                WHERE tenant_id = $1 AND order_id = $2 AND line_item_id = $3
                FOR UPDATE
                "#,
            )
            .bind(tenant_id)
            .bind(order_id)
            .bind(item.line_item_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to resolve line item: {}", e))
            })?;

            let (current_received, quantity_ordered, unit_price, line_product) =
                line.ok_or_else(|| {
                    AppError::NotFound(anyhow::anyhow!(
                        "Line item {} does not belong to order {}",
                        item.line_item_id,
                        order_id
                    ))
                })?;

            if line_product != Some(item.product_id) {
                return Err(AppError::BadRequest(anyhow::anyhow!(
                    "Line item {} does not reference product {}",
                    item.line_item_id,
                    item.product_id
                )));
            }

            let new_total_received = next_received_total(
                item.line_item_id,
                current_received,
                quantity_ordered,
                item.quantity,
            )?;

            sqlx::query(
                "UPDATE line_items SET quantity_received = $3 \
                 WHERE tenant_id = $1 AND line_item_id = $2",
            )
            .bind(tenant_id)
            .bind(item.line_item_id)
            .bind(new_total_received)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!(
                    "Failed to update received quantity: {}",
                    e
                ))
            })?;

            // Atomic counter update; previous stock derives from the same
            // statement so the ledger snapshot pair cannot tear.
            let (new_stock, _) =
                Database::shift_stock(&mut tx, tenant_id, item.product_id, item.quantity).await?;
            let previous_stock = new_stock - item.quantity;

            Database::append_movement_in_tx(
                &mut tx,
                Uuid::new_v4(),
                tenant_id,
                item.product_id,
                MovementType::Entry,
                item.quantity,
                previous_stock,
                new_stock,
                unit_price,
                unit_price * Decimal::from(item.quantity),
                MovementReference::PurchaseOrder(order_id),
                None,
                created_by,
            )
            .await?;

            results.push(ReceiveItemResult {
                line_item_id: item.line_item_id,
                product_id: item.product_id,
                quantity_received: item.quantity,
                new_total_received,
                previous_stock,
                new_stock,
            });
        }

        // Re-derive order status across all of its items.
        let pairs: Vec<(i64, i64)> = sqlx::query_as(
            "SELECT quantity_received, quantity FROM line_items \
             WHERE tenant_id = $1 AND order_id = $2",
        )
        .bind(tenant_id)
        .bind(order_id)
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to load receipt pairs: {}", e))
        })?;

        let order_status = derive_receiving_status(&pairs);

        sqlx::query(
            "UPDATE orders SET status = $3, updated_utc = now() \
             WHERE tenant_id = $1 AND order_id = $2",
        )
        .bind(tenant_id)
        .bind(order_id)
        .bind(order_status.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to update order status: {}", e))
        })?;

        tx.commit()
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to commit: {}", e)))?;

        info!(
            order_id = %order_id,
            items_processed = results.len(),
            order_status = order_status.as_str(),
            "Goods receipt applied"
        );

        Ok(ReceiveOutcome {
            items_processed: results.len(),
            results,
            order_status,
        })
    }

    /// Consume stock against a work order or invoice, appending `exit`
    /// ledger entries. Rejects any line that would drive stock negative.
    #[instrument(skip(self, items), fields(tenant_id = %tenant_id, order_id = %order_id, item_count = items.len()))]
    pub async fn consume(
        &self,
        tenant_id: Uuid,
        order_id: Uuid,
        items: &[ConsumeItem],
        created_by: Uuid,
    ) -> Result<ConsumeOutcome, AppError> {
        if items.is_empty() {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Consumption batch contains no items"
            )));
        }
        for item in items {
            if item.quantity <= 0 {
                return Err(AppError::BadRequest(anyhow::anyhow!(
                    "Product {}: consumed quantity must be positive",
                    item.product_id
                )));
            }
        }

        let mut tx = self.db.begin().await?;

        let order = Database::lock_order(&mut tx, tenant_id, order_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Order {} not found", order_id)))?;

        if order.kind() == OrderKind::Purchase {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Order {} is a purchase order; stock is received against it, not consumed",
                order_id
            )));
        }
        if order.receiving_status() == PurchaseOrderStatus::Cancelled {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Order {} is cancelled and cannot consume stock",
                order_id
            )));
        }

        let mut results = Vec::with_capacity(items.len());

        for item in items {
            let (new_stock, unit_cost) =
                Database::shift_stock(&mut tx, tenant_id, item.product_id, -item.quantity).await?;
            let previous_stock = new_stock + item.quantity;

            Database::append_movement_in_tx(
                &mut tx,
                Uuid::new_v4(),
                tenant_id,
                item.product_id,
                MovementType::Exit,
                -item.quantity,
                previous_stock,
                new_stock,
                unit_cost,
                unit_cost * Decimal::from(item.quantity),
                MovementReference::SalesOrder(order_id),
                None,
                created_by,
            )
            .await?;

            results.push(ConsumeItemResult {
                product_id: item.product_id,
                quantity_consumed: item.quantity,
                previous_stock,
                new_stock,
            });
        }

        tx.commit()
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to commit: {}", e)))?;

        info!(
            order_id = %order_id,
            items_processed = results.len(),
            "Stock consumption applied"
        );

        Ok(ConsumeOutcome {
            items_processed: results.len(),
            results,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn receipt_within_ordered_quantity_is_accepted() {
        let id = Uuid::new_v4();
        assert_eq!(next_received_total(id, 0, 10, 4).unwrap(), 4);
        assert_eq!(next_received_total(id, 4, 10, 6).unwrap(), 10);
    }

    #[test]
    fn over_receipt_is_rejected_and_names_the_item() {
        let id = Uuid::new_v4();
        let err = next_received_total(id, 4, 10, 7).unwrap_err();
        match err {
            AppError::Conflict(e) => {
                let message = e.to_string();
                assert!(message.contains(&id.to_string()));
                assert!(message.contains("exceed"));
            }
            other => panic!("expected Conflict, got {:?}", other),
        }
    }

    #[test]
    fn exact_remaining_quantity_is_the_boundary() {
        let id = Uuid::new_v4();
        assert_eq!(next_received_total(id, 9, 10, 1).unwrap(), 10);
        assert!(next_received_total(id, 10, 10, 1).is_err());
    }

    #[test]
    fn absurd_quantities_conflict_instead_of_overflowing() {
        let id = Uuid::new_v4();
        let err = next_received_total(id, 4, 10, i64::MAX).unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }
}
