//! Totals recalculation engine.
//!
//! Recomputes an aggregate's monetary columns from the stored per-line
//! amounts. Always runs inside the caller's transaction so no caller can
//! observe an aggregate whose totals do not match its items.

use crate::models::{LineItem, OrderTotals};
use service_core::error::AppError;
use sqlx::{Postgres, Transaction};
use tracing::warn;
use uuid::Uuid;

/// Sum the stored `subtotal`/`discount_amount`/`tax_amount`/`total`
/// columns of the given items. The stored amounts are summed as-is, never
/// re-derived from quantity and price, to avoid double rounding.
pub fn sum_items<'a>(items: impl IntoIterator<Item = &'a LineItem>) -> OrderTotals {
    items.into_iter().fold(OrderTotals::ZERO, |acc, item| OrderTotals {
        subtotal: acc.subtotal + item.subtotal,
        discount_total: acc.discount_total + item.discount_amount,
        tax_total: acc.tax_total + item.tax_amount,
        total: acc.total + item.total,
    })
}

/// Recalculate and persist an aggregate's totals within `tx`.
///
/// Returns `Ok(None)` when the aggregate row no longer exists; the caller
/// that deleted it holds authority, so this is reported as non-fatal.
pub async fn recalculate_in_tx(
    tx: &mut Transaction<'_, Postgres>,
    tenant_id: Uuid,
    order_id: Uuid,
) -> Result<Option<OrderTotals>, AppError> {
    let items = sqlx::query_as::<_, LineItem>(
        r#"
        SELECT line_item_id, order_id, tenant_id, product_id, description, quantity,
            quantity_received, unit_price, discount_percent, discount_amount, tax_percent,
            subtotal, tax_amount, total, sort_order, created_utc
        FROM line_items
        WHERE tenant_id = $1 AND order_id = $2
        ORDER BY sort_order, created_utc
        "#,
    )
    .bind(tenant_id)
    .bind(order_id)
    .fetch_all(&mut **tx)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to load line items: {}", e)))?;

    let totals = sum_items(&items);

    let result = sqlx::query(
        r#"
        UPDATE orders
        SET subtotal = $3, discount_total = $4, tax_total = $5, total = $6, updated_utc = now()
        WHERE tenant_id = $1 AND order_id = $2
        "#,
    )
    .bind(tenant_id)
    .bind(order_id)
    .bind(totals.subtotal)
    .bind(totals.discount_total)
    .bind(totals.tax_total)
    .bind(totals.total)
    .execute(&mut **tx)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to persist totals: {}", e)))?;

    if result.rows_affected() == 0 {
        warn!(order_id = %order_id, "Totals recalculation skipped: aggregate no longer exists");
        return Ok(None);
    }

    Ok(Some(totals))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LineAmounts;
    use chrono::Utc;
    use rust_decimal::Decimal;

    fn item(quantity: i64, unit_price: &str, tax_percent: &str) -> LineItem {
        let amounts = LineAmounts::compute(
            quantity,
            unit_price.parse().unwrap(),
            Decimal::ZERO,
            Decimal::ZERO,
            tax_percent.parse().unwrap(),
        );
        LineItem {
            line_item_id: Uuid::new_v4(),
            order_id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            product_id: None,
            description: "part".to_string(),
            quantity,
            quantity_received: 0,
            unit_price: unit_price.parse().unwrap(),
            discount_percent: Decimal::ZERO,
            discount_amount: amounts.discount_amount,
            tax_percent: tax_percent.parse().unwrap(),
            subtotal: amounts.subtotal,
            tax_amount: amounts.tax_amount,
            total: amounts.total,
            sort_order: 0,
            created_utc: Utc::now(),
        }
    }

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn no_items_sum_to_zero() {
        let items: Vec<LineItem> = Vec::new();
        assert_eq!(sum_items(&items), OrderTotals::ZERO);
    }

    #[test]
    fn taxed_items_sum_to_expected_totals() {
        // [{qty:2, price:100, tax:16%}, {qty:1, price:50, tax:16%}]
        let items = vec![item(2, "100", "16"), item(1, "50", "16")];
        let totals = sum_items(&items);
        assert_eq!(totals.subtotal, dec("250"));
        assert_eq!(totals.tax_total, dec("40"));
        assert_eq!(totals.total, dec("290"));

        // Removing the second item recomputes to the first line alone.
        let totals = sum_items(&items[..1]);
        assert_eq!(totals.subtotal, dec("200"));
        assert_eq!(totals.tax_total, dec("32"));
        assert_eq!(totals.total, dec("232"));
    }

    #[test]
    fn summation_is_idempotent() {
        let items = vec![item(3, "19.99", "8.25"), item(1, "5", "0")];
        assert_eq!(sum_items(&items), sum_items(&items));
    }

    #[test]
    fn aggregate_identity_holds() {
        let items = vec![item(2, "100", "16"), item(4, "12.5", "7")];
        let totals = sum_items(&items);
        assert_eq!(
            totals.total,
            totals.subtotal - totals.discount_total + totals.tax_total
        );
    }
}
