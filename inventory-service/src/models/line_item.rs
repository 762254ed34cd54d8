//! Line item model shared by purchase orders, work orders and invoices.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Line item on an order aggregate.
///
/// `subtotal`, `tax_amount` and `total` are derived at write time via
/// [`LineAmounts::compute`] and stored, so aggregate totals can be summed
/// without re-deriving from raw inputs.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LineItem {
    pub line_item_id: Uuid,
    pub order_id: Uuid,
    pub tenant_id: Uuid,
    pub product_id: Option<Uuid>,
    pub description: String,
    pub quantity: i64,
    pub quantity_received: i64,
    pub unit_price: Decimal,
    pub discount_percent: Decimal,
    pub discount_amount: Decimal,
    pub tax_percent: Decimal,
    pub subtotal: Decimal,
    pub tax_amount: Decimal,
    pub total: Decimal,
    pub sort_order: i32,
    pub created_utc: DateTime<Utc>,
}

/// Input for creating a line item.
#[derive(Debug, Clone)]
pub struct CreateLineItem {
    pub tenant_id: Uuid,
    pub order_id: Uuid,
    pub product_id: Option<Uuid>,
    pub description: String,
    pub quantity: i64,
    pub unit_price: Decimal,
    pub discount_percent: Decimal,
    pub discount_amount: Decimal,
    pub tax_percent: Decimal,
    pub sort_order: i32,
}

/// Partial input for updating a line item; `None` keeps the stored value.
#[derive(Debug, Clone, Default)]
pub struct UpdateLineItem {
    pub description: Option<String>,
    pub quantity: Option<i64>,
    pub unit_price: Option<Decimal>,
    pub discount_percent: Option<Decimal>,
    pub discount_amount: Option<Decimal>,
    pub tax_percent: Option<Decimal>,
    pub sort_order: Option<i32>,
}

/// Monetary amounts derived from a line item's raw inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineAmounts {
    pub subtotal: Decimal,
    pub discount_amount: Decimal,
    pub tax_amount: Decimal,
    pub total: Decimal,
}

impl LineAmounts {
    /// Compute the stored amounts for a line.
    ///
    /// A positive `discount_percent` takes precedence over a fixed
    /// `discount_amount`; tax applies to the discounted base.
    pub fn compute(
        quantity: i64,
        unit_price: Decimal,
        discount_percent: Decimal,
        discount_amount: Decimal,
        tax_percent: Decimal,
    ) -> Self {
        let subtotal = Decimal::from(quantity) * unit_price;
        let discount = if discount_percent > Decimal::ZERO {
            subtotal * discount_percent / Decimal::ONE_HUNDRED
        } else {
            discount_amount
        };
        let after_discount = subtotal - discount;
        let tax_amount = after_discount * tax_percent / Decimal::ONE_HUNDRED;

        Self {
            subtotal,
            discount_amount: discount,
            tax_amount,
            total: after_discount + tax_amount,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn plain_line_has_no_discount_or_tax() {
        let amounts = LineAmounts::compute(10, dec("150"), Decimal::ZERO, Decimal::ZERO, Decimal::ZERO);
        assert_eq!(amounts.subtotal, dec("1500"));
        assert_eq!(amounts.discount_amount, Decimal::ZERO);
        assert_eq!(amounts.tax_amount, Decimal::ZERO);
        assert_eq!(amounts.total, dec("1500"));
    }

    #[test]
    fn tax_applies_to_discounted_base() {
        // 4 x 50 = 200, 10% discount = 20, tax 16% of 180 = 28.80
        let amounts = LineAmounts::compute(4, dec("50"), dec("10"), Decimal::ZERO, dec("16"));
        assert_eq!(amounts.subtotal, dec("200"));
        assert_eq!(amounts.discount_amount, dec("20"));
        assert_eq!(amounts.tax_amount, dec("28.8"));
        assert_eq!(amounts.total, dec("208.8"));
    }

    #[test]
    fn percent_discount_wins_over_fixed_amount() {
        let amounts = LineAmounts::compute(2, dec("100"), dec("25"), dec("999"), Decimal::ZERO);
        assert_eq!(amounts.discount_amount, dec("50"));
        assert_eq!(amounts.total, dec("150"));
    }

    #[test]
    fn fixed_discount_used_when_percent_is_zero() {
        let amounts = LineAmounts::compute(2, dec("100"), Decimal::ZERO, dec("30"), Decimal::ZERO);
        assert_eq!(amounts.discount_amount, dec("30"));
        assert_eq!(amounts.total, dec("170"));
    }

    #[test]
    fn taxed_lines_match_expected_totals() {
        // 2 x 100 @ 16% -> 200 + 32 = 232; 1 x 50 @ 16% -> 50 + 8 = 58
        let first = LineAmounts::compute(2, dec("100"), Decimal::ZERO, Decimal::ZERO, dec("16"));
        assert_eq!(first.subtotal, dec("200"));
        assert_eq!(first.tax_amount, dec("32"));
        assert_eq!(first.total, dec("232"));

        let second = LineAmounts::compute(1, dec("50"), Decimal::ZERO, Decimal::ZERO, dec("16"));
        assert_eq!(second.tax_amount, dec("8"));
        assert_eq!(second.total, dec("58"));
    }
}
