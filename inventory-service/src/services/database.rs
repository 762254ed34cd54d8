//! Database service for inventory-service.

use crate::models::{
    CreateLineItem, CreateOrder, CreateProduct, LineAmounts, LineItem, MovementReference,
    MovementType, OrderAggregate, OrderTotals, Product, StockMovement, UpdateLineItem,
};
use crate::services::metrics::{DB_QUERY_DURATION, STOCK_MOVEMENTS_TOTAL};
use crate::services::totals;
use chrono::{Duration as ChronoDuration, Utc};
use rust_decimal::Decimal;
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

const LINE_ITEM_COLUMNS: &str = "line_item_id, order_id, tenant_id, product_id, description, \
    quantity, quantity_received, unit_price, discount_percent, discount_amount, tax_percent, \
    subtotal, tax_amount, total, sort_order, created_utc";

const ORDER_COLUMNS: &str = "order_id, tenant_id, order_kind, status, subtotal, discount_total, \
    tax_total, total, notes, created_by, created_utc, updated_utc";

const MOVEMENT_COLUMNS: &str = "movement_id, tenant_id, product_id, movement_type, quantity, \
    previous_stock, new_stock, unit_cost, total_cost, reference_type, reference_id, note, \
    created_by, created_utc";

const PRODUCT_COLUMNS: &str =
    "product_id, tenant_id, name, sku, stock_quantity, unit_cost, created_utc, updated_utc";

/// How long a manual adjustment stays reversible through ledger deletion.
const ADJUSTMENT_DELETE_WINDOW_HOURS: i64 = 24;

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "inventory-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;
        Ok(())
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Product Operations
    // -------------------------------------------------------------------------

    /// Register a product. `initial_stock` is the bootstrap value; every
    /// later stock change goes through a ledger-producing operation.
    #[instrument(skip(self, input), fields(tenant_id = %input.tenant_id))]
    pub async fn create_product(&self, input: &CreateProduct) -> Result<Product, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_product"])
            .start_timer();

        let product_id = Uuid::new_v4();
        let product = sqlx::query_as::<_, Product>(&format!(
            r#"
            INSERT INTO products (product_id, tenant_id, name, sku, stock_quantity, unit_cost)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {PRODUCT_COLUMNS}
            "#
        ))
        .bind(product_id)
        .bind(input.tenant_id)
        .bind(&input.name)
        .bind(&input.sku)
        .bind(input.initial_stock)
        .bind(input.unit_cost)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to create product: {}", e)))?;

        timer.observe_duration();

        info!(product_id = %product.product_id, name = %product.name, "Product created");

        Ok(product)
    }

    /// Get a product by ID.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, product_id = %product_id))]
    pub async fn get_product(
        &self,
        tenant_id: Uuid,
        product_id: Uuid,
    ) -> Result<Option<Product>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_product"])
            .start_timer();

        let product = sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE tenant_id = $1 AND product_id = $2"
        ))
        .bind(tenant_id)
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get product: {}", e)))?;

        timer.observe_duration();

        Ok(product)
    }

    // -------------------------------------------------------------------------
    // Order Aggregate Operations
    // -------------------------------------------------------------------------

    /// Create an order aggregate in `draft` status with zero totals.
    #[instrument(skip(self, input), fields(tenant_id = %input.tenant_id))]
    pub async fn create_order(&self, input: &CreateOrder) -> Result<OrderAggregate, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_order"])
            .start_timer();

        let order_id = Uuid::new_v4();
        let order = sqlx::query_as::<_, OrderAggregate>(&format!(
            r#"
            INSERT INTO orders (order_id, tenant_id, order_kind, status, notes, created_by)
            VALUES ($1, $2, $3, 'draft', $4, $5)
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(order_id)
        .bind(input.tenant_id)
        .bind(input.order_kind.as_str())
        .bind(&input.notes)
        .bind(input.created_by)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to create order: {}", e)))?;

        timer.observe_duration();

        info!(order_id = %order.order_id, order_kind = %order.order_kind, "Order created");

        Ok(order)
    }

    /// Get an order aggregate by ID.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, order_id = %order_id))]
    pub async fn get_order(
        &self,
        tenant_id: Uuid,
        order_id: Uuid,
    ) -> Result<Option<OrderAggregate>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_order"])
            .start_timer();

        let order = sqlx::query_as::<_, OrderAggregate>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE tenant_id = $1 AND order_id = $2"
        ))
        .bind(tenant_id)
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get order: {}", e)))?;

        timer.observe_duration();

        Ok(order)
    }

    /// Cancel an order. Allowed from `draft` or `partially_received` only.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, order_id = %order_id))]
    pub async fn cancel_order(
        &self,
        tenant_id: Uuid,
        order_id: Uuid,
    ) -> Result<OrderAggregate, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["cancel_order"])
            .start_timer();

        let mut tx = self.begin().await?;

        let order = Self::lock_order(&mut tx, tenant_id, order_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Order {} not found", order_id)))?;

        if !order.receiving_status().can_cancel() {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Order {} cannot be cancelled from status '{}'",
                order_id,
                order.status
            )));
        }

        let order = sqlx::query_as::<_, OrderAggregate>(&format!(
            r#"
            UPDATE orders SET status = 'cancelled', updated_utc = now()
            WHERE tenant_id = $1 AND order_id = $2
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(tenant_id)
        .bind(order_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to cancel order: {}", e)))?;

        tx.commit()
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to commit: {}", e)))?;

        timer.observe_duration();

        info!(order_id = %order_id, "Order cancelled");

        Ok(order)
    }

    // -------------------------------------------------------------------------
    // Line Item Operations
    // -------------------------------------------------------------------------

    /// Add a line item and recalculate the owning aggregate's totals in the
    /// same transaction.
    #[instrument(skip(self, input), fields(tenant_id = %input.tenant_id, order_id = %input.order_id))]
    pub async fn add_line_item(&self, input: &CreateLineItem) -> Result<LineItem, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["add_line_item"])
            .start_timer();

        let mut tx = self.begin().await?;

        let order = Self::lock_order(&mut tx, input.tenant_id, input.order_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(anyhow::anyhow!("Order {} not found", input.order_id))
            })?;
        Self::ensure_items_editable(&order)?;

        let amounts = LineAmounts::compute(
            input.quantity,
            input.unit_price,
            input.discount_percent,
            input.discount_amount,
            input.tax_percent,
        );

        let line_item_id = Uuid::new_v4();
        let line_item = sqlx::query_as::<_, LineItem>(&format!(
            r#"
            INSERT INTO line_items (line_item_id, tenant_id, order_id, product_id, description,
                quantity, unit_price, discount_percent, discount_amount, tax_percent,
                subtotal, tax_amount, total, sort_order)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            RETURNING {LINE_ITEM_COLUMNS}
            "#
        ))
        .bind(line_item_id)
        .bind(input.tenant_id)
        .bind(input.order_id)
        .bind(input.product_id)
        .bind(&input.description)
        .bind(input.quantity)
        .bind(input.unit_price)
        .bind(input.discount_percent)
        .bind(amounts.discount_amount)
        .bind(input.tax_percent)
        .bind(amounts.subtotal)
        .bind(amounts.tax_amount)
        .bind(amounts.total)
        .bind(input.sort_order)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to add line item: {}", e)))?;

        totals::recalculate_in_tx(&mut tx, input.tenant_id, input.order_id).await?;

        tx.commit()
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to commit: {}", e)))?;

        timer.observe_duration();

        info!(line_item_id = %line_item.line_item_id, "Line item added");

        Ok(line_item)
    }

    /// Get line items for an order.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, order_id = %order_id))]
    pub async fn get_line_items(
        &self,
        tenant_id: Uuid,
        order_id: Uuid,
    ) -> Result<Vec<LineItem>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_line_items"])
            .start_timer();

        let line_items = sqlx::query_as::<_, LineItem>(&format!(
            r#"
            SELECT {LINE_ITEM_COLUMNS}
            FROM line_items
            WHERE tenant_id = $1 AND order_id = $2
            ORDER BY sort_order, created_utc
            "#
        ))
        .bind(tenant_id)
        .bind(order_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get line items: {}", e)))?;

        timer.observe_duration();

        Ok(line_items)
    }

    /// Update a line item and recalculate the owning aggregate's totals in
    /// the same transaction. `None` fields keep their stored values.
    #[instrument(skip(self, input), fields(tenant_id = %tenant_id, line_item_id = %line_item_id))]
    pub async fn update_line_item(
        &self,
        tenant_id: Uuid,
        line_item_id: Uuid,
        input: &UpdateLineItem,
    ) -> Result<LineItem, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_line_item"])
            .start_timer();

        let mut tx = self.begin().await?;

        // Lock the parent aggregate before the item so concurrent edits of
        // the same aggregate serialize on one row.
        let (order, existing) =
            Self::lock_item_with_order(&mut tx, tenant_id, line_item_id).await?;
        Self::ensure_items_editable(&order)?;

        let quantity = input.quantity.unwrap_or(existing.quantity);
        let unit_price = input.unit_price.unwrap_or(existing.unit_price);
        let discount_percent = input.discount_percent.unwrap_or(existing.discount_percent);
        let discount_amount_input = input.discount_amount.unwrap_or(existing.discount_amount);
        let tax_percent = input.tax_percent.unwrap_or(existing.tax_percent);

        if quantity < existing.quantity_received {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Line item {} has already received {} units; quantity cannot drop below that",
                line_item_id,
                existing.quantity_received
            )));
        }

        let amounts = LineAmounts::compute(
            quantity,
            unit_price,
            discount_percent,
            discount_amount_input,
            tax_percent,
        );

        let line_item = sqlx::query_as::<_, LineItem>(&format!(
            r#"
            UPDATE line_items
            SET description = COALESCE($3, description),
                quantity = $4,
                unit_price = $5,
                discount_percent = $6,
                discount_amount = $7,
                tax_percent = $8,
                subtotal = $9,
                tax_amount = $10,
                total = $11,
                sort_order = COALESCE($12, sort_order)
            WHERE tenant_id = $1 AND line_item_id = $2
            RETURNING {LINE_ITEM_COLUMNS}
            "#
        ))
        .bind(tenant_id)
        .bind(line_item_id)
        .bind(&input.description)
        .bind(quantity)
        .bind(unit_price)
        .bind(discount_percent)
        .bind(amounts.discount_amount)
        .bind(tax_percent)
        .bind(amounts.subtotal)
        .bind(amounts.tax_amount)
        .bind(amounts.total)
        .bind(input.sort_order)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to update line item: {}", e))
        })?;

        totals::recalculate_in_tx(&mut tx, tenant_id, existing.order_id).await?;

        tx.commit()
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to commit: {}", e)))?;

        timer.observe_duration();

        info!(line_item_id = %line_item_id, "Line item updated");

        Ok(line_item)
    }

    /// Remove a line item and recalculate the owning aggregate's totals in
    /// the same transaction.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, line_item_id = %line_item_id))]
    pub async fn remove_line_item(
        &self,
        tenant_id: Uuid,
        line_item_id: Uuid,
    ) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["remove_line_item"])
            .start_timer();

        let mut tx = self.begin().await?;

        let (order, existing) =
            Self::lock_item_with_order(&mut tx, tenant_id, line_item_id).await?;
        Self::ensure_items_editable(&order)?;

        sqlx::query("DELETE FROM line_items WHERE tenant_id = $1 AND line_item_id = $2")
            .bind(tenant_id)
            .bind(line_item_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to remove line item: {}", e))
            })?;

        totals::recalculate_in_tx(&mut tx, tenant_id, existing.order_id).await?;

        tx.commit()
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to commit: {}", e)))?;

        timer.observe_duration();

        info!(line_item_id = %line_item_id, "Line item removed");

        Ok(())
    }

    /// Recalculate an aggregate's totals on demand (repair/backfill tooling).
    ///
    /// Returns `None` without error when the aggregate no longer exists.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, order_id = %order_id))]
    pub async fn recalculate_totals(
        &self,
        tenant_id: Uuid,
        order_id: Uuid,
    ) -> Result<Option<OrderTotals>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["recalculate_totals"])
            .start_timer();

        let mut tx = self.begin().await?;
        let totals = totals::recalculate_in_tx(&mut tx, tenant_id, order_id).await?;
        tx.commit()
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to commit: {}", e)))?;

        timer.observe_duration();

        Ok(totals)
    }

    // -------------------------------------------------------------------------
    // Stock Ledger Operations
    // -------------------------------------------------------------------------

    /// List ledger entries for a product, newest first.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, product_id = %product_id))]
    pub async fn list_stock_movements(
        &self,
        tenant_id: Uuid,
        product_id: Uuid,
    ) -> Result<Vec<StockMovement>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_stock_movements"])
            .start_timer();

        let movements = sqlx::query_as::<_, StockMovement>(&format!(
            r#"
            SELECT {MOVEMENT_COLUMNS}
            FROM stock_movements
            WHERE tenant_id = $1 AND product_id = $2
            ORDER BY created_utc DESC
            "#
        ))
        .bind(tenant_id)
        .bind(product_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to list stock movements: {}", e))
        })?;

        timer.observe_duration();

        Ok(movements)
    }

    /// Apply a manual stock adjustment: atomically shift the counter and
    /// append an `adjustment` ledger entry in one transaction.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, product_id = %product_id, delta = delta))]
    pub async fn adjust_stock(
        &self,
        tenant_id: Uuid,
        product_id: Uuid,
        delta: i64,
        note: Option<String>,
        created_by: Uuid,
    ) -> Result<StockMovement, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["adjust_stock"])
            .start_timer();

        if delta == 0 {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Adjustment delta must be non-zero"
            )));
        }

        let mut tx = self.begin().await?;

        let (new_stock, unit_cost) =
            Self::shift_stock(&mut tx, tenant_id, product_id, delta).await?;
        let previous_stock = new_stock - delta;

        // A manual adjustment is caused by nothing but itself, so the
        // reference points at the movement's own id and stays resolvable.
        let movement_id = Uuid::new_v4();
        let movement = Self::append_movement_in_tx(
            &mut tx,
            movement_id,
            tenant_id,
            product_id,
            MovementType::Adjustment,
            delta,
            previous_stock,
            new_stock,
            unit_cost,
            unit_cost * Decimal::from(delta.abs()),
            MovementReference::ManualAdjustment(movement_id),
            note,
            created_by,
        )
        .await?;

        tx.commit()
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to commit: {}", e)))?;

        timer.observe_duration();

        info!(movement_id = %movement.movement_id, delta = delta, "Stock adjusted");

        Ok(movement)
    }

    /// Delete a ledger entry as a compensating action. Only permitted for
    /// manual adjustments created within the last 24 hours; the stock delta
    /// is reversed in the same transaction.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, movement_id = %movement_id))]
    pub async fn delete_movement(
        &self,
        tenant_id: Uuid,
        movement_id: Uuid,
    ) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_movement"])
            .start_timer();

        let mut tx = self.begin().await?;

        let movement = sqlx::query_as::<_, StockMovement>(&format!(
            "SELECT {MOVEMENT_COLUMNS} FROM stock_movements \
             WHERE tenant_id = $1 AND movement_id = $2 FOR UPDATE"
        ))
        .bind(tenant_id)
        .bind(movement_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get movement: {}", e)))?
        .ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!("Stock movement {} not found", movement_id))
        })?;

        if !matches!(movement.reference(), Some(MovementReference::ManualAdjustment(_))) {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Only manual adjustments can be deleted from the ledger"
            )));
        }

        let age = Utc::now() - movement.created_utc;
        if age > ChronoDuration::hours(ADJUSTMENT_DELETE_WINDOW_HOURS) {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Adjustment {} is older than {} hours and can no longer be deleted",
                movement_id,
                ADJUSTMENT_DELETE_WINDOW_HOURS
            )));
        }

        Self::shift_stock(&mut tx, tenant_id, movement.product_id, -movement.quantity).await?;

        sqlx::query("DELETE FROM stock_movements WHERE tenant_id = $1 AND movement_id = $2")
            .bind(tenant_id)
            .bind(movement_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to delete movement: {}", e))
            })?;

        tx.commit()
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to commit: {}", e)))?;

        timer.observe_duration();

        info!(movement_id = %movement_id, "Compensating ledger deletion applied");

        Ok(())
    }

    // -------------------------------------------------------------------------
    // Transaction helpers (shared with the receiving processor)
    // -------------------------------------------------------------------------

    pub(crate) async fn begin(&self) -> Result<Transaction<'static, Postgres>, AppError> {
        self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })
    }

    /// Lock an order row for the duration of the transaction.
    pub(crate) async fn lock_order(
        tx: &mut Transaction<'_, Postgres>,
        tenant_id: Uuid,
        order_id: Uuid,
    ) -> Result<Option<OrderAggregate>, AppError> {
        sqlx::query_as::<_, OrderAggregate>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE tenant_id = $1 AND order_id = $2 FOR UPDATE"
        ))
        .bind(tenant_id)
        .bind(order_id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to lock order: {}", e)))
    }

    /// Resolve a line item by id and lock its parent aggregate (parent
    /// first, then the item, so lock order is consistent across callers).
    async fn lock_item_with_order(
        tx: &mut Transaction<'_, Postgres>,
        tenant_id: Uuid,
        line_item_id: Uuid,
    ) -> Result<(OrderAggregate, LineItem), AppError> {
        let order_id: Option<Uuid> = sqlx::query_scalar(
            "SELECT order_id FROM line_items WHERE tenant_id = $1 AND line_item_id = $2",
        )
        .bind(tenant_id)
        .bind(line_item_id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to resolve line item: {}", e))
        })?;

        let order_id = order_id.ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!("Line item {} not found", line_item_id))
        })?;

        let order = Self::lock_order(tx, tenant_id, order_id).await?.ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!("Order {} not found", order_id))
        })?;

        // Re-read under the aggregate lock; the item may have been removed
        // by a concurrent edit between the two statements.
        let item = sqlx::query_as::<_, LineItem>(&format!(
            "SELECT {LINE_ITEM_COLUMNS} FROM line_items \
             WHERE tenant_id = $1 AND line_item_id = $2 FOR UPDATE"
        ))
        .bind(tenant_id)
        .bind(line_item_id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to lock line item: {}", e)))?
        .ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!("Line item {} not found", line_item_id))
        })?;

        Ok((order, item))
    }

    /// Items may not be modified once the aggregate reached a terminal state.
    fn ensure_items_editable(order: &OrderAggregate) -> Result<(), AppError> {
        let status = order.receiving_status();
        if status.is_terminal() {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Order {} is '{}'; its line items can no longer be modified",
                order.order_id,
                order.status
            )));
        }
        Ok(())
    }

    /// Atomically shift a product's stock counter and return
    /// `(new_stock, unit_cost)`. The guard keeps stock non-negative; the
    /// single UPDATE..RETURNING is what makes the ledger's before/after
    /// snapshot pair reliable under concurrent callers.
    pub(crate) async fn shift_stock(
        tx: &mut Transaction<'_, Postgres>,
        tenant_id: Uuid,
        product_id: Uuid,
        delta: i64,
    ) -> Result<(i64, Decimal), AppError> {
        let row: Option<(i64, Decimal)> = sqlx::query_as(
            r#"
            UPDATE products
            SET stock_quantity = stock_quantity + $3, updated_utc = now()
            WHERE tenant_id = $1 AND product_id = $2 AND stock_quantity + $3 >= 0
            RETURNING stock_quantity, unit_cost
            "#,
        )
        .bind(tenant_id)
        .bind(product_id)
        .bind(delta)
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to update stock: {}", e)))?;

        match row {
            Some((new_stock, unit_cost)) => Ok((new_stock, unit_cost)),
            None => {
                let exists: Option<i64> = sqlx::query_scalar(
                    "SELECT stock_quantity FROM products WHERE tenant_id = $1 AND product_id = $2",
                )
                .bind(tenant_id)
                .bind(product_id)
                .fetch_optional(&mut **tx)
                .await
                .map_err(|e| {
                    AppError::DatabaseError(anyhow::anyhow!("Failed to read stock: {}", e))
                })?;

                match exists {
                    Some(current) => Err(AppError::Conflict(anyhow::anyhow!(
                        "Insufficient stock for product {}: {} on hand, change of {} requested",
                        product_id,
                        current,
                        delta
                    ))),
                    None => Err(AppError::NotFound(anyhow::anyhow!(
                        "Product {} not found",
                        product_id
                    ))),
                }
            }
        }
    }

    /// Append a ledger entry within `tx`. Movements are immutable once
    /// written; there is deliberately no update path.
    #[allow(clippy::too_many_arguments)]
    pub(crate) async fn append_movement_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        movement_id: Uuid,
        tenant_id: Uuid,
        product_id: Uuid,
        movement_type: MovementType,
        quantity: i64,
        previous_stock: i64,
        new_stock: i64,
        unit_cost: Decimal,
        total_cost: Decimal,
        reference: MovementReference,
        note: Option<String>,
        created_by: Uuid,
    ) -> Result<StockMovement, AppError> {
        let movement = sqlx::query_as::<_, StockMovement>(&format!(
            r#"
            INSERT INTO stock_movements (movement_id, tenant_id, product_id, movement_type,
                quantity, previous_stock, new_stock, unit_cost, total_cost,
                reference_type, reference_id, note, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING {MOVEMENT_COLUMNS}
            "#
        ))
        .bind(movement_id)
        .bind(tenant_id)
        .bind(product_id)
        .bind(movement_type.as_str())
        .bind(quantity)
        .bind(previous_stock)
        .bind(new_stock)
        .bind(unit_cost)
        .bind(total_cost)
        .bind(reference.reference_type())
        .bind(reference.reference_id())
        .bind(note)
        .bind(created_by)
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to append stock movement: {}", e))
        })?;

        STOCK_MOVEMENTS_TOTAL
            .with_label_values(&[movement_type.as_str()])
            .inc();

        Ok(movement)
    }
}
