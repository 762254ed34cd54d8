use crate::dtos::{ConsumeGoodsRequest, CreateOrderRequest, ReceiveGoodsRequest};
use crate::middleware::TenantContext;
use crate::models::CreateOrder;
use crate::services::receiving::{ConsumeItem, ReceiveItem};
use crate::startup::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use service_core::error::AppError;
use service_core::validator::Validate;
use uuid::Uuid;

pub async fn create_order(
    State(state): State<AppState>,
    tenant: TenantContext,
    Json(req): Json<CreateOrderRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;

    let order = state
        .db
        .create_order(&CreateOrder {
            tenant_id: tenant.org_id,
            order_kind: req.order_kind,
            notes: req.notes,
            created_by: tenant.user_id,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(order)))
}

pub async fn get_order(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(order_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let order = state
        .db
        .get_order(tenant.org_id, order_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Order {} not found", order_id)))?;

    Ok(Json(order))
}

pub async fn cancel_order(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(order_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let order = state.db.cancel_order(tenant.org_id, order_id).await?;
    Ok(Json(order))
}

/// Receive goods against a purchase order. All-or-nothing: any invalid
/// line rolls back the whole batch.
pub async fn receive_goods(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(order_id): Path<Uuid>,
    Json(req): Json<ReceiveGoodsRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;

    let items: Vec<ReceiveItem> = req
        .items
        .iter()
        .map(|item| ReceiveItem {
            line_item_id: item.line_item_id,
            product_id: item.product_id,
            quantity: item.quantity,
        })
        .collect();

    let outcome = state
        .receiving
        .receive(tenant.org_id, order_id, &items, tenant.user_id)
        .await?;

    Ok(Json(outcome))
}

/// Consume stock against a work order or invoice.
pub async fn consume_goods(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(order_id): Path<Uuid>,
    Json(req): Json<ConsumeGoodsRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;

    let items: Vec<ConsumeItem> = req
        .items
        .iter()
        .map(|item| ConsumeItem {
            product_id: item.product_id,
            quantity: item.quantity,
        })
        .collect();

    let outcome = state
        .receiving
        .consume(tenant.org_id, order_id, &items, tenant.user_id)
        .await?;

    Ok(Json(outcome))
}

/// Repair/backfill entry point for the totals recalculation engine.
pub async fn recalculate_totals(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(order_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let totals = state.db.recalculate_totals(tenant.org_id, order_id).await?;
    Ok(Json(serde_json::json!({ "totals": totals })))
}
