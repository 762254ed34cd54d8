use crate::dtos::{AdjustStockRequest, CreateProductRequest};
use crate::middleware::TenantContext;
use crate::models::CreateProduct;
use crate::startup::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use service_core::error::AppError;
use service_core::validator::Validate;
use uuid::Uuid;

pub async fn create_product(
    State(state): State<AppState>,
    tenant: TenantContext,
    Json(req): Json<CreateProductRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;

    let product = state
        .db
        .create_product(&CreateProduct {
            tenant_id: tenant.org_id,
            name: req.name,
            sku: req.sku,
            initial_stock: req.initial_stock,
            unit_cost: req.unit_cost,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(product)))
}

pub async fn get_product(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(product_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let product = state
        .db
        .get_product(tenant.org_id, product_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Product {} not found", product_id)))?;

    Ok(Json(product))
}

/// Audit/history view of a product's stock ledger, newest first.
pub async fn list_stock_movements(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(product_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let movements = state
        .db
        .list_stock_movements(tenant.org_id, product_id)
        .await?;

    Ok(Json(movements))
}

pub async fn adjust_stock(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(product_id): Path<Uuid>,
    Json(req): Json<AdjustStockRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;

    let movement = state
        .db
        .adjust_stock(tenant.org_id, product_id, req.delta, req.note, tenant.user_id)
        .await?;

    Ok((StatusCode::CREATED, Json(movement)))
}

/// Compensating deletion of a recent manual adjustment.
pub async fn delete_movement(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(movement_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state.db.delete_movement(tenant.org_id, movement_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
