use crate::dtos::{AddLineItemRequest, UpdateLineItemRequest};
use crate::middleware::TenantContext;
use crate::models::{CreateLineItem, UpdateLineItem};
use crate::startup::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use service_core::error::AppError;
use service_core::validator::Validate;
use uuid::Uuid;

pub async fn add_line_item(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(order_id): Path<Uuid>,
    Json(req): Json<AddLineItemRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;

    let line_item = state
        .db
        .add_line_item(&CreateLineItem {
            tenant_id: tenant.org_id,
            order_id,
            product_id: req.product_id,
            description: req.description,
            quantity: req.quantity,
            unit_price: req.unit_price,
            discount_percent: req.discount_percent,
            discount_amount: req.discount_amount,
            tax_percent: req.tax_percent,
            sort_order: req.sort_order,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(line_item)))
}

pub async fn list_line_items(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(order_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let items = state.db.get_line_items(tenant.org_id, order_id).await?;
    Ok(Json(items))
}

pub async fn update_line_item(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(line_item_id): Path<Uuid>,
    Json(req): Json<UpdateLineItemRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;

    let line_item = state
        .db
        .update_line_item(
            tenant.org_id,
            line_item_id,
            &UpdateLineItem {
                description: req.description,
                quantity: req.quantity,
                unit_price: req.unit_price,
                discount_percent: req.discount_percent,
                discount_amount: req.discount_amount,
                tax_percent: req.tax_percent,
                sort_order: req.sort_order,
            },
        )
        .await?;

    Ok(Json(line_item))
}

pub async fn remove_line_item(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(line_item_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state
        .db
        .remove_line_item(tenant.org_id, line_item_id)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}
