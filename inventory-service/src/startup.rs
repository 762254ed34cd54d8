use axum::{
    middleware::from_fn,
    routing::{get, post},
    Router,
};
use service_core::middleware::{metrics::metrics_middleware, tracing::request_id_middleware};
use tower_http::trace::TraceLayer;

use crate::handlers::{
    app::{health_check, metrics},
    items::{add_line_item, list_line_items, remove_line_item, update_line_item},
    orders::{
        cancel_order, consume_goods, create_order, get_order, receive_goods, recalculate_totals,
    },
    products::{
        adjust_stock, create_product, delete_movement, get_product, list_stock_movements,
    },
};
use crate::services::{Database, ReceivingProcessor};

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub receiving: ReceivingProcessor,
}

impl AppState {
    pub fn new(db: Database) -> Self {
        let receiving = ReceivingProcessor::new(db.clone());
        Self { db, receiving }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .route("/products", post(create_product))
        .route("/products/:product_id", get(get_product))
        .route("/products/:product_id/movements", get(list_stock_movements))
        .route("/products/:product_id/adjust", post(adjust_stock))
        .route("/movements/:movement_id", axum::routing::delete(delete_movement))
        .route("/orders", post(create_order))
        .route("/orders/:order_id", get(get_order))
        .route("/orders/:order_id/cancel", post(cancel_order))
        .route("/orders/:order_id/receive", post(receive_goods))
        .route("/orders/:order_id/consume", post(consume_goods))
        .route("/orders/:order_id/recalculate", post(recalculate_totals))
        .route(
            "/orders/:order_id/items",
            get(list_line_items).post(add_line_item),
        )
        .route(
            "/items/:line_item_id",
            axum::routing::patch(update_line_item).delete(remove_line_item),
        )
        .layer(from_fn(metrics_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                )
            }),
        )
        .layer(from_fn(request_id_middleware))
        .with_state(state)
}
