pub mod line_item;
pub mod order;
pub mod product;
pub mod stock_movement;

pub use line_item::{CreateLineItem, LineAmounts, LineItem, UpdateLineItem};
pub use order::{
    derive_receiving_status, CreateOrder, OrderAggregate, OrderKind, OrderTotals,
    PurchaseOrderStatus,
};
pub use product::{CreateProduct, Product};
pub use stock_movement::{MovementReference, MovementType, StockMovement};
