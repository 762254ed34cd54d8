pub mod app;
pub mod items;
pub mod orders;
pub mod products;
