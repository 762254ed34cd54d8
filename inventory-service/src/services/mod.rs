pub mod database;
pub mod metrics;
pub mod receiving;
pub mod totals;

pub use database::Database;
pub use receiving::ReceivingProcessor;
