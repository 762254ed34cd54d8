//! Inventory Service - goods receiving, stock ledger and totals
//! reconciliation for multi-tenant workshops.

pub mod config;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod startup;
