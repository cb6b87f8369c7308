//! Inventory and the stock ledger

pub mod errors;
pub mod models;
pub(crate) mod repositories;
pub mod service;

pub use errors::InventoryServiceError;
pub use service::*;
