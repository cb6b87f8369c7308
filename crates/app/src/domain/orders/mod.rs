//! Orders

pub mod errors;
pub mod lifecycle;
pub mod models;
pub(crate) mod numbers;
pub(crate) mod repositories;
pub(crate) mod restitution;
pub mod service;

pub use errors::OrdersServiceError;
pub use service::*;
