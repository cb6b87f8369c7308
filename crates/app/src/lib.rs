//! Order engine for a retail storefront: a bounded connection pool and the
//! transactional order, refund and inventory services built on top of it.

pub mod config;
pub mod context;
pub mod database;
pub mod domain;
pub mod ids;
pub mod observability;
pub mod pool;
pub mod response;

#[cfg(test)]
mod test;
