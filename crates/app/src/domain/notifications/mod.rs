//! User notifications

pub mod models;
pub(crate) mod repository;
