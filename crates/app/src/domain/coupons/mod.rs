//! Coupons

pub mod errors;
pub mod models;
pub(crate) mod repository;

pub use errors::CouponRejection;
