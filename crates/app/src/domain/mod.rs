//! Storefront Domain Concerns

pub mod coupons;
pub mod inventory;
pub mod notifications;
pub mod orders;
pub mod refunds;
