//! Coupon rejections.

use thiserror::Error;

/// Why a coupon cannot be applied to an order.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CouponRejection {
    #[error("coupon {0} does not exist")]
    NotFound(String),

    #[error("coupon {0} is not active")]
    Inactive(String),

    #[error("coupon {0} is not valid yet")]
    NotStarted(String),

    #[error("coupon {0} has expired")]
    Expired(String),

    #[error("you have no unused coupon {0}")]
    NotGranted(String),

    #[error("order subtotal {subtotal} is below the minimum of {min_amount} for coupon {code}")]
    BelowMinimum {
        code: String,
        subtotal: u64,
        min_amount: u64,
    },
}
