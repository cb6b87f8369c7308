//! Coupon Models

use jiff::Timestamp;
use serde::Serialize;

use crate::{
    domain::{coupons::errors::CouponRejection, orders::models::OrderId},
    ids::{TypedId, UserId},
};

pub type CouponId = TypedId<Coupon>;
pub type UserCouponId = TypedId<UserCoupon>;

/// How a coupon's value is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountKind {
    /// `value` is a whole percentage of the subtotal.
    Percentage,
    /// `value` is an amount in minor units.
    Fixed,
}

/// Coupon definition.
#[derive(Debug, Clone)]
pub struct Coupon {
    pub id: CouponId,
    pub code: String,
    pub name: String,
    pub kind: DiscountKind,
    pub value: u64,
    pub min_amount: u64,
    pub max_discount: Option<u64>,
    pub active: bool,
    pub starts_at: Option<Timestamp>,
    pub ends_at: Option<Timestamp>,
}

impl Coupon {
    /// Discount this coupon grants on `subtotal` at `now`.
    ///
    /// Percentages round down. The result is capped by `max_discount` and
    /// clamped to `[0, subtotal]`.
    ///
    /// # Errors
    ///
    /// Returns a [`CouponRejection`] when the coupon is inactive, outside its
    /// validity window, or the subtotal is below the coupon minimum.
    pub fn discount_for(&self, subtotal: u64, now: Timestamp) -> Result<u64, CouponRejection> {
        if !self.active {
            return Err(CouponRejection::Inactive(self.code.clone()));
        }

        if self.starts_at.is_some_and(|starts_at| now < starts_at) {
            return Err(CouponRejection::NotStarted(self.code.clone()));
        }

        if self.ends_at.is_some_and(|ends_at| now > ends_at) {
            return Err(CouponRejection::Expired(self.code.clone()));
        }

        if subtotal < self.min_amount {
            return Err(CouponRejection::BelowMinimum {
                code: self.code.clone(),
                subtotal,
                min_amount: self.min_amount,
            });
        }

        let raw = match self.kind {
            DiscountKind::Percentage => {
                let discount = u128::from(subtotal) * u128::from(self.value) / 100;
                u64::try_from(discount).unwrap_or(u64::MAX)
            }
            DiscountKind::Fixed => self.value,
        };

        let capped = self.max_discount.map_or(raw, |cap| raw.min(cap));

        Ok(capped.min(subtotal))
    }
}

/// Whether a grant has been spent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UserCouponStatus {
    Unused,
    Used,
}

/// Single-use grant of a coupon to one user.
#[derive(Debug, Clone)]
pub struct UserCoupon {
    pub id: UserCouponId,
    pub user: UserId,
    pub coupon: CouponId,
    pub status: UserCouponStatus,
    pub order: Option<OrderId>,
    pub used_at: Option<Timestamp>,
}

/// Coupon consumed by a new order.
#[derive(Debug, Clone)]
pub struct AppliedCoupon {
    pub grant: UserCouponId,
    pub code: String,
    pub discount: u64,
}
