//! Refund Models

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    str::FromStr,
};

use jiff::Timestamp;
use serde::Serialize;

use crate::{
    domain::orders::{
        lifecycle::OrderStatus,
        models::{Order, OrderId, StockChange},
    },
    ids::{AdminId, TypedId, UserId},
};

pub type RefundId = TypedId<RefundRequest>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefundStatus {
    Pending,
    Approved,
    Rejected,
}

impl RefundStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

impl Display for RefundStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for RefundStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            other => Err(format!("unknown refund status '{other}'")),
        }
    }
}

/// RefundRequest Model
#[derive(Debug, Clone, Serialize)]
pub struct RefundRequest {
    pub id: RefundId,
    pub order: OrderId,
    pub user: UserId,
    pub reason: String,
    pub amount: u64,
    pub status: RefundStatus,
    pub processed_by: Option<AdminId>,
    pub admin_reply: Option<String>,
    pub created_at: Timestamp,
    pub processed_at: Option<Timestamp>,
}

/// Result of opening a refund request.
#[derive(Debug, Clone, Serialize)]
pub struct RefundSummary {
    pub refund_id: RefundId,
    pub order_id: OrderId,
    pub order_no: String,
    pub amount: u64,
    pub status: RefundStatus,
    pub order_status: OrderStatus,
}

/// An operator's answer to a pending refund.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefundDecision {
    pub approve: bool,
    pub reply: Option<String>,
}

/// Refund and order after a decision.
#[derive(Debug, Clone, Serialize)]
pub struct RefundOutcome {
    pub refund: RefundRequest,
    pub order: Order,
    pub coupons_restored: usize,
    pub stock_changes: Vec<StockChange>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refund_status_round_trips_through_text() {
        for status in [
            RefundStatus::Pending,
            RefundStatus::Approved,
            RefundStatus::Rejected,
        ] {
            assert_eq!(status.as_str().parse::<RefundStatus>(), Ok(status));
        }

        assert!("reopened".parse::<RefundStatus>().is_err());
    }
}
