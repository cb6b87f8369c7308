//! Inventory Models

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    str::FromStr,
};

use jiff::{Timestamp, ToSpan, tz::TimeZone};
use serde::Serialize;

use crate::{
    database::quantity_param,
    domain::{orders::models::OrderId, refunds::models::RefundId},
    ids::TypedId,
};

pub type ProductId = TypedId<Product>;
pub type StockLedgerEntryId = TypedId<StockLedgerEntry>;

/// Catalog availability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductStatus {
    Active,
    Inactive,
    Deleted,
}

impl FromStr for ProductStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "active" => Ok(Self::Active),
            "inactive" => Ok(Self::Inactive),
            "deleted" => Ok(Self::Deleted),
            other => Err(format!("unknown product status '{other}'")),
        }
    }
}

/// Window a per-user purchase limit is counted over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitPeriod {
    Daily,
    Weekly,
    Monthly,
    Total,
}

impl LimitPeriod {
    /// Start of the calendar window (UTC) containing `now`; `None` for lifetime limits.
    ///
    /// # Errors
    ///
    /// Returns an error when the window start falls outside the supported range.
    pub fn window_start(self, now: Timestamp) -> Result<Option<Timestamp>, jiff::Error> {
        let today = now.to_zoned(TimeZone::UTC).date();

        let start = match self {
            Self::Total => return Ok(None),
            Self::Daily => today,
            Self::Weekly => {
                today.checked_sub(i64::from(today.weekday().to_monday_zero_offset()).days())?
            }
            Self::Monthly => today.first_of_month(),
        };

        Ok(Some(start.to_zoned(TimeZone::UTC)?.timestamp()))
    }
}

impl Display for LimitPeriod {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(match self {
            Self::Daily => "day",
            Self::Weekly => "week",
            Self::Monthly => "month",
            Self::Total => "lifetime",
        })
    }
}

impl FromStr for LimitPeriod {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            "monthly" => Ok(Self::Monthly),
            "total" => Ok(Self::Total),
            other => Err(format!("unknown limit period '{other}'")),
        }
    }
}

/// Per-user purchase cap on a product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PurchaseLimit {
    pub quantity: u32,
    pub period: LimitPeriod,
}

/// Product row as seen by the order engine.
#[derive(Debug, Clone)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub price: u64,
    pub stock_quantity: u32,
    pub status: ProductStatus,
    pub purchase_limit: Option<PurchaseLimit>,
}

/// Why stock moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StockReason {
    OrderCreated,
    OrderPaid,
    OrderCancelled,
    RefundApproved,
    Manual,
}

impl StockReason {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OrderCreated => "order_created",
            Self::OrderPaid => "order_paid",
            Self::OrderCancelled => "order_cancelled",
            Self::RefundApproved => "refund_approved",
            Self::Manual => "manual",
        }
    }
}

impl FromStr for StockReason {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "order_created" => Ok(Self::OrderCreated),
            "order_paid" => Ok(Self::OrderPaid),
            "order_cancelled" => Ok(Self::OrderCancelled),
            "refund_approved" => Ok(Self::RefundApproved),
            "manual" => Ok(Self::Manual),
            other => Err(format!("unknown stock reason '{other}'")),
        }
    }
}

/// The event a stock movement belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockEvent {
    Order(OrderId),
    Refund(RefundId),
    Manual,
}

impl StockEvent {
    #[must_use]
    pub const fn kind(self) -> &'static str {
        match self {
            Self::Order(_) => "order",
            Self::Refund(_) => "refund",
            Self::Manual => "manual",
        }
    }

    #[must_use]
    pub const fn related_id(self) -> Option<i64> {
        match self {
            Self::Order(id) => Some(id.get()),
            Self::Refund(id) => Some(id.get()),
            Self::Manual => None,
        }
    }
}

/// A stock delta to apply and record.
#[derive(Debug, Clone)]
pub struct StockAdjustment {
    pub product: ProductId,
    pub delta: i32,
    pub reason: StockReason,
    pub event: StockEvent,
    pub operator: Option<i64>,
    pub note: Option<String>,
}

impl StockAdjustment {
    /// Take `quantity` units off the shelf.
    ///
    /// # Errors
    ///
    /// Returns an encode error when `quantity` does not fit a stock column.
    pub fn deduct(
        product: ProductId,
        quantity: u32,
        reason: StockReason,
        event: StockEvent,
        operator: Option<i64>,
    ) -> sqlx::Result<Self> {
        Ok(Self {
            product,
            delta: -quantity_param(quantity)?,
            reason,
            event,
            operator,
            note: None,
        })
    }

    /// Put `quantity` units back on the shelf.
    ///
    /// # Errors
    ///
    /// Returns an encode error when `quantity` does not fit a stock column.
    pub fn restore(
        product: ProductId,
        quantity: u32,
        reason: StockReason,
        event: StockEvent,
        operator: Option<i64>,
    ) -> sqlx::Result<Self> {
        Ok(Self {
            product,
            delta: quantity_param(quantity)?,
            reason,
            event,
            operator,
            note: None,
        })
    }
}

/// Append-only record of one stock movement.
#[derive(Debug, Clone, Serialize)]
pub struct StockLedgerEntry {
    pub id: StockLedgerEntryId,
    pub product: ProductId,
    pub change: i32,
    pub stock_before: u32,
    pub stock_after: u32,
    pub reason: StockReason,
    pub related_type: String,
    pub related_id: Option<i64>,
    pub operator: Option<i64>,
    pub note: Option<String>,
    pub created_at: Timestamp,
}
