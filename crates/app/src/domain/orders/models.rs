//! Order Models

use jiff::Timestamp;
use serde::Serialize;

use crate::{
    domain::{
        inventory::models::{ProductId, StockLedgerEntry},
        orders::lifecycle::{OrderStatus, PaymentStatus},
    },
    ids::{TypedId, UserId},
};

pub type OrderId = TypedId<Order>;
pub type OrderItemId = TypedId<OrderItem>;
pub type AddressId = TypedId<AddressSnapshot>;

/// Order Model
#[derive(Debug, Clone, Serialize)]
pub struct Order {
    pub id: OrderId,
    pub order_no: String,
    pub user: UserId,
    pub subtotal: u64,
    pub discount: u64,
    pub shipping_fee: u64,
    pub payable: u64,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub payment_method: Option<String>,
    pub transaction_id: Option<String>,
    pub shipping_address: String,
    pub remark: String,
    pub tracking_number: Option<String>,
    pub shipping_method: Option<String>,
    pub cancel_reason: Option<String>,
    pub stock_deducted: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub paid_at: Option<Timestamp>,
    pub shipped_at: Option<Timestamp>,
    pub delivered_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub cancelled_at: Option<Timestamp>,
}

/// OrderItem Model
#[derive(Debug, Clone, Serialize)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub order: OrderId,
    pub product: ProductId,
    pub product_name: String,
    pub price: u64,
    pub quantity: u32,
    pub subtotal: u64,
}

/// Order with its items.
#[derive(Debug, Clone, Serialize)]
pub struct OrderDetail {
    pub order: Order,
    pub items: Vec<OrderItem>,
}

/// Stock movement caused by an order operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StockChange {
    pub product: ProductId,
    pub change: i32,
    pub remaining: u32,
}

impl From<&StockLedgerEntry> for StockChange {
    fn from(entry: &StockLedgerEntry) -> Self {
        Self {
            product: entry.product,
            change: entry.change,
            remaining: entry.stock_after,
        }
    }
}

/// Result of creating an order.
#[derive(Debug, Clone, Serialize)]
pub struct OrderSummary {
    pub order_id: OrderId,
    pub order_no: String,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub subtotal: u64,
    pub discount: u64,
    pub shipping_fee: u64,
    pub payable: u64,
    pub shipping_address: String,
    pub coupon_code: Option<String>,
    pub item_count: usize,
    pub items: Vec<OrderItem>,
    pub stock_changes: Vec<StockChange>,
    /// Set when an idempotency key matched an order created earlier.
    pub replayed: bool,
}

impl OrderSummary {
    pub(crate) fn new(
        order: Order,
        items: Vec<OrderItem>,
        stock_changes: Vec<StockChange>,
        coupon_code: Option<String>,
        replayed: bool,
    ) -> Self {
        Self {
            order_id: order.id,
            order_no: order.order_no,
            status: order.status,
            payment_status: order.payment_status,
            subtotal: order.subtotal,
            discount: order.discount,
            shipping_fee: order.shipping_fee,
            payable: order.payable,
            shipping_address: order.shipping_address,
            coupon_code,
            item_count: items.len(),
            items,
            stock_changes,
            replayed,
        }
    }
}

/// Checkout of the user's selected cart lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCartOrder {
    pub address: AddressId,
    pub coupon_code: Option<String>,
    pub remark: Option<String>,
    pub idempotency_key: Option<String>,
}

/// Buy-now checkout of a single product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDirectOrder {
    pub product: ProductId,
    pub quantity: u32,
    pub address: AddressId,
    pub coupon_code: Option<String>,
    pub remark: Option<String>,
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRequest {
    pub method: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentReceipt {
    pub order_id: OrderId,
    pub order_no: String,
    pub transaction_id: String,
    pub payment_method: String,
    pub amount: u64,
    pub status: OrderStatus,
    pub paid_at: Option<Timestamp>,
    pub stock_changes: Vec<StockChange>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShipmentRequest {
    pub tracking_number: String,
    pub shipping_method: String,
}

/// Outcome of a cancellation or other reversal.
#[derive(Debug, Clone, Serialize)]
pub struct OrderReversal {
    pub order: Order,
    pub coupons_restored: usize,
    pub stock_changes: Vec<StockChange>,
}

/// Delivery address owned by a user, as read for the order snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressSnapshot {
    pub id: AddressId,
    pub user: UserId,
    pub receiver_name: String,
    pub receiver_phone: String,
    pub province: String,
    pub city: String,
    pub district: String,
    pub detail_address: String,
}

impl AddressSnapshot {
    /// Text copied onto the order; later edits to the address do not affect it.
    #[must_use]
    pub fn display_text(&self) -> String {
        format!(
            "{} {} | {}{}{} {}",
            self.receiver_name,
            self.receiver_phone,
            self.province,
            self.city,
            self.district,
            self.detail_address
        )
    }
}

/// Selected cart line consumed by checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CartLine {
    pub product: ProductId,
    pub quantity: u32,
}

pub(crate) struct NewOrderRecord<'a> {
    pub order_no: &'a str,
    pub user: UserId,
    pub subtotal: u64,
    pub discount: u64,
    pub payable: u64,
    pub shipping_address: &'a str,
    pub remark: &'a str,
    pub stock_deducted: bool,
    pub idempotency_key: Option<&'a str>,
}

pub(crate) struct NewOrderItem {
    pub product: ProductId,
    pub product_name: String,
    pub price: u64,
    pub quantity: u32,
    pub subtotal: u64,
}
