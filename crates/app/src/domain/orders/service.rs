//! Orders service.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use jiff::Timestamp;
use mockall::automock;
use sqlx::{Connection, PgConnection, Postgres, Transaction};
use tracing::info;

use crate::{
    config::{InventoryPolicy, OrdersConfig},
    database::{self, PgPool},
    domain::{
        coupons::{CouponRejection, models::AppliedCoupon, repository::PgCouponsRepository},
        inventory::{
            models::{Product, ProductId, ProductStatus, StockAdjustment, StockEvent, StockReason},
            repositories::{PgProductsRepository, PgStockLedgerRepository},
        },
        notifications::{
            models::{NewNotification, NotificationKind},
            repository::PgNotificationsRepository,
        },
        orders::{
            errors::OrdersServiceError,
            lifecycle::{OrderStatus, PaymentStatus, ensure_transition},
            models::{
                AddressId, CartLine, NewCartOrder, NewDirectOrder, NewOrderItem, NewOrderRecord,
                Order, OrderDetail, OrderId, OrderReversal, OrderSummary, PaymentReceipt,
                PaymentRequest, ShipmentRequest, StockChange,
            },
            numbers,
            repositories::{
                PgAddressesRepository, PgCartLinesRepository, PgOrderItemsRepository,
                PgOrdersRepository, PgPurchaseRecordsRepository,
            },
            restitution::PgRestitution,
        },
    },
    ids::{AdminId, UserId},
};

/// Payment method recorded when an operator marks an order paid.
const MANUAL_PAYMENT_METHOD: &str = "manual";

/// One checkout, from either the cart or a buy-now request.
struct Checkout<'a> {
    lines: &'a [CartLine],
    address: AddressId,
    coupon_code: Option<&'a str>,
    remark: Option<&'a str>,
    idempotency_key: Option<&'a str>,
}

#[derive(Debug, Clone)]
pub struct PgOrdersService {
    pool: PgPool,
    config: OrdersConfig,
    orders: PgOrdersRepository,
    items: PgOrderItemsRepository,
    carts: PgCartLinesRepository,
    addresses: PgAddressesRepository,
    purchases: PgPurchaseRecordsRepository,
    products: PgProductsRepository,
    ledger: PgStockLedgerRepository,
    coupons: PgCouponsRepository,
    notifications: PgNotificationsRepository,
    restitution: PgRestitution,
}

impl PgOrdersService {
    #[must_use]
    pub fn new(pool: PgPool, config: OrdersConfig) -> Self {
        Self {
            pool,
            config,
            orders: PgOrdersRepository::new(),
            items: PgOrderItemsRepository::new(),
            carts: PgCartLinesRepository::new(),
            addresses: PgAddressesRepository::new(),
            purchases: PgPurchaseRecordsRepository::new(),
            products: PgProductsRepository::new(),
            ledger: PgStockLedgerRepository::new(),
            coupons: PgCouponsRepository::new(),
            notifications: PgNotificationsRepository::new(),
            restitution: PgRestitution::new(),
        }
    }

    fn check_quantity(&self, quantity: u32) -> Result<(), OrdersServiceError> {
        if quantity == 0 || quantity > self.config.max_line_quantity {
            return Err(OrdersServiceError::InvalidQuantity {
                quantity,
                max: self.config.max_line_quantity,
            });
        }

        Ok(())
    }

    /// Summary of an order already created under `key`, if any.
    async fn replay_in(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user: UserId,
        key: Option<&str>,
    ) -> Result<Option<OrderSummary>, OrdersServiceError> {
        let Some(key) = key else {
            return Ok(None);
        };

        let Some(order) = self.orders.find_by_idempotency_key(tx, user, key).await? else {
            return Ok(None);
        };

        let items = self.items.get_items(tx, order.id).await?;
        let coupon_code = self.coupons.coupon_code_for_order(tx, order.id).await?;

        Ok(Some(OrderSummary::new(
            order,
            items,
            Vec::new(),
            coupon_code,
            true,
        )))
    }

    /// Replay the order that a concurrent request committed under the same key.
    ///
    /// Any other failure, or a duplicate with no matching key, is returned as is.
    async fn replay_lost_race(
        &self,
        conn: &mut PgConnection,
        user: UserId,
        key: Option<&str>,
        error: OrdersServiceError,
    ) -> Result<OrderSummary, OrdersServiceError> {
        if key.is_none() || !matches!(error, OrdersServiceError::AlreadyExists) {
            return Err(error);
        }

        let mut tx = conn.begin().await?;
        let result = self.replay_in(&mut tx, user, key).await;

        database::finish(tx, result).await?.ok_or(error)
    }

    async fn create_from_cart_in(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user: UserId,
        order: &NewCartOrder,
    ) -> Result<OrderSummary, OrdersServiceError> {
        let key = order.idempotency_key.as_deref();

        if let Some(existing) = self.replay_in(tx, user, key).await? {
            return Ok(existing);
        }

        let lines = self.carts.selected_lines(tx, user).await?;

        if lines.is_empty() {
            return Err(OrdersServiceError::EmptyCart);
        }

        for line in &lines {
            self.check_quantity(line.quantity)?;
        }

        let summary = self
            .checkout_in(
                tx,
                user,
                Checkout {
                    lines: &lines,
                    address: order.address,
                    coupon_code: order.coupon_code.as_deref(),
                    remark: order.remark.as_deref(),
                    idempotency_key: key,
                },
            )
            .await?;

        self.carts.clear_selected(tx, user).await?;

        Ok(summary)
    }

    async fn create_direct_in(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user: UserId,
        order: &NewDirectOrder,
    ) -> Result<OrderSummary, OrdersServiceError> {
        let key = order.idempotency_key.as_deref();

        if let Some(existing) = self.replay_in(tx, user, key).await? {
            return Ok(existing);
        }

        let lines = [CartLine {
            product: order.product,
            quantity: order.quantity,
        }];

        self.checkout_in(
            tx,
            user,
            Checkout {
                lines: &lines,
                address: order.address,
                coupon_code: order.coupon_code.as_deref(),
                remark: order.remark.as_deref(),
                idempotency_key: key,
            },
        )
        .await
    }

    /// Lock, validate, price and persist one order.
    async fn checkout_in(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user: UserId,
        checkout: Checkout<'_>,
    ) -> Result<OrderSummary, OrdersServiceError> {
        let now = Timestamp::now();

        let mut quantities: BTreeMap<ProductId, u32> = BTreeMap::new();

        for line in checkout.lines {
            let quantity = quantities.entry(line.product).or_default();
            *quantity = quantity
                .checked_add(line.quantity)
                .ok_or(OrdersServiceError::AmountOverflow)?;
        }

        let ids: Vec<ProductId> = quantities.keys().copied().collect();
        let locked: HashMap<ProductId, Product> = self
            .products
            .lock_products(tx, &ids)
            .await?
            .into_iter()
            .map(|product| (product.id, product))
            .collect();

        let mut new_items = Vec::with_capacity(quantities.len());
        let mut subtotal: u64 = 0;

        for (&id, &quantity) in &quantities {
            let product = locked
                .get(&id)
                .ok_or(OrdersServiceError::ProductNotFound(id))?;

            check_availability(product, quantity)?;
            self.check_purchase_limit(tx, user, product, quantity, now)
                .await?;

            let line_total = product
                .price
                .checked_mul(u64::from(quantity))
                .ok_or(OrdersServiceError::AmountOverflow)?;

            subtotal = subtotal
                .checked_add(line_total)
                .ok_or(OrdersServiceError::AmountOverflow)?;

            new_items.push(NewOrderItem {
                product: id,
                product_name: product.name.clone(),
                price: product.price,
                quantity,
                subtotal: line_total,
            });
        }

        let address = self
            .addresses
            .get_address(tx, checkout.address, user)
            .await?
            .ok_or(OrdersServiceError::AddressNotFound)?;

        let coupon = match checkout.coupon_code {
            Some(code) => Some(self.apply_coupon(tx, user, code, subtotal, now).await?),
            None => None,
        };

        let discount = coupon.as_ref().map_or(0, |coupon| coupon.discount);
        let deduct_now = self.config.inventory_policy == InventoryPolicy::OnCreate;
        let order_no = numbers::next_order_number();
        let shipping_address = address.display_text();

        let order = self
            .orders
            .create_order(
                tx,
                &NewOrderRecord {
                    order_no: &order_no,
                    user,
                    subtotal,
                    discount,
                    payable: subtotal.saturating_sub(discount),
                    shipping_address: &shipping_address,
                    remark: checkout.remark.unwrap_or_default(),
                    stock_deducted: deduct_now,
                    idempotency_key: checkout.idempotency_key,
                },
            )
            .await?;

        let items = self.items.create_items(tx, order.id, &new_items).await?;

        let mut stock_changes = Vec::new();

        if deduct_now {
            for item in &new_items {
                let change = self
                    .deduct_in(
                        tx,
                        &locked,
                        item.product,
                        item.quantity,
                        StockReason::OrderCreated,
                        order.id,
                    )
                    .await?;

                stock_changes.push(change);
            }
        }

        if let Some(coupon) = &coupon
            && !self.coupons.mark_used(tx, coupon.grant, order.id).await?
        {
            return Err(OrdersServiceError::CouponAlreadyUsed(coupon.code.clone()));
        }

        Ok(OrderSummary::new(
            order,
            items,
            stock_changes,
            coupon.map(|coupon| coupon.code),
            false,
        ))
    }

    async fn check_purchase_limit(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user: UserId,
        product: &Product,
        requested: u32,
        now: Timestamp,
    ) -> Result<(), OrdersServiceError> {
        let Some(limit) = product.purchase_limit else {
            return Ok(());
        };

        let since = limit.period.window_start(now)?;
        let purchased = self
            .purchases
            .purchased_quantity(tx, user, product.id, since)
            .await?;

        if purchased.saturating_add(requested) > limit.quantity {
            return Err(OrdersServiceError::PurchaseLimitExceeded {
                name: product.name.clone(),
                limit: limit.quantity,
                period: limit.period,
                purchased,
                requested,
            });
        }

        Ok(())
    }

    async fn apply_coupon(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user: UserId,
        code: &str,
        subtotal: u64,
        now: Timestamp,
    ) -> Result<AppliedCoupon, OrdersServiceError> {
        let coupon = self
            .coupons
            .find_coupon_by_code(tx, code)
            .await?
            .ok_or_else(|| CouponRejection::NotFound(code.to_string()))?;

        if !coupon.active {
            return Err(CouponRejection::Inactive(coupon.code).into());
        }

        let grant = self
            .coupons
            .lock_unused_grant(tx, user, coupon.id)
            .await?
            .ok_or_else(|| CouponRejection::NotGranted(coupon.code.clone()))?;

        let discount = coupon.discount_for(subtotal, now)?;

        Ok(AppliedCoupon {
            grant: grant.id,
            code: coupon.code,
            discount,
        })
    }

    /// Take `quantity` units of a product already locked in this transaction.
    async fn deduct_in(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        locked: &HashMap<ProductId, Product>,
        product: ProductId,
        quantity: u32,
        reason: StockReason,
        order: OrderId,
    ) -> Result<StockChange, OrdersServiceError> {
        let adjustment =
            StockAdjustment::deduct(product, quantity, reason, StockEvent::Order(order), None)?;

        match self.ledger.adjust(tx, &adjustment).await? {
            Some(entry) => Ok(StockChange::from(&entry)),
            None => Err(match locked.get(&product) {
                Some(product) => shortage(product, quantity),
                None => OrdersServiceError::ProductNotFound(product),
            }),
        }
    }

    /// Move a confirmed order to `paid`, taking stock first if it is still on the shelf.
    ///
    /// Purchase limits are checked again here, against what the user has paid for
    /// so far, since unpaid orders do not count towards a window.
    async fn settle_in(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        order: &Order,
        method: &str,
    ) -> Result<(Order, Vec<StockChange>), OrdersServiceError> {
        let now = Timestamp::now();
        let items = self.items.get_items(tx, order.id).await?;

        let mut quantities: BTreeMap<ProductId, u32> = BTreeMap::new();
        for item in &items {
            let quantity = quantities.entry(item.product).or_default();
            *quantity = quantity.saturating_add(item.quantity);
        }

        let ids: Vec<ProductId> = quantities.keys().copied().collect();
        let locked: HashMap<ProductId, Product> = self
            .products
            .lock_products(tx, &ids)
            .await?
            .into_iter()
            .map(|product| (product.id, product))
            .collect();

        for (&id, &quantity) in &quantities {
            if let Some(product) = locked.get(&id) {
                self.check_purchase_limit(tx, order.user, product, quantity, now)
                    .await?;
            }
        }

        let mut stock_changes = Vec::new();

        if !order.stock_deducted {
            for (product, quantity) in quantities {
                let change = self
                    .deduct_in(
                        tx,
                        &locked,
                        product,
                        quantity,
                        StockReason::OrderPaid,
                        order.id,
                    )
                    .await?;

                stock_changes.push(change);
            }

            self.orders.set_stock_deducted(tx, order.id, true).await?;
        }

        self.orders
            .set_status(tx, order.id, OrderStatus::Paid, Some(PaymentStatus::Paid))
            .await?;

        let transaction_id = numbers::next_transaction_id();
        let paid = self
            .orders
            .record_payment(tx, order.id, method, &transaction_id)
            .await?;

        self.purchases.record_for_order(tx, order.id).await?;

        Ok((paid, stock_changes))
    }

    async fn pay_in(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        order: OrderId,
        method: &str,
    ) -> Result<PaymentReceipt, OrdersServiceError> {
        let mut current = self.orders.lock_order(tx, order).await?;

        if current.status == OrderStatus::Pending {
            ensure_transition(current.status, OrderStatus::Confirmed)?;

            current = self
                .orders
                .set_status(tx, order, OrderStatus::Confirmed, None)
                .await?;
        }

        ensure_transition(current.status, OrderStatus::Paid)?;

        let (paid, stock_changes) = self.settle_in(tx, &current, method).await?;

        Ok(PaymentReceipt {
            order_id: paid.id,
            order_no: paid.order_no,
            transaction_id: paid.transaction_id.unwrap_or_default(),
            payment_method: method.to_string(),
            amount: paid.payable,
            status: paid.status,
            paid_at: paid.paid_at,
            stock_changes,
        })
    }

    async fn ship_in(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        order: OrderId,
        shipment: &ShipmentRequest,
    ) -> Result<Order, OrdersServiceError> {
        let current = self.orders.lock_order(tx, order).await?;

        ensure_transition(current.status, OrderStatus::Shipped)?;

        self.orders
            .set_status(tx, order, OrderStatus::Shipped, None)
            .await?;

        Ok(self
            .orders
            .record_shipment(
                tx,
                order,
                shipment.tracking_number.trim(),
                shipment.shipping_method.trim(),
            )
            .await?)
    }

    async fn confirm_delivery_in(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        order: OrderId,
        user: UserId,
    ) -> Result<Order, OrdersServiceError> {
        let mut current = self.orders.lock_order(tx, order).await?;

        if current.user != user {
            return Err(OrdersServiceError::PermissionDenied);
        }

        if current.status == OrderStatus::Shipped {
            ensure_transition(current.status, OrderStatus::Delivered)?;

            current = self
                .orders
                .set_status(tx, order, OrderStatus::Delivered, None)
                .await?;
        }

        ensure_transition(current.status, OrderStatus::Completed)?;

        Ok(self
            .orders
            .set_status(tx, order, OrderStatus::Completed, None)
            .await?)
    }

    async fn cancel_in(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        order: OrderId,
        user: UserId,
        reason: Option<&str>,
    ) -> Result<OrderReversal, OrdersServiceError> {
        let current = self.orders.lock_order(tx, order).await?;

        if current.user != user {
            return Err(OrdersServiceError::PermissionDenied);
        }

        if !current.status.is_cancellable_by_customer() {
            return Err(OrdersServiceError::NotCancellable(current.status));
        }

        ensure_transition(current.status, OrderStatus::Cancelled)?;

        let restitution = self
            .restitution
            .reverse(
                tx,
                &current,
                StockReason::OrderCancelled,
                StockEvent::Order(order),
                None,
            )
            .await?;

        self.orders.set_cancel_reason(tx, order, reason).await?;

        let cancelled = self
            .orders
            .set_status(tx, order, OrderStatus::Cancelled, None)
            .await?;

        Ok(OrderReversal {
            order: cancelled,
            coupons_restored: restitution.coupons_restored,
            stock_changes: restitution.stock_changes,
        })
    }

    async fn update_status_in(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        order: OrderId,
        target: OrderStatus,
        operator: AdminId,
    ) -> Result<Order, OrdersServiceError> {
        let current = self.orders.lock_order(tx, order).await?;

        ensure_transition(current.status, target)?;

        let updated = match target {
            OrderStatus::Paid => {
                self.settle_in(tx, &current, MANUAL_PAYMENT_METHOD)
                    .await?
                    .0
            }
            OrderStatus::Cancelled | OrderStatus::Refunded => {
                let reason = if target == OrderStatus::Cancelled {
                    StockReason::OrderCancelled
                } else {
                    StockReason::RefundApproved
                };

                self.restitution
                    .reverse(
                        tx,
                        &current,
                        reason,
                        StockEvent::Order(order),
                        Some(operator.get()),
                    )
                    .await?;

                let payment_status = (current.payment_status == PaymentStatus::Paid)
                    .then_some(PaymentStatus::Refunded);

                self.orders
                    .set_status(tx, order, target, payment_status)
                    .await?
            }
            _ => self.orders.set_status(tx, order, target, None).await?,
        };

        Ok(updated)
    }

    async fn delete_in(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        order: OrderId,
        user: UserId,
    ) -> Result<(), OrdersServiceError> {
        let current = self.orders.lock_order(tx, order).await?;

        if current.user != user {
            return Err(OrdersServiceError::PermissionDenied);
        }

        if current.status != OrderStatus::Cancelled {
            return Err(OrdersServiceError::NotDeletable(current.status));
        }

        if self.orders.delete_order(tx, order).await? == 0 {
            return Err(OrdersServiceError::NotFound);
        }

        Ok(())
    }

    async fn get_order_in(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        order: OrderId,
    ) -> Result<OrderDetail, OrdersServiceError> {
        let order = self.orders.get_order(tx, order).await?;
        let items = self.items.get_items(tx, order.id).await?;

        Ok(OrderDetail { order, items })
    }
}

fn check_availability(product: &Product, quantity: u32) -> Result<(), OrdersServiceError> {
    if product.status != ProductStatus::Active {
        return Err(OrdersServiceError::Unavailable {
            name: product.name.clone(),
        });
    }

    if product.stock_quantity < quantity {
        return Err(shortage(product, quantity));
    }

    Ok(())
}

fn shortage(product: &Product, requested: u32) -> OrdersServiceError {
    if product.stock_quantity == 0 {
        OrdersServiceError::SoldOut {
            name: product.name.clone(),
        }
    } else {
        OrdersServiceError::InsufficientStock {
            name: product.name.clone(),
            requested,
            available: product.stock_quantity,
        }
    }
}

fn required<'a>(value: &'a str, field: &'static str) -> Result<&'a str, OrdersServiceError> {
    let value = value.trim();

    if value.is_empty() {
        return Err(OrdersServiceError::MissingField(field));
    }

    Ok(value)
}

#[async_trait]
impl OrdersService for PgOrdersService {
    async fn create_order_from_cart(
        &self,
        user: UserId,
        order: NewCartOrder,
    ) -> Result<OrderSummary, OrdersServiceError> {
        let mut conn = self.pool.acquire().await?;
        let mut tx = conn.begin().await?;

        let result = self.create_from_cart_in(&mut tx, user, &order).await;
        let summary = match database::finish(tx, result).await {
            Ok(summary) => summary,
            Err(error) => {
                self.replay_lost_race(&mut conn, user, order.idempotency_key.as_deref(), error)
                    .await?
            }
        };

        info!(
            order_id = %summary.order_id,
            order_no = %summary.order_no,
            user_id = %user,
            payable = summary.payable,
            items = summary.item_count,
            replayed = summary.replayed,
            "order created from cart"
        );

        Ok(summary)
    }

    async fn create_order_direct(
        &self,
        user: UserId,
        order: NewDirectOrder,
    ) -> Result<OrderSummary, OrdersServiceError> {
        self.check_quantity(order.quantity)?;

        let mut conn = self.pool.acquire().await?;
        let mut tx = conn.begin().await?;

        let result = self.create_direct_in(&mut tx, user, &order).await;
        let summary = match database::finish(tx, result).await {
            Ok(summary) => summary,
            Err(error) => {
                self.replay_lost_race(&mut conn, user, order.idempotency_key.as_deref(), error)
                    .await?
            }
        };

        info!(
            order_id = %summary.order_id,
            order_no = %summary.order_no,
            user_id = %user,
            product_id = %order.product,
            quantity = order.quantity,
            payable = summary.payable,
            replayed = summary.replayed,
            "order created directly"
        );

        Ok(summary)
    }

    async fn pay_order(
        &self,
        order: OrderId,
        payment: PaymentRequest,
    ) -> Result<PaymentReceipt, OrdersServiceError> {
        let method = required(&payment.method, "payment method")?;

        let mut conn = self.pool.acquire().await?;
        let mut tx = conn.begin().await?;

        let result = self.pay_in(&mut tx, order, method).await;
        let receipt = database::finish(tx, result).await?;

        info!(
            order_id = %order,
            transaction_id = %receipt.transaction_id,
            amount = receipt.amount,
            "order paid"
        );

        Ok(receipt)
    }

    async fn ship_order(
        &self,
        order: OrderId,
        shipment: ShipmentRequest,
    ) -> Result<Order, OrdersServiceError> {
        required(&shipment.tracking_number, "tracking number")?;

        let mut conn = self.pool.acquire().await?;
        let mut tx = conn.begin().await?;

        let result = self.ship_in(&mut tx, order, &shipment).await;
        let shipped = database::finish(tx, result).await?;

        info!(order_id = %order, tracking_number = %shipment.tracking_number.trim(), "order shipped");

        self.notifications
            .send(
                &mut conn,
                NewNotification {
                    user: shipped.user,
                    kind: NotificationKind::OrderShipped,
                    title: "Order shipped".to_string(),
                    content: format!(
                        "Order {} has shipped, tracking number {}",
                        shipped.order_no,
                        shipped.tracking_number.as_deref().unwrap_or_default()
                    ),
                    related_id: Some(shipped.id.get()),
                },
            )
            .await;

        Ok(shipped)
    }

    async fn confirm_delivery(
        &self,
        order: OrderId,
        user: UserId,
    ) -> Result<Order, OrdersServiceError> {
        let mut conn = self.pool.acquire().await?;
        let mut tx = conn.begin().await?;

        let result = self.confirm_delivery_in(&mut tx, order, user).await;
        let completed = database::finish(tx, result).await?;

        info!(order_id = %order, user_id = %user, "order delivery confirmed");

        Ok(completed)
    }

    async fn cancel_order(
        &self,
        order: OrderId,
        user: UserId,
        reason: Option<String>,
    ) -> Result<OrderReversal, OrdersServiceError> {
        let mut conn = self.pool.acquire().await?;
        let mut tx = conn.begin().await?;

        let result = self.cancel_in(&mut tx, order, user, reason.as_deref()).await;
        let reversal = database::finish(tx, result).await?;

        info!(
            order_id = %order,
            user_id = %user,
            coupons_restored = reversal.coupons_restored,
            products_restocked = reversal.stock_changes.len(),
            "order cancelled"
        );

        Ok(reversal)
    }

    async fn update_order_status(
        &self,
        order: OrderId,
        status: OrderStatus,
        operator: AdminId,
    ) -> Result<Order, OrdersServiceError> {
        let mut conn = self.pool.acquire().await?;
        let mut tx = conn.begin().await?;

        let result = self.update_status_in(&mut tx, order, status, operator).await;
        let updated = database::finish(tx, result).await?;

        info!(order_id = %order, status = %updated.status, admin_id = %operator, "order status updated");

        Ok(updated)
    }

    async fn delete_order(&self, order: OrderId, user: UserId) -> Result<(), OrdersServiceError> {
        let mut conn = self.pool.acquire().await?;
        let mut tx = conn.begin().await?;

        let result = self.delete_in(&mut tx, order, user).await;
        database::finish(tx, result).await?;

        info!(order_id = %order, user_id = %user, "order deleted");

        Ok(())
    }

    async fn get_order(&self, order: OrderId) -> Result<OrderDetail, OrdersServiceError> {
        let mut conn = self.pool.acquire().await?;
        let mut tx = conn.begin().await?;

        let result = self.get_order_in(&mut tx, order).await;

        database::finish(tx, result).await
    }

    async fn list_user_orders(
        &self,
        user: UserId,
        status: Option<OrderStatus>,
    ) -> Result<Vec<Order>, OrdersServiceError> {
        let mut conn = self.pool.acquire().await?;
        let mut tx = conn.begin().await?;

        let result = self
            .orders
            .list_user_orders(&mut tx, user, status)
            .await
            .map_err(OrdersServiceError::from);

        database::finish(tx, result).await
    }
}

#[automock]
#[async_trait]
pub trait OrdersService: Send + Sync {
    /// Turn the user's selected cart lines into a pending order and clear them.
    async fn create_order_from_cart(
        &self,
        user: UserId,
        order: NewCartOrder,
    ) -> Result<OrderSummary, OrdersServiceError>;

    /// Buy a single product without going through the cart.
    async fn create_order_direct(
        &self,
        user: UserId,
        order: NewDirectOrder,
    ) -> Result<OrderSummary, OrdersServiceError>;

    /// Settle a pending or confirmed order.
    async fn pay_order(
        &self,
        order: OrderId,
        payment: PaymentRequest,
    ) -> Result<PaymentReceipt, OrdersServiceError>;

    async fn ship_order(
        &self,
        order: OrderId,
        shipment: ShipmentRequest,
    ) -> Result<Order, OrdersServiceError>;

    /// Customer confirms receipt; the order ends `completed`.
    async fn confirm_delivery(
        &self,
        order: OrderId,
        user: UserId,
    ) -> Result<Order, OrdersServiceError>;

    /// Customer cancels an unpaid order, getting coupons and stock back.
    async fn cancel_order(
        &self,
        order: OrderId,
        user: UserId,
        reason: Option<String>,
    ) -> Result<OrderReversal, OrdersServiceError>;

    /// Operator status change, checked against the transition table.
    async fn update_order_status(
        &self,
        order: OrderId,
        status: OrderStatus,
        operator: AdminId,
    ) -> Result<Order, OrdersServiceError>;

    async fn delete_order(&self, order: OrderId, user: UserId) -> Result<(), OrdersServiceError>;

    async fn get_order(&self, order: OrderId) -> Result<OrderDetail, OrdersServiceError>;

    /// The user's orders, newest first.
    async fn list_user_orders(
        &self,
        user: UserId,
        status: Option<OrderStatus>,
    ) -> Result<Vec<Order>, OrdersServiceError>;
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use crate::{
        config::{InventoryPolicy, OrdersConfig},
        domain::{
            coupons::CouponRejection,
            inventory::{InventoryService, models::StockReason},
        },
        ids::{AdminId, UserId},
        response::{Coded, Envelope, ErrorCode},
        test::{TestContext, helpers},
    };

    use super::*;

    const ALICE: UserId = UserId::new(1);
    const BOB: UserId = UserId::new(2);

    fn direct(product: ProductId, quantity: u32, address: AddressId) -> NewDirectOrder {
        NewDirectOrder {
            product,
            quantity,
            address,
            coupon_code: None,
            remark: None,
            idempotency_key: None,
        }
    }

    fn card() -> PaymentRequest {
        PaymentRequest {
            method: "card".to_string(),
        }
    }

    #[tokio::test]
    async fn mocked_service_errors_become_coded_envelopes() {
        let mut service = MockOrdersService::new();

        service.expect_get_order().returning(|_| {
            Err(OrdersServiceError::PurchaseLimitExceeded {
                name: "Lamp".to_string(),
                limit: 1,
                period: crate::domain::inventory::models::LimitPeriod::Daily,
                purchased: 1,
                requested: 1,
            })
        });

        let envelope = Envelope::respond(service.get_order(OrderId::new(1)).await, "ok");

        assert!(!envelope.success);
        assert_eq!(envelope.code, Some(ErrorCode::PurchaseLimitExceeded));
        assert!(
            envelope.message.contains("limited to 1 per day"),
            "unexpected message: {}",
            envelope.message
        );
    }

    #[tokio::test]
    #[ignore = "requires a docker daemon for the postgres testcontainer"]
    async fn direct_order_snapshots_prices_and_deducts_stock() -> TestResult {
        let ctx = TestContext::new().await;
        let lamp = helpers::seed_product(&ctx, "Lamp", 1_250, 5).await;
        let address = helpers::seed_address(&ctx, ALICE).await;

        let summary = ctx.orders.create_order_direct(ALICE, direct(lamp, 2, address)).await?;

        assert_eq!(summary.status, OrderStatus::Pending);
        assert_eq!(summary.payment_status, PaymentStatus::Unpaid);
        assert_eq!(summary.item_count, 1);
        assert_eq!(summary.subtotal, 2_500);
        assert_eq!(summary.discount, 0);
        assert_eq!(summary.payable, 2_500);
        assert_eq!(summary.shipping_fee, 0);
        assert!(summary.order_no.starts_with("EM"));
        assert_eq!(
            summary.shipping_address,
            "Ada 555-0100 | OntarioTorontoAnnex 12 Bloor St"
        );
        assert_eq!(helpers::stock_of(&ctx, lamp).await, 3);

        let ledger = ctx.inventory.stock_ledger(lamp).await?;

        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger[0].reason, StockReason::OrderCreated);
        assert_eq!(ledger[0].change, -2);
        assert_eq!((ledger[0].stock_before, ledger[0].stock_after), (5, 3));

        Ok(())
    }

    #[tokio::test]
    #[ignore = "requires a docker daemon for the postgres testcontainer"]
    async fn cart_checkout_sums_items_and_clears_cart() -> TestResult {
        let ctx = TestContext::new().await;
        let lamp = helpers::seed_product(&ctx, "Lamp", 1_250, 5).await;
        let shade = helpers::seed_product(&ctx, "Shade", 499, 10).await;
        let address = helpers::seed_address(&ctx, ALICE).await;

        helpers::add_to_cart(&ctx, ALICE, lamp, 1).await;
        helpers::add_to_cart(&ctx, ALICE, shade, 3).await;

        let summary = ctx
            .orders
            .create_order_from_cart(
                ALICE,
                NewCartOrder {
                    address,
                    coupon_code: None,
                    remark: Some("leave at door".to_string()),
                    idempotency_key: None,
                },
            )
            .await?;

        let item_total: u64 = summary.items.iter().map(|item| item.subtotal).sum();

        assert_eq!(summary.item_count, 2);
        assert_eq!(item_total, summary.subtotal);
        assert_eq!(summary.subtotal, 1_250 + 3 * 499);
        assert!(
            summary
                .items
                .iter()
                .all(|item| item.subtotal == item.price * u64::from(item.quantity))
        );
        assert_eq!(helpers::cart_count(&ctx, ALICE).await, 0);

        let detail = ctx.orders.get_order(summary.order_id).await?;

        assert_eq!(detail.order.remark, "leave at door");
        assert_eq!(detail.items.len(), 2);

        Ok(())
    }

    #[tokio::test]
    #[ignore = "requires a docker daemon for the postgres testcontainer"]
    async fn empty_cart_is_rejected() {
        let ctx = TestContext::new().await;
        let address = helpers::seed_address(&ctx, ALICE).await;

        let result = ctx
            .orders
            .create_order_from_cart(
                ALICE,
                NewCartOrder {
                    address,
                    coupon_code: None,
                    remark: None,
                    idempotency_key: None,
                },
            )
            .await;

        assert!(
            matches!(result, Err(OrdersServiceError::EmptyCart)),
            "expected EmptyCart, got {result:?}"
        );
    }

    #[tokio::test]
    #[ignore = "requires a docker daemon for the postgres testcontainer"]
    async fn stock_failures_name_product_and_remaining_units() {
        let ctx = TestContext::new().await;
        let lamp = helpers::seed_product(&ctx, "Lamp", 1_250, 1).await;
        let vase = helpers::seed_product(&ctx, "Vase", 900, 0).await;
        let rug = helpers::seed_product(&ctx, "Rug", 5_000, 4).await;
        let address = helpers::seed_address(&ctx, ALICE).await;

        helpers::set_product_status(&ctx, rug, "inactive").await;

        let short = helpers::buy_now(&ctx, ALICE, lamp, 2, address).await;
        let sold_out = helpers::buy_now(&ctx, ALICE, vase, 1, address).await;
        let inactive = helpers::buy_now(&ctx, ALICE, rug, 1, address).await;

        assert!(
            matches!(
                &short,
                Err(OrdersServiceError::InsufficientStock { requested: 2, available: 1, .. })
            ),
            "expected InsufficientStock, got {short:?}"
        );
        assert!(
            matches!(&sold_out, Err(OrdersServiceError::SoldOut { .. })),
            "expected SoldOut, got {sold_out:?}"
        );
        assert!(
            matches!(&inactive, Err(OrdersServiceError::Unavailable { .. })),
            "expected Unavailable, got {inactive:?}"
        );
        assert_eq!(helpers::stock_of(&ctx, lamp).await, 1);
    }

    #[tokio::test]
    #[ignore = "requires a docker daemon for the postgres testcontainer"]
    async fn out_of_range_quantity_is_rejected() {
        let ctx = TestContext::new().await;
        let lamp = helpers::seed_product(&ctx, "Lamp", 1_250, 5).await;
        let address = helpers::seed_address(&ctx, ALICE).await;

        let result = helpers::buy_now(&ctx, ALICE, lamp, 0, address).await;

        assert!(
            matches!(result, Err(OrdersServiceError::InvalidQuantity { quantity: 0, max: 999 })),
            "expected InvalidQuantity, got {result:?}"
        );
    }

    #[tokio::test]
    #[ignore = "requires a docker daemon for the postgres testcontainer"]
    async fn address_of_another_user_is_not_found() {
        let ctx = TestContext::new().await;
        let lamp = helpers::seed_product(&ctx, "Lamp", 1_250, 5).await;
        let bobs = helpers::seed_address(&ctx, BOB).await;

        let result = helpers::buy_now(&ctx, ALICE, lamp, 1, bobs).await;

        assert!(
            matches!(result, Err(OrdersServiceError::AddressNotFound)),
            "expected AddressNotFound, got {result:?}"
        );
        assert_eq!(helpers::stock_of(&ctx, lamp).await, 5);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    #[ignore = "requires a docker daemon for the postgres testcontainer"]
    async fn concurrent_checkouts_of_last_unit_admit_exactly_one() -> TestResult {
        let ctx = TestContext::new().await;
        let lamp = helpers::seed_product(&ctx, "Lamp", 1_250, 1).await;
        let alice_address = helpers::seed_address(&ctx, ALICE).await;
        let bob_address = helpers::seed_address(&ctx, BOB).await;

        let (first, second) = tokio::join!(
            helpers::buy_now(&ctx, ALICE, lamp, 1, alice_address),
            helpers::buy_now(&ctx, BOB, lamp, 1, bob_address),
        );

        let (winner, loser) = match (first, second) {
            (Ok(summary), Err(error)) | (Err(error), Ok(summary)) => (summary, error),
            other => panic!("expected exactly one success, got {other:?}"),
        };

        assert_eq!(winner.item_count, 1);
        assert_eq!(loser.code(), ErrorCode::ValidationError);
        assert!(
            loser.to_string().contains("0 remaining"),
            "unexpected message: {loser}"
        );
        assert_eq!(helpers::stock_of(&ctx, lamp).await, 0);

        Ok(())
    }

    #[tokio::test]
    #[ignore = "requires a docker daemon for the postgres testcontainer"]
    async fn coupon_is_consumed_and_returned_on_cancel() -> TestResult {
        let ctx = TestContext::new().await;
        let lamp = helpers::seed_product(&ctx, "Lamp", 1_999, 5).await;
        let address = helpers::seed_address(&ctx, ALICE).await;
        let coupon = helpers::seed_coupon(&ctx, "TENOFF", "percentage", 10, 1_000).await;
        let grant = helpers::grant_coupon(&ctx, ALICE, coupon).await;

        let summary = ctx
            .orders
            .create_order_direct(
                ALICE,
                NewDirectOrder {
                    coupon_code: Some("TENOFF".to_string()),
                    ..direct(lamp, 2, address)
                },
            )
            .await?;

        assert_eq!(summary.subtotal, 3_998);
        assert_eq!(summary.discount, 399);
        assert_eq!(summary.payable, 3_998 - 399);
        assert_eq!(summary.coupon_code.as_deref(), Some("TENOFF"));
        assert_eq!(
            helpers::grant_state(&ctx, grant).await,
            ("used".to_string(), Some(summary.order_id))
        );

        let reversal = ctx
            .orders
            .cancel_order(summary.order_id, ALICE, Some("changed my mind".to_string()))
            .await?;

        assert_eq!(reversal.order.status, OrderStatus::Cancelled);
        assert_eq!(reversal.order.cancel_reason.as_deref(), Some("changed my mind"));
        assert!(reversal.order.cancelled_at.is_some());
        assert!(!reversal.order.stock_deducted);
        assert_eq!(reversal.coupons_restored, 1);
        assert_eq!(helpers::grant_state(&ctx, grant).await, ("unused".to_string(), None));
        assert_eq!(helpers::stock_of(&ctx, lamp).await, 5);

        let reasons: Vec<StockReason> = ctx
            .inventory
            .stock_ledger(lamp)
            .await?
            .into_iter()
            .map(|entry| entry.reason)
            .collect();

        assert_eq!(
            reasons,
            vec![StockReason::OrderCreated, StockReason::OrderCancelled]
        );

        Ok(())
    }

    #[tokio::test]
    #[ignore = "requires a docker daemon for the postgres testcontainer"]
    async fn coupon_below_minimum_rolls_back_everything() {
        let ctx = TestContext::new().await;
        let lamp = helpers::seed_product(&ctx, "Lamp", 500, 5).await;
        let address = helpers::seed_address(&ctx, ALICE).await;
        let coupon = helpers::seed_coupon(&ctx, "BIGSPEND", "fixed", 300, 10_000).await;
        let grant = helpers::grant_coupon(&ctx, ALICE, coupon).await;

        let result = ctx
            .orders
            .create_order_direct(
                ALICE,
                NewDirectOrder {
                    coupon_code: Some("BIGSPEND".to_string()),
                    ..direct(lamp, 1, address)
                },
            )
            .await;

        assert!(
            matches!(
                result,
                Err(OrdersServiceError::Coupon(CouponRejection::BelowMinimum { .. }))
            ),
            "expected BelowMinimum, got {result:?}"
        );
        assert_eq!(helpers::stock_of(&ctx, lamp).await, 5);
        assert_eq!(helpers::grant_state(&ctx, grant).await, ("unused".to_string(), None));
    }

    #[tokio::test]
    #[ignore = "requires a docker daemon for the postgres testcontainer"]
    async fn a_grant_cannot_be_spent_twice() -> TestResult {
        let ctx = TestContext::new().await;
        let lamp = helpers::seed_product(&ctx, "Lamp", 2_000, 5).await;
        let address = helpers::seed_address(&ctx, ALICE).await;
        let coupon = helpers::seed_coupon(&ctx, "FLAT5", "fixed", 500, 0).await;
        helpers::grant_coupon(&ctx, ALICE, coupon).await;

        let with_coupon = |quantity| NewDirectOrder {
            coupon_code: Some("FLAT5".to_string()),
            ..direct(lamp, quantity, address)
        };

        ctx.orders.create_order_direct(ALICE, with_coupon(1)).await?;
        let second = ctx.orders.create_order_direct(ALICE, with_coupon(1)).await;

        assert!(
            matches!(
                second,
                Err(OrdersServiceError::Coupon(CouponRejection::NotGranted(_)))
            ),
            "expected NotGranted, got {second:?}"
        );
        assert_eq!(helpers::stock_of(&ctx, lamp).await, 4);

        Ok(())
    }

    #[tokio::test]
    #[ignore = "requires a docker daemon for the postgres testcontainer"]
    async fn paid_purchases_count_against_the_limit() -> TestResult {
        let ctx = TestContext::new().await;
        let lamp = helpers::seed_limited_product(&ctx, "Lamp", 1_000, 10, 2, "daily").await;
        let address = helpers::seed_address(&ctx, ALICE).await;

        let first = helpers::buy_now(&ctx, ALICE, lamp, 2, address).await?;
        ctx.orders.pay_order(first.order_id, card()).await?;

        let result = helpers::buy_now(&ctx, ALICE, lamp, 1, address).await;

        match result {
            Err(error @ OrdersServiceError::PurchaseLimitExceeded { .. }) => {
                assert_eq!(error.code(), ErrorCode::PurchaseLimitExceeded);
                assert!(
                    error.to_string().contains("already bought 2"),
                    "unexpected message: {error}"
                );
            }
            other => panic!("expected PurchaseLimitExceeded, got {other:?}"),
        }

        helpers::buy_now(&ctx, BOB, lamp, 2, helpers::seed_address(&ctx, BOB).await).await?;

        Ok(())
    }

    #[tokio::test]
    #[ignore = "requires a docker daemon for the postgres testcontainer"]
    async fn payment_rechecks_the_limit_across_unpaid_orders() -> TestResult {
        let ctx = TestContext::new().await;
        let lamp = helpers::seed_limited_product(&ctx, "Lamp", 1_000, 10, 2, "daily").await;
        let address = helpers::seed_address(&ctx, ALICE).await;

        let first = helpers::buy_now(&ctx, ALICE, lamp, 2, address).await?;
        let second = helpers::buy_now(&ctx, ALICE, lamp, 2, address).await?;
        let third = helpers::buy_now(&ctx, ALICE, lamp, 1, address).await?;

        ctx.orders.pay_order(first.order_id, card()).await?;

        let result = ctx.orders.pay_order(second.order_id, card()).await;

        assert!(
            matches!(
                result,
                Err(OrdersServiceError::PurchaseLimitExceeded {
                    purchased: 2,
                    requested: 2,
                    ..
                })
            ),
            "expected PurchaseLimitExceeded, got {result:?}"
        );

        let unpaid = ctx.orders.get_order(second.order_id).await?.order;

        assert_eq!(unpaid.status, OrderStatus::Pending, "failed payment rolls back");
        assert_eq!(unpaid.payment_status, PaymentStatus::Unpaid);
        assert_eq!(helpers::purchase_count(&ctx, second.order_id).await, 0);

        let admin = AdminId::new(900);
        ctx.orders
            .update_order_status(third.order_id, OrderStatus::Confirmed, admin)
            .await?;

        let forced = ctx
            .orders
            .update_order_status(third.order_id, OrderStatus::Paid, admin)
            .await;

        assert!(
            matches!(forced, Err(OrdersServiceError::PurchaseLimitExceeded { .. })),
            "expected PurchaseLimitExceeded, got {forced:?}"
        );
        assert_eq!(helpers::purchase_count(&ctx, third.order_id).await, 0);

        Ok(())
    }

    #[tokio::test]
    #[ignore = "requires a docker daemon for the postgres testcontainer"]
    async fn paying_a_pending_order_confirms_then_settles() -> TestResult {
        let ctx = TestContext::new().await;
        let lamp = helpers::seed_product(&ctx, "Lamp", 1_250, 5).await;
        let address = helpers::seed_address(&ctx, ALICE).await;

        let summary = helpers::buy_now(&ctx, ALICE, lamp, 2, address).await?;
        let receipt = ctx.orders.pay_order(summary.order_id, card()).await?;

        assert_eq!(receipt.status, OrderStatus::Paid);
        assert_eq!(receipt.amount, 2_500);
        assert_eq!(receipt.payment_method, "card");
        assert!(receipt.transaction_id.starts_with("TXN"));
        assert!(receipt.paid_at.is_some());
        assert!(receipt.stock_changes.is_empty());
        assert_eq!(helpers::purchase_count(&ctx, summary.order_id).await, 1);

        let order = ctx.orders.get_order(summary.order_id).await?.order;

        assert_eq!(order.payment_status, PaymentStatus::Paid);
        assert_eq!(order.transaction_id.as_deref(), Some(receipt.transaction_id.as_str()));

        let again = ctx.orders.pay_order(summary.order_id, card()).await;

        assert!(
            matches!(again, Err(OrdersServiceError::Transition(_))),
            "expected Transition, got {again:?}"
        );

        Ok(())
    }

    #[tokio::test]
    #[ignore = "requires a docker daemon for the postgres testcontainer"]
    async fn reserve_on_pay_defers_stock_until_payment() -> TestResult {
        let ctx = TestContext::with_orders_config(OrdersConfig {
            inventory_policy: InventoryPolicy::OnPay,
            ..OrdersConfig::default()
        })
        .await;
        let lamp = helpers::seed_product(&ctx, "Lamp", 1_250, 1).await;
        let alice_address = helpers::seed_address(&ctx, ALICE).await;
        let bob_address = helpers::seed_address(&ctx, BOB).await;

        let alices = helpers::buy_now(&ctx, ALICE, lamp, 1, alice_address).await?;
        let bobs = helpers::buy_now(&ctx, BOB, lamp, 1, bob_address).await?;

        assert!(alices.stock_changes.is_empty());
        assert_eq!(helpers::stock_of(&ctx, lamp).await, 1);

        let receipt = ctx.orders.pay_order(alices.order_id, card()).await?;

        assert_eq!(receipt.stock_changes.len(), 1);
        assert_eq!(receipt.stock_changes[0].remaining, 0);

        let late = ctx.orders.pay_order(bobs.order_id, card()).await;

        assert!(
            matches!(late, Err(OrdersServiceError::SoldOut { .. })),
            "expected SoldOut, got {late:?}"
        );

        let bobs_order = ctx.orders.get_order(bobs.order_id).await?.order;

        assert_eq!(bobs_order.status, OrderStatus::Pending);

        let ledger = ctx.inventory.stock_ledger(lamp).await?;

        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger[0].reason, StockReason::OrderPaid);

        Ok(())
    }

    #[tokio::test]
    #[ignore = "requires a docker daemon for the postgres testcontainer"]
    async fn shipping_an_unpaid_order_is_rejected_and_leaves_status() -> TestResult {
        let ctx = TestContext::new().await;
        let lamp = helpers::seed_product(&ctx, "Lamp", 1_250, 5).await;
        let address = helpers::seed_address(&ctx, ALICE).await;

        let summary = helpers::buy_now(&ctx, ALICE, lamp, 1, address).await?;

        let result = ctx
            .orders
            .ship_order(
                summary.order_id,
                ShipmentRequest {
                    tracking_number: "1Z999".to_string(),
                    shipping_method: "ground".to_string(),
                },
            )
            .await;

        match result {
            Err(OrdersServiceError::Transition(error)) => {
                assert_eq!(error.to_string(), "order cannot move from pending to shipped");
            }
            other => panic!("expected Transition, got {other:?}"),
        }

        let order = ctx.orders.get_order(summary.order_id).await?.order;

        assert_eq!(order.status, OrderStatus::Pending);

        Ok(())
    }

    #[tokio::test]
    #[ignore = "requires a docker daemon for the postgres testcontainer"]
    async fn shipment_notifies_and_owner_confirms_delivery() -> TestResult {
        let ctx = TestContext::new().await;
        let lamp = helpers::seed_product(&ctx, "Lamp", 1_250, 5).await;
        let address = helpers::seed_address(&ctx, ALICE).await;

        let summary = helpers::buy_now(&ctx, ALICE, lamp, 1, address).await?;
        ctx.orders.pay_order(summary.order_id, card()).await?;

        let blank = ctx
            .orders
            .ship_order(
                summary.order_id,
                ShipmentRequest {
                    tracking_number: "  ".to_string(),
                    shipping_method: "ground".to_string(),
                },
            )
            .await;

        assert!(
            matches!(blank, Err(OrdersServiceError::MissingField(_))),
            "expected MissingField, got {blank:?}"
        );

        let shipped = ctx
            .orders
            .ship_order(
                summary.order_id,
                ShipmentRequest {
                    tracking_number: "1Z999".to_string(),
                    shipping_method: "ground".to_string(),
                },
            )
            .await?;

        assert_eq!(shipped.status, OrderStatus::Shipped);
        assert_eq!(shipped.tracking_number.as_deref(), Some("1Z999"));
        assert!(shipped.shipped_at.is_some());
        assert_eq!(
            helpers::notification_kinds(&ctx, ALICE).await,
            vec!["order_shipped".to_string()]
        );

        let stranger = ctx.orders.confirm_delivery(summary.order_id, BOB).await;

        assert!(
            matches!(stranger, Err(OrdersServiceError::PermissionDenied)),
            "expected PermissionDenied, got {stranger:?}"
        );

        let completed = ctx.orders.confirm_delivery(summary.order_id, ALICE).await?;

        assert_eq!(completed.status, OrderStatus::Completed);
        assert!(completed.delivered_at.is_some());
        assert!(completed.completed_at.is_some());

        Ok(())
    }

    #[tokio::test]
    #[ignore = "requires a docker daemon for the postgres testcontainer"]
    async fn customers_cancel_only_their_own_unpaid_orders() -> TestResult {
        let ctx = TestContext::new().await;
        let lamp = helpers::seed_product(&ctx, "Lamp", 1_250, 5).await;
        let address = helpers::seed_address(&ctx, ALICE).await;

        let unpaid = helpers::buy_now(&ctx, ALICE, lamp, 1, address).await?;
        let paid = helpers::buy_now(&ctx, ALICE, lamp, 1, address).await?;
        ctx.orders.pay_order(paid.order_id, card()).await?;

        let stranger = ctx.orders.cancel_order(unpaid.order_id, BOB, None).await;
        let too_late = ctx.orders.cancel_order(paid.order_id, ALICE, None).await;

        assert!(
            matches!(stranger, Err(OrdersServiceError::PermissionDenied)),
            "expected PermissionDenied, got {stranger:?}"
        );
        assert!(
            matches!(too_late, Err(OrdersServiceError::NotCancellable(OrderStatus::Paid))),
            "expected NotCancellable, got {too_late:?}"
        );

        let reversal = ctx.orders.cancel_order(unpaid.order_id, ALICE, None).await?;

        assert_eq!(reversal.stock_changes.len(), 1);
        assert_eq!(helpers::stock_of(&ctx, lamp).await, 4);

        let again = ctx.orders.cancel_order(unpaid.order_id, ALICE, None).await;

        assert!(
            matches!(again, Err(OrdersServiceError::NotCancellable(OrderStatus::Cancelled))),
            "expected NotCancellable, got {again:?}"
        );
        assert_eq!(helpers::stock_of(&ctx, lamp).await, 4);

        Ok(())
    }

    #[tokio::test]
    #[ignore = "requires a docker daemon for the postgres testcontainer"]
    async fn only_cancelled_orders_can_be_deleted() -> TestResult {
        let ctx = TestContext::new().await;
        let lamp = helpers::seed_product(&ctx, "Lamp", 1_250, 5).await;
        let address = helpers::seed_address(&ctx, ALICE).await;

        let summary = helpers::buy_now(&ctx, ALICE, lamp, 1, address).await?;

        let early = ctx.orders.delete_order(summary.order_id, ALICE).await;

        assert!(
            matches!(early, Err(OrdersServiceError::NotDeletable(OrderStatus::Pending))),
            "expected NotDeletable, got {early:?}"
        );

        ctx.orders.cancel_order(summary.order_id, ALICE, None).await?;
        ctx.orders.delete_order(summary.order_id, ALICE).await?;

        let gone = ctx.orders.get_order(summary.order_id).await;

        assert!(
            matches!(gone, Err(OrdersServiceError::NotFound)),
            "expected NotFound, got {gone:?}"
        );

        Ok(())
    }

    #[tokio::test]
    #[ignore = "requires a docker daemon for the postgres testcontainer"]
    async fn retried_create_with_same_key_returns_first_order() -> TestResult {
        let ctx = TestContext::new().await;
        let lamp = helpers::seed_product(&ctx, "Lamp", 1_250, 5).await;
        let address = helpers::seed_address(&ctx, ALICE).await;

        let request = NewDirectOrder {
            idempotency_key: Some("checkout-42".to_string()),
            ..direct(lamp, 2, address)
        };

        let first = ctx.orders.create_order_direct(ALICE, request.clone()).await?;
        let retry = ctx.orders.create_order_direct(ALICE, request).await?;

        assert!(!first.replayed);
        assert!(retry.replayed);
        assert_eq!(retry.order_id, first.order_id);
        assert_eq!(retry.order_no, first.order_no);
        assert_eq!(helpers::stock_of(&ctx, lamp).await, 3);
        assert_eq!(ctx.orders.list_user_orders(ALICE, None).await?.len(), 1);

        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    #[ignore = "requires a docker daemon for the postgres testcontainer"]
    async fn concurrent_creates_with_same_key_share_one_order() -> TestResult {
        let ctx = TestContext::new().await;
        let lamp = helpers::seed_product(&ctx, "Lamp", 1_250, 5).await;
        let address = helpers::seed_address(&ctx, ALICE).await;

        let request = NewDirectOrder {
            idempotency_key: Some("double-click".to_string()),
            ..direct(lamp, 2, address)
        };

        let (first, second) = tokio::join!(
            ctx.orders.create_order_direct(ALICE, request.clone()),
            ctx.orders.create_order_direct(ALICE, request.clone()),
        );

        let (first, second) = (first?, second?);

        assert_eq!(first.order_id, second.order_id);
        assert!(
            first.replayed != second.replayed,
            "exactly one request creates the order"
        );
        assert_eq!(helpers::stock_of(&ctx, lamp).await, 3);
        assert_eq!(ctx.orders.list_user_orders(ALICE, None).await?.len(), 1);

        Ok(())
    }

    #[tokio::test]
    #[ignore = "requires a docker daemon for the postgres testcontainer"]
    async fn admin_status_updates_follow_table_and_side_effects() -> TestResult {
        let ctx = TestContext::new().await;
        let admin = AdminId::new(900);
        let lamp = helpers::seed_product(&ctx, "Lamp", 1_250, 5).await;
        let address = helpers::seed_address(&ctx, ALICE).await;

        let summary = helpers::buy_now(&ctx, ALICE, lamp, 2, address).await?;

        let skipped = ctx
            .orders
            .update_order_status(summary.order_id, OrderStatus::Shipped, admin)
            .await;

        assert!(
            matches!(skipped, Err(OrdersServiceError::Transition(_))),
            "expected Transition, got {skipped:?}"
        );

        ctx.orders
            .update_order_status(summary.order_id, OrderStatus::Confirmed, admin)
            .await?;

        let paid = ctx
            .orders
            .update_order_status(summary.order_id, OrderStatus::Paid, admin)
            .await?;

        assert_eq!(paid.payment_status, PaymentStatus::Paid);
        assert_eq!(paid.payment_method.as_deref(), Some("manual"));

        let refunded = ctx
            .orders
            .update_order_status(summary.order_id, OrderStatus::Refunded, admin)
            .await?;

        assert_eq!(refunded.status, OrderStatus::Refunded);
        assert_eq!(refunded.payment_status, PaymentStatus::Refunded);
        assert_eq!(helpers::stock_of(&ctx, lamp).await, 5);
        assert_eq!(helpers::purchase_count(&ctx, summary.order_id).await, 0);

        let ledger = ctx.inventory.stock_ledger(lamp).await?;
        let last = ledger.last().ok_or("ledger should not be empty")?;

        assert_eq!(last.reason, StockReason::RefundApproved);
        assert_eq!(last.operator, Some(900));

        let terminal = ctx
            .orders
            .update_order_status(summary.order_id, OrderStatus::Paid, admin)
            .await;

        assert!(
            matches!(terminal, Err(OrdersServiceError::Transition(_))),
            "expected Transition, got {terminal:?}"
        );

        Ok(())
    }

    #[tokio::test]
    #[ignore = "requires a docker daemon for the postgres testcontainer"]
    async fn user_orders_are_listed_newest_first() -> TestResult {
        let ctx = TestContext::new().await;
        let lamp = helpers::seed_product(&ctx, "Lamp", 1_250, 5).await;
        let address = helpers::seed_address(&ctx, ALICE).await;

        let older = helpers::buy_now(&ctx, ALICE, lamp, 1, address).await?;
        let newer = helpers::buy_now(&ctx, ALICE, lamp, 1, address).await?;
        ctx.orders.cancel_order(older.order_id, ALICE, None).await?;

        let all: Vec<OrderId> = ctx
            .orders
            .list_user_orders(ALICE, None)
            .await?
            .into_iter()
            .map(|order| order.id)
            .collect();
        let cancelled = ctx
            .orders
            .list_user_orders(ALICE, Some(OrderStatus::Cancelled))
            .await?;

        assert_eq!(all, vec![newer.order_id, older.order_id]);
        assert_eq!(cancelled.len(), 1);
        assert_eq!(cancelled[0].id, older.order_id);
        assert!(ctx.orders.list_user_orders(BOB, None).await?.is_empty());

        Ok(())
    }
}
