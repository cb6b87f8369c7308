//! Test Helpers
//!
//! Catalog, address, cart and coupon rows are owned by collaborators outside
//! this crate, so tests seed them with plain SQL.

use sqlx::{query, query_as, query_scalar};

use crate::{
    database::PgPooledConnection,
    domain::{
        coupons::models::{CouponId, UserCouponId},
        inventory::models::ProductId,
        orders::{
            OrdersService, OrdersServiceError,
            models::{AddressId, NewDirectOrder, OrderId, OrderSummary},
        },
    },
    ids::UserId,
    test::TestContext,
};

async fn conn(ctx: &TestContext) -> PgPooledConnection {
    ctx.pool()
        .acquire()
        .await
        .expect("Failed to acquire test connection")
}

pub(crate) async fn seed_product(ctx: &TestContext, name: &str, price: i64, stock: i32) -> ProductId {
    let mut conn = conn(ctx).await;

    query_scalar::<_, ProductId>(
        "INSERT INTO products (name, price, stock_quantity) VALUES ($1, $2, $3) RETURNING id",
    )
    .bind(name)
    .bind(price)
    .bind(stock)
    .fetch_one(&mut *conn)
    .await
    .expect("Failed to seed product")
}

pub(crate) async fn seed_limited_product(
    ctx: &TestContext,
    name: &str,
    price: i64,
    stock: i32,
    limit: i32,
    period: &str,
) -> ProductId {
    let mut conn = conn(ctx).await;

    query_scalar::<_, ProductId>(
        "INSERT INTO products (name, price, stock_quantity, purchase_limit, limit_period) \
         VALUES ($1, $2, $3, $4, $5) RETURNING id",
    )
    .bind(name)
    .bind(price)
    .bind(stock)
    .bind(limit)
    .bind(period)
    .fetch_one(&mut *conn)
    .await
    .expect("Failed to seed limited product")
}

pub(crate) async fn set_product_status(ctx: &TestContext, product: ProductId, status: &str) {
    let mut conn = conn(ctx).await;

    query("UPDATE products SET status = $2 WHERE id = $1")
        .bind(product)
        .bind(status)
        .execute(&mut *conn)
        .await
        .expect("Failed to update product status");
}

pub(crate) async fn stock_of(ctx: &TestContext, product: ProductId) -> i32 {
    let mut conn = conn(ctx).await;

    query_scalar::<_, i32>("SELECT stock_quantity FROM products WHERE id = $1")
        .bind(product)
        .fetch_one(&mut *conn)
        .await
        .expect("Failed to read stock")
}

pub(crate) async fn seed_address(ctx: &TestContext, user: UserId) -> AddressId {
    let mut conn = conn(ctx).await;

    query_scalar::<_, AddressId>(
        "INSERT INTO user_addresses \
         (user_id, receiver_name, receiver_phone, province, city, district, detail_address) \
         VALUES ($1, 'Ada', '555-0100', 'Ontario', 'Toronto', 'Annex', '12 Bloor St') \
         RETURNING id",
    )
    .bind(user)
    .fetch_one(&mut *conn)
    .await
    .expect("Failed to seed address")
}

pub(crate) async fn seed_coupon(
    ctx: &TestContext,
    code: &str,
    kind: &str,
    value: i64,
    min_amount: i64,
) -> CouponId {
    let mut conn = conn(ctx).await;

    query_scalar::<_, CouponId>(
        "INSERT INTO coupons (code, name, kind, value, min_amount) \
         VALUES ($1, $1, $2, $3, $4) RETURNING id",
    )
    .bind(code)
    .bind(kind)
    .bind(value)
    .bind(min_amount)
    .fetch_one(&mut *conn)
    .await
    .expect("Failed to seed coupon")
}

pub(crate) async fn grant_coupon(ctx: &TestContext, user: UserId, coupon: CouponId) -> UserCouponId {
    let mut conn = conn(ctx).await;

    query_scalar::<_, UserCouponId>(
        "INSERT INTO user_coupons (user_id, coupon_id) VALUES ($1, $2) RETURNING id",
    )
    .bind(user)
    .bind(coupon)
    .fetch_one(&mut *conn)
    .await
    .expect("Failed to grant coupon")
}

/// `(status, order_id)` of a coupon grant.
pub(crate) async fn grant_state(ctx: &TestContext, grant: UserCouponId) -> (String, Option<OrderId>) {
    let mut conn = conn(ctx).await;

    query_as::<_, (String, Option<OrderId>)>(
        "SELECT status, order_id FROM user_coupons WHERE id = $1",
    )
    .bind(grant)
    .fetch_one(&mut *conn)
    .await
    .expect("Failed to read coupon grant")
}

pub(crate) async fn add_to_cart(ctx: &TestContext, user: UserId, product: ProductId, quantity: i32) {
    let mut conn = conn(ctx).await;

    query("INSERT INTO cart_items (user_id, product_id, quantity) VALUES ($1, $2, $3)")
        .bind(user)
        .bind(product)
        .bind(quantity)
        .execute(&mut *conn)
        .await
        .expect("Failed to add cart item");
}

pub(crate) async fn cart_count(ctx: &TestContext, user: UserId) -> i64 {
    let mut conn = conn(ctx).await;

    query_scalar::<_, i64>("SELECT COUNT(*) FROM cart_items WHERE user_id = $1")
        .bind(user)
        .fetch_one(&mut *conn)
        .await
        .expect("Failed to count cart items")
}

pub(crate) async fn purchase_count(ctx: &TestContext, order: OrderId) -> i64 {
    let mut conn = conn(ctx).await;

    query_scalar::<_, i64>("SELECT COUNT(*) FROM user_purchase_records WHERE order_id = $1")
        .bind(order)
        .fetch_one(&mut *conn)
        .await
        .expect("Failed to count purchase records")
}

pub(crate) async fn notification_kinds(ctx: &TestContext, user: UserId) -> Vec<String> {
    let mut conn = conn(ctx).await;

    query_scalar::<_, String>("SELECT kind FROM user_notifications WHERE user_id = $1 ORDER BY id")
        .bind(user)
        .fetch_all(&mut *conn)
        .await
        .expect("Failed to read notifications")
}

pub(crate) async fn buy_now(
    ctx: &TestContext,
    user: UserId,
    product: ProductId,
    quantity: u32,
    address: AddressId,
) -> Result<OrderSummary, OrdersServiceError> {
    ctx.orders
        .create_order_direct(
            user,
            NewDirectOrder {
                product,
                quantity,
                address,
                coupon_code: None,
                remark: None,
                idempotency_key: None,
            },
        )
        .await
}
