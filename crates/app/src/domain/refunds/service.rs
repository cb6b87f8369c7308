//! Refunds service.

use async_trait::async_trait;
use mockall::automock;
use sqlx::{Connection, Postgres, Transaction};
use tracing::info;

use crate::{
    database::{self, PgPool},
    domain::{
        inventory::models::{StockEvent, StockReason},
        notifications::{
            models::{NewNotification, NotificationKind},
            repository::PgNotificationsRepository,
        },
        orders::{
            lifecycle::{OrderStatus, PaymentStatus, ensure_refund_transition},
            models::{Order, OrderId},
            repositories::PgOrdersRepository,
            restitution::{PgRestitution, Restitution},
        },
        refunds::{
            errors::RefundsServiceError,
            models::{
                RefundDecision, RefundId, RefundOutcome, RefundRequest, RefundStatus,
                RefundSummary,
            },
            repository::PgRefundsRepository,
        },
    },
    ids::{AdminId, UserId},
};

#[derive(Debug, Clone)]
pub struct PgRefundsService {
    pool: PgPool,
    refunds: PgRefundsRepository,
    orders: PgOrdersRepository,
    restitution: PgRestitution,
    notifications: PgNotificationsRepository,
}

impl PgRefundsService {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            refunds: PgRefundsRepository::new(),
            orders: PgOrdersRepository::new(),
            restitution: PgRestitution::new(),
            notifications: PgNotificationsRepository::new(),
        }
    }

    async fn lock_order(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        order: OrderId,
    ) -> Result<Order, RefundsServiceError> {
        self.orders
            .lock_order(tx, order)
            .await
            .map_err(|error| match error {
                sqlx::Error::RowNotFound => RefundsServiceError::OrderNotFound,
                other => other.into(),
            })
    }

    async fn request_in(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        order: OrderId,
        user: UserId,
        reason: &str,
    ) -> Result<(RefundRequest, Order), RefundsServiceError> {
        let current = self.lock_order(tx, order).await?;

        if current.user != user {
            return Err(RefundsServiceError::PermissionDenied);
        }

        if self
            .refunds
            .find_for_order(tx, order, RefundStatus::Pending)
            .await?
            .is_some()
        {
            return Err(RefundsServiceError::PendingRefundExists);
        }

        if let Some(rejected) = self
            .refunds
            .find_for_order(tx, order, RefundStatus::Rejected)
            .await?
        {
            return Err(RefundsServiceError::PreviouslyRejected {
                reply: rejected.admin_reply.unwrap_or_default(),
            });
        }

        if !current.status.can_request_refund() {
            return Err(RefundsServiceError::NotRefundable(current.status));
        }

        ensure_refund_transition(current.status, OrderStatus::Refunding)?;

        let refund = self
            .refunds
            .create_refund(tx, order, user, reason, current.payable)
            .await?;

        let refunding = self
            .orders
            .set_status(tx, order, OrderStatus::Refunding, None)
            .await?;

        Ok((refund, refunding))
    }

    async fn process_in(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        refund: RefundId,
        admin: AdminId,
        decision: &RefundDecision,
    ) -> Result<RefundOutcome, RefundsServiceError> {
        // Order before refund, the same lock order `request_in` uses.
        let order = self.refunds.get_refund(tx, refund).await?.order;
        let current = self.lock_order(tx, order).await?;
        let pending = self.refunds.lock_refund(tx, refund).await?;

        if pending.status != RefundStatus::Pending {
            return Err(RefundsServiceError::AlreadyProcessed(pending.status));
        }

        let target = if decision.approve {
            OrderStatus::Refunded
        } else {
            OrderStatus::Paid
        };

        ensure_refund_transition(current.status, target)?;

        let restitution = if decision.approve {
            self.restitution
                .reverse(
                    tx,
                    &current,
                    StockReason::RefundApproved,
                    StockEvent::Refund(refund),
                    Some(admin.get()),
                )
                .await?
        } else {
            Restitution::default()
        };

        let payment_status = decision.approve.then_some(PaymentStatus::Refunded);
        let order = self
            .orders
            .set_status(tx, order, target, payment_status)
            .await?;

        let status = if decision.approve {
            RefundStatus::Approved
        } else {
            RefundStatus::Rejected
        };

        let refund = self
            .refunds
            .record_decision(tx, refund, status, admin, decision.reply.as_deref())
            .await?
            .ok_or(RefundsServiceError::AlreadyProcessed(status))?;

        Ok(RefundOutcome {
            refund,
            order,
            coupons_restored: restitution.coupons_restored,
            stock_changes: restitution.stock_changes,
        })
    }
}

#[async_trait]
impl RefundsService for PgRefundsService {
    async fn request_refund(
        &self,
        order: OrderId,
        user: UserId,
        reason: String,
    ) -> Result<RefundSummary, RefundsServiceError> {
        let reason = reason.trim();

        if reason.is_empty() {
            return Err(RefundsServiceError::MissingReason);
        }

        let mut conn = self.pool.acquire().await?;
        let mut tx = conn.begin().await?;

        let result = self.request_in(&mut tx, order, user, reason).await;
        let (refund, order) = database::finish(tx, result).await?;

        info!(
            refund_id = %refund.id,
            order_id = %order.id,
            user_id = %user,
            amount = refund.amount,
            "refund requested"
        );

        self.notifications
            .send(
                &mut conn,
                NewNotification {
                    user,
                    kind: NotificationKind::RefundRequested,
                    title: "Refund requested".to_string(),
                    content: format!(
                        "Your refund request for order {} is awaiting review",
                        order.order_no
                    ),
                    related_id: Some(refund.id.get()),
                },
            )
            .await;

        Ok(RefundSummary {
            refund_id: refund.id,
            order_id: order.id,
            order_no: order.order_no,
            amount: refund.amount,
            status: refund.status,
            order_status: order.status,
        })
    }

    async fn process_refund(
        &self,
        refund: RefundId,
        admin: AdminId,
        decision: RefundDecision,
    ) -> Result<RefundOutcome, RefundsServiceError> {
        let mut conn = self.pool.acquire().await?;
        let mut tx = conn.begin().await?;

        let result = self.process_in(&mut tx, refund, admin, &decision).await;
        let outcome = database::finish(tx, result).await?;

        info!(
            refund_id = %refund,
            order_id = %outcome.order.id,
            admin_id = %admin,
            status = %outcome.refund.status,
            products_restocked = outcome.stock_changes.len(),
            "refund processed"
        );

        let (kind, title, content) = if decision.approve {
            (
                NotificationKind::RefundApproved,
                "Refund approved",
                format!(
                    "Your refund of {} for order {} has been approved",
                    outcome.refund.amount, outcome.order.order_no
                ),
            )
        } else {
            (
                NotificationKind::RefundRejected,
                "Refund rejected",
                format!(
                    "Your refund request for order {} was rejected: {}",
                    outcome.order.order_no,
                    outcome.refund.admin_reply.as_deref().unwrap_or_default()
                ),
            )
        };

        self.notifications
            .send(
                &mut conn,
                NewNotification {
                    user: outcome.refund.user,
                    kind,
                    title: title.to_string(),
                    content,
                    related_id: Some(refund.get()),
                },
            )
            .await;

        Ok(outcome)
    }

    async fn list_user_refunds(
        &self,
        user: UserId,
    ) -> Result<Vec<RefundRequest>, RefundsServiceError> {
        let mut conn = self.pool.acquire().await?;
        let mut tx = conn.begin().await?;

        let result = self
            .refunds
            .list_user_refunds(&mut tx, user)
            .await
            .map_err(RefundsServiceError::from);

        database::finish(tx, result).await
    }
}

#[automock]
#[async_trait]
pub trait RefundsService: Send + Sync {
    /// Open a refund for a paid order and move it to `refunding`.
    async fn request_refund(
        &self,
        order: OrderId,
        user: UserId,
        reason: String,
    ) -> Result<RefundSummary, RefundsServiceError>;

    /// Approve or reject a pending refund.
    async fn process_refund(
        &self,
        refund: RefundId,
        admin: AdminId,
        decision: RefundDecision,
    ) -> Result<RefundOutcome, RefundsServiceError>;

    async fn list_user_refunds(
        &self,
        user: UserId,
    ) -> Result<Vec<RefundRequest>, RefundsServiceError>;
}
