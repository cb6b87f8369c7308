//! Notification Models

use crate::ids::{TypedId, UserId};

pub type NotificationId = TypedId<NewNotification>;

/// What a notification is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    OrderShipped,
    RefundRequested,
    RefundApproved,
    RefundRejected,
}

impl NotificationKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OrderShipped => "order_shipped",
            Self::RefundRequested => "refund_requested",
            Self::RefundApproved => "refund_approved",
            Self::RefundRejected => "refund_rejected",
        }
    }
}

/// Message for a user's inbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNotification {
    pub user: UserId,
    pub kind: NotificationKind,
    pub title: String,
    pub content: String,
    pub related_id: Option<i64>,
}
