//! Order lifecycle state machine.

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    str::FromStr,
};

use serde::Serialize;
use thiserror::Error;

/// Where an order is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Paid,
    Shipped,
    Delivered,
    Completed,
    Cancelled,
    Refunding,
    Refunded,
}

impl OrderStatus {
    pub const ALL: [Self; 9] = [
        Self::Pending,
        Self::Confirmed,
        Self::Paid,
        Self::Shipped,
        Self::Delivered,
        Self::Completed,
        Self::Cancelled,
        Self::Refunding,
        Self::Refunded,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Paid => "paid",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Refunding => "refunding",
            Self::Refunded => "refunded",
        }
    }

    /// States reachable through an ordinary status update.
    ///
    /// `refunding` has no entries: it is entered and left only through the
    /// refund workflow.
    #[must_use]
    pub const fn allowed_targets(self) -> &'static [Self] {
        match self {
            Self::Pending => &[Self::Confirmed, Self::Cancelled],
            Self::Confirmed => &[Self::Paid, Self::Cancelled],
            Self::Paid => &[Self::Shipped, Self::Cancelled, Self::Refunded],
            Self::Shipped => &[Self::Delivered, Self::Cancelled],
            Self::Delivered => &[Self::Completed, Self::Refunded],
            Self::Completed => &[Self::Refunded],
            Self::Cancelled | Self::Refunding | Self::Refunded => &[],
        }
    }

    #[must_use]
    pub fn can_transition_to(self, target: Self) -> bool {
        self.allowed_targets().contains(&target)
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Cancelled | Self::Refunded)
    }

    /// Paid or later, not terminal, not already in a refund.
    #[must_use]
    pub const fn can_request_refund(self) -> bool {
        matches!(
            self,
            Self::Paid | Self::Shipped | Self::Delivered | Self::Completed
        )
    }

    /// Whether the customer may still cancel without a refund.
    #[must_use]
    pub const fn is_cancellable_by_customer(self) -> bool {
        matches!(self, Self::Pending | Self::Confirmed)
    }
}

impl Display for OrderStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown order status '{0}'")]
pub struct UnknownStatus(pub String);

impl FromStr for OrderStatus {
    type Err = UnknownStatus;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == value)
            .ok_or_else(|| UnknownStatus(value.to_string()))
    }
}

/// A status change the lifecycle does not allow.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("order cannot move from {from} to {to}")]
pub struct TransitionError {
    pub from: OrderStatus,
    pub to: OrderStatus,
}

/// Check `from -> to` against the transition table.
///
/// # Errors
///
/// Returns [`TransitionError`] naming both states when the move is not allowed.
pub fn ensure_transition(from: OrderStatus, to: OrderStatus) -> Result<(), TransitionError> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(TransitionError { from, to })
    }
}

/// Check a move made by the refund workflow.
///
/// # Errors
///
/// Returns [`TransitionError`] unless the move is `refundable -> refunding`,
/// `refunding -> refunded` or `refunding -> paid`.
pub fn ensure_refund_transition(from: OrderStatus, to: OrderStatus) -> Result<(), TransitionError> {
    let allowed = match to {
        OrderStatus::Refunding => from.can_request_refund(),
        OrderStatus::Refunded | OrderStatus::Paid => from == OrderStatus::Refunding,
        _ => false,
    };

    if allowed {
        Ok(())
    } else {
        Err(TransitionError { from, to })
    }
}

/// Payment state tracked alongside the lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Unpaid,
    Paid,
    Refunded,
}

impl PaymentStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unpaid => "unpaid",
            Self::Paid => "paid",
            Self::Refunded => "refunded",
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = UnknownStatus;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "unpaid" => Ok(Self::Unpaid),
            "paid" => Ok(Self::Paid),
            "refunded" => Ok(Self::Refunded),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use OrderStatus::*;

    #[test]
    fn table_matches_documented_transitions() {
        let expected: [(OrderStatus, &[OrderStatus]); 9] = [
            (Pending, &[Confirmed, Cancelled]),
            (Confirmed, &[Paid, Cancelled]),
            (Paid, &[Shipped, Cancelled, Refunded]),
            (Shipped, &[Delivered, Cancelled]),
            (Delivered, &[Completed, Refunded]),
            (Completed, &[Refunded]),
            (Cancelled, &[]),
            (Refunding, &[]),
            (Refunded, &[]),
        ];

        for (from, targets) in expected {
            for to in OrderStatus::ALL {
                assert_eq!(
                    from.can_transition_to(to),
                    targets.contains(&to),
                    "unexpected table entry for {from} -> {to}"
                );
            }
        }
    }

    #[test]
    fn skipping_ahead_is_rejected_with_both_states() {
        let result = ensure_transition(Pending, Shipped);

        assert_eq!(
            result,
            Err(TransitionError {
                from: Pending,
                to: Shipped
            })
        );
        assert_eq!(
            result.map_err(|error| error.to_string()),
            Err("order cannot move from pending to shipped".to_string())
        );
    }

    #[test]
    fn terminal_states_have_no_exits() {
        for from in [Cancelled, Refunded] {
            assert!(from.is_terminal(), "{from} should be terminal");

            for to in OrderStatus::ALL {
                assert!(
                    ensure_transition(from, to).is_err(),
                    "{from} -> {to} should be rejected"
                );
            }
        }
    }

    #[test]
    fn refund_workflow_moves_are_separate_from_table() {
        for from in [Paid, Shipped, Delivered, Completed] {
            assert!(ensure_refund_transition(from, Refunding).is_ok(), "{from} -> refunding");
        }

        for from in [Pending, Confirmed, Cancelled, Refunding, Refunded] {
            assert!(
                ensure_refund_transition(from, Refunding).is_err(),
                "{from} -> refunding should be rejected"
            );
        }

        assert!(ensure_refund_transition(Refunding, Refunded).is_ok());
        assert!(ensure_refund_transition(Refunding, Paid).is_ok());
        assert!(ensure_refund_transition(Paid, Refunded).is_err());
        assert!(ensure_transition(Paid, Refunding).is_err());
    }

    #[test]
    fn statuses_round_trip_through_text() {
        for status in OrderStatus::ALL {
            assert_eq!(status.as_str().parse::<OrderStatus>(), Ok(status));
        }

        assert_eq!(
            "shipping".parse::<OrderStatus>(),
            Err(UnknownStatus("shipping".to_string()))
        );
    }
}
