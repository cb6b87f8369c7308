//! Refunds service errors.

use sqlx::{
    Error,
    error::{DatabaseError, ErrorKind},
};
use thiserror::Error;

use crate::{
    domain::{
        inventory::models::ProductId,
        orders::{
            lifecycle::{OrderStatus, TransitionError},
            restitution::RestitutionError,
        },
        refunds::models::RefundStatus,
    },
    pool::PoolError,
    response::{Coded, ErrorCode},
};

#[derive(Debug, Error)]
pub enum RefundsServiceError {
    #[error("refund request not found")]
    NotFound,

    #[error("order not found")]
    OrderNotFound,

    #[error("order belongs to another user")]
    PermissionDenied,

    #[error("a refund reason is required")]
    MissingReason,

    #[error("order in status {0} is not eligible for a refund")]
    NotRefundable(OrderStatus),

    #[error("order already has a pending refund")]
    PendingRefundExists,

    #[error("a refund for this order was already rejected: {reply}")]
    PreviouslyRejected { reply: String },

    #[error("refund request is already {0}")]
    AlreadyProcessed(RefundStatus),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("product {0} not found")]
    ProductNotFound(ProductId),

    #[error("related resource not found")]
    InvalidReference,

    #[error("missing required data")]
    MissingRequiredData,

    #[error("invalid data")]
    InvalidData,

    #[error("database connection unavailable")]
    Pool(#[from] PoolError),

    #[error("storage error")]
    Sql(#[source] Error),
}

impl From<Error> for RefundsServiceError {
    fn from(error: Error) -> Self {
        if matches!(error, Error::RowNotFound) {
            return Self::NotFound;
        }

        match error.as_database_error().map(DatabaseError::kind) {
            // Only the one-pending-refund-per-order index is unique here.
            Some(ErrorKind::UniqueViolation) => Self::PendingRefundExists,
            Some(ErrorKind::ForeignKeyViolation) => Self::InvalidReference,
            Some(ErrorKind::NotNullViolation) => Self::MissingRequiredData,
            Some(ErrorKind::CheckViolation) => Self::InvalidData,
            Some(ErrorKind::Other | _) | None => Self::Sql(error),
        }
    }
}

impl From<RestitutionError> for RefundsServiceError {
    fn from(error: RestitutionError) -> Self {
        match error {
            RestitutionError::MissingProduct(product) => Self::ProductNotFound(product),
            RestitutionError::Sql(error) => error.into(),
        }
    }
}

impl Coded for RefundsServiceError {
    fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound | Self::OrderNotFound => ErrorCode::NotFound,
            Self::PermissionDenied => ErrorCode::PermissionDenied,
            Self::Pool(error) => error.code(),
            Self::Sql(_) => ErrorCode::DatabaseError,
            Self::MissingReason
            | Self::NotRefundable(_)
            | Self::PendingRefundExists
            | Self::PreviouslyRejected { .. }
            | Self::AlreadyProcessed(_)
            | Self::Transition(_)
            | Self::ProductNotFound(_)
            | Self::InvalidReference
            | Self::MissingRequiredData
            | Self::InvalidData => ErrorCode::ValidationError,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_lock_message_carries_admin_reply() {
        let error = RefundsServiceError::PreviouslyRejected {
            reply: "item was used".to_string(),
        };

        assert_eq!(
            error.to_string(),
            "a refund for this order was already rejected: item was used"
        );
        assert_eq!(error.code(), ErrorCode::ValidationError);
    }

    #[test]
    fn ownership_failures_are_permission_errors() {
        assert_eq!(
            RefundsServiceError::PermissionDenied.code(),
            ErrorCode::PermissionDenied
        );
        assert_eq!(RefundsServiceError::OrderNotFound.code(), ErrorCode::NotFound);
    }
}
