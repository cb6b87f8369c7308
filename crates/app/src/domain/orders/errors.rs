//! Orders service errors.

use sqlx::{
    Error,
    error::{DatabaseError, ErrorKind},
};
use thiserror::Error;

use crate::{
    domain::{
        coupons::CouponRejection,
        inventory::models::{LimitPeriod, ProductId},
        orders::{
            lifecycle::{OrderStatus, TransitionError},
            restitution::RestitutionError,
        },
    },
    pool::PoolError,
    response::{Coded, ErrorCode},
};

#[derive(Debug, Error)]
pub enum OrdersServiceError {
    #[error("order not found")]
    NotFound,

    #[error("product {0} not found")]
    ProductNotFound(ProductId),

    #[error("address not found")]
    AddressNotFound,

    #[error("no items selected in cart")]
    EmptyCart,

    #[error("quantity must be between 1 and {max}, got {quantity}")]
    InvalidQuantity { quantity: u32, max: u32 },

    #[error("{name} is unavailable")]
    Unavailable { name: String },

    #[error("insufficient stock for {name}: sold out (0 remaining)")]
    SoldOut { name: String },

    #[error("insufficient stock for {name}: requested {requested}, {available} remaining")]
    InsufficientStock {
        name: String,
        requested: u32,
        available: u32,
    },

    #[error(
        "{name} is limited to {limit} per {period}; you have already bought {purchased} and requested {requested}"
    )]
    PurchaseLimitExceeded {
        name: String,
        limit: u32,
        period: LimitPeriod,
        purchased: u32,
        requested: u32,
    },

    #[error(transparent)]
    Coupon(#[from] CouponRejection),

    #[error("coupon {0} was used by another order")]
    CouponAlreadyUsed(String),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("order belongs to another user")]
    PermissionDenied,

    #[error("order in status {0} can no longer be cancelled")]
    NotCancellable(OrderStatus),

    #[error("only cancelled orders can be deleted, order is {0}")]
    NotDeletable(OrderStatus),

    #[error("{0} must not be empty")]
    MissingField(&'static str),

    #[error("order total is out of range")]
    AmountOverflow,

    #[error("failed to compute purchase limit window")]
    PurchaseWindow(#[from] jiff::Error),

    #[error("order was already submitted")]
    AlreadyExists,

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

impl From<Error> for OrdersServiceError {
    fn from(error: Error) -> Self {
        if matches!(error, Error::RowNotFound) {
            return Self::NotFound;
        }

        match error.as_database_error().map(DatabaseError::kind) {
            Some(ErrorKind::UniqueViolation) => Self::AlreadyExists,
            Some(ErrorKind::ForeignKeyViolation) => Self::InvalidReference,
            Some(ErrorKind::NotNullViolation) => Self::MissingRequiredData,
            Some(ErrorKind::CheckViolation) => Self::InvalidData,
            Some(ErrorKind::Other | _) | None => Self::Sql(error),
        }
    }
}

impl From<RestitutionError> for OrdersServiceError {
    fn from(error: RestitutionError) -> Self {
        match error {
            RestitutionError::MissingProduct(product) => Self::ProductNotFound(product),
            RestitutionError::Sql(error) => error.into(),
        }
    }
}

impl Coded for OrdersServiceError {
    fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound | Self::AddressNotFound => ErrorCode::NotFound,
            Self::PermissionDenied => ErrorCode::PermissionDenied,
            Self::PurchaseLimitExceeded { .. } => ErrorCode::PurchaseLimitExceeded,
            Self::Pool(error) => error.code(),
            Self::PurchaseWindow(_) | Self::Sql(_) => ErrorCode::DatabaseError,
            Self::AlreadyExists
            | Self::ProductNotFound(_)
            | Self::EmptyCart
            | Self::InvalidQuantity { .. }
            | Self::Unavailable { .. }
            | Self::SoldOut { .. }
            | Self::InsufficientStock { .. }
            | Self::Coupon(_)
            | Self::CouponAlreadyUsed(_)
            | Self::Transition(_)
            | Self::NotCancellable(_)
            | Self::NotDeletable(_)
            | Self::MissingField(_)
            | Self::AmountOverflow
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
    fn stock_messages_name_product_and_remaining() {
        let sold_out = OrdersServiceError::SoldOut {
            name: "Lamp".to_string(),
        };
        let short = OrdersServiceError::InsufficientStock {
            name: "Lamp".to_string(),
            requested: 3,
            available: 1,
        };

        assert_eq!(
            sold_out.to_string(),
            "insufficient stock for Lamp: sold out (0 remaining)"
        );
        assert_eq!(
            short.to_string(),
            "insufficient stock for Lamp: requested 3, 1 remaining"
        );
    }

    #[test]
    fn errors_map_to_envelope_codes() {
        let limit = OrdersServiceError::PurchaseLimitExceeded {
            name: "Lamp".to_string(),
            limit: 2,
            period: LimitPeriod::Daily,
            purchased: 2,
            requested: 1,
        };

        assert_eq!(limit.code(), ErrorCode::PurchaseLimitExceeded);
        assert_eq!(
            OrdersServiceError::PermissionDenied.code(),
            ErrorCode::PermissionDenied
        );
        assert_eq!(
            OrdersServiceError::Pool(PoolError::Timeout(std::time::Duration::from_secs(1))).code(),
            ErrorCode::SystemBusy
        );
        assert_eq!(
            OrdersServiceError::from(Error::RowNotFound).code(),
            ErrorCode::NotFound
        );
        assert_eq!(
            OrdersServiceError::AlreadyExists.code(),
            ErrorCode::ValidationError,
            "a duplicate submission is the caller's to resolve"
        );
    }

    #[test]
    fn transition_errors_name_both_states() {
        let error = OrdersServiceError::from(TransitionError {
            from: OrderStatus::Pending,
            to: OrderStatus::Shipped,
        });

        assert_eq!(error.to_string(), "order cannot move from pending to shipped");
        assert_eq!(error.code(), ErrorCode::ValidationError);
    }
}
