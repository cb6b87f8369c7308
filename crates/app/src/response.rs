//! Structured response envelope returned by every public operation.

use std::fmt::Display;

use jiff::Timestamp;
use serde::Serialize;
use tracing::warn;

use crate::pool::PoolError;

/// Machine-readable failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ValidationError,
    NotFound,
    DatabaseError,
    PermissionDenied,
    SystemBusy,
    PurchaseLimitExceeded,
}

/// Errors that know which [`ErrorCode`] they surface as.
pub trait Coded {
    fn code(&self) -> ErrorCode;
}

impl Coded for PoolError {
    fn code(&self) -> ErrorCode {
        match self {
            Self::Timeout(_) => ErrorCode::SystemBusy,
            Self::Closed
            | Self::Connect(_)
            | Self::Unhealthy { .. }
            | Self::InvalidConfig(_) => ErrorCode::DatabaseError,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<ErrorCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    pub timestamp: Timestamp,
}

impl<T> Envelope<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            code: None,
            data: Some(data),
            timestamp: Timestamp::now(),
        }
    }

    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            code: Some(code),
            data: None,
            timestamp: Timestamp::now(),
        }
    }

    /// Wrap a service result. Failures are logged with their code.
    pub fn respond<E>(result: Result<T, E>, success_message: &str) -> Self
    where
        E: Coded + Display,
    {
        match result {
            Ok(data) => Self::ok(success_message, data),
            Err(error) => {
                let code = error.code();

                warn!(code = ?code, error = %error, "operation failed");

                Self::error(code, error.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::Value;
    use testresult::TestResult;

    use super::*;

    #[test]
    fn success_envelope_omits_code() -> TestResult {
        let envelope = Envelope::ok("order created", 7_u32);
        let json = serde_json::to_value(&envelope)?;

        assert_eq!(json["success"], Value::Bool(true));
        assert_eq!(json["message"], "order created");
        assert_eq!(json["data"], 7);
        assert!(json.get("code").is_none(), "unexpected code in {json}");
        assert!(json["timestamp"].is_string());

        Ok(())
    }

    #[test]
    fn failure_envelope_carries_screaming_code() -> TestResult {
        let result: Result<u32, PoolError> = Err(PoolError::Timeout(Duration::from_secs(30)));
        let envelope = Envelope::respond(result, "unused");
        let json = serde_json::to_value(&envelope)?;

        assert_eq!(json["success"], Value::Bool(false));
        assert_eq!(json["code"], "SYSTEM_BUSY");
        assert!(json.get("data").is_none(), "unexpected data in {json}");

        Ok(())
    }

    #[test]
    fn pool_failures_other_than_timeout_are_database_errors() {
        assert_eq!(PoolError::Closed.code(), ErrorCode::DatabaseError);
        assert_eq!(
            PoolError::Unhealthy { attempts: 3 }.code(),
            ErrorCode::DatabaseError
        );
    }
}
