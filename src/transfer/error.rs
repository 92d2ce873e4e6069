//! Transfer Error Types

use thiserror::Error;

use crate::money::MoneyError;
use crate::store::LedgerError;

/// Failures of one engine invocation.
///
/// Validation variants are returned before any storage call. Everything
/// that happened inside the unit of work is wrapped in [`Execution`]
/// with the storage cause kept as `source()`.
///
/// [`Execution`]: TransferError::Execution
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    // === Validation Errors ===
    #[error("Source and target account cannot be the same")]
    SameAccount,

    #[error("Amount must be greater than zero")]
    InvalidAmount,

    #[error("Amount precision exceeds currency limit ({provided} > {max} decimals)")]
    PrecisionOverflow { provided: u32, max: u32 },

    // === Execution Errors ===
    #[error("transfer execution failed: {0}")]
    Execution(#[source] LedgerError),
}

impl TransferError {
    /// Get the error code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            TransferError::SameAccount => "SAME_ACCOUNT",
            TransferError::InvalidAmount => "INVALID_AMOUNT",
            TransferError::PrecisionOverflow { .. } => "PRECISION_OVERFLOW",
            TransferError::Execution(cause) => cause.code(),
        }
    }

    /// Storage cause, if the failure happened inside the unit of work
    pub fn cause(&self) -> Option<&LedgerError> {
        match self {
            TransferError::Execution(cause) => Some(cause),
            _ => None,
        }
    }

    /// Retrying the identical request may succeed (lock timeout, deadlock
    /// reported by storage, connectivity). The engine itself never retries.
    pub fn is_retryable(&self) -> bool {
        self.cause().is_some_and(LedgerError::is_retryable)
    }

    pub fn is_not_found(&self) -> bool {
        self.cause().is_some_and(LedgerError::is_not_found)
    }
}

impl From<LedgerError> for TransferError {
    fn from(e: LedgerError) -> Self {
        TransferError::Execution(e)
    }
}

impl From<MoneyError> for TransferError {
    fn from(e: MoneyError) -> Self {
        match e {
            MoneyError::PrecisionOverflow { provided, max } => {
                TransferError::PrecisionOverflow { provided, max }
            }
            _ => TransferError::InvalidAmount,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_error_codes() {
        assert_eq!(TransferError::SameAccount.code(), "SAME_ACCOUNT");
        assert_eq!(TransferError::InvalidAmount.code(), "INVALID_AMOUNT");
        assert_eq!(
            TransferError::Execution(LedgerError::not_found("account", "x")).code(),
            "NOT_FOUND"
        );
        assert_eq!(
            TransferError::Execution(LedgerError::storage("down")).code(),
            "STORAGE_FAILURE"
        );
    }

    #[test]
    fn test_execution_wraps_cause() {
        let err = TransferError::from(LedgerError::not_found("account", "abc"));
        assert_eq!(
            err.to_string(),
            "transfer execution failed: account not found: abc"
        );
        assert!(err.is_not_found());
        assert!(!err.is_retryable());
        assert_eq!(
            err.source().map(|s| s.to_string()),
            Some("account not found: abc".to_string())
        );
    }

    #[test]
    fn test_retryable_only_for_storage_causes() {
        assert!(TransferError::from(LedgerError::storage("lock timeout")).is_retryable());
        assert!(!TransferError::SameAccount.is_retryable());
        assert!(!TransferError::from(LedgerError::Cancelled).is_retryable());
    }

    #[test]
    fn test_from_money_error() {
        assert_eq!(
            TransferError::from(MoneyError::InvalidAmount),
            TransferError::InvalidAmount
        );
        assert_eq!(
            TransferError::from(MoneyError::PrecisionOverflow {
                provided: 3,
                max: 2
            })
            .code(),
            "PRECISION_OVERFLOW"
        );
    }
}
