//! Ledger Storage Error Types

use thiserror::Error;

/// SQLSTATE codes the PostgreSQL store maps explicitly.
pub(crate) mod sqlstate {
    pub const FOREIGN_KEY_VIOLATION: &str = "23503";
    pub const SERIALIZATION_FAILURE: &str = "40001";
    pub const DEADLOCK_DETECTED: &str = "40P01";
    pub const LOCK_NOT_AVAILABLE: &str = "55P03";
    pub const QUERY_CANCELED: &str = "57014";
}

/// Storage and unit-of-work failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Referenced row does not exist
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Connectivity, constraint, lock or commit failure
    #[error("storage failure: {0}")]
    Storage(String),

    /// Rollback failed after `original`; both are reported
    #[error("rollback failed: {original}, {cause}")]
    RollbackFailed {
        original: Box<LedgerError>,
        cause: String,
    },

    #[error("operation cancelled")]
    Cancelled,

    #[error("deadline exceeded")]
    DeadlineExceeded,
}

impl LedgerError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Stable code for upstream mapping
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::NotFound { .. } => "NOT_FOUND",
            LedgerError::Storage(_) => "STORAGE_FAILURE",
            LedgerError::RollbackFailed { .. } => "ROLLBACK_FAILURE",
            LedgerError::Cancelled => "CANCELLED",
            LedgerError::DeadlineExceeded => "DEADLINE_EXCEEDED",
        }
    }

    /// Whether the caller may retry the whole operation.
    ///
    /// Rollback failures are never retryable: storage state is suspect.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LedgerError::Storage(_) | LedgerError::DeadlineExceeded
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, LedgerError::NotFound { .. })
    }
}

impl From<sqlx::Error> for LedgerError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::RowNotFound => LedgerError::not_found("row", "unknown"),
            sqlx::Error::Database(db) => match db.code().as_deref() {
                Some(sqlstate::DEADLOCK_DETECTED) => {
                    LedgerError::storage(format!("deadlock detected: {}", db.message()))
                }
                Some(sqlstate::LOCK_NOT_AVAILABLE) => {
                    LedgerError::storage(format!("lock timeout: {}", db.message()))
                }
                Some(sqlstate::SERIALIZATION_FAILURE) => {
                    LedgerError::storage(format!("serialization failure: {}", db.message()))
                }
                Some(sqlstate::QUERY_CANCELED) => {
                    LedgerError::storage(format!("statement canceled: {}", db.message()))
                }
                _ => LedgerError::Storage(e.to_string()),
            },
            _ => LedgerError::Storage(e.to_string()),
        }
    }
}
