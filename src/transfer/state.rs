//! Transfer Outcome States
//!
//! One engine invocation ends in exactly one of two terminal states. There
//! is no partially-committed state: the unit of work either published all
//! five writes or none of them.

use std::fmt;

/// Terminal state of one transfer invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferState {
    /// Transfer row, both entries and both balance deltas are committed
    Committed,

    /// Nothing from this invocation is visible (validation failure or full rollback)
    Aborted,
}

impl TransferState {
    /// Classify the result of `TransferEngine::transfer`
    pub fn of<T, E>(result: &Result<T, E>) -> Self {
        match result {
            Ok(_) => TransferState::Committed,
            Err(_) => TransferState::Aborted,
        }
    }

    #[inline]
    pub fn is_committed(&self) -> bool {
        matches!(self, TransferState::Committed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransferState::Committed => "COMMITTED",
            TransferState::Aborted => "ABORTED",
        }
    }
}

impl fmt::Display for TransferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_of_result() {
        let ok: Result<u8, ()> = Ok(1);
        let err: Result<u8, ()> = Err(());
        assert_eq!(TransferState::of(&ok), TransferState::Committed);
        assert_eq!(TransferState::of(&err), TransferState::Aborted);
        assert!(TransferState::Committed.is_committed());
        assert_eq!(TransferState::Aborted.to_string(), "ABORTED");
    }
}
