//! Ledger data model
//!
//! Rows stored by the ledger storage and the composite value returned by the
//! transfer engine. Money is always `rust_decimal::Decimal` (fixed-point);
//! binary floating point drifts under repeated deltas and is never used.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type AccountId = Uuid;
pub type EntryId = Uuid;
pub type TransferId = Uuid;

// ============================================================================
// Rows
// ============================================================================

/// An account holding a balance in a single currency.
///
/// The balance is only ever changed through the storage's atomic
/// add-to-balance primitive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Account {
    pub id: AccountId,
    pub owner: String,
    pub currency: String,
    pub balance: Decimal,
    pub created_at: DateTime<Utc>,
}

/// Append-only ledger line. Negative amount = debit, positive = credit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Entry {
    pub id: EntryId,
    pub account_id: AccountId,
    pub amount: Decimal,
    pub created_at: DateTime<Utc>,
}

/// Immutable record of one money movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Transfer {
    pub id: TransferId,
    pub from_account_id: AccountId,
    pub to_account_id: AccountId,
    pub amount: Decimal,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Operation parameters
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateAccountParams {
    pub owner: String,
    pub currency: String,
    pub balance: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreateEntryParams {
    pub account_id: AccountId,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreateTransferParams {
    pub from_account_id: AccountId,
    pub to_account_id: AccountId,
    pub amount: Decimal,
}

/// Signed delta applied atomically to an account balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddAccountBalanceParams {
    pub id: AccountId,
    pub amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListAccountsParams {
    pub owner: String,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListEntriesParams {
    pub account_id: AccountId,
    pub limit: i64,
    pub offset: i64,
}

impl ListEntriesParams {
    /// First `limit` entries of an account.
    pub fn first(account_id: AccountId, limit: i64) -> Self {
        Self {
            account_id,
            limit,
            offset: 0,
        }
    }
}

// ============================================================================
// Transfer input / output
// ============================================================================

/// Input of one engine invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferParams {
    pub from_account_id: AccountId,
    pub to_account_id: AccountId,
    pub amount: Decimal,
}

impl TransferParams {
    pub fn new(from_account_id: AccountId, to_account_id: AccountId, amount: Decimal) -> Self {
        Self {
            from_account_id,
            to_account_id,
            amount,
        }
    }
}

/// Everything one committed transfer produced.
///
/// `from_account` / `to_account` are the post-transfer snapshots in their
/// logical roles, independent of the order the rows were locked in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferResult {
    pub transfer: Transfer,
    pub from_account: Account,
    pub to_account: Account,
    pub from_entry: Entry,
    pub to_entry: Entry,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_result_serializes_roles() {
        let now = Utc::now();
        let from = Uuid::new_v4();
        let to = Uuid::new_v4();
        let account = |id| Account {
            id,
            owner: "alice".to_string(),
            currency: "USD".to_string(),
            balance: Decimal::new(49000, 2),
            created_at: now,
        };
        let entry = |account_id, amount| Entry {
            id: Uuid::new_v4(),
            account_id,
            amount,
            created_at: now,
        };
        let result = TransferResult {
            transfer: Transfer {
                id: Uuid::new_v4(),
                from_account_id: from,
                to_account_id: to,
                amount: Decimal::new(1000, 2),
                created_at: now,
            },
            from_account: account(from),
            to_account: account(to),
            from_entry: entry(from, Decimal::new(-1000, 2)),
            to_entry: entry(to, Decimal::new(1000, 2)),
        };

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["from_account"]["id"], from.to_string());
        assert_eq!(json["to_account"]["id"], to.to_string());
        // serde-with-str keeps money exact on the wire
        assert_eq!(json["transfer"]["amount"], "10.00");
        assert_eq!(json["from_entry"]["amount"], "-10.00");
    }
}
