//! Transfer Transaction Engine
//!
//! One transfer = five storage operations inside one unit of work:
//!
//! ```text
//! 1. create_transfer(from, to, amount)
//! 2. create_entry(from, -amount)
//! 3. create_entry(to,   +amount)
//! 4. add_account_balance(lower id,  delta)   ─┐ lock order: UUID byte order,
//! 5. add_account_balance(higher id, delta)   ─┘ independent of from/to
//! ```
//!
//! # Deadlock avoidance
//!
//! Two concurrent transfers between the same pair of accounts in opposite
//! directions both lock the lower-ordered row first, so neither can hold
//! one row while waiting for the other's. Without this, A→B locks A then B
//! while B→A locks B then A, a circular wait.
//!
//! # Failure semantics
//!
//! Any failing step aborts the whole unit of work and the error is wrapped
//! in [`TransferError::Execution`]. No internal retry. The engine does not
//! log; the executor and stores do.

use std::cmp::Ordering;
use std::sync::Arc;

use rust_decimal::Decimal;

use super::error::TransferError;
use crate::models::{
    Account, AccountId, AddAccountBalanceParams, CreateEntryParams, CreateTransferParams,
    TransferParams, TransferResult,
};
use crate::money::validate_amount;
use crate::store::{LedgerStore, Queries, TxContext, run_in_transaction};

/// Total order used to acquire balance row locks.
///
/// Byte order of the UUID, which equals the lexicographic order of its
/// canonical lowercase string form.
pub fn lock_order(a: &AccountId, b: &AccountId) -> Ordering {
    a.as_bytes().cmp(b.as_bytes())
}

/// Executes transfers against a [`LedgerStore`]. Cheap to clone and share
/// across tasks.
#[derive(Clone)]
pub struct TransferEngine {
    store: Arc<dyn LedgerStore>,
}

impl TransferEngine {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }

    /// Run one transfer with no deadline and no cancellation.
    pub async fn transfer(&self, params: TransferParams) -> Result<TransferResult, TransferError> {
        self.transfer_with(&TxContext::background(), params).await
    }

    /// Run one transfer, honouring `ctx` at every storage call. On
    /// cancellation the unit of work is rolled back before the error
    /// (`Cancelled` / `DeadlineExceeded`) is returned.
    pub async fn transfer_with(
        &self,
        ctx: &TxContext,
        params: TransferParams,
    ) -> Result<TransferResult, TransferError> {
        validate(&params)?;

        let result = run_in_transaction(self.store.as_ref(), ctx, move |q| {
            Box::pin(async move { execute(q, params).await })
        })
        .await?;

        Ok(result)
    }
}

fn validate(params: &TransferParams) -> Result<(), TransferError> {
    if params.from_account_id == params.to_account_id {
        return Err(TransferError::SameAccount);
    }
    validate_amount(params.amount)?;
    Ok(())
}

async fn execute(
    q: &mut dyn Queries,
    params: TransferParams,
) -> crate::store::Result<TransferResult> {
    let TransferParams {
        from_account_id,
        to_account_id,
        amount,
    } = params;

    let transfer = q
        .create_transfer(CreateTransferParams {
            from_account_id,
            to_account_id,
            amount,
        })
        .await?;

    let from_entry = q
        .create_entry(CreateEntryParams {
            account_id: from_account_id,
            amount: -amount,
        })
        .await?;

    let to_entry = q
        .create_entry(CreateEntryParams {
            account_id: to_account_id,
            amount,
        })
        .await?;

    let (from_account, to_account) = match lock_order(&from_account_id, &to_account_id) {
        Ordering::Less => {
            add_money(q, (from_account_id, -amount), (to_account_id, amount)).await?
        }
        _ => {
            let (to_account, from_account) =
                add_money(q, (to_account_id, amount), (from_account_id, -amount)).await?;
            (from_account, to_account)
        }
    };

    Ok(TransferResult {
        transfer,
        from_account,
        to_account,
        from_entry,
        to_entry,
    })
}

/// Apply two deltas in the given (already lock-ordered) sequence and return
/// the snapshots in the same sequence.
async fn add_money(
    q: &mut dyn Queries,
    (first_id, first_amount): (AccountId, Decimal),
    (second_id, second_amount): (AccountId, Decimal),
) -> crate::store::Result<(Account, Account)> {
    let first = q
        .add_account_balance(AddAccountBalanceParams {
            id: first_id,
            amount: first_amount,
        })
        .await?;
    let second = q
        .add_account_balance(AddAccountBalanceParams {
            id: second_id,
            amount: second_amount,
        })
        .await?;
    Ok((first, second))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CreateAccountParams;
    use crate::store::MemoryLedgerStore;
    use uuid::Uuid;

    async fn setup() -> (TransferEngine, Account, Account) {
        let store = Arc::new(MemoryLedgerStore::new());
        let mut accounts = Vec::new();
        for owner in ["x", "y"] {
            accounts.push(
                store
                    .create_account(CreateAccountParams {
                        owner: owner.to_string(),
                        currency: "USD".to_string(),
                        balance: Decimal::from(500),
                    })
                    .await
                    .unwrap(),
            );
        }
        let y = accounts.pop().unwrap();
        let x = accounts.pop().unwrap();
        (TransferEngine::new(store), x, y)
    }

    #[test]
    fn test_lock_order_matches_string_order() {
        for _ in 0..100 {
            let a = Uuid::new_v4();
            let b = Uuid::new_v4();
            assert_eq!(lock_order(&a, &b), a.to_string().cmp(&b.to_string()));
        }
    }

    #[test]
    fn test_lock_order_is_symmetric() {
        let a = Uuid::from_u128(1);
        let b = Uuid::from_u128(2);
        assert_eq!(lock_order(&a, &b), Ordering::Less);
        assert_eq!(lock_order(&b, &a), Ordering::Greater);
    }

    #[tokio::test]
    async fn test_self_transfer_rejected_before_storage() {
        let (engine, x, _) = setup().await;
        let err = engine
            .transfer(TransferParams::new(x.id, x.id, Decimal::from(10)))
            .await
            .unwrap_err();
        assert_eq!(err, TransferError::SameAccount);
        assert_eq!(
            engine.store().get_account(x.id).await.unwrap().balance,
            Decimal::from(500)
        );
    }

    #[tokio::test]
    async fn test_non_positive_amount_rejected() {
        let (engine, x, y) = setup().await;
        for amount in [Decimal::ZERO, Decimal::from(-10)] {
            let err = engine
                .transfer(TransferParams::new(x.id, y.id, amount))
                .await
                .unwrap_err();
            assert_eq!(err, TransferError::InvalidAmount);
        }
        let err = engine
            .transfer(TransferParams::new(x.id, y.id, Decimal::new(1001, 3)))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "PRECISION_OVERFLOW");
    }

    #[tokio::test]
    async fn test_roles_survive_lock_reordering() {
        let (engine, x, y) = setup().await;
        // Both directions: one of them has to < from in lock order
        for (from, to) in [(&x, &y), (&y, &x)] {
            let result = engine
                .transfer(TransferParams::new(from.id, to.id, Decimal::from(10)))
                .await
                .unwrap();
            assert_eq!(result.from_account.id, from.id);
            assert_eq!(result.to_account.id, to.id);
            assert_eq!(result.from_entry.account_id, from.id);
            assert_eq!(result.to_entry.account_id, to.id);
            assert_eq!(result.from_entry.amount, -result.to_entry.amount);
        }
    }

    #[tokio::test]
    async fn test_missing_account_is_execution_not_found() {
        let (engine, x, _) = setup().await;
        let err = engine
            .transfer(TransferParams::new(x.id, Uuid::new_v4(), Decimal::from(1)))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(err.to_string().starts_with("transfer execution failed: "));
    }
}
