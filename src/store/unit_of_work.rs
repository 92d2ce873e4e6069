//! Unit-of-Work Executor
//!
//! Runs a closure against a transaction-scoped [`Queries`] handle and turns
//! its outcome into exactly one commit or one rollback.
//!
//! ```text
//! begin ──▶ work(q) ──Ok──▶ commit ──▶ Ok(T)
//!              │                  └──Err──▶ Storage
//!              └──Err/cancel──▶ rollback ──Ok──▶ original error
//!                                       └──Err──▶ RollbackFailed{original, cause}
//! ```
//!
//! The transaction scope is an explicit value handed to the closure, never
//! ambient state, so concurrent units of work cannot observe each other's
//! handles.

use std::future::Future;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use super::{LedgerError, LedgerStore, Queries, Result};

/// Cancellation signal and optional deadline for one unit of work.
///
/// Every step of [`run_in_transaction`] (begin and each await point inside
/// the work closure) races against both; the first to fire wins.
#[derive(Debug, Clone, Default)]
pub struct TxContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl TxContext {
    /// Never cancelled, no deadline
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_cancel(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            deadline: None,
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::background().deadline_in(timeout)
    }

    /// Sets (or tightens) the deadline to `now + timeout`
    pub fn deadline_in(mut self, timeout: Duration) -> Self {
        let deadline = Instant::now() + timeout;
        self.deadline = Some(match self.deadline {
            Some(existing) if existing < deadline => existing,
            _ => deadline,
        });
        self
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Fails fast if already cancelled or past the deadline
    pub fn check(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(LedgerError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(LedgerError::DeadlineExceeded),
            _ => Ok(()),
        }
    }

    /// Drive `fut` unless cancellation or the deadline fires first, in which
    /// case `fut` is dropped mid-flight.
    pub async fn run<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.check()?;
        let expired = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(LedgerError::Cancelled),
            _ = expired => Err(LedgerError::DeadlineExceeded),
            res = fut => res,
        }
    }
}

/// Execute `work` inside one transaction of `store`.
///
/// - `work` fails (or `ctx` fires): rollback, then return the original
///   error; a failing rollback yields [`LedgerError::RollbackFailed`].
/// - `work` succeeds: commit; a failing commit yields
///   [`LedgerError::Storage`]. Commit is not raced against `ctx`.
pub async fn run_in_transaction<S, T, F>(store: &S, ctx: &TxContext, work: F) -> Result<T>
where
    S: LedgerStore + ?Sized,
    T: Send,
    F: for<'q> FnOnce(&'q mut dyn Queries) -> BoxFuture<'q, Result<T>> + Send,
{
    let mut tx = ctx.run(store.begin()).await?;
    debug!("transaction started");

    // The work future borrows `tx`; it is dropped (cancelling any in-flight
    // storage call) before the rollback below takes ownership.
    let outcome = ctx.run(work(tx.queries())).await;

    match outcome {
        Ok(value) => {
            tx.commit().await.map_err(|e| match e {
                LedgerError::Storage(_) => e,
                other => LedgerError::storage(format!("commit failed: {}", other)),
            })?;
            debug!("transaction committed");
            Ok(value)
        }
        Err(err) => match tx.rollback().await {
            Ok(()) => {
                debug!(error = %err, "transaction rolled back");
                Err(err)
            }
            Err(rollback_err) => {
                error!(
                    error = %err,
                    rollback_error = %rollback_err,
                    "Rollback failed - storage state must be verified"
                );
                Err(LedgerError::RollbackFailed {
                    original: Box::new(err),
                    cause: rollback_err.to_string(),
                })
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AddAccountBalanceParams, CreateAccountParams, ListEntriesParams};
    use crate::store::{FailPoint, MemoryLedgerStore};
    use rust_decimal::Decimal;

    async fn store_with_account(balance: i64) -> (MemoryLedgerStore, uuid::Uuid) {
        let store = MemoryLedgerStore::new();
        let account = store
            .create_account(CreateAccountParams {
                owner: "owner".to_string(),
                currency: "USD".to_string(),
                balance: Decimal::from(balance),
            })
            .await
            .unwrap();
        (store, account.id)
    }

    #[tokio::test]
    async fn test_commit_makes_writes_visible() {
        let (store, id) = store_with_account(100).await;

        let updated = run_in_transaction(&store, &TxContext::background(), move |q| {
            q.add_account_balance(AddAccountBalanceParams {
                id,
                amount: Decimal::from(-30),
            })
        })
        .await
        .unwrap();

        assert_eq!(updated.balance, Decimal::from(70));
        assert_eq!(store.get_account(id).await.unwrap().balance, Decimal::from(70));
    }

    #[tokio::test]
    async fn test_error_rolls_back_and_propagates_original() {
        let (store, id) = store_with_account(100).await;

        let result: Result<()> = run_in_transaction(&store, &TxContext::background(), move |q| {
            Box::pin(async move {
                q.add_account_balance(AddAccountBalanceParams {
                    id,
                    amount: Decimal::from(5),
                })
                .await?;
                q.get_account(uuid::Uuid::new_v4()).await?;
                Ok(())
            })
        })
        .await;

        assert!(matches!(result, Err(LedgerError::NotFound { .. })));
        assert_eq!(store.get_account(id).await.unwrap().balance, Decimal::from(100));
    }

    #[tokio::test]
    async fn test_rollback_failure_reports_both_errors() {
        let (store, id) = store_with_account(100).await;
        store.fail_at(FailPoint::AddAccountBalance, 1);
        store.fail_at(FailPoint::Rollback, 1);

        let result = run_in_transaction(&store, &TxContext::background(), move |q| {
            q.add_account_balance(AddAccountBalanceParams {
                id,
                amount: Decimal::from(5),
            })
        })
        .await;

        match result {
            Err(LedgerError::RollbackFailed { original, cause }) => {
                assert!(matches!(*original, LedgerError::Storage(_)));
                assert!(cause.contains("rollback"));
            }
            other => panic!("expected RollbackFailed, got {:?}", other),
        }
        // Even a failed rollback must not publish the write
        assert_eq!(store.get_account(id).await.unwrap().balance, Decimal::from(100));
    }

    #[tokio::test]
    async fn test_commit_failure_is_storage_failure() {
        let (store, id) = store_with_account(100).await;
        store.fail_at(FailPoint::Commit, 1);

        let result = run_in_transaction(&store, &TxContext::background(), move |q| {
            q.create_entry(crate::models::CreateEntryParams {
                account_id: id,
                amount: Decimal::from(1),
            })
        })
        .await;

        assert!(matches!(result, Err(LedgerError::Storage(_))));
        let entries = store
            .list_entries(ListEntriesParams::first(id, 10))
            .await
            .unwrap();
        assert!(entries.is_empty());
    }

    #[tokio::test]
    async fn test_already_cancelled_context_never_begins() {
        let (store, _) = store_with_account(100).await;
        let ctx = TxContext::with_cancel(CancellationToken::new());
        ctx.cancel_token().cancel();

        let result = run_in_transaction(&store, &ctx, |q| q.get_account(uuid::Uuid::new_v4())).await;
        assert_eq!(result, Err(LedgerError::Cancelled));
    }

    #[tokio::test]
    async fn test_deadline_interrupts_blocked_work_and_rolls_back() {
        let (store, id) = store_with_account(100).await;

        // Another transaction holds the row lock
        let mut blocker = store.begin().await.unwrap();
        blocker
            .add_account_balance(AddAccountBalanceParams {
                id,
                amount: Decimal::from(1),
            })
            .await
            .unwrap();

        let ctx = TxContext::with_timeout(Duration::from_millis(50));
        let result = run_in_transaction(&store, &ctx, move |q| {
            Box::pin(async move {
                q.create_entry(crate::models::CreateEntryParams {
                    account_id: id,
                    amount: Decimal::from(2),
                })
                .await?;
                q.add_account_balance(AddAccountBalanceParams {
                    id,
                    amount: Decimal::from(2),
                })
                .await
            })
        })
        .await;
        assert_eq!(result, Err(LedgerError::DeadlineExceeded));

        blocker.rollback().await.unwrap();
        assert_eq!(store.get_account(id).await.unwrap().balance, Decimal::from(100));
        assert!(
            store
                .list_entries(ListEntriesParams::first(id, 10))
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn test_deadline_in_keeps_earliest() {
        let ctx = TxContext::with_timeout(Duration::from_millis(10));
        let first = ctx.deadline().unwrap();
        let ctx = ctx.deadline_in(Duration::from_secs(60));
        assert_eq!(ctx.deadline(), Some(first));
    }
}
