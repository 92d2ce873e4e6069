//! Ledger Storage
//!
//! Durable tables for accounts, entries and transfers, exposed through two
//! traits:
//!
//! - [`Queries`]: the row-level operations. Always invoked on a
//!   transaction-scoped handle so every call joins the same transaction.
//! - [`LedgerStore`]: hands out transactions ([`StoreTx`]).
//!
//! # Balance invariant
//!
//! Balances change only through [`Queries::add_account_balance`], a single
//! atomic `balance = balance + delta` performed by the storage engine under
//! the row lock. There is deliberately no "set balance" or "select for
//! update" operation: a read-then-write path would reopen the lost-update
//! race.
//!
//! # Backends
//!
//! - [`postgres::PgLedgerStore`]: PostgreSQL via `sqlx`, READ COMMITTED.
//! - [`memory::MemoryLedgerStore`]: in-process tables with per-row async
//!   locks held until commit, used by tests and the demo binary.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod unit_of_work;

pub use error::LedgerError;
pub use memory::{FailPoint, MemoryLedgerStore};
pub use postgres::PgLedgerStore;
pub use unit_of_work::{TxContext, run_in_transaction};

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::models::{
    Account, AccountId, AddAccountBalanceParams, CreateAccountParams, CreateEntryParams,
    CreateTransferParams, Entry, EntryId, ListAccountsParams, ListEntriesParams, Transfer,
    TransferId,
};
use crate::money::check_scale;

pub type Result<T> = std::result::Result<T, LedgerError>;

/// Money columns are `NUMERIC(20, 2)`: anything finer would be rounded on
/// assignment, so both backends reject it instead.
pub(crate) fn check_money_scale(column: &str, amount: Decimal) -> Result<()> {
    check_scale(amount).map(|_| ()).map_err(|e| {
        LedgerError::storage(format!(
            "numeric value rejected for {}: {} ({})",
            column, amount, e
        ))
    })
}

/// Row-level ledger operations bound to one transaction.
#[async_trait]
pub trait Queries: Send {
    // === Accounts ===

    async fn create_account(&mut self, params: CreateAccountParams) -> Result<Account>;

    async fn get_account(&mut self, id: AccountId) -> Result<Account>;

    /// Accounts of one owner, oldest first
    async fn list_accounts(&mut self, params: ListAccountsParams) -> Result<Vec<Account>>;

    /// Fails with `Storage` if the account already has entries or transfers
    async fn delete_account(&mut self, id: AccountId) -> Result<()>;

    /// Atomically add `params.amount` (signed) to the balance and return the
    /// updated row. Takes the row lock until the transaction ends.
    async fn add_account_balance(&mut self, params: AddAccountBalanceParams) -> Result<Account>;

    // === Entries ===

    async fn create_entry(&mut self, params: CreateEntryParams) -> Result<Entry>;

    async fn get_entry(&mut self, id: EntryId) -> Result<Entry>;

    /// Entries of one account, oldest first
    async fn list_entries(&mut self, params: ListEntriesParams) -> Result<Vec<Entry>>;

    // === Transfers ===

    async fn create_transfer(&mut self, params: CreateTransferParams) -> Result<Transfer>;

    async fn get_transfer(&mut self, id: TransferId) -> Result<Transfer>;
}

/// An open transaction. Dropping it without `commit` rolls it back.
#[async_trait]
pub trait StoreTx: Queries {
    /// Handle passed to unit-of-work closures
    fn queries(&mut self) -> &mut dyn Queries;

    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// Source of transactions.
///
/// The provided methods are auto-committing conveniences for callers and
/// tests; the transfer engine always works inside its own unit of work.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Begin a transaction at the store's default isolation level
    /// (at least READ COMMITTED).
    async fn begin(&self) -> Result<Box<dyn StoreTx>>;

    async fn create_account(&self, params: CreateAccountParams) -> Result<Account> {
        run_in_transaction(self, &TxContext::background(), move |q| {
            q.create_account(params)
        })
        .await
    }

    async fn get_account(&self, id: AccountId) -> Result<Account> {
        run_in_transaction(self, &TxContext::background(), move |q| q.get_account(id)).await
    }

    async fn get_entry(&self, id: EntryId) -> Result<Entry> {
        run_in_transaction(self, &TxContext::background(), move |q| q.get_entry(id)).await
    }

    async fn get_transfer(&self, id: TransferId) -> Result<Transfer> {
        run_in_transaction(self, &TxContext::background(), move |q| q.get_transfer(id)).await
    }

    async fn list_accounts(&self, params: ListAccountsParams) -> Result<Vec<Account>> {
        run_in_transaction(self, &TxContext::background(), move |q| {
            q.list_accounts(params)
        })
        .await
    }

    async fn list_entries(&self, params: ListEntriesParams) -> Result<Vec<Entry>> {
        run_in_transaction(self, &TxContext::background(), move |q| {
            q.list_entries(params)
        })
        .await
    }
}
