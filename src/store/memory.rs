//! In-memory ledger storage
//!
//! Mirrors the PostgreSQL store's transactional behaviour closely enough for
//! the engine's concurrency properties to be tested without a database:
//!
//! - **Row locks**: one async mutex per account. `add_account_balance` and
//!   `delete_account` take it and hold it until the transaction ends, like
//!   `UPDATE` does in PostgreSQL. Waiting is bounded by `lock_timeout`,
//!   after which the call fails with `Storage` (the stand-in for the lock
//!   timeout / deadlock detector).
//! - **Read committed**: writes are buffered in the transaction and published
//!   in one step at commit; other transactions only ever see committed rows.
//! - **Fault injection**: [`MemoryLedgerStore::fail_at`] arms a one-shot
//!   failure at a named operation.
//!
//! The shared tables sit behind a std mutex that is never held across an
//! await point.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::{Mutex as RowLock, OwnedMutexGuard};
use tracing::warn;
use uuid::Uuid;

use super::{LedgerError, LedgerStore, Queries, Result, StoreTx, check_money_scale};
use crate::models::{
    Account, AccountId, AddAccountBalanceParams, CreateAccountParams, CreateEntryParams,
    CreateTransferParams, Entry, EntryId, ListAccountsParams, ListEntriesParams, Transfer,
    TransferId,
};

/// Default bound on waiting for a row lock
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Operations that can be made to fail on demand
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPoint {
    CreateTransfer,
    CreateEntry,
    AddAccountBalance,
    Commit,
    Rollback,
}

impl fmt::Display for FailPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailPoint::CreateTransfer => "create_transfer",
            FailPoint::CreateEntry => "create_entry",
            FailPoint::AddAccountBalance => "add_account_balance",
            FailPoint::Commit => "commit",
            FailPoint::Rollback => "rollback",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
struct ArmedFault {
    point: FailPoint,
    remaining: usize,
}

#[derive(Default)]
struct Tables {
    accounts: HashMap<AccountId, Account>,
    row_locks: HashMap<AccountId, Arc<RowLock<()>>>,
    entries: Vec<Entry>,
    transfers: Vec<Transfer>,
}

impl Tables {
    fn has_history(&self, id: AccountId) -> bool {
        self.entries.iter().any(|e| e.account_id == id)
            || self
                .transfers
                .iter()
                .any(|t| t.from_account_id == id || t.to_account_id == id)
    }
}

struct Inner {
    tables: Mutex<Tables>,
    faults: Mutex<Vec<ArmedFault>>,
    lock_timeout: Duration,
}

impl Inner {
    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Consume one call of `point`; fails when an armed fault reaches zero.
    fn trip(&self, point: FailPoint) -> Result<()> {
        let mut faults = self.faults.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(pos) = faults.iter().position(|f| f.point == point) {
            faults[pos].remaining -= 1;
            if faults[pos].remaining == 0 {
                faults.remove(pos);
                return Err(LedgerError::storage(format!("injected failure at {}", point)));
            }
        }
        Ok(())
    }
}

/// In-memory ledger store. Cloning shares the same tables.
#[derive(Clone)]
pub struct MemoryLedgerStore {
    inner: Arc<Inner>,
}

impl Default for MemoryLedgerStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::with_lock_timeout(DEFAULT_LOCK_TIMEOUT)
    }

    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                tables: Mutex::new(Tables::default()),
                faults: Mutex::new(Vec::new()),
                lock_timeout,
            }),
        }
    }

    /// Make the `nth` next call (1-based) of `point` fail once with `Storage`
    pub fn fail_at(&self, point: FailPoint, nth: usize) {
        let mut faults = self
            .inner
            .faults
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        faults.push(ArmedFault {
            point,
            remaining: nth.max(1),
        });
    }

    /// Committed transfers in insertion order
    pub fn transfers(&self) -> Vec<Transfer> {
        self.inner.tables().transfers.clone()
    }

    /// Committed entries in insertion order
    pub fn entries(&self) -> Vec<Entry> {
        self.inner.tables().entries.clone()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>> {
        Ok(Box::new(MemoryTx {
            inner: Arc::clone(&self.inner),
            locks: HashMap::new(),
            accounts: HashMap::new(),
            new_accounts: HashSet::new(),
            deleted: HashSet::new(),
            entries: Vec::new(),
            transfers: Vec::new(),
        }))
    }
}

/// One open transaction: held row locks plus buffered writes.
struct MemoryTx {
    inner: Arc<Inner>,
    locks: HashMap<AccountId, OwnedMutexGuard<()>>,
    /// Created or updated rows, visible only to this transaction
    accounts: HashMap<AccountId, Account>,
    new_accounts: HashSet<AccountId>,
    deleted: HashSet<AccountId>,
    entries: Vec<Entry>,
    transfers: Vec<Transfer>,
}

impl MemoryTx {
    /// Row as seen by this transaction (own writes first, then committed)
    fn visible_account(&self, id: AccountId) -> Result<Account> {
        if self.deleted.contains(&id) {
            return Err(LedgerError::not_found("account", id));
        }
        if let Some(account) = self.accounts.get(&id) {
            return Ok(account.clone());
        }
        self.inner
            .tables()
            .accounts
            .get(&id)
            .cloned()
            .ok_or_else(|| LedgerError::not_found("account", id))
    }

    /// Take the row lock of a committed account, waiting at most
    /// `lock_timeout`. No-op for rows this transaction created or already
    /// locked.
    async fn lock_row(&mut self, id: AccountId) -> Result<()> {
        if self.locks.contains_key(&id) || self.new_accounts.contains(&id) {
            return Ok(());
        }
        let lock = self
            .inner
            .tables()
            .row_locks
            .get(&id)
            .cloned()
            .ok_or_else(|| LedgerError::not_found("account", id))?;

        match tokio::time::timeout(self.inner.lock_timeout, lock.lock_owned()).await {
            Ok(guard) => {
                self.locks.insert(id, guard);
                Ok(())
            }
            Err(_) => {
                warn!(account_id = %id, timeout = ?self.inner.lock_timeout, "Row lock wait timed out");
                Err(LedgerError::storage(format!(
                    "lock timeout: account {} is locked by another transaction",
                    id
                )))
            }
        }
    }
}

/// Converts a LIMIT/OFFSET pair the way PostgreSQL validates it
fn page_bounds(limit: i64, offset: i64) -> Result<(usize, usize)> {
    let limit = usize::try_from(limit)
        .map_err(|_| LedgerError::storage("LIMIT must not be negative"))?;
    let offset = usize::try_from(offset)
        .map_err(|_| LedgerError::storage("OFFSET must not be negative"))?;
    Ok((limit, offset))
}

#[async_trait]
impl Queries for MemoryTx {
    async fn create_account(&mut self, params: CreateAccountParams) -> Result<Account> {
        check_money_scale("accounts.balance", params.balance)?;
        let account = Account {
            id: Uuid::new_v4(),
            owner: params.owner,
            currency: params.currency,
            balance: params.balance,
            created_at: Utc::now(),
        };
        self.new_accounts.insert(account.id);
        self.accounts.insert(account.id, account.clone());
        Ok(account)
    }

    async fn get_account(&mut self, id: AccountId) -> Result<Account> {
        self.visible_account(id)
    }

    async fn list_accounts(&mut self, params: ListAccountsParams) -> Result<Vec<Account>> {
        let (limit, offset) = page_bounds(params.limit, params.offset)?;
        let mut rows: HashMap<AccountId, Account> = self
            .inner
            .tables()
            .accounts
            .values()
            .filter(|a| a.owner == params.owner)
            .map(|a| (a.id, a.clone()))
            .collect();
        for account in self.accounts.values().filter(|a| a.owner == params.owner) {
            rows.insert(account.id, account.clone());
        }
        let mut rows: Vec<Account> = rows
            .into_values()
            .filter(|a| !self.deleted.contains(&a.id))
            .collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(rows.into_iter().skip(offset).take(limit).collect())
    }

    async fn delete_account(&mut self, id: AccountId) -> Result<()> {
        self.visible_account(id)?;
        self.lock_row(id).await?;

        let referenced = self.inner.tables().has_history(id)
            || self.entries.iter().any(|e| e.account_id == id)
            || self
                .transfers
                .iter()
                .any(|t| t.from_account_id == id || t.to_account_id == id);
        if referenced {
            return Err(LedgerError::storage(format!(
                "foreign key violation: account {} is still referenced by ledger rows",
                id
            )));
        }

        self.accounts.remove(&id);
        if !self.new_accounts.remove(&id) {
            self.deleted.insert(id);
        }
        Ok(())
    }

    async fn add_account_balance(&mut self, params: AddAccountBalanceParams) -> Result<Account> {
        self.inner.trip(FailPoint::AddAccountBalance)?;
        check_money_scale("accounts.balance", params.amount)?;
        self.visible_account(params.id)?;
        self.lock_row(params.id).await?;

        // Re-read under the lock: the committed row may have moved while we waited
        let mut account = self.visible_account(params.id)?;
        account.balance = account
            .balance
            .checked_add(params.amount)
            .ok_or_else(|| LedgerError::storage("numeric field overflow"))?;
        self.accounts.insert(account.id, account.clone());
        Ok(account)
    }

    async fn create_entry(&mut self, params: CreateEntryParams) -> Result<Entry> {
        self.inner.trip(FailPoint::CreateEntry)?;
        check_money_scale("entries.amount", params.amount)?;
        self.visible_account(params.account_id)?;

        let entry = Entry {
            id: Uuid::new_v4(),
            account_id: params.account_id,
            amount: params.amount,
            created_at: Utc::now(),
        };
        self.entries.push(entry.clone());
        Ok(entry)
    }

    async fn get_entry(&mut self, id: EntryId) -> Result<Entry> {
        if let Some(entry) = self.entries.iter().find(|e| e.id == id) {
            return Ok(entry.clone());
        }
        self.inner
            .tables()
            .entries
            .iter()
            .find(|e| e.id == id)
            .cloned()
            .ok_or_else(|| LedgerError::not_found("entry", id))
    }

    async fn list_entries(&mut self, params: ListEntriesParams) -> Result<Vec<Entry>> {
        let (limit, offset) = page_bounds(params.limit, params.offset)?;
        let mut rows: Vec<Entry> = self
            .inner
            .tables()
            .entries
            .iter()
            .chain(self.entries.iter())
            .filter(|e| e.account_id == params.account_id)
            .cloned()
            .collect();
        // Stable: ties keep insertion order
        rows.sort_by_key(|e| e.created_at);
        Ok(rows.into_iter().skip(offset).take(limit).collect())
    }

    async fn create_transfer(&mut self, params: CreateTransferParams) -> Result<Transfer> {
        self.inner.trip(FailPoint::CreateTransfer)?;
        if params.amount <= Decimal::ZERO {
            return Err(LedgerError::storage(
                "check constraint violation: transfer amount must be positive",
            ));
        }
        check_money_scale("transfers.amount", params.amount)?;
        self.visible_account(params.from_account_id)?;
        self.visible_account(params.to_account_id)?;

        let transfer = Transfer {
            id: Uuid::new_v4(),
            from_account_id: params.from_account_id,
            to_account_id: params.to_account_id,
            amount: params.amount,
            created_at: Utc::now(),
        };
        self.transfers.push(transfer.clone());
        Ok(transfer)
    }

    async fn get_transfer(&mut self, id: TransferId) -> Result<Transfer> {
        if let Some(transfer) = self.transfers.iter().find(|t| t.id == id) {
            return Ok(transfer.clone());
        }
        self.inner
            .tables()
            .transfers
            .iter()
            .find(|t| t.id == id)
            .cloned()
            .ok_or_else(|| LedgerError::not_found("transfer", id))
    }
}

#[async_trait]
impl StoreTx for MemoryTx {
    fn queries(&mut self) -> &mut dyn Queries {
        self
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.inner
            .trip(FailPoint::Commit)
            .map_err(|e| LedgerError::storage(format!("commit failed: {}", e)))?;

        let MemoryTx {
            inner,
            locks,
            accounts,
            new_accounts,
            deleted,
            entries,
            transfers,
        } = *self;

        {
            let mut tables = inner.tables();
            for id in &deleted {
                tables.accounts.remove(id);
                tables.row_locks.remove(id);
            }
            for id in new_accounts {
                tables.row_locks.insert(id, Arc::new(RowLock::new(())));
            }
            tables.accounts.extend(accounts);
            tables.entries.extend(entries);
            tables.transfers.extend(transfers);
        }

        // Row locks are released only after the writes are published
        drop(locks);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        // Buffered writes and row locks are discarded on drop either way
        self.inner.trip(FailPoint::Rollback)
    }
}
