//! PostgreSQL ledger storage
//!
//! Each [`StoreTx`] wraps one `sqlx::Transaction` running at PostgreSQL's
//! default READ COMMITTED isolation. The balance delta is a single
//! `UPDATE ... SET balance = balance + $2 ... RETURNING`, so the read-modify-
//! write happens inside the storage engine under the row lock.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::error::sqlstate;
use super::{LedgerError, LedgerStore, Queries, Result, StoreTx, check_money_scale};
use crate::models::{
    Account, AccountId, AddAccountBalanceParams, CreateAccountParams, CreateEntryParams,
    CreateTransferParams, Entry, EntryId, ListAccountsParams, ListEntriesParams, Transfer,
    TransferId,
};

const ACCOUNT_COLUMNS: &str = "id, owner, currency, balance, created_at";
const ENTRY_COLUMNS: &str = "id, account_id, amount, created_at";
const TRANSFER_COLUMNS: &str = "id, from_account_id, to_account_id, amount, created_at";

/// PostgreSQL-backed [`LedgerStore`]
#[derive(Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
    lock_timeout: Option<Duration>,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            lock_timeout: None,
        }
    }

    /// Bound row-lock waits inside every transaction (`SET LOCAL lock_timeout`)
    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = Some(lock_timeout);
        self
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>> {
        let mut tx = self.pool.begin().await?;
        if let Some(timeout) = self.lock_timeout {
            // SET does not accept bind parameters; the value is a formatted integer
            sqlx::query(&format!("SET LOCAL lock_timeout = {}", timeout.as_millis()))
                .execute(&mut *tx)
                .await?;
        }
        Ok(Box::new(PgLedgerTx { tx }))
    }
}

/// One open PostgreSQL transaction. Dropped without commit → rolled back by sqlx.
pub struct PgLedgerTx {
    tx: Transaction<'static, Postgres>,
}

fn is_foreign_key_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.code().as_deref() == Some(sqlstate::FOREIGN_KEY_VIOLATION))
}

/// Insert referencing a missing account → `NotFound`, everything else → default mapping
fn map_insert_error(e: sqlx::Error, account_ids: &[AccountId]) -> LedgerError {
    if is_foreign_key_violation(&e) {
        let ids: Vec<String> = account_ids.iter().map(|id| id.to_string()).collect();
        return LedgerError::not_found("account", ids.join(" or "));
    }
    e.into()
}

#[async_trait]
impl Queries for PgLedgerTx {
    async fn create_account(&mut self, params: CreateAccountParams) -> Result<Account> {
        check_money_scale("accounts.balance", params.balance)?;
        let sql = format!(
            "INSERT INTO accounts (id, owner, currency, balance, created_at)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {ACCOUNT_COLUMNS}"
        );
        let account = sqlx::query_as::<_, Account>(&sql)
            .bind(Uuid::new_v4())
            .bind(&params.owner)
            .bind(&params.currency)
            .bind(params.balance)
            .bind(Utc::now())
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(account)
    }

    async fn get_account(&mut self, id: AccountId) -> Result<Account> {
        let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1");
        sqlx::query_as::<_, Account>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?
            .ok_or_else(|| LedgerError::not_found("account", id))
    }

    async fn list_accounts(&mut self, params: ListAccountsParams) -> Result<Vec<Account>> {
        let sql = format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts
             WHERE owner = $1
             ORDER BY created_at, id
             LIMIT $2 OFFSET $3"
        );
        let accounts = sqlx::query_as::<_, Account>(&sql)
            .bind(&params.owner)
            .bind(params.limit)
            .bind(params.offset)
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(accounts)
    }

    async fn delete_account(&mut self, id: AccountId) -> Result<()> {
        let result = sqlx::query("DELETE FROM accounts WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| {
                if is_foreign_key_violation(&e) {
                    LedgerError::storage(format!(
                        "foreign key violation: account {} is still referenced by ledger rows",
                        id
                    ))
                } else {
                    e.into()
                }
            })?;

        if result.rows_affected() == 0 {
            return Err(LedgerError::not_found("account", id));
        }
        Ok(())
    }

    async fn add_account_balance(&mut self, params: AddAccountBalanceParams) -> Result<Account> {
        check_money_scale("accounts.balance", params.amount)?;
        let sql = format!(
            "UPDATE accounts SET balance = balance + $2
             WHERE id = $1
             RETURNING {ACCOUNT_COLUMNS}"
        );
        sqlx::query_as::<_, Account>(&sql)
            .bind(params.id)
            .bind(params.amount)
            .fetch_optional(&mut *self.tx)
            .await?
            .ok_or_else(|| LedgerError::not_found("account", params.id))
    }

    async fn create_entry(&mut self, params: CreateEntryParams) -> Result<Entry> {
        check_money_scale("entries.amount", params.amount)?;
        let sql = format!(
            "INSERT INTO entries (id, account_id, amount, created_at)
             VALUES ($1, $2, $3, $4)
             RETURNING {ENTRY_COLUMNS}"
        );
        sqlx::query_as::<_, Entry>(&sql)
            .bind(Uuid::new_v4())
            .bind(params.account_id)
            .bind(params.amount)
            .bind(Utc::now())
            .fetch_one(&mut *self.tx)
            .await
            .map_err(|e| map_insert_error(e, &[params.account_id]))
    }

    async fn get_entry(&mut self, id: EntryId) -> Result<Entry> {
        let sql = format!("SELECT {ENTRY_COLUMNS} FROM entries WHERE id = $1");
        sqlx::query_as::<_, Entry>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?
            .ok_or_else(|| LedgerError::not_found("entry", id))
    }

    async fn list_entries(&mut self, params: ListEntriesParams) -> Result<Vec<Entry>> {
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM entries
             WHERE account_id = $1
             ORDER BY created_at, id
             LIMIT $2 OFFSET $3"
        );
        let entries = sqlx::query_as::<_, Entry>(&sql)
            .bind(params.account_id)
            .bind(params.limit)
            .bind(params.offset)
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(entries)
    }

    async fn create_transfer(&mut self, params: CreateTransferParams) -> Result<Transfer> {
        check_money_scale("transfers.amount", params.amount)?;
        let sql = format!(
            "INSERT INTO transfers (id, from_account_id, to_account_id, amount, created_at)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {TRANSFER_COLUMNS}"
        );
        sqlx::query_as::<_, Transfer>(&sql)
            .bind(Uuid::new_v4())
            .bind(params.from_account_id)
            .bind(params.to_account_id)
            .bind(params.amount)
            .bind(Utc::now())
            .fetch_one(&mut *self.tx)
            .await
            .map_err(|e| map_insert_error(e, &[params.from_account_id, params.to_account_id]))
    }

    async fn get_transfer(&mut self, id: TransferId) -> Result<Transfer> {
        let sql = format!("SELECT {TRANSFER_COLUMNS} FROM transfers WHERE id = $1");
        sqlx::query_as::<_, Transfer>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?
            .ok_or_else(|| LedgerError::not_found("transfer", id))
    }
}

#[async_trait]
impl StoreTx for PgLedgerTx {
    fn queries(&mut self) -> &mut dyn Queries {
        self
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx
            .commit()
            .await
            .map_err(|e| LedgerError::storage(format!("commit failed: {}", e)))
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx
            .rollback()
            .await
            .map_err(|e| LedgerError::storage(format!("rollback: {}", e)))
    }
}
