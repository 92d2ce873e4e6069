//! simple_bank - Ledger Transfer Engine
//!
//! Moves money between accounts with double-entry bookkeeping: every
//! transfer writes one transfer record, a debit and a credit entry, and two
//! balance deltas inside a single database transaction.
//!
//! # Modules
//!
//! - [`models`] - Account / Entry / Transfer rows and query parameters
//! - [`money`] - Currencies and amount parsing/validation
//! - [`store`] - Ledger storage traits, unit-of-work executor, backends
//! - [`transfer`] - Transfer transaction engine (lock ordering, roles)
//! - [`db`] - PostgreSQL pool and schema bootstrap
//! - [`config`] - YAML configuration
//! - [`logging`] - tracing subscriber setup
//! - [`random`] - Random fixtures

pub mod config;
pub mod db;
pub mod logging;
pub mod models;
pub mod money;
pub mod random;
pub mod store;
pub mod transfer;

// Convenient re-exports at crate root
pub use models::{
    Account, AccountId, Entry, EntryId, Transfer, TransferId, TransferParams, TransferResult,
};
pub use money::{Currency, MoneyError};
pub use store::{
    FailPoint, LedgerError, LedgerStore, MemoryLedgerStore, PgLedgerStore, Queries, StoreTx,
    TxContext, run_in_transaction,
};
pub use transfer::{TransferEngine, TransferError, TransferState, lock_order};
