//! Transfer Transaction Engine
//!
//! Moves money between two accounts atomically: one transfer record, a
//! debit and a credit entry, and two balance deltas, all in a single unit of
//! work.
//!
//! # Safety Invariants
//!
//! 1. **All-or-nothing**: the five writes commit together or not at all
//! 2. **Canonical lock order**: balance rows are always mutated lower UUID
//!    first, so opposite-direction transfers cannot deadlock
//! 3. **Atomic deltas only**: balances are never read-then-written
//! 4. **Logical roles**: `from_account` / `to_account` in the result follow
//!    the request, not the locking order
//! 5. **No dedup, no retry**: idempotency keys and deadlock retries belong
//!    to the caller

pub mod engine;
pub mod error;
pub mod state;


// Re-exports for convenience
pub use engine::{TransferEngine, lock_order};
pub use error::TransferError;
pub use state::TransferState;
