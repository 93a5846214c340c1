//! Ledger module
//!
//! The balance/transaction store credited when an ad session verifies.
//! Credits are idempotent on their reference string.

mod memory;
mod postgres;

use async_trait::async_trait;

use crate::db::{Money, UserId};
use crate::error::LedgerError;

pub use memory::MemoryLedger;
pub use postgres::PgLedger;

/// Result of a credit call that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Credit {
    Applied,
    /// The reference was already booked; nothing changed.
    AlreadyApplied,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Ledger: Send + Sync {
    async fn credit(
        &self,
        user_id: UserId,
        amount: Money,
        reference: &str,
    ) -> Result<Credit, LedgerError>;

    async fn balance(&self, user_id: UserId) -> Result<Money, LedgerError>;
}
