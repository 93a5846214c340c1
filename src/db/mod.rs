//! Database module for the ad-watch server
//!
//! This module holds the persisted rows (accounts, ad sessions, ledger
//! entries) and the `AdStore` seam with its PostgreSQL and in-memory
//! implementations.

pub mod memory;
pub mod models;
pub mod operations;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::Result;

pub use memory::MemoryStore;
pub use models::{Account, AdSession, LedgerEntry, Money, UserId, STATUS_ACTIVE};
pub use operations::PgStore;

/// Durable source of truth for accounts and ad sessions.
///
/// Every method that decides a state transition does so with a single
/// conditional write, so concurrent callers on the same session cannot both
/// win.
#[async_trait]
pub trait AdStore: Send + Sync {
    async fn find_account(&self, user_id: UserId) -> Result<Option<Account>>;

    /// Returns the existing account or creates an active one.
    async fn upsert_account(&self, user_id: UserId, now: DateTime<Utc>) -> Result<Account>;

    async fn set_account_status(&self, user_id: UserId, status: &str) -> Result<bool>;

    /// Inserts `session` and charges it to the owner's daily quota in one
    /// atomic write. Returns `false` without writing anything when the owner
    /// already reached `daily_max` for `today`.
    async fn create_session(
        &self,
        session: &AdSession,
        today: NaiveDate,
        daily_max: i32,
    ) -> Result<bool>;

    async fn find_session(&self, session_id: &str, user_id: UserId) -> Result<Option<AdSession>>;

    /// One-shot `timer_started = false -> true`.
    async fn start_timer(
        &self,
        session_id: &str,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<bool>;

    /// Compare-and-set of `reward_given` (and `completed`) from false to
    /// true. The same write records `verified_at` and the dwell measured from
    /// `timer_start_time`.
    async fn claim_reward(&self, session_id: &str, verified_at: DateTime<Utc>) -> Result<bool>;

    /// Undoes a claim whose ledger credit failed, clearing the verify record.
    async fn release_reward(&self, session_id: &str) -> Result<()>;

    /// Deletes the session unless its reward has been claimed. Returns
    /// `false` when no row matched, either because it is gone or because it
    /// is rewarded.
    async fn delete_unrewarded(&self, session_id: &str) -> Result<bool>;

    /// Deletes unrewarded sessions with `valid_until < stale_before` and
    /// rewarded sessions with `valid_until < audit_before`.
    async fn purge_expired(
        &self,
        stale_before: DateTime<Utc>,
        audit_before: DateTime<Utc>,
    ) -> Result<u64>;

    async fn reset_daily_counts(&self, today: NaiveDate) -> Result<u64>;
}
