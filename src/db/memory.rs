use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::db::models::{Account, AdSession, UserId};
use crate::db::AdStore;
use crate::error::{AppError, DatabaseError};
use crate::Result;

#[derive(Debug, Default)]
struct Tables {
    accounts: HashMap<UserId, Account>,
    sessions: HashMap<String, AdSession>,
}

/// Process-local store. Sessions do not survive a restart.
///
/// Accounts and sessions sit behind one lock so that quota charging and
/// session insertion are observed together.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn session_count(&self) -> usize {
        self.tables.read().await.sessions.len()
    }
}

#[async_trait]
impl AdStore for MemoryStore {
    async fn find_account(&self, user_id: UserId) -> Result<Option<Account>> {
        Ok(self.tables.read().await.accounts.get(&user_id).cloned())
    }

    async fn upsert_account(&self, user_id: UserId, now: DateTime<Utc>) -> Result<Account> {
        let mut tables = self.tables.write().await;
        let account = tables
            .accounts
            .entry(user_id)
            .or_insert_with(|| Account::new(user_id, now));
        Ok(account.clone())
    }

    async fn set_account_status(&self, user_id: UserId, status: &str) -> Result<bool> {
        let mut tables = self.tables.write().await;
        match tables.accounts.get_mut(&user_id) {
            Some(account) => {
                account.status = status.to_string();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn create_session(
        &self,
        session: &AdSession,
        today: NaiveDate,
        daily_max: i32,
    ) -> Result<bool> {
        let mut tables = self.tables.write().await;

        if tables.sessions.contains_key(&session.session_id) {
            return Err(AppError::DatabaseError(DatabaseError::Duplicate));
        }

        let account = tables
            .accounts
            .get_mut(&session.user_id)
            .ok_or(AppError::DatabaseError(DatabaseError::NotFound))?;

        if account.ads_on(today) >= daily_max {
            return Ok(false);
        }

        account.ads_today = account.ads_on(today) + 1;
        account.last_reset_date = today;
        account.last_ad_at = Some(session.created_at);
        account.total_ads_watched += 1;

        tables.sessions.insert(session.session_id.clone(), session.clone());
        Ok(true)
    }

    async fn find_session(&self, session_id: &str, user_id: UserId) -> Result<Option<AdSession>> {
        let tables = self.tables.read().await;
        Ok(tables
            .sessions
            .get(session_id)
            .filter(|session| session.user_id == user_id)
            .cloned())
    }

    async fn start_timer(
        &self,
        session_id: &str,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let mut tables = self.tables.write().await;
        match tables.sessions.get_mut(session_id) {
            Some(session) if session.user_id == user_id && !session.timer_started => {
                session.timer_started = true;
                session.timer_start_time = Some(now);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn claim_reward(&self, session_id: &str, verified_at: DateTime<Utc>) -> Result<bool> {
        let mut tables = self.tables.write().await;
        match tables.sessions.get_mut(session_id) {
            Some(session) if !session.reward_given && session.timer_started => {
                session.completed = true;
                session.reward_given = true;
                session.dwell_seconds = session.dwell_at(verified_at);
                session.verified_at = Some(verified_at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release_reward(&self, session_id: &str) -> Result<()> {
        let mut tables = self.tables.write().await;
        if let Some(session) = tables.sessions.get_mut(session_id) {
            session.completed = false;
            session.reward_given = false;
            session.verified_at = None;
            session.dwell_seconds = None;
        }
        Ok(())
    }

    async fn delete_unrewarded(&self, session_id: &str) -> Result<bool> {
        let mut tables = self.tables.write().await;
        let unrewarded = tables
            .sessions
            .get(session_id)
            .map_or(false, |session| !session.reward_given);
        if unrewarded {
            tables.sessions.remove(session_id);
        }
        Ok(unrewarded)
    }

    async fn purge_expired(
        &self,
        stale_before: DateTime<Utc>,
        audit_before: DateTime<Utc>,
    ) -> Result<u64> {
        let mut tables = self.tables.write().await;
        let before = tables.sessions.len();
        tables.sessions.retain(|_, session| {
            let cutoff = if session.reward_given { audit_before } else { stale_before };
            session.valid_until >= cutoff
        });
        Ok((before - tables.sessions.len()) as u64)
    }

    async fn reset_daily_counts(&self, today: NaiveDate) -> Result<u64> {
        let mut tables = self.tables.write().await;
        let mut reset = 0;
        for account in tables.accounts.values_mut() {
            if account.last_reset_date < today {
                account.ads_today = 0;
                account.last_reset_date = today;
                reset += 1;
            }
        }
        Ok(reset)
    }
}
