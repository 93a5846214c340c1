use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::db::models::{Account, AdSession, UserId, STATUS_ACTIVE};
use crate::db::AdStore;
use crate::error::{AppError, DatabaseError};
use crate::Result;

const SESSION_COLUMNS: &str = "session_id, user_id, destination, created_at, valid_until, \
     timer_started, timer_start_time, completed, reward_given, reward_cents, verified_at, \
     dwell_seconds";

const ACCOUNT_COLUMNS: &str = "user_id, status, ads_today, last_reset_date, last_ad_at, \
     total_ads_watched, balance_cents, total_earned_cents, created_at";

pub struct PgStore {
    pool: Arc<PgPool>,
}

impl PgStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    pub async fn new_with_options(
        url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(url)
            .await
            .map_err(|e| AppError::DatabaseError(DatabaseError::ConnectionError(e.to_string())))?;

        Ok(Self { pool: Arc::new(pool) })
    }

    pub fn pool(&self) -> Arc<PgPool> {
        self.pool.clone()
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(self.pool.as_ref()).await?;
        info!("Database migrations applied");
        Ok(())
    }

    pub async fn get_pool_status(&self) -> DbPoolStatus {
        let size = self.pool.size();
        let idle = self.pool.num_idle() as u32;

        DbPoolStatus {
            total_connections: size,
            active_connections: size.saturating_sub(idle),
            idle_connections: idle,
        }
    }

    pub async fn begin_transaction(&self) -> Result<Transaction<'_, Postgres>> {
        Ok(self.pool.as_ref().begin().await?)
    }

    async fn charge_quota(
        &self,
        transaction: &mut Transaction<'_, Postgres>,
        session: &AdSession,
        today: NaiveDate,
        daily_max: i32,
    ) -> Result<bool> {
        let exists: Option<(UserId,)> = sqlx::query_as("SELECT user_id FROM accounts WHERE user_id = $1")
            .bind(session.user_id)
            .fetch_optional(&mut **transaction)
            .await?;
        if exists.is_none() {
            return Err(AppError::DatabaseError(DatabaseError::NotFound));
        }

        let result = sqlx::query(
            r#"
            UPDATE accounts
            SET ads_today = CASE WHEN last_reset_date < $2 THEN 1 ELSE ads_today + 1 END,
                last_reset_date = $2,
                last_ad_at = $3,
                total_ads_watched = total_ads_watched + 1
            WHERE user_id = $1
              AND (last_reset_date < $2 OR ads_today < $4)
            "#,
        )
        .bind(session.user_id)
        .bind(today)
        .bind(session.created_at)
        .bind(daily_max)
        .execute(&mut **transaction)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn insert_session(
        &self,
        transaction: &mut Transaction<'_, Postgres>,
        session: &AdSession,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO ad_sessions (
                session_id, user_id, destination, created_at, valid_until,
                timer_started, timer_start_time, completed, reward_given, reward_cents,
                verified_at, dwell_seconds
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(&session.session_id)
        .bind(session.user_id)
        .bind(&session.destination)
        .bind(session.created_at)
        .bind(session.valid_until)
        .bind(session.timer_started)
        .bind(session.timer_start_time)
        .bind(session.completed)
        .bind(session.reward_given)
        .bind(session.reward_cents)
        .bind(session.verified_at)
        .bind(session.dwell_seconds)
        .execute(&mut **transaction)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl AdStore for PgStore {
    async fn find_account(&self, user_id: UserId) -> Result<Option<Account>> {
        let account = sqlx::query_as::<_, Account>(&format!(
            "SELECT {} FROM accounts WHERE user_id = $1",
            ACCOUNT_COLUMNS
        ))
        .bind(user_id)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(account)
    }

    async fn upsert_account(&self, user_id: UserId, now: DateTime<Utc>) -> Result<Account> {
        let account = Account::new(user_id, now);
        // The no-op update makes RETURNING yield the existing row on conflict.
        let account = sqlx::query_as::<_, Account>(&format!(
            r#"
            INSERT INTO accounts (user_id, status, ads_today, last_reset_date, total_ads_watched,
                                  balance_cents, total_earned_cents, created_at)
            VALUES ($1, $2, 0, $3, 0, 0, 0, $4)
            ON CONFLICT (user_id) DO UPDATE SET user_id = EXCLUDED.user_id
            RETURNING {}
            "#,
            ACCOUNT_COLUMNS
        ))
        .bind(account.user_id)
        .bind(STATUS_ACTIVE)
        .bind(account.last_reset_date)
        .bind(account.created_at)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(account)
    }

    async fn set_account_status(&self, user_id: UserId, status: &str) -> Result<bool> {
        let result = sqlx::query("UPDATE accounts SET status = $1 WHERE user_id = $2")
            .bind(status)
            .bind(user_id)
            .execute(self.pool.as_ref())
            .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn create_session(
        &self,
        session: &AdSession,
        today: NaiveDate,
        daily_max: i32,
    ) -> Result<bool> {
        let mut transaction = self.begin_transaction().await?;

        let result = match self.charge_quota(&mut transaction, session, today, daily_max).await {
            Ok(true) => self.insert_session(&mut transaction, session).await.map(|_| true),
            other => other,
        };

        match result {
            Ok(true) => {
                transaction.commit().await?;
                Ok(true)
            }
            Ok(false) => {
                transaction.rollback().await?;
                debug!("Quota guard rejected session for user {}", session.user_id);
                Ok(false)
            }
            Err(e) => {
                transaction.rollback().await?;
                Err(e)
            }
        }
    }

    async fn find_session(&self, session_id: &str, user_id: UserId) -> Result<Option<AdSession>> {
        let session = sqlx::query_as::<_, AdSession>(&format!(
            "SELECT {} FROM ad_sessions WHERE session_id = $1 AND user_id = $2",
            SESSION_COLUMNS
        ))
        .bind(session_id)
        .bind(user_id)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(session)
    }

    async fn start_timer(
        &self,
        session_id: &str,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE ad_sessions
            SET timer_started = TRUE, timer_start_time = $3
            WHERE session_id = $1 AND user_id = $2 AND timer_started = FALSE
            "#,
        )
        .bind(session_id)
        .bind(user_id)
        .bind(now)
        .execute(self.pool.as_ref())
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn claim_reward(&self, session_id: &str, verified_at: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE ad_sessions
            SET completed = TRUE,
                reward_given = TRUE,
                verified_at = $2,
                dwell_seconds = FLOOR(EXTRACT(EPOCH FROM ($2 - timer_start_time)))::BIGINT
            WHERE session_id = $1 AND reward_given = FALSE AND timer_started = TRUE
            "#,
        )
        .bind(session_id)
        .bind(verified_at)
        .execute(self.pool.as_ref())
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn release_reward(&self, session_id: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE ad_sessions
            SET completed = FALSE, reward_given = FALSE, verified_at = NULL, dwell_seconds = NULL
            WHERE session_id = $1
            "#,
        )
        .bind(session_id)
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }

    async fn delete_unrewarded(&self, session_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM ad_sessions WHERE session_id = $1 AND reward_given = FALSE")
            .bind(session_id)
            .execute(self.pool.as_ref())
            .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn purge_expired(
        &self,
        stale_before: DateTime<Utc>,
        audit_before: DateTime<Utc>,
    ) -> Result<u64> {
        let mut transaction = self.begin_transaction().await?;

        let result = sqlx::query(
            r#"
            DELETE FROM ad_sessions
            WHERE (reward_given = FALSE AND valid_until < $1)
               OR (reward_given = TRUE AND valid_until < $2)
            "#,
        )
        .bind(stale_before)
        .bind(audit_before)
        .execute(&mut *transaction)
        .await;

        match result {
            Ok(result) => {
                transaction.commit().await?;
                Ok(result.rows_affected())
            }
            Err(e) => {
                transaction.rollback().await?;
                Err(e.into())
            }
        }
    }

    async fn reset_daily_counts(&self, today: NaiveDate) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE accounts SET ads_today = 0, last_reset_date = $1 WHERE last_reset_date < $1",
        )
        .bind(today)
        .execute(self.pool.as_ref())
        .await?;

        Ok(result.rows_affected())
    }
}

#[derive(Debug, Clone)]
pub struct DbPoolStatus {
    pub total_connections: u32,
    pub active_connections: u32,
    pub idle_connections: u32,
}
