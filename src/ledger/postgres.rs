use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::info;

use super::{Credit, Ledger};
use crate::db::{LedgerEntry, Money, UserId};
use crate::error::LedgerError;

/// Ledger backed by the `ledger_entries` table and the balance columns on
/// `accounts`.
pub struct PgLedger {
    pool: Arc<PgPool>,
}

impl PgLedger {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Ledger for PgLedger {
    async fn credit(
        &self,
        user_id: UserId,
        amount: Money,
        reference: &str,
    ) -> Result<Credit, LedgerError> {
        let entry = LedgerEntry::ad_earning(user_id, amount, reference, Utc::now());
        let mut transaction = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO ledger_entries (id, user_id, amount_cents, kind, reference, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (reference) DO NOTHING
            "#,
        )
        .bind(entry.id)
        .bind(entry.user_id)
        .bind(entry.amount_cents)
        .bind(&entry.kind)
        .bind(&entry.reference)
        .bind(entry.created_at)
        .execute(&mut *transaction)
        .await?;

        if inserted.rows_affected() == 0 {
            transaction.rollback().await?;
            info!("Ledger reference {} already booked", reference);
            return Ok(Credit::AlreadyApplied);
        }

        let updated = sqlx::query(
            r#"
            UPDATE accounts
            SET balance_cents = balance_cents + $2,
                total_earned_cents = total_earned_cents + $2
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .bind(amount.cents())
        .execute(&mut *transaction)
        .await?;

        if updated.rows_affected() == 0 {
            transaction.rollback().await?;
            return Err(LedgerError::UnknownAccount(user_id));
        }

        transaction.commit().await?;
        info!("Credited {} to user {} (ref {})", amount, user_id, reference);
        Ok(Credit::Applied)
    }

    async fn balance(&self, user_id: UserId) -> Result<Money, LedgerError> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT balance_cents FROM accounts WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(self.pool.as_ref())
            .await?;

        row.map(|(cents,)| Money::from_cents(cents))
            .ok_or(LedgerError::UnknownAccount(user_id))
    }
}
