use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{Credit, Ledger};
use crate::db::{Money, UserId};
use crate::error::LedgerError;

#[derive(Debug, Default)]
struct Book {
    balances: HashMap<UserId, Money>,
    references: HashMap<String, (UserId, Money)>,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryLedger {
    book: Arc<RwLock<Book>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct references booked.
    pub async fn entry_count(&self) -> usize {
        self.book.read().await.references.len()
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn credit(
        &self,
        user_id: UserId,
        amount: Money,
        reference: &str,
    ) -> Result<Credit, LedgerError> {
        let mut book = self.book.write().await;
        if book.references.contains_key(reference) {
            return Ok(Credit::AlreadyApplied);
        }
        book.references.insert(reference.to_string(), (user_id, amount));
        let balance = book.balances.entry(user_id).or_default();
        *balance = *balance + amount;
        Ok(Credit::Applied)
    }

    async fn balance(&self, user_id: UserId) -> Result<Money, LedgerError> {
        Ok(self
            .book
            .read()
            .await
            .balances
            .get(&user_id)
            .copied()
            .unwrap_or(Money::ZERO))
    }
}
