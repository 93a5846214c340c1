use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use uuid::Uuid;

/// Chat-platform user identifier.
pub type UserId = i64;

pub const STATUS_ACTIVE: &str = "active";

/// Amount of money in minor units (cents).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    pub const fn cents(self) -> i64 {
        self.0
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}

impl std::ops::Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Money {
        Money(self.0 + rhs.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Account {
    pub user_id: UserId,
    pub status: String,
    pub ads_today: i32,
    pub last_reset_date: NaiveDate,
    pub last_ad_at: Option<DateTime<Utc>>,
    pub total_ads_watched: i64,
    pub balance_cents: i64,
    pub total_earned_cents: i64,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn new(user_id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            status: STATUS_ACTIVE.to_string(),
            ads_today: 0,
            last_reset_date: now.date_naive(),
            last_ad_at: None,
            total_ads_watched: 0,
            balance_cents: 0,
            total_earned_cents: 0,
            created_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == STATUS_ACTIVE
    }

    /// Ads counted against today's quota; a counter left over from an
    /// earlier day counts as zero.
    pub fn ads_on(&self, today: NaiveDate) -> i32 {
        if self.last_reset_date < today {
            0
        } else {
            self.ads_today
        }
    }
}

/// One reward opportunity offered to a user.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AdSession {
    pub session_id: String,
    pub user_id: UserId,
    pub destination: String,
    pub created_at: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub timer_started: bool,
    pub timer_start_time: Option<DateTime<Utc>>,
    pub completed: bool,
    pub reward_given: bool,
    pub reward_cents: i64,
    /// When the winning verify claimed the reward.
    pub verified_at: Option<DateTime<Utc>>,
    /// Whole seconds between timer start and `verified_at`.
    pub dwell_seconds: Option<i64>,
}

impl AdSession {
    pub fn new(
        session_id: String,
        user_id: UserId,
        destination: String,
        reward: Money,
        now: DateTime<Utc>,
        lifetime: Duration,
    ) -> Self {
        Self {
            session_id,
            user_id,
            destination,
            created_at: now,
            valid_until: now + lifetime,
            timer_started: false,
            timer_start_time: None,
            completed: false,
            reward_given: false,
            reward_cents: reward.cents(),
            verified_at: None,
            dwell_seconds: None,
        }
    }

    pub fn reward(&self) -> Money {
        Money::from_cents(self.reward_cents)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.valid_until
    }

    /// Dwell measured from the timer start to `at`, in whole seconds.
    pub fn dwell_at(&self, at: DateTime<Utc>) -> Option<i64> {
        self.timer_start_time.map(|started| (at - started).num_seconds())
    }

    /// Ledger reference for this session's payout.
    pub fn ledger_reference(&self) -> String {
        format!("AD_{}", self.session_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub user_id: UserId,
    pub amount_cents: i64,
    pub kind: String,
    pub reference: String,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn ad_earning(user_id: UserId, amount: Money, reference: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            amount_cents: amount.cents(),
            kind: "ad_earn".to_string(),
            reference: reference.to_string(),
            created_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_money_display() {
        assert_eq!(Money::from_cents(1).to_string(), "0.01");
        assert_eq!(Money::from_cents(500).to_string(), "5.00");
        assert_eq!(Money::from_cents(-1234).to_string(), "-12.34");
        assert_eq!(Money::from_cents(2) + Money::from_cents(3), Money::from_cents(5));
    }

    #[test]
    fn test_daily_counter_rolls_over() {
        let now = Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap();
        let mut account = Account::new(7, now);
        account.ads_today = 9;
        assert_eq!(account.ads_on(now.date_naive()), 9);
        assert_eq!(account.ads_on(now.date_naive().succ_opt().unwrap()), 0);
    }

    #[test]
    fn test_session_expiry_is_strict() {
        let now = Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap();
        let session = AdSession::new(
            "tok".into(),
            7,
            "https://ads.example/1".into(),
            Money::from_cents(1),
            now,
            Duration::seconds(330),
        );
        assert!(!session.is_expired_at(session.valid_until));
        assert!(session.is_expired_at(session.valid_until + Duration::milliseconds(1)));
        assert_eq!(session.ledger_reference(), "AD_tok");
    }
}
