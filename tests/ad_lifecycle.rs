use adwatch_server::ads::{
    AdPolicy, AdService, Denial, Eligibility, IssueOutcome, IssuedSession, Rejection, TimerOutcome,
    VerifyOutcome,
};
use adwatch_server::clock::{Clock, ManualClock};
use adwatch_server::db::{AdStore, MemoryStore, Money, UserId};
use adwatch_server::error::LedgerError;
use adwatch_server::ledger::{Credit, Ledger, MemoryLedger};
use adwatch_server::Settings;
use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

const USER: UserId = 700_100;

struct Harness {
    service: Arc<AdService>,
    store: MemoryStore,
    ledger: Arc<dyn Ledger>,
    clock: Arc<ManualClock>,
}

async fn harness_with(settings: Settings, ledger: Arc<dyn Ledger>) -> Harness {
    let store = MemoryStore::new();
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 10, 3, 18, 30, 0).unwrap(),
    ));
    store.upsert_account(USER, clock.now()).await.unwrap();

    let service = AdService::new(
        Arc::new(store.clone()),
        ledger.clone(),
        clock.clone(),
        AdPolicy::from_config(&settings.ads),
    );
    Harness {
        service: Arc::new(service),
        store,
        ledger,
        clock,
    }
}

async fn harness() -> Harness {
    harness_with(Settings::new_for_test().unwrap(), Arc::new(MemoryLedger::new())).await
}

async fn issue(h: &Harness) -> IssuedSession {
    match h.service.issue(USER).await.unwrap() {
        IssueOutcome::Issued(issued) => issued,
        other => panic!("expected an issued session, got {:?}", other),
    }
}

#[tokio::test]
async fn test_watch_and_get_paid() {
    let h = harness().await;
    let issued = issue(&h).await;
    assert_eq!(issued.reward, Money::from_cents(1));

    let account = h.store.find_account(USER).await.unwrap().unwrap();
    assert_eq!(account.ads_today, 1);
    assert_eq!(account.last_ad_at, Some(h.clock.now()));

    assert!(matches!(
        h.service.start_timer(&issued.session_id, USER).await.unwrap(),
        TimerOutcome::Started { .. }
    ));

    h.clock.advance(Duration::seconds(31));
    assert_eq!(
        h.service.verify(&issued.session_id, USER).await.unwrap(),
        VerifyOutcome::Rewarded { amount: Money::from_cents(1) }
    );
    assert_eq!(h.ledger.balance(USER).await.unwrap(), Money::from_cents(1));

    let stored = h.store.find_session(&issued.session_id, USER).await.unwrap().unwrap();
    assert!(stored.completed && stored.reward_given);
}

#[tokio::test]
async fn test_early_tap_then_retry() {
    let h = harness().await;
    let issued = issue(&h).await;
    h.service.start_timer(&issued.session_id, USER).await.unwrap();

    h.clock.advance(Duration::seconds(10));
    assert_eq!(
        h.service.verify(&issued.session_id, USER).await.unwrap(),
        VerifyOutcome::Rejected(Rejection::TooEarly { remaining_seconds: 20 })
    );
    assert_eq!(h.ledger.balance(USER).await.unwrap(), Money::ZERO);

    h.clock.advance(Duration::seconds(21));
    assert_eq!(
        h.service.verify(&issued.session_id, USER).await.unwrap(),
        VerifyOutcome::Rewarded { amount: Money::from_cents(1) }
    );
}

#[tokio::test]
async fn test_verify_without_timer_then_after_expiry() {
    let h = harness().await;
    let issued = issue(&h).await;

    h.clock.advance(Duration::seconds(60));
    assert_eq!(
        h.service.verify(&issued.session_id, USER).await.unwrap(),
        VerifyOutcome::Rejected(Rejection::TimerNotStarted)
    );

    h.clock.set(issued.valid_until + Duration::seconds(1));
    assert_eq!(
        h.service.verify(&issued.session_id, USER).await.unwrap(),
        VerifyOutcome::Rejected(Rejection::Expired)
    );
    assert_eq!(h.store.session_count().await, 0);
}

#[tokio::test]
async fn test_session_is_still_valid_exactly_at_valid_until() {
    let h = harness().await;
    let issued = issue(&h).await;
    h.service.start_timer(&issued.session_id, USER).await.unwrap();

    h.clock.set(issued.valid_until);
    assert_eq!(
        h.service.verify(&issued.session_id, USER).await.unwrap(),
        VerifyOutcome::Rewarded { amount: Money::from_cents(1) }
    );
}

#[tokio::test]
async fn test_cooldown_then_daily_limit() {
    let mut settings = Settings::new_for_test().unwrap();
    settings.ads.daily_max_sessions = 2;
    let h = harness_with(settings, Arc::new(MemoryLedger::new())).await;

    issue(&h).await;

    h.clock.advance(Duration::milliseconds(500));
    match h.service.can_issue(USER).await.unwrap() {
        Eligibility::Denied(Denial::Cooldown { remaining_seconds }) => {
            assert!(remaining_seconds > 0);
            assert_eq!(remaining_seconds, 30);
        }
        other => panic!("expected cooldown, got {:?}", other),
    }

    h.clock.advance(Duration::seconds(30));
    issue(&h).await;

    h.clock.advance(Duration::seconds(30));
    assert_eq!(
        h.service.issue(USER).await.unwrap(),
        IssueOutcome::Denied(Denial::DailyLimitReached)
    );
    assert_eq!(h.store.session_count().await, 2);

    // A new calendar day brings the quota back.
    h.clock.advance(Duration::days(1));
    issue(&h).await;
    let account = h.store.find_account(USER).await.unwrap().unwrap();
    assert_eq!(account.ads_today, 1);
    assert_eq!(account.total_ads_watched, 3);
}

#[tokio::test]
async fn test_unknown_and_inactive_users_are_denied() {
    let h = harness().await;
    assert_eq!(
        h.service.issue(USER + 1).await.unwrap(),
        IssueOutcome::Denied(Denial::NoAccount)
    );

    h.store.set_account_status(USER, "suspended").await.unwrap();
    assert_eq!(
        h.service.issue(USER).await.unwrap(),
        IssueOutcome::Denied(Denial::AccountInactive)
    );
    assert_eq!(h.store.session_count().await, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_verifies_pay_exactly_once() {
    let ledger = Arc::new(MemoryLedger::new());
    let h = harness_with(Settings::new_for_test().unwrap(), ledger.clone()).await;
    let issued = issue(&h).await;
    h.service.start_timer(&issued.session_id, USER).await.unwrap();
    h.clock.advance(Duration::seconds(30));

    let mut handles = Vec::new();
    for _ in 0..16 {
        let service = h.service.clone();
        let session_id = issued.session_id.clone();
        handles.push(tokio::spawn(async move { service.verify(&session_id, USER).await }));
    }

    let mut rewarded = 0;
    for handle in handles {
        match handle.await.unwrap().unwrap() {
            VerifyOutcome::Rewarded { .. } => rewarded += 1,
            VerifyOutcome::Rejected(Rejection::AlreadyRewarded) => {}
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    assert_eq!(rewarded, 1);
    assert_eq!(ledger.balance(USER).await.unwrap(), Money::from_cents(1));
    assert_eq!(ledger.entry_count().await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_issues_respect_quota() {
    let mut settings = Settings::new_for_test().unwrap();
    settings.ads.daily_max_sessions = 3;
    settings.ads.cooldown_seconds = 0;
    let h = harness_with(settings, Arc::new(MemoryLedger::new())).await;

    let mut handles = Vec::new();
    for _ in 0..12 {
        let service = h.service.clone();
        handles.push(tokio::spawn(async move { service.issue(USER).await }));
    }

    let mut issued = 0;
    for handle in handles {
        match handle.await.unwrap().unwrap() {
            IssueOutcome::Issued(_) => issued += 1,
            IssueOutcome::Denied(Denial::DailyLimitReached) => {}
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    assert_eq!(issued, 3);
    assert_eq!(h.store.session_count().await, 3);
}

/// Fails the first credit, then behaves like `MemoryLedger`.
struct FlakyLedger {
    failed_once: AtomicBool,
    inner: MemoryLedger,
}

#[async_trait]
impl Ledger for FlakyLedger {
    async fn credit(
        &self,
        user_id: UserId,
        amount: Money,
        reference: &str,
    ) -> Result<Credit, LedgerError> {
        if !self.failed_once.swap(true, Ordering::SeqCst) {
            return Err(LedgerError::Unavailable("write timed out".into()));
        }
        self.inner.credit(user_id, amount, reference).await
    }

    async fn balance(&self, user_id: UserId) -> Result<Money, LedgerError> {
        self.inner.balance(user_id).await
    }
}

#[tokio::test]
async fn test_ledger_outage_leaves_session_redeemable() {
    let ledger = Arc::new(FlakyLedger {
        failed_once: AtomicBool::new(false),
        inner: MemoryLedger::new(),
    });
    let h = harness_with(Settings::new_for_test().unwrap(), ledger.clone()).await;
    let issued = issue(&h).await;
    h.service.start_timer(&issued.session_id, USER).await.unwrap();
    h.clock.advance(Duration::seconds(35));

    assert_eq!(
        h.service.verify(&issued.session_id, USER).await.unwrap(),
        VerifyOutcome::Rejected(Rejection::LedgerFailure)
    );
    assert_eq!(ledger.balance(USER).await.unwrap(), Money::ZERO);

    assert_eq!(
        h.service.verify(&issued.session_id, USER).await.unwrap(),
        VerifyOutcome::Rewarded { amount: Money::from_cents(1) }
    );
    assert_eq!(
        h.service.verify(&issued.session_id, USER).await.unwrap(),
        VerifyOutcome::Rejected(Rejection::AlreadyRewarded)
    );
    assert_eq!(ledger.balance(USER).await.unwrap(), Money::from_cents(1));
}
