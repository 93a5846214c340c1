//! PostgreSQL-backed store and ledger tests.
//!
//! These need a live database: `DATABASE_URL=postgres://... cargo test -- --ignored`

use adwatch_server::db::{AdSession, AdStore, Money, PgStore, UserId};
use adwatch_server::ledger::{Credit, Ledger, PgLedger};
use chrono::{Duration, Utc};
use std::time::Duration as StdDuration;

async fn connect() -> PgStore {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for --ignored tests");
    let store = PgStore::new_with_options(&url, 5, StdDuration::from_secs(5))
        .await
        .expect("Failed to connect to test database");
    store.migrate().await.expect("Failed to run migrations");
    store
}

fn fresh_user() -> UserId {
    // Keep clear of real chat ids, which are positive.
    -(rand::random::<u32>() as i64) - 1
}

fn session_for(user_id: UserId) -> AdSession {
    AdSession::new(
        adwatch_server::ads::token::generate_session_id(),
        user_id,
        "https://ads.example/pg".to_string(),
        Money::from_cents(1),
        Utc::now(),
        Duration::seconds(330),
    )
}

#[tokio::test]
#[ignore]
async fn test_pool_status_after_connect() {
    let store = connect().await;
    let status = store.get_pool_status().await;
    assert!(status.total_connections >= 1);
    assert_eq!(
        status.total_connections,
        status.active_connections + status.idle_connections
    );
}

#[tokio::test]
#[ignore]
async fn test_quota_guard_and_reward_claim() {
    let store = connect().await;
    let user = fresh_user();
    let now = Utc::now();
    store.upsert_account(user, now).await.unwrap();

    let first = session_for(user);
    assert!(store.create_session(&first, now.date_naive(), 1).await.unwrap());
    let second = session_for(user);
    assert!(!store.create_session(&second, now.date_naive(), 1).await.unwrap());
    assert!(store.find_session(&second.session_id, user).await.unwrap().is_none());

    // Claiming needs a started timer.
    let verified_at = now + Duration::milliseconds(30_900);
    assert!(!store.claim_reward(&first.session_id, verified_at).await.unwrap());
    assert!(store.start_timer(&first.session_id, user, now).await.unwrap());
    assert!(!store.start_timer(&first.session_id, user, now).await.unwrap());

    assert!(store.claim_reward(&first.session_id, verified_at).await.unwrap());
    assert!(!store.claim_reward(&first.session_id, verified_at).await.unwrap());
    store.release_reward(&first.session_id).await.unwrap();
    let released = store.find_session(&first.session_id, user).await.unwrap().unwrap();
    assert!(released.verified_at.is_none() && released.dwell_seconds.is_none());

    assert!(store.claim_reward(&first.session_id, verified_at).await.unwrap());
    let claimed = store.find_session(&first.session_id, user).await.unwrap().unwrap();
    assert_eq!(claimed.dwell_seconds, Some(30));
    assert!(claimed.verified_at.is_some());

    // A paid row survives the cancel path's delete.
    assert!(!store.delete_unrewarded(&first.session_id).await.unwrap());
    assert!(store.find_session(&first.session_id, user).await.unwrap().is_some());
}

#[tokio::test]
#[ignore]
async fn test_ledger_credit_is_idempotent() {
    let store = connect().await;
    let ledger = PgLedger::new(store.pool());
    let user = fresh_user();
    store.upsert_account(user, Utc::now()).await.unwrap();

    let reference = format!("AD_{}", adwatch_server::ads::token::generate_session_id());
    let amount = Money::from_cents(1);
    assert_eq!(ledger.credit(user, amount, &reference).await.unwrap(), Credit::Applied);
    assert_eq!(
        ledger.credit(user, amount, &reference).await.unwrap(),
        Credit::AlreadyApplied
    );
    assert_eq!(ledger.balance(user).await.unwrap(), amount);
}

#[tokio::test]
#[ignore]
async fn test_ledger_rejects_unknown_account() {
    let store = connect().await;
    let ledger = PgLedger::new(store.pool());
    let reference = format!("AD_{}", adwatch_server::ads::token::generate_session_id());

    let result = ledger
        .credit(fresh_user(), Money::from_cents(1), &reference)
        .await;
    assert!(result.is_err());
}
