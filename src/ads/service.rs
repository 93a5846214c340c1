use rand::seq::SliceRandom;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::eligibility;
use super::outcome::{
    CancelOutcome, Denial, Eligibility, IssueOutcome, IssuedSession, Rejection, SessionPhase,
    SessionView, TimerOutcome, VerifyOutcome,
};
use super::policy::{ceil_seconds, AdPolicy};
use super::token::generate_session_id;
use crate::clock::Clock;
use crate::db::{AdSession, AdStore, UserId};
use crate::error::AppError;
use crate::ledger::{Credit, Ledger};
use crate::Result;

/// Ad session lifecycle: issue, start the dwell timer, verify and pay out.
///
/// Every call re-reads the store; nothing about a session is cached here.
pub struct AdService {
    store: Arc<dyn AdStore>,
    ledger: Arc<dyn Ledger>,
    clock: Arc<dyn Clock>,
    policy: AdPolicy,
}

impl AdService {
    pub fn new(
        store: Arc<dyn AdStore>,
        ledger: Arc<dyn Ledger>,
        clock: Arc<dyn Clock>,
        policy: AdPolicy,
    ) -> Self {
        Self {
            store,
            ledger,
            clock,
            policy,
        }
    }

    pub fn policy(&self) -> &AdPolicy {
        &self.policy
    }

    pub async fn can_issue(&self, user_id: UserId) -> Result<Eligibility> {
        let account = self.store.find_account(user_id).await?;
        let now = self.clock.now();
        Ok(eligibility::evaluate(
            account.as_ref(),
            now,
            now.date_naive(),
            &self.policy,
        ))
    }

    pub async fn issue(&self, user_id: UserId) -> Result<IssueOutcome> {
        if let Eligibility::Denied(denial) = self.can_issue(user_id).await? {
            info!("Ad session denied for user {}: {}", user_id, denial.code());
            return Ok(IssueOutcome::Denied(denial));
        }

        let destination = self
            .policy
            .destinations
            .choose(&mut rand::thread_rng())
            .cloned()
            .ok_or_else(|| AppError::ConfigError("no ad destinations configured".into()))?;

        let now = self.clock.now();
        let session = AdSession::new(
            generate_session_id(),
            user_id,
            destination,
            self.policy.reward,
            now,
            self.policy.session_lifetime(),
        );

        let created = self
            .store
            .create_session(&session, now.date_naive(), self.policy.daily_max_sessions)
            .await?;
        if !created {
            // Another request used up the quota between the check and the write.
            warn!("Quota exhausted while issuing for user {}", user_id);
            return Ok(IssueOutcome::Denied(Denial::DailyLimitReached));
        }

        info!(
            "Ad session {} issued to user {} (destination: {})",
            short(&session.session_id),
            user_id,
            session.destination
        );

        Ok(IssueOutcome::Issued(IssuedSession {
            session_id: session.session_id,
            destination: session.destination,
            valid_until: session.valid_until,
            reward: self.policy.reward,
        }))
    }

    pub async fn start_timer(&self, session_id: &str, user_id: UserId) -> Result<TimerOutcome> {
        let Some(session) = self.store.find_session(session_id, user_id).await? else {
            return Ok(TimerOutcome::Denied(Denial::NotFound));
        };

        let now = self.clock.now();
        if session.is_expired_at(now) {
            if self.store.delete_unrewarded(session_id).await? {
                info!("Expired ad session {} purged on timer start", short(session_id));
            }
            return Ok(TimerOutcome::Denied(Denial::Expired));
        }

        if session.timer_started {
            warn!("Timer restart attempt on ad session {} by user {}", short(session_id), user_id);
            return Ok(TimerOutcome::Denied(Denial::AlreadyStarted));
        }

        if !self.store.start_timer(session_id, user_id, now).await? {
            return Ok(TimerOutcome::Denied(Denial::AlreadyStarted));
        }

        info!("Timer started for ad session {}", short(session_id));
        Ok(TimerOutcome::Started { started_at: now })
    }

    pub async fn verify(&self, session_id: &str, user_id: UserId) -> Result<VerifyOutcome> {
        let Some(session) = self.store.find_session(session_id, user_id).await? else {
            return Ok(VerifyOutcome::Rejected(Rejection::NotFound));
        };

        if session.reward_given {
            return Ok(VerifyOutcome::Rejected(Rejection::AlreadyRewarded));
        }

        let now = self.clock.now();
        // Checked before the timer so a lapsed session reports expired whether or not it was started.
        if session.is_expired_at(now) {
            if self.store.delete_unrewarded(session_id).await? {
                info!("Expired ad session {} purged on verify", short(session_id));
                return Ok(VerifyOutcome::Rejected(Rejection::Expired));
            }
            // The row survived the conditional delete: a concurrent verify may have claimed it.
            let rejection = match self.store.find_session(session_id, user_id).await? {
                Some(current) if current.reward_given => Rejection::AlreadyRewarded,
                _ => Rejection::Expired,
            };
            return Ok(VerifyOutcome::Rejected(rejection));
        }

        let Some(started_at) = session.timer_start_time.filter(|_| session.timer_started) else {
            return Ok(VerifyOutcome::Rejected(Rejection::TimerNotStarted));
        };

        let elapsed = now - started_at;
        info!(
            "Dwell check for ad session {}: elapsed {}ms, required {}s",
            short(session_id),
            elapsed.num_milliseconds(),
            self.policy.required_wait.num_seconds()
        );
        if elapsed < self.policy.minimum_dwell() {
            return Ok(VerifyOutcome::Rejected(Rejection::TooEarly {
                remaining_seconds: ceil_seconds(self.policy.required_wait - elapsed),
            }));
        }

        if !self.store.claim_reward(session_id, now).await? {
            let rejection = self.lost_claim(session_id, user_id).await?;
            warn!("Reward claim on ad session {} lost: {}", short(session_id), rejection.code());
            return Ok(VerifyOutcome::Rejected(rejection));
        }

        let amount = session.reward();
        match self
            .ledger
            .credit(user_id, amount, &session.ledger_reference())
            .await
        {
            Ok(Credit::Applied) => {
                info!("Ad session {} verified, user {} credited {}", short(session_id), user_id, amount);
            }
            Ok(Credit::AlreadyApplied) => {
                warn!("Ledger already held a credit for ad session {}", short(session_id));
            }
            Err(e) => {
                error!("Ledger credit failed for ad session {}: {}", short(session_id), e);
                if let Err(release_err) = self.store.release_reward(session_id).await {
                    error!(
                        "Could not roll back reward claim on ad session {}: {}",
                        short(session_id),
                        release_err
                    );
                    return Err(release_err);
                }
                return Ok(VerifyOutcome::Rejected(Rejection::LedgerFailure));
            }
        }

        Ok(VerifyOutcome::Rewarded { amount })
    }

    pub async fn cancel(&self, session_id: &str, user_id: UserId) -> Result<CancelOutcome> {
        let Some(session) = self.store.find_session(session_id, user_id).await? else {
            return Ok(CancelOutcome::NotFound);
        };

        if session.reward_given {
            return Ok(CancelOutcome::AlreadyRewarded);
        }

        if !self.store.delete_unrewarded(session_id).await? {
            // Kept because a verify claimed it after the read above.
            return Ok(match self.store.find_session(session_id, user_id).await? {
                Some(_) => CancelOutcome::AlreadyRewarded,
                None => CancelOutcome::NotFound,
            });
        }

        info!("Ad session {} cancelled by user {}", short(session_id), user_id);
        Ok(CancelOutcome::Cancelled)
    }

    /// Explains a failed reward claim from the row as it is now.
    async fn lost_claim(&self, session_id: &str, user_id: UserId) -> Result<Rejection> {
        Ok(match self.store.find_session(session_id, user_id).await? {
            None => Rejection::NotFound,
            Some(session) if session.reward_given => Rejection::AlreadyRewarded,
            Some(session) if !session.timer_started => Rejection::TimerNotStarted,
            // Another claim was released after its ledger credit failed.
            Some(_) => Rejection::LedgerFailure,
        })
    }

    pub async fn status(&self, session_id: &str, user_id: UserId) -> Result<Option<SessionView>> {
        let Some(session) = self.store.find_session(session_id, user_id).await? else {
            return Ok(None);
        };

        let now = self.clock.now();
        let phase = if session.reward_given {
            SessionPhase::Rewarded
        } else if session.is_expired_at(now) {
            SessionPhase::Expired
        } else if session.timer_started {
            SessionPhase::TimerRunning
        } else {
            SessionPhase::Issued
        };

        let remaining_seconds = match (phase, session.timer_start_time) {
            (SessionPhase::TimerRunning, Some(started_at)) => {
                Some(ceil_seconds(self.policy.required_wait - (now - started_at)))
            }
            (SessionPhase::Rewarded, _) => Some(0),
            _ => None,
        };

        Ok(Some(SessionView {
            reward: session.reward(),
            session_id: session.session_id,
            phase,
            destination: session.destination,
            valid_until: session.valid_until,
            timer_start_time: session.timer_start_time,
            remaining_seconds,
            verified_at: session.verified_at,
            dwell_seconds: session.dwell_seconds,
        }))
    }
}

/// Log-friendly prefix of a session token.
fn short(session_id: &str) -> &str {
    session_id.get(..8).unwrap_or(session_id)
}
