use chrono::{DateTime, Utc};

use crate::db::Money;

/// Why a request before the verify step was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    NoAccount,
    AccountInactive,
    DailyLimitReached,
    Cooldown { remaining_seconds: i64 },
    NotFound,
    AlreadyStarted,
    Expired,
}

impl Denial {
    pub fn code(&self) -> &'static str {
        match self {
            Denial::NoAccount => "no_account",
            Denial::AccountInactive => "account_inactive",
            Denial::DailyLimitReached => "daily_limit_reached",
            Denial::Cooldown { .. } => "cooldown",
            Denial::NotFound => "not_found",
            Denial::AlreadyStarted => "already_started",
            Denial::Expired => "expired",
        }
    }

    pub fn remaining_seconds(&self) -> Option<i64> {
        match self {
            Denial::Cooldown { remaining_seconds } => Some(*remaining_seconds),
            _ => None,
        }
    }
}

/// Why a verify call did not pay out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    NotFound,
    AlreadyRewarded,
    TimerNotStarted,
    Expired,
    TooEarly { remaining_seconds: i64 },
    LedgerFailure,
}

impl Rejection {
    pub fn code(&self) -> &'static str {
        match self {
            Rejection::NotFound => "not_found",
            Rejection::AlreadyRewarded => "already_rewarded",
            Rejection::TimerNotStarted => "timer_not_started",
            Rejection::Expired => "expired",
            Rejection::TooEarly { .. } => "too_early",
            Rejection::LedgerFailure => "ledger_failure",
        }
    }

    pub fn remaining_seconds(&self) -> Option<i64> {
        match self {
            Rejection::TooEarly { remaining_seconds } => Some(*remaining_seconds),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
    Eligible,
    Denied(Denial),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedSession {
    pub session_id: String,
    pub destination: String,
    pub valid_until: DateTime<Utc>,
    pub reward: Money,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IssueOutcome {
    Issued(IssuedSession),
    Denied(Denial),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerOutcome {
    Started { started_at: DateTime<Utc> },
    Denied(Denial),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOutcome {
    Rewarded { amount: Money },
    Rejected(Rejection),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    Cancelled,
    NotFound,
    AlreadyRewarded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Issued,
    TimerRunning,
    Rewarded,
    Expired,
}

impl SessionPhase {
    pub fn code(&self) -> &'static str {
        match self {
            SessionPhase::Issued => "issued",
            SessionPhase::TimerRunning => "timer_running",
            SessionPhase::Rewarded => "rewarded",
            SessionPhase::Expired => "expired",
        }
    }
}

/// Read-only snapshot of a session for the messaging layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionView {
    pub session_id: String,
    pub phase: SessionPhase,
    pub destination: String,
    pub valid_until: DateTime<Utc>,
    pub timer_start_time: Option<DateTime<Utc>>,
    /// Seconds of dwell time still owed; `None` until the timer starts.
    pub remaining_seconds: Option<i64>,
    pub reward: Money,
    pub verified_at: Option<DateTime<Utc>>,
    pub dwell_seconds: Option<i64>,
}
