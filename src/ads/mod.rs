//! Ad session lifecycle
//!
//! Issuing opportunities, the dwell timer, verification and payout, plus
//! the periodic sweep of stale sessions.

pub mod eligibility;
pub mod handlers;
pub mod outcome;
pub mod policy;
pub mod service;
pub mod sweep;
pub mod token;

pub use outcome::{
    CancelOutcome, Denial, Eligibility, IssueOutcome, IssuedSession, Rejection, SessionPhase,
    SessionView, TimerOutcome, VerifyOutcome,
};
pub use policy::AdPolicy;
pub use service::AdService;
pub use sweep::{SweepReport, Sweeper};
