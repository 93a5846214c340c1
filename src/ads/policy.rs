use chrono::Duration;

use crate::config::AdsConfig;
use crate::db::Money;

#[derive(Debug, Clone)]
pub struct AdPolicy {
    pub required_wait: Duration,
    /// Subtracted from `required_wait` at verify time to absorb client and
    /// network latency (2 seconds by default).
    pub grace: Duration,
    pub daily_max_sessions: i32,
    pub cooldown: Duration,
    pub reward: Money,
    /// Added to `required_wait` when computing `valid_until` (5 minutes by
    /// default).
    pub expiry_grace: Duration,
    pub destinations: Vec<String>,
}

impl AdPolicy {
    pub fn from_config(config: &AdsConfig) -> Self {
        Self {
            required_wait: Duration::seconds(config.required_wait_seconds),
            grace: Duration::seconds(config.grace_seconds),
            daily_max_sessions: config.daily_max_sessions,
            cooldown: Duration::seconds(config.cooldown_seconds),
            reward: Money::from_cents(config.reward_cents),
            expiry_grace: Duration::seconds(config.expiry_grace_seconds),
            destinations: config.destinations.clone(),
        }
    }

    /// How long an issued session stays redeemable.
    pub fn session_lifetime(&self) -> Duration {
        self.required_wait + self.expiry_grace
    }

    /// Shortest elapsed time that verify accepts.
    pub fn minimum_dwell(&self) -> Duration {
        self.required_wait - self.grace
    }
}

/// Whole seconds in `d`, rounded up. A sub-second remainder still counts
/// as one second so "remaining" values never read as zero.
pub fn ceil_seconds(d: Duration) -> i64 {
    let millis = d.num_milliseconds();
    if millis <= 0 {
        0
    } else {
        (millis + 999) / 1000
    }
}
