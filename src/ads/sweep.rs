use chrono::Duration;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};

use crate::clock::Clock;
use crate::config::SweepConfig;
use crate::db::AdStore;
use crate::Result;

/// Periodic housekeeping for ad sessions and daily counters.
pub struct Sweeper {
    store: Arc<dyn AdStore>,
    clock: Arc<dyn Clock>,
    period: std::time::Duration,
    /// How long past `valid_until` an unrewarded session is kept, so a sweep
    /// never races a verify that is already in flight.
    retention: Duration,
    /// How long past `valid_until` a rewarded session is kept for audits.
    audit_retention: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SweepReport {
    pub sessions_deleted: u64,
    pub counters_reset: u64,
}

impl Sweeper {
    pub fn new(store: Arc<dyn AdStore>, clock: Arc<dyn Clock>, config: &SweepConfig) -> Self {
        Self {
            store,
            clock,
            period: std::time::Duration::from_secs(config.interval_seconds),
            retention: Duration::seconds(config.retention_seconds),
            audit_retention: Duration::seconds(config.audit_retention_seconds),
        }
    }

    pub async fn sweep(&self) -> Result<SweepReport> {
        let now = self.clock.now();
        let sessions_deleted = self
            .store
            .purge_expired(now - self.retention, now - self.audit_retention)
            .await?;
        let counters_reset = self.store.reset_daily_counts(now.date_naive()).await?;

        Ok(SweepReport {
            sessions_deleted,
            counters_reset,
        })
    }

    /// Runs `sweep` every period until `shutdown` flips to `true` or its
    /// sender is dropped. A failed tick is logged and retried next period.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.sweep().await {
                        Ok(report) if report != SweepReport::default() => {
                            info!(
                                "Sweep removed {} ad sessions, reset {} daily counters",
                                report.sessions_deleted, report.counters_reset
                            );
                        }
                        Ok(_) => {}
                        Err(e) => error!("Ad session sweep failed: {}", e),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Ad session sweeper stopping");
                        break;
                    }
                }
            }
        }
    }
}
