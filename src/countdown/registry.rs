use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::sink::{CountdownSink, CountdownTick, SinkError};
use crate::ads::policy::ceil_seconds;
use crate::clock::Clock;
use crate::db::{AdStore, UserId};

struct RunningCountdown {
    generation: u64,
    handle: JoinHandle<()>,
}

/// Per-session countdown display tasks, keyed by session id.
///
/// Purely presentational: payment is authorized by the verifier's own
/// timestamp check, never by how many ticks a client saw.
pub struct CountdownRegistry {
    tasks: Arc<RwLock<HashMap<String, RunningCountdown>>>,
    store: Arc<dyn AdStore>,
    clock: Arc<dyn Clock>,
    tick: std::time::Duration,
    next_generation: AtomicU64,
}

/// What a countdown task needs to know about the timer it renders.
#[derive(Debug, Clone)]
pub struct CountdownSpec {
    pub session_id: String,
    pub user_id: UserId,
    pub started_at: DateTime<Utc>,
    pub required_wait: Duration,
}

impl CountdownRegistry {
    pub fn new(store: Arc<dyn AdStore>, clock: Arc<dyn Clock>, tick: std::time::Duration) -> Self {
        Self {
            tasks: Arc::new(RwLock::new(HashMap::new())),
            store,
            clock,
            tick,
            next_generation: AtomicU64::new(1),
        }
    }

    /// Starts (or restarts) the countdown for `spec.session_id`.
    pub async fn start(&self, spec: CountdownSpec, sink: Arc<dyn CountdownSink>) {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let session_id = spec.session_id.clone();

        let task = CountdownTask {
            spec,
            sink,
            store: self.store.clone(),
            clock: self.clock.clone(),
            tick: self.tick,
        };
        // Held across the spawn: the task must be registered before it can deregister.
        let mut registered = self.tasks.write().await;
        let tasks = self.tasks.clone();
        let handle = tokio::spawn(async move {
            task.run().await;
            let mut registered = tasks.write().await;
            if registered.get(&task.spec.session_id).map(|t| t.generation) == Some(generation) {
                registered.remove(&task.spec.session_id);
            }
            drop(registered);
            // Releases the sink only after deregistering.
            drop(task);
        });

        if let Some(previous) =
            registered.insert(session_id.clone(), RunningCountdown { generation, handle })
        {
            previous.handle.abort();
        }
        drop(registered);
        debug!("Countdown registered for session {}", short(&session_id));
    }

    /// Stops the countdown for `session_id`. Returns whether one was running.
    pub async fn cancel(&self, session_id: &str) -> bool {
        match self.tasks.write().await.remove(session_id) {
            Some(running) => {
                running.handle.abort();
                info!("Countdown cancelled for session {}", short(session_id));
                true
            }
            None => false,
        }
    }

    pub async fn is_running(&self, session_id: &str) -> bool {
        self.tasks.read().await.contains_key(session_id)
    }

    pub async fn active_count(&self) -> usize {
        self.tasks.read().await.len()
    }

    pub async fn shutdown(&self) {
        let mut tasks = self.tasks.write().await;
        for (_, running) in tasks.drain() {
            running.handle.abort();
        }
    }
}

struct CountdownTask {
    spec: CountdownSpec,
    sink: Arc<dyn CountdownSink>,
    store: Arc<dyn AdStore>,
    clock: Arc<dyn Clock>,
    tick: std::time::Duration,
}

impl CountdownTask {
    async fn run(&self) {
        let mut ticker = tokio::time::interval(self.tick);
        loop {
            ticker.tick().await;

            if !self.session_pending().await {
                debug!("Countdown for {} stopping: session no longer pending", short(&self.spec.session_id));
                return;
            }

            let tick = self.snapshot();
            let finished = tick.remaining_seconds == 0;
            match self.sink.deliver(tick).await {
                Ok(()) => {}
                Err(SinkError::Closed) => {
                    debug!("Countdown for {} stopping: sink closed", short(&self.spec.session_id));
                    return;
                }
                Err(e) => warn!("Countdown tick for {} not delivered: {}", short(&self.spec.session_id), e),
            }

            if finished {
                return;
            }
        }
    }

    async fn session_pending(&self) -> bool {
        match self.store.find_session(&self.spec.session_id, self.spec.user_id).await {
            Ok(Some(session)) => !session.reward_given && !session.is_expired_at(self.clock.now()),
            Ok(None) => false,
            // A store hiccup should not kill the display; keep ticking.
            Err(e) => {
                warn!("Countdown could not read session {}: {}", short(&self.spec.session_id), e);
                true
            }
        }
    }

    fn snapshot(&self) -> CountdownTick {
        let elapsed = self.clock.now() - self.spec.started_at;
        let remaining = ceil_seconds(self.spec.required_wait - elapsed);
        let total_ms = self.spec.required_wait.num_milliseconds().max(1);
        let progress = (elapsed.num_milliseconds().clamp(0, total_ms) * 100 / total_ms) as u8;

        CountdownTick {
            session_id: self.spec.session_id.clone(),
            remaining_seconds: remaining,
            progress_percent: progress,
        }
    }
}

fn short(session_id: &str) -> &str {
    session_id.get(..8).unwrap_or(session_id)
}
