use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::info;

/// One advisory "time remaining" update for a running ad timer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CountdownTick {
    pub session_id: String,
    pub remaining_seconds: i64,
    pub progress_percent: u8,
}

#[derive(Error, Debug)]
pub enum SinkError {
    /// The message being edited is gone; the countdown should stop.
    #[error("Countdown target closed")]
    Closed,

    #[error("Countdown delivery failed: {0}")]
    Delivery(String),
}

/// Where countdown ticks are rendered. Owned by the messaging layer.
#[async_trait]
pub trait CountdownSink: Send + Sync {
    async fn deliver(&self, tick: CountdownTick) -> Result<(), SinkError>;
}

/// Writes ticks to the log; used when no chat front end is attached.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

#[async_trait]
impl CountdownSink for LogSink {
    async fn deliver(&self, tick: CountdownTick) -> Result<(), SinkError> {
        info!(
            "Countdown {}: {}s remaining ({}%)",
            tick.session_id.get(..8).unwrap_or(&tick.session_id),
            tick.remaining_seconds,
            tick.progress_percent
        );
        Ok(())
    }
}

/// Forwards ticks over an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<CountdownTick>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::UnboundedSender<CountdownTick>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl CountdownSink for ChannelSink {
    async fn deliver(&self, tick: CountdownTick) -> Result<(), SinkError> {
        self.tx.send(tick).map_err(|_| SinkError::Closed)
    }
}
