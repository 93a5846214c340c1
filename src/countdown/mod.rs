//! Countdown module
//!
//! Drives the "time remaining" display for a running ad timer. A countdown
//! only renders; rewards are decided by `AdService::verify` alone.

mod registry;
mod sink;

pub use registry::{CountdownRegistry, CountdownSpec};
pub use sink::{ChannelSink, CountdownSink, CountdownTick, LogSink, SinkError};
