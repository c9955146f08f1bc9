//! Shared Hand-off Queue
//!
//! Provides the blocking queue used between the driver callbacks and the
//! processing, persistence and IMU threads.

mod queue;

pub use queue::SharedQueue;

use thiserror::Error;

/// Returned by the pop methods once the queue has been killed.
///
/// This is the normal end-of-stream signal for every consumer loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("queue has been killed")]
pub struct QueueClosed;
