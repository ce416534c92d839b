//! Pipeline stage contract.
//!
//! Stages hold the business logic; the dispatcher only decides when they
//! run. A stage receives a [`Unit`] handle, does its work (typically writing
//! results into the unit's attribute map) and resolves its future. The
//! dispatcher reports the stage's completion into the unit's countdown when
//! that future resolves, whether it returned `Ok`, `Err` or panicked.
//! Stages never touch the countdown themselves.
//!
//! A stage whose future never resolves keeps its unit in flight forever.

use crate::unit::Unit;
use futures::future::BoxFuture;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Errors a stage can report.
///
/// These never stop the pipeline: the dispatcher logs them and moves on to
/// the next group once the rest of the current group completes.
#[derive(Debug, Error)]
pub enum StageError {
    /// Stage ran but failed
    #[error("stage failed: {0}")]
    Failed(String),

    /// Stage refused the unit
    #[error("stage {stage} rejected unit: {reason}")]
    Rejected { stage: String, reason: String },

    /// Stage task panicked
    #[error("stage panicked: {0}")]
    Panicked(String),
}

/// A processing step in the pipeline.
pub trait Stage: Send + Sync + 'static {
    /// Returns the stage name for logging.
    fn name(&self) -> &str;

    /// Prepares the stage for work. Must be idempotent.
    fn load(&self) {}

    /// Reloads the stage's resources. Must be idempotent.
    fn reload(&self) {}

    /// Processes one unit.
    fn process<'a>(&'a self, unit: &'a Unit) -> BoxFuture<'a, Result<(), StageError>>;

    /// Returns cumulative processing time since start.
    fn stats(&self) -> Duration;
}

/// Accumulates processing time for a stage.
///
/// Lock-free; safe to share across the stage's concurrent invocations.
#[derive(Debug, Default)]
pub struct StageClock {
    elapsed_nanos: AtomicU64,
    invocations: AtomicU64,
}

impl StageClock {
    /// Creates a clock at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one invocation's duration.
    pub fn record(&self, duration: Duration) {
        let nanos = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
        self.elapsed_nanos.fetch_add(nanos, Ordering::Relaxed);
        self.invocations.fetch_add(1, Ordering::Relaxed);
    }

    /// Records the time elapsed since `started`.
    pub fn record_since(&self, started: Instant) {
        self.record(started.elapsed());
    }

    /// Returns the accumulated time.
    pub fn total(&self) -> Duration {
        Duration::from_nanos(self.elapsed_nanos.load(Ordering::Relaxed))
    }

    /// Returns how many invocations were recorded.
    pub fn invocations(&self) -> u64 {
        self.invocations.load(Ordering::Relaxed)
    }
}
