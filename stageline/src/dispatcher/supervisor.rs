//! Per-unit timeout supervisor.
//!
//! Ticks every `timeout` after admission until cancelled. Each tick releases
//! whichever waiters are still queued; the traversal itself is never
//! touched.
//!
//! ```text
//! armed ──tick──► checked ──tick──► checked ... ──cancel──► stopped
//!                    │ waiters queued
//!                    ▼
//!                  fired (notify + clear) ──► checked
//! ```

use super::callbacks::Callbacks;
use super::core::Shared;
use crate::token::TokenId;
use crate::unit::Unit;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Timeout ticker bound to one admitted unit.
pub(crate) struct TimeoutSupervisor {
    shared: Arc<Shared>,
    key: TokenId,
    seq: u64,
    unit: Unit,
    callbacks: Callbacks,
    interval: Duration,
}

impl TimeoutSupervisor {
    pub(crate) fn new(
        shared: Arc<Shared>,
        key: TokenId,
        seq: u64,
        unit: Unit,
        callbacks: Callbacks,
    ) -> Self {
        let interval = shared.config.timeout;
        Self {
            shared,
            key,
            seq,
            unit,
            callbacks,
            interval,
        }
    }

    /// Runs the supervisor until cancelled.
    pub(crate) async fn run(self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut ticks = 0u64;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    ticks += 1;
                    self.check();
                }
            }
        }

        trace!(
            key = %self.key,
            seq = self.seq,
            ticks,
            "Timeout supervisor stopped"
        );
    }

    /// Releases queued waiters if the unit is still in flight.
    fn check(&self) -> usize {
        self.shared
            .expire_waiters(&self.key, self.seq, &self.unit, &self.callbacks)
    }
}

#[cfg(test)]
mod tests {
    use crate::dispatcher::{Callbacks, Dispatcher};
    use crate::pipeline::Pipeline;
    use crate::stage::{Stage, StageError};
    use crate::token::Token;
    use crate::unit::{Unit, UnitStatus};
    use futures::future::BoxFuture;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::time::Duration;

    struct Never;

    impl Stage for Never {
        fn name(&self) -> &str {
            "never"
        }

        fn process<'a>(&'a self, _unit: &'a Unit) -> BoxFuture<'a, Result<(), StageError>> {
            Box::pin(std::future::pending())
        }

        fn stats(&self) -> Duration {
            Duration::ZERO
        }
    }

    fn never_dispatcher(timeout: Duration) -> Dispatcher {
        Dispatcher::builder()
            .pipeline(Pipeline::new().pipe(Arc::new(Never)))
            .timeout(timeout)
            .build()
            .unwrap()
    }

    fn recording(log: &Arc<Mutex<Vec<String>>>) -> Callbacks {
        let log = Arc::clone(log);
        Callbacks::new().on_timeout(move |d| {
            log.lock().push(d.routing().correlation_key.clone());
        })
    }

    fn unit(correlation: &str) -> Unit {
        Unit::new(Token::new("k").with_routing(crate::token::Routing::new(
            correlation,
            "addr",
            "dst",
        )))
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_tick_before_first_interval() {
        let dispatcher = never_dispatcher(Duration::from_millis(100));
        let log = Arc::new(Mutex::new(Vec::new()));

        dispatcher.submit(unit("a"), recording(&log));
        tokio::time::sleep(Duration::from_millis(90)).await;

        assert!(log.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_releases_waiters_once() {
        let dispatcher = never_dispatcher(Duration::from_millis(100));
        let log = Arc::new(Mutex::new(Vec::new()));
        let first = unit("a");

        dispatcher.submit(first.clone(), recording(&log));
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(*log.lock(), vec!["a"]);
        assert_eq!(first.status(), UnitStatus::TimedOut);

        // Later ticks have nothing left to notify
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(log.lock().len(), 1);
        assert!(dispatcher.is_in_flight(&first));
        assert_eq!(dispatcher.stats().timeout_notices, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_duplicate_released_by_next_tick() {
        let dispatcher = never_dispatcher(Duration::from_millis(100));
        let log = Arc::new(Mutex::new(Vec::new()));

        dispatcher.submit(unit("a"), recording(&log));
        tokio::time::sleep(Duration::from_millis(150)).await;

        dispatcher.submit(unit("b"), Callbacks::new());
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(*log.lock(), vec!["a", "b"]);
        assert_eq!(dispatcher.in_flight_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_evict_stops_ticks() {
        let dispatcher = never_dispatcher(Duration::from_millis(100));
        let log = Arc::new(Mutex::new(Vec::new()));
        let first = unit("a");

        dispatcher.submit(first.clone(), recording(&log));
        dispatcher.evict(first.token().id());
        tokio::time::sleep(Duration::from_millis(350)).await;

        assert!(log.lock().is_empty());
    }
}
