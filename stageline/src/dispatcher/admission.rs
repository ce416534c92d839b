//! Admission, deduplication and in-flight queries.

use super::callbacks::{invoke, Callbacks, Delivery};
use super::core::{Dispatcher, InFlight};
use super::stats::DispatcherStats;
use super::supervisor::TimeoutSupervisor;
use super::traversal::Traversal;
use crate::hooks::DispatchEvent;
use crate::token::TokenId;
use crate::unit::{Unit, UnitStatus};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Outcome of a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// A new traversal started for this key
    Admitted { seq: u64 },
    /// The submission joined the traversal already running for this key
    Coalesced { seq: u64 },
    /// The unit handle was admitted before and cannot start another
    /// traversal; `seq` is the one it already carries
    Rejected { seq: u64 },
}

impl Admission {
    /// Returns true if this submission started a traversal.
    pub fn is_admitted(&self) -> bool {
        matches!(self, Self::Admitted { .. })
    }

    /// Returns the sequence number of the traversal serving the submission.
    pub fn seq(&self) -> u64 {
        match self {
            Self::Admitted { seq } | Self::Coalesced { seq } | Self::Rejected { seq } => *seq,
        }
    }
}

impl Dispatcher {
    /// Submits a unit.
    ///
    /// If a traversal is already running for the unit's identity key, the
    /// unit is queued behind it and will be answered with that traversal's
    /// outcome, addressed by its own routing. Otherwise a new traversal
    /// starts and `callbacks` are retained to answer every waiter.
    ///
    /// A unit handle starts at most one traversal over its lifetime: its
    /// countdown belongs to that traversal. Submitting an already admitted
    /// handle while its key is idle (after completion or eviction) returns
    /// [`Admission::Rejected`] and fires no callback; submit a fresh
    /// [`Unit`] instead.
    ///
    /// Never waits for pipeline work. Must be called with no dispatcher
    /// callback on the stack.
    pub fn submit(&self, unit: Unit, callbacks: Callbacks) -> Admission {
        let shared = &self.shared;
        shared.stats.record_request();

        let key = unit.token().id().clone();
        let supervisor = CancellationToken::new();

        let seq = {
            let mut state = shared.state.lock();

            let existing = state
                .in_flight
                .get(&key)
                .map(|entry| (entry.seq, entry.unit.clone()));

            if let Some((seq, admitted)) = existing {
                let processed = admitted.bump_processed();
                admitted.set_status(UnitStatus::Coalesced);
                state.waiting.add(seq, unit);
                let waiters = state.waiting.get(seq).len();
                drop(state);

                let coalesced = shared.stats.record_coalesced();
                debug!(
                    dispatcher = %shared.config.name,
                    key = %key,
                    seq,
                    processed,
                    waiters,
                    coalesced,
                    "Coalescing request - waiting for in-flight traversal"
                );
                shared.emit(DispatchEvent::Coalesced, &admitted);
                return Admission::Coalesced { seq };
            }

            let previous = unit.seq();
            if previous != 0 {
                drop(state);
                shared.stats.record_rejected();
                warn!(
                    dispatcher = %shared.config.name,
                    key = %key,
                    seq = previous,
                    "Rejected resubmission of an already admitted unit"
                );
                return Admission::Rejected { seq: previous };
            }

            state.next_seq += 1;
            let seq = state.next_seq;
            unit.assign_seq(seq);
            unit.reset_processed();
            unit.set_status(UnitStatus::Running);
            state.waiting.add(seq, unit.clone());
            state.in_flight.insert(
                key.clone(),
                InFlight {
                    seq,
                    unit: unit.clone(),
                    supervisor: supervisor.clone(),
                },
            );
            debug!(
                dispatcher = %shared.config.name,
                key = %key,
                seq,
                in_flight = state.in_flight.len(),
                "New request - starting traversal"
            );
            seq
        };

        shared.stats.record_admitted();
        if let Some(on_admit) = &callbacks.on_admit {
            invoke(on_admit, &Delivery::for_waiter(&unit, &unit));
        }
        shared.emit(DispatchEvent::Admitted, &unit);

        let watchdog = TimeoutSupervisor::new(
            Arc::clone(shared),
            key.clone(),
            seq,
            unit.clone(),
            callbacks.clone(),
        );
        shared.runtime.spawn(watchdog.run(supervisor.clone()));

        let traversal = Traversal::new(Arc::clone(shared), key, seq, unit, callbacks, supervisor);
        shared.runtime.spawn(traversal.run());

        Admission::Admitted { seq }
    }

    /// Returns true if a traversal is running for the unit's identity key.
    pub fn is_in_flight(&self, unit: &Unit) -> bool {
        self.is_key_in_flight(unit.token().id())
    }

    /// Returns true if a traversal is running for `key`.
    pub fn is_key_in_flight(&self, key: &TokenId) -> bool {
        self.shared.state.lock().in_flight.contains_key(key)
    }

    /// Returns the admitted unit for every running traversal.
    ///
    /// The snapshot is taken under the dispatcher lock, ordered by sequence
    /// number.
    pub fn list_in_flight(&self) -> Vec<Unit> {
        let state = self.shared.state.lock();
        let mut entries: Vec<(u64, Unit)> = state
            .in_flight
            .values()
            .map(|entry| (entry.seq, entry.unit.clone()))
            .collect();
        drop(state);

        entries.sort_by_key(|(seq, _)| *seq);
        entries.into_iter().map(|(_, unit)| unit).collect()
    }

    /// Returns the number of running traversals.
    pub fn in_flight_count(&self) -> usize {
        self.shared.state.lock().in_flight.len()
    }

    /// Returns how many requests are still waiting on `key`'s traversal.
    pub fn waiting_count(&self, key: &TokenId) -> usize {
        let state = self.shared.state.lock();
        state
            .in_flight
            .get(key)
            .map_or(0, |entry| state.waiting.get(entry.seq).len())
    }

    /// Forcibly removes `key` from the in-flight table.
    ///
    /// For traversals stuck behind a stage that never completes. Queued
    /// waiters are dropped without notification, the supervisor stops, and
    /// a later completion of the evicted traversal is ignored. Returns the
    /// evicted unit, or `None` if nothing was in flight.
    pub fn evict(&self, key: &TokenId) -> Option<Unit> {
        let shared = &self.shared;
        let (entry, dropped) = {
            let mut state = shared.state.lock();
            let entry = state.in_flight.remove(key)?;
            let dropped = state.waiting.get(entry.seq).len();
            state.waiting.remove(entry.seq);
            (entry, dropped)
        };

        entry.supervisor.cancel();
        entry.unit.set_status(UnitStatus::Evicted);
        shared.stats.record_evicted();
        warn!(
            dispatcher = %shared.config.name,
            key = %key,
            seq = entry.seq,
            dropped_waiters = dropped,
            age_ms = entry.unit.age().as_millis() as u64,
            "Evicted in-flight unit"
        );
        shared.emit(DispatchEvent::Evicted, &entry.unit);
        Some(entry.unit)
    }

    /// Returns a snapshot of the statistics.
    pub fn stats(&self) -> DispatcherStats {
        self.shared.stats.snapshot()
    }

    /// Logs current statistics.
    pub fn log_stats(&self) {
        let stats = self.stats();
        let in_flight = self.in_flight_count();

        info!(
            dispatcher = %self.shared.config.name,
            total_requests = stats.total_requests,
            admitted = stats.admitted,
            coalesced = stats.coalesced,
            completed = stats.completed,
            timeout_notices = stats.timeout_notices,
            evicted = stats.evicted,
            rejected = stats.rejected,
            in_flight,
            stage_time_ms = self.stage_time().as_millis() as u64,
            coalescing_ratio = format!("{:.1}%", stats.coalescing_ratio() * 100.0),
            "Dispatcher statistics"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Pipeline;
    use crate::stage::{Stage, StageError};
    use crate::token::{Routing, Token};
    use futures::future::BoxFuture;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Never finishes; keeps its unit in flight.
    struct Stuck {
        calls: AtomicUsize,
    }

    impl Stage for Stuck {
        fn name(&self) -> &str {
            "stuck"
        }

        fn process<'a>(&'a self, _unit: &'a Unit) -> BoxFuture<'a, Result<(), StageError>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(std::future::pending())
        }

        fn stats(&self) -> Duration {
            Duration::ZERO
        }
    }

    fn stuck_dispatcher() -> (Dispatcher, Arc<Stuck>) {
        let stuck = Arc::new(Stuck {
            calls: AtomicUsize::new(0),
        });
        let dispatcher = Dispatcher::builder()
            .pipeline(Pipeline::new().pipe(stuck.clone()))
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap();
        (dispatcher, stuck)
    }

    fn unit(id: &str, correlation: &str) -> Unit {
        Unit::new(Token::new(id).with_routing(Routing::new(correlation, "addr", "dst")))
    }

    #[tokio::test]
    async fn test_first_submission_is_admitted() {
        let (dispatcher, _) = stuck_dispatcher();
        let u = unit("a", "c1");

        let admission = dispatcher.submit(u.clone(), Callbacks::new());

        assert!(admission.is_admitted());
        assert_eq!(admission.seq(), 1);
        assert_eq!(u.seq(), 1);
        assert_eq!(u.processed(), 1);
        assert_eq!(u.status(), UnitStatus::Running);
        assert!(dispatcher.is_in_flight(&u));
    }

    #[tokio::test]
    async fn test_duplicate_is_coalesced() {
        let (dispatcher, stuck) = stuck_dispatcher();
        let first = unit("a", "c1");
        let second = unit("a", "c2");
        let admits = Arc::new(AtomicUsize::new(0));

        let a = Arc::clone(&admits);
        let cb = Callbacks::new().on_admit(move |_| {
            a.fetch_add(1, Ordering::SeqCst);
        });
        dispatcher.submit(first.clone(), cb.clone());
        let admission = dispatcher.submit(second.clone(), cb);

        assert_eq!(admission, Admission::Coalesced { seq: 1 });
        assert_eq!(admits.load(Ordering::SeqCst), 1);
        assert_eq!(first.processed(), 2);
        assert_eq!(first.status(), UnitStatus::Coalesced);
        // Duplicate never gets a sequence number of its own
        assert_eq!(second.seq(), 0);
        assert_eq!(dispatcher.waiting_count(first.token().id()), 2);
        assert_eq!(dispatcher.in_flight_count(), 1);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(stuck.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_distinct_keys_admitted_separately() {
        let (dispatcher, _) = stuck_dispatcher();

        let a = dispatcher.submit(unit("a", "x"), Callbacks::new());
        let b = dispatcher.submit(unit("b", "x"), Callbacks::new());

        assert!(a.is_admitted());
        assert!(b.is_admitted());
        assert_eq!(b.seq(), 2);

        let listed: Vec<_> = dispatcher
            .list_in_flight()
            .iter()
            .map(|u| u.token().id().to_string())
            .collect();
        assert_eq!(listed, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_is_in_flight_has_no_side_effects() {
        let (dispatcher, _) = stuck_dispatcher();
        let u = unit("a", "x");

        assert!(!dispatcher.is_in_flight(&u));
        assert!(!dispatcher.is_in_flight(&u));
        assert_eq!(dispatcher.stats().total_requests, 0);
        assert_eq!(u.status(), UnitStatus::Pending);
    }

    #[tokio::test]
    async fn test_evict_removes_entry_and_allows_readmission() {
        let (dispatcher, stuck) = stuck_dispatcher();
        let first = unit("a", "c1");
        let key = first.token().id().clone();
        dispatcher.submit(first.clone(), Callbacks::new());
        dispatcher.submit(unit("a", "c2"), Callbacks::new());

        let evicted = dispatcher.evict(&key).unwrap();

        assert!(evicted.same_as(&first));
        assert_eq!(first.status(), UnitStatus::Evicted);
        assert!(!dispatcher.is_key_in_flight(&key));
        assert_eq!(dispatcher.waiting_count(&key), 0);
        assert!(dispatcher.evict(&key).is_none());
        assert_eq!(dispatcher.stats().evicted, 1);

        let again = dispatcher.submit(unit("a", "c3"), Callbacks::new());
        assert_eq!(again, Admission::Admitted { seq: 2 });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(stuck.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_readmitting_evicted_handle_is_rejected() {
        let (dispatcher, stuck) = stuck_dispatcher();
        let first = unit("a", "c1");
        let key = first.token().id().clone();
        dispatcher.submit(first.clone(), Callbacks::new());
        tokio::time::sleep(Duration::from_millis(20)).await;
        dispatcher.evict(&key);

        let again = dispatcher.submit(first.clone(), Callbacks::new());

        assert_eq!(again, Admission::Rejected { seq: 1 });
        assert!(!again.is_admitted());
        assert!(!dispatcher.is_key_in_flight(&key));
        assert_eq!(first.status(), UnitStatus::Evicted);
        assert_eq!(dispatcher.stats().rejected, 1);

        // The evicted traversal's stage is the only one that ever ran
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(stuck.calls.load(Ordering::SeqCst), 1);

        // A fresh handle for the same key is admitted normally
        let fresh = dispatcher.submit(unit("a", "c2"), Callbacks::new());
        assert_eq!(fresh, Admission::Admitted { seq: 2 });
    }

    #[tokio::test]
    async fn test_panicking_on_admit_still_starts_traversal() {
        let (dispatcher, stuck) = stuck_dispatcher();
        let u = unit("a", "c1");

        let admission = dispatcher.submit(
            u.clone(),
            Callbacks::new().on_admit(|_| panic!("admit handler bug")),
        );

        assert!(admission.is_admitted());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(stuck.calls.load(Ordering::SeqCst), 1);
        assert!(dispatcher.is_in_flight(&u));
    }

    #[tokio::test]
    async fn test_events_fire_for_admission_and_coalescing() {
        let (dispatcher, _) = stuck_dispatcher();
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));

        for event in [DispatchEvent::Admitted, DispatchEvent::Coalesced] {
            let seen = Arc::clone(&seen);
            dispatcher.events().on(event.name(), move |u: &Unit| {
                seen.lock().push((event, u.seq()));
            });
        }

        dispatcher.submit(unit("a", "1"), Callbacks::new());
        dispatcher.submit(unit("a", "2"), Callbacks::new());

        assert_eq!(
            *seen.lock(),
            vec![(DispatchEvent::Admitted, 1), (DispatchEvent::Coalesced, 1)]
        );
    }
}
