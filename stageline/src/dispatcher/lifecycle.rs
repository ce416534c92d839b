//! Completion and timeout notification.
//!
//! Both paths fan out to the wait list under the dispatcher lock and check
//! that the in-flight entry still belongs to the traversal's sequence
//! number, so a completion racing a tick (or an eviction) is observed in a
//! single order.

use super::callbacks::{notify, Callbacks};
use super::core::Shared;
use crate::hooks::DispatchEvent;
use crate::token::TokenId;
use crate::unit::{Unit, UnitStatus};
use tracing::{debug, info};

impl Shared {
    /// Finishes a traversal: notifies every waiter of success, then drops
    /// the wait-list slot and the in-flight entry.
    ///
    /// A no-op if the entry was evicted or already completed.
    pub(crate) fn complete(&self, key: &TokenId, seq: u64, unit: &Unit, callbacks: &Callbacks) {
        let notified = {
            let mut state = self.state.lock();
            if state.owned_by(key, seq).is_none() {
                debug!(
                    dispatcher = %self.config.name,
                    key = %key,
                    seq,
                    "Traversal finished after eviction; nothing to notify"
                );
                return;
            }

            let notified = notify(callbacks.on_success.as_ref(), unit, state.waiting.get(seq));
            state.waiting.remove(seq);
            state.in_flight.remove(key);
            unit.set_status(UnitStatus::Completed);
            notified
        };

        self.stats.record_completed();
        debug!(
            dispatcher = %self.config.name,
            key = %key,
            seq,
            waiters = notified,
            processed = unit.processed(),
            elapsed_ms = unit.age().as_millis() as u64,
            "Traversal complete - notified waiters"
        );
        self.emit(DispatchEvent::Completed, unit);
    }

    /// Handles one timeout tick: notifies every waiter still queued, then
    /// clears (but keeps) the wait-list slot.
    ///
    /// The in-flight entry and the traversal are left alone. Returns the
    /// number of waiters notified.
    pub(crate) fn expire_waiters(
        &self,
        key: &TokenId,
        seq: u64,
        unit: &Unit,
        callbacks: &Callbacks,
    ) -> usize {
        let notified = {
            let mut state = self.state.lock();
            if state.owned_by(key, seq).is_none() {
                return 0;
            }
            if state.waiting.get(seq).is_empty() {
                return 0;
            }

            let notified = notify(callbacks.on_timeout.as_ref(), unit, state.waiting.get(seq));
            unit.set_status(UnitStatus::TimedOut);
            state.waiting.clear(seq);
            notified
        };

        self.stats.record_timeout_notices(notified);
        info!(
            dispatcher = %self.config.name,
            key = %key,
            seq,
            waiters = notified,
            age_ms = unit.age().as_millis() as u64,
            "Timeout - released waiters; traversal continues"
        );
        self.emit(DispatchEvent::Timeout, unit);
        notified
    }
}
