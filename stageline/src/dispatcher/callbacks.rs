//! Caller callbacks and per-waiter deliveries.
//!
//! The pipeline runs once per identity key, but every coalesced request must
//! be answered on its own channel. A [`Delivery`] pairs the shared admitted
//! unit with a token carrying one waiter's routing. Deliveries are built
//! fresh for each callback invocation; the admitted unit's own token is
//! never rewritten.

use crate::token::{Routing, Token};
use crate::unit::Unit;
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::warn;

/// Callback invoked with one delivery.
pub type Callback = Arc<dyn Fn(&Delivery) + Send + Sync>;

/// What one waiter receives.
#[derive(Clone)]
pub struct Delivery {
    unit: Unit,
    token: Token,
    waiter: Unit,
}

impl Delivery {
    /// Builds the delivery for `waiter` from the admitted unit.
    pub(crate) fn for_waiter(admitted: &Unit, waiter: &Unit) -> Self {
        Self {
            unit: admitted.clone(),
            token: admitted.token().readdressed(waiter.token().routing()),
            waiter: waiter.clone(),
        }
    }

    /// The unit that traversed the pipeline, with the shared output.
    pub fn unit(&self) -> &Unit {
        &self.unit
    }

    /// Admitted identity with this waiter's routing.
    pub fn token(&self) -> &Token {
        &self.token
    }

    /// This waiter's routing metadata.
    pub fn routing(&self) -> &Routing {
        self.token.routing()
    }

    /// The unit this waiter originally submitted.
    pub fn waiter(&self) -> &Unit {
        &self.waiter
    }

    /// Returns true if this waiter is the request that started the traversal.
    pub fn is_admitting(&self) -> bool {
        self.unit.same_as(&self.waiter)
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("seq", &self.unit.seq())
            .field("token", &self.token)
            .field("admitting", &self.is_admitting())
            .finish()
    }
}

/// The three callbacks a submission may carry.
///
/// Only the admitting submission's callbacks are used: duplicates are
/// answered through them, addressed by their own routing.
#[derive(Clone, Default)]
pub struct Callbacks {
    pub(crate) on_admit: Option<Callback>,
    pub(crate) on_success: Option<Callback>,
    pub(crate) on_timeout: Option<Callback>,
}

impl Callbacks {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs once when the submission starts a new traversal.
    pub fn on_admit<F>(mut self, f: F) -> Self
    where
        F: Fn(&Delivery) + Send + Sync + 'static,
    {
        self.on_admit = Some(Arc::new(f));
        self
    }

    /// Runs once per waiter when the traversal completes.
    pub fn on_success<F>(mut self, f: F) -> Self
    where
        F: Fn(&Delivery) + Send + Sync + 'static,
    {
        self.on_success = Some(Arc::new(f));
        self
    }

    /// Runs once per waiter still queued when a timeout tick fires.
    pub fn on_timeout<F>(mut self, f: F) -> Self
    where
        F: Fn(&Delivery) + Send + Sync + 'static,
    {
        self.on_timeout = Some(Arc::new(f));
        self
    }
}

impl fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callbacks")
            .field("on_admit", &self.on_admit.is_some())
            .field("on_success", &self.on_success.is_some())
            .field("on_timeout", &self.on_timeout.is_some())
            .finish()
    }
}

/// Invokes `callback` once per waiter, each with its own delivery.
///
/// A panicking callback is logged and skipped; the remaining waiters are
/// still notified. Returns how many waiters were visited.
pub(crate) fn notify(callback: Option<&Callback>, admitted: &Unit, waiters: &[Unit]) -> usize {
    if let Some(callback) = callback {
        for waiter in waiters {
            invoke(callback, &Delivery::for_waiter(admitted, waiter));
        }
    }
    waiters.len()
}

/// Runs one callback, containing any panic.
///
/// Returns false if the callback panicked. Callers may hold the dispatcher
/// lock, so an unwinding callback must never escape past the bookkeeping
/// that follows it.
pub(crate) fn invoke(callback: &Callback, delivery: &Delivery) -> bool {
    match panic::catch_unwind(AssertUnwindSafe(|| callback(delivery))) {
        Ok(()) => true,
        Err(payload) => {
            warn!(
                key = %delivery.token().id(),
                seq = delivery.unit().seq(),
                correlation_key = %delivery.routing().correlation_key,
                panic = %panic_message(payload.as_ref()),
                "Callback panicked; continuing"
            );
            false
        }
    }
}

/// Extracts a readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
