//! Named-event registry.
//!
//! A small pub/sub point for observers that want to follow unit lifecycle
//! without being threaded through `submit`. The dispatcher triggers the
//! names in [`DispatchEvent`] on its own registry; callers may register any
//! other names on registries they own.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Lifecycle events emitted by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DispatchEvent {
    /// A unit was admitted and its traversal started
    Admitted,
    /// A duplicate request joined an in-flight traversal
    Coalesced,
    /// A traversal finished and waiters were notified
    Completed,
    /// A timeout tick notified waiters
    Timeout,
    /// An in-flight unit was forcibly removed
    Evicted,
}

impl DispatchEvent {
    /// Returns the registry name for this event.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Admitted => "admitted",
            Self::Coalesced => "coalesced",
            Self::Completed => "completed",
            Self::Timeout => "timeout",
            Self::Evicted => "evicted",
        }
    }
}

impl fmt::Display for DispatchEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Maps event names to ordered listener lists.
///
/// `on`, `off` and `listener_count` are serialized by one lock. `trigger`
/// only holds that lock while copying the listener list, then runs the copy
/// with the lock released, so a listener may register or remove listeners
/// itself.
///
/// The copy is the whole guarantee a trigger gives: an `off` (or `on`) that
/// lands while a trigger is running affects the next trigger, not the one
/// in progress. Listeners removed mid-trigger may still run once.
pub struct EventRegistry<T> {
    listeners: Mutex<HashMap<String, Vec<Listener<T>>>>,
}

impl<T> EventRegistry<T> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(HashMap::new()),
        }
    }

    /// Appends a listener for `name`.
    pub fn on<F>(&self, name: impl Into<String>, listener: F) -> &Self
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.listeners
            .lock()
            .entry(name.into())
            .or_default()
            .push(Arc::new(listener));
        self
    }

    /// Removes every listener for `name`.
    pub fn off(&self, name: &str) -> &Self {
        if let Some(list) = self.listeners.lock().get_mut(name) {
            list.clear();
        }
        self
    }

    /// Runs every listener registered for `name` when the call started, in
    /// registration order.
    ///
    /// Listeners stay registered. Returns how many ran.
    pub fn trigger(&self, name: &str, payload: &T) -> usize {
        let snapshot: Vec<Listener<T>> = match self.listeners.lock().get(name) {
            Some(list) => list.clone(),
            None => return 0,
        };

        for listener in &snapshot {
            listener(payload);
        }
        snapshot.len()
    }

    /// Returns the number of listeners registered for `name`.
    pub fn listener_count(&self, name: &str) -> usize {
        self.listeners.lock().get(name).map_or(0, Vec::len)
    }
}

impl<T> Default for EventRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for EventRegistry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let listeners = self.listeners.lock();
        let mut names: Vec<_> = listeners.iter().map(|(k, v)| (k.clone(), v.len())).collect();
        names.sort();
        f.debug_struct("EventRegistry")
            .field("listeners", &names)
            .finish()
    }
}
