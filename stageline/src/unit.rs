//! Work items and their completion countdown.
//!
//! A [`Unit`] is a cheap-to-clone handle to one logical job. The caller
//! creates it, the dispatcher stamps a sequence number on it at admission,
//! and every stage of the pipeline receives a clone of the same handle.
//!
//! Each unit owns a [`Countdown`]. Before a stage group starts the dispatcher
//! arms it with the group size; each stage reports one completion and the
//! registered callback fires once the count reaches zero.

use crate::token::Token;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

/// Diagnostic status tag of a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum UnitStatus {
    /// Created, not yet submitted
    #[default]
    Pending,
    /// Admitted and traversing the pipeline
    Running,
    /// At least one duplicate request joined the traversal
    Coalesced,
    /// Waiters were told to stop waiting; the traversal continues
    TimedOut,
    /// Traversal finished and waiters were notified
    Completed,
    /// Forcibly removed from the in-flight table
    Evicted,
}

impl UnitStatus {
    /// Returns true once the dispatcher no longer tracks the unit.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Evicted)
    }
}

impl fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Coalesced => "coalesced",
            Self::TimedOut => "timed-out",
            Self::Completed => "completed",
            Self::Evicted => "evicted",
        };
        f.write_str(s)
    }
}

type ZeroCallback = Box<dyn FnOnce() + Send>;

struct CountdownState {
    remaining: usize,
    on_zero: Option<ZeroCallback>,
}

/// Fires a callback once a fixed number of completions have been reported.
///
/// The countdown can be re-armed with [`alloc`](Self::alloc) for each stage
/// group of the same unit. Completions reported while the count is already
/// zero are ignored.
pub struct Countdown {
    state: Mutex<CountdownState>,
}

impl Countdown {
    /// Creates a disarmed countdown.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(CountdownState {
                remaining: 0,
                on_zero: None,
            }),
        }
    }

    /// Arms the countdown to `n` outstanding completions.
    pub fn alloc(&self, n: usize) {
        self.state.lock().remaining = n;
    }

    /// Registers the zero callback, replacing any earlier registration.
    pub fn done<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.state.lock().on_zero = Some(Box::new(callback));
    }

    /// Reports one completion.
    ///
    /// Returns true if this completion brought the count to zero. The
    /// callback runs after the internal lock is released.
    pub fn complete_one(&self) -> bool {
        let callback = {
            let mut state = self.state.lock();
            if state.remaining == 0 {
                warn!("Countdown completion reported while not armed; ignoring");
                return false;
            }
            state.remaining -= 1;
            if state.remaining > 0 {
                return false;
            }
            state.on_zero.take()
        };

        if let Some(callback) = callback {
            callback();
        }
        true
    }

    /// Returns the number of outstanding completions.
    pub fn remaining(&self) -> usize {
        self.state.lock().remaining
    }
}

impl Default for Countdown {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Countdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Countdown")
            .field("remaining", &state.remaining)
            .field("armed", &state.on_zero.is_some())
            .finish()
    }
}

struct UnitInner {
    token: Token,
    seq: AtomicU64,
    processed: AtomicU32,
    status: Mutex<UnitStatus>,
    countdown: Countdown,
    attributes: Mutex<BTreeMap<String, String>>,
    created_at: Instant,
}

/// Shared handle to one work item.
///
/// Clones refer to the same unit. Stages write their shared output into the
/// attribute map; the dispatcher hands the same handle to every coalesced
/// waiter.
///
/// The countdown is driven by the dispatcher alone. Stages only resolve
/// their future; they cannot report completions themselves:
///
/// ```compile_fail
/// use stageline::{Token, Unit};
///
/// let unit = Unit::new(Token::new("k"));
/// let _guard = unit.stage_completion();
/// ```
#[derive(Clone)]
pub struct Unit {
    inner: Arc<UnitInner>,
}

impl Unit {
    /// Creates a pending unit for the given token.
    pub fn new(token: Token) -> Self {
        Self {
            inner: Arc::new(UnitInner {
                token,
                seq: AtomicU64::new(0),
                processed: AtomicU32::new(0),
                status: Mutex::new(UnitStatus::Pending),
                countdown: Countdown::new(),
                attributes: Mutex::new(BTreeMap::new()),
                created_at: Instant::now(),
            }),
        }
    }

    /// Returns the unit's token.
    #[inline]
    pub fn token(&self) -> &Token {
        &self.inner.token
    }

    /// Returns the dispatcher-assigned sequence number, 0 before admission.
    #[inline]
    pub fn seq(&self) -> u64 {
        self.inner.seq.load(Ordering::Acquire)
    }

    /// Stamps the sequence number. Only the first assignment sticks.
    pub(crate) fn assign_seq(&self, seq: u64) -> bool {
        self.inner
            .seq
            .compare_exchange(0, seq, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Returns how many requests this unit has served.
    #[inline]
    pub fn processed(&self) -> u32 {
        self.inner.processed.load(Ordering::Acquire)
    }

    pub(crate) fn reset_processed(&self) {
        self.inner.processed.store(1, Ordering::Release);
    }

    pub(crate) fn bump_processed(&self) -> u32 {
        self.inner.processed.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Returns the current status tag.
    pub fn status(&self) -> UnitStatus {
        *self.inner.status.lock()
    }

    /// Replaces the status tag.
    pub fn set_status(&self, status: UnitStatus) {
        *self.inner.status.lock() = status;
    }

    /// Returns the unit's countdown.
    #[inline]
    pub(crate) fn countdown(&self) -> &Countdown {
        &self.inner.countdown
    }

    /// Arms the countdown to `n` outstanding stage completions.
    pub(crate) fn alloc(&self, n: usize) {
        self.inner.countdown.alloc(n);
    }

    /// Registers the zero-countdown callback, replacing any earlier one.
    pub(crate) fn done<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.inner.countdown.done(callback);
    }

    /// Returns a guard that reports one completion when dropped.
    pub(crate) fn stage_completion(&self) -> StageCompletion {
        StageCompletion { unit: self.clone() }
    }

    /// Stores a value in the shared attribute map.
    pub fn set_attribute(&self, key: impl Into<String>, value: impl Into<String>) {
        self.inner.attributes.lock().insert(key.into(), value.into());
    }

    /// Reads a value from the shared attribute map.
    pub fn attribute(&self, key: &str) -> Option<String> {
        self.inner.attributes.lock().get(key).cloned()
    }

    /// Returns a copy of every attribute.
    pub fn attributes(&self) -> BTreeMap<String, String> {
        self.inner.attributes.lock().clone()
    }

    /// Returns the time since the unit was created.
    pub fn age(&self) -> Duration {
        self.inner.created_at.elapsed()
    }

    /// Returns true if both handles point to the same unit.
    pub fn same_as(&self, other: &Unit) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unit")
            .field("seq", &self.seq())
            .field("token", self.token())
            .field("processed", &self.processed())
            .field("status", &self.status())
            .finish()
    }
}

/// Reports exactly one stage completion into a unit's countdown on drop.
///
/// Holding one of these across a stage's work covers success, failure and
/// unwinding alike.
#[must_use = "dropping the guard reports the completion immediately"]
pub(crate) struct StageCompletion {
    unit: Unit,
}

impl Drop for StageCompletion {
    fn drop(&mut self) {
        self.unit.countdown().complete_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn test_unit() -> Unit {
        Unit::new(Token::new("unit-1"))
    }

    #[test]
    fn test_countdown_fires_once_at_zero() {
        let countdown = Countdown::new();
        let fired = Arc::new(AtomicUsize::new(0));

        countdown.alloc(3);
        let f = Arc::clone(&fired);
        countdown.done(move || {
            f.fetch_add(1, Ordering::SeqCst);
        });

        assert!(!countdown.complete_one());
        assert!(!countdown.complete_one());
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(countdown.complete_one());
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        // Extra completion is ignored
        assert!(!countdown.complete_one());
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_countdown_done_replaces_previous_callback() {
        let countdown = Countdown::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        countdown.alloc(1);
        let f = Arc::clone(&first);
        countdown.done(move || {
            f.fetch_add(1, Ordering::SeqCst);
        });
        let s = Arc::clone(&second);
        countdown.done(move || {
            s.fetch_add(1, Ordering::SeqCst);
        });

        countdown.complete_one();

        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_countdown_rearm_for_next_group() {
        let countdown = Countdown::new();
        let fired = Arc::new(AtomicUsize::new(0));

        for group_size in [2, 1] {
            countdown.alloc(group_size);
            let f = Arc::clone(&fired);
            countdown.done(move || {
                f.fetch_add(1, Ordering::SeqCst);
            });
            for _ in 0..group_size {
                countdown.complete_one();
            }
        }

        assert_eq!(fired.load(Ordering::SeqCst), 2);
        assert_eq!(countdown.remaining(), 0);
    }

    #[test]
    fn test_seq_assigned_once() {
        let unit = test_unit();
        assert_eq!(unit.seq(), 0);

        assert!(unit.assign_seq(5));
        assert!(!unit.assign_seq(9));
        assert_eq!(unit.seq(), 5);
    }

    #[test]
    fn test_processed_counter() {
        let unit = test_unit();
        unit.reset_processed();
        assert_eq!(unit.bump_processed(), 2);
        assert_eq!(unit.bump_processed(), 3);
        assert_eq!(unit.processed(), 3);
    }

    #[test]
    fn test_stage_completion_guard_reports_on_drop() {
        let unit = test_unit();
        let fired = Arc::new(AtomicUsize::new(0));

        unit.alloc(2);
        let f = Arc::clone(&fired);
        unit.done(move || {
            f.fetch_add(1, Ordering::SeqCst);
        });

        {
            let _a = unit.stage_completion();
            let _b = unit.stage_completion();
        }

        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_clones_share_attributes_and_status() {
        let unit = test_unit();
        let clone = unit.clone();

        clone.set_attribute("result", "ok");
        clone.set_status(UnitStatus::Running);

        assert_eq!(unit.attribute("result").as_deref(), Some("ok"));
        assert_eq!(unit.status(), UnitStatus::Running);
        assert!(unit.same_as(&clone));
        assert!(!unit.same_as(&test_unit()));
    }

    #[test]
    fn test_status_display_and_terminal() {
        assert_eq!(UnitStatus::TimedOut.to_string(), "timed-out");
        assert!(UnitStatus::Completed.is_terminal());
        assert!(UnitStatus::Evicted.is_terminal());
        assert!(!UnitStatus::TimedOut.is_terminal());
    }
}
