//! The pipeline dispatcher.
//!
//! The dispatcher admits units, coalesces duplicates, walks each admitted
//! unit through the pipeline's stage groups and supervises waiters with a
//! soft timeout.
//!
//! # Architecture
//!
//! ```text
//! submit(A, key=7) ─┐
//!                   │                 ┌─────────────────────┐
//! submit(B, key=7) ─┼──► admission ──►│ in-flight table     │ one entry per key
//!                   │        │        │ wait list [A, B, C] │ one slot per seq
//! submit(C, key=7) ─┘        │        └─────────────────────┘
//!                            │ first only
//!                            ▼
//!                  ┌───────────────────┐    ┌─────────────────────┐
//!                  │ traversal task    │    │ timeout supervisor  │
//!                  │ group 0 ─► group 1│    │ tick: notify queued │
//!                  └─────────┬─────────┘    │ waiters, clear slot │
//!                            │              └─────────────────────┘
//!                            ▼
//!                  on_success for A, B, C (each with its own routing)
//! ```
//!
//! # Guarantees
//!
//! - Exactly one traversal per identity key while it is in flight
//! - Groups run in declared order; stages in a group run concurrently
//! - A timeout releases waiters only; the traversal keeps running and the
//!   key stays in flight until it completes
//! - The admitted unit's routing is never rewritten during fan-out
//!
//! # Locking
//!
//! One lock per dispatcher guards the in-flight table, the wait list and
//! the sequence counter. Fan-out callbacks run while it is held, so they
//! must not block and must not call back into the dispatcher. Lifecycle
//! events from [`Dispatcher::events`] run after it is released.

mod admission;
mod callbacks;
mod config;
mod core;
mod lifecycle;
mod stats;
mod supervisor;
mod traversal;

pub use admission::Admission;
pub use callbacks::{Callback, Callbacks, Delivery};
pub use config::DispatcherConfig;
pub use core::{Dispatcher, DispatcherBuilder};
pub use stats::DispatcherStats;
