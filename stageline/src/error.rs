//! Dispatcher construction errors.
//!
//! Runtime outcomes are never errors: a submission either succeeds or times
//! out, and that is reported through callbacks. Only building a dispatcher
//! can fail.

use thiserror::Error;

/// Errors returned by [`DispatcherBuilder::build`](crate::DispatcherBuilder::build).
#[derive(Debug, Error)]
pub enum DispatcherError {
    /// No tokio runtime handle was supplied and none is current
    #[error("no tokio runtime available: {0}")]
    NoRuntime(String),

    /// Timeout interval must be non-zero
    #[error("timeout interval must be greater than zero")]
    InvalidTimeout,
}
