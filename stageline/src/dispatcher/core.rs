//! Dispatcher core - shared state and construction.
//!
//! This module contains the [`Dispatcher`] handle, its shared state and the
//! builder. Behavior is implemented in separate modules:
//! - `admission`: submission, deduplication, queries and eviction
//! - `lifecycle`: completion and timeout notification
//! - `traversal`: the stage-group walk
//! - `supervisor`: per-unit timeout ticks

use super::config::DispatcherConfig;
use super::stats::StatsCounters;
use crate::error::DispatcherError;
use crate::hooks::{DispatchEvent, EventRegistry};
use crate::pipeline::Pipeline;
use crate::stage::Stage;
use crate::token::TokenId;
use crate::unit::Unit;
use crate::wait_list::WaitList;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

/// An admitted unit and the handle that stops its supervisor.
pub(crate) struct InFlight {
    /// Sequence number assigned at this admission; also the wait-list key.
    pub(crate) seq: u64,
    pub(crate) unit: Unit,
    pub(crate) supervisor: CancellationToken,
}

/// Everything guarded by the dispatcher's single lock.
#[derive(Default)]
pub(crate) struct State {
    pub(crate) in_flight: HashMap<TokenId, InFlight>,
    pub(crate) waiting: WaitList,
    pub(crate) next_seq: u64,
}

impl State {
    /// Returns the in-flight entry for `key` only if it is still `seq`'s.
    pub(crate) fn owned_by(&self, key: &TokenId, seq: u64) -> Option<&InFlight> {
        self.in_flight.get(key).filter(|entry| entry.seq == seq)
    }
}

/// State shared between the dispatcher handle and its tasks.
pub(crate) struct Shared {
    pub(crate) state: Mutex<State>,
    pub(crate) pipeline: Pipeline,
    pub(crate) config: DispatcherConfig,
    pub(crate) stats: StatsCounters,
    pub(crate) events: EventRegistry<Unit>,
    pub(crate) runtime: Handle,
}

impl Shared {
    pub(crate) fn emit(&self, event: DispatchEvent, unit: &Unit) {
        self.events.trigger(event.name(), unit);
    }
}

/// Routes units through the pipeline.
///
/// Cloning the dispatcher yields another handle to the same in-flight table.
#[derive(Clone)]
pub struct Dispatcher {
    pub(crate) shared: Arc<Shared>,
}

impl Dispatcher {
    /// Starts building a dispatcher.
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::new()
    }

    /// Returns the configuration.
    pub fn config(&self) -> &DispatcherConfig {
        &self.shared.config
    }

    /// Returns the pipeline.
    pub fn pipeline(&self) -> &Pipeline {
        &self.shared.pipeline
    }

    /// Returns the lifecycle event registry.
    ///
    /// Listeners run after the dispatcher's lock is released and receive
    /// the admitted unit.
    pub fn events(&self) -> &EventRegistry<Unit> {
        &self.shared.events
    }

    /// Calls every stage's load hook.
    pub fn load(&self) -> &Self {
        self.shared.pipeline.load();
        self
    }

    /// Calls every stage's reload hook.
    pub fn reload(&self) -> &Self {
        self.shared.pipeline.reload();
        self
    }

    /// Sums the cumulative processing time reported by every stage.
    pub fn stage_time(&self) -> Duration {
        self.shared.pipeline.stage_time()
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("name", &self.shared.config.name)
            .field("pipeline", &self.shared.pipeline)
            .field("in_flight", &self.shared.state.lock().in_flight.len())
            .finish()
    }
}

/// Builder for [`Dispatcher`].
///
/// ```ignore
/// let dispatcher = Dispatcher::builder()
///     .pipe(fetch)
///     .pipe(lookup)
///     .wait()
///     .pipe(render)
///     .timeout(Duration::from_secs(5))
///     .build()?;
/// ```
pub struct DispatcherBuilder {
    pipeline: Pipeline,
    config: DispatcherConfig,
    runtime: Option<Handle>,
}

impl DispatcherBuilder {
    fn new() -> Self {
        Self {
            pipeline: Pipeline::new(),
            config: DispatcherConfig::default(),
            runtime: None,
        }
    }

    /// Appends a stage to the current group.
    pub fn pipe(mut self, stage: Arc<dyn Stage>) -> Self {
        self.pipeline = self.pipeline.pipe(stage);
        self
    }

    /// Closes the current group.
    pub fn wait(mut self) -> Self {
        self.pipeline = self.pipeline.wait();
        self
    }

    /// Replaces the whole pipeline.
    pub fn pipeline(mut self, pipeline: Pipeline) -> Self {
        self.pipeline = pipeline;
        self
    }

    /// Replaces the configuration.
    pub fn config(mut self, config: DispatcherConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the timeout tick interval.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Sets the name used in log events.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    /// Runs tasks on this runtime instead of the current one.
    pub fn runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    /// Builds the dispatcher.
    ///
    /// # Errors
    ///
    /// - [`DispatcherError::InvalidTimeout`] for a zero timeout
    /// - [`DispatcherError::NoRuntime`] when no runtime handle was given and
    ///   the caller is not inside a tokio runtime
    pub fn build(self) -> Result<Dispatcher, DispatcherError> {
        if self.config.timeout.is_zero() {
            return Err(DispatcherError::InvalidTimeout);
        }

        let runtime = match self.runtime {
            Some(handle) => handle,
            None => Handle::try_current().map_err(|e| DispatcherError::NoRuntime(e.to_string()))?,
        };

        tracing::debug!(
            dispatcher = %self.config.name,
            steps = self.pipeline.len(),
            groups = self.pipeline.groups().count(),
            timeout_ms = self.config.timeout.as_millis() as u64,
            "Dispatcher built"
        );

        Ok(Dispatcher {
            shared: Arc::new(Shared {
                state: Mutex::new(State::default()),
                pipeline: self.pipeline,
                config: self.config,
                stats: StatsCounters::default(),
                events: EventRegistry::new(),
                runtime,
            }),
        })
    }
}

impl Default for DispatcherBuilder {
    fn default() -> Self {
        Self::new()
    }
}
