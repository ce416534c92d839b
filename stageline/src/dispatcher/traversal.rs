//! Stage-group walk for one admitted unit.
//!
//! The traversal runs as its own task and carries an explicit cursor into
//! the pipeline:
//!
//! ```text
//! cursor ──► group_at(cursor) ──None──► complete
//!                 │
//!               Some(range)
//!                 │
//!   arm countdown(range.len()), spawn one task per stage
//!                 │
//!   countdown hits zero ──► oneshot ──► cursor = range.end + 1
//! ```
//!
//! Stage tasks hold a completion guard, so every stage reports exactly one
//! completion whether it succeeds, fails or panics.

use super::callbacks::{panic_message, Callbacks};
use super::core::Shared;
use crate::stage::{Stage, StageError};
use crate::token::TokenId;
use crate::unit::Unit;
use futures::FutureExt;
use std::ops::Range;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Walks one unit through the pipeline, group by group.
pub(crate) struct Traversal {
    shared: Arc<Shared>,
    key: TokenId,
    seq: u64,
    unit: Unit,
    callbacks: Callbacks,
    supervisor: CancellationToken,
    cursor: usize,
}

impl Traversal {
    pub(crate) fn new(
        shared: Arc<Shared>,
        key: TokenId,
        seq: u64,
        unit: Unit,
        callbacks: Callbacks,
        supervisor: CancellationToken,
    ) -> Self {
        Self {
            shared,
            key,
            seq,
            unit,
            callbacks,
            supervisor,
            cursor: 0,
        }
    }

    /// Runs every group in order, then completes the unit.
    pub(crate) async fn run(mut self) {
        let started = Instant::now();
        let mut groups = 0usize;

        while let Some(group) = self.shared.pipeline.group_at(self.cursor) {
            let next = group.end + 1;
            self.run_group(group).await;
            self.cursor = next;
            groups += 1;
        }

        debug!(
            dispatcher = %self.shared.config.name,
            key = %self.key,
            seq = self.seq,
            groups,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Traversal finished"
        );

        self.shared
            .complete(&self.key, self.seq, &self.unit, &self.callbacks);
        // Only after the in-flight entry is gone
        self.supervisor.cancel();
    }

    /// Dispatches one group and waits for its countdown to reach zero.
    async fn run_group(&self, group: Range<usize>) {
        let (tx, rx) = oneshot::channel();
        self.unit.alloc(group.len());
        self.unit.done(move || {
            let _ = tx.send(());
        });

        trace!(
            key = %self.key,
            seq = self.seq,
            start = group.start,
            stages = group.len(),
            "Dispatching stage group"
        );

        for index in group {
            let Some(stage) = self.shared.pipeline.step(index).and_then(|s| s.stage()) else {
                continue;
            };
            self.shared
                .runtime
                .spawn(run_stage(Arc::clone(stage), self.unit.clone(), self.seq));
        }

        if rx.await.is_err() {
            // The done callback was replaced or dropped without firing
            warn!(
                key = %self.key,
                seq = self.seq,
                "Stage group countdown dropped before reaching zero"
            );
        }
    }
}

/// Runs one stage against the unit and reports its completion.
async fn run_stage(stage: Arc<dyn Stage>, unit: Unit, seq: u64) {
    let _completion = unit.stage_completion();
    let started = Instant::now();

    let outcome = AssertUnwindSafe(async { stage.process(&unit).await })
        .catch_unwind()
        .await;
    let result = match outcome {
        Ok(result) => result,
        Err(payload) => Err(StageError::Panicked(panic_message(payload.as_ref()))),
    };

    match result {
        Ok(()) => trace!(
            stage = stage.name(),
            seq,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Stage completed"
        ),
        Err(e) => warn!(
            stage = stage.name(),
            seq,
            error = %e,
            "Stage reported failure; continuing pipeline"
        ),
    }
}
