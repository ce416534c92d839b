//! Ordered stage list with barriers.
//!
//! ```text
//! [A, B, │, C, │, D, E]
//!  └─┬─┘    └┬┘    └─┬─┘
//! group 0  group 1  group 2     groups run in order,
//!                               stages inside a group run concurrently
//! ```
//!
//! Consecutive barriers and a trailing barrier produce empty groups, which
//! are skipped rather than waited on.

use crate::stage::Stage;
use std::fmt;
use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;

/// One entry of the pipeline.
#[derive(Clone)]
pub enum Step {
    /// A stage handle
    Stage(Arc<dyn Stage>),
    /// Separates two concurrent groups
    Barrier,
}

impl Step {
    /// Returns true for the barrier marker.
    #[inline]
    pub fn is_barrier(&self) -> bool {
        matches!(self, Self::Barrier)
    }

    /// Returns the stage handle, if this is a stage.
    pub fn stage(&self) -> Option<&Arc<dyn Stage>> {
        match self {
            Self::Stage(stage) => Some(stage),
            Self::Barrier => None,
        }
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stage(stage) => write!(f, "Stage({})", stage.name()),
            Self::Barrier => f.write_str("Barrier"),
        }
    }
}

/// Ordered sequence of stages and barriers.
#[derive(Clone, Debug, Default)]
pub struct Pipeline {
    steps: Vec<Step>,
}

impl Pipeline {
    /// Creates an empty pipeline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a stage to the current group.
    pub fn pipe(mut self, stage: Arc<dyn Stage>) -> Self {
        self.steps.push(Step::Stage(stage));
        self
    }

    /// Closes the current group; later stages wait for it to finish.
    pub fn wait(mut self) -> Self {
        self.steps.push(Step::Barrier);
        self
    }

    /// Returns every step in declaration order.
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Returns the step at `index`.
    pub fn step(&self, index: usize) -> Option<&Step> {
        self.steps.get(index)
    }

    /// Returns the number of steps, barriers included.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns true if the pipeline has no steps at all.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Iterates over the stages, skipping barriers.
    pub fn stages(&self) -> impl Iterator<Item = &Arc<dyn Stage>> {
        self.steps.iter().filter_map(Step::stage)
    }

    /// Returns the next non-empty group starting at or after `start`.
    ///
    /// `None` means the walk is past the last stage and the pipeline is
    /// complete.
    pub fn group_at(&self, mut start: usize) -> Option<Range<usize>> {
        let len = self.steps.len();
        while start < len {
            let end = self.steps[start..]
                .iter()
                .position(Step::is_barrier)
                .map_or(len, |offset| start + offset);
            if end > start {
                return Some(start..end);
            }
            // Empty group: step over the barrier
            start = end + 1;
        }
        None
    }

    /// Iterates over all non-empty groups in order.
    pub fn groups(&self) -> Groups<'_> {
        Groups {
            pipeline: self,
            cursor: 0,
        }
    }

    /// Calls every stage's load hook.
    pub fn load(&self) {
        for stage in self.stages() {
            stage.load();
        }
    }

    /// Calls every stage's reload hook.
    pub fn reload(&self) {
        for stage in self.stages() {
            stage.reload();
        }
    }

    /// Sums every stage's cumulative processing time.
    pub fn stage_time(&self) -> Duration {
        self.stages().map(|stage| stage.stats()).sum()
    }
}

/// Iterator over a pipeline's stage groups.
pub struct Groups<'a> {
    pipeline: &'a Pipeline,
    cursor: usize,
}

impl Iterator for Groups<'_> {
    type Item = Range<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        let group = self.pipeline.group_at(self.cursor)?;
        self.cursor = group.end + 1;
        Some(group)
    }
}
