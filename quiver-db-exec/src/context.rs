//! Execution context shared by every block of one pipeline

use crate::options::ExecutionOptions;
use quiver_db_core::Tracker;

/// Per-query execution context
///
/// Each query execution gets its own context; blocks hold clones of the
/// tracker, so killing it through any handle stops the whole pipeline.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// Execution options
    pub options: ExecutionOptions,
    /// Abort signal, fuel and timing
    pub tracker: Tracker,
}

impl ExecutionContext {
    /// Context whose tracker follows `options.tracking`
    pub fn new(options: ExecutionOptions) -> Self {
        let tracker = Tracker::new(options.tracking.clone());
        Self { options, tracker }
    }

    /// Replace the tracker, e.g. with one the caller already holds a handle to
    pub fn with_tracker(mut self, tracker: Tracker) -> Self {
        self.tracker = tracker;
        self
    }

    /// Set the batch size
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.options = self.options.with_batch_size(batch_size);
        self
    }

    pub fn batch_size(&self) -> usize {
        self.options.batch_size
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new(ExecutionOptions::default())
    }
}
