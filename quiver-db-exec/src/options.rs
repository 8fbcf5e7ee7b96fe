//! Pipeline execution options
//!
//! Parsed from the same JSON `opts` object that carries tracking options, so
//! a caller can hand the query's options over unchanged.

use quiver_db_core::TrackingOptions;
use serde_json::Value as JsonValue;

/// Default rows per block
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Default bound on vertices a single traversal may visit
pub const DEFAULT_MAX_VISITED: usize = 10_000;

/// Options for one pipeline execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOptions {
    /// Physical capacity of every block produced by a pipeline block
    pub batch_size: usize,
    /// Traversal visit bound used when the traversal node sets none
    pub max_visited: usize,
    /// Time and fuel tracking
    pub tracking: TrackingOptions,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_visited: DEFAULT_MAX_VISITED,
            tracking: TrackingOptions::default(),
        }
    }
}

impl ExecutionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the batch size (at least 1)
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Set the default traversal visit bound
    pub fn with_max_visited(mut self, max_visited: usize) -> Self {
        self.max_visited = max_visited;
        self
    }

    /// Set tracking options
    pub fn with_tracking(mut self, tracking: TrackingOptions) -> Self {
        self.tracking = tracking;
        self
    }

    /// Parse options from a JSON `opts` object value.
    ///
    /// Recognized keys:
    /// - `batch-size` (also `batchSize`, `batch_size`): positive integer
    /// - `max-visited` (also `maxVisited`, `max_visited`): positive integer
    /// - tracking keys (`meta`, `max-fuel`), see [`TrackingOptions::from_opts_value`]
    ///
    /// Missing, zero, or non-integer values fall back to the defaults.
    pub fn from_opts_value(opts: Option<&JsonValue>) -> Self {
        let tracking = TrackingOptions::from_opts_value(opts);
        let Some(obj) = opts.and_then(|v| v.as_object()) else {
            return Self::default().with_tracking(tracking);
        };

        let lookup = |keys: [&str; 3]| -> Option<usize> {
            keys.iter()
                .find_map(|k| obj.get(*k))
                .and_then(|v| v.as_u64())
                .filter(|v| *v > 0)
                .and_then(|v| usize::try_from(v).ok())
        };

        Self {
            batch_size: lookup(["batch-size", "batchSize", "batch_size"])
                .unwrap_or(DEFAULT_BATCH_SIZE),
            max_visited: lookup(["max-visited", "maxVisited", "max_visited"])
                .unwrap_or(DEFAULT_MAX_VISITED),
            tracking,
        }
    }
}
