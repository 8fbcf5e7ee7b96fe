//! Per-pull execution statistics

use serde::Serialize;
use std::ops::AddAssign;

/// Counters reported by executors and aggregated along the pipeline
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExecutionStats {
    /// Rows rejected by filters
    pub filtered: u64,
    /// Rows read from the row source
    pub scanned: u64,
    /// Vertices discovered by traversals
    pub traversed: u64,
    /// Input rows counted by limits with full count enabled
    #[serde(rename = "fullCount")]
    pub full_count: u64,
}

impl ExecutionStats {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl AddAssign for ExecutionStats {
    fn add_assign(&mut self, other: Self) {
        self.filtered += other.filtered;
        self.scanned += other.scanned;
        self.traversed += other.traversed;
        self.full_count += other.full_count;
    }
}
