//! Limit executor
//!
//! Emits the window `[offset, offset + limit)` of each sub-execution's input.
//! Its own offset is delegated upstream as a skip, and it never asks the
//! upstream for more rows than the window still needs. With `full_count`
//! set, every input row is also counted into `stats.full_count`; once the
//! window is served the rest of the input is skipped upstream and counted
//! rather than materialized.

use super::{ProduceResult, SkipResult};
use crate::call::Call;
use crate::error::Result;
use crate::input_range::InputRange;
use crate::output::OutputSink;
use crate::register::RegisterInfos;
use crate::state::ExecutorState;
use crate::stats::ExecutionStats;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimitInfos {
    pub registers: RegisterInfos,
    /// Input rows to drop first
    pub offset: usize,
    /// Maximum rows to emit after the offset
    pub limit: usize,
    /// Count all input rows, including those outside the window
    pub full_count: bool,
}

impl LimitInfos {
    pub fn new(width: usize, offset: usize, limit: usize) -> Self {
        Self {
            registers: RegisterInfos::keep_all(width),
            offset,
            limit,
            full_count: false,
        }
    }

    pub fn with_full_count(mut self) -> Self {
        self.full_count = true;
        self
    }
}

#[derive(Debug)]
pub struct LimitExecutor {
    infos: Arc<LimitInfos>,
    /// Input rows consumed or skipped in the current sub-execution
    seen: usize,
}

impl LimitExecutor {
    pub fn new(infos: Arc<LimitInfos>) -> Self {
        Self { infos, seen: 0 }
    }

    pub fn registers(&self) -> &RegisterInfos {
        &self.infos.registers
    }

    /// Input rows seen in the current sub-execution
    pub fn seen(&self) -> usize {
        self.seen
    }

    pub fn reset(&mut self) {
        self.seen = 0;
    }

    fn window_end(&self) -> usize {
        self.infos.offset.saturating_add(self.infos.limit)
    }

    fn count(&mut self, n: usize, stats: &mut ExecutionStats) {
        self.seen += n;
        if self.infos.full_count {
            stats.full_count += n as u64;
        }
    }

    /// Account for rows the upstream skipped for us, then drop whatever of
    /// our own offset is left from the rows in range
    fn skip_offset(&mut self, input: &mut InputRange, stats: &mut ExecutionStats) {
        let in_flight = input.take_skipped();
        self.count(in_flight, stats);
        if self.seen < self.infos.offset {
            let n = input.skip(self.infos.offset - self.seen);
            self.count(n, stats);
        }
    }

    /// State and upstream call once the rows in range are processed;
    /// `wanted` is how many more rows the served call can take
    fn settle(
        &mut self,
        input: &mut InputRange,
        stats: &mut ExecutionStats,
        wanted: usize,
    ) -> (ExecutorState, Call) {
        let end = self.window_end();
        if self.seen >= end {
            if !self.infos.full_count {
                return (ExecutorState::Done, Call::with_limit(0));
            }
            let n = input.skip_all_data_rows();
            self.count(n, stats);
            return (input.upstream_state(), Call::skip_to_end());
        }

        let upstream_call = if self.seen < self.infos.offset {
            Call::with_limit(self.infos.limit.min(wanted).max(1))
                .with_offset(self.infos.offset - self.seen)
        } else {
            Call::with_limit((end - self.seen).min(wanted).max(1))
        };
        (input.upstream_state(), upstream_call)
    }

    pub fn produce_rows(
        &mut self,
        input: &mut InputRange,
        output: &mut OutputSink,
    ) -> Result<ProduceResult> {
        let mut stats = ExecutionStats::default();
        self.skip_offset(input, &mut stats);

        let end = self.window_end();
        while self.seen < end && !output.is_full() && input.has_data_row() {
            let (_, row) = input.next_data_row()?;
            output.copy_row(&row)?;
            output.advance_row()?;
            self.count(1, &mut stats);
        }

        let wanted = output.client_call().get_limit();
        let (state, upstream_call) = self.settle(input, &mut stats, wanted);
        Ok(ProduceResult {
            state,
            stats,
            upstream_call,
        })
    }

    pub fn skip_rows_range(&mut self, input: &mut InputRange, call: &Call) -> Result<SkipResult> {
        let mut stats = ExecutionStats::default();
        self.skip_offset(input, &mut stats);

        let amount = call.skip_amount();
        let end = self.window_end();
        let mut skipped = 0;
        if self.seen >= self.infos.offset && self.seen < end {
            skipped = input.skip((end - self.seen).min(amount));
            self.count(skipped, &mut stats);
        }

        let (state, upstream_call) = self.settle(input, &mut stats, amount - skipped);
        Ok(SkipResult {
            state,
            stats,
            skipped,
            upstream_call,
        })
    }
}
