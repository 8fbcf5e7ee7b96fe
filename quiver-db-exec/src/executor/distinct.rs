//! Distinct-collect executor
//!
//! Emits each distinct value of one input register once, in first-seen
//! order, into an output register. Nothing else is copied through.
//!
//! The seen-set is updated while skipping too: a value skipped once must
//! not reappear later as "new". Memory grows with the number of distinct
//! values; `max_distinct` bounds it.

use super::{prefetch_call, ProduceResult, SkipResult};
use crate::block::InputRow;
use crate::call::Call;
use crate::error::{QueryError, Result};
use crate::input_range::InputRange;
use crate::output::OutputSink;
use crate::register::{RegisterId, RegisterInfos};
use crate::stats::ExecutionStats;
use quiver_db_core::Value;
use rustc_hash::FxHashSet;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistinctCollectInfos {
    /// Register whose values are deduplicated
    pub input: RegisterId,
    /// Register receiving each distinct value
    pub output: RegisterId,
    pub registers: RegisterInfos,
    /// Upper bound on distinct values per sub-execution
    pub max_distinct: Option<usize>,
}

impl DistinctCollectInfos {
    pub fn new(width: usize, input: RegisterId, output: RegisterId) -> Self {
        Self {
            input,
            output,
            registers: RegisterInfos::keep_none(width),
            max_distinct: None,
        }
    }

    pub fn with_max_distinct(mut self, max: usize) -> Self {
        self.max_distinct = Some(max);
        self
    }
}

#[derive(Debug)]
pub struct DistinctCollectExecutor {
    infos: Arc<DistinctCollectInfos>,
    seen: FxHashSet<Value>,
}

impl DistinctCollectExecutor {
    pub fn new(infos: Arc<DistinctCollectInfos>) -> Self {
        Self {
            infos,
            seen: FxHashSet::default(),
        }
    }

    pub fn registers(&self) -> &RegisterInfos {
        &self.infos.registers
    }

    /// Distinct values seen in the current sub-execution
    pub fn unique_count(&self) -> usize {
        self.seen.len()
    }

    pub fn reset(&mut self) {
        self.seen.clear();
    }

    /// Record `value`; returns it when it was not seen before
    fn insert(&mut self, value: &Value) -> Result<Option<Value>> {
        if self.seen.contains(value) {
            return Ok(None);
        }
        if let Some(max) = self.infos.max_distinct {
            if self.seen.len() >= max {
                return Err(QueryError::ResourceLimit(format!(
                    "distinct collect exceeded {} distinct values",
                    max
                )));
            }
        }
        self.seen.insert(value.clone());
        Ok(Some(value.clone()))
    }

    fn read_input(&self, row: &InputRow) -> Result<Value> {
        row.value(self.infos.input).cloned().ok_or_else(|| {
            QueryError::internal(format!(
                "distinct input {} outside row width {}",
                self.infos.input,
                row.width()
            ))
        })
    }

    pub fn produce_rows(
        &mut self,
        input: &mut InputRange,
        output: &mut OutputSink,
    ) -> Result<ProduceResult> {
        while !output.is_full() && input.has_data_row() {
            let (_, row) = input.next_data_row()?;
            let value = self.read_input(&row)?;
            if let Some(value) = self.insert(&value)? {
                output.write_value(self.infos.output, value)?;
                output.advance_row()?;
            }
        }

        Ok(ProduceResult {
            state: input.upstream_state(),
            stats: ExecutionStats::default(),
            upstream_call: prefetch_call(output.client_call(), 0),
        })
    }

    pub fn skip_rows_range(&mut self, input: &mut InputRange, call: &Call) -> Result<SkipResult> {
        let amount = call.skip_amount();
        let mut skipped = 0;
        while skipped < amount && input.has_data_row() {
            let (_, row) = input.next_data_row()?;
            let value = self.read_input(&row)?;
            if self.insert(&value)?.is_some() {
                skipped += 1;
            }
        }

        let still_to_skip = call.get_offset().saturating_sub(skipped);
        Ok(SkipResult {
            state: input.upstream_state(),
            stats: ExecutionStats::default(),
            skipped,
            upstream_call: prefetch_call(call, still_to_skip),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::test_support::{input_of, sink, written};
    use crate::state::ExecutorState;

    fn ints(values: &[i64]) -> Vec<Value> {
        values.iter().map(|v| Value::Int(*v)).collect()
    }

    fn executor(infos: DistinctCollectInfos) -> DistinctCollectExecutor {
        DistinctCollectExecutor::new(Arc::new(infos))
    }

    #[test]
    fn test_first_seen_order() {
        let mut exec = executor(DistinctCollectInfos::new(1, RegisterId(0), RegisterId(0)));
        let mut input = input_of(&ints(&[1, 1, 2, 2, 3]));
        let mut out = sink(Call::with_limit(10), exec.registers().clone());

        let result = exec.produce_rows(&mut input, &mut out).unwrap();
        assert_eq!(result.state, ExecutorState::Done);
        assert_eq!(written(out, RegisterId(0)), ints(&[1, 2, 3]));
        assert_eq!(exec.unique_count(), 3);
    }

    #[test]
    fn test_skip_updates_seen_set() {
        let mut exec = executor(DistinctCollectInfos::new(1, RegisterId(0), RegisterId(0)));
        let mut input = input_of(&ints(&[1, 1, 2, 1, 2, 3]));

        let result = exec
            .skip_rows_range(&mut input, &Call::with_limit(10).with_offset(1))
            .unwrap();
        assert_eq!(result.skipped, 1);

        let mut out = sink(Call::with_limit(10), exec.registers().clone());
        exec.produce_rows(&mut input, &mut out).unwrap();
        // 1 was skipped and stays skipped
        assert_eq!(written(out, RegisterId(0)), ints(&[2, 3]));
    }

    #[test]
    fn test_interleaving_does_not_change_output() {
        let values = ints(&[1, 1, 2, 2, 3]);
        let mut exec = executor(DistinctCollectInfos::new(1, RegisterId(0), RegisterId(0)));
        let mut input = input_of(&values);
        let mut collected = Vec::new();
        // One row per pull
        loop {
            let mut out = sink(Call::with_limit(1), exec.registers().clone());
            let result = exec.produce_rows(&mut input, &mut out).unwrap();
            collected.extend(written(out, RegisterId(0)));
            if result.state == ExecutorState::Done {
                break;
            }
        }
        assert_eq!(collected, ints(&[1, 2, 3]));
    }

    #[test]
    fn test_max_distinct() {
        let mut exec = executor(
            DistinctCollectInfos::new(1, RegisterId(0), RegisterId(0)).with_max_distinct(2),
        );
        let mut input = input_of(&ints(&[1, 2, 1, 3]));
        let mut out = sink(Call::unlimited(), exec.registers().clone());
        let err = exec.produce_rows(&mut input, &mut out).unwrap_err();
        assert!(matches!(err, QueryError::ResourceLimit(_)));
    }

    #[test]
    fn test_reset_clears_seen() {
        let mut exec = executor(DistinctCollectInfos::new(1, RegisterId(0), RegisterId(0)));
        let mut input = input_of(&ints(&[1]));
        let mut out = sink(Call::unlimited(), exec.registers().clone());
        exec.produce_rows(&mut input, &mut out).unwrap();
        exec.reset();
        assert_eq!(exec.unique_count(), 0);
    }
}
