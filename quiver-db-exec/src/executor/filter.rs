//! Filter executor
//!
//! Passes rows whose condition register is truthy. The condition is already
//! computed into a register by an earlier node; this executor only reads it.

use super::{prefetch_call, ProduceResult, SkipResult};
use crate::block::InputRow;
use crate::call::Call;
use crate::error::{QueryError, Result};
use crate::input_range::InputRange;
use crate::output::OutputSink;
use crate::register::{RegisterId, RegisterInfos};
use crate::stats::ExecutionStats;
use std::sync::Arc;

/// Filter configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterInfos {
    /// Register holding the evaluated predicate
    pub condition: RegisterId,
    pub registers: RegisterInfos,
    /// Reject non-boolean predicate values with an error instead of
    /// applying truthiness
    pub require_bool: bool,
}

impl FilterInfos {
    /// Filter on `condition`, copying every register through
    pub fn new(width: usize, condition: RegisterId) -> Self {
        Self {
            condition,
            registers: RegisterInfos::keep_all(width),
            require_bool: false,
        }
    }

    pub fn with_require_bool(mut self) -> Self {
        self.require_bool = true;
        self
    }
}

/// Filter executor - stateless apart from its infos
#[derive(Debug)]
pub struct FilterExecutor {
    infos: Arc<FilterInfos>,
}

impl FilterExecutor {
    pub fn new(infos: Arc<FilterInfos>) -> Self {
        Self { infos }
    }

    pub fn registers(&self) -> &RegisterInfos {
        &self.infos.registers
    }

    fn passes(&self, row: &InputRow) -> Result<bool> {
        let value = row.value(self.infos.condition).ok_or_else(|| {
            QueryError::internal(format!(
                "filter condition {} outside row width {}",
                self.infos.condition,
                row.width()
            ))
        })?;
        if self.infos.require_bool {
            return value.as_bool().ok_or_else(|| {
                QueryError::InvalidFilter(format!(
                    "condition {} evaluated to {}, expected a boolean",
                    self.infos.condition,
                    value.type_name()
                ))
            });
        }
        Ok(value.is_truthy())
    }

    pub fn produce_rows(
        &mut self,
        input: &mut InputRange,
        output: &mut OutputSink,
    ) -> Result<ProduceResult> {
        let mut stats = ExecutionStats::default();
        while !output.is_full() && input.has_data_row() {
            let (_, row) = input.next_data_row()?;
            if self.passes(&row)? {
                output.copy_row(&row)?;
                output.advance_row()?;
            } else {
                stats.filtered += 1;
            }
        }

        Ok(ProduceResult {
            state: input.upstream_state(),
            stats,
            upstream_call: prefetch_call(output.client_call(), 0),
        })
    }

    /// Only rows passing the condition count as skipped
    pub fn skip_rows_range(&mut self, input: &mut InputRange, call: &Call) -> Result<SkipResult> {
        let amount = call.skip_amount();
        let mut stats = ExecutionStats::default();
        let mut skipped = 0;
        while skipped < amount && input.has_data_row() {
            let (_, row) = input.next_data_row()?;
            if self.passes(&row)? {
                skipped += 1;
            } else {
                stats.filtered += 1;
            }
        }

        let still_to_skip = call.get_offset().saturating_sub(skipped);
        Ok(SkipResult {
            state: input.upstream_state(),
            stats,
            skipped,
            upstream_call: prefetch_call(call, still_to_skip),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::test_support::{input_with_kinds, sink, written};
    use crate::block::RowKind;
    use crate::state::ExecutorState;
    use quiver_db_core::Value;

    /// Rows `[i, cond]`
    fn rows(conds: &[Value]) -> Vec<Vec<Value>> {
        conds
            .iter()
            .enumerate()
            .map(|(i, c)| vec![Value::Int(i as i64), c.clone()])
            .collect()
    }

    fn executor(infos: FilterInfos) -> FilterExecutor {
        FilterExecutor::new(Arc::new(infos))
    }

    #[test]
    fn test_offset_then_limit_over_passing_rows() {
        let conds: Vec<Value> = [true, false, true, false, true]
            .into_iter()
            .map(Value::Bool)
            .collect();
        let mut input = input_with_kinds(
            2,
            rows(&conds),
            vec![RowKind::Data; 5],
            ExecutorState::Done,
        );
        let mut exec = executor(FilterInfos::new(2, RegisterId(1)));

        let mut call = Call::with_limit(2).with_offset(1);
        let skip = exec.skip_rows_range(&mut input, &call).unwrap();
        assert_eq!(skip.skipped, 1);
        assert_eq!(skip.stats.filtered, 0);
        call.did_skip(skip.skipped).unwrap();

        let mut out = sink(call, exec.registers().clone());
        let result = exec.produce_rows(&mut input, &mut out).unwrap();
        assert_eq!(result.state, ExecutorState::Done);
        assert_eq!(result.stats.filtered, 2);
        assert_eq!(
            written(out, RegisterId(0)),
            vec![Value::Int(2), Value::Int(4)]
        );
    }

    #[test]
    fn test_truthiness_without_require_bool() {
        let conds = vec![
            Value::Int(0),
            Value::from("x"),
            Value::Null,
            Value::array(Vec::<Value>::new()),
        ];
        let mut input =
            input_with_kinds(2, rows(&conds), vec![RowKind::Data; 4], ExecutorState::Done);
        let mut exec = executor(FilterInfos::new(2, RegisterId(1)));
        let mut out = sink(Call::unlimited(), exec.registers().clone());
        let result = exec.produce_rows(&mut input, &mut out).unwrap();
        assert_eq!(result.stats.filtered, 2);
        assert_eq!(
            written(out, RegisterId(0)),
            vec![Value::Int(1), Value::Int(3)]
        );
    }

    #[test]
    fn test_require_bool_rejects_other_types() {
        let conds = vec![Value::Bool(true), Value::Int(1)];
        let mut input =
            input_with_kinds(2, rows(&conds), vec![RowKind::Data; 2], ExecutorState::Done);
        let mut exec = executor(FilterInfos::new(2, RegisterId(1)).with_require_bool());
        let mut out = sink(Call::unlimited(), exec.registers().clone());
        let err = exec.produce_rows(&mut input, &mut out).unwrap_err();
        assert!(matches!(err, QueryError::InvalidFilter(_)));
        // Rows advanced before the failure stay committed
        assert_eq!(out.num_data_rows(), 1);
    }

    #[test]
    fn test_upstream_call_over_requests() {
        let mut exec = executor(FilterInfos::new(2, RegisterId(1)));
        let mut input = InputRange::new(ExecutorState::HasMore);
        let call = Call::with_limit(3).with_offset(2);
        let result = exec.skip_rows_range(&mut input, &call).unwrap();
        assert_eq!(result.state, ExecutorState::HasMore);
        assert_eq!(result.upstream_call.soft_limit(), Some(5));
        assert_eq!(result.upstream_call.hard_limit(), None);

        let full = Call::skip_to_end();
        let result = exec.skip_rows_range(&mut input, &full).unwrap();
        assert_eq!(result.upstream_call, Call::unlimited());
    }

    #[test]
    fn test_stops_at_shadow_row() {
        let conds = vec![Value::Bool(true), Value::Bool(true)];
        let mut input = input_with_kinds(
            2,
            rows(&conds),
            vec![RowKind::Data, RowKind::Shadow { depth: 0 }],
            ExecutorState::HasMore,
        );
        let mut exec = executor(FilterInfos::new(2, RegisterId(1)));
        let mut out = sink(Call::unlimited(), exec.registers().clone());
        let result = exec.produce_rows(&mut input, &mut out).unwrap();
        assert_eq!(result.state, ExecutorState::Done);
        assert!(input.has_shadow_row());
        assert_eq!(out.num_rows(), 1);
    }
}
