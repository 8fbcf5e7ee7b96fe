//! Subquery boundary executors
//!
//! A subquery runs once per outer row, multiplexed through the same row
//! stream:
//!
//! ```text
//! outer rows:  a            b
//! start:       a  S0(a)     b  S0(b)         one inner data row + its shadow
//! inner nodes: x1 x2 S0(a)  y1 S0(b)         any rows, shadows forwarded as is
//! end:         a[x1,x2]     b[y1]            outer row carrying the collection
//! ```
//!
//! `SubqueryStart` hands each outer row to the inner nodes, then closes the
//! sub-execution with a depth-0 shadow row. The handoff takes two steps: the
//! data row is written during `produce_rows`, the shadow row during
//! `produce_shadow_row`, so the two are never merged into one step.
//! `SubqueryEnd` collects one register of the inner data rows and, on the
//! depth-0 shadow row, turns the shadow back into an outer data row.

use super::{ProduceResult, SkipResult};
use crate::call::Call;
use crate::error::{QueryError, Result};
use crate::input_range::InputRange;
use crate::output::OutputSink;
use crate::register::{RegisterId, RegisterInfos};
use crate::state::ExecutorState;
use crate::stats::ExecutionStats;
use quiver_db_core::Value;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubqueryStartInfos {
    pub registers: RegisterInfos,
}

impl SubqueryStartInfos {
    /// Hand every register of the outer row to the inner nodes
    pub fn new(width: usize) -> Self {
        Self {
            registers: RegisterInfos::keep_all(width),
        }
    }
}

#[derive(Debug)]
pub struct SubqueryStartExecutor {
    infos: Arc<SubqueryStartInfos>,
    /// The row at the cursor was handed to the inner nodes and still needs
    /// its shadow row
    pending: bool,
}

impl SubqueryStartExecutor {
    pub fn new(infos: Arc<SubqueryStartInfos>) -> Self {
        Self {
            infos,
            pending: false,
        }
    }

    pub fn registers(&self) -> &RegisterInfos {
        &self.infos.registers
    }

    pub fn has_pending_shadow_row(&self) -> bool {
        self.pending
    }

    pub fn reset(&mut self) {
        self.pending = false;
    }

    fn upstream_call(call: &Call) -> Call {
        Call::with_soft_limit(call.get_limit().max(1))
    }

    /// Hand the next outer row to the inner nodes without consuming it
    pub fn produce_rows(
        &mut self,
        input: &mut InputRange,
        output: &mut OutputSink,
    ) -> Result<ProduceResult> {
        let upstream_call = Self::upstream_call(output.client_call());
        if self.pending {
            return Ok(ProduceResult {
                state: ExecutorState::Done,
                stats: ExecutionStats::default(),
                upstream_call,
            });
        }

        let Some(row) = input.peek_data_row() else {
            return Ok(ProduceResult {
                state: input.upstream_state(),
                stats: ExecutionStats::default(),
                upstream_call,
            });
        };
        if output.is_full() {
            return Ok(ProduceResult {
                state: ExecutorState::HasMore,
                stats: ExecutionStats::default(),
                upstream_call,
            });
        }

        output.copy_row(&row)?;
        output.advance_row()?;
        self.pending = true;
        Ok(ProduceResult {
            state: ExecutorState::Done,
            stats: ExecutionStats::default(),
            upstream_call,
        })
    }

    /// The inner sub-execution for the next outer row is skipped: it gets
    /// its shadow row but no data row
    pub fn skip_rows_range(&mut self, input: &mut InputRange, call: &Call) -> Result<SkipResult> {
        let upstream_call = Self::upstream_call(call);
        if self.pending || !input.has_data_row() {
            let state = if self.pending {
                ExecutorState::Done
            } else {
                input.upstream_state()
            };
            return Ok(SkipResult {
                state,
                stats: ExecutionStats::default(),
                skipped: 0,
                upstream_call,
            });
        }

        self.pending = true;
        Ok(SkipResult {
            state: ExecutorState::Done,
            stats: ExecutionStats::default(),
            skipped: 1,
            upstream_call,
        })
    }

    /// Consume the pending outer row and close its sub-execution
    pub fn produce_shadow_row(
        &mut self,
        input: &mut InputRange,
        output: &mut OutputSink,
    ) -> Result<bool> {
        if !self.pending || !output.has_shadow_capacity() {
            return Ok(false);
        }
        let (_, row) = input.next_data_row()?;
        output.create_shadow_row(&row, 0)?;
        output.advance_row()?;
        self.pending = false;
        Ok(true)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubqueryEndInfos {
    /// Inner register collected into the array
    pub input: RegisterId,
    /// Outer register receiving the array
    pub output: RegisterId,
    /// Registers of the outer row restored from the shadow row
    pub registers: RegisterInfos,
}

impl SubqueryEndInfos {
    pub fn new(registers: RegisterInfos, input: RegisterId, output: RegisterId) -> Self {
        Self {
            input,
            output,
            registers,
        }
    }
}

#[derive(Debug)]
pub struct SubqueryEndExecutor {
    infos: Arc<SubqueryEndInfos>,
    /// Values collected for the sub-execution in progress
    collected: Vec<Value>,
}

impl SubqueryEndExecutor {
    pub fn new(infos: Arc<SubqueryEndInfos>) -> Self {
        Self {
            infos,
            collected: Vec::new(),
        }
    }

    pub fn registers(&self) -> &RegisterInfos {
        &self.infos.registers
    }

    pub fn reset(&mut self) {
        self.collected.clear();
    }

    /// Shadow rows deeper than 0 close an enclosing sub-execution; none of
    /// ours may be left open at that point
    fn enclosing_done(&self) -> Result<ExecutorState> {
        if !self.collected.is_empty() {
            return Err(QueryError::internal(format!(
                "{} inner rows without a closing shadow row",
                self.collected.len()
            )));
        }
        Ok(ExecutorState::Done)
    }

    pub fn produce_rows(
        &mut self,
        input: &mut InputRange,
        output: &mut OutputSink,
    ) -> Result<ProduceResult> {
        let upstream_call = Call::unlimited();
        let state = loop {
            if input.has_data_row() {
                let (_, row) = input.next_data_row()?;
                let value = row.value(self.infos.input).cloned().ok_or_else(|| {
                    QueryError::internal(format!(
                        "subquery input {} outside row width {}",
                        self.infos.input,
                        row.width()
                    ))
                })?;
                self.collected.push(value);
                continue;
            }

            match input.peek_shadow_row().and_then(|r| r.shadow_depth()) {
                Some(0) => {
                    if output.is_full() {
                        break ExecutorState::HasMore;
                    }
                    let (_, shadow) = input.next_shadow_row()?;
                    output.copy_row(&shadow)?;
                    let values = std::mem::take(&mut self.collected);
                    output.write_value(self.infos.output, Value::array(values))?;
                    output.advance_row()?;
                }
                Some(_) => break self.enclosing_done()?,
                None => match input.upstream_state() {
                    ExecutorState::Done => break self.enclosing_done()?,
                    ExecutorState::HasMore => break ExecutorState::HasMore,
                },
            }
        };

        Ok(ProduceResult {
            state,
            stats: ExecutionStats::default(),
            upstream_call,
        })
    }

    /// Each depth-0 shadow row is one skipped outer row; inner rows are
    /// skipped upstream unread
    pub fn skip_rows_range(&mut self, input: &mut InputRange, call: &Call) -> Result<SkipResult> {
        let amount = call.skip_amount();
        let mut skipped = 0;
        // Counts for inner rows skipped upstream are meaningless here
        input.take_skipped();

        let state = loop {
            if skipped >= amount {
                break ExecutorState::HasMore;
            }
            if input.has_data_row() {
                input.skip_all_data_rows();
                self.collected.clear();
                continue;
            }
            match input.peek_shadow_row().and_then(|r| r.shadow_depth()) {
                Some(0) => {
                    input.next_shadow_row()?;
                    self.collected.clear();
                    skipped += 1;
                }
                Some(_) => break self.enclosing_done()?,
                None => break input.upstream_state(),
            }
        };

        Ok(SkipResult {
            state,
            stats: ExecutionStats::default(),
            skipped,
            upstream_call: Call::skip_to_end(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{RowBlock, RowKind};
    use crate::executor::test_support::{input_with_kinds, sink};

    #[test]
    fn test_start_two_phase_handoff() {
        let mut exec = SubqueryStartExecutor::new(Arc::new(SubqueryStartInfos::new(1)));
        let mut input = InputRange::from_block(
            RowBlock::from_rows(1, vec![vec![Value::Int(7)]]).unwrap(),
            ExecutorState::Done,
        );

        let mut out = sink(Call::unlimited(), exec.registers().clone());
        let result = exec.produce_rows(&mut input, &mut out).unwrap();
        assert_eq!(result.state, ExecutorState::Done);
        assert!(exec.has_pending_shadow_row());
        assert_eq!(out.num_rows(), 1);

        // Second step with no new input: exactly one shadow row
        let mut out2 = sink(Call::unlimited(), exec.registers().clone());
        let result = exec.produce_rows(&mut input, &mut out2).unwrap();
        assert_eq!(result.state, ExecutorState::Done);
        assert_eq!(out2.num_rows(), 0);
        assert!(exec.produce_shadow_row(&mut input, &mut out2).unwrap());
        assert!(!exec.produce_shadow_row(&mut input, &mut out2).unwrap());

        let (_, block) = out2.finish().unwrap();
        let block = block.unwrap();
        assert_eq!(block.len(), 1);
        assert_eq!(block.kind(0), Some(RowKind::Shadow { depth: 0 }));
        assert_eq!(block.value(0, RegisterId(0)), Some(&Value::Int(7)));
        assert!(input.is_finished());
    }

    #[test]
    fn test_start_skip_keeps_shadow() {
        let mut exec = SubqueryStartExecutor::new(Arc::new(SubqueryStartInfos::new(1)));
        let mut input = InputRange::from_block(
            RowBlock::from_rows(1, vec![vec![Value::Int(1)], vec![Value::Int(2)]]).unwrap(),
            ExecutorState::Done,
        );
        let result = exec
            .skip_rows_range(&mut input, &Call::with_limit(1).with_offset(3))
            .unwrap();
        assert_eq!(result.skipped, 1);
        assert_eq!(result.state, ExecutorState::Done);

        let mut out = sink(Call::unlimited(), exec.registers().clone());
        assert!(exec.produce_shadow_row(&mut input, &mut out).unwrap());
        assert_eq!(out.num_data_rows(), 0);
        assert!(input.has_data_row());
    }

    #[test]
    fn test_start_forwards_outer_state_without_rows() {
        let mut exec = SubqueryStartExecutor::new(Arc::new(SubqueryStartInfos::new(1)));
        let mut input = InputRange::new(ExecutorState::HasMore);
        let mut out = sink(Call::with_limit(4), exec.registers().clone());
        let result = exec.produce_rows(&mut input, &mut out).unwrap();
        assert_eq!(result.state, ExecutorState::HasMore);
        assert_eq!(result.upstream_call, Call::with_soft_limit(4));
    }

    fn end_executor() -> SubqueryEndExecutor {
        SubqueryEndExecutor::new(Arc::new(SubqueryEndInfos::new(
            RegisterInfos::new(2, vec![RegisterId(0)]),
            RegisterId(1),
            RegisterId(1),
        )))
    }

    /// Rows `[outer, inner]`
    fn end_input(rows: &[(i64, i64, RowKind)], declared: ExecutorState) -> InputRange {
        let values = rows
            .iter()
            .map(|(a, b, _)| vec![Value::Int(*a), Value::Int(*b)])
            .collect();
        let kinds = rows.iter().map(|(_, _, k)| *k).collect();
        input_with_kinds(2, values, kinds, declared)
    }

    #[test]
    fn test_end_collects_per_sub_execution() {
        const D: RowKind = RowKind::Data;
        const S0: RowKind = RowKind::Shadow { depth: 0 };
        let mut input = end_input(
            &[(1, 10, D), (1, 11, D), (1, 0, S0), (2, 0, S0), (3, 30, D), (3, 0, S0)],
            ExecutorState::Done,
        );
        let mut exec = end_executor();
        let mut out = sink(Call::unlimited(), exec.registers().clone());
        let result = exec.produce_rows(&mut input, &mut out).unwrap();
        assert_eq!(result.state, ExecutorState::Done);

        let (_, block) = out.finish().unwrap();
        let block = block.unwrap();
        assert_eq!(block.data_row_count(), 3);
        assert_eq!(
            block.data_values(RegisterId(0)),
            vec![Value::Int(1), Value::Int(2), Value::Int(3)]
        );
        assert_eq!(
            block.data_values(RegisterId(1)),
            vec![
                Value::array(vec![Value::Int(10), Value::Int(11)]),
                Value::array(Vec::<Value>::new()),
                Value::array(vec![Value::Int(30)]),
            ]
        );
    }

    #[test]
    fn test_end_stops_at_enclosing_shadow() {
        let mut input = end_input(
            &[
                (1, 10, RowKind::Data),
                (1, 0, RowKind::Shadow { depth: 0 }),
                (9, 0, RowKind::Shadow { depth: 1 }),
            ],
            ExecutorState::HasMore,
        );
        let mut exec = end_executor();
        let mut out = sink(Call::unlimited(), exec.registers().clone());
        let result = exec.produce_rows(&mut input, &mut out).unwrap();
        assert_eq!(result.state, ExecutorState::Done);
        assert_eq!(out.num_data_rows(), 1);
        assert_eq!(input.peek_shadow_row().unwrap().shadow_depth(), Some(1));
    }

    #[test]
    fn test_end_unclosed_inner_rows_is_logic_error() {
        let mut input = end_input(&[(1, 10, RowKind::Data)], ExecutorState::Done);
        let mut exec = end_executor();
        let mut out = sink(Call::unlimited(), exec.registers().clone());
        assert!(matches!(
            exec.produce_rows(&mut input, &mut out),
            Err(QueryError::Internal(_))
        ));
    }

    #[test]
    fn test_end_skip_counts_outer_rows() {
        const D: RowKind = RowKind::Data;
        const S0: RowKind = RowKind::Shadow { depth: 0 };
        let mut input = end_input(
            &[(1, 10, D), (1, 0, S0), (2, 20, D), (2, 0, S0), (3, 30, D), (3, 0, S0)],
            ExecutorState::Done,
        );
        let mut exec = end_executor();
        let result = exec
            .skip_rows_range(&mut input, &Call::with_limit(5).with_offset(2))
            .unwrap();
        assert_eq!(result.skipped, 2);
        assert_eq!(result.state, ExecutorState::HasMore);
        assert_eq!(result.upstream_call, Call::skip_to_end());

        let mut out = sink(Call::unlimited(), exec.registers().clone());
        exec.produce_rows(&mut input, &mut out).unwrap();
        let (_, block) = out.finish().unwrap();
        assert_eq!(
            block.unwrap().data_values(RegisterId(1)),
            vec![Value::array(vec![Value::Int(30)])]
        );
    }
}
