//! Pipeline block: the driver around one executor
//!
//! A block serves one `Call` per `execute` and owns everything between its
//! executor and the next block up: the input range, the upstream fetcher and
//! the pull state that survives a `Waiting` reply.
//!
//! ## One pull
//!
//! ```text
//! loop:
//!   killed?                      -> Killed
//!   upstream fetch pending?      -> fetch; Waiting suspends the pull
//!   fast-forwarding?             -> drop data rows up to the next shadow row
//!   call wants skipping?         -> executor.skip_rows_range
//!   call wants rows?             -> executor.produce_rows
//!   executor done for now        -> forward shadow rows, reset executor
//! ```
//!
//! The executor answers every step with the call it wants issued upstream;
//! the block issues it only once the input range has run dry. A pull that
//! meets `Waiting` keeps its partial output and the pending upstream call,
//! so re-invoking with the same call continues where it stopped.
//!
//! ## Shadow rows
//!
//! Shadow rows close a sub-execution. They never enter an executor: the
//! block forwards them (depth adjusted by the executor's shadow policy) once
//! the executor reports `Done` for the rows before them, then resets the
//! executor for the next sub-execution. A block inside a subquery whose
//! executor finishes early fast-forwards its upstream to the next shadow row
//! instead of reading the rest of the sub-execution.

use crate::block::RowBlock;
use crate::call::Call;
use crate::context::ExecutionContext;
use crate::error::{QueryError, Result};
use crate::executor::Executor;
use crate::fetcher::{FetchPoll, Fetcher};
use crate::input_range::InputRange;
use crate::output::OutputSink;
use crate::register::RegisterInfos;
use crate::state::{ExecutionState, ExecutorPhase, ExecutorState};
use crate::stats::ExecutionStats;
use quiver_db_core::Tracker;
use tracing::field;

/// Reply of one `execute`
#[derive(Debug, Clone, PartialEq)]
pub struct ExecuteResult {
    pub state: ExecutionState,
    /// Rows skipped against the served call
    pub skipped: usize,
    /// Rows produced, shadow rows included; `None` when nothing was written
    pub rows: Option<RowBlock>,
    pub stats: ExecutionStats,
}

impl ExecuteResult {
    pub fn waiting() -> Self {
        Self {
            state: ExecutionState::Waiting,
            skipped: 0,
            rows: None,
            stats: ExecutionStats::default(),
        }
    }

    /// Data rows in `rows`
    pub fn data_rows(&self) -> usize {
        self.rows.as_ref().map_or(0, |b| b.data_row_count())
    }

    /// All rows in `rows`, data and shadow
    pub fn num_rows(&self) -> usize {
        self.rows.as_ref().map_or(0, |b| b.len())
    }
}

/// Pull in progress
#[derive(Debug)]
struct Pull {
    /// Call as received, to check resumption against
    call: Call,
    output: OutputSink,
    stats: ExecutionStats,
    /// Upstream call still to be issued
    pending_fetch: Option<Call>,
}

/// How a finished sub-execution ends the pull
enum Boundary {
    Return(ExecutionState),
    /// Fast-forward set; keep pulling
    Continue,
}

#[derive(Debug)]
pub struct PipelineBlock {
    id: usize,
    executor: Executor,
    input: InputRange,
    fetcher: Fetcher,
    /// Subquery depth of the rows this block reads
    nesting: usize,
    batch_size: usize,
    tracker: Tracker,
    phase: ExecutorPhase,
    suspended: Option<Pull>,
    fast_forward: bool,
    failed: bool,
}

impl PipelineBlock {
    pub(crate) fn new(
        id: usize,
        executor: Executor,
        fetcher: Fetcher,
        nesting: usize,
        ctx: &ExecutionContext,
    ) -> Self {
        Self {
            id,
            executor,
            input: InputRange::default(),
            fetcher,
            nesting,
            batch_size: ctx.batch_size(),
            tracker: ctx.tracker.clone(),
            phase: ExecutorPhase::AwaitingInput,
            suspended: None,
            fast_forward: false,
            failed: false,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn kind_name(&self) -> &'static str {
        self.executor.kind_name()
    }

    pub fn nesting(&self) -> usize {
        self.nesting
    }

    pub fn phase(&self) -> ExecutorPhase {
        self.phase
    }

    /// A pull failed; every later call answers `PipelineFailed`
    pub fn is_failed(&self) -> bool {
        self.failed
    }

    /// A pull is suspended on `Waiting`
    pub fn is_suspended(&self) -> bool {
        self.suspended.is_some()
    }

    pub fn registers(&self) -> &RegisterInfos {
        self.executor.registers()
    }

    /// Registers per output row
    pub fn width(&self) -> usize {
        self.executor.registers().width()
    }

    /// Serve `call`
    ///
    /// After `Waiting` the next invocation must pass the same call. Any
    /// error leaves the block failed.
    pub fn execute(&mut self, call: Call) -> Result<ExecuteResult> {
        if self.failed {
            return Err(QueryError::PipelineFailed);
        }

        let span = tracing::trace_span!(
            "pipeline_block",
            block_id = self.id,
            executor = self.executor.kind_name(),
            nesting = self.nesting,
            state = field::Empty,
            rows = field::Empty,
        );
        let _guard = span.enter();

        match self.run(call) {
            Ok(result) => {
                span.record("state", field::display(result.state));
                span.record("rows", result.num_rows() as u64);
                Ok(result)
            }
            Err(e) => {
                self.failed = true;
                self.suspended = None;
                tracing::debug!(
                    block_id = self.id,
                    executor = self.executor.kind_name(),
                    phase = self.phase.as_str(),
                    error = %e,
                    "pipeline block failed"
                );
                Err(e)
            }
        }
    }

    fn run(&mut self, call: Call) -> Result<ExecuteResult> {
        let mut pull = match self.suspended.take() {
            Some(pull) if pull.call == call => pull,
            Some(pull) => {
                return Err(QueryError::internal(format!(
                    "resumed with call {} after waiting on {}",
                    call, pull.call
                )));
            }
            None => Pull {
                call,
                output: OutputSink::new(call, self.batch_size, self.executor.registers().clone()),
                stats: ExecutionStats::default(),
                pending_fetch: None,
            },
        };

        loop {
            if self.tracker.is_killed() {
                return Err(QueryError::Killed);
            }

            if let Some(upstream_call) = pull.pending_fetch {
                self.phase = ExecutorPhase::AwaitingInput;
                match self.fetcher.fetch(upstream_call, self.batch_size)? {
                    FetchPoll::Waiting => {
                        tracing::debug!(
                            block_id = self.id,
                            executor = self.executor.kind_name(),
                            call = %upstream_call,
                            "upstream waiting; pull suspended"
                        );
                        self.suspended = Some(pull);
                        return Ok(ExecuteResult::waiting());
                    }
                    FetchPoll::Ready {
                        block,
                        state,
                        skipped,
                        stats,
                    } => {
                        self.input.append(block, state, skipped);
                        pull.stats += stats;
                        pull.pending_fetch = None;
                    }
                }
            }

            if self.fast_forward {
                self.phase = ExecutorPhase::Skipping;
                self.input.skip_all_data_rows();
                self.input.take_skipped();
                if self.input.has_shadow_row() {
                    self.fast_forward = false;
                    match self.end_sub_execution(&mut pull)? {
                        Boundary::Return(state) => return self.complete(pull, state),
                        Boundary::Continue => continue,
                    }
                }
                if self.input.is_finished() {
                    self.fast_forward = false;
                    self.phase = ExecutorPhase::UpstreamExhausted;
                    return self.complete(pull, ExecutionState::Done);
                }
                pull.pending_fetch = Some(Call::skip_to_end());
                continue;
            }

            if pull.output.client_call().should_skip() {
                self.phase = ExecutorPhase::Skipping;
                let call = *pull.output.client_call();
                let amount = call.skip_amount();
                let result = self.executor.skip_rows_range(&mut self.input, &call)?;
                pull.output.client_call_mut().did_skip(result.skipped)?;
                pull.stats += result.stats;

                if result.state.is_done() {
                    match self.end_sub_execution(&mut pull)? {
                        Boundary::Return(state) => return self.complete(pull, state),
                        Boundary::Continue => continue,
                    }
                }
                // A used-up offset may hand over to counting without a fetch
                if result.skipped < amount && pull.output.client_call().should_skip() {
                    self.request_upstream(&mut pull, result.upstream_call)?;
                }
                continue;
            }

            if pull.output.client_call().get_limit() > 0 {
                if pull.output.is_full() {
                    self.phase = ExecutorPhase::OutputFull;
                    return self.complete(pull, ExecutionState::HasMore);
                }
                self.phase = ExecutorPhase::Producing;
                let result = self.executor.produce_rows(&mut self.input, &mut pull.output)?;
                pull.stats += result.stats;

                if result.state.is_done() {
                    // Rows counted upstream on our behalf are taken by the skip step
                    if pull.output.client_call().is_full_count_mode() {
                        continue;
                    }
                    match self.end_sub_execution(&mut pull)? {
                        Boundary::Return(state) => return self.complete(pull, state),
                        Boundary::Continue => continue,
                    }
                }
                if !pull.output.has_shadow_capacity() {
                    self.phase = ExecutorPhase::OutputFull;
                    return self.complete(pull, ExecutionState::HasMore);
                }
                // Limit used up: full count or a satisfied call takes over
                if pull.output.client_call().get_limit() == 0 {
                    continue;
                }
                self.request_upstream(&mut pull, result.upstream_call)?;
                continue;
            }

            // Call satisfied; only a held boundary marker may still go out
            if self.executor.has_pending_shadow_row() {
                match self.end_sub_execution(&mut pull)? {
                    Boundary::Return(state) => return self.complete(pull, state),
                    Boundary::Continue => continue,
                }
            }
            self.phase = ExecutorPhase::OutputFull;
            return self.complete(pull, ExecutionState::HasMore);
        }
    }

    /// The executor wants more input: everything in range must be used up,
    /// and the upstream must be able to deliver
    fn request_upstream(&mut self, pull: &mut Pull, upstream_call: Call) -> Result<()> {
        if self.input.has_data_row() {
            return Err(QueryError::internal(format!(
                "{} executor stalled with data rows in range",
                self.executor.kind_name()
            )));
        }
        if self.input.is_finished() {
            return Err(QueryError::internal(format!(
                "{} executor reported more rows after its input finished",
                self.executor.kind_name()
            )));
        }
        if self.input.has_shadow_row() {
            return Err(QueryError::internal(format!(
                "{} executor asked for input before its shadow row was forwarded",
                self.executor.kind_name()
            )));
        }
        pull.pending_fetch = Some(upstream_call);
        Ok(())
    }

    /// The executor is done with the rows in range: emit its own boundary
    /// marker, forward the shadow rows that follow, then decide how the pull
    /// goes on
    fn end_sub_execution(&mut self, pull: &mut Pull) -> Result<Boundary> {
        self.phase = ExecutorPhase::AwaitingShadow;
        let mut wrote_shadow = false;

        if self.executor.has_pending_shadow_row() {
            if !pull.output.has_shadow_capacity() {
                self.phase = ExecutorPhase::OutputFull;
                return Ok(Boundary::Return(ExecutionState::HasMore));
            }
            wrote_shadow |= self
                .executor
                .produce_shadow_row(&mut self.input, &mut pull.output)?;
        }

        let policy = self.executor.shadow_row_policy();
        while self.input.has_shadow_row() {
            if !pull.output.has_shadow_capacity() {
                self.phase = ExecutorPhase::OutputFull;
                return Ok(Boundary::Return(ExecutionState::HasMore));
            }
            let (_, row) = self.input.next_shadow_row()?;
            let depth = row
                .shadow_depth()
                .ok_or_else(|| QueryError::internal("shadow row without a depth"))?;
            pull.output.create_shadow_row(&row, policy.apply(depth)?)?;
            pull.output.advance_row()?;
            self.executor.reset();
            wrote_shadow = true;
        }

        if wrote_shadow {
            let done = self.input.is_finished() && !self.executor.has_pending_shadow_row();
            return Ok(Boundary::Return(if done {
                ExecutionState::Done
            } else {
                ExecutionState::HasMore
            }));
        }

        self.phase = ExecutorPhase::UpstreamExhausted;
        let rows_left = self.input.has_data_row()
            || (self.input.is_exhausted() && self.input.declared_state() == ExecutorState::HasMore);
        if rows_left {
            if self.nesting == 0 {
                return Ok(Boundary::Return(ExecutionState::Done));
            }
            tracing::debug!(
                block_id = self.id,
                executor = self.executor.kind_name(),
                nesting = self.nesting,
                "executor done early; fast-forwarding to the next shadow row"
            );
            self.fast_forward = true;
            return Ok(Boundary::Continue);
        }
        Ok(Boundary::Return(ExecutionState::Done))
    }

    fn complete(&mut self, pull: Pull, state: ExecutionState) -> Result<ExecuteResult> {
        let (call, rows) = pull.output.finish()?;
        Ok(ExecuteResult {
            state,
            skipped: call.skip_count(),
            rows,
            stats: pull.stats,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{ExecutorNode, FilterInfos, LimitInfos, PassthroughInfos};
    use crate::register::RegisterId;
    use crate::source::VecSource;
    use quiver_db_core::Value;
    use std::sync::Arc;

    fn block_over(source: VecSource, node: ExecutorNode, ctx: &ExecutionContext) -> PipelineBlock {
        let executor = node.build(&ctx.options);
        PipelineBlock::new(0, executor, Fetcher::Source(Box::new(source)), 0, ctx)
    }

    /// Rows `[i, cond]`
    fn filter_source(conds: &[bool]) -> VecSource {
        let rows = conds
            .iter()
            .enumerate()
            .map(|(i, c)| vec![Value::Int(i as i64), Value::Bool(*c)])
            .collect();
        VecSource::new(2, rows)
    }

    #[test]
    fn test_filter_offset_and_limit() {
        let ctx = ExecutionContext::default();
        let node = ExecutorNode::Filter(Arc::new(FilterInfos::new(2, RegisterId(1))));
        let mut block = block_over(filter_source(&[true, false, true, false, true]), node, &ctx);

        let result = block.execute(Call::with_limit(2).with_offset(1)).unwrap();
        assert_eq!(result.state, ExecutionState::Done);
        assert_eq!(result.skipped, 1);
        assert_eq!(result.stats.filtered, 2);
        assert_eq!(result.stats.scanned, 5);
        let rows = result.rows.unwrap();
        assert_eq!(rows.data_values(RegisterId(0)), vec![Value::Int(2), Value::Int(4)]);
    }

    #[test]
    fn test_offset_hands_over_to_full_count_in_range() {
        let ctx = ExecutionContext::default();
        let node = ExecutorNode::Filter(Arc::new(FilterInfos::new(2, RegisterId(1))));
        let mut block = block_over(filter_source(&[true, false, true, false, true]), node, &ctx);

        let call = Call::with_limit(0).with_offset(1).with_full_count(true);
        let result = block.execute(call).unwrap();
        assert_eq!(result.state, ExecutionState::Done);
        assert_eq!(result.skipped, 3);
        assert_eq!(result.data_rows(), 0);
    }

    #[test]
    fn test_output_bounded_by_batch_size() {
        let ctx = ExecutionContext::default().with_batch_size(2);
        let node = ExecutorNode::Passthrough(Arc::new(PassthroughInfos::new(1)));
        let mut block = block_over(VecSource::column(1, [1i64, 2, 3]), node, &ctx);

        let first = block.execute(Call::unlimited()).unwrap();
        assert_eq!(first.state, ExecutionState::HasMore);
        assert_eq!(first.num_rows(), 2);
        let second = block.execute(Call::unlimited()).unwrap();
        assert_eq!(second.state, ExecutionState::Done);
        assert_eq!(second.num_rows(), 1);
    }

    #[test]
    fn test_waiting_resumes_with_same_call() {
        let ctx = ExecutionContext::default();
        let node = ExecutorNode::Passthrough(Arc::new(PassthroughInfos::new(1)));
        let source = VecSource::column(1, [1i64, 2]).with_waits(2);
        let counter = source.fetch_counter();
        let mut block = block_over(source, node, &ctx);

        let call = Call::with_limit(5);
        assert_eq!(block.execute(call).unwrap(), ExecuteResult::waiting());
        assert!(block.is_suspended());
        assert_eq!(block.execute(call).unwrap(), ExecuteResult::waiting());
        let result = block.execute(call).unwrap();
        assert_eq!(result.state, ExecutionState::Done);
        assert_eq!(result.data_rows(), 2);
        assert_eq!(counter.load(std::sync::atomic::Ordering::Relaxed), 3);
    }

    #[test]
    fn test_resume_with_other_call_is_internal() {
        let ctx = ExecutionContext::default();
        let node = ExecutorNode::Passthrough(Arc::new(PassthroughInfos::new(1)));
        let mut block = block_over(VecSource::column(1, [1i64]).with_waits(1), node, &ctx);

        assert!(block.execute(Call::with_limit(5)).unwrap().state.is_waiting());
        let err = block.execute(Call::with_limit(4)).unwrap_err();
        assert!(matches!(err, QueryError::Internal(_)));
    }

    #[test]
    fn test_failure_is_sticky() {
        let ctx = ExecutionContext::default();
        let node = ExecutorNode::Passthrough(Arc::new(PassthroughInfos::new(1)));
        let source = VecSource::column(1, [1i64, 2]).with_failure_after(0);
        let counter = source.fetch_counter();
        let mut block = block_over(source, node, &ctx);

        let err = block.execute(Call::unlimited()).unwrap_err();
        assert!(matches!(err, QueryError::Core(_)));
        assert!(block.is_failed());
        let err = block.execute(Call::unlimited()).unwrap_err();
        assert!(matches!(err, QueryError::PipelineFailed));
        assert_eq!(counter.load(std::sync::atomic::Ordering::Relaxed), 1);
    }

    #[test]
    fn test_killed_before_fetching() {
        let ctx = ExecutionContext::default();
        let node = ExecutorNode::Passthrough(Arc::new(PassthroughInfos::new(1)));
        let source = VecSource::column(1, [1i64]);
        let counter = source.fetch_counter();
        let mut block = block_over(source, node, &ctx);

        ctx.tracker.kill();
        assert!(matches!(block.execute(Call::unlimited()), Err(QueryError::Killed)));
        assert_eq!(counter.load(std::sync::atomic::Ordering::Relaxed), 0);
    }

    #[test]
    fn test_top_level_done_does_not_drain() {
        let ctx = ExecutionContext::default().with_batch_size(2);
        let node = ExecutorNode::Limit(Arc::new(LimitInfos::new(1, 0, 1)));
        let source = VecSource::column(1, (0..100).collect::<Vec<i64>>());
        let counter = source.fetch_counter();
        let mut block = block_over(source, node, &ctx);

        let result = block.execute(Call::unlimited()).unwrap();
        assert_eq!(result.state, ExecutionState::Done);
        assert_eq!(result.data_rows(), 1);
        assert_eq!(counter.load(std::sync::atomic::Ordering::Relaxed), 1);
    }

    #[test]
    fn test_full_count_skips_rest() {
        let ctx = ExecutionContext::default().with_batch_size(3);
        let node = ExecutorNode::Passthrough(Arc::new(PassthroughInfos::new(1)));
        let mut block = block_over(
            VecSource::column(1, (0..10).collect::<Vec<i64>>()),
            node,
            &ctx,
        );

        let result = block
            .execute(Call::with_limit(2).with_full_count(true))
            .unwrap();
        assert_eq!(result.state, ExecutionState::Done);
        assert_eq!(result.data_rows(), 2);
        assert_eq!(result.skipped, 8);
    }
}
