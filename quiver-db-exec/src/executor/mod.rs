//! Executors: per-node row logic
//!
//! An executor never fetches input itself. The pipeline block hands it an
//! `InputRange` and either an `OutputSink` (produce) or the call being served
//! (skip); the executor works through what is in range and answers with its
//! state, statistics, and the call it wants issued to its own upstream.
//!
//! Dispatch is a closed enum. Each variant is built from immutable infos
//! shared through an `Arc` ([`ExecutorNode`]), plus mutable per-execution
//! state that lives in the executor value.

mod distinct;
mod filter;
mod limit;
mod passthrough;
mod subquery;
mod traversal;

pub use distinct::{DistinctCollectExecutor, DistinctCollectInfos};
pub use filter::{FilterExecutor, FilterInfos};
pub use limit::{LimitExecutor, LimitInfos};
pub use passthrough::{PassthroughExecutor, PassthroughInfos};
pub use subquery::{SubqueryEndExecutor, SubqueryEndInfos, SubqueryStartExecutor, SubqueryStartInfos};
pub use traversal::{TraversalExecutor, TraversalInfos};

use crate::call::Call;
use crate::error::{QueryError, Result};
use crate::input_range::InputRange;
use crate::options::ExecutionOptions;
use crate::output::OutputSink;
use crate::register::{RegisterId, RegisterInfos};
use crate::state::ExecutorState;
use crate::stats::ExecutionStats;
use std::sync::Arc;

/// Outcome of `produce_rows`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProduceResult {
    /// `Done` when the executor is finished with the current sub-execution
    pub state: ExecutorState,
    pub stats: ExecutionStats,
    /// What to ask the upstream for on the next fetch
    pub upstream_call: Call,
}

/// Outcome of `skip_rows_range`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkipResult {
    pub state: ExecutorState,
    pub stats: ExecutionStats,
    /// Rows skipped against the served call; the driver records them
    pub skipped: usize,
    pub upstream_call: Call,
}

/// How an executor changes the depth of the shadow rows it forwards
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShadowRowPolicy {
    /// Forward unchanged
    Forward,
    /// One more level of nesting below this executor
    Increase,
    /// One level less; depth-0 rows are consumed by the executor itself
    Decrease,
}

impl ShadowRowPolicy {
    /// Depth for a forwarded shadow row
    pub fn apply(self, depth: u32) -> Result<u32> {
        match self {
            ShadowRowPolicy::Forward => Ok(depth),
            ShadowRowPolicy::Increase => Ok(depth + 1),
            ShadowRowPolicy::Decrease => depth.checked_sub(1).ok_or_else(|| {
                QueryError::internal("depth-0 shadow row reached the driver of a subquery end")
            }),
        }
    }
}

/// One plan node as handed over by the planner: executor kind plus infos
#[derive(Debug, Clone)]
pub enum ExecutorNode {
    Passthrough(Arc<PassthroughInfos>),
    Filter(Arc<FilterInfos>),
    Limit(Arc<LimitInfos>),
    DistinctCollect(Arc<DistinctCollectInfos>),
    SubqueryStart(Arc<SubqueryStartInfos>),
    SubqueryEnd(Arc<SubqueryEndInfos>),
    Traversal(Arc<TraversalInfos>),
}

impl ExecutorNode {
    pub fn kind_name(&self) -> &'static str {
        match self {
            ExecutorNode::Passthrough(_) => "passthrough",
            ExecutorNode::Filter(_) => "filter",
            ExecutorNode::Limit(_) => "limit",
            ExecutorNode::DistinctCollect(_) => "distinct_collect",
            ExecutorNode::SubqueryStart(_) => "subquery_start",
            ExecutorNode::SubqueryEnd(_) => "subquery_end",
            ExecutorNode::Traversal(_) => "traversal",
        }
    }

    /// Output register layout
    pub fn registers(&self) -> &RegisterInfos {
        match self {
            ExecutorNode::Passthrough(i) => &i.registers,
            ExecutorNode::Filter(i) => &i.registers,
            ExecutorNode::Limit(i) => &i.registers,
            ExecutorNode::DistinctCollect(i) => &i.registers,
            ExecutorNode::SubqueryStart(i) => &i.registers,
            ExecutorNode::SubqueryEnd(i) => &i.registers,
            ExecutorNode::Traversal(i) => &i.registers,
        }
    }

    /// Registers the node reads or writes besides its keep list
    pub fn referenced_registers(&self) -> Vec<RegisterId> {
        match self {
            ExecutorNode::Filter(i) => vec![i.condition],
            ExecutorNode::DistinctCollect(i) => vec![i.input, i.output],
            ExecutorNode::SubqueryEnd(i) => vec![i.input, i.output],
            ExecutorNode::Traversal(i) => {
                let mut regs = vec![i.start, i.vertex_out];
                regs.extend(i.depth_out);
                regs
            }
            ExecutorNode::Passthrough(_)
            | ExecutorNode::Limit(_)
            | ExecutorNode::SubqueryStart(_) => Vec::new(),
        }
    }

    /// Fresh executor for one execution of this node
    pub fn build(&self, options: &ExecutionOptions) -> Executor {
        match self {
            ExecutorNode::Passthrough(i) => {
                Executor::Passthrough(PassthroughExecutor::new(Arc::clone(i)))
            }
            ExecutorNode::Filter(i) => Executor::Filter(FilterExecutor::new(Arc::clone(i))),
            ExecutorNode::Limit(i) => Executor::Limit(LimitExecutor::new(Arc::clone(i))),
            ExecutorNode::DistinctCollect(i) => {
                Executor::DistinctCollect(DistinctCollectExecutor::new(Arc::clone(i)))
            }
            ExecutorNode::SubqueryStart(i) => {
                Executor::SubqueryStart(SubqueryStartExecutor::new(Arc::clone(i)))
            }
            ExecutorNode::SubqueryEnd(i) => {
                Executor::SubqueryEnd(SubqueryEndExecutor::new(Arc::clone(i)))
            }
            ExecutorNode::Traversal(i) => Executor::Traversal(TraversalExecutor::new(
                Arc::clone(i),
                options.max_visited,
            )),
        }
    }
}

/// Executor with its per-execution state
#[derive(Debug)]
pub enum Executor {
    Passthrough(PassthroughExecutor),
    Filter(FilterExecutor),
    Limit(LimitExecutor),
    DistinctCollect(DistinctCollectExecutor),
    SubqueryStart(SubqueryStartExecutor),
    SubqueryEnd(SubqueryEndExecutor),
    Traversal(TraversalExecutor),
}

impl Executor {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Executor::Passthrough(_) => "passthrough",
            Executor::Filter(_) => "filter",
            Executor::Limit(_) => "limit",
            Executor::DistinctCollect(_) => "distinct_collect",
            Executor::SubqueryStart(_) => "subquery_start",
            Executor::SubqueryEnd(_) => "subquery_end",
            Executor::Traversal(_) => "traversal",
        }
    }

    /// Output register layout
    pub fn registers(&self) -> &RegisterInfos {
        match self {
            Executor::Passthrough(e) => e.registers(),
            Executor::Filter(e) => e.registers(),
            Executor::Limit(e) => e.registers(),
            Executor::DistinctCollect(e) => e.registers(),
            Executor::SubqueryStart(e) => e.registers(),
            Executor::SubqueryEnd(e) => e.registers(),
            Executor::Traversal(e) => e.registers(),
        }
    }

    /// Write rows for the call held by `output`
    pub fn produce_rows(
        &mut self,
        input: &mut InputRange,
        output: &mut OutputSink,
    ) -> Result<ProduceResult> {
        match self {
            Executor::Passthrough(e) => e.produce_rows(input, output),
            Executor::Filter(e) => e.produce_rows(input, output),
            Executor::Limit(e) => e.produce_rows(input, output),
            Executor::DistinctCollect(e) => e.produce_rows(input, output),
            Executor::SubqueryStart(e) => e.produce_rows(input, output),
            Executor::SubqueryEnd(e) => e.produce_rows(input, output),
            Executor::Traversal(e) => e.produce_rows(input, output),
        }
    }

    /// Discard rows against `call.skip_amount()`; the call itself is not mutated
    pub fn skip_rows_range(&mut self, input: &mut InputRange, call: &Call) -> Result<SkipResult> {
        match self {
            Executor::Passthrough(e) => e.skip_rows_range(input, call),
            Executor::Filter(e) => e.skip_rows_range(input, call),
            Executor::Limit(e) => e.skip_rows_range(input, call),
            Executor::DistinctCollect(e) => e.skip_rows_range(input, call),
            Executor::SubqueryStart(e) => e.skip_rows_range(input, call),
            Executor::SubqueryEnd(e) => e.skip_rows_range(input, call),
            Executor::Traversal(e) => e.skip_rows_range(input, call),
        }
    }

    /// Emit a held boundary marker; `true` iff a shadow row was written
    pub fn produce_shadow_row(
        &mut self,
        input: &mut InputRange,
        output: &mut OutputSink,
    ) -> Result<bool> {
        match self {
            Executor::SubqueryStart(e) => e.produce_shadow_row(input, output),
            _ => Ok(false),
        }
    }

    /// A boundary marker is held and must be emitted before more input is read
    pub fn has_pending_shadow_row(&self) -> bool {
        match self {
            Executor::SubqueryStart(e) => e.has_pending_shadow_row(),
            _ => false,
        }
    }

    pub fn shadow_row_policy(&self) -> ShadowRowPolicy {
        match self {
            Executor::SubqueryStart(_) => ShadowRowPolicy::Increase,
            Executor::SubqueryEnd(_) => ShadowRowPolicy::Decrease,
            _ => ShadowRowPolicy::Forward,
        }
    }

    /// Drop per-sub-execution state; called after each forwarded shadow row
    pub fn reset(&mut self) {
        match self {
            Executor::Passthrough(_) => {}
            Executor::Filter(_) => {}
            Executor::Limit(e) => e.reset(),
            Executor::DistinctCollect(e) => e.reset(),
            Executor::SubqueryStart(e) => e.reset(),
            Executor::SubqueryEnd(e) => e.reset(),
            Executor::Traversal(e) => e.reset(),
        }
    }
}

/// Upstream call for executors that may reject rows: ask for the rows still
/// to skip plus the rows still wanted, as a hint only
pub(crate) fn prefetch_call(call: &Call, still_to_skip: usize) -> Call {
    if call.needs_full_count() || !call.has_limit() {
        return Call::unlimited();
    }
    Call::with_soft_limit(still_to_skip.saturating_add(call.get_limit()).max(1))
}
