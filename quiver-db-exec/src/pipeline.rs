//! Pipeline assembly and the top-level pull
//!
//! The planner hands over a row source and an ordered list of executor
//! nodes, bottom first. Each node becomes a [`PipelineBlock`] reading from
//! the block below it; the first one reads from the source. Blocks between a
//! `SubqueryStart` and its `SubqueryEnd` run one subquery level deeper.

use crate::call::Call;
use crate::context::ExecutionContext;
use crate::error::{QueryError, Result};
use crate::executor::ExecutorNode;
use crate::fetcher::Fetcher;
use crate::pipeline_block::{ExecuteResult, PipelineBlock};
use crate::source::RowSource;
use quiver_db_core::Tracker;
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::field;

/// Subquery depth each node runs at, bottom first
///
/// A start runs at the depth of its outer rows, an end at the depth it
/// returns to; everything else runs at the current depth.
fn nesting_levels(nodes: &[ExecutorNode]) -> Result<Vec<usize>> {
    let mut depth = 0usize;
    let mut levels = Vec::with_capacity(nodes.len());
    for (i, node) in nodes.iter().enumerate() {
        match node {
            ExecutorNode::SubqueryStart(_) => {
                levels.push(depth);
                depth += 1;
            }
            ExecutorNode::SubqueryEnd(_) => {
                depth = depth.checked_sub(1).ok_or_else(|| {
                    QueryError::InvalidPlan(format!("subquery end at node {} has no start", i))
                })?;
                levels.push(depth);
            }
            _ => levels.push(depth),
        }
    }
    if depth != 0 {
        return Err(QueryError::InvalidPlan(format!(
            "{} subquery start(s) without an end",
            depth
        )));
    }
    Ok(levels)
}

fn validate_node(i: usize, node: &ExecutorNode, width: usize) -> Result<()> {
    let registers = node.registers();
    if registers.width() != width {
        return Err(QueryError::InvalidPlan(format!(
            "{} node {} has width {}, rows have {}",
            node.kind_name(),
            i,
            registers.width(),
            width
        )));
    }
    let out_of_range = node
        .referenced_registers()
        .into_iter()
        .chain(registers.max_kept())
        .find(|reg| reg.index() >= width);
    if let Some(reg) = out_of_range {
        return Err(QueryError::InvalidPlan(format!(
            "{} node {} uses register {} outside width {}",
            node.kind_name(),
            i,
            reg,
            width
        )));
    }
    Ok(())
}

/// A chain of pipeline blocks over one row source
#[derive(Debug)]
pub struct Pipeline {
    top: PipelineBlock,
    len: usize,
    tracker: Tracker,
    ready: Option<Arc<Notify>>,
    failed: bool,
}

impl Pipeline {
    /// Build the block chain for `nodes` (bottom first) over `source`
    pub fn new<S>(source: S, nodes: Vec<ExecutorNode>, ctx: ExecutionContext) -> Result<Self>
    where
        S: RowSource + 'static,
    {
        Self::from_boxed(Box::new(source), nodes, ctx)
    }

    pub fn from_boxed(
        source: Box<dyn RowSource>,
        nodes: Vec<ExecutorNode>,
        ctx: ExecutionContext,
    ) -> Result<Self> {
        if nodes.is_empty() {
            return Err(QueryError::InvalidPlan("pipeline without executors".to_string()));
        }
        let width = source.width();
        for (i, node) in nodes.iter().enumerate() {
            validate_node(i, node, width)?;
        }
        let levels = nesting_levels(&nodes)?;
        let ready = source.ready_signal();

        // Each block becomes the fetcher of the next one up
        let mut fetcher = Fetcher::Source(source);
        for (id, (node, nesting)) in nodes.iter().zip(levels).enumerate() {
            let executor = node.build(&ctx.options);
            tracing::trace!(
                block_id = id,
                executor = node.kind_name(),
                nesting,
                "pipeline block built"
            );
            let block = PipelineBlock::new(id, executor, fetcher, nesting, &ctx);
            fetcher = Fetcher::Block(Box::new(block));
        }
        let top = match fetcher {
            Fetcher::Block(block) => *block,
            Fetcher::Source(_) => return Err(QueryError::internal("no pipeline block built")),
        };

        Ok(Self {
            top,
            len: nodes.len(),
            tracker: ctx.tracker,
            ready,
            failed: false,
        })
    }

    /// Pull the next rows for `call`
    ///
    /// Each produced data row costs one unit of fuel. After `Waiting`, call
    /// again with the same call once the ready signal fires.
    pub fn execute(&mut self, call: Call) -> Result<ExecuteResult> {
        if self.failed {
            return Err(QueryError::PipelineFailed);
        }
        let span = tracing::debug_span!(
            "pipeline_execute",
            blocks = self.len as u64,
            call = %call,
            state = field::Empty,
            rows = field::Empty,
            skipped = field::Empty,
        );
        let _guard = span.enter();

        let result = match self.top.execute(call) {
            Ok(result) => result,
            Err(e) => {
                self.failed = true;
                return Err(e);
            }
        };
        if let Err(e) = self.tracker.consume_fuel(result.data_rows() as u64) {
            self.failed = true;
            tracing::debug!(used = e.used, limit = e.limit, "fuel limit exceeded");
            return Err(e.into());
        }

        span.record("state", field::display(result.state));
        span.record("rows", result.data_rows() as u64);
        span.record("skipped", result.skipped as u64);
        Ok(result)
    }

    /// Number of blocks
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Registers per output row
    pub fn width(&self) -> usize {
        self.top.width()
    }

    pub fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    /// Signal fired when a source that answered `Waiting` may be ready
    pub fn ready_signal(&self) -> Option<Arc<Notify>> {
        self.ready.clone()
    }

    pub fn is_failed(&self) -> bool {
        self.failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{
        FilterInfos, PassthroughInfos, SubqueryEndInfos, SubqueryStartInfos,
    };
    use crate::register::{RegisterId, RegisterInfos};
    use crate::source::VecSource;

    fn start(width: usize) -> ExecutorNode {
        ExecutorNode::SubqueryStart(Arc::new(SubqueryStartInfos::new(width)))
    }

    fn end(width: usize) -> ExecutorNode {
        ExecutorNode::SubqueryEnd(Arc::new(SubqueryEndInfos::new(
            RegisterInfos::new(width, vec![RegisterId(0)]),
            RegisterId(0),
            RegisterId(1),
        )))
    }

    fn passthrough(width: usize) -> ExecutorNode {
        ExecutorNode::Passthrough(Arc::new(PassthroughInfos::new(width)))
    }

    #[test]
    fn test_nesting_levels() {
        let nodes = vec![
            passthrough(2),
            start(2),
            passthrough(2),
            start(2),
            passthrough(2),
            end(2),
            end(2),
        ];
        assert_eq!(nesting_levels(&nodes).unwrap(), vec![0, 0, 1, 1, 2, 1, 0]);
    }

    #[test]
    fn test_unbalanced_subqueries_rejected() {
        let open = vec![start(2), passthrough(2)];
        assert!(matches!(nesting_levels(&open), Err(QueryError::InvalidPlan(_))));
        let closed = vec![passthrough(2), end(2)];
        assert!(matches!(nesting_levels(&closed), Err(QueryError::InvalidPlan(_))));
    }

    #[test]
    fn test_invalid_plans() {
        let ctx = ExecutionContext::default();
        let empty = Pipeline::new(VecSource::new(1, vec![]), vec![], ctx.clone());
        assert!(matches!(empty, Err(QueryError::InvalidPlan(_))));

        let wide = Pipeline::new(VecSource::new(1, vec![]), vec![passthrough(2)], ctx.clone());
        assert!(matches!(wide, Err(QueryError::InvalidPlan(_))));

        let filter = ExecutorNode::Filter(Arc::new(FilterInfos::new(1, RegisterId(3))));
        let bad_reg = Pipeline::new(VecSource::new(1, vec![]), vec![filter], ctx);
        assert!(matches!(bad_reg, Err(QueryError::InvalidPlan(_))));
    }

    #[test]
    fn test_pipeline_reports_shape() {
        let source = VecSource::new(2, vec![]);
        let pipeline = Pipeline::new(
            source,
            vec![passthrough(2), passthrough(2)],
            ExecutionContext::default(),
        )
        .unwrap();
        assert_eq!(pipeline.len(), 2);
        assert_eq!(pipeline.width(), 2);
        assert!(pipeline.ready_signal().is_some());
    }
}
