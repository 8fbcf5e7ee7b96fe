//! Traversal executor
//!
//! For each input row, walks outbound edges breadth-first from the vertex in
//! the start register and emits one row per vertex reached at a depth within
//! `[min_depth, max_depth]`. Each output row carries the input row's kept
//! registers plus the vertex (and optionally its depth).
//!
//! - BFS with a visited set for cycle protection; each vertex is emitted at
//!   its shortest depth only
//! - Safety bound on visited vertices per start vertex (`max_visited`)
//! - Results of one input row are buffered, so a full output sink can be
//!   resumed on the next pull without re-walking the graph

use super::{ProduceResult, SkipResult};
use crate::block::InputRow;
use crate::call::Call;
use crate::error::{QueryError, Result};
use crate::input_range::InputRange;
use crate::output::OutputSink;
use crate::register::{RegisterId, RegisterInfos};
use crate::state::ExecutorState;
use crate::stats::ExecutionStats;
use quiver_db_core::{EdgeIndex, Value};
use rustc_hash::FxHashSet;
use std::collections::VecDeque;
use std::sync::Arc;

/// Traversal configuration
#[derive(Clone)]
pub struct TraversalInfos {
    pub registers: RegisterInfos,
    /// Register holding the start vertex
    pub start: RegisterId,
    /// Register receiving each reached vertex
    pub vertex_out: RegisterId,
    /// Register receiving the depth of each reached vertex
    pub depth_out: Option<RegisterId>,
    pub min_depth: u32,
    pub max_depth: u32,
    /// Visit bound; the execution options supply the default
    pub max_visited: Option<usize>,
    pub graph: Arc<dyn EdgeIndex>,
}

impl TraversalInfos {
    /// Traverse `graph` from `start` for depths `1..=max_depth`, keeping
    /// every input register
    pub fn new(
        width: usize,
        graph: Arc<dyn EdgeIndex>,
        start: RegisterId,
        vertex_out: RegisterId,
        max_depth: u32,
    ) -> Self {
        let keep: Vec<RegisterId> = (0..width)
            .map(|r| RegisterId(r as u16))
            .filter(|r| *r != vertex_out)
            .collect();
        Self {
            registers: RegisterInfos::new(width, keep),
            start,
            vertex_out,
            depth_out: None,
            min_depth: 1,
            max_depth,
            max_visited: None,
            graph,
        }
    }

    pub fn with_min_depth(mut self, min_depth: u32) -> Self {
        self.min_depth = min_depth;
        self
    }

    pub fn with_depth_out(mut self, reg: RegisterId) -> Self {
        self.depth_out = Some(reg);
        let keep: Vec<RegisterId> = self
            .registers
            .keep()
            .iter()
            .copied()
            .filter(|r| *r != reg)
            .collect();
        self.registers = RegisterInfos::new(self.registers.width(), keep);
        self
    }

    pub fn with_max_visited(mut self, max_visited: usize) -> Self {
        self.max_visited = Some(max_visited);
        self
    }
}

impl std::fmt::Debug for TraversalInfos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraversalInfos")
            .field("start", &self.start)
            .field("vertex_out", &self.vertex_out)
            .field("depth_out", &self.depth_out)
            .field("min_depth", &self.min_depth)
            .field("max_depth", &self.max_depth)
            .field("max_visited", &self.max_visited)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub struct TraversalExecutor {
    infos: Arc<TraversalInfos>,
    max_visited: usize,
    /// Input row whose results are buffered
    current: Option<InputRow>,
    /// `(vertex, depth)` still to emit for `current`
    buffer: VecDeque<(Value, u32)>,
}

impl TraversalExecutor {
    /// `default_max_visited` applies when the infos set no bound
    pub fn new(infos: Arc<TraversalInfos>, default_max_visited: usize) -> Self {
        let max_visited = infos.max_visited.unwrap_or(default_max_visited);
        Self {
            infos,
            max_visited,
            current: None,
            buffer: VecDeque::new(),
        }
    }

    pub fn registers(&self) -> &RegisterInfos {
        &self.infos.registers
    }

    pub fn reset(&mut self) {
        self.current = None;
        self.buffer.clear();
    }

    /// Walk the graph from the start vertex of `row` into the buffer
    fn expand(&mut self, row: InputRow, stats: &mut ExecutionStats) -> Result<()> {
        let start = row.value(self.infos.start).cloned().ok_or_else(|| {
            QueryError::internal(format!(
                "traversal start {} outside row width {}",
                self.infos.start,
                row.width()
            ))
        })?;
        self.current = Some(row);
        if start.is_null() {
            return Ok(());
        }

        let mut visited: FxHashSet<Value> = FxHashSet::default();
        let mut queue: VecDeque<(Value, u32)> = VecDeque::new();
        visited.insert(start.clone());
        if self.infos.min_depth == 0 {
            self.buffer.push_back((start.clone(), 0));
        }
        queue.push_back((start, 0));

        while let Some((vertex, depth)) = queue.pop_front() {
            if depth >= self.infos.max_depth {
                continue;
            }
            for next in self.infos.graph.neighbors(&vertex)? {
                if !visited.insert(next.clone()) {
                    continue;
                }
                if visited.len() > self.max_visited {
                    return Err(QueryError::ResourceLimit(format!(
                        "Traversal exceeded max visited vertices ({})",
                        self.max_visited
                    )));
                }
                stats.traversed += 1;
                if depth + 1 >= self.infos.min_depth {
                    self.buffer.push_back((next.clone(), depth + 1));
                }
                queue.push_back((next, depth + 1));
            }
        }

        tracing::trace!(
            results = self.buffer.len(),
            visited = visited.len(),
            "traversal expanded"
        );
        Ok(())
    }

    fn emit(&mut self, output: &mut OutputSink, vertex: Value, depth: u32) -> Result<()> {
        let row = self
            .current
            .as_ref()
            .ok_or_else(|| QueryError::internal("traversal result without an input row"))?;
        output.copy_row(row)?;
        output.write_value(self.infos.vertex_out, vertex)?;
        if let Some(reg) = self.infos.depth_out {
            output.write_value(reg, Value::Int(i64::from(depth)))?;
        }
        output.advance_row()
    }

    /// State once the buffer is drained or the output is full
    fn state(&self, input: &InputRange) -> ExecutorState {
        if self.buffer.is_empty() {
            input.upstream_state()
        } else {
            ExecutorState::HasMore
        }
    }

    pub fn produce_rows(
        &mut self,
        input: &mut InputRange,
        output: &mut OutputSink,
    ) -> Result<ProduceResult> {
        let mut stats = ExecutionStats::default();
        while !output.is_full() {
            if let Some((vertex, depth)) = self.buffer.pop_front() {
                self.emit(output, vertex, depth)?;
                continue;
            }
            if !input.has_data_row() {
                break;
            }
            let (_, row) = input.next_data_row()?;
            self.expand(row, &mut stats)?;
        }

        Ok(ProduceResult {
            state: self.state(input),
            stats,
            upstream_call: Call::unlimited(),
        })
    }

    pub fn skip_rows_range(&mut self, input: &mut InputRange, call: &Call) -> Result<SkipResult> {
        let amount = call.skip_amount();
        let mut stats = ExecutionStats::default();
        let mut skipped = 0;
        while skipped < amount {
            if !self.buffer.is_empty() {
                let n = self.buffer.len().min(amount - skipped);
                self.buffer.drain(..n);
                skipped += n;
                continue;
            }
            if !input.has_data_row() {
                break;
            }
            let (_, row) = input.next_data_row()?;
            self.expand(row, &mut stats)?;
        }

        Ok(SkipResult {
            state: self.state(input),
            stats,
            skipped,
            upstream_call: Call::unlimited(),
        })
    }
}
