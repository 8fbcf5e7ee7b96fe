//! Async consumer of a pipeline
//!
//! `QueryCursor` drives a [`Pipeline`] for one client call: it keeps the
//! remaining demand, re-issues the same call after `Waiting` once the source
//! signals readiness, and hands out the produced blocks.

use crate::block::RowBlock;
use crate::call::Call;
use crate::error::Result;
use crate::pipeline::Pipeline;
use crate::stats::ExecutionStats;
use quiver_db_core::{Tracker, TrackingTally};
use std::sync::Arc;
use tokio::sync::Notify;

#[derive(Debug)]
pub struct QueryCursor {
    pipeline: Pipeline,
    ready: Option<Arc<Notify>>,
    /// Demand not yet served
    remaining: Call,
    produced: usize,
    skipped: usize,
    done: bool,
    stats: ExecutionStats,
}

impl QueryCursor {
    pub fn new(pipeline: Pipeline, call: Call) -> Self {
        let ready = pipeline.ready_signal();
        Self {
            pipeline,
            ready,
            remaining: call,
            produced: 0,
            skipped: 0,
            done: false,
            stats: ExecutionStats::default(),
        }
    }

    /// Next non-empty block of rows, `None` once the call is served or the
    /// pipeline is exhausted
    pub async fn next_batch(&mut self) -> Result<Option<RowBlock>> {
        while !self.done {
            let result = self.pipeline.execute(self.remaining)?;
            if result.state.is_waiting() {
                match &self.ready {
                    Some(ready) => ready.notified().await,
                    None => tokio::task::yield_now().await,
                }
                continue;
            }

            // Offset skips happen before any row is produced, counting skips
            // after the limit is used up
            let rows = result.data_rows();
            let offset_skips = result.skipped.min(self.remaining.get_offset());
            self.remaining.did_skip(offset_skips)?;
            self.remaining.did_produce(rows)?;
            self.remaining.did_skip(result.skipped - offset_skips)?;
            self.remaining.reset_skip_count();

            self.produced += rows;
            self.skipped += result.skipped;
            self.stats += result.stats;
            if result.state.is_done() || self.remaining.is_satisfied() {
                self.done = true;
            }

            if let Some(block) = result.rows.filter(|b| !b.is_empty()) {
                return Ok(Some(block));
            }
        }
        Ok(None)
    }

    /// Drain the cursor
    pub async fn collect_all(&mut self) -> Result<Vec<RowBlock>> {
        let mut blocks = Vec::new();
        while let Some(block) = self.next_batch().await? {
            blocks.push(block);
        }
        Ok(blocks)
    }

    /// Rows produced plus rows skipped; with full count requested and the
    /// cursor drained, the number of rows the query matches
    pub fn full_count(&self) -> usize {
        self.produced + self.skipped
    }

    pub fn produced(&self) -> usize {
        self.produced
    }

    pub fn skipped(&self) -> usize {
        self.skipped
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Statistics accumulated over all pulls so far
    pub fn stats(&self) -> ExecutionStats {
        self.stats
    }

    pub fn tracker(&self) -> &Tracker {
        self.pipeline.tracker()
    }

    /// Time and fuel spent so far; `None` when tracking is off
    pub fn tally(&self) -> Option<TrackingTally> {
        self.pipeline.tracker().tally()
    }
}
