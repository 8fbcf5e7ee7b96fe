//! Passthrough executor
//!
//! Copies every row through unchanged (a return or identity node). It is
//! stateless, so skipping is delegated: while an offset is left only that
//! offset goes upstream, otherwise the served call goes up as is, and
//! whatever the upstream skips on our behalf counts against it. A delegated
//! full-count call comes back with the counted rows in flight; they are
//! taken by the skip step that follows the last produced row.

use super::{ProduceResult, SkipResult};
use crate::call::Call;
use crate::error::Result;
use crate::input_range::InputRange;
use crate::output::OutputSink;
use crate::register::RegisterInfos;
use crate::stats::ExecutionStats;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassthroughInfos {
    pub registers: RegisterInfos,
}

impl PassthroughInfos {
    /// Copy all registers of a `width`-wide row
    pub fn new(width: usize) -> Self {
        Self {
            registers: RegisterInfos::keep_all(width),
        }
    }
}

#[derive(Debug)]
pub struct PassthroughExecutor {
    infos: Arc<PassthroughInfos>,
}

impl PassthroughExecutor {
    pub fn new(infos: Arc<PassthroughInfos>) -> Self {
        Self { infos }
    }

    pub fn registers(&self) -> &RegisterInfos {
        &self.infos.registers
    }

    pub fn produce_rows(
        &mut self,
        input: &mut InputRange,
        output: &mut OutputSink,
    ) -> Result<ProduceResult> {
        while !output.is_full() && input.has_data_row() {
            let (_, row) = input.next_data_row()?;
            output.copy_row(&row)?;
            output.advance_row()?;
        }

        let mut upstream_call = *output.client_call();
        upstream_call.reset_skip_count();
        Ok(ProduceResult {
            state: input.upstream_state(),
            stats: ExecutionStats::default(),
            upstream_call,
        })
    }

    pub fn skip_rows_range(&mut self, input: &mut InputRange, call: &Call) -> Result<SkipResult> {
        let amount = call.skip_amount();
        let mut skipped = input.take_skipped_up_to(amount);
        if skipped < amount {
            skipped += input.skip(amount - skipped);
        }

        // Remaining skip goes upstream unread; the offset alone while one is
        // left, so offset skips and counted rows never arrive mixed
        let offset_left = call.get_offset().saturating_sub(skipped);
        let upstream_call = if offset_left > 0 {
            Call::with_limit(0).with_offset(offset_left)
        } else {
            let mut upstream_call = call.with_offset(0);
            upstream_call.reset_skip_count();
            upstream_call
        };
        Ok(SkipResult {
            state: input.upstream_state(),
            stats: ExecutionStats::default(),
            skipped,
            upstream_call,
        })
    }
}
