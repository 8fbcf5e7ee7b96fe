//! Upstream access for a pipeline block
//!
//! A block pulls either from the row source at the bottom of the pipeline or
//! from the block below it. Both answer the same way: a block of rows with
//! the upstream's state and skip count, or `Waiting`.

use crate::block::RowBlock;
use crate::call::Call;
use crate::error::{QueryError, Result};
use crate::pipeline_block::PipelineBlock;
use crate::source::{RowSource, SourcePoll};
use crate::state::{ExecutionState, ExecutorState};
use crate::stats::ExecutionStats;
use quiver_db_core::Error;

/// Reply of one upstream fetch
#[derive(Debug)]
pub enum FetchPoll {
    Ready {
        block: RowBlock,
        state: ExecutorState,
        /// Rows the upstream skipped while serving the call
        skipped: usize,
        /// Statistics the upstream accumulated during the fetch
        stats: ExecutionStats,
    },
    Waiting,
}

/// Where a block gets its input rows from
pub enum Fetcher {
    Source(Box<dyn RowSource>),
    Block(Box<PipelineBlock>),
}

impl std::fmt::Debug for Fetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Fetcher::Source(source) => f
                .debug_struct("Source")
                .field("width", &source.width())
                .finish(),
            Fetcher::Block(block) => f.debug_tuple("Block").field(block).finish(),
        }
    }
}

impl Fetcher {
    /// Registers per row delivered by this fetcher
    pub fn width(&self) -> usize {
        match self {
            Fetcher::Source(source) => source.width(),
            Fetcher::Block(block) => block.width(),
        }
    }

    /// Issue `call` upstream
    pub fn fetch(&mut self, mut call: Call, batch_size: usize) -> Result<FetchPoll> {
        call.reset_skip_count();
        match self {
            Fetcher::Source(source) => Self::fetch_source(source.as_mut(), &call, batch_size),
            Fetcher::Block(block) => {
                let result = block.execute(call)?;
                let state = match result.state {
                    ExecutionState::Waiting => return Ok(FetchPoll::Waiting),
                    ExecutionState::HasMore => ExecutorState::HasMore,
                    ExecutionState::Done => ExecutorState::Done,
                };
                let block = result
                    .rows
                    .unwrap_or_else(|| RowBlock::empty(block.width()));
                Ok(FetchPoll::Ready {
                    block,
                    state,
                    skipped: result.skipped,
                    stats: result.stats,
                })
            }
        }
    }

    /// A source knows nothing about calls: it gets a size hint and every
    /// row it delivers is a data row for the first block to skip or keep
    fn fetch_source(source: &mut dyn RowSource, call: &Call, batch_size: usize) -> Result<FetchPoll> {
        let hint = if call.should_skip() || call.get_limit() == 0 {
            batch_size
        } else {
            call.get_limit().min(batch_size)
        };

        match source.fetch(hint)? {
            SourcePoll::Waiting => Ok(FetchPoll::Waiting),
            SourcePoll::Ready(block, state) => {
                if block.width() != source.width() {
                    return Err(QueryError::Core(Error::source_failed(format!(
                        "source delivered rows of width {} instead of {}",
                        block.width(),
                        source.width()
                    ))));
                }
                let stats = ExecutionStats {
                    scanned: block.len() as u64,
                    ..ExecutionStats::default()
                };
                Ok(FetchPoll::Ready {
                    block,
                    state,
                    skipped: 0,
                    stats,
                })
            }
        }
    }
}
