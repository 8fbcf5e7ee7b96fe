//! # Quiver DB Exec
//!
//! Pull-based block pipeline for query execution.
//!
//! This crate provides:
//! - `Call`: remaining demand (offset, soft/hard limit, full count)
//! - `InputRange` / `OutputSink`: the read and write sides an executor sees
//! - Executors: passthrough, filter, limit, distinct collect, subquery
//!   start/end and traversal
//! - `PipelineBlock`: the driver that feeds one executor and forwards shadow
//!   rows between sub-executions
//! - `Pipeline` and `QueryCursor`: assembly and the async top-level pull
//!
//! ## Design Principles
//!
//! 1. **Pull, never push**: a consumer's call travels down, rows travel up
//! 2. **Executors never fetch**: they work on what is in range and name the
//!    call they want issued upstream
//! 3. **Subqueries share one stream**: shadow rows close each sub-execution
//! 4. **Non-blocking**: a source that is not ready answers `Waiting`, and the
//!    same call resumes the pull
//!
//! ## Example
//!
//! ```ignore
//! use quiver_db_exec::{Call, ExecutionContext, ExecutorNode, FilterInfos, Pipeline, QueryCursor};
//!
//! let filter = ExecutorNode::Filter(Arc::new(FilterInfos::new(2, RegisterId(1))));
//! let pipeline = Pipeline::new(source, vec![filter], ExecutionContext::default())?;
//! let mut cursor = QueryCursor::new(pipeline, Call::with_limit(10).with_offset(5));
//! while let Some(block) = cursor.next_batch().await? {
//!     // ...
//! }
//! ```

pub mod block;
pub mod call;
pub mod context;
pub mod cursor;
pub mod error;
pub mod executor;
pub mod fetcher;
pub mod input_range;
pub mod options;
pub mod output;
pub mod pipeline;
pub mod pipeline_block;
pub mod register;
pub mod source;
pub mod state;
pub mod stats;

pub use block::{BlockError, InputRow, RowBlock, RowKind};
pub use call::Call;
pub use context::ExecutionContext;
pub use cursor::QueryCursor;
pub use error::{QueryError, Result};
pub use executor::{
    DistinctCollectInfos, Executor, ExecutorNode, FilterInfos, LimitInfos, PassthroughInfos,
    ProduceResult, ShadowRowPolicy, SkipResult, SubqueryEndInfos, SubqueryStartInfos,
    TraversalInfos,
};
pub use fetcher::{FetchPoll, Fetcher};
pub use input_range::InputRange;
pub use options::{ExecutionOptions, DEFAULT_BATCH_SIZE, DEFAULT_MAX_VISITED};
pub use output::OutputSink;
pub use pipeline::Pipeline;
pub use pipeline_block::{ExecuteResult, PipelineBlock};
pub use register::{RegisterId, RegisterInfos};
pub use source::{ChannelSource, RowSource, SourceFeeder, SourcePoll, VecSource};
pub use state::{ExecutionState, ExecutorPhase, ExecutorState};
pub use stats::ExecutionStats;

// Re-export the collaborator types callers need alongside the pipeline
pub use quiver_db_core::{
    EdgeIndex, MemoryGraph, Tracker, TrackingOptions, TrackingTally, Value,
};
