//! Error types for pipeline execution

use crate::block::BlockError;
use thiserror::Error;

/// Pipeline execution errors
#[derive(Error, Debug)]
pub enum QueryError {
    /// Failure reported by a collaborator (row source, edge index)
    #[error("Core error: {0}")]
    Core(#[from] quiver_db_core::Error),

    /// Row block construction error
    #[error("Block error: {0}")]
    Block(#[from] BlockError),

    /// Contract violation between driver and executor (a bug, never a data condition)
    #[error("Internal error: {0}")]
    Internal(String),

    /// Predicate evaluation failed
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    /// Resource limit exceeded by a stateful executor
    #[error("Resource limit exceeded: {0}")]
    ResourceLimit(String),

    /// Fuel limit exceeded
    #[error(transparent)]
    FuelExceeded(#[from] quiver_db_core::FuelExceededError),

    /// The query was killed through its tracker
    #[error("Query killed")]
    Killed,

    /// The executor chain handed over by the planner is unusable
    #[error("Invalid plan: {0}")]
    InvalidPlan(String),

    /// A previous pull failed; the pipeline accepts no further calls
    #[error("Pipeline failed in an earlier pull")]
    PipelineFailed,
}

impl QueryError {
    /// Create an internal (logic) error
    pub fn internal(msg: impl Into<String>) -> Self {
        QueryError::Internal(msg.into())
    }
}

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, QueryError>;
