//! Error types for quiver-db-core

use thiserror::Error;

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type, raised by collaborators the pipeline reads from
#[derive(Error, Debug)]
pub enum Error {
    /// A row source failed to produce its next block
    #[error("Source error: {0}")]
    Source(String),

    /// Graph/edge lookup failed
    #[error("Graph error: {0}")]
    Graph(String),
}

impl Error {
    /// Create a source error
    pub fn source_failed(msg: impl Into<String>) -> Self {
        Error::Source(msg.into())
    }

    /// Create a graph error
    pub fn graph(msg: impl Into<String>) -> Self {
        Error::Graph(msg.into())
    }
}
