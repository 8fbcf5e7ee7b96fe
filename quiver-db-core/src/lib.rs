//! # Quiver DB Core
//!
//! Collaborator-side types shared by the query pipeline.
//!
//! This crate provides:
//! - `Value`: the opaque register value handed between operators
//! - `Tracker`: per-query abort signal, row fuel and timing
//! - `EdgeIndex`: the graph lookup seam used by traversals, with `MemoryGraph`
//!
//! Nothing here knows about blocks, calls or executors; those live in
//! `quiver-db-exec`.

pub mod error;
pub mod graph;
pub mod tracking;
pub mod value;

pub use error::{Error, Result};
pub use graph::{EdgeIndex, MemoryGraph};
pub use tracking::{FuelExceededError, Tracker, TrackingOptions, TrackingTally};
pub use value::Value;
