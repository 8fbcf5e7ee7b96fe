//! Register ids and register layout
//!
//! Register indices are resolved by the planner and handed to the pipeline
//! as opaque integers. Every block in a pipeline uses the same row width.

use std::sync::Arc;

/// Register index within a row
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegisterId(pub u16);

impl RegisterId {
    /// Column index for this register
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for RegisterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// Register layout for one executor's output rows
///
/// # Invariants
///
/// - every register in `keep` is `< width`
/// - `keep` has no duplicates
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegisterInfos {
    /// Number of registers per row
    width: usize,
    /// Registers copied from the input row into each output data row
    keep: Arc<[RegisterId]>,
}

impl RegisterInfos {
    /// Layout that keeps the given registers
    pub fn new(width: usize, keep: impl Into<Vec<RegisterId>>) -> Self {
        let mut keep = keep.into();
        keep.sort_unstable();
        keep.dedup();
        Self {
            width,
            keep: Arc::from(keep.into_boxed_slice()),
        }
    }

    /// Layout that copies every register through
    pub fn keep_all(width: usize) -> Self {
        Self::new(width, (0..width).map(|r| RegisterId(r as u16)).collect::<Vec<_>>())
    }

    /// Layout that copies nothing; executors write every output value themselves
    pub fn keep_none(width: usize) -> Self {
        Self::new(width, Vec::new())
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn keep(&self) -> &[RegisterId] {
        &self.keep
    }

    /// Check that a register fits in this layout
    pub fn contains(&self, reg: RegisterId) -> bool {
        reg.index() < self.width
    }

    /// Largest register referenced by `keep`, if any
    pub(crate) fn max_kept(&self) -> Option<RegisterId> {
        self.keep.last().copied()
    }
}
