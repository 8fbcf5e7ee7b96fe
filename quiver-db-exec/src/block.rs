//! Row containers
//!
//! This module contains:
//! - `RowBlock`: immutable columnar block of rows, shared between pipeline blocks
//! - `RowKind`: data row or shadow row (subquery boundary marker)
//! - `InputRow`: owned, cheap handle to one row of a shared block

use crate::register::RegisterId;
use quiver_db_core::Value;
use std::sync::Arc;

/// Kind of a row within a block
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RowKind {
    /// Ordinary row carrying register values
    Data,
    /// End of one subquery sub-execution
    ///
    /// Depth 0 closes the innermost sub-execution visible at this point of
    /// the pipeline; higher depths close enclosing ones.
    Shadow { depth: u32 },
}

impl RowKind {
    pub fn is_shadow(self) -> bool {
        matches!(self, RowKind::Shadow { .. })
    }

    pub fn shadow_depth(self) -> Option<u32> {
        match self {
            RowKind::Shadow { depth } => Some(depth),
            RowKind::Data => None,
        }
    }
}

/// Error type for block construction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockError {
    /// Column lengths don't match the row count
    ColumnLengthMismatch {
        expected: usize,
        got: usize,
        column: usize,
    },
    /// Number of columns doesn't match the register width
    WidthMismatch { width: usize, columns: usize },
}

impl std::fmt::Display for BlockError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BlockError::ColumnLengthMismatch {
                expected,
                got,
                column,
            } => {
                write!(
                    f,
                    "Column {} has {} rows, expected {}",
                    column, got, expected
                )
            }
            BlockError::WidthMismatch { width, columns } => {
                write!(
                    f,
                    "Block is {} registers wide but {} columns provided",
                    width, columns
                )
            }
        }
    }
}

impl std::error::Error for BlockError {}

/// A block of rows - columnar, immutable once built
///
/// # Invariants
///
/// - `columns.len() == width`
/// - every column has exactly `kinds.len()` entries
/// - shadow rows hold the registers of the row they were created from
#[derive(Debug, Clone, PartialEq)]
pub struct RowBlock {
    /// Number of registers per row
    width: usize,
    /// One column per register
    columns: Vec<Vec<Value>>,
    /// Row kinds; also fixes the row count (a zero-width block can still hold rows)
    kinds: Vec<RowKind>,
}

impl RowBlock {
    /// Create a block, enforcing invariants
    pub fn new(
        width: usize,
        columns: Vec<Vec<Value>>,
        kinds: Vec<RowKind>,
    ) -> Result<Self, BlockError> {
        if columns.len() != width {
            return Err(BlockError::WidthMismatch {
                width,
                columns: columns.len(),
            });
        }

        for (i, col) in columns.iter().enumerate() {
            if col.len() != kinds.len() {
                return Err(BlockError::ColumnLengthMismatch {
                    expected: kinds.len(),
                    got: col.len(),
                    column: i,
                });
            }
        }

        Ok(Self {
            width,
            columns,
            kinds,
        })
    }

    /// Create a block of data rows from row-major values
    pub fn from_rows(width: usize, rows: Vec<Vec<Value>>) -> Result<Self, BlockError> {
        let kinds = vec![RowKind::Data; rows.len()];
        Self::from_rows_with_kinds(width, rows, kinds)
    }

    /// Create a block from row-major values with explicit row kinds
    pub fn from_rows_with_kinds(
        width: usize,
        rows: Vec<Vec<Value>>,
        kinds: Vec<RowKind>,
    ) -> Result<Self, BlockError> {
        let mut columns: Vec<Vec<Value>> = (0..width)
            .map(|_| Vec::with_capacity(rows.len()))
            .collect();
        for row in rows {
            if row.len() != width {
                return Err(BlockError::WidthMismatch {
                    width,
                    columns: row.len(),
                });
            }
            for (col, value) in row.into_iter().enumerate() {
                columns[col].push(value);
            }
        }
        Self::new(width, columns, kinds)
    }

    /// Empty block of the given width
    pub fn empty(width: usize) -> Self {
        Self {
            width,
            columns: (0..width).map(|_| Vec::new()).collect(),
            kinds: Vec::new(),
        }
    }

    /// Number of rows (data and shadow)
    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    /// Registers per row
    pub fn width(&self) -> usize {
        self.width
    }

    /// Kind of the row at `row`
    pub fn kind(&self, row: usize) -> Option<RowKind> {
        self.kinds.get(row).copied()
    }

    /// Check whether `row` is a shadow row
    pub fn is_shadow(&self, row: usize) -> bool {
        self.kind(row).map(RowKind::is_shadow).unwrap_or(false)
    }

    /// Value of `reg` in `row`
    pub fn value(&self, row: usize, reg: RegisterId) -> Option<&Value> {
        self.columns.get(reg.index())?.get(row)
    }

    /// Column for `reg`
    pub fn column(&self, reg: RegisterId) -> Option<&[Value]> {
        self.columns.get(reg.index()).map(|c| c.as_slice())
    }

    /// All row kinds in order
    pub fn kinds(&self) -> &[RowKind] {
        &self.kinds
    }

    /// Number of data rows
    pub fn data_row_count(&self) -> usize {
        self.kinds.iter().filter(|k| !k.is_shadow()).count()
    }

    /// Owned copy of one row's values; `None` past the last row
    pub fn row_values(&self, row: usize) -> Option<Vec<Value>> {
        if row >= self.kinds.len() {
            return None;
        }
        self.columns.iter().map(|col| col.get(row).cloned()).collect()
    }

    /// Values of `reg` over data rows only, in row order
    pub fn data_values(&self, reg: RegisterId) -> Vec<Value> {
        let Some(col) = self.columns.get(reg.index()) else {
            return Vec::new();
        };
        col.iter()
            .zip(&self.kinds)
            .filter(|(_, kind)| !kind.is_shadow())
            .map(|(v, _)| v.clone())
            .collect()
    }
}

/// Handle to one row of a shared block
///
/// Holds an `Arc` to the block, so it stays valid after the input range
/// advances. It never allows writing: rows belong to the block that produced
/// them.
#[derive(Debug, Clone)]
pub struct InputRow {
    block: Arc<RowBlock>,
    row: usize,
}

impl InputRow {
    pub(crate) fn new(block: Arc<RowBlock>, row: usize) -> Self {
        debug_assert!(row < block.len());
        Self { block, row }
    }

    /// Value of `reg`, or `None` when the register is outside the row
    pub fn value(&self, reg: RegisterId) -> Option<&Value> {
        self.block.value(self.row, reg)
    }

    /// Kind of this row
    pub fn kind(&self) -> RowKind {
        self.block.kinds[self.row]
    }

    pub fn is_shadow(&self) -> bool {
        self.kind().is_shadow()
    }

    /// Shadow depth, `None` for data rows
    pub fn shadow_depth(&self) -> Option<u32> {
        self.kind().shadow_depth()
    }

    /// Registers per row
    pub fn width(&self) -> usize {
        self.block.width
    }

    /// Index of this row within its block
    pub fn row_index(&self) -> usize {
        self.row
    }

    /// Owned copy of the row's values
    pub fn to_vec(&self) -> Vec<Value> {
        self.block.row_values(self.row).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int_rows(values: &[i64]) -> Vec<Vec<Value>> {
        values.iter().map(|v| vec![Value::Int(*v)]).collect()
    }

    #[test]
    fn test_block_new() {
        let block = RowBlock::new(
            2,
            vec![
                vec![Value::Int(1), Value::Int(2)],
                vec![Value::from("a"), Value::from("b")],
            ],
            vec![RowKind::Data, RowKind::Shadow { depth: 0 }],
        )
        .unwrap();

        assert_eq!(block.len(), 2);
        assert_eq!(block.width(), 2);
        assert_eq!(block.data_row_count(), 1);
        assert!(block.is_shadow(1));
        assert!(!block.is_shadow(0));
        assert_eq!(block.value(1, RegisterId(1)), Some(&Value::from("b")));
        assert_eq!(block.value(2, RegisterId(1)), None);
    }

    #[test]
    fn test_row_values_out_of_range() {
        let block = RowBlock::new(
            2,
            vec![vec![Value::Int(1)], vec![Value::from("a")]],
            vec![RowKind::Data],
        )
        .unwrap();
        assert_eq!(block.row_values(0), Some(vec![Value::Int(1), Value::from("a")]));
        assert_eq!(block.row_values(1), None);
        assert_eq!(RowBlock::empty(2).row_values(0), None);
    }

    #[test]
    fn test_block_column_length_mismatch() {
        let err = RowBlock::new(
            1,
            vec![vec![Value::Int(1)]],
            vec![RowKind::Data, RowKind::Data],
        )
        .unwrap_err();
        assert_eq!(
            err,
            BlockError::ColumnLengthMismatch {
                expected: 2,
                got: 1,
                column: 0
            }
        );
    }

    #[test]
    fn test_block_width_mismatch() {
        let err = RowBlock::from_rows(2, int_rows(&[1])).unwrap_err();
        assert!(matches!(err, BlockError::WidthMismatch { width: 2, columns: 1 }));
    }

    #[test]
    fn test_zero_width_block_keeps_row_count() {
        let block = RowBlock::from_rows(0, vec![vec![], vec![]]).unwrap();
        assert_eq!(block.len(), 2);
        assert_eq!(block.data_row_count(), 2);
    }

    #[test]
    fn test_data_values_skip_shadow_rows() {
        let block = RowBlock::from_rows_with_kinds(
            1,
            int_rows(&[1, 2, 3]),
            vec![RowKind::Data, RowKind::Shadow { depth: 0 }, RowKind::Data],
        )
        .unwrap();
        assert_eq!(
            block.data_values(RegisterId(0)),
            vec![Value::Int(1), Value::Int(3)]
        );
    }

    #[test]
    fn test_input_row_outlives_cursor() {
        let block = Arc::new(RowBlock::from_rows(1, int_rows(&[7, 8])).unwrap());
        let row = InputRow::new(Arc::clone(&block), 1);
        drop(block);
        assert_eq!(row.value(RegisterId(0)), Some(&Value::Int(8)));
        assert_eq!(row.to_vec(), vec![Value::Int(8)]);
        assert_eq!(row.shadow_depth(), None);
    }
}
