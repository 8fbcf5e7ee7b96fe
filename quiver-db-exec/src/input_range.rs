//! Pull cursor over upstream blocks
//!
//! An `InputRange` is what an executor reads from during one step. It queues
//! the blocks fetched from upstream that are not yet fully consumed, keeps a
//! cursor into the front block, and remembers the state the upstream declared
//! with its last block.
//!
//! Two rules shape the API:
//! - a shadow row ends the current sub-execution, so `has_data_row()` is false
//!   while the cursor sits on one and `upstream_state()` reports `Done`
//! - rows the upstream skipped on this consumer's behalf are not materialized;
//!   they are counted in `skipped_in_flight` until an executor takes them

use crate::block::{InputRow, RowBlock};
use crate::error::{QueryError, Result};
use crate::state::ExecutorState;
use std::collections::VecDeque;
use std::sync::Arc;

/// Cursor over the unconsumed rows of one or more upstream blocks
#[derive(Debug, Clone)]
pub struct InputRange {
    /// Blocks not yet fully consumed; the cursor indexes the front one
    blocks: VecDeque<Arc<RowBlock>>,
    /// Row position in the front block
    pos: usize,
    /// State the upstream declared with its last delivery
    declared: ExecutorState,
    /// Rows skipped upstream for this consumer and not yet accounted for
    skipped_in_flight: usize,
}

impl InputRange {
    /// Empty range with the given declared upstream state
    pub fn new(declared: ExecutorState) -> Self {
        Self {
            blocks: VecDeque::new(),
            pos: 0,
            declared,
            skipped_in_flight: 0,
        }
    }

    /// Range over a single block
    pub fn from_block(block: RowBlock, declared: ExecutorState) -> Self {
        let mut range = Self::new(declared);
        range.append(block, declared, 0);
        range
    }

    /// Queue a block delivered by the upstream together with its state and
    /// the number of rows it skipped on our behalf
    pub fn append(&mut self, block: RowBlock, declared: ExecutorState, skipped: usize) {
        self.declared = declared;
        self.skipped_in_flight += skipped;
        if !block.is_empty() {
            self.blocks.push_back(Arc::new(block));
        }
    }

    fn current(&self) -> Option<(&Arc<RowBlock>, usize)> {
        self.blocks.front().map(|b| (b, self.pos))
    }

    fn advance(&mut self) {
        let Some(front) = self.blocks.front() else {
            return;
        };
        self.pos += 1;
        if self.pos >= front.len() {
            self.blocks.pop_front();
            self.pos = 0;
        }
    }

    /// Cursor points at an unconsumed data row
    pub fn has_data_row(&self) -> bool {
        self.current()
            .map(|(b, pos)| !b.is_shadow(pos))
            .unwrap_or(false)
    }

    /// Next data row without consuming it
    pub fn peek_data_row(&self) -> Option<InputRow> {
        match self.current() {
            Some((b, pos)) if !b.is_shadow(pos) => Some(InputRow::new(Arc::clone(b), pos)),
            _ => None,
        }
    }

    /// Consume the next data row
    ///
    /// Returns the upstream state as of that row: `HasMore` when another data
    /// row follows, `Done` when a shadow row follows, else the declared state.
    pub fn next_data_row(&mut self) -> Result<(ExecutorState, InputRow)> {
        let row = self
            .peek_data_row()
            .ok_or_else(|| QueryError::internal("next_data_row called without a data row in range"))?;
        self.advance();
        Ok((self.upstream_state(), row))
    }

    /// Cursor points at an unconsumed shadow row
    pub fn has_shadow_row(&self) -> bool {
        self.current()
            .map(|(b, pos)| b.is_shadow(pos))
            .unwrap_or(false)
    }

    /// Next shadow row without consuming it
    pub fn peek_shadow_row(&self) -> Option<InputRow> {
        match self.current() {
            Some((b, pos)) if b.is_shadow(pos) => Some(InputRow::new(Arc::clone(b), pos)),
            _ => None,
        }
    }

    /// Consume the next shadow row
    pub fn next_shadow_row(&mut self) -> Result<(ExecutorState, InputRow)> {
        let row = self.peek_shadow_row().ok_or_else(|| {
            QueryError::internal("next_shadow_row called without a shadow row in range")
        })?;
        self.advance();
        Ok((self.upstream_state(), row))
    }

    /// Advance over up to `n` data rows without materializing them.
    ///
    /// Stops at a shadow row or at the end of the range; returns the number
    /// of rows actually skipped.
    pub fn skip(&mut self, n: usize) -> usize {
        let mut skipped = 0;
        while skipped < n {
            let Some(front) = self.blocks.front() else {
                break;
            };
            // Run of data rows starting at the cursor
            let run_end = front.kinds()[self.pos..]
                .iter()
                .position(|k| k.is_shadow())
                .map(|off| self.pos + off)
                .unwrap_or(front.len());
            let available = run_end - self.pos;
            if available == 0 {
                break;
            }
            let take = available.min(n - skipped);
            skipped += take;
            self.pos += take;
            if self.pos >= front.len() {
                self.blocks.pop_front();
                self.pos = 0;
            }
        }
        skipped
    }

    /// Skip every data row up to the next shadow row or the end of the range
    pub fn skip_all_data_rows(&mut self) -> usize {
        self.skip(usize::MAX)
    }

    /// Producer state as seen from the cursor
    ///
    /// `HasMore` if a data row is next, `Done` if a shadow row is next (the
    /// current sub-execution has no more data), else the declared state.
    pub fn upstream_state(&self) -> ExecutorState {
        match self.current() {
            Some((b, pos)) if b.is_shadow(pos) => ExecutorState::Done,
            Some(_) => ExecutorState::HasMore,
            None => self.declared,
        }
    }

    /// State the upstream declared with its last delivery
    pub fn declared_state(&self) -> ExecutorState {
        self.declared
    }

    /// Take the rows the upstream skipped on our behalf since the last call
    pub fn take_skipped(&mut self) -> usize {
        std::mem::take(&mut self.skipped_in_flight)
    }

    /// Take at most `n` of the rows the upstream skipped on our behalf; the
    /// rest stays for a later skip
    pub fn take_skipped_up_to(&mut self, n: usize) -> usize {
        let taken = self.skipped_in_flight.min(n);
        self.skipped_in_flight -= taken;
        taken
    }

    /// Rows skipped upstream not yet taken
    pub fn skipped_in_flight(&self) -> usize {
        self.skipped_in_flight
    }

    /// No unconsumed rows left (data or shadow)
    pub fn is_exhausted(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Exhausted and the upstream declared `Done`
    pub fn is_finished(&self) -> bool {
        self.is_exhausted() && self.declared.is_done()
    }

    /// Unconsumed rows, data and shadow
    pub fn remaining_rows(&self) -> usize {
        self.blocks.iter().map(|b| b.len()).sum::<usize>() - self.pos
    }
}

impl Default for InputRange {
    fn default() -> Self {
        Self::new(ExecutorState::HasMore)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::RowKind;
    use crate::register::RegisterId;
    use quiver_db_core::Value;

    fn block(values: &[i64], kinds: Vec<RowKind>) -> RowBlock {
        let rows = values.iter().map(|v| vec![Value::Int(*v)]).collect();
        RowBlock::from_rows_with_kinds(1, rows, kinds).unwrap()
    }

    fn data_block(values: &[i64]) -> RowBlock {
        block(values, vec![RowKind::Data; values.len()])
    }

    #[test]
    fn test_next_data_row_reports_state_as_of_row() {
        let mut range = InputRange::from_block(data_block(&[1, 2]), ExecutorState::Done);

        let (state, row) = range.next_data_row().unwrap();
        assert_eq!(state, ExecutorState::HasMore);
        assert_eq!(row.value(RegisterId(0)), Some(&Value::Int(1)));

        let (state, row) = range.next_data_row().unwrap();
        assert_eq!(state, ExecutorState::Done);
        assert_eq!(row.value(RegisterId(0)), Some(&Value::Int(2)));
        assert!(range.is_finished());
    }

    #[test]
    fn test_next_data_row_without_row_is_logic_error() {
        let mut range = InputRange::new(ExecutorState::HasMore);
        assert!(matches!(
            range.next_data_row().unwrap_err(),
            QueryError::Internal(_)
        ));
    }

    #[test]
    fn test_shadow_row_blocks_data_access() {
        let mut range = InputRange::from_block(
            block(
                &[1, 9, 2],
                vec![RowKind::Data, RowKind::Shadow { depth: 0 }, RowKind::Data],
            ),
            ExecutorState::HasMore,
        );

        let (state, _) = range.next_data_row().unwrap();
        // Shadow row next: current sub-execution is finished
        assert_eq!(state, ExecutorState::Done);
        assert!(!range.has_data_row());
        assert!(range.has_shadow_row());
        assert!(range.next_data_row().is_err());

        let (state, shadow) = range.next_shadow_row().unwrap();
        assert_eq!(shadow.shadow_depth(), Some(0));
        assert_eq!(shadow.value(RegisterId(0)), Some(&Value::Int(9)));
        assert_eq!(state, ExecutorState::HasMore);
        assert!(range.has_data_row());
    }

    #[test]
    fn test_skip_stops_at_shadow_and_spans_blocks() {
        let mut range = InputRange::new(ExecutorState::HasMore);
        range.append(data_block(&[1, 2]), ExecutorState::HasMore, 0);
        range.append(
            block(&[3, 0, 4], vec![RowKind::Data, RowKind::Shadow { depth: 0 }, RowKind::Data]),
            ExecutorState::Done,
            0,
        );

        assert_eq!(range.skip(2), 2);
        assert_eq!(range.remaining_rows(), 3);
        assert_eq!(range.skip_all_data_rows(), 1);
        assert!(range.has_shadow_row());
        assert_eq!(range.skip(5), 0);

        range.next_shadow_row().unwrap();
        assert_eq!(range.skip(5), 1);
        assert!(range.is_finished());
    }

    #[test]
    fn test_skipped_in_flight_is_taken_once() {
        let mut range = InputRange::default();
        range.append(RowBlock::empty(1), ExecutorState::HasMore, 3);
        range.append(RowBlock::empty(1), ExecutorState::Done, 2);
        assert!(range.is_exhausted());
        assert_eq!(range.skipped_in_flight(), 5);
        assert_eq!(range.take_skipped(), 5);
        assert_eq!(range.take_skipped(), 0);
        assert_eq!(range.upstream_state(), ExecutorState::Done);
    }

    #[test]
    fn test_take_skipped_up_to_leaves_rest() {
        let mut range = InputRange::default();
        range.append(RowBlock::empty(1), ExecutorState::Done, 6);
        assert_eq!(range.take_skipped_up_to(1), 1);
        assert_eq!(range.skipped_in_flight(), 5);
        assert_eq!(range.take_skipped_up_to(usize::MAX), 5);
        assert_eq!(range.take_skipped_up_to(3), 0);
    }
}
