//! Row sources
//!
//! The storage side of the pipeline is a [`RowSource`]: given a batch-size
//! hint it either hands over a block of raw rows with its state, or reports
//! that nothing is ready yet. It never blocks.
//!
//! - `VecSource`: in-memory rows, optionally answering `Waiting` a scripted
//!   number of times (tests, fixed inputs)
//! - `ChannelSource`: rows pushed from another task through a tokio channel;
//!   the feeder notifies a shared `Notify` so a waiting cursor can resume

use crate::block::RowBlock;
use crate::state::ExecutorState;
use quiver_db_core::{Error, Result, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio::sync::Notify;

/// Reply of a row source
#[derive(Debug, Clone, PartialEq)]
pub enum SourcePoll {
    /// A block of data rows and the state after it
    Ready(RowBlock, ExecutorState),
    /// Nothing available yet; ask again once notified
    Waiting,
}

/// Producer of raw rows at the bottom of a pipeline
pub trait RowSource: Send {
    /// Registers per row
    fn width(&self) -> usize;

    /// Fetch up to `hint` rows. Failures are forwarded to the consumer as is.
    fn fetch(&mut self, hint: usize) -> Result<SourcePoll>;

    /// Signal fired when a `Waiting` source may have become ready
    fn ready_signal(&self) -> Option<Arc<Notify>> {
        None
    }
}

fn pad_row(mut row: Vec<Value>, width: usize) -> Vec<Value> {
    row.resize(width, Value::Null);
    row
}

fn take_block(rows: &mut VecDeque<Vec<Value>>, width: usize, hint: usize) -> Result<RowBlock> {
    let n = hint.max(1).min(rows.len());
    let taken: Vec<Vec<Value>> = rows.drain(..n).collect();
    RowBlock::from_rows(width, taken).map_err(|e| Error::source_failed(e.to_string()))
}

/// In-memory row source
#[derive(Debug)]
pub struct VecSource {
    width: usize,
    rows: VecDeque<Vec<Value>>,
    /// Fetches still to answer with `Waiting`
    waits: usize,
    /// Fail once this many rows were delivered
    fail_after: Option<usize>,
    delivered: usize,
    fetches: Arc<AtomicUsize>,
    ready: Arc<Notify>,
}

impl VecSource {
    /// Rows padded with nulls to `width`
    pub fn new(width: usize, rows: Vec<Vec<Value>>) -> Self {
        Self {
            width,
            rows: rows.into_iter().map(|r| pad_row(r, width)).collect(),
            waits: 0,
            fail_after: None,
            delivered: 0,
            fetches: Arc::new(AtomicUsize::new(0)),
            ready: Arc::new(Notify::new()),
        }
    }

    /// One value per row in register 0, other registers null
    pub fn column<V: Into<Value>>(width: usize, values: impl IntoIterator<Item = V>) -> Self {
        let rows = values.into_iter().map(|v| vec![v.into()]).collect();
        Self::new(width, rows)
    }

    /// Answer the next `n` fetches with `Waiting`
    pub fn with_waits(mut self, n: usize) -> Self {
        self.waits = n;
        // A scripted wait resolves immediately
        if n > 0 {
            self.ready.notify_one();
        }
        self
    }

    /// Fail the first fetch after `n` rows were delivered
    pub fn with_failure_after(mut self, n: usize) -> Self {
        self.fail_after = Some(n);
        self
    }

    /// Shared counter of `fetch` calls
    pub fn fetch_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.fetches)
    }
}

impl RowSource for VecSource {
    fn width(&self) -> usize {
        self.width
    }

    fn fetch(&mut self, hint: usize) -> Result<SourcePoll> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        if self.waits > 0 {
            self.waits -= 1;
            if self.waits > 0 {
                self.ready.notify_one();
            }
            return Ok(SourcePoll::Waiting);
        }
        if let Some(limit) = self.fail_after {
            if self.delivered >= limit {
                return Err(Error::source_failed(format!(
                    "source failed after {} rows",
                    self.delivered
                )));
            }
        }

        let hint = match self.fail_after {
            Some(limit) => hint.min(limit - self.delivered),
            None => hint,
        };
        let block = take_block(&mut self.rows, self.width, hint)?;
        self.delivered += block.len();
        let failure_pending = self.fail_after.is_some_and(|limit| self.delivered >= limit);
        let state = if self.rows.is_empty() && !failure_pending {
            ExecutorState::Done
        } else {
            ExecutorState::HasMore
        };
        Ok(SourcePoll::Ready(block, state))
    }

    fn ready_signal(&self) -> Option<Arc<Notify>> {
        Some(Arc::clone(&self.ready))
    }
}

/// Row source fed from another task
#[derive(Debug)]
pub struct ChannelSource {
    width: usize,
    rx: mpsc::UnboundedReceiver<Vec<Vec<Value>>>,
    buffered: VecDeque<Vec<Value>>,
    closed: bool,
    ready: Arc<Notify>,
}

/// Sending half of a [`ChannelSource`]; dropping it ends the input
#[derive(Debug)]
pub struct SourceFeeder {
    width: usize,
    tx: mpsc::UnboundedSender<Vec<Vec<Value>>>,
    ready: Arc<Notify>,
}

impl ChannelSource {
    pub fn new(width: usize) -> (Self, SourceFeeder) {
        let (tx, rx) = mpsc::unbounded_channel();
        let ready = Arc::new(Notify::new());
        let source = Self {
            width,
            rx,
            buffered: VecDeque::new(),
            closed: false,
            ready: Arc::clone(&ready),
        };
        let feeder = SourceFeeder { width, tx, ready };
        (source, feeder)
    }

    fn drain_channel(&mut self) {
        loop {
            match self.rx.try_recv() {
                Ok(rows) => self.buffered.extend(rows),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.closed = true;
                    break;
                }
            }
        }
    }
}

impl RowSource for ChannelSource {
    fn width(&self) -> usize {
        self.width
    }

    fn fetch(&mut self, hint: usize) -> Result<SourcePoll> {
        self.drain_channel();
        if self.buffered.is_empty() {
            if self.closed {
                return Ok(SourcePoll::Ready(
                    RowBlock::empty(self.width),
                    ExecutorState::Done,
                ));
            }
            return Ok(SourcePoll::Waiting);
        }

        let block = take_block(&mut self.buffered, self.width, hint)?;
        let state = if self.closed && self.buffered.is_empty() {
            ExecutorState::Done
        } else {
            ExecutorState::HasMore
        };
        Ok(SourcePoll::Ready(block, state))
    }

    fn ready_signal(&self) -> Option<Arc<Notify>> {
        Some(Arc::clone(&self.ready))
    }
}

impl SourceFeeder {
    /// Push rows (padded to the source width) and wake the consumer
    pub fn send(&self, rows: Vec<Vec<Value>>) -> Result<()> {
        let rows = rows.into_iter().map(|r| pad_row(r, self.width)).collect();
        self.tx
            .send(rows)
            .map_err(|_| Error::source_failed("row source receiver dropped"))?;
        // A stored permit covers a consumer that is not waiting yet
        self.ready.notify_one();
        Ok(())
    }

    /// End the input
    pub fn close(self) {}
}

impl Drop for SourceFeeder {
    fn drop(&mut self) {
        self.ready.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ints(n: i64) -> Vec<Vec<Value>> {
        (0..n).map(|i| vec![Value::Int(i)]).collect()
    }

    #[test]
    fn test_vec_source_batches_by_hint() {
        let mut source = VecSource::new(2, ints(5));
        let SourcePoll::Ready(block, state) = source.fetch(3).unwrap() else {
            panic!("expected rows");
        };
        assert_eq!(block.len(), 3);
        assert_eq!(block.width(), 2);
        assert_eq!(state, ExecutorState::HasMore);

        let SourcePoll::Ready(block, state) = source.fetch(3).unwrap() else {
            panic!("expected rows");
        };
        assert_eq!(block.len(), 2);
        assert_eq!(state, ExecutorState::Done);
    }

    #[test]
    fn test_vec_source_scripted_waits() {
        let mut source = VecSource::column(1, [1i64, 2]).with_waits(2);
        let counter = source.fetch_counter();
        assert_eq!(source.fetch(10).unwrap(), SourcePoll::Waiting);
        assert_eq!(source.fetch(10).unwrap(), SourcePoll::Waiting);
        assert!(matches!(source.fetch(10).unwrap(), SourcePoll::Ready(_, ExecutorState::Done)));
        assert_eq!(counter.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn test_vec_source_failure() {
        let mut source = VecSource::new(1, ints(5)).with_failure_after(2);
        let SourcePoll::Ready(block, state) = source.fetch(10).unwrap() else {
            panic!("expected rows");
        };
        assert_eq!(block.len(), 2);
        assert_eq!(state, ExecutorState::HasMore);
        assert!(matches!(source.fetch(10), Err(Error::Source(_))));
    }

    #[test]
    fn test_channel_source_waits_until_fed() {
        let (mut source, feeder) = ChannelSource::new(1);
        assert_eq!(source.fetch(10).unwrap(), SourcePoll::Waiting);

        feeder.send(ints(3)).unwrap();
        let SourcePoll::Ready(block, state) = source.fetch(2).unwrap() else {
            panic!("expected rows");
        };
        assert_eq!(block.len(), 2);
        assert_eq!(state, ExecutorState::HasMore);

        feeder.close();
        let SourcePoll::Ready(block, state) = source.fetch(10).unwrap() else {
            panic!("expected rows");
        };
        assert_eq!(block.len(), 1);
        assert_eq!(state, ExecutorState::Done);
    }
}
