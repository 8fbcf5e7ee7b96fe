//! Bounded row writer
//!
//! An `OutputSink` collects the rows one block produces during one pull. It
//! owns the call being served, so every committed data row consumes one unit
//! of that call's allowance. Rows are written in two steps: stage
//! (`copy_row`, `write_value`, `create_shadow_row`) and commit (`advance_row`).

use crate::block::{InputRow, RowBlock, RowKind};
use crate::call::Call;
use crate::error::{QueryError, Result};
use crate::register::{RegisterId, RegisterInfos};
use quiver_db_core::Value;

#[derive(Debug)]
struct StagedRow {
    values: Vec<Value>,
    kind: RowKind,
}

/// Bounded writer for one pull
#[derive(Debug)]
pub struct OutputSink {
    registers: RegisterInfos,
    /// Physical row capacity (data and shadow rows)
    capacity: usize,
    columns: Vec<Vec<Value>>,
    kinds: Vec<RowKind>,
    staged: Option<StagedRow>,
    /// The call being served; data rows consume its allowance
    call: Call,
    data_rows: usize,
}

impl OutputSink {
    /// Sink for `call` holding at most `capacity` rows laid out per `registers`
    pub fn new(call: Call, capacity: usize, registers: RegisterInfos) -> Self {
        let width = registers.width();
        Self {
            capacity,
            columns: (0..width).map(|_| Vec::new()).collect(),
            kinds: Vec::new(),
            staged: None,
            call,
            data_rows: 0,
            registers,
        }
    }

    fn used(&self) -> usize {
        self.kinds.len() + usize::from(self.staged.is_some())
    }

    /// No more data rows may be written
    ///
    /// True when the call's allowance is used up or there is no physical room.
    pub fn is_full(&self) -> bool {
        self.call.get_limit() == 0 || self.used() >= self.capacity
    }

    /// Physical room for one more row; shadow rows need only this
    pub fn has_shadow_capacity(&self) -> bool {
        self.used() < self.capacity
    }

    /// Stage a data row holding the kept registers of `row`
    pub fn copy_row(&mut self, row: &InputRow) -> Result<()> {
        self.begin_data_row()?;
        if let Some(staged) = self.staged.as_mut() {
            for &reg in self.registers.keep() {
                if let Some(value) = row.value(reg) {
                    staged.values[reg.index()] = value.clone();
                }
            }
        }
        Ok(())
    }

    /// Write `value` into `reg` of the staged data row, staging an empty row
    /// first when none is staged yet
    pub fn write_value(&mut self, reg: RegisterId, value: Value) -> Result<()> {
        if !self.registers.contains(reg) {
            return Err(QueryError::internal(format!(
                "register {} outside output width {}",
                reg,
                self.registers.width()
            )));
        }
        match &self.staged {
            None => self.begin_data_row()?,
            Some(staged) if staged.kind.is_shadow() => {
                return Err(QueryError::internal("write_value into a staged shadow row"));
            }
            Some(_) => {}
        }
        if let Some(staged) = self.staged.as_mut() {
            staged.values[reg.index()] = value;
        }
        Ok(())
    }

    fn begin_data_row(&mut self) -> Result<()> {
        if self.staged.is_some() {
            return Err(QueryError::internal("row written twice without advance_row"));
        }
        if self.is_full() {
            return Err(QueryError::internal(format!(
                "write into a full output sink (rows: {}, call: {})",
                self.kinds.len(),
                self.call
            )));
        }
        self.staged = Some(StagedRow {
            values: vec![Value::Null; self.registers.width()],
            kind: RowKind::Data,
        });
        Ok(())
    }

    /// Stage a shadow row of `depth` carrying every register of `row`
    pub fn create_shadow_row(&mut self, row: &InputRow, depth: u32) -> Result<()> {
        if self.staged.is_some() {
            return Err(QueryError::internal("shadow row written before advance_row"));
        }
        if !self.has_shadow_capacity() {
            return Err(QueryError::internal("shadow row written into a full output sink"));
        }
        let mut values = row.to_vec();
        values.resize(self.registers.width(), Value::Null);
        self.staged = Some(StagedRow {
            values,
            kind: RowKind::Shadow { depth },
        });
        Ok(())
    }

    /// Commit the staged row; data rows consume one unit of the call
    pub fn advance_row(&mut self) -> Result<()> {
        let staged = self
            .staged
            .take()
            .ok_or_else(|| QueryError::internal("advance_row with no staged row"))?;
        if !staged.kind.is_shadow() {
            self.call.did_produce(1)?;
            self.data_rows += 1;
        }
        for (col, value) in self.columns.iter_mut().zip(staged.values) {
            col.push(value);
        }
        self.kinds.push(staged.kind);
        Ok(())
    }

    /// Committed rows, data and shadow
    pub fn num_rows(&self) -> usize {
        self.kinds.len()
    }

    /// Committed data rows
    pub fn num_data_rows(&self) -> usize {
        self.data_rows
    }

    pub fn client_call(&self) -> &Call {
        &self.call
    }

    pub fn client_call_mut(&mut self) -> &mut Call {
        &mut self.call
    }

    /// Close the sink: the served call and the committed rows, if any
    pub fn finish(self) -> Result<(Call, Option<RowBlock>)> {
        if self.staged.is_some() {
            return Err(QueryError::internal("output finished with an uncommitted row"));
        }
        if self.kinds.is_empty() {
            return Ok((self.call, None));
        }
        let block = RowBlock::new(self.registers.width(), self.columns, self.kinds)?;
        Ok((self.call, Some(block)))
    }
}
