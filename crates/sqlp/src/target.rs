//! Execution target and row cursor contracts.
//!
//! These traits are the only seam between sqlp and a database driver:
//! - [`Target`] executes statements and queries (a connection or transaction)
//! - [`Rows`] walks the result of a query

use std::collections::VecDeque;

use crate::{
    context::Context,
    error::{Result, SqlpError},
    value::Value,
};

/// Outcome of a statement that returns no rows.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExecResult {
    pub rows_affected: u64,
    pub last_insert_id: Option<i64>,
}

/// Something statements can be executed against.
///
/// Both methods receive the final SQL text and its positional parameters, in
/// the order the placeholder tokens appear. Implementations must honour
/// `ctx` for cancellation and timeouts.
pub trait Target {
    fn execute(&self, ctx: &Context, sql: &str, params: &[Value]) -> Result<ExecResult>;

    fn query<'a>(
        &'a self,
        ctx: &Context,
        sql: &str,
        params: &[Value],
    ) -> Result<Box<dyn Rows + 'a>>;
}

/// A forward-only cursor over query results.
pub trait Rows {
    /// Moves to the next row. Returns `false` when the cursor is exhausted
    /// or failed; the failure is then reported by [`Rows::err`].
    fn advance(&mut self) -> bool;

    /// Column names reported by the driver for the executed query.
    fn columns(&self) -> Result<Vec<String>>;

    /// Copies the current row into `slots`, one per column, in column order.
    fn scan(&mut self, slots: &mut [Value]) -> Result<()>;

    /// Takes the error that terminated iteration, if any.
    fn err(&mut self) -> Result<()>;

    /// Releases the cursor. Closing twice is not an error.
    fn close(&mut self) -> Result<()>;
}

/// A fully buffered cursor.
///
/// Drivers whose native cursors borrow their statement hand results over in
/// this form; it is also convenient for tests.
#[derive(Clone, Debug, Default)]
pub struct MemoryRows {
    columns: Vec<String>,
    pending: VecDeque<Vec<Value>>,
    current: Option<Vec<Value>>,
    closed: bool,
}

impl MemoryRows {
    pub fn new<C, S>(columns: C, rows: Vec<Vec<Value>>) -> Self
    where
        C: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            pending: rows.into(),
            current: None,
            closed: false,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Rows for MemoryRows {
    fn advance(&mut self) -> bool {
        if self.closed {
            self.current = None;
            return false;
        }
        self.current = self.pending.pop_front();
        self.current.is_some()
    }

    fn columns(&self) -> Result<Vec<String>> {
        if self.closed {
            return Err(SqlpError::Driver("rows are closed".into()));
        }
        Ok(self.columns.clone())
    }

    fn scan(&mut self, slots: &mut [Value]) -> Result<()> {
        let row = self
            .current
            .as_mut()
            .ok_or_else(|| SqlpError::Driver("scan called without a current row".into()))?;

        if slots.len() != row.len() {
            return Err(SqlpError::Driver(format!(
                "expected {} destination arguments in scan, not {}",
                row.len(),
                slots.len()
            )));
        }

        for (slot, value) in slots.iter_mut().zip(row.iter_mut()) {
            *slot = std::mem::take(value);
        }
        Ok(())
    }

    fn err(&mut self) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        self.pending.clear();
        self.current = None;
        Ok(())
    }
}
