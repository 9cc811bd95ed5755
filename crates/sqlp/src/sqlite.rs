//! [`Target`] implementation for SQLite through `rusqlite`.
//!
//! Every statement runs under a progress handler that aborts it once the
//! [`Context`] is done. SQLite keeps a single progress handler per
//! connection: a handler installed by the caller is replaced for the
//! duration of the call and is not restored afterwards.

use std::os::raw::c_int;

use rusqlite::{
    types::{ToSqlOutput, ValueRef},
    Connection, ToSql, Transaction,
};
use tracing::trace;

use crate::{
    context::Context,
    error::{Result, SqlpError},
    target::{ExecResult, MemoryRows, Rows, Target},
    value::Value,
};

/// Virtual machine instructions between two context checks.
const PROGRESS_OPS: c_int = 1000;

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Borrowed(ValueRef::Null),
            Value::Bool(b) => ToSqlOutput::Borrowed(ValueRef::Integer(i64::from(*b))),
            Value::Integer(i) => ToSqlOutput::Borrowed(ValueRef::Integer(*i)),
            Value::Real(f) => ToSqlOutput::Borrowed(ValueRef::Real(*f)),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::Blob(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
        })
    }
}

impl From<ValueRef<'_>> for Value {
    fn from(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(i) => Value::Integer(i),
            ValueRef::Real(f) => Value::Real(f),
            ValueRef::Text(t) => match std::str::from_utf8(t) {
                Ok(text) => Value::Text(text.to_string()),
                Err(_) => Value::Blob(t.to_vec()),
            },
            ValueRef::Blob(b) => Value::Blob(b.to_vec()),
        }
    }
}

/// Keeps a progress handler installed that aborts the running statement once
/// the context is done. Removed again on drop.
struct Interrupt<'c> {
    conn: &'c Connection,
}

impl<'c> Interrupt<'c> {
    fn install(conn: &'c Connection, ctx: &Context) -> Self {
        let ctx = ctx.clone();
        conn.progress_handler(PROGRESS_OPS, Some(move || ctx.err().is_err()));
        Self { conn }
    }
}

impl Drop for Interrupt<'_> {
    fn drop(&mut self) {
        self.conn.progress_handler(0, None::<fn() -> bool>);
    }
}

/// Maps a driver failure, reporting an interrupt caused by the context as the
/// context's own error.
fn driver_error(ctx: &Context, err: rusqlite::Error) -> SqlpError {
    match ctx.err() {
        Err(done) => done,
        Ok(()) => err.into(),
    }
}

fn execute(conn: &Connection, ctx: &Context, sql: &str, params: &[Value]) -> Result<ExecResult> {
    ctx.err()?;
    let _interrupt = Interrupt::install(conn, ctx);

    let params_ref: Vec<&dyn ToSql> = params.iter().map(|p| p as &dyn ToSql).collect();
    let rows_affected = conn
        .execute(sql, params_ref.as_slice())
        .map_err(|err| driver_error(ctx, err))?;

    Ok(ExecResult {
        rows_affected: rows_affected as u64,
        last_insert_id: Some(conn.last_insert_rowid()),
    })
}

fn query(conn: &Connection, ctx: &Context, sql: &str, params: &[Value]) -> Result<MemoryRows> {
    ctx.err()?;
    let _interrupt = Interrupt::install(conn, ctx);

    let buffer = || -> rusqlite::Result<MemoryRows> {
        let mut stmt = conn.prepare(sql)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let count = columns.len();

        let params_ref: Vec<&dyn ToSql> = params.iter().map(|p| p as &dyn ToSql).collect();
        let mut rows = stmt.query(params_ref.as_slice())?;

        let mut buffered = Vec::new();
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(count);
            for i in 0..count {
                values.push(Value::from(row.get_ref(i)?));
            }
            buffered.push(values);
        }
        Ok(MemoryRows::new(columns, buffered))
    };

    let rows = buffer().map_err(|err| driver_error(ctx, err))?;
    trace!("buffered sqlite result set");
    Ok(rows)
}

/// Installs its own progress handler for each call and removes it on return,
/// so any progress handler set on the connection beforehand is cleared.
impl Target for Connection {
    fn execute(&self, ctx: &Context, sql: &str, params: &[Value]) -> Result<ExecResult> {
        execute(self, ctx, sql, params)
    }

    fn query<'a>(
        &'a self,
        ctx: &Context,
        sql: &str,
        params: &[Value],
    ) -> Result<Box<dyn Rows + 'a>> {
        Ok(Box::new(query(self, ctx, sql, params)?))
    }
}

/// Same progress handler behavior as the [`Connection`] target: the
/// transaction's connection has no progress handler once a call returns.
impl Target for Transaction<'_> {
    fn execute(&self, ctx: &Context, sql: &str, params: &[Value]) -> Result<ExecResult> {
        execute(self, ctx, sql, params)
    }

    fn query<'a>(
        &'a self,
        ctx: &Context,
        sql: &str,
        params: &[Value],
    ) -> Result<Box<dyn Rows + 'a>> {
        Ok(Box::new(query(self, ctx, sql, params)?))
    }
}
