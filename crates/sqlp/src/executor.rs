//! Single-use execution of one fragment.

use tracing::debug;

use crate::{
    context::Context,
    error::{Result, SqlpError},
    expand::{expand, Mode},
    scanner::{scan_all, scan_one, Destination, FromRow},
    target::{ExecResult, Rows, Target},
    template::Mapper,
    value::{Record, Value},
};

/// Renders, expands and runs one fragment against a bound target.
///
/// Obtained from [`Mapper::fragment`]. Terminal calls consume the executor.
///
/// ```no_run
/// # fn main() -> sqlp::Result<()> {
/// use sqlp::{record, Mapper, Record};
///
/// let mapper = Mapper::parse_file("sql/student.hbs")?;
/// let conn = rusqlite::Connection::open("school.db")?;
///
/// let mut students: Vec<Record> = Vec::new();
/// mapper
///     .fragment("selectByClass")
///     .at(&conn)
///     .scan(&mut students, &[record! { "class" => 1001 }])?;
/// # Ok(())
/// # }
/// ```
pub struct Executor<'m, 't> {
    mapper: &'m Mapper,
    name: String,
    target: Option<&'t dyn Target>,
    ctx: Option<Context>,
}

impl<'m, 't> Executor<'m, 't> {
    pub(crate) fn new(mapper: &'m Mapper, name: &str) -> Self {
        Self {
            mapper,
            name: name.to_string(),
            target: None,
            ctx: None,
        }
    }

    /// Binds the connection or transaction to execute against.
    pub fn at(mut self, target: &'t dyn Target) -> Self {
        self.target = Some(target);
        self
    }

    /// Sets the context used for execution. Without one, a fresh context is
    /// created at execution time, carrying the configured query timeout.
    pub fn ctx(mut self, ctx: Context) -> Self {
        self.ctx = Some(ctx);
        self
    }

    /// Renders the fragment and expands its markers without executing it.
    pub fn parse(&self, mode: Mode, records: &[Record]) -> Result<(String, Vec<Value>)> {
        let rendered = self.mapper.render(&self.name, mode, records)?;
        let (sql, params) = expand(&rendered, mode, records, self.mapper.placeholder())?;

        if self.mapper.logs_statements() {
            debug!(
                fragment = self.name,
                params = params.len(),
                "expanded statement: {}",
                sql
            );
        }
        Ok((sql, params))
    }

    fn check(&self) -> Result<&'t dyn Target> {
        self.target.ok_or(SqlpError::Bind)
    }

    fn context(&self) -> Context {
        match (&self.ctx, self.mapper.query_timeout()) {
            (Some(ctx), _) => ctx.clone(),
            (None, Some(timeout)) => Context::with_timeout(timeout),
            (None, None) => Context::background(),
        }
    }

    /// Executes a statement that returns no rows.
    pub fn exec(self, records: &[Record]) -> Result<ExecResult> {
        self.run_exec(Mode::Normal, records)
    }

    /// Executes one combined statement over every record, addressed as
    /// `@index.key`.
    pub fn exec_batch(self, records: &[Record]) -> Result<ExecResult> {
        self.run_exec(Mode::Batch, records)
    }

    fn run_exec(self, mode: Mode, records: &[Record]) -> Result<ExecResult> {
        let target = self.check()?;
        let (sql, params) = self.parse(mode, records)?;
        target.execute(&self.context(), &sql, &params)
    }

    /// Executes a query. The caller owns the returned cursor and closes it.
    pub fn query(self, records: &[Record]) -> Result<Box<dyn Rows + 't>> {
        self.run_query(Mode::Normal, records)
    }

    pub fn query_batch(self, records: &[Record]) -> Result<Box<dyn Rows + 't>> {
        self.run_query(Mode::Batch, records)
    }

    fn run_query(self, mode: Mode, records: &[Record]) -> Result<Box<dyn Rows + 't>> {
        let target = self.check()?;
        let (sql, params) = self.parse(mode, records)?;
        target.query(&self.context(), &sql, &params)
    }

    /// Queries and decodes the result into `dest`.
    ///
    /// Runs in batch mode when more than one record is given. The cursor is
    /// closed before returning, whether decoding succeeded or not.
    pub fn scan<D: Destination + ?Sized>(self, dest: &mut D, records: &[Record]) -> Result<()> {
        self.with_cursor(records, |rows| dest.scan_from(rows))
    }

    /// Queries and decodes exactly one row.
    pub fn fetch_one<E: FromRow>(self, records: &[Record]) -> Result<E> {
        self.with_cursor(records, |rows| scan_one(rows))
    }

    /// Queries and decodes every row.
    pub fn fetch_all<E: FromRow>(self, records: &[Record]) -> Result<Vec<E>> {
        self.with_cursor(records, |rows| scan_all(rows))
    }

    fn with_cursor<R, F>(self, records: &[Record], decode: F) -> Result<R>
    where
        F: FnOnce(&mut dyn Rows) -> Result<R>,
    {
        let rows = if records.len() > 1 {
            self.query_batch(records)?
        } else {
            self.query(records)?
        };

        let mut cursor = Cursor { rows };
        decode(cursor.rows.as_mut())
    }
}

/// Closes the wrapped cursor when dropped.
struct Cursor<'a> {
    rows: Box<dyn Rows + 'a>,
}

impl Drop for Cursor<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.rows.close() {
            debug!("failed to close rows: {}", err);
        }
    }
}
