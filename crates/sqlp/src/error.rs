//! Error types for sqlp.

use miette::Diagnostic;
use thiserror::Error;

/// Error type for template compilation, expansion, execution and scanning.
#[derive(Error, Diagnostic, Debug)]
pub enum SqlpError {
    #[error("Template compilation failed: {0}")]
    #[diagnostic(
        code(sqlp::compile),
        help("Check the fragment blocks and handlebars syntax of the template document")
    )]
    Compile(String),

    #[error("Unknown SQL fragment: {0}")]
    #[diagnostic(
        code(sqlp::unknown_fragment),
        help("Declare the fragment as an inline block in one of the loaded template documents")
    )]
    UnknownFragment(String),

    #[error("Template rendering failed: {0}")]
    #[diagnostic(code(sqlp::render))]
    Render(String),

    #[error("Undefined execution target")]
    #[diagnostic(
        code(sqlp::bind),
        help("Call `at(..)` with a connection or transaction before executing")
    )]
    Bind,

    #[error("Invalid '@index.key': {0}")]
    #[diagnostic(
        code(sqlp::format),
        help("Batch markers use the `@index.key` form, addressing a record by its position")
    )]
    Format(String),

    #[error("Type mismatch: {0}")]
    #[diagnostic(code(sqlp::type_mismatch))]
    Type(String),

    #[error("No rows in result set")]
    #[diagnostic(code(sqlp::no_rows))]
    NoRows,

    #[error("Expected one result (or none), but found multiple")]
    #[diagnostic(
        code(sqlp::too_many_results),
        help("Scan into a Vec to receive every row")
    )]
    TooManyResults,

    #[error("Expected one column, but found {0}")]
    #[diagnostic(code(sqlp::column_count))]
    ColumnCount(usize),

    #[error("Required at least one column tag in `{0}`")]
    #[diagnostic(
        code(sqlp::untagged_destination),
        help("Tag fields with `field: Type => \"column\"` inside `tagged!`")
    )]
    UntaggedDestination(&'static str),

    #[error("Context cancelled")]
    #[diagnostic(code(sqlp::cancelled))]
    Cancelled,

    #[error("Context deadline exceeded")]
    #[diagnostic(code(sqlp::deadline_exceeded))]
    DeadlineExceeded,

    #[error("Database error: {0}")]
    #[diagnostic(code(sqlp::driver))]
    Driver(String),

    #[error("IO error: {0}")]
    #[diagnostic(code(sqlp::io), help("Check that the template file exists and is readable"))]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] sqlp_config::error::ConfigError),
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for SqlpError {
    fn from(err: rusqlite::Error) -> Self {
        SqlpError::Driver(err.to_string())
    }
}

impl From<handlebars::RenderError> for SqlpError {
    fn from(err: handlebars::RenderError) -> Self {
        SqlpError::Render(err.to_string())
    }
}

/// Result type alias for sqlp operations.
pub type Result<T> = std::result::Result<T, SqlpError>;
