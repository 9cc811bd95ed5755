//! SQL templates with inline and bound-parameter markers.
//!
//! Fragments are written as handlebars inline blocks. After rendering, two
//! kinds of markers are expanded: `${key}` is spliced into the text and
//! `#{key}` becomes a positional parameter. Query results are decoded into
//! maps, tagged structs, scalars or vectors of those.
//!
//! ```
//! use sqlp::{record, Mapper, Mode, Value};
//!
//! let mapper = Mapper::parse_str(
//!     r#"{{#*inline "update"}}UPDATE t SET name = #{name} WHERE id = #{id}{{/inline}}"#,
//! )
//! .unwrap();
//!
//! let (sql, params) = mapper
//!     .fragment("update")
//!     .parse(Mode::Normal, &[record! { "name" => "x", "id" => 7 }])
//!     .unwrap();
//!
//! assert_eq!(sql, "UPDATE t SET name = ? WHERE id = ?");
//! assert_eq!(params, vec![Value::from("x"), Value::from(7)]);
//! ```

pub mod context;
pub mod error;
pub mod executor;
pub mod expand;
pub mod loader;
pub mod scanner;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod target;
pub mod template;
pub mod value;

pub use context::Context;
pub use error::{Result, SqlpError};
pub use executor::Executor;
pub use expand::{expand, Mode};
pub use loader::{FileLoader, Loader, MemoryLoader};
pub use scanner::{scan_all, scan_one, Decode, Destination, FromRow, RowData, Shape};
pub use sqlp_config::{Config, Placeholder};
pub use target::{ExecResult, MemoryRows, Rows, Target};
pub use template::Mapper;
pub use value::{FromValue, Record, Value};
