//! Row scanning.
//!
//! Decoding happens in two steps. The destination element type classifies
//! itself once through [`FromRow::shape`]; combined with the column list of
//! the cursor this yields a [`Plan`] that is reused for every row. Each row
//! is then read into dynamic slots and handed to [`FromRow::from_row`] as a
//! [`RowData`] matching the plan.
//!
//! [`Destination`] sits on top and decides the cardinality: a single value
//! must come from exactly one row, a `Vec` takes every row.

use std::{collections::HashMap, marker::PhantomData};

use tracing::trace;

use crate::{
    error::{Result, SqlpError},
    target::Rows,
    value::{FromValue, Record, Value},
};

/// How a row maps onto a destination type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Shape {
    /// Every column becomes an entry of a [`Record`].
    Map,

    /// Columns are matched to fields by tag. One entry per field, in field
    /// order; an empty tag marks a field that is never populated.
    Tagged(&'static [&'static str]),

    /// A single column decoded by the type itself (see [`Decode`]).
    Custom,

    /// A single column converted with [`FromValue`].
    Scalar,
}

/// One decoded row, laid out according to the destination's [`Shape`].
#[derive(Debug)]
pub enum RowData<'a> {
    Map {
        columns: &'a [String],
        values: Vec<Value>,
    },

    /// Values indexed by field position; `None` where no column matched.
    Tagged(Vec<Option<Value>>),

    Single(Value),
}

impl RowData<'_> {
    pub fn into_record(self) -> Result<Record> {
        match self {
            RowData::Map { columns, values } => Ok(columns.iter().cloned().zip(values).collect()),
            other => Err(other.unexpected("map")),
        }
    }

    pub fn into_tagged(self) -> Result<Vec<Option<Value>>> {
        match self {
            RowData::Tagged(fields) => Ok(fields),
            other => Err(other.unexpected("tagged record")),
        }
    }

    pub fn into_single(self) -> Result<Value> {
        match self {
            RowData::Single(value) => Ok(value),
            other => Err(other.unexpected("single column")),
        }
    }

    fn unexpected(&self, wanted: &str) -> SqlpError {
        let found = match self {
            RowData::Map { .. } => "map",
            RowData::Tagged(_) => "tagged record",
            RowData::Single(_) => "single column",
        };
        SqlpError::Type(format!("expected {wanted} row data, found {found}"))
    }
}

/// A type that can be built from one result row.
///
/// Implemented for [`Record`], scalars, `Option<T>` and `Box<T>`; the
/// [`tagged!`](crate::tagged) and [`decodable!`](crate::decodable) macros
/// implement it for user types.
pub trait FromRow: Sized {
    fn shape() -> Shape;

    fn from_row(row: RowData<'_>) -> Result<Self>;
}

/// A value that decodes itself from a single column, bypassing column-name
/// mapping. Register implementors with [`decodable!`](crate::decodable).
pub trait Decode: Default {
    fn decode(&mut self, value: Value) -> Result<()>;
}

/// Something [`Executor::scan`](crate::Executor::scan) can write results into.
pub trait Destination {
    fn scan_from(&mut self, rows: &mut dyn Rows) -> Result<()>;
}

/// Column-to-slot resolution computed once per decode call.
#[derive(Debug)]
enum Plan {
    Map,
    Tagged {
        /// For each column, the field it feeds.
        fields: Vec<Option<usize>>,
        field_count: usize,
    },
    Single,
}

impl Plan {
    fn new<E: FromRow>(columns: &[String]) -> Result<Self> {
        let shape = E::shape();
        trace!(
            destination = std::any::type_name::<E>(),
            ?shape,
            columns = columns.len(),
            "planning row decode"
        );

        match shape {
            Shape::Map => Ok(Plan::Map),
            Shape::Tagged(tags) => {
                let index: HashMap<&str, usize> = tags
                    .iter()
                    .enumerate()
                    .filter(|(_, tag)| !tag.is_empty())
                    .map(|(i, tag)| (*tag, i))
                    .collect();

                if index.is_empty() {
                    return Err(SqlpError::UntaggedDestination(std::any::type_name::<E>()));
                }

                let fields = columns
                    .iter()
                    .map(|column| index.get(column.as_str()).copied())
                    .collect();

                Ok(Plan::Tagged {
                    fields,
                    field_count: tags.len(),
                })
            }
            Shape::Custom | Shape::Scalar => {
                if columns.len() != 1 {
                    return Err(SqlpError::ColumnCount(columns.len()));
                }
                Ok(Plan::Single)
            }
        }
    }

    fn decode<E: FromRow>(&self, columns: &[String], rows: &mut dyn Rows) -> Result<E> {
        let mut slots = vec![Value::Null; columns.len()];
        rows.scan(&mut slots)?;

        let row = match self {
            Plan::Map => RowData::Map {
                columns,
                values: slots,
            },
            Plan::Tagged {
                fields,
                field_count,
            } => {
                let mut values = vec![None; *field_count];
                for (slot, field) in slots.into_iter().zip(fields) {
                    if let Some(i) = field {
                        values[*i] = Some(slot);
                    }
                }
                RowData::Tagged(values)
            }
            Plan::Single => RowData::Single(slots.into_iter().next().unwrap_or_default()),
        };

        E::from_row(row)
    }
}

/// Decodes exactly one row.
///
/// Fails with [`SqlpError::NoRows`] on an empty cursor and with
/// [`SqlpError::TooManyResults`] if a second row follows.
pub fn scan_one<E: FromRow>(rows: &mut dyn Rows) -> Result<E> {
    if !rows.advance() {
        rows.err()?;
        return Err(SqlpError::NoRows);
    }

    let columns = rows.columns()?;
    let plan = Plan::new::<E>(&columns)?;
    let value = plan.decode(&columns, rows)?;

    if rows.advance() {
        return Err(SqlpError::TooManyResults);
    }
    rows.err()?;

    Ok(value)
}

/// Decodes every remaining row, in cursor order.
///
/// An empty cursor fails with [`SqlpError::NoRows`], like [`scan_one`].
pub fn scan_all<E: FromRow>(rows: &mut dyn Rows) -> Result<Vec<E>> {
    if !rows.advance() {
        rows.err()?;
        return Err(SqlpError::NoRows);
    }

    let columns = rows.columns()?;
    let plan = Plan::new::<E>(&columns)?;

    let mut values = Vec::new();
    loop {
        values.push(plan.decode(&columns, rows)?);
        if !rows.advance() {
            break;
        }
    }
    rows.err()?;

    trace!(rows = values.len(), "decoded result set");
    Ok(values)
}

impl FromRow for Record {
    fn shape() -> Shape {
        Shape::Map
    }

    fn from_row(row: RowData<'_>) -> Result<Self> {
        row.into_record()
    }
}

impl Destination for Record {
    /// Adds the columns of the single result row to this map; existing keys
    /// not present in the row are kept.
    fn scan_from(&mut self, rows: &mut dyn Rows) -> Result<()> {
        let row: Record = scan_one(rows)?;
        self.extend(row);
        Ok(())
    }
}

impl<E: FromRow> FromRow for Box<E> {
    fn shape() -> Shape {
        E::shape()
    }

    fn from_row(row: RowData<'_>) -> Result<Self> {
        E::from_row(row).map(Box::new)
    }
}

/// The raw field values of a tagged row, laid out by `E`'s tags.
///
/// Lets a tagged destination update only the fields the row provides.
pub struct FieldValues<E> {
    values: Vec<Option<Value>>,
    shape: PhantomData<fn() -> E>,
}

impl<E> FieldValues<E> {
    pub fn into_values(self) -> Vec<Option<Value>> {
        self.values
    }
}

impl<E: FromRow> FromRow for FieldValues<E> {
    fn shape() -> Shape {
        E::shape()
    }

    fn from_row(row: RowData<'_>) -> Result<Self> {
        Ok(Self {
            values: row.into_tagged()?,
            shape: PhantomData,
        })
    }
}

impl<E: FromRow> Destination for Vec<E> {
    /// Appends one element per row. Nothing is appended if any row fails.
    fn scan_from(&mut self, rows: &mut dyn Rows) -> Result<()> {
        let decoded = scan_all::<E>(rows)?;
        self.extend(decoded);
        Ok(())
    }
}

impl<T: FromValue> FromRow for Option<T> {
    fn shape() -> Shape {
        Shape::Scalar
    }

    fn from_row(row: RowData<'_>) -> Result<Self> {
        FromValue::from_value(row.into_single()?)
    }
}

impl<T: FromValue> Destination for Option<T> {
    fn scan_from(&mut self, rows: &mut dyn Rows) -> Result<()> {
        *self = scan_one(rows)?;
        Ok(())
    }
}

macro_rules! scalar {
    ($($ty:ty),* $(,)?) => {
        $(
            impl FromRow for $ty {
                fn shape() -> Shape {
                    Shape::Scalar
                }

                fn from_row(row: RowData<'_>) -> Result<Self> {
                    FromValue::from_value(row.into_single()?)
                }
            }

            impl Destination for $ty {
                fn scan_from(&mut self, rows: &mut dyn Rows) -> Result<()> {
                    *self = scan_one(rows)?;
                    Ok(())
                }
            }
        )*
    };
}

scalar!(Value, bool, i8, i16, i32, i64, u16, u32, u64, usize, f32, f64, String);

impl FromRow for Vec<u8> {
    fn shape() -> Shape {
        Shape::Scalar
    }

    fn from_row(row: RowData<'_>) -> Result<Self> {
        FromValue::from_value(row.into_single()?)
    }
}

/// Declares a struct whose fields bind to result columns by tag.
///
/// Tagged fields are written `field: Type => "column"`. Scanning into an
/// existing value overwrites only the tagged fields present in the row;
/// building a new value leaves every other field at its default. Every field type must implement
/// [`FromValue`] and `Default`.
///
/// ```
/// use sqlp::{scan_all, tagged, MemoryRows, Value};
///
/// tagged! {
///     #[derive(Debug)]
///     pub struct Student {
///         pub name: String => "name",
///         pub class: i64 => "class",
///         pub note: Option<String>,
///     }
/// }
///
/// let mut rows = MemoryRows::new(
///     ["name", "class"],
///     vec![vec![Value::from("alex"), Value::from(1001)]],
/// );
/// let students: Vec<Student> = scan_all(&mut rows).unwrap();
/// assert_eq!(students[0].class, 1001);
/// assert!(students[0].note.is_none());
/// ```
#[macro_export]
macro_rules! tagged {
    (@tag $column:literal) => {
        $column
    };
    (@tag) => {
        ""
    };
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $(
                $(#[$field_meta:meta])*
                $field_vis:vis $field:ident : $field_ty:ty $(=> $column:literal)?
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        $vis struct $name {
            $(
                $(#[$field_meta])*
                $field_vis $field: $field_ty,
            )*
        }

        impl $crate::FromRow for $name {
            fn shape() -> $crate::Shape {
                $crate::Shape::Tagged(&[$($crate::tagged!(@tag $($column)?)),*])
            }

            fn from_row(row: $crate::RowData<'_>) -> $crate::Result<Self> {
                let mut fields = row.into_tagged()?.into_iter();
                Ok(Self {
                    $(
                        $field: match fields.next() {
                            Some(Some(value)) => {
                                <$field_ty as $crate::FromValue>::from_value(value)?
                            }
                            _ => <$field_ty as ::core::default::Default>::default(),
                        },
                    )*
                })
            }
        }

        impl $crate::Destination for $name {
            /// Overwrites the tagged fields the row provides; every other
            /// field keeps its value.
            fn scan_from(&mut self, rows: &mut dyn $crate::Rows) -> $crate::Result<()> {
                let row: $crate::scanner::FieldValues<Self> = $crate::scan_one(rows)?;
                let mut fields = row.into_values().into_iter();
                $(
                    let $field: ::core::option::Option<$field_ty> = match fields.next() {
                        Some(Some(value)) => {
                            Some(<$field_ty as $crate::FromValue>::from_value(value)?)
                        }
                        _ => None,
                    };
                )*
                $(
                    if let Some(value) = $field {
                        self.$field = value;
                    }
                )*
                Ok(())
            }
        }
    };
}

/// Makes [`Decode`] implementors usable as scan destinations.
///
/// ```
/// use sqlp::{decodable, scan_one, Decode, MemoryRows, Result, Value};
///
/// #[derive(Default)]
/// struct Cents(i64);
///
/// impl Decode for Cents {
///     fn decode(&mut self, value: Value) -> Result<()> {
///         let text: String = sqlp::FromValue::from_value(value)?;
///         let amount: f64 = text.parse().unwrap_or_default();
///         self.0 = (amount * 100.0).round() as i64;
///         Ok(())
///     }
/// }
///
/// decodable!(Cents);
///
/// let mut rows = MemoryRows::new(["price"], vec![vec![Value::from("12.34")]]);
/// let price: Cents = scan_one(&mut rows).unwrap();
/// assert_eq!(price.0, 1234);
/// ```
#[macro_export]
macro_rules! decodable {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl $crate::FromRow for $ty {
                fn shape() -> $crate::Shape {
                    $crate::Shape::Custom
                }

                fn from_row(row: $crate::RowData<'_>) -> $crate::Result<Self> {
                    let mut value = <$ty as ::core::default::Default>::default();
                    $crate::Decode::decode(&mut value, row.into_single()?)?;
                    Ok(value)
                }
            }

            impl $crate::Destination for $ty {
                fn scan_from(&mut self, rows: &mut dyn $crate::Rows) -> $crate::Result<()> {
                    *self = $crate::scan_one(rows)?;
                    Ok(())
                }
            }
        )+
    };
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use super::*;
    use crate::{record, target::MemoryRows};

    fn rows_zero() -> MemoryRows {
        MemoryRows::new(["a"], vec![])
    }

    fn rows_one() -> MemoryRows {
        MemoryRows::new(["a"], vec![vec![Value::from("x")]])
    }

    fn rows_two() -> MemoryRows {
        MemoryRows::new(
            ["a", "b"],
            vec![
                vec![Value::from(1), Value::from("one")],
                vec![Value::from(2), Value::from("two")],
            ],
        )
    }

    fn rows_three() -> MemoryRows {
        MemoryRows::new(
            ["id", "name"],
            vec![
                vec![Value::from(1), Value::from("alex")],
                vec![Value::from(2), Value::from("bob")],
                vec![Value::from(3), Value::from("cook")],
            ],
        )
    }

    tagged! {
        #[derive(Debug, Default, PartialEq)]
        struct Student {
            id: i64 => "id",
            name: String => "name",
            class: Option<i64> => "class",
            note: String,
        }
    }

    tagged! {
        #[derive(Debug, Default)]
        struct Untagged {
            name: String,
        }
    }

    #[derive(Debug, Default, PartialEq)]
    struct Upper(String);

    impl Decode for Upper {
        fn decode(&mut self, value: Value) -> Result<()> {
            self.0 = String::from_value(value)?.to_uppercase();
            Ok(())
        }
    }

    decodable!(Upper);

    #[test]
    fn test_scan_map() {
        let mut map = Record::new();
        map.scan_from(&mut rows_one()).unwrap();
        assert_eq!(map, record! { "a" => "x" });
    }

    #[test]
    fn test_scan_map_keeps_existing_entries() {
        let mut map = record! { "kept" => 1 };
        map.scan_from(&mut rows_one()).unwrap();

        assert_eq!(map.len(), 2);
        assert_eq!(map["kept"], Value::from(1));
    }

    #[test]
    fn test_scan_map_every_column_present() {
        let mut rows = MemoryRows::new(
            ["id", "name", "class"],
            vec![vec![Value::from(1), Value::from("alex"), Value::Null]],
        );
        let map: Record = scan_one(&mut rows).unwrap();

        for column in ["id", "name", "class"] {
            assert!(map.contains_key(column));
        }
        assert_eq!(map["class"], Value::Null);
    }

    #[test]
    fn test_scan_map_too_many_results() {
        let mut map = Record::new();
        let result = map.scan_from(&mut rows_two());
        assert!(matches!(result, Err(SqlpError::TooManyResults)));
    }

    #[test]
    fn test_scan_map_no_rows() {
        let result = scan_one::<Record>(&mut rows_zero());
        assert!(matches!(result, Err(SqlpError::NoRows)));
    }

    #[test]
    fn test_scan_slice_map() {
        let mut maps: Vec<Record> = Vec::new();
        maps.scan_from(&mut rows_three()).unwrap();

        assert_eq!(maps.len(), 3);
        let names: Vec<_> = maps.iter().map(|m| m["name"].clone()).collect();
        assert_eq!(
            names,
            vec![Value::from("alex"), Value::from("bob"), Value::from("cook")]
        );
    }

    #[test]
    fn test_scan_slice_boxed_map() {
        let mut maps: Vec<Box<Record>> = Vec::new();
        maps.scan_from(&mut rows_two()).unwrap();

        assert_eq!(maps.len(), 2);
        assert_eq!(maps[1]["b"], Value::from("two"));
    }

    #[test]
    fn test_scan_slice_no_rows() {
        let result = scan_all::<Record>(&mut rows_zero());
        assert!(matches!(result, Err(SqlpError::NoRows)));
    }

    #[test]
    fn test_scan_struct() {
        let mut rows = MemoryRows::new(
            ["name", "extra", "id"],
            vec![vec![Value::from("alex"), Value::from(9.5), Value::from(7)]],
        );
        let mut student = Student {
            class: Some(3),
            note: "kept".into(),
            ..Default::default()
        };
        student.scan_from(&mut rows).unwrap();

        assert_eq!(
            student,
            Student {
                id: 7,
                name: "alex".into(),
                class: Some(3),
                note: "kept".into(),
            }
        );
    }

    #[test]
    fn test_scan_struct_failure_leaves_fields_untouched() {
        let mut rows = MemoryRows::new(
            ["name", "id"],
            vec![vec![Value::from("alex"), Value::from("seven")]],
        );
        let mut student = Student {
            id: 1,
            name: "before".into(),
            ..Default::default()
        };
        let result = student.scan_from(&mut rows);

        assert!(matches!(result, Err(SqlpError::Type(_))));
        assert_eq!(student.id, 1);
        assert_eq!(student.name, "before");
    }

    #[test]
    fn test_fetch_struct_builds_from_defaults() {
        let mut rows = MemoryRows::new(["id"], vec![vec![Value::from(7)]]);
        let student: Student = scan_one(&mut rows).unwrap();

        assert_eq!(student.id, 7);
        assert_eq!(student.class, None);
        assert!(student.note.is_empty());
    }

    #[test]
    fn test_scan_struct_too_many_results() {
        let mut rows = MemoryRows::new(
            ["id"],
            vec![vec![Value::from(1)], vec![Value::from(2)]],
        );
        let result = scan_one::<Student>(&mut rows);
        assert!(matches!(result, Err(SqlpError::TooManyResults)));
    }

    #[test]
    fn test_scan_untagged_struct() {
        let result = scan_one::<Untagged>(&mut rows_one());
        assert!(matches!(result, Err(SqlpError::UntaggedDestination(_))));
    }

    #[test]
    fn test_scan_slice_struct() {
        let mut students: Vec<Student> = Vec::new();
        students.scan_from(&mut rows_three()).unwrap();

        let ids: Vec<i64> = students.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(students[2].name, "cook");
    }

    #[test]
    fn test_scan_slice_boxed_struct() {
        let students: Vec<Box<Student>> = scan_all(&mut rows_three()).unwrap();
        assert_eq!(students.len(), 3);
        assert_eq!(students[0].name, "alex");
    }

    #[test]
    fn test_scan_slice_struct_failure_appends_nothing() {
        let mut rows = MemoryRows::new(
            ["id"],
            vec![vec![Value::from(1)], vec![Value::from("not a number")]],
        );
        let mut students: Vec<Student> = Vec::new();
        let result = students.scan_from(&mut rows);

        assert!(matches!(result, Err(SqlpError::Type(_))));
        assert!(students.is_empty());
    }

    #[test]
    fn test_scan_field() {
        let mut s = String::new();
        s.scan_from(&mut rows_one()).unwrap();
        assert_eq!(s, "x");

        let mut n: i64 = 0;
        let mut rows = MemoryRows::new(["count"], vec![vec![Value::from(3)]]);
        n.scan_from(&mut rows).unwrap();
        assert_eq!(n, 3);
    }

    #[test]
    fn test_scan_field_column_count() {
        let mut s = String::new();
        let result = s.scan_from(&mut rows_two());
        assert!(matches!(result, Err(SqlpError::ColumnCount(2))));
    }

    #[test]
    fn test_scan_nullable_field() {
        let mut rows = MemoryRows::new(["a"], vec![vec![Value::Null]]);
        let mut s: Option<String> = Some("old".into());
        s.scan_from(&mut rows).unwrap();
        assert_eq!(s, None);

        let mut rows = MemoryRows::new(["a"], vec![vec![Value::Null]]);
        assert!(matches!(
            scan_one::<String>(&mut rows),
            Err(SqlpError::Type(_))
        ));
    }

    #[test]
    fn test_scan_slice_field() {
        let mut rows = MemoryRows::new(
            ["id"],
            vec![vec![Value::from(3)], vec![Value::from(1)], vec![Value::from(2)]],
        );
        let ids: Vec<i64> = scan_all(&mut rows).unwrap();
        assert_eq!(ids, vec![3, 1, 2]);

        let blobs: Vec<Vec<u8>> =
            scan_all(&mut MemoryRows::new(["b"], vec![vec![Value::from(vec![1u8, 2])]]))
                .unwrap();
        assert_eq!(blobs, vec![vec![1, 2]]);
    }

    #[test]
    fn test_scan_custom_decoder() {
        let mut upper = Upper::default();
        upper.scan_from(&mut rows_one()).unwrap();
        assert_eq!(upper, Upper("X".into()));

        let all: Vec<Upper> = scan_all(&mut MemoryRows::new(
            ["a"],
            vec![vec![Value::from("a")], vec![Value::from("b")]],
        ))
        .unwrap();
        assert_eq!(all, vec![Upper("A".into()), Upper("B".into())]);
    }

    #[test]
    fn test_scan_custom_decoder_column_count() {
        let result = scan_one::<Upper>(&mut rows_two());
        assert!(matches!(result, Err(SqlpError::ColumnCount(2))));
    }

    struct FailingRows {
        inner: MemoryRows,
        advanced: Arc<AtomicUsize>,
    }

    impl Rows for FailingRows {
        fn advance(&mut self) -> bool {
            self.advanced.fetch_add(1, Ordering::SeqCst);
            self.inner.advance()
        }

        fn columns(&self) -> Result<Vec<String>> {
            self.inner.columns()
        }

        fn scan(&mut self, slots: &mut [Value]) -> Result<()> {
            self.inner.scan(slots)
        }

        fn err(&mut self) -> Result<()> {
            Err(SqlpError::Driver("connection reset".into()))
        }

        fn close(&mut self) -> Result<()> {
            self.inner.close()
        }
    }

    #[test]
    fn test_terminal_error_is_reported() {
        let advanced = Arc::new(AtomicUsize::new(0));
        let mut rows = FailingRows {
            inner: rows_three(),
            advanced: advanced.clone(),
        };
        let result = scan_all::<Record>(&mut rows);

        assert!(matches!(result, Err(SqlpError::Driver(_))));
        assert_eq!(advanced.load(Ordering::SeqCst), 4);

        let mut rows = FailingRows {
            inner: rows_zero(),
            advanced,
        };
        let result = scan_one::<Record>(&mut rows);
        assert!(matches!(result, Err(SqlpError::Driver(_))));
    }
}
