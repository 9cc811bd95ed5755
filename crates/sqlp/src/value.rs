//! Dynamically typed values exchanged with templates and execution targets.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SqlpError};

/// A dynamically typed SQL value.
///
/// Used for argument records, bound parameters and decoded columns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

/// An argument record or a decoded row: column/key name to value.
pub type Record = HashMap<String, Value>;

impl Value {
    /// Short name of the variant, used in conversion errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Bool(_) => "bool",
            Value::Integer(_) => "integer",
            Value::Real(_) => "real",
            Value::Text(_) => "text",
            Value::Blob(_) => "blob",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the value as text when it is string-like (text or bytes).
    pub fn as_text(&self) -> Option<String> {
        match self {
            Value::Text(s) => Some(s.clone()),
            Value::Blob(b) => Some(String::from_utf8_lossy(b).into_owned()),
            _ => None,
        }
    }
}

macro_rules! value_from_int {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::Integer(i64::from(v))
                }
            }
        )*
    };
}

value_from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Real(f64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Blob(v)
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Blob(v.to_vec())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Integer(i),
                None => Value::Real(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::Text(s),
            other => Value::Text(other.to_string()),
        }
    }
}

/// Builds a [`Record`] from `key => value` pairs.
///
/// ```
/// let student = sqlp::record! { "name" => "alex", "class" => 1001 };
/// assert_eq!(student["class"], sqlp::Value::Integer(1001));
/// ```
#[macro_export]
macro_rules! record {
    () => {
        $crate::Record::new()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut record = $crate::Record::new();
        $(
            record.insert(::std::string::String::from($key), $crate::Value::from($value));
        )+
        record
    }};
}

/// Conversion from a decoded column value into a Rust type.
pub trait FromValue: Sized {
    fn from_value(value: Value) -> Result<Self>;
}

fn mismatch<T>(value: &Value) -> SqlpError {
    SqlpError::Type(format!(
        "cannot decode {} into `{}`",
        value.kind(),
        std::any::type_name::<T>()
    ))
}

impl FromValue for Value {
    fn from_value(value: Value) -> Result<Self> {
        Ok(value)
    }
}

impl FromValue for i64 {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Integer(i) => Ok(i),
            Value::Bool(b) => Ok(i64::from(b)),
            Value::Text(ref s) => s.trim().parse().map_err(|_| mismatch::<i64>(&value)),
            other => Err(mismatch::<i64>(&other)),
        }
    }
}

macro_rules! from_value_int {
    ($($ty:ty),*) => {
        $(
            impl FromValue for $ty {
                fn from_value(value: Value) -> Result<Self> {
                    let wide = i64::from_value(value)?;
                    <$ty>::try_from(wide).map_err(|_| {
                        SqlpError::Type(format!(
                            "{wide} is out of range for `{}`",
                            stringify!($ty)
                        ))
                    })
                }
            }
        )*
    };
}

from_value_int!(i8, i16, i32, u8, u16, u32, u64, usize);

impl FromValue for f64 {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Real(f) => Ok(f),
            Value::Integer(i) => Ok(i as f64),
            Value::Text(ref s) => s.trim().parse().map_err(|_| mismatch::<f64>(&value)),
            other => Err(mismatch::<f64>(&other)),
        }
    }
}

impl FromValue for f32 {
    fn from_value(value: Value) -> Result<Self> {
        f64::from_value(value).map(|f| f as f32)
    }
}

impl FromValue for bool {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Bool(b) => Ok(b),
            Value::Integer(i) => Ok(i != 0),
            Value::Text(ref s) => match s.as_str() {
                "true" | "TRUE" | "1" => Ok(true),
                "false" | "FALSE" | "0" => Ok(false),
                _ => Err(mismatch::<bool>(&value)),
            },
            other => Err(mismatch::<bool>(&other)),
        }
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Text(s) => Ok(s),
            Value::Blob(b) => String::from_utf8(b).map_err(|e| {
                SqlpError::Type(format!("blob is not valid UTF-8: {}", e.utf8_error()))
            }),
            Value::Integer(i) => Ok(i.to_string()),
            Value::Real(f) => Ok(f.to_string()),
            Value::Bool(b) => Ok(b.to_string()),
            Value::Null => Err(mismatch::<String>(&Value::Null)),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Blob(b) => Ok(b),
            Value::Text(s) => Ok(s.into_bytes()),
            other => Err(mismatch::<Vec<u8>>(&other)),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_macro() {
        let record = record! {
            "table" => "`student`",
            "class" => 1002,
            "score" => 9.5,
            "active" => true,
            "note" => None::<String>,
        };

        assert_eq!(record.len(), 5);
        assert_eq!(record["table"], Value::Text("`student`".into()));
        assert_eq!(record["class"], Value::Integer(1002));
        assert_eq!(record["score"], Value::Real(9.5));
        assert_eq!(record["active"], Value::Bool(true));
        assert_eq!(record["note"], Value::Null);
        assert!(record!().is_empty());
    }

    #[test]
    fn test_from_json() {
        let value = serde_json::json!({ "a": [1, 2] });
        assert_eq!(Value::from(value), Value::Text(r#"{"a":[1,2]}"#.into()));
        assert_eq!(Value::from(serde_json::json!(7)), Value::Integer(7));
        assert_eq!(Value::from(serde_json::json!(1.5)), Value::Real(1.5));
        assert_eq!(Value::from(serde_json::json!(null)), Value::Null);
    }

    #[test]
    fn test_as_text() {
        assert_eq!(Value::from("x").as_text(), Some("x".to_string()));
        assert_eq!(Value::from(b"id".as_slice()).as_text(), Some("id".to_string()));
        assert_eq!(Value::from(1).as_text(), None);
        assert_eq!(Value::Null.as_text(), None);
    }

    #[test]
    fn test_integer_conversions() {
        assert_eq!(i64::from_value(Value::Integer(7)).unwrap(), 7);
        assert_eq!(i64::from_value(Value::Text(" 42 ".into())).unwrap(), 42);
        assert_eq!(i32::from_value(Value::Bool(true)).unwrap(), 1);
        assert!(matches!(
            u8::from_value(Value::Integer(300)),
            Err(SqlpError::Type(_))
        ));
        assert!(matches!(
            i64::from_value(Value::Null),
            Err(SqlpError::Type(_))
        ));
    }

    #[test]
    fn test_text_conversions() {
        assert_eq!(String::from_value(Value::Integer(5)).unwrap(), "5");
        assert_eq!(
            String::from_value(Value::Blob(b"bob".to_vec())).unwrap(),
            "bob"
        );
        assert!(String::from_value(Value::Blob(vec![0xff, 0xfe])).is_err());
        assert_eq!(
            Vec::<u8>::from_value(Value::Text("ab".into())).unwrap(),
            b"ab".to_vec()
        );
    }

    #[test]
    fn test_optional_conversions() {
        assert_eq!(Option::<String>::from_value(Value::Null).unwrap(), None);
        assert_eq!(
            Option::<f64>::from_value(Value::Integer(2)).unwrap(),
            Some(2.0)
        );
        assert!(bool::from_value(Value::Integer(0)).is_ok_and(|b| !b));
        assert!(bool::from_value(Value::Real(1.0)).is_err());
    }

    #[test]
    fn test_serialize_for_templates() {
        let record = record! { "name" => "alex", "class" => 1001 };
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["name"], "alex");
        assert_eq!(json["class"], 1001);
    }
}
