//! Bound parameter values and the trusted identifier type.
//!
//! Query arguments are an ordered `&[Value]`; each variant maps to one
//! wire type, so a parameter's type is fixed where it is built rather than
//! discovered by the driver.

use chrono::{DateTime, NaiveDateTime, Utc};
use std::fmt;
use thiserror::Error;

/// A single bound argument or decoded column value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
    Timestamp(NaiveDateTime),
    Bytes(Vec<u8>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    fn kind(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Int(_) => "integer",
            Value::UInt(_) => "unsigned integer",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Timestamp(_) => "timestamp",
            Value::Bytes(_) => "bytes",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Int(v) => write!(f, "{}", v),
            Value::UInt(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Text(v) => write!(f, "{:?}", v),
            Value::Timestamp(v) => write!(f, "{}", v),
            Value::Bytes(v) => write!(f, "<{} bytes>", v.len()),
        }
    }
}

/// Renders an argument list as `[a, b, c]`.
pub struct DisplayArgs<'a>(pub &'a [Value]);

impl fmt::Display for DisplayArgs<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, value) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", value)?;
        }
        write!(f, "]")
    }
}

macro_rules! from_signed {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(v: $t) -> Self {
                Value::Int(i64::from(v))
            }
        })*
    };
}

macro_rules! from_unsigned {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(v: $t) -> Self {
                Value::UInt(u64::from(v))
            }
        })*
    };
}

from_signed!(i8, i16, i32, i64);
from_unsigned!(u8, u16, u32, u64);

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(f64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::Timestamp(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Timestamp(v.naive_utc())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Bytes(v.to_vec())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// Build a `Vec<Value>` from heterogeneous arguments.
///
/// ```
/// use dbcluster_core::{args, Value};
/// let a = args![1_u64, "title", None::<i64>];
/// assert_eq!(a[2], Value::Null);
/// ```
#[macro_export]
macro_rules! args {
    () => { ::std::vec::Vec::<$crate::Value>::new() };
    ($($arg:expr),+ $(,)?) => { vec![$($crate::Value::from($arg)),+] };
}

/// Why a column value could not become the requested Rust type.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValueError {
    #[error("unexpected NULL, expected {expected}")]
    UnexpectedNull { expected: &'static str },

    #[error("cannot decode {found} as {expected}")]
    Mismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("value {value} out of range for {expected}")]
    OutOfRange { expected: &'static str, value: String },
}

/// Conversion from a decoded column value.
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Result<Self, ValueError>;
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Result<Self, ValueError> {
        Ok(value.clone())
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Result<Self, ValueError> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

fn mismatch(expected: &'static str, found: &Value) -> ValueError {
    match found {
        Value::Null => ValueError::UnexpectedNull { expected },
        other => ValueError::Mismatch {
            expected,
            found: other.kind(),
        },
    }
}

macro_rules! from_value_int {
    ($($t:ty),*) => {
        $(impl FromValue for $t {
            fn from_value(value: &Value) -> Result<Self, ValueError> {
                let expected = stringify!($t);
                let out_of_range = |v: &dyn fmt::Display| ValueError::OutOfRange {
                    expected,
                    value: v.to_string(),
                };
                match value {
                    Value::Int(v) => <$t>::try_from(*v).map_err(|_| out_of_range(v)),
                    Value::UInt(v) => <$t>::try_from(*v).map_err(|_| out_of_range(v)),
                    // DECIMAL and aggregate results can arrive as text
                    Value::Text(s) => s.trim().parse::<$t>().map_err(|_| out_of_range(s)),
                    other => Err(mismatch(expected, other)),
                }
            }
        })*
    };
}

from_value_int!(i32, i64, u32, u64);

impl FromValue for f64 {
    fn from_value(value: &Value) -> Result<Self, ValueError> {
        match value {
            Value::Float(v) => Ok(*v),
            Value::Int(v) => Ok(*v as f64),
            Value::UInt(v) => Ok(*v as f64),
            Value::Text(s) => s.trim().parse().map_err(|_| ValueError::OutOfRange {
                expected: "f64",
                value: s.clone(),
            }),
            other => Err(mismatch("f64", other)),
        }
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Result<Self, ValueError> {
        match value {
            Value::Int(v) => Ok(*v != 0),
            Value::UInt(v) => Ok(*v != 0),
            other => Err(mismatch("bool", other)),
        }
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self, ValueError> {
        match value {
            Value::Text(s) => Ok(s.clone()),
            Value::Bytes(b) => String::from_utf8(b.clone()).map_err(|_| ValueError::Mismatch {
                expected: "String",
                found: "non-UTF-8 bytes",
            }),
            other => Err(mismatch("String", other)),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: &Value) -> Result<Self, ValueError> {
        match value {
            Value::Bytes(b) => Ok(b.clone()),
            Value::Text(s) => Ok(s.as_bytes().to_vec()),
            other => Err(mismatch("Vec<u8>", other)),
        }
    }
}

impl FromValue for NaiveDateTime {
    fn from_value(value: &Value) -> Result<Self, ValueError> {
        match value {
            Value::Timestamp(ts) => Ok(*ts),
            other => Err(mismatch("NaiveDateTime", other)),
        }
    }
}

impl FromValue for DateTime<Utc> {
    fn from_value(value: &Value) -> Result<Self, ValueError> {
        NaiveDateTime::from_value(value).map(|ts| ts.and_utc())
    }
}

/// A table or column name spliced into SQL text.
///
/// Only ever build one from a compile-time or operator-controlled name,
/// never from request input: it is quoted, not bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrustedIdent<'a>(&'a str);

impl<'a> TrustedIdent<'a> {
    pub const fn new(name: &'a str) -> Self {
        Self(name)
    }

    pub fn as_str(&self) -> &'a str {
        self.0
    }

    /// Backtick-quoted form, with embedded backticks doubled.
    pub fn quoted(&self) -> String {
        format!("`{}`", self.0.replace('`', "``"))
    }
}

impl fmt::Display for TrustedIdent<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.quoted())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn args_macro_builds_tagged_values() {
        let ts = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        let a = crate::args![7_u64, -3_i32, 1.5_f64, "title", ts, None::<String>, true];

        assert_eq!(
            a,
            vec![
                Value::UInt(7),
                Value::Int(-3),
                Value::Float(1.5),
                Value::Text("title".into()),
                Value::Timestamp(ts),
                Value::Null,
                Value::Int(1),
            ]
        );
        assert!(crate::args![].is_empty());
    }

    #[test]
    fn display_args() {
        let a = vec![Value::Int(1), Value::Text("x".into()), Value::Null, Value::Bytes(vec![0; 3])];
        assert_eq!(DisplayArgs(&a).to_string(), r#"[1, "x", NULL, <3 bytes>]"#);
        assert_eq!(DisplayArgs(&[]).to_string(), "[]");
    }

    #[test]
    fn integer_conversions() {
        assert_eq!(u64::from_value(&Value::Int(19)), Ok(19));
        assert_eq!(u64::from_value(&Value::Text("42".into())), Ok(42));
        assert!(matches!(
            u64::from_value(&Value::Int(-1)),
            Err(ValueError::OutOfRange { .. })
        ));
        assert!(matches!(
            i32::from_value(&Value::UInt(u64::MAX)),
            Err(ValueError::OutOfRange { .. })
        ));
        assert!(matches!(
            i64::from_value(&Value::Null),
            Err(ValueError::UnexpectedNull { .. })
        ));
    }

    #[test]
    fn option_absorbs_null() {
        assert_eq!(Option::<u64>::from_value(&Value::Null), Ok(None));
        assert_eq!(Option::<u64>::from_value(&Value::UInt(5)), Ok(Some(5)));
    }

    #[test]
    fn text_and_bytes() {
        assert_eq!(String::from_value(&Value::Bytes(b"abc".to_vec())), Ok("abc".to_string()));
        assert!(matches!(
            String::from_value(&Value::Int(1)),
            Err(ValueError::Mismatch { expected: "String", found: "integer" })
        ));
    }

    #[test]
    fn trusted_ident_quoting() {
        assert_eq!(TrustedIdent::new("articles").quoted(), "`articles`");
        assert_eq!(TrustedIdent::new("we`ird").to_string(), "`we``ird`");
    }
}
