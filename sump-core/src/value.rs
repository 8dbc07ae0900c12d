use rust_decimal::Decimal;
use std::fmt::{self, Display};
use time::{Date, PrimitiveDateTime};
use uuid::Uuid;

/// A scalar runtime value moving between the query model, the dialect
/// compilers and a backend connection.
///
/// `Null` doubles as the explicit "no value" marker: a field set to `Null`
/// is persisted as NULL, while an absent field is not persisted at all.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Decimal(Decimal),
    Text(String),
    Bytes(Vec<u8>),
    Date(Date),
    Timestamp(PrimitiveDateTime),
    Uuid(Uuid),
    List(Vec<Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::Int(v) if *v >= 0 => Some(*v as u64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(v) => Some(v),
            _ => None,
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(v) => v.fmt(f),
            Value::Int(v) => v.fmt(f),
            Value::Float(v) => v.fmt(f),
            Value::Decimal(v) => v.fmt(f),
            Value::Text(v) => v.fmt(f),
            Value::Bytes(v) => write!(f, "<{} bytes>", v.len()),
            Value::Date(v) => v.fmt(f),
            Value::Timestamp(v) => v.fmt(f),
            Value::Uuid(v) => v.fmt(f),
            Value::List(v) => {
                f.write_str("[")?;
                for (i, item) in v.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    item.fmt(f)?;
                }
                f.write_str("]")
            }
        }
    }
}

macro_rules! value_from {
    ($($variant:ident: $($type:ty),+;)+) => {$($(
        impl From<$type> for Value {
            fn from(value: $type) -> Self {
                Value::$variant(value.into())
            }
        }
    )+)+};
}
value_from! {
    Bool: bool;
    Int: i8, i16, i32, i64, u8, u16, u32;
    Float: f32, f64;
    Decimal: Decimal;
    Text: &str, String;
    Bytes: Vec<u8>;
    Date: Date;
    Timestamp: PrimitiveDateTime;
    Uuid: Uuid;
    List: Vec<Value>;
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}
