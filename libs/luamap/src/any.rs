use crate::opaque::Opaque;
use crate::value::{Table, Value};

/// Generic value stored into interface ("any") targets.
///
/// - Numbers are always `f64`: the runtime has one numeric type
/// - A table with a non-empty array part becomes `Array` of that part,
///   any other table becomes `Map` of all its pairs
/// - Opaque payloads are kept as-is, functions and channels are kept as
///   opaque references to their handles
#[derive(Debug, Clone, Default, PartialEq)]
pub enum AnyValue {
    #[default]
    Nil,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<AnyValue>),
    Map(Vec<(AnyValue, AnyValue)>),
    Opaque(Opaque),
}

impl AnyValue {
    /// Interface conversion. Never fails.
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Nil => AnyValue::Nil,
            Value::Bool(b) => AnyValue::Bool(*b),
            Value::Number(n) => AnyValue::Number(*n),
            Value::String(s) => AnyValue::String(s.clone()),
            Value::Table(t) => Self::from_table(t),
            Value::Opaque(o) if o.is_nil() => AnyValue::Nil,
            Value::Opaque(o) => AnyValue::Opaque(o.clone()),
            Value::Function(f) => AnyValue::Opaque(Opaque::new(f.clone())),
            Value::Channel(c) => AnyValue::Opaque(Opaque::new(c.clone())),
        }
    }

    fn from_table(table: &Table) -> Self {
        if table.len() > 0 {
            AnyValue::Array(table.array().iter().map(Self::from_value).collect())
        } else {
            AnyValue::Map(
                table
                    .iter()
                    .map(|(k, v)| (Self::from_value(&k), Self::from_value(v)))
                    .collect(),
            )
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, AnyValue::Nil)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AnyValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AnyValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AnyValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[AnyValue]> {
        match self {
            AnyValue::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_opaque(&self) -> Option<&Opaque> {
        match self {
            AnyValue::Opaque(o) => Some(o),
            _ => None,
        }
    }

    /// Look up a string key in a `Map`.
    pub fn get(&self, key: &str) -> Option<&AnyValue> {
        match self {
            AnyValue::Map(entries) => entries
                .iter()
                .find(|(k, _)| k.as_str() == Some(key))
                .map(|(_, v)| v),
            _ => None,
        }
    }
}
