//! Schemaless values carried by audit events and version comparisons
use super::types::{Amount, TimeStamp};
use chrono::Utc;
use std::collections::BTreeMap;

/// Ordered key to value mapping
pub type Fields = BTreeMap<String, Value>;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq, Default)]
pub enum Value {
    #[default]
    #[n(0)]
    Null,
    #[n(1)]
    Bool(#[n(0)] bool),
    #[n(2)]
    Int(#[n(0)] i64),
    #[n(3)]
    Decimal(#[n(0)] Amount),
    #[n(4)]
    Text(#[n(0)] String),
    #[n(5)]
    Time(#[n(0)] TimeStamp<Utc>),
    #[n(6)]
    List(#[n(0)] Vec<Value>),
    #[n(7)]
    Map(#[n(0)] Fields),
}

impl Value {
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Map(fields) => fields.get(key),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(text) => Some(text),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::Int(value.into())
    }
}

impl From<Amount> for Value {
    fn from(value: Amount) -> Self {
        Value::Decimal(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<TimeStamp<Utc>> for Value {
    fn from(value: TimeStamp<Utc>) -> Self {
        Value::Time(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(value: Vec<T>) -> Self {
        Value::List(value.into_iter().map(Into::into).collect())
    }
}

/// Builder for `Value::Map`
#[derive(Debug, Default)]
pub struct MapBuilder(Fields);

impl MapBuilder {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }
    pub fn build(self) -> Value {
        Value::Map(self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_value_encoding() {
        let value = MapBuilder::new()
            .field("status", "draft")
            .field("version_number", 2u32)
            .field("subtotal", Amount::new(200_000, 2))
            .field("approved_by", None::<String>)
            .field("tags", vec!["a", "b"])
            .build();

        let encoding = minicbor::to_vec(&value).unwrap();
        let decoded: Value = minicbor::decode(&encoding).unwrap();

        assert_eq!(value, decoded);
        assert_eq!(decoded.get("status").and_then(Value::as_text), Some("draft"));
        assert_eq!(decoded.get("approved_by"), Some(&Value::Null));
    }
}
