//! Typed output tree produced by the decoder.
//!
//! `Data` mirrors the logical shape of the typed instance: each slot has
//! already been coerced to the kind its type expression asked for. Anything
//! no rule could convert is *lifted* structurally (see [`Data::lift`]), which
//! is what type checking then rejects.
//!
//! Every `Data` re-encodes to a JSON value tree, so a decoded record can be
//! written out and decoded again.
use std::sync::Arc;

use indexmap::IndexMap;
use ordered_float::OrderedFloat;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use serde_json::{Map, Number, Value};

use crate::error::{DecodeError, FieldPath};

#[derive(Debug, Clone)]
pub enum Data {
    Absent,
    Bool(bool),
    /// Wide enough for every JSON integer (`i64` and `u64` ranges).
    Int(i128),
    Float(OrderedFloat<f64>),
    Str(String),
    Bytes(Vec<u8>),
    Enum(EnumValue),
    Seq(Vec<Data>),
    /// Deduplicated; order is not significant for equality.
    Set(Vec<Data>),
    /// Insertion-ordered key/value pairs.
    Map(Vec<(Data, Data)>),
    Tuple(Vec<Data>),
    Record(Record),
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumValue {
    pub enum_name: Arc<str>,
    pub member: String,
    pub raw: Value,
}

/// A constructed record instance: schema name plus named field values.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    name: String,
    fields: IndexMap<String, Data>,
}

// ————————————————————————————————————————————————————————————————————————————
// DATA
// ————————————————————————————————————————————————————————————————————————————

impl Data {
    /// Structural conversion of an untyped value tree.
    pub fn lift(value: &Value) -> Self {
        match value {
            Value::Null => Data::Absent,
            Value::Bool(b) => Data::Bool(*b),
            Value::Number(n) => match int_of(n) {
                Some(i) => Data::Int(i),
                None => Data::Float(OrderedFloat(n.as_f64().unwrap_or(f64::NAN))),
            },
            Value::String(s) => Data::Str(s.clone()),
            Value::Array(xs) => Data::Seq(xs.iter().map(Data::lift).collect()),
            Value::Object(map) => Data::Map(
                map.iter()
                    .map(|(k, v)| (Data::Str(k.clone()), Data::lift(v)))
                    .collect(),
            ),
        }
    }

    pub fn float(f: f64) -> Self {
        Data::Float(OrderedFloat(f))
    }

    pub fn str(s: impl Into<String>) -> Self {
        Data::Str(s.into())
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Data::Absent)
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Data::Record(r) => Some(r),
            _ => None,
        }
    }

    /// Short description of the runtime shape, for messages.
    pub fn shape(&self) -> &'static str {
        match self {
            Data::Absent => "None",
            Data::Bool(_) => "bool",
            Data::Int(_) => "int",
            Data::Float(_) => "float",
            Data::Str(_) => "str",
            Data::Bytes(_) => "bytes",
            Data::Enum(_) => "enum",
            Data::Seq(_) => "list",
            Data::Set(_) => "set",
            Data::Map(_) => "dict",
            Data::Tuple(_) => "tuple",
            Data::Record(_) => "record",
        }
    }

    /// Re-encode as a JSON value tree.
    pub fn to_value(&self) -> Value {
        match self {
            Data::Absent => Value::Null,
            Data::Bool(b) => Value::Bool(*b),
            Data::Int(i) => int_value(*i),
            Data::Float(f) => Number::from_f64(f.0).map(Value::Number).unwrap_or(Value::Null),
            Data::Str(s) => Value::String(s.clone()),
            Data::Bytes(bytes) => Value::Array(bytes.iter().map(|b| Value::from(*b)).collect()),
            Data::Enum(e) => e.raw.clone(),
            Data::Seq(xs) | Data::Set(xs) | Data::Tuple(xs) => {
                Value::Array(xs.iter().map(Data::to_value).collect())
            }
            Data::Map(entries) => Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.key_string(), v.to_value()))
                    .collect::<Map<_, _>>(),
            ),
            Data::Record(r) => r.to_value(),
        }
    }

    /// Object keys are always text in the value tree.
    pub fn key_string(&self) -> String {
        match self {
            Data::Str(s) => s.clone(),
            Data::Enum(e) => match &e.raw {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            },
            other => match other.to_value() {
                Value::String(s) => s,
                v => v.to_string(),
            },
        }
    }
}

/// The integer a JSON number holds, if it is one.
pub fn int_of(n: &Number) -> Option<i128> {
    n.as_i64().map(i128::from).or_else(|| n.as_u64().map(i128::from))
}

fn int_value(i: i128) -> Value {
    if let Ok(i) = i64::try_from(i) {
        return Value::from(i);
    }
    match u64::try_from(i) {
        Ok(u) => Value::from(u),
        Err(_) => Number::from_f64(i as f64).map(Value::Number).unwrap_or(Value::Null),
    }
}

impl PartialEq for Data {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Data::Absent, Data::Absent) => true,
            (Data::Bool(a), Data::Bool(b)) => a == b,
            (Data::Int(a), Data::Int(b)) => a == b,
            (Data::Float(a), Data::Float(b)) => a == b,
            (Data::Str(a), Data::Str(b)) => a == b,
            (Data::Bytes(a), Data::Bytes(b)) => a == b,
            (Data::Enum(a), Data::Enum(b)) => a == b,
            (Data::Seq(a), Data::Seq(b)) | (Data::Tuple(a), Data::Tuple(b)) => a == b,
            (Data::Set(a), Data::Set(b)) => {
                a.len() == b.len() && a.iter().all(|x| b.contains(x))
            }
            (Data::Map(a), Data::Map(b)) => a == b,
            (Data::Record(a), Data::Record(b)) => a == b,
            _ => false,
        }
    }
}

impl Serialize for Data {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Data::Seq(xs) | Data::Set(xs) | Data::Tuple(xs) => {
                let mut seq = serializer.serialize_seq(Some(xs.len()))?;
                for x in xs {
                    seq.serialize_element(x)?;
                }
                seq.end()
            }
            Data::Map(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (k, v) in entries {
                    map.serialize_entry(&k.key_string(), v)?;
                }
                map.end()
            }
            Data::Record(r) => r.serialize(serializer),
            scalar => scalar.to_value().serialize(serializer),
        }
    }
}

impl From<Record> for Data {
    fn from(record: Record) -> Self {
        Data::Record(record)
    }
}

// ————————————————————————————————————————————————————————————————————————————
// RECORD
// ————————————————————————————————————————————————————————————————————————————

impl Record {
    /// Primary construction from the fields that participate in it.
    pub fn construct(name: impl Into<String>, init: IndexMap<String, Data>) -> Self {
        Self { name: name.into(), fields: init }
    }

    /// Post-construction assignment.
    pub fn set(&mut self, field: impl Into<String>, value: Data) {
        self.fields.insert(field.into(), value);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self, field: &str) -> Option<&Data> {
        self.fields.get(field)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Data)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Remove a field and convert it; a missing field reads as `Absent`.
    pub fn take<T: FromData>(&mut self, field: &str) -> Result<T, DecodeError> {
        let data = self.fields.shift_remove(field).unwrap_or(Data::Absent);
        let value = data.to_value();
        T::from_data(data).ok_or_else(|| DecodeError::WrongType {
            path: FieldPath::field(field),
            expected: std::any::type_name::<T>().to_string(),
            value,
        })
    }

    pub fn to_value(&self) -> Value {
        Value::Object(
            self.fields
                .iter()
                .map(|(k, v)| (k.clone(), v.to_value()))
                .collect(),
        )
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (k, v) in &self.fields {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

// ————————————————————————————————————————————————————————————————————————————
// TYPED EXTRACTION
// ————————————————————————————————————————————————————————————————————————————

/// Conversion from decoded data into a Rust value.
pub trait FromData: Sized {
    fn from_data(data: Data) -> Option<Self>;
}

/// Construction of a caller-defined type from a decoded record.
pub trait FromRecord: Sized {
    fn from_record(record: Record) -> Result<Self, DecodeError>;
}

impl FromRecord for Record {
    fn from_record(record: Record) -> Result<Self, DecodeError> {
        Ok(record)
    }
}

impl FromData for Data {
    fn from_data(data: Data) -> Option<Self> {
        Some(data)
    }
}

impl FromData for bool {
    fn from_data(data: Data) -> Option<Self> {
        match data {
            Data::Bool(b) => Some(b),
            _ => None,
        }
    }
}

impl FromData for i64 {
    fn from_data(data: Data) -> Option<Self> {
        match data {
            Data::Int(i) => i64::try_from(i).ok(),
            _ => None,
        }
    }
}

impl FromData for u64 {
    fn from_data(data: Data) -> Option<Self> {
        match data {
            Data::Int(i) => u64::try_from(i).ok(),
            _ => None,
        }
    }
}

impl FromData for f64 {
    fn from_data(data: Data) -> Option<Self> {
        match data {
            Data::Float(f) => Some(f.0),
            Data::Int(i) => Some(i as f64),
            _ => None,
        }
    }
}

impl FromData for String {
    fn from_data(data: Data) -> Option<Self> {
        match data {
            Data::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl FromData for EnumValue {
    fn from_data(data: Data) -> Option<Self> {
        match data {
            Data::Enum(e) => Some(e),
            _ => None,
        }
    }
}

impl FromData for Record {
    fn from_data(data: Data) -> Option<Self> {
        match data {
            Data::Record(r) => Some(r),
            _ => None,
        }
    }
}

impl<T: FromData> FromData for Option<T> {
    fn from_data(data: Data) -> Option<Self> {
        match data {
            Data::Absent => Some(None),
            other => T::from_data(other).map(Some),
        }
    }
}

impl<T: FromData> FromData for Vec<T> {
    fn from_data(data: Data) -> Option<Self> {
        match data {
            Data::Seq(xs) | Data::Set(xs) | Data::Tuple(xs) => {
                xs.into_iter().map(T::from_data).collect()
            }
            _ => None,
        }
    }
}

impl<T: FromData> FromData for IndexMap<String, T> {
    fn from_data(data: Data) -> Option<Self> {
        match data {
            Data::Map(entries) => entries
                .into_iter()
                .map(|(k, v)| Some((k.key_string(), T::from_data(v)?)))
                .collect(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn lift_follows_json_shape() {
        let data = Data::lift(&json!({"a": [1, 2.5, null], "b": "x"}));
        assert_eq!(
            data,
            Data::Map(vec![
                (Data::str("a"), Data::Seq(vec![Data::Int(1), Data::float(2.5), Data::Absent])),
                (Data::str("b"), Data::str("x")),
            ])
        );
    }

    #[test]
    fn set_equality_ignores_order() {
        let a = Data::Set(vec![Data::Int(1), Data::Int(2)]);
        let b = Data::Set(vec![Data::Int(2), Data::Int(1)]);
        assert_eq!(a, b);
        assert_ne!(Data::Seq(vec![Data::Int(1), Data::Int(2)]), Data::Seq(vec![Data::Int(2), Data::Int(1)]));
    }

    #[test]
    fn map_keys_encode_as_text() {
        let data = Data::Map(vec![(Data::Int(7), Data::Bool(true))]);
        assert_eq!(data.to_value(), json!({"7": true}));
        assert_eq!(serde_json::to_value(&data).ok(), Some(json!({"7": true})));
    }

    #[test]
    fn integers_cover_the_unsigned_range() {
        let big = json!(u64::MAX);
        assert_eq!(Data::lift(&big), Data::Int(i128::from(u64::MAX)));
        assert_eq!(Data::lift(&big).to_value(), big);
        assert_eq!(Data::lift(&json!(-3)).to_value(), json!(-3));
        assert_eq!(u64::from_data(Data::Int(i128::from(u64::MAX))), Some(u64::MAX));
        assert_eq!(i64::from_data(Data::Int(i128::from(u64::MAX))), None);
    }

    #[test]
    fn enums_encode_as_raw() {
        let red = Data::Enum(EnumValue { enum_name: "Color".into(), member: "RED".into(), raw: json!("Red") });
        assert_eq!(red.to_value(), json!("Red"));
        assert_eq!(red.key_string(), "Red");
    }

    #[test]
    fn records_keep_field_order_and_post_init_fields_last() {
        let mut init = IndexMap::new();
        init.insert("b".to_string(), Data::Int(1));
        init.insert("a".to_string(), Data::Int(2));
        let mut record = Record::construct("Pair", init);
        record.set("cached", Data::Absent);
        let names: Vec<_> = record.fields().map(|(k, _)| k).collect();
        assert_eq!(names, ["b", "a", "cached"]);
        assert_eq!(serde_json::to_string(&record).ok().as_deref(), Some(r#"{"b":1,"a":2,"cached":null}"#));
    }

    #[test]
    fn take_converts_or_reports_the_field() {
        let mut init = IndexMap::new();
        init.insert("name".to_string(), Data::str("par"));
        init.insert("tags".to_string(), Data::Seq(vec![Data::str("x")]));
        let mut record = Record::construct("Fixture", init);
        assert_eq!(record.take::<Option<String>>("missing").ok(), Some(None));
        assert_eq!(record.take::<Vec<String>>("tags").ok(), Some(vec!["x".to_string()]));
        let err = record.take::<i64>("name").err();
        assert!(matches!(err, Some(DecodeError::WrongType { ref path, .. }) if path.to_string() == "name"));
    }
}
