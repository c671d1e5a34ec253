//! The reconstruction engine.
//!
//! Walks a record schema and a value tree in lock-step. Per field: coerce the
//! raw value (hooks, casts), build it against the field's type, type-check
//! the result, then collect it for construction. The first field-level
//! failure aborts the record; its path is extended by every containing field
//! on the way out.
//!
//! Decoding is pure and synchronous. Schemas and configs are read-only, so
//! independent decodes may run on as many threads as the caller likes.
use std::collections::HashSet;
use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::{Map, Number, Value};
use tracing::{debug, trace};

use crate::coerce::{as_bytes, key_text, parse_int, transform};
use crate::config::DecodeConfig;
use crate::error::{DecodeError, FieldPath};
use crate::schema::{Field, RecordSchema};
use crate::ty::Ty;
use crate::value::{int_of, Data, EnumValue, FromRecord, Record};

// ————————————————————————————————————————————————————————————————————————————
// ENTRY POINTS
// ————————————————————————————————————————————————————————————————————————————

pub fn decode(schema: &RecordSchema, input: &Map<String, Value>, config: &DecodeConfig) -> Result<Record, DecodeError> {
    debug!(record = schema.name(), keys = input.len(), "decoding record");
    if config.strict {
        let extra: Vec<String> = input.keys().filter(|k| !schema.has_field(k)).cloned().collect();
        if !extra.is_empty() {
            return Err(DecodeError::UnexpectedData { keys: extra });
        }
    }

    let mut init = IndexMap::with_capacity(schema.fields().len());
    let mut post_init = Vec::new();
    for field in schema.fields() {
        let value = match input.get(&field.name) {
            Some(raw) => decode_field(field, raw.clone(), config).map_err(|e| e.within(&field.name))?,
            None => match field.resolve_default() {
                Some(default) => default,
                None if !field.init => continue,
                None => {
                    return Err(DecodeError::MissingValue { path: FieldPath::field(&field.name) });
                }
            },
        };
        if field.init {
            init.insert(field.name.clone(), value);
        } else {
            post_init.push((field.name.clone(), value));
        }
    }

    let mut record = Record::construct(schema.name(), init);
    for (name, value) in post_init {
        record.set(name, value);
    }
    Ok(record)
}

/// Like [`decode`], for a root value that should be a mapping.
pub fn decode_value(schema: &RecordSchema, input: &Value, config: &DecodeConfig) -> Result<Record, DecodeError> {
    match input {
        Value::Object(map) => decode(schema, map, config),
        other => Err(DecodeError::wrong_type(schema.name(), other.clone())),
    }
}

/// Decode, then hand the record to a caller-defined constructor.
pub fn decode_as<T: FromRecord>(schema: &RecordSchema, input: &Value, config: &DecodeConfig) -> Result<T, DecodeError> {
    T::from_record(decode_value(schema, input, config)?)
}

/// A schema bound to a configuration; cheap to clone into worker threads.
#[derive(Debug, Clone)]
pub struct Decoder {
    schema: Arc<RecordSchema>,
    config: Arc<DecodeConfig>,
}

impl Decoder {
    pub fn new(schema: Arc<RecordSchema>, config: DecodeConfig) -> Self {
        Self { schema, config: Arc::new(config) }
    }

    pub fn schema(&self) -> &RecordSchema {
        &self.schema
    }

    pub fn config(&self) -> &DecodeConfig {
        &self.config
    }

    pub fn decode(&self, input: &Value) -> Result<Record, DecodeError> {
        decode_value(&self.schema, input, &self.config)
    }

    pub fn decode_as<T: FromRecord>(&self, input: &Value) -> Result<T, DecodeError> {
        decode_as(&self.schema, input, &self.config)
    }
}

fn decode_field(field: &Field, raw: Value, config: &DecodeConfig) -> Result<Data, DecodeError> {
    let raw = transform(&field.ty, raw, config)?;
    let value = build(&field.ty, raw, config)?;
    if config.check_types && !conforms(&value, &field.ty) {
        return Err(DecodeError::wrong_type(&field.ty, value.to_value()));
    }
    Ok(value)
}

/// Build and type-check with the default configuration. Used for declared defaults.
pub(crate) fn build_checked(ty: &Ty, value: Value) -> Result<Data, DecodeError> {
    let data = build(ty, value, &DecodeConfig::default())?;
    if !conforms(&data, ty) {
        return Err(DecodeError::wrong_type(ty, data.to_value()));
    }
    Ok(data)
}

// ————————————————————————————————————————————————————————————————————————————
// BUILD
// ————————————————————————————————————————————————————————————————————————————

/// Build `value` against `ty`. Values that fit no rule are lifted unchanged,
/// leaving the verdict to [`conforms`].
pub fn build(ty: &Ty, value: Value, config: &DecodeConfig) -> Result<Data, DecodeError> {
    match (ty, value) {
        (Ty::Optional(_), Value::Null) => Ok(Data::Absent),
        (Ty::Optional(inner), value) => build(inner, value, config),
        (Ty::Union(alts), value) => build_union(ty, alts, value, config),
        (Ty::Enum(def), value) => match def.by_raw(&value) {
            Some(member) => Ok(Data::Enum(EnumValue {
                enum_name: Arc::from(def.name.as_str()),
                member: member.name.clone(),
                raw: member.raw.clone(),
            })),
            None => Err(DecodeError::wrong_type(ty, value)),
        },

        // ---- collections: only when the outer shape already matches ----
        (Ty::Sequence(item), Value::Array(xs)) => build_all(item, xs, config).map(Data::Seq),
        (Ty::Set(item), Value::Array(xs)) => {
            let mut out: Vec<Data> = Vec::with_capacity(xs.len());
            for x in build_all(item, xs, config)? {
                if !out.contains(&x) {
                    out.push(x);
                }
            }
            Ok(Data::Set(out))
        }
        (Ty::TupleRepeat(item), Value::Array(xs)) => build_all(item, xs, config).map(Data::Tuple),
        (Ty::Tuple(items), Value::Array(xs)) => {
            // zip-longest: missing trailing slots read as null, extra items stay untyped
            let len = items.len().max(xs.len());
            let mut xs = xs.into_iter();
            (0..len)
                .map(|i| {
                    let x = xs.next().unwrap_or(Value::Null);
                    match items.get(i) {
                        Some(slot) => build(slot, x, config),
                        None => Ok(Data::lift(&x)),
                    }
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Data::Tuple)
        }
        (Ty::Mapping(key_ty, value_ty), Value::Object(map)) => build_map(ty, key_ty, value_ty, map, config),
        (Ty::Record(schema), Value::Object(map)) => decode(schema, &map, config).map(Data::Record),

        // ---- primitives ----
        (Ty::Bool, Value::Bool(b)) => Ok(Data::Bool(b)),
        (Ty::Integer, Value::Number(n)) => Ok(match int_of(&n) {
            Some(i) => Data::Int(i),
            None => Data::lift(&Value::Number(n)),
        }),
        (Ty::Float, Value::Number(n)) => Ok(Data::float(n.as_f64().unwrap_or(f64::NAN))),
        (Ty::String, Value::String(s)) => Ok(Data::Str(s)),
        (Ty::Bytes, value) => Ok(match as_bytes(&value) {
            Some(bytes) => Data::Bytes(bytes),
            None => Data::lift(&value),
        }),

        (_, value) => Ok(Data::lift(&value)),
    }
}

fn build_all(item: &Ty, xs: Vec<Value>, config: &DecodeConfig) -> Result<Vec<Data>, DecodeError> {
    xs.into_iter().map(|x| build(item, x, config)).collect()
}

/// Every entry is built; two keys that build to the same key fail the mapping.
fn build_map(
    ty: &Ty,
    key_ty: &Ty,
    value_ty: &Ty,
    map: Map<String, Value>,
    config: &DecodeConfig,
) -> Result<Data, DecodeError> {
    let mut seen = HashSet::with_capacity(map.len());
    let mut entries = Vec::with_capacity(map.len());
    for (k, v) in &map {
        let key = build_key(key_ty, k.clone(), config)?;
        if !seen.insert(key.key_string()) {
            return Err(DecodeError::wrong_type(ty, Value::Object(map.clone())));
        }
        entries.push((key, build(value_ty, v.clone(), config)?));
    }
    Ok(Data::Map(entries))
}

/// Object keys arrive as text; parse them for non-text key types first.
fn build_key(ty: &Ty, key: String, config: &DecodeConfig) -> Result<Data, DecodeError> {
    let parsed = match ty {
        Ty::Integer => parse_int(&key),
        Ty::Float => key.parse::<f64>().ok().and_then(Number::from_f64).map(Value::Number),
        Ty::Bool => match key.as_str() {
            "true" => Some(Value::Bool(true)),
            "false" => Some(Value::Bool(false)),
            _ => None,
        },
        Ty::Enum(def) => def
            .members
            .iter()
            .find(|m| key_text(m.raw.clone()) == key)
            .map(|m| m.raw.clone()),
        _ => None,
    };
    build(ty, parsed.unwrap_or(Value::String(key)), config)
}

// ————————————————————————————————————————————————————————————————————————————
// UNIONS
// ————————————————————————————————————————————————————————————————————————————

fn build_union(ty: &Ty, alts: &[Ty], value: Value, config: &DecodeConfig) -> Result<Data, DecodeError> {
    let mut matches: Vec<(&Ty, Data)> = Vec::new();
    for alt in alts {
        let raw = match transform(alt, value.clone(), config) {
            Ok(raw) => raw,
            Err(error) => {
                trace!(alternative = %alt, %error, "union alternative hook failed");
                continue;
            }
        };
        match build(alt, raw, config) {
            Ok(data) if conforms(&data, alt) => {
                if !config.strict_unions_match {
                    debug!(union = %ty, alternative = %alt, "union matched");
                    return Ok(data);
                }
                matches.push((alt, data));
            }
            Ok(data) => trace!(alternative = %alt, shape = data.shape(), "union alternative does not conform"),
            Err(error) => trace!(alternative = %alt, %error, "union alternative rejected"),
        }
    }

    if config.strict_unions_match {
        if matches.len() > 1 {
            return Err(DecodeError::StrictUnionMatch {
                path: FieldPath::root(),
                matching: matches.iter().map(|(alt, _)| alt.name()).collect(),
            });
        }
        if let Some((alt, data)) = matches.pop() {
            debug!(union = %ty, alternative = %alt, "union matched exactly one alternative");
            return Ok(data);
        }
    }
    if !config.check_types {
        return Ok(Data::lift(&value));
    }
    Err(DecodeError::UnionMatch {
        path: FieldPath::root(),
        field_type: ty.name(),
        candidates: alts.iter().map(Ty::name).collect(),
        value,
    })
}

// ————————————————————————————————————————————————————————————————————————————
// TYPE CHECK
// ————————————————————————————————————————————————————————————————————————————

/// Structural instance check. `int` satisfies `float` (numeric tower).
pub fn conforms(data: &Data, ty: &Ty) -> bool {
    match (ty, data) {
        (Ty::Dynamic, _) => true,
        (Ty::Optional(_), Data::Absent) => true,
        (Ty::Optional(inner), data) => conforms(data, inner),
        (Ty::Union(alts), data) => alts.iter().any(|alt| conforms(data, alt)),
        (Ty::Absent, Data::Absent)
        | (Ty::Bool, Data::Bool(_))
        | (Ty::Integer, Data::Int(_))
        | (Ty::Float, Data::Float(_) | Data::Int(_))
        | (Ty::String, Data::Str(_))
        | (Ty::Bytes, Data::Bytes(_)) => true,
        (Ty::Enum(def), Data::Enum(value)) => *value.enum_name == *def.name,
        (Ty::Sequence(item), Data::Seq(xs))
        | (Ty::Set(item), Data::Set(xs))
        | (Ty::TupleRepeat(item), Data::Tuple(xs)) => xs.iter().all(|x| conforms(x, item)),
        (Ty::Tuple(items), Data::Tuple(xs)) => {
            items.len() == xs.len() && xs.iter().zip(items).all(|(x, t)| conforms(x, t))
        }
        (Ty::Mapping(key_ty, value_ty), Data::Map(entries)) => entries
            .iter()
            .all(|(k, v)| conforms(k, key_ty) && conforms(v, value_ty)),
        (Ty::Record(schema), Data::Record(record)) => record.name() == schema.name(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ty::{EnumDef, TypeKind};
    use serde_json::json;

    fn lax() -> DecodeConfig {
        DecodeConfig::default()
    }

    #[test]
    fn primitives_build_when_shapes_match() {
        assert_eq!(build(&Ty::Integer, json!(3), &lax()).ok(), Some(Data::Int(3)));
        assert_eq!(build(&Ty::Float, json!(3), &lax()).ok(), Some(Data::float(3.0)));
        assert_eq!(build(&Ty::Bytes, json!([0, 255]), &lax()).ok(), Some(Data::Bytes(vec![0, 255])));
        assert_eq!(build(&Ty::Integer, json!("3"), &lax()).ok(), Some(Data::str("3")));
        assert_eq!(build(&Ty::Integer, json!(2.5), &lax()).ok(), Some(Data::float(2.5)));
    }

    #[test]
    fn tuples_pad_and_check_arity() {
        let pair = Ty::Tuple(vec![Ty::Integer, Ty::optional(Ty::String)]);
        let data = build(&pair, json!([1]), &lax()).unwrap();
        assert_eq!(data, Data::Tuple(vec![Data::Int(1), Data::Absent]));
        assert!(conforms(&data, &pair));

        let long = build(&pair, json!([1, "a", true]), &lax()).unwrap();
        assert!(!conforms(&long, &pair));

        let many = Ty::TupleRepeat(Box::new(Ty::Integer));
        let data = build(&many, json!([1, 2, 3]), &lax()).unwrap();
        assert_eq!(data, Data::Tuple(vec![Data::Int(1), Data::Int(2), Data::Int(3)]));
        assert!(conforms(&data, &many));
        assert!(conforms(&Data::Tuple(vec![]), &Ty::Tuple(vec![])));
    }

    #[test]
    fn sets_deduplicate() {
        let data = build(&Ty::set(Ty::Integer), json!([1, 2, 1]), &lax()).unwrap();
        assert_eq!(data, Data::Set(vec![Data::Int(2), Data::Int(1)]));
    }

    #[test]
    fn mapping_keys_are_parsed_for_their_type() {
        let ty = Ty::map(Ty::Integer, Ty::String);
        let data = build(&ty, json!({"1": "a", "20": "b"}), &lax()).unwrap();
        assert_eq!(
            data,
            Data::Map(vec![(Data::Int(1), Data::str("a")), (Data::Int(20), Data::str("b"))])
        );
        assert!(conforms(&data, &ty));
        let bad = build(&ty, json!({"x": "a"}), &lax()).unwrap();
        assert!(!conforms(&bad, &ty));
    }

    #[test]
    fn keys_that_build_to_the_same_key_fail_the_mapping() {
        let ty = Ty::map(Ty::Integer, Ty::String);
        assert!(matches!(
            build(&ty, json!({"1": "a", "01": "b"}), &lax()),
            Err(DecodeError::WrongType { ref expected, .. }) if expected == "dict[int, str]"
        ));
    }

    #[test]
    fn integers_beyond_i64_build() {
        let big = json!(u64::MAX);
        assert_eq!(build(&Ty::Integer, big.clone(), &lax()).ok(), Some(Data::Int(i128::from(u64::MAX))));
        let config = DecodeConfig::default().cast(TypeKind::Integer);
        assert_eq!(build(&Ty::Integer, big.clone(), &config).ok().map(|d| d.to_value()), Some(big));
        let keyed = build(&Ty::map(Ty::Integer, Ty::Bool), json!({"18446744073709551615": true}), &lax()).unwrap();
        assert!(conforms(&keyed, &Ty::map(Ty::Integer, Ty::Bool)));
    }

    #[test]
    fn enums_match_raw_values() {
        let bits = Ty::enumeration(EnumDef::new("Bits", [("EIGHT", 8), ("SIXTEEN", 16)]));
        let data = build(&bits, json!(16), &lax()).unwrap();
        assert!(matches!(data, Data::Enum(ref e) if e.member == "SIXTEEN"));
        assert!(matches!(build(&bits, json!(12), &lax()), Err(DecodeError::WrongType { .. })));
        let whole = build(&bits, json!(8.0), &lax()).unwrap();
        assert!(matches!(whole, Data::Enum(ref e) if e.member == "EIGHT"));
        assert_eq!(whole.to_value(), json!(8));
        let keyed = build(&Ty::map(bits.clone(), Ty::Bool), json!({"8": true}), &lax()).unwrap();
        assert!(conforms(&keyed, &Ty::map(bits, Ty::Bool)));
    }

    #[test]
    fn union_falls_back_to_raw_without_type_checks() {
        let ty = Ty::Union(vec![Ty::Integer, Ty::Bool]);
        let config = DecodeConfig::default().check_types(false);
        assert_eq!(build(&ty, json!("x"), &config).ok(), Some(Data::str("x")));
        assert!(matches!(
            build(&ty, json!("x"), &lax()),
            Err(DecodeError::UnionMatch { ref candidates, .. }) if candidates == &["int", "bool"]
        ));
    }

    #[test]
    fn union_alternatives_cast_independently() {
        let ty = Ty::Union(vec![Ty::Bool, Ty::Integer]);
        let config = DecodeConfig::default().cast(TypeKind::Integer);
        assert_eq!(build(&ty, json!("12"), &config).ok(), Some(Data::Int(12)));
    }

    #[test]
    fn strict_unions_accept_a_single_match() {
        let ty = Ty::Union(vec![Ty::String, Ty::Integer]);
        let config = DecodeConfig::default().strict_unions_match(true);
        assert_eq!(build(&ty, json!(4), &config).ok(), Some(Data::Int(4)));
        assert!(matches!(build(&ty, json!(true), &config), Err(DecodeError::UnionMatch { .. })));
    }

    #[test]
    fn numeric_tower_and_dynamic() {
        assert!(conforms(&Data::Int(1), &Ty::Float));
        assert!(!conforms(&Data::float(1.0), &Ty::Integer));
        assert!(conforms(&Data::lift(&json!({"a": [1]})), &Ty::Dynamic));
        assert!(conforms(&Data::Absent, &Ty::Union(vec![Ty::Integer, Ty::Absent])));
    }

    #[test]
    fn non_object_roots_are_wrong_type() {
        let schema = RecordSchema::new("Empty", vec![]).unwrap();
        assert!(matches!(
            decode_value(&schema, &json!([1]), &lax()),
            Err(DecodeError::WrongType { ref path, ref expected, .. }) if path.is_root() && expected == "Empty"
        ));
    }
}
