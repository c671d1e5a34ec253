//! Raw-value coercion ahead of structural building.
//!
//! For a target type, the first applicable rule wins:
//!
//! 1. a registered hook for the type's canonical name, else
//! 2. a cast, when the target's kind is listed in `config.cast` and the raw
//!    value is not already an instance of it.
//!
//! Cast failures are `None`, never errors: the raw value passes through and
//! type checking reports the mismatch later. Optional targets recurse into
//! their inner type; collections recurse into their items when the raw value
//! already has the collection's outer shape.
use serde_json::{Map, Number, Value};
use tracing::trace;

use crate::config::DecodeConfig;
use crate::error::{DecodeError, FieldPath};
use crate::ty::Ty;

pub fn transform(ty: &Ty, value: Value, config: &DecodeConfig) -> Result<Value, DecodeError> {
    let mut value = value;
    if let Some(hook) = config.hooks.get(ty) {
        trace!(ty = %ty, "applying type hook");
        value = hook(&value).map_err(|message| DecodeError::HookFailed {
            path: FieldPath::root(),
            ty: ty.name(),
            message,
        })?;
    } else if config.cast.contains(&ty.kind()) && !is_instance(ty, &value) {
        match cast(ty, &value) {
            Some(cast) => {
                trace!(ty = %ty, from = %value, to = %cast, "cast raw value");
                value = cast;
            }
            None => trace!(ty = %ty, value = %value, "cast not possible; keeping raw value"),
        }
    }

    match (ty, value) {
        (Ty::Optional(_), Value::Null) => Ok(Value::Null),
        (Ty::Optional(inner), value) => transform(inner, value, config),
        (Ty::Sequence(item) | Ty::Set(item) | Ty::TupleRepeat(item), Value::Array(xs)) => xs
            .into_iter()
            .map(|x| transform(item, x, config))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        (Ty::Tuple(items), Value::Array(xs)) => xs
            .into_iter()
            .enumerate()
            .map(|(i, x)| match items.get(i) {
                Some(slot) => transform(slot, x, config),
                None => Ok(x),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        (Ty::Mapping(key_ty, value_ty), Value::Object(map)) => {
            let mut out = Map::with_capacity(map.len());
            let mut collided = false;
            for (k, v) in &map {
                let k = key_text(transform(key_ty, Value::String(k.clone()), config)?);
                if out.insert(k, transform(value_ty, v.clone(), config)?).is_some() {
                    collided = true;
                    break;
                }
            }
            // two input keys coerced to the same key
            if collided {
                return Err(DecodeError::wrong_type(ty, Value::Object(map)));
            }
            Ok(Value::Object(out))
        }
        (_, value) => Ok(value),
    }
}

/// Whether `value` already has the shape `ty` asks for.
pub fn is_instance(ty: &Ty, value: &Value) -> bool {
    match ty {
        Ty::Bool => value.is_boolean(),
        Ty::Integer => value.is_i64() || value.is_u64(),
        Ty::Float => value.is_number(),
        Ty::String => value.is_string(),
        Ty::Bytes => as_bytes(value).is_some(),
        Ty::Absent => value.is_null(),
        Ty::Enum(def) => def.by_raw(value).is_some(),
        Ty::Sequence(_) | Ty::Set(_) | Ty::Tuple(_) | Ty::TupleRepeat(_) => value.is_array(),
        Ty::Mapping(..) | Ty::Record(_) => value.is_object(),
        Ty::Optional(_) | Ty::Union(_) | Ty::Dynamic => true,
    }
}

/// Construct the target from a differently-shaped value, if there is a rule for it.
pub fn cast(ty: &Ty, value: &Value) -> Option<Value> {
    match (ty, value) {
        (Ty::Integer, Value::String(s)) => parse_int(s.trim()),
        (Ty::Integer, Value::Number(n)) => {
            let f = n.as_f64()?;
            (f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64).then(|| Value::from(f as i64))
        }
        (Ty::Integer, Value::Bool(b)) => Some(Value::from(i64::from(*b))),
        (Ty::Float, Value::String(s)) => {
            let f = s.trim().parse::<f64>().ok()?;
            Number::from_f64(f).map(Value::Number)
        }
        (Ty::Float, Value::Bool(b)) => Number::from_f64(if *b { 1.0 } else { 0.0 }).map(Value::Number),
        (Ty::String, Value::Number(n)) => Some(Value::String(n.to_string())),
        (Ty::String, Value::Bool(b)) => Some(Value::String(b.to_string())),
        (Ty::Bool, Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => Some(Value::Bool(true)),
            "false" => Some(Value::Bool(false)),
            _ => None,
        },
        (Ty::Bool, Value::Number(n)) => match n.as_i64()? {
            0 => Some(Value::Bool(false)),
            1 => Some(Value::Bool(true)),
            _ => None,
        },
        (Ty::Bytes, Value::String(s)) => Some(Value::Array(s.bytes().map(Value::from).collect())),
        (Ty::Enum(def), Value::String(s)) => def
            .by_name(s)
            .or_else(|| def.members.iter().find(|m| key_text(m.raw.clone()) == *s))
            .map(|m| m.raw.clone()),
        (Ty::Enum(def), Value::Number(n)) => {
            let text = n.to_string();
            def.members.iter().find(|m| m.raw.as_str() == Some(text.as_str())).map(|m| m.raw.clone())
        }
        (Ty::Sequence(_) | Ty::Set(_) | Ty::Tuple(_) | Ty::TupleRepeat(_), scalar)
            if !matches!(scalar, Value::Null | Value::Array(_) | Value::Object(_)) =>
        {
            Some(Value::Array(vec![scalar.clone()]))
        }
        (Ty::Mapping(..), Value::Array(pairs)) => pairs
            .iter()
            .map(|pair| match pair.as_array()?.as_slice() {
                [k @ (Value::String(_) | Value::Number(_) | Value::Bool(_)), v] => {
                    Some((key_text(k.clone()), v.clone()))
                }
                _ => None,
            })
            .collect::<Option<Map<_, _>>>()
            .map(Value::Object),
        _ => None,
    }
}

pub fn as_bytes(value: &Value) -> Option<Vec<u8>> {
    value
        .as_array()?
        .iter()
        .map(|b| b.as_u64().and_then(|b| u8::try_from(b).ok()))
        .collect()
}

/// Integer text in the `i64` or `u64` range.
pub fn parse_int(text: &str) -> Option<Value> {
    match text.parse::<i64>() {
        Ok(i) => Some(Value::from(i)),
        Err(_) => text.parse::<u64>().ok().map(Value::from),
    }
}

/// Object keys are text; non-string keys use their JSON form.
pub fn key_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ty::{EnumDef, TypeKind};
    use serde_json::json;

    fn color() -> Ty {
        Ty::enumeration(EnumDef::new("Color", [("RED", "Red"), ("GREEN", "Green")]))
    }

    #[test]
    fn scalar_casts() {
        assert_eq!(cast(&Ty::Integer, &json!(" 5 ")), Some(json!(5)));
        assert_eq!(cast(&Ty::Integer, &json!(4.0)), Some(json!(4)));
        assert_eq!(cast(&Ty::Integer, &json!(4.5)), None);
        assert_eq!(cast(&Ty::Integer, &json!("five")), None);
        assert_eq!(cast(&Ty::Float, &json!("2.5")), Some(json!(2.5)));
        assert_eq!(cast(&Ty::String, &json!(12)), Some(json!("12")));
        assert_eq!(cast(&Ty::Bool, &json!("TRUE")), Some(json!(true)));
        assert_eq!(cast(&Ty::Bool, &json!(2)), None);
        assert_eq!(cast(&Ty::Bytes, &json!("hi")), Some(json!([104, 105])));
    }

    #[test]
    fn enum_casts_accept_member_names() {
        assert_eq!(cast(&color(), &json!("GREEN")), Some(json!("Green")));
        assert_eq!(cast(&color(), &json!("BLUE")), None);
        let bits = Ty::enumeration(EnumDef::new("Resolution", [("EIGHT", "8"), ("SIXTEEN", "16")]));
        assert_eq!(cast(&bits, &json!(16)), Some(json!("16")));
    }

    #[test]
    fn collection_casts() {
        assert_eq!(cast(&Ty::list(Ty::Integer), &json!(3)), Some(json!([3])));
        assert_eq!(cast(&Ty::list(Ty::Integer), &json!(null)), None);
        assert_eq!(
            cast(&Ty::map(Ty::Integer, Ty::String), &json!([[1, "a"], ["b", "c"]])),
            Some(json!({"1": "a", "b": "c"}))
        );
        assert_eq!(cast(&Ty::map(Ty::String, Ty::String), &json!([[1, 2, 3]])), None);
    }

    #[test]
    fn transform_casts_only_listed_kinds() {
        let config = DecodeConfig::new().cast(TypeKind::Integer);
        assert_eq!(transform(&Ty::Integer, json!("7"), &config).ok(), Some(json!(7)));
        assert_eq!(transform(&Ty::Float, json!("7"), &config).ok(), Some(json!("7")));
        assert_eq!(transform(&Ty::Integer, json!("x"), &config).ok(), Some(json!("x")));
    }

    #[test]
    fn transform_recurses_through_optionals_and_collections() {
        let config = DecodeConfig::new().cast(TypeKind::Integer);
        let ty = Ty::optional(Ty::map(Ty::String, Ty::list(Ty::Integer)));
        assert_eq!(
            transform(&ty, json!({"a": ["1", 2], "b": []}), &config).ok(),
            Some(json!({"a": [1, 2], "b": []}))
        );
        assert_eq!(transform(&ty, json!(null), &config).ok(), Some(json!(null)));
        let tuple = Ty::Tuple(vec![Ty::Integer, Ty::String]);
        assert_eq!(transform(&tuple, json!(["1", "2", "3"]), &config).ok(), Some(json!([1, "2", "3"])));
    }

    #[test]
    fn keys_that_coerce_to_the_same_key_are_rejected() {
        let config = DecodeConfig::new().cast(TypeKind::Float);
        let ty = Ty::map(Ty::Float, Ty::Integer);
        assert!(matches!(
            transform(&ty, json!({"1": 1, "1.0": 2}), &config),
            Err(DecodeError::WrongType { ref expected, ref value, .. })
                if expected == "dict[float, int]" && value == &json!({"1": 1, "1.0": 2})
        ));
        assert_eq!(transform(&ty, json!({"1": 1, "2.5": 2}), &config).ok(), Some(json!({"1.0": 1, "2.5": 2})));
    }

    #[test]
    fn hooks_run_instead_of_casts() {
        let config = DecodeConfig::new()
            .cast(TypeKind::Integer)
            .hook(&Ty::Integer, |v| match v.as_str() {
                Some(s) => Ok(json!(s.len())),
                None => Err("expected text".to_string()),
            });
        assert_eq!(transform(&Ty::Integer, json!("abc"), &config).ok(), Some(json!(3)));
        assert!(matches!(
            transform(&Ty::Integer, json!(1), &config),
            Err(DecodeError::HookFailed { ref ty, .. }) if ty == "int"
        ));
    }

    #[test]
    fn instances_are_not_recast() {
        let config = DecodeConfig::new().cast(TypeKind::Sequence);
        assert_eq!(transform(&Ty::list(Ty::Integer), json!([1]), &config).ok(), Some(json!([1])));
        assert_eq!(transform(&Ty::list(Ty::Integer), json!(1), &config).ok(), Some(json!([1])));
    }
}
