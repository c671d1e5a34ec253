//! Type expressions: the closed, recursive description of a field's shape.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::schema::RecordSchema;

#[derive(Debug, Clone)]
pub enum Ty {
    Bool,
    Integer,
    Float,
    String,
    Bytes,
    /// The explicit "absent" alternative (`None` / JSON null).
    Absent,
    Enum(Arc<EnumDef>),
    /// Same as `Union[inner, None]`.
    Optional(Box<Ty>),
    /// Alternatives in declaration order.
    Union(Vec<Ty>),
    Sequence(Box<Ty>),
    Set(Box<Ty>),
    Mapping(Box<Ty>, Box<Ty>),
    /// Fixed arity, each slot typed.
    Tuple(Vec<Ty>),
    /// `tuple[T, ...]`: homogeneous, any length.
    TupleRepeat(Box<Ty>),
    Record(Arc<RecordSchema>),
    /// Escape hatch: accepts any value tree unchanged.
    Dynamic,
}

/// Payload-free discriminant of [`Ty`]; what `cast` lists are made of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeKind {
    #[serde(rename = "bool")]
    Bool,
    #[serde(rename = "int")]
    Integer,
    #[serde(rename = "float")]
    Float,
    #[serde(rename = "str")]
    String,
    #[serde(rename = "bytes")]
    Bytes,
    #[serde(rename = "none")]
    Absent,
    #[serde(rename = "enum")]
    Enum,
    #[serde(rename = "union")]
    Union,
    #[serde(rename = "list")]
    Sequence,
    #[serde(rename = "set")]
    Set,
    #[serde(rename = "dict")]
    Mapping,
    #[serde(rename = "tuple")]
    Tuple,
    #[serde(rename = "record")]
    Record,
    #[serde(rename = "any")]
    Dynamic,
}

impl TypeKind {
    pub fn parse(name: &str) -> Option<Self> {
        serde_json::from_value(Value::String(name.to_string())).ok()
    }
}

impl fmt::Display for TypeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_value(self) {
            Ok(Value::String(name)) => f.write_str(&name),
            _ => write!(f, "{self:?}"),
        }
    }
}

static ABSENT: Ty = Ty::Absent;

impl Ty {
    pub fn optional(inner: Ty) -> Self {
        Ty::Optional(Box::new(inner))
    }
    pub fn list(item: Ty) -> Self {
        Ty::Sequence(Box::new(item))
    }
    pub fn set(item: Ty) -> Self {
        Ty::Set(Box::new(item))
    }
    pub fn map(key: Ty, value: Ty) -> Self {
        Ty::Mapping(Box::new(key), Box::new(value))
    }
    pub fn record(schema: RecordSchema) -> Self {
        Ty::Record(Arc::new(schema))
    }
    pub fn enumeration(def: EnumDef) -> Self {
        Ty::Enum(Arc::new(def))
    }

    /// `Union[X, None]` in either order collapses to `Optional[X]`.
    pub fn union(mut alternatives: Vec<Ty>) -> Self {
        if alternatives.len() == 2 {
            if let Some(pos) = alternatives.iter().position(|t| matches!(t, Ty::Absent)) {
                alternatives.remove(pos);
                return Ty::optional(alternatives.remove(0));
            }
        }
        if alternatives.len() == 1 {
            return alternatives.remove(0);
        }
        Ty::Union(alternatives)
    }

    pub fn kind(&self) -> TypeKind {
        match self {
            Ty::Bool => TypeKind::Bool,
            Ty::Integer => TypeKind::Integer,
            Ty::Float => TypeKind::Float,
            Ty::String => TypeKind::String,
            Ty::Bytes => TypeKind::Bytes,
            Ty::Absent => TypeKind::Absent,
            Ty::Enum(_) => TypeKind::Enum,
            Ty::Optional(_) | Ty::Union(_) => TypeKind::Union,
            Ty::Sequence(_) => TypeKind::Sequence,
            Ty::Set(_) => TypeKind::Set,
            Ty::Mapping(..) => TypeKind::Mapping,
            Ty::Tuple(_) | Ty::TupleRepeat(_) => TypeKind::Tuple,
            Ty::Record(_) => TypeKind::Record,
            Ty::Dynamic => TypeKind::Dynamic,
        }
    }

    /// True for `Optional[X]` and unions that list `None`. A missing field of
    /// such a type reads as absent; `Any` and bare `None` are still required.
    pub fn is_optional(&self) -> bool {
        match self {
            Ty::Optional(_) => true,
            Ty::Union(alts) => alts.iter().any(|alt| matches!(alt, Ty::Absent | Ty::Optional(_))),
            _ => false,
        }
    }

    /// Alternatives of a union-like type; `Optional` expands to `[inner, None]`.
    pub fn alternatives(&self) -> Vec<&Ty> {
        match self {
            Ty::Optional(inner) => vec![inner.as_ref(), &ABSENT],
            Ty::Union(alts) => alts.iter().collect(),
            other => vec![other],
        }
    }

    /// Canonical name, used for messages and as the hook registry key.
    pub fn name(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn list(f: &mut fmt::Formatter<'_>, items: &[Ty]) -> fmt::Result {
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{item}")?;
            }
            Ok(())
        }
        match self {
            Ty::Bool => f.write_str("bool"),
            Ty::Integer => f.write_str("int"),
            Ty::Float => f.write_str("float"),
            Ty::String => f.write_str("str"),
            Ty::Bytes => f.write_str("bytes"),
            Ty::Absent => f.write_str("None"),
            Ty::Dynamic => f.write_str("Any"),
            Ty::Enum(def) => f.write_str(&def.name),
            Ty::Record(schema) => f.write_str(schema.name()),
            Ty::Optional(inner) => write!(f, "Optional[{inner}]"),
            Ty::Union(alts) => {
                f.write_str("Union[")?;
                list(f, alts)?;
                f.write_str("]")
            }
            Ty::Sequence(item) => write!(f, "list[{item}]"),
            Ty::Set(item) => write!(f, "set[{item}]"),
            Ty::Mapping(k, v) => write!(f, "dict[{k}, {v}]"),
            Ty::Tuple(items) if items.is_empty() => f.write_str("tuple[()]"),
            Ty::Tuple(items) => {
                f.write_str("tuple[")?;
                list(f, items)?;
                f.write_str("]")
            }
            Ty::TupleRepeat(item) => write!(f, "tuple[{item}, ...]"),
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// ENUMERATIONS
// ————————————————————————————————————————————————————————————————————————————

/// A closed set of named constants matched by their raw representation.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumDef {
    pub name: String,
    pub members: Vec<EnumMember>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumMember {
    pub name: String,
    /// String or integer the member is written as in input documents.
    pub raw: Value,
}

impl EnumDef {
    pub fn new<N, R>(name: impl Into<String>, members: impl IntoIterator<Item = (N, R)>) -> Self
    where
        N: Into<String>,
        R: Into<Value>,
    {
        Self {
            name: name.into(),
            members: members
                .into_iter()
                .map(|(name, raw)| EnumMember { name: name.into(), raw: raw.into() })
                .collect(),
        }
    }

    pub fn by_raw(&self, raw: &Value) -> Option<&EnumMember> {
        self.members.iter().find(|m| m.matches(raw))
    }

    pub fn by_name(&self, name: &str) -> Option<&EnumMember> {
        self.members.iter().find(|m| m.name == name)
    }
}

impl EnumMember {
    /// Numbers compare by value, so `8.0` selects a member written as `8`.
    pub fn matches(&self, raw: &Value) -> bool {
        match (&self.raw, raw) {
            (Value::Number(a), Value::Number(b)) => match (a.is_f64(), b.is_f64()) {
                (false, false) => a == b,
                _ => a.as_f64() == b.as_f64(),
            },
            (a, b) => a == b,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_canonical() {
        let ty = Ty::map(Ty::String, Ty::optional(Ty::Union(vec![Ty::Integer, Ty::String])));
        assert_eq!(ty.to_string(), "dict[str, Optional[Union[int, str]]]");
        assert_eq!(Ty::TupleRepeat(Box::new(Ty::Float)).to_string(), "tuple[float, ...]");
        assert_eq!(Ty::Tuple(vec![]).to_string(), "tuple[()]");
    }

    #[test]
    fn union_with_none_collapses_to_optional() {
        let ty = Ty::union(vec![Ty::Absent, Ty::Integer]);
        assert!(matches!(ty, Ty::Optional(ref inner) if matches!(**inner, Ty::Integer)));
        assert!(ty.is_optional());
        assert!(!Ty::union(vec![Ty::Integer, Ty::String]).is_optional());
        assert!(Ty::Union(vec![Ty::Integer, Ty::String, Ty::Absent]).is_optional());
    }

    #[test]
    fn any_and_none_are_not_optional() {
        assert!(!Ty::Dynamic.is_optional());
        assert!(!Ty::Absent.is_optional());
        assert!(!Ty::Union(vec![Ty::Integer, Ty::Dynamic]).is_optional());
    }

    #[test]
    fn type_kinds_use_short_names() {
        assert_eq!(TypeKind::parse("int"), Some(TypeKind::Integer));
        assert_eq!(TypeKind::parse("dict"), Some(TypeKind::Mapping));
        assert_eq!(TypeKind::parse("integer"), None);
        assert_eq!(TypeKind::Sequence.to_string(), "list");
    }

    #[test]
    fn enum_members_match_raw_and_name() {
        let color = EnumDef::new("Color", [("RED", "Red"), ("GREEN", "Green")]);
        assert_eq!(color.by_raw(&Value::from("Red")).map(|m| m.name.as_str()), Some("RED"));
        assert_eq!(color.by_name("GREEN").map(|m| &m.raw), Some(&Value::from("Green")));
        assert!(color.by_raw(&Value::from("Purple")).is_none());
    }

    #[test]
    fn numeric_raws_match_by_value() {
        let bits = EnumDef::new("Bits", [("EIGHT", 8), ("SIXTEEN", 16)]);
        assert_eq!(bits.by_raw(&Value::from(8.0)).map(|m| m.name.as_str()), Some("EIGHT"));
        assert_eq!(bits.by_raw(&Value::from(16)).map(|m| m.name.as_str()), Some("SIXTEEN"));
        assert!(bits.by_raw(&Value::from(8.5)).is_none());
        assert!(bits.by_raw(&Value::from("8")).is_none());
    }
}
