//! Record schemas and the declaration registry that builds them.
//!
//! A [`RecordSchema`] is immutable once built and shared through `Arc`, so any
//! number of threads may decode against it. Schemas come from two places:
//!
//! - direct construction (`RecordSchema::new` with [`Ty`] values), or
//! - a [`SchemaSet`] of named enum and record declarations whose field types
//!   are written as type expressions (`Optional[list[Channel]]`). Resolution
//!   rejects unknown names and reference cycles before any decoding happens.
pub mod document;
pub mod parse;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SchemaError;
use crate::ty::{EnumDef, Ty};
use crate::value::Data;

pub use document::SchemaDocument;
pub use parse::TyExpr;

// ————————————————————————————————————————————————————————————————————————————
// RECORD SCHEMA
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug)]
pub struct RecordSchema {
    name: String,
    fields: Vec<Field>,
}

#[derive(Debug, Clone)]
pub struct Field {
    pub name: String,
    pub ty: Ty,
    pub default: Option<DefaultValue>,
    /// `false` for fields assigned after primary construction.
    pub init: bool,
}

#[derive(Clone)]
pub enum DefaultValue {
    Value(Data),
    Factory(Arc<dyn Fn() -> Data + Send + Sync>),
}

impl RecordSchema {
    pub fn new(name: impl Into<String>, fields: Vec<Field>) -> Result<Self, SchemaError> {
        let name = name.into();
        for (i, field) in fields.iter().enumerate() {
            if fields[..i].iter().any(|f| f.name == field.name) {
                return Err(SchemaError::DuplicateField {
                    record: name,
                    field: field.name.clone(),
                });
            }
        }
        Ok(Self { name, fields })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }
}

impl Field {
    pub fn new(name: impl Into<String>, ty: Ty) -> Self {
        Self { name: name.into(), ty, default: None, init: true }
    }

    pub fn with_default(mut self, value: Data) -> Self {
        self.default = Some(DefaultValue::Value(value));
        self
    }

    pub fn with_default_factory(mut self, factory: impl Fn() -> Data + Send + Sync + 'static) -> Self {
        self.default = Some(DefaultValue::Factory(Arc::new(factory)));
        self
    }

    pub fn post_init(mut self) -> Self {
        self.init = false;
        self
    }

    /// Explicit default, else factory output, else `Absent` for optional types.
    pub fn resolve_default(&self) -> Option<Data> {
        match &self.default {
            Some(DefaultValue::Value(v)) => Some(v.clone()),
            Some(DefaultValue::Factory(f)) => Some(f()),
            None if self.ty.is_optional() => Some(Data::Absent),
            None => None,
        }
    }
}

impl fmt::Debug for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultValue::Value(v) => f.debug_tuple("Value").field(v).finish(),
            DefaultValue::Factory(_) => f.write_str("Factory(..)"),
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// DECLARATIONS
// ————————————————————————————————————————————————————————————————————————————

/// Named enum and record declarations; resolves records into schemas.
#[derive(Debug, Clone, Default)]
pub struct SchemaSet {
    enums: IndexMap<String, Arc<EnumDef>>,
    records: IndexMap<String, RecordDecl>,
}

#[derive(Debug, Clone)]
pub struct RecordDecl {
    pub name: String,
    pub fields: Vec<FieldDecl>,
}

#[derive(Debug, Clone)]
pub struct FieldDecl {
    pub name: String,
    /// Type expression text.
    pub ty: String,
    pub default: Option<Value>,
    pub default_factory: Option<Factory>,
    pub init: bool,
}

/// Empty-collection default factories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Factory {
    List,
    Set,
    Dict,
    Tuple,
}

impl Factory {
    pub fn make(self) -> Data {
        match self {
            Factory::List => Data::Seq(Vec::new()),
            Factory::Set => Data::Set(Vec::new()),
            Factory::Dict => Data::Map(Vec::new()),
            Factory::Tuple => Data::Tuple(Vec::new()),
        }
    }
}

impl RecordDecl {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), fields: Vec::new() }
    }

    pub fn field(self, name: impl Into<String>, ty: impl Into<String>) -> Self {
        self.with(FieldDecl::new(name, ty))
    }

    pub fn with(mut self, field: FieldDecl) -> Self {
        self.fields.push(field);
        self
    }
}

impl FieldDecl {
    pub fn new(name: impl Into<String>, ty: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: ty.into(),
            default: None,
            default_factory: None,
            init: true,
        }
    }

    pub fn default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn default_factory(mut self, factory: Factory) -> Self {
        self.default_factory = Some(factory);
        self
    }

    pub fn post_init(mut self) -> Self {
        self.init = false;
        self
    }
}

impl SchemaSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_enum(&mut self, def: EnumDef) -> Result<&mut Self, SchemaError> {
        self.check_unique(&def.name)?;
        validate_enum(&def)?;
        self.enums.insert(def.name.clone(), Arc::new(def));
        Ok(self)
    }

    pub fn add_record(&mut self, decl: RecordDecl) -> Result<&mut Self, SchemaError> {
        self.check_unique(&decl.name)?;
        self.records.insert(decl.name.clone(), decl);
        Ok(self)
    }

    pub fn record_names(&self) -> impl Iterator<Item = &str> {
        self.records.keys().map(String::as_str)
    }

    pub fn enum_names(&self) -> impl Iterator<Item = &str> {
        self.enums.keys().map(String::as_str)
    }

    pub fn resolve(&self, record: &str) -> Result<Arc<RecordSchema>, SchemaError> {
        Resolver::new(self).record(record)
    }

    /// Resolve every declared record; shared nested records are built once.
    pub fn resolve_all(&self) -> Result<IndexMap<String, Arc<RecordSchema>>, SchemaError> {
        let mut resolver = Resolver::new(self);
        self.records
            .keys()
            .map(|name| Ok((name.clone(), resolver.record(name)?)))
            .collect()
    }

    /// Resolve a standalone type expression against this set's declarations.
    pub fn resolve_type(&self, expr: &str) -> Result<Ty, SchemaError> {
        let parsed = parse::parse(expr)?;
        Resolver::new(self).ty(expr, &parsed)
    }

    fn check_unique(&self, name: &str) -> Result<(), SchemaError> {
        if self.enums.contains_key(name) || self.records.contains_key(name) || builtin(name).is_some() {
            return Err(SchemaError::DuplicateDeclaration { name: name.to_string() });
        }
        Ok(())
    }
}

fn validate_enum(def: &EnumDef) -> Result<(), SchemaError> {
    let invalid = |message: String| SchemaError::InvalidEnum { name: def.name.clone(), message };
    if def.members.is_empty() {
        return Err(invalid("no members".into()));
    }
    for (i, member) in def.members.iter().enumerate() {
        if !matches!(member.raw, Value::String(_) | Value::Number(_)) {
            return Err(invalid(format!("member {} has raw value {}; expected a string or number", member.name, member.raw)));
        }
        let earlier = &def.members[..i];
        if earlier.iter().any(|m| m.name == member.name) {
            return Err(invalid(format!("member {} declared twice", member.name)));
        }
        if earlier.iter().any(|m| m.matches(&member.raw)) {
            return Err(invalid(format!("raw value {} used by more than one member", member.raw)));
        }
    }
    Ok(())
}

fn builtin(name: &str) -> Option<Ty> {
    Some(match name {
        "bool" => Ty::Bool,
        "int" => Ty::Integer,
        "float" => Ty::Float,
        "str" => Ty::String,
        "bytes" => Ty::Bytes,
        "None" | "NoneType" => Ty::Absent,
        "Any" | "object" => Ty::Dynamic,
        "list" | "List" | "Sequence" => Ty::list(Ty::Dynamic),
        "set" | "Set" | "frozenset" | "FrozenSet" => Ty::set(Ty::Dynamic),
        "dict" | "Dict" | "Mapping" => Ty::map(Ty::Dynamic, Ty::Dynamic),
        "tuple" | "Tuple" => Ty::TupleRepeat(Box::new(Ty::Dynamic)),
        _ => return None,
    })
}

// ————————————————————————————————————————————————————————————————————————————
// RESOLUTION
// ————————————————————————————————————————————————————————————————————————————

struct Resolver<'a> {
    set: &'a SchemaSet,
    done: HashMap<String, Arc<RecordSchema>>,
    /// Records currently being resolved, outermost first.
    stack: Vec<String>,
}

impl<'a> Resolver<'a> {
    fn new(set: &'a SchemaSet) -> Self {
        Self { set, done: HashMap::new(), stack: Vec::new() }
    }

    fn record(&mut self, name: &str) -> Result<Arc<RecordSchema>, SchemaError> {
        if let Some(schema) = self.done.get(name) {
            return Ok(schema.clone());
        }
        if let Some(pos) = self.stack.iter().position(|n| n == name) {
            let mut chain = self.stack[pos..].to_vec();
            chain.push(name.to_string());
            return Err(SchemaError::Cycle { chain });
        }
        let decl = self.set.records.get(name).ok_or_else(|| SchemaError::ForwardReference {
            symbol: name.to_string(),
        })?;

        self.stack.push(name.to_string());
        let fields = decl
            .fields
            .iter()
            .map(|f| self.field(&decl.name, f))
            .collect::<Result<Vec<_>, _>>();
        self.stack.pop();

        let schema = Arc::new(RecordSchema::new(name, fields?)?);
        tracing::debug!(record = name, fields = schema.fields().len(), "resolved record schema");
        self.done.insert(name.to_string(), schema.clone());
        Ok(schema)
    }

    fn field(&mut self, record: &str, decl: &FieldDecl) -> Result<Field, SchemaError> {
        let parsed = parse::parse(&decl.ty)?;
        let ty = self.ty(&decl.ty, &parsed)?;
        let invalid_default = |message: String| SchemaError::InvalidDefault {
            record: record.to_string(),
            field: decl.name.clone(),
            message,
        };
        let mut field = Field::new(decl.name.clone(), ty);
        field.init = decl.init;
        match (&decl.default, decl.default_factory) {
            (Some(_), Some(_)) => {
                return Err(invalid_default("both default and default_factory given".into()));
            }
            (Some(value), None) => {
                let data = crate::decode::build_checked(&field.ty, value.clone())
                    .map_err(|e| invalid_default(e.to_string()))?;
                field.default = Some(DefaultValue::Value(data));
            }
            (None, Some(factory)) => {
                if !crate::decode::conforms(&factory.make(), &field.ty) {
                    return Err(invalid_default(format!(
                        "factory `{}` does not produce a {}",
                        format!("{factory:?}").to_lowercase(),
                        field.ty
                    )));
                }
                field.default = Some(DefaultValue::Factory(Arc::new(move || factory.make())));
            }
            (None, None) => {}
        }
        Ok(field)
    }

    fn ty(&mut self, src: &str, expr: &TyExpr) -> Result<Ty, SchemaError> {
        let invalid = |message: String| SchemaError::InvalidType { expr: src.to_string(), message };
        match expr {
            TyExpr::Name(name) => {
                if let Some(ty) = builtin(name) {
                    return Ok(ty);
                }
                if let Some(def) = self.set.enums.get(name) {
                    return Ok(Ty::Enum(def.clone()));
                }
                self.record(name).map(Ty::Record)
            }
            TyExpr::Union(alts) => {
                let alts = alts.iter().map(|a| self.ty(src, a)).collect::<Result<Vec<_>, _>>()?;
                Ok(Ty::union(alts))
            }
            TyExpr::Apply(head, args) => {
                let mut arg = |i: usize| self.ty(src, &args[i]);
                let arity = |n: usize| {
                    if args.len() == n {
                        Ok(())
                    } else {
                        Err(invalid(format!("{head} takes {n} argument(s), got {}", args.len())))
                    }
                };
                match head.as_str() {
                    "Optional" => {
                        arity(1)?;
                        Ok(Ty::optional(arg(0)?))
                    }
                    "list" | "List" | "Sequence" => {
                        arity(1)?;
                        Ok(Ty::list(arg(0)?))
                    }
                    "set" | "Set" | "frozenset" | "FrozenSet" => {
                        arity(1)?;
                        Ok(Ty::set(arg(0)?))
                    }
                    "dict" | "Dict" | "Mapping" => {
                        arity(2)?;
                        Ok(Ty::map(arg(0)?, arg(1)?))
                    }
                    "Union" => {
                        if args.is_empty() {
                            return Err(invalid("Union needs at least one alternative".into()));
                        }
                        let alts = (0..args.len()).map(arg).collect::<Result<Vec<_>, _>>()?;
                        Ok(Ty::union(alts))
                    }
                    "tuple" | "Tuple" => self.tuple(src, args),
                    other => Err(invalid(format!("{other} does not take type arguments"))),
                }
            }
            TyExpr::Ellipsis => Err(invalid("`...` is only allowed as the last tuple argument".into())),
            TyExpr::Unit => Err(invalid("`()` is only allowed as `tuple[()]`".into())),
        }
    }

    fn tuple(&mut self, src: &str, args: &[TyExpr]) -> Result<Ty, SchemaError> {
        match args {
            [TyExpr::Unit] => Ok(Ty::Tuple(Vec::new())),
            [item, TyExpr::Ellipsis] => Ok(Ty::TupleRepeat(Box::new(self.ty(src, item)?))),
            items => items
                .iter()
                .map(|item| self.ty(src, item))
                .collect::<Result<Vec<_>, _>>()
                .map(Ty::Tuple),
        }
    }
}
