//! Decode-time and schema-time failures.
//!
//! Field-scoped decode errors carry a [`FieldPath`] that grows as the error
//! travels up through containing records: `count` becomes `inner.count`.
//! Document-level errors (unexpected keys under strict mode) carry no path.
use std::fmt;

use serde_json::Value;
use thiserror::Error;

// ————————————————————————————————————————————————————————————————————————————
// FIELD PATH
// ————————————————————————————————————————————————————————————————————————————

/// Dot-separated chain of field names from the schema root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldPath(Vec<String>);

impl FieldPath {
    pub fn root() -> Self {
        Self::default()
    }
    pub fn field(name: impl Into<String>) -> Self {
        Self(vec![name.into()])
    }
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }
    pub fn segments(&self) -> &[String] {
        &self.0
    }
    pub fn prepend(&mut self, parent: &str) {
        self.0.insert(0, parent.to_string());
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("."))
    }
}

impl From<&str> for FieldPath {
    fn from(dotted: &str) -> Self {
        if dotted.is_empty() {
            return Self::root();
        }
        Self(dotted.split('.').map(str::to_string).collect())
    }
}

// ————————————————————————————————————————————————————————————————————————————
// DECODE ERRORS
// ————————————————————————————————————————————————————————————————————————————

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    /// Value present but structurally incompatible with its declared type.
    #[error("wrong value type for field \"{path}\" - should be \"{expected}\" instead of value {}", short(.value))]
    WrongType {
        path: FieldPath,
        expected: String,
        value: Value,
    },

    /// Required field absent, without default, and not optional.
    #[error("missing value for field \"{path}\"")]
    MissingValue { path: FieldPath },

    /// No union alternative accepted the value.
    #[error("can not match {} to any type of \"{path}\" union: {field_type}", short(.value))]
    UnionMatch {
        path: FieldPath,
        field_type: String,
        candidates: Vec<String>,
        value: Value,
    },

    /// More than one union alternative accepted the value under strict-union mode.
    #[error("can not choose between possible union matches for field \"{path}\": {}", .matching.join(", "))]
    StrictUnionMatch {
        path: FieldPath,
        matching: Vec<String>,
    },

    /// Strict mode found input keys with no schema field. Not field-scoped.
    #[error("can not match {} to any record field", quoted(.keys))]
    UnexpectedData { keys: Vec<String> },

    /// A registered type hook rejected the raw value.
    #[error("hook for \"{ty}\" failed on field \"{path}\": {message}")]
    HookFailed {
        path: FieldPath,
        ty: String,
        message: String,
    },
}

impl DecodeError {
    pub fn wrong_type(expected: impl ToString, value: Value) -> Self {
        Self::WrongType {
            path: FieldPath::root(),
            expected: expected.to_string(),
            value,
        }
    }

    /// Re-scope a field-level error under its containing field.
    pub fn within(mut self, parent: &str) -> Self {
        if let Some(path) = self.path_mut() {
            path.prepend(parent);
        }
        self
    }

    pub fn path(&self) -> Option<&FieldPath> {
        match self {
            Self::WrongType { path, .. }
            | Self::MissingValue { path }
            | Self::UnionMatch { path, .. }
            | Self::StrictUnionMatch { path, .. }
            | Self::HookFailed { path, .. } => Some(path),
            Self::UnexpectedData { .. } => None,
        }
    }

    fn path_mut(&mut self) -> Option<&mut FieldPath> {
        match self {
            Self::WrongType { path, .. }
            | Self::MissingValue { path }
            | Self::UnionMatch { path, .. }
            | Self::StrictUnionMatch { path, .. }
            | Self::HookFailed { path, .. } => Some(path),
            Self::UnexpectedData { .. } => None,
        }
    }
}

fn short(value: &Value) -> String {
    const MAX: usize = 80;
    let text = value.to_string();
    if text.chars().count() <= MAX {
        return text;
    }
    let mut out: String = text.chars().take(MAX).collect();
    out.push('…');
    out
}

fn quoted(keys: &[String]) -> String {
    keys.iter()
        .map(|k| format!("\"{k}\""))
        .collect::<Vec<_>>()
        .join(", ")
}

// ————————————————————————————————————————————————————————————————————————————
// SCHEMA ERRORS
// ————————————————————————————————————————————————————————————————————————————

/// Failures while building record schemas. Fatal to using the schema at all.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    #[error("can not resolve forward reference: {symbol}")]
    ForwardReference { symbol: String },

    #[error("record schemas form a cycle: {}", .chain.join(" -> "))]
    Cycle { chain: Vec<String> },

    #[error("record \"{record}\" declares field \"{field}\" more than once")]
    DuplicateField { record: String, field: String },

    #[error("\"{name}\" is declared more than once")]
    DuplicateDeclaration { name: String },

    #[error("invalid type expression `{expr}` at offset {offset}: {message}")]
    Syntax {
        expr: String,
        offset: usize,
        message: String,
    },

    #[error("invalid type `{expr}`: {message}")]
    InvalidType { expr: String, message: String },

    #[error("invalid default for \"{record}.{field}\": {message}")]
    InvalidDefault {
        record: String,
        field: String,
        message: String,
    },

    #[error("enum \"{name}\": {message}")]
    InvalidEnum { name: String, message: String },

    #[error("failed to load schema document {path}: {message}")]
    Load { path: String, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn within_prepends_parent_fields() {
        let err = DecodeError::MissingValue { path: FieldPath::field("count") }
            .within("inner")
            .within("outer");
        assert_eq!(err.path().map(ToString::to_string).as_deref(), Some("outer.inner.count"));
    }

    #[test]
    fn document_level_errors_ignore_scoping() {
        let err = DecodeError::UnexpectedData { keys: vec!["bogus".into()] }.within("inner");
        assert_eq!(err, DecodeError::UnexpectedData { keys: vec!["bogus".into()] });
        assert_eq!(err.to_string(), "can not match \"bogus\" to any record field");
    }

    #[test]
    fn wrong_type_message_names_path_and_value() {
        let err = DecodeError::wrong_type("int", json!("x")).within("count");
        assert_eq!(
            err.to_string(),
            "wrong value type for field \"count\" - should be \"int\" instead of value \"x\""
        );
    }

    #[test]
    fn dotted_paths_parse() {
        assert_eq!(FieldPath::from("a.b").segments(), ["a", "b"]);
        assert!(FieldPath::from("").is_root());
    }
}
