//! Decode configuration.
//!
//! `DecodeConfig` is built once and shared read-only by every decode call.
//! Hooks are plain `Arc`ed closures so a config can be cloned into worker
//! threads; registering hooks while decodes are running is not supported.
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ty::{Ty, TypeKind};

/// Raw-value transform for one declared type. An `Err` is reported as
/// [`DecodeError::HookFailed`](crate::error::DecodeError::HookFailed) for a
/// field, and disqualifies the alternative inside a union.
pub type Hook = Arc<dyn Fn(&Value) -> Result<Value, String> + Send + Sync>;

#[derive(Clone)]
pub struct DecodeConfig {
    /// Verify every built value against its declared type.
    pub check_types: bool,
    /// Reject input keys that match no field.
    pub strict: bool,
    /// Require exactly one union alternative to match.
    pub strict_unions_match: bool,
    pub hooks: Hooks,
    /// Kinds whose targets may be constructed from a differently-shaped value, tried in order.
    pub cast: Vec<TypeKind>,
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            check_types: true,
            strict: false,
            strict_unions_match: false,
            hooks: Hooks::default(),
            cast: Vec::new(),
        }
    }
}

impl DecodeConfig {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn check_types(mut self, on: bool) -> Self {
        self.check_types = on;
        self
    }
    pub fn strict(mut self, on: bool) -> Self {
        self.strict = on;
        self
    }
    pub fn strict_unions_match(mut self, on: bool) -> Self {
        self.strict_unions_match = on;
        self
    }
    pub fn cast(mut self, kind: TypeKind) -> Self {
        if !self.cast.contains(&kind) {
            self.cast.push(kind);
        }
        self
    }
    pub fn hook(
        mut self,
        ty: &Ty,
        hook: impl Fn(&Value) -> Result<Value, String> + Send + Sync + 'static,
    ) -> Self {
        self.hooks.register(ty, hook);
        self
    }
}

impl fmt::Debug for DecodeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodeConfig")
            .field("check_types", &self.check_types)
            .field("strict", &self.strict)
            .field("strict_unions_match", &self.strict_unions_match)
            .field("hooks", &self.hooks)
            .field("cast", &self.cast)
            .finish()
    }
}

// ————————————————————————————————————————————————————————————————————————————
// HOOKS
// ————————————————————————————————————————————————————————————————————————————

/// Hooks keyed by canonical type name (`int`, `list[int]`, `Color`, ...).
#[derive(Clone, Default)]
pub struct Hooks {
    by_type: IndexMap<String, Hook>,
}

impl Hooks {
    pub fn register(
        &mut self,
        ty: &Ty,
        hook: impl Fn(&Value) -> Result<Value, String> + Send + Sync + 'static,
    ) {
        self.by_type.insert(ty.name(), Arc::new(hook));
    }

    /// Register under a type name, for named enums and records.
    pub fn register_named(
        &mut self,
        name: impl Into<String>,
        hook: impl Fn(&Value) -> Result<Value, String> + Send + Sync + 'static,
    ) {
        self.by_type.insert(name.into(), Arc::new(hook));
    }

    pub fn get(&self, ty: &Ty) -> Option<&Hook> {
        if self.by_type.is_empty() {
            return None;
        }
        self.by_type.get(&ty.name())
    }

    pub fn is_empty(&self) -> bool {
        self.by_type.is_empty()
    }
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.by_type.keys()).finish()
    }
}

// ————————————————————————————————————————————————————————————————————————————
// FILE OPTIONS
// ————————————————————————————————————————————————————————————————————————————

/// The serializable part of a [`DecodeConfig`]; hooks are code-only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DecodeOptions {
    pub check_types: Option<bool>,
    pub strict: Option<bool>,
    pub strict_unions_match: Option<bool>,
    pub cast: Vec<TypeKind>,
}

impl DecodeOptions {
    pub fn load(path: &Path) -> Result<Self, String> {
        crate::path_de::read_json_file(path)
    }

    /// Fields set in `other` win; cast lists are concatenated.
    pub fn merge(mut self, other: DecodeOptions) -> Self {
        self.check_types = other.check_types.or(self.check_types);
        self.strict = other.strict.or(self.strict);
        self.strict_unions_match = other.strict_unions_match.or(self.strict_unions_match);
        self.cast.extend(other.cast);
        self
    }

    pub fn apply(&self, mut config: DecodeConfig) -> DecodeConfig {
        if let Some(on) = self.check_types {
            config.check_types = on;
        }
        if let Some(on) = self.strict {
            config.strict = on;
        }
        if let Some(on) = self.strict_unions_match {
            config.strict_unions_match = on;
        }
        for kind in &self.cast {
            config = config.cast(*kind);
        }
        config
    }

    pub fn into_config(self) -> DecodeConfig {
        self.apply(DecodeConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_check_types_only() {
        let config = DecodeConfig::default();
        assert!(config.check_types);
        assert!(!config.strict);
        assert!(!config.strict_unions_match);
        assert!(config.hooks.is_empty());
        assert!(config.cast.is_empty());
    }

    #[test]
    fn hooks_are_keyed_by_canonical_type() {
        let config = DecodeConfig::new().hook(&Ty::list(Ty::Integer), |v| Ok(json!([v.clone()])));
        assert!(config.hooks.get(&Ty::list(Ty::Integer)).is_some());
        assert!(config.hooks.get(&Ty::Integer).is_none());
    }

    #[test]
    fn options_parse_and_merge() {
        let file: DecodeOptions =
            crate::path_de::from_str_with_path(r#"{"strict": true, "cast": ["int", "enum"]}"#).unwrap();
        let flags = DecodeOptions { strict: Some(false), cast: vec![TypeKind::Float], ..Default::default() };
        let config = file.merge(flags).into_config();
        assert!(!config.strict);
        assert!(config.check_types);
        assert_eq!(config.cast, [TypeKind::Integer, TypeKind::Enum, TypeKind::Float]);
    }

    #[test]
    fn options_reject_unknown_keys() {
        assert!(crate::path_de::from_str_with_path::<DecodeOptions>(r#"{"strictt": true}"#).is_err());
    }
}
