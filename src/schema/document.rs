//! JSON schema-description documents.
//!
//! ```json
//! {
//!   "enums":   { "Precedence": { "LTP": "LTP", "HTP": "HTP" } },
//!   "records": {
//!     "Channel": {
//!       "fields": {
//!         "name": "Optional[str]",
//!         "precedence": { "type": "Optional[Precedence]" },
//!         "aliases": { "type": "list[str]", "default_factory": "list" },
//!         "cached": { "type": "int", "default": 0, "init": false }
//!       }
//!     }
//!   }
//! }
//! ```
//!
//! Object order is kept, so field order in the document is field order in the
//! schema.
use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use super::{Factory, FieldDecl, RecordDecl, SchemaSet};
use crate::error::SchemaError;
use crate::ty::EnumDef;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchemaDocument {
    /// enum name → (member name → raw value)
    #[serde(default)]
    pub enums: IndexMap<String, IndexMap<String, Value>>,
    #[serde(default)]
    pub records: IndexMap<String, RecordDoc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecordDoc {
    #[serde(default)]
    pub fields: IndexMap<String, FieldDoc>,
}

/// Either a bare type expression or the full field form.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum FieldDoc {
    Type(String),
    Full(FullFieldDoc),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FullFieldDoc {
    #[serde(rename = "type")]
    pub ty: String,
    /// `Some(Null)` is an explicit `null` default; `None` means no default.
    #[serde(default, deserialize_with = "present")]
    pub default: Option<Value>,
    #[serde(default)]
    pub default_factory: Option<Factory>,
    #[serde(default = "yes")]
    pub init: bool,
}

fn present<'de, D: Deserializer<'de>>(de: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(de).map(Some)
}

fn yes() -> bool {
    true
}

impl SchemaDocument {
    pub fn from_json(src: &str) -> Result<Self, SchemaError> {
        crate::path_de::from_str_with_path(src).map_err(|message| SchemaError::Load {
            path: "<inline>".into(),
            message,
        })
    }

    pub fn load(path: &Path) -> Result<Self, SchemaError> {
        crate::path_de::read_json_file(path).map_err(|message| SchemaError::Load {
            path: path.display().to_string(),
            message,
        })
    }

    pub fn into_schema_set(self) -> Result<SchemaSet, SchemaError> {
        let mut set = SchemaSet::new();
        for (name, members) in self.enums {
            set.add_enum(EnumDef::new(name, members))?;
        }
        for (name, record) in self.records {
            let decl = record
                .fields
                .into_iter()
                .fold(RecordDecl::new(name), |decl, (field, doc)| decl.with(doc.into_decl(field)));
            set.add_record(decl)?;
        }
        Ok(set)
    }
}

impl FieldDoc {
    fn into_decl(self, name: String) -> FieldDecl {
        match self {
            FieldDoc::Type(ty) => FieldDecl::new(name, ty),
            FieldDoc::Full(full) => FieldDecl {
                name,
                ty: full.ty,
                default: full.default,
                default_factory: full.default_factory,
                init: full.init,
            },
        }
    }
}

impl SchemaSet {
    pub fn load(path: &Path) -> Result<Self, SchemaError> {
        SchemaDocument::load(path)?.into_schema_set()
    }

    pub fn from_json(src: &str) -> Result<Self, SchemaError> {
        SchemaDocument::from_json(src)?.into_schema_set()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Data;

    const DOC: &str = r#"{
        "enums": { "Precedence": { "LTP": "LTP", "HTP": "HTP" } },
        "records": {
            "Channel": {
                "fields": {
                    "name": "Optional[str]",
                    "precedence": { "type": "Optional[Precedence]", "default": null },
                    "aliases": { "type": "list[str]", "default_factory": "list" },
                    "cached": { "type": "int", "default": 0, "init": false }
                }
            }
        }
    }"#;

    #[test]
    fn document_fields_keep_order_and_options() {
        let set = SchemaSet::from_json(DOC).unwrap();
        let channel = set.resolve("Channel").unwrap();
        let names: Vec<_> = channel.fields().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["name", "precedence", "aliases", "cached"]);
        assert_eq!(channel.field("precedence").unwrap().resolve_default(), Some(Data::Absent));
        assert_eq!(channel.field("aliases").unwrap().resolve_default(), Some(Data::Seq(vec![])));
        assert!(!channel.field("cached").unwrap().init);
    }

    #[test]
    fn unknown_document_keys_report_their_path() {
        let err = SchemaSet::from_json(r#"{"records": {"A": {"feilds": {}}}}"#).unwrap_err();
        let SchemaError::Load { message, .. } = err else { panic!("expected load error") };
        assert!(message.contains("records.A"), "{message}");
    }
}
