//! Schema-driven reconstruction of typed records from untyped JSON value trees.
//!
//! A [`RecordSchema`] describes the fields of a record and the [`Ty`] each one
//! should have; [`decode`] walks an input mapping against it, coercing and
//! type-checking as it goes, and yields either a [`Record`] or exactly one
//! [`DecodeError`] naming the dotted path of the offending field.
pub mod coerce;
pub mod config;
pub mod decode;
pub mod error;
pub mod path_de;
pub mod schema;
pub mod ty;
pub mod value;

pub use config::{DecodeConfig, DecodeOptions, Hooks};
pub use decode::{conforms, decode, decode_as, decode_value, Decoder};
pub use error::{DecodeError, FieldPath, SchemaError};
pub use schema::{DefaultValue, Factory, Field, FieldDecl, RecordDecl, RecordSchema, SchemaDocument, SchemaSet};
pub use ty::{EnumDef, EnumMember, Ty, TypeKind};
pub use value::{Data, EnumValue, FromData, FromRecord, Record};
