//! Minimal CLI: decode JSON documents against a record schema, or check a schema.
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use rayon::prelude::*;
use serde_json::Value;

use json_reify::{DecodeOptions, Decoder, DefaultValue, RecordSchema, SchemaSet, TypeKind};

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

/// reconstruct typed records from JSON documents using a declared schema
#[derive(Parser, Debug)]
#[command(name = "json-reify", version)]
pub struct CommandLineInterface {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// decode documents into typed records and print them re-encoded
    Decode(DecodeOut),
    /// resolve schema declarations and print the resulting records
    Check(CheckOut),
}

#[derive(Args, Debug, Clone)]
struct SchemaSettings {
    /// schema description document (.json)
    #[arg(long, short)]
    schema: PathBuf,
}

#[derive(Args, Debug, Clone)]
struct InputSettings {
    /// JSON Pointer to select a subnode in each document (e.g. /data/fixture)
    #[arg(long)]
    json_pointer: Option<String>,

    /// One or more inputs. May be literal paths or quoted glob patterns
    #[arg(long, short, num_args = 1.., required = true)]
    input: Vec<String>,
}

#[derive(clap::Parser, Debug)]
struct DecodeOut {
    #[command(flatten)]
    schema_settings: SchemaSettings,

    /// record to decode each document as
    #[arg(long)]
    root: String,

    #[command(flatten)]
    input_settings: InputSettings,

    /// decode options file (.json); flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// reject keys that match no record field
    #[arg(long)]
    strict: bool,

    /// require exactly one union alternative to match
    #[arg(long)]
    strict_unions: bool,

    /// skip type checks of built values
    #[arg(long)]
    no_check_types: bool,

    /// kinds to cast into when the raw value has another shape (int, float, str, bool, bytes, enum, list, set, tuple, dict)
    #[arg(long = "cast", value_parser = parse_kind)]
    cast: Vec<TypeKind>,

    /// output .json file (stdout if omitted)
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// debugging
    #[arg(long)]
    no_op: bool,
}

#[derive(clap::Parser, Debug)]
struct CheckOut {
    #[command(flatten)]
    schema_settings: SchemaSettings,

    /// only resolve this record (and what it references)
    #[arg(long)]
    root: Option<String>,
}

// ————————————————————————————————————————————————————————————————————————————
// IMPLEMENTATION
// ————————————————————————————————————————————————————————————————————————————

impl SchemaSettings {
    fn load(&self) -> Result<SchemaSet> {
        SchemaSet::load(&self.schema).with_context(|| format!("loading schema {}", self.schema.display()))
    }
}

impl InputSettings {
    /// Every input document, labelled with its source path.
    fn load(&self) -> Result<Vec<(String, Value)>> {
        let source_paths = resolve_file_path_patterns(&self.input)
            .map_err(|error| anyhow!("failed to resolve input file paths: {error}"))?;
        let mut out = Vec::with_capacity(source_paths.len());
        for source_path in source_paths {
            let source_path_str = source_path.to_string_lossy().to_string();
            let source = std::fs::read_to_string(&source_path)
                .with_context(|| format!("failed to read source file ({source_path_str})"))?;
            let json_value = serde_json::from_str::<Value>(&source)
                .with_context(|| format!("failed to parse JSON source file ({source_path_str})"))?;
            let json_value = match self.json_pointer.as_deref() {
                None => json_value,
                Some(pointer) => json_value
                    .pointer(pointer)
                    .cloned()
                    .ok_or_else(|| anyhow!("JSON pointer {pointer} selects nothing in {source_path_str}"))?,
            };
            out.push((source_path_str, json_value));
        }
        Ok(out)
    }
}

impl DecodeOut {
    fn options(&self) -> Result<DecodeOptions> {
        let file = match self.config.as_ref() {
            Some(path) => DecodeOptions::load(path)
                .map_err(|error| anyhow!("failed to load decode options {}: {error}", path.display()))?,
            None => DecodeOptions::default(),
        };
        let flags = DecodeOptions {
            check_types: self.no_check_types.then_some(false),
            strict: self.strict.then_some(true),
            strict_unions_match: self.strict_unions.then_some(true),
            cast: self.cast.clone(),
        };
        Ok(file.merge(flags))
    }

    fn run(&self) -> Result<bool> {
        let set = self.schema_settings.load()?;
        let schema = set
            .resolve(&self.root)
            .with_context(|| format!("resolving record {}", self.root))?;
        let options = self.options()?;
        tracing::debug!(?options, root = %self.root, "decode options");
        let decoder = Decoder::new(schema, options.into_config());
        let documents = self.input_settings.load()?;

        let results: Vec<_> = documents
            .par_iter()
            .map(|(source, value)| (source, decoder.decode(value)))
            .collect();

        let mut records = Vec::new();
        let mut all_ok = true;
        for (source, result) in results {
            match result {
                Ok(record) => {
                    eprintln!("{} {source}", "✓".green());
                    records.push(record.to_value());
                }
                Err(error) => {
                    all_ok = false;
                    eprintln!("{} {source}: {error}", "✗".red());
                }
            }
        }

        let output = output_document(documents.len(), records);
        let output_src = serde_json::to_string_pretty(&output)?;
        if let Some(out) = self.out.as_ref() {
            if let Some(parent) = out.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(out, &output_src).with_context(|| format!("writing {}", out.display()))?;
        } else {
            println!("{output_src}");
        }
        Ok(all_ok)
    }
}

impl CheckOut {
    fn run(&self) -> Result<bool> {
        let set = self.schema_settings.load()?;
        let schemas = match self.root.as_deref() {
            Some(root) => vec![set.resolve(root)?],
            None => set.resolve_all()?.into_values().collect(),
        };
        for schema in &schemas {
            print_schema(schema);
        }
        eprintln!(
            "{} {} record(s), {} enum(s)",
            "✓".green(),
            set.record_names().count(),
            set.enum_names().count()
        );
        Ok(true)
    }
}

impl CommandLineInterface {
    pub fn load() -> Self {
        Self::parse()
    }
    /// `Ok(false)` when some input failed to decode.
    pub fn run(&self) -> Result<bool> {
        match &self.cmd {
            Command::Decode(target) => {
                // debug path
                if target.no_op {
                    eprintln!("{self:#?}");
                    return Ok(true);
                }
                target.run()
            }
            Command::Check(target) => target.run(),
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// INTERNAL HELPERS
// ————————————————————————————————————————————————————————————————————————————

fn parse_kind(name: &str) -> Result<TypeKind, String> {
    TypeKind::parse(name).ok_or_else(|| format!("unknown type kind `{name}`"))
}

/// One input prints its record (`null` if it failed); several always print an array.
fn output_document(inputs: usize, mut records: Vec<Value>) -> Value {
    match inputs {
        1 => records.pop().unwrap_or(Value::Null),
        _ => Value::Array(records),
    }
}

fn print_schema(schema: &RecordSchema) {
    println!("{}", schema.name().bold());
    for field in schema.fields() {
        let mut line = format!("  {}: {}", field.name, field.ty.to_string().cyan());
        match &field.default {
            Some(DefaultValue::Value(data)) => line.push_str(&format!(" = {}", data.to_value())),
            Some(DefaultValue::Factory(_)) => line.push_str(&format!(" = {}", "<factory>".dimmed())),
            None => {}
        }
        if !field.init {
            line.push_str(&format!(" {}", "(post-init)".yellow()));
        }
        println!("{line}");
    }
}

fn resolve_file_path_patterns<I>(patterns: I) -> Result<Vec<PathBuf>, Box<dyn std::error::Error>>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    fn has_glob_chars(s: &str) -> bool {
        // Minimal glob detection for the `glob` crate syntax.
        s.bytes().any(|b| matches!(b, b'*' | b'?' | b'[' | b'{'))
    }

    let mut out = Vec::<PathBuf>::new();

    for raw in patterns {
        let pattern = raw.as_ref();

        if has_glob_chars(pattern) {
            let mut matched_any = false;
            for entry in glob::glob(pattern)? {
                match entry {
                    Ok(p) => {
                        matched_any = true;
                        out.push(p);
                    }
                    Err(e) => return Err(Box::new(e)),
                }
            }
            if !matched_any {
                // Pattern was explicitly a glob but matched nothing -> surface as an error
                return Err(format!("glob pattern matched no files: {pattern}").into());
            }
        } else {
            out.push(PathBuf::from(pattern));
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn output_shape_follows_the_input_count() {
        assert_eq!(output_document(1, vec![json!({"a": 1})]), json!({"a": 1}));
        assert_eq!(output_document(1, vec![]), Value::Null);
        assert_eq!(output_document(3, vec![json!({"a": 1})]), json!([{"a": 1}]));
        assert_eq!(output_document(2, vec![]), json!([]));
    }

    #[test]
    fn decode_flags_override_the_options_file() {
        let cli = CommandLineInterface::try_parse_from([
            "json-reify", "decode", "--schema", "s.json", "--root", "Fixture", "-i", "a.json",
            "--strict", "--cast", "int", "--cast", "enum",
        ])
        .unwrap();
        let Command::Decode(decode) = &cli.cmd else { panic!("expected decode") };
        let config = decode.options().unwrap().into_config();
        assert!(config.strict);
        assert!(config.check_types);
        assert_eq!(config.cast, [TypeKind::Integer, TypeKind::Enum]);
        assert!(CommandLineInterface::try_parse_from(["json-reify", "decode", "--schema", "s.json", "--root", "A", "-i", "a.json", "--cast", "integer"]).is_err());
    }
}
