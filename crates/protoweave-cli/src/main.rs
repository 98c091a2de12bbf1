//! protoweave - Convert Protocol Buffers messages between binary and JSON
//!
//! Schemas come from a serialized `FileDescriptorSet`, as written by
//! `protoc --descriptor_set_out` or `buf build -o`.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use protoweave_core::json::{binary_to_json, json_to_binary};
use protoweave_core::{
    Field, FieldType, JsonReaderConfig, JsonWriterConfig, MessageId, ReaderConfig, Schema,
};
use std::fmt::Write as _;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, Level};
use tracing_subscriber::EnvFilter;

/// Convert Protocol Buffers messages between the binary wire format and JSON
#[derive(Parser, Debug)]
#[command(name = "protoweave")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert a binary message to Protobuf-JSON
    Decode(DecodeArgs),
    /// Convert Protobuf-JSON to a binary message
    Encode(EncodeArgs),
    /// List the messages and enums of a descriptor set
    Schema(SchemaArgs),
}

#[derive(Args, Debug)]
struct SchemaSource {
    /// Serialized FileDescriptorSet describing the message types
    #[arg(short, long, env = "PROTOWEAVE_DESCRIPTOR_SET")]
    descriptor_set: PathBuf,
}

#[derive(Args, Debug)]
struct MessageArgs {
    #[command(flatten)]
    source: SchemaSource,

    /// Fully qualified message name, e.g. `my.package.Request`
    #[arg(short, long)]
    message: String,

    /// Input file (defaults to stdin)
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Output file (defaults to stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Maximum nesting depth of embedded messages
    #[arg(long, default_value = "100")]
    max_depth: usize,
}

#[derive(Args, Debug)]
struct DecodeArgs {
    #[command(flatten)]
    message: MessageArgs,

    /// Indent the JSON output
    #[arg(long)]
    pretty: bool,

    /// Key objects by proto field names instead of lowerCamel JSON names
    #[arg(long)]
    preserve_proto_field_names: bool,
}

#[derive(Args, Debug)]
struct EncodeArgs {
    #[command(flatten)]
    message: MessageArgs,

    /// Skip JSON members and enum names the schema does not know
    #[arg(long)]
    ignore_unknown_fields: bool,
}

#[derive(Args, Debug)]
struct SchemaArgs {
    #[command(flatten)]
    source: SchemaSource,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    match cli.command {
        Command::Decode(args) => run_decode(&args),
        Command::Encode(args) => run_encode(&args),
        Command::Schema(args) => run_schema(&args),
    }
}

/// Binary -> JSON
fn run_decode(args: &DecodeArgs) -> Result<()> {
    let schema = load_schema(&args.message.source.descriptor_set)?;
    let id = resolve_message(&schema, &args.message.message)?;
    let input = read_input(args.message.input.as_deref())?;

    let reader_config = ReaderConfig::new().max_depth(args.message.max_depth);
    let writer_config = JsonWriterConfig::new()
        .pretty(args.pretty)
        .preserve_proto_field_names(args.preserve_proto_field_names);
    let mut json = binary_to_json(&schema, id, &input, reader_config, writer_config)
        .with_context(|| format!("Failed to decode {}", args.message.message))?;
    json.push('\n');

    info!(
        "Decoded {} bytes of {} into {} bytes of JSON",
        input.len(),
        args.message.message,
        json.len()
    );
    write_output(args.message.output.as_deref(), json.as_bytes())
}

/// JSON -> binary
fn run_encode(args: &EncodeArgs) -> Result<()> {
    let schema = load_schema(&args.message.source.descriptor_set)?;
    let id = resolve_message(&schema, &args.message.message)?;
    let input = read_input(args.message.input.as_deref())?;
    let text = String::from_utf8(input).context("JSON input is not valid UTF-8")?;

    let config = JsonReaderConfig::new()
        .ignore_unknown_fields(args.ignore_unknown_fields)
        .max_depth(args.message.max_depth);
    let bytes = json_to_binary(&schema, id, &text, config)
        .with_context(|| format!("Failed to encode {}", args.message.message))?;

    info!(
        "Encoded {} bytes of JSON into {} bytes of {}",
        text.len(),
        bytes.len(),
        args.message.message
    );
    write_output(args.message.output.as_deref(), &bytes)
}

fn run_schema(args: &SchemaArgs) -> Result<()> {
    let schema = load_schema(&args.source.descriptor_set)?;
    print!("{}", describe_schema(&schema));
    Ok(())
}

/// Read and index a serialized FileDescriptorSet
fn load_schema(path: &Path) -> Result<Schema> {
    let bytes = fs::read(path)
        .with_context(|| format!("Failed to read descriptor set: {}", path.display()))?;
    let schema = Schema::decode_file_descriptor_set(&bytes)
        .with_context(|| format!("Invalid descriptor set: {}", path.display()))?;
    debug!(
        "Loaded {} messages and {} enums from {}",
        schema.messages().len(),
        schema.enums().len(),
        path.display()
    );
    Ok(schema)
}

/// Look up a message by full name, accepting a leading dot
fn resolve_message(schema: &Schema, name: &str) -> Result<MessageId> {
    let name = name.strip_prefix('.').unwrap_or(name);
    match schema.message_id(name) {
        Some(id) => Ok(id),
        None => bail!(
            "Message '{}' not found in descriptor set (run `protoweave schema` to list messages)",
            name
        ),
    }
}

fn read_input(path: Option<&Path>) -> Result<Vec<u8>> {
    match path {
        Some(path) => {
            fs::read(path).with_context(|| format!("Failed to read input file: {}", path.display()))
        }
        None => {
            let mut buf = Vec::new();
            std::io::stdin()
                .read_to_end(&mut buf)
                .context("Failed to read stdin")?;
            Ok(buf)
        }
    }
}

fn write_output(path: Option<&Path>, data: &[u8]) -> Result<()> {
    match path {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
            }
            fs::write(path, data)
                .with_context(|| format!("Failed to write file: {}", path.display()))
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(data).context("Failed to write stdout")?;
            stdout.flush().context("Failed to flush stdout")
        }
    }
}

/// Render a one-line-per-field listing of every message and enum
fn describe_schema(schema: &Schema) -> String {
    let mut out = String::new();
    for message in schema.messages().iter().filter(|m| !m.is_map_entry()) {
        let _ = writeln!(out, "message {}", message.full_name());
        for field in message.fields() {
            let _ = writeln!(
                out,
                "  {} = {}; {}",
                field.name(),
                field.number(),
                field_label(schema, field)
            );
        }
    }
    for enumeration in schema.enums() {
        let _ = writeln!(out, "enum {}", enumeration.full_name());
        for (name, number) in enumeration.values() {
            let _ = writeln!(out, "  {} = {};", name, number);
        }
    }
    out
}

fn field_label(schema: &Schema, field: &Field) -> String {
    if field.is_map() {
        let entry = field.message_type().map(|id| schema.message(id));
        if let Some((key, value)) = entry.and_then(|e| e.map_key().zip(e.map_value())) {
            return format!(
                "map<{}, {}>",
                type_name(schema, key.field_type()),
                type_name(schema, value.field_type())
            );
        }
    }
    let name = type_name(schema, field.field_type());
    if field.is_repeated() {
        format!("repeated {}", name)
    } else {
        name
    }
}

fn type_name(schema: &Schema, ty: FieldType) -> String {
    match ty {
        FieldType::Scalar(kind) => kind.as_str().to_string(),
        FieldType::Enum(id) => schema.enumeration(id).full_name().to_string(),
        FieldType::Message(id) => schema.message(id).full_name().to_string(),
        FieldType::Unknown(wire_type) => format!("<{:?}>", wire_type),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use prost::Message as _;
    use protoweave_core::{FieldSpec, ScalarKind, SchemaBuilder};
    use tempfile::TempDir;

    fn sample_schema() -> Schema {
        let mut builder = SchemaBuilder::new();
        let id = builder.message("demo.Request");
        let kind = builder.enumeration("demo.Kind");
        builder.enum_value(kind, "KIND_UNSPECIFIED", 0).enum_value(kind, "KIND_FAST", 1);
        builder
            .add_field(id, FieldSpec::scalar(1, "name", ScalarKind::String))
            .add_field(id, FieldSpec::scalar(2, "ids", ScalarKind::Int64).repeated())
            .add_field(id, FieldSpec::new(3, "kind", FieldType::Enum(kind)));
        builder.add_map_field(
            id,
            4,
            "labels",
            ScalarKind::String,
            FieldType::Scalar(ScalarKind::String),
        );
        builder.build().unwrap()
    }

    fn write_descriptor_set(dir: &TempDir) -> PathBuf {
        let set = sample_schema().to_file_descriptor_set().unwrap();
        let path = dir.path().join("schema.pb");
        fs::write(&path, set.encode_to_vec()).unwrap();
        path
    }

    fn message_args(dir: &TempDir, input: &str, output: &str) -> MessageArgs {
        MessageArgs {
            source: SchemaSource {
                descriptor_set: write_descriptor_set(dir),
            },
            message: ".demo.Request".to_string(),
            input: Some(dir.path().join(input)),
            output: Some(dir.path().join(output)),
            max_depth: 100,
        }
    }

    #[test]
    fn test_encode_then_decode() {
        let dir = TempDir::new().unwrap();
        let json = r#"{"name":"job","ids":["1","2"],"kind":"KIND_FAST","labels":{"a":"b"}}"#;
        fs::write(dir.path().join("in.json"), json).unwrap();

        run_encode(&EncodeArgs {
            message: message_args(&dir, "in.json", "out/msg.bin"),
            ignore_unknown_fields: false,
        })
        .unwrap();
        assert!(dir.path().join("out/msg.bin").is_file());

        run_decode(&DecodeArgs {
            message: message_args(&dir, "out/msg.bin", "back.json"),
            pretty: false,
            preserve_proto_field_names: false,
        })
        .unwrap();
        let back = fs::read_to_string(dir.path().join("back.json")).unwrap();
        assert_eq!(back, format!("{}\n", json));
    }

    #[test]
    fn test_encode_reports_unknown_fields() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("in.json"), r#"{"bogus":1}"#).unwrap();

        let args = EncodeArgs {
            message: message_args(&dir, "in.json", "out.bin"),
            ignore_unknown_fields: false,
        };
        assert!(run_encode(&args).is_err());

        let args = EncodeArgs {
            ignore_unknown_fields: true,
            ..args
        };
        run_encode(&args).unwrap();
        assert!(fs::read(dir.path().join("out.bin")).unwrap().is_empty());
    }

    #[test]
    fn test_resolve_message() {
        let schema = sample_schema();
        assert!(resolve_message(&schema, "demo.Request").is_ok());
        assert!(resolve_message(&schema, ".demo.Request").is_ok());
        assert!(resolve_message(&schema, "demo.Missing").is_err());
    }

    #[test]
    fn test_describe_schema() {
        let listing = describe_schema(&sample_schema());
        assert!(listing.contains("message demo.Request\n"));
        assert!(listing.contains("  ids = 2; repeated int64\n"));
        assert!(listing.contains("  kind = 3; demo.Kind\n"));
        assert!(listing.contains("  labels = 4; map<string, string>\n"));
        assert!(listing.contains("enum demo.Kind\n  KIND_UNSPECIFIED = 0;\n  KIND_FAST = 1;\n"));
        assert!(!listing.contains("LabelsEntry"));
    }

    #[test]
    fn test_missing_descriptor_set() {
        let dir = TempDir::new().unwrap();
        let err = load_schema(&dir.path().join("nope.pb")).unwrap_err();
        assert!(err.to_string().contains("Failed to read descriptor set"));
    }

    #[test]
    fn test_parse_arguments() {
        let cli = Cli::try_parse_from([
            "protoweave",
            "-vv",
            "decode",
            "--descriptor-set",
            "set.pb",
            "--message",
            "demo.Request",
            "--pretty",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Command::Decode(args) => {
                assert!(args.pretty);
                assert_eq!(args.message.input, None);
                assert_eq!(args.message.max_depth, 100);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }
}
