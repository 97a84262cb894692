//! CLI for `restmeta`.
//!
//! # Subcommands
//!
//! ```text
//! # Inspect how a logical path is parsed
//! restmeta parse /admin/realms/_/clients/_
//!
//! # Effective metadata of a path, from a YAML bundle
//! restmeta resolve --bundle metadata.yaml /admin/realms/master/clients/app
//!
//! # Concrete request for one operation
//! restmeta render --bundle metadata.yaml /admin/realms/master get --payload client.json
//!
//! # Metadata inferred from an OpenAPI document
//! restmeta infer --openapi openapi.yaml /admin/realms/_/clients/ --compact
//! restmeta has-path --openapi openapi.yaml /admin/realms/_/clients/
//! ```
//!
//! Diagnostics go to stderr; `RESTMETA_LOG` takes an `EnvFilter` directive
//! (default `warn`), `--verbose` forces `debug`.

#![forbid(unsafe_code)]

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use restmeta::{BundleConfig, Operation, PathDescriptor, ResourceMetadata};
use serde::Serialize;
use serde_json::Value;
use tracing_subscriber::EnvFilter;

/// Hierarchical REST resource metadata: resolve, render and infer.
#[derive(Parser)]
#[command(name = "restmeta", version, about)]
struct Cli {
    /// Log resolution and inference decisions at debug level.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the parsed form of a logical path.
    Parse(ParseArgs),

    /// Print the effective metadata of a logical path.
    Resolve(ResolveArgs),

    /// Print the rendered operation spec for a resource.
    Render(RenderArgs),

    /// Print metadata inferred from an OpenAPI document.
    ///
    /// Without `--openapi` only the path-derived fallback is printed.
    Infer(InferArgs),

    /// Print whether an OpenAPI document has a path matching the logical path.
    HasPath(HasPathArgs),
}

/// Output encoding of printed documents.
#[derive(Clone, Copy, Default, ValueEnum)]
enum Format {
    #[default]
    Yaml,
    Json,
}

#[derive(Parser)]
struct ParseArgs {
    /// Logical path (`/customers/acme`, `/customers/_`, `/customers/a*`).
    path: String,
}

#[derive(Parser)]
struct ResolveArgs {
    /// Path to a metadata bundle YAML file.
    #[arg(short, long)]
    bundle: PathBuf,

    /// Concrete logical path; a trailing `/` selects the collection itself.
    path: String,

    /// Output encoding.
    #[arg(short, long, value_enum, default_value_t)]
    format: Format,
}

#[derive(Parser)]
struct RenderArgs {
    /// Path to a metadata bundle YAML file.
    #[arg(short, long)]
    bundle: PathBuf,

    /// Concrete logical path of the resource.
    path: String,

    /// Operation: get, create, update, delete, list or compare.
    operation: String,

    /// JSON or YAML file with the resource payload.
    #[arg(short, long)]
    payload: Option<PathBuf>,

    /// Resource format for `{{resource_format .}}`.
    /// Overrides `resource_format` from the bundle.
    #[arg(long)]
    resource_format: Option<String>,

    /// Output encoding.
    #[arg(short, long, value_enum, default_value_t)]
    format: Format,
}

#[derive(Parser)]
struct InferArgs {
    /// Path to an OpenAPI document (JSON or YAML).
    #[arg(short, long)]
    openapi: Option<PathBuf>,

    /// Logical metadata path (`/customers/_` for a collection).
    path: String,

    /// Drop everything inference would produce anyway.
    #[arg(long)]
    compact: bool,

    /// Output encoding.
    #[arg(short, long, value_enum, default_value_t)]
    format: Format,
}

#[derive(Parser)]
struct HasPathArgs {
    /// Path to an OpenAPI document (JSON or YAML).
    #[arg(short, long)]
    openapi: PathBuf,

    /// Logical metadata path.
    path: String,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Parse(args) => run_parse(&args),
        Command::Resolve(args) => run_resolve(&args),
        Command::Render(args) => run_render(&args),
        Command::Infer(args) => run_infer(&args),
        Command::HasPath(args) => run_has_path(&args),
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env("RESTMETA_LOG").unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run_parse(args: &ParseArgs) -> anyhow::Result<()> {
    let descriptor = PathDescriptor::parse(&args.path)
        .with_context(|| format!("Invalid logical path: {}", args.path))?;

    let view = serde_json::json!({
        "selector": descriptor.selector,
        "segments": descriptor.segments,
        "collection": descriptor.collection,
        "selectorMode": descriptor.selector_mode,
    });
    print_document(&view, Format::Yaml)
}

fn run_resolve(args: &ResolveArgs) -> anyhow::Result<()> {
    let service = load_bundle(&args.bundle)?
        .into_service()
        .context("Failed to build metadata store")?;

    let metadata = service
        .resolve_for_path(&args.path)
        .with_context(|| format!("Failed to resolve metadata for {}", args.path))?;
    print_metadata(&metadata, args.format)
}

fn run_render(args: &RenderArgs) -> anyhow::Result<()> {
    let operation: Operation = args.operation.parse()?;

    let mut bundle = load_bundle(&args.bundle)?;
    if let Some(format) = &args.resource_format {
        bundle.resource_format.clone_from(format);
    }
    let service = bundle
        .into_service()
        .context("Failed to build metadata store")?;

    let payload = match &args.payload {
        Some(path) => load_document(path)?,
        None => Value::Object(serde_json::Map::new()),
    };

    let spec = service
        .render_operation_spec(&args.path, operation, &payload)
        .with_context(|| format!("Failed to render {operation} for {}", args.path))?;
    print_document(&spec, args.format)
}

fn run_infer(args: &InferArgs) -> anyhow::Result<()> {
    let document = match &args.openapi {
        Some(path) => load_document(path)?,
        None => Value::Null,
    };

    let mut metadata = restmeta::infer_from_openapi(&args.path, &document)
        .with_context(|| format!("Failed to infer metadata for {}", args.path))?;
    if args.compact {
        metadata = restmeta::compact_inferred_metadata_defaults(&args.path, &metadata, &document)
            .context("Failed to compact inferred metadata")?;
    }

    let operations = metadata.operations.as_ref().map_or(0, |ops| ops.len());
    eprintln!("Inferred {operations} operations for {}", args.path);
    print_metadata(&metadata, args.format)
}

fn run_has_path(args: &HasPathArgs) -> anyhow::Result<()> {
    let document = load_document(&args.openapi)?;
    let found = restmeta::has_openapi_path(&args.path, &document)
        .with_context(|| format!("Invalid logical path: {}", args.path))?;
    println!("{found}");
    Ok(())
}

fn load_bundle(path: &Path) -> anyhow::Result<BundleConfig> {
    eprintln!("Loading bundle: {}", path.display());
    BundleConfig::load(path).with_context(|| format!("Failed to load bundle: {}", path.display()))
}

/// Read a JSON or YAML document into a value tree.
fn load_document(path: &Path) -> anyhow::Result<Value> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    if let Ok(value) = serde_json::from_str(&content) {
        return Ok(value);
    }
    serde_yaml_ng::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

fn print_metadata(metadata: &ResourceMetadata, format: Format) -> anyhow::Result<()> {
    let output = match format {
        Format::Yaml => metadata.to_yaml()?,
        Format::Json => metadata.to_json_pretty()? + "\n",
    };
    print!("{output}");
    Ok(())
}

fn print_document<T: Serialize>(value: &T, format: Format) -> anyhow::Result<()> {
    let output = match format {
        Format::Yaml => serde_yaml_ng::to_string(value).context("Failed to encode YAML")?,
        Format::Json => serde_json::to_string_pretty(value).context("Failed to encode JSON")? + "\n",
    };
    print!("{output}");
    Ok(())
}
