//! Schema Materialize CLI
//!
//! Writes version-named snapshots of `current` schema files and inlines
//! their references.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use schema_materializer::{
    materialize_schema_version, ContentType, DereferenceOptions, Dereferencer, FileResolver,
    MaterializeOptions, MaterializerConfig, SchemaDocument,
};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

#[derive(Parser)]
#[command(name = "schema-materialize")]
#[command(about = "Materialize versioned schema snapshots")]
struct Cli {
    /// Config file to load (optional)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct MaterializeArgs {
    /// Formats to write; the first one is the symlink target
    #[arg(short = 't', long = "content-type", value_enum)]
    content_types: Vec<ContentType>,

    /// Point a `<version>` symlink at the first format's file
    #[arg(long, overrides_with = "no_symlink")]
    symlink: bool,

    /// Skip the symlink even if configured
    #[arg(long)]
    no_symlink: bool,

    /// Stage written files with git
    #[arg(long, overrides_with = "no_git_add")]
    git_add: bool,

    /// Skip staging even if configured
    #[arg(long)]
    no_git_add: bool,

    /// Inline references before writing
    #[arg(long, overrides_with = "no_dereference")]
    dereference: bool,

    /// Skip dereferencing even if configured
    #[arg(long)]
    no_dereference: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Materialize the version declared by one schema file
    Materialize {
        /// Schema file, e.g. schemas/basic/current.yaml
        schema: PathBuf,

        #[command(flatten)]
        args: MaterializeArgs,
    },

    /// Materialize every `current` schema under a directory
    MaterializeAll {
        /// Directory to search
        #[arg(default_value = ".")]
        root: PathBuf,

        /// Source file name to look for (default from config)
        #[arg(short, long)]
        name: Option<String>,

        #[command(flatten)]
        args: MaterializeArgs,
    },

    /// Print or write a schema with every reference inlined
    Dereference {
        /// Schema file
        schema: PathBuf,

        /// Output format (default: from output extension, else yaml)
        #[arg(short, long, value_enum)]
        format: Option<ContentType>,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show the effective configuration
    Config,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = MaterializerConfig::load_from(cli.config.as_deref())
        .context("failed to load configuration")?;

    match cli.command {
        Commands::Materialize { schema, args } => {
            let (options, dereference) = resolve_options(&config, &args);
            for path in materialize_file(&schema, &options, dereference.as_ref())? {
                println!("{}", path.display());
            }
            Ok(())
        }

        Commands::MaterializeAll { root, name, args } => {
            let (options, dereference) = resolve_options(&config, &args);
            let name = name.unwrap_or_else(|| config.materialize.current_name.clone());

            let mut count = 0;
            for entry in WalkDir::new(&root)
                .into_iter()
                .filter_entry(|e| !is_skipped_dir(e.path()))
            {
                let entry = entry.with_context(|| format!("failed to walk {}", root.display()))?;
                if !entry.file_type().is_file() || entry.file_name().to_string_lossy() != name.as_str() {
                    continue;
                }

                println!("📂 {}", entry.path().display());
                for path in materialize_file(entry.path(), &options, dereference.as_ref())? {
                    println!("   {}", path.display());
                }
                count += 1;
            }

            if count == 0 {
                bail!("no '{}' files found under {}", name, root.display());
            }
            println!("✅ Materialized {} schema(s)", count);
            Ok(())
        }

        Commands::Dereference { schema, format, output } => {
            let document = SchemaDocument::load(&schema)
                .with_context(|| format!("failed to load {}", schema.display()))?;
            let resolver = FileResolver::for_schema(&schema);
            let inlined = Dereferencer::with_options(&resolver, config.dereference.options())
                .dereference(&document)
                .with_context(|| format!("failed to dereference {}", schema.display()))?;

            let format = format
                .or_else(|| {
                    output
                        .as_ref()
                        .and_then(|p| p.extension())
                        .and_then(|e| e.to_str())
                        .and_then(ContentType::from_extension)
                })
                .unwrap_or(ContentType::Yaml);
            let content = inlined.encode(format)?;

            match output {
                Some(path) => std::fs::write(&path, content)
                    .with_context(|| format!("failed to write {}", path.display()))?,
                None => print!("{}", content),
            }
            Ok(())
        }

        Commands::Config => {
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

/// Command-line flags layered over configured defaults
fn resolve_options(
    config: &MaterializerConfig,
    args: &MaterializeArgs,
) -> (MaterializeOptions, Option<DereferenceOptions>) {
    let mut options = config.materialize.options();
    if !args.content_types.is_empty() {
        options.content_types = args.content_types.clone();
    }
    options.should_symlink = flag(args.symlink, args.no_symlink, options.should_symlink);
    options.should_git_add = flag(args.git_add, args.no_git_add, options.should_git_add);

    let dereference = flag(
        args.dereference,
        args.no_dereference,
        config.dereference.before_materialize,
    )
    .then(|| config.dereference.options());

    (options, dereference)
}

/// An `--x` / `--no-x` pair; the configured value applies when neither is given
fn flag(on: bool, off: bool, configured: bool) -> bool {
    match (on, off) {
        (true, _) => true,
        (_, true) => false,
        _ => configured,
    }
}

fn materialize_file(
    schema_path: &Path,
    options: &MaterializeOptions,
    dereference: Option<&DereferenceOptions>,
) -> anyhow::Result<Vec<PathBuf>> {
    let mut schema = SchemaDocument::load(schema_path)
        .with_context(|| format!("failed to load {}", schema_path.display()))?;

    if let Some(dereference) = dereference {
        let resolver = FileResolver::for_schema(schema_path);
        schema = Dereferencer::with_options(&resolver, dereference.clone())
            .dereference(&schema)
            .with_context(|| format!("failed to dereference {}", schema_path.display()))?;
    }

    let directory = match schema_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    materialize_schema_version(directory, &schema, options)
        .with_context(|| format!("failed to materialize {}", schema_path.display()))
}

fn is_skipped_dir(path: &Path) -> bool {
    matches!(
        path.file_name().and_then(|n| n.to_str()),
        Some(".git" | "target" | "node_modules")
    )
}
