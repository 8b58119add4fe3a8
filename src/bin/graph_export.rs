//! Datamodel Graph CLI
//!
//! Compiles a directory of declaration files and prints or exports the
//! resulting schema graph.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use datamodel_schema::config::OutputFormat;
use datamodel_schema::graph::{load_declarations, LoadedDeclarations};
use datamodel_schema::{Compilation, Compiler, CompilerConfig};
use petgraph::Direction;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "datamodel-graph")]
#[command(about = "Discover datamodel node types and build the schema graph")]
struct Cli {
    /// Directory of declaration files (defaults to current directory)
    #[arg(short, long, default_value = ".")]
    decl_dir: PathBuf,

    /// Config file layered over the default locations
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Extra directory names to exclude
    #[arg(long = "exclude-dir")]
    exclude_dirs: Vec<String>,

    /// Extra path prefixes to exclude
    #[arg(long = "exclude-prefix")]
    exclude_prefixes: Vec<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile and print a summary with diagnostics
    Build {
        /// Exit non-zero when any error diagnostic is reported
        #[arg(long)]
        strict: bool,
    },

    /// Export the graph as JSON or GraphViz DOT
    Export {
        #[arg(short, long, value_enum)]
        format: Option<Format>,
        /// Output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show references around one node type
    Show {
        /// Qualified or simple type name
        name: String,
        /// Limit closure depth
        #[arg(long)]
        depth: Option<usize>,
    },

    /// Fuzzy search node type names
    Search {
        query: String,
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },

    /// Print the effective configuration
    Config {
        /// Also write it to this file
        #[arg(long)]
        save: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Json,
    Dot,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = CompilerConfig::load_from(cli.config.as_deref()).context("loading configuration")?;
    config.scan.exclude_dirs.extend(cli.exclude_dirs.iter().cloned());
    config.scan.exclude_prefixes.extend(cli.exclude_prefixes.iter().cloned());

    match cli.command {
        Commands::Config { save } => {
            print!("{}", toml::to_string_pretty(&config)?);
            if let Some(path) = save {
                config.save(&path)?;
                eprintln!("Saved configuration to {}", path.display());
            }
            Ok(())
        }

        Commands::Build { strict } => {
            let (loaded, compilation) = load_and_compile(&cli.decl_dir, &config)?;
            let graph = &compilation.graph;

            println!("Declaration files: {} ({} types)", loaded.files.len(), loaded.decls.len());
            println!("Bundle hash: {}", loaded.bundle_hash);
            println!("Node types: {}", graph.node_count());
            println!("References: {}", graph.edge_count());
            println!("Cycle groups: {}", graph.cycle_groups().len());
            println!("Fingerprint: {}", graph.fingerprint()?);

            if compilation.is_complete() {
                println!("\n✅ Graph complete");
            } else {
                println!("\n{}", compilation.diagnostics);
            }

            if strict && compilation.diagnostics.has_errors() {
                bail!("{} error diagnostic(s)", compilation.diagnostics.error_count());
            }
            Ok(())
        }

        Commands::Export { format, output } => {
            let compilation = compile(&cli.decl_dir, &config)?;
            let format = match format {
                Some(Format::Json) => OutputFormat::Json,
                Some(Format::Dot) => OutputFormat::Dot,
                None => config.output.format,
            };

            let content = match format {
                OutputFormat::Dot => compilation.graph.to_dot(),
                OutputFormat::Json => {
                    let value = serde_json::json!({
                        "graph": compilation.graph.to_json()?,
                        "diagnostics": compilation.diagnostics,
                        "fingerprint": compilation.graph.fingerprint()?,
                    });
                    if config.output.pretty {
                        serde_json::to_string_pretty(&value)?
                    } else {
                        serde_json::to_string(&value)?
                    }
                }
            };

            match output {
                Some(path) => {
                    std::fs::write(&path, content)
                        .with_context(|| format!("writing {}", path.display()))?;
                    eprintln!("✅ Exported graph to {}", path.display());
                }
                None => println!("{}", content),
            }
            Ok(())
        }

        Commands::Show { name, depth } => {
            let compilation = compile(&cli.decl_dir, &config)?;
            let graph = &compilation.graph;
            let Some(qualified) = graph.resolve(&name) else {
                bail!("no node type matches '{}'", name);
            };
            let Some(node) = graph.get(qualified) else {
                bail!("no node type matches '{}'", name);
            };

            println!("{} ({})", node.qualified_name, node.location.display());
            println!("  identity: {}", node.identity_path);
            for field in &node.fields {
                println!("  {:<20} {:<24} {:?}", field.name, field.ty.as_str(), field.role);
            }

            println!("\nReferences out: {:?}", graph.refs_out(qualified));
            println!("References in:  {:?}", graph.refs_in(qualified));

            println!("\nDependencies:");
            for dep in graph.closure(qualified, Direction::Outgoing, depth) {
                let marker = if dep.in_cycle { " (cycle)" } else { "" };
                println!("  {}{}{}", "  ".repeat(dep.depth - 1), dep.name, marker);
            }
            Ok(())
        }

        Commands::Search { query, limit } => {
            let compilation = compile(&cli.decl_dir, &config)?;
            for result in compilation.graph.search(&query, limit) {
                println!("{:>5}  {}  ({})", result.score, result.qualified_name, result.location.display());
            }
            Ok(())
        }
    }
}

fn compile(decl_dir: &Path, config: &CompilerConfig) -> anyhow::Result<Compilation> {
    let (_, compilation) = load_and_compile(decl_dir, config)?;
    Ok(compilation)
}

fn load_and_compile(
    decl_dir: &Path,
    config: &CompilerConfig,
) -> anyhow::Result<(LoadedDeclarations, Compilation)> {
    let loaded = load_declarations(decl_dir, &config.load_config())
        .with_context(|| format!("loading declarations from {}", decl_dir.display()))?;
    let compilation = Compiler::from_config(config).compile(&loaded.decls)?;
    Ok((loaded, compilation))
}
