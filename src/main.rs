use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;

use ckg::errors::CkgError;
use ckg::indexer::BatchReport;
use ckg::types::*;
use ckg::KnowledgeGraph;
use tracing_subscriber::EnvFilter;

/// Code knowledge graph for C, C++, Python, Java, Rust and Go sources.
#[derive(Parser)]
#[command(name = "ckg", about = "Code knowledge graph for C, C++, Python, Java, Rust and Go sources")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new project
    Init {
        /// Project path (default: current directory)
        path: Option<String>,
        /// Run initial indexing after init
        #[arg(short, long)]
        index: bool,
    },
    /// Index new and changed files, drop deleted ones
    Index {
        /// Project path (default: current directory)
        path: Option<String>,
    },
    /// Show graph statistics
    Status {
        /// Project path (default: current directory)
        path: Option<String>,
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },
    /// Show the definition of a qualified name
    Definition {
        /// Qualified name, e.g. `Graphics::Shape::area`
        name: String,
        /// Exact signature, e.g. `"(int)"`
        #[arg(short, long)]
        signature: Option<String>,
        /// Project path
        #[arg(short, long)]
        path: Option<String>,
    },
    /// List every declaration and definition site of a qualified name
    Locations {
        name: String,
        #[arg(short, long)]
        path: Option<String>,
    },
    /// List the direct members of a symbol
    Children {
        name: String,
        #[arg(short, long)]
        path: Option<String>,
    },
    /// List the methods that override a method
    Overrides {
        name: String,
        #[arg(short, long)]
        path: Option<String>,
    },
    /// Search symbols by name
    Search {
        /// Substring of the name, or the name itself with --kind
        text: String,
        /// Restrict to one kind (function, class, struct, union, enum,
        /// namespace, typedef, macro, ...)
        #[arg(short, long)]
        kind: Option<String>,
        #[arg(short, long)]
        path: Option<String>,
    },
    /// List the methods of a class
    Methods {
        class: String,
        /// Only methods with this name
        #[arg(short, long)]
        method: Option<String>,
        #[arg(short, long)]
        path: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

async fn run(cli: Cli) -> ckg::errors::Result<()> {
    match cli.command {
        Commands::Init { path, index } => {
            let project_path = resolve_path(path);
            let graph = KnowledgeGraph::init(&project_path)?;
            println!("Initialized knowledge graph at {}", project_path.display());
            if index {
                let report = graph.index_project().await?;
                print_batch(&report);
            }
        }
        Commands::Index { path } => {
            let graph = KnowledgeGraph::open(&resolve_path(path))?;
            let report = graph.index_project().await?;
            print_batch(&report);
        }
        Commands::Status { path, json } => {
            let graph = KnowledgeGraph::open(&resolve_path(path))?;
            let stats = graph.stats();
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("Knowledge graph status");
                println!("  Files:       {}", stats.file_count);
                println!("  Symbols:     {}", stats.symbol_count);
                println!("  Edges:       {}", stats.edge_count);
                println!("  Unresolved:  {}", stats.unresolved_edge_count);
                if let Some(bytes) = graph.database_size()? {
                    println!("  DB size:     {:.1} KB", bytes as f64 / 1024.0);
                }
                if !stats.symbols_by_kind.is_empty() {
                    println!("\n  Symbols by kind:");
                    for (kind, count) in &stats.symbols_by_kind {
                        println!("    {}: {}", kind, count);
                    }
                }
                if !stats.edges_by_kind.is_empty() {
                    println!("\n  Edges by kind:");
                    for (kind, count) in &stats.edges_by_kind {
                        println!("    {}: {}", kind, count);
                    }
                }
            }
        }
        Commands::Definition {
            name,
            signature,
            path,
        } => {
            let graph = KnowledgeGraph::open(&resolve_path(path))?;
            let found = match signature {
                Some(sig) => graph.find_definition_with_signature(&name, &sig),
                None => graph.find_definition(&name),
            };
            match found {
                Some(symbol) => print_symbol(&symbol),
                None => println!("No definition found for '{}'", name),
            }
        }
        Commands::Locations { name, path } => {
            let graph = KnowledgeGraph::open(&resolve_path(path))?;
            let locations = graph.find_declarations_and_definitions(&name);
            if locations.is_empty() {
                println!("No locations found for '{}'", name);
            }
            for loc in &locations {
                let role = match loc.role {
                    OccurrenceRole::Declaration => "declaration",
                    OccurrenceRole::Definition => "definition",
                };
                println!(
                    "{}:{}:{} {}",
                    loc.location.file,
                    loc.location.span.start_line,
                    loc.location.span.start_column,
                    role
                );
            }
        }
        Commands::Children { name, path } => {
            let graph = KnowledgeGraph::open(&resolve_path(path))?;
            let Some(parent) = graph.find_definition(&name) else {
                println!("No symbol named '{}'", name);
                return Ok(());
            };
            for child in graph.find_children(&parent.id) {
                print_symbol_line(&child);
            }
        }
        Commands::Overrides { name, path } => {
            let graph = KnowledgeGraph::open(&resolve_path(path))?;
            let Some(method) = graph.find_definition(&name) else {
                println!("No symbol named '{}'", name);
                return Ok(());
            };
            let overrides = graph.find_overrides_of(&method.id);
            if overrides.is_empty() {
                println!("Nothing overrides '{}'", name);
            }
            for symbol in &overrides {
                print_symbol_line(symbol);
            }
        }
        Commands::Search { text, kind, path } => {
            let graph = KnowledgeGraph::open(&resolve_path(path))?;
            let results = match kind {
                Some(kind) => {
                    let kind = SymbolKind::from_str(&kind).ok_or_else(|| CkgError::Config {
                        message: format!("unknown symbol kind '{}'", kind),
                    })?;
                    graph.search_by_kind(kind, &text)
                }
                None => graph.search_by_name_substring(&text),
            };
            if results.is_empty() {
                println!("No results found for '{}'", text);
            }
            for symbol in &results {
                print_symbol_line(symbol);
            }
        }
        Commands::Methods {
            class,
            method,
            path,
        } => {
            let graph = KnowledgeGraph::open(&resolve_path(path))?;
            let methods = graph.find_class_methods(&class, method.as_deref());
            if methods.is_empty() {
                println!("No methods found for '{}'", class);
            }
            for symbol in &methods {
                print_symbol_line(symbol);
            }
        }
    }
    Ok(())
}

fn print_batch(report: &BatchReport) {
    println!(
        "Indexed {} files ({} skipped, {} failed, {} removed), {} edges resolved in {}ms",
        report.committed,
        report.skipped,
        report.failed,
        report.removed.len(),
        report.resolved_edges,
        report.duration_ms
    );
    for diagnostic in &report.diagnostics {
        if matches!(
            diagnostic.status,
            DiagnosticStatus::Ok | DiagnosticStatus::Skipped
        ) {
            continue;
        }
        println!("  {} [{}]", diagnostic.path, diagnostic.status.as_str());
        for message in &diagnostic.messages {
            println!("    {}", message);
        }
    }
}

fn print_symbol_line(symbol: &SymbolNode) {
    match symbol.primary_location() {
        Some(loc) => println!(
            "{}{} ({}) - {}:{}",
            symbol.qualified_name,
            symbol.signature,
            symbol.kind.as_str(),
            loc.file,
            loc.span.start_line
        ),
        None => println!(
            "{}{} ({})",
            symbol.qualified_name,
            symbol.signature,
            symbol.kind.as_str()
        ),
    }
}

fn print_symbol(symbol: &SymbolNode) {
    print_symbol_line(symbol);
    println!("  {}", symbol.header);
    if let Some(doc) = &symbol.docstring {
        for line in doc.lines() {
            println!("  | {}", line);
        }
    }
    for decl in &symbol.declarations {
        println!("  declared at {}:{}", decl.file, decl.span.start_line);
    }
    for alt in &symbol.alternate_definitions {
        println!("  also defined at {}:{}", alt.file, alt.span.start_line);
    }
}

/// Resolves an optional path argument to a `PathBuf`.
///
/// Defaults to the current working directory if no path is provided.
fn resolve_path(path: Option<String>) -> PathBuf {
    match path {
        Some(p) => PathBuf::from(p),
        None => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}
