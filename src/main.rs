//! Trellis CLI entry point

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "trellis")]
#[command(about = "Code-intelligence engine: scan, graph, query, impact, drift", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Scan root path (defaults to current directory)
    #[arg(short, long, default_value = ".")]
    root: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan the tree and print the extracted elements
    Scan {
        /// Comma-separated extensions (default: ts,tsx,js,jsx)
        #[arg(long)]
        extensions: Option<String>,

        /// Exclude globs (replaces the defaults)
        #[arg(long)]
        exclude: Vec<String>,

        /// Also harvest reference tags from file text
        #[arg(long)]
        tags: bool,
    },
    /// Build the dependency graph and print its statistics
    Analyze,
    /// Run a graph query against the analyzed tree
    Query {
        /// what-calls-me | what-depends-on | centrality | shortest-path | neighborhood
        #[arg(value_name = "TYPE")]
        query_type: String,

        /// Target node id ("file:name", or a file path)
        target: String,

        /// Destination node for shortest-path
        #[arg(long)]
        to: Option<String>,

        #[arg(long, default_value = "10")]
        max_depth: usize,

        /// json | text
        #[arg(long, default_value = "json")]
        format: String,
    },
    /// Simulate the blast radius of changing an element
    Impact {
        /// Element node id ("file:name")
        element: String,

        #[arg(long, default_value = "5")]
        max_depth: usize,
    },
    /// Reconcile a recorded reference index against the current tree
    Drift {
        /// File with one reference tag per line
        index: PathBuf,

        /// Rename similarity threshold
        #[arg(long, default_value = "0.7")]
        similarity_threshold: f64,
    },
    /// Export the dependency graph as stable JSON
    Export {
        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Parse a reference tag and echo its round-tripped form
    Tag {
        tag: String,
    },
    /// Show version
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(format!("trellis={}", log_level)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Scan {
            extensions,
            exclude,
            tags,
        } => commands::scan(cli.root, extensions, exclude, tags, cli.verbose).await,
        Commands::Analyze => commands::analyze(cli.root).await,
        Commands::Query {
            query_type,
            target,
            to,
            max_depth,
            format,
        } => commands::query(cli.root, query_type, target, to, max_depth, format).await,
        Commands::Impact { element, max_depth } => {
            commands::impact(cli.root, element, max_depth).await
        }
        Commands::Drift {
            index,
            similarity_threshold,
        } => commands::drift(cli.root, index, similarity_threshold).await,
        Commands::Export { output } => commands::export(cli.root, output).await,
        Commands::Tag { tag } => commands::tag(tag),
        Commands::Version => {
            println!("trellis v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
