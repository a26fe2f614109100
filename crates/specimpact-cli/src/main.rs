//! SpecImpact CLI - Command-line interface for the spec/code/test graph
//!
//! This is the main entry point for users interacting with SpecImpact.
//! It provides commands for building, querying, and serving the graph.

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod manifest;

#[derive(Parser)]
#[command(name = "specimpact")]
#[command(version)]
#[command(about = "Impact analysis across specs, code, and tests", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize SpecImpact in the current directory
    Init {
        /// Path to initialize (defaults to current directory)
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Build the graph from the artifact manifest
    Build {
        /// Path to the project (defaults to current directory)
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Rebuild from scratch even if a stored graph exists
        #[arg(long)]
        force: bool,
    },

    /// Query the impact of changing one or more artifacts
    Impact {
        /// Artifact ids or file paths to start from
        starts: Vec<String>,

        /// Maximum traversal depth
        #[arg(short, long, default_value = "2")]
        depth: usize,

        /// Traversal direction (upstream or downstream)
        #[arg(long, default_value = "downstream")]
        direction: String,

        /// Restrict output to these kinds (spec, code, test)
        #[arg(short, long)]
        kind: Vec<String>,

        /// Follow low-confidence suggested links
        #[arg(long)]
        suggested: bool,

        /// Output as JSON instead of formatted text
        #[arg(long)]
        json: bool,

        /// Path to the project (defaults to current directory)
        #[arg(long, default_value = ".")]
        path: PathBuf,
    },

    /// Show one artifact and its edges
    Node {
        /// Artifact id
        id: String,

        /// Path to the project (defaults to current directory)
        #[arg(long, default_value = ".")]
        path: PathBuf,
    },

    /// Export the graph
    Export {
        /// Output format (dot, json, mermaid)
        #[arg(short, long, default_value = "dot")]
        format: String,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Restrict the export to the subgraph around this node
        #[arg(long)]
        focus: Option<String>,

        /// Radius of the focused subgraph
        #[arg(long, default_value = "1")]
        radius: usize,

        /// Path to the project (defaults to current directory)
        #[arg(long, default_value = ".")]
        path: PathBuf,
    },

    /// Re-link the given artifacts after a change
    Update {
        /// Changed artifact ids
        changed: Vec<String>,

        /// Path to the project (defaults to current directory)
        #[arg(long, default_value = ".")]
        path: PathBuf,
    },

    /// Start the SpecImpact server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "7641")]
        port: u16,

        /// Bind to 0.0.0.0 for remote access
        #[arg(long)]
        headless: bool,

        /// Path to the project (defaults to current directory)
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Show graph status and statistics
    Status {
        /// Path to check (defaults to current directory)
        #[arg(default_value = ".")]
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .with(tracing_subscriber::EnvFilter::new(filter))
        .init();

    let result = match cli.command {
        Commands::Init { path } => commands::init(&path),
        Commands::Build { path, force } => commands::build(&path, force),
        Commands::Impact {
            starts,
            depth,
            direction,
            kind,
            suggested,
            json,
            path,
        } => commands::impact(&path, &starts, depth, &direction, &kind, suggested, json),
        Commands::Node { id, path } => commands::node(&path, &id),
        Commands::Export {
            format,
            output,
            focus,
            radius,
            path,
        } => commands::export(&path, &format, output.as_deref(), focus.as_deref(), radius),
        Commands::Update { changed, path } => commands::update(&path, &changed),
        Commands::Serve {
            port,
            headless,
            path,
        } => commands::serve(port, headless, &path).await,
        Commands::Status { path } => commands::status(&path),
    };

    if let Err(e) = result {
        eprintln!("{} {}", "error:".red().bold(), e);
        std::process::exit(1);
    }
}
