//! Insight CLI - Command-line interface for AI-assisted code inspection.

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "insight")]
#[command(about = "AI-assisted code inspection for projects", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize an insight project in the current directory
    Init,
    /// Build the relation graph by indexing the project
    Index,
    /// Run AI analysis over files
    Analyze {
        /// Files to analyze (relative paths)
        files: Vec<String>,
        /// Analyze every file with recorded relations instead
        #[arg(long, conflicts_with = "files")]
        all_related: bool,
    },
    /// Inspect and edit the relation graph
    Relations {
        #[command(subcommand)]
        command: RelationCommands,
    },
    /// Manage tracked inspections
    Inspections {
        #[command(subcommand)]
        command: InspectionCommands,
    },
    /// Run the AI fix loop for one inspection
    Fix {
        /// Inspection ID
        id: String,
        /// Write corrected files back to disk
        #[arg(long)]
        write: bool,
    },
    /// Show recorded metrics for this invocation
    Metrics,
}

#[derive(Subcommand)]
enum RelationCommands {
    /// List all recorded relations
    List,
    /// Record a relation between two files
    Add {
        /// Source file path
        source: String,
        /// Related file path
        related: String,
    },
    /// Remove a recorded relation
    Remove {
        /// Source file path
        source: String,
        /// Related file path
        related: String,
    },
    /// Prune relations whose files no longer exist
    Cleanup,
}

#[derive(Subcommand)]
enum InspectionCommands {
    /// List tracked inspections
    List,
    /// Show one inspection and its attached files
    Show {
        /// Inspection ID
        id: String,
    },
    /// Remove an inspection
    Remove {
        /// Inspection ID
        id: String,
    },
    /// Replace an inspection's description
    SetDescription {
        /// Inspection ID
        id: String,
        /// New description
        description: String,
    },
    /// Detach one file from an inspection
    RemoveFile {
        /// Inspection ID
        id: String,
        /// File path to detach
        path: String,
    },
}

fn main() -> Result<()> {
    // Respects RUST_LOG (e.g. RUST_LOG=insight_core=debug)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init => commands::init::run(),
        Commands::Index => commands::index::run(),
        Commands::Analyze { files, all_related } => commands::analyze::run(files, all_related),
        Commands::Relations { command } => match command {
            RelationCommands::List => commands::relations::list(),
            RelationCommands::Add { source, related } => {
                commands::relations::add(&source, &related)
            }
            RelationCommands::Remove { source, related } => {
                commands::relations::remove(&source, &related)
            }
            RelationCommands::Cleanup => commands::relations::cleanup(),
        },
        Commands::Inspections { command } => match command {
            InspectionCommands::List => commands::inspections::list(),
            InspectionCommands::Show { id } => commands::inspections::show(&id),
            InspectionCommands::Remove { id } => commands::inspections::remove(&id),
            InspectionCommands::SetDescription { id, description } => {
                commands::inspections::set_description(&id, &description)
            }
            InspectionCommands::RemoveFile { id, path } => {
                commands::inspections::remove_file(&id, &path)
            }
        },
        Commands::Fix { id, write } => commands::fix::run(&id, write),
        Commands::Metrics => commands::metrics::run(),
    }
}
