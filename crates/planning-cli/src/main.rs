mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{config::ConfigSubcommand, migrate::MigrateSubcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "planning",
    about = "Planning document lifecycle and protected-path checks",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from .claude/vibe-hacker.json or .git/)
    #[arg(long, global = true, env = "CLAUDE_PROJECT_DIR")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the default config (if missing) and create type directories
    Init,

    /// Create a new planning document
    New {
        /// Document type key (adr, fdp, ap, report, or a configured type)
        #[arg(value_name = "TYPE")]
        doc_type: String,
        title: String,
    },

    /// List planning documents
    List {
        #[arg(long = "type", value_name = "TYPE")]
        doc_type: Option<String>,
        #[arg(long)]
        status: Option<String>,
        /// Include documents in archive/ directories
        #[arg(long)]
        include_archived: bool,
    },

    /// Show a document's metadata and addenda
    Show { id: String },

    /// Change a document's status
    Status { id: String, status: String },

    /// Check whether a document body may be edited and print its path
    Edit {
        id: String,
        /// Allow editing a locked document (prints a warning)
        #[arg(long)]
        force: bool,
        /// Print only the path
        #[arg(long, short = 'q')]
        quiet: bool,
    },

    /// Append a dated addendum (allowed in every status)
    Append {
        id: String,
        title: String,
        #[arg(long)]
        body: Option<String>,
    },

    /// Create a replacement document and mark the old one superseded
    Supersede { id: String, title: String },

    /// Record related documents
    Relate {
        id: String,
        #[arg(required = true)]
        targets: Vec<String>,
        /// Also add ID to each target's related list (all or nothing)
        #[arg(long)]
        bidirectional: bool,
    },

    /// Move a document into its archive/ directory
    Archive {
        id: String,
        /// Archive even if the status is not an archive trigger
        #[arg(long)]
        force: bool,
    },

    /// Create the planning roadmap from its template
    Roadmap {
        /// Overwrite an existing roadmap
        #[arg(long)]
        force: bool,
    },

    /// Evaluate protection rules for a path (exit code 2 when the edit is blocked)
    CheckPath { path: PathBuf },

    /// Versioned migrations of the planning store
    Migrate {
        #[command(subcommand)]
        subcommand: MigrateSubcommand,
    },

    /// Inspect the project configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());
    let json = cli.json;

    let result = match cli.command {
        Commands::Init => cmd::init::run(&root, json),
        Commands::New { doc_type, title } => cmd::doc::new(&root, &doc_type, &title, json),
        Commands::List {
            doc_type,
            status,
            include_archived,
        } => cmd::doc::list(&root, doc_type, status, include_archived, json),
        Commands::Show { id } => cmd::doc::show(&root, &id, json),
        Commands::Status { id, status } => cmd::doc::status(&root, &id, &status, json),
        Commands::Edit { id, force, quiet } => cmd::doc::edit(&root, &id, force, quiet, json),
        Commands::Append { id, title, body } => {
            cmd::doc::append(&root, &id, &title, body.as_deref(), json)
        }
        Commands::Supersede { id, title } => cmd::doc::supersede(&root, &id, &title, json),
        Commands::Relate {
            id,
            targets,
            bidirectional,
        } => cmd::doc::relate(&root, &id, &targets, bidirectional, json),
        Commands::Archive { id, force } => cmd::doc::archive(&root, &id, force, json),
        Commands::Roadmap { force } => cmd::doc::roadmap(&root, force, json),
        Commands::CheckPath { path } => match cmd::check_path::run(&root, &path, json) {
            Ok(true) => Ok(()),
            Ok(false) => std::process::exit(2),
            Err(e) => Err(e),
        },
        Commands::Migrate { subcommand } => cmd::migrate::run(&root, subcommand, json),
        Commands::Config { subcommand } => cmd::config::run(&root, subcommand, json),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
