//! Devac CLI - command-line surface over the devac code graph.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(name = "devac")]
#[command(about = "Queryable code graph with per-package seed storage", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply parser output (JSON records) to a package's seed store
    Ingest {
        /// Package root directory
        package: PathBuf,
        /// Path to the parser's JSON output (one ParsedFile or an array)
        #[arg(long)]
        records: PathBuf,
        /// Apply as a branch delta instead of a full base analysis
        #[arg(long)]
        branch: Option<String>,
        /// Re-apply files even when their content hash is unchanged
        #[arg(long)]
        force: bool,
    },
    /// Compute files affected by a set of changed files
    Affected {
        /// Package root directory
        package: PathBuf,
        /// Changed files, comma-separated (package-relative paths)
        #[arg(long)]
        files: String,
        /// Maximum traversal depth in edge hops
        #[arg(long, default_value = "3")]
        depth: i64,
        /// Output format (text, json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Look up symbols in a package's merged view
    Symbols {
        /// Package root directory
        package: PathBuf,
        /// Case-insensitive substring filter on the symbol name
        #[arg(long)]
        name: Option<String>,
        /// Exact kind filter (function, class, ...)
        #[arg(long)]
        kind: Option<String>,
        /// Exact file path filter
        #[arg(long)]
        file: Option<String>,
        /// Only exported symbols
        #[arg(long)]
        exported: bool,
        /// Output granularity (counts, summary, full)
        #[arg(long, default_value = "summary")]
        granularity: String,
        /// Page size
        #[arg(long)]
        limit: Option<usize>,
        /// Page offset
        #[arg(long, default_value = "0")]
        offset: usize,
    },
    /// Walk CALLS edges from an entity
    Calls {
        /// Package root directory
        package: PathBuf,
        /// Entity id to start from
        entity_id: String,
        /// Walk direction (callers, callees, both)
        #[arg(long, default_value = "both")]
        direction: String,
        /// Result cap
        #[arg(long)]
        cap: Option<usize>,
    },
    /// Run a raw read-only SQL query against the merged view
    Query {
        /// Package root directory
        package: PathBuf,
        /// A single SELECT statement over nodes/edges/external_refs
        sql: String,
    },
    /// Show a package's seed state
    Status {
        /// Package root directory
        package: PathBuf,
    },
    /// Remove a stale partition lock
    Unlock {
        /// Package root directory
        package: PathBuf,
        /// Partition to unlock (base, branch, all)
        #[arg(long, default_value = "all")]
        partition: String,
    },
    /// Hub federation across repositories
    Hub {
        #[command(subcommand)]
        command: HubCommands,
    },
}

#[derive(Subcommand)]
enum HubCommands {
    /// Register (or refresh) a repository in the hub
    Register {
        /// Repository root directory
        path: PathBuf,
    },
    /// Show registered repositories and their package seed states
    Status,
    /// Run one query template against every seeded package
    Query {
        /// SELECT template using {nodes}/{edges}/{external_refs} placeholders
        sql: String,
    },
    /// Feedback tables (validation errors, CI status, issues, reviews)
    Feedback {
        #[command(subcommand)]
        command: FeedbackCommands,
    },
}

#[derive(Subcommand)]
enum FeedbackCommands {
    /// Delete all rows for a {repo, source} pair
    Clear {
        /// Repository id
        #[arg(long)]
        repo: String,
        /// Feedback table (validation-errors, ci-status, issues, reviews)
        #[arg(long)]
        table: String,
        /// Producing tool (tsc, eslint, ...)
        #[arg(long)]
        source: String,
    },
    /// Bulk-push rows from a JSON file
    Push {
        /// Repository id
        #[arg(long)]
        repo: String,
        /// Feedback table (validation-errors, ci-status, issues, reviews)
        #[arg(long)]
        table: String,
        /// Producing tool (tsc, eslint, ...)
        #[arg(long)]
        source: String,
        /// Path to a JSON array of {id, payload} entries
        #[arg(long)]
        entries: PathBuf,
    },
    /// List stored rows for a repository
    List {
        /// Repository id
        #[arg(long)]
        repo: String,
        /// Feedback table (validation-errors, ci-status, issues, reviews)
        #[arg(long)]
        table: String,
    },
}

fn main() -> Result<()> {
    // Respects RUST_LOG (e.g. RUST_LOG=devac_core=debug).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Ingest {
            package,
            records,
            branch,
            force,
        } => commands::ingest::run(&package, &records, branch.as_deref(), force),
        Commands::Affected {
            package,
            files,
            depth,
            format,
        } => commands::affected::run(&package, &files, depth, &format),
        Commands::Symbols {
            package,
            name,
            kind,
            file,
            exported,
            granularity,
            limit,
            offset,
        } => commands::symbols::run(
            &package,
            name,
            kind,
            file,
            exported,
            &granularity,
            limit,
            offset,
        ),
        Commands::Calls {
            package,
            entity_id,
            direction,
            cap,
        } => commands::calls::run(&package, &entity_id, &direction, cap),
        Commands::Query { package, sql } => commands::raw::run(&package, &sql),
        Commands::Status { package } => commands::status::run(&package),
        Commands::Unlock { package, partition } => commands::unlock::run(&package, &partition),
        Commands::Hub { command } => match command {
            HubCommands::Register { path } => commands::hub::register(&path),
            HubCommands::Status => commands::hub::status(),
            HubCommands::Query { sql } => commands::hub::query(&sql),
            HubCommands::Feedback { command } => match command {
                FeedbackCommands::Clear {
                    repo,
                    table,
                    source,
                } => commands::hub::feedback_clear(&repo, &table, &source),
                FeedbackCommands::Push {
                    repo,
                    table,
                    source,
                    entries,
                } => commands::hub::feedback_push(&repo, &table, &source, &entries),
                FeedbackCommands::List { repo, table } => {
                    commands::hub::feedback_list(&repo, &table)
                }
            },
        },
    }
}
