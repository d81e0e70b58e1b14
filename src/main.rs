//! # API Index CLI (`apidx`)
//!
//! Index uploaded API collections per project and search their endpoints.
//!
//! ## Usage
//!
//! ```bash
//! apidx --config ./config/apidx.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `apidx init` | Create the index database and run schema migrations |
//! | `apidx detect <file>` | Print a file's format and endpoint count |
//! | `apidx index <project> <file_id> <file>` | Index a collection's endpoints |
//! | `apidx delete <project> <file_id>` | Remove a file's endpoints |
//! | `apidx search <project> "<query>"` | Semantic search over a project |
//! | `apidx list <project>` | List stored endpoints |
//! | `apidx stats` | Per-project collection summary |
//!
//! ## Examples
//!
//! ```bash
//! apidx index shop petstore-v1 ./petstore.yaml
//! apidx search shop "upload a pet photo" --limit 5
//! apidx search shop "delete" --where method=DELETE --where has_auth=true
//! apidx search shop "orders" --filter '{"folder_path": {"$in": ["store", "orders"]}}' --json
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use api_index::{config, ingest, logging, migrate, runtime, search, stats};

/// API Index: semantic search over uploaded Postman, OpenAPI, and Swagger
/// collections.
///
/// All commands except `detect` accept a `--config` flag pointing to a
/// TOML configuration file. See `config/apidx.example.toml`.
#[derive(Parser)]
#[command(
    name = "apidx",
    about = "API Index: semantic search over uploaded API collections",
    version,
    long_about = "API Index parses Postman collections and OpenAPI/Swagger documents into \
    normalized endpoints, embeds them into one vector collection per project, and answers \
    natural-language queries with optional metadata filters."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/apidx.toml")]
    config: PathBuf,

    /// Log level used when `RUST_LOG` is unset. Overrides `[logging].level`.
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the index database.
    ///
    /// Creates the SQLite file and its tables. Safe to run repeatedly.
    Init,

    /// Detect a file's format and count its endpoints. Writes nothing.
    Detect {
        /// Postman collection or OpenAPI/Swagger document (JSON or YAML).
        file: PathBuf,
    },

    /// Index every endpoint of an uploaded file into a project.
    ///
    /// Re-indexing the same file id overwrites its endpoints in place.
    Index {
        /// Project id; one vector collection per project.
        project: String,
        /// File id; prefixes every stored document id.
        file_id: String,
        /// Postman collection or OpenAPI/Swagger document (JSON or YAML).
        file: PathBuf,
    },

    /// Remove every endpoint that came from a file.
    Delete {
        project: String,
        file_id: String,
    },

    /// Search a project's endpoints.
    ///
    /// Fails if the project has never been indexed.
    Search {
        project: String,

        /// Natural-language query.
        query: String,

        /// Maximum number of results (default from `[search].default_limit`).
        #[arg(long)]
        limit: Option<usize>,

        /// Metadata equality filter `key=value`; repeat for a conjunction.
        #[arg(long = "where")]
        wheres: Vec<String>,

        /// Metadata filter as JSON, e.g. `{"method": {"$in": ["GET", "POST"]}}`.
        #[arg(long)]
        filter: Option<String>,

        /// Print hits as JSON.
        #[arg(long)]
        json: bool,
    },

    /// List a project's stored endpoints.
    List {
        project: String,

        /// Only endpoints from this file.
        #[arg(long)]
        file_id: Option<String>,
    },

    /// Show per-project collection statistics.
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Commands that don't require config
    if let Commands::Detect { file } = &cli.command {
        logging::init(cli.log_level.as_deref().unwrap_or("info"));
        return ingest::run_detect(file);
    }

    let cfg = config::load_config(&cli.config)?;
    logging::init(cli.log_level.as_deref().unwrap_or(&cfg.logging.level));

    if let Commands::Init = cli.command {
        migrate::run_migrations(&cfg).await?;
        println!("Index initialized successfully.");
        return Ok(());
    }

    let client = runtime::init(&cfg).await?;

    match cli.command {
        Commands::Index {
            project,
            file_id,
            file,
        } => {
            ingest::run_index(client, &project, &file_id, &file).await?;
        }
        Commands::Delete { project, file_id } => {
            ingest::run_delete(client, &project, &file_id).await?;
        }
        Commands::Search {
            project,
            query,
            limit,
            wheres,
            filter,
            json,
        } => {
            let filter = search::build_filter(&wheres, filter.as_deref())?;
            search::run_search(client, &project, &query, limit, filter.as_ref(), json).await?;
        }
        Commands::List { project, file_id } => {
            search::run_list(client, &project, file_id.as_deref()).await?;
        }
        Commands::Stats => {
            stats::run_stats(client).await?;
        }
        Commands::Init | Commands::Detect { .. } => {}
    }

    Ok(())
}
