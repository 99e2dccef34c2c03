use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use newsline::api::{self, ApiError, ListQuery};
use newsline::config::Config;
use newsline::pipeline::IngestionPipeline;
use newsline::scheduler::Scheduler;
use newsline::storage::Database;

/// Get the config directory path (~/.config/newsline/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("newsline"))
}

#[derive(Parser, Debug)]
#[command(
    name = "newsline",
    about = "Aggregate NewsAPI, Guardian and NYT articles into a local store"
)]
struct Args {
    /// Config file (default: ~/.config/newsline/config.toml)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// SQLite database file (overrides database_path in the config)
    #[arg(long, value_name = "FILE", global = true)]
    db: Option<PathBuf>,

    /// Reset database (delete and recreate)
    #[arg(long, global = true)]
    reset_db: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one ingestion cycle now
    Fetch,
    /// Run ingestion on the configured interval until Ctrl-C
    Schedule,
    /// List stored articles, newest first
    Articles {
        #[arg(long)]
        keyword: Option<String>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        source: Option<String>,
        /// Publication day, YYYY-MM-DD
        #[arg(long)]
        date: Option<String>,
        #[arg(long)]
        page: Option<u32>,
    },
    /// Show one article by id
    Show { id: i64 },
    /// Store a user's feed preferences
    Prefs {
        #[arg(long)]
        user: i64,
        #[arg(long, value_delimiter = ',')]
        sources: Vec<String>,
        #[arg(long, value_delimiter = ',')]
        categories: Vec<String>,
        #[arg(long, value_delimiter = ',')]
        authors: Vec<String>,
    },
    /// Personalized feed for a user
    Feed {
        #[arg(long)]
        user: i64,
        #[arg(long)]
        page: Option<u32>,
    },
}

fn print_json(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Exit status for a client-side API error: 4 for not found, 2 otherwise.
fn api_exit_status(error: &ApiError) -> u8 {
    if error.status() == 404 {
        4
    } else {
        2
    }
}

/// Print an API result, mapping errors to their response body and exit code.
fn print_api<T: Serialize>(result: Result<T, ApiError>) -> Result<u8> {
    match result {
        Ok(value) => {
            print_json(&value)?;
            Ok(0)
        }
        Err(ApiError::Database(e)) => Err(anyhow::Error::new(e).context("Query failed")),
        Err(e) => {
            eprintln!("{}", serde_json::to_string_pretty(&e.body())?);
            Ok(api_exit_status(&e))
        }
    }
}

/// Delete the database file and its WAL sidecars.
fn reset_database(db_path: &Path) -> Result<()> {
    for suffix in ["", "-wal", "-shm"] {
        let mut name = db_path.as_os_str().to_owned();
        name.push(suffix);
        let path = PathBuf::from(name);
        if path.exists() {
            std::fs::remove_file(&path)
                .with_context(|| format!("Failed to delete {}", path.display()))?;
        }
    }
    println!("Database reset.");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Initialize tracing; RUST_LOG overrides the info default
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_dir = get_config_dir()?;
    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;
        tracing::info!(path = %config_dir.display(), "Created config directory");
    }

    // User-only access; the directory may hold API keys
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) =
            std::fs::set_permissions(&config_dir, std::fs::Permissions::from_mode(0o700))
        {
            tracing::warn!(
                path = %config_dir.display(),
                error = %e,
                "Failed to set config directory permissions to 0700"
            );
        }
    }

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let mut config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
    config.apply_env();

    let db_path = args
        .db
        .clone()
        .or_else(|| config.database_path.clone())
        .unwrap_or_else(|| config_dir.join("news.db"));

    if args.reset_db {
        reset_database(&db_path)?;
    }

    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;
    let db = Database::open(db_path_str)
        .await
        .with_context(|| format!("Failed to open database at {}", db_path.display()))?;

    // Close before exiting so the WAL is checkpointed on every path
    let outcome = run_command(args.command, db.clone(), &config).await;
    db.close().await;
    outcome.map(ExitCode::from)
}

async fn run_command(command: Command, db: Database, config: &Config) -> Result<u8> {
    let code = match command {
        Command::Fetch => {
            let pipeline = IngestionPipeline::from_config(db, config)
                .context("Failed to build HTTP client")?;
            let result = pipeline.run().await?;
            for outcome in &result.outcomes {
                match &outcome.error {
                    Some(error) => println!("{:<9} failed: {}", outcome.provider, error),
                    None => println!(
                        "{:<9} {} stored, {} discarded",
                        outcome.provider, outcome.persisted, outcome.discarded
                    ),
                }
            }
            println!("Total: {}", result.total_persisted());
            0
        }
        Command::Schedule => {
            let pipeline = IngestionPipeline::from_config(db, config)
                .context("Failed to build HTTP client")?;
            let scheduler = Scheduler::new(Arc::new(pipeline));
            let shutdown = async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!(error = %e, "Failed to listen for Ctrl-C");
                    std::future::pending::<()>().await;
                }
            };
            let runs = scheduler.run_every(config.fetch_interval(), shutdown).await;
            println!("Stopped after {runs} runs.");
            0
        }
        Command::Articles {
            keyword,
            category,
            source,
            date,
            page,
        } => {
            let query = ListQuery {
                keyword,
                category,
                source,
                date,
                page,
            };
            print_api(api::list_articles(&db, &query).await)?
        }
        Command::Show { id } => print_api(api::show_article(&db, id).await)?,
        Command::Prefs {
            user,
            sources,
            categories,
            authors,
        } => {
            let payload = serde_json::json!({
                "sources": sources,
                "categories": categories,
                "authors": authors,
            });
            print_api(api::store_preferences(&db, user, &payload).await)?
        }
        Command::Feed { user, page } => {
            print_api(api::personalized_feed(&db, user, page).await)?
        }
    };
    Ok(code)
}
