use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use suprss::config::Config;
use suprss::feed::{build_client, spawn_scheduler, RefreshError, Refresher};
use suprss::storage::{Database, DatabaseError, NewFeed};
use suprss::util::{strip_control_chars, validate_url};

/// Get the config directory path (~/.config/suprss/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("suprss"))
}

/// Create the config directory with user-only permissions if missing
fn ensure_config_dir(config_dir: &Path) -> Result<()> {
    if config_dir.exists() {
        return Ok(());
    }
    std::fs::create_dir_all(config_dir).context("Failed to create config directory")?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o700);
        if let Err(e) = std::fs::set_permissions(config_dir, perms) {
            tracing::warn!(
                path = %config_dir.display(),
                error = %e,
                "Failed to set config directory permissions to 0700"
            );
        }
    }
    Ok(())
}

#[derive(Parser, Debug)]
#[command(name = "suprss", about = "Shared RSS aggregator: feed polling and deduplicated ingestion")]
struct Args {
    /// Config file (default: ~/.config/suprss/config.toml)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Database file, overrides `database_path` from the config
    #[arg(long, global = true, value_name = "FILE")]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Manage collections
    #[command(subcommand)]
    Collection(CollectionCommand),

    /// Manage feeds
    #[command(subcommand)]
    Feed(FeedCommand),

    /// Refresh one feed (conditional) or one collection (unconditional)
    Refresh(RefreshTarget),

    /// Refresh every feed once, as the scheduler would
    Sweep,

    /// List stored articles of a feed, newest first
    Articles {
        #[arg(long)]
        feed: i64,
        #[arg(long)]
        limit: Option<i64>,
    },

    /// Run the sweep scheduler until Ctrl-C
    Serve,
}

#[derive(Subcommand, Debug)]
enum CollectionCommand {
    Add {
        name: String,
        /// Owning user ID
        #[arg(long, default_value_t = 1)]
        owner: i64,
    },
    List,
    Remove {
        id: i64,
    },
}

#[derive(Subcommand, Debug)]
enum FeedCommand {
    Add {
        url: String,
        #[arg(long)]
        collection: i64,
        /// Display title (defaults to the URL)
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    List {
        /// Only feeds of this collection
        #[arg(long)]
        collection: Option<i64>,
    },
    Remove {
        id: i64,
    },
}

#[derive(clap::Args, Debug)]
#[group(required = true, multiple = false)]
struct RefreshTarget {
    #[arg(long)]
    feed: Option<i64>,
    #[arg(long)]
    collection: Option<i64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let config_dir = get_config_dir()?;
    let config_path = match &args.config {
        Some(path) => path.clone(),
        None => config_dir.join("config.toml"),
    };
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    let db_path = match args.database.clone().or_else(|| config.database_path.clone()) {
        Some(path) => path,
        None => {
            ensure_config_dir(&config_dir)?;
            config_dir.join("suprss.db")
        }
    };
    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;

    let db = match Database::open(db_path_str).await {
        Ok(db) => db,
        Err(DatabaseError::Locked) => {
            eprintln!("Error: The database is locked by another process. Please retry shortly.");
            std::process::exit(1);
        }
        Err(e) => return Err(anyhow::anyhow!("Failed to open database: {}", e)),
    };

    match args.command {
        Command::Collection(cmd) => run_collection(&new_refresher(db, &config)?, cmd).await,
        Command::Feed(cmd) => run_feed(&new_refresher(db, &config)?, &config, cmd).await,
        Command::Articles { feed, limit } => {
            let articles = db
                .get_articles_for_feed(feed, limit)
                .await
                .context("Failed to load articles")?;
            for article in articles {
                println!(
                    "{}\t{}\t{}",
                    article.id,
                    strip_control_chars(&article.title),
                    article.link
                );
            }
            Ok(())
        }
        Command::Refresh(target) => {
            let refresher = new_refresher(db, &config)?;
            let outcome = if let Some(feed_id) = target.feed {
                refresher.refresh_feed(feed_id).await
            } else if let Some(collection_id) = target.collection {
                refresher.refresh_collection(collection_id).await
            } else {
                anyhow::bail!("Specify --feed or --collection");
            };
            match outcome {
                Ok(outcome) => {
                    println!("{}", serde_json::to_string(&outcome)?);
                    Ok(())
                }
                Err(e @ (RefreshError::FeedNotFound(_) | RefreshError::CollectionNotFound(_))) => {
                    eprintln!("Error: {e}");
                    std::process::exit(2);
                }
                Err(e) => Err(e).context("Refresh failed"),
            }
        }
        Command::Sweep => {
            let refresher = new_refresher(db, &config)?;
            // A fresh process never has a sweep in flight
            if let Some(report) = refresher.sweep().await {
                println!("{}", serde_json::to_string(&report)?);
            }
            Ok(())
        }
        Command::Serve => {
            let refresher = Arc::new(new_refresher(db, &config)?);
            let interval = config.sweep_interval();
            let scheduler = spawn_scheduler(Arc::clone(&refresher), interval);
            match interval {
                Some(period) => println!(
                    "Sweeping every {} minute(s). Press Ctrl-C to stop.",
                    period.as_secs() / 60
                ),
                None => println!("Scheduled sweeps disabled (refresh_interval_minutes = 0)."),
            }

            tokio::signal::ctrl_c()
                .await
                .context("Failed to listen for Ctrl-C")?;
            scheduler.stop().await.context("Scheduler task failed")?;
            println!("Goodbye!");
            Ok(())
        }
    }
}

fn new_refresher(db: Database, config: &Config) -> Result<Refresher> {
    let client = build_client(&config.user_agent).context("Failed to build HTTP client")?;
    Ok(Refresher::new(db, client, config.refresh_settings()))
}

async fn run_collection(refresher: &Refresher, cmd: CollectionCommand) -> Result<()> {
    let db = refresher.database();
    match cmd {
        CollectionCommand::Add { name, owner } => {
            let id = db
                .create_collection(name.trim(), owner)
                .await
                .context("Failed to create collection")?;
            println!("{id}");
        }
        CollectionCommand::List => {
            for collection in db.list_collections().await? {
                println!(
                    "{}\t{}\towner={}",
                    collection.id,
                    strip_control_chars(&collection.name),
                    collection.owner_id
                );
            }
        }
        CollectionCommand::Remove { id } => {
            if !refresher.remove_collection(id).await? {
                anyhow::bail!("Collection {id} not found");
            }
        }
    }
    Ok(())
}

async fn run_feed(refresher: &Refresher, config: &Config, cmd: FeedCommand) -> Result<()> {
    let db = refresher.database();
    match cmd {
        FeedCommand::Add {
            url,
            collection,
            title,
            description,
        } => {
            let url = validate_url(&url, config.host_policy())
                .with_context(|| format!("Rejected feed URL '{}'", url.trim()))?;
            if db.get_collection(collection).await?.is_none() {
                anyhow::bail!("Collection {collection} not found");
            }
            let title = title
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| url.to_string());
            let id = db
                .insert_feed(&NewFeed {
                    collection_id: collection,
                    url: url.to_string(),
                    title,
                    description,
                })
                .await
                .context("Failed to add feed")?;
            println!("{id}");
        }
        FeedCommand::List { collection } => {
            let feeds = match collection {
                Some(id) => db.list_feeds_in_collection(id).await?,
                None => db.list_feeds().await?,
            };
            for feed in feeds {
                let status = feed.error.as_deref().unwrap_or("ok");
                println!(
                    "{}\t{}\t{}\t{}",
                    feed.id,
                    strip_control_chars(&feed.title),
                    feed.url,
                    strip_control_chars(status)
                );
            }
        }
        FeedCommand::Remove { id } => {
            if !refresher.remove_feed(id).await? {
                anyhow::bail!("Feed {id} not found");
            }
        }
    }
    Ok(())
}
