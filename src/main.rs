//! Todo Tracker
//!
//! Personal task tracker with nested subtasks, categories, tags, priority
//! levels and file attachments, served as a JSON REST API.

use anyhow::{Context, Result};
use clap::Parser;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use todo_tracker::api::{self, AppState};
use todo_tracker::cli::{Cli, Command};
use todo_tracker::config::{Config, DatabaseLocation};
use todo_tracker::db::Database;
use todo_tracker::files::FileStore;
use todo_tracker::logging::init_tracing;
use tracing::{info, warn};

fn open_database(config: &Config) -> Result<Database> {
    let db = match config.database_location() {
        DatabaseLocation::Memory => {
            warn!("using an in-memory database; data is lost on exit");
            Database::open_in_memory()?
        }
        DatabaseLocation::File(path) => {
            info!("Opening database at {}", path.display());
            Database::open(&path)
                .with_context(|| format!("failed to open database {}", path.display()))?
        }
    };
    Ok(db.with_max_subtask_depth(config.todos.max_subtask_depth))
}

fn bind_addr(config: &Config) -> Result<SocketAddr> {
    let ip: IpAddr = config
        .server
        .host
        .parse()
        .with_context(|| format!("invalid host address '{}'", config.server.host))?;
    Ok(SocketAddr::new(ip, config.server.port))
}

async fn run_server(config: Config) -> Result<()> {
    let db = Arc::new(open_database(&config)?);
    let attachments_dir = config.attachments_dir();
    info!("Storing attachments in {}", attachments_dir.display());

    let state = AppState::new(db, FileStore::new(attachments_dir), config.upload_policy())
        .with_api_key(config.api_key());
    if state.api_key.is_some() {
        info!("API key authentication enabled");
    }

    let router = api::build_router_with_frontend(state, config.server.frontend_dir.as_deref());
    api::serve(router, bind_addr(&config)?).await
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (mut config, config_path) = Config::discover(cli.config.as_deref())?;
    let ignored_env = config.apply_env_overrides();
    cli.apply_overrides(&mut config);

    init_tracing(config.server.log_level)?;
    for message in ignored_env {
        warn!("{}", message);
    }

    match config_path {
        Some(path) => info!("Loaded config from {}", path.display()),
        None => info!("No config file found, using defaults"),
    }

    config.ensure_dirs()?;

    match cli.subcommand() {
        Command::Serve => run_server(config).await,
        Command::Migrate => {
            let db = open_database(&config)?;
            let levels = db.list_priorities()?;
            info!(
                todos = db.count_todos()?,
                priority_levels = levels.len(),
                "Database is up to date"
            );
            Ok(())
        }
    }
}
