//! CLI command definitions for todo-tracker
//!
//! This module defines the CLI structure using clap's derive macros.
//! The main entry point is the `Cli` struct which contains subcommands.

use crate::config::Config;
use crate::logging::LogLevel;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Personal todo tracker with a JSON REST API
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Database URL or file path (overrides config)
    #[arg(short, long, global = true)]
    pub database: Option<String>,

    /// Data directory for the database and attachments (overrides config)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Address to bind (overrides config)
    #[arg(long, global = true)]
    pub host: Option<String>,

    /// Port to listen on (overrides config)
    #[arg(short, long, global = true)]
    pub port: Option<u16>,

    /// Log level: debug, info, warning or error
    #[arg(long, value_enum, global = true)]
    pub log_level: Option<LogLevel>,

    /// Directory with a built web frontend to serve at `/`
    #[arg(long, global = true)]
    pub frontend_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Start the HTTP server (default if no subcommand given)
    Serve,

    /// Apply database migrations and seed priority levels, then exit
    Migrate,
}

impl Cli {
    /// Subcommand to run, defaulting to `serve`.
    pub fn subcommand(&self) -> Command {
        self.command.unwrap_or(Command::Serve)
    }

    /// Apply flag overrides on top of file and environment configuration.
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(ref dir) = self.data_dir {
            config.storage.data_dir = dir.clone();
        }
        if let Some(ref db) = self.database {
            config.storage.database_url = Some(db.clone());
        }
        if let Some(ref host) = self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(level) = self.log_level {
            config.server.log_level = level;
        }
        if let Some(ref dir) = self.frontend_dir {
            config.server.frontend_dir = Some(dir.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn defaults_to_serve() {
        let cli = Cli::parse_from(["todo-tracker"]);
        assert_eq!(cli.subcommand(), Command::Serve);

        let cli = Cli::parse_from(["todo-tracker", "migrate", "--database", "sqlite::memory:"]);
        assert_eq!(cli.subcommand(), Command::Migrate);
        assert_eq!(cli.database.as_deref(), Some("sqlite::memory:"));
    }

    #[test]
    fn flags_override_config() {
        let cli = Cli::parse_from([
            "todo-tracker",
            "--port",
            "9100",
            "--log-level",
            "warn",
            "--data-dir",
            "/tmp/todo",
        ]);
        let mut config = Config::default();
        cli.apply_overrides(&mut config);

        assert_eq!(config.server.port, 9100);
        assert_eq!(config.server.log_level, LogLevel::Warning);
        assert_eq!(config.storage.data_dir, PathBuf::from("/tmp/todo"));
        assert_eq!(config.server.host, "0.0.0.0");
    }
}
