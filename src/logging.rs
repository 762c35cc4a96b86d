//! Logging setup.
//!
//! Configured level names follow the server's settings vocabulary
//! (`debug`, `info`, `warning`, `error`). `RUST_LOG` wins when set.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::Level;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    #[serde(alias = "warn")]
    #[value(alias = "warn")]
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_tracing(self) -> Level {
        match self {
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warning => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }

    /// Directive name understood by `EnvFilter`.
    fn directive(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
        };
        f.write_str(name)
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warning" | "warn" => Ok(LogLevel::Warning),
            "error" => Ok(LogLevel::Error),
            other => Err(format!(
                "unknown log level '{}' (expected debug, info, warning or error)",
                other
            )),
        }
    }
}

/// Filter for this crate and HTTP request spans at `level`.
pub fn default_filter(level: LogLevel) -> EnvFilter {
    let lvl = level.directive();
    EnvFilter::new(format!("{lvl},todo_tracker={lvl},tower_http={lvl}"))
}

/// Install the global subscriber, writing to stderr.
pub fn init_tracing(level: LogLevel) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_level_names() {
        assert_eq!("DEBUG".parse::<LogLevel>().unwrap(), LogLevel::Debug);
        assert_eq!("warn".parse::<LogLevel>().unwrap(), LogLevel::Warning);
        assert_eq!("warning".parse::<LogLevel>().unwrap(), LogLevel::Warning);
        assert!("verbose".parse::<LogLevel>().is_err());
    }

    #[test]
    fn yaml_accepts_warning_and_warn() {
        let lvl: LogLevel = serde_yaml::from_str("warning").unwrap();
        assert_eq!(lvl, LogLevel::Warning);
        let lvl: LogLevel = serde_yaml::from_str("warn").unwrap();
        assert_eq!(lvl, LogLevel::Warning);
    }

    #[test]
    fn display_round_trips_through_from_str() {
        for lvl in [LogLevel::Debug, LogLevel::Info, LogLevel::Warning, LogLevel::Error] {
            assert_eq!(lvl.to_string().parse::<LogLevel>().unwrap(), lvl);
        }
        assert_eq!(LogLevel::Warning.as_tracing(), Level::WARN);
    }
}
