//! Configuration loading and management.
//!
//! Layers, lowest to highest: built-in defaults, a YAML file, `TODOTRACKER_*`
//! environment variables, then command-line flags (applied by the binary).

use crate::files::{DEFAULT_ALLOWED_EXTENSIONS, DEFAULT_MAX_UPLOAD_BYTES, UploadPolicy};
use crate::logging::LogLevel;
use crate::types::DEFAULT_MAX_SUBTASK_DEPTH;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Prefix shared by every environment override.
pub const ENV_PREFIX: &str = "TODOTRACKER_";

/// Project-local config file, relative to the working directory.
pub const LOCAL_CONFIG_FILE: &str = "todotracker.yaml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub uploads: UploadsConfig,

    #[serde(default)]
    pub todos: TodosConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub log_level: LogLevel,

    /// When set, every `/api` request must present this key.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Directory with a built single-page frontend to serve at `/`.
    #[serde(default)]
    pub frontend_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: LogLevel::default(),
            api_key: None,
            frontend_dir: None,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// `sqlite://<path>`, `sqlite::memory:` or a bare file path.
    #[serde(default)]
    pub database_url: Option<String>,

    #[serde(default)]
    pub attachments_dir: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            database_url: None,
            attachments_dir: None,
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadsConfig {
    #[serde(default = "default_max_upload")]
    pub max_upload_size_bytes: u64,

    /// Empty list accepts any extension.
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,
}

impl Default for UploadsConfig {
    fn default() -> Self {
        Self {
            max_upload_size_bytes: default_max_upload(),
            allowed_extensions: default_allowed_extensions(),
        }
    }
}

fn default_max_upload() -> u64 {
    DEFAULT_MAX_UPLOAD_BYTES
}

fn default_allowed_extensions() -> Vec<String> {
    DEFAULT_ALLOWED_EXTENSIONS
        .iter()
        .map(|e| e.to_string())
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TodosConfig {
    /// Deepest allowed subtask level. 0 = unlimited.
    #[serde(default = "default_max_subtask_depth")]
    pub max_subtask_depth: usize,
}

impl Default for TodosConfig {
    fn default() -> Self {
        Self {
            max_subtask_depth: default_max_subtask_depth(),
        }
    }
}

fn default_max_subtask_depth() -> usize {
    DEFAULT_MAX_SUBTASK_DEPTH
}

/// Where the SQLite database lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseLocation {
    Memory,
    File(PathBuf),
}

impl DatabaseLocation {
    /// Parse a database URL. Driver suffixes such as `sqlite+aiosqlite` are accepted.
    pub fn parse(url: &str) -> Self {
        let url = url.trim();
        if url == "sqlite::memory:" || url == ":memory:" {
            return DatabaseLocation::Memory;
        }
        let path = match url.split_once("://") {
            Some((scheme, rest)) if scheme.starts_with("sqlite") => {
                // sqlite:///relative and sqlite:////absolute
                rest.strip_prefix('/').unwrap_or(rest)
            }
            _ => url,
        };
        if path == ":memory:" {
            DatabaseLocation::Memory
        } else {
            DatabaseLocation::File(PathBuf::from(path))
        }
    }
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("invalid config file {}", path.display()))?;
        Ok(config)
    }

    /// Candidate config files in lookup order.
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(LOCAL_CONFIG_FILE)];
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".todotracker").join("config.yaml"));
        }
        paths
    }

    /// Load from `explicit` (which must exist), else the first config file
    /// found on the search path, else defaults. Returns the file used.
    pub fn discover(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>)> {
        if let Some(path) = explicit {
            return Ok((Self::load(path)?, Some(path.to_path_buf())));
        }

        for path in Self::search_paths() {
            if path.is_file() {
                let config = Self::load(&path)?;
                return Ok((config, Some(path)));
            }
        }

        Ok((Self::default(), None))
    }

    /// Apply `TODOTRACKER_*` variables from the process environment.
    ///
    /// Returns a message for every variable that was set but could not be
    /// parsed; those variables are skipped.
    pub fn apply_env_overrides(&mut self) -> Vec<String> {
        self.apply_env_overrides_from(|name| std::env::var(name).ok())
    }

    /// Apply overrides using `lookup` to read variables.
    pub fn apply_env_overrides_from<F>(&mut self, lookup: F) -> Vec<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut ignored = Vec::new();
        let var = |suffix: &str| {
            lookup(&format!("{}{}", ENV_PREFIX, suffix)).filter(|v| !v.trim().is_empty())
        };
        let invalid = |suffix: &str, value: &str| {
            format!("ignoring invalid {}{}='{}'", ENV_PREFIX, suffix, value)
        };

        if let Some(v) = var("DATA_DIR") {
            self.storage.data_dir = PathBuf::from(v);
        }
        if let Some(v) = var("DATABASE_URL") {
            self.storage.database_url = Some(v);
        }
        if let Some(v) = var("ATTACHMENTS_DIR") {
            self.storage.attachments_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = var("API_HOST") {
            self.server.host = v;
        }
        if let Some(v) = var("API_PORT") {
            match v.trim().parse() {
                Ok(port) => self.server.port = port,
                Err(_) => ignored.push(invalid("API_PORT", &v)),
            }
        }
        if let Some(v) = var("LOG_LEVEL") {
            match v.parse::<LogLevel>() {
                Ok(level) => self.server.log_level = level,
                Err(_) => ignored.push(invalid("LOG_LEVEL", &v)),
            }
        }
        if let Some(v) = var("API_KEY") {
            self.server.api_key = Some(v);
        }
        if let Some(v) = var("FRONTEND_DIR") {
            self.server.frontend_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = var("MAX_UPLOAD_SIZE_BYTES") {
            match v.trim().parse() {
                Ok(bytes) => self.uploads.max_upload_size_bytes = bytes,
                Err(_) => ignored.push(invalid("MAX_UPLOAD_SIZE_BYTES", &v)),
            }
        }
        if let Some(v) = var("MAX_SUBTASK_DEPTH") {
            match v.trim().parse() {
                Ok(depth) => self.todos.max_subtask_depth = depth,
                Err(_) => ignored.push(invalid("MAX_SUBTASK_DEPTH", &v)),
            }
        }

        ignored
    }

    pub fn database_location(&self) -> DatabaseLocation {
        match self.storage.database_url.as_deref() {
            Some(url) => DatabaseLocation::parse(url),
            None => DatabaseLocation::File(self.storage.data_dir.join("todotracker.db")),
        }
    }

    pub fn attachments_dir(&self) -> PathBuf {
        self.storage
            .attachments_dir
            .clone()
            .unwrap_or_else(|| self.storage.data_dir.join("attachments"))
    }

    pub fn upload_policy(&self) -> UploadPolicy {
        UploadPolicy::new(
            self.uploads.max_upload_size_bytes,
            self.uploads.allowed_extensions.iter().cloned(),
        )
    }

    /// Configured API key, treating an empty string as unset.
    pub fn api_key(&self) -> Option<&str> {
        self.server
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }

    /// Create the data, attachment and database directories.
    pub fn ensure_dirs(&self) -> Result<()> {
        let mut dirs = vec![self.storage.data_dir.clone(), self.attachments_dir()];
        if let DatabaseLocation::File(path) = self.database_location() {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                dirs.push(parent.to_path_buf());
            }
        }
        for dir in dirs {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("failed to create directory {}", dir.display()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.uploads.max_upload_size_bytes, 10 * 1024 * 1024);
        assert!(config.uploads.allowed_extensions.contains(&".pdf".to_string()));
        assert_eq!(config.todos.max_subtask_depth, 5);
        assert_eq!(
            config.database_location(),
            DatabaseLocation::File(PathBuf::from("data/todotracker.db"))
        );
        assert_eq!(config.attachments_dir(), PathBuf::from("data/attachments"));
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let config: Config = serde_yaml::from_str(
            "server:\n  port: 9000\n  log_level: warning\ntodos:\n  max_subtask_depth: 3\n",
        )
        .unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.log_level, LogLevel::Warning);
        assert_eq!(config.todos.max_subtask_depth, 3);
        assert_eq!(config.storage.data_dir, PathBuf::from("data"));
    }

    #[test]
    fn env_overrides_apply_and_invalid_values_are_ignored() {
        let mut config = Config::default();
        let ignored = config.apply_env_overrides_from(env(&[
            ("TODOTRACKER_API_PORT", "not-a-port"),
            ("TODOTRACKER_API_HOST", "127.0.0.1"),
            ("TODOTRACKER_DATA_DIR", "/srv/todo"),
            ("TODOTRACKER_API_KEY", "secret"),
            ("TODOTRACKER_MAX_SUBTASK_DEPTH", "4"),
            ("TODOTRACKER_LOG_LEVEL", "loud"),
        ]));

        assert_eq!(ignored.len(), 2);
        assert!(ignored[0].contains("TODOTRACKER_API_PORT"));
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.log_level, LogLevel::Info);
        assert_eq!(config.api_key(), Some("secret"));
        assert_eq!(config.todos.max_subtask_depth, 4);
        assert_eq!(config.attachments_dir(), PathBuf::from("/srv/todo/attachments"));
    }

    #[test]
    fn database_urls() {
        assert_eq!(DatabaseLocation::parse("sqlite::memory:"), DatabaseLocation::Memory);
        assert_eq!(
            DatabaseLocation::parse("sqlite:///data/todo.db"),
            DatabaseLocation::File(PathBuf::from("data/todo.db"))
        );
        assert_eq!(
            DatabaseLocation::parse("sqlite+aiosqlite:////var/lib/todo.db"),
            DatabaseLocation::File(PathBuf::from("/var/lib/todo.db"))
        );
        assert_eq!(
            DatabaseLocation::parse("todo.db"),
            DatabaseLocation::File(PathBuf::from("todo.db"))
        );
    }

    #[test]
    fn blank_api_key_disables_guard() {
        let mut config = Config::default();
        config.server.api_key = Some("  ".into());
        assert_eq!(config.api_key(), None);
    }

    #[test]
    fn ensure_dirs_creates_layout() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.storage.data_dir = dir.path().join("data");
        config.ensure_dirs().unwrap();

        assert!(dir.path().join("data").is_dir());
        assert!(dir.path().join("data/attachments").is_dir());
    }

    #[test]
    fn discover_reads_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.yaml");
        std::fs::write(&path, "server:\n  port: 8123\n").unwrap();

        let (config, used) = Config::discover(Some(&path)).unwrap();
        assert_eq!(config.server.port, 8123);
        assert_eq!(used.as_deref(), Some(path.as_path()));

        assert!(Config::discover(Some(&dir.path().join("missing.yaml"))).is_err());
    }
}
