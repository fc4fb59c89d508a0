//! Server configuration
//!
//! Settings come from three layers, later ones winning:
//! 1. built-in defaults
//! 2. an optional TOML file (`--config`)
//! 3. command-line flags, each of which can also be set through a
//!    `SCORELEDGER_*` environment variable

use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Pretty,
    /// One JSON object per event
    Json,
}

/// Errors while assembling the configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Fully resolved server settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the HTTP listener binds to
    pub bind: SocketAddr,
    /// SQLite ledger database file
    pub database: PathBuf,
    /// Ordered column list artifact
    pub columns: PathBuf,
    /// Column type map artifact
    pub dtypes: PathBuf,
    /// Model artifact
    pub model: PathBuf,
    /// How long a writer waits for another process's lock
    pub busy_timeout_ms: u64,
    /// Maximum accepted request body in bytes
    pub max_body_size: usize,
    pub log_format: LogFormat,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 5000)),
            database: PathBuf::from("predictions.db"),
            columns: PathBuf::from("columns.json"),
            dtypes: PathBuf::from("dtypes.json"),
            model: PathBuf::from("model.json"),
            busy_timeout_ms: 5_000,
            max_body_size: 64 * 1024,
            log_format: LogFormat::Pretty,
        }
    }
}

impl ServerConfig {
    /// Load settings from a TOML file; missing keys keep their defaults
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

/// Scoreledger server
///
/// Scores observations against a pre-trained classifier and records every
/// prediction in a durable ledger.
#[derive(Parser, Debug, Default)]
#[command(name = "scoreledger-server")]
#[command(about = "Scoreledger - score observations and record predictions", long_about = None)]
#[command(version)]
pub struct ServerArgs {
    /// TOML configuration file
    #[arg(short, long, env = "SCORELEDGER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Listen address, e.g. 0.0.0.0:5000
    #[arg(long, env = "SCORELEDGER_BIND")]
    pub bind: Option<SocketAddr>,

    /// Ledger database file
    #[arg(long, env = "SCORELEDGER_DATABASE")]
    pub database: Option<PathBuf>,

    /// Column list artifact (JSON array)
    #[arg(long, env = "SCORELEDGER_COLUMNS")]
    pub columns: Option<PathBuf>,

    /// Column type artifact (JSON object)
    #[arg(long, env = "SCORELEDGER_DTYPES")]
    pub dtypes: Option<PathBuf>,

    /// Model artifact (JSON)
    #[arg(long, env = "SCORELEDGER_MODEL")]
    pub model: Option<PathBuf>,

    /// SQLite busy timeout in milliseconds
    #[arg(long, env = "SCORELEDGER_BUSY_TIMEOUT_MS")]
    pub busy_timeout_ms: Option<u64>,

    /// Maximum request body size in bytes
    #[arg(long, env = "SCORELEDGER_MAX_BODY_SIZE")]
    pub max_body_size: Option<usize>,

    /// Log output format
    #[arg(long, value_enum, env = "SCORELEDGER_LOG_FORMAT")]
    pub log_format: Option<LogFormat>,
}

impl ServerArgs {
    /// Resolve the final configuration
    pub fn into_config(self) -> Result<ServerConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::from_file(path)?,
            None => ServerConfig::default(),
        };

        if let Some(bind) = self.bind {
            config.bind = bind;
        }
        if let Some(database) = self.database {
            config.database = database;
        }
        if let Some(columns) = self.columns {
            config.columns = columns;
        }
        if let Some(dtypes) = self.dtypes {
            config.dtypes = dtypes;
        }
        if let Some(model) = self.model {
            config.model = model;
        }
        if let Some(ms) = self.busy_timeout_ms {
            config.busy_timeout_ms = ms;
        }
        if let Some(size) = self.max_body_size {
            config.max_body_size = size;
        }
        if let Some(format) = self.log_format {
            config.log_format = format;
        }

        Ok(config)
    }
}
