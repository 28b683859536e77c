//! Configuration for the `klyra` client.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/klyra/config.toml`)
//! 4. Compiled defaults
//!
//! Missing config file is not an error (defaults are used). An explicit
//! `--config` path that doesn't exist is an error.

use std::path::PathBuf;
use std::time::Duration;

use crate::sync::{ReorderPolicy, SyncConfig};

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    store: StoreFileConfig,
    sync: SyncFileConfig,
    board: BoardFileConfig,
}

/// `[store]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct StoreFileConfig {
    url: Option<String>,
    connect_timeout_secs: Option<u64>,
    request_timeout_ms: Option<u64>,
}

/// `[sync]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct SyncFileConfig {
    retries: Option<u32>,
    retry_delay_ms: Option<u64>,
    commit_timeout_ms: Option<u64>,
    reorder_policy: Option<ReorderPolicy>,
}

/// `[board]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct BoardFileConfig {
    actor: Option<String>,
    event_buffer: Option<usize>,
}

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

/// Fully resolved client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Board store WebSocket URL.
    pub store_url: String,
    /// Timeout for opening the store connection.
    pub connect_timeout: Duration,
    /// Timeout for a single store request.
    pub request_timeout: Duration,
    /// Commit retry, timeout, and write policy.
    pub sync: SyncConfig,
    /// Name recorded as `performed_by` in the activity log.
    pub actor: String,
    /// Buffer size for the controller's event channel.
    pub event_buffer: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            store_url: "ws://127.0.0.1:9400/ws".to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(2),
            sync: SyncConfig::default(),
            actor: "anonymous".to_string(),
            event_buffer: 64,
        }
    }
}

impl ClientConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the explicit config file cannot be read,
    /// or any config file cannot be parsed.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Ok(Self::resolve(cli, &file))
    }

    /// Priority: CLI > file > default.
    fn resolve(cli: &CliArgs, file: &ConfigFile) -> Self {
        let defaults = Self::default();
        let sync_defaults = defaults.sync.clone();

        Self {
            store_url: cli
                .store_url
                .clone()
                .or_else(|| file.store.url.clone())
                .unwrap_or(defaults.store_url),
            connect_timeout: file
                .store
                .connect_timeout_secs
                .map_or(defaults.connect_timeout, Duration::from_secs),
            request_timeout: file
                .store
                .request_timeout_ms
                .map_or(defaults.request_timeout, Duration::from_millis),
            sync: SyncConfig {
                retries: file.sync.retries.unwrap_or(sync_defaults.retries),
                retry_delay: file
                    .sync
                    .retry_delay_ms
                    .map_or(sync_defaults.retry_delay, Duration::from_millis),
                commit_timeout: file
                    .sync
                    .commit_timeout_ms
                    .map_or(sync_defaults.commit_timeout, Duration::from_millis),
                reorder_policy: cli
                    .reorder_policy
                    .or(file.sync.reorder_policy)
                    .unwrap_or(sync_defaults.reorder_policy),
            },
            actor: cli
                .actor
                .clone()
                .or_else(|| file.board.actor.clone())
                .unwrap_or(defaults.actor),
            event_buffer: file.board.event_buffer.unwrap_or(defaults.event_buffer),
        }
    }
}

/// CLI arguments parsed by clap.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Project board client")]
pub struct CliArgs {
    /// WebSocket URL of the board store.
    #[arg(long, env = "KLYRA_STORE_URL")]
    pub store_url: Option<String>,

    /// Name recorded in the activity log for your moves.
    #[arg(long, env = "KLYRA_ACTOR")]
    pub actor: Option<String>,

    /// Path to config file (default: `~/.config/klyra/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Which rows a move writes.
    #[arg(long, value_enum)]
    pub reorder_policy: Option<ReorderPolicy>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "warn", env = "KLYRA_LOG")]
    pub log_level: String,

    /// Write logs to this file instead of stderr.
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// What to do.
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Client subcommands.
#[derive(clap::Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Print a board.
    Show {
        /// Project whose board to print (team view).
        #[arg(required_unless_present = "access_link")]
        project: Option<String>,

        /// Shareable access link to print instead (client view).
        #[arg(long, conflicts_with = "project")]
        access_link: Option<String>,

        /// Only list tasks whose title or description contains this text.
        #[arg(long)]
        search: Option<String>,
    },
    /// Move a task to a position in a column.
    Move {
        /// Project owning the board.
        project: String,
        /// Task to move.
        task: String,
        /// Destination column.
        column: String,
        /// Destination index; past the end appends.
        index: usize,
    },
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn load_config_file(explicit_path: Option<&std::path::Path>) -> Result<ConfigFile, ConfigError> {
    let path = if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    } else {
        let Some(config_dir) = dirs::config_dir() else {
            return Ok(ConfigFile::default());
        };
        config_dir.join("klyra").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
