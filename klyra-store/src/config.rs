//! Configuration for the store server.
//!
//! Priority (highest first): CLI arguments, environment variables,
//! `~/.config/klyra-store/config.toml`, compiled defaults.

use std::path::PathBuf;

/// Errors that can occur when loading store configuration.
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

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct StoreConfigFile {
    server: ServerFileConfig,
}

/// `[server]` section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ServerFileConfig {
    bind_addr: Option<String>,
    seed_file: Option<PathBuf>,
    max_frame_size: Option<usize>,
}

/// CLI arguments for the store server.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Klyra board store server")]
pub struct StoreCliArgs {
    /// Address to bind the server to.
    #[arg(short, long, env = "KLYRA_STORE_ADDR")]
    pub bind: Option<String>,

    /// TOML file with the projects to load at startup.
    #[arg(short, long)]
    pub seed: Option<PathBuf>,

    /// Path to config file (default: `~/.config/klyra-store/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Maximum request frame size in bytes.
    #[arg(long)]
    pub max_frame_size: Option<usize>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "KLYRA_STORE_LOG")]
    pub log_level: String,
}

/// Fully resolved store server configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Address to bind the server to.
    pub bind_addr: String,
    /// Seed file loaded at startup, if any.
    pub seed_file: Option<PathBuf>,
    /// Maximum accepted request frame size in bytes.
    pub max_frame_size: usize,
    /// Log level filter string.
    pub log_level: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:9400".to_string(),
            seed_file: None,
            max_frame_size: 256 * 1024,
            log_level: "info".to_string(),
        }
    }
}

impl StoreConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// A missing default config file is treated as empty; a missing
    /// explicit `--config` file is an error.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the config file cannot be read or parsed.
    pub fn load(cli: &StoreCliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Ok(Self::resolve(cli, &file))
    }

    fn resolve(cli: &StoreCliArgs, file: &StoreConfigFile) -> Self {
        let defaults = Self::default();

        Self {
            bind_addr: cli
                .bind
                .clone()
                .or_else(|| file.server.bind_addr.clone())
                .unwrap_or(defaults.bind_addr),
            seed_file: cli.seed.clone().or_else(|| file.server.seed_file.clone()),
            max_frame_size: cli
                .max_frame_size
                .or(file.server.max_frame_size)
                .unwrap_or(defaults.max_frame_size),
            log_level: cli.log_level.clone(),
        }
    }
}

fn load_config_file(
    explicit_path: Option<&std::path::Path>,
) -> Result<StoreConfigFile, ConfigError> {
    let path = if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    } else {
        let Some(config_dir) = dirs::config_dir() else {
            return Ok(StoreConfigFile::default());
        };
        config_dir.join("klyra-store").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(StoreConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
