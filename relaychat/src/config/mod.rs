//! Configuration system for the `RelayChat` client.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/relaychat/config.toml`)
//! 4. Compiled defaults
//!
//! Missing config file is not an error (defaults are used). An explicit
//! `--config` path that doesn't exist is an error.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

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

/// Top-level TOML config file structure.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    network: NetworkFileConfig,
    ui: UiFileConfig,
}

/// `[network]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct NetworkFileConfig {
    server_ip: Option<String>,
    port: Option<u16>,
    username: Option<String>,
}

/// `[ui]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct UiFileConfig {
    render_tick_ms: Option<u64>,
    notice_ms: Option<u64>,
    key_poll_ms: Option<u64>,
}

// ---------------------------------------------------------------------------
// Resolved configuration (concrete types, all fields populated)
// ---------------------------------------------------------------------------

/// Fully resolved client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    // -- Network --
    /// Server address (hostname or IP literal).
    pub server_ip: String,
    /// Server port.
    pub port: u16,
    /// Username, if supplied up front; otherwise the user is prompted.
    pub username: Option<String>,

    // -- UI --
    /// Interval between render ticks.
    pub render_tick: Duration,
    /// How long transient notices stay on screen.
    pub notice_duration: Duration,
    /// Poll timeout of the key reader thread.
    pub key_poll: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_ip: "127.0.0.1".to_string(),
            port: 8080,
            username: None,
            render_tick: Duration::from_millis(16),
            notice_duration: Duration::from_secs(1),
            key_poll: Duration::from_millis(50),
        }
    }
}

impl ClientConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the explicit config file cannot be read
    /// or parsed, or if the default file exists but is malformed.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Ok(Self::resolve(cli, &file))
    }

    /// Priority: CLI > file > default.
    fn resolve(cli: &CliArgs, file: &ConfigFile) -> Self {
        let defaults = Self::default();

        Self {
            server_ip: cli
                .ip
                .clone()
                .or_else(|| file.network.server_ip.clone())
                .unwrap_or(defaults.server_ip),
            port: cli.port.or(file.network.port).unwrap_or(defaults.port),
            username: cli
                .name
                .clone()
                .or_else(|| file.network.username.clone()),
            render_tick: file
                .ui
                .render_tick_ms
                .filter(|&ms| ms > 0)
                .map_or(defaults.render_tick, Duration::from_millis),
            notice_duration: file
                .ui
                .notice_ms
                .map_or(defaults.notice_duration, Duration::from_millis),
            key_poll: file
                .ui
                .key_poll_ms
                .filter(|&ms| ms > 0)
                .map_or(defaults.key_poll, Duration::from_millis),
        }
    }
}

/// CLI arguments parsed by clap.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Terminal chat client for a RelayChat server")]
pub struct CliArgs {
    /// Server port (default: 8080).
    pub port: Option<u16>,

    /// Server address (default: 127.0.0.1).
    pub ip: Option<String>,

    /// Username; prompted for when omitted.
    #[arg(short, long, env = "RELAYCHAT_NAME")]
    pub name: Option<String>,

    /// Path to config file (default: `~/.config/relaychat/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "RELAYCHAT_LOG")]
    pub log_level: String,

    /// Path to log file (default: `$TMPDIR/relaychat.log`).
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

impl CliArgs {
    /// Parse the process arguments, exiting with status 1 on malformed input.
    ///
    /// `--help` and `--version` still exit with status 0.
    #[must_use]
    pub fn parse_or_exit() -> Self {
        match Self::try_parse() {
            Ok(args) => args,
            Err(e) if !e.use_stderr() => e.exit(),
            Err(e) => {
                let _ = e.print();
                std::process::exit(1);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Load and parse a TOML config file.
///
/// If `explicit_path` is `Some`, the file must exist (error if not).
/// If `explicit_path` is `None`, the default path is tried and missing file
/// is treated as empty config.
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
        config_dir.join("relaychat").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
