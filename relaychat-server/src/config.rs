//! Configuration system for the `RelayChat` server.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/relaychat-server/config.toml`)
//! 4. Compiled defaults

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use clap::Parser;

use crate::relay::DEFAULT_PEER_QUEUE_SIZE;

/// Errors that can occur when loading server configuration.
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

/// Top-level TOML config file structure for the server.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ServerConfigFile {
    server: ServerFileConfig,
}

/// `[server]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ServerFileConfig {
    bind_host: Option<String>,
    port: Option<u16>,
    peer_queue_size: Option<usize>,
}

// ---------------------------------------------------------------------------
// CLI arguments
// ---------------------------------------------------------------------------

/// CLI arguments for the relay server.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "RelayChat broadcast relay server")]
pub struct ServerCliArgs {
    /// Port to listen on (default: 8080).
    pub port: Option<u16>,

    /// Host address to bind to (default: 0.0.0.0).
    #[arg(long, env = "RELAYCHAT_BIND")]
    pub bind: Option<String>,

    /// Path to config file (default: `~/.config/relaychat-server/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Outbound messages queued per client before new ones are dropped.
    #[arg(long)]
    pub peer_queue_size: Option<usize>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "RELAYCHAT_LOG")]
    pub log_level: String,
}

impl ServerCliArgs {
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
// Resolved configuration
// ---------------------------------------------------------------------------

/// Fully resolved server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host address to bind to.
    pub bind_host: String,
    /// Port to listen on.
    pub port: u16,
    /// Outbound queue capacity per client.
    pub peer_queue_size: usize,
    /// Log level filter string.
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_host: "0.0.0.0".to_string(),
            port: 8080,
            peer_queue_size: DEFAULT_PEER_QUEUE_SIZE,
            log_level: "info".to_string(),
        }
    }
}

impl ServerConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// If `--config` is given and the file does not exist, returns an error.
    /// If no `--config` is given, the default path is tried and a missing
    /// file is treated as empty config.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the explicit config file cannot be read
    /// or parsed.
    pub fn load(cli: &ServerCliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Ok(Self::resolve(cli, &file))
    }

    /// Resolve a `ServerConfig` from CLI args and a parsed config file.
    ///
    /// Priority: CLI > file > default.
    #[must_use]
    fn resolve(cli: &ServerCliArgs, file: &ServerConfigFile) -> Self {
        let defaults = Self::default();

        Self {
            bind_host: cli
                .bind
                .clone()
                .or_else(|| file.server.bind_host.clone())
                .unwrap_or(defaults.bind_host),
            port: cli.port.or(file.server.port).unwrap_or(defaults.port),
            peer_queue_size: cli
                .peer_queue_size
                .or(file.server.peer_queue_size)
                .unwrap_or(defaults.peer_queue_size),
            log_level: cli.log_level.clone(),
        }
    }

    /// The `host:port` string handed to the listener.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        match self.bind_host.parse::<IpAddr>() {
            Ok(ip) => SocketAddr::new(ip, self.port).to_string(),
            Err(_) => format!("{}:{}", self.bind_host, self.port),
        }
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Load and parse a TOML config file for the server.
fn load_config_file(
    explicit_path: Option<&std::path::Path>,
) -> Result<ServerConfigFile, ConfigError> {
    let path = if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    } else {
        let Some(config_dir) = dirs::config_dir() else {
            return Ok(ServerConfigFile::default());
        };
        config_dir.join("relaychat-server").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ServerConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr(), "0.0.0.0:8080");
        assert_eq!(config.peer_queue_size, DEFAULT_PEER_QUEUE_SIZE);
    }

    #[test]
    fn toml_parsing_full() {
        let toml_str = r#"
[server]
bind_host = "127.0.0.1"
port = 9100
peer_queue_size = 32
"#;
        let file: ServerConfigFile = toml::from_str(toml_str).unwrap();
        let config = ServerConfig::resolve(&ServerCliArgs::default(), &file);

        assert_eq!(config.bind_addr(), "127.0.0.1:9100");
        assert_eq!(config.peer_queue_size, 32);
    }

    #[test]
    fn toml_parsing_empty() {
        let file: ServerConfigFile = toml::from_str("").unwrap();
        let config = ServerConfig::resolve(&ServerCliArgs::default(), &file);
        assert_eq!(config.port, 8080);
        assert_eq!(config.bind_host, "0.0.0.0");
    }

    #[test]
    fn cli_overrides_file() {
        let toml_str = r#"
[server]
port = 9100
peer_queue_size = 32
"#;
        let file: ServerConfigFile = toml::from_str(toml_str).unwrap();
        let cli = ServerCliArgs {
            port: Some(7000),
            ..Default::default()
        };
        let config = ServerConfig::resolve(&cli, &file);

        assert_eq!(config.port, 7000); // from CLI
        assert_eq!(config.peer_queue_size, 32); // from file
    }

    #[test]
    fn ipv6_bind_host_is_bracketed() {
        let config = ServerConfig {
            bind_host: "::1".to_string(),
            ..Default::default()
        };
        assert_eq!(config.bind_addr(), "[::1]:8080");
    }

    #[test]
    fn positional_port_is_parsed() {
        let cli = ServerCliArgs::try_parse_from(["relaychat-server", "9000"]).unwrap();
        assert_eq!(cli.port, Some(9000));
        assert!(ServerCliArgs::try_parse_from(["relaychat-server", "nope"]).is_err());
        assert!(ServerCliArgs::try_parse_from(["relaychat-server", "1", "2"]).is_err());
    }

    #[test]
    fn explicit_missing_config_file_returns_error() {
        let result = load_config_file(Some(std::path::Path::new("/nonexistent/config.toml")));
        assert!(matches!(result, Err(ConfigError::ReadFile { .. })));
    }
}
