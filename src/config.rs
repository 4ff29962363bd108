//! Configuration module for the ASTM listener.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;

/// Command-line arguments for the listener
#[derive(Parser, Debug)]
#[command(name = "astm-listener")]
#[command(author = "astm-listener authors")]
#[command(version = "0.1.0")]
#[command(about = "A diagnostic ASTM E1381/E1394 receiver", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Host to bind to (e.g., localhost, 0.0.0.0)
    #[arg(short = 'H', long)]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Maximum number of concurrent instrument connections
    #[arg(short = 'm', long)]
    pub max_connections: Option<usize>,

    /// Number of worker threads (defaults to number of CPU cores)
    #[arg(short = 'w', long)]
    pub workers: Option<usize>,

    /// Log level (trace, debug, info, warn, error) [default: info]
    #[arg(long)]
    pub log_level: Option<String>,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Number of worker threads
    pub workers: Option<usize>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_connections: default_max_connections(),
            workers: None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_max_connections() -> usize {
    1024
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub max_connections: usize,
    pub workers: Option<usize>,
    pub log_level: String,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    /// CLI arguments take precedence over TOML file values.
    pub fn load() -> Result<Self, ConfigError> {
        let cli = CliArgs::parse();

        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        Ok(Self::merge(cli, toml_config))
    }

    /// Merge CLI args over TOML values.
    fn merge(cli: CliArgs, toml_config: TomlConfig) -> Self {
        Config {
            host: cli.host.unwrap_or(toml_config.server.host),
            port: cli.port.unwrap_or(toml_config.server.port),
            max_connections: cli
                .max_connections
                .unwrap_or(toml_config.server.max_connections)
                .max(1),
            workers: cli.workers.or(toml_config.server.workers),
            log_level: cli.log_level.unwrap_or(toml_config.logging.level),
        }
    }

    /// `host:port` as handed to the resolver.
    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            host: default_host(),
            port: default_port(),
            max_connections: default_max_connections(),
            workers: None,
            log_level: default_log_level(),
        }
    }
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
    FileRead(PathBuf, std::io::Error),
    TomlParse(PathBuf, toml::de::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::FileRead(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::TomlParse(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TomlConfig::default();
        assert_eq!(config.server.host, "localhost");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.max_connections, 1024);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_toml_parsing() {
        let toml_str = r#"
            [server]
            host = "0.0.0.0"
            port = 4000
            max_connections = 8
            workers = 2

            [logging]
            level = "debug"
        "#;

        let config: TomlConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 4000);
        assert_eq!(config.server.max_connections, 8);
        assert_eq!(config.server.workers, Some(2));
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: TomlConfig = toml::from_str("[server]\nport = 5000\n").unwrap();
        assert_eq!(config.server.host, "localhost");
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_cli_overrides_file() {
        let cli = CliArgs::parse_from(["astm-listener", "--port", "3100", "--log-level", "trace"]);
        let file: TomlConfig =
            toml::from_str("[server]\nhost = \"10.0.0.5\"\nport = 4000\n").unwrap();

        let config = Config::merge(cli, file);
        assert_eq!(config.host, "10.0.0.5");
        assert_eq!(config.port, 3100);
        assert_eq!(config.log_level, "trace");
        assert_eq!(config.listen_address(), "10.0.0.5:3100");
    }

    #[test]
    fn test_explicit_cli_info_overrides_file_level() {
        let cli = CliArgs::parse_from(["astm-listener", "--log-level", "info"]);
        let file: TomlConfig = toml::from_str("[logging]\nlevel = \"debug\"\n").unwrap();

        let config = Config::merge(cli, file);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_file_level_used_without_cli_flag() {
        let cli = CliArgs::parse_from(["astm-listener"]);
        let file: TomlConfig = toml::from_str("[logging]\nlevel = \"debug\"\n").unwrap();
        assert_eq!(Config::merge(cli, file).log_level, "debug");

        let cli = CliArgs::parse_from(["astm-listener"]);
        assert_eq!(Config::merge(cli, TomlConfig::default()).log_level, "info");
    }

    #[test]
    fn test_zero_max_connections_clamped() {
        let cli = CliArgs::parse_from(["astm-listener", "-m", "0"]);
        let config = Config::merge(cli, TomlConfig::default());
        assert_eq!(config.max_connections, 1);
    }
}
