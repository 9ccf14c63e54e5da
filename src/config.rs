//! Server configuration.
//!
//! Values come from the command line and an optional TOML file. The command
//! line wins when both set the same field.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use serde::Deserialize;

use crate::error::ConfigError;

pub const DEFAULT_IP: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);
pub const DEFAULT_PORT: u16 = 6400;
pub const DEFAULT_MAX_LINE_LENGTH: usize = 1024 * 1024;

#[derive(Parser, Debug, Default)]
#[command(name = "bridge-server")]
#[command(about = "Line-delimited JSON command bridge", long_about = None)]
pub struct ServerArgs {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address to listen on [default: 0.0.0.0]
    #[arg(short, long)]
    pub ip: Option<IpAddr>,

    /// Port to listen on [default: 6400]
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Longest accepted frame in bytes, excluding the newline
    #[arg(long)]
    pub max_line_length: Option<usize>,

    /// Close connections that send nothing for this many seconds (0 = never)
    #[arg(long, value_name = "SECS")]
    pub idle_timeout: Option<u64>,

    /// Log to a daily rolling file under logs/ instead of stdout
    #[arg(long)]
    pub log_file: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub ip: IpAddr,
    pub port: u16,
    pub max_line_length: usize,
    pub idle_timeout_secs: Option<u64>,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            ip: DEFAULT_IP,
            port: DEFAULT_PORT,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            idle_timeout_secs: None,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct LoggingSection {
    pub file: Option<String>,
}

/// Resolved configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub addr: SocketAddr,
    pub max_line_length: usize,
    pub idle_timeout: Option<Duration>,
    pub log_file: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self::merge(ServerArgs::default(), TomlConfig::default())
    }
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_args(ServerArgs::parse())
    }

    pub fn from_args(args: ServerArgs) -> Result<Self, ConfigError> {
        let file = match &args.config {
            Some(path) => read_toml(path)?,
            None => TomlConfig::default(),
        };
        Ok(Self::merge(args, file))
    }

    pub fn merge(args: ServerArgs, file: TomlConfig) -> Self {
        let ip = args.ip.unwrap_or(file.server.ip);
        let port = args.port.unwrap_or(file.server.port);
        let idle_timeout = args
            .idle_timeout
            .or(file.server.idle_timeout_secs)
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);
        Self {
            addr: SocketAddr::new(ip, port),
            max_line_length: args.max_line_length.unwrap_or(file.server.max_line_length),
            idle_timeout,
            log_file: args.log_file.or(file.logging.file),
        }
    }
}

fn read_toml(path: &Path) -> Result<TomlConfig, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
        path: path.to_owned(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::TomlParse {
        path: path.to_owned(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.addr, "0.0.0.0:6400".parse().unwrap());
        assert_eq!(config.max_line_length, DEFAULT_MAX_LINE_LENGTH);
        assert_eq!(config.idle_timeout, None);
        assert_eq!(config.log_file, None);
    }

    #[test]
    fn toml_parsing() {
        let toml_str = r#"
            [server]
            ip = "127.0.0.1"
            port = 7000
            idle_timeout_secs = 30

            [logging]
            file = "bridge.log"
        "#;

        let file: TomlConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(file.server.port, 7000);
        assert_eq!(file.server.max_line_length, DEFAULT_MAX_LINE_LENGTH);

        let config = Config::merge(ServerArgs::default(), file);
        assert_eq!(config.addr, "127.0.0.1:7000".parse().unwrap());
        assert_eq!(config.idle_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.log_file.as_deref(), Some("bridge.log"));
    }

    #[test]
    fn cli_overrides_file() {
        let args = ServerArgs::try_parse_from([
            "bridge-server",
            "-p",
            "6500",
            "--idle-timeout",
            "0",
            "--max-line-length",
            "64",
        ])
        .unwrap();
        let file: TomlConfig = toml::from_str("[server]\nport = 7000\nidle_timeout_secs = 5\nip = \"10.0.0.1\"").unwrap();

        let config = Config::merge(args, file);
        assert_eq!(config.addr, "10.0.0.1:6500".parse().unwrap());
        assert_eq!(config.max_line_length, 64);
        // zero disables the timeout even when the file sets one
        assert_eq!(config.idle_timeout, None);
    }

    #[test]
    fn missing_file_is_reported() {
        let args = ServerArgs {
            config: Some(PathBuf::from("/definitely/not/here.toml")),
            ..ServerArgs::default()
        };
        let err = Config::from_args(args).unwrap_err();
        assert!(matches!(err, ConfigError::FileRead { .. }));
        assert!(err.to_string().contains("/definitely/not/here.toml"));
    }

    #[test]
    fn bad_toml_is_reported() {
        let path = std::env::temp_dir().join(format!("bridge-bad-{}.toml", std::process::id()));
        std::fs::write(&path, "[server]\nport = \"not a number\"").unwrap();
        let err = Config::from_args(ServerArgs {
            config: Some(path.clone()),
            ..ServerArgs::default()
        })
        .unwrap_err();
        let _ = std::fs::remove_file(&path);
        assert!(matches!(err, ConfigError::TomlParse { .. }));
    }
}
