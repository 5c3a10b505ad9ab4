//! # Configuration
//!
//! Compile-time protocol constants plus the runtime configuration file.
//!
//! The protocol constants must match on both ends of a link: a sender built with a
//! different [`BUTTON_COUNT`] or [`DISPATCH`] produces packets the receiver discards.
//! Everything that only concerns one side (addresses, the event source, logging)
//! lives in [`Config`] and is read from `<config_dir>/udp-joystick/config.toml`.

use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn, Level};

/// Protocol tag written as the first field of every packet
pub const DISPATCH: i32 = 42;

/// Number of button slots in a snapshot
pub const BUTTON_COUNT: usize = 12;

/// Number of analog axes in a snapshot
pub const AXIS_COUNT: usize = 6;

/// Upper bound for one encoded packet, in bytes
pub const MAX_LINE_LEN: usize = 1024;

pub const DEFAULT_PORT: u16 = 5001;
pub const DEFAULT_SERVER_IP: &str = "127.0.0.1";
pub const DEFAULT_DEVICE: &str = "/dev/input/js0";

/// Axis value reported by a fully pressed directional pad
pub const CROSS_MAX: i16 = 32767;

const CONFIG_DIR: &str = "udp-joystick";
const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to access config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Could not resolve server address {0}")]
    Unresolvable(String),

    #[error("Invalid log level: {0}")]
    InvalidLogLevel(String),
}

/// Which collaborator produces joystick events on the sending side
#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Raw kernel joystick device node (`/dev/input/jsN`)
    #[default]
    Device,
    /// Any gamepad gilrs can see
    Gamepad,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct NetworkConfig {
    /// Host the transmitter sends to
    pub server_ip: String,
    /// Port the transmitter sends to
    pub port: u16,
    /// Port the receiver binds on all interfaces
    pub listen_port: u16,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            server_ip: DEFAULT_SERVER_IP.to_string(),
            port: DEFAULT_PORT,
            listen_port: DEFAULT_PORT,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct SourceConfig {
    pub kind: SourceKind,
    pub device_path: PathBuf,
    /// Sleep between gilrs polls, in microseconds
    pub poll_interval_us: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: SourceKind::default(),
            device_path: PathBuf::from(DEFAULT_DEVICE),
            poll_interval_us: 100,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub network: NetworkConfig,
    pub source: SourceConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// `<config_dir>/udp-joystick/config.toml`, or `./udp-joystick/config.toml` when the
    /// platform has no config directory
    pub fn default_path() -> PathBuf {
        let mut path = dirs::config_dir().unwrap_or_else(|| {
            warn!("Could not determine config directory, using current directory");
            PathBuf::from(".")
        });
        path.push(CONFIG_DIR);
        path.push(CONFIG_FILE);
        path
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reads the config at `path`, writing the defaults there first if no file exists
    pub async fn load_or_create(path: &Path) -> Result<Self, ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };

        if !tokio::fs::try_exists(path).await.map_err(io_err)? {
            info!("No config found at {}, writing defaults", path.display());
            let config = Self::default();
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
            }
            tokio::fs::write(path, config.to_toml()?)
                .await
                .map_err(io_err)?;
            return Ok(config);
        }

        let content = tokio::fs::read_to_string(path).await.map_err(io_err)?;
        let config = Self::from_toml(&content)?;
        debug!("Loaded config from {}: {:?}", path.display(), config);
        Ok(config)
    }

    /// Resolves `server_ip:port`, which may be a hostname
    pub async fn resolve_server(&self) -> Result<SocketAddr, ConfigError> {
        let target = format!("{}:{}", self.network.server_ip, self.network.port);
        let resolved = tokio::net::lookup_host(target.as_str())
            .await
            .map_err(|_| ConfigError::Unresolvable(target.clone()))?
            .next()
            .ok_or_else(|| ConfigError::Unresolvable(target.clone()));
        resolved
    }

    /// Wildcard address on `listen_port`
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.network.listen_port))
    }

    pub fn log_level(&self) -> Result<Level, ConfigError> {
        self.logging
            .level
            .parse()
            .map_err(|_| ConfigError::InvalidLogLevel(self.logging.level.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.network.port, DEFAULT_PORT);
        assert_eq!(config.source.device_path, PathBuf::from(DEFAULT_DEVICE));
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let config = Config::from_toml(
            r#"
            [network]
            server_ip = "10.0.0.7"

            [source]
            kind = "gamepad"
            "#,
        )
        .unwrap();

        assert_eq!(config.network.server_ip, "10.0.0.7");
        assert_eq!(config.network.port, DEFAULT_PORT);
        assert_eq!(config.source.kind, SourceKind::Gamepad);
        assert_eq!(config.source.poll_interval_us, 100);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn unknown_source_kind_is_rejected() {
        let result = Config::from_toml("[source]\nkind = \"keyboard\"\n");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn written_defaults_parse_back() {
        let text = Config::default().to_toml().unwrap();
        assert_eq!(Config::from_toml(&text).unwrap(), Config::default());
    }

    #[test]
    fn log_level_parsing() {
        let mut config = Config::default();
        assert_eq!(config.log_level().unwrap(), Level::INFO);
        config.logging.level = "debug".into();
        assert_eq!(config.log_level().unwrap(), Level::DEBUG);
        config.logging.level = "loud".into();
        assert!(config.log_level().is_err());
    }

    #[test]
    fn listen_addr_binds_all_interfaces() {
        let mut config = Config::default();
        config.network.listen_port = 6000;
        assert_eq!(config.listen_addr(), "0.0.0.0:6000".parse().unwrap());
    }

    #[tokio::test]
    async fn load_or_create_writes_default_file() {
        let dir = std::env::temp_dir().join(format!("udp-joystick-config-{}", std::process::id()));
        let path = dir.join(CONFIG_FILE);
        let _ = tokio::fs::remove_dir_all(&dir).await;

        let created = Config::load_or_create(&path).await.unwrap();
        assert_eq!(created, Config::default());
        assert!(tokio::fs::try_exists(&path).await.unwrap());

        tokio::fs::write(&path, "[network]\nport = 7000\n").await.unwrap();
        let loaded = Config::load_or_create(&path).await.unwrap();
        assert_eq!(loaded.network.port, 7000);

        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn resolves_loopback_server() {
        let mut config = Config::default();
        config.network.port = 5999;
        let addr = config.resolve_server().await.unwrap();
        assert_eq!(addr, "127.0.0.1:5999".parse().unwrap());
    }
}
