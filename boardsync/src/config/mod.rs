//! Configuration system for the `BoardSync` client.
//!
//! Supports layered configuration with the following priority (highest
//! first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/boardsync/config.toml`)
//! 4. Compiled defaults
//!
//! A missing config file is not an error (defaults are used). An explicit
//! `--config` path that doesn't exist is an error.

use std::path::PathBuf;
use std::time::Duration;

use crate::channel::ReconnectPolicy;

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
    gateway: GatewayFileConfig,
    channel: ChannelFileConfig,
    sync: SyncFileConfig,
    identity: IdentityFileConfig,
}

/// `[gateway]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct GatewayFileConfig {
    base_url: Option<String>,
    request_timeout_secs: Option<u64>,
}

/// `[channel]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ChannelFileConfig {
    url: Option<String>,
    reconnect_base_ms: Option<u64>,
    reconnect_max_secs: Option<u64>,
    event_buffer: Option<usize>,
}

/// `[sync]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct SyncFileConfig {
    resend_ceiling: Option<u32>,
    resend_interval_secs: Option<u64>,
    store_event_buffer: Option<usize>,
}

/// `[identity]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct IdentityFileConfig {
    user_id: Option<i64>,
    user_name: Option<String>,
}

// ---------------------------------------------------------------------------
// Resolved configuration (concrete types, all fields populated)
// ---------------------------------------------------------------------------

/// Fully resolved client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    // -- Gateway --
    /// Base URL of the persistence gateway.
    pub gateway_url: Option<String>,
    /// Per-request timeout for gateway calls.
    pub request_timeout: Duration,

    // -- Channel --
    /// WebSocket URL of the board's push endpoint.
    pub channel_url: Option<String>,
    /// Delay before the first reconnect attempt.
    pub reconnect_base: Duration,
    /// Upper bound on the reconnect delay.
    pub reconnect_max: Duration,
    /// Buffer size for incoming push frames.
    pub event_buffer: usize,

    // -- Sync --
    /// Channel publish attempts before a pending send is marked failed.
    pub resend_ceiling: u32,
    /// Interval between resend queue flushes.
    pub resend_interval: Duration,
    /// Buffer size for store event subscriptions.
    pub store_event_buffer: usize,

    // -- Identity --
    /// The local user's server id.
    pub user_id: Option<i64>,
    /// The local user's display name.
    pub user_name: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            gateway_url: None,
            request_timeout: Duration::from_secs(10),
            channel_url: None,
            reconnect_base: Duration::from_millis(500),
            reconnect_max: Duration::from_secs(30),
            event_buffer: 256,
            resend_ceiling: 3,
            resend_interval: Duration::from_secs(5),
            store_event_buffer: 256,
            user_id: None,
            user_name: None,
        }
    }
}

impl ClientConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if an explicitly given config file cannot
    /// be read or any config file cannot be parsed.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Ok(Self::resolve(cli, &file))
    }

    /// Resolve a `ClientConfig` from CLI args and a parsed config file.
    ///
    /// Priority: CLI > file > default. Separated from `load()` to enable
    /// unit testing without CLI parsing.
    #[must_use]
    fn resolve(cli: &CliArgs, file: &ConfigFile) -> Self {
        let defaults = Self::default();

        Self {
            gateway_url: cli
                .gateway_url
                .clone()
                .or_else(|| file.gateway.base_url.clone()),
            request_timeout: file
                .gateway
                .request_timeout_secs
                .map_or(defaults.request_timeout, Duration::from_secs),
            channel_url: cli.channel_url.clone().or_else(|| file.channel.url.clone()),
            reconnect_base: file
                .channel
                .reconnect_base_ms
                .map_or(defaults.reconnect_base, Duration::from_millis),
            reconnect_max: file
                .channel
                .reconnect_max_secs
                .map_or(defaults.reconnect_max, Duration::from_secs),
            event_buffer: file.channel.event_buffer.unwrap_or(defaults.event_buffer),
            resend_ceiling: file.sync.resend_ceiling.unwrap_or(defaults.resend_ceiling),
            resend_interval: file
                .sync
                .resend_interval_secs
                .map_or(defaults.resend_interval, Duration::from_secs),
            store_event_buffer: file
                .sync
                .store_event_buffer
                .unwrap_or(defaults.store_event_buffer),
            user_id: cli.user_id.or(file.identity.user_id),
            user_name: cli
                .user_name
                .clone()
                .or_else(|| file.identity.user_name.clone()),
        }
    }

    /// The reconnect schedule for the push channel.
    #[must_use]
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            base_delay: self.reconnect_base,
            max_delay: self.reconnect_max,
        }
    }
}

/// CLI arguments parsed by clap. Environment variables are supported via
/// `env` attributes.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Real-time sync client for a shared task board and message feed")]
pub struct CliArgs {
    /// Base URL of the persistence gateway.
    #[arg(long, env = "GATEWAY_URL")]
    pub gateway_url: Option<String>,

    /// WebSocket URL of the board's push endpoint.
    #[arg(long, env = "CHANNEL_URL")]
    pub channel_url: Option<String>,

    /// Your server-assigned user id.
    #[arg(long, env = "BOARD_USER_ID")]
    pub user_id: Option<i64>,

    /// Your display name.
    #[arg(long, env = "BOARD_USER_NAME")]
    pub user_name: Option<String>,

    /// Path to config file (default: `~/.config/boardsync/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "BOARDSYNC_LOG")]
    pub log_level: String,

    /// Path to log file (default: `$TMPDIR/boardsync.log`).
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Load and parse a TOML config file.
///
/// If `explicit_path` is `Some`, the file must exist (error if not). If
/// `explicit_path` is `None`, the default path is tried and a missing
/// file is treated as empty config.
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
        config_dir.join("boardsync").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
