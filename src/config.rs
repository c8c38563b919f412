//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::fmt::MakeWriter;

use crate::api::ApiConfig;
use crate::capture::{SupervisorConfig, WebSocketSourceConfig};
use crate::websocket::HubConfig;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub relay: RelayConfig,

    #[serde(default)]
    pub capture: CaptureConfig,

    #[serde(default)]
    pub shutdown: ShutdownConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP / WebSocket server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_subscriber_buffer")]
    pub subscriber_buffer: usize,

    #[serde(default = "default_write_timeout")]
    pub write_timeout_ms: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3001
}

fn default_subscriber_buffer() -> usize {
    256
}

fn default_write_timeout() -> u64 {
    5000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            subscriber_buffer: default_subscriber_buffer(),
            write_timeout_ms: default_write_timeout(),
        }
    }
}

/// Relay hub configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    #[serde(default = "default_max_strikes")]
    pub max_strikes: usize,

    #[serde(default = "default_true")]
    pub send_backlog_on_connect: bool,

    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

fn default_max_strikes() -> usize {
    100
}

fn default_true() -> bool {
    true
}

fn default_max_connections() -> usize {
    1000
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            max_strikes: default_max_strikes(),
            send_backlog_on_connect: default_true(),
            max_connections: default_max_connections(),
        }
    }
}

/// Upstream capture configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CaptureConfig {
    #[serde(default = "default_upstream_url")]
    pub upstream_url: String,

    /// Sent after connecting; empty disables it
    #[serde(default = "default_handshake")]
    pub handshake: String,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_restart_delay")]
    pub restart_delay_secs: u64,

    /// Restart the session after this long without a frame; 0 disables it
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    /// Upper bound on closing the session during shutdown
    #[serde(default = "default_close_timeout")]
    pub close_timeout_ms: u64,

    #[serde(default)]
    pub carry_upstream_fields: bool,
}

fn default_upstream_url() -> String {
    "wss://ws1.blitzortung.org/".to_string()
}

fn default_handshake() -> String {
    r#"{"a":111}"#.to_string()
}

fn default_connect_timeout() -> u64 {
    60
}

fn default_restart_delay() -> u64 {
    10
}

fn default_idle_timeout() -> u64 {
    120
}

fn default_close_timeout() -> u64 {
    1000
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            upstream_url: default_upstream_url(),
            handshake: default_handshake(),
            connect_timeout_secs: default_connect_timeout(),
            restart_delay_secs: default_restart_delay(),
            idle_timeout_secs: default_idle_timeout(),
            close_timeout_ms: default_close_timeout(),
            carry_upstream_fields: false,
        }
    }
}

/// Shutdown configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ShutdownConfig {
    #[serde(default = "default_grace_period")]
    pub grace_period_ms: u64,
}

fn default_grace_period() -> u64 {
    2000
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            grace_period_ms: default_grace_period(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,

    /// Debug-level diagnostics for this crate
    #[serde(default)]
    pub verbose: bool,

    /// Log raw and decoded payload previews
    #[serde(default)]
    pub log_stream_data: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            verbose: false,
            log_stream_data: false,
        }
    }
}

/// Run `f` with a plain subscriber writing to `make_writer`.
///
/// Config loading logs before the configured subscriber can exist; this
/// keeps its warnings visible.
pub fn with_bootstrap_logging<W, F, R>(make_writer: W, f: F) -> R
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
    F: FnOnce() -> R,
{
    let subscriber = tracing_subscriber::fmt()
        .with_writer(make_writer)
        .with_max_level(tracing::Level::INFO)
        .finish();

    tracing::subscriber::with_default(subscriber, f)
}

impl LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is not set
    pub fn filter_directive(&self) -> String {
        if self.verbose {
            "strike_relay=debug,tower_http=debug".to_string()
        } else {
            format!("strike_relay={},tower_http=info", self.level)
        }
    }

    pub fn is_json(&self) -> bool {
        self.format.eq_ignore_ascii_case("json")
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths: Vec<PathBuf> = [
            dirs::config_dir().map(|p| p.join("strike-relay").join("config.toml")),
            Some(PathBuf::from("/etc/strike-relay/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ]
        .into_iter()
        .flatten()
        .collect();

        Self::load_first(&config_paths)
    }

    /// Load the first existing file in `paths` that parses.
    ///
    /// Files that fail to load are skipped with a warning. Falls back to
    /// defaults plus environment overrides.
    pub fn load_first(paths: &[PathBuf]) -> Self {
        for path in paths {
            if path.exists() {
                match Self::load_with_env(path) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Apply environment variable overrides to an existing config
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from any key lookup (environment-style keys)
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        // Server overrides
        if let Some(host) = lookup("HOST") {
            self.server.host = host;
        }
        override_parsed(&lookup, "PORT", &mut self.server.port);
        override_parsed(&lookup, "SUBSCRIBER_BUFFER", &mut self.server.subscriber_buffer);
        override_parsed(&lookup, "WRITE_TIMEOUT_MS", &mut self.server.write_timeout_ms);

        // Relay overrides
        override_parsed(&lookup, "MAX_STRIKES", &mut self.relay.max_strikes);
        override_flag(&lookup, "SEND_BACKLOG_ON_CONNECT", &mut self.relay.send_backlog_on_connect);
        override_parsed(&lookup, "MAX_CONNECTIONS", &mut self.relay.max_connections);

        // Capture overrides
        if let Some(url) = lookup("UPSTREAM_URL") {
            self.capture.upstream_url = url;
        }
        if let Some(handshake) = lookup("UPSTREAM_HANDSHAKE") {
            self.capture.handshake = handshake;
        }
        override_parsed(&lookup, "CONNECT_TIMEOUT_SECS", &mut self.capture.connect_timeout_secs);
        override_parsed(&lookup, "RESTART_DELAY_SECS", &mut self.capture.restart_delay_secs);
        override_parsed(&lookup, "IDLE_TIMEOUT_SECS", &mut self.capture.idle_timeout_secs);
        override_parsed(&lookup, "SESSION_CLOSE_TIMEOUT_MS", &mut self.capture.close_timeout_ms);
        override_flag(&lookup, "CARRY_UPSTREAM_FIELDS", &mut self.capture.carry_upstream_fields);

        // Shutdown overrides
        override_parsed(&lookup, "SHUTDOWN_GRACE_MS", &mut self.shutdown.grace_period_ms);

        // Logging overrides
        if let Some(level) = lookup("LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("LOG_FORMAT") {
            self.logging.format = format;
        }
        override_flag(&lookup, "VERBOSE", &mut self.logging.verbose);
        override_flag(&lookup, "LOG_STREAM_DATA", &mut self.logging.log_stream_data);
    }

    /// Reject settings the relay cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.relay.max_strikes == 0 {
            return Err(ConfigError::Invalid("relay.max_strikes must be at least 1".to_string()));
        }
        if self.server.subscriber_buffer == 0 {
            return Err(ConfigError::Invalid(
                "server.subscriber_buffer must be at least 1".to_string(),
            ));
        }
        if self.capture.upstream_url.is_empty() {
            return Err(ConfigError::Invalid("capture.upstream_url is empty".to_string()));
        }
        Ok(())
    }

    pub fn api_config(&self) -> ApiConfig {
        ApiConfig {
            host: self.server.host.clone(),
            port: self.server.port,
            subscriber_buffer: self.server.subscriber_buffer,
            write_timeout: Duration::from_millis(self.server.write_timeout_ms),
        }
    }

    pub fn hub_config(&self) -> HubConfig {
        HubConfig {
            max_strikes: self.relay.max_strikes,
            send_backlog_on_connect: self.relay.send_backlog_on_connect,
            max_connections: self.relay.max_connections,
        }
    }

    pub fn source_config(&self) -> WebSocketSourceConfig {
        let handshake = Some(self.capture.handshake.clone()).filter(|h| !h.is_empty());

        WebSocketSourceConfig {
            url: self.capture.upstream_url.clone(),
            handshake,
            connect_timeout: Duration::from_secs(self.capture.connect_timeout_secs),
            idle_timeout: Some(self.capture.idle_timeout_secs)
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
        }
    }

    pub fn supervisor_config(&self) -> SupervisorConfig {
        SupervisorConfig {
            restart_delay: Duration::from_secs(self.capture.restart_delay_secs),
            close_timeout: Duration::from_millis(self.capture.close_timeout_ms),
            log_stream_data: self.logging.log_stream_data,
            carry_upstream_fields: self.capture.carry_upstream_fields,
        }
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.shutdown.grace_period_ms)
    }
}

fn override_parsed<F, T>(lookup: &F, key: &str, target: &mut T)
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    if let Some(raw) = lookup(key) {
        match raw.trim().parse() {
            Ok(value) => *target = value,
            Err(_) => tracing::warn!("Ignoring invalid {}={:?}", key, raw),
        }
    }
}

fn override_flag<F>(lookup: &F, key: &str, target: &mut bool)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(raw) = lookup(key) {
        *target = parse_flag(&raw);
    }
}

/// `true`, `1` and `yes` (any case) are true; everything else is false
fn parse_flag(raw: &str) -> bool {
    matches!(raw.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes")
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# Strike Relay Configuration
#
# Environment variables override these settings:
# - HOST, PORT, SUBSCRIBER_BUFFER, WRITE_TIMEOUT_MS
# - MAX_STRIKES, SEND_BACKLOG_ON_CONNECT, MAX_CONNECTIONS
# - UPSTREAM_URL, UPSTREAM_HANDSHAKE, CONNECT_TIMEOUT_SECS, RESTART_DELAY_SECS
# - IDLE_TIMEOUT_SECS, SESSION_CLOSE_TIMEOUT_MS
# - CARRY_UPSTREAM_FIELDS
# - SHUTDOWN_GRACE_MS
# - LOG_LEVEL, LOG_FORMAT, VERBOSE, LOG_STREAM_DATA

[server]
host = "0.0.0.0"
port = 3001

# Outbound messages queued per subscriber before it is dropped as slow
subscriber_buffer = 256

# Upper bound on a single socket write (ms)
write_timeout_ms = 5000

[relay]
# Strikes kept in history
max_strikes = 100

# Send the history to subscribers when they connect
send_backlog_on_connect = true

max_connections = 1000

[capture]
upstream_url = "wss://ws1.blitzortung.org/"

# Text frame sent after connecting (empty to disable)
handshake = '{"a":111}'

connect_timeout_secs = 60

# Delay before restarting a failed session
restart_delay_secs = 10

# Restart the session after this long without upstream traffic (0 disables)
idle_timeout_secs = 120

# Upper bound on closing the upstream session at shutdown (ms)
close_timeout_ms = 1000

# Copy non-coordinate upstream fields into outgoing strikes
carry_upstream_fields = false

[shutdown]
# Forced exit after this long (ms)
grace_period_ms = 2000

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"

verbose = false
log_stream_data = false
"#
    .to_string()
}
