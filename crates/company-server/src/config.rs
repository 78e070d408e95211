//! Server configuration loading from file and environment variables.

use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;
use thiserror::Error;

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub events: EventsConfig,

    #[serde(default)]
    pub broker: BrokerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Network configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Deployment environment reported by the health check.
    #[serde(default = "default_env")]
    pub env: String,

    /// How long in-flight requests may run after a shutdown signal.
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,

    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    #[serde(default = "default_pool_max_size")]
    pub pool_max_size: u32,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthConfig {
    /// HMAC secret used to verify bearer tokens. Empty disables every
    /// protected route (all requests get 401).
    #[serde(default)]
    pub jwt_secret: String,
}

/// Event channel sizing.
#[derive(Debug, Clone, Deserialize)]
pub struct EventsConfig {
    #[serde(default = "default_events_capacity")]
    pub capacity: usize,

    /// How long a handler waits for room in a full queue. `0` fails fast.
    #[serde(default = "default_enqueue_timeout_ms")]
    pub enqueue_timeout_ms: u64,
}

/// Message broker (Kafka REST proxy) settings.
#[derive(Debug, Clone, Deserialize)]
pub struct BrokerConfig {
    /// Base URL of the REST proxy. Empty keeps events in process memory.
    #[serde(default)]
    pub endpoint: String,

    #[serde(default = "default_topic")]
    pub topic: String,

    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,

    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    #[serde(default = "default_close_timeout_ms")]
    pub close_timeout_ms: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "company_server=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn default_port() -> u16 {
    4000
}

fn default_env() -> String {
    "development".to_string()
}

fn default_shutdown_grace_ms() -> u64 {
    5_000
}

fn default_db_path() -> String {
    "companies.db".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_pool_max_size() -> u32 {
    25
}

fn default_events_capacity() -> usize {
    100
}

fn default_enqueue_timeout_ms() -> u64 {
    250
}

fn default_topic() -> String {
    "companies".to_string()
}

fn default_buffer_capacity() -> usize {
    1_000
}

fn default_request_timeout_ms() -> u64 {
    5_000
}

fn default_close_timeout_ms() -> u64 {
    10_000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            env: default_env(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
        }
    }
}

impl ServerConfig {
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
            pool_max_size: default_pool_max_size(),
        }
    }
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            capacity: default_events_capacity(),
            enqueue_timeout_ms: default_enqueue_timeout_ms(),
        }
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            topic: default_topic(),
            buffer_capacity: default_buffer_capacity(),
            request_timeout_ms: default_request_timeout_ms(),
            close_timeout_ms: default_close_timeout_ms(),
        }
    }
}

impl BrokerConfig {
    pub fn rest_proxy(&self) -> company_events::RestProxyConfig {
        company_events::RestProxyConfig {
            endpoint: self.endpoint.clone(),
            buffer_capacity: self.buffer_capacity,
            request_timeout: Duration::from_millis(self.request_timeout_ms),
            close_timeout: Duration::from_millis(self.close_timeout_ms),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `CMPSRV_HOST`, `CMPSRV_PORT`, `CMPSRV_ENV` override `server.*`
/// - `CMPSRV_DB_PATH` overrides `database.path`
/// - `CMPSRV_LOG_LEVEL`, `CMPSRV_LOG_JSON` override `logging.*`
/// - `JWT_SECRET` overrides `auth.jwt_secret`
/// - `KAFKA_BROKERS` overrides `broker.endpoint`
/// - `KAFKA_TOPIC` overrides `broker.topic`
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    Ok(config)
}

/// Applies overrides from `lookup`, which maps an environment variable name
/// to its value. Unparseable numeric values are ignored.
fn apply_env_overrides(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(host) = lookup("CMPSRV_HOST") {
        if let Ok(parsed) = host.parse() {
            config.server.host = parsed;
        }
    }
    if let Some(port) = lookup("CMPSRV_PORT") {
        if let Ok(parsed) = port.parse() {
            config.server.port = parsed;
        }
    }
    if let Some(env) = lookup("CMPSRV_ENV") {
        config.server.env = env;
    }
    if let Some(db_path) = lookup("CMPSRV_DB_PATH") {
        config.database.path = db_path;
    }
    if let Some(level) = lookup("CMPSRV_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = lookup("CMPSRV_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
    if let Some(secret) = lookup("JWT_SECRET") {
        config.auth.jwt_secret = secret;
    }
    if let Some(brokers) = lookup("KAFKA_BROKERS") {
        // Several comma-separated endpoints may be given; the first one wins.
        if let Some(first) = brokers.split(',').map(str::trim).find(|s| !s.is_empty()) {
            config.broker.endpoint = first.to_string();
        }
    }
    if let Some(topic) = lookup("KAFKA_TOPIC") {
        if !topic.trim().is_empty() {
            config.broker.topic = topic;
        }
    }
}
