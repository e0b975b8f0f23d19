//! Relay configuration module
//! Handles runtime parameters for the relay, read from the environment

use crate::constants::{
    DEFAULT_HOST, DEFAULT_IDLE_TIMEOUT_SECS, DEFAULT_MAX_MESSAGE_SIZE, DEFAULT_PING_SECS,
    DEFAULT_PORT, DEFAULT_QUEUE_CAPACITY, DEFAULT_SEND_TIMEOUT_SECS, DEFAULT_STATIC_DIR,
};
use crate::error::{RelayError, Result};
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// What to do when a connection's outbound queue is full
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Close the slow connection; it leaves its channel
    Disconnect,
    /// Discard the oldest queued frame to make room for the new one
    DropOldest,
}

impl FromStr for OverflowPolicy {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "disconnect" => Ok(Self::Disconnect),
            "drop_oldest" | "drop-oldest" => Ok(Self::DropOldest),
            other => Err(RelayError::ConfigError(format!(
                "unknown overflow policy '{}', expected 'disconnect' or 'drop_oldest'",
                other
            ))),
        }
    }
}

impl fmt::Display for OverflowPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnect => write!(f, "disconnect"),
            Self::DropOldest => write!(f, "drop_oldest"),
        }
    }
}

/// Relay configuration parameters
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub host: String,
    pub port: u16,
    /// Bound of each connection's outbound queue
    pub queue_capacity: usize,
    pub overflow_policy: OverflowPolicy,
    /// Upper bound for a single socket write
    pub send_timeout: Duration,
    pub ping_interval: Duration,
    /// Connections silent for longer than this are closed
    pub idle_timeout: Duration,
    pub max_message_size: usize,
    /// Directory holding the static UI assets
    pub static_dir: PathBuf,
    pub enable_tls: bool,
    pub tls_cert_path: Option<String>,
    pub tls_key_path: Option<String>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            overflow_policy: OverflowPolicy::Disconnect,
            send_timeout: Duration::from_secs(DEFAULT_SEND_TIMEOUT_SECS),
            ping_interval: Duration::from_secs(DEFAULT_PING_SECS),
            idle_timeout: Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            static_dir: PathBuf::from(DEFAULT_STATIC_DIR),
            enable_tls: false,
            tls_cert_path: None,
            tls_key_path: None,
        }
    }
}

fn parse_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_flag(value: &str) -> bool {
    value.eq_ignore_ascii_case("true") || value == "1"
}

impl RelayConfig {
    /// Load configuration from environment variables, falling back to defaults
    pub fn from_env() -> Result<Self> {
        let host = env::var("PROMPTER_RELAY_HOST").unwrap_or(DEFAULT_HOST.to_string());
        let port = parse_or("PROMPTER_RELAY_PORT", DEFAULT_PORT);

        let queue_capacity = parse_or("PROMPTER_RELAY_QUEUE_CAPACITY", DEFAULT_QUEUE_CAPACITY);

        let overflow_policy = match env::var("PROMPTER_RELAY_OVERFLOW_POLICY") {
            Ok(v) => v.parse()?,
            Err(_) => OverflowPolicy::Disconnect,
        };

        let send_timeout_secs = parse_or("PROMPTER_RELAY_SEND_TIMEOUT_SECS", DEFAULT_SEND_TIMEOUT_SECS);
        let ping_secs = parse_or("PROMPTER_RELAY_PING_SECS", DEFAULT_PING_SECS);
        let idle_secs = parse_or("PROMPTER_RELAY_IDLE_TIMEOUT_SECS", DEFAULT_IDLE_TIMEOUT_SECS);
        let max_message_size = parse_or("PROMPTER_RELAY_MAX_MESSAGE_SIZE", DEFAULT_MAX_MESSAGE_SIZE);

        let static_dir = env::var("PROMPTER_RELAY_STATIC_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_STATIC_DIR));

        let enable_tls = env::var("PROMPTER_RELAY_ENABLE_TLS")
            .map(|v| parse_flag(&v))
            .unwrap_or(false);
        let tls_cert_path = env::var("PROMPTER_RELAY_TLS_CERT_PATH").ok();
        let tls_key_path = env::var("PROMPTER_RELAY_TLS_KEY_PATH").ok();

        let config = Self {
            host,
            port,
            queue_capacity,
            overflow_policy,
            send_timeout: Duration::from_secs(send_timeout_secs),
            ping_interval: Duration::from_secs(ping_secs),
            idle_timeout: Duration::from_secs(idle_secs),
            max_message_size,
            static_dir,
            enable_tls,
            tls_cert_path,
            tls_key_path,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject combinations the relay cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.queue_capacity == 0 {
            return Err(RelayError::ConfigError(
                "outbound queue capacity must be at least 1".to_string(),
            ));
        }

        if self.ping_interval.is_zero() {
            return Err(RelayError::ConfigError(
                "ping interval must be greater than zero".to_string(),
            ));
        }

        if self.send_timeout.is_zero() {
            return Err(RelayError::ConfigError(
                "send timeout must be greater than zero".to_string(),
            ));
        }

        // Idleness is checked on each ping tick, so a quiet client only
        // refreshes its activity once per interval via its pong
        if self.idle_timeout <= self.ping_interval {
            return Err(RelayError::ConfigError(format!(
                "idle timeout ({:?}) must be longer than the ping interval ({:?})",
                self.idle_timeout, self.ping_interval
            )));
        }

        if self.enable_tls {
            let (cert_path, key_path) = match (&self.tls_cert_path, &self.tls_key_path) {
                (Some(cert), Some(key)) => (cert, key),
                _ => {
                    return Err(RelayError::ConfigError(
                        "TLS is enabled but PROMPTER_RELAY_TLS_CERT_PATH or PROMPTER_RELAY_TLS_KEY_PATH is not set".to_string(),
                    ))
                }
            };
            if !Path::new(cert_path).exists() {
                return Err(RelayError::ConfigError(format!(
                    "TLS certificate file does not exist: {}",
                    cert_path
                )));
            }
            if !Path::new(key_path).exists() {
                return Err(RelayError::ConfigError(format!(
                    "TLS private key file does not exist: {}",
                    key_path
                )));
            }
        }

        Ok(())
    }
}
