//! Service configuration

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::relay::{DEFAULT_CHANNEL, DEFAULT_OUTBOX_CAPACITY, SupervisorConfig};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Relay service configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection URL (pool and listener)
    pub database_url: String,
    /// HTTP / WebSocket port
    pub port: u16,
    /// Environment: development | staging | production
    pub environment: String,
    /// Channel the supervisor LISTENs on
    pub notify_channel: String,
    pub keepalive_interval: Duration,
    pub reconnect_delay: Duration,
    /// Client liveness sweep period
    pub liveness_interval: Duration,
    /// Per-session bounded outbox
    pub client_outbox_capacity: usize,
    /// Forward undecodable payloads to clients
    pub broadcast_decode_failures: bool,
    /// Static assets served as the router fallback
    pub static_dir: PathBuf,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, BoxError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load from an arbitrary variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, BoxError> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        Ok(Self {
            database_url: var("DATABASE_URL").ok_or("DATABASE_URL must be set")?,
            port: parse_or(var("PORT"), "PORT", 3000)?,
            environment: var("ENVIRONMENT").unwrap_or_else(|| "development".into()),
            notify_channel: var("NOTIFY_CHANNEL").unwrap_or_else(|| DEFAULT_CHANNEL.into()),
            keepalive_interval: secs(var("KEEPALIVE_INTERVAL_SECS"), "KEEPALIVE_INTERVAL_SECS", 25)?,
            reconnect_delay: secs(var("RECONNECT_DELAY_SECS"), "RECONNECT_DELAY_SECS", 5)?,
            liveness_interval: secs(var("LIVENESS_INTERVAL_SECS"), "LIVENESS_INTERVAL_SECS", 30)?,
            client_outbox_capacity: match parse_or(
                var("CLIENT_OUTBOX_CAPACITY"),
                "CLIENT_OUTBOX_CAPACITY",
                DEFAULT_OUTBOX_CAPACITY,
            )? {
                0 => return Err("CLIENT_OUTBOX_CAPACITY must be at least 1".into()),
                n => n,
            },
            broadcast_decode_failures: parse_or(
                var("BROADCAST_DECODE_FAILURES"),
                "BROADCAST_DECODE_FAILURES",
                true,
            )?,
            static_dir: var("STATIC_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("public")),
        })
    }

    pub fn supervisor(&self) -> SupervisorConfig {
        SupervisorConfig {
            channel: self.notify_channel.clone(),
            keepalive_interval: self.keepalive_interval,
            reconnect_delay: self.reconnect_delay,
            ..Default::default()
        }
    }
}

fn parse_or<T: FromStr>(value: Option<String>, name: &str, default: T) -> Result<T, BoxError> {
    match value {
        Some(v) => v
            .trim()
            .parse()
            .map_err(|_| format!("{name} has an invalid value: {v}").into()),
        None => Ok(default),
    }
}

fn secs(value: Option<String>, name: &str, default: u64) -> Result<Duration, BoxError> {
    match parse_or(value, name, default)? {
        0 => Err(format!("{name} must be greater than zero").into()),
        n => Ok(Duration::from_secs(n)),
    }
}
