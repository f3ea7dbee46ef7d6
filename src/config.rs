//! Process configuration, read once from the environment at startup.
//!
//! | Variable | Default |
//! |----------|---------|
//! | `HOST` | `127.0.0.1` |
//! | `PORT` | `8000` |
//! | `GH_SECRET` | none (every delivery is rejected) |
//! | `GH_AUTH` | none (unauthenticated API calls) |
//! | `GH_API_URL` | `https://api.github.com` |
//! | `BOT_CACHE_CAPACITY` | `500` |
//! | `BOT_CONSISTENCY_DELAY_MS` | `1000` |
//!
//! Empty values count as unset.

use std::num::NonZeroUsize;
use std::time::Duration;

use thiserror::Error;

use crate::github::DEFAULT_CAPACITY;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_API_URL: &str = "https://api.github.com";
pub const DEFAULT_CONSISTENCY_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} must be {expected}, got {value:?}")]
    Invalid {
        name: &'static str,
        expected: &'static str,
        value: String,
    },
}

#[derive(Clone, PartialEq, Eq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub webhook_secret: Option<String>,
    pub api_token: Option<String>,
    pub api_url: String,
    pub cache_capacity: NonZeroUsize,
    pub consistency_delay: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds a configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let port = match var("PORT") {
            Some(raw) => parse(raw, "PORT", "a port number")?,
            None => DEFAULT_PORT,
        };

        let cache_capacity = match var("BOT_CACHE_CAPACITY") {
            Some(raw) => parse(raw, "BOT_CACHE_CAPACITY", "a positive integer")?,
            None => DEFAULT_CAPACITY,
        };

        let consistency_delay = match var("BOT_CONSISTENCY_DELAY_MS") {
            Some(raw) => Duration::from_millis(parse(
                raw,
                "BOT_CONSISTENCY_DELAY_MS",
                "a number of milliseconds",
            )?),
            None => DEFAULT_CONSISTENCY_DELAY,
        };

        Ok(Config {
            host: var("HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port,
            webhook_secret: var("GH_SECRET"),
            api_token: var("GH_AUTH"),
            api_url: var("GH_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            cache_capacity,
            consistency_delay,
        })
    }

    /// The address to listen on, as `host:port`.
    pub fn listen_addr(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

fn parse<T: std::str::FromStr>(
    raw: String,
    name: &'static str,
    expected: &'static str,
) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::Invalid {
        name,
        expected,
        value: raw,
    })
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("webhook_secret", &self.webhook_secret.as_ref().map(|_| "<redacted>"))
            .field("api_token", &self.api_token.as_ref().map(|_| "<redacted>"))
            .field("api_url", &self.api_url)
            .field("cache_capacity", &self.cache_capacity)
            .field("consistency_delay", &self.consistency_delay)
            .finish()
    }
}
