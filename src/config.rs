//! Runtime configuration
//!
//! Read from the environment at startup:
//! - `SERVER_HOST` (default `127.0.0.1`)
//! - `SERVER_PORT` (default `5000`)
//! - `CLIENT_INACTIVITY_TIMEOUT` in milliseconds (default `30000`)
//! - `ECHO_TO_SENDER` `true`/`false` (default `true`)

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::AppError;

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 5000;
const DEFAULT_INACTIVITY_TIMEOUT: Duration = Duration::from_secs(30);

/// Whether a chat message is echoed back to its sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EchoPolicy {
    #[default]
    IncludeSender,
    ExcludeSender,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub inactivity_timeout: Duration,
    pub echo: EchoPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            inactivity_timeout: DEFAULT_INACTIVITY_TIMEOUT,
            echo: EchoPolicy::default(),
        }
    }
}

impl Config {
    /// Load from process environment, falling back to defaults
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load using an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(host) = lookup("SERVER_HOST") {
            config.host = host;
        }
        if let Some(port) = parse_var(&lookup, "SERVER_PORT")? {
            config.port = port;
        }
        if let Some(millis) = parse_var::<u64, _>(&lookup, "CLIENT_INACTIVITY_TIMEOUT")? {
            if millis == 0 {
                return Err(AppError::Config(
                    "CLIENT_INACTIVITY_TIMEOUT must be positive".to_string(),
                ));
            }
            config.inactivity_timeout = Duration::from_millis(millis);
        }
        if let Some(echo) = parse_var::<bool, _>(&lookup, "ECHO_TO_SENDER")? {
            config.echo = if echo {
                EchoPolicy::IncludeSender
            } else {
                EchoPolicy::ExcludeSender
            };
        }

        Ok(config)
    }

    /// Address to bind, as `host:port`
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| AppError::Config(format!("{key}={raw:?}: {e}"))),
    }
}
