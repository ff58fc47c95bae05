//! Configuration module for the Pomodoro Viewer.
//!
//! This module handles parsing configuration from environment variables.
//!
//! # Environment Variables
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `POMODORO_SERVER_URL` | No | `http://127.0.0.1:8080` | Server base URL |
//! | `POMODORO_POLL_MS` | No | 1000 | Snapshot poll interval in `watch` mode |
//!
//! # Example
//!
//! ```no_run
//! use pomodoro_viewer::config::Config;
//!
//! let config = Config::from_env().expect("Failed to load configuration");
//! println!("Server URL: {}", config.server_url);
//! ```

use std::env;
use std::time::Duration;

use thiserror::Error;

/// Default server URL.
pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:8080";

/// Default poll interval in milliseconds.
const DEFAULT_POLL_MS: u64 = 1000;

/// Errors that can occur during configuration parsing.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Environment variable has an invalid value.
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Configuration for the Pomodoro Viewer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Base URL of the server, without a trailing slash.
    pub server_url: String,

    /// How often `watch` mode fetches a fresh snapshot.
    pub poll_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            poll_interval: Duration::from_millis(DEFAULT_POLL_MS),
        }
    }
}

impl Config {
    /// Creates a new `Config` by parsing environment variables.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if:
    /// - `POMODORO_SERVER_URL` is not an `http://` or `https://` URL
    /// - `POMODORO_POLL_MS` is not a positive integer
    pub fn from_env() -> Result<Self, ConfigError> {
        let server_url = match env::var("POMODORO_SERVER_URL") {
            Ok(url) if !url.trim().is_empty() => parse_server_url(&url)?,
            _ => DEFAULT_SERVER_URL.to_string(),
        };

        let poll_interval = match env::var("POMODORO_POLL_MS") {
            Ok(value) => parse_poll_ms(&value)?,
            Err(_) => Duration::from_millis(DEFAULT_POLL_MS),
        };

        Ok(Self {
            server_url,
            poll_interval,
        })
    }
}

fn parse_server_url(url: &str) -> Result<String, ConfigError> {
    let url = url.trim().trim_end_matches('/');
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(ConfigError::InvalidValue {
            key: "POMODORO_SERVER_URL".to_string(),
            message: format!("expected an http:// or https:// URL, got '{url}'"),
        });
    }
    Ok(url.to_string())
}

fn parse_poll_ms(value: &str) -> Result<Duration, ConfigError> {
    match value.trim().parse::<u64>() {
        Ok(ms) if ms > 0 => Ok(Duration::from_millis(ms)),
        _ => Err(ConfigError::InvalidValue {
            key: "POMODORO_POLL_MS".to_string(),
            message: format!("expected a positive number of milliseconds, got '{value}'"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    /// Helper to temporarily set environment variables for testing.
    struct EnvGuard {
        vars: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn new() -> Self {
            Self { vars: Vec::new() }
        }

        fn set(&mut self, key: &str, value: &str) {
            self.vars.push((key.to_string(), env::var(key).ok()));
            env::set_var(key, value);
        }

        fn remove(&mut self, key: &str) {
            self.vars.push((key.to_string(), env::var(key).ok()));
            env::remove_var(key);
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, value) in self.vars.iter().rev() {
                match value {
                    Some(v) => env::set_var(key, v),
                    None => env::remove_var(key),
                }
            }
        }
    }

    #[test]
    #[serial]
    fn test_defaults() {
        let mut guard = EnvGuard::new();
        guard.remove("POMODORO_SERVER_URL");
        guard.remove("POMODORO_POLL_MS");

        assert_eq!(Config::from_env().unwrap(), Config::default());
    }

    #[test]
    #[serial]
    fn test_custom_values() {
        let mut guard = EnvGuard::new();
        guard.set("POMODORO_SERVER_URL", "https://timer.example.com/");
        guard.set("POMODORO_POLL_MS", "250");

        let config = Config::from_env().unwrap();
        assert_eq!(config.server_url, "https://timer.example.com");
        assert_eq!(config.poll_interval, Duration::from_millis(250));
    }

    #[test]
    #[serial]
    fn test_invalid_values() {
        let mut guard = EnvGuard::new();
        guard.set("POMODORO_SERVER_URL", "timer.example.com");
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::InvalidValue { key, .. }) if key == "POMODORO_SERVER_URL"
        ));

        guard.remove("POMODORO_SERVER_URL");
        guard.set("POMODORO_POLL_MS", "0");
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::InvalidValue { key, .. }) if key == "POMODORO_POLL_MS"
        ));
    }
}
