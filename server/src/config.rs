//! Server configuration module.
//!
//! Parses configuration from environment variables for the Pomodoro server.
//!
//! # Environment Variables
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `PORT` | No | 8080 | HTTP server port |
//! | `POMODORO_BIND` | No | 127.0.0.1 | Address to bind |
//! | `POMODORO_STATE_PATH` | No | data dir | Session store file |
//! | `POMODORO_EPHEMERAL` | No | false | Keep the Session in memory only |
//! | `POMODORO_FOCUS_MINUTES` | No | 25 | Focus phase length |
//! | `POMODORO_BREAK_MINUTES` | No | 5 | Break phase length |
//! | `POMODORO_TICK_MS` | No | 1000 | Scheduler period |

use std::env;
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

use crate::session::Durations;
use crate::settings::parse_minutes;
use crate::store::FileStore;

/// Default HTTP server port.
const DEFAULT_PORT: u16 = 8080;

/// Default bind address. Local only.
const DEFAULT_BIND: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

const DEFAULT_TICK_MS: u64 = 1000;

/// Errors that can occur when parsing configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    /// Environment variable has invalid format.
    #[error("invalid format for {var}: {message}")]
    InvalidFormat { var: String, message: String },

    /// Port number is invalid.
    #[error("invalid port number: {0}")]
    InvalidPort(#[from] std::num::ParseIntError),

    /// Configuration validation failed.
    #[error("configuration validation failed: {0}")]
    ValidationError(String),
}

/// Server configuration parsed from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server port.
    pub port: u16,

    /// Address the HTTP server binds to.
    pub bind: IpAddr,

    /// Location of the Session store file. `None` when `ephemeral` is set.
    pub state_path: Option<PathBuf>,

    /// When true, the Session lives in memory and is lost on exit.
    pub ephemeral: bool,

    /// Durations the server starts with.
    pub durations: Durations,

    /// How often the scheduler ticks.
    pub tick_period: Duration,
}

impl Config {
    /// Parse configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - A variable has an invalid format
    /// - Port number is not a valid u16
    /// - A duration is not a positive whole number of minutes
    /// - No data directory can be found and no state path was given
    ///
    /// # Example
    ///
    /// ```no_run
    /// use pomodoro_server::config::Config;
    ///
    /// let config = Config::from_env().expect("Failed to load config");
    /// println!("Server will listen on port {}", config.port);
    /// ```
    pub fn from_env() -> Result<Self, ConfigError> {
        let port = parse_port()?;
        let bind = parse_bind()?;
        let ephemeral = parse_bool_env("POMODORO_EPHEMERAL");
        let durations = parse_durations()?;
        let tick_period = parse_tick_period()?;

        let state_path = match env::var("POMODORO_STATE_PATH") {
            Ok(path) if !path.trim().is_empty() => Some(PathBuf::from(path)),
            _ => None,
        };

        let mut config = Self {
            port,
            bind,
            state_path,
            ephemeral,
            durations,
            tick_period,
        };

        config.validate()?;

        if config.ephemeral {
            warn!("POMODORO_EPHEMERAL is enabled - the session will not survive a restart");
        }

        Ok(config)
    }

    /// Validate the configuration and fill in the default state path.
    fn validate(&mut self) -> Result<(), ConfigError> {
        if self.tick_period.is_zero() {
            return Err(ConfigError::ValidationError(
                "POMODORO_TICK_MS must be greater than zero".to_string(),
            ));
        }

        if self.ephemeral {
            if self.state_path.take().is_some() {
                warn!("POMODORO_STATE_PATH is ignored when POMODORO_EPHEMERAL is set");
            }
            return Ok(());
        }

        if self.state_path.is_none() {
            self.state_path = Some(FileStore::default_path().ok_or_else(|| {
                ConfigError::MissingEnvVar("POMODORO_STATE_PATH".to_string())
            })?);
        }

        Ok(())
    }
}

/// Parse a boolean environment variable.
///
/// Returns `true` if the variable is set to "true" (case-insensitive),
/// `false` otherwise.
fn parse_bool_env(name: &str) -> bool {
    env::var(name)
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Read an optional environment variable, rejecting non-unicode values.
fn optional_env(name: &str) -> Result<Option<String>, ConfigError> {
    match env::var(name) {
        Ok(value) => Ok(Some(value)),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(env::VarError::NotUnicode(_)) => Err(ConfigError::InvalidFormat {
            var: name.to_string(),
            message: "contains invalid unicode".to_string(),
        }),
    }
}

/// Parse the PORT environment variable.
///
/// Returns the default port if not set.
fn parse_port() -> Result<u16, ConfigError> {
    match optional_env("PORT")? {
        Some(port_str) => Ok(port_str.parse()?),
        None => Ok(DEFAULT_PORT),
    }
}

fn parse_bind() -> Result<IpAddr, ConfigError> {
    match optional_env("POMODORO_BIND")? {
        Some(addr) => addr.trim().parse().map_err(|_| ConfigError::InvalidFormat {
            var: "POMODORO_BIND".to_string(),
            message: format!("expected an IP address, got '{addr}'"),
        }),
        None => Ok(DEFAULT_BIND),
    }
}

/// Parse the focus and break minutes, falling back to 25 and 5.
fn parse_durations() -> Result<Durations, ConfigError> {
    let defaults = Durations::default();
    let focus = parse_minutes_env("POMODORO_FOCUS_MINUTES", "focus")?;
    let brk = parse_minutes_env("POMODORO_BREAK_MINUTES", "break")?;

    let focus = focus.unwrap_or(defaults.focus_secs() / 60);
    let brk = brk.unwrap_or(defaults.break_secs() / 60);

    Durations::from_minutes(focus, brk).map_err(|err| ConfigError::ValidationError(err.to_string()))
}

fn parse_minutes_env(var: &str, field: &'static str) -> Result<Option<u64>, ConfigError> {
    let Some(value) = optional_env(var)? else {
        return Ok(None);
    };
    parse_minutes(field, &value)
        .map(Some)
        .map_err(|err| ConfigError::InvalidFormat {
            var: var.to_string(),
            message: err.to_string(),
        })
}

fn parse_tick_period() -> Result<Duration, ConfigError> {
    let Some(value) = optional_env("POMODORO_TICK_MS")? else {
        return Ok(Duration::from_millis(DEFAULT_TICK_MS));
    };
    let millis: u64 = value.trim().parse().map_err(|_| ConfigError::InvalidFormat {
        var: "POMODORO_TICK_MS".to_string(),
        message: format!("expected milliseconds, got '{value}'"),
    })?;
    Ok(Duration::from_millis(millis))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    const VARS: [&str; 7] = [
        "PORT",
        "POMODORO_BIND",
        "POMODORO_STATE_PATH",
        "POMODORO_EPHEMERAL",
        "POMODORO_FOCUS_MINUTES",
        "POMODORO_BREAK_MINUTES",
        "POMODORO_TICK_MS",
    ];

    /// Helper to temporarily set environment variables for testing.
    struct EnvGuard {
        vars: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn new() -> Self {
            Self { vars: Vec::new() }
        }

        /// Starts from a clean slate of every variable this module reads.
        fn clean() -> Self {
            let mut guard = Self::new();
            for var in VARS {
                guard.remove(var);
            }
            guard
        }

        fn set(&mut self, key: &str, value: &str) {
            let old_value = env::var(key).ok();
            self.vars.push((key.to_string(), old_value));
            env::set_var(key, value);
        }

        fn remove(&mut self, key: &str) {
            let old_value = env::var(key).ok();
            self.vars.push((key.to_string(), old_value));
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
    fn test_config_defaults() {
        let mut guard = EnvGuard::clean();
        guard.set("POMODORO_STATE_PATH", "/tmp/pomodoro-test/session.json");

        let config = Config::from_env().expect("should parse config");
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.bind, DEFAULT_BIND);
        assert!(!config.ephemeral);
        assert_eq!(config.durations, Durations::default());
        assert_eq!(config.tick_period, Duration::from_secs(1));
        assert_eq!(
            config.state_path,
            Some(PathBuf::from("/tmp/pomodoro-test/session.json"))
        );
    }

    #[test]
    #[serial]
    fn test_config_custom_values() {
        let mut guard = EnvGuard::clean();
        guard.set("PORT", "9090");
        guard.set("POMODORO_BIND", "0.0.0.0");
        guard.set("POMODORO_EPHEMERAL", "TRUE");
        guard.set("POMODORO_FOCUS_MINUTES", "50");
        guard.set("POMODORO_BREAK_MINUTES", " 10 ");
        guard.set("POMODORO_TICK_MS", "250");

        let config = Config::from_env().expect("should parse config");
        assert_eq!(config.port, 9090);
        assert_eq!(config.bind.to_string(), "0.0.0.0");
        assert!(config.ephemeral);
        assert!(config.state_path.is_none());
        assert_eq!(config.durations.focus_secs(), 3000);
        assert_eq!(config.durations.break_secs(), 600);
        assert_eq!(config.tick_period, Duration::from_millis(250));
    }

    #[test]
    #[serial]
    fn test_ephemeral_drops_state_path() {
        let mut guard = EnvGuard::clean();
        guard.set("POMODORO_EPHEMERAL", "true");
        guard.set("POMODORO_STATE_PATH", "/tmp/ignored.json");

        let config = Config::from_env().expect("should parse config");
        assert!(config.state_path.is_none());
    }

    #[test]
    #[serial]
    fn test_invalid_minutes() {
        let mut guard = EnvGuard::clean();
        guard.set("POMODORO_EPHEMERAL", "true");
        guard.set("POMODORO_FOCUS_MINUTES", "0");

        let err = Config::from_env().unwrap_err();
        assert!(
            matches!(err, ConfigError::InvalidFormat { ref var, .. } if var == "POMODORO_FOCUS_MINUTES")
        );

        guard.set("POMODORO_FOCUS_MINUTES", "25");
        guard.set("POMODORO_BREAK_MINUTES", "five");
        let err = Config::from_env().unwrap_err();
        assert!(
            matches!(err, ConfigError::InvalidFormat { ref var, .. } if var == "POMODORO_BREAK_MINUTES")
        );
    }

    #[test]
    #[serial]
    fn test_invalid_bind() {
        let mut guard = EnvGuard::clean();
        guard.set("POMODORO_BIND", "localhost:80");

        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidFormat { ref var, .. } if var == "POMODORO_BIND"));
    }

    #[test]
    #[serial]
    fn test_zero_tick_period_rejected() {
        let mut guard = EnvGuard::clean();
        guard.set("POMODORO_STATE_PATH", "/tmp/pomodoro-test/session.json");
        guard.set("POMODORO_TICK_MS", "0");

        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    #[serial]
    fn test_parse_bool_env() {
        let mut guard = EnvGuard::new();
        guard.set("TEST_BOOL", "True");
        assert!(parse_bool_env("TEST_BOOL"));

        guard.set("TEST_BOOL", "yes");
        assert!(!parse_bool_env("TEST_BOOL"));

        guard.remove("TEST_BOOL");
        assert!(!parse_bool_env("TEST_BOOL"));
    }

    #[test]
    #[serial]
    fn test_parse_port_default() {
        let mut guard = EnvGuard::new();
        guard.remove("PORT");

        let port = parse_port().expect("should parse port");
        assert_eq!(port, DEFAULT_PORT);
    }

    #[test]
    #[serial]
    fn test_parse_port_invalid() {
        let mut guard = EnvGuard::new();
        guard.set("PORT", "not-a-number");
        assert!(matches!(parse_port().unwrap_err(), ConfigError::InvalidPort(_)));

        guard.set("PORT", "99999");
        assert!(parse_port().is_err());
    }
}
