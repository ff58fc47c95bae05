//! Error types for the Pomodoro server.
//!
//! # Error Types
//!
//! - [`ValidationError`] - Rejected duration settings (user-visible message)
//! - [`CommandError`] - Unknown or malformed intent commands
//! - [`ServerError`] - Top-level error encompassing every failure mode
//!
//! Store failures are described by [`StoreError`] and configuration failures
//! by [`ConfigError`]; both live next to the code that raises them.
//!
//! No error in this crate is fatal to a running server. Store failures skip
//! the current tick or intent, and the next cycle retries from whatever the
//! store holds.

use std::error::Error;
use std::fmt;

use thiserror::Error as ThisError;

use crate::config::ConfigError;
use crate::store::StoreError;

/// Invalid duration settings.
///
/// The `Display` output is meant to be shown to the user as-is.
#[derive(ThisError, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A duration field was not supplied.
    #[error("{field} duration is required")]
    Missing {
        /// Which duration (`focus` or `break`).
        field: &'static str,
    },

    /// A duration could not be read as a whole number.
    #[error("{field} duration must be a whole number of minutes, got '{input}'")]
    NotANumber {
        /// Which duration (`focus` or `break`).
        field: &'static str,
        /// The rejected input.
        input: String,
    },

    /// A duration was zero or negative.
    #[error("{field} duration must be greater than zero")]
    NonPositive {
        /// Which duration (`focus` or `break`).
        field: &'static str,
    },

    /// A duration does not fit in seconds.
    #[error("{field} duration is too large")]
    TooLarge {
        /// Which duration (`focus` or `break`).
        field: &'static str,
    },

    /// The settings body is not a JSON object.
    #[error("settings must be a JSON object: {0}")]
    Malformed(String),
}

/// A Viewer sent a command outside the fixed vocabulary.
#[derive(ThisError, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// The command name is not recognised.
    #[error("unknown command: {0}")]
    Unknown(String),

    /// The message could not be parsed as a command at all.
    #[error("malformed command: {0}")]
    Malformed(String),
}

impl CommandError {
    /// Short machine-readable code used in acknowledgements.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unknown(_) => "unknown_command",
            Self::Malformed(_) => "malformed_command",
        }
    }
}

/// Top-level error type for the Pomodoro server.
///
/// # Error Categories
///
/// - **Configuration errors**: Problems loading server config at startup
/// - **Store errors**: The key-value store could not be read or written
/// - **Validation errors**: Rejected duration settings
/// - **Command errors**: Unknown intent commands
/// - **Internal errors**: Anything else
#[derive(Debug)]
pub enum ServerError {
    /// Configuration error during server initialization.
    Config(ConfigError),

    /// Session Store read or write failure.
    Store(StoreError),

    /// Duration settings failed validation.
    Validation(ValidationError),

    /// A Viewer sent an unknown or malformed command.
    Command(CommandError),

    /// Unexpected internal failure.
    Internal(String),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(err) => write!(f, "configuration error: {err}"),
            Self::Store(err) => write!(f, "store error: {err}"),
            Self::Validation(err) => write!(f, "validation error: {err}"),
            Self::Command(err) => write!(f, "command error: {err}"),
            Self::Internal(msg) => write!(f, "internal server error: {msg}"),
        }
    }
}

impl Error for ServerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Config(err) => Some(err),
            Self::Store(err) => Some(err),
            Self::Validation(err) => Some(err),
            Self::Command(err) => Some(err),
            Self::Internal(_) => None,
        }
    }
}

impl From<ConfigError> for ServerError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err)
    }
}

impl From<StoreError> for ServerError {
    fn from(err: StoreError) -> Self {
        Self::Store(err)
    }
}

impl From<ValidationError> for ServerError {
    fn from(err: ValidationError) -> Self {
        Self::Validation(err)
    }
}

impl From<CommandError> for ServerError {
    fn from(err: CommandError) -> Self {
        Self::Command(err)
    }
}

impl ServerError {
    /// Creates a new internal error.
    ///
    /// # Example
    ///
    /// ```rust
    /// use pomodoro_server::error::ServerError;
    ///
    /// let err = ServerError::internal("scheduler task panicked");
    /// assert!(matches!(err, ServerError::Internal(_)));
    /// ```
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns `true` if the caller sent something invalid.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::Command(_))
    }

    /// Returns `true` if this error indicates a server-side problem.
    pub fn is_server_error(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Store(_) | Self::Internal(_))
    }
}

/// A specialized Result type for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;
