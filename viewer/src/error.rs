//! Error types for the Pomodoro Viewer.

use thiserror::Error;

use pomodoro_server::error::ValidationError;

use crate::client::ClientError;
use crate::config::ConfigError;

/// Errors that can occur during viewer operations.
#[derive(Error, Debug)]
pub enum ViewerError {
    /// Configuration-related error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Talking to the server failed.
    #[error(transparent)]
    Client(#[from] ClientError),

    /// Settings were rejected before being sent.
    #[error("invalid settings: {0}")]
    Validation(#[from] ValidationError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_keeps_field_message() {
        let err: ViewerError = ValidationError::NonPositive { field: "focus" }.into();
        assert_eq!(
            err.to_string(),
            "invalid settings: focus duration must be greater than zero"
        );
    }

    #[test]
    fn client_error_is_transparent() {
        let err: ViewerError = ClientError::Rejected {
            code: "store_unavailable".to_string(),
            message: "session store unavailable".to_string(),
        }
        .into();
        assert_eq!(
            err.to_string(),
            "server rejected request (store_unavailable): session store unavailable"
        );
    }
}
