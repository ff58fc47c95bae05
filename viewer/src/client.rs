//! HTTP client for the Pomodoro server.
//!
//! This module talks to the server's HTTP API:
//!
//! - `GET /session` for snapshots
//! - `POST /commands` for `toggleTimer` and `resetTimer`
//! - `PUT /settings` for new focus/break durations
//! - Exponential backoff for watch mode (1s → 30s max, ±25% jitter)
//!
//! The client never keeps a countdown of its own. Every display is derived
//! from the latest snapshot the server returned.
//!
//! # Example
//!
//! ```no_run
//! use pomodoro_server::types::Command;
//! use pomodoro_viewer::client::ViewerClient;
//!
//! #[tokio::main]
//! async fn main() {
//!     let client = ViewerClient::new("http://127.0.0.1:8080").unwrap();
//!     let ack = client.command(Command::ToggleTimer).await.unwrap();
//!     println!("running: {:?}", ack.session.map(|s| s.is_active));
//! }
//! ```

use std::time::Duration;

use rand::Rng;
use reqwest::{Client, Response, StatusCode};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use pomodoro_server::routes::{ErrorResponse, SettingsResponse};
use pomodoro_server::settings::SettingsRequest;
use pomodoro_server::types::{Ack, Command, CommandRequest, SessionSnapshot};

/// Initial retry delay in seconds.
const INITIAL_RETRY_DELAY_SECS: u64 = 1;

/// Maximum retry delay in seconds.
const MAX_RETRY_DELAY_SECS: u64 = 30;

/// Jitter factor (±25%).
const JITTER_FACTOR: f64 = 0.25;

/// HTTP request timeout.
const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Errors that can occur while talking to the server.
#[derive(Error, Debug)]
pub enum ClientError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Server answered with an unexpected status and no readable body.
    #[error("server error {status}: {message}")]
    Server { status: u16, message: String },

    /// Server understood the request and refused it.
    #[error("server rejected request ({code}): {message}")]
    Rejected { code: String, message: String },

    /// Response body could not be decoded.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Bounds of the watch-mode retry delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub initial: Duration,
    pub max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(INITIAL_RETRY_DELAY_SECS),
            max: Duration::from_secs(MAX_RETRY_DELAY_SECS),
        }
    }
}

/// Client for the Pomodoro server API.
pub struct ViewerClient {
    client: Client,
    base_url: String,
    retry: RetryPolicy,
    current_retry_delay: Duration,
}

impl ViewerClient {
    /// Creates a client for the server at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Http`] if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        Self::with_retry_policy(base_url, RetryPolicy::default())
    }

    /// Creates a client with custom watch-mode retry bounds.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Http`] if the HTTP client cannot be built.
    pub fn with_retry_policy(
        base_url: impl Into<String>,
        retry: RetryPolicy,
    ) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            retry,
            current_retry_delay: retry.initial,
        })
    }

    /// Base URL requests are sent to.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Delay the next failed watch poll will wait, before jitter.
    #[must_use]
    pub fn current_retry_delay(&self) -> Duration {
        self.current_retry_delay
    }

    /// Fetches the current Session and durations.
    ///
    /// # Errors
    ///
    /// Any transport, status or decoding failure.
    pub async fn session(&self) -> Result<SessionSnapshot, ClientError> {
        let url = format!("{}/session", self.base_url);
        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Sends one intent and returns its acknowledgement.
    ///
    /// # Errors
    ///
    /// [`ClientError::Rejected`] when the server acknowledges with `ok: false`,
    /// otherwise any transport, status or decoding failure.
    pub async fn command(&self, command: Command) -> Result<Ack, ClientError> {
        let url = format!("{}/commands", self.base_url);
        debug!(command = %command, "Sending command");

        let response = self
            .client
            .post(&url)
            .json(&CommandRequest::new(command))
            .send()
            .await?;

        let status = response.status();
        let bytes = response.bytes().await?;
        let ack: Ack = match serde_json::from_slice(&bytes) {
            Ok(ack) => ack,
            Err(err) if status.is_success() => return Err(err.into()),
            Err(_) => return Err(server_error(status, &bytes)),
        };

        if !ack.ok {
            return Err(ClientError::Rejected {
                code: ack.code.unwrap_or_default(),
                message: ack.error.unwrap_or_default(),
            });
        }
        Ok(ack)
    }

    /// Replaces the focus and break durations.
    ///
    /// # Errors
    ///
    /// [`ClientError::Rejected`] with code `invalid_settings` when the server
    /// refuses the values, otherwise any transport, status or decoding failure.
    pub async fn update_settings(
        &self,
        request: &SettingsRequest,
    ) -> Result<SettingsResponse, ClientError> {
        let url = format!("{}/settings", self.base_url);
        let response = self.client.put(&url).json(request).send().await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Fetches a snapshot, retrying until the server answers.
    ///
    /// Each failure is logged and followed by a jittered wait that doubles up
    /// to the policy maximum. A success resets the delay.
    pub async fn session_with_retry(&mut self) -> SessionSnapshot {
        loop {
            match self.session().await {
                Ok(snapshot) => {
                    if self.current_retry_delay != self.retry.initial {
                        info!("Connection to server restored");
                    }
                    self.reset_retry_delay();
                    return snapshot;
                }
                Err(err) => {
                    let delay = self.add_jitter(self.current_retry_delay);
                    warn!(
                        error = %err,
                        delay_ms = delay.as_millis() as u64,
                        "Failed to fetch session, retrying"
                    );
                    sleep(delay).await;
                    self.increase_retry_delay();
                }
            }
        }
    }

    /// Adds ±25% jitter to a duration.
    fn add_jitter(&self, duration: Duration) -> Duration {
        let mut rng = rand::rng();
        let jitter_range = duration.as_secs_f64() * JITTER_FACTOR;
        let jitter = rng.random_range(-jitter_range..=jitter_range);
        let new_secs = (duration.as_secs_f64() + jitter).max(0.001);
        Duration::from_secs_f64(new_secs)
    }

    /// Doubles the retry delay up to the maximum.
    fn increase_retry_delay(&mut self) {
        self.current_retry_delay = (self.current_retry_delay * 2).min(self.retry.max);
    }

    /// Resets the retry delay to the initial value.
    fn reset_retry_delay(&mut self) {
        self.current_retry_delay = self.retry.initial;
    }
}

async fn error_from_response(response: Response) -> ClientError {
    let status = response.status();
    match response.bytes().await {
        Ok(bytes) => server_error(status, &bytes),
        Err(err) => err.into(),
    }
}

fn server_error(status: StatusCode, body: &[u8]) -> ClientError {
    match serde_json::from_slice::<ErrorResponse>(body) {
        Ok(ErrorResponse {
            error,
            code: Some(code),
        }) => ClientError::Rejected {
            code,
            message: error,
        },
        Ok(ErrorResponse { error, code: None }) => ClientError::Server {
            status: status.as_u16(),
            message: error,
        },
        Err(_) => ClientError::Server {
            status: status.as_u16(),
            message: String::from_utf8_lossy(body).into_owned(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> ViewerClient {
        ViewerClient::new("http://127.0.0.1:8080/").unwrap()
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        assert_eq!(client().base_url(), "http://127.0.0.1:8080");
    }

    #[test]
    fn jitter_stays_within_a_quarter() {
        let client = client();
        let base = Duration::from_secs(4);
        for _ in 0..100 {
            let jittered = client.add_jitter(base);
            assert!(jittered >= Duration::from_secs(3));
            assert!(jittered <= Duration::from_secs(5));
        }
    }

    #[test]
    fn retry_delay_doubles_to_the_cap_and_resets() {
        let mut client = client();
        assert_eq!(client.current_retry_delay(), Duration::from_secs(1));

        let mut seen = Vec::new();
        for _ in 0..7 {
            client.increase_retry_delay();
            seen.push(client.current_retry_delay().as_secs());
        }
        assert_eq!(seen, vec![2, 4, 8, 16, 30, 30, 30]);

        client.reset_retry_delay();
        assert_eq!(client.current_retry_delay(), Duration::from_secs(1));
    }

    #[test]
    fn coded_error_body_becomes_rejection() {
        let body = br#"{"error":"focus duration must be greater than zero","code":"invalid_settings"}"#;
        match server_error(StatusCode::UNPROCESSABLE_ENTITY, body) {
            ClientError::Rejected { code, message } => {
                assert_eq!(code, "invalid_settings");
                assert!(message.contains("focus"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn unreadable_body_keeps_status() {
        match server_error(StatusCode::BAD_GATEWAY, b"upstream down") {
            ClientError::Server { status, message } => {
                assert_eq!(status, 502);
                assert_eq!(message, "upstream down");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
