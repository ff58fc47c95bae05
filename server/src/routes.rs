//! HTTP route handlers for the Pomodoro server.
//!
//! This module provides the HTTP API endpoints:
//!
//! - `GET /session` - Current Session and durations
//! - `POST /commands` - `toggleTimer` / `resetTimer` intents
//! - `PUT /settings` - Replace the focus and break durations
//! - `GET /ws` - WebSocket subscription endpoint for Viewers
//! - `GET /health` - Health check endpoint
//!
//! # Architecture
//!
//! All routes share application state through [`AppState`], which contains:
//! - The [`SessionController`], the only writer of the Session Store
//! - Session broadcaster for pushing changes to WebSocket clients
//! - Server start time for uptime reporting
//!
//! Handlers never touch the store directly. Every read and write goes
//! through the controller so intents and scheduler ticks stay serialized.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use pomodoro_server::config::Config;
//! use pomodoro_server::controller::SessionController;
//! use pomodoro_server::routes::{create_router, AppState};
//! use pomodoro_server::store::MemoryStore;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Config::from_env().expect("failed to load config");
//!     let controller = SessionController::new(Arc::new(MemoryStore::new()), config.durations);
//!     let app = create_router(AppState::new(controller));
//!
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:8080").await.unwrap();
//!     axum::serve(listener, app).await.unwrap();
//! }
//! ```

use axum::{
    body::Bytes,
    extract::{
        ws::{Message, WebSocket},
        DefaultBodyLimit, Query, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, trace, warn};

use crate::broadcast::{SessionBroadcaster, SubscriberFilter};
use crate::controller::SessionController;
use crate::error::{CommandError, ServerError, ValidationError};
use crate::session::{Durations, Session};
use crate::settings::SettingsRequest;
use crate::types::{Ack, Command, SessionEvent, SessionSnapshot};

// ============================================================================
// Constants
// ============================================================================

/// Maximum body size for commands and settings (16 KB).
const MAX_BODY_SIZE: usize = 16 * 1024;

/// Pending acknowledgements per WebSocket connection.
const ACK_QUEUE_SIZE: usize = 16;

// ============================================================================
// Application State
// ============================================================================

/// Shared application state for all route handlers.
///
/// Cloned for each request handler; every field is cheap to clone.
#[derive(Clone)]
pub struct AppState {
    /// Serialized access to the Session Store.
    pub controller: SessionController,

    /// Publishes Session changes to WebSocket clients.
    pub broadcaster: SessionBroadcaster,

    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    /// Creates application state around an existing controller.
    #[must_use]
    pub fn new(controller: SessionController) -> Self {
        Self {
            broadcaster: controller.broadcaster().clone(),
            controller,
            start_time: Instant::now(),
        }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("controller", &self.controller)
            .field("start_time", &self.start_time)
            .finish()
    }
}

// ============================================================================
// Router
// ============================================================================

/// Creates the application router with all routes configured.
///
/// # Returns
///
/// An axum `Router` with the following routes:
/// - `GET /session` - Current Session
/// - `POST /commands` - Intent commands
/// - `PUT /settings` - Duration settings
/// - `GET /ws` - WebSocket subscription endpoint
/// - `GET /health` - Health check endpoint
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/session", get(get_session))
        .route("/commands", post(post_commands))
        .route("/settings", put(put_settings))
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .route("/ws", get(get_ws))
        .route("/health", get(get_health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ============================================================================
// Error Response Types
// ============================================================================

/// JSON error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ErrorResponse {
    fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: None,
        }
    }

    fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            Self::Validation(err) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorResponse::new(err.to_string()).with_code("invalid_settings"),
            ),
            Self::Command(err) => (
                StatusCode::BAD_REQUEST,
                ErrorResponse::new(err.to_string()).with_code(err.code()),
            ),
            Self::Store(err) => (
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorResponse::new(err.to_string()).with_code("store_unavailable"),
            ),
            Self::Config(_) | Self::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse::new("internal server error").with_code("server_error"),
            ),
        };

        if self.is_server_error() {
            warn!(error = %self, "Request failed");
        } else {
            debug!(error = %self, "Request rejected");
        }
        (status, Json(body)).into_response()
    }
}

// ============================================================================
// GET /session - Current Session
// ============================================================================

/// GET /session - Current Session and durations.
///
/// Always read fresh from the store.
///
/// # Responses
///
/// - `200 OK` - `{ "session": {...}, "durations": {...} }`
/// - `503 Service Unavailable` - Store could not be read
async fn get_session(
    State(state): State<AppState>,
) -> Result<Json<SessionSnapshot>, ServerError> {
    Ok(Json(state.controller.snapshot().await?))
}

// ============================================================================
// POST /commands - Intents
// ============================================================================

/// POST /commands - Run a `toggleTimer` or `resetTimer` intent.
///
/// # Request Body
///
/// `{"command": "toggleTimer"}`
///
/// # Responses
///
/// - `200 OK` - Ack with the resulting Session
/// - `400 Bad Request` - Unknown or malformed command
/// - `503 Service Unavailable` - Store failure; nothing changed
async fn post_commands(State(state): State<AppState>, body: Bytes) -> Response {
    let text = String::from_utf8_lossy(&body);
    let (status, ack) = run_command(&state.controller, &text).await;
    (status, Json(ack)).into_response()
}

/// Parses and runs one command, producing the acknowledgement to send back.
///
/// Shared by `POST /commands` and WebSocket text frames.
async fn run_command(controller: &SessionController, text: &str) -> (StatusCode, Ack) {
    let command = match Command::from_json(text) {
        Ok(command) => command,
        Err(err) => {
            debug!(error = %err, "Rejected command");
            let ack = Ack::failure(err.to_string(), err.code());
            let ack = match err {
                CommandError::Unknown(name) => ack.with_command(name),
                CommandError::Malformed(_) => ack,
            };
            return (StatusCode::BAD_REQUEST, ack);
        }
    };

    match controller.execute(command).await {
        Ok(session) => {
            debug!(command = %command, "Command applied");
            (StatusCode::OK, Ack::success(command, session))
        }
        Err(err) => {
            warn!(command = %command, error = %err, "Command failed: session store unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Ack::failure(err.to_string(), "store_unavailable").with_command(command.as_str()),
            )
        }
    }
}

// ============================================================================
// PUT /settings - Durations
// ============================================================================

/// Response body for a successful settings update.
#[derive(Debug, Serialize, Deserialize)]
pub struct SettingsResponse {
    pub durations: Durations,
    pub session: Session,
}

/// PUT /settings - Replace the focus and break durations.
///
/// # Request Body
///
/// `{"focusMinutes": 25, "breakMinutes": 5}`. Values may also be numeric
/// strings as typed into a form.
///
/// # Responses
///
/// - `200 OK` - New durations and the (possibly refilled) Session
/// - `422 Unprocessable Entity` - Validation failed; nothing changed
/// - `503 Service Unavailable` - Durations kept, Session could not be refilled
async fn put_settings(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<SettingsResponse>, ServerError> {
    let request: SettingsRequest = serde_json::from_slice(&body).map_err(|err| {
        debug!(error = %err, "Failed to parse settings payload");
        ServerError::Validation(ValidationError::Malformed(err.to_string()))
    })?;

    let durations = request.validate()?;
    let session = state.controller.update_durations(durations).await?;

    Ok(Json(SettingsResponse { durations, session }))
}

// ============================================================================
// GET /ws - WebSocket Subscription
// ============================================================================

/// Query parameters for WebSocket subscription.
#[derive(Debug, Deserialize)]
pub struct WsQueryParams {
    /// Comma-separated event kinds, e.g. `snapshot,expired`. All when absent.
    pub events: Option<String>,
}

impl WsQueryParams {
    /// Builds a `SubscriberFilter` from the query parameters.
    fn to_filter(&self) -> Result<SubscriberFilter, String> {
        match &self.events {
            Some(list) => SubscriberFilter::parse(list),
            None => Ok(SubscriberFilter::new()),
        }
    }
}

/// GET /ws - WebSocket subscription endpoint.
///
/// # Query Parameters
///
/// - `events` - Event kinds to receive (`snapshot`, `expired`, `badge`)
///
/// # WebSocket Protocol
///
/// On connect the server sends the current Session as a `snapshot` event,
/// then every matching event as it happens. Text frames sent by the client
/// are treated as commands and answered with an ack frame.
///
/// # Responses
///
/// - `101 Switching Protocols` - WebSocket upgrade successful
/// - `400 Bad Request` - Unknown event kind in `events`
async fn get_ws(
    State(state): State<AppState>,
    Query(params): Query<WsQueryParams>,
    ws: WebSocketUpgrade,
) -> Response {
    let filter = match params.to_filter() {
        Ok(filter) => filter,
        Err(message) => {
            debug!(error = %message, "Invalid event filter in WebSocket request");
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::new(message).with_code("invalid_filter")),
            )
                .into_response();
        }
    };

    info!(filter = ?filter, "WebSocket client connecting");

    ws.on_upgrade(move |socket| handle_websocket(socket, state.controller, filter))
}

/// Handles an established WebSocket connection.
///
/// One task owns the sink and writes both broadcast events and command
/// acks; this task reads client frames.
async fn handle_websocket(socket: WebSocket, controller: SessionController, filter: SubscriberFilter) {
    let (mut sender, mut receiver) = socket.split();
    let mut event_rx = controller.broadcaster().subscribe();
    let (ack_tx, mut ack_rx) = mpsc::channel::<Ack>(ACK_QUEUE_SIZE);

    let initial = match controller.snapshot().await {
        Ok(snapshot) => Some(SessionEvent::snapshot(snapshot.session, snapshot.durations)),
        Err(err) => {
            warn!(error = %err, "Could not read session for new WebSocket client");
            None
        }
    };

    info!("WebSocket client connected");

    let forward_task = tokio::spawn(async move {
        if let Some(event) = initial {
            if let Err(err) = send_json(&mut sender, &event).await {
                debug!(error = %err, "Failed to send initial snapshot");
                return;
            }
        }

        loop {
            let sent = tokio::select! {
                received = event_rx.recv() => match received {
                    Ok(event) => {
                        if !filter.matches(&event) {
                            continue;
                        }
                        trace!(kind = event.kind().as_str(), "Sending event to WebSocket client");
                        send_json(&mut sender, &event).await
                    }
                    Err(RecvError::Lagged(count)) => {
                        warn!(skipped = count, "WebSocket client lagged, skipped events");
                        continue;
                    }
                    Err(RecvError::Closed) => {
                        debug!("Session broadcaster closed");
                        break;
                    }
                },
                ack = ack_rx.recv() => match ack {
                    Some(ack) => send_json(&mut sender, &ack).await,
                    None => break,
                },
            };

            if let Err(err) = sent {
                debug!(error = %err, "Failed to send to WebSocket client");
                break;
            }
        }
    });

    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                let (_, ack) = run_command(&controller, text.as_str()).await;
                if ack_tx.send(ack).await.is_err() {
                    break;
                }
            }
            Ok(Message::Close(_)) => {
                debug!("WebSocket client sent close frame");
                break;
            }
            Ok(Message::Ping(data)) => {
                // axum handles pong automatically
                trace!(data_len = data.len(), "Received ping");
            }
            Ok(_) => {}
            Err(err) => {
                debug!(error = %err, "WebSocket error");
                break;
            }
        }
    }

    forward_task.abort();
    info!("WebSocket client disconnected");
}

/// Serializes `value` and sends it as a text frame.
async fn send_json<T: Serialize>(
    sender: &mut SplitSink<WebSocket, Message>,
    value: &T,
) -> Result<(), axum::Error> {
    match serde_json::to_string(value) {
        Ok(json) => sender.send(Message::Text(json.into())).await,
        Err(err) => {
            error!(error = %err, "Failed to serialize WebSocket message");
            Ok(())
        }
    }
}

// ============================================================================
// GET /health - Health Check
// ============================================================================

/// Response body for health check endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Server status (always "ok" if responding).
    pub status: String,

    /// Number of active WebSocket connections.
    pub connections: usize,

    /// Server uptime in seconds.
    pub uptime_seconds: u64,
}

/// GET /health - Health check endpoint.
///
/// # Response
///
/// ```json
/// {
///   "status": "ok",
///   "connections": 2,
///   "uptime_seconds": 3600
/// }
/// ```
async fn get_health(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = state.start_time.elapsed();

    Json(HealthResponse {
        status: "ok".to_string(),
        connections: state.broadcaster.subscriber_count(),
        uptime_seconds: uptime.as_secs(),
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;

    use crate::session::Phase;
    use crate::store::MemoryStore;

    fn test_state(session: Session) -> (AppState, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::with_session(session));
        let controller = SessionController::new(store.clone(), Durations::default());
        (AppState::new(controller), store)
    }

    fn focus(timer: u64, is_active: bool) -> Session {
        Session {
            timer,
            is_active,
            session_type: Phase::Focus,
        }
    }

    async fn send(app: Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => request
                .header("content-type", "application/json")
                .body(Body::from(body.to_string())),
            None => request.body(Body::empty()),
        }
        .unwrap();

        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    // ========================================================================
    // Health endpoint tests
    // ========================================================================

    #[tokio::test]
    async fn health_returns_ok_status() {
        let (state, _store) = test_state(focus(1500, false));
        let (status, body) = send(create_router(state), "GET", "/health", None).await;

        assert_eq!(status, StatusCode::OK);
        let health: HealthResponse = serde_json::from_value(body).unwrap();
        assert_eq!(health.status, "ok");
        assert_eq!(health.connections, 0);
    }

    #[tokio::test]
    async fn health_reports_subscriber_count() {
        let (state, _store) = test_state(focus(1500, false));
        let _subscriber = state.broadcaster.subscribe();
        let (_, body) = send(create_router(state), "GET", "/health", None).await;

        assert_eq!(body["connections"], 1);
    }

    // ========================================================================
    // GET /session tests
    // ========================================================================

    #[tokio::test]
    async fn session_returns_stored_state() {
        let (state, _store) = test_state(focus(734, true));
        let (status, body) = send(create_router(state), "GET", "/session", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({
                "session": {"timer": 734, "isActive": true, "sessionType": "focus"},
                "durations": {"focus": 1500, "break": 300}
            })
        );
    }

    #[tokio::test]
    async fn session_store_failure_is_503() {
        let (state, store) = test_state(focus(734, true));
        store.fail_next_loads(1);
        let (status, body) = send(create_router(state), "GET", "/session", None).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["code"], "store_unavailable");
    }

    // ========================================================================
    // POST /commands tests
    // ========================================================================

    #[tokio::test]
    async fn toggle_command_starts_timer() {
        let (state, store) = test_state(focus(1500, false));
        let (status, body) = send(
            create_router(state),
            "POST",
            "/commands",
            Some(json!({"command": "toggleTimer"})),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);
        assert_eq!(body["command"], "toggleTimer");
        assert_eq!(body["session"]["isActive"], true);
        assert_eq!(store.record().await.is_active, Some(true));
    }

    #[tokio::test]
    async fn reset_command_refills_phase() {
        let (state, _store) = test_state(focus(734, true));
        let (_, body) = send(
            create_router(state),
            "POST",
            "/commands",
            Some(json!({"command": "resetTimer"})),
        )
        .await;

        assert_eq!(
            body["session"],
            json!({"timer": 1500, "isActive": false, "sessionType": "focus"})
        );
    }

    #[tokio::test]
    async fn unknown_command_is_rejected_without_state_change() {
        let (state, store) = test_state(focus(734, true));
        let (status, body) = send(
            create_router(state),
            "POST",
            "/commands",
            Some(json!({"command": "skipPhase"})),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body,
            json!({
                "ok": false,
                "command": "skipPhase",
                "error": "unknown command: skipPhase",
                "code": "unknown_command"
            })
        );
        assert_eq!(store.save_count(), 0);
    }

    #[tokio::test]
    async fn malformed_command_is_rejected() {
        let (state, _store) = test_state(focus(734, true));
        let (status, body) =
            send(create_router(state), "POST", "/commands", Some(json!(["toggleTimer"]))).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "malformed_command");
    }

    #[tokio::test]
    async fn command_store_failure_is_503_and_changes_nothing() {
        let (state, store) = test_state(focus(734, true));
        store.fail_next_saves(1);
        let (status, body) = send(
            create_router(state),
            "POST",
            "/commands",
            Some(json!({"command": "toggleTimer"})),
        )
        .await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["ok"], false);
        assert_eq!(body["code"], "store_unavailable");
        assert_eq!(store.record().await.is_active, Some(true));
    }

    // ========================================================================
    // PUT /settings tests
    // ========================================================================

    #[tokio::test]
    async fn settings_update_refills_fresh_idle_phase() {
        let (state, store) = test_state(focus(1500, false));
        let (status, body) = send(
            create_router(state),
            "PUT",
            "/settings",
            Some(json!({"focusMinutes": 10, "breakMinutes": "5"})),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["durations"], json!({"focus": 600, "break": 300}));
        assert_eq!(body["session"]["timer"], 600);
        assert_eq!(store.record().await.timer, Some(600));
    }

    #[tokio::test]
    async fn invalid_settings_are_422_and_touch_nothing() {
        let (state, store) = test_state(focus(1500, false));
        let controller = state.controller.clone();
        let (status, body) = send(
            create_router(state),
            "PUT",
            "/settings",
            Some(json!({"focusMinutes": "abc", "breakMinutes": 5})),
        )
        .await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["code"], "invalid_settings");
        assert_eq!(
            body["error"],
            "focus duration must be a whole number of minutes, got 'abc'"
        );
        assert_eq!(store.save_count(), 0);
        assert_eq!(controller.durations().await, Durations::default());
    }

    #[tokio::test]
    async fn settings_body_must_be_json() {
        let (state, _store) = test_state(focus(1500, false));
        let app = create_router(state);
        let response = app
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri("/settings")
                    .body(Body::from("focus=10"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    // ========================================================================
    // GET /ws tests
    // ========================================================================

    #[test]
    fn ws_query_builds_filter() {
        let params = WsQueryParams {
            events: Some("expired".to_string()),
        };
        let filter = params.to_filter().unwrap();
        assert!(filter.matches(&SessionEvent::expired(Phase::Focus, focus(300, false))));
        assert!(!filter.matches(&SessionEvent::badge("Done")));

        let all = WsQueryParams { events: None }.to_filter().unwrap();
        assert!(all.is_empty());
    }
}
