//! Wire types shared by the server and its Viewers.
//!
//! Everything here crosses the HTTP/WebSocket boundary as JSON. Session
//! fields keep their persisted names (`timer`, `isActive`, `sessionType`).

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CommandError;
use crate::session::{Durations, Phase, Session};

/// Kind of a [`SessionEvent`], used for subscriber filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Snapshot,
    Expired,
    Badge,
}

impl EventKind {
    pub const ALL: [Self; 3] = [Self::Snapshot, Self::Expired, Self::Badge];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Snapshot => "snapshot",
            Self::Expired => "expired",
            Self::Badge => "badge",
        }
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown event kind '{s}'"))
    }
}

/// A change published by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// The Session record was written.
    Snapshot {
        session: Session,
        durations: Durations,
        at: DateTime<Utc>,
    },

    /// A phase ran out. Sent exactly once per transition.
    Expired {
        completed: Phase,
        session: Session,
        at: DateTime<Utc>,
    },

    /// Short remaining-time text for an ambient indicator.
    Badge { text: String, at: DateTime<Utc> },
}

impl SessionEvent {
    #[must_use]
    pub fn snapshot(session: Session, durations: Durations) -> Self {
        Self::Snapshot {
            session,
            durations,
            at: Utc::now(),
        }
    }

    #[must_use]
    pub fn expired(completed: Phase, session: Session) -> Self {
        Self::Expired {
            completed,
            session,
            at: Utc::now(),
        }
    }

    #[must_use]
    pub fn badge(text: impl Into<String>) -> Self {
        Self::Badge {
            text: text.into(),
            at: Utc::now(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Snapshot { .. } => EventKind::Snapshot,
            Self::Expired { .. } => EventKind::Expired,
            Self::Badge { .. } => EventKind::Badge,
        }
    }
}

/// Intent commands a Viewer may send. The vocabulary is fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Flip `isActive`.
    ToggleTimer,
    /// Refill the current phase and pause.
    ResetTimer,
}

impl Command {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ToggleTimer => "toggleTimer",
            Self::ResetTimer => "resetTimer",
        }
    }

    /// Parses a command from a JSON message such as
    /// `{"command": "toggleTimer"}`.
    ///
    /// # Errors
    ///
    /// [`CommandError::Malformed`] if the text is not a command object,
    /// [`CommandError::Unknown`] if the name is outside the vocabulary.
    pub fn from_json(text: &str) -> Result<Self, CommandError> {
        let request: CommandRequest =
            serde_json::from_str(text).map_err(|err| CommandError::Malformed(err.to_string()))?;
        request.command.parse()
    }
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "toggleTimer" => Ok(Self::ToggleTimer),
            "resetTimer" => Ok(Self::ResetTimer),
            other => Err(CommandError::Unknown(other.to_string())),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request body carrying a command name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandRequest {
    pub command: String,
}

impl CommandRequest {
    #[must_use]
    pub fn new(command: Command) -> Self {
        Self {
            command: command.as_str().to_string(),
        }
    }
}

/// Acknowledgement sent for every command, successful or not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub ok: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<Session>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl Ack {
    #[must_use]
    pub fn success(command: Command, session: Session) -> Self {
        Self {
            ok: true,
            command: Some(command.as_str().to_string()),
            session: Some(session),
            error: None,
            code: None,
        }
    }

    #[must_use]
    pub fn failure(error: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            ok: false,
            command: None,
            session: None,
            error: Some(error.into()),
            code: Some(code.into()),
        }
    }

    #[must_use]
    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }
}

/// Current Session plus the durations needed to render it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session: Session,
    pub durations: Durations,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn session() -> Session {
        Session {
            timer: 90,
            is_active: true,
            session_type: Phase::Focus,
        }
    }

    #[test]
    fn command_vocabulary_is_fixed() {
        assert_eq!("toggleTimer".parse::<Command>(), Ok(Command::ToggleTimer));
        assert_eq!("resetTimer".parse::<Command>(), Ok(Command::ResetTimer));
        assert_eq!(
            "TOGGLETIMER".parse::<Command>(),
            Err(CommandError::Unknown("TOGGLETIMER".to_string()))
        );
    }

    #[test]
    fn command_from_json_distinguishes_malformed_and_unknown() {
        assert_eq!(
            Command::from_json(r#"{"command":"resetTimer"}"#),
            Ok(Command::ResetTimer)
        );
        assert!(matches!(
            Command::from_json(r#"{"command":"skip"}"#),
            Err(CommandError::Unknown(name)) if name == "skip"
        ));
        assert!(matches!(
            Command::from_json("toggleTimer"),
            Err(CommandError::Malformed(_))
        ));
    }

    #[test]
    fn ack_success_omits_error_fields() {
        let ack = Ack::success(Command::ToggleTimer, session());
        let value = serde_json::to_value(&ack).unwrap();
        assert_eq!(value["ok"], true);
        assert_eq!(value["command"], "toggleTimer");
        assert_eq!(value["session"]["timer"], 90);
        assert!(value.get("error").is_none());
    }

    #[test]
    fn ack_failure_carries_code() {
        let ack = Ack::failure("unknown command: nope", "unknown_command").with_command("nope");
        let value = serde_json::to_value(&ack).unwrap();
        assert_eq!(
            value,
            json!({
                "ok": false,
                "command": "nope",
                "error": "unknown command: nope",
                "code": "unknown_command"
            })
        );
    }

    #[test]
    fn events_are_tagged_by_kind() {
        let event = SessionEvent::badge("3m");
        assert_eq!(event.kind(), EventKind::Badge);

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "badge");
        assert_eq!(value["text"], "3m");

        let expired = SessionEvent::expired(Phase::Focus, session());
        assert_eq!(serde_json::to_value(&expired).unwrap()["completed"], "focus");
    }

    #[test]
    fn event_kind_parses_case_insensitively() {
        assert_eq!(" Expired ".parse::<EventKind>(), Ok(EventKind::Expired));
        assert!("tick".parse::<EventKind>().is_err());
    }
}
