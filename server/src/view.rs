//! Display fields derived from a Session snapshot.
//!
//! Viewers call [`SessionView::derive`] on every snapshot they observe and
//! never keep progress of their own between snapshots.

use serde::{Deserialize, Serialize};

use crate::session::{Durations, Phase, Session};

/// Badge text shown when a phase runs out.
pub const BADGE_DONE: &str = "Done";

/// Formats seconds as `m:ss`.
///
/// ```rust
/// use pomodoro_server::view::format_clock;
///
/// assert_eq!(format_clock(1500), "25:00");
/// assert_eq!(format_clock(61), "1:01");
/// assert_eq!(format_clock(0), "0:00");
/// ```
#[must_use]
pub fn format_clock(seconds: u64) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

/// Fraction of the current phase already elapsed, in `[0, 1]`.
#[must_use]
pub fn progress(session: &Session, durations: &Durations) -> f64 {
    let total = durations.for_phase(session.session_type);
    if total == 0 {
        return 0.0;
    }
    let remaining = session.timer.min(total) as f64;
    (1.0 - remaining / total as f64).clamp(0.0, 1.0)
}

/// Text for an ambient remaining-time indicator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Badge {
    /// Whole minutes left, rounded up.
    Minutes(u64),
    /// The phase just ran out.
    Done,
    /// The timer is not running.
    Cleared,
}

impl Badge {
    /// Badge for a running countdown with `remaining` seconds left.
    #[must_use]
    pub fn running(remaining: u64) -> Self {
        Self::Minutes(remaining.div_ceil(60))
    }

    #[must_use]
    pub fn text(&self) -> String {
        match self {
            Self::Minutes(minutes) => format!("{minutes}m"),
            Self::Done => BADGE_DONE.to_string(),
            Self::Cleared => String::new(),
        }
    }
}

/// Label of the start/pause control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ButtonLabel {
    Start,
    Pause,
    Resume,
}

impl ButtonLabel {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Start => "Start",
            Self::Pause => "Pause",
            Self::Resume => "Resume",
        }
    }
}

/// Everything a Viewer renders, derived from one snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub phase: Phase,
    pub clock: String,
    pub progress: f64,
    pub running: bool,
    pub button: ButtonLabel,
    pub phase_minutes: u64,
}

impl SessionView {
    #[must_use]
    pub fn derive(session: &Session, durations: &Durations) -> Self {
        let button = if session.is_active {
            ButtonLabel::Pause
        } else if session.is_fresh(durations) {
            ButtonLabel::Start
        } else {
            ButtonLabel::Resume
        };

        Self {
            phase: session.session_type,
            clock: format_clock(session.timer),
            progress: progress(session, durations),
            running: session.is_active,
            button,
            phase_minutes: durations.for_phase(session.session_type) / 60,
        }
    }
}
