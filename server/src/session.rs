//! Session model and the pure rules that advance it.
//!
//! A [`Session`] is the single shared record `{timer, isActive, sessionType}`.
//! Nothing in this module performs I/O: every rule takes the current Session
//! and returns what should be written, leaving persistence and serialization
//! to [`crate::controller`].
//!
//! # Rules
//!
//! - A tick on an inactive Session does nothing (no write).
//! - A tick on an active Session decrements `timer` by exactly one. When the
//!   result would reach zero the phase flips and `timer` is refilled with the
//!   next phase's full duration in the same step; zero is never returned.
//! - Completed phases never chain: the transition always leaves the Session
//!   inactive.
//!
//! # Example
//!
//! ```rust
//! use pomodoro_server::session::{Durations, Phase, Session, TickOutcome};
//!
//! let durations = Durations::new(1500, 300).unwrap();
//! let session = Session { timer: 1, is_active: true, session_type: Phase::Focus };
//!
//! match session.tick(&durations) {
//!     TickOutcome::Expired { completed, session } => {
//!         assert_eq!(completed, Phase::Focus);
//!         assert_eq!(session, Session { timer: 300, is_active: false, session_type: Phase::Break });
//!     }
//!     other => panic!("expected expiry, got {other:?}"),
//! }
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Default focus duration (25 minutes).
pub const DEFAULT_FOCUS_SECS: u64 = 25 * 60;

/// Default break duration (5 minutes).
pub const DEFAULT_BREAK_SECS: u64 = 5 * 60;

/// Which duration applies to the countdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Focus,
    Break,
}

impl Phase {
    /// The phase that follows this one.
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::Focus => Self::Break,
            Self::Break => Self::Focus,
        }
    }

    /// Wire name, matching the persisted `sessionType` values.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Focus => "focus",
            Self::Break => "break",
        }
    }

    /// Capitalized label for display.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Focus => "Focus",
            Self::Break => "Break",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Full length of each phase, in whole seconds.
///
/// Both values are always positive; construct through [`Durations::new`] or
/// [`Durations::from_minutes`] to keep that true.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Durations {
    #[serde(rename = "focus")]
    focus_secs: u64,
    #[serde(rename = "break")]
    break_secs: u64,
}

impl Durations {
    /// Creates durations from seconds.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::NonPositive`] if either value is zero.
    pub fn new(focus_secs: u64, break_secs: u64) -> Result<Self, ValidationError> {
        if focus_secs == 0 {
            return Err(ValidationError::NonPositive { field: "focus" });
        }
        if break_secs == 0 {
            return Err(ValidationError::NonPositive { field: "break" });
        }
        Ok(Self {
            focus_secs,
            break_secs,
        })
    }

    /// Creates durations from whole minutes.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] if either value is zero or too large to
    /// express in seconds.
    pub fn from_minutes(focus_minutes: u64, break_minutes: u64) -> Result<Self, ValidationError> {
        let focus = focus_minutes
            .checked_mul(60)
            .ok_or(ValidationError::TooLarge { field: "focus" })?;
        let brk = break_minutes
            .checked_mul(60)
            .ok_or(ValidationError::TooLarge { field: "break" })?;
        Self::new(focus, brk)
    }

    #[must_use]
    pub const fn focus_secs(&self) -> u64 {
        self.focus_secs
    }

    #[must_use]
    pub const fn break_secs(&self) -> u64 {
        self.break_secs
    }

    /// Full duration of `phase`.
    #[must_use]
    pub const fn for_phase(&self, phase: Phase) -> u64 {
        match phase {
            Phase::Focus => self.focus_secs,
            Phase::Break => self.break_secs,
        }
    }
}

impl Default for Durations {
    fn default() -> Self {
        Self {
            focus_secs: DEFAULT_FOCUS_SECS,
            break_secs: DEFAULT_BREAK_SECS,
        }
    }
}

/// The shared timer record.
///
/// Field names on the wire follow the persisted layout: `timer`, `isActive`,
/// `sessionType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Seconds remaining in the current phase.
    pub timer: u64,
    /// Whether the scheduler should decrement.
    pub is_active: bool,
    /// Current phase.
    pub session_type: Phase,
}

/// What a single tick decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The Session is not running. Nothing is written.
    Idle,

    /// Countdown continues. Only `timer` is written.
    Decrement {
        /// New value of `timer`, always at least 1.
        remaining: u64,
    },

    /// The phase ran out and the Session moved to the opposite phase.
    ///
    /// `session` must be written as one unit.
    Expired {
        /// The phase that just finished.
        completed: Phase,
        /// The post-transition Session.
        session: Session,
    },
}

impl Session {
    /// The Session written on first initialization.
    #[must_use]
    pub const fn initial(durations: &Durations) -> Self {
        Self {
            timer: durations.for_phase(Phase::Focus),
            is_active: false,
            session_type: Phase::Focus,
        }
    }

    /// Advances the countdown by one step.
    ///
    /// Never decrements by more than one, regardless of how much wall-clock
    /// time elapsed since the previous call.
    #[must_use]
    pub fn tick(&self, durations: &Durations) -> TickOutcome {
        if !self.is_active {
            return TickOutcome::Idle;
        }

        let remaining = self.timer.saturating_sub(1);
        if remaining > 0 {
            return TickOutcome::Decrement { remaining };
        }

        TickOutcome::Expired {
            completed: self.session_type,
            session: self.enter_next_phase(durations),
        }
    }

    /// The paused Session at the start of the opposite phase.
    #[must_use]
    pub fn enter_next_phase(&self, durations: &Durations) -> Self {
        let next = self.session_type.opposite();
        Self {
            timer: durations.for_phase(next),
            is_active: false,
            session_type: next,
        }
    }

    /// Returns `true` when the current phase has not counted down at all.
    #[must_use]
    pub fn is_fresh(&self, durations: &Durations) -> bool {
        self.timer == durations.for_phase(self.session_type)
    }

    /// Sets the Session running. `None` if it already is.
    #[must_use]
    pub fn start(&self) -> Option<Self> {
        if self.is_active {
            return None;
        }
        Some(Self {
            is_active: true,
            ..*self
        })
    }

    /// Stops the countdown, leaving `timer` and phase untouched. `None` if
    /// already paused.
    #[must_use]
    pub fn pause(&self) -> Option<Self> {
        if !self.is_active {
            return None;
        }
        Some(Self {
            is_active: false,
            ..*self
        })
    }

    /// Flips `is_active`.
    #[must_use]
    pub fn toggle(&self) -> Self {
        Self {
            is_active: !self.is_active,
            ..*self
        }
    }

    /// Stops the countdown and refills the current phase.
    ///
    /// Idempotent: resetting a reset Session yields the same Session.
    #[must_use]
    pub fn reset(&self, durations: &Durations) -> Self {
        Self {
            timer: durations.for_phase(self.session_type),
            is_active: false,
            session_type: self.session_type,
        }
    }

    /// Applies a duration change to an idle, untouched phase.
    ///
    /// When the Session is paused and still holds the full `previous`
    /// duration of its phase, `timer` becomes the `current` duration. Any
    /// other Session is returned as `None` and keeps its countdown until the
    /// next phase entry or reset.
    #[must_use]
    pub fn resync_idle_phase(&self, previous: &Durations, current: &Durations) -> Option<Self> {
        if self.is_active || !self.is_fresh(previous) {
            return None;
        }
        let timer = current.for_phase(self.session_type);
        if timer == self.timer {
            return None;
        }
        Some(Self { timer, ..*self })
    }
}
