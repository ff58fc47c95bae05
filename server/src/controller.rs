//! The single serialization point for Session reads and writes.
//!
//! [`SessionController`] is the only code that writes the Session Store.
//! The scheduler's ticks, Viewer intents, settings changes and
//! initialization all run their read-modify-write under one async mutex, so
//! two writers never interleave. Whichever acquires the lock second reads the
//! committed result of the first: a `pause` that queues behind an expiry
//! transition applies to the post-transition phase, and a tick that queues
//! behind a `pause` sees an inactive Session and writes nothing.
//!
//! The mutex also guards the duration settings, so a phase entry never sees
//! a half-applied settings change.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use pomodoro_server::controller::SessionController;
//! use pomodoro_server::session::{Durations, Phase};
//! use pomodoro_server::store::MemoryStore;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let controller = SessionController::new(Arc::new(MemoryStore::new()), Durations::default());
//! controller.initialize().await.unwrap();
//!
//! let session = controller.toggle().await.unwrap();
//! assert!(session.is_active);
//! assert_eq!(session.session_type, Phase::Focus);
//! # }
//! ```

use std::fmt;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, trace, warn};

use crate::broadcast::SessionBroadcaster;
use crate::session::{Durations, Phase, Session, TickOutcome};
use crate::store::{SessionPatch, StoreBackend, StoreError, StoredRecord};
use crate::types::{Command, SessionEvent, SessionSnapshot};

/// Durations known to the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DurationSettings {
    /// The latest user settings. Used for every phase entry and reset.
    pub current: Durations,

    /// The settings the current phase's countdown was filled from.
    pub applied: Durations,
}

impl DurationSettings {
    #[must_use]
    pub fn new(durations: Durations) -> Self {
        Self {
            current: durations,
            applied: durations,
        }
    }

    /// Returns `true` when settings changed since the current phase began.
    #[must_use]
    pub fn has_pending_change(&self, phase: Phase) -> bool {
        self.current.for_phase(phase) != self.applied.for_phase(phase)
    }
}

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickReport {
    /// No Session has been written yet.
    Uninitialized,

    /// The Session is paused; nothing was written.
    Idle,

    /// `timer` went down by one.
    Decremented { session: Session },

    /// The phase ran out and the Session moved to the opposite phase.
    Expired { completed: Phase, session: Session },
}

/// Result of an intent rule: the Session to write, and whether it was
/// refilled from the current settings.
struct Change {
    session: Session,
    refilled: bool,
}

enum Loaded {
    Missing(StoredRecord),
    Ready(StoredRecord, Session),
    /// The stored timer had already reached zero; the next phase was written.
    Expired(StoredRecord, Phase, Session),
}

/// Serializes every access to the Session Store.
///
/// Cheap to clone; clones share the same store, lock and broadcaster.
#[derive(Clone)]
pub struct SessionController {
    backend: Arc<dyn StoreBackend>,
    settings: Arc<Mutex<DurationSettings>>,
    broadcaster: SessionBroadcaster,
}

impl fmt::Debug for SessionController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionController")
            .field("backend", &self.backend)
            .field("broadcaster", &self.broadcaster)
            .finish_non_exhaustive()
    }
}

impl SessionController {
    #[must_use]
    pub fn new(backend: Arc<dyn StoreBackend>, durations: Durations) -> Self {
        Self::with_broadcaster(backend, durations, SessionBroadcaster::new())
    }

    #[must_use]
    pub fn with_broadcaster(
        backend: Arc<dyn StoreBackend>,
        durations: Durations,
        broadcaster: SessionBroadcaster,
    ) -> Self {
        Self {
            backend,
            settings: Arc::new(Mutex::new(DurationSettings::new(durations))),
            broadcaster,
        }
    }

    #[must_use]
    pub fn broadcaster(&self) -> &SessionBroadcaster {
        &self.broadcaster
    }

    /// Writes the default Session if none exists yet.
    ///
    /// Safe to call on every process start: an existing Session, running or
    /// not, is left exactly as it was.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store cannot be read or written.
    pub async fn initialize(&self) -> Result<Session, StoreError> {
        let mut settings = self.settings.lock().await;
        match self.load(&mut settings).await? {
            Loaded::Ready(_, session) | Loaded::Expired(_, _, session) => {
                info!(
                    phase = %session.session_type,
                    timer = session.timer,
                    is_active = session.is_active,
                    "Attached to existing session"
                );
                Ok(session)
            }
            Loaded::Missing(mut record) => self.write_initial(&mut settings, &mut record).await,
        }
    }

    /// Advances the Session by one step.
    ///
    /// Reads the store fresh every time; nothing about the countdown is kept
    /// in memory between ticks. A paused Session causes no write at all.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store cannot be read or written. The
    /// store is then unchanged and the next tick starts over.
    pub async fn tick(&self) -> Result<TickReport, StoreError> {
        let mut settings = self.settings.lock().await;
        let (mut record, session) = match self.load(&mut settings).await? {
            Loaded::Missing(_) => return Ok(TickReport::Uninitialized),
            Loaded::Expired(_, completed, session) => {
                return Ok(TickReport::Expired { completed, session });
            }
            Loaded::Ready(record, session) => (record, session),
        };

        match session.tick(&settings.current) {
            TickOutcome::Idle => Ok(TickReport::Idle),
            TickOutcome::Decrement { remaining } => {
                let session = self
                    .commit(&mut record, SessionPatch::timer(remaining), &settings)
                    .await?;
                trace!(remaining, "Tick");
                Ok(TickReport::Decremented { session })
            }
            TickOutcome::Expired { completed, session } => {
                self.expire(&mut record, completed, session, &mut settings)
                    .await?;
                Ok(TickReport::Expired { completed, session })
            }
        }
    }

    /// Sets the Session running. No-op if it already is.
    ///
    /// A phase that has not started yet is first refilled if its duration
    /// was edited since it was entered.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store cannot be read or written.
    pub async fn start(&self) -> Result<Session, StoreError> {
        self.apply_intent("start", start_rule).await
    }

    /// Stops the countdown. No-op if already paused.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store cannot be read or written.
    pub async fn pause(&self) -> Result<Session, StoreError> {
        self.apply_intent("pause", |session, _| {
            session.pause().map(|session| Change {
                session,
                refilled: false,
            })
        })
        .await
    }

    /// Starts a paused Session or pauses a running one.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store cannot be read or written.
    pub async fn toggle(&self) -> Result<Session, StoreError> {
        self.apply_intent("toggle", |session, settings| {
            if session.is_active {
                session.pause().map(|session| Change {
                    session,
                    refilled: false,
                })
            } else {
                start_rule(session, settings)
            }
        })
        .await
    }

    /// Stops the countdown and refills the current phase. Never changes the
    /// phase.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store cannot be read or written.
    pub async fn reset(&self) -> Result<Session, StoreError> {
        self.apply_intent("reset", |session, settings| {
            Some(Change {
                session: session.reset(&settings.current),
                refilled: true,
            })
        })
        .await
    }

    /// Runs a Viewer command.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store cannot be read or written.
    pub async fn execute(&self, command: Command) -> Result<Session, StoreError> {
        match command {
            Command::ToggleTimer => self.toggle().await,
            Command::ResetTimer => self.reset().await,
        }
    }

    /// Replaces the duration settings.
    ///
    /// The new durations apply from the next phase entry or reset. A paused
    /// Session that has not started its phase yet is refilled right away.
    /// The settings are kept even if that refill cannot be written; `start`
    /// will then pick them up.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store cannot be read or written.
    pub async fn update_durations(&self, durations: Durations) -> Result<Session, StoreError> {
        let mut settings = self.settings.lock().await;
        let previous = settings.current;
        settings.current = durations;
        info!(
            focus_secs = durations.focus_secs(),
            break_secs = durations.break_secs(),
            previous_focus_secs = previous.focus_secs(),
            previous_break_secs = previous.break_secs(),
            "Duration settings updated"
        );

        let (mut record, session) = self.load_or_init(&mut settings).await?;
        let Some(resynced) = session.resync_idle_phase(&settings.applied, &durations) else {
            return Ok(session);
        };

        let patch = SessionPatch::diff(&session, &resynced);
        self.commit(&mut record, patch, &settings).await?;
        settings.applied = durations;
        debug!(timer = resynced.timer, "Idle phase refilled with new duration");
        Ok(resynced)
    }

    /// The current Session together with the durations to render it.
    ///
    /// An uninitialized store reads as the default Session without writing
    /// it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store cannot be read.
    pub async fn snapshot(&self) -> Result<SessionSnapshot, StoreError> {
        let mut settings = self.settings.lock().await;
        let session = match self.load(&mut settings).await? {
            Loaded::Ready(_, session) | Loaded::Expired(_, _, session) => session,
            Loaded::Missing(_) => Session::initial(&settings.current),
        };
        Ok(SessionSnapshot {
            session,
            durations: settings.current,
        })
    }

    /// Durations used for the next phase entry or reset.
    pub async fn durations(&self) -> Durations {
        self.settings.lock().await.current
    }

    pub async fn settings(&self) -> DurationSettings {
        *self.settings.lock().await
    }

    async fn apply_intent<F>(&self, intent: &'static str, rule: F) -> Result<Session, StoreError>
    where
        F: FnOnce(&Session, &DurationSettings) -> Option<Change>,
    {
        let mut settings = self.settings.lock().await;
        let (mut record, session) = self.load_or_init(&mut settings).await?;

        let Some(change) = rule(&session, &settings) else {
            debug!(intent, is_active = session.is_active, "Intent is a no-op");
            return Ok(session);
        };

        let patch = SessionPatch::diff(&session, &change.session);
        if patch.is_empty() {
            debug!(intent, "Intent left the session unchanged");
        } else {
            self.commit(&mut record, patch, &settings).await?;
        }
        if change.refilled {
            settings.applied = settings.current;
        }

        info!(
            intent,
            phase = %change.session.session_type,
            timer = change.session.timer,
            is_active = change.session.is_active,
            "Intent applied"
        );
        Ok(change.session)
    }

    /// Reads the record and resolves any state that must not persist.
    ///
    /// A zero timer goes through the same expiry transition a tick would
    /// take. A phase with a missing or unusable timer is refilled in place.
    async fn load(&self, settings: &mut DurationSettings) -> Result<Loaded, StoreError> {
        let mut record = self.backend.load().await?;
        let Some(phase) = record.session_type else {
            return Ok(Loaded::Missing(record));
        };

        let reason = match record.session() {
            Ok(Some(session)) if session.timer > 0 => return Ok(Loaded::Ready(record, session)),
            Ok(Some(session)) => {
                let next = session.enter_next_phase(&settings.current);
                self.expire(&mut record, phase, next, settings).await?;
                return Ok(Loaded::Expired(record, phase, next));
            }
            Ok(None) => return Ok(Loaded::Missing(record)),
            Err(err) => err.to_string(),
        };

        let repaired = Session {
            timer: settings.current.for_phase(phase),
            is_active: false,
            session_type: phase,
        };
        warn!(reason = %reason, phase = %phase, "Repairing session record");
        self.commit(&mut record, SessionPatch::whole(&repaired), settings)
            .await?;
        settings.applied = settings.current;
        Ok(Loaded::Ready(record, repaired))
    }

    async fn load_or_init(
        &self,
        settings: &mut DurationSettings,
    ) -> Result<(StoredRecord, Session), StoreError> {
        match self.load(settings).await? {
            Loaded::Ready(record, session) | Loaded::Expired(record, _, session) => {
                Ok((record, session))
            }
            Loaded::Missing(mut record) => {
                let session = self.write_initial(settings, &mut record).await?;
                Ok((record, session))
            }
        }
    }

    async fn write_initial(
        &self,
        settings: &mut DurationSettings,
        record: &mut StoredRecord,
    ) -> Result<Session, StoreError> {
        let session = Session::initial(&settings.current);
        self.commit(record, SessionPatch::whole(&session), settings)
            .await?;
        settings.applied = settings.current;
        info!(timer = session.timer, "Initialized default session");
        Ok(session)
    }

    /// Writes the post-expiry Session and announces the completed phase.
    async fn expire(
        &self,
        record: &mut StoredRecord,
        completed: Phase,
        session: Session,
        settings: &mut DurationSettings,
    ) -> Result<(), StoreError> {
        self.commit(record, SessionPatch::whole(&session), settings)
            .await?;
        settings.applied = settings.current;
        info!(
            completed = %completed,
            next = %session.session_type,
            timer = session.timer,
            "Phase expired"
        );
        self.broadcaster
            .broadcast(SessionEvent::expired(completed, session));
        Ok(())
    }

    /// Applies `patch`, saves the record and publishes the result.
    async fn commit(
        &self,
        record: &mut StoredRecord,
        patch: SessionPatch,
        settings: &DurationSettings,
    ) -> Result<Session, StoreError> {
        let mut next = record.clone();
        next.apply(&patch);
        let session = next
            .session()?
            .ok_or_else(|| StoreError::Corrupt("write left session uninitialized".to_string()))?;

        self.backend.save(&next).await?;
        *record = next;

        self.broadcaster
            .broadcast(SessionEvent::snapshot(session, settings.current));
        Ok(session)
    }
}

/// Starts a paused Session, refilling an unstarted phase whose duration
/// changed since it was entered.
fn start_rule(session: &Session, settings: &DurationSettings) -> Option<Change> {
    let resynced = session.resync_idle_phase(&settings.applied, &settings.current);
    let refilled = resynced.is_some();
    resynced
        .unwrap_or(*session)
        .start()
        .map(|session| Change { session, refilled })
}
