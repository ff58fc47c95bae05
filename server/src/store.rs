//! Key-value Session Store.
//!
//! The store holds one versionless record with the keys `timer`, `isActive`
//! and `sessionType`. Any other keys found in the record are preserved
//! untouched, since the store may be shared with other components.
//!
//! # Backends
//!
//! - [`FileStore`] - JSON file on disk, written atomically (temp + rename)
//! - [`MemoryStore`] - in-process record with failure injection for tests
//!
//! Backends only load and save whole records. Read-modify-write sequences
//! and their serialization belong to [`crate::controller::SessionController`].

use std::collections::BTreeMap;
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, trace, warn};

use crate::session::{Phase, Session};

/// File name of the persisted record inside the data directory.
pub const STATE_FILE_NAME: &str = "session.json";

/// Errors raised while reading or writing the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem read or write failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The record is not valid JSON or has mistyped fields.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The record parses but does not describe a valid Session.
    #[error("corrupt session record: {0}")]
    Corrupt(String),

    /// The backend refused the operation.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// The persisted record as found in the store.
///
/// Every field is optional: a missing `sessionType` means the Session has
/// never been initialized.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timer: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_type: Option<Phase>,

    /// Keys owned by someone else.
    #[serde(flatten)]
    pub other: BTreeMap<String, serde_json::Value>,
}

impl StoredRecord {
    /// Parses a stored record, reading mistyped Session keys as absent.
    ///
    /// A `timer` that is not an integer, an `isActive` that is not a boolean
    /// or an unknown `sessionType` is dropped with a warning, so the
    /// controller repairs or reinitializes it on the next write. Foreign keys
    /// are kept as they are.
    ///
    /// # Errors
    ///
    /// [`StoreError::Json`] if `bytes` is not JSON, [`StoreError::Corrupt`]
    /// if it is not a JSON object.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, StoreError> {
        let Value::Object(mut map) = serde_json::from_slice::<Value>(bytes)? else {
            return Err(StoreError::Corrupt(
                "record is not a JSON object".to_string(),
            ));
        };

        let timer = take_field(&mut map, "timer", Value::as_i64);
        let is_active = take_field(&mut map, "isActive", Value::as_bool);
        let session_type = take_field(&mut map, "sessionType", |value| {
            Phase::deserialize(value).ok()
        });

        Ok(Self {
            timer,
            is_active,
            session_type,
            other: map.into_iter().collect(),
        })
    }

    /// Returns `true` once `sessionType` has been written.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.session_type.is_some()
    }

    /// Interprets the record as a Session.
    ///
    /// Returns `Ok(None)` for an uninitialized record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Corrupt`] if `sessionType` is present but
    /// `timer` is missing or negative.
    pub fn session(&self) -> Result<Option<Session>, StoreError> {
        let Some(session_type) = self.session_type else {
            return Ok(None);
        };

        let timer = match self.timer {
            Some(timer) if timer >= 0 => timer.unsigned_abs(),
            Some(timer) => {
                return Err(StoreError::Corrupt(format!("negative timer {timer}")));
            }
            None => return Err(StoreError::Corrupt("missing timer".to_string())),
        };

        Ok(Some(Session {
            timer,
            is_active: self.is_active.unwrap_or(false),
            session_type,
        }))
    }

    /// Overwrites only the fields named by `patch`.
    pub fn apply(&mut self, patch: &SessionPatch) {
        if let Some(timer) = patch.timer {
            self.timer = Some(i64::try_from(timer).unwrap_or(i64::MAX));
        }
        if let Some(is_active) = patch.is_active {
            self.is_active = Some(is_active);
        }
        if let Some(session_type) = patch.session_type {
            self.session_type = Some(session_type);
        }
    }
}

/// Removes `key` from `map` and reads it with `read`. `null` counts as absent.
fn take_field<T>(
    map: &mut Map<String, Value>,
    key: &'static str,
    read: impl FnOnce(&Value) -> Option<T>,
) -> Option<T> {
    let value = map.remove(key)?;
    if value.is_null() {
        return None;
    }
    let parsed = read(&value);
    if parsed.is_none() {
        warn!(key, value = %value, "Ignoring mistyped field in session record");
    }
    parsed
}

/// A partial write to the Session record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionPatch {
    pub timer: Option<u64>,
    pub is_active: Option<bool>,
    pub session_type: Option<Phase>,
}

impl SessionPatch {
    /// Writes `timer` only.
    #[must_use]
    pub fn timer(remaining: u64) -> Self {
        Self {
            timer: Some(remaining),
            ..Self::default()
        }
    }

    /// Writes all three fields as one unit.
    #[must_use]
    pub fn whole(session: &Session) -> Self {
        Self {
            timer: Some(session.timer),
            is_active: Some(session.is_active),
            session_type: Some(session.session_type),
        }
    }

    /// Writes only the fields in which `after` differs from `before`.
    #[must_use]
    pub fn diff(before: &Session, after: &Session) -> Self {
        Self {
            timer: (before.timer != after.timer).then_some(after.timer),
            is_active: (before.is_active != after.is_active).then_some(after.is_active),
            session_type: (before.session_type != after.session_type)
                .then_some(after.session_type),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.timer.is_none() && self.is_active.is_none() && self.session_type.is_none()
    }
}

/// A place the Session record can be loaded from and saved to.
#[async_trait]
pub trait StoreBackend: Send + Sync + fmt::Debug {
    /// Reads the whole record. A store that has never been written returns
    /// an empty record.
    async fn load(&self) -> Result<StoredRecord, StoreError>;

    /// Replaces the whole record.
    async fn save(&self, record: &StoredRecord) -> Result<(), StoreError>;
}

/// JSON file backend.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    /// Creates a store backed by the file at `path`.
    ///
    /// The file and its parent directory are created on first save.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The platform data directory location, e.g.
    /// `~/.local/share/pomodoro/session.json` on Linux.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("dev", "pomodoro", "pomodoro")
            .map(|dirs| dirs.data_dir().join(STATE_FILE_NAME))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| STATE_FILE_NAME.into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl StoreBackend for FileStore {
    async fn load(&self) -> Result<StoredRecord, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => {
                trace!(path = %self.path.display(), bytes = bytes.len(), "Loaded session record");
                StoredRecord::from_slice(&bytes)
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No session record yet");
                Ok(StoredRecord::default())
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn save(&self, record: &StoredRecord) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let json = serde_json::to_vec_pretty(record)?;
        let temp = self.temp_path();
        tokio::fs::write(&temp, &json).await?;
        tokio::fs::rename(&temp, &self.path).await?;

        trace!(path = %self.path.display(), "Saved session record");
        Ok(())
    }
}

/// In-memory backend.
///
/// Failures can be injected to exercise recovery: each pending failure makes
/// one `load` or `save` return [`StoreError::Unavailable`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    record: Mutex<StoredRecord>,
    fail_loads: AtomicUsize,
    fail_saves: AtomicUsize,
    saves: AtomicUsize,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store already holding `record`.
    #[must_use]
    pub fn with_record(record: StoredRecord) -> Self {
        Self {
            record: Mutex::new(record),
            ..Self::default()
        }
    }

    /// Creates a store already holding `session`.
    #[must_use]
    pub fn with_session(session: Session) -> Self {
        let mut record = StoredRecord::default();
        record.apply(&SessionPatch::whole(&session));
        Self::with_record(record)
    }

    /// Makes the next `count` loads fail.
    pub fn fail_next_loads(&self, count: usize) {
        self.fail_loads.store(count, Ordering::SeqCst);
    }

    /// Makes the next `count` saves fail.
    pub fn fail_next_saves(&self, count: usize) {
        self.fail_saves.store(count, Ordering::SeqCst);
    }

    /// Number of successful saves so far.
    #[must_use]
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Copy of the current record.
    pub async fn record(&self) -> StoredRecord {
        self.record.lock().await.clone()
    }

    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl StoreBackend for MemoryStore {
    async fn load(&self) -> Result<StoredRecord, StoreError> {
        if Self::take_failure(&self.fail_loads) {
            return Err(StoreError::Unavailable("injected load failure".to_string()));
        }
        Ok(self.record.lock().await.clone())
    }

    async fn save(&self, record: &StoredRecord) -> Result<(), StoreError> {
        if Self::take_failure(&self.fail_saves) {
            return Err(StoreError::Unavailable("injected save failure".to_string()));
        }
        *self.record.lock().await = record.clone();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
