//! Publish/subscribe of Session changes.
//!
//! Every committed write to the Session Store, every expiry and every badge
//! update is published on a tokio broadcast channel. Viewers subscribe to it
//! instead of polling, though polling `GET /session` stays valid: both give
//! the same eventual consistency.
//!
//! # Example
//!
//! ```rust
//! use pomodoro_server::broadcast::{SessionBroadcaster, SubscriberFilter};
//! use pomodoro_server::types::{EventKind, SessionEvent};
//!
//! let broadcaster = SessionBroadcaster::new();
//! let mut rx = broadcaster.subscribe();
//!
//! broadcaster.broadcast(SessionEvent::badge("25m"));
//!
//! let filter = SubscriberFilter::new().with_kind(EventKind::Badge);
//! assert!(filter.matches(&rx.try_recv().unwrap()));
//! ```

use std::collections::HashSet;

use tokio::sync::broadcast::{self, Receiver, Sender};
use tracing::{debug, trace};

use crate::types::{EventKind, SessionEvent};

/// Default channel capacity.
///
/// Events are small and arrive about once per second, so a slow subscriber
/// has minutes before it starts seeing `RecvError::Lagged`.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Distributes [`SessionEvent`]s to every subscriber.
///
/// Cheap to clone; all clones share one channel.
#[derive(Debug, Clone)]
pub struct SessionBroadcaster {
    sender: Sender<SessionEvent>,
}

impl SessionBroadcaster {
    /// Creates a broadcaster with [`DEFAULT_CHANNEL_CAPACITY`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Creates a broadcaster with the given channel capacity.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        debug!(capacity, "Created session broadcaster");
        Self { sender }
    }

    /// Subscribes to events published after this call.
    #[must_use]
    pub fn subscribe(&self) -> Receiver<SessionEvent> {
        let rx = self.sender.subscribe();
        debug!(
            subscriber_count = self.subscriber_count(),
            "New subscriber added"
        );
        rx
    }

    /// Publishes an event, returning how many subscribers received it.
    ///
    /// Never blocks. Having no subscribers is normal: the scheduler runs
    /// whether or not any Viewer is attached.
    pub fn broadcast(&self, event: SessionEvent) -> usize {
        let kind = event.kind();
        match self.sender.send(event) {
            Ok(receivers) => {
                trace!(kind = kind.as_str(), receivers, "Event broadcast");
                receivers
            }
            Err(_) => {
                trace!(kind = kind.as_str(), "No subscribers for event");
                0
            }
        }
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for SessionBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

/// Selects which event kinds a subscriber receives.
///
/// An empty filter matches every event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriberFilter {
    kinds: HashSet<EventKind>,
}

impl SubscriberFilter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a kind to the filter (builder pattern).
    #[must_use]
    pub fn with_kind(mut self, kind: EventKind) -> Self {
        self.kinds.insert(kind);
        self
    }

    /// Parses a comma-separated list such as `snapshot,expired`.
    ///
    /// # Errors
    ///
    /// Returns a message naming the first unknown kind.
    pub fn parse(list: &str) -> Result<Self, String> {
        list.split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .try_fold(Self::new(), |filter, item| {
                Ok(filter.with_kind(item.parse()?))
            })
    }

    #[must_use]
    pub fn matches(&self, event: &SessionEvent) -> bool {
        self.kinds.is_empty() || self.kinds.contains(&event.kind())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{Durations, Phase, Session};

    fn snapshot() -> SessionEvent {
        SessionEvent::snapshot(Session::initial(&Durations::default()), Durations::default())
    }

    fn expired() -> SessionEvent {
        SessionEvent::expired(
            Phase::Focus,
            Session::initial(&Durations::default()).enter_next_phase(&Durations::default()),
        )
    }

    #[test]
    fn broadcast_without_subscribers_returns_zero() {
        let broadcaster = SessionBroadcaster::new();
        assert_eq!(broadcaster.broadcast(snapshot()), 0);
    }

    #[test]
    fn every_subscriber_receives_each_event() {
        let broadcaster = SessionBroadcaster::new();
        let mut a = broadcaster.subscribe();
        let mut b = broadcaster.subscribe();

        assert_eq!(broadcaster.broadcast(expired()), 2);
        assert_eq!(a.try_recv().unwrap().kind(), EventKind::Expired);
        assert_eq!(b.try_recv().unwrap().kind(), EventKind::Expired);
    }

    #[test]
    fn late_subscriber_misses_earlier_events() {
        let broadcaster = SessionBroadcaster::new();
        let _early = broadcaster.subscribe();
        broadcaster.broadcast(snapshot());

        let mut late = broadcaster.subscribe();
        assert!(late.try_recv().is_err());
    }

    #[test]
    fn subscriber_count_tracks_drops() {
        let broadcaster = SessionBroadcaster::new();
        let rx = broadcaster.subscribe();
        assert_eq!(broadcaster.subscriber_count(), 1);
        drop(rx);
        assert_eq!(broadcaster.subscriber_count(), 0);
    }

    #[test]
    fn clones_share_the_channel() {
        let broadcaster = SessionBroadcaster::new();
        let mut rx = broadcaster.subscribe();
        broadcaster.clone().broadcast(SessionEvent::badge(""));
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn lagged_subscriber_is_told_how_many_it_missed() {
        let broadcaster = SessionBroadcaster::with_capacity(2);
        let mut rx = broadcaster.subscribe();
        for _ in 0..4 {
            broadcaster.broadcast(SessionEvent::badge("1m"));
        }
        assert!(matches!(
            rx.try_recv(),
            Err(broadcast::error::TryRecvError::Lagged(2))
        ));
    }

    #[test]
    fn empty_filter_matches_everything() {
        let filter = SubscriberFilter::new();
        assert!(filter.is_empty());
        assert!(filter.matches(&snapshot()));
        assert!(filter.matches(&expired()));
        assert!(filter.matches(&SessionEvent::badge("Done")));
    }

    #[test]
    fn filter_selects_kinds() {
        let filter = SubscriberFilter::new()
            .with_kind(EventKind::Expired)
            .with_kind(EventKind::Badge);
        assert!(!filter.matches(&snapshot()));
        assert!(filter.matches(&expired()));
    }

    #[test]
    fn filter_parses_lists() {
        let filter = SubscriberFilter::parse("snapshot, badge,").unwrap();
        assert_eq!(
            filter,
            SubscriberFilter::new()
                .with_kind(EventKind::Snapshot)
                .with_kind(EventKind::Badge)
        );
        assert!(SubscriberFilter::parse("").unwrap().is_empty());
        assert_eq!(
            SubscriberFilter::parse("snapshot,ticks"),
            Err("unknown event kind 'ticks'".to_string())
        );
    }
}
