//! The periodic driver of the countdown.
//!
//! The scheduler is the only thing that moves time forward. Every period it
//! asks the [`SessionController`] for one tick and publishes the resulting
//! badge text. A late or skipped tick never catches up: each tick decrements
//! by at most one second regardless of how long the process was asleep.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::controller::{SessionController, TickReport};
use crate::types::SessionEvent;
use crate::view::Badge;

/// Default tick period.
pub const DEFAULT_TICK_PERIOD: Duration = Duration::from_secs(1);

/// Drives a [`SessionController`] on a fixed period.
#[derive(Debug, Clone)]
pub struct Scheduler {
    controller: SessionController,
}

impl Scheduler {
    #[must_use]
    pub fn new(controller: SessionController) -> Self {
        Self { controller }
    }

    /// Spawns the tick loop. Abort the returned handle to stop it.
    ///
    /// The first tick fires one full period after spawning.
    #[must_use]
    pub fn spawn(self, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut interval = tokio::time::interval_at(start, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            debug!(period_ms = period.as_millis() as u64, "Scheduler started");

            loop {
                interval.tick().await;
                self.on_tick().await;
            }
        })
    }

    /// Runs one tick and publishes the badge.
    ///
    /// Store failures are logged and otherwise ignored: the tick is skipped
    /// and the next one starts from whatever the store holds.
    pub async fn on_tick(&self) -> Option<Badge> {
        let report = match self.controller.tick().await {
            Ok(report) => report,
            Err(err) => {
                warn!(error = %err, "Tick skipped: session store unavailable");
                return None;
            }
        };

        let badge = match report {
            TickReport::Decremented { session } => Badge::running(session.timer),
            TickReport::Expired { .. } => Badge::Done,
            TickReport::Idle | TickReport::Uninitialized => Badge::Cleared,
        };
        self.controller
            .broadcaster()
            .broadcast(SessionEvent::badge(badge.text()));
        Some(badge)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::session::{Durations, Phase, Session};
    use crate::store::MemoryStore;
    use crate::types::EventKind;

    fn setup(session: Session) -> (Scheduler, SessionController, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::with_session(session));
        let controller =
            SessionController::new(store.clone(), Durations::new(1500, 300).unwrap());
        (Scheduler::new(controller.clone()), controller, store)
    }

    fn focus(timer: u64, is_active: bool) -> Session {
        Session {
            timer,
            is_active,
            session_type: Phase::Focus,
        }
    }

    async fn stored(store: &MemoryStore) -> Session {
        store.record().await.session().unwrap().unwrap()
    }

    #[tokio::test]
    async fn badge_follows_tick_outcome() {
        let (scheduler, _controller, _store) = setup(focus(62, true));
        assert_eq!(scheduler.on_tick().await, Some(Badge::Minutes(2)));

        let (scheduler, _controller, _store) = setup(focus(1, true));
        assert_eq!(scheduler.on_tick().await, Some(Badge::Done));
        // Now paused in the break phase.
        assert_eq!(scheduler.on_tick().await, Some(Badge::Cleared));
    }

    #[tokio::test]
    async fn store_failure_is_a_skipped_tick() {
        let (scheduler, _controller, store) = setup(focus(10, true));
        store.fail_next_loads(1);

        assert_eq!(scheduler.on_tick().await, None);
        assert_eq!(stored(&store).await.timer, 10);
        assert_eq!(scheduler.on_tick().await, Some(Badge::Minutes(1)));
        assert_eq!(stored(&store).await.timer, 9);
    }

    #[tokio::test]
    async fn badge_text_is_published() {
        let (scheduler, controller, _store) = setup(focus(1, true));
        let mut rx = controller.broadcaster().subscribe();

        scheduler.on_tick().await;

        let events: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        let kinds: Vec<_> = events.iter().map(SessionEvent::kind).collect();
        assert_eq!(
            kinds,
            vec![EventKind::Snapshot, EventKind::Expired, EventKind::Badge]
        );
        assert!(matches!(
            events.last(),
            Some(SessionEvent::Badge { text, .. }) if text == "Done"
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn spawned_loop_ticks_once_per_period() {
        let (scheduler, _controller, store) = setup(focus(100, true));
        let handle = scheduler.spawn(Duration::from_secs(1));

        for _ in 0..3 {
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        handle.abort();

        assert_eq!(stored(&store).await.timer, 97);
    }

    #[tokio::test(start_paused = true)]
    async fn long_stall_decrements_only_once() {
        let (scheduler, _controller, store) = setup(focus(100, true));
        let handle = scheduler.spawn(Duration::from_secs(1));

        tokio::time::sleep(Duration::from_millis(1010)).await;
        assert_eq!(stored(&store).await.timer, 99);

        // Jump past thirty deadlines at once.
        tokio::time::advance(Duration::from_secs(30)).await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        handle.abort();

        // One missed-tick catch-up at most, never thirty.
        assert!(stored(&store).await.timer >= 97);
    }

    #[tokio::test(start_paused = true)]
    async fn paused_session_is_never_written() {
        let (scheduler, _controller, store) = setup(focus(100, false));
        let handle = scheduler.spawn(Duration::from_secs(1));

        tokio::time::sleep(Duration::from_secs(5)).await;
        handle.abort();

        assert_eq!(store.save_count(), 0);
    }
}
