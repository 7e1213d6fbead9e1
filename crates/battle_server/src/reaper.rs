//! Stale session reaper.
//!
//! The decision of what to sweep is a pure function, [`plan_sweep`], of
//! the current session views and the current time. Carrying the actions
//! out is the service's job; scheduling is a [`RecurringTask`].

use std::time::Duration;

use battle_core::outcome::BattleStatus;
use battle_core::session::SessionId;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Reaper thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaperPolicy {
    /// Client silence after which an active session is abandoned.
    pub liveness_timeout: Duration,
    /// Age after which an active session is abandoned regardless.
    pub max_session_age: Duration,
    /// How long a persisted terminal session stays in the store.
    pub retention: Duration,
}

/// What the reaper knows about one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionView {
    /// Session token.
    pub id: SessionId,
    /// Current status.
    pub status: BattleStatus,
    /// Creation time.
    pub created_at: Instant,
    /// Last heartbeat, deployment or attacker read.
    pub last_seen: Instant,
    /// Whether the connection layer reports a live client.
    pub connected: bool,
    /// When the session became terminal.
    pub finished_at: Option<Instant>,
    /// Whether the final record was saved.
    pub persisted: bool,
}

/// One sweep decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepAction {
    /// Force an orphaned or overlong session to `abandoned` and persist it.
    Abandon(SessionId),
    /// Retry saving a terminal session whose record is not yet stored.
    RetryPersist(SessionId),
    /// Drop a persisted session whose retention window has passed.
    Evict(SessionId),
}

/// Decide what a sweep at `now` does. Output follows input order.
#[must_use]
pub fn plan_sweep(views: &[SessionView], now: Instant, policy: &ReaperPolicy) -> Vec<SweepAction> {
    views
        .iter()
        .filter_map(|view| {
            if view.status.is_active() {
                let silent = now.saturating_duration_since(view.last_seen);
                let age = now.saturating_duration_since(view.created_at);
                let orphaned = !view.connected && silent > policy.liveness_timeout;
                (orphaned || age > policy.max_session_age).then_some(SweepAction::Abandon(view.id))
            } else if !view.persisted {
                Some(SweepAction::RetryPersist(view.id))
            } else {
                let finished = view.finished_at.unwrap_or(view.last_seen);
                (now.saturating_duration_since(finished) >= policy.retention)
                    .then_some(SweepAction::Evict(view.id))
            }
        })
        .collect()
}

/// A job run on a fixed period until stopped.
///
/// The first run happens one full period after spawning.
#[derive(Debug)]
pub struct RecurringTask {
    name: &'static str,
    cancel: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl RecurringTask {
    /// Spawn `job` on the current tokio runtime.
    pub fn spawn<F>(name: &'static str, period: Duration, mut job: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        let (cancel, mut stop) = watch::channel(false);
        let handle = tokio::spawn(async move {
            let mut timer = interval_at(Instant::now() + period, period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = timer.tick() => {}
                    changed = stop.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
                if *stop.borrow() {
                    break;
                }
                tracing::debug!(task = name, "Running recurring task");
                job();
            }
            tracing::debug!(task = name, "Recurring task stopped");
        });
        Self {
            name,
            cancel,
            handle,
        }
    }

    /// Task name, for logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Signal the task to stop and wait for it.
    pub async fn stop(self) {
        self.cancel.send_replace(true);
        if let Err(err) = self.handle.await {
            tracing::warn!(task = self.name, error = %err, "Recurring task failed");
        }
    }
}
