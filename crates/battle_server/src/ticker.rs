//! Per-session tick loop.
//!
//! Each active session gets its own task that advances it on a fixed
//! interval, independent of how often deployments arrive. The loop stops
//! when its cancellation signal fires or the battle ends on its own; a
//! natural end is persisted right away.

use std::sync::Arc;
use std::time::Duration;

use battle_core::tick::TickResult;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::ports::BattleStore;
use crate::store::SessionEntry;

/// Spawn the tick loop of `entry` on the current runtime.
pub fn spawn_tick_loop(
    entry: Arc<SessionEntry>,
    period: Duration,
    store: Arc<dyn BattleStore>,
) -> JoinHandle<()> {
    tokio::spawn(run_tick_loop(entry, period, store))
}

/// Drive `entry` until it ends or is cancelled.
pub async fn run_tick_loop(entry: Arc<SessionEntry>, period: Duration, store: Arc<dyn BattleStore>) {
    let mut cancel = entry.subscribe();
    let mut timer = interval_at(Instant::now() + period, period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tracing::debug!(session_id = %entry.id(), ?period, "Tick loop started");

    loop {
        tokio::select! {
            _ = timer.tick() => {}
            changed = cancel.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
        if *cancel.borrow() {
            break;
        }

        match entry.advance(Instant::now()) {
            TickResult::Running => {}
            TickResult::Ended(outcome) => {
                tracing::info!(
                    session_id = %entry.id(),
                    destruction = outcome.destruction,
                    stars = outcome.stars,
                    "Battle ended"
                );
                // A failure here is retried by the reaper.
                let _ = entry.persist(store.as_ref());
                break;
            }
            TickResult::Inactive => break,
        }
    }

    tracing::debug!(session_id = %entry.id(), "Tick loop stopped");
}
