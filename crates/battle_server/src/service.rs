//! Battle service: the operations exposed to the request layer.
//!
//! Every mutating call resolves the session, checks that the caller is
//! its attacker and then works under the session's lock, so requests and
//! ticks for one session are serialized while different sessions proceed
//! independently.

use std::sync::Arc;

use battle_core::catalog::TroopCatalog;
use battle_core::components::{GridPos, Troop};
use battle_core::config::BattleRules;
use battle_core::error::{BattleError, Result};
use battle_core::outcome::{BattleOutcome, BattleStatus};
use battle_core::session::{SessionId, SessionSnapshot, VillageId};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::config::ServerConfig;
use crate::ports::{BattleStore, Caller, ConnectionMonitor, LayoutProvider, Role};
use crate::reaper::{plan_sweep, RecurringTask, SweepAction};
use crate::store::{SessionEntry, SessionStore};
use crate::ticker::spawn_tick_loop;

/// A troop requested at session start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TroopRequest {
    /// Troop type key, e.g. `"barbarian"`.
    pub troop_type: String,
    /// Requested tile.
    pub position: GridPos,
}

impl TroopRequest {
    /// Create a request.
    pub fn new(troop_type: impl Into<String>, x: i32, y: i32) -> Self {
        Self {
            troop_type: troop_type.into(),
            position: GridPos::new(x, y),
        }
    }
}

/// Result of [`BattleService::start_session`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStart {
    /// New session token.
    pub session_id: SessionId,
    /// State after the initial deployments.
    pub initial_state: SessionSnapshot,
}

/// What one sweep did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Sessions forced to `abandoned`.
    pub abandoned: Vec<SessionId>,
    /// Sessions whose record was saved this sweep.
    pub persisted: Vec<SessionId>,
    /// Sessions whose save failed and will be retried.
    pub failed: Vec<SessionId>,
    /// Sessions dropped from the store.
    pub evicted: Vec<SessionId>,
}

impl SweepReport {
    /// Whether the sweep changed nothing.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.abandoned.is_empty()
            && self.persisted.is_empty()
            && self.failed.is_empty()
            && self.evicted.is_empty()
    }
}

struct Inner {
    config: ServerConfig,
    catalog: TroopCatalog,
    sessions: SessionStore,
    layouts: Arc<dyn LayoutProvider>,
    records: Arc<dyn BattleStore>,
    connections: Arc<dyn ConnectionMonitor>,
}

/// Battle session service. Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct BattleService {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for BattleService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BattleService")
            .field("sessions", &self.inner.sessions.len())
            .finish_non_exhaustive()
    }
}

impl BattleService {
    /// Create a service with the default loot formula.
    #[must_use]
    pub fn new(
        config: ServerConfig,
        catalog: TroopCatalog,
        layouts: Arc<dyn LayoutProvider>,
        records: Arc<dyn BattleStore>,
        connections: Arc<dyn ConnectionMonitor>,
    ) -> Self {
        let rules = BattleRules::new(config.battle.clone());
        Self::with_rules(config, rules, catalog, layouts, records, connections)
    }

    /// Create a service with custom rules (e.g. a different loot formula).
    #[must_use]
    pub fn with_rules(
        config: ServerConfig,
        rules: BattleRules,
        catalog: TroopCatalog,
        layouts: Arc<dyn LayoutProvider>,
        records: Arc<dyn BattleStore>,
        connections: Arc<dyn ConnectionMonitor>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                catalog,
                sessions: SessionStore::new(Arc::new(rules)),
                layouts,
                records,
                connections,
            }),
        }
    }

    /// Server configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    /// Troop catalog.
    #[must_use]
    pub fn catalog(&self) -> &TroopCatalog {
        &self.inner.catalog
    }

    /// Underlying session store.
    #[must_use]
    pub fn sessions(&self) -> &SessionStore {
        &self.inner.sessions
    }

    /// Start a battle against `defender_village` and spawn its tick loop.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// - [`BattleError::Forbidden`] if the caller is not an attacker
    /// - [`BattleError::LayoutUnavailable`] / [`BattleError::InvalidLayout`]
    ///   if the defender layout cannot be used
    /// - any deployment rejection for `initial_troops`; no session is kept
    pub fn start_session(
        &self,
        caller: &Caller,
        defender_village: VillageId,
        initial_troops: &[TroopRequest],
    ) -> Result<SessionStart> {
        if caller.role != Role::Attacker {
            return Err(BattleError::Forbidden {
                session: "new".into(),
                caller: caller.village.0,
            });
        }

        let layout = self.inner.layouts.load(defender_village).map_err(|err| match err {
            BattleError::LayoutUnavailable { .. } => err,
            other => BattleError::LayoutUnavailable {
                village: defender_village.0,
                message: other.to_string(),
            },
        })?;

        let now = Instant::now();
        let entry = self.inner.sessions.create(
            caller.player,
            caller.village,
            defender_village,
            layout,
            now,
        )?;
        let id = entry.id();

        let initial_state = {
            let mut session = entry.lock();
            for request in initial_troops {
                if let Err(err) =
                    session.deploy_key(&self.inner.catalog, &request.troop_type, request.position)
                {
                    drop(session);
                    self.inner.sessions.remove(id);
                    tracing::debug!(
                        session_id = %id,
                        troop_type = %request.troop_type,
                        error = %err,
                        "Initial deployment rejected"
                    );
                    return Err(err);
                }
            }
            session.snapshot()
        };

        spawn_tick_loop(
            Arc::clone(&entry),
            self.inner.config.tick_interval(),
            Arc::clone(&self.inner.records),
        );

        tracing::info!(
            session_id = %id,
            attacker = caller.player.0,
            attacker_village = caller.village.0,
            defender_village = defender_village.0,
            troops = initial_troops.len(),
            "Battle session started"
        );
        Ok(SessionStart {
            session_id: id,
            initial_state,
        })
    }

    /// Deploy a troop into a running battle.
    ///
    /// # Errors
    ///
    /// Rejections map to [`RejectReason`](battle_core::error::RejectReason)
    /// codes, checked in this order: `session-not-found`, `forbidden`,
    /// `unknown-troop-type`, `out-of-bounds`, `capacity-exceeded`.
    pub fn deploy_troop(
        &self,
        session_id: SessionId,
        caller: &Caller,
        troop_type: &str,
        position: GridPos,
    ) -> Result<Troop> {
        let entry = self.inner.sessions.get(session_id)?;
        let result = {
            let mut session = entry.lock();
            if !session.status().is_active() {
                Err(BattleError::SessionNotFound(session_id.to_string()))
            } else if !is_attacker(caller, session.params().attacker_village) {
                Err(forbidden(session_id, caller))
            } else {
                session.deploy_key(&self.inner.catalog, troop_type, position)
            }
        };

        match &result {
            Ok(troop) => {
                entry.touch(Instant::now());
                tracing::debug!(
                    session_id = %session_id,
                    troop = %troop.id,
                    %troop_type,
                    "Troop deployed"
                );
            }
            Err(err) => {
                tracing::debug!(
                    session_id = %session_id,
                    %troop_type,
                    x = position.x,
                    y = position.y,
                    reason = ?err.reject_reason(),
                    "Deployment rejected"
                );
            }
        }
        result
    }

    /// Point-in-time snapshot for rejoining attackers and spectators.
    ///
    /// # Errors
    ///
    /// Returns [`BattleError::SessionNotFound`] for unknown or evicted
    /// sessions.
    pub fn get_session(&self, session_id: SessionId, caller: &Caller) -> Result<SessionSnapshot> {
        let entry = self.inner.sessions.get(session_id)?;
        let snapshot = entry.snapshot();
        if is_attacker(caller, snapshot.attacker_village) {
            entry.touch(Instant::now());
        }
        Ok(snapshot)
    }

    /// Refresh the attacker's liveness.
    ///
    /// # Errors
    ///
    /// `session-not-found` for unknown or terminal sessions, `forbidden`
    /// for anyone but the attacker.
    pub fn heartbeat(&self, session_id: SessionId, caller: &Caller) -> Result<()> {
        let entry = self.active_entry_for_attacker(session_id, caller)?;
        entry.touch(Instant::now());
        Ok(())
    }

    /// End the battle at the attacker's request.
    ///
    /// # Errors
    ///
    /// `session-not-found` for unknown or terminal sessions, `forbidden`
    /// for anyone but the attacker.
    pub fn end_battle(&self, session_id: SessionId, caller: &Caller) -> Result<BattleOutcome> {
        let entry = self.active_entry_for_attacker(session_id, caller)?;
        let outcome = entry.finish_active(BattleStatus::Completed, Instant::now())?;
        tracing::info!(
            session_id = %session_id,
            destruction = outcome.destruction,
            stars = outcome.stars,
            "Battle ended by attacker"
        );
        // A failure here is retried by the reaper.
        let _ = entry.persist(self.inner.records.as_ref());
        Ok(outcome)
    }

    fn active_entry_for_attacker(
        &self,
        session_id: SessionId,
        caller: &Caller,
    ) -> Result<Arc<SessionEntry>> {
        let entry = self.inner.sessions.get(session_id)?;
        let (active, attacker_village) = {
            let session = entry.lock();
            (session.status().is_active(), session.params().attacker_village)
        };
        if !active {
            return Err(BattleError::SessionNotFound(session_id.to_string()));
        }
        if !is_attacker(caller, attacker_village) {
            return Err(forbidden(session_id, caller));
        }
        Ok(entry)
    }

    /// Ids of all active sessions.
    #[must_use]
    pub fn active_sessions(&self) -> Vec<SessionId> {
        self.inner.sessions.list_active()
    }

    /// Active sessions attacked by or targeting `village`.
    #[must_use]
    pub fn active_for_village(&self, village: VillageId) -> Vec<SessionId> {
        self.inner
            .sessions
            .entries()
            .into_iter()
            .filter(|entry| {
                let session = entry.lock();
                let params = session.params();
                session.status().is_active()
                    && (params.attacker_village == village || params.defender_village == village)
            })
            .map(|entry| entry.id())
            .collect()
    }

    /// Scheduled sweep entry point.
    pub fn sweep(&self) -> SweepReport {
        self.sweep_at(Instant::now())
    }

    /// Sweep as of `now`. Never fails; persistence errors are logged and
    /// retried on the next sweep.
    pub fn sweep_at(&self, now: Instant) -> SweepReport {
        let entries = self.inner.sessions.entries();
        let views: Vec<_> = entries
            .iter()
            .map(|entry| entry.view(self.inner.connections.is_connected(entry.id())))
            .collect();
        let actions = plan_sweep(&views, now, &self.inner.config.reaper_policy());
        self.apply_sweep(&actions, now)
    }

    /// Carry out planned sweep actions against the live store.
    ///
    /// Plans can go stale: a session planned for abandonment may have
    /// ended on its own since. It keeps its outcome and is only persisted.
    pub fn apply_sweep(&self, actions: &[SweepAction], now: Instant) -> SweepReport {
        let mut report = SweepReport::default();
        for &action in actions {
            match action {
                SweepAction::Abandon(id) => {
                    let Ok(entry) = self.inner.sessions.get(id) else {
                        continue;
                    };
                    match entry.finish_active(BattleStatus::Abandoned, now) {
                        Ok(outcome) => {
                            tracing::info!(
                                session_id = %id,
                                destruction = outcome.destruction,
                                stars = outcome.stars,
                                "Abandoned stale battle session"
                            );
                            report.abandoned.push(id);
                        }
                        Err(BattleError::SessionNotFound(_)) => {
                            tracing::debug!(
                                session_id = %id,
                                "Session ended before it could be abandoned"
                            );
                        }
                        Err(err) => {
                            tracing::warn!(
                                session_id = %id,
                                error = %err,
                                "Failed to abandon session"
                            );
                            continue;
                        }
                    }
                    self.persist_into(&entry, &mut report);
                }
                SweepAction::RetryPersist(id) => {
                    if let Ok(entry) = self.inner.sessions.get(id) {
                        self.persist_into(&entry, &mut report);
                    }
                }
                SweepAction::Evict(id) => {
                    if self.inner.sessions.remove(id).is_some() {
                        tracing::info!(session_id = %id, "Evicted finished battle session");
                        report.evicted.push(id);
                    }
                }
            }
        }

        if !report.is_noop() {
            tracing::info!(
                abandoned = report.abandoned.len(),
                persisted = report.persisted.len(),
                failed = report.failed.len(),
                evicted = report.evicted.len(),
                remaining = self.inner.sessions.len(),
                "Reaper sweep finished"
            );
        }
        report
    }

    fn persist_into(&self, entry: &SessionEntry, report: &mut SweepReport) {
        if entry.meta().persisted {
            return;
        }
        match entry.persist(self.inner.records.as_ref()) {
            Ok(()) => report.persisted.push(entry.id()),
            Err(_) => report.failed.push(entry.id()),
        }
    }

    /// Run [`sweep`](Self::sweep) every reaper period.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn_reaper(&self) -> RecurringTask {
        let service = self.clone();
        RecurringTask::spawn("reaper", self.inner.config.reaper_period(), move || {
            service.sweep();
        })
    }
}

fn is_attacker(caller: &Caller, attacker_village: VillageId) -> bool {
    caller.role == Role::Attacker && caller.village == attacker_village
}

fn forbidden(session_id: SessionId, caller: &Caller) -> BattleError {
    BattleError::Forbidden {
        session: session_id.to_string(),
        caller: caller.village.0,
    }
}
