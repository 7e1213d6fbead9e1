//! Session store: the process-wide registry of live sessions.
//!
//! Entries sit in a sharded [`DashMap`], so lookups for different sessions
//! never contend on one lock. Each entry owns its session behind a mutex;
//! that mutex is the single-writer section shared by the tick loop and
//! deployments. A `watch` channel per entry carries the cancellation
//! signal for the session's tick loop.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use battle_core::config::BattleRules;
use battle_core::error::{BattleError, Result};
use battle_core::layout::DefenseLayout;
use battle_core::outcome::{BattleOutcome, BattleStatus};
use battle_core::session::{
    BattleSession, PlayerId, SessionId, SessionParams, SessionSnapshot, VillageId,
};
use battle_core::tick::TickResult;
use dashmap::DashMap;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::ports::{BattleRecord, BattleStore};
use crate::reaper::SessionView;

/// Bookkeeping the reaper needs, kept outside the simulation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryMeta {
    /// When the session was created.
    pub created_at: Instant,
    /// Last sign of life from the attacker.
    pub last_seen: Instant,
    /// When the session became terminal.
    pub finished_at: Option<Instant>,
    /// Whether the final record reached the battle store.
    pub persisted: bool,
}

/// One live session plus its lifecycle bookkeeping.
#[derive(Debug)]
pub struct SessionEntry {
    id: SessionId,
    session: Mutex<BattleSession>,
    meta: Mutex<EntryMeta>,
    cancel: watch::Sender<bool>,
}

impl SessionEntry {
    fn new(session: BattleSession, now: Instant) -> Self {
        let (cancel, _) = watch::channel(false);
        Self {
            id: session.id(),
            session: Mutex::new(session),
            meta: Mutex::new(EntryMeta {
                created_at: now,
                last_seen: now,
                finished_at: None,
                persisted: false,
            }),
            cancel,
        }
    }

    /// Session token.
    #[must_use]
    pub const fn id(&self) -> SessionId {
        self.id
    }

    /// Exclusive access to the session.
    ///
    /// A panic while holding the lock leaves the session in a state the
    /// engine still accepts, so poisoning is ignored.
    pub fn lock(&self) -> MutexGuard<'_, BattleSession> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn meta_mut(&self) -> MutexGuard<'_, EntryMeta> {
        self.meta.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of the lifecycle bookkeeping.
    #[must_use]
    pub fn meta(&self) -> EntryMeta {
        *self.meta_mut()
    }

    /// Consistent point-in-time snapshot.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        self.lock().snapshot()
    }

    /// Record a sign of life from the attacker.
    pub fn touch(&self, now: Instant) {
        let mut meta = self.meta_mut();
        if now > meta.last_seen {
            meta.last_seen = now;
        }
    }

    /// Receiver for this session's cancellation signal.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.cancel.subscribe()
    }

    /// Whether the tick loop has been told to stop.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Run one tick. A tick that ends the battle stops the tick loop.
    pub fn advance(&self, now: Instant) -> TickResult {
        let mut session = self.lock();
        let result = session.advance();
        if let TickResult::Ended(_) = result {
            self.mark_finished(now);
        }
        result
    }

    /// Move the session to a terminal `status` and stop its tick loop.
    ///
    /// Idempotent: a terminal session keeps its original outcome.
    ///
    /// # Errors
    ///
    /// Returns [`BattleError::InvalidState`] if `status` is `Active`.
    pub fn finish(&self, status: BattleStatus, now: Instant) -> Result<BattleOutcome> {
        let mut session = self.lock();
        let was_active = session.status().is_active();
        let outcome = session.finish(status)?;
        if was_active {
            self.mark_finished(now);
        }
        Ok(outcome)
    }

    /// Like [`finish`](Self::finish), but only from `Active`.
    ///
    /// # Errors
    ///
    /// Returns [`BattleError::SessionNotFound`] if the session is already
    /// terminal.
    pub fn finish_active(&self, status: BattleStatus, now: Instant) -> Result<BattleOutcome> {
        let mut session = self.lock();
        if !session.status().is_active() {
            return Err(BattleError::SessionNotFound(self.id.to_string()));
        }
        let outcome = session.finish(status)?;
        self.mark_finished(now);
        Ok(outcome)
    }

    /// Called with the session lock held, right after the terminal
    /// transition.
    fn mark_finished(&self, now: Instant) {
        self.meta_mut().finished_at = Some(now);
        self.cancel.send_replace(true);
    }

    /// Hand the final record to `store` once.
    ///
    /// # Errors
    ///
    /// Returns [`BattleError::InvalidState`] for an active session, or the
    /// store's error. A failed save leaves the entry unpersisted so the
    /// reaper retries it.
    pub fn persist(&self, store: &dyn BattleStore) -> Result<()> {
        if self.meta().persisted {
            return Ok(());
        }
        let record = {
            let session = self.lock();
            let outcome = session.outcome().copied().ok_or_else(|| {
                BattleError::InvalidState(format!("battle {} has not ended", self.id))
            })?;
            let params = session.params();
            BattleRecord {
                session: params.id,
                attacker: params.attacker,
                attacker_village: params.attacker_village,
                defender_village: params.defender_village,
                outcome,
                summary: session.events().summary(),
            }
        };

        match store.save_final(&record) {
            Ok(()) => {
                self.meta_mut().persisted = true;
                tracing::info!(
                    session_id = %self.id,
                    status = %record.outcome.status,
                    destruction = record.outcome.destruction,
                    stars = record.outcome.stars,
                    "Battle record saved"
                );
                Ok(())
            }
            Err(err) => {
                tracing::warn!(
                    session_id = %self.id,
                    error = %err,
                    "Failed to save battle record"
                );
                Err(err)
            }
        }
    }

    /// Reaper view of this entry.
    #[must_use]
    pub fn view(&self, connected: bool) -> SessionView {
        let status = self.lock().status();
        let meta = self.meta();
        SessionView {
            id: self.id,
            status,
            created_at: meta.created_at,
            last_seen: meta.last_seen,
            connected,
            finished_at: meta.finished_at,
            persisted: meta.persisted,
        }
    }
}

/// Registry of live sessions.
#[derive(Debug)]
pub struct SessionStore {
    sessions: DashMap<SessionId, Arc<SessionEntry>>,
    next_id: AtomicU64,
    rules: Arc<BattleRules>,
}

impl SessionStore {
    /// Empty store; every session created runs under `rules`.
    #[must_use]
    pub fn new(rules: Arc<BattleRules>) -> Self {
        Self {
            sessions: DashMap::new(),
            next_id: AtomicU64::new(1),
            rules,
        }
    }

    /// Rules shared by all sessions.
    #[must_use]
    pub fn rules(&self) -> &Arc<BattleRules> {
        &self.rules
    }

    /// Create an active session against a snapshot of `layout`.
    ///
    /// # Errors
    ///
    /// Returns [`BattleError::InvalidLayout`] if the layout is unusable.
    pub fn create(
        &self,
        attacker: PlayerId,
        attacker_village: VillageId,
        defender_village: VillageId,
        layout: DefenseLayout,
        now: Instant,
    ) -> Result<Arc<SessionEntry>> {
        let id = SessionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let params = SessionParams::new(id, attacker, attacker_village, defender_village);
        let session = BattleSession::new(params, layout, Arc::clone(&self.rules))?;
        let entry = Arc::new(SessionEntry::new(session, now));

        match self.sessions.entry(id) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(BattleError::InvalidState(
                format!("session id {id} already in use"),
            )),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(Arc::clone(&entry));
                Ok(entry)
            }
        }
    }

    /// Look up a session.
    ///
    /// # Errors
    ///
    /// Returns [`BattleError::SessionNotFound`] if the id is unknown or the
    /// session was evicted.
    pub fn get(&self, id: SessionId) -> Result<Arc<SessionEntry>> {
        self.sessions
            .get(&id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| BattleError::SessionNotFound(id.to_string()))
    }

    /// Move a session to a terminal status.
    ///
    /// # Errors
    ///
    /// Returns [`BattleError::SessionNotFound`] for unknown ids.
    pub fn end(&self, id: SessionId, status: BattleStatus, now: Instant) -> Result<BattleOutcome> {
        self.get(id)?.finish(status, now)
    }

    /// Ids of all active sessions, in id order.
    #[must_use]
    pub fn list_active(&self) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self
            .entries()
            .into_iter()
            .filter(|entry| entry.lock().status().is_active())
            .map(|entry| entry.id())
            .collect();
        ids.sort_unstable();
        ids
    }

    /// All entries, in id order.
    ///
    /// The map guards are released before returning, so callers may lock
    /// sessions freely.
    #[must_use]
    pub fn entries(&self) -> Vec<Arc<SessionEntry>> {
        let mut entries: Vec<Arc<SessionEntry>> = self
            .sessions
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        entries.sort_unstable_by_key(|entry| entry.id());
        entries
    }

    /// Drop a session from the registry.
    pub fn remove(&self, id: SessionId) -> Option<Arc<SessionEntry>> {
        self.sessions.remove(&id).map(|(_, entry)| entry)
    }

    /// Number of sessions held, terminal ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
