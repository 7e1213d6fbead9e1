//! Battle session: one attacker against one snapshotted defender layout.
//!
//! A session is a plain single-owner state machine. The server wraps each
//! one in its own lock so that ticks ([`tick`](crate::tick)) and deployments
//! ([`deploy`](crate::deploy)) are serialized per session.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use battle_core::prelude::*;
//!
//! let layout = DefenseLayout::new(
//!     vec![StructureSpec::new(StructureKind::TownHall, 12, 10, 100)],
//!     ResourcePool::new(1_000, 1_000),
//! );
//! let mut session = BattleSession::new(
//!     SessionParams::new(SessionId(1), PlayerId(7), VillageId(70), VillageId(80)),
//!     layout,
//!     Arc::new(BattleRules::default()),
//! )
//! .unwrap();
//!
//! let catalog = TroopCatalog::standard();
//! session
//!     .deploy(TroopKind::Barbarian, catalog.stats(TroopKind::Barbarian), GridPos::new(10, 10))
//!     .unwrap();
//!
//! while session.status().is_active() {
//!     session.advance();
//! }
//! assert_eq!(session.outcome().unwrap().stars, 3);
//! ```

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::components::{Structure, StructureId, Troop};
use crate::config::BattleRules;
use crate::error::{BattleError, Result};
use crate::events::{EventKind, EventLog};
use crate::layout::DefenseLayout;
use crate::outcome::{destruction_percent, BattleOutcome, BattleStatus};

/// Opaque session token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bs-{:016x}", self.0)
    }
}

impl FromStr for SessionId {
    type Err = BattleError;

    fn from_str(s: &str) -> Result<Self> {
        s.strip_prefix("bs-")
            .and_then(|hex| u64::from_str_radix(hex, 16).ok())
            .map(Self)
            .ok_or_else(|| BattleError::SessionNotFound(s.to_string()))
    }
}

/// Player identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PlayerId(pub u64);

/// Village identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VillageId(pub u64);

/// Identity fields of a new session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionParams {
    /// Session token.
    pub id: SessionId,
    /// Attacking player.
    pub attacker: PlayerId,
    /// Attacker's village.
    pub attacker_village: VillageId,
    /// Defender's village.
    pub defender_village: VillageId,
}

impl SessionParams {
    /// Bundle session identity.
    #[must_use]
    pub const fn new(
        id: SessionId,
        attacker: PlayerId,
        attacker_village: VillageId,
        defender_village: VillageId,
    ) -> Self {
        Self {
            id,
            attacker,
            attacker_village,
            defender_village,
        }
    }
}

/// Live battle state.
#[derive(Debug, Clone)]
pub struct BattleSession {
    pub(crate) params: SessionParams,
    pub(crate) rules: Arc<BattleRules>,
    pub(crate) layout: DefenseLayout,
    pub(crate) troops: Vec<Troop>,
    pub(crate) structures: Vec<Structure>,
    pub(crate) events: EventLog,
    pub(crate) tick: u64,
    pub(crate) elapsed_ms: u64,
    pub(crate) destroyed_health: u64,
    pub(crate) total_health: u64,
    pub(crate) status: BattleStatus,
    pub(crate) outcome: Option<BattleOutcome>,
}

impl BattleSession {
    /// Create an active session against a snapshot of `layout`.
    ///
    /// # Errors
    ///
    /// Returns [`BattleError::InvalidLayout`] if the layout fails validation.
    pub fn new(params: SessionParams, layout: DefenseLayout, rules: Arc<BattleRules>) -> Result<Self> {
        layout.validate()?;
        let structures = layout.instantiate();
        let total_health = layout.total_health();
        Ok(Self {
            params,
            rules,
            layout,
            troops: Vec::new(),
            structures,
            events: EventLog::new(),
            tick: 0,
            elapsed_ms: 0,
            destroyed_health: 0,
            total_health,
            status: BattleStatus::Active,
            outcome: None,
        })
    }

    /// Session token.
    #[must_use]
    pub const fn id(&self) -> SessionId {
        self.params.id
    }

    /// Identity fields.
    #[must_use]
    pub const fn params(&self) -> &SessionParams {
        &self.params
    }

    /// Rules the session runs under.
    #[must_use]
    pub fn rules(&self) -> &BattleRules {
        &self.rules
    }

    /// Layout snapshot taken at creation.
    #[must_use]
    pub const fn layout(&self) -> &DefenseLayout {
        &self.layout
    }

    /// Troops in deployment order, dead ones included.
    #[must_use]
    pub fn troops(&self) -> &[Troop] {
        &self.troops
    }

    /// Structures in id order.
    #[must_use]
    pub fn structures(&self) -> &[Structure] {
        &self.structures
    }

    /// Event log.
    #[must_use]
    pub const fn events(&self) -> &EventLog {
        &self.events
    }

    /// Completed ticks.
    #[must_use]
    pub const fn tick(&self) -> u64 {
        self.tick
    }

    /// Simulated milliseconds elapsed.
    #[must_use]
    pub const fn elapsed_ms(&self) -> u64 {
        self.elapsed_ms
    }

    /// Current status.
    #[must_use]
    pub const fn status(&self) -> BattleStatus {
        self.status
    }

    /// Outcome, once terminal.
    #[must_use]
    pub const fn outcome(&self) -> Option<&BattleOutcome> {
        self.outcome.as_ref()
    }

    /// Number of troops still alive.
    #[must_use]
    pub fn live_troop_count(&self) -> usize {
        self.troops.iter().filter(|t| t.alive).count()
    }

    /// Current destruction percentage.
    #[must_use]
    pub fn destruction(&self) -> u8 {
        destruction_percent(self.destroyed_health, self.total_health)
    }

    /// Whether a critical structure has been destroyed.
    #[must_use]
    pub fn critical_destroyed(&self) -> bool {
        self.structures
            .iter()
            .any(|s| !s.alive && s.kind.is_critical())
    }

    pub(crate) fn structure(&self, id: StructureId) -> Option<&Structure> {
        self.structures.get(id.0 as usize).filter(|s| s.id == id)
    }

    pub(crate) fn log(&mut self, kind: EventKind) {
        self.events.push(self.tick, self.elapsed_ms, kind);
    }

    /// Force the session into a terminal status.
    ///
    /// Idempotent: on a session that is already terminal this returns the
    /// outcome computed at the original transition and changes nothing.
    ///
    /// # Errors
    ///
    /// Returns [`BattleError::InvalidState`] if `status` is `Active`.
    pub fn finish(&mut self, status: BattleStatus) -> Result<BattleOutcome> {
        if let Some(outcome) = self.outcome {
            return Ok(outcome);
        }
        if status.is_active() {
            return Err(BattleError::InvalidState(
                "cannot finish a battle as active".into(),
            ));
        }
        Ok(self.conclude(status))
    }

    /// Compute the outcome, set the terminal status and log `BattleEnd`.
    pub(crate) fn conclude(&mut self, status: BattleStatus) -> BattleOutcome {
        let outcome = self.rules.outcome.compute(
            self.destroyed_health,
            self.total_health,
            self.critical_destroyed(),
            self.layout.resources,
            status,
        );
        self.log(EventKind::BattleEnd { outcome });
        self.status = status;
        self.outcome = Some(outcome);
        tracing::debug!(
            session_id = %self.params.id,
            tick = self.tick,
            destruction = outcome.destruction,
            stars = outcome.stars,
            %status,
            "Battle concluded"
        );
        outcome
    }

    /// Point-in-time copy for spectators and rejoining clients.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.params.id,
            attacker: self.params.attacker,
            attacker_village: self.params.attacker_village,
            defender_village: self.params.defender_village,
            status: self.status,
            tick: self.tick,
            elapsed_ms: self.elapsed_ms,
            destruction: self.destruction(),
            troops: self.troops.clone(),
            structures: self.structures.clone(),
            event_count: self.events.len(),
            outcome: self.outcome,
        }
    }

    /// Hash of all simulation state, identical for identical histories.
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.tick.hash(&mut hasher);
        self.elapsed_ms.hash(&mut hasher);
        self.status.hash(&mut hasher);
        self.destroyed_health.hash(&mut hasher);
        self.troops.hash(&mut hasher);
        self.structures.hash(&mut hasher);
        self.events.hash(&mut hasher);
        hasher.finish()
    }
}

/// Consistent, serializable view of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Session token.
    pub id: SessionId,
    /// Attacking player.
    pub attacker: PlayerId,
    /// Attacker's village.
    pub attacker_village: VillageId,
    /// Defender's village.
    pub defender_village: VillageId,
    /// Status at snapshot time.
    pub status: BattleStatus,
    /// Completed ticks.
    pub tick: u64,
    /// Simulated milliseconds elapsed.
    pub elapsed_ms: u64,
    /// Destruction so far.
    pub destruction: u8,
    /// Troops in deployment order.
    pub troops: Vec<Troop>,
    /// Structures in id order.
    pub structures: Vec<Structure>,
    /// Events logged so far.
    pub event_count: usize,
    /// Outcome, once terminal.
    pub outcome: Option<BattleOutcome>,
}
