//! Contracts with the collaborators around the battle service.
//!
//! The service only ever talks to layouts, the battle store and the
//! connection layer through these traits. In-memory implementations back
//! the demo binary and the tests.

use std::sync::{Mutex, PoisonError};

use battle_core::error::{BattleError, Result};
use battle_core::events::EventLogSummary;
use battle_core::layout::DefenseLayout;
use battle_core::outcome::BattleOutcome;
use battle_core::session::{PlayerId, SessionId, VillageId};
use dashmap::{DashMap, DashSet};
use serde::{Deserialize, Serialize};

/// What a caller may do with a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    /// May start sessions and mutate their own.
    Attacker,
    /// Read-only.
    Spectator,
}

/// Authenticated identity of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Caller {
    /// Player id.
    pub player: PlayerId,
    /// Village the player acts for.
    pub village: VillageId,
    /// Role granted by the access check.
    pub role: Role,
}

impl Caller {
    /// An attacking caller.
    #[must_use]
    pub const fn attacker(player: PlayerId, village: VillageId) -> Self {
        Self {
            player,
            village,
            role: Role::Attacker,
        }
    }

    /// A spectating caller.
    #[must_use]
    pub const fn spectator(player: PlayerId, village: VillageId) -> Self {
        Self {
            player,
            village,
            role: Role::Spectator,
        }
    }
}

/// Source of defender layouts.
pub trait LayoutProvider: Send + Sync {
    /// Current layout of `village`.
    ///
    /// # Errors
    ///
    /// Returns [`BattleError::LayoutUnavailable`] when the layout cannot be
    /// loaded.
    fn load(&self, village: VillageId) -> Result<DefenseLayout>;
}

/// Final record of a battle, handed to the [`BattleStore`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BattleRecord {
    /// Session token.
    pub session: SessionId,
    /// Attacking player.
    pub attacker: PlayerId,
    /// Attacker village.
    pub attacker_village: VillageId,
    /// Defender village.
    pub defender_village: VillageId,
    /// Final outcome.
    pub outcome: BattleOutcome,
    /// Event log summary.
    pub summary: EventLogSummary,
}

/// Durable store for finished battles.
pub trait BattleStore: Send + Sync {
    /// Save the final record of a battle. Saving the same session twice
    /// must not create a second record.
    ///
    /// # Errors
    ///
    /// Returns [`BattleError::Persistence`] when the store is unavailable.
    fn save_final(&self, record: &BattleRecord) -> Result<()>;
}

/// Liveness signal from the connection layer.
pub trait ConnectionMonitor: Send + Sync {
    /// Whether a client of `session` is currently connected.
    fn is_connected(&self, session: SessionId) -> bool;
}

/// Layouts kept in memory, keyed by village.
#[derive(Debug, Default)]
pub struct InMemoryLayouts {
    layouts: DashMap<VillageId, DefenseLayout>,
}

impl InMemoryLayouts {
    /// Empty provider.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the layout of `village`.
    pub fn insert(&self, village: VillageId, layout: DefenseLayout) {
        self.layouts.insert(village, layout);
    }
}

impl LayoutProvider for InMemoryLayouts {
    fn load(&self, village: VillageId) -> Result<DefenseLayout> {
        self.layouts
            .get(&village)
            .map(|layout| layout.value().clone())
            .ok_or_else(|| BattleError::LayoutUnavailable {
                village: village.0,
                message: "no layout registered".into(),
            })
    }
}

/// Battle records kept in memory.
///
/// `fail_next` makes the next saves fail, standing in for a store outage.
#[derive(Debug, Default)]
pub struct InMemoryBattleStore {
    records: Mutex<Vec<BattleRecord>>,
    failures: Mutex<u32>,
}

impl InMemoryBattleStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` saves.
    pub fn fail_next(&self, count: u32) {
        *self.failures.lock().unwrap_or_else(PoisonError::into_inner) = count;
    }

    /// All records, oldest first.
    #[must_use]
    pub fn records(&self) -> Vec<BattleRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Records involving `village` as attacker or defender, newest first.
    #[must_use]
    pub fn load_for_village(&self, village: VillageId) -> Vec<BattleRecord> {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        records
            .iter()
            .rev()
            .filter(|r| r.attacker_village == village || r.defender_village == village)
            .cloned()
            .collect()
    }

    /// Up to `limit` most recent records, newest first.
    #[must_use]
    pub fn load_recent(&self, limit: usize) -> Vec<BattleRecord> {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        records.iter().rev().take(limit).cloned().collect()
    }
}

impl BattleStore for InMemoryBattleStore {
    fn save_final(&self, record: &BattleRecord) -> Result<()> {
        {
            let mut failures = self.failures.lock().unwrap_or_else(PoisonError::into_inner);
            if *failures > 0 {
                *failures -= 1;
                return Err(BattleError::Persistence {
                    session: record.session.to_string(),
                    message: "store unavailable".into(),
                });
            }
        }

        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        if !records.iter().any(|r| r.session == record.session) {
            records.push(record.clone());
        }
        Ok(())
    }
}

/// Connected sessions reported by the connection layer.
#[derive(Debug, Default)]
pub struct InMemoryConnections {
    connected: DashSet<SessionId>,
}

impl InMemoryConnections {
    /// No connections.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that a client of `session` connected.
    pub fn connect(&self, session: SessionId) {
        self.connected.insert(session);
    }

    /// Record that the client of `session` went away.
    pub fn disconnect(&self, session: SessionId) {
        self.connected.remove(&session);
    }
}

impl ConnectionMonitor for InMemoryConnections {
    fn is_connected(&self, session: SessionId) -> bool {
        self.connected.contains(&session)
    }
}

#[cfg(test)]
mod tests {
    use battle_core::outcome::{BattleStatus, Loot};

    use super::*;

    fn record(session: u64, defender: u64) -> BattleRecord {
        BattleRecord {
            session: SessionId(session),
            attacker: PlayerId(1),
            attacker_village: VillageId(10),
            defender_village: VillageId(defender),
            outcome: BattleOutcome {
                destruction: 40,
                stars: 1,
                loot: Loot::default(),
                status: BattleStatus::Completed,
            },
            summary: EventLogSummary::default(),
        }
    }

    #[test]
    fn test_save_is_idempotent_per_session() {
        let store = InMemoryBattleStore::new();
        store.save_final(&record(1, 20)).unwrap();
        store.save_final(&record(1, 20)).unwrap();
        assert_eq!(store.records().len(), 1);
    }

    #[test]
    fn test_injected_failures() {
        let store = InMemoryBattleStore::new();
        store.fail_next(1);
        assert!(matches!(
            store.save_final(&record(1, 20)),
            Err(BattleError::Persistence { .. })
        ));
        assert!(store.save_final(&record(1, 20)).is_ok());
    }

    #[test]
    fn test_read_paths() {
        let store = InMemoryBattleStore::new();
        store.save_final(&record(1, 20)).unwrap();
        store.save_final(&record(2, 30)).unwrap();
        store.save_final(&record(3, 20)).unwrap();

        let recent = store.load_recent(2);
        assert_eq!(recent[0].session, SessionId(3));
        assert_eq!(recent[1].session, SessionId(2));
        assert_eq!(store.load_for_village(VillageId(20)).len(), 2);
        assert_eq!(store.load_for_village(VillageId(10)).len(), 3);
    }

    #[test]
    fn test_unknown_layout() {
        let layouts = InMemoryLayouts::new();
        assert!(matches!(
            layouts.load(VillageId(5)),
            Err(BattleError::LayoutUnavailable { village: 5, .. })
        ));
    }
}
