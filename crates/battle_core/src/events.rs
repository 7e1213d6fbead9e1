//! Battle event log.
//!
//! Events are stamped with simulation time, never wall-clock time, so a
//! log replays identically. Order is tick first, then deployment order.

use serde::{Deserialize, Serialize};

use crate::catalog::{TroopKind, TroopStats};
use crate::components::{GridPos, StructureId, TroopId};
use crate::math::Vec2Fixed;
use crate::outcome::BattleOutcome;

/// One significant occurrence in a battle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BattleEvent {
    /// Tick the event belongs to. Deployments carry the last completed tick.
    pub tick: u64,
    /// Simulated milliseconds since battle start.
    pub time_ms: u64,
    /// What happened.
    pub kind: EventKind,
}

/// Event kinds and their payloads.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// A troop was deployed.
    Spawn {
        /// New troop.
        troop: TroopId,
        /// Troop type.
        kind: TroopKind,
        /// Requested tile.
        position: GridPos,
        /// Stats captured at deployment, so replays ignore catalog changes.
        stats: TroopStats,
    },
    /// A troop moved.
    Move {
        /// Moving troop.
        troop: TroopId,
        /// Position before the step.
        from: Vec2Fixed,
        /// Position after the step.
        to: Vec2Fixed,
    },
    /// A troop hit a structure.
    Attack {
        /// Attacking troop.
        troop: TroopId,
        /// Structure hit.
        target: StructureId,
        /// Damage actually dealt.
        damage: u32,
    },
    /// A defensive structure hit a troop.
    StructureAttack {
        /// Firing structure.
        structure: StructureId,
        /// Troop hit.
        target: TroopId,
        /// Damage actually dealt.
        damage: u32,
    },
    /// A troop died.
    TroopDeath {
        /// Dead troop.
        troop: TroopId,
    },
    /// A structure was destroyed.
    BuildingDestroyed {
        /// Destroyed structure.
        structure: StructureId,
    },
    /// The battle reached a terminal status.
    BattleEnd {
        /// Final outcome.
        outcome: BattleOutcome,
    },
}

/// Append-only event log.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventLog {
    events: Vec<BattleEvent>,
}

impl EventLog {
    /// Empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, tick: u64, time_ms: u64, kind: EventKind) {
        self.events.push(BattleEvent {
            tick,
            time_ms,
            kind,
        });
    }

    /// Number of events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether the log is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// All events in order.
    #[must_use]
    pub fn as_slice(&self) -> &[BattleEvent] {
        &self.events
    }

    /// Iterate events in order.
    pub fn iter(&self) -> std::slice::Iter<'_, BattleEvent> {
        self.events.iter()
    }

    /// Events of one tick.
    #[must_use]
    pub fn at_tick(&self, tick: u64) -> Vec<&BattleEvent> {
        self.events.iter().filter(|e| e.tick == tick).collect()
    }

    /// Aggregate counts, handed to the battle store with the final record.
    #[must_use]
    pub fn summary(&self) -> EventLogSummary {
        let mut summary = EventLogSummary {
            total: self.events.len(),
            last_tick: self.events.last().map_or(0, |e| e.tick),
            ..EventLogSummary::default()
        };
        for event in &self.events {
            match event.kind {
                EventKind::Spawn { .. } => summary.spawns += 1,
                EventKind::Move { .. } => summary.moves += 1,
                EventKind::Attack { damage, .. } => {
                    summary.attacks += 1;
                    summary.damage_to_structures += u64::from(damage);
                }
                EventKind::StructureAttack { damage, .. } => {
                    summary.structure_attacks += 1;
                    summary.damage_to_troops += u64::from(damage);
                }
                EventKind::TroopDeath { .. } => summary.troop_deaths += 1,
                EventKind::BuildingDestroyed { .. } => summary.buildings_destroyed += 1,
                EventKind::BattleEnd { .. } => {}
            }
        }
        summary
    }
}

impl<'a> IntoIterator for &'a EventLog {
    type Item = &'a BattleEvent;
    type IntoIter = std::slice::Iter<'a, BattleEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.iter()
    }
}

/// Event counts for a finished battle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventLogSummary {
    /// Total events.
    pub total: usize,
    /// Tick of the last event.
    pub last_tick: u64,
    /// Deployments.
    pub spawns: usize,
    /// Logged moves.
    pub moves: usize,
    /// Troop attacks.
    pub attacks: usize,
    /// Defense shots.
    pub structure_attacks: usize,
    /// Troop deaths.
    pub troop_deaths: usize,
    /// Structures destroyed.
    pub buildings_destroyed: usize,
    /// Total damage dealt to structures.
    pub damage_to_structures: u64,
    /// Total damage dealt to troops.
    pub damage_to_troops: u64,
}
