//! Combat entity model.
//!
//! Troops are attacker-owned and mobile; structures are defender-owned,
//! stationary and fixed at session creation. A troop refers to its target
//! by [`StructureId`] only, and the id is re-validated every tick.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::catalog::{TroopKind, TroopStats};
use crate::math::{fixed_serde, Fixed, Vec2Fixed};

/// Battle grid width in tiles.
pub const GRID_WIDTH: i32 = 80;

/// Battle grid height in tiles.
pub const GRID_HEIGHT: i32 = 40;

/// Longest attack range a troop or defense may have: the grid diagonal,
/// rounded up.
pub const MAX_RANGE_TILES: u32 = 90;

/// Unique troop identifier within a session, assigned in deployment order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TroopId(pub u32);

/// Unique structure identifier within a layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StructureId(pub u32);

impl fmt::Display for TroopId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "troop#{}", self.0)
    }
}

impl fmt::Display for StructureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "structure#{}", self.0)
    }
}

/// Integer tile coordinate as supplied by callers.
///
/// Signed so that negative requests can be represented and rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridPos {
    /// Column, 0-indexed.
    pub x: i32,
    /// Row, 0-indexed.
    pub y: i32,
}

impl GridPos {
    /// Create a grid position.
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Whether the position lies on the grid (bounds inclusive).
    #[must_use]
    pub const fn in_bounds(self) -> bool {
        self.x >= 0 && self.x < GRID_WIDTH && self.y >= 0 && self.y < GRID_HEIGHT
    }

    /// Fixed-point position of this tile.
    #[must_use]
    pub fn to_vec(self) -> Vec2Fixed {
        Vec2Fixed::from_tile(self.x, self.y)
    }
}

/// Health component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Health {
    /// Current health points.
    pub current: u32,
    /// Maximum health points.
    pub max: u32,
}

impl Health {
    /// Create new health component at full health.
    #[must_use]
    pub const fn new(max: u32) -> Self {
        Self { current: max, max }
    }

    /// Check if the entity is dead (health == 0).
    #[must_use]
    pub const fn is_dead(&self) -> bool {
        self.current == 0
    }

    /// Apply damage, returning actual damage dealt.
    /// Uses saturating subtraction so health never drops below zero.
    pub fn apply_damage(&mut self, amount: u32) -> u32 {
        let actual = amount.min(self.current);
        self.current = self.current.saturating_sub(actual);
        actual
    }
}

/// Which structures a troop is willing to attack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetAffinity {
    /// Any ground structure (every structure in the current layout set).
    #[default]
    Ground,
    /// Defensive structures first; any structure once no defense is left.
    Defenses,
}

impl TargetAffinity {
    /// Whether `kind` is a preferred target for this affinity.
    #[must_use]
    pub const fn prefers(self, kind: StructureKind) -> bool {
        match self {
            Self::Ground => true,
            Self::Defenses => kind.is_defense(),
        }
    }
}

/// Defender structure types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StructureKind {
    /// Primary structure; destroying it grants partial credit.
    TownHall,
    /// Short-range ground defense.
    Cannon,
    /// Long-range defense.
    ArcherTower,
    /// Slow, heavy-hitting splash defense.
    Mortar,
    /// Magic defense.
    WizardTower,
    /// Gold producer.
    GoldMine,
    /// Elixir producer.
    ElixirCollector,
    /// Gold storage.
    GoldStorage,
    /// Elixir storage.
    ElixirStorage,
    /// Troop training building.
    Barracks,
    /// Troop housing.
    ArmyCamp,
    /// Builder housing.
    BuilderHut,
}

impl StructureKind {
    /// Whether this is the critical structure for star rating.
    #[must_use]
    pub const fn is_critical(self) -> bool {
        matches!(self, Self::TownHall)
    }

    /// Whether this structure is a defense.
    #[must_use]
    pub const fn is_defense(self) -> bool {
        matches!(
            self,
            Self::Cannon | Self::ArcherTower | Self::Mortar | Self::WizardTower
        )
    }
}

/// Attacker-owned mobile combat entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Troop {
    /// Unique id, monotonic in deployment order.
    pub id: TroopId,
    /// Troop type.
    pub kind: TroopKind,
    /// Current position.
    pub position: Vec2Fixed,
    /// Health.
    pub health: Health,
    /// Damage per attack.
    pub damage: u32,
    /// Movement speed in tiles per second.
    #[serde(with = "fixed_serde")]
    pub speed: Fixed,
    /// Attack range in tiles.
    #[serde(with = "fixed_serde")]
    pub range: Fixed,
    /// Target preference.
    pub affinity: TargetAffinity,
    /// Current target, by id only.
    pub target: Option<StructureId>,
    /// Alive flag; dead troops stay in the list for the log.
    pub alive: bool,
}

impl Troop {
    /// Instantiate a troop from catalog stats.
    #[must_use]
    pub fn new(id: TroopId, kind: TroopKind, stats: &TroopStats, position: Vec2Fixed) -> Self {
        Self {
            id,
            kind,
            position,
            health: Health::new(stats.health),
            damage: stats.damage,
            speed: stats.speed,
            range: stats.range,
            affinity: stats.affinity,
            target: None,
            alive: true,
        }
    }
}

/// Defender-owned stationary structure.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Structure {
    /// Unique id within the layout.
    pub id: StructureId,
    /// Structure type.
    pub kind: StructureKind,
    /// Position (tile centre).
    pub position: Vec2Fixed,
    /// Health.
    pub health: Health,
    /// Alive flag.
    pub alive: bool,
}
