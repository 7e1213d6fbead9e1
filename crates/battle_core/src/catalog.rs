//! Troop catalog: the closed set of troop types and their combat stats.
//!
//! Troop types are a closed enum. The stats table is built once at
//! startup, from RON data or the built-in defaults, and must cover every
//! variant. Unknown keys are rejected at the API boundary by
//! [`TroopKind::from_str`], never deep inside the simulation.
//!
//! # Example RON
//!
//! ```ron
//! CatalogData(
//!     troops: [
//!         (kind: barbarian, health: 45, damage: 8, speed: 2.0, range: 1.0),
//!         (kind: giant, health: 300, damage: 12, speed: 1.5, range: 1.0, affinity: defenses),
//!     ],
//! )
//! ```

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::components::{TargetAffinity, MAX_RANGE_TILES};
use crate::error::{BattleError, Result};
use crate::math::{fixed_serde, Fixed};

/// Fastest allowed troop, in tiles per second.
pub const MAX_TROOP_SPEED: u32 = 100;

/// Attacker troop types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TroopKind {
    /// Cheap melee unit.
    Barbarian,
    /// Ranged unit.
    Archer,
    /// Tanky, slow unit.
    Giant,
    /// Fast melee unit.
    Goblin,
    /// Fragile high-damage unit.
    WallBreaker,
    /// Ranged magic unit.
    Wizard,
}

impl TroopKind {
    /// Number of troop kinds.
    pub const COUNT: usize = 6;

    /// Every troop kind, in catalog order.
    pub const ALL: [Self; Self::COUNT] = [
        Self::Barbarian,
        Self::Archer,
        Self::Giant,
        Self::Goblin,
        Self::WallBreaker,
        Self::Wizard,
    ];

    /// Lookup key used on the wire and in data files.
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::Barbarian => "barbarian",
            Self::Archer => "archer",
            Self::Giant => "giant",
            Self::Goblin => "goblin",
            Self::WallBreaker => "wall_breaker",
            Self::Wizard => "wizard",
        }
    }

    const fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for TroopKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for TroopKind {
    type Err = BattleError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.key() == s)
            .ok_or_else(|| BattleError::UnknownTroopType(s.to_string()))
    }
}

/// Immutable combat stats for one troop type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TroopStats {
    /// Maximum health.
    pub health: u32,
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
}

impl TroopStats {
    /// Whether health, speed and range are positive and within the limits
    /// the tick engine's fixed-point math is sized for.
    #[must_use]
    pub fn within_limits(&self) -> bool {
        self.health > 0
            && self.speed > Fixed::ZERO
            && self.speed <= Fixed::from_num(MAX_TROOP_SPEED)
            && self.range > Fixed::ZERO
            && self.range <= Fixed::from_num(MAX_RANGE_TILES)
    }
}

/// One troop entry as written in a data file.
///
/// Speed and range are decimal in the file and converted to fixed-point
/// once, at load time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TroopData {
    /// Troop type.
    pub kind: TroopKind,
    /// Maximum health.
    pub health: u32,
    /// Damage per attack.
    pub damage: u32,
    /// Tiles per second.
    pub speed: f64,
    /// Range in tiles.
    pub range: f64,
    /// Target preference.
    #[serde(default)]
    pub affinity: TargetAffinity,
}

/// Root of a catalog data file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogData {
    /// One entry per troop kind.
    pub troops: Vec<TroopData>,
}

/// Exhaustive troop stats table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TroopCatalog {
    stats: [TroopStats; TroopKind::COUNT],
}

impl TroopCatalog {
    /// Built-in default stats.
    #[must_use]
    pub fn standard() -> Self {
        use TargetAffinity::{Defenses, Ground};
        let entry = |health, damage, speed: f64, range: f64, affinity| TroopStats {
            health,
            damage,
            speed: Fixed::from_num(speed),
            range: Fixed::from_num(range),
            affinity,
        };
        Self {
            stats: [
                entry(45, 8, 2.0, 1.0, Ground),
                entry(20, 7, 3.0, 3.5, Ground),
                entry(300, 12, 1.5, 1.0, Defenses),
                entry(25, 11, 4.0, 1.0, Ground),
                entry(20, 40, 3.0, 1.0, Ground),
                entry(75, 50, 2.0, 3.0, Ground),
            ],
        }
    }

    /// Build a catalog from parsed data, requiring exactly one entry per kind.
    ///
    /// # Errors
    ///
    /// Returns [`BattleError::DataParseError`] when a kind is missing or
    /// duplicated, when its health is zero, or when its speed or range is
    /// not positive or exceeds [`MAX_TROOP_SPEED`] / [`MAX_RANGE_TILES`].
    pub fn from_data(data: &CatalogData, source: &str) -> Result<Self> {
        let invalid = |message: String| BattleError::DataParseError {
            path: source.to_string(),
            message,
        };

        let mut slots: [Option<TroopStats>; TroopKind::COUNT] = [None; TroopKind::COUNT];
        for troop in &data.troops {
            if troop.health == 0 {
                return Err(invalid(format!("{} has zero health", troop.kind)));
            }
            if !(troop.speed > 0.0 && troop.speed <= f64::from(MAX_TROOP_SPEED)) {
                return Err(invalid(format!(
                    "{} speed must be in (0, {MAX_TROOP_SPEED}] tiles/s",
                    troop.kind
                )));
            }
            if !(troop.range > 0.0 && troop.range <= f64::from(MAX_RANGE_TILES)) {
                return Err(invalid(format!(
                    "{} range must be in (0, {MAX_RANGE_TILES}] tiles",
                    troop.kind
                )));
            }
            let slot = &mut slots[troop.kind.index()];
            if slot.is_some() {
                return Err(invalid(format!("duplicate entry for {}", troop.kind)));
            }
            *slot = Some(TroopStats {
                health: troop.health,
                damage: troop.damage,
                speed: Fixed::from_num(troop.speed),
                range: Fixed::from_num(troop.range),
                affinity: troop.affinity,
            });
        }

        let mut stats = Self::standard().stats;
        for kind in TroopKind::ALL {
            stats[kind.index()] = slots[kind.index()]
                .ok_or_else(|| invalid(format!("missing entry for {kind}")))?;
        }
        Ok(Self { stats })
    }

    /// Parse a catalog from RON text.
    ///
    /// # Errors
    ///
    /// Returns [`BattleError::DataParseError`] on syntax or validation errors.
    pub fn from_ron(text: &str, source: &str) -> Result<Self> {
        let data: CatalogData = ron::from_str(text).map_err(|e| BattleError::DataParseError {
            path: source.to_string(),
            message: e.to_string(),
        })?;
        Self::from_data(&data, source)
    }

    /// Load a catalog from a RON file.
    ///
    /// # Errors
    ///
    /// Returns [`BattleError::DataParseError`] if the file cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| BattleError::DataParseError {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_ron(&text, &path.display().to_string())
    }

    /// Stats for a troop kind. Total: every kind has an entry.
    #[must_use]
    pub const fn stats(&self, kind: TroopKind) -> &TroopStats {
        &self.stats[kind.index()]
    }

    /// Resolve a wire key to a kind and its stats.
    ///
    /// # Errors
    ///
    /// Returns [`BattleError::UnknownTroopType`] for unknown keys.
    pub fn resolve(&self, key: &str) -> Result<(TroopKind, TroopStats)> {
        let kind = key.parse::<TroopKind>()?;
        Ok((kind, *self.stats(kind)))
    }
}

impl Default for TroopCatalog {
    fn default() -> Self {
        Self::standard()
    }
}
