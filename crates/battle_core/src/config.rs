//! Battle configuration.
//!
//! Every balance knob lives here with a documented default, and the
//! whole struct loads from RON so operators can override any of it.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::components::{StructureKind, MAX_RANGE_TILES};
use crate::error::{BattleError, Result};
use crate::math::Fixed;
use crate::outcome::{LootFormula, OutcomeCalculator, ProportionalLoot, StarRules};

/// Default simulated time per tick (10 ticks per second).
pub const DEFAULT_TICK_MS: u32 = 100;

/// Longest allowed tick (ten seconds of simulated time).
pub const MAX_TICK_MS: u32 = 10_000;

/// Default maximum simulated battle duration (three minutes).
pub const DEFAULT_MAX_DURATION_MS: u64 = 180_000;

/// Default cap on live troops per session.
pub const DEFAULT_TROOP_CAP: usize = 50;

/// Firing profile of a defensive structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DefenseProfile {
    /// Damage per shot.
    pub damage: u32,
    /// Range in whole tiles.
    pub range: u32,
}

impl DefenseProfile {
    /// Create a profile.
    #[must_use]
    pub const fn new(damage: u32, range: u32) -> Self {
        Self { damage, range }
    }
}

/// Firing profiles for each defensive structure kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct DefenseProfiles {
    /// Short-range ground defense.
    pub cannon: DefenseProfile,
    /// Long-range defense.
    pub archer_tower: DefenseProfile,
    /// Heavy-hitting defense.
    pub mortar: DefenseProfile,
    /// Magic defense.
    pub wizard_tower: DefenseProfile,
}

impl Default for DefenseProfiles {
    fn default() -> Self {
        Self {
            cannon: DefenseProfile::new(9, 9),
            archer_tower: DefenseProfile::new(11, 10),
            mortar: DefenseProfile::new(20, 11),
            wizard_tower: DefenseProfile::new(14, 7),
        }
    }
}

impl DefenseProfiles {
    /// Profile for `kind`, or `None` for structures that never fire.
    #[must_use]
    pub const fn get(&self, kind: StructureKind) -> Option<DefenseProfile> {
        match kind {
            StructureKind::Cannon => Some(self.cannon),
            StructureKind::ArcherTower => Some(self.archer_tower),
            StructureKind::Mortar => Some(self.mortar),
            StructureKind::WizardTower => Some(self.wizard_tower),
            _ => None,
        }
    }

    fn named(&self) -> impl Iterator<Item = (&'static str, DefenseProfile)> {
        [
            ("cannon", self.cannon),
            ("archer_tower", self.archer_tower),
            ("mortar", self.mortar),
            ("wizard_tower", self.wizard_tower),
        ]
        .into_iter()
    }
}

/// Tunable battle parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BattleConfig {
    /// Simulated milliseconds advanced by one tick.
    pub tick_ms: u32,
    /// Simulated time after which the battle is force-ended.
    pub max_duration_ms: u64,
    /// Maximum number of live troops in one session.
    pub troop_cap: usize,
    /// Whether defensive structures shoot back at troops.
    pub defenses_fire: bool,
    /// Per-kind firing profiles, used when `defenses_fire` is set.
    pub defenses: DefenseProfiles,
    /// Star thresholds.
    pub stars: StarRules,
    /// Default loot formula parameters.
    pub loot: ProportionalLoot,
}

impl Default for BattleConfig {
    fn default() -> Self {
        Self {
            tick_ms: DEFAULT_TICK_MS,
            max_duration_ms: DEFAULT_MAX_DURATION_MS,
            troop_cap: DEFAULT_TROOP_CAP,
            defenses_fire: false,
            defenses: DefenseProfiles::default(),
            stars: StarRules::default(),
            loot: ProportionalLoot::default(),
        }
    }
}

impl BattleConfig {
    /// Check internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`BattleError::InvalidState`] describing the first bad field.
    pub fn validate(&self) -> Result<()> {
        if self.tick_ms == 0 || self.tick_ms > MAX_TICK_MS {
            return Err(BattleError::InvalidState(format!(
                "tick_ms must be in 1..={MAX_TICK_MS}"
            )));
        }
        if self.max_duration_ms < u64::from(self.tick_ms) {
            return Err(BattleError::InvalidState(
                "max_duration_ms must cover at least one tick".into(),
            ));
        }
        if self.troop_cap == 0 {
            return Err(BattleError::InvalidState("troop_cap must be positive".into()));
        }
        for (name, profile) in self.defenses.named() {
            if profile.range == 0 || profile.range > MAX_RANGE_TILES {
                return Err(BattleError::InvalidState(format!(
                    "{name} range must be in 1..={MAX_RANGE_TILES} tiles"
                )));
            }
        }
        if self.stars.one_star_percent > self.stars.two_star_percent
            || self.stars.two_star_percent > 100
        {
            return Err(BattleError::InvalidState(
                "star thresholds must satisfy one_star <= two_star <= 100".into(),
            ));
        }
        if self.loot.max_share_percent > 100 {
            return Err(BattleError::InvalidState(
                "loot share cannot exceed 100%".into(),
            ));
        }
        Ok(())
    }

    /// Parse and validate a config from RON text.
    ///
    /// # Errors
    ///
    /// Returns [`BattleError::DataParseError`] on syntax errors, or the
    /// validation error.
    pub fn from_ron(text: &str, source: &str) -> Result<Self> {
        let config: Self = ron::from_str(text).map_err(|e| BattleError::DataParseError {
            path: source.to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config from a RON file.
    ///
    /// # Errors
    ///
    /// Same as [`from_ron`](Self::from_ron), plus IO failures.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| BattleError::DataParseError {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_ron(&text, &path.display().to_string())
    }

    /// Distance covered in one tick at `speed` tiles per second.
    ///
    /// Overflow-free for any validated config and catalog speed.
    #[must_use]
    pub fn tick_step(&self, speed: Fixed) -> Fixed {
        speed * Fixed::from_num(self.tick_ms) / Fixed::from_num(1000)
    }
}

/// Config plus the outcome calculator shared by every session.
#[derive(Debug, Clone)]
pub struct BattleRules {
    /// Tunables.
    pub config: BattleConfig,
    /// Outcome calculator built from the config (or an injected formula).
    pub outcome: OutcomeCalculator,
}

impl BattleRules {
    /// Rules using the config's star thresholds and proportional loot.
    #[must_use]
    pub fn new(config: BattleConfig) -> Self {
        let outcome = OutcomeCalculator::new(config.stars, Arc::new(config.loot));
        Self { config, outcome }
    }

    /// Replace the loot formula.
    #[must_use]
    pub fn with_loot_formula(mut self, loot: Arc<dyn LootFormula>) -> Self {
        self.outcome = OutcomeCalculator::new(self.config.stars, loot);
        self
    }
}

impl Default for BattleRules {
    fn default() -> Self {
        Self::new(BattleConfig::default())
    }
}
