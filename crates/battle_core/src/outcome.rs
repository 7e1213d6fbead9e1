//! Outcome calculation: destruction percentage, stars and loot.
//!
//! Star thresholds and the loot formula are game-balance parameters, so
//! both are configuration: [`StarRules`] is plain data and loot goes
//! through the [`LootFormula`] trait with [`ProportionalLoot`] as the
//! default.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Session status. Terminal once it leaves `Active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BattleStatus {
    /// Simulation running.
    Active,
    /// Ended naturally, by time limit, or by the attacker.
    Completed,
    /// Terminated by the reaper after the client disappeared.
    Abandoned,
}

impl BattleStatus {
    /// Whether the session still accepts mutation.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Active)
    }

    /// Whether the status is terminal.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !self.is_active()
    }
}

impl fmt::Display for BattleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Abandoned => "abandoned",
        })
    }
}

/// Defender resource stock, the upper bound for loot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ResourcePool {
    /// Gold available.
    pub gold: u64,
    /// Elixir available.
    pub elixir: u64,
}

impl ResourcePool {
    /// Create a resource pool.
    #[must_use]
    pub const fn new(gold: u64, elixir: u64) -> Self {
        Self { gold, elixir }
    }
}

/// Loot taken from the defender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Loot {
    /// Gold taken.
    pub gold: u64,
    /// Elixir taken.
    pub elixir: u64,
}

/// Final result of a battle, computed once at the terminal transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BattleOutcome {
    /// Destruction percentage, 0-100, rounded down.
    pub destruction: u8,
    /// Stars, 0-3.
    pub stars: u8,
    /// Loot taken.
    pub loot: Loot,
    /// Terminal status.
    pub status: BattleStatus,
}

/// Destruction percentage: destroyed max health over total max health.
#[must_use]
pub fn destruction_percent(destroyed: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    let percent = (u128::from(destroyed.min(total)) * 100) / u128::from(total);
    u8::try_from(percent).unwrap_or(100)
}

/// Star thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StarRules {
    /// Destruction at or above which two stars are awarded.
    pub two_star_percent: u8,
    /// Destruction at or above which one star is awarded.
    pub one_star_percent: u8,
    /// Whether destroying the critical structure alone earns two stars.
    pub critical_grants_two: bool,
}

impl Default for StarRules {
    fn default() -> Self {
        Self {
            two_star_percent: 50,
            one_star_percent: 1,
            critical_grants_two: true,
        }
    }
}

impl StarRules {
    /// Stars for a final destruction percentage.
    #[must_use]
    pub const fn stars(&self, destruction: u8, critical_destroyed: bool) -> u8 {
        if destruction >= 100 {
            3
        } else if destruction >= self.two_star_percent
            || (critical_destroyed && self.critical_grants_two)
        {
            2
        } else if destruction >= self.one_star_percent {
            1
        } else {
            0
        }
    }
}

/// Loot as a function of destruction and defender stock.
///
/// Implementations should be non-decreasing in `destruction`; the
/// calculator clamps the result to `available` regardless.
pub trait LootFormula: fmt::Debug + Send + Sync {
    /// Loot for the given destruction percentage.
    fn loot(&self, destruction: u8, available: ResourcePool) -> Loot;
}

/// Default loot: `destruction% x max_share%` of each resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProportionalLoot {
    /// Share of the defender's stock lootable at 100% destruction.
    pub max_share_percent: u8,
}

impl Default for ProportionalLoot {
    fn default() -> Self {
        Self {
            max_share_percent: 20,
        }
    }
}

impl ProportionalLoot {
    fn share(self, destruction: u8, stock: u64) -> u64 {
        let destruction = u128::from(destruction.min(100));
        let share = u128::from(self.max_share_percent.min(100));
        let taken = u128::from(stock) * destruction * share / 10_000;
        u64::try_from(taken).unwrap_or(stock).min(stock)
    }
}

impl LootFormula for ProportionalLoot {
    fn loot(&self, destruction: u8, available: ResourcePool) -> Loot {
        Loot {
            gold: self.share(destruction, available.gold),
            elixir: self.share(destruction, available.elixir),
        }
    }
}

/// Derives [`BattleOutcome`]s from final session state.
#[derive(Debug, Clone)]
pub struct OutcomeCalculator {
    stars: StarRules,
    loot: Arc<dyn LootFormula>,
}

impl OutcomeCalculator {
    /// Create a calculator.
    #[must_use]
    pub fn new(stars: StarRules, loot: Arc<dyn LootFormula>) -> Self {
        Self { stars, loot }
    }

    /// Star rules in use.
    #[must_use]
    pub const fn star_rules(&self) -> &StarRules {
        &self.stars
    }

    /// Compute the outcome of a battle.
    #[must_use]
    pub fn compute(
        &self,
        destroyed_health: u64,
        total_health: u64,
        critical_destroyed: bool,
        available: ResourcePool,
        status: BattleStatus,
    ) -> BattleOutcome {
        let destruction = destruction_percent(destroyed_health, total_health);
        let raw = self.loot.loot(destruction, available);
        BattleOutcome {
            destruction,
            stars: self.stars.stars(destruction, critical_destroyed),
            loot: Loot {
                gold: raw.gold.min(available.gold),
                elixir: raw.elixir.min(available.elixir),
            },
            status,
        }
    }
}

impl Default for OutcomeCalculator {
    fn default() -> Self {
        Self::new(StarRules::default(), Arc::new(ProportionalLoot::default()))
    }
}
