//! Determinism checks for battle sessions.
//!
//! A replayed battle must land on the same outcome on any machine, so
//! the engine keeps every source of drift out of the simulation: positions
//! and ranges are fixed-point, troops and structures are vectors walked in
//! id order, and events carry simulated time only. The helpers here play
//! one script several times, or two sessions side by side, and compare
//! [`BattleSession::state_hash`] values.
//!
//! Full-battle reproduction through [`Replay`] is covered by the property
//! test at the bottom of this module.
//!
//! [`Replay`]: battle_core::replay::Replay

use battle_core::config::BattleConfig;
use battle_core::layout::DefenseLayout;
use battle_core::outcome::BattleOutcome;
use battle_core::session::BattleSession;

use crate::fixtures::{new_session, run_script, ScriptedDeploy};

/// Final state of one scripted run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BattleRun {
    /// State hash after the last tick.
    pub final_hash: u64,
    /// Ticks completed.
    pub final_tick: u64,
    /// Outcome, if the battle ended within the tick budget.
    pub outcome: Option<BattleOutcome>,
}

/// Every run of one script, in execution order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeterminismReport {
    /// One entry per run.
    pub runs: Vec<BattleRun>,
}

impl DeterminismReport {
    /// Whether every run ended in the same state.
    #[must_use]
    pub fn is_deterministic(&self) -> bool {
        self.runs.windows(2).all(|pair| pair[0] == pair[1])
    }

    /// Distinct final hashes, sorted.
    #[must_use]
    pub fn distinct_hashes(&self) -> Vec<u64> {
        let mut hashes: Vec<u64> = self.runs.iter().map(|run| run.final_hash).collect();
        hashes.sort_unstable();
        hashes.dedup();
        hashes
    }

    /// # Panics
    ///
    /// Panics, listing every run, if the runs disagree.
    pub fn assert_deterministic(&self) {
        if self.is_deterministic() {
            return;
        }
        let listing: Vec<String> = self
            .runs
            .iter()
            .enumerate()
            .map(|(i, run)| {
                format!(
                    "  run {i}: hash {:016x} at tick {} -> {:?}",
                    run.final_hash, run.final_tick, run.outcome
                )
            })
            .collect();
        panic!(
            "battle diverged across {} runs ({} distinct states):\n{}",
            self.runs.len(),
            self.distinct_hashes().len(),
            listing.join("\n")
        );
    }
}

/// Play `script` against `layout` `runs` times from scratch.
pub fn check_battle_determinism(
    runs: usize,
    layout: &DefenseLayout,
    config: &BattleConfig,
    script: &[ScriptedDeploy],
    max_ticks: u64,
) -> DeterminismReport {
    let runs = (0..runs)
        .map(|_| {
            let mut session = new_session(layout.clone(), config.clone());
            run_script(&mut session, script, max_ticks);
            BattleRun {
                final_hash: session.state_hash(),
                final_tick: session.tick(),
                outcome: session.outcome().copied(),
            }
        })
        .collect();
    DeterminismReport { runs }
}

/// Step two sessions built by `build` in lockstep.
///
/// Returns the first tick after which their hashes differ (0 if they
/// differ from the start), or `None` if they agree until both are over or
/// `max_ticks` is reached.
pub fn first_divergent_tick<F>(build: F, max_ticks: u64) -> Option<u64>
where
    F: Fn() -> BattleSession,
{
    let (mut left, mut right) = (build(), build());
    if left.state_hash() != right.state_hash() {
        return Some(0);
    }
    for tick in 1..=max_ticks {
        if left.status().is_terminal() && right.status().is_terminal() {
            break;
        }
        left.advance();
        right.advance();
        if left.state_hash() != right.state_hash() {
            return Some(tick);
        }
    }
    None
}

/// Proptest strategies for battle testing.
pub mod strategies {
    use battle_core::catalog::TroopKind;
    use battle_core::components::{GridPos, StructureKind, GRID_HEIGHT, GRID_WIDTH};
    use battle_core::layout::{DefenseLayout, StructureSpec};
    use battle_core::outcome::ResourcePool;
    use proptest::prelude::*;

    use crate::fixtures::ScriptedDeploy;

    /// Any tile on the battle grid.
    pub fn arb_grid_pos() -> impl Strategy<Value = GridPos> {
        (0..GRID_WIDTH, 0..GRID_HEIGHT).prop_map(|(x, y)| GridPos::new(x, y))
    }

    /// Any tile, on or off the grid.
    pub fn arb_any_pos() -> impl Strategy<Value = GridPos> {
        (-20..GRID_WIDTH + 20, -20..GRID_HEIGHT + 20).prop_map(|(x, y)| GridPos::new(x, y))
    }

    /// Any troop type.
    pub fn arb_troop_kind() -> impl Strategy<Value = TroopKind> {
        proptest::sample::select(TroopKind::ALL.to_vec())
    }

    /// Any structure type.
    pub fn arb_structure_kind() -> impl Strategy<Value = StructureKind> {
        proptest::sample::select(vec![
            StructureKind::TownHall,
            StructureKind::Cannon,
            StructureKind::ArcherTower,
            StructureKind::Mortar,
            StructureKind::WizardTower,
            StructureKind::GoldMine,
            StructureKind::ElixirCollector,
            StructureKind::GoldStorage,
            StructureKind::ElixirStorage,
            StructureKind::Barracks,
            StructureKind::ArmyCamp,
            StructureKind::BuilderHut,
        ])
    }

    /// Structure health values (1-800).
    pub fn arb_health() -> impl Strategy<Value = u32> {
        1u32..800u32
    }

    /// A valid structure placement.
    pub fn arb_structure_spec() -> impl Strategy<Value = StructureSpec> {
        (arb_structure_kind(), arb_grid_pos(), arb_health()).prop_map(|(kind, pos, hp)| {
            StructureSpec::new(kind, pos.x, pos.y, hp)
        })
    }

    /// A valid layout with up to `max_structures` structures.
    pub fn arb_layout(max_structures: usize) -> impl Strategy<Value = DefenseLayout> {
        (
            proptest::collection::vec(arb_structure_spec(), 1..=max_structures.max(1)),
            0u64..1_000_000,
            0u64..1_000_000,
        )
            .prop_map(|(structures, gold, elixir)| {
                DefenseLayout::new(structures, ResourcePool::new(gold, elixir))
            })
    }

    /// One deployment at tick 0-50.
    pub fn arb_deploy() -> impl Strategy<Value = ScriptedDeploy> {
        (0u64..50, arb_troop_kind(), arb_grid_pos())
            .prop_map(|(tick, kind, at)| ScriptedDeploy { tick, kind, at })
    }

    /// A deployment script in tick order.
    pub fn arb_deploy_script(max_len: usize) -> impl Strategy<Value = Vec<ScriptedDeploy>> {
        proptest::collection::vec(arb_deploy(), 0..max_len).prop_map(|mut script| {
            script.sort_by_key(|step| step.tick);
            script
        })
    }
}

#[cfg(test)]
mod tests {
    use super::strategies::*;
    use super::*;
    use crate::fixtures::{standard_village, two_structure_layout};
    use battle_core::catalog::TroopKind;
    use battle_core::replay::Replay;
    use proptest::prelude::*;

    #[test]
    fn test_standard_village_battle_is_deterministic() {
        let script = [
            ScriptedDeploy::new(0, TroopKind::Giant, 10, 20),
            ScriptedDeploy::new(0, TroopKind::Giant, 10, 22),
            ScriptedDeploy::new(20, TroopKind::Archer, 40, 2),
            ScriptedDeploy::new(20, TroopKind::Wizard, 70, 20),
            ScriptedDeploy::new(35, TroopKind::Goblin, 5, 5),
        ];
        let config = BattleConfig {
            defenses_fire: true,
            ..BattleConfig::default()
        };
        let report = check_battle_determinism(4, &standard_village(), &config, &script, 2_000);
        report.assert_deterministic();
        assert_eq!(report.distinct_hashes().len(), 1);
        assert!(report.runs[0].outcome.is_some());
    }

    #[test]
    fn test_no_divergence_between_identical_sessions() {
        let setup = || {
            let mut session = new_session(two_structure_layout(), BattleConfig::default());
            run_script(
                &mut session,
                &[ScriptedDeploy::new(0, TroopKind::Barbarian, 0, 0)],
                0,
            );
            session
        };
        assert_eq!(first_divergent_tick(setup, 300), None);
    }

    #[test]
    fn test_different_scripts_diverge() {
        let report = DeterminismReport {
            runs: [(0, 1), (0, 2)]
                .into_iter()
                .map(|(tick, x)| {
                    let mut session =
                        new_session(two_structure_layout(), BattleConfig::default());
                    run_script(
                        &mut session,
                        &[ScriptedDeploy::new(tick, TroopKind::Archer, x, 30)],
                        5,
                    );
                    BattleRun {
                        final_hash: session.state_hash(),
                        final_tick: session.tick(),
                        outcome: None,
                    }
                })
                .collect(),
        };
        assert!(!report.is_deterministic());
        assert_eq!(report.distinct_hashes().len(), 2);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_random_battles_replay_exactly(
            layout in arb_layout(8),
            script in arb_deploy_script(12),
            defenses_fire in any::<bool>(),
        ) {
            let config = BattleConfig { defenses_fire, ..BattleConfig::default() };
            let mut session = new_session(layout, config);
            run_script(&mut session, &script, 400);
            if session.status().is_active() {
                session.finish(battle_core::outcome::BattleStatus::Completed).unwrap();
            }

            let replay = Replay::from_session(&session).unwrap();
            prop_assert_eq!(replay.verify().unwrap(), *session.outcome().unwrap());
        }
    }
}
