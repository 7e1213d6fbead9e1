//! Tick engine: advances one session by a fixed simulated time step.
//!
//! # Tick Order
//!
//! Each tick processes every live troop in deployment order:
//! 1. **Target acquisition** - keep a live target, or pick the nearest
//!    live structure (lowest id on ties) matching the troop's affinity
//! 2. **Movement** - out of range: step straight toward the target,
//!    stopping at the edge of range
//! 3. **Attack** - in range: damage the target; a destroyed structure is
//!    dropped as a target by every troop aiming at it, and those troops
//!    pick a new target on the following tick
//!
//! Then, if enabled, defenses fire at troops, fallen troops are marked
//! dead, and the end conditions are checked. A troop either moves or
//! attacks in a tick, never both.

use crate::components::{StructureId, Troop, TroopId};
use crate::events::EventKind;
use crate::math::{Fixed, Vec2Fixed};
use crate::outcome::{BattleOutcome, BattleStatus};
use crate::session::BattleSession;

/// Displacement below which a step is not logged as a `Move` (1/128 tile).
///
/// Also the tolerance added to attack range so that a troop which stopped
/// at the edge of its range is not left hovering just outside it.
pub const MOVE_EPSILON: Fixed = Fixed::from_bits(1 << 25);

/// What a call to [`BattleSession::advance`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickResult {
    /// Tick ran; battle continues.
    Running,
    /// Tick ran and ended the battle.
    Ended(BattleOutcome),
    /// Session was already terminal; nothing ran.
    Inactive,
}

/// Why a battle ended on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndCondition {
    /// Every structure destroyed.
    AllStructuresDestroyed,
    /// Troops were deployed and all of them are dead.
    ArmyDefeated,
    /// Maximum battle duration reached.
    TimeLimit,
}

impl BattleSession {
    /// Advance the simulation by one tick.
    ///
    /// Does nothing on a terminal session.
    pub fn advance(&mut self) -> TickResult {
        if !self.status.is_active() {
            return TickResult::Inactive;
        }

        self.tick += 1;
        self.elapsed_ms += u64::from(self.rules.config.tick_ms);

        let mut held = Vec::new();
        for index in 0..self.troops.len() {
            self.run_troop(index, &mut held);
        }

        if self.rules.config.defenses_fire {
            self.run_defenses();
        }

        self.run_casualties();

        #[cfg(debug_assertions)]
        tracing::trace!(
            session_id = %self.params.id,
            tick = self.tick,
            state_hash = self.state_hash(),
            "Battle state hash"
        );

        match self.end_condition() {
            Some(condition) => {
                tracing::debug!(
                    session_id = %self.params.id,
                    tick = self.tick,
                    ?condition,
                    "End condition reached"
                );
                TickResult::Ended(self.conclude(BattleStatus::Completed))
            }
            None => TickResult::Running,
        }
    }

    /// End condition met by the current state, if any.
    #[must_use]
    pub fn end_condition(&self) -> Option<EndCondition> {
        if self.structures.iter().all(|s| !s.alive) {
            Some(EndCondition::AllStructuresDestroyed)
        } else if !self.troops.is_empty() && self.troops.iter().all(|t| !t.alive) {
            Some(EndCondition::ArmyDefeated)
        } else if self.elapsed_ms >= self.rules.config.max_duration_ms {
            Some(EndCondition::TimeLimit)
        } else {
            None
        }
    }

    /// `held` collects troops that lost their target this tick.
    fn run_troop(&mut self, index: usize, held: &mut Vec<TroopId>) {
        if !self.troops[index].alive {
            return;
        }

        let current = self.troops[index]
            .target
            .filter(|&id| self.structure(id).is_some_and(|s| s.alive));
        let target = match current {
            Some(id) => id,
            None => {
                let troop = &self.troops[index];
                if held.contains(&troop.id) {
                    return;
                }
                match self.nearest_structure(troop) {
                    Some(id) => id,
                    None => {
                        self.troops[index].target = None;
                        return;
                    }
                }
            }
        };
        self.troops[index].target = Some(target);

        let Some(target_pos) = self.structure(target).map(|s| s.position) else {
            self.troops[index].target = None;
            return;
        };

        let troop = &self.troops[index];
        let reach = troop.range + MOVE_EPSILON;
        let dist_sq = troop.position.distance_squared(target_pos);

        if dist_sq > reach * reach {
            let gap = troop.position.distance(target_pos) - troop.range;
            let step = self.rules.config.tick_step(troop.speed).min(gap);
            let from = troop.position;
            let to = from.step_towards(target_pos, step);
            let id = troop.id;
            self.troops[index].position = to;
            if from.distance(to) > MOVE_EPSILON {
                self.log(EventKind::Move { troop: id, from, to });
            }
        } else {
            self.strike(index, target, held);
        }
    }

    /// Nearest live structure for `troop`, preferred kinds first.
    fn nearest_structure(&self, troop: &Troop) -> Option<StructureId> {
        let from: Vec2Fixed = troop.position;
        let pick = |preferred_only: bool| {
            self.structures
                .iter()
                .filter(|s| s.alive && (!preferred_only || troop.affinity.prefers(s.kind)))
                .min_by_key(|s| (from.distance_squared(s.position), s.id))
                .map(|s| s.id)
        };
        pick(true).or_else(|| pick(false))
    }

    fn strike(&mut self, index: usize, target: StructureId, held: &mut Vec<TroopId>) {
        let troop = self.troops[index].id;
        let damage = self.troops[index].damage;

        let slot = target.0 as usize;
        let dealt = self.structures[slot].health.apply_damage(damage);
        self.log(EventKind::Attack {
            troop,
            target,
            damage: dealt,
        });

        if self.structures[slot].alive && self.structures[slot].health.is_dead() {
            self.destroy_structure(target, held);
        }
    }

    fn destroy_structure(&mut self, id: StructureId, held: &mut Vec<TroopId>) {
        let structure = &mut self.structures[id.0 as usize];
        structure.alive = false;
        self.destroyed_health += u64::from(structure.health.max);
        self.log(EventKind::BuildingDestroyed { structure: id });

        for troop in &mut self.troops {
            if troop.target == Some(id) {
                troop.target = None;
                held.push(troop.id);
            }
        }
    }

    /// Each live defense shoots the nearest live troop in its range.
    fn run_defenses(&mut self) {
        for slot in 0..self.structures.len() {
            let structure = &self.structures[slot];
            if !structure.alive {
                continue;
            }
            let Some(profile) = self.rules.config.defenses.get(structure.kind) else {
                continue;
            };
            let origin = structure.position;
            let shooter = structure.id;
            let range = Fixed::from_num(profile.range);
            let range_sq = range * range;

            let target = self
                .troops
                .iter()
                .filter(|t| t.alive && !t.health.is_dead())
                .filter(|t| t.position.distance_squared(origin) <= range_sq)
                .min_by_key(|t| (t.position.distance_squared(origin), t.id))
                .map(|t| t.id);

            if let Some(target) = target {
                let dealt = self.troops[target.0 as usize]
                    .health
                    .apply_damage(profile.damage);
                self.log(EventKind::StructureAttack {
                    structure: shooter,
                    target,
                    damage: dealt,
                });
            }
        }
    }

    /// Mark troops at zero health dead, in deployment order.
    fn run_casualties(&mut self) {
        let fallen: Vec<TroopId> = self
            .troops
            .iter()
            .filter(|t| t.alive && t.health.is_dead())
            .map(|t| t.id)
            .collect();

        for id in fallen {
            let troop = &mut self.troops[id.0 as usize];
            troop.alive = false;
            troop.target = None;
            self.log(EventKind::TroopDeath { troop: id });
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::catalog::{TroopCatalog, TroopKind, TroopStats, MAX_TROOP_SPEED};
    use crate::components::{GridPos, StructureKind, TargetAffinity, MAX_RANGE_TILES};
    use crate::config::{BattleConfig, BattleRules, DefenseProfile, MAX_TICK_MS};
    use crate::layout::{DefenseLayout, StructureSpec};
    use crate::outcome::ResourcePool;
    use crate::session::{PlayerId, SessionId, SessionParams, VillageId};

    fn session(layout: DefenseLayout, config: BattleConfig) -> BattleSession {
        BattleSession::new(
            SessionParams::new(SessionId(3), PlayerId(1), VillageId(10), VillageId(20)),
            layout,
            Arc::new(BattleRules::new(config)),
        )
        .unwrap()
    }

    fn layout(specs: Vec<StructureSpec>) -> DefenseLayout {
        DefenseLayout::new(specs, ResourcePool::new(10_000, 10_000))
    }

    fn stats(damage: u32, speed: i32, range: i32) -> TroopStats {
        TroopStats {
            health: 100,
            damage,
            speed: Fixed::from_num(speed),
            range: Fixed::from_num(range),
            affinity: TargetAffinity::Ground,
        }
    }

    fn run_to_end(session: &mut BattleSession) -> BattleOutcome {
        for _ in 0..100_000 {
            if let TickResult::Ended(outcome) = session.advance() {
                return outcome;
            }
        }
        panic!("battle never ended");
    }

    #[test]
    fn test_two_structures_destroyed_gives_three_stars() {
        let mut session = session(
            layout(vec![
                StructureSpec::new(StructureKind::BuilderHut, 10, 10, 100),
                StructureSpec::new(StructureKind::BuilderHut, 14, 10, 100),
            ]),
            BattleConfig::default(),
        );
        session
            .deploy(TroopKind::Barbarian, &stats(25, 2, 1), GridPos::new(9, 10))
            .unwrap();

        let outcome = run_to_end(&mut session);
        assert_eq!(outcome.destruction, 100);
        assert_eq!(outcome.stars, 3);
        assert_eq!(outcome.status, BattleStatus::Completed);
        assert_eq!(session.end_condition(), Some(EndCondition::AllStructuresDestroyed));
    }

    #[test]
    fn test_nearest_target_with_lowest_id_tie_break() {
        let mut session = session(
            layout(vec![
                StructureSpec::new(StructureKind::GoldMine, 30, 10, 100),
                StructureSpec::new(StructureKind::GoldMine, 10, 10, 100),
                StructureSpec::new(StructureKind::GoldMine, 30, 30, 100),
            ]),
            BattleConfig::default(),
        );
        // Equidistant from structures 0 and 2.
        session
            .deploy(TroopKind::Archer, &stats(1, 1, 1), GridPos::new(30, 20))
            .unwrap();
        session.advance();
        assert_eq!(session.troops()[0].target, Some(StructureId(0)));
    }

    #[test]
    fn test_movement_is_clamped_at_range() {
        let mut session = session(
            layout(vec![StructureSpec::new(StructureKind::Barracks, 20, 0, 100)]),
            BattleConfig::default(),
        );
        // 300 tiles per second would overshoot in a single tick.
        session
            .deploy(TroopKind::Goblin, &stats(1, 300, 3), GridPos::new(0, 0))
            .unwrap();
        session.advance();

        let troop = &session.troops()[0];
        let gap = troop.position.distance(GridPos::new(20, 0).to_vec());
        assert!((gap - Fixed::from_num(3)).abs() <= MOVE_EPSILON, "gap {gap:?}");
        assert!(matches!(
            session.events().as_slice().last().map(|e| &e.kind),
            Some(EventKind::Move { .. })
        ));

        // Next tick it attacks instead of moving.
        session.advance();
        assert!(matches!(
            session.events().as_slice().last().map(|e| &e.kind),
            Some(EventKind::Attack { damage: 1, .. })
        ));
    }

    #[test]
    fn test_sub_epsilon_steps_move_without_logging() {
        let mut session = session(
            layout(vec![StructureSpec::new(StructureKind::Barracks, 20, 0, 100)]),
            BattleConfig::default(),
        );
        // 0.05 tiles/s at 100 ms per tick is 0.005 tiles per step.
        let crawler = TroopStats {
            speed: Fixed::from_num(0.05),
            ..stats(1, 1, 1)
        };
        assert!(BattleConfig::default().tick_step(crawler.speed) <= MOVE_EPSILON);
        session
            .deploy(TroopKind::Barbarian, &crawler, GridPos::new(0, 0))
            .unwrap();
        let start = session.troops()[0].position;

        for _ in 0..10 {
            session.advance();
        }

        assert!(session.troops()[0].position.x > start.x);
        assert_eq!(session.events().summary().moves, 0);
        assert!(!session
            .events()
            .as_slice()
            .iter()
            .any(|e| matches!(e.kind, EventKind::Move { .. })));
    }

    #[test]
    fn test_destroyed_target_is_dropped_by_all_troops() {
        let mut session = session(
            layout(vec![
                StructureSpec::new(StructureKind::Cannon, 10, 10, 15),
                StructureSpec::new(StructureKind::Mortar, 30, 10, 1_000),
            ]),
            BattleConfig::default(),
        );
        session
            .deploy(TroopKind::Barbarian, &stats(10, 1, 2), GridPos::new(9, 10))
            .unwrap();
        session
            .deploy(TroopKind::Barbarian, &stats(1, 1, 2), GridPos::new(11, 10))
            .unwrap();

        session.advance();
        assert!(session
            .troops()
            .iter()
            .all(|t| t.target == Some(StructureId(0))));

        // First troop lands the killing blow; the second must not retarget
        // within the same tick.
        session.advance();
        assert!(!session.structures()[0].alive);
        assert!(session.troops().iter().all(|t| t.target.is_none()));

        session.advance();
        assert!(session
            .troops()
            .iter()
            .all(|t| t.target == Some(StructureId(1))));
    }

    #[test]
    fn test_defenses_affinity_prefers_defenses() {
        let mut session = session(
            layout(vec![
                StructureSpec::new(StructureKind::TownHall, 5, 5, 100),
                StructureSpec::new(StructureKind::ArcherTower, 40, 5, 100),
            ]),
            BattleConfig::default(),
        );
        let giant = TroopStats {
            affinity: TargetAffinity::Defenses,
            ..stats(5, 1, 1)
        };
        session
            .deploy(TroopKind::Giant, &giant, GridPos::new(4, 5))
            .unwrap();
        session.advance();
        assert_eq!(session.troops()[0].target, Some(StructureId(1)));
    }

    #[test]
    fn test_time_limit_forces_completion() {
        let config = BattleConfig {
            max_duration_ms: 1_000,
            ..BattleConfig::default()
        };
        let mut session = session(
            layout(vec![StructureSpec::new(StructureKind::TownHall, 40, 20, 10_000)]),
            config,
        );
        let outcome = run_to_end(&mut session);
        assert_eq!(session.tick(), 10);
        assert_eq!(outcome.destruction, 0);
        assert_eq!(outcome.stars, 0);
        assert_eq!(session.end_condition(), Some(EndCondition::TimeLimit));
    }

    #[test]
    fn test_no_troops_does_not_end_battle_early() {
        let mut session = session(
            layout(vec![StructureSpec::new(StructureKind::TownHall, 40, 20, 100)]),
            BattleConfig::default(),
        );
        assert_eq!(session.advance(), TickResult::Running);
    }

    #[test]
    fn test_defense_fire_kills_troops_and_ends_battle() {
        let config = BattleConfig {
            defenses_fire: true,
            ..BattleConfig::default()
        };
        let mut session = session(
            layout(vec![StructureSpec::new(StructureKind::Mortar, 20, 20, 5_000)]),
            config,
        );
        let weak = TroopStats {
            health: 30,
            ..stats(1, 1, 1)
        };
        session
            .deploy(TroopKind::Barbarian, &weak, GridPos::new(18, 20))
            .unwrap();

        let outcome = run_to_end(&mut session);
        assert_eq!(session.end_condition(), Some(EndCondition::ArmyDefeated));
        assert!(!session.troops()[0].alive);
        assert!(outcome.destruction < 100);
        let summary = session.events().summary();
        assert_eq!(summary.troop_deaths, 1);
        assert!(summary.structure_attacks >= 2);
    }

    #[test]
    fn test_defense_profiles_come_from_config() {
        let run_first_tick = |profile: DefenseProfile| {
            let mut config = BattleConfig {
                defenses_fire: true,
                ..BattleConfig::default()
            };
            config.defenses.cannon = profile;
            let mut session = session(
                layout(vec![StructureSpec::new(StructureKind::Cannon, 20, 20, 5_000)]),
                config,
            );
            session
                .deploy(TroopKind::Barbarian, &stats(1, 1, 1), GridPos::new(18, 20))
                .unwrap();
            session.advance();
            session
        };

        let deadly = run_first_tick(DefenseProfile::new(100, 3));
        assert!(!deadly.troops()[0].alive);
        assert_eq!(deadly.end_condition(), Some(EndCondition::ArmyDefeated));

        // Same cannon with a one-tile range cannot reach the troop yet.
        let short = run_first_tick(DefenseProfile::new(100, 1));
        assert!(short.troops()[0].alive);
        assert_eq!(short.events().summary().structure_attacks, 0);
    }

    #[test]
    fn test_largest_validated_values_do_not_overflow() {
        let mut config = BattleConfig {
            tick_ms: MAX_TICK_MS,
            defenses_fire: true,
            ..BattleConfig::default()
        };
        config.defenses.mortar = DefenseProfile::new(u32::MAX, MAX_RANGE_TILES);
        config.validate().unwrap();

        let mut session = session(
            layout(vec![
                StructureSpec::new(StructureKind::TownHall, 79, 39, 1_000_000),
                StructureSpec::new(StructureKind::Mortar, 0, 0, 1_000_000),
            ]),
            config,
        );
        let sprinter = TroopStats {
            health: u32::MAX,
            damage: u32::MAX,
            speed: Fixed::from_num(MAX_TROOP_SPEED),
            range: Fixed::from_num(1),
            affinity: TargetAffinity::Ground,
        };
        let sniper = TroopStats {
            speed: Fixed::from_num(1),
            range: Fixed::from_num(MAX_RANGE_TILES),
            ..sprinter
        };
        assert!(sprinter.within_limits() && sniper.within_limits());
        session
            .deploy(TroopKind::Goblin, &sprinter, GridPos::new(0, 39))
            .unwrap();
        session
            .deploy(TroopKind::Archer, &sniper, GridPos::new(79, 0))
            .unwrap();

        for _ in 0..5 {
            session.advance();
        }
        let summary = session.events().summary();
        assert!(summary.attacks > 0);
        assert!(summary.structure_attacks > 0);
    }

    #[test]
    fn test_terminal_session_is_never_ticked() {
        let mut session = session(
            layout(vec![StructureSpec::new(StructureKind::TownHall, 40, 20, 100)]),
            BattleConfig::default(),
        );
        let catalog = TroopCatalog::standard();
        session
            .deploy(
                TroopKind::Wizard,
                catalog.stats(TroopKind::Wizard),
                GridPos::new(0, 0),
            )
            .unwrap();
        session.finish(BattleStatus::Abandoned).unwrap();
        let hash = session.state_hash();

        assert_eq!(session.advance(), TickResult::Inactive);
        assert_eq!(session.state_hash(), hash);
    }

    #[test]
    fn test_destruction_never_decreases() {
        let mut session = session(
            layout(vec![
                StructureSpec::new(StructureKind::GoldMine, 10, 10, 50),
                StructureSpec::new(StructureKind::ElixirCollector, 20, 10, 70),
                StructureSpec::new(StructureKind::TownHall, 30, 10, 200),
            ]),
            BattleConfig::default(),
        );
        session
            .deploy(TroopKind::Wizard, &stats(20, 2, 3), GridPos::new(0, 10))
            .unwrap();

        let mut last = 0;
        while session.status().is_active() {
            session.advance();
            let now = session.destruction();
            assert!(now >= last);
            last = now;
        }
        assert_eq!(last, 100);
    }
}
