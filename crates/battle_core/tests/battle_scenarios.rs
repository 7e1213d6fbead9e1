//! End-to-end battle scenarios driven through the public API.

use battle_core::prelude::*;
use battle_test_utils::fixtures::{
    new_session, run_script, standard_village, two_structure_layout, ScriptedDeploy,
};

// =============================================================================
// Outcome scenarios
// =============================================================================

#[test]
fn test_two_structures_destroyed_scores_full_marks() {
    let mut session = new_session(two_structure_layout(), BattleConfig::default());
    run_script(
        &mut session,
        &[ScriptedDeploy::new(0, TroopKind::Wizard, 12, 12)],
        5_000,
    );

    let outcome = session.outcome().copied().unwrap();
    assert_eq!(outcome.destruction, 100);
    assert_eq!(outcome.stars, 3);
    assert_eq!(outcome.status, BattleStatus::Completed);
    assert_eq!(
        session.end_condition(),
        Some(EndCondition::AllStructuresDestroyed)
    );
    assert!(matches!(
        session.events().as_slice().last().map(|e| &e.kind),
        Some(EventKind::BattleEnd { .. })
    ));
}

#[test]
fn test_town_hall_alone_grants_two_stars() {
    let layout = DefenseLayout::new(
        vec![
            StructureSpec::new(StructureKind::TownHall, 5, 5, 100),
            StructureSpec::new(StructureKind::GoldStorage, 70, 35, 900),
        ],
        ResourcePool::new(10_000, 10_000),
    );
    let mut session = new_session(layout, BattleConfig::default());
    let catalog = TroopCatalog::standard();
    session
        .deploy(TroopKind::Wizard, catalog.stats(TroopKind::Wizard), GridPos::new(5, 8))
        .unwrap();

    while session.structures()[0].alive {
        session.advance();
    }
    let outcome = session.finish(BattleStatus::Completed).unwrap();
    assert_eq!(outcome.destruction, 10);
    assert_eq!(outcome.stars, 2);
    assert!(outcome.loot.gold > 0);
    assert!(outcome.loot.gold <= 10_000);
}

#[test]
fn test_time_limit_forces_completed_with_partial_destruction() {
    let config = BattleConfig {
        max_duration_ms: 3_000,
        ..BattleConfig::default()
    };
    let mut session = new_session(standard_village(), config);
    run_script(
        &mut session,
        &[ScriptedDeploy::new(0, TroopKind::Barbarian, 21, 20)],
        10_000,
    );

    assert_eq!(session.status(), BattleStatus::Completed);
    assert_eq!(session.tick(), 30);
    assert_eq!(session.end_condition(), Some(EndCondition::TimeLimit));
    assert!(session.outcome().unwrap().destruction < 100);
}

#[test]
fn test_army_wiped_out_by_defenses_ends_battle() {
    let config = BattleConfig {
        defenses_fire: true,
        ..BattleConfig::default()
    };
    let layout = DefenseLayout::new(
        vec![StructureSpec::new(StructureKind::WizardTower, 40, 20, 5_000)],
        ResourcePool::new(500, 500),
    );
    let mut session = new_session(layout, config);
    run_script(
        &mut session,
        &[
            ScriptedDeploy::new(0, TroopKind::Archer, 36, 20),
            ScriptedDeploy::new(0, TroopKind::Goblin, 44, 20),
        ],
        5_000,
    );

    assert_eq!(session.end_condition(), Some(EndCondition::ArmyDefeated));
    assert_eq!(session.live_troop_count(), 0);
    assert_eq!(session.events().summary().troop_deaths, 2);
}

// =============================================================================
// Deployment gate
// =============================================================================

#[test]
fn test_inclusive_grid_bounds() {
    let mut session = new_session(standard_village(), BattleConfig::default());
    let catalog = TroopCatalog::standard();

    let first = session
        .deploy_key(&catalog, "barbarian", GridPos::new(5, 10))
        .unwrap();
    let second = session
        .deploy_key(&catalog, "barbarian", GridPos::new(79, 39))
        .unwrap();
    assert_eq!(first.position, Vec2Fixed::from_tile(5, 10));
    assert_eq!(second.position, Vec2Fixed::from_tile(79, 39));

    let before = session.state_hash();
    for at in [GridPos::new(80, 10), GridPos::new(5, 40)] {
        let err = session.deploy_key(&catalog, "barbarian", at).unwrap_err();
        assert_eq!(err.reject_reason(), Some(RejectReason::OutOfBounds));
    }
    assert_eq!(session.state_hash(), before);
}

#[test]
fn test_eleventh_troop_rejected_with_cap_ten() {
    let config = BattleConfig {
        troop_cap: 10,
        ..BattleConfig::default()
    };
    let mut session = new_session(standard_village(), config);
    let results = run_script(
        &mut session,
        &(0..11)
            .map(|i| ScriptedDeploy::new(0, TroopKind::Goblin, i, 0))
            .collect::<Vec<_>>(),
        0,
    );

    assert!(results[..10].iter().all(Result::is_ok));
    let err = results[10].clone().unwrap_err();
    assert_eq!(err.reject_reason(), Some(RejectReason::CapacityExceeded));
    assert_eq!(session.troops().len(), 10);
    assert!(session.troops().iter().all(|t| t.alive));
}

#[test]
fn test_dead_troops_free_capacity() {
    let config = BattleConfig {
        troop_cap: 2,
        defenses_fire: true,
        ..BattleConfig::default()
    };
    let layout = DefenseLayout::new(
        vec![
            StructureSpec::new(StructureKind::Mortar, 40, 20, 5_000),
            StructureSpec::new(StructureKind::GoldMine, 0, 0, 5_000),
        ],
        ResourcePool::default(),
    );
    let mut session = new_session(layout, config);
    let catalog = TroopCatalog::standard();
    session
        .deploy_key(&catalog, "archer", GridPos::new(40, 25))
        .unwrap();
    session
        .deploy_key(&catalog, "goblin", GridPos::new(0, 3))
        .unwrap();
    assert!(session
        .deploy_key(&catalog, "goblin", GridPos::new(1, 3))
        .is_err());

    // The archer walks into mortar range and dies on the first tick.
    session.advance();
    assert_eq!(session.live_troop_count(), 1);
    assert!(session
        .deploy_key(&catalog, "goblin", GridPos::new(1, 3))
        .is_ok());
}

// =============================================================================
// Terminal boundary
// =============================================================================

#[test]
fn test_terminal_session_is_frozen() {
    let mut session = new_session(standard_village(), BattleConfig::default());
    run_script(
        &mut session,
        &[ScriptedDeploy::new(0, TroopKind::Giant, 30, 5)],
        20,
    );
    let outcome = session.finish(BattleStatus::Abandoned).unwrap();
    assert_eq!(outcome.status, BattleStatus::Abandoned);
    let frozen = session.state_hash();
    let events = session.events().len();

    assert_eq!(session.advance(), TickResult::Inactive);
    let catalog = TroopCatalog::standard();
    let err = session
        .deploy_key(&catalog, "giant", GridPos::new(1, 1))
        .unwrap_err();
    assert_eq!(err.reject_reason(), Some(RejectReason::SessionNotFound));

    // A second finish reports the original outcome.
    assert_eq!(session.finish(BattleStatus::Completed).unwrap(), outcome);
    assert_eq!(session.state_hash(), frozen);
    assert_eq!(session.events().len(), events);
}

// =============================================================================
// Replay
// =============================================================================

#[test]
fn test_replay_reproduces_standard_village_battle() {
    let config = BattleConfig {
        defenses_fire: true,
        ..BattleConfig::default()
    };
    let mut session = new_session(standard_village(), config);
    run_script(
        &mut session,
        &[
            ScriptedDeploy::new(0, TroopKind::Giant, 10, 20),
            ScriptedDeploy::new(0, TroopKind::WallBreaker, 12, 18),
            ScriptedDeploy::new(10, TroopKind::Wizard, 70, 20),
            ScriptedDeploy::new(25, TroopKind::Archer, 40, 2),
            ScriptedDeploy::new(25, TroopKind::Archer, 41, 2),
        ],
        1_800,
    );
    assert!(session.status().is_terminal());

    let replay = Replay::from_session(&session).unwrap();
    let bytes = replay.to_bytes().unwrap();
    let outcome = Replay::from_bytes(&bytes).unwrap().verify().unwrap();
    assert_eq!(&outcome, session.outcome().unwrap());
}

#[test]
fn test_replay_ignores_later_catalog_changes() {
    let mut session = new_session(two_structure_layout(), BattleConfig::default());
    let mut stats = *TroopCatalog::standard().stats(TroopKind::Barbarian);
    stats.damage = 50;
    session
        .deploy(TroopKind::Barbarian, &stats, GridPos::new(9, 10))
        .unwrap();
    while session.status().is_active() {
        session.advance();
    }

    // Verification uses the stats recorded in the spawn event.
    let replay = Replay::from_session(&session).unwrap();
    assert!(replay.verify().is_ok());
}
