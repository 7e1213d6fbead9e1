//! Property tests over random layouts and deployment scripts.

use battle_core::prelude::*;
use battle_test_utils::determinism::strategies::{arb_any_pos, arb_deploy_script, arb_layout};
use battle_test_utils::fixtures::new_session;
use battle_test_utils::proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_destruction_is_bounded_and_monotone(
        layout in arb_layout(10),
        script in arb_deploy_script(10),
        defenses_fire in any::<bool>(),
    ) {
        let config = BattleConfig { defenses_fire, ..BattleConfig::default() };
        let mut session = new_session(layout, config);
        let catalog = TroopCatalog::standard();

        let mut script = script.into_iter().peekable();
        let mut last = session.destruction();
        for _ in 0..600 {
            while let Some(step) = script.next_if(|s| s.tick <= session.tick()) {
                let _ = session.deploy(step.kind, catalog.stats(step.kind), step.at);
            }
            if session.advance() == TickResult::Inactive {
                break;
            }
            let now = session.destruction();
            prop_assert!(now <= 100);
            prop_assert!(now >= last);
            last = now;
        }
    }

    #[test]
    fn prop_stars_follow_destruction(
        layout in arb_layout(6),
        script in arb_deploy_script(8),
    ) {
        let mut session = new_session(layout, BattleConfig::default());
        battle_test_utils::fixtures::run_script(&mut session, &script, 300);
        let outcome = session.finish(BattleStatus::Completed).unwrap();

        prop_assert!(outcome.stars <= 3);
        let rules = StarRules::default();
        prop_assert_eq!(
            outcome.stars,
            rules.stars(outcome.destruction, session.critical_destroyed())
        );
        prop_assert_eq!(outcome.destruction == 100, outcome.stars == 3);
    }

    #[test]
    fn prop_deployments_land_exactly_or_mutate_nothing(at in arb_any_pos()) {
        let layout = DefenseLayout::new(
            vec![StructureSpec::new(StructureKind::TownHall, 40, 20, 1_000)],
            ResourcePool::default(),
        );
        let mut session = new_session(layout, BattleConfig::default());
        let catalog = TroopCatalog::standard();
        let before = session.state_hash();

        match session.deploy_key(&catalog, "giant", at) {
            Ok(troop) => {
                prop_assert!(at.in_bounds());
                prop_assert_eq!(troop.position, Vec2Fixed::from_tile(at.x, at.y));
            }
            Err(err) => {
                prop_assert!(!at.in_bounds());
                prop_assert_eq!(err, BattleError::OutOfBounds { x: at.x, y: at.y });
                prop_assert_eq!(session.state_hash(), before);
            }
        }
    }
}
