//! Test fixtures and helpers.
//!
//! Pre-built layouts, sessions and deployment scripts for consistent
//! testing.

use std::sync::Arc;

use battle_core::catalog::{TroopCatalog, TroopKind};
use battle_core::components::{GridPos, StructureKind};
use battle_core::config::{BattleConfig, BattleRules};
use battle_core::error::BattleError;
use battle_core::layout::{DefenseLayout, StructureSpec};
use battle_core::outcome::ResourcePool;
use battle_core::session::{BattleSession, PlayerId, SessionId, SessionParams, VillageId};
use fixed::types::I32F32;

/// Attacking player used by [`params`].
pub const ATTACKER: PlayerId = PlayerId(1);
/// Attacker village used by [`params`].
pub const ATTACKER_VILLAGE: VillageId = VillageId(100);
/// Defender village used by [`params`].
pub const DEFENDER_VILLAGE: VillageId = VillageId(200);

/// Create a fixed-point number from an integer.
#[must_use]
pub fn fixed(n: i32) -> I32F32 {
    I32F32::from_num(n)
}

/// Create a fixed-point number from a float (for tests only).
///
/// Note: In real simulation code, never use floats.
/// This is only for convenient test setup.
#[must_use]
pub fn fixed_f(n: f64) -> I32F32 {
    I32F32::from_num(n)
}

/// Two 100 hp builder huts, 4 tiles apart on row 10.
#[must_use]
pub fn two_structure_layout() -> DefenseLayout {
    DefenseLayout::new(
        vec![
            StructureSpec::new(StructureKind::BuilderHut, 10, 10, 100),
            StructureSpec::new(StructureKind::BuilderHut, 14, 10, 100),
        ],
        ResourcePool::new(1_000, 1_000),
    )
}

/// A small but complete village: town hall in the middle, defenses
/// around it, economy buildings on the edges.
#[must_use]
pub fn standard_village() -> DefenseLayout {
    DefenseLayout::new(
        vec![
            StructureSpec::new(StructureKind::TownHall, 40, 20, 1_500),
            StructureSpec::new(StructureKind::Cannon, 34, 16, 420),
            StructureSpec::new(StructureKind::ArcherTower, 46, 24, 380),
            StructureSpec::new(StructureKind::Mortar, 40, 14, 400),
            StructureSpec::new(StructureKind::WizardTower, 40, 26, 620),
            StructureSpec::new(StructureKind::GoldStorage, 30, 20, 800),
            StructureSpec::new(StructureKind::ElixirStorage, 50, 20, 800),
            StructureSpec::new(StructureKind::GoldMine, 25, 10, 300),
            StructureSpec::new(StructureKind::ElixirCollector, 55, 30, 300),
            StructureSpec::new(StructureKind::Barracks, 28, 30, 250),
            StructureSpec::new(StructureKind::ArmyCamp, 52, 10, 250),
            StructureSpec::new(StructureKind::BuilderHut, 20, 20, 250),
        ],
        ResourcePool::new(200_000, 150_000),
    )
}

/// Standard identity fields for session `id`.
#[must_use]
pub fn params(id: u64) -> SessionParams {
    SessionParams::new(SessionId(id), ATTACKER, ATTACKER_VILLAGE, DEFENDER_VILLAGE)
}

/// New active session.
///
/// # Panics
///
/// Panics if `layout` is invalid.
#[must_use]
pub fn new_session(layout: DefenseLayout, config: BattleConfig) -> BattleSession {
    BattleSession::new(params(1), layout, Arc::new(BattleRules::new(config)))
        .expect("fixture layout must be valid")
}

/// A deployment issued once the session has completed `tick` ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptedDeploy {
    /// Completed ticks before the deployment.
    pub tick: u64,
    /// Troop type.
    pub kind: TroopKind,
    /// Requested tile.
    pub at: GridPos,
}

impl ScriptedDeploy {
    /// Create a scripted deployment.
    #[must_use]
    pub const fn new(tick: u64, kind: TroopKind, x: i32, y: i32) -> Self {
        Self {
            tick,
            kind,
            at: GridPos::new(x, y),
        }
    }
}

/// Play `script` (in tick order) against `session` with the standard
/// catalog, then tick until the battle ends or `max_ticks` is reached.
///
/// Returns the result of every deployment so tests can assert on
/// rejections.
pub fn run_script(
    session: &mut BattleSession,
    script: &[ScriptedDeploy],
    max_ticks: u64,
) -> Vec<Result<(), BattleError>> {
    let catalog = TroopCatalog::standard();
    let mut results = Vec::with_capacity(script.len());

    for step in script {
        while session.tick() < step.tick && session.status().is_active() {
            session.advance();
        }
        let result = session
            .deploy(step.kind, catalog.stats(step.kind), step.at)
            .map(|_| ());
        results.push(result);
    }

    while session.status().is_active() && session.tick() < max_ticks {
        session.advance();
    }
    results
}
