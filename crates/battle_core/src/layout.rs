//! Defender layouts.
//!
//! A layout is loaded once per session and snapshotted: later edits to
//! the defender's village never reach a battle already in progress.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::components::{GridPos, Health, Structure, StructureId, StructureKind};
use crate::error::{BattleError, Result};
use crate::outcome::ResourcePool;

/// One structure as placed by the defender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StructureSpec {
    /// Structure type.
    pub kind: StructureKind,
    /// Tile position.
    pub position: GridPos,
    /// Maximum health.
    pub max_health: u32,
}

impl StructureSpec {
    /// Create a structure spec.
    #[must_use]
    pub const fn new(kind: StructureKind, x: i32, y: i32, max_health: u32) -> Self {
        Self {
            kind,
            position: GridPos::new(x, y),
            max_health,
        }
    }
}

/// The defender's fixed structure set plus the resources at stake.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct DefenseLayout {
    /// Structures; list order defines structure ids.
    pub structures: Vec<StructureSpec>,
    /// Defender stock, the loot ceiling.
    #[serde(default)]
    pub resources: ResourcePool,
}

impl DefenseLayout {
    /// Create a layout.
    #[must_use]
    pub fn new(structures: Vec<StructureSpec>, resources: ResourcePool) -> Self {
        Self {
            structures,
            resources,
        }
    }

    /// Reject layouts a battle cannot be scored against.
    ///
    /// # Errors
    ///
    /// Returns [`BattleError::InvalidLayout`] when the layout is empty, a
    /// structure sits off the grid, or a structure has zero health.
    pub fn validate(&self) -> Result<()> {
        if self.structures.is_empty() {
            return Err(BattleError::InvalidLayout("layout has no structures".into()));
        }
        if u32::try_from(self.structures.len()).is_err() {
            return Err(BattleError::InvalidLayout("too many structures".into()));
        }
        for (index, spec) in self.structures.iter().enumerate() {
            if !spec.position.in_bounds() {
                return Err(BattleError::InvalidLayout(format!(
                    "structure {index} at ({}, {}) is off the grid",
                    spec.position.x, spec.position.y
                )));
            }
            if spec.max_health == 0 {
                return Err(BattleError::InvalidLayout(format!(
                    "structure {index} has zero health"
                )));
            }
        }
        Ok(())
    }

    /// Parse and validate a layout from RON text.
    ///
    /// # Errors
    ///
    /// Returns [`BattleError::DataParseError`] on syntax errors, or the
    /// validation error.
    pub fn from_ron(text: &str, source: &str) -> Result<Self> {
        let layout: Self = ron::from_str(text).map_err(|e| BattleError::DataParseError {
            path: source.to_string(),
            message: e.to_string(),
        })?;
        layout.validate()?;
        Ok(layout)
    }

    /// Load a layout from a RON file.
    ///
    /// # Errors
    ///
    /// Returns [`BattleError::DataParseError`] if the file cannot be read or
    /// parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| BattleError::DataParseError {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_ron(&text, &path.display().to_string())
    }

    /// Sum of max health, the destruction denominator.
    #[must_use]
    pub fn total_health(&self) -> u64 {
        self.structures
            .iter()
            .map(|spec| u64::from(spec.max_health))
            .sum()
    }

    /// Runtime structures at full health. Ids follow list order from 0.
    #[must_use]
    pub fn instantiate(&self) -> Vec<Structure> {
        self.structures
            .iter()
            .zip(0u32..)
            .map(|(spec, id)| Structure {
                id: StructureId(id),
                kind: spec.kind,
                position: spec.position.to_vec(),
                health: Health::new(spec.max_health),
                alive: true,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_huts() -> DefenseLayout {
        DefenseLayout::new(
            vec![
                StructureSpec::new(StructureKind::BuilderHut, 10, 10, 100),
                StructureSpec::new(StructureKind::BuilderHut, 20, 10, 100),
            ],
            ResourcePool::default(),
        )
    }

    #[test]
    fn test_total_health() {
        assert_eq!(two_huts().total_health(), 200);
    }

    #[test]
    fn test_instantiate_assigns_ids_in_order() {
        let structures = two_huts().instantiate();
        assert_eq!(structures[0].id, StructureId(0));
        assert_eq!(structures[1].id, StructureId(1));
        assert!(structures.iter().all(|s| s.alive && s.health.current == 100));
    }

    #[test]
    fn test_empty_layout_rejected() {
        assert!(DefenseLayout::default().validate().is_err());
    }

    #[test]
    fn test_from_ron() {
        let layout = DefenseLayout::from_ron(
            "(structures: [(kind: town_hall, position: (x: 40, y: 20), max_health: 1500)], \
             resources: (gold: 500, elixir: 250))",
            "inline",
        )
        .unwrap();
        assert_eq!(layout.structures[0].kind, StructureKind::TownHall);
        assert_eq!(layout.resources, ResourcePool::new(500, 250));
        assert!(DefenseLayout::from_ron("(structures: [])", "inline").is_err());
    }

    #[test]
    fn test_bundled_demo_village() {
        let text = include_str!("../../../assets/data/demo_village.ron");
        let layout = DefenseLayout::from_ron(text, "demo_village.ron").unwrap();
        assert_eq!(layout.structures.len(), 12);
        assert_eq!(
            layout.structures.iter().filter(|s| s.kind.is_critical()).count(),
            1
        );
    }

    #[test]
    fn test_off_grid_structure_rejected() {
        let layout = DefenseLayout::new(
            vec![StructureSpec::new(StructureKind::Cannon, 80, 0, 100)],
            ResourcePool::default(),
        );
        assert!(matches!(
            layout.validate(),
            Err(BattleError::InvalidLayout(_))
        ));
    }
}
