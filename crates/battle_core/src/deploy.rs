//! Deployment gate: admits new troops into a running session.
//!
//! Every check runs before anything is written, so a rejected deployment
//! leaves the session untouched. Deployment order is also the tick
//! engine's tie-break order.

use crate::catalog::{TroopCatalog, TroopKind, TroopStats};
use crate::components::{GridPos, Troop, TroopId};
use crate::error::{BattleError, Result};
use crate::events::EventKind;
use crate::session::BattleSession;

impl BattleSession {
    /// Deploy a troop of `kind` with `stats` at `at`.
    ///
    /// # Errors
    ///
    /// - [`BattleError::SessionNotFound`] if the session is terminal
    /// - [`BattleError::OutOfBounds`] if `at` is off the grid
    /// - [`BattleError::CapacityExceeded`] if the live troop cap is reached
    pub fn deploy(&mut self, kind: TroopKind, stats: &TroopStats, at: GridPos) -> Result<Troop> {
        if !self.status.is_active() {
            return Err(BattleError::SessionNotFound(self.params.id.to_string()));
        }
        if !at.in_bounds() {
            return Err(BattleError::OutOfBounds { x: at.x, y: at.y });
        }
        let cap = self.rules.config.troop_cap;
        if self.live_troop_count() >= cap {
            return Err(BattleError::CapacityExceeded { cap });
        }

        let id = TroopId(u32::try_from(self.troops.len()).map_err(|_| {
            BattleError::InvalidState("troop id space exhausted".into())
        })?);
        let troop = Troop::new(id, kind, stats, at.to_vec());
        self.troops.push(troop.clone());
        self.log(EventKind::Spawn {
            troop: id,
            kind,
            position: at,
            stats: *stats,
        });

        tracing::trace!(
            session_id = %self.params.id,
            troop = %id,
            %kind,
            x = at.x,
            y = at.y,
            "Troop deployed"
        );
        Ok(troop)
    }

    /// Deploy by wire key, resolving stats through `catalog`.
    ///
    /// # Errors
    ///
    /// [`BattleError::UnknownTroopType`] for unknown keys (checked after the
    /// session status), otherwise as [`deploy`](Self::deploy).
    pub fn deploy_key(&mut self, catalog: &TroopCatalog, key: &str, at: GridPos) -> Result<Troop> {
        if !self.status.is_active() {
            return Err(BattleError::SessionNotFound(self.params.id.to_string()));
        }
        let (kind, stats) = catalog.resolve(key)?;
        self.deploy(kind, &stats, at)
    }
}
