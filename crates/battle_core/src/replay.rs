//! Battle replays.
//!
//! A replay stores the layout snapshot, the rules it ran under and the full
//! event log. Only `Spawn` events and the final `BattleEnd` are inputs; all
//! other events are re-derived by re-running the simulation, which is how
//! [`Replay::verify`] proves a battle was deterministic.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::{BattleConfig, BattleRules};
use crate::error::{BattleError, Result};
use crate::events::{BattleEvent, EventKind};
use crate::layout::DefenseLayout;
use crate::outcome::BattleOutcome;
use crate::session::{BattleSession, PlayerId, SessionId, SessionParams, VillageId};

/// Replay file format version for compatibility.
pub const REPLAY_VERSION: u32 = 1;

/// Everything needed to re-run one battle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Replay {
    /// Replay format version.
    pub version: u32,
    /// Identity of the recorded session.
    pub session: SessionId,
    /// Attacking player, kept for display.
    pub attacker: u64,
    /// Attacker village.
    pub attacker_village: u64,
    /// Defender village.
    pub defender_village: u64,
    /// Layout snapshot the battle ran against.
    pub layout: DefenseLayout,
    /// Battle rules.
    pub config: BattleConfig,
    /// Full event log in order.
    pub events: Vec<BattleEvent>,
}

impl Replay {
    /// Capture a replay from a session.
    ///
    /// # Errors
    ///
    /// Returns [`BattleError::InvalidState`] if the session is still active.
    pub fn from_session(session: &BattleSession) -> Result<Self> {
        if session.status().is_active() {
            return Err(BattleError::InvalidState(format!(
                "battle {} has not ended",
                session.id()
            )));
        }
        let params = session.params();
        Ok(Self {
            version: REPLAY_VERSION,
            session: params.id,
            attacker: params.attacker.0,
            attacker_village: params.attacker_village.0,
            defender_village: params.defender_village.0,
            layout: session.layout().clone(),
            config: session.rules().config.clone(),
            events: session.events().as_slice().to_vec(),
        })
    }

    /// Recorded outcome, taken from the `BattleEnd` event.
    #[must_use]
    pub fn outcome(&self) -> Option<BattleOutcome> {
        self.events.iter().rev().find_map(|event| match event.kind {
            EventKind::BattleEnd { outcome } => Some(outcome),
            _ => None,
        })
    }

    /// Tick of the last recorded event.
    #[must_use]
    pub fn final_tick(&self) -> u64 {
        self.events.last().map_or(0, |e| e.tick)
    }

    /// Encode with bincode.
    ///
    /// # Errors
    ///
    /// Returns [`BattleError::InvalidState`] if encoding fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self)
            .map_err(|e| BattleError::InvalidState(format!("Failed to serialize replay: {e}")))
    }

    /// Decode from bincode, rejecting other format versions.
    ///
    /// # Errors
    ///
    /// Returns [`BattleError::InvalidState`] on malformed input or a version
    /// mismatch.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let replay: Self = bincode::deserialize(bytes)
            .map_err(|e| BattleError::InvalidState(format!("Failed to deserialize replay: {e}")))?;
        if replay.version != REPLAY_VERSION {
            return Err(BattleError::InvalidState(format!(
                "Replay version mismatch: expected {REPLAY_VERSION}, got {}",
                replay.version
            )));
        }
        Ok(replay)
    }

    /// Save the replay to a file.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or file writing fails.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let bytes = self.to_bytes()?;
        std::fs::write(path.as_ref(), bytes)
            .map_err(|e| BattleError::InvalidState(format!("Failed to write replay file: {e}")))
    }

    /// Load a replay from a file.
    ///
    /// # Errors
    ///
    /// Returns an error if reading, decoding or the version check fails.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes = std::fs::read(path.as_ref())
            .map_err(|e| BattleError::InvalidState(format!("Failed to read replay file: {e}")))?;
        Self::from_bytes(&bytes)
    }

    /// Re-run the battle under the recorded config and check it reproduces
    /// the recorded log exactly.
    ///
    /// # Errors
    ///
    /// Returns [`BattleError::ReplayMismatch`] on any divergence.
    pub fn verify(&self) -> Result<BattleOutcome> {
        self.verify_with(Arc::new(BattleRules::new(self.config.clone())))
    }

    /// Like [`verify`](Self::verify), with caller-supplied rules (for
    /// battles that ran under a custom loot formula).
    ///
    /// # Errors
    ///
    /// Returns [`BattleError::ReplayMismatch`] on any divergence, or the
    /// validation error for a config outside the supported limits.
    pub fn verify_with(&self, rules: Arc<BattleRules>) -> Result<BattleOutcome> {
        rules.config.validate()?;
        let session = self.resimulate(rules)?;
        let replayed = session.events().as_slice();

        if let Some(index) = self
            .events
            .iter()
            .zip(replayed)
            .position(|(recorded, actual)| recorded != actual)
        {
            return Err(BattleError::ReplayMismatch(format!(
                "event {index} differs at tick {}",
                self.events[index].tick
            )));
        }
        if replayed.len() != self.events.len() {
            return Err(BattleError::ReplayMismatch(format!(
                "recorded {} events, replay produced {}",
                self.events.len(),
                replayed.len()
            )));
        }

        let recorded = self
            .outcome()
            .ok_or_else(|| BattleError::ReplayMismatch("no recorded outcome".into()))?;
        match session.outcome() {
            Some(&outcome) if outcome == recorded => {
                tracing::debug!(
                    session_id = %self.session,
                    ticks = session.tick(),
                    events = replayed.len(),
                    "Replay verified"
                );
                Ok(outcome)
            }
            other => Err(BattleError::ReplayMismatch(format!(
                "recorded outcome {recorded:?}, replay produced {other:?}"
            ))),
        }
    }

    /// Feed the recorded inputs back into a fresh session.
    fn resimulate(&self, rules: Arc<BattleRules>) -> Result<BattleSession> {
        let params = SessionParams::new(
            self.session,
            PlayerId(self.attacker),
            VillageId(self.attacker_village),
            VillageId(self.defender_village),
        );
        let mut session = BattleSession::new(params, self.layout.clone(), rules)?;

        for event in &self.events {
            match &event.kind {
                EventKind::Spawn {
                    kind,
                    position,
                    stats,
                    ..
                } => {
                    if !stats.within_limits() {
                        return Err(BattleError::ReplayMismatch(format!(
                            "troop stats at tick {} are outside catalog limits",
                            event.tick
                        )));
                    }
                    advance_to(&mut session, event.tick)?;
                    session.deploy(*kind, stats, *position).map_err(|e| {
                        BattleError::ReplayMismatch(format!(
                            "deployment at tick {} rejected: {e}",
                            event.tick
                        ))
                    })?;
                }
                EventKind::BattleEnd { outcome } => {
                    advance_to(&mut session, event.tick)?;
                    if session.status().is_active() {
                        session.finish(outcome.status)?;
                    }
                    break;
                }
                _ => {}
            }
        }
        Ok(session)
    }
}

/// Advance `session` until it has completed `tick` ticks.
fn advance_to(session: &mut BattleSession, tick: u64) -> Result<()> {
    while session.tick() < tick {
        if !session.status().is_active() {
            return Err(BattleError::ReplayMismatch(format!(
                "battle ended at tick {} before recorded tick {tick}",
                session.tick()
            )));
        }
        session.advance();
    }
    Ok(())
}
