//! # Battle Core
//!
//! Deterministic battle simulation for the village battle game.
//!
//! This crate contains **only** deterministic logic:
//! - No networking
//! - No wall-clock time (ticks advance simulated time)
//! - No randomness
//! - No floating-point math in the simulation (uses fixed-point)
//!
//! This separation enables:
//! - Authoritative server-side battles
//! - Replays that re-derive every event from the deployments
//! - Determinism testing
//!
//! ## Crate Structure
//!
//! - [`session`] - Battle session state and lifecycle
//! - [`deploy`] - Deployment validation
//! - [`tick`] - Tick engine (targeting, movement, combat, end conditions)
//! - [`outcome`] - Destruction, stars and loot
//! - [`catalog`] - Troop types and stats
//! - [`layout`] - Defender layouts
//! - [`events`] - Battle event log
//! - [`replay`] - Replay capture and verification
//! - [`config`] - Tunable battle rules
//! - [`math`] - Fixed-point math utilities

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod catalog;
pub mod components;
pub mod config;
pub mod deploy;
pub mod error;
pub mod events;
pub mod layout;
pub mod math;
pub mod outcome;
pub mod replay;
pub mod session;
pub mod tick;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::catalog::{CatalogData, TroopCatalog, TroopData, TroopKind, TroopStats};
    pub use crate::components::*;
    pub use crate::config::{BattleConfig, BattleRules, DefenseProfile, DefenseProfiles};
    pub use crate::error::{BattleError, RejectReason, Result};
    pub use crate::events::{BattleEvent, EventKind, EventLog, EventLogSummary};
    pub use crate::layout::{DefenseLayout, StructureSpec};
    pub use crate::math::{Fixed, Vec2Fixed};
    pub use crate::outcome::{
        BattleOutcome, BattleStatus, Loot, LootFormula, OutcomeCalculator, ProportionalLoot,
        ResourcePool, StarRules,
    };
    pub use crate::replay::Replay;
    pub use crate::session::{
        BattleSession, PlayerId, SessionId, SessionParams, SessionSnapshot, VillageId,
    };
    pub use crate::tick::{EndCondition, TickResult};
}
