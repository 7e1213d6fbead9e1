//! # Battle Server
//!
//! Hosts live battle sessions on top of `battle_core`.
//!
//! Sessions live in a concurrent in-memory store. Each one is advanced by
//! its own tick loop, and a periodic reaper abandons orphaned sessions,
//! retries failed saves and evicts finished ones. Layouts, final records
//! and connection liveness come from the collaborators in [`ports`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod config;
pub mod ports;
pub mod reaper;
pub mod service;
pub mod store;
pub mod ticker;

pub use config::ServerConfig;
pub use ports::{
    BattleRecord, BattleStore, Caller, ConnectionMonitor, InMemoryBattleStore,
    InMemoryConnections, InMemoryLayouts, LayoutProvider, Role,
};
pub use reaper::{RecurringTask, ReaperPolicy, SweepAction};
pub use service::{BattleService, SessionStart, SweepReport, TroopRequest};
pub use store::{SessionEntry, SessionStore};
