//! Battle server binary.
//!
//! Serves battle sessions from in-memory collaborators. With `--demo` it
//! plays one scripted battle against a layout file and prints the outcome.
//!
//! # Usage
//!
//! ```bash
//! # Run until Ctrl-C
//! cargo run -p battle_server -- --config assets/data/server.ron
//!
//! # One demo battle against the bundled village
//! cargo run -p battle_server -- --demo
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use battle_core::catalog::TroopCatalog;
use battle_core::error::{BattleError, Result};
use battle_core::layout::DefenseLayout;
use battle_core::session::{PlayerId, VillageId};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use battle_server::{
    BattleService, Caller, InMemoryBattleStore, InMemoryConnections, InMemoryLayouts,
    ServerConfig, TroopRequest,
};

const DEMO_ATTACKER: PlayerId = PlayerId(1);
const DEMO_ATTACKER_VILLAGE: VillageId = VillageId(1);
const DEMO_DEFENDER_VILLAGE: VillageId = VillageId(2);

#[derive(Parser)]
#[command(name = "battle_server")]
#[command(about = "Authoritative battle session server")]
#[command(version)]
struct Cli {
    /// Server config file (RON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Troop catalog file (RON); overrides the config's catalog_path
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Play one scripted battle and exit
    #[arg(long)]
    demo: bool,

    /// Defender layout used by --demo
    #[arg(long, default_value = "assets/data/demo_village.ron")]
    layout: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "Battle server failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    let catalog = match cli.catalog.as_ref().or(config.catalog_path.as_ref()) {
        Some(path) => TroopCatalog::load(path)?,
        None => TroopCatalog::standard(),
    };

    let layouts = Arc::new(InMemoryLayouts::new());
    let records = Arc::new(InMemoryBattleStore::new());
    let connections = Arc::new(InMemoryConnections::new());
    let service = BattleService::new(
        config,
        catalog,
        Arc::clone(&layouts) as _,
        Arc::clone(&records) as _,
        connections as _,
    );

    tracing::info!(
        tick_ms = service.config().battle.tick_ms,
        reaper_period_secs = service.config().reaper_period_secs,
        "Starting battle server"
    );
    let reaper = service.spawn_reaper();

    let result = if cli.demo {
        layouts.insert(DEMO_DEFENDER_VILLAGE, DefenseLayout::load(&cli.layout)?);
        run_demo(&service, &records).await
    } else {
        tracing::info!("Serving until Ctrl-C");
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %err, "Failed to wait for Ctrl-C");
        }
        Ok(())
    };

    reaper.stop().await;
    tracing::info!(sessions = service.sessions().len(), "Battle server stopped");
    result
}

async fn run_demo(service: &BattleService, records: &InMemoryBattleStore) -> Result<()> {
    let caller = Caller::attacker(DEMO_ATTACKER, DEMO_ATTACKER_VILLAGE);
    let army = [
        TroopRequest::new("giant", 30, 5),
        TroopRequest::new("giant", 50, 5),
        TroopRequest::new("barbarian", 38, 2),
        TroopRequest::new("barbarian", 42, 2),
        TroopRequest::new("archer", 20, 35),
        TroopRequest::new("archer", 60, 35),
        TroopRequest::new("wizard", 40, 38),
        TroopRequest::new("goblin", 10, 20),
        TroopRequest::new("wall_breaker", 70, 20),
    ];
    let start = service.start_session(&caller, DEMO_DEFENDER_VILLAGE, &army)?;
    tracing::info!(
        session_id = %start.session_id,
        troops = start.initial_state.troops.len(),
        "Demo battle started"
    );

    let poll = service.config().tick_interval() * 10;
    let snapshot = loop {
        tokio::time::sleep(poll).await;
        let snapshot = service.get_session(start.session_id, &caller)?;
        if !snapshot.status.is_active() {
            break snapshot;
        }
        tracing::debug!(
            tick = snapshot.tick,
            destruction = snapshot.destruction,
            "Demo battle progress"
        );
    };

    // The tick loop persists right after ending; give it a moment.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let outcome = serde_json::to_string_pretty(&snapshot.outcome)
        .map_err(|e| BattleError::InvalidState(format!("outcome encoding: {e}")))?;
    println!("{outcome}");
    tracing::info!(
        session_id = %start.session_id,
        ticks = snapshot.tick,
        saved = records.records().len(),
        "Demo battle finished"
    );
    Ok(())
}
