//! # SkyFleet Node
//!
//! Runs the mission orchestrator over in-memory stores and an in-process bus.
//! Every bus message is logged as JSON.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

mod simulate;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use skyfleet_domain::{AssignmentRequest, CommandCode, MissionOrigin, NewMission, TelemetryEvent};
use skyfleet_orchestrator::{BroadcastPublisher, BusMessage, MissionService, OrchestratorConfig};
use skyfleet_persistence::Repositories;

use crate::simulate::FleetSimulator;

const DEMO_ROUTE: &str = r#"{
  "type": "Feature",
  "properties": {"name": "harbor loop"},
  "geometry": {
    "type": "LineString",
    "coordinates": [[-122.3400, 47.6010], [-122.3350, 47.6050], [-122.3290, 47.6080]]
  }
}"#;

#[derive(Parser, Debug)]
#[command(name = "skyfleet-node")]
#[command(about = "Drive the SkyFleet mission orchestrator from the command line")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ingest telemetry events from a JSON Lines file
    Replay {
        /// File with one telemetry event per line
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Stream random-walk telemetry for a simulated fleet
    Simulate {
        /// Number of vehicles
        #[arg(short, long, default_value = "4")]
        vehicles: usize,

        /// Number of ticks to run
        #[arg(short, long, default_value = "30")]
        ticks: u32,

        /// Tick interval in milliseconds
        #[arg(long, default_value = "500")]
        tick_ms: u64,

        /// External id prefix
        #[arg(long, default_value = "SIM")]
        prefix: String,

        /// RNG seed for a reproducible run
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Register a fleet, then create, approve, execute and complete a mission
    Demo {
        /// Commander name recorded on approval and execution
        #[arg(short, long, default_value = "demo-commander")]
        commander: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = OrchestratorConfig::from_env();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let args = Args::parse();

    tracing::info!(
        version = skyfleet_orchestrator::VERSION,
        dispatch_mode = %config.dispatch_mode,
        "Starting SkyFleet node"
    );

    let bus = BroadcastPublisher::new(config.bus_capacity);
    let listener = tokio::spawn(log_bus(bus.subscribe()));
    let service = MissionService::new(Repositories::in_memory(), Arc::new(bus), config);

    match args.command {
        Command::Replay { file } => replay(&service, &file).await?,
        Command::Simulate {
            vehicles,
            ticks,
            tick_ms,
            prefix,
            seed,
        } => simulate(&service, &prefix, vehicles, ticks, tick_ms, seed).await?,
        Command::Demo { commander } => demo(&service, &commander).await?,
    }

    service.drain_background().await;
    let automatic = service.missions_by_origin(MissionOrigin::Automatic).await?;
    tracing::info!(automatic_missions = automatic.len(), "Run finished");

    // Dropping the service closes the bus and ends the listener
    drop(service);
    listener.await.context("bus listener panicked")?;
    Ok(())
}

async fn log_bus(mut rx: broadcast::Receiver<BusMessage>) {
    loop {
        match rx.recv().await {
            Ok(message) => match message.to_json() {
                Ok(payload) => tracing::info!(topic = %message.topic(), %payload, "Bus message"),
                Err(err) => tracing::warn!(error = %err, "Bus message could not be encoded"),
            },
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Bus listener lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn replay(service: &MissionService, file: &Path) -> Result<()> {
    let content = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("reading {}", file.display()))?;

    let (mut accepted, mut rejected) = (0_usize, 0_usize);
    for (index, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let line_no = index + 1;

        let event: TelemetryEvent = match serde_json::from_str(line) {
            Ok(event) => event,
            Err(err) => {
                tracing::warn!(line = line_no, error = %err, "Skipping malformed telemetry line");
                rejected += 1;
                continue;
            }
        };

        match service.ingest_telemetry(event).await {
            Ok(_) => accepted += 1,
            Err(err) => {
                tracing::warn!(line = line_no, error = %err, error_code = err.error_code(), "Telemetry rejected");
                rejected += 1;
            }
        }
    }

    tracing::info!(accepted, rejected, "Replay complete");
    Ok(())
}

async fn simulate(
    service: &MissionService,
    prefix: &str,
    vehicles: usize,
    ticks: u32,
    tick_ms: u64,
    seed: Option<u64>,
) -> Result<()> {
    let mut fleet = FleetSimulator::new(prefix, vehicles, (47.6062, -122.3321), seed);
    let mut interval = tokio::time::interval(Duration::from_millis(tick_ms.max(1)));

    for tick in 1..=ticks {
        interval.tick().await;
        let mut ingested = 0_usize;
        for event in fleet.tick() {
            match service.ingest_telemetry(event).await {
                Ok(_) => ingested += 1,
                Err(err) => tracing::warn!(tick, error = %err, "Simulated telemetry rejected"),
            }
        }
        tracing::debug!(tick, ticks, ingested, "Tick");
    }
    Ok(())
}

async fn demo(service: &MissionService, commander: &str) -> Result<()> {
    let route = service
        .register_route("harbor loop", DEMO_ROUTE, Some("Feature"))
        .await?;

    let mut assignments = Vec::new();
    for (index, external_id) in ["DEMO-001", "DEMO-002", "DEMO-003"].into_iter().enumerate() {
        let vehicle = service
            .register_vehicle(external_id, "Quad X4", &format!("SN-{external_id}"))
            .await?;
        assignments.push(AssignmentRequest {
            vehicle_id: vehicle.vehicle_id,
            route_id: (index == 0).then_some(route.route_id),
        });
    }

    let draft = NewMission {
        name: Some("Harbor survey".to_string()),
        ..NewMission::default()
    };
    let mission = service.create_mission(draft, commander, assignments).await?;
    service.approve(mission.mission_id, commander).await?;
    service.execute(mission.mission_id, commander).await?;

    let code = CommandCode::parse("RETURN_TO_BASE")?;
    let report = service.dispatch_command(mission.mission_id, &code).await?;
    tracing::info!(mission_id = %mission.mission_id, commands = report.commands.len(), "Fleet recalled");

    let finished = service.complete(mission.mission_id, commander).await?;
    tracing::info!(
        mission_id = %finished.mission_id,
        state = %finished.state,
        "Demo mission finished"
    );
    Ok(())
}
