//! # SkyFleet Orchestrator
//!
//! Mission execution, command fan-out, telemetry ingestion and lazy vehicle
//! provisioning on top of the repository traits of `skyfleet-persistence`.
//!
//! ## Components
//!
//! ```text
//!                      ┌────────────────────┐
//!                      │   MissionService   │
//!                      └─────────┬──────────┘
//!          ┌─────────────────────┼──────────────────────┐
//!          ▼                     ▼                      ▼
//! ┌─────────────────┐  ┌───────────────────┐  ┌───────────────────┐
//! │ MissionExecutor │  │ CommandDispatcher │  │ TelemetryPipeline │
//! └────────┬────────┘  └─────────┬─────────┘  └─────────┬─────────┘
//!          │                     │                      ▼
//!          │                     │            ┌────────────────────┐
//!          │                     │            │ VehicleProvisioner │
//!          ▼                     ▼            └────────────────────┘
//! ┌─────────────────────────────────────┐
//! │          MessagePublisher           │
//! └─────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use skyfleet_orchestrator::{BroadcastPublisher, MissionService, OrchestratorConfig};
//! use skyfleet_persistence::Repositories;
//!
//! let config = OrchestratorConfig::from_env();
//! let bus = Arc::new(BroadcastPublisher::new(config.bus_capacity));
//! let service = MissionService::new(Repositories::in_memory(), bus, config);
//! let mission = service.execute(mission_id, "commander").await?;
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod auto_mission;
pub mod bus;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod execution;
pub mod fanout;
pub mod provisioner;
pub mod service;
pub mod telemetry;

pub use auto_mission::AutoMissionOpener;
pub use bus::{BroadcastPublisher, BusMessage, MessagePublisher, PublishError, EXECUTION_TOPIC, vehicle_topic};
pub use config::{DispatchMode, OrchestratorConfig};
pub use dispatcher::{CommandDispatcher, DispatchReport};
pub use error::{ErrorKind, OrchestrationError, Result, VehicleFailure};
pub use execution::MissionExecutor;
pub use provisioner::{ProvisionOutcome, VehicleProvisioner};
pub use service::MissionService;
pub use telemetry::{ProvisioningHook, TelemetryPipeline};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
