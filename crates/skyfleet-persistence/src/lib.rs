//! # SkyFleet Persistence Library
//!
//! Persistence layer for the SkyFleet mission orchestrator.
//!
//! ## Architecture
//!
//! This crate implements the Repository pattern. The orchestration layer only
//! ever sees the traits; backends are swapped behind them:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Orchestration Layer                        │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Repository Traits                          │
//! │  (Mission, Assignment, Vehicle, Route, Telemetry)            │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  In-Memory Implementation                    │
//! │          (unique-key enforcement under write guard)          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use skyfleet_persistence::Repositories;
//!
//! let repos = Repositories::in_memory();
//! let mission = repos.missions.find_by_id(mission_id).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod repository;

// Re-export commonly used types
pub use error::{PersistenceError, Result};
pub use repository::{
    AssignmentRepository, InMemoryAssignmentRepository, InMemoryMissionRepository,
    InMemoryRouteRepository, InMemoryTelemetryRepository, InMemoryVehicleRepository,
    MissionRepository, Repositories, RouteRepository, TelemetryRepository, VehicleRepository,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
