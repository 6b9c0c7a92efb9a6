//! # Repository Module
//!
//! Repository pattern interfaces and implementations for domain entity
//! persistence.

pub mod memory_impl;
pub mod traits;

pub use memory_impl::{
    InMemoryAssignmentRepository, InMemoryMissionRepository, InMemoryRouteRepository,
    InMemoryTelemetryRepository, InMemoryVehicleRepository,
};
pub use traits::{
    AssignmentRepository, MissionRepository, Repositories, RouteRepository,
    TelemetryRepository, VehicleRepository,
};
