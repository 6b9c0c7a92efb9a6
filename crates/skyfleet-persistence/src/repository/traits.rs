//! # Repository Traits
//!
//! Abstract repository interfaces for domain entities.
//! Implementations can be swapped for different backends (in-memory, SQL, etc.)

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use skyfleet_domain::{
    DroneMissionAssignment, Mission, MissionOrigin, MissionState, Route, TelemetryRecord,
    TimeRange, Vehicle,
};

// =============================================================================
// MISSION REPOSITORY
// =============================================================================

/// Repository for Mission entity operations
#[async_trait]
pub trait MissionRepository: Send + Sync {
    /// Insert or replace a mission
    async fn save(&self, mission: Mission) -> Result<Mission>;

    /// Get mission by ID
    async fn find_by_id(&self, mission_id: Uuid) -> Result<Option<Mission>>;

    /// Get all missions in a lifecycle state
    async fn find_by_state(&self, state: MissionState) -> Result<Vec<Mission>>;

    /// Get all missions of an origin
    async fn find_by_origin(&self, origin: MissionOrigin) -> Result<Vec<Mission>>;
}

// =============================================================================
// ASSIGNMENT REPOSITORY
// =============================================================================

/// Repository for mission/vehicle assignments.
///
/// The (mission, vehicle) pair is unique.
#[async_trait]
pub trait AssignmentRepository: Send + Sync {
    /// Insert an assignment, rejecting a second assignment of the same
    /// vehicle to the same mission with [`PersistenceError::Duplicate`].
    ///
    /// [`PersistenceError::Duplicate`]: crate::PersistenceError::Duplicate
    async fn save(&self, assignment: DroneMissionAssignment) -> Result<DroneMissionAssignment>;

    /// Get a mission's assignments in assignment order
    async fn find_by_mission_id(&self, mission_id: Uuid) -> Result<Vec<DroneMissionAssignment>>;

    /// Get every assignment of a vehicle
    async fn find_by_vehicle_id(&self, vehicle_id: Uuid) -> Result<Vec<DroneMissionAssignment>>;

    /// Point an assignment at another route (or none)
    async fn update_route(
        &self,
        assignment_id: Uuid,
        route_id: Option<Uuid>,
    ) -> Result<DroneMissionAssignment>;
}

// =============================================================================
// VEHICLE REPOSITORY
// =============================================================================

/// Repository for Vehicle entity operations.
///
/// The external identifier is unique.
#[async_trait]
pub trait VehicleRepository: Send + Sync {
    /// Insert or replace a vehicle; a second vehicle claiming an existing
    /// external id is rejected as a duplicate.
    async fn save(&self, vehicle: Vehicle) -> Result<Vehicle>;

    /// Get vehicle by ID
    async fn find_by_id(&self, vehicle_id: Uuid) -> Result<Option<Vehicle>>;

    /// Get vehicle by telemetry correlation key
    async fn find_by_external_id(&self, external_id: &str) -> Result<Option<Vehicle>>;

    async fn exists_by_external_id(&self, external_id: &str) -> Result<bool>;
}

// =============================================================================
// ROUTE REPOSITORY
// =============================================================================

/// Repository for Route resources
#[async_trait]
pub trait RouteRepository: Send + Sync {
    async fn save(&self, route: Route) -> Result<Route>;

    async fn find_by_id(&self, route_id: Uuid) -> Result<Option<Route>>;
}

// =============================================================================
// TELEMETRY REPOSITORY
// =============================================================================

/// Repository for telemetry time-series
#[async_trait]
pub trait TelemetryRepository: Send + Sync {
    /// Insert telemetry record
    async fn save(&self, record: TelemetryRecord) -> Result<TelemetryRecord>;

    /// Get telemetry for a vehicle within a time range, newest first
    async fn find_by_vehicle_range(
        &self,
        vehicle_external_id: &str,
        range: TimeRange,
        limit: Option<usize>,
    ) -> Result<Vec<TelemetryRecord>>;

    /// Get the most recent `limit` records for a vehicle, newest first
    async fn find_recent(
        &self,
        vehicle_external_id: &str,
        limit: usize,
    ) -> Result<Vec<TelemetryRecord>>;
}

// =============================================================================
// REPOSITORY BUNDLE
// =============================================================================

/// Shared handles to every store the orchestration layer consumes
#[derive(Clone)]
pub struct Repositories {
    pub missions: Arc<dyn MissionRepository>,
    pub assignments: Arc<dyn AssignmentRepository>,
    pub vehicles: Arc<dyn VehicleRepository>,
    pub routes: Arc<dyn RouteRepository>,
    pub telemetry: Arc<dyn TelemetryRepository>,
}

impl Repositories {
    /// Bundle backed entirely by in-memory stores
    #[must_use]
    pub fn in_memory() -> Self {
        use super::memory_impl::{
            InMemoryAssignmentRepository, InMemoryMissionRepository, InMemoryRouteRepository,
            InMemoryTelemetryRepository, InMemoryVehicleRepository,
        };

        Self {
            missions: Arc::new(InMemoryMissionRepository::default()),
            assignments: Arc::new(InMemoryAssignmentRepository::default()),
            vehicles: Arc::new(InMemoryVehicleRepository::default()),
            routes: Arc::new(InMemoryRouteRepository::default()),
            telemetry: Arc::new(InMemoryTelemetryRepository::default()),
        }
    }
}
