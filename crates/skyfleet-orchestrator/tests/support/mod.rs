//! Shared doubles for the orchestrator integration suites.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use skyfleet_domain::{
    AssignmentRequest, ControlCommand, DroneMissionAssignment, ExecutionCommand, Mission,
    MissionOrigin, MissionState, NewMission, Route, RouteStatus, TelemetryRecord, TimeRange, Vehicle,
};
use skyfleet_orchestrator::{MessagePublisher, PublishError};
use skyfleet_persistence::{
    AssignmentRepository, InMemoryAssignmentRepository, InMemoryMissionRepository,
    InMemoryVehicleRepository, MissionRepository, PersistenceError, Repositories,
    TelemetryRepository, VehicleRepository,
};

// =============================================================================
// PUBLISHER
// =============================================================================

/// Records everything it is asked to publish, including failed attempts.
#[derive(Default)]
pub struct RecordingPublisher {
    executions: Mutex<Vec<ExecutionCommand>>,
    commands: Mutex<Vec<ControlCommand>>,
    attempted: Mutex<Vec<String>>,
    failing_vehicles: Mutex<HashSet<String>>,
    fail_executions: AtomicBool,
    delay: Mutex<Option<Duration>>,
}

impl RecordingPublisher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Reject every publish addressed to this vehicle
    pub fn fail_vehicle(&self, external_id: &str) {
        self.failing_vehicles
            .lock()
            .unwrap()
            .insert(external_id.to_string());
    }

    pub fn fail_executions(&self) {
        self.fail_executions.store(true, Ordering::SeqCst);
    }

    pub fn delay_each(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn executions(&self) -> Vec<ExecutionCommand> {
        self.executions.lock().unwrap().clone()
    }

    pub fn commands(&self) -> Vec<ControlCommand> {
        self.commands.lock().unwrap().clone()
    }

    /// Vehicles a publish was attempted for, successful or not
    pub fn attempted(&self) -> Vec<String> {
        let mut attempted = self.attempted.lock().unwrap().clone();
        attempted.sort();
        attempted
    }

    async fn pause(&self) {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn rejects(&self, vehicle: &str) -> bool {
        self.failing_vehicles.lock().unwrap().contains(vehicle)
    }
}

#[async_trait]
impl MessagePublisher for RecordingPublisher {
    async fn publish_execution(&self, command: &ExecutionCommand) -> Result<(), PublishError> {
        self.pause().await;
        for entry in &command.vehicles {
            self.attempted
                .lock()
                .unwrap()
                .push(entry.vehicle_external_id.clone());
        }
        if self.fail_executions.load(Ordering::SeqCst) {
            return Err(PublishError::Unavailable("bus offline".to_string()));
        }
        if let Some(entry) = command.vehicles.iter().find(|e| self.rejects(&e.vehicle_external_id)) {
            return Err(PublishError::Rejected {
                topic: "mission.execute".to_string(),
                reason: format!("{} refused", entry.vehicle_external_id),
            });
        }
        self.executions.lock().unwrap().push(command.clone());
        Ok(())
    }

    async fn publish_command(&self, command: &ControlCommand) -> Result<(), PublishError> {
        self.pause().await;
        self.attempted
            .lock()
            .unwrap()
            .push(command.vehicle_external_id.clone());
        if self.rejects(&command.vehicle_external_id) {
            return Err(PublishError::Rejected {
                topic: format!("vehicle.{}.command", command.vehicle_external_id),
                reason: "queue full".to_string(),
            });
        }
        self.commands.lock().unwrap().push(command.clone());
        Ok(())
    }
}

// =============================================================================
// STORES
// =============================================================================

/// Telemetry store that is always down
#[derive(Default)]
pub struct UnavailableTelemetryStore;

#[async_trait]
impl TelemetryRepository for UnavailableTelemetryStore {
    async fn save(&self, _record: TelemetryRecord) -> skyfleet_persistence::Result<TelemetryRecord> {
        Err(PersistenceError::Unavailable("telemetry cluster down".to_string()))
    }

    async fn find_by_vehicle_range(
        &self,
        _vehicle_external_id: &str,
        _range: TimeRange,
        _limit: Option<usize>,
    ) -> skyfleet_persistence::Result<Vec<TelemetryRecord>> {
        Err(PersistenceError::Unavailable("telemetry cluster down".to_string()))
    }

    async fn find_recent(
        &self,
        _vehicle_external_id: &str,
        _limit: usize,
    ) -> skyfleet_persistence::Result<Vec<TelemetryRecord>> {
        Err(PersistenceError::Unavailable("telemetry cluster down".to_string()))
    }
}

/// Vehicle store wrapper: optional latency on every call, optional failure,
/// and counters for lookups and saves.
#[derive(Default)]
pub struct InstrumentedVehicleStore {
    inner: InMemoryVehicleRepository,
    latency: Option<Duration>,
    unavailable: AtomicBool,
    pub lookups: AtomicUsize,
    pub saves: AtomicUsize,
}

impl InstrumentedVehicleStore {
    pub fn slow(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::default()
        }
    }

    pub fn unavailable() -> Self {
        let store = Self::default();
        store.unavailable.store(true, Ordering::SeqCst);
        store
    }

    async fn call(&self) -> skyfleet_persistence::Result<()> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(PersistenceError::Unavailable("vehicle registry down".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl VehicleRepository for InstrumentedVehicleStore {
    async fn save(&self, vehicle: Vehicle) -> skyfleet_persistence::Result<Vehicle> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.call().await?;
        self.inner.save(vehicle).await
    }

    async fn find_by_id(&self, vehicle_id: Uuid) -> skyfleet_persistence::Result<Option<Vehicle>> {
        self.call().await?;
        self.inner.find_by_id(vehicle_id).await
    }

    async fn find_by_external_id(&self, external_id: &str) -> skyfleet_persistence::Result<Option<Vehicle>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.call().await?;
        self.inner.find_by_external_id(external_id).await
    }

    async fn exists_by_external_id(&self, external_id: &str) -> skyfleet_persistence::Result<bool> {
        self.call().await?;
        self.inner.exists_by_external_id(external_id).await
    }
}

/// Mission store whose saves can be switched off
#[derive(Default)]
pub struct FlakyMissionStore {
    inner: InMemoryMissionRepository,
    reject_saves: AtomicBool,
}

impl FlakyMissionStore {
    pub fn reject_saves(&self) {
        self.reject_saves.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl MissionRepository for FlakyMissionStore {
    async fn save(&self, mission: Mission) -> skyfleet_persistence::Result<Mission> {
        if self.reject_saves.load(Ordering::SeqCst) {
            return Err(PersistenceError::Timeout { timeout_ms: 250 });
        }
        self.inner.save(mission).await
    }

    async fn find_by_id(&self, mission_id: Uuid) -> skyfleet_persistence::Result<Option<Mission>> {
        self.inner.find_by_id(mission_id).await
    }

    async fn find_by_state(&self, state: MissionState) -> skyfleet_persistence::Result<Vec<Mission>> {
        self.inner.find_by_state(state).await
    }

    async fn find_by_origin(&self, origin: MissionOrigin) -> skyfleet_persistence::Result<Vec<Mission>> {
        self.inner.find_by_origin(origin).await
    }
}

/// Vehicle store whose first lookups miss, as a lagging read replica would.
/// Writes go straight to the primary and see every record.
#[derive(Default)]
pub struct StaleReadVehicleStore {
    pub inner: InMemoryVehicleRepository,
    stale_reads: AtomicUsize,
}

impl StaleReadVehicleStore {
    pub fn missing_first(lookups: usize) -> Self {
        Self {
            stale_reads: AtomicUsize::new(lookups),
            ..Self::default()
        }
    }
}

#[async_trait]
impl VehicleRepository for StaleReadVehicleStore {
    async fn save(&self, vehicle: Vehicle) -> skyfleet_persistence::Result<Vehicle> {
        self.inner.save(vehicle).await
    }

    async fn find_by_id(&self, vehicle_id: Uuid) -> skyfleet_persistence::Result<Option<Vehicle>> {
        self.inner.find_by_id(vehicle_id).await
    }

    async fn find_by_external_id(&self, external_id: &str) -> skyfleet_persistence::Result<Option<Vehicle>> {
        let stale = self
            .stale_reads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if stale {
            return Ok(None);
        }
        self.inner.find_by_external_id(external_id).await
    }

    async fn exists_by_external_id(&self, external_id: &str) -> skyfleet_persistence::Result<bool> {
        self.inner.exists_by_external_id(external_id).await
    }
}

/// Assignment store whose saves can be switched off
#[derive(Default)]
pub struct FlakyAssignmentStore {
    inner: InMemoryAssignmentRepository,
    reject_saves: AtomicBool,
}

impl FlakyAssignmentStore {
    pub fn reject_saves(&self) {
        self.reject_saves.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl AssignmentRepository for FlakyAssignmentStore {
    async fn save(&self, assignment: DroneMissionAssignment) -> skyfleet_persistence::Result<DroneMissionAssignment> {
        if self.reject_saves.load(Ordering::SeqCst) {
            return Err(PersistenceError::Unavailable("assignment store down".to_string()));
        }
        self.inner.save(assignment).await
    }

    async fn find_by_mission_id(&self, mission_id: Uuid) -> skyfleet_persistence::Result<Vec<DroneMissionAssignment>> {
        self.inner.find_by_mission_id(mission_id).await
    }

    async fn find_by_vehicle_id(&self, vehicle_id: Uuid) -> skyfleet_persistence::Result<Vec<DroneMissionAssignment>> {
        self.inner.find_by_vehicle_id(vehicle_id).await
    }

    async fn update_route(
        &self,
        assignment_id: Uuid,
        route_id: Option<Uuid>,
    ) -> skyfleet_persistence::Result<DroneMissionAssignment> {
        self.inner.update_route(assignment_id, route_id).await
    }
}

// =============================================================================
// FIXTURES
// =============================================================================

pub const TWO_POINT_LINE: &str =
    r#"{"type":"LineString","coordinates":[[-122.33,47.60],[-122.30,47.62]]}"#;

pub async fn seed_vehicle(repos: &Repositories, external_id: &str) -> Vehicle {
    repos
        .vehicles
        .save(Vehicle::register(external_id, "Quad X4", format!("SN-{external_id}"), Utc::now()))
        .await
        .unwrap()
}

pub async fn seed_route(repos: &Repositories, geometry: Option<&str>) -> Route {
    repos
        .routes
        .save(Route {
            route_id: Uuid::new_v4(),
            name: "harbor loop".to_string(),
            status: RouteStatus::Published,
            geometry: geometry.map(str::to_string),
            geometry_type: Some("LineString".to_string()),
            waypoint_count: 2,
            created_at: Utc::now(),
        })
        .await
        .unwrap()
}

pub fn assign(vehicle: &Vehicle, route: Option<&Route>) -> AssignmentRequest {
    AssignmentRequest {
        vehicle_id: vehicle.vehicle_id,
        route_id: route.map(|r| r.route_id),
    }
}

pub fn draft(name: &str) -> NewMission {
    NewMission {
        name: Some(name.to_string()),
        scheduled_start: None,
        priority: None,
    }
}
