//! In-memory repository implementation.
//!
//! Each store guards its data with a `tokio::sync::RwLock`; uniqueness checks
//! and inserts happen under the same write guard so the unique-key contracts
//! of the traits hold under concurrent callers.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::traits::{
    AssignmentRepository, MissionRepository, RouteRepository, TelemetryRepository,
    VehicleRepository,
};
use crate::error::{PersistenceError, Result};
use skyfleet_domain::{
    DroneMissionAssignment, Mission, MissionOrigin, MissionState, Route, TelemetryRecord,
    TimeRange, Vehicle,
};

// =============================================================================
// MISSIONS
// =============================================================================

#[derive(Debug, Default)]
pub struct InMemoryMissionRepository {
    missions: RwLock<HashMap<Uuid, Mission>>,
}

impl InMemoryMissionRepository {
    async fn filtered(&self, predicate: impl Fn(&Mission) -> bool + Send) -> Vec<Mission> {
        let mut found: Vec<Mission> = self
            .missions
            .read()
            .await
            .values()
            .filter(|m| predicate(m))
            .cloned()
            .collect();
        found.sort_by_key(|m| m.created_at);
        found
    }
}

#[async_trait]
impl MissionRepository for InMemoryMissionRepository {
    async fn save(&self, mission: Mission) -> Result<Mission> {
        self.missions
            .write()
            .await
            .insert(mission.mission_id, mission.clone());
        Ok(mission)
    }

    async fn find_by_id(&self, mission_id: Uuid) -> Result<Option<Mission>> {
        Ok(self.missions.read().await.get(&mission_id).cloned())
    }

    async fn find_by_state(&self, state: MissionState) -> Result<Vec<Mission>> {
        Ok(self.filtered(|m| m.state == state).await)
    }

    async fn find_by_origin(&self, origin: MissionOrigin) -> Result<Vec<Mission>> {
        Ok(self.filtered(|m| m.origin == origin).await)
    }
}

// =============================================================================
// ASSIGNMENTS
// =============================================================================

#[derive(Debug, Default)]
pub struct InMemoryAssignmentRepository {
    // Insertion order is assignment order.
    assignments: RwLock<Vec<DroneMissionAssignment>>,
}

#[async_trait]
impl AssignmentRepository for InMemoryAssignmentRepository {
    async fn save(&self, assignment: DroneMissionAssignment) -> Result<DroneMissionAssignment> {
        let mut assignments = self.assignments.write().await;

        if let Some(existing) = assignments
            .iter_mut()
            .find(|a| a.assignment_id == assignment.assignment_id)
        {
            *existing = assignment.clone();
            return Ok(assignment);
        }

        if assignments
            .iter()
            .any(|a| a.mission_id == assignment.mission_id && a.vehicle_id == assignment.vehicle_id)
        {
            tracing::debug!(
                mission_id = %assignment.mission_id,
                vehicle_id = %assignment.vehicle_id,
                "Rejected duplicate assignment"
            );
            return Err(PersistenceError::duplicate(
                "DroneMissionAssignment",
                format!("{}/{}", assignment.mission_id, assignment.vehicle_id),
            ));
        }

        assignments.push(assignment.clone());
        Ok(assignment)
    }

    async fn find_by_mission_id(&self, mission_id: Uuid) -> Result<Vec<DroneMissionAssignment>> {
        Ok(self
            .assignments
            .read()
            .await
            .iter()
            .filter(|a| a.mission_id == mission_id)
            .cloned()
            .collect())
    }

    async fn find_by_vehicle_id(&self, vehicle_id: Uuid) -> Result<Vec<DroneMissionAssignment>> {
        Ok(self
            .assignments
            .read()
            .await
            .iter()
            .filter(|a| a.vehicle_id == vehicle_id)
            .cloned()
            .collect())
    }

    async fn update_route(
        &self,
        assignment_id: Uuid,
        route_id: Option<Uuid>,
    ) -> Result<DroneMissionAssignment> {
        let mut assignments = self.assignments.write().await;
        let assignment = assignments
            .iter_mut()
            .find(|a| a.assignment_id == assignment_id)
            .ok_or_else(|| PersistenceError::not_found("DroneMissionAssignment", assignment_id))?;
        assignment.route_id = route_id;
        Ok(assignment.clone())
    }
}

// =============================================================================
// VEHICLES
// =============================================================================

#[derive(Debug, Default)]
pub struct InMemoryVehicleRepository {
    vehicles: RwLock<HashMap<Uuid, Vehicle>>,
}

#[async_trait]
impl VehicleRepository for InMemoryVehicleRepository {
    async fn save(&self, vehicle: Vehicle) -> Result<Vehicle> {
        let mut vehicles = self.vehicles.write().await;

        let conflict = vehicles
            .values()
            .any(|v| v.external_id == vehicle.external_id && v.vehicle_id != vehicle.vehicle_id);
        if conflict {
            tracing::debug!(external_id = %vehicle.external_id, "Rejected duplicate vehicle");
            return Err(PersistenceError::duplicate("Vehicle", &vehicle.external_id));
        }

        vehicles.insert(vehicle.vehicle_id, vehicle.clone());
        Ok(vehicle)
    }

    async fn find_by_id(&self, vehicle_id: Uuid) -> Result<Option<Vehicle>> {
        Ok(self.vehicles.read().await.get(&vehicle_id).cloned())
    }

    async fn find_by_external_id(&self, external_id: &str) -> Result<Option<Vehicle>> {
        Ok(self
            .vehicles
            .read()
            .await
            .values()
            .find(|v| v.external_id == external_id)
            .cloned())
    }

    async fn exists_by_external_id(&self, external_id: &str) -> Result<bool> {
        Ok(self
            .vehicles
            .read()
            .await
            .values()
            .any(|v| v.external_id == external_id))
    }
}

// =============================================================================
// ROUTES
// =============================================================================

#[derive(Debug, Default)]
pub struct InMemoryRouteRepository {
    routes: RwLock<HashMap<Uuid, Route>>,
}

#[async_trait]
impl RouteRepository for InMemoryRouteRepository {
    async fn save(&self, route: Route) -> Result<Route> {
        self.routes.write().await.insert(route.route_id, route.clone());
        Ok(route)
    }

    async fn find_by_id(&self, route_id: Uuid) -> Result<Option<Route>> {
        Ok(self.routes.read().await.get(&route_id).cloned())
    }
}

// =============================================================================
// TELEMETRY
// =============================================================================

#[derive(Debug, Default)]
pub struct InMemoryTelemetryRepository {
    by_vehicle: RwLock<HashMap<String, Vec<TelemetryRecord>>>,
}

#[async_trait]
impl TelemetryRepository for InMemoryTelemetryRepository {
    async fn save(&self, record: TelemetryRecord) -> Result<TelemetryRecord> {
        self.by_vehicle
            .write()
            .await
            .entry(record.vehicle_external_id.clone())
            .or_default()
            .push(record.clone());
        Ok(record)
    }

    async fn find_by_vehicle_range(
        &self,
        vehicle_external_id: &str,
        range: TimeRange,
        limit: Option<usize>,
    ) -> Result<Vec<TelemetryRecord>> {
        if limit == Some(0) {
            return Err(PersistenceError::InvalidQuery("limit must be positive".to_string()));
        }
        let by_vehicle = self.by_vehicle.read().await;
        let mut records: Vec<TelemetryRecord> = by_vehicle
            .get(vehicle_external_id)
            .map(|records| {
                records
                    .iter()
                    .filter(|r| range.contains(r.recorded_at))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        records.sort_by(|a, b| b.recorded_at.cmp(&a.recorded_at));
        if let Some(limit) = limit {
            records.truncate(limit);
        }
        Ok(records)
    }

    async fn find_recent(
        &self,
        vehicle_external_id: &str,
        limit: usize,
    ) -> Result<Vec<TelemetryRecord>> {
        if limit == 0 {
            return Err(PersistenceError::InvalidQuery("limit must be positive".to_string()));
        }
        let by_vehicle = self.by_vehicle.read().await;
        let mut records = by_vehicle.get(vehicle_external_id).cloned().unwrap_or_default();
        records.sort_by(|a, b| b.recorded_at.cmp(&a.recorded_at));
        records.truncate(limit);
        Ok(records)
    }
}
