//! Automatic missions for vehicles reporting telemetry outside any mission.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use uuid::Uuid;

use skyfleet_domain::{
    AssignmentRequest, DroneMissionAssignment, Mission, MissionState, TelemetryRecord, Vehicle,
};
use skyfleet_persistence::{AssignmentRepository, MissionRepository};

use crate::error::{OrchestrationError, Result};
use crate::telemetry::ProvisioningHook;

/// Marks a vehicle whose missions are being checked; cleared on drop
struct OpeningGuard<'a> {
    opening: &'a DashMap<Uuid, ()>,
    vehicle_id: Uuid,
}

impl Drop for OpeningGuard<'_> {
    fn drop(&mut self) {
        self.opening.remove(&self.vehicle_id);
    }
}

/// Opens an `AUTOMATIC` mission, already in progress, for a vehicle that
/// reports telemetry while assigned to no approved or running mission. The
/// vehicle gets a routeless assignment.
pub struct AutoMissionOpener {
    missions: Arc<dyn MissionRepository>,
    assignments: Arc<dyn AssignmentRepository>,
    opening: DashMap<Uuid, ()>,
}

impl AutoMissionOpener {
    #[must_use]
    pub fn new(missions: Arc<dyn MissionRepository>, assignments: Arc<dyn AssignmentRepository>) -> Self {
        Self {
            missions,
            assignments,
            opening: DashMap::new(),
        }
    }

    /// Open an automatic mission unless the vehicle already flies one.
    ///
    /// Returns `None` when the vehicle is covered by an approved or
    /// in-progress mission, or when another event for the same vehicle is
    /// being handled.
    ///
    /// # Errors
    ///
    /// [`OrchestrationError::Persistence`] if a lookup or write fails.
    pub async fn ensure_open(&self, vehicle: &Vehicle, record: &TelemetryRecord) -> Result<Option<Mission>> {
        let Some(_guard) = self.begin(vehicle.vehicle_id) else {
            tracing::trace!(
                vehicle_external_id = %vehicle.external_id,
                "Automatic mission check already running"
            );
            return Ok(None);
        };

        if let Some(active) = self.active_mission(vehicle).await? {
            tracing::trace!(
                vehicle_external_id = %vehicle.external_id,
                mission_id = %active.mission_id,
                state = %active.state,
                "Vehicle already in an active mission"
            );
            return Ok(None);
        }

        self.open(vehicle, record).await.map(Some)
    }

    /// Open an automatic mission for `vehicle` starting at the record's time.
    ///
    /// The assignment is written before the mission, so a failed mission
    /// write leaves no mission behind.
    ///
    /// # Errors
    ///
    /// [`OrchestrationError::Persistence`] if either write fails.
    pub async fn open(&self, vehicle: &Vehicle, first_seen: &TelemetryRecord) -> Result<Mission> {
        let now = Utc::now();
        let mission = Mission::automatic(&vehicle.external_id, first_seen.recorded_at, now);

        let assignment = DroneMissionAssignment::new(
            mission.mission_id,
            AssignmentRequest {
                vehicle_id: vehicle.vehicle_id,
                route_id: None,
            },
            now,
        );
        self.assignments
            .save(assignment)
            .await
            .map_err(OrchestrationError::store("assigning vehicle to mission", mission.mission_id))?;

        let mission = self
            .missions
            .save(mission)
            .await
            .map_err(OrchestrationError::store("saving automatic mission for", &vehicle.external_id))?;

        tracing::info!(
            mission_id = %mission.mission_id,
            vehicle_external_id = %vehicle.external_id,
            started_at = %first_seen.recorded_at,
            "Opened automatic mission"
        );
        Ok(mission)
    }

    async fn active_mission(&self, vehicle: &Vehicle) -> Result<Option<Mission>> {
        let assignments = self
            .assignments
            .find_by_vehicle_id(vehicle.vehicle_id)
            .await
            .map_err(OrchestrationError::store("listing assignments of", vehicle.vehicle_id))?;

        for assignment in assignments {
            let mission = self
                .missions
                .find_by_id(assignment.mission_id)
                .await
                .map_err(OrchestrationError::store("loading mission", assignment.mission_id))?;
            if let Some(mission) = mission.filter(|m| {
                matches!(m.state, MissionState::Approved | MissionState::InProgress)
            }) {
                return Ok(Some(mission));
            }
        }
        Ok(None)
    }

    fn begin(&self, vehicle_id: Uuid) -> Option<OpeningGuard<'_>> {
        match self.opening.entry(vehicle_id) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                slot.insert(());
                Some(OpeningGuard {
                    opening: &self.opening,
                    vehicle_id,
                })
            }
        }
    }
}

#[async_trait]
impl ProvisioningHook for AutoMissionOpener {
    fn name(&self) -> &'static str {
        "auto_mission"
    }

    async fn vehicle_reported(
        &self,
        vehicle: &Vehicle,
        _newly_provisioned: bool,
        record: &TelemetryRecord,
    ) -> Result<()> {
        self.ensure_open(vehicle, record).await.map(|_| ())
    }
}
