//! # Command Dispatch
//!
//! Sends one control command to every vehicle assigned to a mission. All
//! vehicles are resolved before anything is published; publishes then run
//! concurrently and every one of them finishes before the outcome is decided.

use std::sync::Arc;

use chrono::Utc;
use futures_util::future::try_join_all;
use uuid::Uuid;

use skyfleet_domain::{CommandCode, ControlCommand, Mission, Vehicle};
use skyfleet_persistence::{AssignmentRepository, MissionRepository, Repositories, VehicleRepository};

use crate::bus::MessagePublisher;
use crate::error::{OrchestrationError, Result};
use crate::fanout::{publish_failures, spawn_all};

/// Commands published by a successful dispatch, in assignment order
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchReport {
    pub mission_id: Uuid,
    pub command_code: CommandCode,
    pub commands: Vec<ControlCommand>,
}

pub struct CommandDispatcher {
    missions: Arc<dyn MissionRepository>,
    assignments: Arc<dyn AssignmentRepository>,
    vehicles: Arc<dyn VehicleRepository>,
    publisher: Arc<dyn MessagePublisher>,
}

impl CommandDispatcher {
    #[must_use]
    pub fn new(repos: &Repositories, publisher: Arc<dyn MessagePublisher>) -> Self {
        Self {
            missions: Arc::clone(&repos.missions),
            assignments: Arc::clone(&repos.assignments),
            vehicles: Arc::clone(&repos.vehicles),
            publisher,
        }
    }

    /// Publish `command_code` to every vehicle of the mission.
    ///
    /// The mission's state is not checked.
    ///
    /// # Errors
    ///
    /// - [`OrchestrationError::MissionNotFound`]
    /// - [`OrchestrationError::NoVehiclesAssigned`]
    /// - [`OrchestrationError::VehicleNotFound`] (nothing is published)
    /// - [`OrchestrationError::DispatchFailed`] naming every vehicle whose
    ///   publish failed, reported after all publishes completed
    pub async fn dispatch(&self, mission_id: Uuid, command_code: &CommandCode) -> Result<DispatchReport> {
        let mission = self.load_mission(mission_id).await?;
        let vehicles = self.resolve_vehicles(&mission).await?;

        let commands: Vec<ControlCommand> = vehicles
            .iter()
            .map(|vehicle| ControlCommand {
                command_id: Uuid::new_v4(),
                mission_id,
                vehicle_external_id: vehicle.external_id.clone(),
                command_code: command_code.clone(),
                issued_at: Utc::now(),
            })
            .collect();

        let outcomes = spawn_all(commands.iter().cloned().map(|command| {
            let publisher = Arc::clone(&self.publisher);
            async move { publisher.publish_command(&command).await }
        }))
        .await;

        let failures = publish_failures(&commands, outcomes, |c| c.vehicle_external_id.clone());
        for failure in &failures {
            tracing::warn!(
                mission_id = %mission_id,
                vehicle_external_id = %failure.vehicle_external_id,
                command_code = %command_code,
                error = %failure.reason,
                "Control command publish failed"
            );
        }

        if !failures.is_empty() {
            return Err(OrchestrationError::DispatchFailed {
                mission_id,
                attempted: commands.len(),
                failures,
            });
        }

        tracing::info!(
            mission_id = %mission_id,
            command_code = %command_code,
            vehicles = commands.len(),
            "Control command dispatched"
        );
        Ok(DispatchReport {
            mission_id,
            command_code: command_code.clone(),
            commands,
        })
    }

    async fn load_mission(&self, mission_id: Uuid) -> Result<Mission> {
        self.missions
            .find_by_id(mission_id)
            .await
            .map_err(OrchestrationError::store("loading mission", mission_id))?
            .ok_or(OrchestrationError::MissionNotFound { mission_id })
    }

    async fn resolve_vehicles(&self, mission: &Mission) -> Result<Vec<Vehicle>> {
        let mission_id = mission.mission_id;
        let assignments = self
            .assignments
            .find_by_mission_id(mission_id)
            .await
            .map_err(OrchestrationError::store("loading assignments of mission", mission_id))?;
        if assignments.is_empty() {
            return Err(OrchestrationError::NoVehiclesAssigned { mission_id });
        }

        try_join_all(assignments.iter().map(|assignment| async move {
            let vehicle_id = assignment.vehicle_id;
            self.vehicles
                .find_by_id(vehicle_id)
                .await
                .map_err(OrchestrationError::store("loading vehicle", vehicle_id))?
                .ok_or_else(|| OrchestrationError::VehicleNotFound {
                    mission_id,
                    vehicle: vehicle_id.to_string(),
                })
        }))
        .await
    }
}
