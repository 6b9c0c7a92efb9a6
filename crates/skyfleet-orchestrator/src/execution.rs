//! # Mission Execution
//!
//! Turns an approved mission into execution commands on the bus:
//!
//! ```text
//! load mission ─► guard ─► load assignments ─► resolve entries (concurrent)
//!                                                     │
//!              persist IN_PROGRESS ◄─ publish ◄───────┘
//! ```
//!
//! Route resolution happens before anything is published, and the mission is
//! only written after a successful publish. A failed write after a publish is
//! reported as [`OrchestrationError::StateUpdate`] and is not retried.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use uuid::Uuid;

use skyfleet_domain::{
    CommandCode, DroneMissionAssignment, ExecutionCommand, Mission, MissionState,
    MissionStateMachine, VehicleExecution, WaypointExtractor,
};
use skyfleet_persistence::{
    AssignmentRepository, MissionRepository, Repositories, RouteRepository, VehicleRepository,
};

use crate::bus::MessagePublisher;
use crate::config::DispatchMode;
use crate::error::{OrchestrationError, Result};
use crate::fanout::{publish_failures, spawn_all};

/// Marks a mission as being executed; cleared on drop
struct RunGuard<'a> {
    running: &'a DashMap<Uuid, ()>,
    mission_id: Uuid,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.running.remove(&self.mission_id);
    }
}

pub struct MissionExecutor {
    missions: Arc<dyn MissionRepository>,
    assignments: Arc<dyn AssignmentRepository>,
    vehicles: Arc<dyn VehicleRepository>,
    routes: Arc<dyn RouteRepository>,
    publisher: Arc<dyn MessagePublisher>,
    mode: DispatchMode,
    running: DashMap<Uuid, ()>,
}

impl MissionExecutor {
    #[must_use]
    pub fn new(repos: &Repositories, publisher: Arc<dyn MessagePublisher>, mode: DispatchMode) -> Self {
        Self {
            missions: Arc::clone(&repos.missions),
            assignments: Arc::clone(&repos.assignments),
            vehicles: Arc::clone(&repos.vehicles),
            routes: Arc::clone(&repos.routes),
            publisher,
            mode,
            running: DashMap::new(),
        }
    }

    #[must_use]
    pub const fn mode(&self) -> DispatchMode {
        self.mode
    }

    /// Execute an approved, due mission and return it in `IN_PROGRESS`.
    ///
    /// # Errors
    ///
    /// Fails before publishing on a missing mission, a guard violation, an
    /// empty assignment list, or any unresolvable vehicle or route. Fails
    /// after publishing only with [`OrchestrationError::StateUpdate`].
    pub async fn execute(&self, mission_id: Uuid, commander: &str) -> Result<Mission> {
        let _run = self.begin(mission_id)?;

        let mission = self
            .missions
            .find_by_id(mission_id)
            .await
            .map_err(OrchestrationError::store("loading mission", mission_id))?
            .ok_or(OrchestrationError::MissionNotFound { mission_id })?;

        MissionStateMachine::check_execute(&mission, Utc::now())?;

        let assignments = self
            .assignments
            .find_by_mission_id(mission_id)
            .await
            .map_err(OrchestrationError::store("loading assignments of mission", mission_id))?;
        if assignments.is_empty() {
            return Err(OrchestrationError::NoVehiclesAssigned { mission_id });
        }

        let entries = self.resolve_entries(&mission, assignments).await?;
        let commands = self.publish(mission_id, mission.priority, entries).await?;

        let now = Utc::now();
        let mut mission = mission;
        mission.state = MissionStateMachine::transition(&mission, MissionState::InProgress)?;
        mission.start_date = Some(now);
        mission.updated_at = now;

        let command_id = commands.first().map_or_else(Uuid::nil, |c| c.command_id);
        let mission = self.missions.save(mission).await.map_err(|source| {
            tracing::error!(
                mission_id = %mission_id,
                command_id = %command_id,
                error = %source,
                "Execution published but mission state was not saved"
            );
            OrchestrationError::StateUpdate {
                mission_id,
                command_id,
                source,
            }
        })?;

        tracing::info!(
            mission_id = %mission_id,
            commander,
            mode = %self.mode,
            commands = commands.len(),
            vehicles = commands.iter().map(|c| c.vehicles.len()).sum::<usize>(),
            waypoints = commands.iter().map(ExecutionCommand::waypoint_total).sum::<usize>(),
            "Mission execution started"
        );
        Ok(mission)
    }

    fn begin(&self, mission_id: Uuid) -> Result<RunGuard<'_>> {
        match self.running.entry(mission_id) {
            Entry::Occupied(_) => Err(OrchestrationError::ExecutionInFlight { mission_id }),
            Entry::Vacant(slot) => {
                slot.insert(());
                Ok(RunGuard {
                    running: &self.running,
                    mission_id,
                })
            }
        }
    }

    /// Resolve every assignment concurrently. Entries keep assignment order;
    /// when several fail, every failure is logged and the first in assignment
    /// order is returned.
    async fn resolve_entries(
        &self,
        mission: &Mission,
        assignments: Vec<DroneMissionAssignment>,
    ) -> Result<Vec<VehicleExecution>> {
        let mission_id = mission.mission_id;
        let priority = mission.priority;
        let labels: Vec<String> = assignments
            .iter()
            .map(|a| format!("assignment {}", a.assignment_id))
            .collect();

        let resolved = spawn_all(assignments.into_iter().map(|assignment| {
            let vehicles = Arc::clone(&self.vehicles);
            let routes = Arc::clone(&self.routes);
            async move { resolve_entry(&*vehicles, &*routes, mission_id, priority, assignment).await }
        }))
        .await;

        let mut entries = Vec::with_capacity(resolved.len());
        let mut first_error = None;
        for (label, outcome) in labels.into_iter().zip(resolved) {
            let outcome = outcome.unwrap_or_else(|reason| {
                Err(OrchestrationError::TaskFailed {
                    label: label.clone(),
                    reason,
                })
            });
            match outcome {
                Ok(entry) => entries.push(entry),
                Err(err) => {
                    tracing::warn!(
                        mission_id = %mission_id,
                        %label,
                        error = %err,
                        error_code = err.error_code(),
                        "Execution entry could not be resolved"
                    );
                    if first_error.is_none() {
                        first_error = Some(err);
                    }
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(entries),
        }
    }

    async fn publish(
        &self,
        mission_id: Uuid,
        priority: i32,
        entries: Vec<VehicleExecution>,
    ) -> Result<Vec<ExecutionCommand>> {
        match self.mode {
            DispatchMode::Aggregated => {
                let command = ExecutionCommand::new(mission_id, entries, priority);
                self.publisher
                    .publish_execution(&command)
                    .await
                    .map_err(|source| OrchestrationError::Publish { mission_id, source })?;
                tracing::debug!(
                    mission_id = %mission_id,
                    command_id = %command.command_id,
                    "Aggregated execution command published"
                );
                Ok(vec![command])
            }
            DispatchMode::PerVehicle => {
                let commands: Vec<ExecutionCommand> = entries
                    .into_iter()
                    .map(|entry| ExecutionCommand::new(mission_id, vec![entry], priority))
                    .collect();

                let outcomes = spawn_all(commands.iter().cloned().map(|command| {
                    let publisher = Arc::clone(&self.publisher);
                    async move { publisher.publish_execution(&command).await }
                }))
                .await;

                let failures = publish_failures(&commands, outcomes, |c| {
                    c.vehicles
                        .first()
                        .map(|v| v.vehicle_external_id.clone())
                        .unwrap_or_default()
                });
                for failure in &failures {
                    tracing::warn!(
                        mission_id = %mission_id,
                        vehicle_external_id = %failure.vehicle_external_id,
                        error = %failure.reason,
                        "Per-vehicle execution publish failed"
                    );
                }

                if failures.is_empty() {
                    Ok(commands)
                } else {
                    Err(OrchestrationError::DispatchFailed {
                        mission_id,
                        attempted: commands.len(),
                        failures,
                    })
                }
            }
        }
    }
}

/// Resolve one assignment into its execution entry. A routeless assignment
/// yields an empty waypoint list.
async fn resolve_entry(
    vehicles: &dyn VehicleRepository,
    routes: &dyn RouteRepository,
    mission_id: Uuid,
    priority: i32,
    assignment: DroneMissionAssignment,
) -> Result<VehicleExecution> {
    let vehicle_id = assignment.vehicle_id;
    let vehicle = vehicles
        .find_by_id(vehicle_id)
        .await
        .map_err(OrchestrationError::store("loading vehicle", vehicle_id))?
        .ok_or_else(|| OrchestrationError::VehicleNotFound {
            mission_id,
            vehicle: vehicle_id.to_string(),
        })?;

    let waypoints = match assignment.route_id {
        None => Vec::new(),
        Some(route_id) => {
            let route = routes
                .find_by_id(route_id)
                .await
                .map_err(OrchestrationError::store("loading route", route_id))?
                .ok_or_else(|| OrchestrationError::RouteNotFound {
                    mission_id,
                    vehicle: vehicle.external_id.clone(),
                    route_id,
                })?;

            let geometry = route
                .geometry_payload()
                .ok_or_else(|| OrchestrationError::InvalidRoute {
                    mission_id,
                    vehicle: vehicle.external_id.clone(),
                    route_id,
                    reason: "route has no geometry".to_string(),
                })?;

            let waypoints = WaypointExtractor::extract(geometry, route.geometry_type.as_deref())
                .map_err(|source| OrchestrationError::RouteParse {
                    mission_id,
                    route_id,
                    source,
                })?;

            if usize::try_from(route.waypoint_count).is_ok_and(|n| n != waypoints.len()) {
                tracing::debug!(
                    mission_id = %mission_id,
                    route_id = %route_id,
                    stored = route.waypoint_count,
                    extracted = waypoints.len(),
                    "Stored waypoint count differs from geometry"
                );
            }
            waypoints
        }
    };

    Ok(VehicleExecution {
        vehicle_external_id: vehicle.external_id,
        route_id: assignment.route_id,
        waypoints,
        command_code: CommandCode::execute_route(),
        priority,
    })
}
