//! # Mission Service
//!
//! Facade over the orchestration components. This is the surface a transport
//! layer calls; every operation returns [`OrchestrationError`] on failure.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use skyfleet_domain::{
    AssignmentRequest, CommandCode, DomainError, DroneMissionAssignment, Mission, MissionOrigin,
    MissionState, MissionStateMachine, NewMission, Route, RouteStatus, TelemetryEvent,
    TelemetryRecord, TimeRange, Vehicle, WaypointExtractor, path_length_km,
};
use skyfleet_persistence::Repositories;

use crate::auto_mission::AutoMissionOpener;
use crate::bus::MessagePublisher;
use crate::config::OrchestratorConfig;
use crate::dispatcher::{CommandDispatcher, DispatchReport};
use crate::error::{OrchestrationError, Result};
use crate::execution::MissionExecutor;
use crate::provisioner::VehicleProvisioner;
use crate::telemetry::TelemetryPipeline;

fn require(value: &str, field: &'static str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(DomainError::MissingField(field).into());
    }
    Ok(())
}

pub struct MissionService {
    repos: Repositories,
    config: OrchestratorConfig,
    executor: MissionExecutor,
    dispatcher: CommandDispatcher,
    pipeline: TelemetryPipeline,
}

impl MissionService {
    #[must_use]
    pub fn new(repos: Repositories, publisher: Arc<dyn MessagePublisher>, config: OrchestratorConfig) -> Self {
        let executor = MissionExecutor::new(&repos, Arc::clone(&publisher), config.dispatch_mode);
        let dispatcher = CommandDispatcher::new(&repos, publisher);

        let provisioner = Arc::new(VehicleProvisioner::new(Arc::clone(&repos.vehicles)));
        let mut pipeline = TelemetryPipeline::new(
            Arc::clone(&repos.telemetry),
            provisioner,
            config.provisioning_concurrency,
        );
        if config.auto_missions {
            pipeline = pipeline.with_hook(Arc::new(AutoMissionOpener::new(
                Arc::clone(&repos.missions),
                Arc::clone(&repos.assignments),
            )));
        }

        tracing::info!(
            dispatch_mode = %config.dispatch_mode,
            auto_missions = config.auto_missions,
            provisioning_concurrency = config.provisioning_concurrency,
            "Mission service initialized"
        );

        Self {
            repos,
            config,
            executor,
            dispatcher,
            pipeline,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    #[must_use]
    pub fn provisioner(&self) -> &Arc<VehicleProvisioner> {
        self.pipeline.provisioner()
    }

    // =========================================================================
    // MISSIONS
    // =========================================================================

    /// Create a manual mission awaiting approval together with its vehicle
    /// assignments.
    ///
    /// Every vehicle and route is checked before anything is written.
    ///
    /// # Errors
    ///
    /// Validation, [`OrchestrationError::VehicleNotFound`],
    /// [`OrchestrationError::RouteNotFound`],
    /// [`OrchestrationError::DuplicateAssignment`] or a store failure.
    pub async fn create_mission(
        &self,
        mut draft: NewMission,
        commander: &str,
        assignments: Vec<AssignmentRequest>,
    ) -> Result<Mission> {
        draft.validate()?;
        require(commander, "commander")?;
        if draft.priority.is_none() {
            draft.priority = Some(self.config.default_priority);
        }

        let mission = Mission::manual(draft, commander.trim(), Utc::now());
        let mission_id = mission.mission_id;

        let mut seen = HashSet::new();
        for request in &assignments {
            if !seen.insert(request.vehicle_id) {
                return Err(OrchestrationError::DuplicateAssignment {
                    mission_id,
                    vehicle_id: request.vehicle_id,
                });
            }
            let vehicle = self.vehicle_for(mission_id, request.vehicle_id).await?;
            if let Some(route_id) = request.route_id {
                self.route_for(mission_id, &vehicle.external_id, route_id).await?;
            }
        }

        // Assignments go first: until the mission row lands they point at
        // nothing visible.
        let now = Utc::now();
        for request in assignments {
            let vehicle_id = request.vehicle_id;
            self.repos
                .assignments
                .save(DroneMissionAssignment::new(mission_id, request, now))
                .await
                .map_err(|err| {
                    if err.is_duplicate() {
                        OrchestrationError::DuplicateAssignment {
                            mission_id,
                            vehicle_id,
                        }
                    } else {
                        OrchestrationError::store("assigning vehicle to mission", mission_id)(err)
                    }
                })?;
        }

        let mission = self
            .repos
            .missions
            .save(mission)
            .await
            .map_err(OrchestrationError::store("saving mission", mission_id))?;

        tracing::info!(
            mission_id = %mission_id,
            commander,
            priority = mission.priority,
            "Mission created"
        );
        Ok(mission)
    }

    /// # Errors
    ///
    /// [`OrchestrationError::MissionNotFound`] or a store failure.
    pub async fn mission(&self, mission_id: Uuid) -> Result<Mission> {
        self.repos
            .missions
            .find_by_id(mission_id)
            .await
            .map_err(OrchestrationError::store("loading mission", mission_id))?
            .ok_or(OrchestrationError::MissionNotFound { mission_id })
    }

    /// Approve a mission awaiting approval.
    ///
    /// # Errors
    ///
    /// [`OrchestrationError::InvalidState`] unless the mission is
    /// `PENDING_APPROVAL`.
    pub async fn approve(&self, mission_id: Uuid, commander: &str) -> Result<Mission> {
        require(commander, "commander")?;
        let mut mission = self.mission(mission_id).await?;

        MissionStateMachine::check_approve(&mission)?;
        mission.state = MissionStateMachine::transition(&mission, MissionState::Approved)?;
        mission.approved_by = Some(commander.trim().to_string());
        mission.updated_at = Utc::now();

        let mission = self
            .repos
            .missions
            .save(mission)
            .await
            .map_err(OrchestrationError::store("saving mission", mission_id))?;
        tracing::info!(mission_id = %mission_id, commander, "Mission approved");
        Ok(mission)
    }

    /// # Errors
    ///
    /// See [`MissionExecutor::execute`].
    pub async fn execute(&self, mission_id: Uuid, commander: &str) -> Result<Mission> {
        require(commander, "commander")?;
        self.executor.execute(mission_id, commander.trim()).await
    }

    /// # Errors
    ///
    /// See [`CommandDispatcher::dispatch`].
    pub async fn dispatch_command(&self, mission_id: Uuid, command_code: &CommandCode) -> Result<DispatchReport> {
        self.dispatcher.dispatch(mission_id, command_code).await
    }

    /// # Errors
    ///
    /// [`OrchestrationError::InvalidTransition`] unless the mission is
    /// `IN_PROGRESS`.
    pub async fn complete(&self, mission_id: Uuid, actor: &str) -> Result<Mission> {
        self.finish(mission_id, MissionState::Completed, actor).await
    }

    /// # Errors
    ///
    /// [`OrchestrationError::InvalidTransition`] unless the mission is
    /// `IN_PROGRESS`.
    pub async fn abort(&self, mission_id: Uuid, actor: &str) -> Result<Mission> {
        self.finish(mission_id, MissionState::Aborted, actor).await
    }

    /// # Errors
    ///
    /// [`OrchestrationError::InvalidTransition`] unless the mission is
    /// `IN_PROGRESS`.
    pub async fn fail(&self, mission_id: Uuid, actor: &str) -> Result<Mission> {
        self.finish(mission_id, MissionState::Failed, actor).await
    }

    /// # Errors
    ///
    /// [`OrchestrationError::InvalidTransition`] unless the mission is
    /// `IN_PROGRESS`.
    pub async fn archive(&self, mission_id: Uuid, actor: &str) -> Result<Mission> {
        self.finish(mission_id, MissionState::Archived, actor).await
    }

    async fn finish(&self, mission_id: Uuid, target: MissionState, actor: &str) -> Result<Mission> {
        require(actor, "actor")?;
        let mut mission = self.mission(mission_id).await?;
        let from = mission.state;

        mission.state = MissionStateMachine::transition(&mission, target)?;
        let now = Utc::now();
        if target.is_terminal() {
            mission.end_date = Some(now);
        }
        mission.updated_at = now;

        let mission = self
            .repos
            .missions
            .save(mission)
            .await
            .map_err(OrchestrationError::store("saving mission", mission_id))?;
        tracing::info!(
            mission_id = %mission_id,
            actor,
            from = %from,
            to = %target,
            "Mission state changed"
        );
        Ok(mission)
    }

    /// # Errors
    ///
    /// Store failure only.
    pub async fn missions_by_state(&self, state: MissionState) -> Result<Vec<Mission>> {
        self.repos
            .missions
            .find_by_state(state)
            .await
            .map_err(OrchestrationError::store("listing missions in state", state))
    }

    /// # Errors
    ///
    /// Store failure only.
    pub async fn missions_by_origin(&self, origin: MissionOrigin) -> Result<Vec<Mission>> {
        self.repos
            .missions
            .find_by_origin(origin)
            .await
            .map_err(OrchestrationError::store("listing missions of origin", format!("{origin:?}")))
    }

    /// Assignments of a mission in assignment order.
    ///
    /// # Errors
    ///
    /// [`OrchestrationError::MissionNotFound`] or a store failure.
    pub async fn mission_assignments(&self, mission_id: Uuid) -> Result<Vec<DroneMissionAssignment>> {
        self.mission(mission_id).await?;
        self.repos
            .assignments
            .find_by_mission_id(mission_id)
            .await
            .map_err(OrchestrationError::store("loading assignments of mission", mission_id))
    }

    /// Point a vehicle's assignment at another route, or none.
    ///
    /// # Errors
    ///
    /// [`OrchestrationError::AssignmentLocked`] once the mission has been
    /// executed, [`OrchestrationError::AssignmentNotFound`],
    /// [`OrchestrationError::RouteNotFound`] or a store failure.
    pub async fn reassign_route(
        &self,
        mission_id: Uuid,
        vehicle_id: Uuid,
        route_id: Option<Uuid>,
    ) -> Result<DroneMissionAssignment> {
        let mission = self.mission(mission_id).await?;
        if !matches!(mission.state, MissionState::PendingApproval | MissionState::Approved) {
            return Err(OrchestrationError::AssignmentLocked {
                mission_id,
                state: mission.state,
            });
        }

        let assignment = self
            .repos
            .assignments
            .find_by_mission_id(mission_id)
            .await
            .map_err(OrchestrationError::store("loading assignments of mission", mission_id))?
            .into_iter()
            .find(|a| a.vehicle_id == vehicle_id)
            .ok_or(OrchestrationError::AssignmentNotFound {
                mission_id,
                vehicle_id,
            })?;

        if let Some(route_id) = route_id {
            let vehicle = self.vehicle_for(mission_id, vehicle_id).await?;
            self.route_for(mission_id, &vehicle.external_id, route_id).await?;
        }

        let updated = self
            .repos
            .assignments
            .update_route(assignment.assignment_id, route_id)
            .await
            .map_err(OrchestrationError::store("updating assignment", assignment.assignment_id))?;
        tracing::info!(
            mission_id = %mission_id,
            vehicle_id = %vehicle_id,
            route_id = ?route_id,
            "Route reassigned"
        );
        Ok(updated)
    }

    async fn vehicle_for(&self, mission_id: Uuid, vehicle_id: Uuid) -> Result<Vehicle> {
        self.repos
            .vehicles
            .find_by_id(vehicle_id)
            .await
            .map_err(OrchestrationError::store("loading vehicle", vehicle_id))?
            .ok_or_else(|| OrchestrationError::VehicleNotFound {
                mission_id,
                vehicle: vehicle_id.to_string(),
            })
    }

    async fn route_for(&self, mission_id: Uuid, vehicle: &str, route_id: Uuid) -> Result<Route> {
        self.repos
            .routes
            .find_by_id(route_id)
            .await
            .map_err(OrchestrationError::store("loading route", route_id))?
            .ok_or_else(|| OrchestrationError::RouteNotFound {
                mission_id,
                vehicle: vehicle.to_string(),
                route_id,
            })
    }

    // =========================================================================
    // VEHICLES AND ROUTES
    // =========================================================================

    /// Register a vehicle with operator-supplied metadata.
    ///
    /// A placeholder created from telemetry is upgraded in place and keeps its
    /// identity; an operator-registered vehicle is never overwritten.
    ///
    /// # Errors
    ///
    /// Validation, [`OrchestrationError::DuplicateVehicle`] or a store
    /// failure.
    pub async fn register_vehicle(&self, external_id: &str, model: &str, serial_number: &str) -> Result<Vehicle> {
        require(external_id, "externalId")?;
        require(model, "model")?;
        require(serial_number, "serialNumber")?;
        let external_id = external_id.trim();

        // A placeholder may appear between lookup and save; one retry picks it up.
        let mut attempts = 0;
        loop {
            attempts += 1;
            let existing = self
                .repos
                .vehicles
                .find_by_external_id(external_id)
                .await
                .map_err(OrchestrationError::store("loading vehicle", external_id))?;

            let now = Utc::now();
            let vehicle = match existing {
                Some(found) if !found.is_auto_provisioned() => {
                    return Err(OrchestrationError::DuplicateVehicle {
                        external_id: external_id.to_string(),
                    });
                }
                Some(mut placeholder) => {
                    placeholder.model = model.trim().to_string();
                    placeholder.serial_number = serial_number.trim().to_string();
                    placeholder.display_name = external_id.to_string();
                    placeholder.updated_at = now;
                    placeholder
                }
                None => Vehicle::register(external_id, model.trim(), serial_number.trim(), now),
            };

            match self.repos.vehicles.save(vehicle).await {
                Ok(saved) => {
                    tracing::info!(
                        vehicle_external_id = %external_id,
                        vehicle_id = %saved.vehicle_id,
                        "Vehicle registered"
                    );
                    return Ok(saved);
                }
                Err(err) if err.is_duplicate() && attempts < 2 => {}
                Err(err) if err.is_duplicate() => {
                    return Err(OrchestrationError::DuplicateVehicle {
                        external_id: external_id.to_string(),
                    });
                }
                Err(err) => return Err(OrchestrationError::store("saving vehicle", external_id)(err)),
            }
        }
    }

    /// Store a published route; its geometry must yield at least one
    /// waypoint.
    ///
    /// # Errors
    ///
    /// Validation (including unusable geometry) or a store failure.
    pub async fn register_route(&self, name: &str, geometry: &str, geometry_type: Option<&str>) -> Result<Route> {
        require(name, "name")?;
        let waypoints = WaypointExtractor::extract(geometry, geometry_type)
            .map_err(|err| DomainError::invalid("geometry", err.to_string()))?;

        let route = Route {
            route_id: Uuid::new_v4(),
            name: name.trim().to_string(),
            status: RouteStatus::Published,
            geometry: Some(geometry.to_string()),
            geometry_type: geometry_type.map(str::to_string),
            waypoint_count: u32::try_from(waypoints.len()).unwrap_or(u32::MAX),
            created_at: Utc::now(),
        };
        let route_id = route.route_id;
        let route = self
            .repos
            .routes
            .save(route)
            .await
            .map_err(OrchestrationError::store("saving route", route_id))?;
        tracing::info!(
            route_id = %route_id,
            waypoints = route.waypoint_count,
            length_km = path_length_km(&waypoints),
            "Route registered"
        );
        Ok(route)
    }

    /// # Errors
    ///
    /// Store failure only.
    pub async fn find_vehicle(&self, external_id: &str) -> Result<Option<Vehicle>> {
        self.repos
            .vehicles
            .find_by_external_id(external_id)
            .await
            .map_err(OrchestrationError::store("loading vehicle", external_id))
    }

    // =========================================================================
    // TELEMETRY
    // =========================================================================

    /// # Errors
    ///
    /// See [`TelemetryPipeline::process`].
    pub async fn ingest_telemetry(&self, event: TelemetryEvent) -> Result<TelemetryRecord> {
        self.pipeline.process(event).await
    }

    /// Wait for background provisioning to settle.
    pub async fn drain_background(&self) {
        self.pipeline.drain().await;
    }

    /// Telemetry of one vehicle inside `[start, end]`, newest first.
    ///
    /// # Errors
    ///
    /// Validation for an inverted range or a zero limit, or a store failure.
    pub async fn telemetry_range(
        &self,
        vehicle_external_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: Option<usize>,
    ) -> Result<Vec<TelemetryRecord>> {
        require(vehicle_external_id, "vehicleExternalId")?;
        let range = TimeRange::new(start, end)?;
        if limit == Some(0) {
            return Err(DomainError::invalid("limit", "must be positive").into());
        }
        self.repos
            .telemetry
            .find_by_vehicle_range(vehicle_external_id, range, limit)
            .await
            .map_err(OrchestrationError::store("loading telemetry of", vehicle_external_id))
    }

    /// Latest `limit` records of one vehicle, newest first.
    ///
    /// # Errors
    ///
    /// Validation for a zero limit, or a store failure.
    pub async fn recent_telemetry(&self, vehicle_external_id: &str, limit: usize) -> Result<Vec<TelemetryRecord>> {
        require(vehicle_external_id, "vehicleExternalId")?;
        if limit == 0 {
            return Err(DomainError::invalid("limit", "must be positive").into());
        }
        self.repos
            .telemetry
            .find_recent(vehicle_external_id, limit)
            .await
            .map_err(OrchestrationError::store("loading telemetry of", vehicle_external_id))
    }
}
