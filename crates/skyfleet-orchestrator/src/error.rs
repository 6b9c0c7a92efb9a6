//! # Orchestration Error Types
//!
//! One tagged error for every operation the orchestration layer exposes.
//! Variants group into the [`ErrorKind`] taxonomy so a transport layer can
//! map them exhaustively without inspecting messages.

use std::fmt;

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::bus::PublishError;
use skyfleet_domain::{DomainError, GeometryError, MissionState, TransitionError};
use skyfleet_persistence::PersistenceError;

/// Error taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed or missing input, rejected before any store access
    Validation,
    /// Mission, vehicle, route or assignment absent
    NotFound,
    /// Illegal transition, not-yet-due execution, duplicate assignment
    StateConflict,
    /// Unparseable route geometry
    Format,
    /// Store or message bus failure
    Infrastructure,
}

/// A single vehicle's failure inside a fan-out
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VehicleFailure {
    pub vehicle_external_id: String,
    pub reason: PublishError,
}

impl fmt::Display for VehicleFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.vehicle_external_id, self.reason)
    }
}

fn list_failures(failures: &[VehicleFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Orchestration-level errors
#[derive(Debug, Error)]
pub enum OrchestrationError {
    // -------------------------------------------------------------------------
    // Validation
    // -------------------------------------------------------------------------
    #[error("Invalid input: {0}")]
    Validation(#[from] DomainError),

    // -------------------------------------------------------------------------
    // Not found
    // -------------------------------------------------------------------------
    #[error("Mission {mission_id} not found")]
    MissionNotFound { mission_id: Uuid },

    #[error("Vehicle {vehicle} not found (mission {mission_id})")]
    VehicleNotFound { mission_id: Uuid, vehicle: String },

    #[error("Route {route_id} not found for vehicle {vehicle} (mission {mission_id})")]
    RouteNotFound {
        mission_id: Uuid,
        vehicle: String,
        route_id: Uuid,
    },

    #[error("Vehicle {vehicle_id} is not assigned to mission {mission_id}")]
    AssignmentNotFound { mission_id: Uuid, vehicle_id: Uuid },

    // -------------------------------------------------------------------------
    // State conflict
    // -------------------------------------------------------------------------
    #[error("Mission {mission_id} is {actual}, expected {expected}")]
    InvalidState {
        mission_id: Uuid,
        actual: MissionState,
        expected: MissionState,
    },

    #[error(transparent)]
    InvalidTransition(TransitionError),

    #[error("Mission {mission_id} is scheduled for {scheduled_start}, refusing early execution")]
    ScheduledInFuture {
        mission_id: Uuid,
        scheduled_start: DateTime<Utc>,
    },

    #[error("Vehicle {vehicle_id} is already assigned to mission {mission_id}")]
    DuplicateAssignment { mission_id: Uuid, vehicle_id: Uuid },

    #[error("Vehicle {external_id} is already registered")]
    DuplicateVehicle { external_id: String },

    #[error("Mission {mission_id} has no vehicles assigned")]
    NoVehiclesAssigned { mission_id: Uuid },

    #[error("Mission {mission_id} is already being executed")]
    ExecutionInFlight { mission_id: Uuid },

    #[error("Mission {mission_id} is {state}; routes can no longer be reassigned")]
    AssignmentLocked { mission_id: Uuid, state: MissionState },

    // -------------------------------------------------------------------------
    // Format
    // -------------------------------------------------------------------------
    #[error("Route {route_id} for vehicle {vehicle} is unusable: {reason} (mission {mission_id})")]
    InvalidRoute {
        mission_id: Uuid,
        vehicle: String,
        route_id: Uuid,
        reason: String,
    },

    #[error("Route {route_id} geometry could not be parsed (mission {mission_id}): {source}")]
    RouteParse {
        mission_id: Uuid,
        route_id: Uuid,
        #[source]
        source: GeometryError,
    },

    // -------------------------------------------------------------------------
    // Infrastructure
    // -------------------------------------------------------------------------
    #[error("Store failure while {operation} {key}: {source}")]
    Persistence {
        operation: &'static str,
        key: String,
        #[source]
        source: PersistenceError,
    },

    #[error("Publishing execution of mission {mission_id} failed: {source}")]
    Publish {
        mission_id: Uuid,
        #[source]
        source: PublishError,
    },

    #[error(
        "Dispatch for mission {mission_id} failed for {} of {attempted} vehicle(s): {}",
        .failures.len(),
        list_failures(.failures)
    )]
    DispatchFailed {
        mission_id: Uuid,
        attempted: usize,
        failures: Vec<VehicleFailure>,
    },

    #[error(
        "Command {command_id} for mission {mission_id} was published but the state update failed: {source}"
    )]
    StateUpdate {
        mission_id: Uuid,
        command_id: Uuid,
        #[source]
        source: PersistenceError,
    },

    #[error("Telemetry from {vehicle_external_id} could not be persisted: {source}")]
    TelemetryPersist {
        vehicle_external_id: String,
        #[source]
        source: PersistenceError,
    },

    #[error("Fan-out task for {label} did not complete: {reason}")]
    TaskFailed { label: String, reason: String },
}

impl OrchestrationError {
    /// Build a mapper for store failures that names the key involved.
    pub fn store(
        operation: &'static str,
        key: impl fmt::Display,
    ) -> impl FnOnce(PersistenceError) -> Self {
        let key = key.to_string();
        move |source| Self::Persistence {
            operation,
            key,
            source,
        }
    }

    /// Taxonomy bucket of this error
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::MissionNotFound { .. }
            | Self::VehicleNotFound { .. }
            | Self::RouteNotFound { .. }
            | Self::AssignmentNotFound { .. } => ErrorKind::NotFound,
            Self::InvalidState { .. }
            | Self::InvalidTransition(_)
            | Self::ScheduledInFuture { .. }
            | Self::DuplicateAssignment { .. }
            | Self::DuplicateVehicle { .. }
            | Self::NoVehiclesAssigned { .. }
            | Self::ExecutionInFlight { .. }
            | Self::AssignmentLocked { .. } => ErrorKind::StateConflict,
            Self::InvalidRoute { .. } | Self::RouteParse { .. } => ErrorKind::Format,
            Self::Persistence { .. }
            | Self::Publish { .. }
            | Self::DispatchFailed { .. }
            | Self::StateUpdate { .. }
            | Self::TelemetryPersist { .. }
            | Self::TaskFailed { .. } => ErrorKind::Infrastructure,
        }
    }

    /// Stable machine-readable code
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_FAILED",
            Self::MissionNotFound { .. } => "MISSION_NOT_FOUND",
            Self::VehicleNotFound { .. } => "VEHICLE_NOT_FOUND",
            Self::RouteNotFound { .. } => "ROUTE_NOT_FOUND",
            Self::AssignmentNotFound { .. } => "ASSIGNMENT_NOT_FOUND",
            Self::InvalidState { .. } => "INVALID_STATE",
            Self::InvalidTransition(_) => "INVALID_TRANSITION",
            Self::ScheduledInFuture { .. } => "SCHEDULED_IN_FUTURE",
            Self::DuplicateAssignment { .. } => "DUPLICATE_ASSIGNMENT",
            Self::DuplicateVehicle { .. } => "DUPLICATE_VEHICLE",
            Self::NoVehiclesAssigned { .. } => "NO_VEHICLES_ASSIGNED",
            Self::ExecutionInFlight { .. } => "EXECUTION_IN_FLIGHT",
            Self::AssignmentLocked { .. } => "ASSIGNMENT_LOCKED",
            Self::InvalidRoute { .. } => "INVALID_ROUTE",
            Self::RouteParse { .. } => "ROUTE_PARSE_ERROR",
            Self::Persistence { .. } => "PERSISTENCE_ERROR",
            Self::Publish { .. } => "PUBLISH_ERROR",
            Self::DispatchFailed { .. } => "DISPATCH_FAILED",
            Self::StateUpdate { .. } => "STATE_UPDATE_ERROR",
            Self::TelemetryPersist { .. } => "TELEMETRY_PERSIST_ERROR",
            Self::TaskFailed { .. } => "TASK_FAILED",
        }
    }

    /// Only infrastructure failures may be retried, and never a
    /// publish-then-persist inconsistency: retrying it would re-send the
    /// command.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Infrastructure)
            && !matches!(self, Self::StateUpdate { .. })
    }

    /// Mission this error concerns, when there is one
    #[must_use]
    pub const fn mission_id(&self) -> Option<Uuid> {
        match self {
            Self::MissionNotFound { mission_id }
            | Self::VehicleNotFound { mission_id, .. }
            | Self::RouteNotFound { mission_id, .. }
            | Self::AssignmentNotFound { mission_id, .. }
            | Self::InvalidState { mission_id, .. }
            | Self::ScheduledInFuture { mission_id, .. }
            | Self::DuplicateAssignment { mission_id, .. }
            | Self::NoVehiclesAssigned { mission_id }
            | Self::ExecutionInFlight { mission_id }
            | Self::AssignmentLocked { mission_id, .. }
            | Self::InvalidRoute { mission_id, .. }
            | Self::RouteParse { mission_id, .. }
            | Self::Publish { mission_id, .. }
            | Self::DispatchFailed { mission_id, .. }
            | Self::StateUpdate { mission_id, .. } => Some(*mission_id),
            Self::InvalidTransition(
                TransitionError::InvalidTransition { mission_id, .. }
                | TransitionError::InvalidState { mission_id, .. }
                | TransitionError::ScheduledInFuture { mission_id, .. },
            ) => Some(*mission_id),
            Self::Validation(_)
            | Self::DuplicateVehicle { .. }
            | Self::Persistence { .. }
            | Self::TelemetryPersist { .. }
            | Self::TaskFailed { .. } => None,
        }
    }
}

impl From<TransitionError> for OrchestrationError {
    fn from(err: TransitionError) -> Self {
        match err {
            TransitionError::InvalidState {
                mission_id,
                actual,
                expected,
            } => Self::InvalidState {
                mission_id,
                actual,
                expected,
            },
            TransitionError::ScheduledInFuture {
                mission_id,
                scheduled_start,
            } => Self::ScheduledInFuture {
                mission_id,
                scheduled_start,
            },
            transition @ TransitionError::InvalidTransition { .. } => {
                Self::InvalidTransition(transition)
            }
        }
    }
}

/// Result type alias for orchestration operations
pub type Result<T> = std::result::Result<T, OrchestrationError>;
