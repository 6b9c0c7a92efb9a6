//! # SkyFleet Mission Orchestration - Domain Model
//!
//! Core domain entities, value objects, and enums for multi-vehicle mission
//! orchestration. These types are the single source of truth across all
//! layers: persistence, orchestration, and the wire formats published to the
//! message bus.
//!
//! Pure decision logic lives next to the model:
//!
//! - [`state_machine`]: mission lifecycle transitions and their guards
//! - [`geometry`]: GeoJSON route geometry to ordered waypoints

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod geometry;
pub mod state_machine;

pub use geometry::{GeometryError, GeometryKind, WaypointExtractor};
pub use state_machine::{MissionStateMachine, TransitionError};

/// Valid latitude range in degrees
pub const LATITUDE_RANGE: std::ops::RangeInclusive<f64> = -90.0..=90.0;

/// Valid longitude range in degrees
pub const LONGITUDE_RANGE: std::ops::RangeInclusive<f64> = -180.0..=180.0;

/// Model recorded for vehicles created from telemetry rather than registered
pub const PLACEHOLDER_MODEL: &str = "UNRECOGNIZED_MODEL";

/// Serial number recorded for vehicles created from telemetry
pub const PLACEHOLDER_SERIAL: &str = "UNRECOGNIZED_SERIAL";

/// Default execution priority when a mission does not carry one
pub const DEFAULT_PRIORITY: i32 = 5;

/// Check that a latitude/longitude pair is finite and within geographic bounds.
///
/// # Errors
///
/// Returns [`DomainError::InvalidCoordinates`] when either component is
/// non-finite or outside its range.
pub fn validate_coordinates(latitude: f64, longitude: f64) -> Result<(), DomainError> {
    if latitude.is_finite()
        && longitude.is_finite()
        && LATITUDE_RANGE.contains(&latitude)
        && LONGITUDE_RANGE.contains(&longitude)
    {
        Ok(())
    } else {
        Err(DomainError::InvalidCoordinates {
            lat: latitude,
            lon: longitude,
        })
    }
}

// =============================================================================
// VALUE OBJECTS
// =============================================================================

/// A single point of a flight path. Order within a route is significant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl Waypoint {
    /// Create a bounds-checked waypoint.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::InvalidCoordinates`] for out-of-range input.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, DomainError> {
        validate_coordinates(latitude, longitude)?;
        Ok(Self {
            latitude,
            longitude,
        })
    }

    /// Calculate great-circle distance to another point (Haversine formula)
    #[must_use]
    pub fn distance_to_km(&self, other: &Self) -> f64 {
        const EARTH_RADIUS_KM: f64 = 6371.0;

        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let delta_lat = (other.latitude - self.latitude).to_radians();
        let delta_lon = (other.longitude - self.longitude).to_radians();

        let a = (delta_lat / 2.0).sin().powi(2)
            + lat1.cos() * lat2.cos() * (delta_lon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().asin();

        EARTH_RADIUS_KM * c
    }
}

/// Total length of a flight path in kilometres.
#[must_use]
pub fn path_length_km(waypoints: &[Waypoint]) -> f64 {
    waypoints
        .windows(2)
        .map(|pair| pair[0].distance_to_km(&pair[1]))
        .sum()
}

/// Reported vehicle position
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude_m: f64,
}

/// Control command code, e.g. `RETURN_TO_BASE`.
///
/// Non-empty, at most [`CommandCode::MAX_LEN`] characters, uppercase ASCII
/// letters, digits and underscores only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CommandCode(String);

impl CommandCode {
    pub const MAX_LEN: usize = 32;

    /// Code carried by every execution entry.
    pub const EXECUTE_ROUTE: &'static str = "EXECUTE_ROUTE";

    /// Parse and validate a command code.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::InvalidCommandCode`] when the code is empty, too
    /// long, or contains characters outside `[A-Z0-9_]`.
    pub fn parse(code: impl Into<String>) -> Result<Self, DomainError> {
        let code = code.into();
        let valid = !code.is_empty()
            && code.len() <= Self::MAX_LEN
            && code
                .bytes()
                .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit() || b == b'_');
        if valid {
            Ok(Self(code))
        } else {
            Err(DomainError::InvalidCommandCode(code))
        }
    }

    #[must_use]
    pub fn execute_route() -> Self {
        Self(Self::EXECUTE_ROUTE.to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for CommandCode {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<CommandCode> for String {
    fn from(code: CommandCode) -> Self {
        code.0
    }
}

impl fmt::Display for CommandCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// ENUMS
// =============================================================================

/// Mission lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MissionState {
    PendingApproval,
    Approved,
    InProgress,
    Completed,
    Aborted,
    Failed,
    Archived,
}

impl MissionState {
    pub const ALL: [Self; 7] = [
        Self::PendingApproval,
        Self::Approved,
        Self::InProgress,
        Self::Completed,
        Self::Aborted,
        Self::Failed,
        Self::Archived,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::PendingApproval => "PENDING_APPROVAL",
            Self::Approved => "APPROVED",
            Self::InProgress => "IN_PROGRESS",
            Self::Completed => "COMPLETED",
            Self::Aborted => "ABORTED",
            Self::Failed => "FAILED",
            Self::Archived => "ARCHIVED",
        }
    }

    /// Terminal states have no outgoing transitions
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Aborted | Self::Failed | Self::Archived
        )
    }
}

impl fmt::Display for MissionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a mission came to exist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MissionOrigin {
    Manual,
    Automatic,
}

/// Vehicle operational status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VehicleStatus {
    Active,
    Idle,
    Maintenance,
    Retired,
}

/// Route resource status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RouteStatus {
    Draft,
    Published,
    Retired,
}

// =============================================================================
// ENTITY TYPES
// =============================================================================

/// Client-supplied mission draft.
///
/// Carries no lifecycle state and no actual start/end times: those are owned
/// by the orchestration layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMission {
    pub name: Option<String>,
    pub scheduled_start: Option<DateTime<Utc>>,
    pub priority: Option<i32>,
}

impl NewMission {
    pub const MAX_NAME_LEN: usize = 120;

    /// Validate client-supplied fields.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::InvalidField`] for a blank or overlong name or a
    /// negative priority.
    pub fn validate(&self) -> Result<(), DomainError> {
        if let Some(name) = &self.name {
            if name.trim().is_empty() {
                return Err(DomainError::invalid("name", "must not be blank"));
            }
            if name.chars().count() > Self::MAX_NAME_LEN {
                return Err(DomainError::invalid(
                    "name",
                    format!("must be at most {} characters", Self::MAX_NAME_LEN),
                ));
            }
        }
        if self.priority.is_some_and(|p| p < 0) {
            return Err(DomainError::invalid("priority", "must not be negative"));
        }
        Ok(())
    }
}

/// Mission entity - a scheduled flight task for one or more vehicles
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mission {
    pub mission_id: Uuid,
    pub name: Option<String>,
    pub operator: String,
    pub origin: MissionOrigin,
    pub state: MissionState,
    pub priority: i32,

    // Temporal
    pub scheduled_start: Option<DateTime<Utc>>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,

    // Command
    pub approved_by: Option<String>,

    // Audit
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Mission {
    /// Build a manual mission awaiting approval from a client draft.
    #[must_use]
    pub fn manual(draft: NewMission, operator: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            mission_id: Uuid::new_v4(),
            name: draft.name.map(|n| n.trim().to_string()),
            operator: operator.into(),
            origin: MissionOrigin::Manual,
            state: MissionState::PendingApproval,
            priority: draft.priority.unwrap_or(DEFAULT_PRIORITY),
            scheduled_start: draft.scheduled_start,
            start_date: None,
            end_date: None,
            approved_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Build an automatic mission for a vehicle that is already flying.
    #[must_use]
    pub fn automatic(vehicle_external_id: &str, started_at: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        Self {
            mission_id: Uuid::new_v4(),
            name: Some(format!("AUTO-{vehicle_external_id}")),
            operator: "system".to_string(),
            origin: MissionOrigin::Automatic,
            state: MissionState::InProgress,
            priority: DEFAULT_PRIORITY,
            scheduled_start: Some(started_at),
            start_date: Some(started_at),
            end_date: None,
            approved_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the scheduled start is not strictly in the future
    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.scheduled_start.is_none_or(|at| at <= now)
    }
}

/// Requested vehicle assignment for a new mission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentRequest {
    pub vehicle_id: Uuid,
    pub route_id: Option<Uuid>,
}

/// Link between one mission and one vehicle, optionally with a route
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DroneMissionAssignment {
    pub assignment_id: Uuid,
    pub mission_id: Uuid,
    pub vehicle_id: Uuid,
    pub route_id: Option<Uuid>,
    pub assigned_at: DateTime<Utc>,
}

impl DroneMissionAssignment {
    #[must_use]
    pub fn new(mission_id: Uuid, request: AssignmentRequest, now: DateTime<Utc>) -> Self {
        Self {
            assignment_id: Uuid::new_v4(),
            mission_id,
            vehicle_id: request.vehicle_id,
            route_id: request.route_id,
            assigned_at: now,
        }
    }
}

/// Vehicle entity - a drone identified externally by its telemetry id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    pub vehicle_id: Uuid,
    pub external_id: String,

    // Platform identification
    pub display_name: String,
    pub model: String,
    pub serial_number: String,

    // Current state
    pub status: VehicleStatus,
    pub flight_hours: f64,

    // Metadata
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Vehicle {
    /// Operator registration with known platform metadata
    #[must_use]
    pub fn register(
        external_id: impl Into<String>,
        model: impl Into<String>,
        serial_number: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let external_id = external_id.into();
        Self {
            vehicle_id: Uuid::new_v4(),
            display_name: external_id.clone(),
            external_id,
            model: model.into(),
            serial_number: serial_number.into(),
            status: VehicleStatus::Idle,
            flight_hours: 0.0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Placeholder record for a vehicle first seen through telemetry
    #[must_use]
    pub fn placeholder(external_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            vehicle_id: Uuid::new_v4(),
            external_id: external_id.to_string(),
            display_name: format!("Unregistered {external_id}"),
            model: PLACEHOLDER_MODEL.to_string(),
            serial_number: PLACEHOLDER_SERIAL.to_string(),
            status: VehicleStatus::Active,
            flight_hours: 0.0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether this record was created by the provisioner
    #[must_use]
    pub fn is_auto_provisioned(&self) -> bool {
        self.model == PLACEHOLDER_MODEL && self.serial_number == PLACEHOLDER_SERIAL
    }
}

/// Route resource - named GeoJSON geometry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub route_id: Uuid,
    pub name: String,
    pub status: RouteStatus,
    pub geometry: Option<String>,
    pub geometry_type: Option<String>,
    pub waypoint_count: u32,
    pub created_at: DateTime<Utc>,
}

impl Route {
    /// The geometry payload, unless absent or blank
    #[must_use]
    pub fn geometry_payload(&self) -> Option<&str> {
        self.geometry.as_deref().filter(|g| !g.trim().is_empty())
    }
}

// =============================================================================
// OUTBOUND COMMANDS
// =============================================================================

/// Per-vehicle entry of an execution command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleExecution {
    pub vehicle_external_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route_id: Option<Uuid>,
    pub waypoints: Vec<Waypoint>,
    pub command_code: CommandCode,
    pub priority: i32,
}

/// Execution command published once per successful orchestration run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionCommand {
    pub command_id: Uuid,
    pub mission_id: Uuid,
    pub vehicles: Vec<VehicleExecution>,
    pub priority: i32,
    pub issued_at: DateTime<Utc>,
}

impl ExecutionCommand {
    #[must_use]
    pub fn new(mission_id: Uuid, vehicles: Vec<VehicleExecution>, priority: i32) -> Self {
        Self {
            command_id: Uuid::new_v4(),
            mission_id,
            vehicles,
            priority,
            issued_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn waypoint_total(&self) -> usize {
        self.vehicles.iter().map(|v| v.waypoints.len()).sum()
    }
}

/// Control command addressed to a single vehicle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlCommand {
    pub command_id: Uuid,
    pub mission_id: Uuid,
    pub vehicle_external_id: String,
    pub command_code: CommandCode,
    pub issued_at: DateTime<Utc>,
}

// =============================================================================
// TELEMETRY
// =============================================================================

/// Inbound telemetry event as received from a vehicle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryEvent {
    pub vehicle_external_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub speed_mps: Option<f64>,
    #[serde(default)]
    pub heading_deg: Option<f64>,
    #[serde(default)]
    pub battery_pct: Option<f64>,
    #[serde(default)]
    pub temperature_c: Option<f64>,
    #[serde(default)]
    pub signal_dbm: Option<f64>,
}

impl TelemetryEvent {
    pub const MAX_EXTERNAL_ID_LEN: usize = 64;

    /// Minimal event with position only
    #[must_use]
    pub fn at(
        vehicle_external_id: impl Into<String>,
        latitude: f64,
        longitude: f64,
        altitude: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            vehicle_external_id: vehicle_external_id.into(),
            latitude,
            longitude,
            altitude,
            timestamp: Some(timestamp),
            speed_mps: None,
            heading_deg: None,
            battery_pct: None,
            temperature_c: None,
            signal_dbm: None,
        }
    }

    /// Validate required fields and metric ranges.
    ///
    /// # Errors
    ///
    /// Returns the first violated constraint as a [`DomainError`].
    pub fn validate(&self) -> Result<(), DomainError> {
        let id = self.vehicle_external_id.trim();
        if id.is_empty() {
            return Err(DomainError::MissingField("vehicleExternalId"));
        }
        if id.len() > Self::MAX_EXTERNAL_ID_LEN {
            return Err(DomainError::invalid(
                "vehicleExternalId",
                format!("must be at most {} characters", Self::MAX_EXTERNAL_ID_LEN),
            ));
        }
        if self.timestamp.is_none() {
            return Err(DomainError::MissingField("timestamp"));
        }
        validate_coordinates(self.latitude, self.longitude)?;
        if !self.altitude.is_finite() {
            return Err(DomainError::invalid("altitude", "must be finite"));
        }
        if let Some(heading) = self.heading_deg {
            if !(0.0..360.0).contains(&heading) {
                return Err(DomainError::invalid("headingDeg", "must be in [0, 360)"));
            }
        }
        if let Some(battery) = self.battery_pct {
            if !(0.0..=100.0).contains(&battery) {
                return Err(DomainError::invalid("batteryPct", "must be in [0, 100]"));
            }
        }
        if self.speed_mps.is_some_and(|s| !s.is_finite() || s < 0.0) {
            return Err(DomainError::invalid("speedMps", "must be a non-negative number"));
        }
        Ok(())
    }
}

/// Persisted telemetry record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    pub record_id: Uuid,
    pub vehicle_external_id: String,
    pub position: Position,
    pub speed_mps: Option<f64>,
    pub heading_deg: Option<f64>,
    pub battery_pct: Option<f64>,
    pub temperature_c: Option<f64>,
    pub signal_dbm: Option<f64>,
    pub recorded_at: DateTime<Utc>,
    pub received_at: DateTime<Utc>,
}

impl TelemetryRecord {
    /// Validate an inbound event and convert it to a record.
    ///
    /// # Errors
    ///
    /// Propagates [`TelemetryEvent::validate`] failures.
    pub fn from_event(event: &TelemetryEvent, received_at: DateTime<Utc>) -> Result<Self, DomainError> {
        event.validate()?;
        let recorded_at = event.timestamp.ok_or(DomainError::MissingField("timestamp"))?;
        Ok(Self {
            record_id: Uuid::new_v4(),
            vehicle_external_id: event.vehicle_external_id.trim().to_string(),
            position: Position {
                latitude: event.latitude,
                longitude: event.longitude,
                altitude_m: event.altitude,
            },
            speed_mps: event.speed_mps,
            heading_deg: event.heading_deg,
            battery_pct: event.battery_pct,
            temperature_c: event.temperature_c,
            signal_dbm: event.signal_dbm,
            recorded_at,
            received_at,
        })
    }
}

// =============================================================================
// QUERY/FILTER TYPES
// =============================================================================

/// Time range filter for queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    /// # Errors
    ///
    /// Returns [`DomainError::InvalidTimeRange`] when `start > end`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, DomainError> {
        if start > end {
            return Err(DomainError::InvalidTimeRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// Inclusive on both ends
    #[must_use]
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at <= self.end
    }
}

// =============================================================================
// ERRORS
// =============================================================================

/// Domain-level validation errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DomainError {
    #[error("Invalid coordinates: lat={lat}, lon={lon}")]
    InvalidCoordinates { lat: f64, lon: f64 },

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid field {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("Invalid command code: {0:?}")]
    InvalidCommandCode(String),

    #[error("Invalid time range: start {start} is after end {end}")]
    InvalidTimeRange {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

impl DomainError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field,
            reason: reason.into(),
        }
    }
}
