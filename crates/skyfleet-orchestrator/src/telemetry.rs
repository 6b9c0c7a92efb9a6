//! # Telemetry Ingestion
//!
//! Telemetry is written synchronously; vehicle provisioning runs afterwards on
//! a background task and never holds up the caller.
//!
//! Every persisted event schedules provisioning. At most `concurrency` of
//! those tasks do store work at once; the rest wait for a semaphore permit.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Semaphore, watch};

use skyfleet_domain::{TelemetryEvent, TelemetryRecord, Vehicle};
use skyfleet_persistence::TelemetryRepository;

use crate::error::{OrchestrationError, Result};
use crate::provisioner::{ProvisionOutcome, VehicleProvisioner};

/// Follow-up work run once provisioning has resolved the reporting vehicle.
///
/// Failures are logged by the pipeline and never reach the telemetry caller.
#[async_trait]
pub trait ProvisioningHook: Send + Sync {
    /// Short name used in log events
    fn name(&self) -> &'static str;

    /// `newly_provisioned` is set when this event's provisioning created the
    /// vehicle record.
    async fn vehicle_reported(
        &self,
        vehicle: &Vehicle,
        newly_provisioned: bool,
        record: &TelemetryRecord,
    ) -> Result<()>;
}

/// Counts a scheduled background task until it finishes, panics included.
struct PendingSlot(Arc<watch::Sender<usize>>);

impl PendingSlot {
    fn open(pending: &Arc<watch::Sender<usize>>) -> Self {
        pending.send_modify(|n| *n += 1);
        Self(Arc::clone(pending))
    }
}

impl Drop for PendingSlot {
    fn drop(&mut self) {
        self.0.send_modify(|n| *n = n.saturating_sub(1));
    }
}

/// Write path for inbound telemetry
pub struct TelemetryPipeline {
    telemetry: Arc<dyn TelemetryRepository>,
    provisioner: Arc<VehicleProvisioner>,
    hooks: Vec<Arc<dyn ProvisioningHook>>,
    permits: Arc<Semaphore>,
    pending: Arc<watch::Sender<usize>>,
}

impl TelemetryPipeline {
    #[must_use]
    pub fn new(
        telemetry: Arc<dyn TelemetryRepository>,
        provisioner: Arc<VehicleProvisioner>,
        concurrency: usize,
    ) -> Self {
        let (pending, _) = watch::channel(0);
        Self {
            telemetry,
            provisioner,
            hooks: Vec::new(),
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
            pending: Arc::new(pending),
        }
    }

    /// Register a hook run for every event whose vehicle was resolved
    #[must_use]
    pub fn with_hook(mut self, hook: Arc<dyn ProvisioningHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    #[must_use]
    pub fn provisioner(&self) -> &Arc<VehicleProvisioner> {
        &self.provisioner
    }

    /// Background tasks scheduled and not yet finished
    #[must_use]
    pub fn pending(&self) -> usize {
        *self.pending.borrow()
    }

    /// Validate and persist one event, then schedule provisioning.
    ///
    /// # Errors
    ///
    /// - [`OrchestrationError::Validation`] for a malformed event (nothing is
    ///   written)
    /// - [`OrchestrationError::TelemetryPersist`] when the write fails
    ///   (provisioning is not scheduled)
    pub async fn process(&self, event: TelemetryEvent) -> Result<TelemetryRecord> {
        let record = TelemetryRecord::from_event(&event, Utc::now())?;
        let vehicle_external_id = record.vehicle_external_id.clone();

        let record = self.telemetry.save(record).await.map_err(|source| {
            tracing::error!(
                vehicle_external_id = %vehicle_external_id,
                error = %source,
                "Telemetry write failed"
            );
            OrchestrationError::TelemetryPersist {
                vehicle_external_id: vehicle_external_id.clone(),
                source,
            }
        })?;

        tracing::trace!(
            vehicle_external_id = %record.vehicle_external_id,
            record_id = %record.record_id,
            "Telemetry persisted"
        );

        self.schedule_provisioning(record.clone());
        Ok(record)
    }

    /// Wait until every scheduled background task has finished.
    pub async fn drain(&self) {
        let mut pending = self.pending.subscribe();
        // Only fails once the sender is gone, and `self` owns it.
        let _ = pending.wait_for(|n| *n == 0).await;
    }

    fn schedule_provisioning(&self, record: TelemetryRecord) {
        let slot = PendingSlot::open(&self.pending);
        let permits = Arc::clone(&self.permits);
        let provisioner = Arc::clone(&self.provisioner);
        let hooks = self.hooks.clone();

        tokio::spawn(async move {
            let _slot = slot;
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };
            provision_in_background(&provisioner, &hooks, &record).await;
        });
    }
}

async fn provision_in_background(
    provisioner: &VehicleProvisioner,
    hooks: &[Arc<dyn ProvisioningHook>],
    record: &TelemetryRecord,
) {
    let vehicle_external_id = record.vehicle_external_id.as_str();
    let (vehicle, newly_provisioned) = match provisioner.try_provision(vehicle_external_id).await {
        Ok(ProvisionOutcome::Created(vehicle)) => (vehicle, true),
        Ok(ProvisionOutcome::Existing(vehicle)) => (vehicle, false),
        Ok(ProvisionOutcome::InFlight) => {
            tracing::trace!(vehicle_external_id, "Provisioning already running");
            return;
        }
        Err(err) => {
            tracing::warn!(
                vehicle_external_id,
                error = %err,
                transient = err.is_transient(),
                "Vehicle provisioning failed"
            );
            return;
        }
    };

    for hook in hooks {
        if let Err(err) = hook.vehicle_reported(&vehicle, newly_provisioned, record).await {
            tracing::warn!(
                vehicle_external_id,
                hook = hook.name(),
                error = %err,
                error_code = err.error_code(),
                "Provisioning hook failed"
            );
        }
    }
}
