//! # Vehicle Provisioner
//!
//! Lazily creates a placeholder [`Vehicle`] the first time an unknown external
//! id is observed.
//!
//! Concurrent callers for the same id are serialised through a registry of
//! per-id async mutex tokens:
//!
//! - [`VehicleProvisioner::try_provision`] never waits. If another caller
//!   holds the token it returns [`ProvisionOutcome::InFlight`] and creates
//!   nothing.
//! - [`VehicleProvisioner::provision`] waits for the token, so every caller
//!   receives the same record.
//!
//! Tokens are created on first use and removed by whichever holder lets go
//! last, so the registry only ever holds ids with work in flight. A duplicate
//! rejected by the store (the window the registry cannot close, e.g. another
//! process) is resolved by re-reading the existing record.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use skyfleet_domain::Vehicle;
use skyfleet_persistence::{PersistenceError, VehicleRepository};

type TokenRegistry = DashMap<String, Arc<Mutex<()>>>;

/// Result of a provisioning attempt
#[derive(Debug, Clone, PartialEq)]
pub enum ProvisionOutcome {
    /// A placeholder record was created by this call
    Created(Vehicle),
    /// The vehicle already existed
    Existing(Vehicle),
    /// Another caller is provisioning this id right now
    InFlight,
}

impl ProvisionOutcome {
    #[must_use]
    pub const fn vehicle(&self) -> Option<&Vehicle> {
        match self {
            Self::Created(vehicle) | Self::Existing(vehicle) => Some(vehicle),
            Self::InFlight => None,
        }
    }
}

/// Held token for one external id; releases and sweeps on drop, including
/// when the owning future is cancelled.
struct Lease<'a> {
    registry: &'a TokenRegistry,
    external_id: &'a str,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for Lease<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        sweep(self.registry, self.external_id);
    }
}

/// Remove the token once nobody but the registry references it.
///
/// `remove_if` runs under the shard lock, and new references are only handed
/// out under that same lock, so a count of one cannot race with a new holder.
fn sweep(registry: &TokenRegistry, external_id: &str) {
    registry.remove_if(external_id, |_, token| Arc::strong_count(token) == 1);
}

/// Race-free lazy vehicle provisioning
pub struct VehicleProvisioner {
    vehicles: Arc<dyn VehicleRepository>,
    tokens: TokenRegistry,
}

impl VehicleProvisioner {
    #[must_use]
    pub fn new(vehicles: Arc<dyn VehicleRepository>) -> Self {
        Self {
            vehicles,
            tokens: DashMap::new(),
        }
    }

    /// Number of external ids with provisioning currently in flight
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.tokens.len()
    }

    fn token(&self, external_id: &str) -> Arc<Mutex<()>> {
        Arc::clone(
            self.tokens
                .entry(external_id.to_string())
                .or_default()
                .value(),
        )
    }

    /// Non-blocking provisioning.
    ///
    /// # Errors
    ///
    /// Propagates store failures other than a duplicate-key rejection.
    pub async fn try_provision(&self, external_id: &str) -> Result<ProvisionOutcome, PersistenceError> {
        if let Some(vehicle) = self.vehicles.find_by_external_id(external_id).await? {
            return Ok(ProvisionOutcome::Existing(vehicle));
        }

        let Ok(guard) = self.token(external_id).try_lock_owned() else {
            sweep(&self.tokens, external_id);
            tracing::debug!(vehicle_external_id = %external_id, "Provisioning already in flight");
            return Ok(ProvisionOutcome::InFlight);
        };

        let _lease = Lease {
            registry: &self.tokens,
            external_id,
            guard: Some(guard),
        };
        let (vehicle, created) = self.create_if_absent(external_id).await?;
        Ok(if created {
            ProvisionOutcome::Created(vehicle)
        } else {
            ProvisionOutcome::Existing(vehicle)
        })
    }

    /// Blocking provisioning: waits for any in-flight caller and always
    /// returns the vehicle record.
    ///
    /// # Errors
    ///
    /// Propagates store failures other than a duplicate-key rejection.
    pub async fn provision(&self, external_id: &str) -> Result<Vehicle, PersistenceError> {
        if let Some(vehicle) = self.vehicles.find_by_external_id(external_id).await? {
            return Ok(vehicle);
        }

        let guard = self.token(external_id).lock_owned().await;
        let _lease = Lease {
            registry: &self.tokens,
            external_id,
            guard: Some(guard),
        };
        let (vehicle, _) = self.create_if_absent(external_id).await?;
        Ok(vehicle)
    }

    /// Double-checked create; the flag is set when this call created the
    /// record. Caller holds the id's token.
    async fn create_if_absent(&self, external_id: &str) -> Result<(Vehicle, bool), PersistenceError> {
        if let Some(vehicle) = self.vehicles.find_by_external_id(external_id).await? {
            return Ok((vehicle, false));
        }

        match self.vehicles.save(Vehicle::placeholder(external_id, Utc::now())).await {
            Ok(vehicle) => {
                tracing::info!(
                    vehicle_external_id = %external_id,
                    vehicle_id = %vehicle.vehicle_id,
                    "Provisioned placeholder vehicle"
                );
                Ok((vehicle, true))
            }
            Err(err) if err.is_duplicate() => {
                tracing::warn!(
                    vehicle_external_id = %external_id,
                    "Store reported duplicate vehicle, returning existing record"
                );
                self.vehicles
                    .find_by_external_id(external_id)
                    .await?
                    .map(|vehicle| (vehicle, false))
                    .ok_or(err)
            }
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skyfleet_persistence::InMemoryVehicleRepository;

    fn provisioner() -> (Arc<InMemoryVehicleRepository>, VehicleProvisioner) {
        let repo = Arc::new(InMemoryVehicleRepository::default());
        let provisioner = VehicleProvisioner::new(repo.clone());
        (repo, provisioner)
    }

    #[tokio::test]
    async fn test_creates_placeholder_once() {
        let (repo, provisioner) = provisioner();

        let first = provisioner.try_provision("DRN-1").await.unwrap();
        let ProvisionOutcome::Created(created) = first else {
            panic!("expected creation, got {first:?}");
        };
        assert!(created.is_auto_provisioned());

        let second = provisioner.try_provision("DRN-1").await.unwrap();
        assert_eq!(second, ProvisionOutcome::Existing(created.clone()));
        assert_eq!(provisioner.provision("DRN-1").await.unwrap(), created);
        assert!(repo.exists_by_external_id("DRN-1").await.unwrap());
    }

    #[tokio::test]
    async fn test_never_touches_registered_vehicle() {
        let (repo, provisioner) = provisioner();
        let registered = repo
            .save(Vehicle::register("DRN-5", "Hexa H6", "SN-55", Utc::now()))
            .await
            .unwrap();

        let outcome = provisioner.try_provision("DRN-5").await.unwrap();
        assert_eq!(outcome, ProvisionOutcome::Existing(registered));
    }

    #[tokio::test]
    async fn test_held_token_reports_in_flight() {
        let (repo, provisioner) = provisioner();
        let held = provisioner.token("DRN-2").try_lock_owned().unwrap();

        let outcome = provisioner.try_provision("DRN-2").await.unwrap();
        assert_eq!(outcome, ProvisionOutcome::InFlight);
        assert!(!repo.exists_by_external_id("DRN-2").await.unwrap());

        drop(held);
        sweep(&provisioner.tokens, "DRN-2");
        assert_eq!(provisioner.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_registry_is_empty_after_completion() {
        let (_repo, provisioner) = provisioner();
        for id in ["A-1", "A-2", "A-3"] {
            provisioner.try_provision(id).await.unwrap();
        }
        provisioner.provision("A-4").await.unwrap();
        assert_eq!(provisioner.in_flight(), 0);
    }
}
