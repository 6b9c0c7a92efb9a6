//! Spawned fan-out with an all-must-succeed barrier.
//!
//! Every branch is a detached tokio task: it runs to completion even if the
//! caller stops polling, and a failing branch never cancels its siblings.
//! Results come back in input order.

use std::future::Future;

use futures_util::future::join_all;

use crate::bus::PublishError;
use crate::error::VehicleFailure;

/// Outcome of one branch; `Err` carries the join failure message.
pub type BranchResult<T> = Result<T, String>;

/// Spawn every branch and wait for all of them.
pub async fn spawn_all<T, F>(branches: impl IntoIterator<Item = F>) -> Vec<BranchResult<T>>
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let handles: Vec<_> = branches.into_iter().map(tokio::spawn).collect();
    join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.map_err(|e| e.to_string()))
        .collect()
}

/// Pair publish outcomes with the commands that produced them and keep the
/// failures, in input order. A branch that never completed counts as a bus
/// failure for its vehicle.
pub fn publish_failures<C>(
    commands: &[C],
    outcomes: Vec<BranchResult<Result<(), PublishError>>>,
    vehicle_of: impl Fn(&C) -> String,
) -> Vec<VehicleFailure> {
    commands
        .iter()
        .zip(outcomes)
        .filter_map(|(command, outcome)| {
            let reason = match outcome {
                Ok(Ok(())) => return None,
                Ok(Err(err)) => err,
                Err(join) => PublishError::Unavailable(format!("publish task aborted: {join}")),
            };
            Some(VehicleFailure {
                vehicle_external_id: vehicle_of(command),
                reason,
            })
        })
        .collect()
}
