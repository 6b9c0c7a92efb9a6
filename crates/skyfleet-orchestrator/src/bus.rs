//! # Message Bus
//!
//! Outbound command publishing. The orchestration layer depends only on
//! [`MessagePublisher`]; [`BroadcastPublisher`] is the in-process bus built on
//! a tokio broadcast channel.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;

use skyfleet_domain::{ControlCommand, ExecutionCommand};

/// Topic carrying aggregated execution commands
pub const EXECUTION_TOPIC: &str = "mission.execute";

/// Topic carrying control commands for one vehicle
#[must_use]
pub fn vehicle_topic(vehicle_external_id: &str) -> String {
    format!("vehicle.{vehicle_external_id}.command")
}

/// Publishing failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PublishError {
    #[error("No subscribers on topic {topic}")]
    NoSubscribers { topic: String },

    #[error("Message bus rejected message on {topic}: {reason}")]
    Rejected { topic: String, reason: String },

    #[error("Message bus unavailable: {0}")]
    Unavailable(String),

    #[error("Failed to encode message: {0}")]
    Encode(String),
}

impl From<serde_json::Error> for PublishError {
    fn from(err: serde_json::Error) -> Self {
        Self::Encode(err.to_string())
    }
}

/// Message publisher seam
#[async_trait]
pub trait MessagePublisher: Send + Sync {
    /// Publish one execution command
    async fn publish_execution(&self, command: &ExecutionCommand) -> Result<(), PublishError>;

    /// Publish a control command to a single vehicle
    async fn publish_command(&self, command: &ControlCommand) -> Result<(), PublishError>;
}

/// Envelope carried on the in-process bus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BusMessage {
    Execution(ExecutionCommand),
    Control(ControlCommand),
}

impl BusMessage {
    #[must_use]
    pub fn topic(&self) -> String {
        match self {
            Self::Execution(_) => EXECUTION_TOPIC.to_string(),
            Self::Control(command) => vehicle_topic(&command.vehicle_external_id),
        }
    }

    /// JSON wire encoding
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::Encode`] if serialization fails.
    pub fn to_json(&self) -> Result<String, PublishError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// In-process publisher backed by a broadcast channel
#[derive(Debug, Clone)]
pub struct BroadcastPublisher {
    tx: broadcast::Sender<BusMessage>,
}

impl BroadcastPublisher {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Attach a new subscriber; it sees messages published from now on
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<BusMessage> {
        self.tx.subscribe()
    }

    fn send(&self, message: BusMessage) -> Result<(), PublishError> {
        let topic = message.topic();
        match self.tx.send(message) {
            Ok(receivers) => {
                tracing::debug!(%topic, receivers, "Message published");
                Ok(())
            }
            Err(_) => Err(PublishError::NoSubscribers { topic }),
        }
    }
}

#[async_trait]
impl MessagePublisher for BroadcastPublisher {
    async fn publish_execution(&self, command: &ExecutionCommand) -> Result<(), PublishError> {
        self.send(BusMessage::Execution(command.clone()))
    }

    async fn publish_command(&self, command: &ControlCommand) -> Result<(), PublishError> {
        self.send(BusMessage::Control(command.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use skyfleet_domain::CommandCode;
    use uuid::Uuid;

    fn control(vehicle: &str) -> ControlCommand {
        ControlCommand {
            command_id: Uuid::new_v4(),
            mission_id: Uuid::new_v4(),
            vehicle_external_id: vehicle.to_string(),
            command_code: CommandCode::parse("RETURN_TO_BASE").unwrap(),
            issued_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_broadcast_delivers_to_subscriber() {
        let bus = BroadcastPublisher::new(16);
        let mut rx = bus.subscribe();

        let command = control("DRN-1");
        bus.publish_command(&command).await.unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received.topic(), "vehicle.DRN-1.command");
        assert_eq!(received, BusMessage::Control(command));
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_fails() {
        let bus = BroadcastPublisher::new(4);
        let err = bus.publish_command(&control("DRN-9")).await.unwrap_err();
        assert_eq!(
            err,
            PublishError::NoSubscribers {
                topic: "vehicle.DRN-9.command".to_string()
            }
        );
    }

    #[test]
    fn test_execution_reaches_every_subscriber() {
        let bus = BroadcastPublisher::new(4);
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        let command = ExecutionCommand::new(Uuid::new_v4(), vec![], 1);
        tokio_test::block_on(bus.publish_execution(&command)).unwrap();

        for rx in [&mut first, &mut second] {
            let received = rx.try_recv().unwrap();
            assert_eq!(received.topic(), EXECUTION_TOPIC);
            assert_eq!(received, BusMessage::Execution(command.clone()));
        }
    }

    #[test]
    fn test_envelope_encoding() {
        let message = BusMessage::Execution(ExecutionCommand::new(Uuid::new_v4(), vec![], 2));
        let json: serde_json::Value = serde_json::from_str(&message.to_json().unwrap()).unwrap();
        assert_eq!(json["kind"], "EXECUTION");
        assert_eq!(json["payload"]["priority"], 2);
        assert!(json["payload"]["vehicles"].as_array().unwrap().is_empty());
    }
}
