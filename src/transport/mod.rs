//! Transport layer for broker communication
//!
//! Provides the session abstraction consumed by the router and the MQTT
//! implementation behind it. The [`Session`] trait exists to enable
//! dependency injection and testing; production code uses
//! [`mqtt::MqttSupervisor`].

use crate::error::{PublishError, SubscriptionError};
use tokio::sync::mpsc;

pub mod mqtt;

/// Delivery guarantee level negotiated with the broker per message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QoS {
    /// Fire and forget
    AtMostOnce,
    /// At least once, deduplicated by receiver
    AtLeastOnce,
    /// Exactly once
    ExactlyOnce,
}

/// Default quality-of-service for publishes and subscriptions.
pub const DEFAULT_QOS: QoS = QoS::AtLeastOnce;

impl QoS {
    /// Numeric wire level (0, 1 or 2).
    pub fn as_u8(self) -> u8 {
        match self {
            QoS::AtMostOnce => 0,
            QoS::AtLeastOnce => 1,
            QoS::ExactlyOnce => 2,
        }
    }

    /// Parse a numeric wire level; anything above 2 is rejected.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(QoS::AtMostOnce),
            1 => Some(QoS::AtLeastOnce),
            2 => Some(QoS::ExactlyOnce),
            _ => None,
        }
    }
}

impl From<QoS> for rumqttc::QoS {
    fn from(qos: QoS) -> Self {
        match qos {
            QoS::AtMostOnce => rumqttc::QoS::AtMostOnce,
            QoS::AtLeastOnce => rumqttc::QoS::AtLeastOnce,
            QoS::ExactlyOnce => rumqttc::QoS::ExactlyOnce,
        }
    }
}

impl From<rumqttc::QoS> for QoS {
    fn from(qos: rumqttc::QoS) -> Self {
        match qos {
            rumqttc::QoS::AtMostOnce => QoS::AtMostOnce,
            rumqttc::QoS::AtLeastOnce => QoS::AtLeastOnce,
            rumqttc::QoS::ExactlyOnce => QoS::ExactlyOnce,
        }
    }
}

/// A message delivered by the transport to the dispatch side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Concrete topic the message arrived on (never contains wildcards)
    pub topic: String,
    /// Raw payload bytes
    pub payload: Vec<u8>,
    /// Transport-assigned message identifier, used for acknowledgment
    pub message_id: u32,
    /// Quality-of-service the message was delivered with
    pub qos: QoS,
}

/// Broker session operations consumed by the router and by callers.
///
/// Implemented by [`mqtt::MqttSupervisor`] for production and by
/// [`crate::testing::mocks::MockSession`] for tests.
#[async_trait::async_trait]
pub trait Session: Send + Sync + 'static {
    /// Subscribe to a topic pattern on the live connection.
    async fn subscribe(&self, pattern: &str, qos: QoS) -> Result<(), SubscriptionError>;

    /// Hand an outbound message to the transport for delivery.
    async fn publish(
        &self,
        topic: &str,
        payload: &[u8],
        message_id: u32,
        qos: QoS,
    ) -> Result<(), PublishError>;

    /// Explicitly acknowledge successful processing of an inbound message.
    async fn acknowledge(&self, message_id: u32, qos: QoS) -> Result<(), PublishError>;

    /// Whether the session currently holds an acknowledged connection.
    fn is_connected(&self) -> bool;

    /// Attach the channel inbound messages are delivered on.
    fn set_dispatcher(&self, sender: mpsc::Sender<InboundMessage>);
}
