//! Error taxonomy for connection, subscription and publish operations
//!
//! Lifecycle errors are returned to the direct caller so it can decide
//! whether a failure is fatal. Dispatch-time conditions (no matching
//! subscription, handler failure) are logged at the router boundary instead
//! of surfacing here, because no caller waits synchronously for inbound
//! messages.

use thiserror::Error;

/// Failures establishing or tearing down the broker connection.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("broker unreachable at {endpoint}")]
    Unreachable { endpoint: String },

    #[error("no connection acknowledgment from {endpoint} within {timeout_ms}ms")]
    Timeout { endpoint: String, timeout_ms: u64 },

    #[error("invalid broker endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("transport error")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Failures registering a topic pattern.
#[derive(Debug, Error)]
pub enum SubscriptionError {
    #[error("cannot register '{pattern}' while disconnected")]
    NotConnected { pattern: String },

    #[error("invalid topic pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("broker rejected subscription to '{pattern}'")]
    Rejected {
        pattern: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Failures delivering an outbound message or acknowledging an inbound one.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("not connected and automatic reconnection is disabled")]
    NotConnected,

    #[error("delivery of message {message_id} to '{topic}' failed")]
    Delivery {
        topic: String,
        message_id: u32,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("acknowledgment of message {message_id} failed")]
    Acknowledge {
        message_id: u32,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}
