//! mqttlink - minimal MQTT client adapter
//!
//! A thin client-side layer over one persistent broker connection: a
//! supervisor owning the connection/session lifecycle, and a router
//! dispatching inbound messages to per-topic-pattern handlers with explicit
//! at-least-once acknowledgment.
//!
//! # Overview
//!
//! - [`MqttSupervisor`] owns the single connection: connect with an optional
//!   automatic-reconnect policy, publish with retry-while-down semantics,
//!   disconnect gracefully.
//! - [`Router`] maps topic patterns (with `+`/`#` wildcards) to handlers and
//!   acknowledges messages handlers accept; failed or unmatched messages are
//!   logged and left to broker redelivery.
//! - [`codec`] converts payloads to and from JSON without ever raising.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use mqttlink::{BrokerConfig, MqttSupervisor, Router};
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = BrokerConfig {
//!     brokerhost: "broker.example.org".to_string(),
//!     millis_reconnect: 5000,
//!     ..Default::default()
//! };
//!
//! let supervisor = Arc::new(MqttSupervisor::new(&config)?);
//! supervisor.connect().await?;
//!
//! let (router, _dispatch) = Router::attach(supervisor.clone());
//! router
//!     .register("/sensors/+/temperature", |payload: &[u8]| {
//!         std::str::from_utf8(payload).is_ok()
//!     })
//!     .await?;
//!
//! supervisor.publish("/sensors/kitchen/temperature", b"21.5").await?;
//! supervisor.disconnect().await?;
//! # Ok(())
//! # }
//! ```
//!
//! A client that cannot reach its broker at startup does not crash: `connect`
//! returns an error, the failure is logged, and the instance becomes usable
//! once a later `connect` succeeds.

pub mod codec;
pub mod config;
pub mod error;
pub mod observability;
pub mod router;
pub mod testing;
pub mod topic;
pub mod transport;

pub use config::{BrokerConfig, BrokerEndpoint, ConfigError};
pub use error::{ConnectionError, PublishError, SubscriptionError};
pub use router::{MessageHandler, Router};
pub use transport::mqtt::{ConnectionState, MqttSupervisor, ReconnectPolicy};
pub use transport::{InboundMessage, QoS, Session, DEFAULT_QOS};
