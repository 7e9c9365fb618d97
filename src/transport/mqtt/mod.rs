//! MQTT implementation of the broker session
//!
//! Split into three focused sub-modules:
//!
//! - [`connection`] - pure connection state, reconnect policy and options
//! - [`events`] - pure routing of transport events
//! - [`supervisor`] - the impure I/O coordination around the rumqttc client

pub mod connection;
pub mod events;
pub mod supervisor;

pub use connection::{ConnectionState, ReconnectPolicy};
pub use events::EventRoute;
pub use supervisor::MqttSupervisor;
