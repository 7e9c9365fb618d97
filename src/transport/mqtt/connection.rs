//! Pure connection state and policy logic for the MQTT supervisor
//!
//! Everything here is side-effect free: state and policy types plus the
//! options builder that turns a [`BrokerConfig`] into rumqttc options.

use crate::config::BrokerEndpoint;
use crate::error::ConnectionError;
use rumqttc::MqttOptions;
use std::time::Duration;

/// Connect timeout applied when automatic reconnection is disabled.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

const KEEP_ALIVE: Duration = Duration::from_secs(60);

/// Connection state of a supervisor.
///
/// Owned exclusively by the supervisor; the event-loop task reports observed
/// transitions through the supervisor's state channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No active session. Initial state, and terminal for a cleanly
    /// shut-down client.
    Disconnected,
    /// A connect attempt is in flight, waiting for broker acknowledgment.
    Connecting,
    /// Session acknowledged by the broker and ready for traffic.
    Connected,
}

/// Retry contract applied while the connection is down.
///
/// A zero interval means "never automatically reconnect": publishing while
/// disconnected fails immediately and a lost connection stays lost until an
/// explicit connect. A positive interval enables recovery, with the interval
/// serving as both the connection timeout and the spacing between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    interval: Option<Duration>,
}

impl ReconnectPolicy {
    /// Never reconnect automatically.
    pub fn disabled() -> Self {
        Self { interval: None }
    }

    /// Reconnect with the given spacing between attempts.
    pub fn every(interval: Duration) -> Self {
        Self {
            interval: Some(interval),
        }
    }

    /// Interval in milliseconds; 0 disables reconnection.
    pub fn from_millis(millis: u64) -> Self {
        if millis == 0 {
            Self::disabled()
        } else {
            Self::every(Duration::from_millis(millis))
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.interval.is_some()
    }

    /// Spacing between reconnect attempts, if reconnection is enabled.
    pub fn interval(&self) -> Option<Duration> {
        self.interval
    }

    /// How long a connect call waits for broker acknowledgment.
    pub fn connect_timeout(&self) -> Duration {
        self.interval.unwrap_or(DEFAULT_CONNECT_TIMEOUT)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::disabled()
    }
}

/// Build rumqttc options for one supervisor session.
///
/// Manual acks are enabled so the router controls acknowledgment, and the
/// session is clean: no broker-side state outlives the process.
pub fn configure_mqtt_options(
    client_id: &str,
    endpoint: &BrokerEndpoint,
) -> Result<MqttOptions, ConnectionError> {
    let mut options = MqttOptions::new(client_id, &endpoint.host, endpoint.port);

    match endpoint.protocol.as_str() {
        "tcp" | "mqtt" => {}
        "ssl" | "tls" | "mqtts" => {
            options.set_transport(rumqttc::Transport::tls_with_default_config());
        }
        other => {
            return Err(ConnectionError::InvalidEndpoint(format!(
                "unsupported protocol '{other}'"
            )));
        }
    }

    options.set_keep_alive(KEEP_ALIVE);
    // Volatile session state only: nothing outlives the process
    options.set_clean_session(true);
    // Acks are issued by the dispatch side after a handler accepts a message
    options.set_manual_acks(true);

    Ok(options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BrokerConfig;

    #[test]
    fn test_policy_from_millis() {
        assert!(!ReconnectPolicy::from_millis(0).is_enabled());
        assert_eq!(ReconnectPolicy::from_millis(0).interval(), None);

        let policy = ReconnectPolicy::from_millis(5000);
        assert!(policy.is_enabled());
        assert_eq!(policy.interval(), Some(Duration::from_millis(5000)));
    }

    #[test]
    fn test_interval_doubles_as_connect_timeout() {
        let policy = ReconnectPolicy::from_millis(250);
        assert_eq!(policy.connect_timeout(), Duration::from_millis(250));

        let disabled = ReconnectPolicy::disabled();
        assert_eq!(disabled.connect_timeout(), DEFAULT_CONNECT_TIMEOUT);
    }

    #[test]
    fn test_default_policy_is_disabled() {
        assert_eq!(ReconnectPolicy::default(), ReconnectPolicy::disabled());
    }

    #[test]
    fn test_connection_state_equality() {
        assert_eq!(ConnectionState::Disconnected, ConnectionState::Disconnected);
        assert_ne!(ConnectionState::Connected, ConnectionState::Connecting);
    }

    #[test]
    fn test_configure_mqtt_options_tcp() {
        let config = BrokerConfig::default();
        let options = configure_mqtt_options("test-client", &config.endpoint());
        assert!(options.is_ok());
    }

    #[test]
    fn test_configure_mqtt_options_rejects_unknown_protocol() {
        let config = BrokerConfig {
            brokerprotocol: "ws".to_string(),
            ..Default::default()
        };
        let result = configure_mqtt_options("test-client", &config.endpoint());
        assert!(matches!(result, Err(ConnectionError::InvalidEndpoint(_))));
    }
}
