//! Pure routing decisions for MQTT events
//!
//! Classifies rumqttc event-loop output into the handful of cases the
//! supervisor's event task acts on. Keeping the classification separate from
//! the I/O keeps it unit-testable against constructed packets.

use rumqttc::{Event, Packet, Publish};

/// What the event task should do with one polled event.
#[derive(Debug, Clone)]
pub enum EventRoute {
    /// Broker acknowledged the connection; ready to publish/subscribe
    ConnectionAcknowledged,
    /// An application message arrived on a subscribed topic
    MessageReceived(Publish),
    /// Broker closed the session
    Disconnected,
    /// Subscription confirmed by the broker
    SubscriptionConfirmed { packet_id: u16 },
    /// Keep-alive and other infrastructure traffic, logged at debug only
    Infrastructure(String),
    /// Outgoing packet, handled by rumqttc itself
    Outgoing,
}

/// Classify one rumqttc event.
pub fn route_event(event: &Event) -> EventRoute {
    match event {
        Event::Incoming(incoming) => match incoming {
            Packet::ConnAck(_) => EventRoute::ConnectionAcknowledged,
            Packet::Publish(publish) => EventRoute::MessageReceived(publish.clone()),
            Packet::Disconnect => EventRoute::Disconnected,
            Packet::SubAck(suback) => EventRoute::SubscriptionConfirmed {
                packet_id: suback.pkid,
            },
            other => EventRoute::Infrastructure(format!("{other:?}")),
        },
        Event::Outgoing(_) => EventRoute::Outgoing,
    }
}
