//! Mock implementations for testing
//!
//! Provides a mock [`Session`] so router and dispatch behavior can be tested
//! without a broker. Records every transport call and lets tests inject
//! inbound messages through the attached dispatcher.

use crate::error::{PublishError, SubscriptionError};
use crate::transport::{InboundMessage, QoS, Session};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use tokio::sync::{mpsc, Mutex};

/// One recorded outbound publish: topic, payload, message id, qos.
pub type PublishedMessage = (String, Vec<u8>, u32, QoS);

/// Mock broker session for testing
#[derive(Default)]
pub struct MockSession {
    connected: AtomicBool,
    fail_subscribe: AtomicBool,
    fail_publish: AtomicBool,
    subscribed: Arc<Mutex<Vec<String>>>,
    published: Arc<Mutex<Vec<PublishedMessage>>>,
    acknowledged: Arc<Mutex<Vec<(u32, QoS)>>>,
    dispatcher: StdMutex<Option<mpsc::Sender<InboundMessage>>>,
}

impl MockSession {
    /// A connected session that accepts everything.
    pub fn new() -> Self {
        let session = Self::default();
        session.connected.store(true, Ordering::SeqCst);
        session
    }

    /// A session that reports itself disconnected.
    pub fn disconnected() -> Self {
        Self::default()
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn fail_subscriptions(&self, fail: bool) {
        self.fail_subscribe.store(fail, Ordering::SeqCst);
    }

    pub fn fail_publishes(&self, fail: bool) {
        self.fail_publish.store(fail, Ordering::SeqCst);
    }

    pub async fn subscriptions(&self) -> Vec<String> {
        self.subscribed.lock().await.clone()
    }

    pub async fn published(&self) -> Vec<PublishedMessage> {
        self.published.lock().await.clone()
    }

    pub async fn acknowledgments(&self) -> Vec<(u32, QoS)> {
        self.acknowledged.lock().await.clone()
    }

    /// Deliver a message through the attached dispatcher, as the transport
    /// would. Panics if no dispatcher is attached or the channel is closed.
    pub async fn deliver(&self, topic: &str, payload: &[u8], message_id: u32, qos: QoS) {
        let sender = self
            .dispatcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .expect("no dispatcher attached to MockSession");
        sender
            .send(InboundMessage {
                topic: topic.to_string(),
                payload: payload.to_vec(),
                message_id,
                qos,
            })
            .await
            .expect("dispatch channel closed");
    }
}

#[async_trait]
impl Session for MockSession {
    async fn subscribe(&self, pattern: &str, _qos: QoS) -> Result<(), SubscriptionError> {
        if self.fail_subscribe.load(Ordering::SeqCst) {
            return Err(SubscriptionError::Rejected {
                pattern: pattern.to_string(),
                source: "mock subscription failure".into(),
            });
        }
        self.subscribed.lock().await.push(pattern.to_string());
        Ok(())
    }

    async fn publish(
        &self,
        topic: &str,
        payload: &[u8],
        message_id: u32,
        qos: QoS,
    ) -> Result<(), PublishError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(PublishError::NotConnected);
        }
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(PublishError::Delivery {
                topic: topic.to_string(),
                message_id,
                source: "mock publish failure".into(),
            });
        }
        self.published
            .lock()
            .await
            .push((topic.to_string(), payload.to_vec(), message_id, qos));
        Ok(())
    }

    async fn acknowledge(&self, message_id: u32, qos: QoS) -> Result<(), PublishError> {
        self.acknowledged.lock().await.push((message_id, qos));
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn set_dispatcher(&self, sender: mpsc::Sender<InboundMessage>) {
        *self
            .dispatcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(sender);
    }
}
