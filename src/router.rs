//! Topic router: pattern registration and inbound dispatch
//!
//! Maintains the mapping from subscribed topic patterns to handlers, invokes
//! the matching handler for each inbound message, and acknowledges successful
//! processing back to the broker. Registration requires a live connection;
//! nothing is queued for later.
//!
//! Dispatch delivers each message to at most one handler: an exact pattern
//! match wins, otherwise the first matching wildcard pattern in lexicographic
//! order. Messages are consumed sequentially from the transport's channel, so
//! a given handler is never invoked concurrently and delivery within one
//! topic is strictly ordered. Handlers run on the dispatch task and must be
//! short-running or hand work off themselves.

use crate::error::SubscriptionError;
use crate::topic;
use crate::transport::{InboundMessage, Session, DEFAULT_QOS};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, warn};

/// Capacity of the inbound channel between the transport and the dispatcher.
const INBOUND_BUFFER: usize = 32;

/// A predicate over a raw payload. Returns true if the payload was valid and
/// fully processed, which triggers the acknowledgment to the broker.
///
/// Implemented for any `Fn(&[u8]) -> bool`, so closures and handler objects
/// register uniformly.
pub trait MessageHandler: Send + Sync {
    fn handle(&self, payload: &[u8]) -> bool;
}

impl<F> MessageHandler for F
where
    F: Fn(&[u8]) -> bool + Send + Sync,
{
    fn handle(&self, payload: &[u8]) -> bool {
        self(payload)
    }
}

/// Routes inbound messages to handlers registered per topic pattern.
pub struct Router<S: Session> {
    session: Arc<S>,
    handlers: RwLock<HashMap<String, Arc<dyn MessageHandler>>>,
}

impl<S: Session> Router<S> {
    pub fn new(session: Arc<S>) -> Self {
        Self {
            session,
            handlers: RwLock::new(HashMap::new()),
        }
    }

    /// Create a router, wire it to the session's inbound channel and spawn
    /// the dispatch task.
    pub fn attach(session: Arc<S>) -> (Arc<Self>, JoinHandle<()>) {
        let router = Arc::new(Self::new(session));
        let (tx, rx) = mpsc::channel(INBOUND_BUFFER);
        router.session.set_dispatcher(tx);
        let handle = router.clone().spawn_dispatch(rx);
        (router, handle)
    }

    /// Consume inbound messages until the transport side closes the channel.
    pub fn spawn_dispatch(
        self: Arc<Self>,
        mut inbound: mpsc::Receiver<InboundMessage>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(message) = inbound.recv().await {
                self.dispatch(message).await;
            }
        })
    }

    /// Store a pattern → handler mapping and subscribe on the live
    /// connection.
    ///
    /// Must be called while connected; registering the same pattern again
    /// replaces the previous handler. If the broker rejects the subscription
    /// the mapping is rolled back.
    pub async fn register<H>(&self, pattern: &str, handler: H) -> Result<(), SubscriptionError>
    where
        H: MessageHandler + 'static,
    {
        topic::validate_pattern(pattern).map_err(|reason| SubscriptionError::InvalidPattern {
            pattern: pattern.to_string(),
            reason,
        })?;

        if !self.session.is_connected() {
            return Err(SubscriptionError::NotConnected {
                pattern: pattern.to_string(),
            });
        }

        let previous = {
            let mut handlers = self
                .handlers
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            handlers.insert(pattern.to_string(), Arc::new(handler))
        };

        if let Err(e) = self.session.subscribe(pattern, DEFAULT_QOS).await {
            let mut handlers = self
                .handlers
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            match previous {
                Some(old) => handlers.insert(pattern.to_string(), old),
                None => handlers.remove(pattern),
            };
            return Err(e);
        }
        Ok(())
    }

    /// Patterns currently registered, in no particular order.
    pub fn registered_patterns(&self) -> Vec<String> {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// Deliver one inbound message to the matching handler, if any.
    ///
    /// Handler success triggers exactly one acknowledgment with the message's
    /// id and quality-of-service. Handler failure and unmatched topics are
    /// logged and absorbed; the message is then left to the broker's
    /// redelivery semantics.
    pub async fn dispatch(&self, message: InboundMessage) {
        let matched = self.lookup(&message.topic);
        match matched {
            Some((pattern, handler)) => {
                if handler.handle(&message.payload) {
                    if let Err(e) = self
                        .session
                        .acknowledge(message.message_id, message.qos)
                        .await
                    {
                        error!(
                            topic = %message.topic,
                            message_id = message.message_id,
                            error = %e,
                            "failed to acknowledge message"
                        );
                    }
                } else {
                    warn!(topic = %message.topic, pattern = %pattern, "handler for topic failed");
                }
            }
            None => {
                warn!(topic = %message.topic, "no handler registered for topic, dropping message");
            }
        }
    }

    /// Exact pattern match first, then wildcard patterns in lexicographic
    /// order. The handler reference is cloned out so no lock is held while it
    /// runs.
    fn lookup(&self, topic_name: &str) -> Option<(String, Arc<dyn MessageHandler>)> {
        let handlers = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(handler) = handlers.get(topic_name) {
            return Some((topic_name.to_string(), handler.clone()));
        }

        let mut wildcards: Vec<&String> = handlers
            .keys()
            .filter(|pattern| topic::has_wildcards(pattern) && topic::matches(pattern, topic_name))
            .collect();
        wildcards.sort();
        wildcards
            .first()
            .map(|pattern| ((*pattern).clone(), handlers[*pattern].clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::mocks::MockSession;
    use crate::transport::QoS;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn message(topic_name: &str, payload: &[u8], message_id: u32) -> InboundMessage {
        InboundMessage {
            topic: topic_name.to_string(),
            payload: payload.to_vec(),
            message_id,
            qos: QoS::AtLeastOnce,
        }
    }

    #[tokio::test]
    async fn test_register_requires_connection() {
        let session = Arc::new(MockSession::new());
        session.set_connected(false);
        let router = Router::new(session);

        let result = router.register("/my/test/topic", |_: &[u8]| true).await;
        assert!(matches!(
            result,
            Err(SubscriptionError::NotConnected { .. })
        ));
        assert!(router.registered_patterns().is_empty());
    }

    #[tokio::test]
    async fn test_register_rejects_invalid_pattern() {
        let session = Arc::new(MockSession::new());
        let router = Router::new(session);

        let result = router.register("/my/#/topic", |_: &[u8]| true).await;
        assert!(matches!(
            result,
            Err(SubscriptionError::InvalidPattern { .. })
        ));
    }

    #[tokio::test]
    async fn test_register_issues_subscribe() {
        let session = Arc::new(MockSession::new());
        let router = Router::new(session.clone());

        router.register("/my/test/topic", |_: &[u8]| true).await.unwrap();
        assert_eq!(session.subscriptions().await, vec!["/my/test/topic"]);
    }

    #[tokio::test]
    async fn test_register_rolls_back_on_broker_rejection() {
        let session = Arc::new(MockSession::new());
        session.fail_subscriptions(true);
        let router = Router::new(session.clone());

        let result = router.register("/my/test/topic", |_: &[u8]| true).await;
        assert!(matches!(result, Err(SubscriptionError::Rejected { .. })));
        assert!(router.registered_patterns().is_empty());
    }

    #[tokio::test]
    async fn test_reregistering_replaces_handler() {
        let session = Arc::new(MockSession::new());
        let router = Router::new(session.clone());

        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let counter = first.clone();
        router
            .register("/my/test/topic", move |_: &[u8]| {
                counter.fetch_add(1, Ordering::SeqCst);
                true
            })
            .await
            .unwrap();

        let counter = second.clone();
        router
            .register("/my/test/topic", move |_: &[u8]| {
                counter.fetch_add(1, Ordering::SeqCst);
                true
            })
            .await
            .unwrap();

        assert_eq!(router.registered_patterns(), vec!["/my/test/topic"]);

        router.dispatch(message("/my/test/topic", b"msg1", 1)).await;
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_successful_handler_acknowledges() {
        let session = Arc::new(MockSession::new());
        let router = Router::new(session.clone());

        router.register("/my/test/topic", |_: &[u8]| true).await.unwrap();
        router.dispatch(message("/my/test/topic", b"msg1", 17)).await;

        assert_eq!(session.acknowledgments().await, vec![(17, QoS::AtLeastOnce)]);
    }

    #[tokio::test]
    async fn test_failed_handler_does_not_acknowledge() {
        let session = Arc::new(MockSession::new());
        let router = Router::new(session.clone());

        router.register("/my/test/topic", |_: &[u8]| false).await.unwrap();
        router.dispatch(message("/my/test/topic", b"msg1", 17)).await;

        assert!(session.acknowledgments().await.is_empty());
    }

    #[tokio::test]
    async fn test_unmatched_topic_is_dropped() {
        let session = Arc::new(MockSession::new());
        let router = Router::new(session.clone());

        router.register("/my/test/topic", |_: &[u8]| true).await.unwrap();
        router.dispatch(message("/other/topic", b"msg", 3)).await;

        assert!(session.acknowledgments().await.is_empty());
    }

    #[tokio::test]
    async fn test_exact_match_beats_wildcard() {
        let session = Arc::new(MockSession::new());
        let router = Router::new(session.clone());

        let exact_hits = Arc::new(AtomicUsize::new(0));
        let wildcard_hits = Arc::new(AtomicUsize::new(0));

        let counter = exact_hits.clone();
        router
            .register("/my/test/topic", move |_: &[u8]| {
                counter.fetch_add(1, Ordering::SeqCst);
                true
            })
            .await
            .unwrap();
        let counter = wildcard_hits.clone();
        router
            .register("/my/+/topic", move |_: &[u8]| {
                counter.fetch_add(1, Ordering::SeqCst);
                true
            })
            .await
            .unwrap();

        router.dispatch(message("/my/test/topic", b"msg1", 1)).await;
        assert_eq!(exact_hits.load(Ordering::SeqCst), 1);
        assert_eq!(wildcard_hits.load(Ordering::SeqCst), 0);

        router.dispatch(message("/my/test2/topic", b"msg2", 2)).await;
        assert_eq!(exact_hits.load(Ordering::SeqCst), 1);
        assert_eq!(wildcard_hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_wildcard_tie_breaks_deterministically() {
        let session = Arc::new(MockSession::new());
        let router = Router::new(session.clone());

        let plus_first = Arc::new(AtomicUsize::new(0));
        let hash_last = Arc::new(AtomicUsize::new(0));

        // "/my/+/topic" sorts before "/my/test/#"
        let counter = plus_first.clone();
        router
            .register("/my/+/topic", move |_: &[u8]| {
                counter.fetch_add(1, Ordering::SeqCst);
                true
            })
            .await
            .unwrap();
        let counter = hash_last.clone();
        router
            .register("/my/test/#", move |_: &[u8]| {
                counter.fetch_add(1, Ordering::SeqCst);
                true
            })
            .await
            .unwrap();

        router.dispatch(message("/my/test/topic", b"msg", 5)).await;
        assert_eq!(plus_first.load(Ordering::SeqCst), 1);
        assert_eq!(hash_last.load(Ordering::SeqCst), 0);
    }
}
