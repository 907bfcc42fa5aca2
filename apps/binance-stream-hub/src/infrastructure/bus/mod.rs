//! Redis Pub/Sub Broker
//!
//! Implements the [`TopicBus`] port over Redis pub/sub. Each subscribed
//! topic gets its own pub/sub connection and exactly one listener task
//! that copies the topic's messages into the shared inbound queue; the
//! registry drains that queue on the other side.
//!
//! Subscribe and unsubscribe are idempotent. Errors from the wire calls
//! are returned to the caller rather than swallowed — the registry logs
//! them and relies on the next interest transition for another attempt.

use std::collections::HashMap;

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{BusError, BusMessage, TopicBus};
use crate::infrastructure::config::BusSettings;

// =============================================================================
// Broker
// =============================================================================

struct TopicListener {
    sink: redis::aio::PubSubSink,
    stop: CancellationToken,
}

/// Redis-backed topic broker.
pub struct RedisBroker {
    client: redis::Client,
    inbound_tx: parking_lot::Mutex<Option<mpsc::Sender<BusMessage>>>,
    listeners: tokio::sync::Mutex<HashMap<String, TopicListener>>,
    cancel: CancellationToken,
    tasks: tokio_util::task::TaskTracker,
}

impl RedisBroker {
    /// Create a broker and the inbound queue it multiplexes into.
    ///
    /// Opening the client only validates the URL; connections are made
    /// per subscription.
    pub fn new(
        settings: &BusSettings,
        cancel: CancellationToken,
    ) -> Result<(Self, mpsc::Receiver<BusMessage>), BusError> {
        let client = redis::Client::open(settings.redis_url.as_str()).map_err(|e| {
            BusError::Connection {
                reason: e.to_string(),
            }
        })?;

        let (inbound_tx, inbound_rx) = mpsc::channel(settings.inbound_capacity);
        let broker = Self {
            client,
            inbound_tx: parking_lot::Mutex::new(Some(inbound_tx)),
            listeners: tokio::sync::Mutex::new(HashMap::new()),
            cancel,
            tasks: tokio_util::task::TaskTracker::new(),
        };
        Ok((broker, inbound_rx))
    }

    /// Listener task: copy one topic's messages into the inbound queue.
    async fn listen(
        mut stream: redis::aio::PubSubStream,
        inbound_tx: mpsc::Sender<BusMessage>,
        topic: String,
        stop: CancellationToken,
    ) {
        loop {
            tokio::select! {
                () = stop.cancelled() => {
                    tracing::debug!(topic = %topic, "Topic listener stopped");
                    return;
                }
                msg = stream.next() => {
                    let Some(msg) = msg else {
                        tracing::warn!(topic = %topic, "Pub/sub stream closed");
                        return;
                    };
                    let payload: String = match msg.get_payload() {
                        Ok(payload) => payload,
                        Err(e) => {
                            tracing::warn!(topic = %topic, error = %e, "Unreadable bus payload dropped");
                            continue;
                        }
                    };
                    let message = BusMessage {
                        topic: msg.get_channel_name().to_string(),
                        payload,
                    };
                    match inbound_tx.try_send(message) {
                        Ok(()) => {}
                        Err(mpsc::error::TrySendError::Full(_)) => {
                            metrics::counter!("stream_hub_bus_messages_dropped_total")
                                .increment(1);
                            tracing::warn!(topic = %topic, "Inbound queue full, bus message dropped");
                        }
                        Err(mpsc::error::TrySendError::Closed(_)) => {
                            tracing::debug!(topic = %topic, "Inbound queue closed");
                            return;
                        }
                    }
                }
            }
        }
    }

    /// Number of topics with an active listener.
    pub async fn active_subscriptions(&self) -> usize {
        self.listeners.lock().await.len()
    }
}

#[async_trait]
impl TopicBus for RedisBroker {
    async fn subscribe(&self, topic: &str) -> Result<(), BusError> {
        let mut listeners = self.listeners.lock().await;
        if listeners.contains_key(topic) {
            tracing::debug!(topic, "Already subscribed");
            return Ok(());
        }

        let Some(inbound_tx) = self.inbound_tx.lock().clone() else {
            return Err(BusError::Connection {
                reason: "broker closed".to_string(),
            });
        };

        let mut pubsub =
            self.client
                .get_async_pubsub()
                .await
                .map_err(|e| BusError::Connection {
                    reason: e.to_string(),
                })?;

        pubsub
            .subscribe(topic)
            .await
            .map_err(|e| BusError::Subscribe {
                topic: topic.to_string(),
                reason: e.to_string(),
            })?;

        let (sink, stream) = pubsub.split();
        let stop = self.cancel.child_token();
        self.tasks.spawn(Self::listen(
            stream,
            inbound_tx,
            topic.to_string(),
            stop.clone(),
        ));

        listeners.insert(topic.to_string(), TopicListener { sink, stop });
        metrics::gauge!("stream_hub_bus_subscriptions").set(listeners.len() as f64);
        tracing::info!(topic, "Subscribed on bus");
        Ok(())
    }

    async fn unsubscribe(&self, topic: &str) -> Result<(), BusError> {
        let mut listeners = self.listeners.lock().await;
        let Some(mut listener) = listeners.remove(topic) else {
            tracing::debug!(topic, "Not subscribed, unsubscribe is a no-op");
            return Ok(());
        };
        metrics::gauge!("stream_hub_bus_subscriptions").set(listeners.len() as f64);
        drop(listeners);

        // The listener stops regardless of whether the wire call works.
        listener.stop.cancel();

        listener
            .sink
            .unsubscribe(topic)
            .await
            .map_err(|e| BusError::Unsubscribe {
                topic: topic.to_string(),
                reason: e.to_string(),
            })?;

        tracing::info!(topic, "Unsubscribed from bus");
        Ok(())
    }

    async fn close(&self) {
        let mut listeners = self.listeners.lock().await;
        for (topic, mut listener) in listeners.drain() {
            listener.stop.cancel();
            if let Err(e) = listener.sink.unsubscribe(&topic).await {
                tracing::warn!(topic = %topic, error = %e, "Unsubscribe during shutdown failed");
            }
        }
        drop(listeners);

        // Wait for the listener tasks to exit, then drop the last
        // sender: receivers observe end-of-stream instead of blocking
        // forever.
        self.tasks.close();
        self.tasks.wait().await;
        self.inbound_tx.lock().take();
        tracing::info!("Broker closed");
    }
}

impl std::fmt::Debug for RedisBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisBroker").finish_non_exhaustive()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> BusSettings {
        BusSettings::default()
    }

    #[tokio::test]
    async fn unsubscribe_of_inactive_topic_is_noop() {
        let (broker, _rx) = RedisBroker::new(&settings(), CancellationToken::new()).unwrap();
        broker.unsubscribe("btcusdt").await.unwrap();
        assert_eq!(broker.active_subscriptions().await, 0);
    }

    #[tokio::test]
    async fn close_ends_the_inbound_queue() {
        let (broker, mut rx) = RedisBroker::new(&settings(), CancellationToken::new()).unwrap();
        broker.close().await;
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn subscribe_after_close_fails() {
        let (broker, _rx) = RedisBroker::new(&settings(), CancellationToken::new()).unwrap();
        broker.close().await;
        assert!(broker.subscribe("btcusdt").await.is_err());
    }

    #[test]
    fn invalid_redis_url_is_rejected() {
        let bad = BusSettings {
            redis_url: "not a url".to_string(),
            ..BusSettings::default()
        };
        assert!(RedisBroker::new(&bad, CancellationToken::new()).is_err());
    }
}
