//! Pub/sub bus boundary used for cross-node hub fan-out.
//!
//! The hub only ever sees this trait; wiring a concrete broker (Redis,
//! NATS, ...) is an integration concern. [`InMemoryBus`] serves single
//! process deployments and tests.

use crate::models::error::GatewayError;
use ahash::AHashMap;
use futures::future::BoxFuture;
use log::debug;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Byte-oriented publish/subscribe transport.
pub trait PubSubBus: Send + Sync {
    fn publish<'a>(&'a self, topic: &'a str, payload: Vec<u8>) -> BoxFuture<'a, Result<(), GatewayError>>;
    /// Subscribes to a topic; the receiver yields raw payloads until the bus
    /// is dropped.
    fn subscribe<'a>(&'a self, topic: &'a str) -> BoxFuture<'a, mpsc::Receiver<Vec<u8>>>;
}

const SUBSCRIBER_BUFFER: usize = 256;

/// Process-local [`PubSubBus`] backed by per-topic fan-out channels.
///
/// Slow subscribers drop messages rather than stall publishers, matching the
/// delivery guarantees of the external buses this stands in for.
#[derive(Default)]
pub struct InMemoryBus {
    topics: Mutex<AHashMap<String, Vec<mpsc::Sender<Vec<u8>>>>>,
}

impl InMemoryBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

impl PubSubBus for InMemoryBus {
    fn publish<'a>(&'a self, topic: &'a str, payload: Vec<u8>) -> BoxFuture<'a, Result<(), GatewayError>> {
        Box::pin(async move {
            let mut topics = self.topics.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            if let Some(subscribers) = topics.get_mut(topic) {
                subscribers.retain(|tx| !tx.is_closed());
                for tx in subscribers.iter() {
                    if tx.try_send(payload.clone()).is_err() {
                        debug!("dropping bus message on {}: subscriber lagging", topic);
                    }
                }
            }
            Ok(())
        })
    }

    fn subscribe<'a>(&'a self, topic: &'a str) -> BoxFuture<'a, mpsc::Receiver<Vec<u8>>> {
        Box::pin(async move {
            let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
            self.topics
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .entry(topic.to_string())
                .or_default()
                .push(tx);
            rx
        })
    }
}
