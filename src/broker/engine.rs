//! Local broker engine
//!
//! In-process implementation of `BrokerBinding` responsible for:
//! - tracking which consumers are attached to which topic
//! - giving each consumer its own bounded FIFO queue drained by a dedicated task
//! - fanning published messages out to every queue of the topic
//! - optionally retaining messages via `Persistence` and replaying them to
//!   newly attached consumers
//!
//! Concurrency notes:
//! - The broker state sits behind a `std::sync::Mutex` that is never held
//!   across an `.await`; publishing only enqueues and returns.
//! - Removing a consumer closes its queue. Messages already queued are still
//!   delivered; an in-flight delivery is never interrupted.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};

use crate::broker::binding::{BrokerBinding, Consumer};
use crate::broker::message::HubMessage;
use crate::broker::topic::{ConsumerId, Topic};
use crate::config::BrokerSettings;
use crate::persistence::Persistence;
use crate::utils::error::BrokerError;

#[derive(Debug)]
struct ConsumerQueue {
    topic: String,
    sender: mpsc::Sender<HubMessage>,
}

#[derive(Debug, Default)]
struct BrokerState {
    topics: HashMap<String, Topic>,
    consumers: HashMap<ConsumerId, ConsumerQueue>,
}

#[derive(Debug)]
pub struct LocalBroker {
    state: Mutex<BrokerState>,
    next_id: AtomicU64,
    queue_capacity: usize,
    persistence: Option<Persistence>,
    replay_on_subscribe: bool,
}

impl Default for LocalBroker {
    fn default() -> Self {
        Self::new(Self::DEFAULT_QUEUE_CAPACITY)
    }
}

impl LocalBroker {
    pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

    pub fn new(queue_capacity: usize) -> Self {
        Self {
            state: Mutex::new(BrokerState::default()),
            next_id: AtomicU64::new(1),
            queue_capacity: queue_capacity.max(1),
            persistence: None,
            replay_on_subscribe: false,
        }
    }

    /// Retain published messages in `persistence`; replay them to new
    /// consumers when `replay_on_subscribe` is set.
    pub fn with_persistence(mut self, persistence: Persistence, replay_on_subscribe: bool) -> Self {
        self.persistence = Some(persistence);
        self.replay_on_subscribe = replay_on_subscribe;
        self
    }

    pub fn from_settings(settings: &BrokerSettings) -> Result<Self, BrokerError> {
        let broker = Self::new(settings.queue_capacity);
        match &settings.persistence_path {
            Some(path) => {
                // TTLs past i64 range never expire anything
                let ttl = i64::try_from(settings.message_ttl_secs).unwrap_or(i64::MAX);
                let persistence = Persistence::new(
                    path,
                    Some(ttl),
                    Some(settings.max_messages_per_topic),
                )?;
                Ok(broker.with_persistence(persistence, settings.replay_on_subscribe))
            }
            None => Ok(broker),
        }
    }

    pub fn consumer_count(&self) -> usize {
        self.lock().map(|state| state.consumers.len()).unwrap_or(0)
    }

    pub fn topic_consumer_count(&self, topic: &str) -> usize {
        self.lock()
            .ok()
            .and_then(|state| state.topics.get(topic).map(|t| t.consumers.len()))
            .unwrap_or(0)
    }

    fn lock(&self) -> Result<MutexGuard<'_, BrokerState>, BrokerError> {
        self.state
            .lock()
            .map_err(|_| BrokerError::Unavailable("broker state poisoned".to_string()))
    }

    fn replay(&self, topic: &str, sender: &mpsc::Sender<HubMessage>) {
        let Some(persistence) = self.persistence.as_ref().filter(|_| self.replay_on_subscribe)
        else {
            return;
        };
        let stored = match persistence.load_messages(topic) {
            Ok(stored) => stored,
            Err(e) => {
                warn!(topic = %topic, "Failed to load retained messages: {e}");
                return;
            }
        };
        for message in stored {
            match message.into_message() {
                Ok(message) => {
                    if sender.try_send(message).is_err() {
                        warn!(topic = %topic, "Replay queue full, remaining messages skipped");
                        return;
                    }
                }
                Err(e) => warn!(topic = %topic, "Skipping undecodable retained message: {e}"),
            }
        }
    }
}

#[async_trait]
impl BrokerBinding for LocalBroker {
    async fn bootstrap(&self) -> Result<(), BrokerError> {
        drop(self.lock()?);
        if let Some(persistence) = &self.persistence {
            persistence.ping()?;
        }
        debug!("Local broker bootstrapped");
        Ok(())
    }

    async fn publish(&self, topic: &str, message: HubMessage) -> Result<usize, BrokerError> {
        if let Some(persistence) = &self.persistence {
            if let Err(e) = persistence.store_message(&message) {
                warn!(topic = %topic, "Failed to retain message: {e}");
            }
        }

        let state = self.lock()?;
        let Some(entry) = state.topics.get(topic) else {
            debug!(topic = %topic, "No consumers for topic");
            return Ok(0);
        };

        let mut queued = 0;
        for id in &entry.consumers {
            let Some(queue) = state.consumers.get(id) else {
                warn!(consumer = id, "No queue registered for consumer");
                continue;
            };
            match queue.sender.try_send(message.clone()) {
                Ok(()) => queued += 1,
                Err(TrySendError::Full(_)) => {
                    warn!(consumer = id, topic = %topic, "Consumer queue full, message dropped")
                }
                Err(TrySendError::Closed(_)) => {
                    warn!(consumer = id, topic = %topic, "Consumer queue closed")
                }
            }
        }
        Ok(queued)
    }

    async fn add_consumer(
        &self,
        topic: &str,
        consumer: Arc<dyn Consumer>,
    ) -> Result<ConsumerId, BrokerError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, mut receiver) = mpsc::channel::<HubMessage>(self.queue_capacity);

        tokio::spawn(async move {
            while let Some(message) = receiver.recv().await {
                consumer.on_message(message).await;
            }
            debug!(consumer = id, "Consumer queue drained");
        });

        self.replay(topic, &sender);

        let mut state = self.lock()?;
        state
            .topics
            .entry(topic.to_string())
            .or_insert_with(|| Topic::new(topic))
            .attach(id);
        state.consumers.insert(
            id,
            ConsumerQueue {
                topic: topic.to_string(),
                sender,
            },
        );
        debug!(consumer = id, topic = %topic, "Consumer attached");
        Ok(id)
    }

    async fn remove_consumer(&self, consumer: ConsumerId) -> Result<(), BrokerError> {
        let mut state = self.lock()?;
        let queue = state
            .consumers
            .remove(&consumer)
            .ok_or(BrokerError::UnknownConsumer(consumer))?;

        let now_empty = match state.topics.get_mut(&queue.topic) {
            Some(topic) => {
                topic.detach(consumer);
                topic.is_empty()
            }
            None => false,
        };
        if now_empty {
            state.topics.remove(&queue.topic);
        }
        debug!(consumer, topic = %queue.topic, "Consumer detached");
        Ok(())
    }

    async fn release(&self) {
        if let Ok(mut state) = self.lock() {
            let released = state.consumers.len();
            state.consumers.clear();
            state.topics.clear();
            info!(released, "Local broker released all consumers");
        }
    }
}
