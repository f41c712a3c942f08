//! The narrow interface the hub uses to reach its message broker.
//!
//! The hub owns subscriptions; the broker owns queues. Every live
//! subscription is bridged to exactly one consumer registered here.

use std::sync::Arc;

use async_trait::async_trait;

use crate::broker::message::HubMessage;
use crate::broker::topic::ConsumerId;
use crate::utils::error::BrokerError;

/// Receives messages fanned out to one topic.
///
/// Deliveries to a single consumer arrive in broker order, one at a time.
#[async_trait]
pub trait Consumer: Send + Sync {
    async fn on_message(&self, message: HubMessage);
}

#[async_trait]
pub trait BrokerBinding: Send + Sync {
    /// One round-trip proving the broker is reachable. Called once per hub start.
    async fn bootstrap(&self) -> Result<(), BrokerError>;

    /// Fan `message` out to every consumer of `topic`. Returns how many
    /// consumers it was queued for; does not wait for deliveries.
    async fn publish(&self, topic: &str, message: HubMessage) -> Result<usize, BrokerError>;

    async fn add_consumer(
        &self,
        topic: &str,
        consumer: Arc<dyn Consumer>,
    ) -> Result<ConsumerId, BrokerError>;

    async fn remove_consumer(&self, consumer: ConsumerId) -> Result<(), BrokerError>;

    /// Drop every consumer. Called when the hub stops.
    async fn release(&self);
}
