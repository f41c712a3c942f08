//! Subscription bookkeeping
//!
//! A `Subscription` is identified solely by its `(topic, callback)` pair;
//! lease, secret and creation time are metadata. The registry holds at most
//! one entry per pair and remembers the broker consumer bound to it.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::broker::ConsumerId;

/// Caller-supplied metadata for a new subscription.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionDetails {
    /// `None` means the hub's default lease.
    pub lease_seconds: Option<u64>,
    pub secret: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Subscription {
    pub topic: String,
    pub callback: String,
    /// Zero means the subscription never expires.
    pub lease_seconds: u64,
    pub created_at: DateTime<Utc>,
    pub secret: Option<String>,
}

impl Subscription {
    pub fn new(topic: &str, callback: &str, lease_seconds: u64, secret: Option<String>) -> Self {
        Self {
            topic: topic.to_string(),
            callback: callback.to_string(),
            lease_seconds,
            created_at: Utc::now(),
            secret,
        }
    }

    pub fn key(&self) -> SubscriptionKey {
        SubscriptionKey::new(&self.topic, &self.callback)
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        if self.lease_seconds == 0 {
            return None;
        }
        // leases too long to represent never expire
        let lease = Duration::try_seconds(i64::try_from(self.lease_seconds).ok()?)?;
        self.created_at.checked_add_signed(lease)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().is_some_and(|expiry| now >= expiry)
    }
}

impl PartialEq for Subscription {
    fn eq(&self, other: &Self) -> bool {
        self.topic == other.topic && self.callback == other.callback
    }
}

impl Eq for Subscription {}

impl Hash for Subscription {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.topic.hash(state);
        self.callback.hash(state);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionKey {
    pub topic: String,
    pub callback: String,
}

impl SubscriptionKey {
    pub fn new(topic: &str, callback: &str) -> Self {
        Self {
            topic: topic.to_string(),
            callback: callback.to_string(),
        }
    }
}

/// Public view of a subscriber, as returned by `Hub::list_subscribers`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriberInfo {
    pub callback: String,
    pub lease_seconds: u64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct SubscriptionEntry {
    pub subscription: Subscription,
    pub consumer: ConsumerId,
}

#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    entries: HashMap<SubscriptionKey, SubscriptionEntry>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `subscription`, returning the entry it replaced, if any.
    pub fn insert(
        &mut self,
        subscription: Subscription,
        consumer: ConsumerId,
    ) -> Option<SubscriptionEntry> {
        self.entries.insert(
            subscription.key(),
            SubscriptionEntry {
                subscription,
                consumer,
            },
        )
    }

    pub fn remove(&mut self, topic: &str, callback: &str) -> Option<SubscriptionEntry> {
        self.entries.remove(&SubscriptionKey::new(topic, callback))
    }

    pub fn get(&self, topic: &str, callback: &str) -> Option<&SubscriptionEntry> {
        self.entries.get(&SubscriptionKey::new(topic, callback))
    }

    /// Subscribers of `topic`, ordered by callback.
    pub fn subscribers(&self, topic: &str) -> Vec<SubscriberInfo> {
        let mut subscribers: Vec<SubscriberInfo> = self
            .entries
            .values()
            .filter(|entry| entry.subscription.topic == topic)
            .map(|entry| SubscriberInfo {
                callback: entry.subscription.callback.clone(),
                lease_seconds: entry.subscription.lease_seconds,
                created_at: entry.subscription.created_at,
            })
            .collect();
        subscribers.sort_by(|a, b| a.callback.cmp(&b.callback));
        subscribers
    }

    pub fn expired(&self, now: DateTime<Utc>) -> Vec<SubscriptionKey> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.subscription.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect()
    }

    pub fn drain(&mut self) -> Vec<SubscriptionEntry> {
        self.entries.drain().map(|(_, entry)| entry).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
