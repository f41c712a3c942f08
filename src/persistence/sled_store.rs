//! Retained-message store backed by `sled`
//!
//! The local broker can keep recently published messages per topic so that a
//! newly attached consumer is able to replay them. Each message key is
//! prefixed with its timestamp to allow chronological scans and TTL cleanup.
//!
//! Configuration options supported:
//! - `ttl_seconds`: optional time-to-live for messages (older messages are
//!   removed during load)
//! - `max_messages_per_topic`: optional cap per topic; when exceeded the
//!   oldest messages are removed.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sled::Db;
use tracing::warn;

use crate::broker::HubMessage;
use crate::transport::Content;
use crate::utils::error::{BrokerError, DispatchError};

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct StoredMessage {
    pub topic: String,
    pub content_type: String,
    pub payload: Vec<u8>,
    pub message_id: String,
    pub timestamp: i64,
}

impl StoredMessage {
    pub fn from_message(message: &HubMessage) -> Self {
        Self {
            topic: message.topic.clone(),
            content_type: message.content.content_type().to_string(),
            payload: message.content.encode().to_vec(),
            message_id: message.message_id.clone(),
            timestamp: message.timestamp,
        }
    }

    pub fn into_message(self) -> Result<HubMessage, DispatchError> {
        let content = Content::decode(&self.content_type, &self.payload)?;
        Ok(HubMessage {
            topic: self.topic,
            content,
            message_id: self.message_id,
            timestamp: self.timestamp,
        })
    }
}

#[derive(Clone)]
pub struct Persistence {
    db: Db,
    ttl_seconds: Option<i64>,
    max_messages_per_topic: Option<usize>,
}

impl Persistence {
    /// Open or create a sled database at `path` with the given retention policy.
    pub fn new(
        path: &str,
        ttl_seconds: Option<i64>,
        max_messages_per_topic: Option<usize>,
    ) -> Result<Self, BrokerError> {
        let db = sled::open(path).map_err(|e| BrokerError::Persistence(e.to_string()))?;
        Ok(Self {
            db,
            ttl_seconds,
            max_messages_per_topic,
        })
    }

    /// Confirms the database still answers.
    pub fn ping(&self) -> Result<(), BrokerError> {
        self.db
            .tree_names()
            .first()
            .map(|_| ())
            .ok_or_else(|| BrokerError::Persistence("database has no default tree".to_string()))
    }

    /// Store a message in its topic's tree. Keys are timestamp-prefixed so
    /// iteration yields messages in chronological order.
    pub fn store_message(&self, message: &HubMessage) -> Result<(), BrokerError> {
        let stored = StoredMessage::from_message(message);
        let serialized =
            serde_json::to_vec(&stored).map_err(|e| BrokerError::Persistence(e.to_string()))?;

        let topic_tree = self
            .db
            .open_tree(&stored.topic)
            .map_err(|e| BrokerError::Persistence(e.to_string()))?;

        let key = format!("{:020}_{}", stored.timestamp, stored.message_id);
        topic_tree
            .insert(key.as_bytes(), serialized)
            .map_err(|e| BrokerError::Persistence(e.to_string()))?;

        if let Some(max) = self.max_messages_per_topic {
            let total_messages = topic_tree.len();
            if total_messages > max {
                let excess = total_messages - max;

                let keys_to_delete: Vec<_> = topic_tree
                    .iter()
                    .take(excess)
                    .filter_map(|entry| entry.ok().map(|(k, _)| k))
                    .collect();

                for key in keys_to_delete {
                    if let Err(e) = topic_tree.remove(key) {
                        warn!(topic = %stored.topic, "Failed to remove old message: {e}");
                    }
                }
            }
        }
        Ok(())
    }

    /// Load retained messages for a topic honoring TTL and retention policy.
    pub fn load_messages(&self, topic: &str) -> Result<Vec<StoredMessage>, BrokerError> {
        let topic_tree = self
            .db
            .open_tree(topic)
            .map_err(|e| BrokerError::Persistence(e.to_string()))?;
        self.cleanup_old_messages(&topic_tree);

        Ok(topic_tree
            .iter()
            .filter_map(|res| res.ok())
            .filter_map(|(_, val)| serde_json::from_slice(&val).ok())
            .collect())
    }

    /// Remove messages older than the TTL from a single topic tree.
    fn cleanup_old_messages(&self, topic_tree: &sled::Tree) {
        let Some(ttl) = self.ttl_seconds else {
            return;
        };
        let expiry_time = Utc::now()
            .timestamp_millis()
            .saturating_sub(ttl.saturating_mul(1000));

        let old_keys: Vec<_> = topic_tree
            .iter()
            .filter_map(|res| res.ok())
            .filter_map(|(key_bytes, _)| {
                let key_str = std::str::from_utf8(&key_bytes).ok()?;
                let (ts_str, _) = key_str.split_once('_')?;
                let ts = ts_str.parse::<i64>().ok()?;
                (ts < expiry_time).then_some(key_bytes)
            })
            .collect();

        for key in old_keys {
            if let Err(e) = topic_tree.remove(key) {
                warn!("Failed to remove expired message: {e}");
            }
        }
    }
}

impl std::fmt::Debug for Persistence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Persistence")
            .field("db", &"sled::Db")
            .field("ttl_seconds", &self.ttl_seconds)
            .field("max_messages_per_topic", &self.max_messages_per_topic)
            .finish()
    }
}
