use uuid::Uuid;

use crate::transport::Content;

/// A content update travelling from the hub through the broker binding to
/// every consumer attached to `topic`.
///
/// - `message_id`: opaque unique id, generated on construction
/// - `timestamp`: milliseconds since UNIX epoch at publish time
#[derive(Debug, Clone, PartialEq)]
pub struct HubMessage {
    pub topic: String,
    pub content: Content,
    pub message_id: String,
    pub timestamp: i64,
}

impl HubMessage {
    pub fn new(topic: &str, content: Content) -> Self {
        Self {
            topic: topic.to_string(),
            content,
            message_id: Uuid::new_v4().to_string(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }
}
