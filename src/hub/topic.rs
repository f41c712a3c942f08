use std::collections::HashSet;

use crate::utils::error::RegistryError;

/// The set of topics publishers have registered with the hub.
///
/// Registration is advisory: the hub consults it only when its
/// topic-registration-required flag is set.
#[derive(Debug, Default)]
pub struct TopicRegistry {
    topics: HashSet<String>,
}

impl TopicRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `topic`. Empty (or whitespace-only) topics and duplicates are rejected.
    pub fn register(&mut self, topic: &str) -> Result<(), RegistryError> {
        if topic.trim().is_empty() {
            return Err(RegistryError::InvalidTopic);
        }
        if !self.topics.insert(topic.to_string()) {
            return Err(RegistryError::DuplicateTopic {
                topic: topic.to_string(),
            });
        }
        Ok(())
    }

    /// Removes `topic`, which must have been registered.
    pub fn unregister(&mut self, topic: &str) -> Result<(), RegistryError> {
        if !self.topics.remove(topic) {
            return Err(RegistryError::UnknownTopic {
                topic: topic.to_string(),
            });
        }
        Ok(())
    }

    pub fn is_registered(&self, topic: &str) -> bool {
        self.topics.contains(topic)
    }

    /// Registered topics in lexical order.
    pub fn list(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.topics.iter().cloned().collect();
        topics.sort();
        topics
    }

    pub fn clear(&mut self) {
        self.topics.clear();
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }
}
