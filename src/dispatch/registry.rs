//! Per-service dispatch configuration.
//!
//! A `DispatchConfig` is built once when a service is attached to a listener
//! and is read-only afterwards, so concurrent requests share it without
//! locking.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::utils::error::ConfigurationError;

/// How a content notification is mapped onto a named resource handler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopicIdentifier {
    /// Every notification goes to the generic notification handler.
    #[default]
    None,
    ByHeader,
    ByPayloadKey,
    ByHeaderAndPayloadKey,
}

impl TopicIdentifier {
    pub fn as_str(&self) -> &'static str {
        match self {
            TopicIdentifier::None => "none",
            TopicIdentifier::ByHeader => "by_header",
            TopicIdentifier::ByPayloadKey => "by_payload_key",
            TopicIdentifier::ByHeaderAndPayloadKey => "by_header_and_payload_key",
        }
    }
}

/// header value -> resource
pub type HeaderResources = BTreeMap<String, String>;
/// payload key -> payload value -> resource
pub type PayloadResources = BTreeMap<String, BTreeMap<String, String>>;
/// header value -> payload key -> payload value -> resource
pub type HeaderPayloadResources = BTreeMap<String, PayloadResources>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub strategy: TopicIdentifier,
    pub topic_header: Option<String>,
    pub header_resources: HeaderResources,
    pub payload_resources: PayloadResources,
    pub header_payload_resources: HeaderPayloadResources,
}

impl DispatchConfig {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn by_header(topic_header: &str) -> Self {
        Self {
            strategy: TopicIdentifier::ByHeader,
            topic_header: Some(topic_header.to_string()),
            ..Self::default()
        }
    }

    pub fn by_payload_key() -> Self {
        Self {
            strategy: TopicIdentifier::ByPayloadKey,
            ..Self::default()
        }
    }

    pub fn by_header_and_payload_key(topic_header: &str) -> Self {
        Self {
            strategy: TopicIdentifier::ByHeaderAndPayloadKey,
            topic_header: Some(topic_header.to_string()),
            ..Self::default()
        }
    }

    pub fn map_header(mut self, header_value: &str, resource: &str) -> Self {
        self.header_resources
            .insert(header_value.to_string(), resource.to_string());
        self
    }

    pub fn map_payload(mut self, key: &str, value: &str, resource: &str) -> Self {
        self.payload_resources
            .entry(key.to_string())
            .or_default()
            .insert(value.to_string(), resource.to_string());
        self
    }

    pub fn map_header_payload(
        mut self,
        header_value: &str,
        key: &str,
        value: &str,
        resource: &str,
    ) -> Self {
        self.header_payload_resources
            .entry(header_value.to_string())
            .or_default()
            .entry(key.to_string())
            .or_default()
            .insert(value.to_string(), resource.to_string());
        self
    }

    /// Checks that the strategy has what it needs: a header name for the
    /// header-based strategies and a non-empty resource map.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let strategy = self.strategy.as_str();
        let needs_header = matches!(
            self.strategy,
            TopicIdentifier::ByHeader | TopicIdentifier::ByHeaderAndPayloadKey
        );
        if needs_header
            && self
                .topic_header
                .as_deref()
                .is_none_or(|name| name.trim().is_empty())
        {
            return Err(ConfigurationError::MissingTopicHeader { strategy });
        }

        match self.strategy {
            TopicIdentifier::None => Ok(()),
            TopicIdentifier::ByHeader if self.header_resources.is_empty() => {
                Err(ConfigurationError::EmptyResourceMap {
                    strategy,
                    map: "header",
                })
            }
            TopicIdentifier::ByPayloadKey if self.payload_resources.is_empty() => {
                Err(ConfigurationError::EmptyResourceMap {
                    strategy,
                    map: "payload key",
                })
            }
            // any one of the three maps is enough for the combined strategy
            TopicIdentifier::ByHeaderAndPayloadKey
                if self.header_resources.is_empty()
                    && self.payload_resources.is_empty()
                    && self.header_payload_resources.is_empty() =>
            {
                Err(ConfigurationError::EmptyResourceMap {
                    strategy,
                    map: "header and payload key",
                })
            }
            _ => Ok(()),
        }
    }

    /// Every resource name the strategy can resolve to, without duplicates.
    pub fn resources(&self) -> Vec<&str> {
        let header = self.header_resources.values();
        let payload = self.payload_resources.values().flat_map(|m| m.values());
        let combined = self
            .header_payload_resources
            .values()
            .flat_map(|keys| keys.values())
            .flat_map(|m| m.values());

        let mut names: Vec<&str> = match self.strategy {
            TopicIdentifier::None => Vec::new(),
            TopicIdentifier::ByHeader => header.map(String::as_str).collect(),
            TopicIdentifier::ByPayloadKey => payload.map(String::as_str).collect(),
            TopicIdentifier::ByHeaderAndPayloadKey => header
                .chain(payload)
                .chain(combined)
                .map(String::as_str)
                .collect(),
        };
        names.sort_unstable();
        names.dedup();
        names
    }
}
