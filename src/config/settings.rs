use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::hub::{HubConfig, HubOptions};

/// Top-level configuration settings for the application.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Settings {
    pub hub: HubSettings,
    pub broker: BrokerSettings,
    pub logging: LoggingSettings,
}

/// Where the hub listens, how its URLs are derived and how long it waits on
/// the broker and on subscriber handlers.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct HubSettings {
    pub host: String,
    pub port: u16,
    pub secure: bool,
    pub base_path: String,
    pub subscribe_path: String,
    pub publish_path: String,
    pub public_url: Option<String>,
    pub topic_registration_required: bool,
    pub default_lease_seconds: u64,
    pub bootstrap_timeout_ms: u64,
    pub handler_timeout_ms: u64,
    pub lease_check_interval_secs: u64,
}

/// Configuration settings for the local broker binding.
///
/// Retention is off unless `persistence_path` is set.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct BrokerSettings {
    pub queue_capacity: usize,
    pub persistence_path: Option<String>,
    pub message_ttl_secs: u64,
    pub max_messages_per_topic: usize,
    pub replay_on_subscribe: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LoggingSettings {
    pub level: String,
}

/// Partial configuration settings loaded from files or environment.
///
/// Missing values are filled from `Settings::default()`.
#[derive(Debug, Deserialize, Default)]
pub struct PartialSettings {
    pub hub: Option<PartialHubSettings>,
    pub broker: Option<PartialBrokerSettings>,
    pub logging: Option<PartialLoggingSettings>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialHubSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub secure: Option<bool>,
    pub base_path: Option<String>,
    pub subscribe_path: Option<String>,
    pub publish_path: Option<String>,
    pub public_url: Option<String>,
    pub topic_registration_required: Option<bool>,
    pub default_lease_seconds: Option<u64>,
    pub bootstrap_timeout_ms: Option<u64>,
    pub handler_timeout_ms: Option<u64>,
    pub lease_check_interval_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialBrokerSettings {
    pub queue_capacity: Option<usize>,
    pub persistence_path: Option<String>,
    pub message_ttl_secs: Option<u64>,
    pub max_messages_per_topic: Option<usize>,
    pub replay_on_subscribe: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialLoggingSettings {
    pub level: Option<String>,
}

impl PartialSettings {
    /// Merge with defaults
    pub fn merge(self, default: Settings) -> Settings {
        Settings {
            hub: self.hub.unwrap_or_default().merge(default.hub),
            broker: self.broker.unwrap_or_default().merge(default.broker),
            logging: LoggingSettings {
                level: self
                    .logging
                    .and_then(|l| l.level)
                    .unwrap_or(default.logging.level),
            },
        }
    }
}

impl PartialHubSettings {
    fn merge(self, default: HubSettings) -> HubSettings {
        HubSettings {
            host: self.host.unwrap_or(default.host),
            port: self.port.unwrap_or(default.port),
            secure: self.secure.unwrap_or(default.secure),
            base_path: self.base_path.unwrap_or(default.base_path),
            subscribe_path: self.subscribe_path.unwrap_or(default.subscribe_path),
            publish_path: self.publish_path.unwrap_or(default.publish_path),
            public_url: self
                .public_url
                .filter(|url| !url.is_empty())
                .or(default.public_url),
            topic_registration_required: self
                .topic_registration_required
                .unwrap_or(default.topic_registration_required),
            default_lease_seconds: self
                .default_lease_seconds
                .unwrap_or(default.default_lease_seconds),
            bootstrap_timeout_ms: self
                .bootstrap_timeout_ms
                .unwrap_or(default.bootstrap_timeout_ms),
            handler_timeout_ms: self
                .handler_timeout_ms
                .unwrap_or(default.handler_timeout_ms),
            lease_check_interval_secs: self
                .lease_check_interval_secs
                .unwrap_or(default.lease_check_interval_secs),
        }
    }
}

impl PartialBrokerSettings {
    fn merge(self, default: BrokerSettings) -> BrokerSettings {
        BrokerSettings {
            queue_capacity: self.queue_capacity.unwrap_or(default.queue_capacity),
            persistence_path: self
                .persistence_path
                .filter(|path| !path.is_empty())
                .or(default.persistence_path),
            message_ttl_secs: self.message_ttl_secs.unwrap_or(default.message_ttl_secs),
            max_messages_per_topic: self
                .max_messages_per_topic
                .unwrap_or(default.max_messages_per_topic),
            replay_on_subscribe: self
                .replay_on_subscribe
                .unwrap_or(default.replay_on_subscribe),
        }
    }
}

/// Provides default values for `Settings`.
impl Default for Settings {
    fn default() -> Self {
        Self {
            hub: HubSettings {
                host: "127.0.0.1".to_string(),
                port: 9191,
                secure: false,
                base_path: "/websub".to_string(),
                subscribe_path: "/hub".to_string(),
                publish_path: "/publish".to_string(),
                public_url: None,
                topic_registration_required: true,
                default_lease_seconds: 86_400,
                bootstrap_timeout_ms: 5_000,
                handler_timeout_ms: 30_000,
                lease_check_interval_secs: 60,
            },
            broker: BrokerSettings {
                queue_capacity: 1024,
                persistence_path: None,
                message_ttl_secs: 3600,
                max_messages_per_topic: 1000,
                replay_on_subscribe: false,
            },
            logging: LoggingSettings {
                level: "info".to_string(),
            },
        }
    }
}

impl Settings {
    /// The start-time configuration for `Hub::start`.
    pub fn hub_config(&self) -> HubConfig {
        HubConfig {
            host: self.hub.host.clone(),
            port: self.hub.port,
            secure: self.hub.secure,
            base_path: self.hub.base_path.clone(),
            subscribe_path: self.hub.subscribe_path.clone(),
            publish_path: self.hub.publish_path.clone(),
            public_url: self.hub.public_url.clone(),
            topic_registration_required: self.hub.topic_registration_required,
        }
    }

    /// Construction-time options for `Hub::with_options`.
    pub fn hub_options(&self) -> HubOptions {
        HubOptions {
            bootstrap_timeout: Duration::from_millis(self.hub.bootstrap_timeout_ms),
            default_lease_seconds: self.hub.default_lease_seconds,
        }
    }

    pub fn handler_timeout(&self) -> Duration {
        Duration::from_millis(self.hub.handler_timeout_ms)
    }

    pub fn lease_check_interval(&self) -> Duration {
        Duration::from_secs(self.hub.lease_check_interval_secs)
    }
}
