//! Hub-side handling of `hub.mode=subscribe|unsubscribe` requests.
//!
//! A request is validated synchronously, then intent verification runs in
//! the background: the hub sends the callback a challenge and applies the
//! change only if the callback echoes it back.

use std::collections::HashMap;
use std::fmt;

use tokio::task::JoinHandle;

use crate::transport::message::{
    HUB_CALLBACK, HUB_LEASE_SECONDS, HUB_MODE, HUB_SECRET, HUB_TOPIC, MODE_SUBSCRIBE,
    MODE_UNSUBSCRIBE,
};
use crate::utils::error::RegistryError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionMode {
    Subscribe,
    Unsubscribe,
}

impl SubscriptionMode {
    pub fn parse(mode: &str) -> Result<Self, RegistryError> {
        match mode {
            MODE_SUBSCRIBE => Ok(SubscriptionMode::Subscribe),
            MODE_UNSUBSCRIBE => Ok(SubscriptionMode::Unsubscribe),
            other => Err(RegistryError::InvalidRequest {
                reason: format!("unsupported hub.mode `{other}`"),
            }),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionMode::Subscribe => MODE_SUBSCRIBE,
            SubscriptionMode::Unsubscribe => MODE_UNSUBSCRIBE,
        }
    }
}

impl fmt::Display for SubscriptionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionRequest {
    pub mode: SubscriptionMode,
    pub topic: String,
    pub callback: String,
    pub lease_seconds: Option<u64>,
    pub secret: Option<String>,
}

impl SubscriptionRequest {
    pub fn subscribe(topic: &str, callback: &str) -> Self {
        Self {
            mode: SubscriptionMode::Subscribe,
            topic: topic.to_string(),
            callback: callback.to_string(),
            lease_seconds: None,
            secret: None,
        }
    }

    pub fn unsubscribe(topic: &str, callback: &str) -> Self {
        Self {
            mode: SubscriptionMode::Unsubscribe,
            ..Self::subscribe(topic, callback)
        }
    }

    /// Parse the form parameters of a subscription request.
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self, RegistryError> {
        let required = |name: &str| {
            params
                .get(name)
                .filter(|value| !value.is_empty())
                .cloned()
                .ok_or_else(|| RegistryError::InvalidRequest {
                    reason: format!("missing {name}"),
                })
        };

        let mode = SubscriptionMode::parse(&required(HUB_MODE)?)?;
        let topic = required(HUB_TOPIC)?;
        let callback = required(HUB_CALLBACK)?;
        let lease_seconds = params
            .get(HUB_LEASE_SECONDS)
            .map(|value| {
                value.parse::<u64>().map_err(|_| RegistryError::InvalidRequest {
                    reason: format!("invalid {HUB_LEASE_SECONDS} `{value}`"),
                })
            })
            .transpose()?;
        let secret = params
            .get(HUB_SECRET)
            .filter(|value| !value.is_empty())
            .cloned();

        Ok(Self {
            mode,
            topic,
            callback,
            lease_seconds,
            secret,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationOutcome {
    /// The callback echoed the challenge and the change was applied.
    Verified,
    Rejected { reason: String },
}

/// Completion handle for a background intent verification.
#[derive(Debug)]
pub struct VerificationTicket {
    task: JoinHandle<VerificationOutcome>,
}

impl VerificationTicket {
    pub(crate) fn new(task: JoinHandle<VerificationOutcome>) -> Self {
        Self { task }
    }

    pub async fn outcome(self) -> VerificationOutcome {
        self.task
            .await
            .unwrap_or_else(|e| VerificationOutcome::Rejected {
                reason: format!("verification task failed: {e}"),
            })
    }
}
