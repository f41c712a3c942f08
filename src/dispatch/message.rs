//! Canonical messages handed to subscriber handlers.
//!
//! They are built fresh for every inbound call and never stored.

use serde_json::Value;
use tracing::debug;

use crate::transport::content::APPLICATION_JSON;
use crate::transport::message::{
    CONTENT_TYPE, HUB_CHALLENGE, HUB_LEASE_SECONDS, HUB_MODE, HUB_REASON, HUB_TOPIC,
};
use crate::transport::{Content, Headers, WebhookRequest, WebhookResponse};

/// An intent-verification challenge from the hub.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationMessage {
    pub mode: String,
    pub topic: String,
    pub challenge: String,
    /// Only present for subscribe requests that carried a lease.
    pub lease_seconds: Option<u64>,
}

impl VerificationMessage {
    /// Missing query parameters become empty strings.
    pub fn from_request(request: &WebhookRequest) -> Self {
        let param = |name: &str| request.query_param(name).unwrap_or_default().to_string();
        let lease_seconds = request.query_param(HUB_LEASE_SECONDS).and_then(|value| {
            value
                .parse::<u64>()
                .inspect_err(|_| debug!(lease_seconds = %value, "Ignoring unparsable lease"))
                .ok()
        });
        Self {
            mode: param(HUB_MODE),
            topic: param(HUB_TOPIC),
            challenge: param(HUB_CHALLENGE),
            lease_seconds,
        }
    }
}

/// The hub refused a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DenialMessage {
    pub reason: String,
}

impl DenialMessage {
    pub fn from_request(request: &WebhookRequest) -> Self {
        Self {
            reason: request
                .query_param(HUB_REASON)
                .unwrap_or_default()
                .to_string(),
        }
    }
}

/// A content distribution from the hub.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationMessage {
    pub content: Content,
    pub content_type: String,
    /// Every header of the inbound call.
    pub headers: Headers,
}

/// What a denial handler sends back to the hub.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Acknowledgement {
    pub body: Option<Value>,
    pub headers: Headers,
}

impl Acknowledgement {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub(crate) fn into_response(self) -> WebhookResponse {
        let mut response = WebhookResponse::new(200);
        if let Some(body) = self.body {
            response = response
                .with_header(CONTENT_TYPE, APPLICATION_JSON)
                .with_body(body.to_string());
        }
        for (name, value) in self.headers.iter() {
            response.headers.insert(name, value);
        }
        response
    }
}
