//! The `error` module defines the error taxonomy shared by the hub, the broker
//! binding and the webhook dispatch engine.
//!
//! Each concern owns a small enum; `WebSubError` aggregates them so hub-control
//! callers can branch on a single type while the dispatch engine maps its own
//! variants straight onto HTTP status codes.

use thiserror::Error;

use crate::broker::ConsumerId;

/// Result type used across the crate.
pub type Result<T, E = WebSubError> = std::result::Result<T, E>;

/// Error type returned by subscriber-side handlers.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum WebSubError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error(transparent)]
    Delivery(#[from] DeliveryError),
    #[error(transparent)]
    Broker(#[from] BrokerError),
}

/// Malformed service or hub setup, detected before anything is served.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("dispatch strategy {strategy} requires a topic header name")]
    MissingTopicHeader { strategy: &'static str },
    #[error("dispatch strategy {strategy} requires a non-empty {map} resource map")]
    EmptyResourceMap {
        strategy: &'static str,
        map: &'static str,
    },
    #[error("resource `{name}` is mapped but has no registered handler")]
    UnknownResource { name: String },
    #[error("a service is already attached at `{path}`")]
    DuplicateServicePath { path: String },
    #[error("invalid url `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("hub is already started")]
    AlreadyStarted,
    #[error("hub is not started")]
    NotStarted,
    #[error("hub handle does not belong to the running hub")]
    HandleMismatch,
    #[error("broker bootstrap timed out after {timeout_ms} ms")]
    BootstrapTimeout { timeout_ms: u64 },
    #[error("broker bootstrap failed: {0}")]
    Bootstrap(BrokerError),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("topic `{topic}` is already registered")]
    DuplicateTopic { topic: String },
    #[error("topic must not be empty")]
    InvalidTopic,
    #[error("topic `{topic}` is not registered")]
    UnknownTopic { topic: String },
    #[error("topic `{topic}` must be registered before it is used")]
    UnregisteredTopic { topic: String },
    #[error("no subscription for `{callback}` on topic `{topic}`")]
    SubscriptionNotFound { topic: String, callback: String },
    #[error("invalid subscription request: {reason}")]
    InvalidRequest { reason: String },
}

/// Failures while resolving an inbound webhook call. Each maps onto the HTTP
/// status returned to the caller.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("method {method} is not allowed")]
    MethodNotAllowed { method: String },
    #[error("no matching resource: {detail}")]
    NoMatchingResource { detail: String },
    #[error("unsupported content type `{content_type}`")]
    UnsupportedContentType { content_type: String },
    #[error("malformed payload: {reason}")]
    MalformedPayload { reason: String },
    #[error("missing query parameter `{name}`")]
    MissingParameter { name: &'static str },
    #[error("content verification failed: {reason}")]
    VerificationFailed { reason: String },
}

impl DispatchError {
    pub fn status(&self) -> u16 {
        match self {
            DispatchError::MethodNotAllowed { .. } => 405,
            DispatchError::NoMatchingResource { .. } | DispatchError::MissingParameter { .. } => {
                404
            }
            DispatchError::UnsupportedContentType { .. }
            | DispatchError::MalformedPayload { .. } => 400,
            DispatchError::VerificationFailed { .. } => 403,
        }
    }
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    /// A subscriber handler failed with an error from outside this crate.
    #[error("service execution failed: {source}")]
    ServiceExecution { source: HandlerError },
    #[error("handler did not complete within {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },
    #[error("callback `{callback}` failed: {reason}")]
    Callback { callback: String, reason: String },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BrokerError {
    #[error("broker unavailable: {0}")]
    Unavailable(String),
    #[error("unknown consumer {0}")]
    UnknownConsumer(ConsumerId),
    #[error("persistence failure: {0}")]
    Persistence(String),
}

impl WebSubError {
    /// Folds a handler failure into the crate's error domain.
    ///
    /// Errors that already belong to this crate pass through untouched; all
    /// others become `DeliveryError::ServiceExecution`.
    pub fn from_handler(err: HandlerError) -> Self {
        let err = match err.downcast::<WebSubError>() {
            Ok(own) => return *own,
            Err(other) => other,
        };
        let err = match err.downcast::<DeliveryError>() {
            Ok(own) => return WebSubError::Delivery(*own),
            Err(other) => other,
        };
        let err = match err.downcast::<DispatchError>() {
            Ok(own) => return WebSubError::Dispatch(*own),
            Err(other) => other,
        };
        let err = match err.downcast::<RegistryError>() {
            Ok(own) => return WebSubError::Registry(*own),
            Err(other) => other,
        };
        let err = match err.downcast::<LifecycleError>() {
            Ok(own) => return WebSubError::Lifecycle(*own),
            Err(other) => other,
        };
        let err = match err.downcast::<ConfigurationError>() {
            Ok(own) => return WebSubError::Configuration(*own),
            Err(other) => other,
        };
        match err.downcast::<BrokerError>() {
            Ok(own) => WebSubError::Broker(*own),
            Err(other) => DeliveryError::ServiceExecution { source: other }.into(),
        }
    }

    /// Message suitable for a response body: the handler's own message for
    /// wrapped execution failures, the display form otherwise.
    pub fn detail(&self) -> String {
        match self {
            WebSubError::Delivery(DeliveryError::ServiceExecution { source }) => source.to_string(),
            other => other.to_string(),
        }
    }

    pub fn is_service_execution(&self) -> bool {
        matches!(
            self,
            WebSubError::Delivery(DeliveryError::ServiceExecution { .. })
        )
    }
}
