//! Subscriber services and the handler capabilities they expose.
//!
//! A service implements only the roles it cares about. A missing
//! verification handler falls back to auto-accepting challenges for the
//! service's declared topic; every other missing role answers 404.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::dispatch::message::{
    Acknowledgement, DenialMessage, NotificationMessage, VerificationMessage,
};
use crate::dispatch::registry::DispatchConfig;
use crate::transport::{Content, WebhookRequest};
use crate::utils::error::{ConfigurationError, DispatchError, HandlerError};

#[async_trait]
pub trait VerificationHandler: Send + Sync {
    /// Returning an error rejects the (un)subscription.
    async fn on_verification(&self, message: VerificationMessage) -> Result<(), HandlerError>;
}

#[async_trait]
pub trait DenialHandler: Send + Sync {
    async fn on_denial(&self, message: DenialMessage) -> Result<Acknowledgement, HandlerError>;
}

/// Receives notifications that the dispatch strategy did not route to a
/// named resource.
#[async_trait]
pub trait NotificationHandler: Send + Sync {
    async fn on_notification(&self, message: NotificationMessage) -> Result<(), HandlerError>;
}

/// A named resource handler. `event` is the payload converted to the
/// handler's declared `PayloadShape`.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn on_event(
        &self,
        event: Value,
        message: NotificationMessage,
    ) -> Result<(), HandlerError>;
}

#[async_trait]
impl<F, Fut> VerificationHandler for F
where
    F: Fn(VerificationMessage) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    async fn on_verification(&self, message: VerificationMessage) -> Result<(), HandlerError> {
        (self)(message).await
    }
}

#[async_trait]
impl<F, Fut> DenialHandler for F
where
    F: Fn(DenialMessage) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Acknowledgement, HandlerError>> + Send + 'static,
{
    async fn on_denial(&self, message: DenialMessage) -> Result<Acknowledgement, HandlerError> {
        (self)(message).await
    }
}

#[async_trait]
impl<F, Fut> NotificationHandler for F
where
    F: Fn(NotificationMessage) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    async fn on_notification(&self, message: NotificationMessage) -> Result<(), HandlerError> {
        (self)(message).await
    }
}

#[async_trait]
impl<F, Fut> EventHandler for F
where
    F: Fn(Value, NotificationMessage) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    async fn on_event(
        &self,
        event: Value,
        message: NotificationMessage,
    ) -> Result<(), HandlerError> {
        (self)(event, message).await
    }
}

/// The structure a resource handler expects its payload in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PayloadShape {
    /// Any JSON value.
    #[default]
    Json,
    /// A JSON object carrying at least these fields.
    Record { fields: Vec<String> },
    /// The body as a string.
    Text,
}

impl PayloadShape {
    pub fn record(fields: &[&str]) -> Self {
        PayloadShape::Record {
            fields: fields.iter().map(|f| f.to_string()).collect(),
        }
    }

    pub fn convert(&self, content: &Content) -> Result<Value, DispatchError> {
        match self {
            PayloadShape::Json => to_json(content),
            PayloadShape::Record { fields } => {
                let value = to_json(content)?;
                let Some(object) = value.as_object() else {
                    return Err(DispatchError::MalformedPayload {
                        reason: "expected a JSON object".to_string(),
                    });
                };
                if let Some(missing) = fields.iter().find(|f| !object.contains_key(f.as_str())) {
                    return Err(DispatchError::MalformedPayload {
                        reason: format!("missing field `{missing}`"),
                    });
                }
                Ok(value)
            }
            PayloadShape::Text => match content {
                Content::Text(text) | Content::Xml(text) => Ok(Value::String(text.clone())),
                Content::Json(value) => Ok(Value::String(value.to_string())),
                Content::Binary(bytes) => std::str::from_utf8(bytes)
                    .map(|text| Value::String(text.to_string()))
                    .map_err(|e| DispatchError::MalformedPayload {
                        reason: e.to_string(),
                    }),
            },
        }
    }
}

fn to_json(content: &Content) -> Result<Value, DispatchError> {
    let parsed = match content {
        Content::Json(value) => return Ok(value.clone()),
        Content::Text(text) | Content::Xml(text) => serde_json::from_str(text),
        Content::Binary(bytes) => serde_json::from_slice(bytes),
    };
    parsed.map_err(|e| DispatchError::MalformedPayload {
        reason: e.to_string(),
    })
}

/// Checks the authenticity of a content delivery before it is dispatched.
pub trait ContentVerifier: Send + Sync {
    fn verify(&self, request: &WebhookRequest) -> Result<(), DispatchError>;
}

/// Accepts every delivery. Deliveries are not signed.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl ContentVerifier for AcceptAll {
    fn verify(&self, _request: &WebhookRequest) -> Result<(), DispatchError> {
        Ok(())
    }
}

struct Resource {
    shape: PayloadShape,
    handler: Arc<dyn EventHandler>,
}

/// A subscriber endpoint: its declared topic, dispatch strategy and handlers.
pub struct SubscriberService {
    topic: Option<String>,
    dispatch: DispatchConfig,
    verification: Option<Arc<dyn VerificationHandler>>,
    denial: Option<Arc<dyn DenialHandler>>,
    notification: Option<Arc<dyn NotificationHandler>>,
    resources: HashMap<String, Resource>,
    verifier: Arc<dyn ContentVerifier>,
}

impl SubscriberService {
    pub fn builder() -> SubscriberServiceBuilder {
        SubscriberServiceBuilder::default()
    }

    /// The topic this service declares it subscribes to.
    pub fn topic(&self) -> Option<&str> {
        self.topic.as_deref()
    }

    pub fn dispatch(&self) -> &DispatchConfig {
        &self.dispatch
    }

    pub(crate) fn verification_handler(&self) -> Option<Arc<dyn VerificationHandler>> {
        self.verification.clone()
    }

    pub(crate) fn denial_handler(&self) -> Option<Arc<dyn DenialHandler>> {
        self.denial.clone()
    }

    pub(crate) fn notification_handler(&self) -> Option<Arc<dyn NotificationHandler>> {
        self.notification.clone()
    }

    pub(crate) fn resource(&self, name: &str) -> Option<(&PayloadShape, Arc<dyn EventHandler>)> {
        self.resources
            .get(name)
            .map(|resource| (&resource.shape, Arc::clone(&resource.handler)))
    }

    pub(crate) fn verifier(&self) -> &dyn ContentVerifier {
        self.verifier.as_ref()
    }
}

impl std::fmt::Debug for SubscriberService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut resources: Vec<&String> = self.resources.keys().collect();
        resources.sort();
        f.debug_struct("SubscriberService")
            .field("topic", &self.topic)
            .field("dispatch", &self.dispatch)
            .field("verification", &self.verification.is_some())
            .field("denial", &self.denial.is_some())
            .field("notification", &self.notification.is_some())
            .field("resources", &resources)
            .finish()
    }
}

#[derive(Default)]
pub struct SubscriberServiceBuilder {
    topic: Option<String>,
    dispatch: DispatchConfig,
    verification: Option<Arc<dyn VerificationHandler>>,
    denial: Option<Arc<dyn DenialHandler>>,
    notification: Option<Arc<dyn NotificationHandler>>,
    resources: HashMap<String, Resource>,
    verifier: Option<Arc<dyn ContentVerifier>>,
}

impl SubscriberServiceBuilder {
    pub fn topic(mut self, topic: &str) -> Self {
        self.topic = Some(topic.to_string());
        self
    }

    pub fn dispatch(mut self, dispatch: DispatchConfig) -> Self {
        self.dispatch = dispatch;
        self
    }

    pub fn on_verification(mut self, handler: impl VerificationHandler + 'static) -> Self {
        self.verification = Some(Arc::new(handler));
        self
    }

    pub fn on_denial(mut self, handler: impl DenialHandler + 'static) -> Self {
        self.denial = Some(Arc::new(handler));
        self
    }

    pub fn on_notification(mut self, handler: impl NotificationHandler + 'static) -> Self {
        self.notification = Some(Arc::new(handler));
        self
    }

    /// Registers the handler for resource `name`; a later call for the same
    /// name replaces it.
    pub fn on_event(
        mut self,
        name: &str,
        shape: PayloadShape,
        handler: impl EventHandler + 'static,
    ) -> Self {
        self.resources.insert(
            name.to_string(),
            Resource {
                shape,
                handler: Arc::new(handler),
            },
        );
        self
    }

    pub fn verifier(mut self, verifier: impl ContentVerifier + 'static) -> Self {
        self.verifier = Some(Arc::new(verifier));
        self
    }

    /// Validates the dispatch configuration and checks that every resource
    /// it can resolve to has a handler.
    pub fn build(self) -> Result<SubscriberService, ConfigurationError> {
        self.dispatch.validate()?;
        if let Some(name) = self
            .dispatch
            .resources()
            .into_iter()
            .find(|name| !self.resources.contains_key(*name))
        {
            return Err(ConfigurationError::UnknownResource {
                name: name.to_string(),
            });
        }

        Ok(SubscriberService {
            topic: self.topic,
            dispatch: self.dispatch,
            verification: self.verification,
            denial: self.denial,
            notification: self.notification,
            resources: self.resources,
            verifier: self.verifier.unwrap_or_else(|| Arc::new(AcceptAll)),
        })
    }
}
